//! Progress module: measurements, milestones and the weighted roll-up.
//!
//! Pure domain logic only. Leaf-level records are read from a
//! [`ProgressInputs`] snapshot; results are [`WeightedProgress`] snapshots that
//! a persistence layer may store.

pub mod aggregator;
pub mod book;
pub mod measurement;
pub mod milestone;
pub mod snapshot;

pub use aggregator::{
    DEFAULT_PERCENTAGE_SCALE, NodeProgress, ProgressAggregator, ProgressInputs, child_weight,
};
pub use book::ProgressBook;
pub use measurement::{MeasurementLog, NewMeasurement, ProgressMeasurement, ProgressMethod};
pub use milestone::{Milestone, MilestoneStatus};
pub use snapshot::{
    ChildProgressData, ContributionSource, ProgressContribution, WeightBasis, WeightedProgress,
};
