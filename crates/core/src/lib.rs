//! `buildledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the WBS, progress,
//! costing and earned-value crates (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod precision;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::{Entity, index_by_id};
pub use error::{DomainError, DomainResult};
pub use id::{
    ActualCostId, CostAllocationId, CostCenterId, CostCodeId, ForecastId, MeasurementId,
    MilestoneId, ProjectId, SnapshotId, TaskId, TemplateId, UserId, WbsNodeId,
};
pub use precision::{ONE_HUNDRED, clamp_percentage, monetary_scale, round_to};
pub use value_object::ValueObject;
