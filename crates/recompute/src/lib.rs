//! Incremental recomputation of WBS roll-ups.
//!
//! Changes mark nodes dirty (and every ancestor with them); a pass recomputes
//! only the dirty nodes, deepest level first, computing the nodes of one level
//! in parallel. Passes and edits of one project are serialized; different
//! projects proceed independently.

pub mod change;
pub mod config;
pub mod error;
pub mod inputs;
pub mod pass;
pub mod plan;
pub mod service;
pub mod sink;
pub mod state;

pub use change::ProjectChange;
pub use config::RecomputeConfig;
pub use error::{RecomputeError, SinkError};
pub use inputs::ProjectInputs;
pub use pass::{NodeFailure, NodeResult, PassReport, RecomputePass};
pub use plan::RecomputePlan;
pub use service::{IngestOutcome, RecomputeService};
pub use sink::{InMemoryResultSink, ResultBatch, ResultSink};
pub use state::{DirtyTracker, NodeState};
