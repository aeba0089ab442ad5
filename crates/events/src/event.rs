use chrono::{DateTime, Utc};

use buildledger_core::ProjectId;

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - **project-scoped** (a project is the unit of serialization)
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "wbs.node.moved").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Project the event belongs to.
    fn project_id(&self) -> ProjectId;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
