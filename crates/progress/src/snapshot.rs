//! Computed progress snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use buildledger_core::{
    DomainError, DomainResult, MeasurementId, MilestoneId, ONE_HUNDRED, ProjectId, SnapshotId,
    ValueObject, WbsNodeId,
};

/// How a contribution's weight was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightBasis {
    Budget,
    PlannedHours,
    /// Neither budget nor hours set; every such child weighs 1.
    Equal,
    MilestoneWeight,
    /// A leaf's own measurement (weight 1).
    Measurement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ContributionSource {
    Child(WbsNodeId),
    Milestone(MilestoneId),
    /// `None` when the leaf has never been measured.
    Measurement(Option<MeasurementId>),
}

/// One weighted term of a node's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressContribution {
    pub source: ContributionSource,
    pub weight: Decimal,
    pub basis: WeightBasis,
    pub progress: Decimal,
}

impl ValueObject for ProgressContribution {}

/// The inputs behind a snapshot, kept for auditability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildProgressData {
    pub contributions: Vec<ProgressContribution>,
}

impl ValueObject for ChildProgressData {}

impl ChildProgressData {
    pub fn new(contributions: Vec<ProgressContribution>) -> Self {
        Self { contributions }
    }

    /// Check the content invariants (non-negative weights, progress in range).
    pub fn validate(&self) -> DomainResult<()> {
        for c in &self.contributions {
            if c.weight < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "negative weight {} for {:?}",
                    c.weight, c.source
                )));
            }
            if c.progress < Decimal::ZERO || c.progress > ONE_HUNDRED {
                return Err(DomainError::validation(format!(
                    "progress {} out of range for {:?}",
                    c.progress, c.source
                )));
            }
        }
        Ok(())
    }

    pub fn total_weight(&self) -> Decimal {
        self.contributions.iter().map(|c| c.weight).sum()
    }

    /// Nested key/value form for storage layers that keep a JSON column.
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    pub fn from_json(value: JsonValue) -> DomainResult<Self> {
        let data: Self = serde_json::from_value(value)
            .map_err(|e| DomainError::validation(format!("child_progress_data: {e}")))?;
        data.validate()?;
        Ok(data)
    }
}

/// Cached progress of one node at one calculation date.
///
/// Never mutated: each recomputation creates a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedProgress {
    pub id: SnapshotId,
    pub project_id: ProjectId,
    pub wbs_node_id: WbsNodeId,
    pub calculation_date: DateTime<Utc>,
    pub total_weight: Decimal,
    pub completed_weight: Decimal,
    pub weighted_progress_percentage: Decimal,
    pub child_progress_data: ChildProgressData,
    pub calculated_by: String,
    pub created_at: DateTime<Utc>,
}

impl WeightedProgress {
    /// Same figures, ignoring snapshot identity and timestamps.
    pub fn same_result(&self, other: &WeightedProgress) -> bool {
        self.wbs_node_id == other.wbs_node_id
            && self.total_weight == other.total_weight
            && self.completed_weight == other.completed_weight
            && self.weighted_progress_percentage == other.weighted_progress_percentage
            && self.child_progress_data == other.child_progress_data
    }
}
