use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{
    ActualCostId, CostCenterId, CostCodeId, DomainError, DomainResult, Entity, ProjectId, TaskId,
    UserId, WbsNodeId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostType {
    Labor,
    Material,
    Equipment,
    Subcontractor,
    Overhead,
    Other,
}

/// Where a cost sits in its lifecycle; decides which roll-up bucket it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostStatus {
    Planned,
    Committed,
    Actual,
    Accrued,
}

/// A posted cost record (timesheet line, PO, invoice, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualCost {
    pub id: ActualCostId,
    pub project_id: ProjectId,
    pub cost_center_id: CostCenterId,
    pub cost_code_id: CostCodeId,
    pub wbs_node_id: Option<WbsNodeId>,
    pub task_id: Option<TaskId>,
    pub cost_type: CostType,
    pub cost_status: CostStatus,
    pub amount: Decimal,
    pub cost_date: DateTime<Utc>,
    pub reference_number: Option<String>,
    /// Timesheet, PO, Invoice, ...
    pub reference_type: Option<String>,
    pub description: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl ActualCost {
    pub fn validate(&self) -> DomainResult<()> {
        if self.amount < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "cost {} has negative amount {}",
                self.id, self.amount
            )));
        }
        Ok(())
    }
}

impl Entity for ActualCost {
    type Id = ActualCostId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
