use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{CostCenterId, DomainError, DomainResult, ProjectId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRevision {
    pub project_id: ProjectId,
    pub cost_center_id: CostCenterId,
    pub revision_number: u32,
    pub original_budget: Decimal,
    pub revised_budget: Decimal,
    /// `revised_budget - original_budget`.
    pub revision_amount: Decimal,
    pub revision_reason: String,
    pub approved_by: UserId,
    pub approved_date: DateTime<Utc>,
    pub effective_date: DateTime<Utc>,
}

/// Budget revisions per cost center, ordered by revision number.
#[derive(Debug, Clone, Default)]
pub struct BudgetRegister {
    revisions: HashMap<CostCenterId, Vec<BudgetRevision>>,
}

impl BudgetRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a revision. Revision numbers must increase per cost center and
    /// `revision_amount` must match the two budgets.
    pub fn record(&mut self, revision: BudgetRevision) -> DomainResult<()> {
        if revision.revised_budget < Decimal::ZERO || revision.original_budget < Decimal::ZERO {
            return Err(DomainError::validation("budgets must not be negative"));
        }
        if revision.revised_budget - revision.original_budget != revision.revision_amount {
            return Err(DomainError::validation(format!(
                "revision amount {} does not match {} -> {}",
                revision.revision_amount, revision.original_budget, revision.revised_budget
            )));
        }
        let list = self.revisions.entry(revision.cost_center_id).or_default();
        if let Some(last) = list.last() {
            if last.revision_number >= revision.revision_number {
                return Err(DomainError::conflict(format!(
                    "revision {} of cost center {} is not after revision {}",
                    revision.revision_number, revision.cost_center_id, last.revision_number
                )));
            }
        }
        list.push(revision);
        Ok(())
    }

    pub fn revisions(&self, center: CostCenterId) -> &[BudgetRevision] {
        self.revisions.get(&center).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Budget in force at `as_of`: the latest revision effective by then, or
    /// `base` when none is.
    pub fn effective_budget(
        &self,
        center: CostCenterId,
        base: Decimal,
        as_of: DateTime<Utc>,
    ) -> Decimal {
        self.revisions(center)
            .iter()
            .filter(|r| r.effective_date <= as_of)
            .max_by_key(|r| (r.effective_date, r.revision_number))
            .map(|r| r.revised_budget)
            .unwrap_or(base)
    }
}
