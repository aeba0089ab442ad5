//! Cost allocations and the ledger that guards them.
//!
//! An allocation moves part of a posted cost to another cost center and,
//! optionally, another WBS node. The sum of a cost's allocations never
//! exceeds the cost's amount; a batch that would break this is rejected as a
//! whole.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{
    ActualCostId, CostAllocationId, CostCenterId, DomainError, DomainResult, Entity, ONE_HUNDRED,
    ProjectId, UserId, WbsNodeId, round_to,
};

use crate::cost::ActualCost;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostAllocation {
    pub id: CostAllocationId,
    pub actual_cost_id: ActualCostId,
    pub allocation_percentage: Decimal,
    pub allocated_amount: Decimal,
    pub target_cost_center_id: CostCenterId,
    pub target_wbs_node_id: Option<WbsNodeId>,
    pub allocation_reason: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Entity for CostAllocation {
    type Id = CostAllocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Allocation request. When `allocated_amount` is omitted it is derived from
/// the percentage at the cost amount's scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAllocation {
    pub id: CostAllocationId,
    pub actual_cost_id: ActualCostId,
    pub allocation_percentage: Decimal,
    pub allocated_amount: Option<Decimal>,
    pub target_cost_center_id: CostCenterId,
    pub target_wbs_node_id: Option<WbsNodeId>,
    pub allocation_reason: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Posted costs of one project plus their allocations.
#[derive(Debug, Clone)]
pub struct AllocationLedger {
    project_id: ProjectId,
    costs: HashMap<ActualCostId, ActualCost>,
    /// Posting order, so iteration is deterministic.
    order: Vec<ActualCostId>,
    allocations: HashMap<ActualCostId, Vec<CostAllocation>>,
    allocation_ids: HashSet<CostAllocationId>,
}

impl AllocationLedger {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            costs: HashMap::new(),
            order: Vec::new(),
            allocations: HashMap::new(),
            allocation_ids: HashSet::new(),
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn post_cost(&mut self, cost: ActualCost) -> DomainResult<()> {
        if cost.project_id != self.project_id {
            return Err(DomainError::validation(format!(
                "cost {} belongs to project {}, not {}",
                cost.id, cost.project_id, self.project_id
            )));
        }
        cost.validate()?;
        if self.costs.contains_key(&cost.id) {
            return Err(DomainError::conflict(format!("cost {} already posted", cost.id)));
        }
        self.order.push(cost.id);
        self.costs.insert(cost.id, cost);
        Ok(())
    }

    pub fn cost(&self, id: ActualCostId) -> DomainResult<&ActualCost> {
        self.costs
            .get(&id)
            .ok_or_else(|| DomainError::not_found("actual cost", id))
    }

    /// Costs in posting order.
    pub fn costs(&self) -> impl Iterator<Item = &ActualCost> {
        self.order.iter().filter_map(|id| self.costs.get(id))
    }

    pub fn allocations_for(&self, id: ActualCostId) -> &[CostAllocation] {
        self.allocations.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn allocated_total(&self, id: ActualCostId) -> Decimal {
        self.allocations_for(id)
            .iter()
            .map(|a| a.allocated_amount)
            .sum()
    }

    /// Part of the cost that stays with its own node and cost center.
    pub fn unallocated(&self, id: ActualCostId) -> DomainResult<Decimal> {
        let cost = self.cost(id)?;
        Ok(cost.amount - self.allocated_total(id))
    }

    pub fn allocate(&mut self, new: NewAllocation) -> DomainResult<CostAllocationId> {
        let id = new.id;
        self.allocate_all(vec![new])?;
        Ok(id)
    }

    /// Validate every request against the ledger and the rest of the batch,
    /// then record all of them. Any failure leaves the ledger unchanged.
    pub fn allocate_all(&mut self, batch: Vec<NewAllocation>) -> DomainResult<()> {
        let mut pending: HashMap<ActualCostId, Decimal> = HashMap::new();
        let mut batch_ids = HashSet::new();
        let mut accepted = Vec::with_capacity(batch.len());

        for new in batch {
            let cost = self.cost(new.actual_cost_id)?;
            if self.allocation_ids.contains(&new.id) || !batch_ids.insert(new.id) {
                return Err(DomainError::conflict(format!(
                    "allocation {} already recorded",
                    new.id
                )));
            }
            if new.allocation_percentage < Decimal::ZERO || new.allocation_percentage > ONE_HUNDRED
            {
                return Err(DomainError::validation(format!(
                    "allocation percentage {} outside [0, 100]",
                    new.allocation_percentage
                )));
            }
            let amount = match new.allocated_amount {
                Some(amount) => amount,
                None => {
                    let raw = cost
                        .amount
                        .checked_mul(new.allocation_percentage)
                        .map(|v| v / ONE_HUNDRED)
                        .ok_or_else(|| DomainError::computation("allocation amount overflow"))?;
                    round_to(raw, cost.amount.scale())
                }
            };
            if amount < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "allocated amount {amount} must not be negative"
                )));
            }

            let already = self.allocated_total(cost.id)
                + pending.get(&cost.id).copied().unwrap_or_default();
            let available = cost.amount - already;
            if amount > available {
                return Err(DomainError::allocation_overflow(cost.id, amount, available));
            }
            *pending.entry(cost.id).or_default() += amount;

            accepted.push(CostAllocation {
                id: new.id,
                actual_cost_id: new.actual_cost_id,
                allocation_percentage: new.allocation_percentage,
                allocated_amount: amount,
                target_cost_center_id: new.target_cost_center_id,
                target_wbs_node_id: new.target_wbs_node_id,
                allocation_reason: new.allocation_reason,
                created_by: new.created_by,
                created_at: new.created_at,
            });
        }

        for allocation in accepted {
            self.allocation_ids.insert(allocation.id);
            self.allocations
                .entry(allocation.actual_cost_id)
                .or_default()
                .push(allocation);
        }
        Ok(())
    }
}
