//! Cost roll-up over the WBS and the cost-center hierarchy.
//!
//! Attribution avoids double counting: a cost with allocations contributes
//! each allocated amount to the allocation's target and only the unallocated
//! remainder to its own node and cost center. An allocation without a target
//! node moves only the cost-center share; the WBS share stays with the cost's
//! own node.
//!
//! Forecasts do not add up the same way: a node carrying its own estimate at
//! completion reports that estimate for its subtree, and only a node without
//! one sums the forecasts of its children.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use buildledger_core::{CostCenterId, DomainError, DomainResult, ValueObject, WbsNodeId};
use buildledger_wbs::WbsTree;

use crate::allocation::AllocationLedger;
use crate::budget::BudgetRegister;
use crate::center::CostCenterHierarchy;
use crate::cost::CostStatus;
use crate::forecast::ForecastBook;

/// Cost buckets of one node or cost center.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTotals {
    /// Actual and accrued costs.
    pub actual: Decimal,
    pub committed: Decimal,
    pub planned: Decimal,
    /// Latest estimate at completion.
    pub forecast: Decimal,
}

impl ValueObject for CostTotals {}

impl CostTotals {
    pub fn is_zero(&self) -> bool {
        self.actual.is_zero()
            && self.committed.is_zero()
            && self.planned.is_zero()
            && self.forecast.is_zero()
    }

    /// Actual plus committed.
    pub fn exposure(&self) -> DomainResult<Decimal> {
        self.actual
            .checked_add(self.committed)
            .ok_or_else(|| DomainError::computation("cost exposure overflow"))
    }

    pub fn checked_add(&self, other: &CostTotals) -> DomainResult<CostTotals> {
        let add = |a: Decimal, b: Decimal| {
            a.checked_add(b)
                .ok_or_else(|| DomainError::computation("cost total overflow"))
        };
        Ok(CostTotals {
            actual: add(self.actual, other.actual)?,
            committed: add(self.committed, other.committed)?,
            planned: add(self.planned, other.planned)?,
            forecast: add(self.forecast, other.forecast)?,
        })
    }

    fn book(&mut self, status: CostStatus, amount: Decimal) -> DomainResult<()> {
        let bucket = match status {
            CostStatus::Actual | CostStatus::Accrued => &mut self.actual,
            CostStatus::Committed => &mut self.committed,
            CostStatus::Planned => &mut self.planned,
        };
        *bucket = bucket
            .checked_add(amount)
            .ok_or_else(|| DomainError::computation("cost total overflow"))?;
        Ok(())
    }
}

/// Per-target own totals after attribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    pub by_node: HashMap<WbsNodeId, CostTotals>,
    pub by_center: HashMap<CostCenterId, CostTotals>,
    /// Nodes with a forecast of their own as of the attribution date.
    pub forecasted: HashSet<WbsNodeId>,
    /// Costs with no node, or with a node outside the tree.
    pub unattributed: CostTotals,
}

impl Attribution {
    /// Own (non-recursive) totals of a node.
    pub fn own(&self, node_id: WbsNodeId) -> CostTotals {
        self.by_node.get(&node_id).copied().unwrap_or_default()
    }

    /// Subtree totals of a node from its children's subtree totals. Cost
    /// buckets add up; the forecast is the node's own when it has one.
    pub fn subtree(&self, node_id: WbsNodeId, children: &[CostTotals]) -> DomainResult<CostTotals> {
        let own = self.own(node_id);
        let mut sum = own;
        for child in children {
            sum = sum.checked_add(child)?;
        }
        if self.forecasted.contains(&node_id) {
            sum.forecast = own.forecast;
        }
        Ok(sum)
    }
}

/// Cost center totals compared with the budget in force.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CenterTotals {
    pub cost_center_id: CostCenterId,
    /// Subtree totals (the center and every descendant center).
    pub totals: CostTotals,
    /// Effective budget of the subtree.
    pub budget: Decimal,
    /// `budget - (actual + committed)`; negative when over budget.
    pub remaining: Decimal,
}

pub struct CostRollup<'a> {
    tree: &'a WbsTree,
    ledger: &'a AllocationLedger,
    forecasts: Option<&'a ForecastBook>,
}

impl<'a> CostRollup<'a> {
    pub fn new(tree: &'a WbsTree, ledger: &'a AllocationLedger) -> Self {
        Self {
            tree,
            ledger,
            forecasts: None,
        }
    }

    pub fn with_forecasts(mut self, forecasts: &'a ForecastBook) -> Self {
        self.forecasts = Some(forecasts);
        self
    }

    /// Attribute every cost dated on or before `as_of`.
    pub fn attribute(&self, as_of: DateTime<Utc>) -> DomainResult<Attribution> {
        let mut out = Attribution::default();

        for cost in self.ledger.costs().filter(|c| c.cost_date <= as_of) {
            let mut remainder = cost.amount;
            for allocation in self.ledger.allocations_for(cost.id) {
                remainder -= allocation.allocated_amount;
                let node = allocation.target_wbs_node_id.or(cost.wbs_node_id);
                self.book_node(&mut out, node, cost.cost_status, allocation.allocated_amount)?;
                out.by_center
                    .entry(allocation.target_cost_center_id)
                    .or_default()
                    .book(cost.cost_status, allocation.allocated_amount)?;
            }
            self.book_node(&mut out, cost.wbs_node_id, cost.cost_status, remainder)?;
            out.by_center
                .entry(cost.cost_center_id)
                .or_default()
                .book(cost.cost_status, remainder)?;
        }

        if let Some(book) = self.forecasts {
            for node_id in book.nodes() {
                if let Some(f) = book.latest_for_node(node_id, as_of) {
                    let slot = if self.tree.contains(node_id) {
                        out.forecasted.insert(node_id);
                        out.by_node.entry(node_id).or_default()
                    } else {
                        &mut out.unattributed
                    };
                    slot.forecast = slot
                        .forecast
                        .checked_add(f.estimate_at_completion)
                        .ok_or_else(|| DomainError::computation("forecast total overflow"))?;
                }
            }
        }

        if !out.unattributed.is_zero() {
            warn!(
                project_id = %self.tree.project_id(),
                actual = %out.unattributed.actual,
                committed = %out.unattributed.committed,
                "costs not attributable to any wbs node"
            );
        }
        Ok(out)
    }

    /// Subtree totals for every node of the tree, plus the unattributed bucket.
    pub fn subtree_totals(
        &self,
        as_of: DateTime<Utc>,
    ) -> DomainResult<(HashMap<WbsNodeId, CostTotals>, CostTotals)> {
        let attribution = self.attribute(as_of)?;
        let mut totals: HashMap<WbsNodeId, CostTotals> = HashMap::with_capacity(self.tree.len());
        for node_id in self.tree.post_order_all() {
            let children: Vec<CostTotals> = self
                .tree
                .child_ids(node_id)?
                .iter()
                .map(|child| totals.get(child).copied().unwrap_or_default())
                .collect();
            let sum = attribution.subtree(node_id, &children)?;
            totals.insert(node_id, sum);
        }
        Ok((totals, attribution.unattributed))
    }

    /// Totals of the subtree under `node_id`.
    pub fn node_totals(&self, node_id: WbsNodeId, as_of: DateTime<Utc>) -> DomainResult<CostTotals> {
        self.tree.get(node_id)?;
        let (totals, _) = self.subtree_totals(as_of)?;
        Ok(totals.get(&node_id).copied().unwrap_or_default())
    }

    /// Roll attributed costs up the cost-center hierarchy and compare each
    /// subtree with its effective budget.
    pub fn center_totals(
        &self,
        centers: &CostCenterHierarchy,
        budgets: &BudgetRegister,
        as_of: DateTime<Utc>,
    ) -> DomainResult<Vec<CenterTotals>> {
        let attribution = self.attribute(as_of)?;
        for center in attribution.by_center.keys() {
            if !centers.contains(*center) {
                warn!(
                    project_id = %self.tree.project_id(),
                    cost_center_id = %center,
                    "costs booked to an unknown cost center"
                );
            }
        }

        let mut done: HashMap<CostCenterId, CenterTotals> = HashMap::with_capacity(centers.len());
        let mut order = Vec::with_capacity(centers.len());
        for id in centers.post_order() {
            let center = centers.get(id)?;
            let mut totals = attribution.by_center.get(&id).copied().unwrap_or_default();
            let mut budget = budgets.effective_budget(id, center.budget_amount, as_of);
            for child in centers.children(id) {
                if let Some(c) = done.get(child) {
                    totals = totals.checked_add(&c.totals)?;
                    budget = budget
                        .checked_add(c.budget)
                        .ok_or_else(|| DomainError::computation("budget overflow"))?;
                }
            }
            let remaining = budget - totals.exposure()?;
            done.insert(
                id,
                CenterTotals {
                    cost_center_id: id,
                    totals,
                    budget,
                    remaining,
                },
            );
            order.push(id);
        }

        Ok(order.into_iter().filter_map(|id| done.remove(&id)).collect())
    }

    fn book_node(
        &self,
        out: &mut Attribution,
        node: Option<WbsNodeId>,
        status: CostStatus,
        amount: Decimal,
    ) -> DomainResult<()> {
        match node {
            Some(id) if self.tree.contains(id) => {
                out.by_node.entry(id).or_default().book(status, amount)
            }
            _ => out.unattributed.book(status, amount),
        }
    }
}
