//! Weighted progress roll-up over the WBS.
//!
//! - A leaf (no active children) takes its latest measurement as of the
//!   calculation date, or 0 when none exists. Milestones only count on
//!   nodes that have active children.
//! - A parent averages its active children, weighted by budget, else planned
//!   hours, else 1, plus its own milestones weighted by their `weight`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use buildledger_core::{
    DomainError, DomainResult, Entity, ONE_HUNDRED, SnapshotId, WbsNodeId, clamp_percentage,
    round_to,
};
use buildledger_wbs::{WbsNode, WbsTree};

use crate::measurement::ProgressMeasurement;
use crate::milestone::Milestone;
use crate::snapshot::{
    ChildProgressData, ContributionSource, ProgressContribution, WeightBasis, WeightedProgress,
};

/// Default number of decimal places kept on percentages.
pub const DEFAULT_PERCENTAGE_SCALE: u32 = 4;

/// Leaf-level progress records the aggregator reads.
pub trait ProgressInputs {
    /// Latest measurement for `node_id` with `measurement_date <= as_of`.
    fn latest_measurement(
        &self,
        node_id: WbsNodeId,
        as_of: DateTime<Utc>,
    ) -> Option<&ProgressMeasurement>;

    /// Milestones attached directly to `node_id`.
    fn milestones(&self, node_id: WbsNodeId) -> Vec<&Milestone>;
}

/// Weight a child contributes to its parent.
pub fn child_weight(node: &WbsNode) -> (Decimal, WeightBasis) {
    if node.budget_allocation > Decimal::ZERO {
        (node.budget_allocation, WeightBasis::Budget)
    } else if node.planned_hours > Decimal::ZERO {
        (node.planned_hours, WeightBasis::PlannedHours)
    } else {
        (Decimal::ONE, WeightBasis::Equal)
    }
}

/// Result of evaluating one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeProgress {
    pub node_id: WbsNodeId,
    pub total_weight: Decimal,
    pub completed_weight: Decimal,
    pub percentage: Decimal,
    pub contributions: Vec<ProgressContribution>,
}

pub struct ProgressAggregator<'a, I: ?Sized> {
    tree: &'a WbsTree,
    inputs: &'a I,
    scale: u32,
}

impl<'a, I> ProgressAggregator<'a, I>
where
    I: ProgressInputs + ?Sized,
{
    pub fn new(tree: &'a WbsTree, inputs: &'a I) -> Self {
        Self {
            tree,
            inputs,
            scale: DEFAULT_PERCENTAGE_SCALE,
        }
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    /// Evaluate one node, reading already-computed child percentages from
    /// `child_progress`. A child without a value is a computation error.
    pub fn evaluate<F>(
        &self,
        node_id: WbsNodeId,
        as_of: DateTime<Utc>,
        child_progress: F,
    ) -> DomainResult<NodeProgress>
    where
        F: Fn(WbsNodeId) -> Option<Decimal>,
    {
        let children = self.tree.active_children(node_id)?;
        let mut contributions = Vec::with_capacity(children.len() + 1);

        if children.is_empty() {
            let term = match self.inputs.latest_measurement(node_id, as_of) {
                Some(m) => ProgressContribution {
                    source: ContributionSource::Measurement(Some(*m.id())),
                    weight: Decimal::ONE,
                    basis: WeightBasis::Measurement,
                    progress: m.actual_progress(),
                },
                None => ProgressContribution {
                    source: ContributionSource::Measurement(None),
                    weight: Decimal::ONE,
                    basis: WeightBasis::Measurement,
                    progress: Decimal::ZERO,
                },
            };
            contributions.push(term);
        } else {
            for child in children {
                let progress = child_progress(child.id).ok_or_else(|| {
                    DomainError::computation(format!(
                        "child {} of node {} has no computed progress",
                        child.id, node_id
                    ))
                })?;
                let (weight, basis) = child_weight(child);
                contributions.push(ProgressContribution {
                    source: ContributionSource::Child(child.id),
                    weight,
                    basis,
                    progress,
                });
            }
            contributions.extend(
                self.inputs
                    .milestones(node_id)
                    .into_iter()
                    .map(milestone_term),
            );
        }

        self.combine(node_id, contributions)
    }

    /// Full recursive roll-up of the subtree under `node_id`.
    pub fn weighted_progress(
        &self,
        node_id: WbsNodeId,
        as_of: DateTime<Utc>,
    ) -> DomainResult<NodeProgress> {
        let order = self.tree.post_order(node_id)?;
        let mut done: HashMap<WbsNodeId, Decimal> = HashMap::with_capacity(order.len());
        let mut last = None;
        for id in order {
            let result = self.evaluate(id, as_of, |child| done.get(&child).copied())?;
            done.insert(id, result.percentage);
            last = Some(result);
        }
        last.ok_or_else(|| DomainError::not_found("wbs node", node_id))
    }

    /// Package a result as a new snapshot.
    pub fn snapshot(
        &self,
        progress: &NodeProgress,
        calculation_date: DateTime<Utc>,
        calculated_by: impl Into<String>,
    ) -> WeightedProgress {
        WeightedProgress {
            id: SnapshotId::new(),
            project_id: self.tree.project_id(),
            wbs_node_id: progress.node_id,
            calculation_date,
            total_weight: progress.total_weight,
            completed_weight: progress.completed_weight,
            weighted_progress_percentage: progress.percentage,
            child_progress_data: ChildProgressData::new(progress.contributions.clone()),
            calculated_by: calculated_by.into(),
            created_at: Utc::now(),
        }
    }

    fn combine(
        &self,
        node_id: WbsNodeId,
        contributions: Vec<ProgressContribution>,
    ) -> DomainResult<NodeProgress> {
        let overflow = || DomainError::computation(format!("progress overflow at node {node_id}"));

        let mut total = Decimal::ZERO;
        let mut weighted = Decimal::ZERO;
        for c in &contributions {
            total = total.checked_add(c.weight).ok_or_else(overflow)?;
            let term = c.weight.checked_mul(c.progress).ok_or_else(overflow)?;
            weighted = weighted.checked_add(term).ok_or_else(overflow)?;
        }

        let percentage = if total.is_zero() {
            Decimal::ZERO
        } else {
            let raw = weighted.checked_div(total).ok_or_else(overflow)?;
            clamp_percentage(round_to(raw, self.scale))
        };

        Ok(NodeProgress {
            node_id,
            total_weight: total,
            completed_weight: weighted / ONE_HUNDRED,
            percentage,
            contributions,
        })
    }
}

fn milestone_term(milestone: &Milestone) -> ProgressContribution {
    ProgressContribution {
        source: ContributionSource::Milestone(*milestone.id()),
        weight: milestone.weight(),
        basis: WeightBasis::MilestoneWeight,
        progress: milestone.progress(),
    }
}
