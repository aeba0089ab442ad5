//! One recompute pass over the dirty part of a project.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use buildledger_core::{DomainError, DomainResult, ProjectId, WbsNodeId};
use buildledger_costing::{Attribution, CostRollup, CostTotals};
use buildledger_evm::{EarnedValueMetrics, EvmEngine, EvmInputs};
use buildledger_progress::{NodeProgress, ProgressAggregator, ProgressBook, WeightedProgress};
use buildledger_wbs::WbsTree;

use crate::config::RecomputeConfig;
use crate::inputs::ProjectInputs;
use crate::plan::RecomputePlan;
use crate::state::DirtyTracker;

/// Everything computed for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResult {
    pub node_id: WbsNodeId,
    pub progress: NodeProgress,
    pub snapshot: WeightedProgress,
    /// Subtree cost totals.
    pub costs: CostTotals,
    pub budget_at_completion: Decimal,
    pub planned_value: Decimal,
    pub metrics: EarnedValueMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub node_id: WbsNodeId,
    pub level: u32,
    pub error: DomainError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub project_id: ProjectId,
    pub as_of: DateTime<Utc>,
    /// Nodes recomputed successfully, in execution order.
    pub computed: Vec<WbsNodeId>,
    pub failures: Vec<NodeFailure>,
    /// Costs that could not be placed on any node of the tree.
    pub unattributed: CostTotals,
}

impl PassReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failure(&self, node_id: WbsNodeId) -> Option<&NodeFailure> {
        self.failures.iter().find(|f| f.node_id == node_id)
    }
}

pub struct RecomputePass<'a> {
    tree: &'a WbsTree,
    inputs: &'a ProjectInputs,
    config: &'a RecomputeConfig,
    pool: Option<&'a rayon::ThreadPool>,
}

impl<'a> RecomputePass<'a> {
    pub fn new(tree: &'a WbsTree, inputs: &'a ProjectInputs, config: &'a RecomputeConfig) -> Self {
        Self {
            tree,
            inputs,
            config,
            pool: None,
        }
    }

    /// Run waves on `pool` instead of the global rayon pool.
    pub fn with_pool(mut self, pool: &'a rayon::ThreadPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Recompute every dirty node. Clean nodes are read from `cache`, which
    /// receives the fresh results. Cached results only hold for the date
    /// they were computed at, so a pass at another date recomputes the
    /// whole tree. Per-node failures are reported, not returned; the error
    /// path is reserved for inconsistent state.
    pub fn run(
        &self,
        tracker: &mut DirtyTracker,
        cache: &mut HashMap<WbsNodeId, NodeResult>,
        as_of: DateTime<Utc>,
    ) -> DomainResult<PassReport> {
        let project_id = self.tree.project_id();
        let stale = cache
            .iter()
            .any(|(id, r)| tracker.is_clean(*id) && r.metrics.measurement_date != as_of);
        if stale {
            let dirtied = tracker.mark_all_dirty(self.tree);
            info!(
                project_id = %project_id,
                as_of = %as_of,
                dirtied = dirtied.len(),
                "as-of date moved, cached results invalidated"
            );
        }
        let plan = RecomputePlan::build(self.tree, tracker)?;
        let attribution = CostRollup::new(self.tree, &self.inputs.costs)
            .with_forecasts(&self.inputs.forecasts)
            .attribute(as_of)?;
        let aggregator = ProgressAggregator::new(self.tree, &self.inputs.progress)
            .with_scale(self.config.percentage_scale);
        let engine = EvmEngine::new().with_ratio_scale(self.config.ratio_scale);

        info!(
            project_id = %project_id,
            dirty = plan.node_count(),
            waves = plan.waves().len(),
            "recompute pass started"
        );

        let mut report = PassReport {
            project_id,
            as_of,
            computed: Vec::with_capacity(plan.node_count()),
            failures: Vec::new(),
            unattributed: attribution.unattributed,
        };
        let mut failed: HashSet<WbsNodeId> = HashSet::new();

        for (level, wave) in plan.waves() {
            for id in wave {
                tracker.start(*id)?;
            }

            let ctx = NodeContext {
                tree: self.tree,
                inputs: self.inputs,
                config: self.config,
                aggregator: &aggregator,
                engine: &engine,
                attribution: &attribution,
                cache: &*cache,
                failed: &failed,
                as_of,
            };
            let results: Vec<(WbsNodeId, DomainResult<NodeResult>)> =
                if self.config.parallel && wave.len() > 1 {
                    let run = || -> Vec<(WbsNodeId, DomainResult<NodeResult>)> {
                        wave.par_iter().map(|id| (*id, ctx.compute(*id))).collect()
                    };
                    match self.pool {
                        Some(pool) => pool.install(run),
                        None => run(),
                    }
                } else {
                    wave.iter().map(|id| (*id, ctx.compute(*id))).collect()
                };

            for (id, result) in results {
                match result {
                    Ok(result) => {
                        debug!(
                            project_id = %project_id,
                            node_id = %id,
                            progress = %result.progress.percentage,
                            actual_cost = %result.costs.actual,
                            "node recomputed"
                        );
                        tracker.finish(id)?;
                        cache.insert(id, result);
                        report.computed.push(id);
                    }
                    Err(error) => {
                        warn!(
                            project_id = %project_id,
                            node_id = %id,
                            level = *level,
                            error = %error,
                            kind = error.kind(),
                            "node recompute failed"
                        );
                        tracker.fail(id)?;
                        failed.insert(id);
                        report.failures.push(NodeFailure {
                            node_id: id,
                            level: *level,
                            error,
                        });
                    }
                }
            }
        }

        info!(
            project_id = %project_id,
            computed = report.computed.len(),
            failed = report.failures.len(),
            "recompute pass finished"
        );
        Ok(report)
    }
}

/// Read-only view shared by the workers of one wave.
struct NodeContext<'a> {
    tree: &'a WbsTree,
    inputs: &'a ProjectInputs,
    config: &'a RecomputeConfig,
    aggregator: &'a ProgressAggregator<'a, ProgressBook>,
    engine: &'a EvmEngine,
    attribution: &'a Attribution,
    cache: &'a HashMap<WbsNodeId, NodeResult>,
    failed: &'a HashSet<WbsNodeId>,
    as_of: DateTime<Utc>,
}

impl NodeContext<'_> {
    fn compute(&self, node_id: WbsNodeId) -> DomainResult<NodeResult> {
        let node = self.tree.get(node_id)?;
        let children = self.tree.child_ids(node_id)?;

        if let Some(child) = children.iter().find(|c| self.failed.contains(*c)) {
            return Err(DomainError::computation(format!(
                "child {child} of node {node_id} failed"
            )));
        }

        let progress = self.aggregator.evaluate(node_id, self.as_of, |child| {
            self.cache.get(&child).map(|r| r.progress.percentage)
        })?;

        let overflow = || DomainError::computation(format!("roll-up overflow at node {node_id}"));
        let mut child_costs = Vec::with_capacity(children.len());
        let mut child_bac = Decimal::ZERO;
        let mut child_pv = Decimal::ZERO;
        let mut active_children = 0usize;
        for child in children {
            let result = self.cache.get(child).ok_or_else(|| {
                DomainError::computation(format!(
                    "child {child} of node {node_id} has no computed result"
                ))
            })?;
            child_costs.push(result.costs);
            if self.tree.get(*child)?.is_active {
                active_children += 1;
                child_bac = child_bac
                    .checked_add(result.budget_at_completion)
                    .ok_or_else(overflow)?;
                child_pv = child_pv
                    .checked_add(result.planned_value)
                    .ok_or_else(overflow)?;
            }
        }

        let costs = self.attribution.subtree(node_id, &child_costs)?;

        let budget_at_completion = if node.budget_allocation > Decimal::ZERO {
            node.budget_allocation
        } else {
            child_bac
        };
        let planned_value = if self.inputs.baseline.has_curve(node_id) || active_children == 0 {
            self.inputs.baseline.planned_value(node_id, self.as_of)?
        } else {
            child_pv
        };

        let metrics = self.engine.compute(
            self.tree.project_id(),
            node_id,
            self.as_of,
            &EvmInputs {
                budget_at_completion,
                planned_value,
                actual_cost: costs.actual,
                progress_percentage: progress.percentage,
                etc: self.inputs.etc_for(node_id, self.config.default_etc_method),
            },
        )?;
        let snapshot = self
            .aggregator
            .snapshot(&progress, self.as_of, self.config.calculated_by.clone());

        Ok(NodeResult {
            node_id,
            progress,
            snapshot,
            costs,
            budget_at_completion,
            planned_value,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildledger_core::{ActualCostId, CostCenterId, CostCodeId, MeasurementId, UserId};
    use buildledger_costing::{ActualCost, CostStatus, CostType};
    use buildledger_progress::{NewMeasurement, ProgressMeasurement, ProgressMethod};
    use buildledger_wbs::{WbsNode, WbsNodeType};
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn node(project_id: ProjectId, parent: Option<&WbsNode>, order: i32, budget: i64) -> WbsNode {
        WbsNode {
            id: WbsNodeId::new(),
            project_id,
            parent_id: parent.map(|p| p.id),
            code: format!("R{order}"),
            name: format!("r{order}"),
            description: None,
            node_type: WbsNodeType::WorkPackage,
            level: parent.map(|p| p.level + 1).unwrap_or(0),
            sequence_order: order,
            budget_allocation: Decimal::from(budget),
            planned_hours: Decimal::ZERO,
            responsible_user_id: None,
            start_date: None,
            end_date: None,
            is_active: true,
        }
    }

    fn measure(p: ProjectId, node_id: WbsNodeId, pct: i64) -> ProgressMeasurement {
        measure_on(p, node_id, pct, day(1))
    }

    fn measure_on(p: ProjectId, node_id: WbsNodeId, pct: i64, date: DateTime<Utc>) -> ProgressMeasurement {
        ProgressMeasurement::record(NewMeasurement {
            id: MeasurementId::new(),
            project_id: p,
            wbs_node_id: Some(node_id),
            task_id: None,
            measurement_date: date,
            progress_method: ProgressMethod::PercentageComplete,
            planned_progress: Decimal::from(pct),
            actual_progress: Some(Decimal::from(pct)),
            units_planned: None,
            units_completed: None,
            measured_by: UserId::new(),
            verified_by: None,
            notes: None,
            created_at: date,
        })
        .unwrap()
    }

    fn actual(p: ProjectId, node_id: WbsNodeId, amount: i64) -> ActualCost {
        ActualCost {
            id: ActualCostId::new(),
            project_id: p,
            cost_center_id: CostCenterId::new(),
            cost_code_id: CostCodeId::new(),
            wbs_node_id: Some(node_id),
            task_id: None,
            cost_type: CostType::Labor,
            cost_status: CostStatus::Actual,
            amount: Decimal::from(amount),
            cost_date: day(1),
            reference_number: None,
            reference_type: Some("Timesheet".to_string()),
            description: None,
            created_by: UserId::new(),
            created_at: day(1),
        }
    }

    /// root(1000) -> a(600, 50%, AC 250, PV 400), b(400, 100%, AC 500, PV 400)
    fn project() -> (WbsTree, ProjectInputs, [WbsNodeId; 3]) {
        let p = ProjectId::new();
        let root = node(p, None, 1, 1000);
        let a = node(p, Some(&root), 1, 600);
        let b = node(p, Some(&root), 2, 400);
        let ids = [root.id, a.id, b.id];
        let tree = WbsTree::from_nodes(p, vec![root, a, b]).unwrap();

        let mut inputs = ProjectInputs::new(p);
        inputs.progress.record_measurement(measure(p, ids[1], 50)).unwrap();
        inputs.progress.record_measurement(measure(p, ids[2], 100)).unwrap();
        inputs.costs.post_cost(actual(p, ids[1], 250)).unwrap();
        inputs.costs.post_cost(actual(p, ids[2], 500)).unwrap();
        inputs.baseline.set_point(ids[1], day(0), Decimal::from(400)).unwrap();
        inputs.baseline.set_point(ids[2], day(0), Decimal::from(400)).unwrap();
        (tree, inputs, ids)
    }

    fn run(
        tree: &WbsTree,
        inputs: &ProjectInputs,
        config: &RecomputeConfig,
        tracker: &mut DirtyTracker,
        cache: &mut HashMap<WbsNodeId, NodeResult>,
    ) -> PassReport {
        RecomputePass::new(tree, inputs, config)
            .run(tracker, cache, day(2))
            .unwrap()
    }

    #[test]
    fn full_pass_rolls_everything_up() {
        let (tree, inputs, [root, a, _]) = project();
        let mut tracker = DirtyTracker::new();
        let mut cache = HashMap::new();
        let report = run(&tree, &inputs, &RecomputeConfig::default(), &mut tracker, &mut cache);

        assert!(report.is_complete());
        assert_eq!(report.computed.len(), 3);
        assert_eq!(*report.computed.last().unwrap(), root);

        let r = &cache[&root];
        assert_eq!(r.progress.percentage, Decimal::from(70));
        assert_eq!(r.costs.actual, Decimal::from(750));
        assert_eq!(r.planned_value, Decimal::from(800));
        assert_eq!(r.metrics.earned_value, Decimal::from(700));
        assert_eq!(cache[&a].metrics.earned_value, Decimal::from(300));
        assert!(tracker.dirty_nodes(&tree).is_empty());
    }

    #[test]
    fn missing_pv_fails_the_leaf_and_its_ancestors_only() {
        let (tree, mut inputs, [root, a, b]) = project();
        inputs.baseline = buildledger_evm::Baseline::new(tree.project_id());
        inputs.baseline.set_point(b, day(0), Decimal::from(400)).unwrap();

        let mut tracker = DirtyTracker::new();
        let mut cache = HashMap::new();
        let report = run(&tree, &inputs, &RecomputeConfig::default(), &mut tracker, &mut cache);

        assert!(matches!(report.failure(a).unwrap().error, DomainError::Computation(_)));
        let root_failure = report.failure(root).unwrap();
        assert!(root_failure.error.to_string().contains(&a.to_string()));
        assert!(cache.contains_key(&b));
        assert_eq!(tracker.state(b), crate::state::NodeState::Clean);
        assert_eq!(tracker.dirty_nodes(&tree).len(), 2);
    }

    #[test]
    fn recomputing_without_new_inputs_is_idempotent() {
        let (tree, inputs, [root, a, b]) = project();
        let config = RecomputeConfig::default().with_parallel(false);
        let mut tracker = DirtyTracker::new();
        let mut cache = HashMap::new();
        run(&tree, &inputs, &config, &mut tracker, &mut cache);
        let before = cache[&root].clone();

        tracker.mark_dirty(&tree, a).unwrap();
        let report = run(&tree, &inputs, &config, &mut tracker, &mut cache);
        assert_eq!(report.computed, vec![a, root]);
        assert!(!report.computed.contains(&b));

        let after = &cache[&root];
        assert!(after.snapshot.same_result(&before.snapshot));
        assert_eq!(after.metrics, before.metrics);
        assert_eq!(after.costs, before.costs);
    }

    #[test]
    fn clean_project_has_nothing_to_do() {
        let (tree, inputs, _) = project();
        let config = RecomputeConfig::default();
        let mut tracker = DirtyTracker::new();
        let mut cache = HashMap::new();
        run(&tree, &inputs, &config, &mut tracker, &mut cache);
        let report = run(&tree, &inputs, &config, &mut tracker, &mut cache);
        assert!(report.computed.is_empty());
        assert!(report.is_complete());
    }

    #[test]
    fn a_later_date_picks_up_records_dated_after_the_previous_pass() {
        let (tree, mut inputs, [root, a, b]) = project();
        let config = RecomputeConfig::default().with_parallel(false);
        inputs
            .progress
            .record_measurement(measure_on(tree.project_id(), a, 90, day(5)))
            .unwrap();
        let mut late_cost = actual(tree.project_id(), b, 100);
        late_cost.cost_date = day(5);
        inputs.costs.post_cost(late_cost).unwrap();

        let mut tracker = DirtyTracker::new();
        let mut cache = HashMap::new();
        RecomputePass::new(&tree, &inputs, &config)
            .run(&mut tracker, &mut cache, day(2))
            .unwrap();
        assert_eq!(cache[&root].progress.percentage, Decimal::from(70));
        assert_eq!(cache[&root].costs.actual, Decimal::from(750));

        let report = RecomputePass::new(&tree, &inputs, &config)
            .run(&mut tracker, &mut cache, day(10))
            .unwrap();
        assert_eq!(report.computed.len(), 3);
        // a: 90% of 600, b: 100% of 400.
        assert_eq!(cache[&root].progress.percentage, Decimal::from(94));
        assert_eq!(cache[&root].costs.actual, Decimal::from(850));
        assert_eq!(cache[&root].metrics.measurement_date, day(10));

        let direct = ProgressAggregator::new(&tree, &inputs.progress)
            .weighted_progress(root, day(10))
            .unwrap();
        assert_eq!(cache[&root].progress.percentage, direct.percentage);

        // Same date again: nothing left to do.
        let report = RecomputePass::new(&tree, &inputs, &config)
            .run(&mut tracker, &mut cache, day(10))
            .unwrap();
        assert!(report.computed.is_empty());
    }

    #[test]
    fn dedicated_pool_matches_sequential_results() {
        let (tree, inputs, [root, ..]) = project();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();

        let mut seq_cache = HashMap::new();
        run(
            &tree,
            &inputs,
            &RecomputeConfig::default().with_parallel(false),
            &mut DirtyTracker::new(),
            &mut seq_cache,
        );

        let config = RecomputeConfig::default();
        let mut par_cache = HashMap::new();
        RecomputePass::new(&tree, &inputs, &config)
            .with_pool(&pool)
            .run(&mut DirtyTracker::new(), &mut par_cache, day(2))
            .unwrap();

        assert!(par_cache[&root].snapshot.same_result(&seq_cache[&root].snapshot));
        assert_eq!(par_cache[&root].metrics, seq_cache[&root].metrics);
    }
}
