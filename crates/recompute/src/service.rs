//! Per-project serialization of edits and recompute passes.
//!
//! Each project owns one mutex; edits, ingestion and passes of a project take
//! it, so a pass never observes a half-applied change. Projects do not share
//! state and proceed concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use buildledger_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, ProjectId, WbsNodeId,
};
use buildledger_events::{Event, EventEnvelope};
use buildledger_wbs::WbsTree;

use crate::change::ProjectChange;
use crate::config::RecomputeConfig;
use crate::error::RecomputeError;
use crate::inputs::ProjectInputs;
use crate::pass::{NodeResult, PassReport, RecomputePass};
use crate::sink::{ResultBatch, ResultSink};
use crate::state::{DirtyTracker, NodeState};

/// What happened to an ingested envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Applied; lists the nodes that became dirty.
    Applied(Vec<WbsNodeId>),
    /// Sequence number already applied; nothing changed.
    Duplicate,
}

struct ProjectState {
    tree: WbsTree,
    inputs: ProjectInputs,
    tracker: DirtyTracker,
    cache: HashMap<WbsNodeId, NodeResult>,
    last_sequence: Option<u64>,
}

pub struct RecomputeService {
    config: RecomputeConfig,
    pool: Option<rayon::ThreadPool>,
    projects: RwLock<HashMap<ProjectId, Arc<Mutex<ProjectState>>>>,
    sink: Arc<dyn ResultSink>,
}

impl RecomputeService {
    /// Builds a dedicated rayon pool when `worker_threads` is set; otherwise
    /// passes run on the global pool.
    pub fn new(config: RecomputeConfig, sink: Arc<dyn ResultSink>) -> Result<Self, RecomputeError> {
        let pool = if config.parallel && config.worker_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.worker_threads)
                .thread_name(|i| format!("recompute-{i}"))
                .build()
                .map_err(|e| RecomputeError::ThreadPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };

        info!(
            parallel = config.parallel,
            worker_threads = config.worker_threads,
            percentage_scale = config.percentage_scale,
            ratio_scale = config.ratio_scale,
            "recompute service started"
        );

        Ok(Self {
            config,
            pool,
            projects: RwLock::new(HashMap::new()),
            sink,
        })
    }

    pub fn config(&self) -> &RecomputeConfig {
        &self.config
    }

    /// Register a project. Every node starts dirty.
    pub fn register_project(&self, tree: WbsTree, inputs: ProjectInputs) -> Result<(), RecomputeError> {
        let project_id = tree.project_id();
        if inputs.project_id() != project_id {
            return Err(DomainError::validation(format!(
                "inputs belong to project {}, not {project_id}",
                inputs.project_id()
            ))
            .into());
        }

        let mut projects = self
            .projects
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if projects.contains_key(&project_id) {
            return Err(
                DomainError::conflict(format!("project {project_id} is already registered")).into(),
            );
        }

        info!(project_id = %project_id, nodes = tree.len(), "project registered");
        projects.insert(
            project_id,
            Arc::new(Mutex::new(ProjectState {
                tree,
                inputs,
                tracker: DirtyTracker::new(),
                cache: HashMap::new(),
                last_sequence: None,
            })),
        );
        Ok(())
    }

    pub fn project_ids(&self) -> Vec<ProjectId> {
        let mut ids: Vec<ProjectId> = self
            .projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    /// Apply a change outside any envelope stream. Returns the nodes that
    /// became dirty.
    pub fn apply_change(&self, change: ProjectChange) -> Result<Vec<WbsNodeId>, RecomputeError> {
        let project = self.project(project_of(&change))?;
        let mut state = lock(&project);
        Ok(state.apply(change)?)
    }

    /// Apply an enveloped change. Sequence numbers start at 1 and must follow
    /// each other without gaps; redeliveries of applied numbers are ignored.
    /// A rejected change does not advance the sequence.
    pub fn ingest(&self, envelope: EventEnvelope<ProjectChange>) -> Result<IngestOutcome, RecomputeError> {
        if !envelope.is_consistent() {
            return Err(DomainError::validation(format!(
                "envelope for project {} carries a change of project {}",
                envelope.project_id(),
                project_of(envelope.payload())
            ))
            .into());
        }

        let project_id = envelope.project_id();
        let sequence = envelope.sequence_number();
        let project = self.project(project_id)?;
        let mut state = lock(&project);

        let expected = state.last_sequence.map_or(1, |last| last + 1);
        if sequence < expected {
            debug!(project_id = %project_id, sequence, "duplicate change ignored");
            return Ok(IngestOutcome::Duplicate);
        }
        if sequence > expected {
            return Err(RecomputeError::NonMonotonicSequence {
                project_id,
                expected,
                actual: sequence,
            });
        }

        let dirtied = state.apply(envelope.into_payload())?;
        state.last_sequence = Some(sequence);
        Ok(IngestOutcome::Applied(dirtied))
    }

    /// Recompute every dirty node of `project_id` as of `as_of` and publish
    /// the fresh results.
    pub fn recompute(&self, project_id: ProjectId, as_of: DateTime<Utc>) -> Result<PassReport, RecomputeError> {
        let project = self.project(project_id)?;
        let mut guard = lock(&project);
        let ProjectState {
            tree,
            inputs,
            tracker,
            cache,
            ..
        } = &mut *guard;

        let mut pass = RecomputePass::new(tree, inputs, &self.config);
        if let Some(pool) = &self.pool {
            pass = pass.with_pool(pool);
        }
        let report = pass.run(tracker, cache, as_of)?;

        let batch = self.batch(&report, cache);
        if !batch.is_empty() {
            self.sink.publish(&batch)?;
            debug!(
                project_id = %project_id,
                snapshots = batch.progress.len(),
                forecasts = batch.forecasts.len(),
                "results published"
            );
        }
        Ok(report)
    }

    pub fn node_state(&self, project_id: ProjectId, node_id: WbsNodeId) -> Result<NodeState, RecomputeError> {
        let project = self.project(project_id)?;
        let state = lock(&project);
        state.tree.get(node_id)?;
        Ok(state.tracker.state(node_id))
    }

    pub fn dirty_nodes(&self, project_id: ProjectId) -> Result<Vec<WbsNodeId>, RecomputeError> {
        let project = self.project(project_id)?;
        let state = lock(&project);
        Ok(state.tracker.dirty_nodes(&state.tree))
    }

    /// Last successful result of a node, if it has ever been computed.
    pub fn result(&self, project_id: ProjectId, node_id: WbsNodeId) -> Result<Option<NodeResult>, RecomputeError> {
        let project = self.project(project_id)?;
        let state = lock(&project);
        state.tree.get(node_id)?;
        Ok(state.cache.get(&node_id).cloned())
    }

    /// A copy of the project's current tree.
    pub fn tree(&self, project_id: ProjectId) -> Result<WbsTree, RecomputeError> {
        let project = self.project(project_id)?;
        let state = lock(&project);
        Ok(state.tree.clone())
    }

    fn project(&self, project_id: ProjectId) -> Result<Arc<Mutex<ProjectState>>, RecomputeError> {
        self.projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&project_id)
            .cloned()
            .ok_or(RecomputeError::UnknownProject(project_id))
    }

    fn batch(&self, report: &PassReport, cache: &HashMap<WbsNodeId, NodeResult>) -> ResultBatch {
        let mut batch = ResultBatch {
            project_id: report.project_id,
            as_of: report.as_of,
            progress: Vec::with_capacity(report.computed.len()),
            metrics: Vec::with_capacity(report.computed.len()),
            forecasts: Vec::new(),
        };
        for result in report.computed.iter().filter_map(|id| cache.get(id)) {
            batch.progress.push(result.snapshot.clone());
            batch.metrics.push(result.metrics.clone());
            if !result.metrics.estimate_at_completion.is_defined() {
                continue;
            }
            match result.metrics.to_forecast(
                result.costs.committed,
                self.config.forecast_confidence,
                self.config.calculated_by.clone(),
            ) {
                Ok(forecast) => batch.forecasts.push(forecast),
                Err(error) => warn!(
                    project_id = %report.project_id,
                    node_id = %result.node_id,
                    error = %error,
                    "forecast not derived"
                ),
            }
        }
        batch
    }
}

fn lock(project: &Mutex<ProjectState>) -> MutexGuard<'_, ProjectState> {
    project.lock().unwrap_or_else(PoisonError::into_inner)
}

fn project_of(change: &ProjectChange) -> ProjectId {
    change.project_id()
}

impl ProjectState {
    /// Apply one change atomically and dirty the nodes it affects.
    fn apply(&mut self, change: ProjectChange) -> DomainResult<Vec<WbsNodeId>> {
        let project_id = self.tree.project_id();
        let touched: Vec<WbsNodeId> = match change {
            ProjectChange::MeasurementRecorded { measurement, .. } => {
                let node = measurement.wbs_node_id();
                if let Some(id) = node {
                    self.tree.get(id)?;
                }
                self.inputs.progress.record_measurement(measurement)?;
                node.into_iter().collect()
            }
            ProjectChange::MilestonePlanned { milestone, .. } => {
                let node = milestone.wbs_node_id;
                if let Some(id) = node {
                    self.tree.get(id)?;
                }
                self.inputs.progress.add_milestone(milestone)?;
                node.into_iter().collect()
            }
            ProjectChange::MilestoneStatusChanged {
                milestone_id,
                status,
                occurred_at,
                ..
            } => self
                .inputs
                .progress
                .transition_milestone(milestone_id, status, occurred_at)?
                .into_iter()
                .collect(),
            ProjectChange::CostPosted { cost, allocations, .. } => {
                let mut touched: Vec<WbsNodeId> = cost.wbs_node_id.into_iter().collect();
                touched.extend(allocations.iter().filter_map(|a| a.target_wbs_node_id));
                if allocations.is_empty() {
                    self.inputs.costs.post_cost(cost)?;
                } else {
                    let mut ledger = self.inputs.costs.clone();
                    ledger.post_cost(cost)?;
                    ledger.allocate_all(allocations)?;
                    self.inputs.costs = ledger;
                }
                touched
            }
            ProjectChange::CostsAllocated { allocations, .. } => {
                let mut touched = Vec::new();
                for allocation in &allocations {
                    touched.extend(self.inputs.costs.cost(allocation.actual_cost_id)?.wbs_node_id);
                    touched.extend(allocation.target_wbs_node_id);
                }
                self.inputs.costs.allocate_all(allocations)?;
                touched
            }
            ProjectChange::ForecastRecorded { forecast, .. } => {
                let node = forecast.wbs_node_id;
                self.inputs.forecasts.record(forecast)?;
                node.into_iter().collect()
            }
            ProjectChange::BaselineChanged {
                wbs_node_id,
                points,
                ..
            } => {
                self.tree.get(wbs_node_id)?;
                let mut baseline = self.inputs.baseline.clone();
                for point in points {
                    baseline.set_point(wbs_node_id, point.date, point.cumulative_pv)?;
                }
                self.inputs.baseline = baseline;
                vec![wbs_node_id]
            }
            ProjectChange::StructureChanged {
                command,
                expected_version,
                ..
            } => {
                expected_version.check(self.tree.version())?;
                let events = self.tree.execute(&command)?;
                let mut touched = Vec::new();
                for event in &events {
                    for removed in event.removed_nodes() {
                        self.tracker.forget(*removed);
                        self.cache.remove(removed);
                        self.inputs.forget_node(*removed);
                    }
                    touched.extend(event.affected_nodes());
                }
                touched
            }
        };

        let mut dirtied = Vec::new();
        for id in touched {
            // Costs may name nodes outside the tree; they stay unattributed.
            if self.tree.contains(id) {
                dirtied.extend(self.tracker.mark_dirty(&self.tree, id)?);
            }
        }
        debug!(project_id = %project_id, dirtied = dirtied.len(), "change applied");
        Ok(dirtied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::InMemoryResultSink;
    use buildledger_core::{
        ActualCostId, CostCenterId, CostCodeId, Entity, ExpectedVersion, MeasurementId,
        MilestoneId, UserId,
    };
    use buildledger_costing::{ActualCost, CostStatus, CostType};
    use buildledger_evm::PvPoint;
    use buildledger_progress::{
        Milestone, MilestoneStatus, NewMeasurement, ProgressMeasurement, ProgressMethod,
    };
    use buildledger_wbs::{InsertNode, MoveNode, NewWbsNode, WbsCommand, WbsNode, WbsNodeType};
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn node(project_id: ProjectId, parent: Option<&WbsNode>, order: i32, budget: i64) -> WbsNode {
        WbsNode {
            id: WbsNodeId::new(),
            project_id,
            parent_id: parent.map(|p| p.id),
            code: format!("N{order}"),
            name: format!("n{order}"),
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

    fn measurement(p: ProjectId, node_id: WbsNodeId, pct: i64, on: DateTime<Utc>) -> ProgressMeasurement {
        ProgressMeasurement::record(NewMeasurement {
            id: MeasurementId::new(),
            project_id: p,
            wbs_node_id: Some(node_id),
            task_id: None,
            measurement_date: on,
            progress_method: ProgressMethod::PercentageComplete,
            planned_progress: Decimal::from(pct),
            actual_progress: Some(Decimal::from(pct)),
            units_planned: None,
            units_completed: None,
            measured_by: UserId::new(),
            verified_by: None,
            notes: None,
            created_at: on,
        })
        .unwrap()
    }

    fn cost(p: ProjectId, node_id: Option<WbsNodeId>, amount: i64) -> ActualCost {
        ActualCost {
            id: ActualCostId::new(),
            project_id: p,
            cost_center_id: CostCenterId::new(),
            cost_code_id: CostCodeId::new(),
            wbs_node_id: node_id,
            task_id: None,
            cost_type: CostType::Material,
            cost_status: CostStatus::Actual,
            amount: Decimal::from(amount),
            cost_date: day(1),
            reference_number: None,
            reference_type: Some("Invoice".to_string()),
            description: None,
            created_by: UserId::new(),
            created_at: day(1),
        }
    }

    struct Fixture {
        service: RecomputeService,
        sink: Arc<InMemoryResultSink>,
        project_id: ProjectId,
        root: WbsNodeId,
        a: WbsNodeId,
        b: WbsNodeId,
        a1: WbsNodeId,
    }

    /// root(1000) -> a(600) -> a1(600); root -> b(400). PV curves on leaves.
    fn fixture(config: RecomputeConfig) -> Fixture {
        let p = ProjectId::new();
        let root = node(p, None, 1, 1000);
        let a = node(p, Some(&root), 1, 600);
        let b = node(p, Some(&root), 2, 400);
        let a1 = node(p, Some(&a), 1, 600);
        let (root_id, a_id, b_id, a1_id) = (root.id, a.id, b.id, a1.id);
        let tree = WbsTree::from_nodes(p, vec![root, a, b, a1]).unwrap();

        let mut inputs = ProjectInputs::new(p);
        inputs.baseline.set_point(a1_id, day(0), Decimal::from(300)).unwrap();
        inputs.baseline.set_point(b_id, day(0), Decimal::from(200)).unwrap();

        let sink = Arc::new(InMemoryResultSink::new());
        let service = RecomputeService::new(config, sink.clone()).unwrap();
        service.register_project(tree, inputs).unwrap();
        Fixture {
            service,
            sink,
            project_id: p,
            root: root_id,
            a: a_id,
            b: b_id,
            a1: a1_id,
        }
    }

    fn measured(f: &Fixture, node_id: WbsNodeId, pct: i64) -> ProjectChange {
        ProjectChange::MeasurementRecorded {
            project_id: f.project_id,
            measurement: measurement(f.project_id, node_id, pct, day(1)),
        }
    }

    #[test]
    fn recompute_rolls_up_and_publishes() {
        let f = fixture(RecomputeConfig::default());
        f.service.apply_change(measured(&f, f.a1, 50)).unwrap();
        f.service.apply_change(measured(&f, f.b, 100)).unwrap();

        let report = f.service.recompute(f.project_id, day(2)).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.computed.len(), 4);

        let root = f.service.result(f.project_id, f.root).unwrap().unwrap();
        assert_eq!(root.progress.percentage, Decimal::from(70));
        assert_eq!(root.planned_value, Decimal::from(500));

        let batch = f.sink.last().unwrap();
        assert_eq!(batch.progress.len(), 4);
        assert_eq!(batch.metrics.len(), 4);
        assert!(f.service.dirty_nodes(f.project_id).unwrap().is_empty());
    }

    #[test]
    fn a_pass_at_a_later_date_sees_records_dated_in_between() {
        let f = fixture(RecomputeConfig::default());
        f.service.apply_change(measured(&f, f.b, 100)).unwrap();
        f.service
            .apply_change(ProjectChange::MeasurementRecorded {
                project_id: f.project_id,
                measurement: measurement(f.project_id, f.a1, 60, day(5)),
            })
            .unwrap();

        f.service.recompute(f.project_id, day(2)).unwrap();
        let root = f.service.result(f.project_id, f.root).unwrap().unwrap();
        assert_eq!(root.progress.percentage, Decimal::from(40));
        assert!(f.service.dirty_nodes(f.project_id).unwrap().is_empty());

        let report = f.service.recompute(f.project_id, day(6)).unwrap();
        assert_eq!(report.computed.len(), 4);
        let root = f.service.result(f.project_id, f.root).unwrap().unwrap();
        assert_eq!(root.progress.percentage, Decimal::from(76));
        assert_eq!(f.sink.last().unwrap().as_of, day(6));
        assert_eq!(f.sink.last().unwrap().progress.len(), 4);
    }

    #[test]
    fn a_leaf_change_dirties_its_chain_only() {
        let f = fixture(RecomputeConfig::default());
        f.service.recompute(f.project_id, day(2)).unwrap();

        let dirtied = f.service.apply_change(measured(&f, f.a1, 10)).unwrap();
        assert_eq!(dirtied, vec![f.a1, f.a, f.root]);
        assert_eq!(f.service.node_state(f.project_id, f.b).unwrap(), NodeState::Clean);

        let report = f.service.recompute(f.project_id, day(2)).unwrap();
        assert_eq!(report.computed, vec![f.a1, f.a, f.root]);
    }

    #[test]
    fn costs_reach_the_subtree_and_forecasts_follow() {
        let f = fixture(RecomputeConfig::default());
        f.service.apply_change(measured(&f, f.a1, 50)).unwrap();
        f.service
            .apply_change(ProjectChange::CostPosted {
                project_id: f.project_id,
                cost: cost(f.project_id, Some(f.a1), 250),
                allocations: Vec::new(),
            })
            .unwrap();
        f.service.recompute(f.project_id, day(2)).unwrap();

        let a = f.service.result(f.project_id, f.a).unwrap().unwrap();
        assert_eq!(a.costs.actual, Decimal::from(250));
        // EV 300, AC 250: CPI 1.2, ETC (600 - 300) / 1.2 = 250, EAC 500.
        assert_eq!(
            a.metrics.estimate_at_completion.defined(),
            Some(Decimal::from(500))
        );
        let batch = f.sink.last().unwrap();
        assert!(batch.forecasts.iter().any(|fc| fc.wbs_node_id == Some(f.a)));
    }

    #[test]
    fn costs_outside_the_tree_do_not_dirty_anything() {
        let f = fixture(RecomputeConfig::default());
        f.service.recompute(f.project_id, day(2)).unwrap();
        let dirtied = f
            .service
            .apply_change(ProjectChange::CostPosted {
                project_id: f.project_id,
                cost: cost(f.project_id, None, 80),
                allocations: Vec::new(),
            })
            .unwrap();
        assert!(dirtied.is_empty());
    }

    #[test]
    fn missing_baseline_fails_one_branch_only() {
        let f = fixture(RecomputeConfig::default());
        let extra = {
            let tree = f.service.tree(f.project_id).unwrap();
            let b = tree.get(f.b).unwrap().clone();
            node(f.project_id, Some(&b), 1, 0)
        };
        let extra_id = extra.id;
        f.service
            .apply_change(ProjectChange::StructureChanged {
                project_id: f.project_id,
                command: WbsCommand::InsertNode(InsertNode {
                    node: NewWbsNode {
                        id: extra.id,
                        parent_id: extra.parent_id,
                        code: extra.code,
                        name: extra.name,
                        description: None,
                        node_type: WbsNodeType::WorkPackage,
                        sequence_order: 1,
                        budget_allocation: Decimal::ZERO,
                        planned_hours: Decimal::ZERO,
                        responsible_user_id: None,
                        start_date: None,
                        end_date: None,
                    },
                    occurred_at: day(1),
                }),
                expected_version: ExpectedVersion::Any,
                occurred_at: day(1),
            })
            .unwrap();

        let report = f.service.recompute(f.project_id, day(2)).unwrap();
        assert!(report.failure(extra_id).is_some());
        assert!(report.failure(f.b).is_some());
        assert!(report.failure(f.root).is_some());
        assert!(report.failure(f.a).is_none());
        assert_eq!(f.service.node_state(f.project_id, f.a).unwrap(), NodeState::Clean);
        assert_eq!(f.service.node_state(f.project_id, f.b).unwrap(), NodeState::Dirty);

        // Supplying the curve lets the next pass finish the branch.
        f.service
            .apply_change(ProjectChange::BaselineChanged {
                project_id: f.project_id,
                wbs_node_id: extra_id,
                points: vec![PvPoint {
                    date: day(0),
                    cumulative_pv: Decimal::from(50),
                }],
                occurred_at: day(1),
            })
            .unwrap();
        let report = f.service.recompute(f.project_id, day(2)).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.computed, vec![extra_id, f.b, f.root]);
    }

    #[test]
    fn moving_a_node_dirties_both_parent_chains() {
        let f = fixture(RecomputeConfig::default());
        f.service.recompute(f.project_id, day(2)).unwrap();
        let mut dirtied = f
            .service
            .apply_change(ProjectChange::StructureChanged {
                project_id: f.project_id,
                command: WbsCommand::MoveNode(MoveNode {
                    node_id: f.a1,
                    new_parent_id: Some(f.b),
                    sequence_order: 1,
                    occurred_at: day(1),
                }),
                expected_version: ExpectedVersion::Any,
                occurred_at: day(1),
            })
            .unwrap();
        dirtied.sort();
        let mut expected = vec![f.a1, f.a, f.b, f.root];
        expected.sort();
        assert_eq!(dirtied, expected);

        // Edits decided against the original tree are now stale.
        let stale = ProjectChange::StructureChanged {
            project_id: f.project_id,
            command: WbsCommand::MoveNode(MoveNode {
                node_id: f.a1,
                new_parent_id: Some(f.a),
                sequence_order: 1,
                occurred_at: day(2),
            }),
            expected_version: ExpectedVersion::Exact(0),
            occurred_at: day(2),
        };
        assert!(matches!(
            f.service.apply_change(stale),
            Err(RecomputeError::Domain(DomainError::Conflict(_)))
        ));
        assert_eq!(f.service.tree(f.project_id).unwrap().get(f.a1).unwrap().parent_id, Some(f.b));
    }

    #[test]
    fn milestones_dirty_their_node() {
        let f = fixture(RecomputeConfig::default());
        f.service.recompute(f.project_id, day(2)).unwrap();
        let milestone = Milestone::plan(
            MilestoneId::new(),
            f.project_id,
            Some(f.b),
            "handover",
            day(3),
            Decimal::ONE,
        )
        .unwrap();
        let milestone_id = *milestone.id();
        f.service
            .apply_change(ProjectChange::MilestonePlanned {
                project_id: f.project_id,
                milestone,
                occurred_at: day(1),
            })
            .unwrap();
        f.service.recompute(f.project_id, day(2)).unwrap();

        let dirtied = f
            .service
            .apply_change(ProjectChange::MilestoneStatusChanged {
                project_id: f.project_id,
                milestone_id,
                status: MilestoneStatus::InProgress,
                occurred_at: day(2),
            })
            .unwrap();
        assert_eq!(dirtied, vec![f.b, f.root]);
    }

    #[test]
    fn ingest_ignores_redeliveries_and_rejects_gaps() {
        let f = fixture(RecomputeConfig::default());
        let first = EventEnvelope::wrap("changes", 1, measured(&f, f.a1, 20));
        assert!(matches!(
            f.service.ingest(first.clone()).unwrap(),
            IngestOutcome::Applied(_)
        ));
        assert_eq!(f.service.ingest(first).unwrap(), IngestOutcome::Duplicate);

        let gap = EventEnvelope::wrap("changes", 3, measured(&f, f.b, 20));
        assert_eq!(
            f.service.ingest(gap).unwrap_err(),
            RecomputeError::NonMonotonicSequence {
                project_id: f.project_id,
                expected: 2,
                actual: 3,
            }
        );

        let next = EventEnvelope::wrap("changes", 2, measured(&f, f.b, 20));
        assert!(matches!(f.service.ingest(next).unwrap(), IngestOutcome::Applied(_)));
    }

    #[test]
    fn rejected_changes_leave_the_sequence_alone() {
        let f = fixture(RecomputeConfig::default());
        let bad = EventEnvelope::wrap("changes", 1, measured(&f, WbsNodeId::new(), 20));
        assert!(matches!(
            f.service.ingest(bad),
            Err(RecomputeError::Domain(DomainError::NotFound { .. }))
        ));
        let good = EventEnvelope::wrap("changes", 1, measured(&f, f.a1, 20));
        assert!(matches!(f.service.ingest(good).unwrap(), IngestOutcome::Applied(_)));
    }

    #[test]
    fn unknown_and_duplicate_projects() {
        let f = fixture(RecomputeConfig::default());
        let other = ProjectId::new();
        assert_eq!(
            f.service.recompute(other, day(2)).unwrap_err(),
            RecomputeError::UnknownProject(other)
        );

        let tree = f.service.tree(f.project_id).unwrap();
        let err = f
            .service
            .register_project(tree, ProjectInputs::new(f.project_id))
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn projects_recompute_concurrently() {
        let sink = Arc::new(InMemoryResultSink::new());
        let config = RecomputeConfig::default().with_worker_threads(2);
        let service = RecomputeService::new(config, sink.clone()).unwrap();

        let mut projects = Vec::new();
        for _ in 0..4 {
            let p = ProjectId::new();
            let root = node(p, None, 1, 100);
            let leaf = node(p, Some(&root), 1, 100);
            let leaf_id = leaf.id;
            let tree = WbsTree::from_nodes(p, vec![root, leaf]).unwrap();
            let mut inputs = ProjectInputs::new(p);
            inputs.baseline.set_point(leaf_id, day(0), Decimal::from(40)).unwrap();
            inputs.progress.record_measurement(measurement(p, leaf_id, 40, day(1))).unwrap();
            service.register_project(tree, inputs).unwrap();
            projects.push(p);
        }

        std::thread::scope(|scope| {
            for p in &projects {
                let service = &service;
                scope.spawn(move || {
                    let report = service.recompute(*p, day(2)).unwrap();
                    assert!(report.is_complete());
                });
            }
        });

        assert_eq!(sink.len(), 4);
        assert_eq!(service.project_ids().len(), 4);
    }
}
