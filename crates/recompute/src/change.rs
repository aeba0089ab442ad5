//! Changes that invalidate computed roll-ups.

use chrono::{DateTime, Utc};

use buildledger_core::{ExpectedVersion, MilestoneId, ProjectId, WbsNodeId};
use buildledger_costing::{ActualCost, CostForecast, NewAllocation};
use buildledger_evm::PvPoint;
use buildledger_events::Event;
use buildledger_progress::{Milestone, MilestoneStatus, ProgressMeasurement};
use buildledger_wbs::WbsCommand;

/// A change reported by a collaborating subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectChange {
    MeasurementRecorded {
        project_id: ProjectId,
        measurement: ProgressMeasurement,
    },
    MilestonePlanned {
        project_id: ProjectId,
        milestone: Milestone,
        occurred_at: DateTime<Utc>,
    },
    MilestoneStatusChanged {
        project_id: ProjectId,
        milestone_id: MilestoneId,
        status: MilestoneStatus,
        occurred_at: DateTime<Utc>,
    },
    CostPosted {
        project_id: ProjectId,
        cost: ActualCost,
        allocations: Vec<NewAllocation>,
    },
    CostsAllocated {
        project_id: ProjectId,
        allocations: Vec<NewAllocation>,
        occurred_at: DateTime<Utc>,
    },
    ForecastRecorded {
        project_id: ProjectId,
        forecast: CostForecast,
    },
    BaselineChanged {
        project_id: ProjectId,
        wbs_node_id: WbsNodeId,
        points: Vec<PvPoint>,
        occurred_at: DateTime<Utc>,
    },
    /// A structural edit, rejected if the tree is not at `expected_version`.
    StructureChanged {
        project_id: ProjectId,
        command: WbsCommand,
        expected_version: ExpectedVersion,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for ProjectChange {
    fn event_type(&self) -> &'static str {
        match self {
            ProjectChange::MeasurementRecorded { .. } => "progress.measurement.recorded",
            ProjectChange::MilestonePlanned { .. } => "progress.milestone.planned",
            ProjectChange::MilestoneStatusChanged { .. } => "progress.milestone.status_changed",
            ProjectChange::CostPosted { .. } => "costing.cost.posted",
            ProjectChange::CostsAllocated { .. } => "costing.cost.allocated",
            ProjectChange::ForecastRecorded { .. } => "costing.forecast.recorded",
            ProjectChange::BaselineChanged { .. } => "evm.baseline.changed",
            ProjectChange::StructureChanged { .. } => "wbs.structure.changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn project_id(&self) -> ProjectId {
        match self {
            ProjectChange::MeasurementRecorded { project_id, .. }
            | ProjectChange::MilestonePlanned { project_id, .. }
            | ProjectChange::MilestoneStatusChanged { project_id, .. }
            | ProjectChange::CostPosted { project_id, .. }
            | ProjectChange::CostsAllocated { project_id, .. }
            | ProjectChange::ForecastRecorded { project_id, .. }
            | ProjectChange::BaselineChanged { project_id, .. }
            | ProjectChange::StructureChanged { project_id, .. } => *project_id,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProjectChange::MeasurementRecorded { measurement, .. } => measurement.created_at(),
            ProjectChange::CostPosted { cost, .. } => cost.created_at,
            ProjectChange::ForecastRecorded { forecast, .. } => forecast.created_at,
            ProjectChange::MilestonePlanned { occurred_at, .. }
            | ProjectChange::MilestoneStatusChanged { occurred_at, .. }
            | ProjectChange::CostsAllocated { occurred_at, .. }
            | ProjectChange::BaselineChanged { occurred_at, .. }
            | ProjectChange::StructureChanged { occurred_at, .. } => *occurred_at,
        }
    }
}
