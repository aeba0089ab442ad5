use std::collections::HashMap;

use chrono::{DateTime, Utc};

use buildledger_core::{DomainError, DomainResult, Entity, MilestoneId, ProjectId, WbsNodeId};

use crate::aggregator::ProgressInputs;
use crate::measurement::{MeasurementLog, ProgressMeasurement};
use crate::milestone::{Milestone, MilestoneStatus};

/// Read-only progress inputs of one project, as handed over by the
/// measurement/milestone subsystems.
#[derive(Debug, Clone)]
pub struct ProgressBook {
    project_id: ProjectId,
    measurements: MeasurementLog,
    milestones: HashMap<MilestoneId, Milestone>,
    milestones_by_node: HashMap<WbsNodeId, Vec<MilestoneId>>,
}

impl ProgressBook {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            measurements: MeasurementLog::new(),
            milestones: HashMap::new(),
            milestones_by_node: HashMap::new(),
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn measurements(&self) -> &MeasurementLog {
        &self.measurements
    }

    pub fn record_measurement(&mut self, measurement: ProgressMeasurement) -> DomainResult<()> {
        if measurement.project_id() != self.project_id {
            return Err(DomainError::validation(format!(
                "measurement belongs to project {}, not {}",
                measurement.project_id(),
                self.project_id
            )));
        }
        self.measurements.append(measurement)
    }

    pub fn add_milestone(&mut self, milestone: Milestone) -> DomainResult<()> {
        if milestone.project_id != self.project_id {
            return Err(DomainError::validation(format!(
                "milestone belongs to project {}, not {}",
                milestone.project_id, self.project_id
            )));
        }
        let id = *milestone.id();
        if self.milestones.contains_key(&id) {
            return Err(DomainError::conflict(format!("milestone {id} already exists")));
        }
        if let Some(node_id) = milestone.wbs_node_id {
            self.milestones_by_node.entry(node_id).or_default().push(id);
        }
        self.milestones.insert(id, milestone);
        Ok(())
    }

    pub fn milestone(&self, id: MilestoneId) -> DomainResult<&Milestone> {
        self.milestones
            .get(&id)
            .ok_or_else(|| DomainError::not_found("milestone", id))
    }

    /// Transition a milestone; returns the node whose progress is affected.
    pub fn transition_milestone(
        &mut self,
        id: MilestoneId,
        next: MilestoneStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<Option<WbsNodeId>> {
        let milestone = self
            .milestones
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("milestone", id))?;
        milestone.transition(next, at)?;
        Ok(milestone.wbs_node_id)
    }
}

impl ProgressInputs for ProgressBook {
    fn latest_measurement(
        &self,
        node_id: WbsNodeId,
        as_of: DateTime<Utc>,
    ) -> Option<&ProgressMeasurement> {
        self.measurements.latest_for_node(node_id, as_of)
    }

    fn milestones(&self, node_id: WbsNodeId) -> Vec<&Milestone> {
        let mut list: Vec<&Milestone> = self
            .milestones_by_node
            .get(&node_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.milestones.get(id))
            .collect();
        list.sort_by_key(|m| (m.planned_date, *m.id()));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::tests::{day, measured};
    use rust_decimal::Decimal;

    #[test]
    fn rejects_records_from_other_projects() {
        let mut book = ProgressBook::new(ProjectId::new());
        let foreign = measured(ProjectId::new(), WbsNodeId::new(), day(1), 20);
        assert!(matches!(
            book.record_measurement(foreign),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn milestone_transitions_report_their_node() {
        let project_id = ProjectId::new();
        let node_id = WbsNodeId::new();
        let mut book = ProgressBook::new(project_id);
        let id = MilestoneId::new();
        book.add_milestone(
            Milestone::plan(id, project_id, Some(node_id), "Roof", day(3), Decimal::ONE).unwrap(),
        )
        .unwrap();

        let touched = book
            .transition_milestone(id, MilestoneStatus::InProgress, day(2))
            .unwrap();
        assert_eq!(touched, Some(node_id));
        assert_eq!(book.milestones(node_id).len(), 1);
        assert!(matches!(
            book.transition_milestone(MilestoneId::new(), MilestoneStatus::InProgress, day(2)),
            Err(DomainError::NotFound { .. })
        ));
    }
}
