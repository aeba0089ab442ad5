use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{
    DomainError, DomainResult, Entity, MeasurementId, ONE_HUNDRED, ProjectId, TaskId, UserId,
    WbsNodeId, clamp_percentage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMethod {
    PercentageComplete,
    MilestoneWeighted,
    UnitsComplete,
    CostRatio,
    PhysicalMeasurement,
}

/// Input for recording a measurement.
///
/// `actual_progress` may be omitted for `UnitsComplete`, in which case it is
/// derived from the unit counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMeasurement {
    pub id: MeasurementId,
    pub project_id: ProjectId,
    pub wbs_node_id: Option<WbsNodeId>,
    pub task_id: Option<TaskId>,
    pub measurement_date: DateTime<Utc>,
    pub progress_method: ProgressMethod,
    pub planned_progress: Decimal,
    pub actual_progress: Option<Decimal>,
    pub units_planned: Option<Decimal>,
    pub units_completed: Option<Decimal>,
    pub measured_by: UserId,
    pub verified_by: Option<UserId>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time progress observation. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressMeasurement {
    id: MeasurementId,
    project_id: ProjectId,
    wbs_node_id: Option<WbsNodeId>,
    task_id: Option<TaskId>,
    measurement_date: DateTime<Utc>,
    progress_method: ProgressMethod,
    planned_progress: Decimal,
    actual_progress: Decimal,
    progress_variance: Decimal,
    units_planned: Option<Decimal>,
    units_completed: Option<Decimal>,
    measured_by: UserId,
    verified_by: Option<UserId>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

fn ensure_percentage(field: &str, value: Decimal) -> DomainResult<()> {
    if value < Decimal::ZERO || value > ONE_HUNDRED {
        return Err(DomainError::validation(format!(
            "{field} must be within [0, 100], got {value}"
        )));
    }
    Ok(())
}

impl ProgressMeasurement {
    pub fn record(new: NewMeasurement) -> DomainResult<Self> {
        if new.wbs_node_id.is_none() && new.task_id.is_none() {
            return Err(DomainError::validation(
                "measurement must reference a wbs node or a task",
            ));
        }
        ensure_percentage("planned_progress", new.planned_progress)?;

        let actual = match (new.actual_progress, new.progress_method) {
            (Some(actual), _) => actual,
            (None, ProgressMethod::UnitsComplete) => {
                let planned = new.units_planned.unwrap_or(Decimal::ZERO);
                let completed = new.units_completed.ok_or_else(|| {
                    DomainError::validation("units_completed is required to derive progress")
                })?;
                if planned <= Decimal::ZERO {
                    return Err(DomainError::validation(
                        "units_planned must be positive to derive progress",
                    ));
                }
                if completed < Decimal::ZERO {
                    return Err(DomainError::validation("units_completed must not be negative"));
                }
                let ratio = completed
                    .checked_mul(ONE_HUNDRED)
                    .and_then(|scaled| scaled.checked_div(planned))
                    .ok_or_else(|| DomainError::computation("unit progress overflow"))?;
                clamp_percentage(ratio)
            }
            (None, method) => {
                return Err(DomainError::validation(format!(
                    "actual_progress is required for {method:?} measurements"
                )));
            }
        };
        ensure_percentage("actual_progress", actual)?;

        Ok(Self {
            id: new.id,
            project_id: new.project_id,
            wbs_node_id: new.wbs_node_id,
            task_id: new.task_id,
            measurement_date: new.measurement_date,
            progress_method: new.progress_method,
            planned_progress: new.planned_progress,
            actual_progress: actual,
            progress_variance: actual - new.planned_progress,
            units_planned: new.units_planned,
            units_completed: new.units_completed,
            measured_by: new.measured_by,
            verified_by: new.verified_by,
            notes: new.notes,
            created_at: new.created_at,
        })
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn wbs_node_id(&self) -> Option<WbsNodeId> {
        self.wbs_node_id
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    pub fn measurement_date(&self) -> DateTime<Utc> {
        self.measurement_date
    }

    pub fn progress_method(&self) -> ProgressMethod {
        self.progress_method
    }

    pub fn planned_progress(&self) -> Decimal {
        self.planned_progress
    }

    pub fn actual_progress(&self) -> Decimal {
        self.actual_progress
    }

    pub fn progress_variance(&self) -> Decimal {
        self.progress_variance
    }

    pub fn units(&self) -> (Option<Decimal>, Option<Decimal>) {
        (self.units_planned, self.units_completed)
    }

    pub fn measured_by(&self) -> UserId {
        self.measured_by
    }

    pub fn verified_by(&self) -> Option<UserId> {
        self.verified_by
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn recency_key(&self) -> (DateTime<Utc>, DateTime<Utc>, MeasurementId) {
        (self.measurement_date, self.created_at, self.id)
    }
}

impl Entity for ProgressMeasurement {
    type Id = MeasurementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Append-only measurement history, indexed by node and by task.
#[derive(Debug, Clone, Default)]
pub struct MeasurementLog {
    by_node: HashMap<WbsNodeId, Vec<ProgressMeasurement>>,
    by_task: HashMap<TaskId, Vec<ProgressMeasurement>>,
    ids: HashSet<MeasurementId>,
}

impl MeasurementLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Append a measurement; re-recording an id is a conflict.
    pub fn append(&mut self, measurement: ProgressMeasurement) -> DomainResult<()> {
        if !self.ids.insert(measurement.id) {
            return Err(DomainError::conflict(format!(
                "measurement {} already recorded",
                measurement.id
            )));
        }
        if let Some(task_id) = measurement.task_id {
            self.by_task.entry(task_id).or_default().push(measurement.clone());
        }
        if let Some(node_id) = measurement.wbs_node_id {
            self.by_node.entry(node_id).or_default().push(measurement);
        }
        Ok(())
    }

    /// Full history for a node in recording order.
    pub fn history(&self, node_id: WbsNodeId) -> &[ProgressMeasurement] {
        self.by_node.get(&node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The authoritative measurement for a node as of `as_of`.
    pub fn latest_for_node(
        &self,
        node_id: WbsNodeId,
        as_of: DateTime<Utc>,
    ) -> Option<&ProgressMeasurement> {
        latest(self.by_node.get(&node_id), as_of)
    }

    pub fn latest_for_task(&self, task_id: TaskId, as_of: DateTime<Utc>) -> Option<&ProgressMeasurement> {
        latest(self.by_task.get(&task_id), as_of)
    }
}

fn latest(list: Option<&Vec<ProgressMeasurement>>, as_of: DateTime<Utc>) -> Option<&ProgressMeasurement> {
    list?
        .iter()
        .filter(|m| m.measurement_date <= as_of)
        .max_by_key(|m| m.recency_key())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub(crate) fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    pub(crate) fn measured(
        project_id: ProjectId,
        node_id: WbsNodeId,
        on: DateTime<Utc>,
        actual: i64,
    ) -> ProgressMeasurement {
        ProgressMeasurement::record(NewMeasurement {
            id: MeasurementId::new(),
            project_id,
            wbs_node_id: Some(node_id),
            task_id: None,
            measurement_date: on,
            progress_method: ProgressMethod::PercentageComplete,
            planned_progress: Decimal::from(50),
            actual_progress: Some(Decimal::from(actual)),
            units_planned: None,
            units_completed: None,
            measured_by: UserId::new(),
            verified_by: None,
            notes: None,
            created_at: on,
        })
        .unwrap()
    }

    fn units(planned: i64, completed: i64) -> NewMeasurement {
        NewMeasurement {
            id: MeasurementId::new(),
            project_id: ProjectId::new(),
            wbs_node_id: Some(WbsNodeId::new()),
            task_id: None,
            measurement_date: day(0),
            progress_method: ProgressMethod::UnitsComplete,
            planned_progress: Decimal::from(40),
            actual_progress: None,
            units_planned: Some(Decimal::from(planned)),
            units_completed: Some(Decimal::from(completed)),
            measured_by: UserId::new(),
            verified_by: None,
            notes: None,
            created_at: day(0),
        }
    }

    #[test]
    fn variance_is_actual_minus_planned() {
        let m = measured(ProjectId::new(), WbsNodeId::new(), day(1), 35);
        assert_eq!(m.progress_variance(), Decimal::from(-15));
    }

    #[test]
    fn derives_progress_from_units() {
        let m = ProgressMeasurement::record(units(80, 20)).unwrap();
        assert_eq!(m.actual_progress(), Decimal::from(25));
        assert_eq!(m.progress_variance(), Decimal::from(-15));

        let over = ProgressMeasurement::record(units(10, 12)).unwrap();
        assert_eq!(over.actual_progress(), ONE_HUNDRED);

        assert!(matches!(
            ProgressMeasurement::record(units(0, 5)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_and_unanchored_measurements() {
        let mut bad = units(10, 5);
        bad.actual_progress = Some(Decimal::from(101));
        assert!(matches!(ProgressMeasurement::record(bad), Err(DomainError::Validation(_))));

        let mut orphan = units(10, 5);
        orphan.wbs_node_id = None;
        assert!(matches!(ProgressMeasurement::record(orphan), Err(DomainError::Validation(_))));

        let mut missing = units(10, 5);
        missing.progress_method = ProgressMethod::PhysicalMeasurement;
        assert!(matches!(ProgressMeasurement::record(missing), Err(DomainError::Validation(_))));
    }

    #[test]
    fn latest_respects_as_of_date() {
        let project_id = ProjectId::new();
        let node_id = WbsNodeId::new();
        let mut log = MeasurementLog::new();
        log.append(measured(project_id, node_id, day(1), 10)).unwrap();
        log.append(measured(project_id, node_id, day(10), 80)).unwrap();
        log.append(measured(project_id, node_id, day(5), 40)).unwrap();

        let at = |d| log.latest_for_node(node_id, day(d)).map(|m| m.actual_progress());
        assert_eq!(at(0), None);
        assert_eq!(at(4), Some(Decimal::from(10)));
        assert_eq!(at(7), Some(Decimal::from(40)));
        assert_eq!(at(30), Some(Decimal::from(80)));
        assert_eq!(log.history(node_id).len(), 3);
    }

    #[test]
    fn duplicate_ids_are_conflicts() {
        let m = measured(ProjectId::new(), WbsNodeId::new(), day(1), 10);
        let mut log = MeasurementLog::new();
        log.append(m.clone()).unwrap();
        assert!(matches!(log.append(m), Err(DomainError::Conflict(_))));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn task_measurements_are_indexed_separately() {
        let task_id = TaskId::new();
        let mut new = units(10, 5);
        new.wbs_node_id = None;
        new.task_id = Some(task_id);
        let mut log = MeasurementLog::new();
        log.append(ProgressMeasurement::record(new).unwrap()).unwrap();
        assert_eq!(
            log.latest_for_task(task_id, day(1)).map(|m| m.actual_progress()),
            Some(Decimal::from(50))
        );
    }
}
