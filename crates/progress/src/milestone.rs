use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{
    DomainError, DomainResult, Entity, MilestoneId, ONE_HUNDRED, ProjectId, WbsNodeId,
};

/// Milestone status lifecycle: NotStarted → InProgress → {Completed, Delayed},
/// and a delayed milestone may still complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    NotStarted,
    InProgress,
    Completed,
    Delayed,
}

impl MilestoneStatus {
    pub fn can_transition_to(self, next: MilestoneStatus) -> bool {
        use MilestoneStatus::*;
        matches!(
            (self, next),
            (NotStarted, InProgress)
                | (InProgress, Completed)
                | (InProgress, Delayed)
                | (Delayed, Completed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    id: MilestoneId,
    pub project_id: ProjectId,
    pub wbs_node_id: Option<WbsNodeId>,
    pub name: String,
    pub description: Option<String>,
    pub planned_date: DateTime<Utc>,
    actual_date: Option<DateTime<Utc>>,
    status: MilestoneStatus,
    /// Relative importance within the node; need not sum to any total.
    weight: Decimal,
    pub is_critical: bool,
    pub responsible_person: String,
}

impl Milestone {
    /// A new, not-yet-started milestone.
    pub fn plan(
        id: MilestoneId,
        project_id: ProjectId,
        wbs_node_id: Option<WbsNodeId>,
        name: impl Into<String>,
        planned_date: DateTime<Utc>,
        weight: Decimal,
    ) -> DomainResult<Self> {
        if weight < Decimal::ZERO {
            return Err(DomainError::validation("milestone weight must not be negative"));
        }
        Ok(Self {
            id,
            project_id,
            wbs_node_id,
            name: name.into(),
            description: None,
            planned_date,
            actual_date: None,
            status: MilestoneStatus::NotStarted,
            weight,
            is_critical: false,
            responsible_person: String::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn critical(mut self) -> Self {
        self.is_critical = true;
        self
    }

    pub fn responsible(mut self, person: impl Into<String>) -> Self {
        self.responsible_person = person.into();
        self
    }

    pub fn status(&self) -> MilestoneStatus {
        self.status
    }

    pub fn weight(&self) -> Decimal {
        self.weight
    }

    pub fn actual_date(&self) -> Option<DateTime<Utc>> {
        self.actual_date
    }

    /// Binary progress: 100 once completed, 0 otherwise.
    pub fn progress(&self) -> Decimal {
        if self.status == MilestoneStatus::Completed {
            ONE_HUNDRED
        } else {
            Decimal::ZERO
        }
    }

    /// Move to `next`, stamping `actual_date` on completion.
    pub fn transition(&mut self, next: MilestoneStatus, at: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::validation(format!(
                "milestone {} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        if next == MilestoneStatus::Completed {
            self.actual_date = Some(at);
        }
        Ok(())
    }

    /// Completed after its planned date.
    pub fn is_late(&self) -> bool {
        match self.actual_date {
            Some(done) => done > self.planned_date,
            None => self.status == MilestoneStatus::Delayed,
        }
    }
}

impl Entity for Milestone {
    type Id = MilestoneId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
