use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{DomainError, DomainResult, ONE_HUNDRED, ProjectId, WbsNodeId, round_to};

use crate::engine::EarnedValueMetrics;
use crate::value::EvmValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceType {
    CostVariance,
    ScheduleVariance,
    ScopeVariance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceStatus {
    Open,
    Resolved,
}

/// A variance worth explaining, with its follow-up notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceAnalysis {
    pub project_id: ProjectId,
    pub wbs_node_id: WbsNodeId,
    pub analysis_date: DateTime<Utc>,
    pub variance_type: VarianceType,
    pub variance_amount: Decimal,
    /// Variance relative to its reference (EV, PV or the original budget).
    pub variance_percentage: EvmValue,
    pub root_cause: Option<String>,
    pub impact_assessment: Option<String>,
    pub corrective_action: Option<String>,
    pub responsible_person: Option<String>,
    pub target_resolution_date: Option<DateTime<Utc>>,
    pub status: VarianceStatus,
}

impl VarianceAnalysis {
    fn open(
        metrics: &EarnedValueMetrics,
        variance_type: VarianceType,
        amount: Decimal,
        reference: Decimal,
        scale: u32,
    ) -> Self {
        Self {
            project_id: metrics.project_id,
            wbs_node_id: metrics.wbs_node_id,
            analysis_date: metrics.measurement_date,
            variance_type,
            variance_amount: amount,
            variance_percentage: percent_of(amount, reference, scale),
            root_cause: None,
            impact_assessment: None,
            corrective_action: None,
            responsible_person: None,
            target_resolution_date: None,
            status: VarianceStatus::Open,
        }
    }

    /// Cost variance (CV against EV) and schedule variance (SV against PV).
    pub fn from_metrics(metrics: &EarnedValueMetrics, scale: u32) -> [VarianceAnalysis; 2] {
        [
            Self::open(
                metrics,
                VarianceType::CostVariance,
                metrics.cost_variance,
                metrics.earned_value,
                scale,
            ),
            Self::open(
                metrics,
                VarianceType::ScheduleVariance,
                metrics.schedule_variance,
                metrics.planned_value,
                scale,
            ),
        ]
    }

    /// Scope variance: change of BAC against the original budget.
    pub fn scope(
        metrics: &EarnedValueMetrics,
        original_budget: Decimal,
        scale: u32,
    ) -> DomainResult<VarianceAnalysis> {
        if original_budget < Decimal::ZERO {
            return Err(DomainError::validation("original budget must not be negative"));
        }
        let amount = metrics.budget_at_completion - original_budget;
        Ok(Self::open(
            metrics,
            VarianceType::ScopeVariance,
            amount,
            original_budget,
            scale,
        ))
    }

    /// Whether the magnitude of the percentage reaches `threshold`.
    /// An undefined percentage exceeds any threshold when the amount is
    /// non-zero.
    pub fn exceeds(&self, threshold: Decimal) -> bool {
        match self.variance_percentage {
            EvmValue::Defined(p) => p.abs() >= threshold,
            EvmValue::Undefined => !self.variance_amount.is_zero(),
        }
    }

    pub fn assign(
        mut self,
        responsible_person: impl Into<String>,
        target: DateTime<Utc>,
    ) -> Self {
        self.responsible_person = Some(responsible_person.into());
        self.target_resolution_date = Some(target);
        self
    }

    pub fn resolve(
        &mut self,
        root_cause: impl Into<String>,
        corrective_action: impl Into<String>,
    ) -> DomainResult<()> {
        if self.status == VarianceStatus::Resolved {
            return Err(DomainError::conflict("variance already resolved"));
        }
        self.root_cause = Some(root_cause.into());
        self.corrective_action = Some(corrective_action.into());
        self.status = VarianceStatus::Resolved;
        Ok(())
    }
}

fn percent_of(part: Decimal, whole: Decimal, scale: u32) -> EvmValue {
    EvmValue::ratio(part, whole).map(|r| round_to(r * ONE_HUNDRED, scale))
}
