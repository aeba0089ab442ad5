use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{
    DomainError, DomainResult, ForecastId, ONE_HUNDRED, ProjectId, monetary_scale, round_to,
};
use buildledger_costing::CostForecast;

/// What-if adjustment of a forecast's estimate at completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostScenario {
    pub project_id: ProjectId,
    pub scenario_name: String,
    pub description: Option<String>,
    pub base_forecast_id: ForecastId,
    pub risk_adjustment: Decimal,
    pub opportunity_adjustment: Decimal,
    pub contingency_percentage: Decimal,
    /// `(EAC + risk - opportunity) * (1 + contingency / 100)`.
    pub adjusted_estimate_at_completion: Decimal,
    /// In `[0, 1]`.
    pub probability: Decimal,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl CostScenario {
    pub fn evaluate(
        base: &CostForecast,
        scenario_name: impl Into<String>,
        risk_adjustment: Decimal,
        opportunity_adjustment: Decimal,
        contingency_percentage: Decimal,
        probability: Decimal,
        created_by: impl Into<String>,
    ) -> DomainResult<Self> {
        if risk_adjustment < Decimal::ZERO
            || opportunity_adjustment < Decimal::ZERO
            || contingency_percentage < Decimal::ZERO
        {
            return Err(DomainError::validation(
                "scenario adjustments must not be negative",
            ));
        }
        if probability < Decimal::ZERO || probability > Decimal::ONE {
            return Err(DomainError::validation(format!(
                "scenario probability {probability} outside [0, 1]"
            )));
        }

        let overflow = || DomainError::computation("scenario estimate overflow");
        let eac = base.estimate_at_completion;
        let adjusted = eac
            .checked_add(risk_adjustment)
            .and_then(|v| v.checked_sub(opportunity_adjustment))
            .ok_or_else(overflow)?;
        let factor = Decimal::ONE + contingency_percentage / ONE_HUNDRED;
        let adjusted = adjusted.checked_mul(factor).ok_or_else(overflow)?;
        let scale = monetary_scale([&eac, &risk_adjustment, &opportunity_adjustment]);

        Ok(Self {
            project_id: base.project_id,
            scenario_name: scenario_name.into(),
            description: None,
            base_forecast_id: base.id,
            risk_adjustment,
            opportunity_adjustment,
            contingency_percentage,
            adjusted_estimate_at_completion: round_to(adjusted, scale),
            probability,
            created_by: created_by.into(),
            created_at: Utc::now(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adjusted variance at completion against the base forecast's BAC.
    pub fn variance_at_completion(&self, base: &CostForecast) -> Decimal {
        base.budget_at_completion - self.adjusted_estimate_at_completion
    }
}

/// Probability-weighted EAC over a set of scenarios. `None` when the
/// probabilities sum to zero.
pub fn expected_estimate_at_completion(scenarios: &[CostScenario]) -> Option<Decimal> {
    let total: Decimal = scenarios.iter().map(|s| s.probability).sum();
    if total.is_zero() {
        return None;
    }
    let weighted = scenarios.iter().try_fold(Decimal::ZERO, |acc, s| {
        s.adjusted_estimate_at_completion
            .checked_mul(s.probability)
            .and_then(|v| acc.checked_add(v))
    })?;
    let scale = monetary_scale(scenarios.iter().map(|s| &s.adjusted_estimate_at_completion));
    weighted.checked_div(total).map(|v| round_to(v, scale))
}
