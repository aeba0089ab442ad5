//! Earned value metrics for one node at one date.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{
    DomainError, DomainResult, ForecastId, ONE_HUNDRED, ProjectId, WbsNodeId, monetary_scale,
    round_to,
};
use buildledger_costing::CostForecast;

use crate::etc::EtcInput;
use crate::value::EvmValue;

/// Default number of decimal places kept on CPI, SPI and TCPI.
pub const DEFAULT_RATIO_SCALE: u32 = 4;

/// Aggregated inputs of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmInputs {
    pub budget_at_completion: Decimal,
    pub planned_value: Decimal,
    pub actual_cost: Decimal,
    /// Weighted progress in `[0, 100]`.
    pub progress_percentage: Decimal,
    pub etc: EtcInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarnedValueMetrics {
    pub project_id: ProjectId,
    pub wbs_node_id: WbsNodeId,
    pub measurement_date: DateTime<Utc>,
    pub planned_value: Decimal,
    pub earned_value: Decimal,
    pub actual_cost: Decimal,
    pub budget_at_completion: Decimal,
    pub cost_variance: Decimal,
    pub schedule_variance: Decimal,
    pub cost_performance_index: EvmValue,
    pub schedule_performance_index: EvmValue,
    pub estimate_to_complete: EvmValue,
    pub estimate_at_completion: EvmValue,
    pub to_complete_performance_index: EvmValue,
    pub variance_at_completion: EvmValue,
    pub etc: EtcInput,
}

impl EarnedValueMetrics {
    /// Express the metrics as a cost forecast record. Fails when the
    /// estimate at completion is undefined.
    pub fn to_forecast(
        &self,
        committed_costs: Decimal,
        confidence_level: Decimal,
        created_by: impl Into<String>,
    ) -> DomainResult<CostForecast> {
        let undefined = || {
            DomainError::computation(format!(
                "estimate at completion of node {} is undefined",
                self.wbs_node_id
            ))
        };
        let eac = self.estimate_at_completion.defined().ok_or_else(undefined)?;
        let etc = self.estimate_to_complete.defined().ok_or_else(undefined)?;
        let forecast = CostForecast {
            id: ForecastId::new(),
            project_id: self.project_id,
            wbs_node_id: Some(self.wbs_node_id),
            cost_center_id: None,
            forecast_date: self.measurement_date,
            forecast_method: self.etc.method(),
            budget_at_completion: self.budget_at_completion,
            actual_cost_to_date: self.actual_cost,
            committed_costs,
            estimate_to_complete: etc,
            estimate_at_completion: eac,
            variance_at_completion: self.budget_at_completion - eac,
            confidence_level,
            created_by: created_by.into(),
            notes: None,
            created_at: Utc::now(),
        };
        forecast.validate()?;
        Ok(forecast)
    }
}

/// Stateless calculator; only the ratio precision is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmEngine {
    ratio_scale: u32,
}

impl Default for EvmEngine {
    fn default() -> Self {
        Self {
            ratio_scale: DEFAULT_RATIO_SCALE,
        }
    }
}

impl EvmEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ratio_scale(mut self, scale: u32) -> Self {
        self.ratio_scale = scale;
        self
    }

    pub fn ratio_scale(&self) -> u32 {
        self.ratio_scale
    }

    pub fn compute(
        &self,
        project_id: ProjectId,
        wbs_node_id: WbsNodeId,
        measurement_date: DateTime<Utc>,
        inputs: &EvmInputs,
    ) -> DomainResult<EarnedValueMetrics> {
        validate(inputs)?;
        let overflow =
            || DomainError::computation(format!("earned value overflow at node {wbs_node_id}"));

        let bac = inputs.budget_at_completion;
        let pv = inputs.planned_value;
        let ac = inputs.actual_cost;

        let mut money = vec![bac, pv, ac];
        money.extend(inputs.etc.amounts());
        let scale = monetary_scale(&money);

        let ev = bac
            .checked_mul(inputs.progress_percentage)
            .map(|v| v / ONE_HUNDRED)
            .ok_or_else(overflow)?;
        let ev = round_to(ev, scale);

        let cpi = EvmValue::ratio(ev, ac);
        let spi = EvmValue::ratio(ev, pv);
        let remaining_work = bac - ev;

        let etc = match inputs.etc {
            EtcInput::BottomUp { remaining_estimate } => EvmValue::Defined(remaining_estimate),
            EtcInput::TopDown | EtcInput::Parametric => {
                cpi.and_then(|cpi| EvmValue::ratio(remaining_work, cpi))
            }
            EtcInput::ThreePoint {
                optimistic,
                most_likely,
                pessimistic,
            } => {
                let four_m = most_likely.checked_mul(Decimal::from(4)).ok_or_else(overflow)?;
                let sum = optimistic
                    .checked_add(four_m)
                    .and_then(|v| v.checked_add(pessimistic))
                    .ok_or_else(overflow)?;
                EvmValue::Defined(sum / Decimal::from(6))
            }
            EtcInput::EarnedValue => match (cpi, spi) {
                (EvmValue::Defined(c), EvmValue::Defined(s)) => c
                    .checked_mul(s)
                    .map_or(EvmValue::Undefined, |f| EvmValue::ratio(remaining_work, f)),
                _ => EvmValue::Undefined,
            },
        }
        .round(scale);

        let eac = etc.and_then(|etc| {
            ac.checked_add(etc)
                .map_or(EvmValue::Undefined, EvmValue::Defined)
        });
        let vac = eac.map(|eac| bac - eac);
        let tcpi = EvmValue::ratio(remaining_work, bac - ac);

        Ok(EarnedValueMetrics {
            project_id,
            wbs_node_id,
            measurement_date,
            planned_value: pv,
            earned_value: ev,
            actual_cost: ac,
            budget_at_completion: bac,
            cost_variance: ev - ac,
            schedule_variance: ev - pv,
            cost_performance_index: cpi.round(self.ratio_scale),
            schedule_performance_index: spi.round(self.ratio_scale),
            estimate_to_complete: etc,
            estimate_at_completion: eac,
            to_complete_performance_index: tcpi.round(self.ratio_scale),
            variance_at_completion: vac,
            etc: inputs.etc,
        })
    }
}

fn validate(inputs: &EvmInputs) -> DomainResult<()> {
    for (name, value) in [
        ("budget at completion", inputs.budget_at_completion),
        ("planned value", inputs.planned_value),
        ("actual cost", inputs.actual_cost),
    ] {
        if value < Decimal::ZERO {
            return Err(DomainError::validation(format!("{name} {value} is negative")));
        }
    }
    if inputs.progress_percentage < Decimal::ZERO || inputs.progress_percentage > ONE_HUNDRED {
        return Err(DomainError::validation(format!(
            "progress {} outside [0, 100]",
            inputs.progress_percentage
        )));
    }
    inputs.etc.validate()
}
