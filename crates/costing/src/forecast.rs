use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{
    CostCenterId, DomainError, DomainResult, Entity, ForecastId, ProjectId, WbsNodeId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    BottomUp,
    TopDown,
    Parametric,
    ThreePoint,
    EarnedValue,
}

/// Estimate-at-completion record for a node and/or cost center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostForecast {
    pub id: ForecastId,
    pub project_id: ProjectId,
    pub wbs_node_id: Option<WbsNodeId>,
    pub cost_center_id: Option<CostCenterId>,
    pub forecast_date: DateTime<Utc>,
    pub forecast_method: ForecastMethod,
    pub budget_at_completion: Decimal,
    pub actual_cost_to_date: Decimal,
    pub committed_costs: Decimal,
    pub estimate_to_complete: Decimal,
    pub estimate_at_completion: Decimal,
    /// `budget_at_completion - estimate_at_completion`.
    pub variance_at_completion: Decimal,
    /// In `[0, 1]`.
    pub confidence_level: Decimal,
    pub created_by: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CostForecast {
    pub fn validate(&self) -> DomainResult<()> {
        if self.confidence_level < Decimal::ZERO || self.confidence_level > Decimal::ONE {
            return Err(DomainError::validation(format!(
                "confidence level {} outside [0, 1]",
                self.confidence_level
            )));
        }
        if self.budget_at_completion - self.estimate_at_completion != self.variance_at_completion {
            return Err(DomainError::validation(format!(
                "forecast {} variance does not equal BAC - EAC",
                self.id
            )));
        }
        Ok(())
    }
}

impl Entity for CostForecast {
    type Id = ForecastId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Recorded forecasts of one project, indexed by WBS node.
#[derive(Debug, Clone)]
pub struct ForecastBook {
    project_id: ProjectId,
    by_node: HashMap<WbsNodeId, Vec<CostForecast>>,
    unassigned: Vec<CostForecast>,
}

impl ForecastBook {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            by_node: HashMap::new(),
            unassigned: Vec::new(),
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn record(&mut self, forecast: CostForecast) -> DomainResult<()> {
        if forecast.project_id != self.project_id {
            return Err(DomainError::validation(format!(
                "forecast {} belongs to project {}",
                forecast.id, forecast.project_id
            )));
        }
        forecast.validate()?;
        match forecast.wbs_node_id {
            Some(node_id) => self.by_node.entry(node_id).or_default().push(forecast),
            None => self.unassigned.push(forecast),
        }
        Ok(())
    }

    /// Latest forecast for `node_id` dated on or before `as_of`.
    pub fn latest_for_node(
        &self,
        node_id: WbsNodeId,
        as_of: DateTime<Utc>,
    ) -> Option<&CostForecast> {
        self.by_node
            .get(&node_id)?
            .iter()
            .filter(|f| f.forecast_date <= as_of)
            .max_by_key(|f| (f.forecast_date, f.created_at, f.id))
    }

    /// Nodes that have at least one forecast.
    pub fn nodes(&self) -> impl Iterator<Item = WbsNodeId> + '_ {
        self.by_node.keys().copied()
    }

    /// Project-level forecasts not tied to a node.
    pub fn unassigned(&self) -> &[CostForecast] {
        &self.unassigned
    }
}
