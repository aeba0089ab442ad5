use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use buildledger_core::ProjectId;
use buildledger_costing::CostForecast;
use buildledger_evm::EarnedValueMetrics;
use buildledger_progress::WeightedProgress;

use crate::error::SinkError;

/// Results of one pass, handed to whatever persists them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultBatch {
    pub project_id: ProjectId,
    pub as_of: DateTime<Utc>,
    pub progress: Vec<WeightedProgress>,
    pub metrics: Vec<EarnedValueMetrics>,
    pub forecasts: Vec<CostForecast>,
}

impl ResultBatch {
    pub fn is_empty(&self) -> bool {
        self.progress.is_empty() && self.metrics.is_empty() && self.forecasts.is_empty()
    }
}

/// Destination for recomputed results.
pub trait ResultSink: Send + Sync {
    fn publish(&self, batch: &ResultBatch) -> Result<(), SinkError>;
}

/// Keeps every published batch in memory.
#[derive(Debug, Default)]
pub struct InMemoryResultSink {
    batches: RwLock<Vec<ResultBatch>>,
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<ResultBatch> {
        self.batches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<ResultBatch> {
        self.batches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.batches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultSink for InMemoryResultSink {
    fn publish(&self, batch: &ResultBatch) -> Result<(), SinkError> {
        self.batches
            .write()
            .map_err(|e| SinkError::Storage(e.to_string()))?
            .push(batch.clone());
        Ok(())
    }
}
