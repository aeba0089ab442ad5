use std::collections::HashMap;

use buildledger_core::{DomainError, DomainResult, ProjectId, WbsNodeId};
use buildledger_costing::{AllocationLedger, ForecastBook, ForecastMethod};
use buildledger_evm::{Baseline, EtcInput};
use buildledger_progress::ProgressBook;

/// Everything a pass reads besides the tree itself.
#[derive(Debug, Clone)]
pub struct ProjectInputs {
    pub progress: ProgressBook,
    pub costs: AllocationLedger,
    pub forecasts: ForecastBook,
    pub baseline: Baseline,
    etc_inputs: HashMap<WbsNodeId, EtcInput>,
}

impl ProjectInputs {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            progress: ProgressBook::new(project_id),
            costs: AllocationLedger::new(project_id),
            forecasts: ForecastBook::new(project_id),
            baseline: Baseline::new(project_id),
            etc_inputs: HashMap::new(),
        }
    }

    /// Assemble from parts that must all belong to `project_id`.
    pub fn from_parts(
        project_id: ProjectId,
        progress: ProgressBook,
        costs: AllocationLedger,
        forecasts: ForecastBook,
        baseline: Baseline,
    ) -> DomainResult<Self> {
        let owners = [
            ("progress book", progress.project_id()),
            ("cost ledger", costs.project_id()),
            ("forecast book", forecasts.project_id()),
            ("baseline", baseline.project_id),
        ];
        for (part, owner) in owners {
            if owner != project_id {
                return Err(DomainError::validation(format!(
                    "{part} belongs to project {owner}, not {project_id}"
                )));
            }
        }
        Ok(Self {
            progress,
            costs,
            forecasts,
            baseline,
            etc_inputs: HashMap::new(),
        })
    }

    pub fn project_id(&self) -> ProjectId {
        self.progress.project_id()
    }

    /// Use `input` for `node_id` instead of the default method.
    pub fn set_etc_input(&mut self, node_id: WbsNodeId, input: EtcInput) -> DomainResult<()> {
        input.validate()?;
        self.etc_inputs.insert(node_id, input);
        Ok(())
    }

    /// Explicit input for the node, else the default method, else parametric.
    pub fn etc_for(&self, node_id: WbsNodeId, default_method: ForecastMethod) -> EtcInput {
        self.etc_inputs
            .get(&node_id)
            .copied()
            .or_else(|| EtcInput::derived(default_method))
            .unwrap_or(EtcInput::Parametric)
    }

    pub(crate) fn forget_node(&mut self, node_id: WbsNodeId) {
        self.etc_inputs.remove(&node_id);
    }
}
