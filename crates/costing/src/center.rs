use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{
    CostCenterId, CostCodeId, DomainError, DomainResult, Entity, ProjectId, index_by_id,
};

use crate::cost::CostType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCenter {
    pub id: CostCenterId,
    pub project_id: ProjectId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_cost_center_id: Option<CostCenterId>,
    pub budget_amount: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Entity for CostCenter {
    type Id = CostCenterId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCode {
    pub id: CostCodeId,
    pub project_id: ProjectId,
    pub code: String,
    pub description: String,
    pub cost_type: CostType,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Entity for CostCode {
    type Id = CostCodeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Validated cost-center forest of one project.
#[derive(Debug, Clone, Default)]
pub struct CostCenterHierarchy {
    centers: HashMap<CostCenterId, CostCenter>,
    children: HashMap<CostCenterId, Vec<CostCenterId>>,
    roots: Vec<CostCenterId>,
}

impl CostCenterHierarchy {
    pub fn from_centers(project_id: ProjectId, centers: Vec<CostCenter>) -> DomainResult<Self> {
        let centers = index_by_id(centers).map_err(|dup| {
            DomainError::invalid_structure(format!("duplicate cost center {dup}"))
        })?;

        let mut children: HashMap<CostCenterId, Vec<CostCenterId>> = HashMap::new();
        let mut roots = Vec::new();
        for center in centers.values() {
            if center.project_id != project_id {
                return Err(DomainError::invalid_structure(format!(
                    "cost center {} belongs to project {}",
                    center.id, center.project_id
                )));
            }
            if center.budget_amount < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "cost center {} has negative budget",
                    center.id
                )));
            }
            match center.parent_cost_center_id {
                None => roots.push(center.id),
                Some(parent) if parent == center.id => {
                    return Err(DomainError::invalid_structure(format!(
                        "cost center {} is its own parent",
                        center.id
                    )));
                }
                Some(parent) if !centers.contains_key(&parent) => {
                    return Err(DomainError::invalid_structure(format!(
                        "cost center {} references missing parent {parent}",
                        center.id
                    )));
                }
                Some(parent) => children.entry(parent).or_default().push(center.id),
            }
        }

        // Every center must reach a root within `len` steps.
        for center in centers.values() {
            let mut cursor = center.parent_cost_center_id;
            let mut steps = 0;
            while let Some(id) = cursor {
                steps += 1;
                if steps > centers.len() {
                    return Err(DomainError::invalid_structure(format!(
                        "cost center {} is part of a cycle",
                        center.id
                    )));
                }
                cursor = centers.get(&id).and_then(|c| c.parent_cost_center_id);
            }
        }

        roots.sort_by(|a, b| centers[a].code.cmp(&centers[b].code));
        for list in children.values_mut() {
            list.sort_by(|a, b| centers[a].code.cmp(&centers[b].code));
        }

        Ok(Self {
            centers,
            children,
            roots,
        })
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn contains(&self, id: CostCenterId) -> bool {
        self.centers.contains_key(&id)
    }

    pub fn get(&self, id: CostCenterId) -> DomainResult<&CostCenter> {
        self.centers
            .get(&id)
            .ok_or_else(|| DomainError::not_found("cost center", id))
    }

    pub fn roots(&self) -> &[CostCenterId] {
        &self.roots
    }

    pub fn children(&self, id: CostCenterId) -> &[CostCenterId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All centers, children before parents.
    pub fn post_order(&self) -> Vec<CostCenterId> {
        let mut out = Vec::with_capacity(self.centers.len());
        let mut stack: Vec<(CostCenterId, bool)> =
            self.roots.iter().rev().map(|id| (*id, false)).collect();
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            for child in self.children(id).iter().rev() {
                stack.push((*child, false));
            }
        }
        out
    }
}
