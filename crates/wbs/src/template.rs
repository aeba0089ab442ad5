//! Reusable WBS templates (standard breakdowns per project type).

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{DomainError, DomainResult, ProjectId, TemplateId, WbsNodeId};

use crate::node::{WbsNode, WbsNodeType};
use crate::tree::WbsTree;

/// Template node; hierarchy is expressed through codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WbsTemplateNode {
    pub code: String,
    pub parent_code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub node_type: WbsNodeType,
    pub sequence_order: i32,
    pub estimated_hours: Decimal,
    pub is_mandatory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WbsTemplate {
    pub id: TemplateId,
    pub name: String,
    pub description: Option<String>,
    pub project_type: String,
    pub is_standard: bool,
    pub nodes: Vec<WbsTemplateNode>,
}

impl WbsTemplate {
    /// Build a fresh WBS for `project_id` from this template.
    ///
    /// Every node gets a new id and `planned_hours = estimated_hours`. When
    /// `include_optional` is false, non-mandatory nodes and everything below
    /// them are left out.
    pub fn instantiate(&self, project_id: ProjectId, include_optional: bool) -> DomainResult<WbsTree> {
        let mut by_code: HashMap<&str, &WbsTemplateNode> = HashMap::new();
        for node in &self.nodes {
            if by_code.insert(node.code.as_str(), node).is_some() {
                return Err(DomainError::invalid_structure(format!(
                    "template {} repeats code {}",
                    self.id, node.code
                )));
            }
        }

        let mut excluded: HashSet<&str> = HashSet::new();
        let mut levels: HashMap<&str, u32> = HashMap::new();
        for node in &self.nodes {
            let mut level = 0u32;
            let mut skip = !include_optional && !node.is_mandatory;
            let mut cursor = node.parent_code.as_deref();
            while let Some(code) = cursor {
                let parent = by_code.get(code).ok_or_else(|| {
                    DomainError::invalid_structure(format!(
                        "template node {} references missing parent {}",
                        node.code, code
                    ))
                })?;
                level += 1;
                if level as usize > self.nodes.len() {
                    return Err(DomainError::invalid_structure(format!(
                        "template {} contains a cycle through {}",
                        self.id, node.code
                    )));
                }
                skip |= !include_optional && !parent.is_mandatory;
                cursor = parent.parent_code.as_deref();
            }
            if skip {
                excluded.insert(node.code.as_str());
            } else {
                levels.insert(node.code.as_str(), level);
            }
        }

        let ids: HashMap<&str, WbsNodeId> = levels
            .keys()
            .map(|code| (*code, WbsNodeId::new()))
            .collect();

        let nodes = self
            .nodes
            .iter()
            .filter(|node| !excluded.contains(node.code.as_str()))
            .map(|node| WbsNode {
                id: ids[node.code.as_str()],
                project_id,
                parent_id: node.parent_code.as_deref().map(|code| ids[code]),
                code: node.code.clone(),
                name: node.name.clone(),
                description: node.description.clone(),
                node_type: node.node_type,
                level: levels[node.code.as_str()],
                sequence_order: node.sequence_order,
                budget_allocation: Decimal::ZERO,
                planned_hours: node.estimated_hours,
                responsible_user_id: None,
                start_date: None,
                end_date: None,
                is_active: true,
            })
            .collect();

        WbsTree::from_nodes(project_id, nodes)
    }
}
