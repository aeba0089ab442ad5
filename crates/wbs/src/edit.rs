//! Structural edits on the WBS tree (commands, events, aggregate impl).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{
    Aggregate, AggregateRoot, DomainError, ProjectId, UserId, WbsNodeId,
};
use buildledger_events::Event;

use crate::node::{WbsNode, WbsNodeType};
use crate::tree::{WbsTree, validate_amounts};

/// Attributes of a node to insert; `project_id` and `level` come from the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWbsNode {
    pub id: WbsNodeId,
    pub parent_id: Option<WbsNodeId>,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub node_type: WbsNodeType,
    pub sequence_order: i32,
    pub budget_allocation: Decimal,
    pub planned_hours: Decimal,
    pub responsible_user_id: Option<UserId>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Command: InsertNode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertNode {
    pub node: NewWbsNode,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MoveNode (re-parent and/or re-order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveNode {
    pub node_id: WbsNodeId,
    pub new_parent_id: Option<WbsNodeId>,
    pub sequence_order: i32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveNode. Without `cascade`, only childless nodes can go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveNode {
    pub node_id: WbsNodeId,
    pub cascade: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Attribute changes; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePatch {
    pub name: Option<String>,
    pub budget_allocation: Option<Decimal>,
    pub planned_hours: Option<Decimal>,
    pub is_active: Option<bool>,
    pub sequence_order: Option<i32>,
}

impl NodePatch {
    pub fn is_empty(&self) -> bool {
        self == &NodePatch::default()
    }
}

/// Command: UpdateNode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNode {
    pub node_id: WbsNodeId,
    pub patch: NodePatch,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WbsCommand {
    InsertNode(InsertNode),
    MoveNode(MoveNode),
    RemoveNode(RemoveNode),
    UpdateNode(UpdateNode),
}

/// Event: NodeInserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInserted {
    pub project_id: ProjectId,
    pub node: WbsNode,
    pub occurred_at: DateTime<Utc>,
}

/// Event: NodeMoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMoved {
    pub project_id: ProjectId,
    pub node_id: WbsNodeId,
    pub from_parent_id: Option<WbsNodeId>,
    pub to_parent_id: Option<WbsNodeId>,
    pub sequence_order: i32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: NodesRemoved. `removed` lists the subtree in post-order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodesRemoved {
    pub project_id: ProjectId,
    pub node_id: WbsNodeId,
    pub parent_id: Option<WbsNodeId>,
    pub removed: Vec<WbsNodeId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: NodeUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpdated {
    pub project_id: ProjectId,
    pub node_id: WbsNodeId,
    pub patch: NodePatch,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WbsEvent {
    NodeInserted(NodeInserted),
    NodeMoved(NodeMoved),
    NodesRemoved(NodesRemoved),
    NodeUpdated(NodeUpdated),
}

impl WbsEvent {
    /// Surviving nodes whose aggregated values may change because of this
    /// event. Callers dirty these and their ancestors.
    pub fn affected_nodes(&self) -> Vec<WbsNodeId> {
        match self {
            WbsEvent::NodeInserted(e) => {
                let mut out = vec![e.node.id];
                out.extend(e.node.parent_id);
                out
            }
            WbsEvent::NodeMoved(e) => {
                let mut out = vec![e.node_id];
                out.extend(e.from_parent_id);
                out.extend(e.to_parent_id);
                out
            }
            WbsEvent::NodesRemoved(e) => e.parent_id.into_iter().collect(),
            WbsEvent::NodeUpdated(e) => vec![e.node_id],
        }
    }

    /// Nodes that no longer exist after this event.
    pub fn removed_nodes(&self) -> &[WbsNodeId] {
        match self {
            WbsEvent::NodesRemoved(e) => &e.removed,
            _ => &[],
        }
    }
}

impl Event for WbsEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WbsEvent::NodeInserted(_) => "wbs.node.inserted",
            WbsEvent::NodeMoved(_) => "wbs.node.moved",
            WbsEvent::NodesRemoved(_) => "wbs.node.removed",
            WbsEvent::NodeUpdated(_) => "wbs.node.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn project_id(&self) -> ProjectId {
        match self {
            WbsEvent::NodeInserted(e) => e.project_id,
            WbsEvent::NodeMoved(e) => e.project_id,
            WbsEvent::NodesRemoved(e) => e.project_id,
            WbsEvent::NodeUpdated(e) => e.project_id,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WbsEvent::NodeInserted(e) => e.occurred_at,
            WbsEvent::NodeMoved(e) => e.occurred_at,
            WbsEvent::NodesRemoved(e) => e.occurred_at,
            WbsEvent::NodeUpdated(e) => e.occurred_at,
        }
    }
}

impl AggregateRoot for WbsTree {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.project_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for WbsTree {
    type Command = WbsCommand;
    type Event = WbsEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WbsEvent::NodeInserted(e) => {
                self.nodes.insert(e.node.id, e.node.clone());
                self.attach(e.node.id, e.node.parent_id);
            }
            WbsEvent::NodeMoved(e) => {
                self.detach(e.node_id, e.from_parent_id);
                if let Some(node) = self.nodes.get_mut(&e.node_id) {
                    node.parent_id = e.to_parent_id;
                    node.sequence_order = e.sequence_order;
                }
                self.attach(e.node_id, e.to_parent_id);
                self.relevel(e.node_id);
            }
            WbsEvent::NodesRemoved(e) => {
                self.detach(e.node_id, e.parent_id);
                for id in &e.removed {
                    self.nodes.remove(id);
                    self.children.remove(id);
                }
            }
            WbsEvent::NodeUpdated(e) => {
                let mut reorder = None;
                if let Some(node) = self.nodes.get_mut(&e.node_id) {
                    if let Some(name) = &e.patch.name {
                        node.name = name.clone();
                    }
                    if let Some(budget) = e.patch.budget_allocation {
                        node.budget_allocation = budget;
                    }
                    if let Some(hours) = e.patch.planned_hours {
                        node.planned_hours = hours;
                    }
                    if let Some(active) = e.patch.is_active {
                        node.is_active = active;
                    }
                    if let Some(order) = e.patch.sequence_order {
                        node.sequence_order = order;
                        reorder = Some(node.parent_id);
                    }
                }
                if let Some(parent_id) = reorder {
                    self.detach(e.node_id, parent_id);
                    self.attach(e.node_id, parent_id);
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WbsCommand::InsertNode(cmd) => self.handle_insert(cmd),
            WbsCommand::MoveNode(cmd) => self.handle_move(cmd),
            WbsCommand::RemoveNode(cmd) => self.handle_remove(cmd),
            WbsCommand::UpdateNode(cmd) => self.handle_update(cmd),
        }
    }
}

impl WbsTree {
    fn handle_insert(&self, cmd: &InsertNode) -> Result<Vec<WbsEvent>, DomainError> {
        let new = &cmd.node;
        if self.contains(new.id) {
            return Err(DomainError::invalid_structure(format!(
                "node {} already exists; use MoveNode to re-parent it",
                new.id
            )));
        }
        if new.parent_id == Some(new.id) {
            return Err(DomainError::invalid_structure("a node cannot be its own parent"));
        }
        if new.code.trim().is_empty() {
            return Err(DomainError::validation("wbs code must not be empty"));
        }
        validate_amounts(new.budget_allocation, new.planned_hours)?;

        let level = match new.parent_id {
            Some(parent_id) => self.get(parent_id)?.level + 1,
            None => 0,
        };
        if !self.sequence_free(new.parent_id, new.sequence_order, None) {
            return Err(DomainError::invalid_structure(format!(
                "sequence_order {} already used among siblings",
                new.sequence_order
            )));
        }

        Ok(vec![WbsEvent::NodeInserted(NodeInserted {
            project_id: self.project_id,
            node: WbsNode {
                id: new.id,
                project_id: self.project_id,
                parent_id: new.parent_id,
                code: new.code.clone(),
                name: new.name.clone(),
                description: new.description.clone(),
                node_type: new.node_type,
                level,
                sequence_order: new.sequence_order,
                budget_allocation: new.budget_allocation,
                planned_hours: new.planned_hours,
                responsible_user_id: new.responsible_user_id,
                start_date: new.start_date,
                end_date: new.end_date,
                is_active: true,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_move(&self, cmd: &MoveNode) -> Result<Vec<WbsEvent>, DomainError> {
        let node = self.get(cmd.node_id)?;
        if let Some(parent_id) = cmd.new_parent_id {
            if parent_id == cmd.node_id {
                return Err(DomainError::invalid_structure("a node cannot be its own parent"));
            }
            self.get(parent_id)?;
            if self.is_descendant(parent_id, cmd.node_id)? {
                return Err(DomainError::invalid_structure(format!(
                    "moving {} under its descendant {} would create a cycle",
                    cmd.node_id, parent_id
                )));
            }
        }
        if !self.sequence_free(cmd.new_parent_id, cmd.sequence_order, Some(cmd.node_id)) {
            return Err(DomainError::invalid_structure(format!(
                "sequence_order {} already used among siblings",
                cmd.sequence_order
            )));
        }

        Ok(vec![WbsEvent::NodeMoved(NodeMoved {
            project_id: self.project_id,
            node_id: cmd.node_id,
            from_parent_id: node.parent_id,
            to_parent_id: cmd.new_parent_id,
            sequence_order: cmd.sequence_order,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveNode) -> Result<Vec<WbsEvent>, DomainError> {
        let node = self.get(cmd.node_id)?;
        let removed = self.post_order(cmd.node_id)?;
        if removed.len() > 1 && !cmd.cascade {
            return Err(DomainError::invalid_structure(format!(
                "node {} has children; remove them first or cascade",
                cmd.node_id
            )));
        }

        Ok(vec![WbsEvent::NodesRemoved(NodesRemoved {
            project_id: self.project_id,
            node_id: cmd.node_id,
            parent_id: node.parent_id,
            removed,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateNode) -> Result<Vec<WbsEvent>, DomainError> {
        let node = self.get(cmd.node_id)?;
        if cmd.patch.is_empty() {
            return Ok(vec![]);
        }
        validate_amounts(
            cmd.patch.budget_allocation.unwrap_or(node.budget_allocation),
            cmd.patch.planned_hours.unwrap_or(node.planned_hours),
        )?;
        if let Some(order) = cmd.patch.sequence_order {
            if !self.sequence_free(node.parent_id, order, Some(node.id)) {
                return Err(DomainError::invalid_structure(format!(
                    "sequence_order {order} already used among siblings"
                )));
            }
        }

        Ok(vec![WbsEvent::NodeUpdated(NodeUpdated {
            project_id: self.project_id,
            node_id: cmd.node_id,
            patch: cmd.patch.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
