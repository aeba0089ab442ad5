//! Per-node recompute state.
//!
//! ```text
//! Clean ──mark──▶ Dirty ──start──▶ Computing ──finish──▶ Clean
//!                   ▲                  │
//!                   └──────fail/mark───┘
//! ```
//!
//! Marking a node dirty marks every ancestor dirty as well; descendants and
//! siblings keep their state. A node the tracker has never seen is Dirty.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use buildledger_core::{DomainError, DomainResult, WbsNodeId};
use buildledger_wbs::WbsTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Clean,
    Dirty,
    Computing,
}

#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    states: HashMap<WbsNodeId, NodeState>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, node_id: WbsNodeId) -> NodeState {
        self.states
            .get(&node_id)
            .copied()
            .unwrap_or(NodeState::Dirty)
    }

    pub fn is_clean(&self, node_id: WbsNodeId) -> bool {
        self.state(node_id) == NodeState::Clean
    }

    /// Mark `node_id` and its ancestors dirty. Returns the nodes whose state
    /// changed.
    pub fn mark_dirty(&mut self, tree: &WbsTree, node_id: WbsNodeId) -> DomainResult<Vec<WbsNodeId>> {
        let chain = tree.ancestor_ids(node_id)?;
        let mut changed = Vec::new();
        for id in chain {
            if self.state(id) != NodeState::Dirty {
                changed.push(id);
            }
            self.states.insert(id, NodeState::Dirty);
        }
        Ok(changed)
    }

    /// Mark every node of `tree` dirty. Returns the nodes whose state
    /// changed.
    pub fn mark_all_dirty(&mut self, tree: &WbsTree) -> Vec<WbsNodeId> {
        let mut changed = Vec::new();
        for node in tree.iter() {
            if self.state(node.id) != NodeState::Dirty {
                changed.push(node.id);
            }
            self.states.insert(node.id, NodeState::Dirty);
        }
        changed.sort();
        changed
    }

    /// Dirty → Computing.
    pub fn start(&mut self, node_id: WbsNodeId) -> DomainResult<()> {
        self.transition(node_id, NodeState::Dirty, NodeState::Computing)
    }

    /// Computing → Clean.
    pub fn finish(&mut self, node_id: WbsNodeId) -> DomainResult<()> {
        self.transition(node_id, NodeState::Computing, NodeState::Clean)
    }

    /// Computing → Dirty.
    pub fn fail(&mut self, node_id: WbsNodeId) -> DomainResult<()> {
        self.transition(node_id, NodeState::Computing, NodeState::Dirty)
    }

    /// Drop a removed node.
    pub fn forget(&mut self, node_id: WbsNodeId) {
        self.states.remove(&node_id);
    }

    /// Dirty nodes of `tree`, including nodes never computed.
    pub fn dirty_nodes(&self, tree: &WbsTree) -> Vec<WbsNodeId> {
        let mut out: Vec<WbsNodeId> = tree
            .iter()
            .map(|n| n.id)
            .filter(|id| self.state(*id) == NodeState::Dirty)
            .collect();
        out.sort();
        out
    }

    fn transition(&mut self, node_id: WbsNodeId, from: NodeState, to: NodeState) -> DomainResult<()> {
        let current = self.state(node_id);
        if current != from {
            return Err(DomainError::conflict(format!(
                "node {node_id} is {current:?}, cannot move to {to:?}"
            )));
        }
        self.states.insert(node_id, to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildledger_core::ProjectId;
    use buildledger_wbs::{WbsNode, WbsNodeType};
    use rust_decimal::Decimal;

    fn node(project_id: ProjectId, parent: Option<&WbsNode>, order: i32) -> WbsNode {
        WbsNode {
            id: WbsNodeId::new(),
            project_id,
            parent_id: parent.map(|p| p.id),
            code: format!("S{order}"),
            name: format!("s{order}"),
            description: None,
            node_type: WbsNodeType::Deliverable,
            level: parent.map(|p| p.level + 1).unwrap_or(0),
            sequence_order: order,
            budget_allocation: Decimal::ZERO,
            planned_hours: Decimal::ZERO,
            responsible_user_id: None,
            start_date: None,
            end_date: None,
            is_active: true,
        }
    }

    fn clean_all(tracker: &mut DirtyTracker, tree: &WbsTree) {
        for id in tree.post_order_all() {
            tracker.start(id).unwrap();
            tracker.finish(id).unwrap();
        }
    }

    #[test]
    fn dirty_propagates_to_ancestors_only() {
        let p = ProjectId::new();
        let root = node(p, None, 1);
        let a = node(p, Some(&root), 1);
        let b = node(p, Some(&root), 2);
        let a1 = node(p, Some(&a), 1);
        let a2 = node(p, Some(&a), 2);
        let ids = [root.id, a.id, b.id, a1.id, a2.id];
        let tree = WbsTree::from_nodes(p, vec![root, a, b, a1, a2]).unwrap();

        let mut tracker = DirtyTracker::new();
        assert_eq!(tracker.dirty_nodes(&tree).len(), 5);
        clean_all(&mut tracker, &tree);
        assert!(tracker.dirty_nodes(&tree).is_empty());

        let changed = tracker.mark_dirty(&tree, ids[3]).unwrap();
        assert_eq!(changed, vec![ids[3], ids[1], ids[0]]);
        assert_eq!(tracker.state(ids[2]), NodeState::Clean);
        assert_eq!(tracker.state(ids[4]), NodeState::Clean);

        // Already dirty: nothing changes.
        assert!(tracker.mark_dirty(&tree, ids[1]).unwrap().is_empty());
    }

    #[test]
    fn mark_all_dirty_reports_only_changed_nodes() {
        let p = ProjectId::new();
        let root = node(p, None, 1);
        let a = node(p, Some(&root), 1);
        let b = node(p, Some(&root), 2);
        let (a_id, b_id) = (a.id, b.id);
        let tree = WbsTree::from_nodes(p, vec![root, a, b]).unwrap();

        let mut tracker = DirtyTracker::new();
        clean_all(&mut tracker, &tree);
        tracker.mark_dirty(&tree, a_id).unwrap();

        let changed = tracker.mark_all_dirty(&tree);
        assert_eq!(changed, vec![b_id]);
        assert_eq!(tracker.dirty_nodes(&tree).len(), 3);
    }

    #[test]
    fn illegal_transitions_conflict() {
        let mut tracker = DirtyTracker::new();
        let id = WbsNodeId::new();
        assert!(matches!(tracker.finish(id), Err(DomainError::Conflict(_))));
        tracker.start(id).unwrap();
        assert!(matches!(tracker.start(id), Err(DomainError::Conflict(_))));
        tracker.fail(id).unwrap();
        assert_eq!(tracker.state(id), NodeState::Dirty);
        tracker.start(id).unwrap();
        tracker.finish(id).unwrap();
        assert!(matches!(tracker.fail(id), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn unknown_nodes_are_rejected_when_marking() {
        let p = ProjectId::new();
        let tree = WbsTree::from_nodes(p, vec![node(p, None, 1)]).unwrap();
        let mut tracker = DirtyTracker::new();
        assert!(matches!(
            tracker.mark_dirty(&tree, WbsNodeId::new()),
            Err(DomainError::NotFound { .. })
        ));
    }
}
