use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use buildledger_core::{DomainError, DomainResult, ProjectId, WbsNodeId, index_by_id};

use crate::node::WbsNode;

/// Aggregate root: the WBS of one project.
///
/// Arena of nodes keyed by id plus an adjacency index (parent → children
/// ordered by `sequence_order`). Nodes never own their children, so there is
/// no ownership cycle to manage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WbsTree {
    pub(crate) project_id: ProjectId,
    pub(crate) nodes: HashMap<WbsNodeId, WbsNode>,
    pub(crate) children: HashMap<WbsNodeId, Vec<WbsNodeId>>,
    pub(crate) roots: Vec<WbsNodeId>,
    pub(crate) version: u64,
}

impl WbsTree {
    /// Empty tree for a project.
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            nodes: HashMap::new(),
            children: HashMap::new(),
            roots: Vec::new(),
            version: 0,
        }
    }

    /// Load an externally supplied snapshot, validating the forest invariant.
    ///
    /// Rejects duplicate ids, foreign-project nodes, dangling parents, cycles,
    /// inconsistent levels and duplicate sibling `sequence_order`s.
    pub fn from_nodes(project_id: ProjectId, nodes: Vec<WbsNode>) -> DomainResult<Self> {
        let nodes = index_by_id(nodes).map_err(|dup| {
            DomainError::invalid_structure(format!("duplicate wbs node id {dup}"))
        })?;

        for node in nodes.values() {
            if node.project_id != project_id {
                return Err(DomainError::invalid_structure(format!(
                    "node {} belongs to project {}, not {}",
                    node.id, node.project_id, project_id
                )));
            }
            validate_amounts(node.budget_allocation, node.planned_hours)?;
            match node.parent_id {
                Some(parent_id) if parent_id == node.id => {
                    return Err(DomainError::invalid_structure(format!(
                        "node {} is its own parent",
                        node.id
                    )));
                }
                Some(parent_id) if !nodes.contains_key(&parent_id) => {
                    return Err(DomainError::invalid_structure(format!(
                        "node {} references missing parent {}",
                        node.id, parent_id
                    )));
                }
                _ => {}
            }
        }

        // Every parent chain must reach a root within `len` steps.
        for node in nodes.values() {
            let mut steps = 0usize;
            let mut cursor = node.parent_id;
            while let Some(parent_id) = cursor {
                steps += 1;
                if steps > nodes.len() {
                    return Err(DomainError::invalid_structure(format!(
                        "cycle detected through node {}",
                        node.id
                    )));
                }
                cursor = nodes.get(&parent_id).and_then(|p| p.parent_id);
            }
            let expected_level = steps as u32;
            if node.level != expected_level {
                return Err(DomainError::invalid_structure(format!(
                    "node {} has level {} but depth {}",
                    node.id, node.level, expected_level
                )));
            }
        }

        let mut tree = Self::new(project_id);
        tree.nodes = nodes;
        let ids: Vec<WbsNodeId> = tree.nodes.keys().copied().collect();
        for id in ids {
            let parent_id = tree.nodes[&id].parent_id;
            tree.attach(id, parent_id);
        }

        for siblings in tree.children.values().chain(std::iter::once(&tree.roots)) {
            let mut seen = HashSet::new();
            for id in siblings {
                let order = tree.nodes[id].sequence_order;
                if !seen.insert(order) {
                    return Err(DomainError::invalid_structure(format!(
                        "duplicate sequence_order {order} among siblings of node {id}"
                    )));
                }
            }
        }

        Ok(tree)
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: WbsNodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Lookup that fails with `NotFound`.
    pub fn get(&self, id: WbsNodeId) -> DomainResult<&WbsNode> {
        self.nodes
            .get(&id)
            .ok_or_else(|| DomainError::not_found("wbs node", id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WbsNode> {
        self.nodes.values()
    }

    /// Root nodes ordered by `sequence_order`.
    pub fn roots(&self) -> Vec<&WbsNode> {
        self.roots.iter().map(|id| &self.nodes[id]).collect()
    }

    pub fn root_ids(&self) -> &[WbsNodeId] {
        &self.roots
    }

    /// Child ids ordered by `sequence_order` (active and inactive).
    pub fn child_ids(&self, id: WbsNodeId) -> DomainResult<&[WbsNodeId]> {
        self.get(id)?;
        Ok(self.children.get(&id).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Children ordered by `sequence_order` (active and inactive).
    pub fn children(&self, id: WbsNodeId) -> DomainResult<Vec<&WbsNode>> {
        Ok(self
            .child_ids(id)?
            .iter()
            .map(|child| &self.nodes[child])
            .collect())
    }

    /// Active children ordered by `sequence_order`.
    pub fn active_children(&self, id: WbsNodeId) -> DomainResult<Vec<&WbsNode>> {
        Ok(self
            .children(id)?
            .into_iter()
            .filter(|child| child.is_active)
            .collect())
    }

    /// A node is a leaf for roll-up purposes when it has no active children.
    pub fn is_leaf(&self, id: WbsNodeId) -> DomainResult<bool> {
        Ok(self.active_children(id)?.is_empty())
    }

    /// The node itself followed by each ancestor up to its root.
    pub fn ancestors(&self, id: WbsNodeId) -> DomainResult<Vec<&WbsNode>> {
        let mut chain = vec![self.get(id)?];
        let mut cursor = chain[0].parent_id;
        while let Some(parent_id) = cursor {
            let parent = self.get(parent_id)?;
            chain.push(parent);
            cursor = parent.parent_id;
        }
        Ok(chain)
    }

    pub fn ancestor_ids(&self, id: WbsNodeId) -> DomainResult<Vec<WbsNodeId>> {
        Ok(self.ancestors(id)?.into_iter().map(|n| n.id).collect())
    }

    /// Whether `a` sits strictly below `b`.
    pub fn is_descendant(&self, a: WbsNodeId, b: WbsNodeId) -> DomainResult<bool> {
        self.get(b)?;
        Ok(self.ancestors(a)?.iter().skip(1).any(|n| n.id == b))
    }

    /// All nodes below `id` in pre-order (excluding `id`).
    pub fn descendants(&self, id: WbsNodeId) -> DomainResult<Vec<WbsNodeId>> {
        let mut out = Vec::new();
        let mut stack: Vec<WbsNodeId> = self.child_ids(id)?.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(kids) = self.children.get(&next) {
                stack.extend(kids.iter().rev().copied());
            }
        }
        Ok(out)
    }

    /// Subtree rooted at `id` in post-order (children before parents).
    pub fn post_order(&self, id: WbsNodeId) -> DomainResult<Vec<WbsNodeId>> {
        self.get(id)?;
        let mut out = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((next, expanded)) = stack.pop() {
            if expanded {
                out.push(next);
                continue;
            }
            stack.push((next, true));
            if let Some(kids) = self.children.get(&next) {
                stack.extend(kids.iter().rev().map(|k| (*k, false)));
            }
        }
        Ok(out)
    }

    /// Whole forest in post-order, roots in `sequence_order`.
    pub fn post_order_all(&self) -> Vec<WbsNodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for root in &self.roots {
            if let Ok(subtree) = self.post_order(*root) {
                out.extend(subtree);
            }
        }
        out
    }

    /// Number of levels (0 for an empty tree).
    pub fn height(&self) -> u32 {
        self.nodes.values().map(|n| n.level + 1).max().unwrap_or(0)
    }

    /// Whether `sequence_order` is free among the children of `parent_id`,
    /// ignoring `except` (the node being re-ordered, if any).
    pub(crate) fn sequence_free(
        &self,
        parent_id: Option<WbsNodeId>,
        sequence_order: i32,
        except: Option<WbsNodeId>,
    ) -> bool {
        let siblings = match parent_id {
            Some(p) => self.children.get(&p).map(Vec::as_slice).unwrap_or(&[]),
            None => self.roots.as_slice(),
        };
        !siblings
            .iter()
            .filter(|id| Some(**id) != except)
            .any(|id| self.nodes[id].sequence_order == sequence_order)
    }

    pub(crate) fn attach(&mut self, id: WbsNodeId, parent_id: Option<WbsNodeId>) {
        let order = self.nodes[&id].sequence_order;
        let nodes = &self.nodes;
        let list = match parent_id {
            Some(p) => self.children.entry(p).or_default(),
            None => &mut self.roots,
        };
        let pos = list
            .iter()
            .position(|other| nodes[other].sequence_order > order)
            .unwrap_or(list.len());
        list.insert(pos, id);
    }

    pub(crate) fn detach(&mut self, id: WbsNodeId, parent_id: Option<WbsNodeId>) {
        match parent_id {
            Some(p) => {
                if let Some(list) = self.children.get_mut(&p) {
                    list.retain(|c| *c != id);
                    if list.is_empty() {
                        self.children.remove(&p);
                    }
                }
            }
            None => self.roots.retain(|c| *c != id),
        }
    }

    /// Re-derive `level` for `id` and everything below it.
    pub(crate) fn relevel(&mut self, id: WbsNodeId) {
        let base = self.nodes[&id]
            .parent_id
            .and_then(|p| self.nodes.get(&p))
            .map(|p| p.level + 1)
            .unwrap_or(0);
        let mut stack = vec![(id, base)];
        while let Some((next, level)) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(&next) {
                node.level = level;
            }
            if let Some(kids) = self.children.get(&next) {
                stack.extend(kids.iter().map(|k| (*k, level + 1)));
            }
        }
    }
}

pub(crate) fn validate_amounts(budget: Decimal, hours: Decimal) -> DomainResult<()> {
    if budget < Decimal::ZERO {
        return Err(DomainError::validation("budget_allocation must not be negative"));
    }
    if hours < Decimal::ZERO {
        return Err(DomainError::validation("planned_hours must not be negative"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::node::WbsNodeType;

    pub(crate) fn node(
        project_id: ProjectId,
        id: WbsNodeId,
        parent: Option<&WbsNode>,
        sequence_order: i32,
        budget: i64,
    ) -> WbsNode {
        WbsNode {
            id,
            project_id,
            parent_id: parent.map(|p| p.id),
            code: format!("N{sequence_order}"),
            name: format!("node {sequence_order}"),
            description: None,
            node_type: if parent.is_none() {
                WbsNodeType::Project
            } else {
                WbsNodeType::WorkPackage
            },
            level: parent.map(|p| p.level + 1).unwrap_or(0),
            sequence_order,
            budget_allocation: Decimal::from(budget),
            planned_hours: Decimal::ZERO,
            responsible_user_id: None,
            start_date: None,
            end_date: None,
            is_active: true,
        }
    }

    /// root ─┬─ a ─┬─ a1
    ///       │     └─ a2
    ///       └─ b
    pub(crate) fn sample() -> (WbsTree, [WbsNodeId; 5]) {
        let project_id = ProjectId::new();
        let root = node(project_id, WbsNodeId::new(), None, 1, 1000);
        let a = node(project_id, WbsNodeId::new(), Some(&root), 1, 600);
        let b = node(project_id, WbsNodeId::new(), Some(&root), 2, 400);
        let a1 = node(project_id, WbsNodeId::new(), Some(&a), 1, 300);
        let a2 = node(project_id, WbsNodeId::new(), Some(&a), 2, 300);
        let ids = [root.id, a.id, b.id, a1.id, a2.id];
        // Deliberately shuffled input order.
        let tree = WbsTree::from_nodes(project_id, vec![a2, b, root, a1, a]).unwrap();
        (tree, ids)
    }

    #[test]
    fn children_come_back_in_sequence_order() {
        let (tree, [root, a, b, a1, a2]) = sample();
        let kids: Vec<_> = tree.children(root).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(kids, vec![a, b]);
        let kids: Vec<_> = tree.children(a).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(kids, vec![a1, a2]);
        assert!(tree.children(b).unwrap().is_empty());
    }

    #[test]
    fn ancestors_run_from_node_to_root() {
        let (tree, [root, a, _, a1, _]) = sample();
        assert_eq!(tree.ancestor_ids(a1).unwrap(), vec![a1, a, root]);
        assert_eq!(tree.ancestor_ids(root).unwrap(), vec![root]);
    }

    #[test]
    fn descendant_relation_is_strict() {
        let (tree, [root, a, b, a1, _]) = sample();
        assert!(tree.is_descendant(a1, root).unwrap());
        assert!(tree.is_descendant(a1, a).unwrap());
        assert!(!tree.is_descendant(a, a).unwrap());
        assert!(!tree.is_descendant(a1, b).unwrap());
        assert!(!tree.is_descendant(root, a1).unwrap());
    }

    #[test]
    fn missing_ids_are_not_found() {
        let (tree, [root, ..]) = sample();
        let ghost = WbsNodeId::new();
        assert!(matches!(tree.children(ghost), Err(DomainError::NotFound { .. })));
        assert!(matches!(tree.ancestors(ghost), Err(DomainError::NotFound { .. })));
        assert!(matches!(tree.is_descendant(root, ghost), Err(DomainError::NotFound { .. })));
    }

    #[test]
    fn post_order_visits_children_first() {
        let (tree, [root, a, b, a1, a2]) = sample();
        assert_eq!(tree.post_order(root).unwrap(), vec![a1, a2, a, b, root]);
        assert_eq!(tree.descendants(root).unwrap(), vec![a, a1, a2, b]);
        assert_eq!(tree.height(), 3);
    }

    #[test]
    fn rejects_cycles_in_snapshots() {
        let project_id = ProjectId::new();
        let mut x = node(project_id, WbsNodeId::new(), None, 1, 0);
        let mut y = node(project_id, WbsNodeId::new(), Some(&x), 1, 0);
        x.parent_id = Some(y.id);
        x.level = 1;
        y.level = 1;
        let err = WbsTree::from_nodes(project_id, vec![x, y]).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStructure(_)));
    }

    #[test]
    fn rejects_inconsistent_levels_and_sibling_order() {
        let project_id = ProjectId::new();
        let root = node(project_id, WbsNodeId::new(), None, 1, 0);
        let mut child = node(project_id, WbsNodeId::new(), Some(&root), 1, 0);
        child.level = 5;
        let err = WbsTree::from_nodes(project_id, vec![root.clone(), child]).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStructure(_)));

        let c1 = node(project_id, WbsNodeId::new(), Some(&root), 3, 0);
        let c2 = node(project_id, WbsNodeId::new(), Some(&root), 3, 0);
        let err = WbsTree::from_nodes(project_id, vec![root, c1, c2]).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStructure(msg) if msg.contains("sequence_order")));
    }

    #[test]
    fn rejects_foreign_project_nodes() {
        let project_id = ProjectId::new();
        let stray = node(ProjectId::new(), WbsNodeId::new(), None, 1, 0);
        assert!(matches!(
            WbsTree::from_nodes(project_id, vec![stray]),
            Err(DomainError::InvalidStructure(_))
        ));
    }
}
