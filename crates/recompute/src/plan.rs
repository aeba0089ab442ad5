use std::collections::BTreeMap;

use buildledger_core::{DomainResult, WbsNodeId};
use buildledger_wbs::WbsTree;

use crate::state::DirtyTracker;

/// Dirty nodes grouped into waves, deepest level first. Every node of a wave
/// depends only on nodes of earlier waves or on clean nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecomputePlan {
    waves: Vec<(u32, Vec<WbsNodeId>)>,
}

impl RecomputePlan {
    pub fn build(tree: &WbsTree, tracker: &DirtyTracker) -> DomainResult<Self> {
        let mut by_level: BTreeMap<u32, Vec<WbsNodeId>> = BTreeMap::new();
        for id in tracker.dirty_nodes(tree) {
            let level = tree.get(id)?.level;
            by_level.entry(level).or_default().push(id);
        }
        Ok(Self {
            waves: by_level.into_iter().rev().collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.waves.iter().map(|(_, w)| w.len()).sum()
    }

    /// `(level, nodes)` in execution order.
    pub fn waves(&self) -> &[(u32, Vec<WbsNodeId>)] {
        &self.waves
    }
}
