use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{Entity, ProjectId, UserId, WbsNodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WbsNodeType {
    Project,
    Phase,
    Deliverable,
    WorkPackage,
}

/// One element of the breakdown.
///
/// `parent_id` is a back-pointer only; the owning [`crate::WbsTree`] keeps the
/// ordered child index. `level` is derived from the parent (root = 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WbsNode {
    pub id: WbsNodeId,
    pub project_id: ProjectId,
    pub parent_id: Option<WbsNodeId>,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub node_type: WbsNodeType,
    pub level: u32,
    /// Ordering among siblings (unique per parent).
    pub sequence_order: i32,
    pub budget_allocation: Decimal,
    pub planned_hours: Decimal,
    pub responsible_user_id: Option<UserId>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl WbsNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl Entity for WbsNode {
    type Id = WbsNodeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
