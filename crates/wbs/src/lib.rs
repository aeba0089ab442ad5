//! Work breakdown structure: the structural backbone every roll-up walks.
//!
//! Pure domain logic only: no IO, no persistence concerns. Nodes live in an
//! arena keyed by id with a parent → ordered-children index; structural edits
//! go through the [`WbsTree`] aggregate so a rejected edit never mutates it.

pub mod edit;
pub mod node;
pub mod template;
pub mod tree;

pub use edit::{
    InsertNode, MoveNode, NewWbsNode, NodeInserted, NodeMoved, NodePatch, NodeUpdated,
    NodesRemoved, RemoveNode, UpdateNode, WbsCommand, WbsEvent,
};
pub use node::{WbsNode, WbsNodeType};
pub use template::{WbsTemplate, WbsTemplateNode};
pub use tree::WbsTree;
