//! Core types for the conversation tree: node handles, turns, and the
//! arena that owns them.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use loom_common::{new_id, HistoryEntry, Role};
use serde::{Deserialize, Serialize};

use crate::Message;

/// Stable handle to a turn inside one [`ConversationTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(super) usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// One message in the tree. Children are kept in creation order.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub(super) role: Role,
    pub(super) content: String,
    pub(super) children: Vec<NodeId>,
    pub(super) active_child: usize,
    pub(super) parent: Option<NodeId>,
}

impl Turn {
    pub(super) fn new(role: Role, content: String, parent: Option<NodeId>) -> Self {
        Self {
            role,
            content,
            children: Vec::new(),
            active_child: 0,
            parent,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Index of the canonical child. Meaningless when there are no children.
    pub fn active_child_index(&self) -> usize {
        self.active_child
    }

    pub fn active_child(&self) -> Option<NodeId> {
        self.children.get(self.active_child).copied()
    }
}

/// Which way to cycle through sibling branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Prev,
}

impl FromStr for Direction {
    type Err = Rejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(Direction::Next),
            "prev" => Ok(Direction::Prev),
            other => Err(Rejection::UnknownDirection(other.to_string())),
        }
    }
}

/// Why a structural operation was refused. The tree is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("expected a {expected} turn, found a {found} turn")]
    WrongRole { expected: Role, found: Role },
    #[error("the root turn has no parent to branch under")]
    AtRoot,
    #[error("unknown direction {0:?} (expected \"next\" or \"prev\")")]
    UnknownDirection(String),
}

/// Result of a structural operation: the history after it ran, plus the
/// rejection if it was a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub history: Vec<HistoryEntry>,
    pub rejection: Option<Rejection>,
}

impl Outcome {
    pub fn applied(history: Vec<HistoryEntry>) -> Self {
        Self {
            history,
            rejection: None,
        }
    }

    pub fn rejected(history: Vec<HistoryEntry>, rejection: Rejection) -> Self {
        Self {
            history,
            rejection: Some(rejection),
        }
    }

    pub fn is_applied(&self) -> bool {
        self.rejection.is_none()
    }

    pub fn into_result(self) -> Result<Vec<HistoryEntry>, Rejection> {
        match self.rejection {
            None => Ok(self.history),
            Some(rejection) => Err(rejection),
        }
    }
}

/// Branch-preserving conversation tree.
///
/// Turns live in an arena indexed by [`NodeId`]; parents own children by
/// handle and the parent link is a plain handle too. Turns are never
/// removed, so every handle stays valid for the lifetime of the tree.
#[derive(Debug, Clone)]
pub struct ConversationTree {
    pub(super) id: String,
    pub(super) name: String,
    pub(super) last_modified: DateTime<Utc>,
    pub(super) nodes: Vec<Turn>,
    pub(super) current: NodeId,
}

impl ConversationTree {
    /// Fresh tree holding only the root turn, which is also the current node.
    pub fn new(root_role: Role, root_content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: String::new(),
            last_modified: Utc::now(),
            nodes: vec![Turn::new(root_role, root_content.into(), None)],
            current: NodeId::ROOT,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn current_turn(&self) -> &Turn {
        self.turn(self.current)
    }

    pub fn node(&self, id: NodeId) -> Option<&Turn> {
        self.nodes.get(id.0)
    }

    /// Total number of turns across all branches.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the current node (root is 0).
    pub fn depth(&self) -> usize {
        self.path_to(self.current).len().saturating_sub(1)
    }

    /// Handles from the root down to `id`, inclusive. Empty for a foreign handle.
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        if self.node(id).is_none() {
            return Vec::new();
        }
        let mut path = vec![id];
        let mut cursor = id;
        while let Some(parent) = self.turn(cursor).parent {
            path.push(parent);
            cursor = parent;
        }
        path.reverse();
        path
    }

    /// Rendered root-to-current path with branch indicators.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history_to(self.current)
    }

    pub fn history_to(&self, id: NodeId) -> Vec<HistoryEntry> {
        self.path_to(id)
            .into_iter()
            .map(|node| {
                let turn = self.turn(node);
                let (sibling_position, sibling_count) = self.sibling_info(node);
                HistoryEntry {
                    role: turn.role,
                    content: turn.content.clone(),
                    sibling_position,
                    sibling_count,
                }
            })
            .collect()
    }

    /// Role/content pairs from the root down to `id`, as sent to an engine.
    pub fn messages_to(&self, id: NodeId) -> Vec<Message> {
        self.path_to(id)
            .into_iter()
            .map(|node| {
                let turn = self.turn(node);
                Message {
                    role: turn.role,
                    content: turn.content.clone(),
                }
            })
            .collect()
    }

    /// 1-based position among siblings and the sibling count. Root is (1, 1).
    pub(super) fn sibling_info(&self, id: NodeId) -> (usize, usize) {
        match self.turn(id).parent {
            None => (1, 1),
            Some(parent) => {
                let siblings = &self.turn(parent).children;
                let position = siblings
                    .iter()
                    .position(|&child| child == id)
                    .map_or(1, |i| i + 1);
                (position, siblings.len())
            }
        }
    }

    /// Handles are only minted by this tree, so internal lookups index directly.
    pub(super) fn turn(&self, id: NodeId) -> &Turn {
        &self.nodes[id.0]
    }

    pub(super) fn turn_mut(&mut self, id: NodeId) -> &mut Turn {
        &mut self.nodes[id.0]
    }

    pub(super) fn touch(&mut self) {
        self.last_modified = Utc::now();
    }
}
