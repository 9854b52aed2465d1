//! Persisted form of a conversation tree.
//!
//! The on-disk layout nests turns under their parents and records the
//! current node as a list of child indices from the root.

use chrono::{DateTime, Utc};
use loom_common::{Role, StoreError};
use serde::{Deserialize, Serialize};

use super::types::{ConversationTree, NodeId, Turn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub root: TurnDocument,
    #[serde(default)]
    pub current_node_path: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDocument {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub active_child_index: usize,
    #[serde(default)]
    pub children: Vec<TurnDocument>,
}

impl TreeDocument {
    /// Compact JSON. Nesting depth grows with conversation length, so the
    /// serializer grows its stack on demand instead of overflowing it.
    pub fn to_json(&self) -> Result<String, StoreError> {
        let mut buf = Vec::new();
        let mut serializer = serde_json::Serializer::new(&mut buf);
        self.serialize(serde_stacker::Serializer::new(&mut serializer))?;
        String::from_utf8(buf).map_err(|e| StoreError::InvalidDocument(e.to_string()))
    }

    /// Parse a document with no recursion limit, growing the stack as the
    /// nesting deepens.
    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        let mut deserializer = serde_json::Deserializer::from_str(text);
        deserializer.disable_recursion_limit();
        let document = Self::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
        deserializer.end()?;
        Ok(document)
    }
}

impl Drop for TurnDocument {
    // The derived drop would recurse once per level.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut turn) = pending.pop() {
            pending.append(&mut turn.children);
        }
    }
}

impl ConversationTree {
    pub fn to_document(&self) -> TreeDocument {
        let current_node_path = self
            .path_to(self.current)
            .into_iter()
            .skip(1)
            .map(|node| self.sibling_info(node).0 - 1)
            .collect();

        TreeDocument {
            id: self.id.clone(),
            name: self.name.clone(),
            last_modified: self.last_modified,
            root: self.turn_document(NodeId::ROOT),
            current_node_path,
        }
    }

    /// Rebuild a tree, validating active-child indices and the current path.
    pub fn from_document(document: &TreeDocument) -> Result<Self, StoreError> {
        let nodes = insert_turns(&document.root)?;

        let mut tree = Self {
            id: document.id.clone(),
            name: document.name.clone(),
            last_modified: document.last_modified,
            nodes,
            current: NodeId::ROOT,
        };

        let mut cursor = NodeId::ROOT;
        for (depth, &index) in document.current_node_path.iter().enumerate() {
            cursor = tree.turn(cursor).children.get(index).copied().ok_or_else(|| {
                StoreError::InvalidDocument(format!(
                    "current_node_path[{depth}] = {index} does not name a child"
                ))
            })?;
        }
        tree.current = cursor;
        Ok(tree)
    }

    /// Build the nested document for the subtree under `node` without
    /// recursion. Nodes are visited breadth first, then assembled in reverse
    /// so every child is finished before its parent.
    fn turn_document(&self, node: NodeId) -> TurnDocument {
        let mut order = vec![node];
        let mut next = 0;
        while next < order.len() {
            order.extend_from_slice(&self.turn(order[next]).children);
            next += 1;
        }

        let mut built: Vec<Option<TurnDocument>> = Vec::new();
        built.resize_with(self.nodes.len(), || None);
        for &id in order[1..].iter().rev() {
            let document = self.assemble(id, &mut built);
            built[id.0] = Some(document);
        }
        self.assemble(node, &mut built)
    }

    fn assemble(&self, node: NodeId, built: &mut [Option<TurnDocument>]) -> TurnDocument {
        let turn = self.turn(node);
        TurnDocument {
            role: turn.role,
            content: turn.content.clone(),
            active_child_index: turn.active_child,
            children: turn
                .children
                .iter()
                .filter_map(|child| built[child.0].take())
                .collect(),
        }
    }
}

/// Flatten a nested document into arena order, depth first. Children are
/// queued in reverse so they come off the stack, and are linked to their
/// parent, in document order.
fn insert_turns(root: &TurnDocument) -> Result<Vec<Turn>, StoreError> {
    let mut nodes: Vec<Turn> = Vec::new();
    let mut pending: Vec<(&TurnDocument, Option<NodeId>)> = vec![(root, None)];

    while let Some((document, parent)) = pending.pop() {
        if !document.children.is_empty() && document.active_child_index >= document.children.len()
        {
            return Err(StoreError::InvalidDocument(format!(
                "active_child_index {} out of range for {} children",
                document.active_child_index,
                document.children.len()
            )));
        }

        let id = NodeId(nodes.len());
        let mut turn = Turn::new(document.role, document.content.clone(), parent);
        if !document.children.is_empty() {
            turn.active_child = document.active_child_index;
        }
        nodes.push(turn);
        if let Some(parent) = parent {
            nodes[parent.0].children.push(id);
        }
        pending.extend(document.children.iter().rev().map(|child| (child, Some(id))));
    }
    Ok(nodes)
}
