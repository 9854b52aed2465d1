//! Mutating operations: appending turns and branching by edit/regenerate.

use loom_common::Role;
use tracing::warn;

use super::types::{ConversationTree, NodeId, Outcome, Rejection, Turn};

impl ConversationTree {
    /// Append a turn as the newest child of the current node and make it
    /// current. The parent's active child becomes the new turn.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> NodeId {
        let id = self.attach_child(self.current, role, content.into());
        self.current = id;
        self.touch();
        id
    }

    /// Branch at the user turn `distance` steps above current: add a sibling
    /// user turn holding `content` and make it current.
    pub fn edit(&mut self, distance: usize, content: impl Into<String>) -> Outcome {
        self.branch_sibling(distance, Role::User, content.into())
    }

    /// Branch at the assistant turn `distance` steps above current: add an
    /// empty sibling assistant turn and make it current, ready to be filled.
    pub fn regenerate(&mut self, distance: usize) -> Outcome {
        self.branch_sibling(distance, Role::Assistant, String::new())
    }

    /// Append text to an existing turn. Returns false if the handle is foreign.
    pub fn append_content(&mut self, id: NodeId, text: &str) -> bool {
        match self.nodes.get_mut(id.0) {
            Some(turn) => {
                turn.content.push_str(text);
                self.touch();
                true
            }
            None => false,
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    /// Walk `distance` parent links up from current, stopping at the root.
    pub fn locate(&self, distance: usize) -> NodeId {
        let mut node = self.current;
        for _ in 0..distance {
            match self.turn(node).parent {
                Some(parent) => node = parent,
                None => break,
            }
        }
        node
    }

    pub(super) fn reject(&self, rejection: Rejection) -> Outcome {
        warn!(tree = %self.id, %rejection, "tree operation rejected");
        Outcome::rejected(self.history(), rejection)
    }

    fn branch_sibling(&mut self, distance: usize, role: Role, content: String) -> Outcome {
        let target = self.locate(distance);
        let found = self.turn(target).role;
        if found != role {
            return self.reject(Rejection::WrongRole {
                expected: role,
                found,
            });
        }
        let Some(parent) = self.turn(target).parent else {
            return self.reject(Rejection::AtRoot);
        };

        let id = self.attach_child(parent, role, content);
        self.current = id;
        self.touch();
        Outcome::applied(self.history())
    }

    fn attach_child(&mut self, parent: NodeId, role: Role, content: String) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Turn::new(role, content, Some(parent)));
        let parent = self.turn_mut(parent);
        parent.children.push(id);
        parent.active_child = parent.children.len() - 1;
        id
    }
}
