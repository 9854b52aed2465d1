//! Switching between sibling branches.

use super::types::{ConversationTree, Direction, NodeId, Outcome, Rejection};

impl ConversationTree {
    /// Cycle the active child of the parent of the turn `distance` steps
    /// above current, then follow active children down to a leaf and make
    /// that leaf current.
    pub fn set_active_child(&mut self, distance: usize, direction: Direction) -> Outcome {
        let located = self.locate(distance);
        self.switch_branch(located, direction)
    }

    /// String-direction form used by front ends; anything other than
    /// `"next"` or `"prev"` is rejected without touching the tree.
    pub fn navigate(&mut self, distance: usize, direction: &str) -> Outcome {
        match direction.parse::<Direction>() {
            Ok(direction) => self.set_active_child(distance, direction),
            Err(rejection) => self.reject(rejection),
        }
    }

    /// Same as [`set_active_child`](Self::set_active_child) but addressed by handle.
    pub fn switch_branch(&mut self, node: NodeId, direction: Direction) -> Outcome {
        let Some(parent) = self.node(node).and_then(|turn| turn.parent) else {
            return self.reject(Rejection::AtRoot);
        };

        let turn = self.turn_mut(parent);
        let count = turn.children.len();
        let index = match direction {
            Direction::Next => (turn.active_child + 1) % count,
            Direction::Prev => (turn.active_child + count - 1) % count,
        };
        turn.active_child = index;
        let branch = turn.children[index];

        self.current = self.descend(branch);
        self.touch();
        Outcome::applied(self.history())
    }

    /// Follow active children from `node` until reaching a leaf.
    pub fn descend(&self, node: NodeId) -> NodeId {
        let mut cursor = node;
        while let Some(child) = self.node(cursor).and_then(|turn| turn.active_child()) {
            cursor = child;
        }
        cursor
    }
}
