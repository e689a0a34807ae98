//! Arena-backed search tree.
//!
//! Nodes live in one contiguous `Vec` and reference each other by index,
//! which keeps traversal cache-friendly and makes the whole tree one
//! deallocation when the search ends.

use goban::{Player, Vertex};

use crate::node::{Node, NodeId};

#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(Vertex::Pass, 1.0)],
            root: NodeId(0),
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a child under `parent` and return its id.
    pub fn add_child(&mut self, parent: NodeId, vertex: Vertex, prior: f32) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(vertex, prior));
        self.get_mut(parent).children.push(id);
        id
    }

    /// Best child of `parent` by PUCT score for the player moving at
    /// `parent`. None when the node has no children.
    pub fn select_child(&self, parent: NodeId, c_puct: f32, to_move: Player) -> Option<NodeId> {
        let node = self.get(parent);
        let parent_visits_sqrt = (node.visits.max(1) as f32).sqrt();

        node.children
            .iter()
            .copied()
            .max_by(|&a, &b| {
                let score_a = self.get(a).puct_score(parent_visits_sqrt, c_puct, to_move);
                let score_b = self.get(b).puct_score(parent_visits_sqrt, c_puct, to_move);
                score_a
                    .partial_cmp(&score_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Add one visit with the given Black-frame value to every node on
    /// the path. No per-ply negation: the frame is fixed.
    pub fn backup(&mut self, path: &[NodeId], value: f32) {
        for &id in path {
            let node = self.get_mut(id);
            node.visits += 1;
            node.value_sum += value;
        }
    }

    /// Root children ordered by visit count descending.
    pub fn ranked_root_children(&self) -> Vec<NodeId> {
        let mut children = self.get(self.root).children.clone();
        children.sort_by(|&a, &b| self.get(b).visits.cmp(&self.get(a).visits));
        children
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goban::Coord;

    #[test]
    fn test_backup_no_negation() {
        let mut tree = Tree::new();
        let child = tree.add_child(tree.root(), Vertex::Play(Coord::new(0, 0)), 0.5);
        let grandchild = tree.add_child(child, Vertex::Play(Coord::new(1, 1)), 0.5);

        tree.backup(&[tree.root(), child, grandchild], 0.8);

        for id in [tree.root(), child, grandchild] {
            assert_eq!(tree.get(id).visits, 1);
            assert!((tree.get(id).value_sum - 0.8).abs() < 1e-6);
        }
    }

    #[test]
    fn test_select_prefers_prior_when_unvisited() {
        let mut tree = Tree::new();
        tree.add_child(tree.root(), Vertex::Play(Coord::new(0, 0)), 0.2);
        let strong = tree.add_child(tree.root(), Vertex::Play(Coord::new(1, 0)), 0.7);

        let best = tree.select_child(tree.root(), 1.5, Player::B).unwrap();
        assert_eq!(best, strong);
    }

    #[test]
    fn test_select_respects_mover_frame() {
        let mut tree = Tree::new();
        let good_for_black = tree.add_child(tree.root(), Vertex::Play(Coord::new(0, 0)), 0.5);
        let good_for_white = tree.add_child(tree.root(), Vertex::Play(Coord::new(1, 0)), 0.5);

        tree.get_mut(good_for_black).visits = 10;
        tree.get_mut(good_for_black).value_sum = 9.0;
        tree.get_mut(good_for_white).visits = 10;
        tree.get_mut(good_for_white).value_sum = 1.0;
        tree.get_mut(tree.root()).visits = 20;

        assert_eq!(
            tree.select_child(tree.root(), 0.1, Player::B).unwrap(),
            good_for_black
        );
        assert_eq!(
            tree.select_child(tree.root(), 0.1, Player::W).unwrap(),
            good_for_white
        );
    }

    #[test]
    fn test_ranked_root_children() {
        let mut tree = Tree::new();
        let a = tree.add_child(tree.root(), Vertex::Play(Coord::new(0, 0)), 0.3);
        let b = tree.add_child(tree.root(), Vertex::Play(Coord::new(1, 0)), 0.3);
        tree.get_mut(a).visits = 3;
        tree.get_mut(b).visits = 7;

        assert_eq!(tree.ranked_root_children(), vec![b, a]);
    }
}
