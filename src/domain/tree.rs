//! In-memory index of allocation records for one hardware structure.
//!
//! The [`AllocationTree`] knows nothing about the filesystem. Records are
//! stored in a map keyed by hardware id; parent/child adjacency lives in a
//! directed graph (edges point child→parent) so that `children()` is an
//! indexed lookup rather than a scan over every record.

use std::collections::HashMap;

use petgraph::{
    algo::{has_path_connecting, is_cyclic_directed},
    graphmap::DiGraphMap,
};
use thiserror::Error;
use tracing::instrument;

use crate::domain::node::{AllocationNode, HardwareId};

/// Errors raised while building or querying the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The referenced hardware item is not in the allocation scope.
    #[error("hardware item {0} not found")]
    NodeNotFound(HardwareId),

    /// A record with the same hardware id already exists.
    #[error("duplicate hardware item {0}")]
    DuplicateNode(HardwareId),

    /// A link referenced a parent that is not in the allocation scope.
    #[error("parent hardware item {0} not found")]
    ParentNotFound(HardwareId),

    /// Establishing the link would make a node its own ancestor.
    #[error("link {child} ← {parent} would create a cycle")]
    Cycle {
        /// Id of the child item.
        child: HardwareId,
        /// Id of the offered parent item.
        parent: HardwareId,
    },
}

/// All allocation records for one hardware structure revision.
#[derive(Debug, Default, Clone)]
pub struct AllocationTree {
    /// Records keyed by hardware id.
    nodes: HashMap<HardwareId, AllocationNode>,

    /// Adjacency. Edges point from child to parent; incoming edges of a
    /// node are therefore its children.
    graph: DiGraphMap<HardwareId, ()>,
}

impl AllocationTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree with pre-allocated capacity for the given number of
    /// records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: HashMap::with_capacity(capacity),
            graph: DiGraphMap::with_capacity(capacity, capacity),
        }
    }

    /// Number of records in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a record exists for the given id.
    #[must_use]
    pub fn contains(&self, id: HardwareId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Inserts a detached record.
    ///
    /// The record's `parent_id` is cleared; parent linkage is established
    /// separately with [`link`](Self::link) so that records can be inserted
    /// in any order.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicateNode`] if a record with the same id
    /// already exists.
    pub fn insert(&mut self, mut node: AllocationNode) -> Result<(), TreeError> {
        let id = node.id;
        if self.nodes.contains_key(&id) {
            return Err(TreeError::DuplicateNode(id));
        }

        node.parent_id = None;
        self.graph.add_node(id);
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Places `child` under `parent`, replacing any previous parent link.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NodeNotFound`] or [`TreeError::ParentNotFound`]
    /// when either endpoint is missing, and [`TreeError::Cycle`] when the
    /// link would make the child its own ancestor (self-links included).
    pub fn link(&mut self, child: HardwareId, parent: HardwareId) -> Result<(), TreeError> {
        if !self.nodes.contains_key(&child) {
            return Err(TreeError::NodeNotFound(child));
        }
        if !self.nodes.contains_key(&parent) {
            return Err(TreeError::ParentNotFound(parent));
        }
        if child == parent || self.link_would_create_cycle(child, parent) {
            return Err(TreeError::Cycle { child, parent });
        }

        if let Some(previous) = self.nodes[&child].parent_id {
            self.graph.remove_edge(child, previous);
        }
        self.graph.add_edge(child, parent, ());
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent_id = Some(parent);
        }
        Ok(())
    }

    /// Removes a record and its relationships.
    ///
    /// The removed node's children stay in the tree and become roots.
    /// Returns `true` if the record existed.
    #[instrument(skip(self))]
    pub fn remove(&mut self, id: HardwareId) -> bool {
        if !self.nodes.contains_key(&id) {
            return false;
        }

        let orphans: Vec<HardwareId> = self.children(id).collect();
        for orphan in orphans {
            if let Some(node) = self.nodes.get_mut(&orphan) {
                node.parent_id = None;
            }
        }

        self.graph.remove_node(id);
        self.nodes.remove(&id);
        true
    }

    /// Retrieves a record by id.
    #[must_use]
    pub fn get(&self, id: HardwareId) -> Option<&AllocationNode> {
        self.nodes.get(&id)
    }

    /// Retrieves a record mutably by id.
    #[must_use]
    pub fn get_mut(&mut self, id: HardwareId) -> Option<&mut AllocationNode> {
        self.nodes.get_mut(&id)
    }

    /// Iterates over every record, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &AllocationNode> + '_ {
        self.nodes.values()
    }

    /// Ids of the immediate children of a node.
    pub fn children(&self, parent: HardwareId) -> impl Iterator<Item = HardwareId> + '_ {
        // Incoming edges are from children.
        if self.graph.contains_node(parent) {
            Some(
                self.graph
                    .neighbors_directed(parent, petgraph::Direction::Incoming),
            )
        } else {
            None
        }
        .into_iter()
        .flatten()
    }

    /// The included children of a node, sorted by id for deterministic
    /// reporting.
    #[must_use]
    pub fn participating_children(&self, parent: HardwareId) -> Vec<&AllocationNode> {
        let mut children: Vec<&AllocationNode> = self
            .children(parent)
            .filter_map(|id| self.nodes.get(&id))
            .filter(|node| node.participates())
            .collect();
        children.sort_by_key(|node| node.id);
        children
    }

    /// Ids of every record with no parent, sorted.
    #[must_use]
    pub fn roots(&self) -> Vec<HardwareId> {
        let mut roots: Vec<HardwareId> = self
            .nodes
            .values()
            .filter(|node| node.parent_id.is_none())
            .map(|node| node.id)
            .collect();
        roots.sort_unstable();
        roots
    }

    /// Breadth-first tiers below (and including) the given node, each tier
    /// sorted by id.
    ///
    /// A node's goals must be finalized by its parent's level before its own
    /// allocation runs, so batch drivers walk these tiers in order.
    #[must_use]
    pub fn levels(&self, root: HardwareId) -> Vec<Vec<HardwareId>> {
        if !self.nodes.contains_key(&root) {
            return Vec::new();
        }

        let mut levels = Vec::new();
        let mut current = vec![root];
        while !current.is_empty() {
            let mut next: Vec<HardwareId> = current
                .iter()
                .flat_map(|&id| self.children(id))
                .collect();
            next.sort_unstable();
            levels.push(current);
            current = next;
        }
        levels
    }

    /// Determine whether the graph contains any cycles.
    ///
    /// Link-time validation makes cycles unrepresentable through this API;
    /// the check exists for health reporting over data assembled elsewhere.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    fn link_would_create_cycle(&self, child: HardwareId, parent: HardwareId) -> bool {
        // Edges run child→parent, so a path from the offered parent up to
        // the child means the child is already an ancestor of the parent.
        has_path_connecting(&self.graph, parent, child, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(ids: &[u32]) -> AllocationTree {
        let mut tree = AllocationTree::new();
        for &id in ids {
            tree.insert(AllocationNode::new(HardwareId::new(id)))
                .unwrap();
        }
        tree
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let mut tree = tree_of(&[1]);

        let err = tree
            .insert(AllocationNode::new(HardwareId::new(1)))
            .unwrap_err();
        assert_eq!(err, TreeError::DuplicateNode(HardwareId::new(1)));
    }

    #[test]
    fn children_are_indexed_by_parent() {
        let mut tree = tree_of(&[1, 2, 3, 4]);
        tree.link(HardwareId::new(2), HardwareId::new(1)).unwrap();
        tree.link(HardwareId::new(3), HardwareId::new(1)).unwrap();
        tree.link(HardwareId::new(4), HardwareId::new(2)).unwrap();

        let mut children: Vec<_> = tree.children(HardwareId::new(1)).collect();
        children.sort_unstable();
        assert_eq!(children, vec![HardwareId::new(2), HardwareId::new(3)]);

        assert_eq!(
            tree.children(HardwareId::new(2)).collect::<Vec<_>>(),
            vec![HardwareId::new(4)]
        );
        assert!(tree.children(HardwareId::new(4)).next().is_none());
    }

    #[test]
    fn participating_children_skip_excluded_nodes() {
        let mut tree = tree_of(&[1, 2, 3]);
        tree.link(HardwareId::new(2), HardwareId::new(1)).unwrap();
        tree.link(HardwareId::new(3), HardwareId::new(1)).unwrap();
        tree.get_mut(HardwareId::new(3)).unwrap().included = false;

        let participating = tree.participating_children(HardwareId::new(1));
        assert_eq!(participating.len(), 1);
        assert_eq!(participating[0].id, HardwareId::new(2));
    }

    #[test]
    fn linking_a_missing_child_or_parent_is_an_error() {
        let mut tree = tree_of(&[1]);

        assert_eq!(
            tree.link(HardwareId::new(9), HardwareId::new(1)),
            Err(TreeError::NodeNotFound(HardwareId::new(9)))
        );
        assert_eq!(
            tree.link(HardwareId::new(1), HardwareId::new(9)),
            Err(TreeError::ParentNotFound(HardwareId::new(9)))
        );
    }

    #[test]
    fn prevents_cycles_when_linking() {
        let mut tree = tree_of(&[1, 2, 3]);
        tree.link(HardwareId::new(2), HardwareId::new(1)).unwrap();
        tree.link(HardwareId::new(3), HardwareId::new(2)).unwrap();

        let err = tree
            .link(HardwareId::new(1), HardwareId::new(3))
            .unwrap_err();
        assert!(matches!(err, TreeError::Cycle { .. }));
        assert!(!tree.has_cycles());
    }

    #[test]
    fn rejects_linking_a_node_to_itself() {
        let mut tree = tree_of(&[1]);

        let err = tree
            .link(HardwareId::new(1), HardwareId::new(1))
            .unwrap_err();
        assert!(matches!(err, TreeError::Cycle { .. }));
    }

    #[test]
    fn relinking_moves_a_child_to_the_new_parent() {
        let mut tree = tree_of(&[1, 2, 3]);
        tree.link(HardwareId::new(3), HardwareId::new(1)).unwrap();
        tree.link(HardwareId::new(3), HardwareId::new(2)).unwrap();

        assert!(tree.children(HardwareId::new(1)).next().is_none());
        assert_eq!(
            tree.children(HardwareId::new(2)).collect::<Vec<_>>(),
            vec![HardwareId::new(3)]
        );
        assert_eq!(
            tree.get(HardwareId::new(3)).unwrap().parent_id,
            Some(HardwareId::new(2))
        );
    }

    #[test]
    fn removing_a_node_orphans_its_children() {
        let mut tree = tree_of(&[1, 2, 3]);
        tree.link(HardwareId::new(2), HardwareId::new(1)).unwrap();
        tree.link(HardwareId::new(3), HardwareId::new(2)).unwrap();

        assert!(tree.remove(HardwareId::new(2)));

        assert!(!tree.contains(HardwareId::new(2)));
        assert_eq!(tree.get(HardwareId::new(3)).unwrap().parent_id, None);
        assert_eq!(tree.roots(), vec![HardwareId::new(1), HardwareId::new(3)]);
        assert!(!tree.remove(HardwareId::new(2)));
    }

    #[test]
    fn levels_walk_breadth_first_from_the_root() {
        let mut tree = tree_of(&[1, 2, 3, 4, 5, 6]);
        tree.link(HardwareId::new(2), HardwareId::new(1)).unwrap();
        tree.link(HardwareId::new(3), HardwareId::new(1)).unwrap();
        tree.link(HardwareId::new(4), HardwareId::new(2)).unwrap();
        tree.link(HardwareId::new(5), HardwareId::new(2)).unwrap();
        tree.link(HardwareId::new(6), HardwareId::new(3)).unwrap();

        let levels = tree.levels(HardwareId::new(1));

        assert_eq!(
            levels,
            vec![
                vec![HardwareId::new(1)],
                vec![HardwareId::new(2), HardwareId::new(3)],
                vec![HardwareId::new(4), HardwareId::new(5), HardwareId::new(6)],
            ]
        );
        assert!(tree.levels(HardwareId::new(99)).is_empty());
    }
}
