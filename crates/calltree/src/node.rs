//! The call tree: named nodes, each with its own counter.
//!
//! Nodes live in an arena owned by [`CallTree`] and refer to each other by
//! [`NodeId`]. The tree only grows: a node is created the first time its name
//! is entered under a given parent and lives as long as the tree.

use indexmap::IndexMap;

use crate::counter::Counter;

/// Name given to the root node of every tree.
pub const ROOT_NAME: &str = "All";

/// Index of a node within its [`CallTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// One vertex of the call tree.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    counter: Counter,
    parent: Option<NodeId>,
    /// Child name -> id, in insertion order
    children: IndexMap<String, NodeId>,
}

impl Node {
    fn new(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            counter: Counter::new(),
            parent,
            children: IndexMap::new(),
        }
    }

    /// Name of the node, unique among its siblings.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's counter.
    #[inline]
    pub fn counter(&self) -> &Counter {
        &self.counter
    }

    /// Mutable access to the node's counter.
    #[inline]
    pub fn counter_mut(&mut self) -> &mut Counter {
        &mut self.counter
    }

    /// Parent node, `None` for the root.
    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in the order they were first entered.
    pub fn children(&self) -> impl ExactSizeIterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    /// Whether the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Arena holding every node of one profiler's tree.
#[derive(Debug, Clone)]
pub struct CallTree {
    nodes: Vec<Node>,
}

impl CallTree {
    /// Create a tree holding only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(ROOT_NAME, None)],
        }
    }

    /// Id of the root node.
    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Node for `id`.
    ///
    /// Ids are only handed out by this tree and nodes are never removed, so
    /// every id obtained from it stays valid.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Mutable node for `id`.
    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Node for `id`, if it belongs to this tree.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Return the child of `parent` called `name`, creating it if needed.
    pub fn child(&mut self, parent: NodeId, name: &str) -> NodeId {
        if let Some(existing) = self.find_child(parent, name) {
            return existing;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name, Some(parent)));
        self.nodes[parent.0].children.insert(name.to_string(), id);
        id
    }

    /// Look up an existing child without creating it.
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent.0].children.get(name).copied()
    }

    /// Parent of `id`.
    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Number of parent links between `id` and the root.
    pub fn depth_of(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
            depth += 1;
        }
        depth
    }

    /// Names from the first level below the root down to `id`.
    pub fn path(&self, id: NodeId) -> Vec<&str> {
        let mut path = Vec::with_capacity(self.depth_of(id));
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            path.push(self.nodes[current.0].name.as_str());
            current = parent;
        }
        path.reverse();
        path
    }

    /// Follow `path` from the root without creating nodes.
    pub fn find_path<S: AsRef<str>>(&self, path: &[S]) -> Option<NodeId> {
        path.iter()
            .try_fold(self.root(), |id, name| self.find_child(id, name.as_ref()))
    }

    /// Total number of nodes, root included.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always holds its root.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Every node id, depth-first in child insertion order.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.values().rev().copied());
        }
        order
    }
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tree_has_root_only() {
        let tree = CallTree::new();
        let root = tree.node(tree.root());
        assert_eq!(root.name(), ROOT_NAME);
        assert!(root.parent().is_none());
        assert!(root.is_leaf());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_child_is_idempotent() {
        let mut tree = CallTree::new();
        let root = tree.root();
        let a = tree.child(root, "a");
        let again = tree.child(root, "a");
        assert_eq!(a, again);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.parent(a), Some(root));
        assert!(tree.node(a).counter().get_wall().dummy());
    }

    #[test]
    fn test_same_name_under_different_parents() {
        let mut tree = CallTree::new();
        let root = tree.root();
        let a = tree.child(root, "a");
        let b = tree.child(root, "b");
        let a_x = tree.child(a, "x");
        let b_x = tree.child(b, "x");
        assert_ne!(a_x, b_x);
        assert_eq!(tree.path(a_x), vec!["a", "x"]);
        assert_eq!(tree.path(b_x), vec!["b", "x"]);
        assert_eq!(tree.find_path(&["b", "x"]), Some(b_x));
        assert_eq!(tree.find_path(&["c"]), None);
    }

    #[test]
    fn test_children_keep_insertion_order() {
        let mut tree = CallTree::new();
        let root = tree.root();
        for name in ["zeta", "alpha", "mid"] {
            tree.child(root, name);
        }
        tree.child(root, "alpha");

        let names: Vec<&str> = tree
            .node(root)
            .children()
            .map(|id| tree.node(id).name())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_walk_is_depth_first() {
        let mut tree = CallTree::new();
        let root = tree.root();
        let a = tree.child(root, "a");
        tree.child(a, "a1");
        tree.child(root, "b");

        let names: Vec<&str> = tree.walk().into_iter().map(|id| tree.node(id).name()).collect();
        assert_eq!(names, vec![ROOT_NAME, "a", "a1", "b"]);
        assert_eq!(tree.depth_of(tree.find_path(&["a", "a1"]).unwrap()), 2);
    }
}
