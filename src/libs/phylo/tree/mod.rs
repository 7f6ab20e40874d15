pub mod io;
pub mod stat;
pub mod traversal;

use super::node::{Node, NodeId};

#[derive(Debug, Default, Clone)]
pub struct Tree {
    /// Arena storage for all nodes
    pub(super) nodes: Vec<Node>,

    /// Optional root ID (a tree might be empty or in construction)
    pub(super) root: Option<NodeId>,
}

impl Tree {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new node to the tree. Returns the new node's ID.
    pub fn add_node(&mut self) -> NodeId {
        let id = self.nodes.len();
        let node = Node::new(id);
        self.nodes.push(node);
        id
    }

    /// Get number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get root ID
    pub fn get_root(&self) -> Option<NodeId> {
        self.root
    }

    /// Get a reference to a node by ID.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get a mutable reference to a node by ID.
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Set a node as the root of the tree.
    pub fn set_root(&mut self, id: NodeId) {
        if self.get_node(id).is_some() {
            self.root = Some(id);
        }
    }

    /// Add a child to a parent node.
    /// Updates both parent's `children` list and child's `parent` field.
    pub fn add_child(&mut self, parent_id: NodeId, child_id: NodeId) -> Result<(), String> {
        if parent_id == child_id {
            return Err("Cannot add node as child of itself".to_string());
        }
        if self.get_node(parent_id).is_none() {
            return Err(format!("Parent node {} not found", parent_id));
        }
        if self.get_node(child_id).is_none() {
            return Err(format!("Child node {} not found", child_id));
        }

        if let Some(old_parent) = self.nodes[child_id].parent {
            return Err(format!("Node {} already has parent {}", child_id, old_parent));
        }

        self.nodes[child_id].parent = Some(parent_id);
        self.nodes[parent_id].children.push(child_id);

        Ok(())
    }

    /// Interpret numeric labels on internal nodes as support values of the
    /// edge above them, clearing the label. Leaf names are never touched.
    /// Input trees commonly carry bootstrap values this way.
    pub fn support_from_labels(&mut self) {
        let root = self.root;
        for node in self.nodes.iter_mut() {
            if node.is_leaf() || Some(node.id) == root {
                continue;
            }
            if let Some(name) = &node.name {
                if let Ok(value) = name.parse::<f64>() {
                    node.support = Some(value);
                    node.name = None;
                }
            }
        }
    }

    // --- Delegation to traversal ---

    pub fn preorder(&self, start_node: &NodeId) -> Result<Vec<NodeId>, String> {
        Ok(traversal::preorder(self, *start_node))
    }

    pub fn postorder(&self, start_node: &NodeId) -> Result<Vec<NodeId>, String> {
        Ok(traversal::postorder(self, *start_node))
    }

    pub fn levelorder(&self, start_node: &NodeId) -> Result<Vec<NodeId>, String> {
        Ok(traversal::levelorder(self, *start_node))
    }

    // --- Delegation to stat ---

    pub fn get_leaves(&self) -> Vec<NodeId> {
        if let Some(root) = self.root {
            stat::get_leaves(self, root)
        } else {
            Vec::new()
        }
    }

    pub fn get_leaf_names(&self) -> Vec<Option<String>> {
        if let Some(root) = self.root {
            stat::get_leaf_names(self, root)
        } else {
            Vec::new()
        }
    }

    pub fn is_binary(&self) -> bool {
        stat::is_binary(self)
    }

    // --- Delegation to io ---

    pub fn to_newick(&self) -> String {
        io::to_newick(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_basic_ops() {
        let mut tree = Tree::new();

        // 0(root) -> 1, 2
        // 1 -> 3
        let n0 = tree.add_node();
        let n1 = tree.add_node();
        let n2 = tree.add_node();
        let n3 = tree.add_node();

        tree.set_root(n0);

        assert_eq!(tree.add_child(n0, n1), Ok(()));
        assert_eq!(tree.add_child(n0, n2), Ok(()));
        assert_eq!(tree.add_child(n1, n3), Ok(()));

        assert_eq!(tree.len(), 4);

        let root = tree.get_node(n0).unwrap();
        assert_eq!(root.children, vec![n1, n2]);

        let node1 = tree.get_node(n1).unwrap();
        assert_eq!(node1.parent, Some(n0));
        assert_eq!(node1.children, vec![n3]);

        // Reparenting is rejected
        assert!(tree.add_child(n2, n3).is_err());
    }

    #[test]
    fn test_support_from_labels() {
        let mut tree = Tree::from_newick("((A,B)0.9:1.0,(C,D)label:1.0);").unwrap();
        tree.support_from_labels();

        let root = tree.get_node(tree.get_root().unwrap()).unwrap();
        let ab = tree.get_node(root.children[0]).unwrap();
        let cd = tree.get_node(root.children[1]).unwrap();

        assert_eq!(ab.support, Some(0.9));
        assert_eq!(ab.name, None);
        assert_eq!(cd.support, None);
        assert_eq!(cd.name.as_deref(), Some("label"));
    }
}
