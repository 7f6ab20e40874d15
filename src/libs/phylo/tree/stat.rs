use super::{traversal, Tree};
use crate::libs::phylo::node::NodeId;

/// Get all leaf IDs under a node, in traversal order
pub fn get_leaves(tree: &Tree, start: NodeId) -> Vec<NodeId> {
    traversal::preorder(tree, start)
        .into_iter()
        .filter(|&id| tree.get_node(id).unwrap().is_leaf())
        .collect()
}

/// Get names of all leaves under a node, in traversal order
pub fn get_leaf_names(tree: &Tree, start: NodeId) -> Vec<Option<String>> {
    get_leaves(tree, start)
        .into_iter()
        .map(|id| tree.get_node(id).unwrap().name.clone())
        .collect()
}

/// True when every internal node below the root has exactly two children and
/// the root has two or three. A ternary root stands in for an unrooted tree.
pub fn is_binary(tree: &Tree) -> bool {
    let root = match tree.get_root() {
        Some(r) => r,
        None => return false,
    };

    for id in traversal::preorder(tree, root) {
        let node = tree.get_node(id).unwrap();
        let deg = node.children.len();
        if id == root {
            if !(deg == 2 || deg == 3) {
                return false;
            }
        } else if !(deg == 0 || deg == 2) {
            return false;
        }
    }

    true
}
