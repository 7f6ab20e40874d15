use super::Tree;
use crate::libs::phylo::node::NodeId;
use std::collections::VecDeque;

/// Get node IDs in preorder traversal (Root -> Children)
pub fn preorder(tree: &Tree, start_node: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut stack = vec![start_node];

    while let Some(id) = stack.pop() {
        if let Some(node) = tree.get_node(id) {
            result.push(id);
            // Push children in reverse order so they are processed in order
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
    }

    result
}

/// Get node IDs in postorder traversal (Children -> Root).
/// Iterative so that deep caterpillar trees cannot overflow the stack.
pub fn postorder(tree: &Tree, start_node: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut stack = vec![start_node];

    // Preorder with children visited right-to-left, reversed at the end.
    while let Some(id) = stack.pop() {
        if let Some(node) = tree.get_node(id) {
            result.push(id);
            for &child in node.children.iter() {
                stack.push(child);
            }
        }
    }

    result.reverse();
    result
}

/// Get node IDs in levelorder traversal (BFS)
pub fn levelorder(tree: &Tree, start_node: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(start_node);

    while let Some(id) = queue.pop_front() {
        if let Some(node) = tree.get_node(id) {
            result.push(id);
            for &child in &node.children {
                queue.push_back(child);
            }
        }
    }

    result
}
