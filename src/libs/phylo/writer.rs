use super::node::NodeId;
use super::tree::Tree;

/// Serialize the tree to a Newick string.
///
/// Leaves emit `name:length`. Internal nodes emit `support:length` when a
/// support value is present, otherwise `name:length`. Six decimal places on
/// supports keep 1/K distinguishable for up to a million replicates.
pub fn write_newick(tree: &Tree) -> String {
    if let Some(root) = tree.get_root() {
        let mut s = to_newick_recursive(tree, root);
        s.push(';');
        s
    } else {
        ";".to_string()
    }
}

fn to_newick_recursive(tree: &Tree, node_id: NodeId) -> String {
    let node = tree.get_node(node_id).unwrap();

    // Node info: label (or support) + length
    let mut node_info = String::new();

    if let Some(support) = node.support {
        node_info.push_str(&format!("{:.6}", support));
    } else if let Some(name) = &node.name {
        node_info.push_str(&quote_label(name));
    }

    if let Some(len) = node.length {
        node_info.push_str(&format!(":{}", len));
    }

    if node.children.is_empty() {
        node_info
    } else {
        let children_strs: Vec<String> = node
            .children
            .iter()
            .map(|&child| to_newick_recursive(tree, child))
            .collect();

        format!("({}){}", children_strs.join(","), node_info)
    }
}

fn quote_label(label: &str) -> String {
    let needs_quote = label.chars().any(|c| "(),:;[] \t\n".contains(c));
    if needs_quote {
        format!("'{}'", label)
    } else {
        label.to_string()
    }
}
