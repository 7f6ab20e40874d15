/// NodeId is an index into the Tree's node vector.
/// It is lightweight (Copy) and safe (no pointers).
pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct Node {
    /// Unique identifier for the node (index in the arena)
    pub id: NodeId,

    /// Parent node ID (None for root)
    pub parent: Option<NodeId>,

    /// List of child node IDs
    pub children: Vec<NodeId>,

    // --- Payload ---
    /// Node name/label (e.g., "human"). Required on leaves.
    pub name: Option<String>,

    /// Branch length to parent.
    /// In rooted trees, edge length is an attribute of the child node.
    pub length: Option<f64>,

    /// Support value of the edge above this node. Filled either from a
    /// numeric internal-node label on input, or by a support computation.
    pub support: Option<f64>,
}

impl Node {
    /// Create a new empty node with a specific ID
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            name: None,
            length: None,
            support: None,
        }
    }

    /// Set the name of the node
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Check if the node is a leaf (no children)
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
