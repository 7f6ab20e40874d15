use super::seal::SealedTree;
use crate::libs::phylo::node::NodeId;

/// Per-edge result of a transfer-distance computation against one replicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    /// Minimum transfer distance of the edge above each reference node
    /// (indexed by node id; the root slot is unused and stays 0).
    pub min_dist: Vec<u32>,
    /// A replicate edge realising the minimum, per reference edge.
    pub argmin: Vec<NodeId>,
}

/// Quadratic transfer-index computation, two nested post-order passes.
///
/// For every reference edge `i` and terminal replicate edge `j`, build
/// `I[i][j]` (leaves on both child sides) and `C[i][j]` (leaves on the child
/// side of `j` only); the replicate pass sums these up its internal edges
/// and derives the Hamming distance `|L_R(i)| + C - I`, folded to the
/// smaller side. Memory is one u16 cell per edge pair. Slow but direct;
/// serves as the correctness oracle for the lazy engine.
pub fn transfer_indices(reference: &SealedTree, replicate: &SealedTree) -> TransferResult {
    let nr = reference.len();
    let nb = replicate.len();
    let n = reference.n_taxa;
    assert_eq!(n, replicate.n_taxa);

    let mut i_mat = vec![0u16; nr * nb];
    let mut c_mat = vec![0u16; nr * nb];

    // Reference pass: fill the terminal-replicate columns.
    // A leaf row holds the taxon match; an internal row is the OR (for I)
    // and AND (for C) of its child rows.
    for &v in &reference.postorder {
        if v == reference.root {
            continue;
        }
        let row = v * nb;

        if reference.is_leaf(v) {
            let t = reference.taxon[v].unwrap();
            for &j in &replicate.leaf_of_taxon {
                let same = replicate.taxon[j] == Some(t);
                i_mat[row + j] = same as u16;
                c_mat[row + j] = !same as u16;
            }
        } else {
            for &j in &replicate.leaf_of_taxon {
                i_mat[row + j] = 0;
                c_mat[row + j] = 1;
            }
            for &child in &reference.children[v] {
                let crow = child * nb;
                for &j in &replicate.leaf_of_taxon {
                    i_mat[row + j] = i_mat[row + j] | i_mat[crow + j];
                    c_mat[row + j] = c_mat[row + j] & c_mat[crow + j];
                }
            }
        }
    }

    // Replicate pass: sum child columns into internal columns, then fold
    // the Hamming distance and keep the per-reference-edge minimum.
    let mut min_dist = vec![u32::MAX; nr];
    let mut argmin = vec![0usize; nr];
    min_dist[reference.root] = 0;

    for &e in &replicate.postorder {
        if e == replicate.root {
            continue;
        }

        if !replicate.is_leaf(e) {
            for v in 0..nr {
                let row = v * nb;
                i_mat[row + e] = 0;
                c_mat[row + e] = 0;
            }
            for &child in &replicate.children[e] {
                for v in 0..nr {
                    let row = v * nb;
                    i_mat[row + e] = i_mat[row + e] + i_mat[row + child];
                    c_mat[row + e] = c_mat[row + e] + c_mat[row + child];
                }
            }
        }

        for v in reference.edge_ids() {
            let row = v * nb;
            let mut h = reference.subtree_size[v] as u32 + c_mat[row + e] as u32
                - i_mat[row + e] as u32;
            // Unrooted bipartitions: a distance and its complement are the
            // same move, keep the smaller side.
            if h > n as u32 / 2 {
                h = n as u32 - h;
            }
            if h < min_dist[v] {
                min_dist[v] = h;
                argmin[v] = e;
            }
        }
    }

    for v in reference.edge_ids() {
        assert!(min_dist[v] != u32::MAX);
        if reference.is_leaf(v) {
            // The leaf bijection guarantees an exact terminal match
            assert_eq!(min_dist[v], 0);
        }
    }

    TransferResult { min_dist, argmin }
}
