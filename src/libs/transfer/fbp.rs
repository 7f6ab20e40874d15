use super::seal::SealedTree;
use fixedbitset::FixedBitSet;
use std::collections::HashSet;

/// Normalise a child-side bitset so that it contains taxon 0, taking the
/// complement otherwise. Two edges induce the same unrooted bipartition
/// exactly when their normalised bitsets are equal, which turns
/// equal-or-complement testing into plain equality.
fn normalise(bitset: &FixedBitSet, n_taxa: usize) -> FixedBitSet {
    let mut normalised = bitset.clone();
    if n_taxa > 0 && !normalised.contains(0) {
        normalised.toggle_range(..n_taxa);
    }
    normalised
}

/// The set of non-trivial bipartitions of a sealed tree.
pub fn split_set(tree: &SealedTree) -> HashSet<FixedBitSet> {
    let mut splits = HashSet::new();
    for v in tree.edge_ids() {
        if tree.topo_depth[v] > 1 {
            splits.insert(normalise(&tree.bitset[v], tree.n_taxa));
        }
    }
    splits
}

/// Exact-match flags per reference edge: does the replicate contain the
/// identical bipartition? Classical Felsenstein support is the per-edge
/// average of these over all replicates.
pub fn exact_matches(reference: &SealedTree, replicate_splits: &HashSet<FixedBitSet>) -> Vec<bool> {
    let mut matched = vec![false; reference.len()];
    for v in reference.edge_ids() {
        if reference.is_leaf(v) || reference.topo_depth[v] <= 1 {
            // Trivial splits are present in every tree over the taxon set
            matched[v] = true;
        } else {
            let key = normalise(&reference.bitset[v], reference.n_taxa);
            matched[v] = replicate_splits.contains(&key);
        }
    }
    matched
}
