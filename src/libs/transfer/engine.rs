use super::hpt::Hpt;
use super::seal::SealedTree;
use super::taxa::TaxonId;
use crate::libs::phylo::node::NodeId;
use crate::libs::phylo::TreeError;

/// A replicate tree that can absorb reference leaves one at a time while
/// maintaining the minimum and maximum distance d(marked set, v) over all of
/// its nodes. The two implementations must be interchangeable bit for bit.
pub trait LazyAlt {
    fn add_leaf(&mut self, alt_leaf: NodeId);
    fn reset_leaf(&mut self, alt_leaf: NodeId);
    fn d_min(&self) -> i32;
    fn d_max(&self) -> i32;
}

impl LazyAlt for Hpt<'_> {
    fn add_leaf(&mut self, alt_leaf: NodeId) {
        Hpt::add_leaf(self, alt_leaf)
    }
    fn reset_leaf(&mut self, alt_leaf: NodeId) {
        Hpt::reset_leaf(self, alt_leaf)
    }
    fn d_min(&self) -> i32 {
        Hpt::d_min(self)
    }
    fn d_max(&self) -> i32 {
        Hpt::d_max(self)
    }
}

/// Direct lazy state on the replicate nodes themselves.
///
/// Marking a leaf walks its root path once, pushing the pending `diff` into
/// siblings on the way down and recomputing the extrema on the way back up.
/// On a balanced replicate the path is O(log n), which makes the whole HPT
/// machinery unnecessary; on a caterpillar it degrades to O(n) per leaf, so
/// the dispatcher only picks this backend for provably balanced trees.
pub struct FlatAlt<'a> {
    alt: &'a SealedTree,
    d_lazy: Vec<i32>,
    d_min: Vec<i32>,
    d_max: Vec<i32>,
    diff: Vec<i32>,
    path: Vec<NodeId>,
}

impl<'a> FlatAlt<'a> {
    pub fn new(alt: &'a SealedTree) -> Self {
        let n = alt.len();
        let mut d_lazy = vec![0; n];
        let mut d_min = vec![0; n];
        let mut d_max = vec![0; n];
        for v in 0..n {
            let size = alt.subtree_size[v] as i32;
            d_lazy[v] = size;
            d_min[v] = 1;
            d_max[v] = size;
        }
        Self {
            alt,
            d_lazy,
            d_min,
            d_max,
            diff: vec![0; n],
            path: Vec::new(),
        }
    }
}

impl LazyAlt for FlatAlt<'_> {
    fn add_leaf(&mut self, leaf: NodeId) {
        let alt = self.alt;
        debug_assert!(alt.is_leaf(leaf));

        self.path.clear();
        let mut u = leaf;
        self.path.push(u);
        while let Some(p) = alt.parent[u] {
            self.path.push(p);
            u = p;
        }
        let len = self.path.len();

        // Down from the root: ancestors of the leaf lose 1, subtrees
        // branching off the path gain 1, deferred into their diff.
        for i in (1..len).rev() {
            let v = self.path[i];
            let down = self.path[i - 1];
            let dv = self.diff[v];
            self.d_lazy[v] += dv - 1;
            self.diff[down] += dv;
            for &c in &alt.children[v] {
                if c != down {
                    self.diff[c] += dv + 1;
                }
            }
            self.diff[v] = 0;
        }
        self.d_lazy[leaf] += self.diff[leaf] - 1;
        self.diff[leaf] = 0;

        // Back up: refresh the extrema from each node's children
        self.d_min[leaf] = self.d_lazy[leaf];
        self.d_max[leaf] = self.d_lazy[leaf];
        for i in 1..len {
            let v = self.path[i];
            let mut mn = self.d_lazy[v];
            let mut mx = self.d_lazy[v];
            for &c in &alt.children[v] {
                mn = mn.min(self.d_min[c] + self.diff[c]);
                mx = mx.max(self.d_max[c] + self.diff[c]);
            }
            self.d_min[v] = mn;
            self.d_max[v] = mx;
        }
    }

    fn reset_leaf(&mut self, leaf: NodeId) {
        let alt = self.alt;
        debug_assert!(alt.is_leaf(leaf));
        let mut u = leaf;
        loop {
            let size = alt.subtree_size[u] as i32;
            self.d_lazy[u] = size;
            self.d_max[u] = size;
            self.d_min[u] = 1;
            self.diff[u] = 0;
            for &c in &alt.children[u] {
                self.diff[c] = 0;
            }
            match alt.parent[u] {
                Some(p) => u = p,
                None => break,
            }
        }
    }

    fn d_min(&self) -> i32 {
        self.d_min[self.alt.root]
    }

    fn d_max(&self) -> i32 {
        self.d_max[self.alt.root]
    }
}

/// Result of the lazy engine for one (reference, replicate) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastResult {
    /// Minimum transfer distance of the edge above each reference node
    /// (root slot unused).
    pub transfer_index: Vec<u32>,
    /// Rooted distance extrema recorded per reference node.
    pub ti_min: Vec<i32>,
    pub ti_max: Vec<i32>,
}

fn check_shapes(reference: &SealedTree, replicate: &SealedTree) -> Result<(), TreeError> {
    if !reference.binary {
        return Err(TreeError::ShapeError(
            "reference tree is not binary".to_string(),
        ));
    }
    if !replicate.binary {
        return Err(TreeError::ShapeError(
            "replicate tree is not binary".to_string(),
        ));
    }
    Ok(())
}

/// Transfer indices for every reference edge against one replicate, in
/// O(n log n)-flavoured time.
///
/// Each reference leaf starts a climb along its own heavy path; at every
/// node on the path the light-subtree leaves are marked in the replicate,
/// the replicate extrema are recorded, and the climb stops where the node
/// is no longer its parent's heavy child. A later climb continues the path.
/// Both trees must satisfy the binary/pseudo-root shape.
pub fn transfer_indices(
    reference: &SealedTree,
    replicate: &SealedTree,
) -> Result<FastResult, TreeError> {
    check_shapes(reference, replicate)?;

    if replicate.balanced {
        let mut alt = FlatAlt::new(replicate);
        Ok(walk(reference, replicate, &mut alt))
    } else {
        let mut alt = Hpt::new(replicate, false)?;
        Ok(walk(reference, replicate, &mut alt))
    }
}

/// Like [`transfer_indices`], but also extracts the identity of a minimum
/// transfer set per reference edge. Always runs on the HPT, where the set
/// bookkeeping lives.
pub fn transfer_indices_with_sets(
    reference: &SealedTree,
    replicate: &SealedTree,
) -> Result<(FastResult, Vec<Option<Vec<TaxonId>>>), TreeError> {
    check_shapes(reference, replicate)?;
    let mut alt = Hpt::new(replicate, true)?;
    let mut sets: Vec<Option<Vec<TaxonId>>> = vec![None; reference.len()];

    let result = walk_inner(reference, replicate, &mut alt, |u, alt| {
        sets[u] = Some(alt.transfer_set());
    });
    Ok((result, sets))
}

fn walk<B: LazyAlt>(reference: &SealedTree, replicate: &SealedTree, alt: &mut B) -> FastResult {
    walk_inner(reference, replicate, alt, |_, _| {})
}

fn walk_inner<B: LazyAlt>(
    reference: &SealedTree,
    replicate: &SealedTree,
    alt: &mut B,
    mut on_node: impl FnMut(NodeId, &B),
) -> FastResult {
    let n = reference.n_taxa;
    let mut ti_min = vec![0i32; reference.len()];
    let mut ti_max = vec![0i32; reference.len()];

    for t in 0..n {
        let start = reference.leaf_of_taxon[t];

        // Mark up the heavy path, recording the replicate extrema at every
        // node. Leaves marked lower on this path stay marked.
        let mut u = start;
        loop {
            if reference.is_leaf(u) {
                alt.add_leaf(replicate.leaf_of_taxon[t]);
            } else {
                for &l in &reference.light_leaves[u] {
                    let taxon = reference.taxon[l].unwrap();
                    alt.add_leaf(replicate.leaf_of_taxon[taxon]);
                }
            }
            ti_min[u] = alt.d_min();
            ti_max[u] = alt.d_max();
            on_node(u, alt);

            match reference.parent[u] {
                Some(p) if reference.heavy_child[p] == Some(u) => u = p,
                _ => break,
            }
        }

        // Unmark the same leaves so the next climb starts clean
        let mut u = start;
        loop {
            if reference.is_leaf(u) {
                alt.reset_leaf(replicate.leaf_of_taxon[t]);
            } else {
                for &l in &reference.light_leaves[u] {
                    let taxon = reference.taxon[l].unwrap();
                    alt.reset_leaf(replicate.leaf_of_taxon[taxon]);
                }
            }
            match reference.parent[u] {
                Some(p) if reference.heavy_child[p] == Some(u) => u = p,
                _ => break,
            }
        }
    }

    // Fold node extrema onto the edges above them: a bipartition and its
    // complement are one unrooted split.
    let mut transfer_index = vec![0u32; reference.len()];
    for v in reference.edge_ids() {
        transfer_index[v] = ti_min[v].min(n as i32 - ti_max[v]) as u32;
    }

    FastResult {
        transfer_index,
        ti_min,
        ti_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::transfer::naive;
    use crate::libs::transfer::seal::seal;
    use crate::libs::transfer::taxa::TaxonTable;
    use crate::libs::phylo::Tree;

    fn pair(ref_nwk: &str, rep_nwk: &str) -> (SealedTree, SealedTree) {
        let ref_tree = Tree::from_newick(ref_nwk).unwrap();
        let taxa = TaxonTable::from_tree(&ref_tree).unwrap();
        let rep_tree = Tree::from_newick(rep_nwk).unwrap();
        (
            seal(&ref_tree, &taxa).unwrap(),
            seal(&rep_tree, &taxa).unwrap(),
        )
    }

    fn assert_engines_agree(r: &SealedTree, b: &SealedTree) {
        let oracle = naive::transfer_indices(r, b);

        // Both backends, regardless of what the dispatcher would pick
        let mut flat = FlatAlt::new(b);
        let via_flat = walk(r, b, &mut flat);
        let mut hpt = Hpt::new(b, false).unwrap();
        let via_hpt = walk(r, b, &mut hpt);

        for v in r.edge_ids() {
            assert_eq!(
                via_flat.transfer_index[v], oracle.min_dist[v],
                "flat backend disagrees on edge {}",
                v
            );
            assert_eq!(
                via_hpt.transfer_index[v], oracle.min_dist[v],
                "HPT backend disagrees on edge {}",
                v
            );
        }
    }

    #[test]
    fn test_minimum_tree() {
        // Three leaves: no internal edge, every terminal edge matches
        let (r, b) = pair("(A,B,C);", "(B,C,A);");
        assert_engines_agree(&r, &b);
        let res = transfer_indices(&r, &b).unwrap();
        for v in r.edge_ids() {
            assert_eq!(res.transfer_index[v], 0);
        }
    }

    #[test]
    fn test_agreement_identical() {
        let (r, b) = pair("((A,B),(C,D),E);", "((A,B),(C,D),E);");
        assert_engines_agree(&r, &b);
    }

    #[test]
    fn test_agreement_swap() {
        let (r, b) = pair("((A,B),(C,D),E);", "((A,C),(B,D),E);");
        assert_engines_agree(&r, &b);
    }

    #[test]
    fn test_agreement_caterpillars() {
        // Both trees maximally unbalanced
        let (r, b) = pair(
            "((((((A,B),C),D),E),F),G,H);",
            "((((((H,F),B),D),A),C),E,G);",
        );
        assert_engines_agree(&r, &b);
    }

    #[test]
    fn test_agreement_mixed_shapes() {
        let (r, b) = pair(
            "(((A,B),(C,D)),((E,F),(G,H)),(I,(J,K)));",
            "(((A,K),(C,J)),((E,B),(G,D)),(I,(F,H)));",
        );
        assert_engines_agree(&r, &b);
    }

    /// Deterministic random binary tree over the given taxa.
    fn random_newick(taxa: &[String], seed: &mut u64) -> String {
        fn next(seed: &mut u64) -> u64 {
            // LCG constants from Numerical Recipes
            *seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            *seed >> 33
        }

        let mut parts: Vec<String> = taxa.to_vec();
        while parts.len() > 3 {
            let i = (next(seed) as usize) % parts.len();
            let a = parts.swap_remove(i);
            let j = (next(seed) as usize) % parts.len();
            let b = parts.swap_remove(j);
            parts.push(format!("({},{})", a, b));
        }
        format!("({},{},{});", parts[0], parts[1], parts[2])
    }

    #[test]
    fn test_agreement_random_trees() {
        let taxa: Vec<String> = (0..48).map(|i| format!("t{:02}", i)).collect();
        let mut seed = 0x5eed;

        for _ in 0..8 {
            let ref_nwk = random_newick(&taxa, &mut seed);
            let rep_nwk = random_newick(&taxa, &mut seed);
            let (r, b) = pair(&ref_nwk, &rep_nwk);
            assert_engines_agree(&r, &b);
        }
    }

    #[test]
    fn test_terminal_edges_are_zero() {
        let (r, b) = pair(
            "(((A,B),(C,D)),((E,F),(G,H)));",
            "(((A,H),(C,F)),((E,D),(G,B)));",
        );
        let res = transfer_indices(&r, &b).unwrap();
        for v in r.edge_ids() {
            if r.is_leaf(v) {
                assert_eq!(res.transfer_index[v], 0);
            }
            assert!(res.transfer_index[v] as usize <= r.topo_depth[v]);
        }
    }

    #[test]
    fn test_disjoint_topology_is_maximally_distant() {
        // No reference split survives; every internal edge sits at the
        // farthest attainable distance, one less than its topological depth
        // (a terminal replicate edge is always within p - 1).
        let (r, b) = pair("((A,B),(C,D),(E,F));", "((A,D),(C,F),(E,B));");
        let res = transfer_indices(&r, &b).unwrap();
        for v in r.edge_ids() {
            if !r.is_leaf(v) {
                assert_eq!(res.transfer_index[v] as usize, r.topo_depth[v] - 1);
            }
        }
    }

    #[test]
    fn test_rerun_is_identical() {
        let (r, b) = pair(
            "(((A,B),(C,D)),((E,F),(G,H)),I);",
            "(((A,F),(C,H)),((E,B),(G,D)),I);",
        );
        let first = transfer_indices(&r, &b).unwrap();
        let second = transfer_indices(&r, &b).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_pseudo_root_choice_is_irrelevant() {
        // The same unrooted tree written with different pseudo-roots
        let rooted_a = "((A,B),(C,D),(E,F));";
        let rooted_b = "(A,B,((C,D),(E,F)));";
        let rep = "((A,C),(B,D),(E,F));";

        let (r1, b1) = pair(rooted_a, rep);
        let (r2, b2) = pair(rooted_b, rep);
        let res1 = transfer_indices(&r1, &b1).unwrap();
        let res2 = transfer_indices(&r2, &b2).unwrap();

        // Compare per split: node ids differ between the two rootings
        let collect = |r: &SealedTree, res: &FastResult| {
            let mut v: Vec<(usize, u32)> = r
                .edge_ids()
                .filter(|&e| r.topo_depth[e] > 1)
                .map(|e| (r.topo_depth[e], res.transfer_index[e]))
                .collect();
            v.sort_unstable();
            v
        };
        assert_eq!(collect(&r1, &res1), collect(&r2, &res2));
    }

    #[test]
    fn test_sets_sized_like_indices() {
        let (r, b) = pair(
            "(((A,B),(C,D)),((E,F),(G,H)),(I,J));",
            "(((A,J),(C,D)),((E,H),(G,F)),(I,B));",
        );
        let (res, sets) = transfer_indices_with_sets(&r, &b).unwrap();
        for v in r.edge_ids() {
            let set = sets[v].as_ref().unwrap();
            assert_eq!(set.len() as u32, res.transfer_index[v], "edge {}", v);
        }
    }

    #[test]
    fn test_sets_on_complement_side() {
        // The {B,C,D,E} reference clade is best matched through the far
        // side of a replicate terminal split
        let (r, b) = pair("(((B,C),(D,E)),A,F);", "((((A,B),C),D),E,F);");
        let (res, sets) = transfer_indices_with_sets(&r, &b).unwrap();
        for v in r.edge_ids() {
            let set = sets[v].as_ref().unwrap();
            assert_eq!(set.len() as u32, res.transfer_index[v], "edge {}", v);
        }
    }

    #[test]
    fn test_shape_rejection() {
        let (r, b) = pair("((A,B,C),D,E);", "((A,B),(C,D),E);");
        assert!(matches!(
            transfer_indices(&r, &b),
            Err(TreeError::ShapeError(_))
        ));
        let (r2, b2) = pair("((A,B),(C,D),E);", "(A,B,C,(D,E));");
        assert!(matches!(
            transfer_indices(&r2, &b2),
            Err(TreeError::ShapeError(_))
        ));
    }
}
