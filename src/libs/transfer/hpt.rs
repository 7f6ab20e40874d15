use super::seal::SealedTree;
use super::taxa::TaxonId;
use crate::libs::phylo::node::NodeId;
use crate::libs::phylo::TreeError;

/// Index into the HPT arena.
pub type PathId = usize;

/// One node of the Heavy-Path Tree.
///
/// A replicate tree is decomposed into heavy paths; each heavy path becomes
/// a balanced binary Path Tree (PT) whose leaves are, in order, the nodes of
/// that path from top to bottom. A PT leaf standing for an internal
/// replicate node carries the roots of the heavy paths pendant on its light
/// children (`child_paths`); a PT leaf standing for a replicate leaf is a
/// leaf of the whole HPT. All PTs glued together via
/// `child_paths`/`parent_path` form the HPT.
///
/// Aggregates are split in two: `*_path` covers the subpath this node spans,
/// `*_subtree` covers the pendant subtrees hanging off that subpath. The two
/// pending deltas `diff_path`/`diff_subtree` are pushed one level at a time,
/// exactly like a segment tree with two kinds of lazy update.
#[derive(Debug, Clone)]
pub struct Path {
    pub left: Option<PathId>,
    pub right: Option<PathId>,
    pub parent: Option<PathId>,
    pub sibling: Option<PathId>,

    /// The replicate node this PT leaf stands for (PT leaves only)
    pub alt_node: Option<NodeId>,

    /// Pendant heavy-path roots (PT leaves of internal replicate nodes)
    pub child_paths: Vec<PathId>,
    pub parent_path: Option<PathId>,

    /// Number of Path nodes on the way to the HPT root, through all PTs
    pub total_depth: usize,
    /// Number of HPT leaves in this node's HPT subtree
    pub num_hpt_leaves: usize,

    pub diff_path: i32,
    pub diff_subtree: i32,
    pub d_min_path: i32,
    pub d_max_path: i32,
    pub d_min_subtree: i32,
    pub d_max_subtree: i32,

    // Transfer-set bookkeeping; empty unless sets are tracked
    pub include_path: Vec<NodeId>,
    pub include_subtree: Vec<NodeId>,
    pub exclude: Vec<NodeId>,
    pub exclude_path: Vec<NodeId>,
}

impl Path {
    fn new() -> Self {
        Self {
            left: None,
            right: None,
            parent: None,
            sibling: None,
            alt_node: None,
            child_paths: Vec::new(),
            parent_path: None,
            total_depth: 0,
            num_hpt_leaves: 0,
            diff_path: 0,
            diff_subtree: 0,
            // An empty mark set gives every node d = subtree size, so any
            // subtree containing a leaf has minimum 1.
            d_min_path: 1,
            d_max_path: 0,
            d_min_subtree: 1,
            d_max_subtree: 1,
            include_path: Vec::new(),
            include_subtree: Vec::new(),
            exclude: Vec::new(),
            exclude_path: Vec::new(),
        }
    }
}

/// The Heavy-Path Tree over one replicate.
///
/// Ids live in a per-instance arena, so concurrent workers never share an id
/// space; dropping the `Hpt` releases everything at once.
pub struct Hpt<'a> {
    alt: &'a SealedTree,
    paths: Vec<Path>,
    root: PathId,
    /// Replicate node id -> the PT leaf standing for it
    pt_leaf_of: Vec<PathId>,
    /// Reusable leaf-to-root buffer
    path_buf: Vec<PathId>,
    track_sets: bool,
}

impl<'a> Hpt<'a> {
    /// Decompose a sealed replicate into its HPT.
    ///
    /// The replicate must be binary apart from a possibly ternary root.
    pub fn new(alt: &'a SealedTree, track_sets: bool) -> Result<Self, TreeError> {
        if !alt.binary {
            return Err(TreeError::ShapeError(
                "heavy-path decomposition needs a binary tree (ternary root allowed)"
                    .to_string(),
            ));
        }

        let mut hpt = Self {
            alt,
            paths: Vec::with_capacity(4 * alt.len()),
            root: 0,
            pt_leaf_of: vec![usize::MAX; alt.len()],
            path_buf: Vec::new(),
            track_sets,
        };

        let mut max_depth = 0;
        hpt.root = hpt.decompose(alt.root, 0, &mut max_depth);
        hpt.path_buf = Vec::with_capacity(max_depth + 1);

        Ok(hpt)
    }

    fn alloc(&mut self) -> PathId {
        let id = self.paths.len();
        self.paths.push(Path::new());
        id
    }

    /// Build the PT for the heavy path starting at `node`, recursing into
    /// pendant heavy paths. Returns the PT root.
    fn decompose(&mut self, node: NodeId, depth: usize, max_depth: &mut usize) -> PathId {
        let mut heavypath = Vec::new();
        let mut v = node;
        loop {
            heavypath.push(v);
            match self.alt.heavy_child[v] {
                Some(h) => v = h,
                None => break,
            }
        }

        if heavypath.len() == 1 {
            self.pt_leaf(heavypath[0], depth, max_depth)
        } else {
            self.partition(&heavypath, depth, max_depth)
        }
    }

    /// Split a heavy path in half, creating one PT node per half until the
    /// halves are single replicate nodes.
    fn partition(&mut self, heavypath: &[NodeId], depth: usize, max_depth: &mut usize) -> PathId {
        let id = self.alloc();
        self.paths[id].total_depth = depth;

        let l1 = heavypath.len() / 2;
        let left = if l1 == 1 {
            self.pt_leaf(heavypath[0], depth + 1, max_depth)
        } else {
            self.partition(&heavypath[..l1], depth + 1, max_depth)
        };
        let right = if heavypath.len() - l1 == 1 {
            self.pt_leaf(heavypath[l1], depth + 1, max_depth)
        } else {
            self.partition(&heavypath[l1..], depth + 1, max_depth)
        };

        self.paths[left].parent = Some(id);
        self.paths[right].parent = Some(id);
        self.paths[left].sibling = Some(right);
        self.paths[right].sibling = Some(left);

        self.paths[id].left = Some(left);
        self.paths[id].right = Some(right);
        self.paths[id].d_min_path =
            self.paths[left].d_min_path.min(self.paths[right].d_min_path);
        self.paths[id].d_max_path =
            self.paths[left].d_max_path.max(self.paths[right].d_max_path);
        self.paths[id].d_max_subtree = self.paths[left]
            .d_max_subtree
            .max(self.paths[right].d_max_subtree);
        self.paths[id].num_hpt_leaves =
            self.paths[left].num_hpt_leaves + self.paths[right].num_hpt_leaves;

        id
    }

    /// PT leaf for one replicate node. An internal replicate node hangs the
    /// PTs of its light children here; a replicate leaf becomes an HPT leaf.
    fn pt_leaf(&mut self, node: NodeId, depth: usize, max_depth: &mut usize) -> PathId {
        let id = self.alloc();
        self.paths[id].total_depth = depth;
        self.paths[id].alt_node = Some(node);
        self.pt_leaf_of[node] = id;

        let size = self.alt.subtree_size[node] as i32;
        self.paths[id].d_max_path = size;

        if !self.alt.is_leaf(node) {
            let heavy = self.alt.heavy_child[node];
            let mut d_min_subtree = i32::MAX;
            let mut d_max_subtree = i32::MIN;
            let mut leaves = 0;

            let light: Vec<NodeId> = self.alt.children[node]
                .iter()
                .copied()
                .filter(|&c| Some(c) != heavy)
                .collect();
            for c in light {
                let cp = self.decompose(c, depth + 1, max_depth);
                self.paths[cp].parent_path = Some(id);
                d_min_subtree = d_min_subtree
                    .min(self.paths[cp].d_min_path)
                    .min(self.paths[cp].d_min_subtree);
                d_max_subtree = d_max_subtree
                    .max(self.paths[cp].d_max_path)
                    .max(self.paths[cp].d_max_subtree);
                leaves += self.paths[cp].num_hpt_leaves;
                self.paths[id].child_paths.push(cp);
            }

            self.paths[id].d_min_subtree = d_min_subtree;
            self.paths[id].d_max_subtree = d_max_subtree;
            self.paths[id].num_hpt_leaves = leaves;
            self.paths[id].d_min_path = size;
        } else {
            *max_depth = (*max_depth).max(depth);
            self.paths[id].num_hpt_leaves = 1;
        }

        id
    }

    fn is_hpt_leaf(&self, p: PathId) -> bool {
        self.paths[p].alt_node.is_some() && self.paths[p].child_paths.is_empty()
    }

    /// Current minimum d over all replicate nodes.
    pub fn d_min(&self) -> i32 {
        let r = &self.paths[self.root];
        if self.is_hpt_leaf(self.root) {
            r.d_min_path + r.diff_path
        } else {
            (r.d_min_path + r.diff_path).min(r.d_min_subtree + r.diff_subtree)
        }
    }

    /// Current maximum d over all replicate nodes.
    pub fn d_max(&self) -> i32 {
        let r = &self.paths[self.root];
        if self.is_hpt_leaf(self.root) {
            r.d_max_path + r.diff_path
        } else {
            (r.d_max_path + r.diff_path).max(r.d_max_subtree + r.diff_subtree)
        }
    }

    /// Fill `out` with the HPT path from a PT leaf to the HPT root, climbing
    /// each PT and hopping to the parent heavy path in turn.
    fn fill_path_to_root(&self, from: PathId, out: &mut Vec<PathId>) {
        out.clear();
        let mut w = Some(from);
        while let Some(mut p) = w {
            loop {
                out.push(p);
                match self.paths[p].parent {
                    Some(parent) => p = parent,
                    None => break,
                }
            }
            w = self.paths[p].parent_path;
        }
        debug_assert_eq!(out.len(), self.paths[from].total_depth + 1);
    }

    /// Mark one replicate leaf: every ancestor of the leaf loses 1 (its
    /// subtree intersection grew), every other node gains 1. Only the
    /// O(log² n) Path nodes on the HPT root-to-leaf route are touched; the
    /// rest is deferred through the diff fields.
    pub fn add_leaf(&mut self, leaf: NodeId) {
        debug_assert!(self.alt.is_leaf(leaf));
        let lp = self.pt_leaf_of[leaf];
        let mut path = std::mem::take(&mut self.path_buf);
        self.fill_path_to_root(lp, &mut path);
        let len = path.len();

        // Root-to-leaf: push the pending diffs one level down, subtracting
        // on the branch that leads to the leaf and adding on every branch
        // that leaves the route.
        for i in (1..len).rev() {
            let p = path[i];
            let down = path[i - 1];

            if self.paths[p].alt_node.is_some() {
                // PT leaf of an internal replicate node; descend into a
                // pendant heavy path
                if self.track_sets {
                    self.paths[p].exclude.push(leaf);
                }
                let ds = self.paths[p].diff_subtree;
                let cps = self.paths[p].child_paths.clone();
                for cp in cps {
                    self.paths[cp].diff_path += ds;
                    self.paths[cp].diff_subtree += ds;
                    if cp != down {
                        if self.track_sets {
                            self.paths[cp].include_subtree.push(leaf);
                            self.paths[cp].include_path.push(leaf);
                        }
                        self.paths[cp].diff_path += 1;
                        self.paths[cp].diff_subtree += 1;
                    }
                }
                let dp = self.paths[p].diff_path;
                self.paths[p].d_min_path += dp - 1;
                self.paths[p].d_max_path = self.paths[p].d_min_path;
            } else {
                // Internal PT node; descend within the heavy path
                let dp = self.paths[p].diff_path;
                let ds = self.paths[p].diff_subtree;
                self.paths[down].diff_path += dp;
                self.paths[down].diff_subtree += ds;

                let l = self.paths[p].left.unwrap();
                let r = self.paths[p].right.unwrap();
                if down == r {
                    // The upper subpath holds ancestors of the leaf: the
                    // subpath itself gets -1, its pendant subtrees +1.
                    if self.track_sets {
                        self.paths[l].include_subtree.push(leaf);
                        self.paths[l].exclude_path.push(leaf);
                    }
                    self.paths[l].diff_path += dp - 1;
                    self.paths[l].diff_subtree += ds + 1;
                } else {
                    debug_assert_eq!(down, l);
                    // The lower subpath is entirely off the route: +1 on
                    // both the subpath and its pendants.
                    if self.track_sets {
                        self.paths[r].include_path.push(leaf);
                        self.paths[r].include_subtree.push(leaf);
                    }
                    self.paths[r].diff_path += dp + 1;
                    self.paths[r].diff_subtree += ds + 1;
                }
            }

            self.paths[p].diff_path = 0;
            self.paths[p].diff_subtree = 0;
        }

        // The HPT leaf itself: the marked leaf's own d drops by 1
        let bottom = path[0];
        debug_assert!(self.is_hpt_leaf(bottom));
        if self.track_sets {
            self.paths[bottom].exclude.push(leaf);
        }
        let dp = self.paths[bottom].diff_path;
        self.paths[bottom].d_min_path += dp - 1;
        self.paths[bottom].d_max_path = self.paths[bottom].d_min_path;
        self.paths[bottom].diff_path = 0;
        self.paths[bottom].diff_subtree = 0;

        // Leaf-to-root: rebuild the aggregates of every node on the route
        // from its (now clean) children.
        for i in 1..len {
            let p = path[i];

            if self.paths[p].alt_node.is_some() {
                let mut d_min = i32::MAX;
                let mut d_max = i32::MIN;
                for k in 0..self.paths[p].child_paths.len() {
                    let cp = self.paths[p].child_paths[k];
                    let dpc = self.paths[cp].diff_path;
                    d_min = d_min.min(self.paths[cp].d_min_path + dpc);
                    d_max = d_max.max(self.paths[cp].d_max_path + dpc);
                    if !self.is_hpt_leaf(cp) {
                        d_min = d_min.min(self.paths[cp].d_min_subtree + dpc);
                        d_max = d_max.max(self.paths[cp].d_max_subtree + dpc);
                    }
                }
                self.paths[p].d_min_subtree = d_min;
                self.paths[p].d_max_subtree = d_max;
            } else {
                let l = self.paths[p].left.unwrap();
                let r = self.paths[p].right.unwrap();

                self.paths[p].d_min_path = (self.paths[l].d_min_path
                    + self.paths[l].diff_path)
                    .min(self.paths[r].d_min_path + self.paths[r].diff_path);
                self.paths[p].d_max_path = (self.paths[l].d_max_path
                    + self.paths[l].diff_path)
                    .max(self.paths[r].d_max_path + self.paths[r].diff_path);

                if self.is_hpt_leaf(l) {
                    self.paths[p].d_min_subtree =
                        self.paths[r].d_min_subtree + self.paths[r].diff_subtree;
                    self.paths[p].d_max_subtree =
                        self.paths[r].d_max_subtree + self.paths[r].diff_subtree;
                } else if self.is_hpt_leaf(r) {
                    self.paths[p].d_min_subtree =
                        self.paths[l].d_min_subtree + self.paths[l].diff_subtree;
                    self.paths[p].d_max_subtree =
                        self.paths[l].d_max_subtree + self.paths[l].diff_subtree;
                } else {
                    self.paths[p].d_min_subtree = (self.paths[l].d_min_subtree
                        + self.paths[l].diff_subtree)
                        .min(self.paths[r].d_min_subtree + self.paths[r].diff_subtree);
                    self.paths[p].d_max_subtree = (self.paths[l].d_max_subtree
                        + self.paths[l].diff_subtree)
                        .max(self.paths[r].d_max_subtree + self.paths[r].diff_subtree);
                }
            }
        }

        self.path_buf = path;
    }

    /// Undo the marks along one leaf's route, restoring the initial state of
    /// every Path node it may have dirtied.
    pub fn reset_leaf(&mut self, leaf: NodeId) {
        debug_assert!(self.alt.is_leaf(leaf));
        let mut w = self.pt_leaf_of[leaf];
        let mut lastw = w;

        loop {
            // Entry PT leaf of the current PT
            self.paths[w].diff_path = 0;
            self.paths[w].diff_subtree = 0;
            let size = self.alt.subtree_size[self.paths[w].alt_node.unwrap()] as i32;
            self.paths[w].d_min_path = size;
            self.paths[w].d_max_path = size;
            if !self.is_hpt_leaf(w) {
                self.paths[w].d_min_subtree = self.paths[lastw]
                    .d_min_path
                    .min(self.paths[lastw].d_min_subtree);
                self.paths[w].d_max_subtree = self.paths[lastw]
                    .d_max_path
                    .max(self.paths[lastw].d_max_subtree);
                let cps = self.paths[w].child_paths.clone();
                for cp in cps {
                    if cp != lastw {
                        self.paths[cp].diff_path = 0;
                        self.paths[cp].diff_subtree = 0;
                        self.paths[cp].include_subtree.clear();
                        self.paths[cp].include_path.clear();
                    }
                }
            }
            self.paths[w].exclude.clear();

            // Climb this PT, restoring each internal node from its children
            while let Some(parent) = self.paths[w].parent {
                w = parent;
                self.paths[w].exclude.clear();
                self.paths[w].diff_path = 0;
                self.paths[w].diff_subtree = 0;

                let l = self.paths[w].left.unwrap();
                let r = self.paths[w].right.unwrap();
                self.paths[w].d_min_path =
                    self.paths[l].d_min_path.min(self.paths[r].d_min_path);
                self.paths[w].d_max_path =
                    self.paths[l].d_max_path.max(self.paths[r].d_max_path);
                self.paths[w].d_min_subtree = 1;
                self.paths[w].d_max_subtree = self.paths[l]
                    .d_max_subtree
                    .max(self.paths[r].d_max_subtree);

                for c in [l, r] {
                    self.paths[c].diff_path = 0;
                    self.paths[c].diff_subtree = 0;
                    self.paths[c].exclude_path.clear();
                    self.paths[c].include_subtree.clear();
                    self.paths[c].include_path.clear();
                }
            }

            lastw = w;
            match self.paths[w].parent_path {
                Some(pp) => w = pp,
                None => break,
            }
        }
    }

    // ---------------- transfer sets ----------------

    /// The identity of a minimum transfer set for the currently marked
    /// reference node: the taxa whose side-membership must flip to turn the
    /// marked bipartition into the best replicate one. Size equals
    /// `min(d_min, n - d_max)`. Requires `track_sets`.
    pub fn transfer_set(&self) -> Vec<TaxonId> {
        assert!(self.track_sets);
        let min = self.d_min();
        let max = self.alt.n_taxa as i32 - self.d_max();

        let nodes = if min <= max {
            self.min_transfer_set(self.extremum_path(false))
        } else {
            self.max_transfer_set(self.extremum_path(true))
        };

        let mut taxa: Vec<TaxonId> = nodes
            .into_iter()
            .map(|v| self.alt.taxon[v].unwrap())
            .collect();
        taxa.sort_unstable();
        taxa.dedup();
        taxa
    }

    fn d_min_below(&self, p: PathId, accum_path: i32, accum_subtree: i32) -> i32 {
        let path = self.paths[p].d_min_path + self.paths[p].diff_path + accum_path;
        if self.is_hpt_leaf(p) {
            path
        } else {
            path.min(self.paths[p].d_min_subtree + self.paths[p].diff_subtree + accum_subtree)
        }
    }

    fn d_max_below(&self, p: PathId, accum_path: i32, accum_subtree: i32) -> i32 {
        let path = self.paths[p].d_max_path + self.paths[p].diff_path + accum_path;
        if self.is_hpt_leaf(p) {
            path
        } else {
            path.max(self.paths[p].d_max_subtree + self.paths[p].diff_subtree + accum_subtree)
        }
    }

    fn d_below(&self, p: PathId, accum_path: i32, accum_subtree: i32, use_max: bool) -> i32 {
        if use_max {
            self.d_max_below(p, accum_path, accum_subtree)
        } else {
            self.d_min_below(p, accum_path, accum_subtree)
        }
    }

    /// Descend from the HPT root to a Path node realising the current
    /// extremum, accumulating undelivered diffs on the way.
    fn extremum_path(&self, use_max: bool) -> PathId {
        let target = if use_max { self.d_max() } else { self.d_min() };

        let mut cur = self.root;
        let mut accum_path = self.paths[cur].diff_path;
        let mut accum_subtree = self.paths[cur].diff_subtree;

        loop {
            let right = self.paths[cur].right;
            let left = self.paths[cur].left;

            if let Some(r) = right {
                if self.d_below(r, accum_path, accum_subtree, use_max) == target {
                    cur = r;
                    accum_path += self.paths[cur].diff_path;
                    accum_subtree += self.paths[cur].diff_subtree;
                    continue;
                }
            }
            if let Some(l) = left {
                if self.d_below(l, accum_path, accum_subtree, use_max) == target {
                    cur = l;
                    accum_path += self.paths[cur].diff_path;
                    accum_subtree += self.paths[cur].diff_subtree;
                    continue;
                }
            }
            if !self.paths[cur].child_paths.is_empty() {
                let mut found = None;
                for &cp in &self.paths[cur].child_paths {
                    if self.d_below(cp, accum_subtree, accum_subtree, use_max) == target {
                        found = Some(cp);
                        break;
                    }
                }
                match found {
                    Some(cp) => {
                        cur = cp;
                        accum_path = self.paths[cp].diff_path + accum_subtree;
                        accum_subtree = self.paths[cp].diff_subtree + accum_subtree;
                    }
                    None => return cur,
                }
                continue;
            }
            return cur;
        }
    }

    /// Collect the HPT leaves below `p` that were not explicitly excluded.
    fn add_nonexcluded(&self, p: PathId, out: &mut Vec<NodeId>) {
        if self.paths[p].exclude.len() == self.paths[p].num_hpt_leaves {
            return;
        }
        if self.is_hpt_leaf(p) {
            out.push(self.paths[p].alt_node.unwrap());
            return;
        }
        if let Some(l) = self.paths[p].left {
            self.add_nonexcluded(l, out);
        }
        if let Some(r) = self.paths[p].right {
            self.add_nonexcluded(r, out);
        }
        for &cp in &self.paths[p].child_paths {
            self.add_nonexcluded(cp, out);
        }
    }

    /// Marked leaves outside the node's subtree plus unmarked leaves inside
    /// it: the include lists on the way up, then everything below that is
    /// not excluded.
    fn min_transfer_set(&self, node: PathId) -> Vec<NodeId> {
        let mut set = Vec::new();

        let mut path = Vec::new();
        self.fill_path_to_root(node, &mut path);
        let mut in_pt = true;
        for (i, &p) in path.iter().enumerate() {
            if i > 0 && !self.paths[p].child_paths.is_empty() {
                in_pt = false;
            }
            if in_pt {
                set.extend_from_slice(&self.paths[p].include_path);
            } else {
                set.extend_from_slice(&self.paths[p].include_subtree);
            }
        }

        self.add_nonexcluded(node, &mut set);
        // The rest of the heavy path below the node lies inside its subtree
        let mut cur = node;
        while let Some(sib) = self.paths[cur].sibling {
            let parent = self.paths[cur].parent.unwrap();
            if self.paths[parent].left == Some(cur) {
                self.add_nonexcluded(sib, &mut set);
            }
            cur = parent;
        }

        set
    }

    /// Complement-side set for a maximum node: excluded leaves along its
    /// subpath, then every non-excluded leaf from the subtrees hanging off
    /// the walk up to the replicate root.
    fn max_transfer_set(&self, node: PathId) -> Vec<NodeId> {
        let mut set = Vec::new();

        let mut path = Vec::new();
        self.fill_path_to_root(node, &mut path);
        let mut in_pt = true;
        for (i, &p) in path.iter().enumerate() {
            if i > 0 && !self.paths[p].child_paths.is_empty() {
                in_pt = false;
            }
            if in_pt {
                set.extend_from_slice(&self.paths[p].exclude_path);
            }
        }
        set.extend_from_slice(&self.paths[node].exclude);

        let mut cur = node;
        let mut in_subtree = true;
        while self.paths[cur].total_depth > 0 {
            if let Some(sib) = self.paths[cur].sibling {
                let parent = self.paths[cur].parent.unwrap();
                if !in_subtree || self.paths[parent].right == Some(cur) {
                    self.add_nonexcluded(sib, &mut set);
                }
                cur = parent;
            } else {
                in_subtree = false;
                let pp = self.paths[cur].parent_path.unwrap();
                for &cp in &self.paths[pp].child_paths {
                    if cp != cur {
                        self.add_nonexcluded(cp, &mut set);
                    }
                }
                cur = pp;
            }
        }

        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::transfer::seal::seal;
    use crate::libs::transfer::taxa::TaxonTable;
    use crate::libs::phylo::Tree;

    fn sealed(newick: &str) -> SealedTree {
        let tree = Tree::from_newick(newick).unwrap();
        let taxa = TaxonTable::from_tree(&tree).unwrap();
        seal(&tree, &taxa).unwrap()
    }

    fn snapshot(hpt: &Hpt) -> Vec<(i32, i32, i32, i32, i32, i32)> {
        hpt.paths
            .iter()
            .map(|p| {
                (
                    p.diff_path,
                    p.diff_subtree,
                    p.d_min_path,
                    p.d_max_path,
                    p.d_min_subtree,
                    p.d_max_subtree,
                )
            })
            .collect()
    }

    #[test]
    fn test_decomposition_structure() {
        let alt = sealed("(((A,B),C),D,E);");
        let hpt = Hpt::new(&alt, false).unwrap();

        // One PT leaf per replicate node, n HPT leaves in total
        let pt_leaves = hpt.paths.iter().filter(|p| p.alt_node.is_some()).count();
        assert_eq!(pt_leaves, alt.len());
        assert_eq!(hpt.paths[hpt.root].num_hpt_leaves, alt.n_taxa);

        // Initial aggregates: nothing marked, so the minimum over the whole
        // replicate is 1 (any leaf) and the maximum is n (the root)
        assert_eq!(hpt.d_min(), 1);
        assert_eq!(hpt.d_max(), alt.n_taxa as i32);
    }

    #[test]
    fn test_rejects_multifurcation() {
        let alt = sealed("((A,B,C),D,E);");
        assert!(matches!(
            Hpt::new(&alt, false),
            Err(TreeError::ShapeError(_))
        ));
    }

    #[test]
    fn test_add_reset_restores_state() {
        let alt = sealed("((((A,B),C),(D,E)),(F,G),H);");
        let mut hpt = Hpt::new(&alt, true).unwrap();
        let before = snapshot(&hpt);

        // Mark a few leaves, then unmark in the same order
        for t in [0usize, 3, 6] {
            hpt.add_leaf(alt.leaf_of_taxon[t]);
        }
        assert_ne!(snapshot(&hpt), before);
        for t in [0usize, 3, 6] {
            hpt.reset_leaf(alt.leaf_of_taxon[t]);
        }
        assert_eq!(snapshot(&hpt), before);

        // Repeating the cycle gives bitwise-identical state again
        for t in [0usize, 3, 6] {
            hpt.add_leaf(alt.leaf_of_taxon[t]);
        }
        let marked = snapshot(&hpt);
        for t in [0usize, 3, 6] {
            hpt.reset_leaf(alt.leaf_of_taxon[t]);
        }
        for t in [0usize, 3, 6] {
            hpt.add_leaf(alt.leaf_of_taxon[t]);
        }
        assert_eq!(snapshot(&hpt), marked);
    }

    /// Brute-force d(marked, v) over all replicate nodes.
    fn brute_extrema(alt: &SealedTree, marked: &[TaxonId]) -> (i32, i32) {
        let mut d_min = i32::MAX;
        let mut d_max = i32::MIN;
        for v in 0..alt.len() {
            let inside = marked
                .iter()
                .filter(|&&t| alt.bitset[v].contains(t))
                .count() as i32;
            let d = alt.subtree_size[v] as i32 + marked.len() as i32 - 2 * inside;
            d_min = d_min.min(d);
            d_max = d_max.max(d);
        }
        (d_min, d_max)
    }

    #[test]
    fn test_extrema_match_brute_force() {
        let alt = sealed("(((A,(B,Q)),((C,R),(D,S))),((E,(F,T)),(G,H)),(I,J));");
        let n = alt.n_taxa;
        let mut hpt = Hpt::new(&alt, false).unwrap();

        // Incrementally mark leaves in a scattered order and compare the
        // root aggregates against a direct evaluation after every mark.
        let mut marked = Vec::new();
        for t in (0..n).rev() {
            hpt.add_leaf(alt.leaf_of_taxon[t]);
            marked.push(t);
            let (want_min, want_max) = brute_extrema(&alt, &marked);
            assert_eq!(hpt.d_min(), want_min, "after marking {:?}", marked);
            assert_eq!(hpt.d_max(), want_max, "after marking {:?}", marked);
        }
    }

    #[test]
    fn test_transfer_set_complement_side() {
        // Marked {B,C,D,E} against a caterpillar: the best move is through
        // the complement side (flip one taxon to reach the far side of a
        // terminal split), not through any child-side clade.
        let alt = sealed("((((A,B),C),D),E,F);");
        let n = alt.n_taxa;
        let mut hpt = Hpt::new(&alt, true).unwrap();
        for t in [1usize, 2, 3, 4] {
            hpt.add_leaf(alt.leaf_of_taxon[t]);
        }

        assert_eq!(hpt.d_min(), 2);
        assert_eq!(n as i32 - hpt.d_max(), 1);

        let set = hpt.transfer_set();
        assert_eq!(set.len(), 1);

        let mut target = fixedbitset::FixedBitSet::with_capacity(n);
        for t in [1usize, 2, 3, 4] {
            target.insert(t);
        }
        for &t in &set {
            target.toggle(t);
        }
        let hit = (0..alt.len()).any(|v| {
            let mut complement = alt.bitset[v].clone();
            complement.toggle_range(..);
            alt.bitset[v] == target || complement == target
        });
        assert!(hit);
    }

    #[test]
    fn test_transfer_set_exact_complement_is_empty() {
        // {D,E,F} is exactly the far side of the {A,B,C} split
        let alt = sealed("((((A,B),C),D),E,F);");
        let mut hpt = Hpt::new(&alt, true).unwrap();
        for t in [3usize, 4, 5] {
            hpt.add_leaf(alt.leaf_of_taxon[t]);
        }

        assert_eq!(alt.n_taxa as i32 - hpt.d_max(), 0);
        assert!(hpt.transfer_set().is_empty());
    }

    #[test]
    fn test_transfer_set_identity() {
        let alt = sealed("(((A,B),(C,D)),((E,F),(G,H)),(I,J));");
        let n = alt.n_taxa;
        let mut hpt = Hpt::new(&alt, true).unwrap();

        // Mark {A, B, C}: flipping the returned taxa must turn the marked
        // set into the child-side (or parent-side) leaf set of some
        // replicate node.
        let marked = [0usize, 1, 2];
        for &t in &marked {
            hpt.add_leaf(alt.leaf_of_taxon[t]);
        }

        let expected = hpt.d_min().min(n as i32 - hpt.d_max());
        let set = hpt.transfer_set();
        assert_eq!(set.len() as i32, expected);

        let mut target = fixedbitset::FixedBitSet::with_capacity(n);
        for &t in &marked {
            target.insert(t);
        }
        for &t in &set {
            target.toggle(t);
        }
        let hit = (0..alt.len()).any(|v| {
            let mut complement = alt.bitset[v].clone();
            complement.toggle_range(..);
            alt.bitset[v] == target || complement == target
        });
        assert!(hit, "transfer set {:?} does not reach any replicate split", set);
    }
}
