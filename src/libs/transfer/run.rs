use super::engine;
use super::fbp;
use super::naive;
use super::seal::{seal, SealedTree};
use super::taxa::TaxonTable;
use crate::libs::phylo::tree::io as tree_io;
use crate::libs::phylo::{Tree, TreeError};
use rayon::prelude::*;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Support algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algo {
    /// Transfer Bootstrap Expectation
    Tbe,
    /// Classical Felsenstein support (exact bipartition match)
    Fbp,
}

impl std::str::FromStr for Algo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tbe" => Ok(Algo::Tbe),
            "fbp" => Ok(Algo::Fbp),
            _ => Err(format!("unknown algorithm [{}]", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupportOpts {
    pub algo: Algo,
    pub threads: usize,
    /// Optional per-branch statistics table (TSV)
    pub stats: Option<String>,
}

impl Default for SupportOpts {
    fn default() -> Self {
        Self {
            algo: Algo::Tbe,
            threads: 1,
            stats: None,
        }
    }
}

/// What happened to the replicate stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub n_used: u64,
    pub n_skipped: u64,
}

/// Per-worker accumulator, merged pairwise at the join point. All counters
/// are plain sums over the replicate multiset, so the merged result does not
/// depend on how replicates were distributed over workers.
#[derive(Debug, Clone)]
struct Acc {
    dist_sum: Vec<u64>,
    hits: Vec<u64>,
    n_used: u64,
    n_skipped: u64,
}

impl Acc {
    fn new(n_nodes: usize) -> Self {
        Self {
            dist_sum: vec![0; n_nodes],
            hits: vec![0; n_nodes],
            n_used: 0,
            n_skipped: 0,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.dist_sum.iter_mut().zip(&other.dist_sum) {
            *a += b;
        }
        for (a, b) in self.hits.iter_mut().zip(&other.hits) {
            *a += b;
        }
        self.n_used += other.n_used;
        self.n_skipped += other.n_skipped;
        self
    }
}

/// Compute one replicate's contribution against the shared reference.
fn one_replicate(
    block: &str,
    reference: &SealedTree,
    taxa: &TaxonTable,
    algo: Algo,
    use_naive: bool,
) -> Result<Acc, TreeError> {
    let rep_tree = Tree::from_newick(block)?;
    let rep_sealed = seal(&rep_tree, taxa)?;

    let mut acc = Acc::new(reference.len());
    acc.n_used = 1;

    match algo {
        Algo::Fbp => {
            let splits = fbp::split_set(&rep_sealed);
            let matched = fbp::exact_matches(reference, &splits);
            for v in reference.edge_ids() {
                if matched[v] {
                    acc.hits[v] += 1;
                }
            }
        }
        Algo::Tbe => {
            let min_dist: Vec<u32> = if use_naive {
                naive::transfer_indices(reference, &rep_sealed).min_dist
            } else {
                match engine::transfer_indices(reference, &rep_sealed) {
                    Ok(fast) => fast.transfer_index,
                    Err(TreeError::ShapeError(msg)) => {
                        // Same numbers, quadratic time; better than losing
                        // the replicate
                        log::warn!("falling back to the quadratic engine: {}", msg);
                        naive::transfer_indices(reference, &rep_sealed).min_dist
                    }
                    Err(e) => return Err(e),
                }
            };
            for v in reference.edge_ids() {
                acc.dist_sum[v] += min_dist[v] as u64;
            }
        }
    }

    Ok(acc)
}

/// Load the reference, stream the replicates through worker threads and
/// write the annotated tree (plus the optional per-branch table).
///
/// Replicates that fail to parse or carry a different leaf set are logged
/// and skipped; those errors are fatal only on the reference side.
pub fn annotate_support(
    ref_file: &str,
    boot_file: &str,
    out_file: &str,
    opts: &SupportOpts,
    cancel: &AtomicBool,
) -> anyhow::Result<RunReport> {
    for path in [ref_file, boot_file] {
        if path != "stdin" && !std::path::Path::new(path).is_file() {
            anyhow::bail!("Can't open [{}]", path);
        }
    }

    // The reference fixes the taxon table for the whole run
    let mut ref_trees = tree_io::from_file(ref_file)?;
    if ref_trees.is_empty() {
        anyhow::bail!("no tree found in [{}]", ref_file);
    }
    if ref_trees.len() > 1 {
        log::warn!(
            "[{}] contains {} trees; using the first as the reference",
            ref_file,
            ref_trees.len()
        );
    }
    let mut ref_tree = ref_trees.swap_remove(0);
    ref_tree.support_from_labels();

    let taxa = TaxonTable::from_tree(&ref_tree)?;
    let reference = seal(&ref_tree, &taxa)?;

    let use_naive = opts.algo == Algo::Tbe && !reference.binary;
    if use_naive {
        log::warn!("reference tree is not binary; using the quadratic engine");
    }

    // One candidate tree per `;`-terminated block
    let mut boot_reader = intspan::reader(boot_file);
    let mut content = String::new();
    std::io::Read::read_to_string(&mut boot_reader, &mut content)
        .map_err(|e| anyhow::anyhow!("Can't read [{}]: {}", boot_file, e))?;
    let blocks = tree_io::split_blocks(&content);
    if blocks.is_empty() {
        anyhow::bail!("no replicate trees found in [{}]", boot_file);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.threads)
        .build()?;

    let progress = AtomicU64::new(0);
    let acc = pool.install(|| {
        blocks
            .par_iter()
            .enumerate()
            .fold(
                || Acc::new(reference.len()),
                |acc, (i, block)| {
                    // Cooperative cancellation between replicates
                    if cancel.load(Ordering::Relaxed) {
                        return acc;
                    }

                    let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % 100 == 0 {
                        log::info!("{} replicates processed", done);
                    }

                    match one_replicate(block, &reference, &taxa, opts.algo, use_naive) {
                        Ok(one) => acc.merge(one),
                        Err(e) => {
                            log::warn!("skipping replicate {}: {}", i + 1, e);
                            let mut acc = acc;
                            acc.n_skipped += 1;
                            acc
                        }
                    }
                },
            )
            .reduce(|| Acc::new(reference.len()), Acc::merge)
    });

    if acc.n_used == 0 {
        anyhow::bail!("no usable replicate tree in [{}]", boot_file);
    }

    // Normalise the sums into per-edge supports and annotate the reference
    for v in reference.edge_ids() {
        if reference.is_leaf(v) {
            continue;
        }
        let p = reference.topo_depth[v];
        let support = match opts.algo {
            Algo::Fbp => acc.hits[v] as f64 / acc.n_used as f64,
            Algo::Tbe => {
                if p <= 1 {
                    // A trivial split is in every replicate
                    1.0
                } else {
                    let mean = acc.dist_sum[v] as f64 / acc.n_used as f64;
                    1.0 - mean / (p as f64 - 1.0)
                }
            }
        };
        let node = ref_tree.get_node_mut(v).unwrap();
        node.support = Some(support);
        node.name = None;
    }

    let mut writer = intspan::writer(out_file);
    writer.write_fmt(format_args!("{}\n", ref_tree.to_newick()))?;

    if let Some(stats_file) = &opts.stats {
        write_stats(stats_file, &ref_tree, &reference, &acc, opts.algo)?;
    }

    Ok(RunReport {
        n_used: acc.n_used,
        n_skipped: acc.n_skipped,
    })
}

/// One row per internal reference edge:
/// `edge_id  topo_depth  mean_min_dist  support`.
fn write_stats(
    stats_file: &str,
    ref_tree: &Tree,
    reference: &SealedTree,
    acc: &Acc,
    algo: Algo,
) -> anyhow::Result<()> {
    let mut writer = intspan::writer(stats_file);
    writer.write_fmt(format_args!("edge_id\ttopo_depth\tmean_min_dist\tsupport\n"))?;

    for v in reference.edge_ids() {
        if reference.is_leaf(v) {
            continue;
        }
        let mean = match algo {
            Algo::Tbe => format!("{:.6}", acc.dist_sum[v] as f64 / acc.n_used as f64),
            Algo::Fbp => "NA".to_string(),
        };
        let support = ref_tree.get_node(v).unwrap().support.unwrap_or(1.0);
        writer.write_fmt(format_args!(
            "{}\t{}\t{}\t{:.6}\n",
            v, reference.topo_depth[v], mean, support
        ))?;
    }

    Ok(())
}
