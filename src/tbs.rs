extern crate clap;
use clap::*;

use std::sync::atomic::AtomicBool;
use tbs::libs::transfer::run::{annotate_support, Algo, SupportOpts};

fn main() -> anyhow::Result<()> {
    let app = Command::new("tbs")
        .version(crate_version!())
        .about("`tbs` - Transfer Bootstrap Support for phylogenetic trees")
        .disable_version_flag(true)
        .color(ColorChoice::Auto)
        .after_help(
            r###"
Annotates every internal branch of a reference tree with a support value
computed from a set of replicate (bootstrap) trees over the same taxa.

Algorithms:
* tbe - Transfer Bootstrap Expectation: 1 - avg(min transfer distance)/(p-1),
        where p is the size of the lighter side of the branch's bipartition.
        Replicates that merely move a few taxa still count towards support.
* fbp - Classical Felsenstein support: the fraction of replicates containing
        the exact bipartition.

Notes:
* The replicate file holds one tree per line (or per ';'-terminated block).
* Replicates that fail to parse or carry a different leaf set are skipped
  with a warning; the run fails only if none can be used.
* Branch lengths of the reference are preserved; existing internal labels
  are replaced by the computed supports.

Examples:
1. TBE supports, four worker threads:
   tbs -i ref.nwk -b boot.nwk -@ 4 -o annotated.nwk

2. Classical supports plus a per-branch table:
   tbs -i ref.nwk -b boot.nwk -a fbp -S branches.tsv
"###,
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .required(true)
                .num_args(1)
                .help("Reference tree file. [stdin] for standard input"),
        )
        .arg(
            Arg::new("boot")
                .short('b')
                .long("boot")
                .required(true)
                .num_args(1)
                .help("Replicate trees file, one tree per line"),
        )
        .arg(
            Arg::new("outfile")
                .short('o')
                .long("outfile")
                .num_args(1)
                .default_value("stdout")
                .help("Output filename. [stdout] for screen"),
        )
        .arg(
            Arg::new("algo")
                .short('a')
                .long("algo")
                .num_args(1)
                .value_parser(["tbe", "fbp"])
                .default_value("tbe")
                .help("Support algorithm"),
        )
        .arg(
            Arg::new("threads")
                .short('@')
                .long("threads")
                .num_args(1)
                .value_parser(value_parser!(usize))
                .default_value("1")
                .help("Number of worker threads"),
        )
        .arg(
            Arg::new("stats")
                .short('S')
                .long("stats")
                .num_args(1)
                .help("Write a per-branch statistics table (TSV) to this file"),
        )
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .num_args(1)
                .value_parser(value_parser!(u64))
                .help("PRNG seed, reserved for shuffle-based workflows"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress progress reporting"),
        )
        .arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .action(ArgAction::Version)
                .help("Print version"),
        );

    let args = app.get_matches();

    let level = if args.get_flag("quiet") {
        log::LevelFilter::Warn
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Some(seed) = args.get_one::<u64>("seed") {
        log::debug!("seed set to {}", seed);
    }

    let opts = SupportOpts {
        algo: args
            .get_one::<String>("algo")
            .unwrap()
            .parse::<Algo>()
            .map_err(|e| anyhow::anyhow!(e))?,
        threads: *args.get_one::<usize>("threads").unwrap(),
        stats: args.get_one::<String>("stats").cloned(),
    };

    let cancel = AtomicBool::new(false);
    let report = annotate_support(
        args.get_one::<String>("input").unwrap(),
        args.get_one::<String>("boot").unwrap(),
        args.get_one::<String>("outfile").unwrap(),
        &opts,
        &cancel,
    )?;

    log::info!(
        "{} replicates used, {} skipped",
        report.n_used,
        report.n_skipped
    );

    Ok(())
}
