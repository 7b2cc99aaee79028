//! mertune CLI - Minimum error rate training
//!
//! Command-line entry point. It orchestrates the full pipeline:
//!
//! 1. Configuration: mertune.toml (or --config), then flag overrides
//! 2. Loading: n-best candidates, initial/fixed weights, optional companion list
//! 3. Validation: metric and strategy names, per-candidate statistics
//! 4. Search: multi-start parallel tuning
//! 5. Output: weight file, optional JSON report, summary on stderr
//!
//! Everything that can be rejected is rejected before any worker starts.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use mertune::config::TuneConfig;
use mertune::corpus::{read_nbest, Corpus};
use mertune::search::{evaluate_at, Smoothing, TuneOutcome, Tuner};
use mertune::weights::{format_weights, read_weight_list, read_weights, write_weights, WeightVector};
use mertune::{check_corpus, logging, EvaluationMetric, MetricSpec};

/// Minimum error rate training for linear rerankers
///
/// mertune searches for feature weights under which the top-ranked candidate
/// of every n-best list scores best under a corpus metric. It uses exact line
/// searches from several starting points in parallel.
///
/// Examples:
///   mertune bleu dev.nbest init.wts tuned.wts
///   mertune -t 8 -p 20 bleu:4 dev.nbest init.wts,prev.wts tuned.wts
///   mertune --local latest.nbest --mcmc smooth-bleu all.nbest init.wts out.wts
#[derive(Parser, Debug)]
#[command(name = "mertune")]
#[command(version)]
#[command(about, long_about = None)]
pub struct Cli {
    /// Evaluation metric
    ///
    /// One of:
    ///   quality            sum of each candidate's first statistic
    ///   bleu[:N]           corpus BLEU of order N (default 4)
    ///   smooth-bleu[:N]    add-one smoothed BLEU
    ///   bleu:4+0.5*quality weighted combination, parts read consecutive
    ///                      statistics (here 10 BLEU columns, then quality)
    #[arg(value_name = "METRIC")]
    pub metric: String,

    /// n-best candidate file
    ///
    /// One candidate per line: `slot ||| text ||| name=value ... ||| stats`.
    #[arg(value_name = "NBEST")]
    pub nbest: PathBuf,

    /// Initial weight file(s), comma-separated
    ///
    /// The first file is starting point 0. Further files become starting
    /// points 1..k, the rest are random.
    #[arg(value_name = "INITIAL_WEIGHTS")]
    pub initial_weights: String,

    /// Where to write the tuned weights
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Random seed (integer, or any string to hash)
    #[arg(short, long)]
    pub seed: Option<String>,

    /// Number of starting points
    #[arg(short = 'p', long)]
    pub starting_points: Option<usize>,

    /// Optimizer strategy
    ///
    ///   koehn       line search along every axis, keep the best (default)
    ///   coordinate  one axis per step, cycling
    ///   random      random directions
    ///   better      towards a random metric-better selection
    ///   mcmc        random directions, sampled expected-metric objective
    #[arg(short = 'o', long)]
    pub strategy: Option<String>,

    /// Worker threads
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Weights held constant during search
    #[arg(short = 'f', long = "fixed", value_name = "FILE")]
    pub fixed_weights: Option<PathBuf>,

    /// Companion n-best list from the latest generation round
    ///
    /// Must have the same number of slots. With --filter-unreachable,
    /// candidates the initial weights rank above everything in the
    /// companion list are dropped and the companion candidates appended.
    #[arg(long, value_name = "NBEST")]
    pub local: Option<PathBuf>,

    /// Drop candidates unreachable under the companion list
    #[arg(long, requires = "local")]
    pub filter_unreachable: bool,

    /// Line-search smoothing reducer (min or avg)
    #[arg(long)]
    pub smoothing: Option<Smoothing>,

    /// Line-search smoothing half-width
    #[arg(long, value_name = "N")]
    pub window: Option<usize>,

    /// Use the sampled expected metric as the objective
    #[arg(long)]
    pub mcmc: bool,

    /// Configuration file (default: mertune.toml in the working directory or above)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write a JSON run report here
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Verbose output
    ///
    /// Debug-level logging plus progress messages:
    ///   "Loaded 2000 slots, 200000 candidates"
    ///   "Initial eval: 0.2931"
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose).context("failed to initialise logging")?;

    let config = resolve_config(&cli)?;
    let outcome = run(&cli, &config)?;

    print_summary(&config, &outcome);
    Ok(())
}

/// File (or defaults) first, then flags on top.
fn resolve_config(cli: &Cli) -> Result<TuneConfig> {
    let mut config = match &cli.config {
        Some(path) => TuneConfig::load_file(path)?,
        None => {
            let cwd = std::env::current_dir().context("cannot determine working directory")?;
            TuneConfig::load(&cwd)?
        }
    };

    config.metric = cli.metric.clone();
    if let Some(seed) = &cli.seed {
        config.seed = seed.clone();
    }
    if let Some(n) = cli.starting_points {
        config.starting_points = n;
    }
    if let Some(strategy) = &cli.strategy {
        config.strategy = strategy.clone();
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if let Some(fixed) = &cli.fixed_weights {
        config.fixed_weights = Some(fixed.clone());
    }
    if let Some(smoothing) = cli.smoothing {
        config.smoothing = smoothing;
    }
    if let Some(window) = cli.window {
        config.smoothing_window = window;
    }
    config.mcmc.enabled |= cli.mcmc;
    config.filter_unreachable |= cli.filter_unreachable;

    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli, config: &TuneConfig) -> Result<TuneOutcome> {
    if cli.verbose {
        eprintln!("🎯 mertune v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("{}", config.display_summary());
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Stage 1: Metric (fail before touching any input file)
    // ══════════════════════════════════════════════════════════════════════════
    let spec = MetricSpec::parse(&config.metric)?;
    let metric = spec.build();

    // ══════════════════════════════════════════════════════════════════════════
    // Stage 2: Inputs
    // ══════════════════════════════════════════════════════════════════════════
    let mut corpus = read_nbest(&cli.nbest)?;
    check_corpus(metric.as_ref(), &corpus)?;

    let initial = read_weight_list(&cli.initial_weights)?;
    let fixed = match &config.fixed_weights {
        Some(path) => read_weights(path)?,
        None => WeightVector::new(),
    };

    if cli.verbose {
        eprintln!(
            "✓ Loaded {} slots, {} candidates, {} features",
            corpus.len(),
            corpus.n_candidates(),
            corpus.feature_index().len()
        );
        eprintln!("✓ {} initial weight vector(s), {} fixed weights", initial.len(), fixed.len());
    }

    let reference = initial[0].merged(&fixed);

    if let Some(local_path) = &cli.local {
        let local = read_nbest(local_path)?;
        check_corpus(metric.as_ref(), &local)?;
        merge_local(&mut corpus, &local, &reference, metric.as_ref(), config)?;
    }
    corpus.rescore(&reference);

    // ══════════════════════════════════════════════════════════════════════════
    // Stage 3: Search
    // ══════════════════════════════════════════════════════════════════════════
    let tuner = Tuner::new(&corpus, metric.as_ref(), config)?.with_fixed(fixed);
    let outcome = tuner.run(&initial)?;

    // ══════════════════════════════════════════════════════════════════════════
    // Stage 4: Output
    // ══════════════════════════════════════════════════════════════════════════
    write_weights(&cli.output, &outcome.weights)?;
    info!(path = %cli.output.display(), "wrote weights");

    if let Some(report_path) = &cli.report {
        let json = serde_json::to_string_pretty(&outcome.report).context("failed to serialize report")?;
        fs::write(report_path, json)
            .with_context(|| format!("failed to write report to {}", report_path.display()))?;
    }

    Ok(outcome)
}

fn merge_local(
    corpus: &mut Corpus,
    local: &Corpus,
    reference: &WeightVector,
    metric: &dyn EvaluationMetric,
    config: &TuneConfig,
) -> Result<()> {
    let none = WeightVector::new();
    let full_eval = evaluate_at(corpus, metric, reference, &none);
    let local_eval = evaluate_at(local, metric, reference, &none);
    let gap = (local_eval - full_eval).abs();

    info!(full_eval, local_eval, gap, "companion list evaluation");
    if gap < config.max_local_gap {
        info!(gap, "initial weights are reusable");
    } else {
        warn!(gap, max_gap = config.max_local_gap, "initial weights are not reusable");
    }

    corpus
        .merge_companion(local, reference, config.filter_unreachable)
        .context("failed to merge companion n-best list")?;
    Ok(())
}

fn print_summary(config: &TuneConfig, outcome: &TuneOutcome) {
    use owo_colors::OwoColorize;

    let report = &outcome.report;
    eprintln!();
    eprintln!("{}", " MERTUNE ".bold().on_blue());
    eprintln!();
    eprintln!(
        "  {} {}  {} {}  {} {}",
        "metric".dimmed(),
        report.metric,
        "strategy".dimmed(),
        report.strategy,
        "points".dimmed(),
        report.starting_points
    );
    eprintln!(
        "  {} {:.6} → {}",
        "eval".dimmed(),
        report.initial_eval,
        format!("{:.6}", report.final_eval).green().bold()
    );
    if config.mcmc.enabled {
        eprintln!(
            "  {} {:.6} → {:.6}",
            "objective".dimmed(),
            report.initial_objective,
            report.final_objective
        );
    }
    match report.best_point {
        Some(point) => eprintln!("  {} point {}", "best".dimmed(), point),
        None => eprintln!("  {} {}", "best".dimmed(), "initial weights (no improvement)".yellow()),
    }
    eprintln!(
        "  {} {:.6}  {} {:.2}s",
        "weight ssd".dimmed(),
        report.weight_ssd,
        "elapsed".dimmed(),
        report.elapsed_secs
    );
    eprintln!();
    for line in format_weights(&outcome.weights).lines() {
        eprintln!("  {}", line);
    }
}
