use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;

use repools::domain::search::{Objective, RefinementTarget};
use repools::infrastructure::parser;
use repools::{OptimizerConfig, PoolSnapshot, Position, RebalanceService, SnapshotSet};

#[derive(Parser, Debug)]
#[command(version, about = "Yield rebalancer for kinked-rate lending venues")]
struct Args {
    /// Path to a JSON array of pool snapshots
    #[arg(long)]
    snapshots: Option<String>,

    /// Path to a text file of venue status lines
    #[arg(long)]
    status: Option<String>,

    /// Held balances, e.g. "solend=300000,marginfi=0"
    #[arg(long)]
    position: String,

    /// Optimization mode: "realtime" (pure yield) or "equilibrium"
    #[arg(long, default_value = "realtime")]
    mode: String,

    /// Refinement target in realtime mode: "rate" or "gain"
    #[arg(long, default_value = "rate")]
    refine: String,

    /// Path to config file (optional)
    #[arg(long)]
    config: Option<String>,

    /// Minimum profitable gain in basis points (overrides config)
    #[arg(long)]
    min_gain_bps: Option<f64>,

    /// Flat transaction cost in USD (overrides config)
    #[arg(long)]
    fixed_cost_usd: Option<f64>,

    /// Full-move rate gap threshold in percentage points (overrides config)
    #[arg(long)]
    full_move_threshold: Option<f64>,

    /// Emit the report as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut config = if let Some(path) = &args.config {
        OptimizerConfig::from_file(path)?
    } else {
        OptimizerConfig::default()
    };

    // CLI args have higher priority than the config file
    if let Some(min_gain_bps) = args.min_gain_bps {
        config.min_gain_bps = min_gain_bps;
    }
    if let Some(fixed_cost_usd) = args.fixed_cost_usd {
        config.fixed_cost_usd = fixed_cost_usd;
    }
    if let Some(threshold) = args.full_move_threshold {
        config.full_move_threshold_pct = threshold;
    }

    let pools = load_snapshots(&args)?;
    let position = Position::parse(&args.position)?;

    let objective = match args.mode.as_str() {
        "realtime" | "pure-yield" => {
            let refine = match args.refine.as_str() {
                "rate" => RefinementTarget::WeightedRate,
                "gain" => RefinementTarget::GainBps,
                other => bail!("unknown refinement target '{}' (rate|gain)", other),
            };
            Objective::PureYield { refine }
        }
        "equilibrium" => Objective::Equilibrium,
        other => bail!("unknown mode '{}' (realtime|equilibrium)", other),
    };

    let service = RebalanceService::new(config);
    let report = service.recommend(&pools, &position, objective)?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.render_text());
    }

    Ok(())
}

fn load_snapshots(args: &Args) -> Result<SnapshotSet> {
    match (&args.snapshots, &args.status) {
        (Some(path), None) => {
            let s = fs::read_to_string(path)
                .with_context(|| format!("read snapshots {}", path))?;
            let list: Vec<PoolSnapshot> =
                serde_json::from_str(&s).context("parse snapshots JSON")?;
            let mut pools = SnapshotSet::new();
            for snapshot in list {
                pools.insert(snapshot.venue.clone(), snapshot);
            }
            Ok(pools)
        }
        (None, Some(path)) => {
            let s = fs::read_to_string(path)
                .with_context(|| format!("read status file {}", path))?;
            Ok(parser::parse_status(&s)?)
        }
        _ => bail!("provide exactly one of --snapshots or --status"),
    }
}
