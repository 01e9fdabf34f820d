//! ep CLI
//!
//! Runs encoded runner plans over JSON input batches.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod input;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use ep_cluster::{Distributer, LoopbackDistributer};
use ep_core::Type;
use ep_runtime::{Context, EngineConfig, Runner, RunnerRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ep")]
#[command(about = "Streaming runner engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan over input batches
    Run {
        /// Path to plan file
        #[arg(short, long)]
        plan: PathBuf,
        /// Path to input file
        #[arg(short, long)]
        input: PathBuf,
        /// Distribute across this many in-process peers
        #[arg(long)]
        peers: Option<usize>,
        /// Capacity of every inter-stage channel
        #[arg(long, default_value_t = 1)]
        channel_capacity: usize,
    },
    /// Print the output schema of a plan
    Schema {
        /// Path to plan file
        #[arg(short, long)]
        plan: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ep=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = Arc::new(registry()?);

    match cli.command {
        Commands::Run {
            plan,
            input,
            peers,
            channel_capacity,
        } => {
            let config = EngineConfig::new().with_channel_capacity(channel_capacity);
            run(registry, &plan, &input, peers, config).await
        }
        Commands::Schema { plan } => {
            let runner = input::load_plan(&registry, &plan)?;
            println!("{}", schema(&runner.returns()));
            Ok(())
        }
    }
}

fn registry() -> Result<RunnerRegistry> {
    let mut registry = RunnerRegistry::with_builtins();
    ep_cluster::register(&mut registry)?;
    Ok(registry)
}

fn schema(types: &[Type]) -> String {
    let names: Vec<String> = types.iter().map(ToString::to_string).collect();
    format!("[{}]", names.join(","))
}

async fn run(
    registry: Arc<RunnerRegistry>,
    plan: &Path,
    input: &Path,
    peers: Option<usize>,
    config: EngineConfig,
) -> Result<()> {
    let mut runner = input::load_plan(&registry, plan)?;
    let batches = input::load_batches(input)?;

    if let Some(n) = peers.filter(|n| *n > 0) {
        let addrs: Vec<String> = (0..n).map(|i| format!("peer-{}", i)).collect();
        runner = LoopbackDistributer::new("local", Arc::clone(&registry)).distribute(runner, &addrs)?;
    }

    let ctx = Context::new(config);
    info!(run_id = %ctx.run_id(), kind = %runner.kind(), batches = batches.len(), "run started");

    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    println!("{}", schema(&runner.returns()));

    let (in_tx, in_rx) = ctx.channel();
    let (out_tx, mut out_rx) = ctx.channel();
    let produce = async move {
        for data in batches {
            if in_tx.send(data).await.is_err() {
                break;
            }
        }
    };
    let print = async move {
        let mut rows = 0;
        while let Some(data) = out_rx.recv().await {
            rows += data.len();
            for line in data.strings() {
                println!("{}", line);
            }
        }
        rows
    };

    let ((), result, rows) = tokio::join!(produce, runner.run(&ctx, in_rx, out_tx), print);
    debug!(run_id = %ctx.run_id(), rows, "run finished");
    match result {
        Err(err) if !err.is_sentinel() => Err(err.into()),
        _ => Ok(()),
    }
}
