#[macro_use]
extern crate tracing;

mod demos;
mod greetings;

use crate::demos::SelectMode;
use anyhow::anyhow;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use std::time::Duration;
use tracing::metadata::LevelFilter;
use tracing_subscriber::EnvFilter;


/// Demonstrations of bounded channels, worker pools and multiplexing
#[derive(Parser, Debug)]
#[command(name = "sluice-playground")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute Fibonacci numbers on a worker pool
    Workers {
        #[arg(short, long, default_value_t = 4, help = "number of worker threads")]
        workers: usize,
        #[arg(short, long, default_value_t = 40, help = "number of jobs, computing fib(0..jobs)")]
        jobs: u64,
    },
    /// Consume a fast and a slow producer, naively or through a multiplexer
    Select {
        #[arg(long, value_enum, default_value_t = SelectMode::Multiplexed)]
        mode: SelectMode,
        #[arg(long, default_value_t = 500)]
        fast_ms: u64,
        #[arg(long, default_value_t = 2000)]
        slow_ms: u64,
        #[arg(long, default_value_t = 10_000, help = "how long to consume for")]
        duration_ms: u64,
    },
    /// Send into a buffered channel with nobody receiving yet
    Buffered,
    /// Count something on another thread, receiving until the channel closes
    Count {
        #[arg(long, default_value = "sheep")]
        thing: String,
        #[arg(long, default_value_t = 49)]
        times: u64,
        #[arg(long, default_value_t = 5)]
        interval_ms: u64,
    },
    /// Greet people
    Greet {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long, help = "seed for picking greeting formats")]
        seed: Option<u64>,
    },
}

fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging()?;
    debug!(?args, "starting");

    match args.command {
        Command::Workers { workers, jobs } => demos::workers(workers, jobs),
        Command::Select { mode, fast_ms, slow_ms, duration_ms } => demos::select(
            mode,
            Duration::from_millis(fast_ms),
            Duration::from_millis(slow_ms),
            Duration::from_millis(duration_ms),
        ),
        Command::Buffered => demos::buffered(),
        Command::Count { thing, times, interval_ms } => {
            demos::count(thing, times, Duration::from_millis(interval_ms))
        }
        Command::Greet { names, seed } => {
            let mut rng = match seed {
                Some(seed) => Pcg64::seed_from_u64(seed),
                None => Pcg64::from_entropy(),
            };
            for (name, greeting) in greetings::hellos(names.as_slice(), &mut rng)? {
                println!("{}: {}", name, greeting);
            }
            Ok(())
        }
    }
}
