//! hotlru-bench - multi-threaded load generator for the hotlru cache

mod workload;

use anyhow::{Context, Result};
use clap::Parser;
use hotlru::Lru;
use tracing::info;

use crate::workload::Workload;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cache capacity (number of items)
    #[arg(short, long, default_value_t = hotlru::DEFAULT_SIZE)]
    capacity: usize,

    /// Worker threads sharing the cache
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Operations per worker thread
    #[arg(short, long, default_value_t = 100_000)]
    ops: u64,

    /// Number of distinct keys
    #[arg(short, long, default_value_t = 1024)]
    keys: u64,

    /// Percentage of operations that are reads
    #[arg(short, long, default_value_t = 80)]
    read_ratio: u8,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Resize the cache to this capacity after the run
    #[arg(long)]
    shrink_to: Option<usize>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!("Starting hotlru-bench v{}", env!("CARGO_PKG_VERSION"));
    info!("Cache capacity: {}", args.capacity);

    let cache: Lru<u64, u64> = Lru::with_capacity(args.capacity)
        .with_context(|| format!("cannot create cache of capacity {}", args.capacity))?;

    let workload = Workload {
        threads: args.threads,
        ops_per_thread: args.ops,
        key_space: args.keys,
        read_ratio: args.read_ratio,
        seed: args.seed,
    };
    let report = workload.run(&cache)?;

    info!(
        ops = report.ops(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        ops_per_sec = report.ops_per_sec().round() as u64,
        "Workload complete"
    );
    info!(
        hits = report.hits,
        reads = report.reads,
        hit_ratio = report.hit_ratio(),
        inserts = cache.stats().inserts(),
        evictions = cache.stats().evictions(),
        len = cache.len(),
        "Cache summary"
    );

    if let Some(target) = args.shrink_to {
        let evicted = workload::shrink(&cache, target)?;
        info!(
            capacity = target,
            evicted,
            len = cache.len(),
            "Cache resized"
        );
    }

    Ok(())
}
