//! Mixed read/write workload driven against a shared cache

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use hotlru::Lru;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info};

/// Shape of a load run
#[derive(Debug, Clone)]
pub struct Workload {
    pub threads: usize,
    pub ops_per_thread: u64,
    pub key_space: u64,
    /// Percentage of operations that are reads (0-100)
    pub read_ratio: u8,
    pub seed: u64,
}

/// Counters from one worker thread
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct WorkerReport {
    reads: u64,
    writes: u64,
    hits: u64,
}

/// Aggregated result of a run
#[derive(Debug, Default, Clone)]
pub struct Report {
    pub reads: u64,
    pub writes: u64,
    pub hits: u64,
    pub elapsed: Duration,
}

impl Report {
    pub fn ops(&self) -> u64 {
        self.reads + self.writes
    }

    pub fn ops_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.ops() as f64 / secs
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        if self.reads == 0 {
            0.0
        } else {
            self.hits as f64 / self.reads as f64
        }
    }

    fn add(&mut self, worker: WorkerReport) {
        self.reads += worker.reads;
        self.writes += worker.writes;
        self.hits += worker.hits;
    }
}

impl Workload {
    /// Run every worker to completion against `cache`
    pub fn run(&self, cache: &Lru<u64, u64>) -> Result<Report> {
        if self.threads == 0 {
            bail!("at least one worker thread is required");
        }
        if self.key_space == 0 {
            bail!("key space must not be empty");
        }
        if self.read_ratio > 100 {
            bail!("read ratio must be between 0 and 100, got {}", self.read_ratio);
        }

        info!(
            threads = self.threads,
            ops_per_thread = self.ops_per_thread,
            key_space = self.key_space,
            read_ratio = self.read_ratio,
            "Running workload"
        );

        let start = Instant::now();
        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..self.threads)
                .map(|id| s.spawn(move || self.worker(cache, id)))
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let mut report = Report {
            elapsed: start.elapsed(),
            ..Report::default()
        };
        for (id, result) in results.into_iter().enumerate() {
            let worker = result.map_err(|_| anyhow!("worker {} panicked", id))?;
            debug!(
                worker = id,
                reads = worker.reads,
                writes = worker.writes,
                hits = worker.hits,
                "Worker finished"
            );
            report.add(worker);
        }

        Ok(report)
    }

    fn worker(&self, cache: &Lru<u64, u64>, id: usize) -> WorkerReport {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(id as u64));
        let mut report = WorkerReport::default();

        for _ in 0..self.ops_per_thread {
            let key = rng.gen_range(0..self.key_space);

            if rng.gen_range(0..100u8) < self.read_ratio {
                report.reads += 1;
                if cache.get(&key).is_some() {
                    report.hits += 1;
                } else {
                    // Cache-aside: load the missing key
                    cache.set(key, key);
                }
            } else {
                report.writes += 1;
                cache.set(key, rng.gen());
            }
        }

        report
    }
}

/// Resize `cache` to `capacity`, returning how many entries were evicted
pub fn shrink(cache: &Lru<u64, u64>, capacity: usize) -> Result<usize> {
    let evicted = cache
        .resize(capacity)
        .with_context(|| format!("cannot shrink cache to {}", capacity))?;
    Ok(evicted.len())
}
