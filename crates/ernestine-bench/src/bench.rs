use anyhow::{bail, Context, Result};
use ernestine_core::store::Store;
use rand::RngCore;
use std::time::{Duration, Instant};

/// Width of generated keys. Zero padding keeps them in index order.
pub const KEY_WIDTH: usize = 20;

pub fn item_key(idx: u64) -> String {
    format!("{:0width$}", idx, width = KEY_WIDTH)
}

pub enum Operation {
    Create { size: usize },
    Get,
    List { prefix: String, expected: usize },
    Delete,
    Cleanup,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Get => "get",
            Operation::List { .. } => "list",
            Operation::Delete => "delete",
            Operation::Cleanup => "cleanup",
        }
    }
}

/// Timings of one benchmark run, in execution order.
#[derive(Debug)]
pub struct Report {
    pub durations: Vec<Duration>,
    pub total: Duration,
}

impl Report {
    pub fn count(&self) -> usize {
        self.durations.len()
    }

    pub fn ops_per_second(&self) -> f64 {
        let secs = self.total.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.count() as f64 / secs
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.durations.is_empty() {
            return None;
        }
        Some(self.total.div_f64(self.count() as f64))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Summary {
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    pub max: Duration,
}

impl Summary {
    pub fn from_durations(durations: &[Duration]) -> Option<Self> {
        let mut sorted = durations.to_vec();
        sorted.sort_unstable();
        let max = *sorted.last()?;
        let percentile = |q: f64| {
            let idx = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
            sorted[idx]
        };
        Some(Summary {
            p50: percentile(0.5),
            p90: percentile(0.9),
            p99: percentile(0.99),
            max,
        })
    }
}

/// Runs one operation `count` times against a store and records each latency.
/// The first failing operation ends the run.
pub struct Bencher {
    store: Box<dyn Store>,
    count: u64,
}

impl Bencher {
    pub fn new(store: Box<dyn Store>, count: u64) -> Self {
        Self { store, count }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub async fn run(&self, operation: &Operation) -> Result<Report> {
        let mut durations = Vec::with_capacity(usize::try_from(self.count).unwrap_or_default());
        let start = Instant::now();
        for idx in 0..self.count {
            let op_start = Instant::now();
            self.run_once(operation, idx)
                .await
                .with_context(|| format!("{} #{} failed", operation.name(), idx))?;
            durations.push(op_start.elapsed());
        }
        Ok(Report {
            durations,
            total: start.elapsed(),
        })
    }

    async fn run_once(&self, operation: &Operation, idx: u64) -> Result<()> {
        match operation {
            Operation::Create { size } => {
                let mut value = vec![0u8; *size];
                rand::thread_rng().fill_bytes(&mut value);
                self.store.create(&item_key(idx), value).await?;
            }
            Operation::Get => {
                self.store.get(&item_key(idx)).await?;
            }
            Operation::List { prefix, expected } => {
                let result = self.store.list(prefix).await?;
                if result.found() != *expected {
                    bail!(
                        "unexpected result: got {} expecting {}",
                        result.found(),
                        expected
                    );
                }
            }
            Operation::Delete => self.store.delete(&item_key(idx)).await?,
            Operation::Cleanup => self.store.cleanup().await?,
        }
        Ok(())
    }
}
