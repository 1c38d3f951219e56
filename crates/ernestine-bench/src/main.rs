use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ernestine_bench::{
    bench::{Bencher, Operation},
    cli::print_report,
    config::StoreArgs,
};
use tracing::metadata::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Benchmark the storage drivers of ernestine.
#[derive(Parser)]
#[clap(version)]
struct Opts {
    #[clap(flatten)]
    store: StoreArgs,

    /// The number of times the operation is to be repeated.
    #[clap(long, short = 'n', default_value = "1", env = "ERNESTINE_COUNT")]
    count: u64,

    #[clap(subcommand)]
    subcmd: BenchSubcommand,
}

#[derive(Subcommand)]
enum BenchSubcommand {
    /// Create new items.
    #[clap(alias = "c")]
    Create {
        /// The size of the blobs to generate, in bytes.
        #[clap(long, short, default_value = "1024")]
        size: usize,
    },

    /// Retrieve existing items.
    #[clap(alias = "g")]
    Get,

    /// List items.
    #[clap(alias = "l")]
    List {
        /// The prefix of the blobs to find.
        #[clap(long, short, default_value = "")]
        prefix: String,

        /// The expected count of items to find.
        #[clap(long, short = 'x', default_value = "0")]
        expected: usize,
    },

    /// Delete existing items.
    #[clap(alias = "d")]
    Delete,

    /// Remove every item and the underlying container.
    Cleanup,
}

impl From<BenchSubcommand> for Operation {
    fn from(subcmd: BenchSubcommand) -> Self {
        match subcmd {
            BenchSubcommand::Create { size } => Operation::Create { size },
            BenchSubcommand::Get => Operation::Get,
            BenchSubcommand::List { prefix, expected } => Operation::List { prefix, expected },
            BenchSubcommand::Delete => Operation::Delete,
            BenchSubcommand::Cleanup => Operation::Cleanup,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    let config = opts.store.store_config()?;
    let driver = config.driver();
    let store = config
        .open()
        .await
        .with_context(|| format!("Failed to open {} store", driver))?;

    let operation = Operation::from(opts.subcmd);
    tracing::info!(
        driver,
        operation = operation.name(),
        count = opts.count,
        "Starting benchmark"
    );

    let bencher = Bencher::new(store, opts.count);
    let report = bencher.run(&operation).await?;
    print_report(operation.name(), &report);

    Ok(())
}
