use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use larder::gc::DanglingImageCollector;
use larder::{Config, MetadataBackend};

#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Grace period in hours; content-digest versions younger than this
    /// are never deleted, whatever their reference status.
    #[arg(long, default_value_t = 24)]
    older_than_hours: u64,

    /// Apply pending schema migrations before collecting.
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    // load configuration
    let mut dev_config = File::open(cli.config_file.unwrap_or("./dev-config.yml".into()))?;
    let mut s = String::new();
    dev_config.read_to_string(&mut s)?;
    let config: Config = serde_yaml::from_str(&s)?;

    // initialize persistence layer
    let metadata = match config.metadata {
        MetadataBackend::Postgres(cfg) => cfg.new_metadata().await?,
    };

    if cli.migrate {
        metadata.migrate().await?;
    }

    // one pass per invocation; the scheduler that runs this binary owns
    // recurrence and timeout policy
    let collector = DanglingImageCollector::new(metadata, config.gc.batch_size);
    collector
        .cleanup(chrono::Duration::hours(cli.older_than_hours as i64))
        .await?;

    Ok(())
}
