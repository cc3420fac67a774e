use std::fs;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rewind_kernel::store::MemoryStore;
use rewind_kernel::{EnableUndo, UndoConfig};

mod script;

use script::{Runner, Step};

/// Rewind undo-log CLI
#[derive(Parser, Debug)]
#[command(name = "rewind")]
#[command(about = "Run undo scenarios against an in-memory document store", long_about = None)]
struct Cli {
    /// Path to undo config JSON
    #[arg(long)]
    config: Option<String>,

    /// Path to scenario script JSON
    #[arg(long)]
    script: String,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // ----------------------------
    // Load config
    // ----------------------------
    let config = if let Some(path) = cli.config {
        let data = fs::read_to_string(path)?;
        serde_json::from_str::<UndoConfig>(&data)?
    } else {
        UndoConfig::default()
    };

    // ----------------------------
    // Load script
    // ----------------------------
    let script_data = fs::read_to_string(&cli.script)?;
    let steps: Vec<Step> = serde_json::from_str(&script_data)?;
    info!("running {} step(s) from {}", steps.len(), cli.script);

    // ----------------------------
    // Run
    // ----------------------------
    let db = MemoryStore::new().enable_undo(config)?;
    let outputs = Runner::new(db).run(steps).await;

    println!("{}", serde_json::to_string_pretty(&outputs)?);

    Ok(())
}
