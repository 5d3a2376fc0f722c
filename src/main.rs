use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use subledger::{pipeline, IncrementalMerger, PipelineConfig, SchemaNormalizer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "subledger", about = "Ingest subscription-list extracts and normalize the history")]
struct Cli {
    /// TOML config file; defaults apply to any key it leaves out
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data root holding `raw/` and `processed/` (ignored with --config)
    #[arg(long, global = true, default_value = "data")]
    data_root: PathBuf,

    /// Raw extract extension, e.g. `xlsx` or `csv`
    #[arg(long, global = true)]
    extension: Option<String>,

    /// Also export the clean table as Parquet to this path
    #[arg(long, global = true)]
    parquet: Option<PathBuf>,

    /// Print the final report as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Append new raw extracts to the processed history
    Ingest,
    /// Rebuild the clean canonical table from the processed history
    Normalize,
    /// Ingest, then normalize
    Run,
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) resolve config ───────────────────────────────────────────
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::with_root(&cli.data_root),
    };
    if let Some(ext) = &cli.extension {
        config.raw_extension = ext.trim_start_matches('.').to_string();
    }
    if cli.parquet.is_some() {
        config.parquet_path = cli.parquet.clone();
    }
    config.validate().context("invalid configuration")?;
    info!(
        raw = %config.raw_dir.display(),
        history = %config.history_path.display(),
        clean = %config.clean_path.display(),
        "startup"
    );

    // ─── 3) run ──────────────────────────────────────────────────────
    let json = match cli.command.unwrap_or(Command::Run) {
        Command::Ingest => {
            let report = IncrementalMerger::new(&config)?
                .run()
                .context("ingest failed")?;
            serde_json::to_string_pretty(&report)?
        }
        Command::Normalize => {
            let summary = SchemaNormalizer::new(&config)
                .run()
                .context("normalize failed")?;
            serde_json::to_string_pretty(&summary)?
        }
        Command::Run => {
            let summary = pipeline::run(&config).context("pipeline run failed")?;
            serde_json::to_string_pretty(&summary)?
        }
    };

    if cli.json {
        println!("{}", json);
    }
    info!("all done");
    Ok(())
}
