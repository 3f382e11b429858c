use anyhow::{Context, Result};
use bookrec::services::training::TrainingPipeline;
use bookrec::{init_tracing, Config};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train the book similarity model from a ratings CSV", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Ratings CSV to train on, overriding `data.ratings_path`.
    #[arg(long)]
    ratings: Option<PathBuf>,

    /// Directory receiving the artifacts, overriding `artifacts.dir`.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing();

    info!("Starting bookrec trainer");

    let mut config = Config::load_or_default(&args.config)?;
    if let Some(ratings) = args.ratings {
        config.data.ratings_path = ratings;
    }
    if let Some(output) = args.output {
        config.artifacts.dir = output;
    }
    info!("Training configuration loaded: {:?}", config.training);

    let pipeline = TrainingPipeline::new(Arc::new(config));
    let summary = pipeline
        .run()
        .context("training run failed")?;

    info!(
        "Trained on {} books x {} users ({} ratings read, {} rows skipped) in {}ms",
        summary.books, summary.users, summary.ratings_read, summary.rows_skipped, summary.elapsed_ms
    );

    Ok(())
}
