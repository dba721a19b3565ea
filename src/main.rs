use std::{path::PathBuf, time::Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};

use tram_map::{
    cache::DirectoryCache,
    fetch::{fetch_into, HttpSource},
    pipeline::{self, RenderOptions},
    settings::Settings,
};

#[derive(Parser)]
#[command(about = "Builds an interactive map of a tram network")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download raw line records into the data directory
    Fetch,
    /// Build the map from the cached line records
    Render {
        /// Where to write the map, instead of the configured path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = Settings::load().context("Failed to read settings")?;
    let cache = DirectoryCache::new(&settings.data_dir);

    match args.command {
        Command::Fetch => {
            let now = Instant::now();
            let source = HttpSource::download(&settings.source).with_context(|| {
                format!(
                    "Failed to download {} and {}",
                    settings.source.routes_url, settings.source.stops_url
                )
            })?;
            let summary = fetch_into(&source, &cache).context("Failed to cache line records")?;

            log::info!(
                "fetched {} line(s), {} already cached, {} failed in {:?}",
                summary.fetched.len(),
                summary.already_cached.len(),
                summary.failed.len(),
                now.elapsed()
            );
        }
        Command::Render { output } => {
            let now = Instant::now();
            let options = RenderOptions {
                title: settings.title.clone(),
                per_line_layers: settings.per_line_layers,
                styles: settings.styles.clone(),
            };
            let rendered = pipeline::render(&cache, &options).with_context(|| {
                format!("Failed to render records in {}", settings.data_dir.display())
            })?;

            let output = output.unwrap_or(settings.output);
            rendered
                .document
                .write(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            log::info!("map saved to {} in {:?}", output.display(), now.elapsed());
        }
    }

    Ok(())
}
