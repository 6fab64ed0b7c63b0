use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use shotsearch::{collect_images, Config, ScreenshotProcessor, SearchEngine, SearchHit};

mod cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let config = Config::load(args.config.as_deref()).context("failed to load config")?;

    match args.command {
        cli::Command::Index { dir } => {
            let engine = index_directory(&config, &dir)?;
            println!("{}", serde_json::to_string_pretty(&engine.get_stats())?);
        }

        cli::Command::Search {
            dir,
            query,
            top_k,
            json,
        } => {
            let engine = index_directory(&config, &dir)?;
            let hits = engine.search(&query, top_k.unwrap_or(config.search.top_k));

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                print_hits(&query, &hits);
            }
        }
    }

    Ok(())
}

fn index_directory(config: &Config, dir: &Path) -> anyhow::Result<SearchEngine> {
    let paths = collect_images(dir)
        .with_context(|| format!("failed to list images in {}", dir.display()))?;
    if paths.is_empty() {
        bail!("no screenshots found in {}", dir.display());
    }

    let processor = ScreenshotProcessor::from_config(config)?;

    let bar = ProgressBar::new(paths.len() as u64);
    bar.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);

    let mut documents = Vec::with_capacity(paths.len());
    for path in &paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        bar.set_message(name);
        documents.push(processor.process_image(path));
        bar.inc(1);
    }
    bar.finish_and_clear();

    let engine = SearchEngine::new(config.search.clone());
    engine.ensure_ready().context("failed to initialize search engine")?;

    let indexed = engine.index_batch(&documents);
    log::info!("indexed {indexed} of {} screenshots", documents.len());

    Ok(engine)
}

fn print_hits(query: &str, hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No screenshots match \"{query}\"");
        return;
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} ({:.1}%)",
            rank + 1,
            hit.metadata.filename,
            hit.confidence * 100.0
        );
        println!("   {}", hit.metadata.path);
        if hit.metadata.has_ocr {
            println!("   text: {}", first_line(&hit.metadata.ocr_preview));
        }
        if hit.metadata.has_vision {
            println!("   looks like: {}", first_line(&hit.metadata.vision_preview));
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().find(|line| !line.trim().is_empty()).unwrap_or("")
}
