use clap::Parser;
use std::path::PathBuf;

use hbow::source::{image_paths, ImageCrateSource};
use hbow::*;

/// Rank a dataset against one or more query images.
#[derive(Parser, Debug)]
struct Args {
    /// Query images
    #[arg(required = true)]
    queries: Vec<PathBuf>,
    /// Feature table written by `compute-features` with the same config
    #[arg(short, long, conflicts_with = "images")]
    table: Option<PathBuf>,
    /// Directory of dataset images, described on the fly
    #[arg(short, long)]
    images: Option<PathBuf>,
    /// JSON engine config. Defaults to a 7x7 pixel block
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> HbowResult<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let engine = config.engine()?;

    let store = match (&args.table, &args.images) {
        (Some(table), _) => engine.load_table(table)?,
        (None, Some(dir)) => engine.index(&ImageCrateSource, &image_paths(dir)?)?,
        (None, None) => {
            return Err(HbowErr::InvalidParameter(
                "either --table or --images is required".into(),
            ))
        }
    };

    for query in &args.queries {
        let ranking = match engine.query_image(&ImageCrateSource, query, &store) {
            Ok(ranking) => ranking,
            Err(e) => {
                eprintln!("{}: {}", query.display(), e);
                continue;
            }
        };

        println!("\nTop {} matches for {}:", config.top_k, query.display());
        println!("Match      |      Score");
        for m in ranking.top(config.top_k) {
            println!("{} | {:.6}", m.identifier, m.score);
        }
        if config.bottom_k > 0 {
            println!("\nBottom {} matches:", config.bottom_k);
            for m in ranking.bottom(config.bottom_k) {
                println!("{} | {:.6}", m.identifier, m.score);
            }
        }
        if !ranking.skipped().is_empty() {
            println!("({} entries skipped)", ranking.skipped().len());
        }
    }
    Ok(())
}
