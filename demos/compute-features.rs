use clap::Parser;
use std::path::PathBuf;

use hbow::source::{image_paths, ImageCrateSource};
use hbow::table::FeatureTable;
use hbow::*;

/// Describe every image in a directory and write the feature table.
#[derive(Parser, Debug)]
struct Args {
    /// Directory of dataset images
    images: PathBuf,
    /// Output CSV feature table
    output: PathBuf,
    /// JSON engine config. Defaults to a 7x7 pixel block
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Also save a bincode snapshot of the dataset
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() -> HbowResult<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let engine = config.engine()?;

    let paths = image_paths(&args.images)?;
    let store = engine.index(&ImageCrateSource, &paths)?;
    println!(
        "Described {} of {} images with {}.",
        store.len(),
        paths.len(),
        engine.extractor().name()
    );

    FeatureTable::write(&args.output, &store)?;
    if let Some(snapshot) = &args.snapshot {
        store.save(snapshot)?;
    }
    Ok(())
}
