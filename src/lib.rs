use thiserror::Error;

/// RGB image grid consumed by the extractors.
pub mod img;
pub use img::{Image, Rect, Rgb};

/// Shaped, tagged numeric fields and the descriptors built from them.
pub mod descriptor;
pub use descriptor::{Descriptor, Field, FieldSpec, FieldTag, Shape};

/// Feature extractors: pixel block, color histograms, chromaticity, color+texture.
pub mod extract;
pub use extract::{ExtractorKind, Tiling};

/// Gradient-magnitude texture map used by the color+texture extractor.
pub mod texture;

/// Rescaling of count histograms into distributions.
pub mod normalize;
pub use normalize::normalize;

/// Distance and similarity metrics between descriptors.
pub mod metric;
pub use metric::{DistanceMetric, FieldMetric, MetricKind, Polarity, WeightedCombination};

/// Exhaustive top-K / bottom-K ranking.
pub mod rank;
pub use rank::{rank, rank_all, Match, Ranking, Skipped};

/// In-memory dataset of identified descriptors.
pub mod store;
pub use store::{DatasetEntry, DatasetStore};

/// CSV feature tables: reading, writing and embedding tables.
pub mod table;

/// Image sources: trait plus `image` crate backed implementation.
pub mod source;
pub use source::{canonical_identifier, ImageSource};

/// Utilities for loading images using opencv.
pub mod opencv_utils;
#[cfg(feature = "opencv")]
pub use opencv_utils::*;

/// JSON engine configuration.
pub mod config;
pub use config::{EngineConfig, MetricSpec};

/// Extractor + metric pairing that drives indexing and queries.
pub mod engine;
pub use engine::Engine;

/// Tolerance used for "sums to one" checks and ranking ties.
pub const EPSILON: f64 = 1e-9;

pub type HbowResult<T> = std::result::Result<T, HbowErr>;

#[derive(Error, Debug)]
pub enum HbowErr {
    #[error("Io Error")]
    Io(#[from] std::io::Error),
    #[error("Feature table error")]
    Csv(#[from] csv::Error),
    #[error("Config parse error")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "bincode")]
    #[error("Dataset Serialization Error")]
    Bincode(#[from] bincode::Error),
    #[cfg(feature = "opencv")]
    #[error("Opencv Error")]
    OpenCvInternal(#[from] opencv::Error),
    #[error("Could not load image {path}: {reason}")]
    ImageLoad { path: String, reason: String },
    #[error("Image is {width}x{height}, extractor needs at least {min_width}x{min_height}")]
    InsufficientImageSize {
        width: usize,
        height: usize,
        min_width: usize,
        min_height: usize,
    },
    #[error("Region {0:?} does not fit inside the image")]
    InvalidRegion(Rect),
    #[error("Field `{0}` sums to zero")]
    DegenerateField(String),
    #[error("Vector has zero norm")]
    DegenerateVector,
    #[error("Shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },
    #[error("Metric {metric} does not accept `{tag}` fields")]
    IncompatibleMetric { metric: &'static str, tag: FieldTag },
    #[error("Field `{0}` is not normalized")]
    Unnormalized(String),
    #[error("Invalid metric weights: {0}")]
    InvalidWeights(String),
    #[error("Invalid extractor parameter: {0}")]
    InvalidParameter(String),
    #[error("No dataset entry is comparable to the query")]
    EmptyComparableSet,
    #[error("Malformed feature row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },
    #[error("Duplicate identifier `{0}`")]
    DuplicateIdentifier(String),
    #[error("Unknown identifier `{0}`")]
    UnknownIdentifier(String),
}
