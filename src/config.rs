use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::extract::DEFAULT_HALF;
use crate::table::FeatureTable;
use crate::*;

fn default_top_k() -> usize {
    3
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Configuration for a retrieval run.
pub struct EngineConfig {
    /// Descriptor family and its parameters
    pub extractor: ExtractorKind,
    /// Metric override. Unset means the default metric of the extractor's fields plus
    /// any embedding field
    #[serde(default)]
    pub metric: Option<MetricSpec>,
    /// Number of best matches to report
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Number of worst matches to report
    #[serde(default)]
    pub bottom_k: usize,
    /// Embedding table appended to every descriptor
    #[serde(default)]
    pub embeddings: Option<PathBuf>,
    /// Values per embedding row. Inferred from the first row when unset
    #[serde(default)]
    pub embedding_dim: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorKind::PixelBlock { half: DEFAULT_HALF },
            metric: None,
            top_k: default_top_k(),
            bottom_k: 0,
            embeddings: None,
            embedding_dim: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// One weighted component of a `weighted` metric.
pub struct WeightSpec {
    pub metric: FieldMetric,
    pub weight: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
/// Serializable metric description. `build` validates it into a `MetricKind`.
pub enum MetricSpec {
    Ssd,
    Intersection,
    IntersectionDistance,
    Cosine,
    Weighted { components: Vec<WeightSpec> },
}

impl MetricSpec {
    pub fn build(&self) -> HbowResult<MetricKind> {
        Ok(match self {
            MetricSpec::Ssd => MetricKind::Ssd,
            MetricSpec::Intersection => MetricKind::Intersection,
            MetricSpec::IntersectionDistance => MetricKind::IntersectionDistance,
            MetricSpec::Cosine => MetricKind::Cosine,
            MetricSpec::Weighted { components } => MetricKind::Weighted(WeightedCombination::new(
                components.iter().map(|c| (c.metric, c.weight)).collect(),
            )?),
        })
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> HbowResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> HbowResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// The configured metric, or the extractor's own default. `engine` widens the default
    /// over embedding fields when an embedding table is set.
    pub fn metric(&self) -> HbowResult<MetricKind> {
        match &self.metric {
            Some(spec) => spec.build(),
            None => self.extractor.default_metric(),
        }
    }

    /// Build the engine, reading the embedding table if one is configured.
    pub fn engine(&self) -> HbowResult<Engine> {
        let embeddings = match &self.embeddings {
            Some(path) => Some(FeatureTable::read_embeddings(path, self.embedding_dim)?),
            None => None,
        };
        match &self.metric {
            Some(spec) => Engine::new(self.extractor.clone(), spec.build()?, embeddings),
            None => Engine::with_embeddings(self.extractor.clone(), embeddings),
        }
    }
}
