use log::{debug, info, warn};
use std::path::Path;

use crate::normalize::normalize_in_place;
use crate::table::FeatureTable;
use crate::*;

/// An extractor paired with a compatible metric, optionally extended with an embedding
/// table. Every descriptor it produces, stores or compares has the same layout.
#[derive(Debug, Clone)]
pub struct Engine {
    extractor: ExtractorKind,
    metric: MetricKind,
    embeddings: Option<DatasetStore>,
}

impl Engine {
    /// Pair `extractor` with `metric`. The metric is checked against the descriptor layout
    /// here, so a misconfigured weight set fails once instead of on every comparison.
    pub fn new(
        extractor: ExtractorKind,
        metric: MetricKind,
        embeddings: Option<DatasetStore>,
    ) -> HbowResult<Self> {
        extractor.validate()?;
        let engine = Self {
            extractor,
            metric,
            embeddings,
        };
        engine.check_metric()?;
        Ok(engine)
    }

    /// Engine using the extractor's default metric.
    pub fn with_default_metric(extractor: ExtractorKind) -> HbowResult<Self> {
        Self::with_embeddings(extractor, None)
    }

    /// Engine over `extractor` extended with `embeddings`, using the default metric of the
    /// combined layout. Without embeddings that is the extractor's own default. With them,
    /// histogram fields get an intersection-distance component and every other field a
    /// cosine component, all weighted equally.
    pub fn with_embeddings(
        extractor: ExtractorKind,
        embeddings: Option<DatasetStore>,
    ) -> HbowResult<Self> {
        let extra = embedding_layout(embeddings.as_ref());
        let metric = if extra.is_empty() {
            extractor.default_metric()?
        } else {
            extractor.validate()?;
            let fields: Vec<FieldMetric> = extractor
                .layout()
                .iter()
                .chain(&extra)
                .map(|spec| {
                    if spec.tag.is_normalizable() {
                        FieldMetric::IntersectionDistance
                    } else {
                        FieldMetric::Cosine
                    }
                })
                .collect();
            let weight = 1. / fields.len() as f64;
            MetricKind::Weighted(WeightedCombination::new(
                fields.into_iter().map(|m| (m, weight)).collect(),
            )?)
        };
        Self::new(extractor, metric, embeddings)
    }

    pub fn extractor(&self) -> &ExtractorKind {
        &self.extractor
    }

    pub fn metric(&self) -> &MetricKind {
        &self.metric
    }

    /// Layout of the descriptors this engine produces and compares.
    pub fn layout(&self) -> Vec<FieldSpec> {
        let mut layout = self.extractor.layout();
        layout.extend(embedding_layout(self.embeddings.as_ref()));
        layout
    }

    fn check_metric(&self) -> HbowResult<()> {
        let layout = self.layout();
        match &self.metric {
            MetricKind::Weighted(combination) => {
                if combination.components().len() != layout.len() {
                    return Err(HbowErr::InvalidWeights(format!(
                        "{} components for {} fields",
                        combination.components().len(),
                        layout.len()
                    )));
                }
                for ((metric, _), spec) in combination.components().iter().zip(&layout) {
                    if *metric == FieldMetric::IntersectionDistance && !spec.tag.is_normalizable() {
                        return Err(HbowErr::IncompatibleMetric {
                            metric: metric.name(),
                            tag: spec.tag,
                        });
                    }
                }
            }
            MetricKind::Intersection | MetricKind::IntersectionDistance => {
                if let Some(spec) = layout.iter().find(|s| !s.tag.is_normalizable()) {
                    return Err(HbowErr::IncompatibleMetric {
                        metric: self.metric.name(),
                        tag: spec.tag,
                    });
                }
            }
            MetricKind::Ssd | MetricKind::Cosine => {}
        }
        Ok(())
    }

    /// Extract and, for histogram families, normalize.
    pub fn describe(&self, image: &Image) -> HbowResult<Descriptor> {
        let mut descriptor = self.extractor.extract(image)?;
        if self.extractor.normalizes() {
            normalize_in_place(&mut descriptor)?;
        }
        Ok(descriptor)
    }

    /// `describe`, followed by the embedding of `identifier` when an embedding table is set.
    pub fn describe_named(&self, identifier: &str, image: &Image) -> HbowResult<Descriptor> {
        let descriptor = self.describe(image)?;
        match &self.embeddings {
            Some(embeddings) => Ok(descriptor.concat(embeddings.require(identifier)?.clone())),
            None => Ok(descriptor),
        }
    }

    /// Describe every image in `paths`. Images that cannot be loaded or described are
    /// logged and skipped; duplicate file names abort.
    pub fn index<S, P>(&self, source: &S, paths: &[P]) -> HbowResult<DatasetStore>
    where
        S: ImageSource + ?Sized,
        P: AsRef<Path>,
    {
        let mut store = DatasetStore::new();
        for path in paths {
            let path = path.as_ref();
            let identifier = canonical_identifier(path);
            let described = source
                .load(path)
                .and_then(|image| self.describe_named(&identifier, &image));
            match described {
                Ok(descriptor) => store.insert(DatasetEntry::new(identifier, descriptor))?,
                Err(e) => warn!(target: "hbow::engine", "skipping {}: {}", path.display(), e),
            }
        }
        info!(target: "hbow::engine", "indexed {} of {} images with {}", store.len(), paths.len(), self.extractor.name());
        Ok(store)
    }

    /// Read a feature table written for this engine's extractor. Histogram rows are
    /// re-normalized and embeddings attached when configured.
    pub fn load_table<P: AsRef<Path>>(&self, path: P) -> HbowResult<DatasetStore> {
        let mut store = FeatureTable::read(path, &self.extractor.layout())?;
        if self.extractor.normalizes() {
            let dropped = store.normalize_all();
            debug!(target: "hbow::engine", "dropped {} degenerate rows", dropped);
        }
        Ok(match &self.embeddings {
            Some(embeddings) => store.attach(embeddings),
            None => store,
        })
    }

    /// Rank `store` against an already described query.
    pub fn query(&self, query: &Descriptor, store: &DatasetStore) -> HbowResult<Ranking> {
        query.check_layout(&self.layout())?;
        rank_all(query, store.entries(), &self.metric)
    }

    /// Load, describe and rank a query image.
    pub fn query_image<S: ImageSource + ?Sized>(
        &self,
        source: &S,
        path: &Path,
        store: &DatasetStore,
    ) -> HbowResult<Ranking> {
        let image = source.load(path)?;
        let query = self.describe_named(&canonical_identifier(path), &image)?;
        self.query(&query, store)
    }

    /// Rank `store` against the stored descriptor of `identifier`.
    pub fn query_identifier(&self, identifier: &str, store: &DatasetStore) -> HbowResult<Ranking> {
        let query = store.require(identifier)?;
        self.query(query, store)
    }
}

/// Fields appended by an embedding table, taken from its first entry.
fn embedding_layout(embeddings: Option<&DatasetStore>) -> Vec<FieldSpec> {
    embeddings
        .and_then(|e| e.iter().next())
        .map(|first| first.descriptor.layout())
        .unwrap_or_default()
}
