use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::normalize::SUM_TOLERANCE;
use crate::*;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
/// Whether a smaller (distance) or larger (similarity) score means "more alike".
pub enum Polarity {
    Distance,
    Similarity,
}

impl Polarity {
    /// Order two scores best-first.
    pub fn cmp_scores(self, a: f64, b: f64) -> Ordering {
        match self {
            Polarity::Distance => a.total_cmp(&b),
            Polarity::Similarity => b.total_cmp(&a),
        }
    }
}

/// Provides method(s) for scoring one descriptor against another.
pub trait DistanceMetric {
    fn name(&self) -> &'static str;

    fn polarity(&self) -> Polarity;

    /// Check that `descriptor` can be scored by this metric at all (tags, normalization,
    /// non-zero norms). Run once for the query and once per dataset entry.
    fn validate(&self, descriptor: &Descriptor) -> HbowResult<()>;

    /// Score `a` against `b`. Fails with `ShapeMismatch` on incompatible layouts.
    fn score(&self, a: &Descriptor, b: &Descriptor) -> HbowResult<f64>;
}

/// Sum of squared differences.
pub fn ssd(a: &[f64], b: &[f64]) -> HbowResult<f64> {
    check_len(a, b)?;
    Ok(a.iter().zip(b).fold(0., |acc, (x, y)| acc + (x - y) * (x - y)))
}

/// Histogram intersection `sum(min(a_i, b_i))`. Meaningful for normalized histograms only.
pub fn intersection(a: &[f64], b: &[f64]) -> HbowResult<f64> {
    check_len(a, b)?;
    Ok(a.iter().zip(b).fold(0., |acc, (x, y)| acc + x.min(*y)))
}

/// `1 - cos(a, b)`. Fails with `DegenerateVector` if either vector has zero norm.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> HbowResult<f64> {
    check_len(a, b)?;
    cosine_from_iter(a.iter().copied().zip(b.iter().copied()))
}

fn cosine_from_iter<I: Iterator<Item = (f64, f64)>>(pairs: I) -> HbowResult<f64> {
    let (mut dot, mut norm_a, mut norm_b) = (0., 0., 0.);
    for (x, y) in pairs {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0. || norm_b == 0. {
        return Err(HbowErr::DegenerateVector);
    }
    let cos = dot / (norm_a.sqrt() * norm_b.sqrt());
    // Rounding can push identical vectors a hair past 1.
    Ok(1. - cos.min(1.).max(-1.))
}

fn check_len(a: &[f64], b: &[f64]) -> HbowResult<()> {
    if a.len() != b.len() {
        return Err(HbowErr::ShapeMismatch {
            expected: format!("{} values", a.len()),
            found: format!("{} values", b.len()),
        });
    }
    Ok(())
}

fn check_histogram(metric: &'static str, field: &Field) -> HbowResult<()> {
    if !field.tag().is_normalizable() {
        return Err(HbowErr::IncompatibleMetric {
            metric,
            tag: field.tag(),
        });
    }
    if (field.sum() - 1.).abs() > SUM_TOLERANCE {
        return Err(HbowErr::Unnormalized(field.name().to_string()));
    }
    Ok(())
}

fn check_nonzero(values: &[f64]) -> HbowResult<()> {
    if values.iter().all(|&v| v == 0.) {
        return Err(HbowErr::DegenerateVector);
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
/// Per-field distance in `[0, 1]` (cosine may reach 2 for signed embeddings) used by
/// `WeightedCombination`.
pub enum FieldMetric {
    IntersectionDistance,
    Cosine,
}

impl FieldMetric {
    pub fn name(self) -> &'static str {
        match self {
            FieldMetric::IntersectionDistance => "intersection-distance",
            FieldMetric::Cosine => "cosine",
        }
    }

    pub fn validate(self, field: &Field) -> HbowResult<()> {
        match self {
            FieldMetric::IntersectionDistance => check_histogram(self.name(), field),
            FieldMetric::Cosine => check_nonzero(field.values()),
        }
    }

    pub fn distance(self, a: &Field, b: &Field) -> HbowResult<f64> {
        match self {
            FieldMetric::IntersectionDistance => Ok(1. - intersection(a.values(), b.values())?),
            FieldMetric::Cosine => cosine_distance(a.values(), b.values()),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
/// Weighted sum of per-field distances. Field `i` is scored with `components[i]`,
/// matched by position.
pub struct WeightedCombination {
    components: Vec<(FieldMetric, f64)>,
}

impl WeightedCombination {
    /// Weights must be non-negative and sum to one. Checked here, once.
    pub fn new(components: Vec<(FieldMetric, f64)>) -> HbowResult<Self> {
        if components.is_empty() {
            return Err(HbowErr::InvalidWeights("no components".into()));
        }
        if let Some((_, w)) = components.iter().find(|(_, w)| !w.is_finite() || *w < 0.) {
            return Err(HbowErr::InvalidWeights(format!("weight {} is not a non-negative number", w)));
        }
        let total: f64 = components.iter().map(|(_, w)| w).sum();
        if (total - 1.).abs() > SUM_TOLERANCE {
            return Err(HbowErr::InvalidWeights(format!("weights sum to {}, expected 1", total)));
        }
        Ok(Self { components })
    }

    /// `n` components of `metric`, each weighted `1/n`.
    pub fn uniform(metric: FieldMetric, n: usize) -> HbowResult<Self> {
        if n == 0 {
            return Err(HbowErr::InvalidWeights("no components".into()));
        }
        Self::new(vec![(metric, 1. / n as f64); n])
    }

    pub fn components(&self) -> &[(FieldMetric, f64)] {
        &self.components
    }

    /// `sum(w_i * d_i)` over already computed sub-distances.
    pub fn combine(&self, distances: &[f64]) -> f64 {
        self.components
            .iter()
            .zip(distances)
            .map(|((_, w), d)| w * d)
            .sum()
    }

    fn check_arity(&self, descriptor: &Descriptor) -> HbowResult<()> {
        if descriptor.num_fields() != self.components.len() {
            return Err(HbowErr::ShapeMismatch {
                expected: format!("{} fields", self.components.len()),
                found: format!("{} fields", descriptor.num_fields()),
            });
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for WeightedCombination {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            components: Vec<(FieldMetric, f64)>,
        }
        let raw = Raw::deserialize(deserializer)?;
        WeightedCombination::new(raw.components).map_err(serde::de::Error::custom)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
/// The closed set of descriptor metrics.
pub enum MetricKind {
    /// Sum of squared differences over all values. Distance.
    Ssd,
    /// Histogram intersection, averaged over fields. Similarity in `[0, 1]`.
    Intersection,
    /// `1 - Intersection`. Distance in `[0, 1]`.
    IntersectionDistance,
    /// Cosine distance over all values. Distance.
    Cosine,
    /// Per-field metrics blended by weight. Distance.
    Weighted(WeightedCombination),
}

impl MetricKind {
    fn mean_intersection(a: &Descriptor, b: &Descriptor) -> HbowResult<f64> {
        let mut total = 0.;
        for (fa, fb) in a.fields().iter().zip(b.fields()) {
            total += intersection(fa.values(), fb.values())?;
        }
        Ok(total / a.num_fields() as f64)
    }
}

impl DistanceMetric for MetricKind {
    fn name(&self) -> &'static str {
        match self {
            MetricKind::Ssd => "ssd",
            MetricKind::Intersection => "intersection",
            MetricKind::IntersectionDistance => "intersection-distance",
            MetricKind::Cosine => "cosine",
            MetricKind::Weighted(_) => "weighted",
        }
    }

    fn polarity(&self) -> Polarity {
        match self {
            MetricKind::Intersection => Polarity::Similarity,
            _ => Polarity::Distance,
        }
    }

    fn validate(&self, descriptor: &Descriptor) -> HbowResult<()> {
        if descriptor.is_empty() {
            return Err(HbowErr::ShapeMismatch {
                expected: "at least one value".into(),
                found: "empty descriptor".into(),
            });
        }
        match self {
            MetricKind::Ssd => Ok(()),
            MetricKind::Intersection | MetricKind::IntersectionDistance => descriptor
                .fields()
                .iter()
                .try_for_each(|f| check_histogram(self.name(), f)),
            MetricKind::Cosine => {
                if descriptor.flat_values().all(|v| v == 0.) {
                    return Err(HbowErr::DegenerateVector);
                }
                Ok(())
            }
            MetricKind::Weighted(combination) => {
                combination.check_arity(descriptor)?;
                combination
                    .components
                    .iter()
                    .zip(descriptor.fields())
                    .try_for_each(|((metric, _), field)| metric.validate(field))
            }
        }
    }

    fn score(&self, a: &Descriptor, b: &Descriptor) -> HbowResult<f64> {
        a.check_compatible(b)?;
        match self {
            MetricKind::Ssd => {
                let mut total = 0.;
                for (fa, fb) in a.fields().iter().zip(b.fields()) {
                    total += ssd(fa.values(), fb.values())?;
                }
                Ok(total)
            }
            MetricKind::Intersection => Self::mean_intersection(a, b),
            MetricKind::IntersectionDistance => Ok(1. - Self::mean_intersection(a, b)?),
            MetricKind::Cosine => cosine_from_iter(a.flat_values().zip(b.flat_values())),
            MetricKind::Weighted(combination) => {
                combination.check_arity(a)?;
                let distances = combination
                    .components
                    .iter()
                    .zip(a.fields().iter().zip(b.fields()))
                    .map(|((metric, _), (fa, fb))| metric.distance(fa, fb))
                    .collect::<HbowResult<Vec<f64>>>()?;
                Ok(combination.combine(&distances))
            }
        }
    }
}
