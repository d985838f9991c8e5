use log::{debug, warn};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::*;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// One ranked dataset entry.
pub struct Match {
    pub identifier: String,
    pub score: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// A dataset entry left out of a ranking, and why.
pub struct Skipped {
    pub identifier: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
/// Every comparable dataset entry, best match first. Built once per query and never
/// mutated; `top` and `bottom` read the two ends of the same ordering.
pub struct Ranking {
    polarity: Polarity,
    matches: Vec<Match>,
    skipped: Vec<Skipped>,
}

impl Ranking {
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// All matches, most similar first.
    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    /// Entries excluded from the scan (incompatible shape, degenerate values).
    pub fn skipped(&self) -> &[Skipped] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// The `min(k, len)` most similar entries, best first.
    pub fn top(&self, k: usize) -> &[Match] {
        &self.matches[..k.min(self.matches.len())]
    }

    /// The `min(k, len)` least similar entries, least similar first.
    pub fn bottom(&self, k: usize) -> impl Iterator<Item = &Match> + '_ {
        let start = self.matches.len() - k.min(self.matches.len());
        self.matches[start..].iter().rev()
    }
}

/// Scores are compared on a grid of `EPSILON` so near-equal scores tie and fall back to
/// the identifier order.
#[inline]
fn tie_key(score: f64) -> f64 {
    (score / EPSILON).round()
}

/// Score `query` against every entry of `dataset` and order the results.
///
/// The query itself must be acceptable to `metric`, otherwise the call fails. Entries that
/// cannot be compared to the query are skipped and recorded; if none is left the call
/// fails with `EmptyComparableSet`.
pub fn rank_all<M>(query: &Descriptor, dataset: &[DatasetEntry], metric: &M) -> HbowResult<Ranking>
where
    M: DistanceMetric + Sync + ?Sized,
{
    metric.validate(query)?;
    debug!(target: "hbow::rank", "scanning {} entries with {}", dataset.len(), metric.name());

    let score_entry = |entry: &DatasetEntry| -> Result<Match, Skipped> {
        let scored = query
            .check_compatible(&entry.descriptor)
            .and_then(|_| metric.validate(&entry.descriptor))
            .and_then(|_| metric.score(query, &entry.descriptor));
        match scored {
            Ok(score) if score.is_finite() => Ok(Match {
                identifier: entry.identifier.clone(),
                score,
            }),
            Ok(score) => Err(Skipped {
                identifier: entry.identifier.clone(),
                reason: format!("non-finite score {}", score),
            }),
            Err(e) => Err(Skipped {
                identifier: entry.identifier.clone(),
                reason: e.to_string(),
            }),
        }
    };

    // Indexed collect keeps dataset order regardless of which worker finishes first.
    #[cfg(feature = "rayon")]
    let scored: Vec<Result<Match, Skipped>> = dataset.par_iter().map(score_entry).collect();
    #[cfg(not(feature = "rayon"))]
    let scored: Vec<Result<Match, Skipped>> = dataset.iter().map(score_entry).collect();

    let mut matches = Vec::with_capacity(scored.len());
    let mut skipped = Vec::new();
    for result in scored {
        match result {
            Ok(m) => matches.push(m),
            Err(s) => {
                warn!(target: "hbow::rank", "skipping `{}`: {}", s.identifier, s.reason);
                skipped.push(s);
            }
        }
    }
    if matches.is_empty() {
        return Err(HbowErr::EmptyComparableSet);
    }

    let polarity = metric.polarity();
    matches.sort_by(|a, b| {
        polarity
            .cmp_scores(tie_key(a.score), tie_key(b.score))
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
    debug!(target: "hbow::rank", "ranked {} entries, skipped {}", matches.len(), skipped.len());

    Ok(Ranking {
        polarity,
        matches,
        skipped,
    })
}

/// The `min(k, N)` entries of `dataset` most similar to `query`. `k == 0` yields an empty
/// result.
pub fn rank<M>(query: &Descriptor, dataset: &[DatasetEntry], metric: &M, k: usize) -> HbowResult<Vec<Match>>
where
    M: DistanceMetric + Sync + ?Sized,
{
    if k == 0 {
        return Ok(Vec::new());
    }
    Ok(rank_all(query, dataset, metric)?.top(k).to_vec())
}
