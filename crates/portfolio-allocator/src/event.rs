//! Event-driven candidates for the short bucket.
//!
//! High beta, high VaR and heavy short interest are what a catalyst trade
//! wants, so none of the terms are inverted here.

use analysis_core::{Metric, Universe, UniverseScorer, WeightedMetric};
use std::collections::BTreeSet;

/// Candidates kept from the event ranking.
pub const DEFAULT_EVENT_POOL_SIZE: usize = 50;

pub const EVENT_WEIGHTS: [WeightedMetric; 4] = [
    WeightedMetric::high(Metric::Momentum1Y, 35.0),
    WeightedMetric::high(Metric::Beta, 25.0),
    WeightedMetric::high(Metric::VaR95, 20.0),
    WeightedMetric::high(Metric::ShortInterestPct, 20.0),
];

/// Writes `Event_Score`. Missing inputs rank last.
pub struct EventScorer;

impl UniverseScorer for EventScorer {
    fn score_metric(&self) -> Metric {
        Metric::EventScore
    }

    fn imputed_metrics(&self) -> &[Metric] {
        &[]
    }

    fn composite(&self, universe: &Universe) -> Vec<f64> {
        universe.composite_score(&EVENT_WEIGHTS)
    }
}

/// The `n` best event scores. Unscored securities are never candidates.
pub fn event_candidates(universe: &Universe, n: usize) -> BTreeSet<String> {
    universe
        .filter(|s| s.has(Metric::EventScore))
        .top_n_by(Metric::EventScore, n)
        .tickers()
        .into_iter()
        .collect()
}
