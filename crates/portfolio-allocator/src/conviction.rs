use analysis_core::percentile::clip_score;
use analysis_core::{Metric, Security, Universe, UniverseScorer};

/// Score assumed for a component stage that produced nothing.
pub const NEUTRAL_COMPONENT: f64 = 50.0;

pub const CONVICTION_WEIGHTS: [(Metric, f64); 4] = [
    (Metric::QuantRiskScore, 0.35),
    (Metric::NarrativeScore, 0.25),
    (Metric::FundamentalScore, 0.20),
    (Metric::DeepValueScore, 0.10),
];

pub const SENTIMENT_WEIGHT: f64 = 0.10;

/// Headline sentiment in [-1, 1] mapped onto [0, 100].
pub fn normalized_sentiment(sentiment: Option<f64>) -> f64 {
    let s = sentiment.filter(|s| s.is_finite()).unwrap_or(0.0);
    clip_score((s + 1.0) / 2.0 * 100.0)
}

pub fn conviction_score(security: &Security) -> f64 {
    let components: f64 = CONVICTION_WEIGHTS
        .iter()
        .map(|(metric, weight)| security.get(*metric).unwrap_or(NEUTRAL_COMPONENT) * weight)
        .sum();
    clip_score(components + normalized_sentiment(security.get(Metric::HeadlineSentiment)) * SENTIMENT_WEIGHT)
}

/// Writes `Ultimate_Conviction_Score`, a blend of every stage score.
pub struct ConvictionScorer;

impl UniverseScorer for ConvictionScorer {
    fn score_metric(&self) -> Metric {
        Metric::ConvictionScore
    }

    fn imputed_metrics(&self) -> &[Metric] {
        &[]
    }

    fn composite(&self, universe: &Universe) -> Vec<f64> {
        universe.iter().map(conviction_score).collect()
    }
}
