//! Progressive eligibility tiers.
//!
//! A bucket walks its tier table from strictest to loosest and keeps the
//! first tier that admits enough candidates. A missing attribute never
//! satisfies a threshold.

use analysis_core::{Metric, Security, Universe};
use serde::Serialize;

pub trait TierRule {
    fn admits(&self, security: &Security) -> bool;
}

fn above(value: Option<f64>, threshold: Option<f64>) -> bool {
    match threshold {
        None => true,
        Some(min) => value.is_some_and(|v| v > min),
    }
}

fn at_least(value: Option<f64>, threshold: Option<f64>) -> bool {
    match threshold {
        None => true,
        Some(min) => value.is_some_and(|v| v >= min),
    }
}

/// Last price, falling back to the snapshot's current price.
pub fn price_of(security: &Security) -> Option<f64> {
    security
        .get(Metric::LastPrice)
        .or_else(|| security.get(Metric::CurrentPrice))
}

/// Top-10 holders' stake, falling back to total institutional ownership.
pub fn institutional_of(security: &Security) -> Option<f64> {
    security
        .get(Metric::Top10InstitutionalPct)
        .or_else(|| security.get(Metric::InstitutionalOwnership))
}

/// Momentum bucket rule.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MediumTier {
    pub min_persistence: Option<f64>,
    pub above_sma_200: bool,
    pub min_institutional: Option<f64>,
}

impl TierRule for MediumTier {
    fn admits(&self, security: &Security) -> bool {
        if !above(security.get(Metric::HurstExponent), self.min_persistence) {
            return false;
        }
        if self.above_sma_200 {
            match (price_of(security), security.get(Metric::Sma200)) {
                (Some(price), Some(sma)) if price > sma => {}
                _ => return false,
            }
        }
        above(institutional_of(security), self.min_institutional)
    }
}

pub const MEDIUM_TIERS: [MediumTier; 4] = [
    MediumTier {
        min_persistence: Some(0.52),
        above_sma_200: true,
        min_institutional: Some(0.20),
    },
    MediumTier {
        min_persistence: Some(0.50),
        above_sma_200: true,
        min_institutional: None,
    },
    MediumTier {
        min_persistence: Some(0.48),
        above_sma_200: false,
        min_institutional: None,
    },
    MediumTier {
        min_persistence: None,
        above_sma_200: false,
        min_institutional: None,
    },
];

/// Beneish M above this marks a probable earnings manipulator.
pub const MANIPULATION_THRESHOLD: f64 = -1.78;

/// Value bucket rule.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LongTier {
    pub min_margin_of_safety: Option<f64>,
    pub min_deep_value_score: Option<f64>,
    pub min_piotroski: Option<f64>,
    pub min_altman_z: Option<f64>,
    /// Reject probable manipulators. A missing M score passes.
    pub manipulation_gate: bool,
}

impl TierRule for LongTier {
    fn admits(&self, security: &Security) -> bool {
        if self.manipulation_gate
            && security
                .get(Metric::BeneishMScore)
                .is_some_and(|m| m > MANIPULATION_THRESHOLD)
        {
            return false;
        }
        above(security.get(Metric::MarginOfSafety), self.min_margin_of_safety)
            && above(security.get(Metric::DeepValueScore), self.min_deep_value_score)
            && at_least(security.get(Metric::PiotroskiFScore), self.min_piotroski)
            && at_least(security.get(Metric::AltmanZScore), self.min_altman_z)
    }
}

pub const LONG_TIERS: [LongTier; 4] = [
    LongTier {
        min_margin_of_safety: Some(0.10),
        min_deep_value_score: Some(55.0),
        min_piotroski: Some(7.0),
        min_altman_z: Some(2.99),
        manipulation_gate: true,
    },
    LongTier {
        min_margin_of_safety: Some(0.10),
        min_deep_value_score: Some(40.0),
        min_piotroski: Some(6.0),
        min_altman_z: Some(2.50),
        manipulation_gate: true,
    },
    LongTier {
        min_margin_of_safety: Some(0.05),
        min_deep_value_score: Some(30.0),
        min_piotroski: Some(5.0),
        min_altman_z: Some(1.81),
        manipulation_gate: false,
    },
    LongTier {
        min_margin_of_safety: None,
        min_deep_value_score: None,
        min_piotroski: None,
        min_altman_z: None,
        manipulation_gate: false,
    },
];

/// Outcome of walking a tier table.
#[derive(Debug, Clone)]
pub struct TierSelection {
    /// Index of the tier that admitted the candidates; `None` when no tier
    /// admitted enough and the whole pool was taken.
    pub tier: Option<usize>,
    pub candidates: Universe,
}

/// First tier admitting at least `min_size` securities, else the unfiltered
/// pool.
pub fn select_tier<T: TierRule>(pool: &Universe, tiers: &[T], min_size: usize) -> TierSelection {
    for (index, tier) in tiers.iter().enumerate() {
        let candidates = pool.filter(|s| tier.admits(s));
        if candidates.len() >= min_size {
            return TierSelection {
                tier: Some(index),
                candidates,
            };
        }
    }
    TierSelection {
        tier: None,
        candidates: pool.clone(),
    }
}
