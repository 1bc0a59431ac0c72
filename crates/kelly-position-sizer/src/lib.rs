use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Holding horizon of a portfolio bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    Short,
    Medium,
    Long,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::Short, Horizon::Medium, Horizon::Long];

    pub fn name(&self) -> &'static str {
        match self {
            Horizon::Short => "short",
            Horizon::Medium => "medium",
            Horizon::Long => "long",
        }
    }

    /// Assumed trade statistics for the horizon.
    pub fn assumptions(&self) -> StrategyAssumptions {
        match self {
            Horizon::Short => StrategyAssumptions::new(0.55, 0.25, 0.08),
            Horizon::Medium => StrategyAssumptions::new(0.60, 0.50, 0.15),
            Horizon::Long => StrategyAssumptions::new(0.65, 1.00, 0.20),
        }
    }
}

/// Expected trade statistics behind a Kelly estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyAssumptions {
    /// Probability of a winning trade (0.0 to 1.0)
    pub win_rate: f64,

    /// Average gain of a winner, as a fraction
    pub avg_win: f64,

    /// Average loss of a loser, as a positive fraction
    pub avg_loss: f64,
}

impl StrategyAssumptions {
    pub const fn new(win_rate: f64, avg_win: f64, avg_loss: f64) -> Self {
        Self {
            win_rate,
            avg_win,
            avg_loss,
        }
    }
}

/// Position sizing recommendation, in percent of capital.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSize {
    /// Fractional Kelly for the bucket before the per-security adjustment
    pub base_pct: f64,

    /// Points added from the security's own score
    pub adjustment_pct: f64,

    /// Final allocation after clamping
    pub position_pct: f64,

    pub reasoning: String,
}

/// Fractional Kelly sizer.
///
/// f* = (p * b - q) / b, where b = avg_win / avg_loss and q = 1 - p. The
/// bucket base is `f* * kelly_multiplier` in percent, clamped to
/// `[0, max_position_pct]`; each security then moves off the base by its
/// score and is clamped to `[min_position_pct, max_position_pct]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KellyPositionSizer {
    /// Fractional Kelly multiplier (0.5 = half-Kelly)
    pub kelly_multiplier: f64,

    /// Smallest allocation any selected security receives, in percent
    pub min_position_pct: f64,

    /// Largest allocation, in percent
    pub max_position_pct: f64,

    /// Base used when the assumptions cannot produce a Kelly fraction
    pub fallback_pct: f64,

    /// Percent points per unit of `(score - 50) / 200`
    pub score_sensitivity: f64,
}

impl Default for KellyPositionSizer {
    fn default() -> Self {
        Self {
            kelly_multiplier: 0.5,
            min_position_pct: 1.0,
            max_position_pct: 25.0,
            fallback_pct: 5.0,
            score_sensitivity: 50.0,
        }
    }
}

/// Neutral score assumed when a security has none.
pub const NEUTRAL_SCORE: f64 = 50.0;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl KellyPositionSizer {
    pub fn new(
        kelly_multiplier: f64,
        min_position_pct: f64,
        max_position_pct: f64,
        fallback_pct: f64,
        score_sensitivity: f64,
    ) -> Result<Self> {
        if kelly_multiplier <= 0.0 || kelly_multiplier > 1.0 {
            bail!("kelly_multiplier must be between 0 and 1");
        }
        if max_position_pct <= 0.0 || max_position_pct > 100.0 {
            bail!("max_position_pct must be between 0 and 100");
        }
        if min_position_pct < 0.0 || min_position_pct > max_position_pct {
            bail!("min_position_pct must be >= 0 and <= max_position_pct");
        }
        if fallback_pct < 0.0 || fallback_pct > max_position_pct {
            bail!("fallback_pct must be >= 0 and <= max_position_pct");
        }
        if score_sensitivity < 0.0 {
            bail!("score_sensitivity must be non-negative");
        }

        Ok(Self {
            kelly_multiplier,
            min_position_pct,
            max_position_pct,
            fallback_pct,
            score_sensitivity,
        })
    }

    /// Fractional Kelly in percent, rounded to one decimal.
    pub fn base_pct(&self, assumptions: &StrategyAssumptions) -> f64 {
        let p = assumptions.win_rate;
        if assumptions.avg_loss == 0.0 || p <= 0.0 || p >= 1.0 {
            return self.fallback_pct;
        }
        let b = assumptions.avg_win / assumptions.avg_loss;
        if b == 0.0 || !b.is_finite() {
            return self.fallback_pct;
        }
        let q = 1.0 - p;
        let raw_kelly = (p * b - q) / b;
        let fractional = raw_kelly * self.kelly_multiplier * 100.0;
        round1(fractional.clamp(0.0, self.max_position_pct))
    }

    /// Percent points a score moves the allocation off the bucket base.
    pub fn score_adjustment(&self, score: Option<f64>) -> f64 {
        let score = score.filter(|s| s.is_finite()).unwrap_or(NEUTRAL_SCORE);
        (score - NEUTRAL_SCORE) / 200.0 * self.score_sensitivity
    }

    /// Base plus adjustment, clamped to the position band.
    pub fn clamp_position(&self, base_pct: f64, adjustment_pct: f64) -> f64 {
        let total = base_pct + adjustment_pct;
        if total.is_nan() {
            return self.min_position_pct;
        }
        round1(total.clamp(self.min_position_pct, self.max_position_pct))
    }

    /// Allocation for one security in a bucket.
    pub fn size(&self, horizon: Horizon, score: Option<f64>) -> PositionSize {
        let base_pct = self.base_pct(&horizon.assumptions());
        let adjustment_pct = self.score_adjustment(score);
        let position_pct = self.clamp_position(base_pct, adjustment_pct);

        debug!(
            horizon = horizon.name(),
            base_pct, adjustment_pct, position_pct, "Sized position"
        );

        PositionSize {
            base_pct,
            adjustment_pct,
            position_pct,
            reasoning: format!(
                "Kelly {}: base {:.1}% {:+.1}% from score {:.0} => {:.1}%",
                horizon.name(),
                base_pct,
                adjustment_pct,
                score.unwrap_or(NEUTRAL_SCORE),
                position_pct
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bucket_bases() {
        let sizer = KellyPositionSizer::default();

        // b = 3.125, f* = (0.55 * 3.125 - 0.45) / 3.125 = 0.406, half = 20.3%
        assert_relative_eq!(sizer.base_pct(&Horizon::Short.assumptions()), 20.3);
        // b = 3.33, f* = 0.48, half = 24%
        assert_relative_eq!(sizer.base_pct(&Horizon::Medium.assumptions()), 24.0);
        // b = 5, f* = 0.58, half = 29% capped at 25
        assert_relative_eq!(sizer.base_pct(&Horizon::Long.assumptions()), 25.0);
    }

    #[test]
    fn test_degenerate_assumptions_fall_back() {
        let sizer = KellyPositionSizer::default();
        assert_eq!(sizer.base_pct(&StrategyAssumptions::new(0.6, 0.5, 0.0)), 5.0);
        assert_eq!(sizer.base_pct(&StrategyAssumptions::new(0.0, 0.5, 0.1)), 5.0);
        assert_eq!(sizer.base_pct(&StrategyAssumptions::new(1.0, 0.5, 0.1)), 5.0);
    }

    #[test]
    fn test_negative_edge_is_zero_base() {
        let sizer = KellyPositionSizer::default();
        assert_eq!(sizer.base_pct(&StrategyAssumptions::new(0.3, 0.1, 0.1)), 0.0);
    }

    #[test]
    fn test_score_adjustment() {
        let sizer = KellyPositionSizer::default();
        assert_relative_eq!(sizer.score_adjustment(Some(90.0)), 10.0);
        assert_relative_eq!(sizer.score_adjustment(Some(10.0)), -10.0);
        assert_eq!(sizer.score_adjustment(None), 0.0);
    }

    #[test]
    fn test_position_always_in_band() {
        let sizer = KellyPositionSizer::default();
        assert_eq!(sizer.clamp_position(20.3, 1000.0), 25.0);
        assert_eq!(sizer.clamp_position(20.3, -1000.0), 1.0);
        assert_eq!(sizer.clamp_position(0.0, 0.0), 1.0);
        for score in [0.0, 25.0, 50.0, 75.0, 100.0] {
            for horizon in Horizon::ALL {
                let pct = sizer.size(horizon, Some(score)).position_pct;
                assert!((1.0..=25.0).contains(&pct));
            }
        }
    }

    #[test]
    fn test_size_short_bucket() {
        let sizer = KellyPositionSizer::default();
        let size = sizer.size(Horizon::Short, Some(70.0));
        // 20.3 + (70 - 50) / 200 * 50 = 25.3, capped
        assert_eq!(size.position_pct, 25.0);
        let size = sizer.size(Horizon::Short, Some(30.0));
        assert_relative_eq!(size.position_pct, 15.3, epsilon = 1e-9);
        assert!(size.reasoning.contains("short"));
    }

    #[test]
    fn test_invalid_construction() {
        assert!(KellyPositionSizer::new(0.0, 1.0, 25.0, 5.0, 50.0).is_err());
        assert!(KellyPositionSizer::new(0.5, 30.0, 25.0, 5.0, 50.0).is_err());
        assert!(KellyPositionSizer::new(0.5, 1.0, 25.0, 30.0, 50.0).is_err());
        assert!(KellyPositionSizer::new(0.5, 1.0, 25.0, 5.0, 50.0).is_ok());
    }
}
