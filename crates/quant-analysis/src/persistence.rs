//! Persistence (Hurst-style) exponent estimators.
//!
//! Values above 0.5 suggest a trending series, below 0.5 a mean-reverting
//! one. Estimators are tried in order and the first that yields a value wins.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Fewest prices any estimator is given.
pub const MIN_PERSISTENCE_PRICES: usize = 20;

pub trait PersistenceEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    fn estimate(&self, prices: &[f64]) -> Option<f64>;
}

/// Least-squares slope of `y` on `x`.
pub fn ols_slope(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let sum_x2: f64 = x.iter().map(|a| a * a).sum();
    let denom = n * sum_x2 - sum_x * sum_x;
    if denom == 0.0 {
        return None;
    }
    Some((n * sum_xy - sum_x * sum_y) / denom)
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Slope of log(std of lagged differences) against log(lag), lags
/// `2..min(20, n/2)`.
pub struct LagDispersion;

impl PersistenceEstimator for LagDispersion {
    fn name(&self) -> &'static str {
        "lag_dispersion"
    }

    fn estimate(&self, prices: &[f64]) -> Option<f64> {
        if prices.len() < MIN_PERSISTENCE_PRICES {
            return None;
        }
        let max_lag = 20.min(prices.len() / 2);
        let lags: Vec<usize> = (2..max_lag).collect();
        let tau: Vec<f64> = lags
            .iter()
            .map(|&lag| {
                let diffs: Vec<f64> = prices[lag..]
                    .iter()
                    .zip(&prices[..prices.len() - lag])
                    .map(|(later, earlier)| later - earlier)
                    .collect();
                population_std(&diffs)
            })
            .collect();

        if tau.len() < 2 || population_std(&tau) == 0.0 || tau.iter().any(|t| *t <= 0.0) {
            return None;
        }

        let log_lags: Vec<f64> = lags.iter().map(|&l| (l as f64).ln()).collect();
        let log_tau: Vec<f64> = tau.iter().map(|t| t.ln()).collect();
        ols_slope(&log_lags, &log_tau).filter(|h| h.is_finite())
    }
}

/// Rescaled-range (R/S) analysis over log returns, sub-series sizes of
/// 8 to 128, clamped to [0, 1].
pub struct RescaledRange;

impl PersistenceEstimator for RescaledRange {
    fn name(&self) -> &'static str {
        "rescaled_range"
    }

    fn estimate(&self, prices: &[f64]) -> Option<f64> {
        let log_returns: Vec<f64> = prices
            .windows(2)
            .filter(|w| w[0] > 0.0 && w[1] > 0.0)
            .map(|w| (w[1] / w[0]).ln())
            .collect();
        if log_returns.len() < MIN_PERSISTENCE_PRICES {
            return None;
        }

        let sizes: Vec<usize> = [8usize, 16, 32, 64, 128]
            .iter()
            .copied()
            .filter(|&s| s <= log_returns.len())
            .collect();

        let points: Vec<(f64, f64)> = sizes
            .par_iter()
            .filter_map(|&size| {
                let rs_values: Vec<f64> = log_returns
                    .chunks_exact(size)
                    .filter_map(|sub| {
                        let mean = sub.iter().sum::<f64>() / size as f64;
                        let mut cumulative = 0.0;
                        let mut high = f64::NEG_INFINITY;
                        let mut low = f64::INFINITY;
                        for r in sub {
                            cumulative += r - mean;
                            high = high.max(cumulative);
                            low = low.min(cumulative);
                        }
                        let std = population_std(sub);
                        (std > 0.0).then(|| (high - low) / std)
                    })
                    .collect();
                if rs_values.is_empty() {
                    return None;
                }
                let avg_rs = rs_values.iter().sum::<f64>() / rs_values.len() as f64;
                (avg_rs > 0.0).then(|| ((size as f64).ln(), avg_rs.ln()))
            })
            .collect();

        let (log_n, log_rs): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
        ols_slope(&log_n, &log_rs).map(|h| h.clamp(0.0, 1.0))
    }
}

/// Which estimator leads the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceModel {
    /// Rescaled range, falling back to lag dispersion.
    #[default]
    RescaledRange,
    /// Lag dispersion only.
    LagDispersion,
}

#[derive(Error, Debug, PartialEq)]
#[error("Unknown persistence model: {0} (expected rescaled_range or lag_dispersion)")]
pub struct UnknownPersistenceModel(pub String);

impl FromStr for PersistenceModel {
    type Err = UnknownPersistenceModel;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "rescaled_range" | "rs" => Ok(PersistenceModel::RescaledRange),
            "lag_dispersion" | "lag" => Ok(PersistenceModel::LagDispersion),
            other => Err(UnknownPersistenceModel(other.to_string())),
        }
    }
}

/// Ordered estimator list; the first estimator that yields a value wins.
pub struct PersistenceChain {
    estimators: Vec<Box<dyn PersistenceEstimator>>,
}

impl PersistenceChain {
    pub fn new(estimators: Vec<Box<dyn PersistenceEstimator>>) -> Self {
        Self { estimators }
    }

    pub fn for_model(model: PersistenceModel) -> Self {
        match model {
            PersistenceModel::RescaledRange => Self::new(vec![Box::new(RescaledRange), Box::new(LagDispersion)]),
            PersistenceModel::LagDispersion => Self::new(vec![Box::new(LagDispersion)]),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.estimators.iter().map(|e| e.name()).collect()
    }

    pub fn estimate(&self, prices: &[f64]) -> Option<f64> {
        self.estimate_with_source(prices).map(|(value, _)| value)
    }

    /// The estimate together with the name of the estimator that produced it.
    pub fn estimate_with_source(&self, prices: &[f64]) -> Option<(f64, &'static str)> {
        let prices: Vec<f64> = prices.iter().copied().filter(|p| p.is_finite()).collect();
        if prices.len() < MIN_PERSISTENCE_PRICES {
            return None;
        }
        self.estimators
            .iter()
            .find_map(|e| e.estimate(&prices).map(|value| (value, e.name())))
    }
}

impl Default for PersistenceChain {
    fn default() -> Self {
        Self::for_model(PersistenceModel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_random_walk_like_series() {
        // deterministic pseudo-random walk
        let mut price = 100.0;
        let mut state: u64 = 12345;
        let prices: Vec<f64> = (0..300)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let step = ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5;
                price += step;
                price
            })
            .collect();
        let h = LagDispersion.estimate(&prices).unwrap();
        assert!(h > 0.2 && h < 0.8, "h = {h}");
    }

    #[test]
    fn test_zero_dispersion_lag_is_missing() {
        let prices: Vec<f64> = (0..100)
            .map(|i| 100.0 + i as f64 + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        // even lags cancel the wobble, leaving a zero tau
        assert!(LagDispersion.estimate(&prices).is_none());
    }

    #[test]
    fn test_short_series_is_missing() {
        let prices: Vec<f64> = (0..19).map(|i| 100.0 + i as f64).collect();
        assert_eq!(PersistenceChain::default().estimate(&prices), None);
    }

    #[test]
    fn test_flat_series_is_missing() {
        assert_eq!(PersistenceChain::default().estimate(&[50.0; 60]), None);
    }

    #[test]
    fn test_chain_falls_back() {
        struct Never;
        impl PersistenceEstimator for Never {
            fn name(&self) -> &'static str {
                "never"
            }
            fn estimate(&self, _prices: &[f64]) -> Option<f64> {
                None
            }
        }
        struct Fixed;
        impl PersistenceEstimator for Fixed {
            fn name(&self) -> &'static str {
                "fixed"
            }
            fn estimate(&self, _prices: &[f64]) -> Option<f64> {
                Some(0.61)
            }
        }
        let chain = PersistenceChain::new(vec![Box::new(Never), Box::new(Fixed)]);
        let prices: Vec<f64> = (0..40).map(|i| i as f64).collect();
        assert_eq!(chain.estimate(&prices), Some(0.61));
        assert_eq!(chain.names(), vec!["never", "fixed"]);
    }

    #[test]
    fn test_ols_slope() {
        assert_relative_eq!(ols_slope(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap(), 2.0);
        assert_eq!(ols_slope(&[1.0, 1.0], &[2.0, 3.0]), None);
    }

    fn sine_with_drift(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 0.05 * i as f64 + 3.0 * ((i as f64) * 0.45).sin())
            .collect()
    }

    #[test]
    fn test_default_chain_leads_with_rescaled_range() {
        let chain = PersistenceChain::default();
        assert_eq!(chain.names(), vec!["rescaled_range", "lag_dispersion"]);

        let prices = sine_with_drift(252);
        let expected = RescaledRange.estimate(&prices).unwrap();
        let (value, source) = chain.estimate_with_source(&prices).unwrap();
        assert_eq!(source, "rescaled_range");
        assert_relative_eq!(value, expected);
    }

    #[test]
    fn test_lag_dispersion_model() {
        let chain = PersistenceChain::for_model(PersistenceModel::LagDispersion);
        assert_eq!(chain.names(), vec!["lag_dispersion"]);
        let prices = sine_with_drift(252);
        assert_eq!(chain.estimate(&prices), LagDispersion.estimate(&prices));
    }

    #[test]
    fn test_falls_back_to_lag_dispersion() {
        // every other price is zero, so there is no usable log return
        let prices: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 100.0 + (i as f64 * 0.3).sin() * 4.0 } else { 0.0 })
            .collect();
        assert_eq!(RescaledRange.estimate(&prices), None);
        assert_eq!(
            PersistenceChain::default().estimate_with_source(&prices),
            LagDispersion.estimate(&prices).map(|h| (h, "lag_dispersion"))
        );
    }

    #[test]
    fn test_model_parsing() {
        assert_eq!("rescaled_range".parse(), Ok(PersistenceModel::RescaledRange));
        assert_eq!(" Lag-Dispersion ".parse(), Ok(PersistenceModel::LagDispersion));
        assert!("dfa".parse::<PersistenceModel>().is_err());
    }

    #[test]
    fn test_rescaled_range_in_unit_interval() {
        let prices: Vec<f64> = (0..200)
            .map(|i| 100.0 * (1.0 + 0.01 * ((i as f64) * 0.7).sin()))
            .collect();
        let h = RescaledRange.estimate(&prices).unwrap();
        assert!((0.0..=1.0).contains(&h));
    }
}
