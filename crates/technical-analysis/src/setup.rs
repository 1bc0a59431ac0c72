use analysis_core::{closes, AnalysisError, Bar, Metric, Security};
use serde::Serialize;
use tracing::debug;

use crate::indicators::*;

/// Shortest history a technical record is produced from.
pub const MIN_SETUP_BARS: usize = 30;

const RELATIVE_VOLUME_SURGE: f64 = 1.2;
const LOWER_BAND_TOLERANCE: f64 = 1.02;

/// Latest value of every indicator the setup score reads. Each is `None`
/// when the history is too short for that indicator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TechnicalSnapshot {
    pub last_price: f64,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub bb_lower: Option<f64>,
    pub bb_upper: Option<f64>,
    pub atr_14: Option<f64>,
    pub relative_volume: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
}

impl TechnicalSnapshot {
    pub fn from_bars(bars: &[Bar]) -> Result<Self, AnalysisError> {
        if bars.len() < MIN_SETUP_BARS {
            return Err(AnalysisError::InsufficientData(format!(
                "Need at least {} bars for a technical setup, got {}",
                MIN_SETUP_BARS,
                bars.len()
            )));
        }

        let prices = closes(bars);
        let last_price = prices[prices.len() - 1];
        let bands = bollinger_bands(&prices, 20, 2.0).last();
        let stoch = stochastic(bars, 14, 3);

        Ok(Self {
            last_price,
            sma_50: last_sma(&prices, 50),
            sma_200: last_sma(&prices, 200),
            bb_lower: bands.map(|(lower, _)| lower),
            bb_upper: bands.map(|(_, upper)| upper),
            atr_14: atr(bars, 14).last().copied(),
            relative_volume: relative_volume(bars, 20),
            stoch_k: stoch.last_k(),
            stoch_d: stoch.last_d(),
        })
    }

    /// The rules this setup satisfies, with their points.
    pub fn signals(&self) -> Vec<(&'static str, f64)> {
        let close = self.last_price;
        let surge = self.relative_volume.map_or(false, |rv| rv > RELATIVE_VOLUME_SURGE);
        let mut signals = Vec::new();

        if self.sma_50.map_or(false, |sma| close > sma) {
            signals.push(("Above SMA 50", 20.0));
        }
        if self.sma_200.map_or(false, |sma| close > sma) {
            signals.push(("Above SMA 200", 20.0));
        }
        if let (Some(lower), Some(upper)) = (self.bb_lower, self.bb_upper) {
            let near_lower = close <= lower * LOWER_BAND_TOLERANCE;
            let breakout = close >= upper && surge;
            if near_lower {
                signals.push(("Lower Band Dip", 15.0));
            } else if breakout {
                signals.push(("Upper Band Breakout", 15.0));
            }
        }
        if surge {
            signals.push(("Volume Surge", 25.0));
        }
        if let (Some(k), Some(d)) = (self.stoch_k, self.stoch_d) {
            if k > d && k < 20.0 {
                signals.push(("Stochastic Oversold Bounce", 10.0));
            } else if k > d && k < 80.0 {
                signals.push(("Stochastic Bullish Cross", 10.0));
            }
        }
        signals
    }

    /// Rule-based setup score. The rules add up to 90 points.
    pub fn score(&self) -> f64 {
        self.signals().iter().map(|(_, points)| points).sum::<f64>().clamp(0.0, 100.0)
    }
}

pub struct TechnicalAnalysisEngine;

impl TechnicalAnalysisEngine {
    pub fn new() -> Self {
        Self
    }

    /// Technical record for one security, or `None` when the history is too
    /// short to produce one.
    pub fn analyze(&self, ticker: &str, bars: &[Bar]) -> Option<Security> {
        let snapshot = match TechnicalSnapshot::from_bars(bars) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(ticker, error = %e, "Skipping technical setup");
                return None;
            }
        };

        let score = snapshot.score();
        let mut security = Security::new(ticker);
        security.set(Metric::LastPrice, Some(snapshot.last_price));
        security.set(Metric::Sma50, snapshot.sma_50);
        security.set(Metric::Sma200, snapshot.sma_200);
        security.set(Metric::BbLower, snapshot.bb_lower);
        security.set(Metric::BbUpper, snapshot.bb_upper);
        security.set(Metric::Atr14, snapshot.atr_14);
        security.set(Metric::RelativeVolume, snapshot.relative_volume);
        security.set(Metric::StochK, snapshot.stoch_k);
        security.set(Metric::StochD, snapshot.stoch_d);
        security.set(Metric::TechnicalScore, Some(score));
        Some(security)
    }
}

impl Default for TechnicalAnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Indicators median-filled across the technical stage before output.
pub const TECHNICAL_METRICS: [Metric; 9] = [
    Metric::Sma50,
    Metric::Sma200,
    Metric::BbLower,
    Metric::BbUpper,
    Metric::Atr14,
    Metric::RelativeVolume,
    Metric::StochK,
    Metric::StochD,
    Metric::TechnicalScore,
];

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from(closes: &[f64], volume: impl Fn(usize) -> f64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: volume(i),
            })
            .collect()
    }

    fn full_setup() -> TechnicalSnapshot {
        TechnicalSnapshot {
            last_price: 100.0,
            sma_50: Some(95.0),
            sma_200: Some(90.0),
            bb_lower: Some(90.0),
            bb_upper: Some(99.0),
            atr_14: Some(2.0),
            relative_volume: Some(1.5),
            stoch_k: Some(60.0),
            stoch_d: Some(50.0),
        }
    }

    #[test]
    fn test_every_rule_hits() {
        let setup = full_setup();
        assert_eq!(setup.score(), 90.0);
        assert_eq!(setup.signals().len(), 5);
    }

    #[test]
    fn test_breakout_needs_volume() {
        let mut setup = full_setup();
        setup.relative_volume = Some(1.0);
        // loses the breakout (15) and the surge (25)
        assert_eq!(setup.score(), 50.0);
    }

    #[test]
    fn test_missing_indicators_earn_nothing() {
        let setup = TechnicalSnapshot { last_price: 10.0, ..Default::default() };
        assert_eq!(setup.score(), 0.0);
    }

    #[test]
    fn test_stochastic_rules() {
        let mut setup = full_setup();
        setup.stoch_k = Some(85.0);
        setup.stoch_d = Some(70.0);
        assert_eq!(setup.score(), 80.0);
        setup.stoch_k = Some(15.0);
        setup.stoch_d = Some(10.0);
        assert_eq!(setup.score(), 90.0);
    }

    #[test]
    fn test_short_history_yields_no_record() {
        let closes: Vec<f64> = (0..29).map(|i| 100.0 + i as f64).collect();
        let bars = bars_from(&closes, |_| 1_000.0);
        assert!(TechnicalAnalysisEngine::new().analyze("SHRT", &bars).is_none());
    }

    #[test]
    fn test_analyze_uptrend_with_volume_spike() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let bars = bars_from(&closes, |i| if i == 59 { 5_000.0 } else { 1_000.0 });
        let security = TechnicalAnalysisEngine::new().analyze("UP", &bars).unwrap();

        assert!(security.has(Metric::Sma50));
        assert!(!security.has(Metric::Sma200));
        assert!(security.get(Metric::RelativeVolume).unwrap() > 1.2);
        // above SMA50 (20) + volume surge (25)
        let score = security.get(Metric::TechnicalScore).unwrap();
        assert!(score >= 45.0, "score was {score}");
    }
}
