pub mod benchmark;
pub mod divergence;
pub mod macro_signals;
pub mod monte_carlo;
pub mod persistence;

use analysis_core::percentile::clip_score;
use analysis_core::{closes, momentum_pct, tail, Bar, Metric, Security, Universe, UniverseScorer, WeightedMetric};
use statrs::statistics::Statistics;
use technical_analysis::{stochastic, vwap};
use tracing::debug;

pub use benchmark::{BenchmarkContext, MIN_BETA_OBSERVATIONS};
pub use divergence::{bullish_divergence, DIVERGENCE_WINDOW};
pub use macro_signals::{commodity_adjustment, CommodityTrend, MacroTrends};
pub use monte_carlo::MonteCarloVar;
pub use persistence::{
    LagDispersion, PersistenceChain, PersistenceEstimator, PersistenceModel, RescaledRange, UnknownPersistenceModel,
};

/// Bars of history the quant stage looks at.
pub const LOOKBACK_BARS: usize = 252;
pub const MIN_QUANT_BARS: usize = 30;
pub const MOMENTUM_1M_BARS: usize = 21;

const TRADING_DAYS: f64 = 252.0;

pub struct QuantAnalysisEngine {
    var: MonteCarloVar,
    persistence: PersistenceChain,
}

impl QuantAnalysisEngine {
    pub fn new() -> Self {
        Self::with_models(MonteCarloVar::default(), PersistenceChain::default())
    }

    pub fn with_models(var: MonteCarloVar, persistence: PersistenceChain) -> Self {
        Self { var, persistence }
    }

    fn calculate_log_returns(&self, prices: &[f64]) -> Vec<f64> {
        prices
            .windows(2)
            .filter(|w| w[0] > 0.0 && w[1] > 0.0)
            .map(|w| (w[1] / w[0]).ln())
            .collect()
    }

    fn calculate_volatility(&self, log_returns: &[f64]) -> Option<f64> {
        if log_returns.len() < 2 {
            return None;
        }
        Some(log_returns.std_dev() * TRADING_DAYS.sqrt()).filter(|v| v.is_finite())
    }

    /// Risk record for one security. Fewer than 30 bars yields a record with
    /// no metrics.
    pub fn analyze(
        &self,
        ticker: &str,
        bars: &[Bar],
        sector: Option<&str>,
        benchmark: &BenchmarkContext,
        trends: &MacroTrends,
    ) -> Security {
        let mut security = Security::new(ticker);
        let bars = tail(bars, LOOKBACK_BARS);
        if bars.len() < MIN_QUANT_BARS {
            debug!(ticker, bars = bars.len(), "Not enough history for quant analysis");
            return security;
        }

        let prices = closes(bars);
        let last = prices[prices.len() - 1];
        let log_returns = self.calculate_log_returns(&prices);

        let vwap_value = vwap(bars);
        security.set(Metric::LastPrice, Some(last));
        security.set(Metric::Vwap, vwap_value);
        security.set(
            Metric::PriceVsVwap,
            vwap_value.filter(|v| *v != 0.0).map(|v| (last - v) / v),
        );

        security.set(Metric::VaR95, Some(self.var.value_at_risk(&log_returns)));
        security.set(Metric::AnnVolatility, self.calculate_volatility(&log_returns));
        let persistence = self.persistence.estimate_with_source(&prices);
        security.set(Metric::HurstExponent, persistence.map(|(value, _)| value));
        security.set(Metric::Beta, benchmark.beta(bars));
        security.set(Metric::RsVsBenchmark, benchmark.relative_strength(bars));
        security.set(Metric::Momentum1M, momentum_pct(&prices, MOMENTUM_1M_BARS));

        let stoch = stochastic(bars, 14, 3);
        security.set(Metric::StochK, stoch.last_k());
        security.set(Metric::StochD, stoch.last_d());
        security.bullish_divergence = Some(bullish_divergence(&prices, &stoch.k, DIVERGENCE_WINDOW));

        security.set(Metric::CommodityAdj, Some(commodity_adjustment(sector, trends)));

        debug!(
            ticker,
            var = ?security.get(Metric::VaR95),
            hurst = ?security.get(Metric::HurstExponent),
            persistence_model = persistence.map_or("none", |(_, source)| source),
            beta = ?security.get(Metric::Beta),
            "Quant metrics computed"
        );
        security
    }
}

impl Default for QuantAnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}

pub const QUANT_WEIGHTS: [WeightedMetric; 3] = [
    WeightedMetric::low(Metric::VaR95, 25.0),
    WeightedMetric::low(Metric::AnnVolatility, 20.0),
    WeightedMetric::high(Metric::HurstExponent, 25.0),
];

const QUANT_INPUTS: [Metric; 4] = [
    Metric::VaR95,
    Metric::AnnVolatility,
    Metric::HurstExponent,
    Metric::PriceVsVwap,
];

pub const VWAP_TARGET: f64 = 0.05;
pub const VWAP_TOLERANCE: f64 = 0.50;
pub const PROXIMITY_WEIGHT: f64 = 20.0;
pub const DIVERGENCE_BONUS: f64 = 10.0;

/// How close price sits to 5% above VWAP, in [0, 1]. Missing is 0.
pub fn vwap_proximity(price_vs_vwap: Option<f64>) -> f64 {
    match price_vs_vwap {
        Some(pv) => (1.0 - (pv - VWAP_TARGET).abs() / VWAP_TOLERANCE).clamp(0.0, 1.0),
        None => 0.0,
    }
}

/// Writes `Quant_Risk_Score`: ranked risk terms plus VWAP proximity and the
/// divergence, consensus and commodity bonuses.
pub struct QuantScorer;

impl UniverseScorer for QuantScorer {
    fn score_metric(&self) -> Metric {
        Metric::QuantRiskScore
    }

    fn imputed_metrics(&self) -> &[Metric] {
        &QUANT_INPUTS
    }

    fn composite(&self, universe: &Universe) -> Vec<f64> {
        let ranked = universe.composite_score(&QUANT_WEIGHTS);
        universe
            .iter()
            .zip(ranked)
            .map(|(security, base)| {
                let mut score = base + vwap_proximity(security.get(Metric::PriceVsVwap)) * PROXIMITY_WEIGHT;
                if security.bullish_divergence == Some(true) {
                    score += DIVERGENCE_BONUS;
                }
                score += security.consensus.map_or(0.0, |c| c.bonus());
                score += security.get(Metric::CommodityAdj).unwrap_or(0.0);
                clip_score(score)
            })
            .collect()
    }
}
