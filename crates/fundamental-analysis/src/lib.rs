pub mod deep_value;
pub mod quality;
pub mod risk_metrics;

use analysis_core::{
    closes, momentum_pct, Bar, FinancialStatements, FundamentalSnapshot, Metric, Security, UniverseScorer,
    Universe, WeightedMetric,
};
use tracing::debug;

pub use deep_value::{intrinsic_value, margin_of_safety};
pub use quality::{altman_z, beneish_m, is_probable_manipulator, piotroski_f, AltmanZone};
pub use risk_metrics::{risk_metrics, risk_metrics_with_min, RiskMetrics};

pub const DEFAULT_RISK_FREE_RATE: f64 = 0.04;
pub const DEFAULT_DEEP_VALUE_RISK_FREE_RATE: f64 = 0.0409;

/// Per-security fundamentals: risk metrics from three years of closes,
/// valuation and health ratios from the snapshot, and the balance-sheet
/// heuristics from annual statements.
pub struct FundamentalAnalysisEngine {
    risk_free_rate: f64,
}

impl FundamentalAnalysisEngine {
    pub fn new() -> Self {
        Self::with_risk_free_rate(DEFAULT_RISK_FREE_RATE)
    }

    pub fn with_risk_free_rate(risk_free_rate: f64) -> Self {
        Self { risk_free_rate }
    }

    pub fn analyze(
        &self,
        ticker: &str,
        snapshot: Option<&FundamentalSnapshot>,
        bars: &[Bar],
        statements: Option<&FinancialStatements>,
    ) -> Security {
        let mut security = Security::new(ticker);
        let prices = closes(bars);

        let risk = risk_metrics(&prices, self.risk_free_rate);
        security.set(Metric::AnnReturn, risk.ann_return);
        security.set(Metric::AnnVolatility, risk.ann_volatility);
        security.set(Metric::SharpeRatio, risk.sharpe_ratio);
        security.set(Metric::MaxDrawdown, risk.max_drawdown);
        security.set(
            Metric::Momentum1Y,
            momentum_pct(&prices, risk_metrics::MOMENTUM_1Y_BARS),
        );

        let empty = FundamentalSnapshot::default();
        let snap = snapshot.unwrap_or(&empty);
        self.copy_snapshot(&mut security, snap, prices.last().copied());

        security.set(Metric::PiotroskiFScore, Some(piotroski_f(snap) as f64));

        if let Some(statements) = statements {
            let altman = statements.latest().and_then(|latest| {
                let revenue = snap.total_revenue.or(latest.revenue);
                altman_z(latest, snap.market_cap, revenue)
            });
            security.set(Metric::AltmanZScore, altman);
            security.set(Metric::BeneishMScore, beneish_m(statements));
        }

        debug!(
            ticker,
            sharpe = ?risk.sharpe_ratio,
            altman = ?security.get(Metric::AltmanZScore),
            "Fundamentals computed"
        );
        security
    }

    fn copy_snapshot(&self, security: &mut Security, snap: &FundamentalSnapshot, last_close: Option<f64>) {
        security.set(Metric::ForwardPe, snap.forward_pe);
        security.set(Metric::PegRatio, snap.peg_ratio);
        security.set(Metric::EvToEbitda, snap.ev_to_ebitda);
        security.set(Metric::RevenueGrowth, snap.revenue_growth);
        security.set(Metric::EarningsGrowth, snap.earnings_growth);
        security.set(Metric::Roe, snap.roe);
        security.set(Metric::Roa, snap.roa);
        security.set(Metric::DebtToEquity, snap.debt_to_equity);
        security.set(Metric::CurrentRatio, snap.current_ratio);
        security.set(Metric::FreeCashflow, snap.free_cashflow);
        security.set(Metric::ShortInterestPct, snap.short_interest_pct);
        security.set(Metric::ShortRatio, snap.short_ratio);
        security.set(Metric::InsiderOwnership, snap.insider_ownership);
        security.set(Metric::DividendYield, snap.dividend_yield);
        security.set(Metric::BookValue, snap.book_value);
        security.set(Metric::PriceToBook, snap.price_to_book);
        security.set(Metric::AnalystTarget, snap.analyst_target);
        security.set(Metric::AnalystRec, snap.analyst_rec);
        security.set(Metric::High52w, snap.high_52w);
        security.set(Metric::Low52w, snap.low_52w);
        security.set(Metric::Top10InstitutionalPct, snap.top10_institutional_pct);

        let price = snap.current_price.or(last_close);
        let vs_high = match (price, snap.high_52w) {
            (Some(p), Some(high)) if high > 0.0 => Some((p - high) / high),
            _ => None,
        };
        security.set(Metric::PriceVs52wHigh, vs_high);
    }
}

impl Default for FundamentalAnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}

pub const FUNDAMENTAL_WEIGHTS: [WeightedMetric; 9] = [
    WeightedMetric::high(Metric::SharpeRatio, 25.0),
    WeightedMetric::high(Metric::Roe, 15.0),
    WeightedMetric::high(Metric::RevenueGrowth, 15.0),
    WeightedMetric::high(Metric::EarningsGrowth, 10.0),
    WeightedMetric::high(Metric::FreeCashflow, 10.0),
    WeightedMetric::low(Metric::PegRatio, 10.0),
    WeightedMetric::low(Metric::EvToEbitda, 10.0),
    WeightedMetric::low(Metric::DebtToEquity, 3.0),
    // drawdowns are negative, so a higher rank is a shallower fall
    WeightedMetric::high(Metric::MaxDrawdown, 2.0),
];

const FUNDAMENTAL_INPUTS: [Metric; 9] = [
    Metric::SharpeRatio,
    Metric::Roe,
    Metric::RevenueGrowth,
    Metric::EarningsGrowth,
    Metric::FreeCashflow,
    Metric::PegRatio,
    Metric::EvToEbitda,
    Metric::DebtToEquity,
    Metric::MaxDrawdown,
];

/// Writes `Fundamental_Score`.
pub struct FundamentalScorer;

impl UniverseScorer for FundamentalScorer {
    fn score_metric(&self) -> Metric {
        Metric::FundamentalScore
    }

    fn imputed_metrics(&self) -> &[Metric] {
        &FUNDAMENTAL_INPUTS
    }

    fn composite(&self, universe: &Universe) -> Vec<f64> {
        universe.composite_score(&FUNDAMENTAL_WEIGHTS)
    }
}

/// Graham-style valuation of one security from its snapshot.
pub struct DeepValueEngine {
    risk_free_rate: f64,
}

impl DeepValueEngine {
    pub fn new() -> Self {
        Self::with_risk_free_rate(DEFAULT_DEEP_VALUE_RISK_FREE_RATE)
    }

    pub fn with_risk_free_rate(risk_free_rate: f64) -> Self {
        Self { risk_free_rate }
    }

    pub fn analyze(&self, ticker: &str, snapshot: Option<&FundamentalSnapshot>, last_close: Option<f64>) -> Security {
        let mut security = Security::new(ticker);
        let Some(snap) = snapshot else {
            return security;
        };

        let price = snap.current_price.or(last_close);
        let growth = snap.earnings_growth.unwrap_or(deep_value::DEFAULT_GROWTH);
        let iv = intrinsic_value(snap.eps, Some(growth), self.risk_free_rate);
        let mos = margin_of_safety(iv, price);

        security.set(Metric::CurrentPrice, price);
        security.set(Metric::Eps, snap.eps);
        security.set(Metric::GrowthRate, Some(growth));
        security.set(Metric::IntrinsicValue, iv);
        security.set(Metric::MarginOfSafety, mos);
        security.set(Metric::InsiderOwnership, snap.insider_ownership);
        security.set(Metric::InstitutionalOwnership, snap.institutional_ownership);
        security.set(Metric::FreeCashflow, snap.free_cashflow);
        security.set(Metric::Roe, snap.roe);
        security.set(Metric::DebtToEquity, snap.debt_to_equity);
        security
    }
}

impl Default for DeepValueEngine {
    fn default() -> Self {
        Self::new()
    }
}

pub const DEEP_VALUE_WEIGHTS: [WeightedMetric; 6] = [
    WeightedMetric::high(Metric::MarginOfSafety, 35.0),
    WeightedMetric::high(Metric::InstitutionalOwnership, 20.0),
    WeightedMetric::high(Metric::InsiderOwnership, 10.0),
    WeightedMetric::high(Metric::FreeCashflow, 15.0),
    WeightedMetric::high(Metric::Roe, 10.0),
    WeightedMetric::low(Metric::DebtToEquity, 10.0),
];

const DEEP_VALUE_INPUTS: [Metric; 6] = [
    Metric::MarginOfSafety,
    Metric::InstitutionalOwnership,
    Metric::InsiderOwnership,
    Metric::FreeCashflow,
    Metric::Roe,
    Metric::DebtToEquity,
];

/// Writes `Deep_Value_Score`.
pub struct DeepValueScorer;

impl UniverseScorer for DeepValueScorer {
    fn score_metric(&self) -> Metric {
        Metric::DeepValueScore
    }

    fn imputed_metrics(&self) -> &[Metric] {
        &DEEP_VALUE_INPUTS
    }

    fn composite(&self, universe: &Universe) -> Vec<f64> {
        universe.composite_score(&DEEP_VALUE_WEIGHTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn bars(n: usize) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.05;
                Bar {
                    timestamp: start + Duration::days(i as i64),
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000_000.0,
                }
            })
            .collect()
    }

    #[test]
    fn test_weights_sum_to_hundred() {
        let fundamental: f64 = FUNDAMENTAL_WEIGHTS.iter().map(|w| w.weight).sum();
        let deep: f64 = DEEP_VALUE_WEIGHTS.iter().map(|w| w.weight).sum();
        assert_relative_eq!(fundamental, 100.0);
        assert_relative_eq!(deep, 100.0);
    }

    #[test]
    fn test_analyze_without_snapshot() {
        let engine = FundamentalAnalysisEngine::new();
        let security = engine.analyze("AAA", None, &bars(300), None);
        assert!(security.has(Metric::SharpeRatio));
        assert!(security.has(Metric::Momentum1Y));
        assert_eq!(security.get(Metric::PiotroskiFScore), Some(0.0));
        assert!(!security.has(Metric::AltmanZScore));
        assert!(!security.has(Metric::Roe));
    }

    #[test]
    fn test_price_vs_52w_high() {
        let engine = FundamentalAnalysisEngine::new();
        let snapshot = FundamentalSnapshot {
            ticker: "AAA".to_string(),
            current_price: Some(90.0),
            high_52w: Some(120.0),
            ..Default::default()
        };
        let security = engine.analyze("AAA", Some(&snapshot), &bars(10), None);
        assert_relative_eq!(security.get(Metric::PriceVs52wHigh).unwrap(), -0.25);
        assert!(!security.has(Metric::SharpeRatio));
    }

    #[test]
    fn test_deep_value_engine() {
        let engine = DeepValueEngine::with_risk_free_rate(0.04);
        let snapshot = FundamentalSnapshot {
            ticker: "VAL".to_string(),
            eps: Some(5.0),
            earnings_growth: Some(0.10),
            current_price: Some(100.0),
            ..Default::default()
        };
        let security = engine.analyze("VAL", Some(&snapshot), None);
        assert_relative_eq!(security.get(Metric::IntrinsicValue).unwrap(), 156.75, epsilon = 1e-9);
        assert_relative_eq!(security.get(Metric::MarginOfSafety).unwrap(), 0.3621, epsilon = 1e-4);
    }

    #[test]
    fn test_scorers_rank_universe() {
        let mut universe = Universe::from_securities(vec![
            Security::new("CHEAP")
                .with(Metric::MarginOfSafety, 0.5)
                .with(Metric::InstitutionalOwnership, 0.8)
                .with(Metric::Roe, 0.3)
                .with(Metric::DebtToEquity, 0.2),
            Security::new("RICH")
                .with(Metric::MarginOfSafety, -0.4)
                .with(Metric::InstitutionalOwnership, 0.1)
                .with(Metric::Roe, 0.05)
                .with(Metric::DebtToEquity, 2.5),
            Security::new("BLANK"),
        ]);
        DeepValueScorer.score(&mut universe);
        let cheap = universe.get("CHEAP").unwrap().get(Metric::DeepValueScore).unwrap();
        let rich = universe.get("RICH").unwrap().get(Metric::DeepValueScore).unwrap();
        assert!(cheap > rich);
        assert!((0.0..=100.0).contains(&cheap));
        // imputation gives the blank record the median of the others
        assert!(universe.get("BLANK").unwrap().has(Metric::MarginOfSafety));
    }
}
