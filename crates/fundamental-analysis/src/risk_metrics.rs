use serde::Serialize;
use statrs::statistics::Statistics;

pub const TRADING_DAYS: f64 = 252.0;

/// Shortest close series the annualized metrics are computed from.
pub const MIN_RISK_OBSERVATIONS: usize = 60;

/// Bars needed for one-year momentum.
pub const MOMENTUM_1Y_BARS: usize = 252;

/// Annualized return, volatility, Sharpe ratio and max drawdown of a close
/// series. Every field is `None` when the history is too short.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RiskMetrics {
    pub ann_return: Option<f64>,
    pub ann_volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
}

/// Simple daily returns. Pairs with a non-positive base are skipped.
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Deepest fall from a running peak, as a non-positive fraction.
pub fn max_drawdown(prices: &[f64]) -> Option<f64> {
    let first = *prices.first()?;
    let mut running_max = first;
    let mut worst = 0.0_f64;
    for &price in prices {
        if price > running_max {
            running_max = price;
        }
        if running_max > 0.0 {
            worst = worst.min((price - running_max) / running_max);
        }
    }
    Some(worst)
}

pub fn risk_metrics(closes: &[f64], risk_free_rate: f64) -> RiskMetrics {
    risk_metrics_with_min(closes, risk_free_rate, MIN_RISK_OBSERVATIONS)
}

/// [`risk_metrics`] with a caller-chosen minimum number of closes.
pub fn risk_metrics_with_min(closes: &[f64], risk_free_rate: f64, min_observations: usize) -> RiskMetrics {
    let closes: Vec<f64> = closes.iter().copied().filter(|c| c.is_finite()).collect();
    if closes.len() < min_observations.max(2) {
        return RiskMetrics::default();
    }

    let returns = simple_returns(&closes);
    if returns.len() < 2 {
        return RiskMetrics::default();
    }

    let mean_return = returns.as_slice().mean();
    let std_dev = returns.as_slice().std_dev();

    let ann_return = (1.0 + mean_return).powf(TRADING_DAYS) - 1.0;
    let ann_volatility = std_dev * TRADING_DAYS.sqrt();
    let sharpe_ratio = if ann_volatility != 0.0 {
        Some((ann_return - risk_free_rate) / ann_volatility)
    } else {
        None
    };

    RiskMetrics {
        ann_return: Some(ann_return).filter(|v| v.is_finite()),
        ann_volatility: Some(ann_volatility).filter(|v| v.is_finite()),
        sharpe_ratio: sharpe_ratio.filter(|v| v.is_finite()),
        max_drawdown: max_drawdown(&closes),
    }
}
