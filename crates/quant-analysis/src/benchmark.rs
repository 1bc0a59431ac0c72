use analysis_core::Bar;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Fewest date-aligned return pairs beta is estimated from.
pub const MIN_BETA_OBSERVATIONS: usize = 30;

/// Run-scoped benchmark series. Daily returns are computed once, on first
/// use, and shared read-only by every security in the run.
#[derive(Debug, Default)]
pub struct BenchmarkContext {
    bars: Vec<Bar>,
    returns: OnceLock<BTreeMap<NaiveDate, f64>>,
}

impl BenchmarkContext {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            returns: OnceLock::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn returns(&self) -> &BTreeMap<NaiveDate, f64> {
        self.returns.get_or_init(|| {
            tracing::debug!(bars = self.bars.len(), "Computing benchmark returns");
            dated_returns(&self.bars)
        })
    }

    /// Covariance of date-aligned daily returns over benchmark variance.
    pub fn beta(&self, bars: &[Bar]) -> Option<f64> {
        let benchmark = self.returns();
        let (stock, bench): (Vec<f64>, Vec<f64>) = dated_returns(bars)
            .into_iter()
            .filter_map(|(date, r)| benchmark.get(&date).map(|b| (r, *b)))
            .unzip();
        if stock.len() < MIN_BETA_OBSERVATIONS {
            return None;
        }
        covariance_beta(&stock, &bench)
    }

    /// Stock return minus benchmark return between the first and last dates
    /// both series share.
    pub fn relative_strength(&self, bars: &[Bar]) -> Option<f64> {
        let bench_closes: BTreeMap<NaiveDate, f64> =
            self.bars.iter().map(|b| (b.date(), b.close)).collect();
        let common: Vec<(f64, f64)> = bars
            .iter()
            .filter_map(|b| bench_closes.get(&b.date()).map(|c| (b.close, *c)))
            .collect();
        if common.len() < 2 {
            return None;
        }
        let (stock_start, bench_start) = common[0];
        let (stock_end, bench_end) = common[common.len() - 1];
        if stock_start <= 0.0 || bench_start <= 0.0 {
            return None;
        }
        Some((stock_end / stock_start - 1.0) - (bench_end / bench_start - 1.0))
    }
}

/// Simple daily returns keyed by the date of the later bar.
pub fn dated_returns(bars: &[Bar]) -> BTreeMap<NaiveDate, f64> {
    bars.windows(2)
        .filter(|w| w[0].close > 0.0)
        .map(|w| (w[1].date(), (w[1].close - w[0].close) / w[0].close))
        .filter(|(_, r)| r.is_finite())
        .collect()
}

pub fn covariance_beta(stock: &[f64], bench: &[f64]) -> Option<f64> {
    let n = stock.len().min(bench.len());
    if n < 2 {
        return None;
    }

    let stock_mean = stock[..n].iter().sum::<f64>() / n as f64;
    let bench_mean = bench[..n].iter().sum::<f64>() / n as f64;

    let mut covariance = 0.0;
    let mut bench_variance = 0.0;

    for i in 0..n {
        let stock_diff = stock[i] - stock_mean;
        let bench_diff = bench[i] - bench_mean;
        covariance += stock_diff * bench_diff;
        bench_variance += bench_diff * bench_diff;
    }

    if bench_variance == 0.0 {
        return None;
    }

    Some(covariance / bench_variance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from(closes: &[f64], offset_days: i64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: start + Duration::days(i as i64 + offset_days),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1_000.0,
            })
            .collect()
    }

    fn wavy(n: usize, amplitude: f64) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 * (1.0 + amplitude * ((i as f64) * 0.9).sin()))
            .collect()
    }

    #[test]
    fn test_beta_of_benchmark_is_one() {
        let closes = wavy(60, 0.02);
        let ctx = BenchmarkContext::new(bars_from(&closes, 0));
        assert_relative_eq!(ctx.beta(&bars_from(&closes, 0)).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_beta_needs_overlap() {
        let closes = wavy(60, 0.02);
        let ctx = BenchmarkContext::new(bars_from(&closes, 0));
        // only 20 shared dates
        assert_eq!(ctx.beta(&bars_from(&closes, 40)), None);
        assert_eq!(BenchmarkContext::empty().beta(&bars_from(&closes, 0)), None);
    }

    #[test]
    fn test_flat_benchmark_has_no_beta() {
        let ctx = BenchmarkContext::new(bars_from(&[100.0; 60], 0));
        assert_eq!(ctx.beta(&bars_from(&wavy(60, 0.02), 0)), None);
    }

    #[test]
    fn test_relative_strength() {
        let bench: Vec<f64> = (0..50).map(|i| 100.0 + i as f64 * 0.2).collect();
        let stock: Vec<f64> = (0..50).map(|i| 50.0 + i as f64).collect();
        let ctx = BenchmarkContext::new(bars_from(&bench, 0));
        let rs = ctx.relative_strength(&bars_from(&stock, 0)).unwrap();
        // stock 50 -> 99, benchmark 100 -> 109.8
        assert_relative_eq!(rs, (99.0 / 50.0 - 1.0) - (109.8 / 100.0 - 1.0), epsilon = 1e-9);
        assert_eq!(BenchmarkContext::empty().relative_strength(&bars_from(&stock, 0)), None);
    }

    #[test]
    fn test_returns_cached() {
        let ctx = BenchmarkContext::new(bars_from(&wavy(10, 0.01), 0));
        let first = ctx.returns() as *const _;
        let second = ctx.returns() as *const _;
        assert_eq!(first, second);
        assert_eq!(ctx.returns().len(), 9);
    }
}
