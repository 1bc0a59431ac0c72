use analysis_core::{Metric, Security, Universe};
use portfolio_allocator::{AllocationError, PortfolioAllocator};
use std::collections::BTreeSet;

fn scored(i: usize) -> Security {
    let x = i as f64;
    Security::new(format!("T{i:02}"))
        .with(Metric::RelativeVolume, 1.0 + (i % 7) as f64 * 0.3)
        .with(Metric::Momentum1M, (i % 5) as f64 - 2.0)
        .with(Metric::ShortInterestPct, 0.01 * (i % 9) as f64)
        .with(Metric::Atr14, 1.0 + (i % 4) as f64)
        .with(Metric::HurstExponent, 0.40 + 0.01 * (i % 20) as f64)
        .with(Metric::LastPrice, 100.0 + x)
        .with(Metric::Sma200, 95.0 + 2.0 * (i % 6) as f64)
        .with(Metric::Top10InstitutionalPct, 0.05 * (i % 8) as f64)
        .with(Metric::RsVsBenchmark, 0.02 * (i % 11) as f64 - 0.1)
        .with(Metric::QuantRiskScore, (i * 13 % 100) as f64)
        .with(Metric::MarginOfSafety, 0.05 * (i % 10) as f64 - 0.1)
        .with(Metric::DeepValueScore, (i * 17 % 100) as f64)
        .with(Metric::PiotroskiFScore, (i % 10) as f64)
        .with(Metric::AltmanZScore, 1.0 + 0.25 * (i % 12) as f64)
        .with(Metric::FundamentalScore, (i * 7 % 100) as f64)
}

fn all_tickers(universe_size: usize) -> (Universe, Vec<Vec<String>>) {
    let universe: Universe = (0..universe_size).map(scored).collect();
    let portfolios = PortfolioAllocator::new().partition(&universe).unwrap();
    let buckets = portfolios
        .buckets()
        .iter()
        .map(|b| b.tickers().into_iter().map(String::from).collect())
        .collect();
    (universe, buckets)
}

#[test]
fn buckets_are_disjoint_for_any_size() {
    for size in [1, 4, 5, 9, 14, 15, 16, 40] {
        let (_, buckets) = all_tickers(size);
        let mut seen = BTreeSet::new();
        for bucket in &buckets {
            assert!(bucket.len() <= 5);
            for ticker in bucket {
                assert!(seen.insert(ticker.clone()), "{ticker} selected twice (size {size})");
            }
        }
        assert_eq!(seen.len(), size.min(15));
    }
}

#[test]
fn universe_of_five_fills_short_first() {
    let (_, buckets) = all_tickers(5);
    assert_eq!(buckets[0].len(), 5);
    assert!(buckets[1].is_empty());
    assert!(buckets[2].is_empty());
}

#[test]
fn allocations_stay_in_band() {
    let universe: Universe = (0..30).map(scored).collect();
    let portfolios = PortfolioAllocator::new().partition(&universe).unwrap();
    for bucket in portfolios.buckets() {
        for holding in &bucket.holdings {
            let pct = holding.position_pct();
            assert!((1.0..=25.0).contains(&pct), "{} got {pct}", holding.ticker());
        }
    }
}

#[test]
fn long_bucket_respects_admitting_tier() {
    let universe: Universe = (0..40).map(scored).collect();
    let portfolios = PortfolioAllocator::new().partition(&universe).unwrap();
    if let Some(tier) = portfolios.long.tier {
        let rule = &portfolio_allocator::LONG_TIERS[tier];
        for holding in &portfolios.long.holdings {
            assert!(portfolio_allocator::TierRule::admits(rule, &holding.security));
        }
    }
}

#[test]
fn empty_universe_is_rejected() {
    let err = PortfolioAllocator::new().partition(&Universe::new()).unwrap_err();
    assert_eq!(err, AllocationError::EmptyUniverse);
    assert_eq!(err.to_string(), "Cannot build portfolios from an empty universe");
}
