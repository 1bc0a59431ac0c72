pub mod conviction;
pub mod error;
pub mod event;
pub mod models;
pub mod tiers;

use analysis_core::percentile::percentile_ranks;
use analysis_core::{compare_desc_missing_last, Metric, Security, Universe};
use kelly_position_sizer::{Horizon, KellyPositionSizer};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

pub use conviction::{conviction_score, ConvictionScorer};
pub use error::AllocationError;
pub use event::{event_candidates, EventScorer, DEFAULT_EVENT_POOL_SIZE, EVENT_WEIGHTS};
pub use models::{Bucket, Holding, Portfolios};
pub use tiers::{
    institutional_of, price_of, select_tier, LongTier, MediumTier, TierRule, TierSelection, LONG_TIERS,
    MEDIUM_TIERS,
};

pub const DEFAULT_BUCKET_SIZE: usize = 5;
pub const MIN_TIER_SIZE: usize = 5;

/// Splits a scored universe into disjoint short, medium and long buckets and
/// sizes every holding with fractional Kelly.
pub struct PortfolioAllocator {
    bucket_size: usize,
    min_tier_size: usize,
    event_pool_size: usize,
    sizer: KellyPositionSizer,
}

fn ranks_by<F>(pool: &Universe, value: F) -> Vec<f64>
where
    F: Fn(&Security) -> Option<f64>,
{
    let values: Vec<Option<f64>> = pool.iter().map(value).collect();
    percentile_ranks(&values, false)
}

fn weighted(terms: &[(Vec<f64>, f64)], len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| terms.iter().map(|(ranks, weight)| ranks[i] * weight).sum())
        .collect()
}

impl PortfolioAllocator {
    pub fn new() -> Self {
        Self::with_sizer(DEFAULT_BUCKET_SIZE, KellyPositionSizer::default())
    }

    pub fn with_sizer(bucket_size: usize, sizer: KellyPositionSizer) -> Self {
        Self {
            bucket_size,
            min_tier_size: MIN_TIER_SIZE,
            event_pool_size: DEFAULT_EVENT_POOL_SIZE,
            sizer,
        }
    }

    pub fn with_event_pool_size(mut self, event_pool_size: usize) -> Self {
        self.event_pool_size = event_pool_size;
        self
    }

    /// [`Self::partition_with_narratives`] with no narrative coverage.
    pub fn partition(&self, universe: &Universe) -> Result<Portfolios, AllocationError> {
        self.partition_with_narratives(universe, &BTreeSet::new())
    }

    /// Short, then medium, then long. Each later bucket only sees tickers
    /// the earlier ones did not take. `narratives` are the tickers the
    /// narrative feed covered; they join the event candidates in the short
    /// pool.
    pub fn partition_with_narratives(
        &self,
        universe: &Universe,
        narratives: &BTreeSet<String>,
    ) -> Result<Portfolios, AllocationError> {
        if universe.is_empty() {
            return Err(AllocationError::EmptyUniverse);
        }

        let mut taken = BTreeSet::new();

        let short = self.short_bucket(&self.short_pool(universe, narratives));
        taken.extend(short.tickers().into_iter().map(String::from));

        let medium = self.medium_bucket(&universe.excluding(&taken));
        taken.extend(medium.tickers().into_iter().map(String::from));

        let long = self.long_bucket(&universe.excluding(&taken));

        for bucket in [&short, &medium, &long] {
            if bucket.len() < self.bucket_size {
                warn!(
                    horizon = bucket.horizon.name(),
                    selected = bucket.len(),
                    wanted = self.bucket_size,
                    "Bucket under-filled"
                );
            }
            info!(
                horizon = bucket.horizon.name(),
                tier = ?bucket.tier,
                tickers = ?bucket.tickers(),
                "Bucket selected"
            );
        }

        Ok(Portfolios { short, medium, long })
    }

    /// Event candidates plus narrative-covered tickers. When that pool
    /// cannot fill a bucket the whole universe is used instead.
    pub fn short_pool(&self, universe: &Universe, narratives: &BTreeSet<String>) -> Universe {
        let mut pool = event_candidates(universe, self.event_pool_size);
        let events = pool.len();
        pool.extend(narratives.iter().filter(|t| universe.contains(t)).cloned());

        if pool.len() < self.bucket_size {
            debug!(
                candidates = pool.len(),
                wanted = self.bucket_size,
                "Short pool too small, using the whole universe"
            );
            return universe.clone();
        }
        debug!(events, candidates = pool.len(), "Short pool built");
        universe.filter(|s| pool.contains(&s.ticker))
    }

    /// Liquidity surge, one-month momentum, squeeze potential and range.
    /// Ties go to the stronger narrative, then the ticker.
    pub fn short_bucket(&self, pool: &Universe) -> Bucket {
        let scores = weighted(
            &[
                (ranks_by(pool, |s| s.get(Metric::RelativeVolume)), 30.0),
                (ranks_by(pool, |s| s.get(Metric::Momentum1M)), 25.0),
                (ranks_by(pool, |s| s.get(Metric::ShortInterestPct)), 25.0),
                (ranks_by(pool, |s| s.get(Metric::Atr14)), 20.0),
            ],
            pool.len(),
        );

        let mut ranked: Vec<(&Security, f64)> = pool.iter().zip(scores).collect();
        ranked.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    compare_desc_missing_last(a.get(Metric::NarrativeScore), b.get(Metric::NarrativeScore))
                })
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        self.build_bucket(Horizon::Short, None, ranked, Metric::NarrativeScore)
    }

    /// Persistent trends above the 200-day average with institutional
    /// sponsorship, relaxed through [`MEDIUM_TIERS`].
    pub fn medium_bucket(&self, pool: &Universe) -> Bucket {
        let selection = select_tier(pool, &MEDIUM_TIERS, self.min_tier_size);
        let candidates = &selection.candidates;

        let scores = weighted(
            &[
                (ranks_by(candidates, |s| s.get(Metric::HurstExponent)), 35.0),
                (ranks_by(candidates, institutional_of), 30.0),
                (ranks_by(candidates, |s| s.get(Metric::RsVsBenchmark)), 20.0),
                (ranks_by(candidates, |s| s.get(Metric::QuantRiskScore)), 15.0),
            ],
            candidates.len(),
        );

        let mut ranked: Vec<(&Security, f64)> = candidates.iter().zip(scores).collect();
        ranked.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        self.build_bucket(Horizon::Medium, selection.tier, ranked, Metric::QuantRiskScore)
    }

    /// Cheap, solvent, high-quality names, relaxed through [`LONG_TIERS`].
    /// Ordered by margin of safety, then deep-value and fundamental score.
    pub fn long_bucket(&self, pool: &Universe) -> Bucket {
        let selection = select_tier(pool, &LONG_TIERS, self.min_tier_size);

        let mut ranked: Vec<&Security> = selection.candidates.iter().collect();
        ranked.sort_by(|a, b| {
            [Metric::MarginOfSafety, Metric::DeepValueScore, Metric::FundamentalScore]
                .iter()
                .map(|m| compare_desc_missing_last(a.get(*m), b.get(*m)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        let ranked: Vec<(&Security, f64)> = ranked
            .into_iter()
            .map(|s| (s, s.get(Metric::MarginOfSafety).unwrap_or(f64::NAN)))
            .collect();
        self.build_bucket(Horizon::Long, selection.tier, ranked, Metric::DeepValueScore)
    }

    fn build_bucket(
        &self,
        horizon: Horizon,
        tier: Option<usize>,
        ranked: Vec<(&Security, f64)>,
        sizing_metric: Metric,
    ) -> Bucket {
        let holdings = ranked
            .into_iter()
            .take(self.bucket_size)
            .map(|(security, score)| Holding {
                security: security.clone(),
                bucket_score: Some(score).filter(|s| s.is_finite()),
                position: self.sizer.size(horizon, security.get(sizing_metric)),
            })
            .collect();
        Bucket {
            horizon,
            tier,
            holdings,
        }
    }
}

impl Default for PortfolioAllocator {
    fn default() -> Self {
        Self::new()
    }
}
