use analysis_core::Security;
use kelly_position_sizer::{Horizon, PositionSize};
use serde::Serialize;

/// One selected security with its bucket-local score and allocation.
#[derive(Debug, Clone, Serialize)]
pub struct Holding {
    pub security: Security,
    pub bucket_score: Option<f64>,
    pub position: PositionSize,
}

impl Holding {
    pub fn ticker(&self) -> &str {
        &self.security.ticker
    }

    pub fn position_pct(&self) -> f64 {
        self.position.position_pct
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Bucket {
    pub horizon: Horizon,
    /// Tier that admitted the candidates, when the bucket uses tiers.
    pub tier: Option<usize>,
    pub holdings: Vec<Holding>,
}

impl Bucket {
    pub fn tickers(&self) -> Vec<&str> {
        self.holdings.iter().map(Holding::ticker).collect()
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Portfolios {
    pub short: Bucket,
    pub medium: Bucket,
    pub long: Bucket,
}

impl Portfolios {
    /// Buckets in selection order.
    pub fn buckets(&self) -> [&Bucket; 3] {
        [&self.short, &self.medium, &self.long]
    }
}
