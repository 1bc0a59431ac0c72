use anyhow::{Context, Result};
use kelly_position_sizer::KellyPositionSizer;
use quant_analysis::PersistenceModel;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    // Fundamentals
    pub risk_free_rate: f64,                // 0.04
    pub deep_value_risk_free_rate: f64,     // 0.0409 (AAA corporate yield)

    // Quant stage
    pub quant_top_n: usize,                 // 100 best technical setups
    pub var_seed: u64,                      // 42
    pub var_paths: usize,                   // 1000
    pub persistence_model: PersistenceModel, // rescaled_range, lag dispersion fallback

    // Portfolio
    pub bucket_size: usize,                 // 5 per horizon
    pub event_pool_size: usize,             // 50 event-driven short candidates
    pub kelly_multiplier: f64,              // 0.5 (half-Kelly)
    pub min_position_pct: f64,              // 1%
    pub max_position_pct: f64,              // 25%
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.04,
            deep_value_risk_free_rate: 0.0409,
            quant_top_n: 100,
            var_seed: 42,
            var_paths: 1000,
            persistence_model: PersistenceModel::default(),
            bucket_size: 5,
            event_pool_size: 50,
            kelly_multiplier: 0.5,
            min_position_pct: 1.0,
            max_position_pct: 25.0,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl ScreenerConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            risk_free_rate: env_or("SCREENER_RISK_FREE_RATE", defaults.risk_free_rate)?,
            deep_value_risk_free_rate: env_or(
                "SCREENER_DEEP_VALUE_RISK_FREE_RATE",
                defaults.deep_value_risk_free_rate,
            )?,
            quant_top_n: env_or("SCREENER_QUANT_TOP_N", defaults.quant_top_n)?,
            var_seed: env_or("SCREENER_VAR_SEED", defaults.var_seed)?,
            var_paths: env_or("SCREENER_VAR_PATHS", defaults.var_paths)?,
            persistence_model: env_or("SCREENER_PERSISTENCE", defaults.persistence_model)?,
            bucket_size: env_or("SCREENER_BUCKET_SIZE", defaults.bucket_size)?,
            event_pool_size: env_or("SCREENER_EVENT_POOL_SIZE", defaults.event_pool_size)?,
            kelly_multiplier: env_or("SCREENER_KELLY_MULTIPLIER", defaults.kelly_multiplier)?,
            min_position_pct: env_or("SCREENER_MIN_POSITION_PCT", defaults.min_position_pct)?,
            max_position_pct: env_or("SCREENER_MAX_POSITION_PCT", defaults.max_position_pct)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.var_paths == 0 {
            anyhow::bail!("SCREENER_VAR_PATHS must be at least 1");
        }
        if self.bucket_size == 0 {
            anyhow::bail!("SCREENER_BUCKET_SIZE must be at least 1");
        }
        if !self.risk_free_rate.is_finite() || !self.deep_value_risk_free_rate.is_finite() {
            anyhow::bail!("risk-free rates must be finite");
        }
        self.position_sizer()?;
        Ok(())
    }

    /// Kelly sizer with the configured multiplier and position band.
    pub fn position_sizer(&self) -> Result<KellyPositionSizer> {
        let defaults = KellyPositionSizer::default();
        KellyPositionSizer::new(
            self.kelly_multiplier,
            self.min_position_pct,
            self.max_position_pct,
            defaults.fallback_pct.min(self.max_position_pct),
            defaults.score_sensitivity,
        )
        .context("invalid position sizing configuration")
    }
}
