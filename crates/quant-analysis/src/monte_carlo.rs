use analysis_core::percentile::percentile_linear;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use statrs::distribution::Normal;
use statrs::statistics::Statistics;

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_PATHS: usize = 1000;
pub const HORIZON_DAYS: usize = 252;
pub const VAR_PERCENTILE: f64 = 5.0;

/// One-year 95% value-at-risk by simulating i.i.d. normal log-return paths.
#[derive(Debug, Clone)]
pub struct MonteCarloVar {
    pub paths: usize,
    pub horizon: usize,
    pub seed: u64,
}

impl Default for MonteCarloVar {
    fn default() -> Self {
        Self {
            paths: DEFAULT_PATHS,
            horizon: HORIZON_DAYS,
            seed: DEFAULT_SEED,
        }
    }
}

impl MonteCarloVar {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, ..Self::default() }
    }

    /// Seed owned by one path. Depends only on the run seed and the path
    /// index, so the result does not depend on how rayon splits the work.
    fn path_seed(&self, path: usize) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(&(path as u64).to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Simulated terminal simple returns, one per path, in path order.
    pub fn terminal_returns(&self, mu: f64, sigma: f64) -> Vec<f64> {
        let Ok(normal) = Normal::new(mu, sigma) else {
            return Vec::new();
        };
        (0..self.paths)
            .into_par_iter()
            .map(|path| {
                let mut rng = StdRng::seed_from_u64(self.path_seed(path));
                let total: f64 = (0..self.horizon).map(|_| normal.sample(&mut rng)).sum();
                total.exp() - 1.0
            })
            .collect()
    }

    /// Absolute 5th percentile of the simulated terminal returns. Zero when
    /// the log returns have no dispersion or too few observations.
    pub fn value_at_risk(&self, log_returns: &[f64]) -> f64 {
        if log_returns.len() < 2 || self.paths == 0 {
            return 0.0;
        }
        let mu = log_returns.mean();
        let sigma = log_returns.std_dev();
        if !mu.is_finite() || !sigma.is_finite() || sigma == 0.0 {
            return 0.0;
        }
        let terminal = self.terminal_returns(mu, sigma);
        percentile_linear(&terminal, VAR_PERCENTILE)
            .map(f64::abs)
            .unwrap_or(0.0)
    }
}
