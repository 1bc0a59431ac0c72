use crate::percentile::{median, percentile_ranks, weighted_composite, Component};
use crate::types::{Metric, Security};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// One term of a percentile composite: the metric, its direction and its
/// weight in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedMetric {
    pub metric: Metric,
    pub invert: bool,
    pub weight: f64,
}

impl WeightedMetric {
    pub const fn high(metric: Metric, weight: f64) -> Self {
        Self { metric, invert: false, weight }
    }

    pub const fn low(metric: Metric, weight: f64) -> Self {
        Self { metric, invert: true, weight }
    }
}

/// Ordered, ticker-unique collection of securities for one pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct Universe {
    securities: Vec<Security>,
    index: HashMap<String, usize>,
}

impl Universe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a universe, keeping the first record of any repeated ticker.
    pub fn from_securities(securities: impl IntoIterator<Item = Security>) -> Self {
        let mut universe = Self::new();
        for security in securities {
            universe.push(security);
        }
        universe
    }

    /// Appends a security. Returns false (and keeps the existing record) when
    /// the ticker is already present.
    pub fn push(&mut self, security: Security) -> bool {
        if self.index.contains_key(&security.ticker) {
            warn!(ticker = %security.ticker, "Duplicate ticker dropped, keeping first record");
            return false;
        }
        self.index
            .insert(security.ticker.clone(), self.securities.len());
        self.securities.push(security);
        true
    }

    pub fn len(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Security> {
        self.securities.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Security> {
        self.securities.iter_mut()
    }

    pub fn securities(&self) -> &[Security] {
        &self.securities
    }

    pub fn get(&self, ticker: &str) -> Option<&Security> {
        self.index.get(ticker).map(|&i| &self.securities[i])
    }

    pub fn get_mut(&mut self, ticker: &str) -> Option<&mut Security> {
        match self.index.get(ticker) {
            Some(&i) => self.securities.get_mut(i),
            None => None,
        }
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.index.contains_key(ticker)
    }

    pub fn tickers(&self) -> Vec<String> {
        self.securities.iter().map(|s| s.ticker.clone()).collect()
    }

    /// One metric's values, aligned with iteration order.
    pub fn values(&self, metric: Metric) -> Vec<Option<f64>> {
        self.securities.iter().map(|s| s.get(metric)).collect()
    }

    /// Percentile rank of every security on `metric`, aligned with iteration
    /// order.
    pub fn percentile(&self, metric: Metric, invert: bool) -> Vec<f64> {
        percentile_ranks(&self.values(metric), invert)
    }

    /// Weighted sum of percentile ranks, clipped to [0, 100], aligned with
    /// iteration order.
    pub fn composite_score(&self, weights: &[WeightedMetric]) -> Vec<f64> {
        let components: Vec<Component> = weights
            .iter()
            .map(|w| Component::new(self.percentile(w.metric, w.invert), w.weight))
            .collect();
        weighted_composite(self.len(), &components)
    }

    /// Writes one value per security, aligned with iteration order.
    pub fn assign(&mut self, metric: Metric, values: &[f64]) {
        for (security, value) in self.securities.iter_mut().zip(values) {
            security.set(metric, Some(*value));
        }
    }

    /// Folds a later stage into this one by ticker. Tickers the later stage
    /// knows but this universe does not are ignored.
    pub fn merge_stage(&mut self, stage: &Universe) {
        let mut merged = 0usize;
        for later in stage.iter() {
            match self.get_mut(&later.ticker) {
                Some(current) => {
                    current.merge_from(later);
                    merged += 1;
                }
                None => debug!(ticker = %later.ticker, "Stage record has no base record"),
            }
        }
        debug!(merged, stage_size = stage.len(), "Merged stage");
    }

    /// Applies [`Metric::default_value`] and text defaults to every record.
    pub fn apply_defaults(&mut self) {
        for security in &mut self.securities {
            security.apply_defaults();
        }
    }

    /// Replaces missing values of each metric with the cross-sectional median
    /// of the present ones. Metrics with no present value stay missing.
    pub fn impute_medians(&mut self, metrics: &[Metric]) {
        for &metric in metrics {
            let present: Vec<f64> = self.securities.iter().filter_map(|s| s.get(metric)).collect();
            let Some(fill) = median(&present) else {
                continue;
            };
            let mut filled = 0usize;
            for security in &mut self.securities {
                if !security.has(metric) {
                    security.set(metric, Some(fill));
                    filled += 1;
                }
            }
            if filled > 0 {
                debug!(metric = metric.name(), filled, median = fill, "Imputed missing values");
            }
        }
    }

    /// Stable sort, highest value first, missing values last.
    pub fn sort_by_metric_desc(&mut self, metric: Metric) {
        self.securities
            .sort_by(|a, b| compare_desc_missing_last(a.get(metric), b.get(metric)));
        self.reindex();
    }

    /// The `n` highest securities on `metric` (missing last), as a new universe.
    pub fn top_n_by(&self, metric: Metric, n: usize) -> Universe {
        let mut sorted = self.clone();
        sorted.sort_by_metric_desc(metric);
        Universe::from_securities(sorted.securities.into_iter().take(n))
    }

    pub fn filter<F>(&self, mut keep: F) -> Universe
    where
        F: FnMut(&Security) -> bool,
    {
        Universe::from_securities(self.securities.iter().filter(|s| keep(s)).cloned())
    }

    /// Every security whose ticker is not in `taken`.
    pub fn excluding(&self, taken: &BTreeSet<String>) -> Universe {
        self.filter(|s| !taken.contains(&s.ticker))
    }

    fn reindex(&mut self) {
        self.index = self
            .securities
            .iter()
            .enumerate()
            .map(|(i, s)| (s.ticker.clone(), i))
            .collect();
    }
}

impl FromIterator<Security> for Universe {
    fn from_iter<I: IntoIterator<Item = Security>>(iter: I) -> Self {
        Universe::from_securities(iter)
    }
}

/// Descending order with missing values after every present one.
pub fn compare_desc_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
