//! Cross-sectional percentile scoring.
//!
//! Every composite score in the pipeline is a weighted sum of percentile ranks
//! computed here. A missing value always ranks 0.0, in both directions, so a
//! security can never gain points from data it does not have.

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Compute sample standard deviation.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    variance.sqrt()
}

/// Population standard deviation (divides by n).
pub fn population_std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    (data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
}

/// Median of the finite values, `None` when there are none.
pub fn median(data: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Percentile with linear interpolation between closest ranks (`pct` in 0-100).
pub fn percentile_linear(data: &[f64], pct: f64) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let pos = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Fractional ranks of `values`, aligned with the input.
///
/// Present values are ranked ascending, ties share their average rank, and the
/// result is divided by the number of present values so the maximum maps to
/// 1.0. With `invert` the rank becomes `1 - rank`. Missing (or non-finite)
/// values get 0.0.
pub fn percentile_ranks(values: &[Option<f64>], invert: bool) -> Vec<f64> {
    let mut present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.filter(|x| x.is_finite()).map(|x| (i, x)))
        .collect();
    let mut ranks = vec![0.0; values.len()];
    if present.is_empty() {
        return ranks;
    }
    present.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let n = present.len() as f64;
    let mut start = 0;
    while start < present.len() {
        let mut end = start + 1;
        while end < present.len() && present[end].1 == present[start].1 {
            end += 1;
        }
        // 1-based ranks start+1 ..= end share their mean.
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let pct = avg_rank / n;
        for &(idx, _) in &present[start..end] {
            ranks[idx] = if invert { 1.0 - pct } else { pct };
        }
        start = end;
    }
    ranks
}

/// Keyed form of [`percentile_ranks`].
pub fn rank(values: &BTreeMap<String, Option<f64>>, invert: bool) -> BTreeMap<String, f64> {
    let ordered: Vec<Option<f64>> = values.values().copied().collect();
    values
        .keys()
        .cloned()
        .zip(percentile_ranks(&ordered, invert))
        .collect()
}

/// Clamp a combined score into the 0-100 band.
pub fn clip_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}

/// One weighted term of a composite: a rank vector and its weight (points).
pub struct Component {
    pub ranks: Vec<f64>,
    pub weight: f64,
}

impl Component {
    pub fn new(ranks: Vec<f64>, weight: f64) -> Self {
        Self { ranks, weight }
    }
}

/// Linear weighted sum of rank vectors, clipped to [0, 100].
pub fn weighted_composite(len: usize, components: &[Component]) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let raw: f64 = components
                .iter()
                .map(|c| c.ranks.get(i).copied().unwrap_or(0.0) * c.weight)
                .sum();
            clip_score(raw)
        })
        .collect()
}
