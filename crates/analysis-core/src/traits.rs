use crate::types::Metric;
use crate::universe::Universe;

/// A cross-sectional scoring stage.
///
/// Implementors say which metric they write, which inputs get median-imputed
/// first, and how to combine the universe into one score per security.
pub trait UniverseScorer {
    fn score_metric(&self) -> Metric;

    fn imputed_metrics(&self) -> &[Metric];

    /// Scores aligned with the universe's iteration order, each in [0, 100].
    fn composite(&self, universe: &Universe) -> Vec<f64>;

    fn score(&self, universe: &mut Universe) {
        if universe.is_empty() {
            return;
        }
        universe.impute_medians(self.imputed_metrics());
        let scores = self.composite(universe);
        universe.assign(self.score_metric(), &scores);
    }
}
