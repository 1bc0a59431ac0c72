//! Sequential screening run: each stage is fully materialized, written out
//! and folded into the master universe before the next one starts.

use crate::config::ScreenerConfig;
use crate::data::{DataDir, SignalRow, UniverseRow};
use crate::report::{
    self, RunSummary, StageCounts, CONVICTION_COLUMNS, DEEP_VALUE_COLUMNS, EVENT_COLUMNS, FUNDAMENTAL_COLUMNS,
    QUANT_COLUMNS, TECHNICAL_COLUMNS,
};
use analysis_core::{
    closes, tail, Bar, FinancialStatements, FundamentalSnapshot, Metric, Security, Universe, UniverseScorer,
};
use anyhow::{Context, Result};
use fundamental_analysis::{DeepValueEngine, DeepValueScorer, FundamentalAnalysisEngine, FundamentalScorer};
use portfolio_allocator::{ConvictionScorer, EventScorer, PortfolioAllocator, Portfolios};
use quant_analysis::{BenchmarkContext, MacroTrends, MonteCarloVar, PersistenceChain, QuantAnalysisEngine, QuantScorer};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use technical_analysis::{TechnicalAnalysisEngine, TECHNICAL_METRICS};
use tracing::{info, warn};

/// Three years of daily bars for the fundamental risk metrics.
pub const FUNDAMENTAL_LOOKBACK_BARS: usize = 756;
/// Roughly three months of commodity closes for the macro trend.
pub const COMMODITY_LOOKBACK_BARS: usize = 63;

pub struct Pipeline {
    config: ScreenerConfig,
    data: DataDir,
    output_dir: PathBuf,
}

/// Everything the stages read, loaded once up front.
struct Inputs {
    universe: Vec<UniverseRow>,
    prices: HashMap<String, Vec<Bar>>,
    fundamentals: HashMap<String, FundamentalSnapshot>,
    statements: HashMap<String, FinancialStatements>,
    signals: HashMap<String, SignalRow>,
    benchmark: BenchmarkContext,
    trends: MacroTrends,
}

impl Pipeline {
    pub fn new(config: ScreenerConfig, data_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            data: DataDir::new(data_dir),
            output_dir: output_dir.into(),
        }
    }

    fn output(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    fn load_inputs(&self) -> Result<Inputs> {
        let universe = self.data.load_universe().context("universe.csv is required")?;
        let prices = universe
            .iter()
            .map(|row| (row.ticker.clone(), self.data.load_prices(&row.ticker)))
            .collect();

        let benchmark = self.data.load_benchmark();
        if benchmark.is_empty() {
            warn!("No benchmark series; beta and relative strength will be missing");
        }

        let oil = closes(tail(&self.data.load_commodity("oil"), COMMODITY_LOOKBACK_BARS));
        let gold = closes(tail(&self.data.load_commodity("gold"), COMMODITY_LOOKBACK_BARS));
        let trends = MacroTrends::from_closes(&oil, &gold);
        info!(oil = trends.oil.label(), gold = trends.gold.label(), "Macro trends");

        Ok(Inputs {
            universe,
            prices,
            fundamentals: self.data.load_fundamentals(),
            statements: self.data.load_statements(),
            signals: self.data.load_signals(),
            benchmark: BenchmarkContext::new(benchmark),
            trends,
        })
    }

    pub fn run(&self) -> Result<(Portfolios, RunSummary)> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;

        let inputs = self.load_inputs()?;
        let mut master = base_universe(&inputs.universe);
        attach_signals(&mut master, &inputs.signals);
        info!(securities = master.len(), "Universe loaded");

        let fundamentals = self.fundamental_stage(&inputs)?;
        master.merge_stage(&fundamentals);

        let deep_value = self.deep_value_stage(&inputs)?;
        master.merge_stage(&deep_value);

        let technicals = self.technical_stage(&inputs)?;
        master.merge_stage(&technicals);

        let quant = self.quant_stage(&inputs, &master, &technicals)?;
        master.merge_stage(&quant);

        let events = self.event_stage(&master, &quant)?;
        master.merge_stage(&events);

        master.apply_defaults();
        ConvictionScorer.score(&mut master);
        master.sort_by_metric_desc(Metric::ConvictionScore);
        report::write_stage_table(&self.output("conviction.csv"), &master, CONVICTION_COLUMNS)?;

        let sizer = self.config.position_sizer()?;
        let allocator = PortfolioAllocator::with_sizer(self.config.bucket_size, sizer)
            .with_event_pool_size(self.config.event_pool_size);
        let portfolios = allocator.partition_with_narratives(&master, &narrative_tickers(&inputs.signals))?;
        for bucket in portfolios.buckets() {
            let path = self.output(&format!("portfolio_{}.csv", bucket.horizon.name()));
            report::write_bucket_table(&path, bucket)?;
        }

        let counts = StageCounts {
            universe: master.len(),
            fundamentals: fundamentals.len(),
            deep_value: deep_value.len(),
            technicals: technicals.len(),
            quant: quant.len(),
            events: events.len(),
        };
        let summary = RunSummary::new(self.config.var_seed, inputs.trends, counts, &portfolios);
        summary.write(&self.output("run_summary.json"))?;

        Ok((portfolios, summary))
    }

    fn fundamental_stage(&self, inputs: &Inputs) -> Result<Universe> {
        let engine = FundamentalAnalysisEngine::with_risk_free_rate(self.config.risk_free_rate);
        let mut stage: Universe = inputs
            .universe
            .iter()
            .map(|row| {
                let bars = inputs.prices.get(&row.ticker).map(Vec::as_slice).unwrap_or_default();
                engine.analyze(
                    &row.ticker,
                    inputs.fundamentals.get(&row.ticker),
                    tail(bars, FUNDAMENTAL_LOOKBACK_BARS),
                    inputs.statements.get(&row.ticker),
                )
            })
            .collect();

        FundamentalScorer.score(&mut stage);
        self.finish_stage(&mut stage, Metric::FundamentalScore, "fundamentals_scored.csv", FUNDAMENTAL_COLUMNS)?;
        Ok(stage)
    }

    fn deep_value_stage(&self, inputs: &Inputs) -> Result<Universe> {
        let engine = DeepValueEngine::with_risk_free_rate(self.config.deep_value_risk_free_rate);
        let mut stage: Universe = inputs
            .universe
            .iter()
            .filter_map(|row| {
                let snapshot = inputs.fundamentals.get(&row.ticker)?;
                let last_close = inputs
                    .prices
                    .get(&row.ticker)
                    .and_then(|bars| bars.last())
                    .map(|b| b.close);
                Some(engine.analyze(&row.ticker, Some(snapshot), last_close))
            })
            .collect();

        DeepValueScorer.score(&mut stage);
        self.finish_stage(&mut stage, Metric::DeepValueScore, "deep_valuation.csv", DEEP_VALUE_COLUMNS)?;
        Ok(stage)
    }

    fn technical_stage(&self, inputs: &Inputs) -> Result<Universe> {
        let engine = TechnicalAnalysisEngine::new();
        let mut stage: Universe = inputs
            .universe
            .iter()
            .filter_map(|row| {
                let bars = inputs.prices.get(&row.ticker)?;
                engine.analyze(&row.ticker, bars)
            })
            .collect();

        stage.impute_medians(&TECHNICAL_METRICS);
        self.finish_stage(&mut stage, Metric::TechnicalScore, "technicals.csv", TECHNICAL_COLUMNS)?;
        Ok(stage)
    }

    /// Runs on the best technical setups only.
    fn quant_stage(&self, inputs: &Inputs, master: &Universe, technicals: &Universe) -> Result<Universe> {
        let var = MonteCarloVar {
            paths: self.config.var_paths,
            seed: self.config.var_seed,
            ..MonteCarloVar::default()
        };
        let persistence = PersistenceChain::for_model(self.config.persistence_model);
        info!(estimators = ?persistence.names(), "Persistence chain");
        let engine = QuantAnalysisEngine::with_models(var, persistence);

        let shortlist = technicals.top_n_by(Metric::TechnicalScore, self.config.quant_top_n);
        info!(candidates = shortlist.len(), "Quant stage shortlist");

        let mut stage: Universe = shortlist
            .iter()
            .map(|candidate| {
                let ticker = candidate.ticker.as_str();
                let bars = inputs.prices.get(ticker).map(Vec::as_slice).unwrap_or_default();
                let known = master.get(ticker);
                let sector = known.and_then(|s| s.sector.as_deref());
                let mut record = engine.analyze(ticker, bars, sector, &inputs.benchmark, &inputs.trends);
                record.consensus = known.and_then(|s| s.consensus);
                record
            })
            .collect();

        QuantScorer.score(&mut stage);
        self.finish_stage(&mut stage, Metric::QuantRiskScore, "quant_risk.csv", QUANT_COLUMNS)?;
        Ok(stage)
    }

    /// Ranks the quant shortlist on event-driven terms, reading the
    /// fundamentals already merged into the master universe.
    fn event_stage(&self, master: &Universe, quant: &Universe) -> Result<Universe> {
        let mut stage = master.filter(|s| quant.contains(&s.ticker));
        EventScorer.score(&mut stage);
        self.finish_stage(&mut stage, Metric::EventScore, "event_driven.csv", EVENT_COLUMNS)?;
        Ok(stage)
    }

    fn finish_stage(&self, stage: &mut Universe, score: Metric, file: &str, columns: &[Metric]) -> Result<()> {
        stage.sort_by_metric_desc(score);
        let path = self.output(file);
        report::write_stage_table(&path, stage, columns)?;
        info!(stage = file, securities = stage.len(), path = %path.display(), "Stage written");
        Ok(())
    }
}

fn base_universe(rows: &[UniverseRow]) -> Universe {
    rows.iter()
        .map(|row| {
            let mut security = Security::new(row.ticker.clone());
            security.sector = row.sector.clone();
            security.industry = row.industry.clone();
            security.index_membership = row.index.clone();
            security
        })
        .collect()
}

/// Tickers the narrative feed scored.
fn narrative_tickers(signals: &HashMap<String, SignalRow>) -> BTreeSet<String> {
    signals
        .values()
        .filter(|s| s.narrative_score.is_some())
        .map(|s| s.ticker.clone())
        .collect()
}

/// Copies narrative, sentiment and consensus signals onto the universe.
fn attach_signals(universe: &mut Universe, signals: &HashMap<String, SignalRow>) {
    for security in universe.iter_mut() {
        let Some(signal) = signals.get(&security.ticker) else {
            continue;
        };
        security.set(Metric::NarrativeScore, signal.narrative_score);
        security.set(Metric::HeadlineSentiment, signal.headline_sentiment);
        security.consensus = signal.consensus_label();
        security.catalysts = signal.catalysts.clone();
        security.threats = signal.threats.clone();
        security.ai_impact = signal.ai_impact.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quant_analysis::{LagDispersion, PersistenceEstimator, PersistenceModel, RescaledRange};
    use std::fmt::Write as _;
    use std::fs;
    use std::path::Path;

    fn write_prices(dir: &Path, ticker: &str, drift: f64, phase: f64) {
        let mut text = String::from("date,open,high,low,close,volume\n");
        let start = chrono::NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        for i in 0..300 {
            let date = start + chrono::Duration::days(i);
            let close = 50.0 + drift * i as f64 + 2.0 * ((i as f64) * 0.3 + phase).sin();
            let volume = 1_000_000.0 + 50_000.0 * ((i as f64) * 0.7 + phase).cos();
            writeln!(
                text,
                "{},{:.4},{:.4},{:.4},{:.4},{:.0}",
                date,
                close,
                close + 1.0,
                close - 1.0,
                close,
                volume
            )
            .unwrap();
        }
        fs::write(dir.join("prices").join(format!("{ticker}.csv")), text).unwrap();
    }

    fn fixture(tickers: usize) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("prices")).unwrap();
        fs::create_dir_all(root.join("commodities")).unwrap();

        let mut universe = String::from("ticker,sector,industry,index\n");
        let mut fundamentals = String::from(
            "ticker,eps,current_price,earnings_growth,roe,debt_to_equity,free_cashflow,\
             institutional_ownership,top10_institutional_pct,short_interest_pct,peg_ratio,market_cap\n",
        );
        let mut signals = String::from("ticker,narrative_score,consensus,headline_sentiment,catalysts\n");
        for i in 0..tickers {
            let ticker = format!("T{i:02}");
            let sector = if i % 3 == 0 { "Energy" } else { "Technology" };
            writeln!(universe, "{ticker},{sector},Software,SP500").unwrap();
            writeln!(
                fundamentals,
                "{ticker},{},{},0.{:02},0.{:02},{},{},0.6,0.{:02},0.0{},{},{}",
                1.0 + i as f64 * 0.5,
                50.0 + i as f64,
                5 + i,
                10 + i,
                20 + i * 5,
                1_000_000 * (i + 1),
                10 + i * 2,
                i % 9,
                1.0 + (i % 4) as f64,
                1_000_000_000u64 * (i as u64 + 1)
            )
            .unwrap();
            if i % 2 == 0 {
                writeln!(signals, "{ticker},{},BUY,0.2,New product", 40 + i).unwrap();
            }
            write_prices(root, &ticker, 0.02 * (i % 5) as f64, i as f64);
        }
        fs::write(root.join("universe.csv"), universe).unwrap();
        fs::write(root.join("fundamentals.csv"), fundamentals).unwrap();
        fs::write(root.join("signals.csv"), signals).unwrap();

        let mut bench = String::from("date,open,high,low,close,volume\n");
        let start = chrono::NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        for i in 0..300 {
            let close = 400.0 + 0.1 * i as f64 + 3.0 * ((i as f64) * 0.2).sin();
            writeln!(bench, "{},{close},{close},{close},{close},1000", start + chrono::Duration::days(i)).unwrap();
        }
        fs::write(root.join("benchmark.csv"), bench).unwrap();
        dir
    }

    #[test]
    fn test_full_run_produces_disjoint_buckets_and_files() {
        let data = fixture(18);
        let out = tempfile::tempdir().unwrap();
        let config = ScreenerConfig {
            var_paths: 200,
            ..ScreenerConfig::default()
        };
        let (portfolios, summary) = Pipeline::new(config, data.path(), out.path()).run().unwrap();

        let mut seen = std::collections::BTreeSet::new();
        for bucket in portfolios.buckets() {
            assert_eq!(bucket.len(), 5);
            for ticker in bucket.tickers() {
                assert!(seen.insert(ticker.to_string()));
            }
        }
        assert_eq!(summary.counts.universe, 18);
        assert_eq!(summary.counts.quant, 18);
        assert_eq!(summary.counts.events, 18);

        for file in [
            "fundamentals_scored.csv",
            "deep_valuation.csv",
            "technicals.csv",
            "quant_risk.csv",
            "event_driven.csv",
            "conviction.csv",
            "portfolio_short.csv",
            "portfolio_medium.csv",
            "portfolio_long.csv",
            "run_summary.json",
        ] {
            assert!(out.path().join(file).exists(), "{file} missing");
        }
    }

    #[test]
    fn test_quant_top_n_limits_stage() {
        let data = fixture(8);
        let out = tempfile::tempdir().unwrap();
        let config = ScreenerConfig {
            quant_top_n: 3,
            var_paths: 100,
            ..ScreenerConfig::default()
        };
        let (_, summary) = Pipeline::new(config, data.path(), out.path()).run().unwrap();
        assert_eq!(summary.counts.quant, 3);
        assert_eq!(summary.counts.technicals, 8);
    }

    #[test]
    fn test_runs_are_reproducible() {
        let data = fixture(6);
        let first_out = tempfile::tempdir().unwrap();
        let second_out = tempfile::tempdir().unwrap();
        let config = ScreenerConfig {
            var_paths: 100,
            ..ScreenerConfig::default()
        };
        Pipeline::new(config.clone(), data.path(), first_out.path()).run().unwrap();
        Pipeline::new(config, data.path(), second_out.path()).run().unwrap();
        let first = fs::read_to_string(first_out.path().join("quant_risk.csv")).unwrap();
        let second = fs::read_to_string(second_out.path().join("quant_risk.csv")).unwrap();
        assert_eq!(first, second);
    }

    /// `(ticker, column)` pairs of a written stage table, in file order.
    fn read_column(path: &Path, column: &str) -> Vec<(String, Option<f64>)> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let headers = reader.headers().unwrap().clone();
        let idx = headers.iter().position(|h| h == column).unwrap();
        reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r[0].to_string(), r[idx].parse().ok())
            })
            .collect()
    }

    fn assert_hurst_from(estimator: &dyn PersistenceEstimator, data: &Path, out: &Path) {
        let rows = read_column(&out.join("quant_risk.csv"), "Hurst_Exponent");
        assert!(!rows.is_empty());
        let loader = DataDir::new(data);
        let mut checked = 0;
        for (ticker, written) in rows {
            let prices = closes(tail(&loader.load_prices(&ticker), quant_analysis::LOOKBACK_BARS));
            if let Some(expected) = estimator.estimate(&prices) {
                let written = written.unwrap();
                assert!((written - expected).abs() < 1e-6, "{ticker}: {written} vs {expected}");
                checked += 1;
            }
        }
        assert!(checked > 0);
    }

    #[test]
    fn test_hurst_comes_from_rescaled_range_by_default() {
        let data = fixture(6);
        let out = tempfile::tempdir().unwrap();
        let config = ScreenerConfig {
            var_paths: 100,
            ..ScreenerConfig::default()
        };
        Pipeline::new(config, data.path(), out.path()).run().unwrap();
        assert_hurst_from(&RescaledRange, data.path(), out.path());
    }

    #[test]
    fn test_lag_dispersion_model_is_selectable() {
        let data = fixture(6);
        let out = tempfile::tempdir().unwrap();
        let config = ScreenerConfig {
            var_paths: 100,
            persistence_model: PersistenceModel::LagDispersion,
            ..ScreenerConfig::default()
        };
        Pipeline::new(config, data.path(), out.path()).run().unwrap();
        assert_hurst_from(&LagDispersion, data.path(), out.path());
    }

    #[test]
    fn test_short_bucket_drawn_from_event_and_narrative_pool() {
        let data = fixture(18);
        let out = tempfile::tempdir().unwrap();
        let config = ScreenerConfig {
            var_paths: 100,
            event_pool_size: 4,
            ..ScreenerConfig::default()
        };
        let (portfolios, _) = Pipeline::new(config, data.path(), out.path()).run().unwrap();

        let mut pool: BTreeSet<String> = read_column(&out.path().join("event_driven.csv"), "Event_Score")
            .into_iter()
            .take(4)
            .map(|(ticker, _)| ticker)
            .collect();
        // the fixture gives every even-numbered ticker a narrative score
        pool.extend((0..18).step_by(2).map(|i| format!("T{i:02}")));
        for ticker in portfolios.short.tickers() {
            assert!(pool.contains(ticker), "{ticker} is outside the short pool");
        }
    }

    #[test]
    fn test_position_band_from_config() {
        let data = fixture(18);
        let out = tempfile::tempdir().unwrap();
        let config = ScreenerConfig {
            var_paths: 100,
            max_position_pct: 10.0,
            ..ScreenerConfig::default()
        };
        let (portfolios, _) = Pipeline::new(config, data.path(), out.path()).run().unwrap();
        for bucket in portfolios.buckets() {
            for holding in &bucket.holdings {
                assert!((1.0..=10.0).contains(&holding.position_pct()), "{}", holding.ticker());
            }
        }
    }

    #[test]
    fn test_missing_universe_is_error() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        assert!(Pipeline::new(ScreenerConfig::default(), data.path(), out.path()).run().is_err());
    }
}
