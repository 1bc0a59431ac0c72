//! Local input files.
//!
//! Every table is optional except `universe.csv`. A missing optional file is
//! logged and treated as unavailable data for the stages that use it.

use analysis_core::{Bar, ConsensusLabel, FinancialStatements, FundamentalSnapshot, StatementPeriod};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct UniverseRow {
    pub ticker: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

impl From<PriceRow> for Bar {
    fn from(row: PriceRow) -> Self {
        Bar {
            timestamp: Utc.from_utc_datetime(&row.date.and_time(NaiveTime::MIN)),
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.unwrap_or(0.0),
        }
    }
}

/// Externally produced narrative and rating signals for one ticker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalRow {
    pub ticker: String,
    #[serde(default)]
    pub narrative_score: Option<f64>,
    #[serde(default)]
    pub catalysts: Option<String>,
    #[serde(default)]
    pub threats: Option<String>,
    #[serde(default)]
    pub ai_impact: Option<String>,
    #[serde(default)]
    pub consensus: Option<String>,
    #[serde(default)]
    pub headline_sentiment: Option<f64>,
}

impl SignalRow {
    pub fn consensus_label(&self) -> Option<ConsensusLabel> {
        self.consensus.as_deref().and_then(ConsensusLabel::parse)
    }
}

/// Layout of the data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn load_universe(&self) -> Result<Vec<UniverseRow>> {
        let path = self.path("universe.csv");
        let rows: Vec<UniverseRow> = read_rows(&path)?;
        let rows: Vec<UniverseRow> = rows
            .into_iter()
            .map(|mut row| {
                row.ticker = row.ticker.trim().to_uppercase();
                row
            })
            .filter(|row| !row.ticker.is_empty())
            .collect();
        debug!(count = rows.len(), "Loaded universe");
        Ok(rows)
    }

    /// Daily bars for one ticker, sorted ascending. Missing or unreadable
    /// files give an empty series.
    pub fn load_prices(&self, ticker: &str) -> Vec<Bar> {
        self.optional_bars(&self.root.join("prices").join(format!("{ticker}.csv")))
    }

    pub fn load_benchmark(&self) -> Vec<Bar> {
        self.optional_bars(&self.path("benchmark.csv"))
    }

    pub fn load_commodity(&self, name: &str) -> Vec<Bar> {
        self.optional_bars(&self.root.join("commodities").join(format!("{name}.csv")))
    }

    fn optional_bars(&self, path: &Path) -> Vec<Bar> {
        match load_bars(path) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Price history unavailable");
                Vec::new()
            }
        }
    }

    pub fn load_fundamentals(&self) -> HashMap<String, FundamentalSnapshot> {
        let path = self.path("fundamentals.csv");
        match read_rows::<FundamentalSnapshot>(&path) {
            Ok(rows) => rows
                .into_iter()
                .map(|mut snap| {
                    snap.ticker = snap.ticker.trim().to_uppercase();
                    (snap.ticker.clone(), snap)
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Fundamental snapshots unavailable");
                HashMap::new()
            }
        }
    }

    pub fn load_statements(&self) -> HashMap<String, FinancialStatements> {
        let path = self.path("statements.csv");
        match load_statements(&path) {
            Ok(statements) => statements,
            Err(e) => {
                warn!(error = %e, "Financial statements unavailable");
                HashMap::new()
            }
        }
    }

    pub fn load_signals(&self) -> HashMap<String, SignalRow> {
        let path = self.path("signals.csv");
        match read_rows::<SignalRow>(&path) {
            Ok(rows) => rows
                .into_iter()
                .map(|mut row| {
                    row.ticker = row.ticker.trim().to_uppercase();
                    (row.ticker.clone(), row)
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "External signals unavailable");
                HashMap::new()
            }
        }
    }
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for (line, record) in reader.deserialize().enumerate() {
        let row: T = record.with_context(|| format!("{}: bad row {}", path.display(), line + 2))?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let rows: Vec<PriceRow> = read_rows(path)?;
    let mut bars: Vec<Bar> = rows
        .into_iter()
        .filter(|r| r.close.is_finite() && r.close > 0.0)
        .map(Bar::from)
        .collect();
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    Ok(bars)
}

/// `ticker,period,...` rows, period 0 being the latest year.
pub fn load_statements(path: &Path) -> Result<HashMap<String, FinancialStatements>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let ticker_col = headers
        .iter()
        .position(|h| h == "ticker")
        .context("statements.csv has no ticker column")?;
    let period_col = headers.iter().position(|h| h == "period");

    let mut by_ticker: BTreeMap<String, BTreeMap<usize, StatementPeriod>> = BTreeMap::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let ticker = record.get(ticker_col).unwrap_or_default().trim().to_uppercase();
        if ticker.is_empty() {
            continue;
        }
        let period_index: usize = match period_col.and_then(|i| record.get(i)) {
            Some(raw) if !raw.is_empty() => raw
                .parse()
                .with_context(|| format!("{}: bad period on row {}", path.display(), line + 2))?,
            _ => 0,
        };
        let period: StatementPeriod = record
            .deserialize(Some(&headers))
            .with_context(|| format!("{}: bad row {}", path.display(), line + 2))?;
        by_ticker.entry(ticker).or_default().insert(period_index, period);
    }

    Ok(by_ticker
        .into_iter()
        .map(|(ticker, periods)| {
            (
                ticker,
                FinancialStatements {
                    periods: periods.into_values().collect(),
                },
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_bars_sorts_and_skips_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AAA.csv");
        fs::write(
            &path,
            "date,open,high,low,close,volume\n\
             2024-01-03,11,12,10,11.5,1000\n\
             2024-01-02,10,11,9,10.5,\n\
             2024-01-04,0,0,0,0,0\n",
        )
        .unwrap();
        let bars = load_bars(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 10.5);
        assert_eq!(bars[0].volume, 0.0);
        assert_eq!(bars[1].date(), NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
    }

    #[test]
    fn test_statements_ordered_by_period() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statements.csv");
        fs::write(
            &path,
            "ticker,period,total_assets,revenue\n\
             aaa,1,900,400\n\
             AAA,0,1000,500\n",
        )
        .unwrap();
        let statements = load_statements(&path).unwrap();
        let aaa = &statements["AAA"];
        assert_eq!(aaa.latest().unwrap().total_assets, Some(1000.0));
        assert_eq!(aaa.prior().unwrap().revenue, Some(400.0));
        assert_eq!(aaa.latest().unwrap().net_income, None);
    }

    #[test]
    fn test_missing_optional_files() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::new(dir.path());
        assert!(data.load_prices("NOPE").is_empty());
        assert!(data.load_fundamentals().is_empty());
        assert!(data.load_signals().is_empty());
        assert!(data.load_universe().is_err());
    }

    #[test]
    fn test_signals_parse_consensus() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("signals.csv"),
            "ticker,narrative_score,consensus,headline_sentiment\n\
             abc,72,STRONG_BUY,0.4\n\
             xyz,,garbage,\n",
        )
        .unwrap();
        let signals = DataDir::new(dir.path()).load_signals();
        assert_eq!(signals["ABC"].consensus_label(), Some(ConsensusLabel::StrongBuy));
        assert_eq!(signals["ABC"].narrative_score, Some(72.0));
        assert_eq!(signals["XYZ"].consensus_label(), None);
        assert_eq!(signals["XYZ"].headline_sentiment, None);
    }
}
