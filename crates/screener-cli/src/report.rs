use analysis_core::{Metric, Security, Universe};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use portfolio_allocator::{Bucket, Portfolios};
use quant_analysis::MacroTrends;
use serde::Serialize;
use std::path::Path;

pub const FUNDAMENTAL_COLUMNS: &[Metric] = &[
    Metric::FundamentalScore,
    Metric::AnnReturn,
    Metric::AnnVolatility,
    Metric::SharpeRatio,
    Metric::MaxDrawdown,
    Metric::Momentum1Y,
    Metric::ForwardPe,
    Metric::PegRatio,
    Metric::EvToEbitda,
    Metric::RevenueGrowth,
    Metric::EarningsGrowth,
    Metric::Roe,
    Metric::Roa,
    Metric::DebtToEquity,
    Metric::CurrentRatio,
    Metric::FreeCashflow,
    Metric::ShortInterestPct,
    Metric::ShortRatio,
    Metric::InsiderOwnership,
    Metric::Top10InstitutionalPct,
    Metric::DividendYield,
    Metric::BookValue,
    Metric::PriceToBook,
    Metric::AnalystTarget,
    Metric::AnalystRec,
    Metric::High52w,
    Metric::Low52w,
    Metric::PriceVs52wHigh,
    Metric::PiotroskiFScore,
    Metric::AltmanZScore,
    Metric::BeneishMScore,
];

pub const DEEP_VALUE_COLUMNS: &[Metric] = &[
    Metric::DeepValueScore,
    Metric::CurrentPrice,
    Metric::Eps,
    Metric::GrowthRate,
    Metric::IntrinsicValue,
    Metric::MarginOfSafety,
    Metric::InstitutionalOwnership,
    Metric::InsiderOwnership,
    Metric::FreeCashflow,
    Metric::Roe,
    Metric::DebtToEquity,
];

pub const TECHNICAL_COLUMNS: &[Metric] = &[
    Metric::TechnicalScore,
    Metric::LastPrice,
    Metric::Sma50,
    Metric::Sma200,
    Metric::BbLower,
    Metric::BbUpper,
    Metric::Atr14,
    Metric::RelativeVolume,
    Metric::StochK,
    Metric::StochD,
];

pub const QUANT_COLUMNS: &[Metric] = &[
    Metric::QuantRiskScore,
    Metric::LastPrice,
    Metric::Vwap,
    Metric::PriceVsVwap,
    Metric::VaR95,
    Metric::AnnVolatility,
    Metric::HurstExponent,
    Metric::Beta,
    Metric::RsVsBenchmark,
    Metric::Momentum1M,
    Metric::StochK,
    Metric::StochD,
    Metric::CommodityAdj,
];

pub const EVENT_COLUMNS: &[Metric] = &[
    Metric::EventScore,
    Metric::Momentum1Y,
    Metric::Beta,
    Metric::VaR95,
    Metric::ShortInterestPct,
    Metric::Momentum1M,
    Metric::RelativeVolume,
    Metric::NarrativeScore,
];

pub const CONVICTION_COLUMNS: &[Metric] = &[
    Metric::ConvictionScore,
    Metric::QuantRiskScore,
    Metric::NarrativeScore,
    Metric::FundamentalScore,
    Metric::DeepValueScore,
    Metric::HeadlineSentiment,
];

pub const PORTFOLIO_COLUMNS: &[Metric] = &[
    Metric::ConvictionScore,
    Metric::FundamentalScore,
    Metric::DeepValueScore,
    Metric::QuantRiskScore,
    Metric::TechnicalScore,
    Metric::EventScore,
    Metric::MarginOfSafety,
    Metric::LastPrice,
    Metric::AnalystTarget,
    Metric::AnalystRec,
    Metric::High52w,
    Metric::Low52w,
    Metric::PriceVs52wHigh,
    Metric::VaR95,
    Metric::PriceVsVwap,
    Metric::HurstExponent,
    Metric::RsVsBenchmark,
    Metric::Momentum1Y,
    Metric::Momentum1M,
    Metric::Sma200,
    Metric::StochK,
    Metric::StochD,
    Metric::ShortInterestPct,
    Metric::ShortRatio,
    Metric::DividendYield,
    Metric::BookValue,
    Metric::PriceToBook,
    Metric::Top10InstitutionalPct,
    Metric::NarrativeScore,
    Metric::HeadlineSentiment,
    Metric::PiotroskiFScore,
    Metric::AltmanZScore,
    Metric::BeneishMScore,
    Metric::Beta,
];

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{v:.0}"),
        Some(v) => format!("{v:.6}"),
        None => String::new(),
    }
}

fn identity_fields(security: &Security) -> Vec<String> {
    vec![
        security.ticker.clone(),
        security.sector.clone().unwrap_or_default(),
        security.industry.clone().unwrap_or_default(),
    ]
}

fn narrative_fields(security: &Security) -> Vec<String> {
    vec![
        security
            .bullish_divergence
            .map(|d| d.to_string())
            .unwrap_or_default(),
        security
            .consensus
            .map(|c| c.to_label().to_string())
            .unwrap_or_default(),
        security.catalysts.clone().unwrap_or_default(),
        security.threats.clone().unwrap_or_default(),
        security.ai_impact.clone().unwrap_or_default(),
    ]
}

const IDENTITY_HEADERS: [&str; 3] = ["ticker", "Sector", "Industry"];
const NARRATIVE_HEADERS: [&str; 5] = ["Bullish_Divergence", "Consensus", "Catalysts", "Threats", "AI_Impact"];

/// One stage table: identity columns followed by `columns`, in universe
/// order.
pub fn write_stage_table(path: &Path, universe: &Universe, columns: &[Metric]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("failed to create {}", path.display()))?;

    let mut header: Vec<&str> = IDENTITY_HEADERS.to_vec();
    header.extend(columns.iter().map(|m| m.name()));
    writer.write_record(&header)?;

    for security in universe.iter() {
        let mut row = identity_fields(security);
        row.extend(columns.iter().map(|m| format_value(security.get(*m))));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// A bucket table with the fixed portfolio schema plus the bucket score and
/// allocation.
pub fn write_bucket_table(path: &Path, bucket: &Bucket) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("failed to create {}", path.display()))?;

    let mut header: Vec<&str> = IDENTITY_HEADERS.to_vec();
    header.push("Bucket_Score");
    header.extend(PORTFOLIO_COLUMNS.iter().map(|m| m.name()));
    header.extend(NARRATIVE_HEADERS);
    header.push("Kelly_Position_Pct");
    writer.write_record(&header)?;

    for holding in &bucket.holdings {
        let security = &holding.security;
        let mut row = identity_fields(security);
        row.push(format_value(holding.bucket_score));
        row.extend(PORTFOLIO_COLUMNS.iter().map(|m| format_value(security.get(*m))));
        row.extend(narrative_fields(security));
        row.push(format!("{:.1}", holding.position_pct()));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct StageCounts {
    pub universe: usize,
    pub fundamentals: usize,
    pub deep_value: usize,
    pub technicals: usize,
    pub quant: usize,
    pub events: usize,
}

#[derive(Debug, Serialize)]
pub struct BucketSummary {
    pub horizon: &'static str,
    pub tier: Option<usize>,
    pub holdings: Vec<HoldingSummary>,
}

#[derive(Debug, Serialize)]
pub struct HoldingSummary {
    pub ticker: String,
    pub bucket_score: Option<f64>,
    pub position_pct: f64,
}

impl From<&Bucket> for BucketSummary {
    fn from(bucket: &Bucket) -> Self {
        Self {
            horizon: bucket.horizon.name(),
            tier: bucket.tier,
            holdings: bucket
                .holdings
                .iter()
                .map(|h| HoldingSummary {
                    ticker: h.ticker().to_string(),
                    bucket_score: h.bucket_score,
                    position_pct: h.position_pct(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub var_seed: u64,
    pub macro_trends: MacroTrends,
    pub counts: StageCounts,
    pub buckets: Vec<BucketSummary>,
}

impl RunSummary {
    pub fn new(var_seed: u64, macro_trends: MacroTrends, counts: StageCounts, portfolios: &Portfolios) -> Self {
        Self {
            generated_at: Utc::now(),
            var_seed,
            macro_trends,
            counts,
            buckets: portfolios.buckets().into_iter().map(BucketSummary::from).collect(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(7.0)), "7");
        assert_eq!(format_value(Some(0.125)), "0.125000");
        assert_eq!(format_value(None), "");
    }

    #[test]
    fn test_stage_table_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.csv");
        let mut security = Security::new("AAA").with(Metric::TechnicalScore, 60.0);
        security.sector = Some("Energy".to_string());
        let universe: Universe = vec![security, Security::new("BBB")].into_iter().collect();

        write_stage_table(&path, &universe, &[Metric::TechnicalScore, Metric::Sma50]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ticker,Sector,Industry,Technical_Score,SMA_50");
        assert_eq!(lines[1], "AAA,Energy,,60,");
        assert_eq!(lines[2], "BBB,,,,");
    }
}
