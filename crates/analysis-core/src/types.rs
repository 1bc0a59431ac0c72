use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Closing prices of a bar series, in order.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Percentage change from the close `lookback` bars before the end to the
/// last close.
pub fn momentum_pct(closes: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || closes.len() < lookback {
        return None;
    }
    let last = *closes.last()?;
    let base = closes[closes.len() - lookback];
    if base <= 0.0 {
        return None;
    }
    Some((last - base) / base * 100.0)
}

/// The most recent `n` bars (or all of them when fewer exist).
pub fn tail(bars: &[Bar], n: usize) -> &[Bar] {
    &bars[bars.len().saturating_sub(n)..]
}

/// Point-in-time fundamental snapshot for one ticker, as delivered by the
/// market-data provider. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub ticker: String,
    #[serde(default)]
    pub eps: Option<f64>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub earnings_growth: Option<f64>,
    #[serde(default)]
    pub revenue_growth: Option<f64>,
    #[serde(default)]
    pub roe: Option<f64>,
    #[serde(default)]
    pub roa: Option<f64>,
    #[serde(default)]
    pub debt_to_equity: Option<f64>,
    #[serde(default)]
    pub current_ratio: Option<f64>,
    #[serde(default)]
    pub free_cashflow: Option<f64>,
    #[serde(default)]
    pub operating_cashflow: Option<f64>,
    #[serde(default)]
    pub net_income: Option<f64>,
    #[serde(default)]
    pub total_assets: Option<f64>,
    #[serde(default)]
    pub total_revenue: Option<f64>,
    #[serde(default)]
    pub long_term_debt: Option<f64>,
    #[serde(default)]
    pub shares_outstanding: Option<f64>,
    #[serde(default)]
    pub gross_margins: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub forward_pe: Option<f64>,
    #[serde(default)]
    pub peg_ratio: Option<f64>,
    #[serde(default)]
    pub ev_to_ebitda: Option<f64>,
    #[serde(default)]
    pub short_interest_pct: Option<f64>,
    #[serde(default)]
    pub short_ratio: Option<f64>,
    #[serde(default)]
    pub insider_ownership: Option<f64>,
    #[serde(default)]
    pub institutional_ownership: Option<f64>,
    #[serde(default)]
    pub top10_institutional_pct: Option<f64>,
    #[serde(default)]
    pub dividend_yield: Option<f64>,
    #[serde(default)]
    pub book_value: Option<f64>,
    #[serde(default)]
    pub price_to_book: Option<f64>,
    #[serde(default)]
    pub analyst_target: Option<f64>,
    #[serde(default)]
    pub analyst_rec: Option<f64>,
    #[serde(default)]
    pub high_52w: Option<f64>,
    #[serde(default)]
    pub low_52w: Option<f64>,
}

/// One annual reporting period of balance-sheet, income-statement and
/// cash-flow data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementPeriod {
    pub total_assets: Option<f64>,
    pub current_assets: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub retained_earnings: Option<f64>,
    pub long_term_debt: Option<f64>,
    pub receivables: Option<f64>,
    pub net_ppe: Option<f64>,
    pub revenue: Option<f64>,
    pub cost_of_revenue: Option<f64>,
    pub sga: Option<f64>,
    pub net_income: Option<f64>,
    pub ebit: Option<f64>,
    pub depreciation: Option<f64>,
    pub operating_cash_flow: Option<f64>,
}

/// Annual statements, most recent period first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinancialStatements {
    pub periods: Vec<StatementPeriod>,
}

impl FinancialStatements {
    pub fn latest(&self) -> Option<&StatementPeriod> {
        self.periods.first()
    }

    pub fn prior(&self) -> Option<&StatementPeriod> {
        self.periods.get(1)
    }
}

/// Five-level technical consensus label from the external rating service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusLabel {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl ConsensusLabel {
    /// Parses the service's labels (`STRONG_BUY`, `buy`, `Strong Sell`...).
    /// Anything else is treated as unknown.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "STRONGBUY" => Some(ConsensusLabel::StrongBuy),
            "BUY" => Some(ConsensusLabel::Buy),
            "NEUTRAL" => Some(ConsensusLabel::Neutral),
            "SELL" => Some(ConsensusLabel::Sell),
            "STRONGSELL" => Some(ConsensusLabel::StrongSell),
            _ => None,
        }
    }

    /// Score bonus added to the quant composite.
    pub fn bonus(&self) -> f64 {
        match self {
            ConsensusLabel::StrongBuy => 15.0,
            ConsensusLabel::Buy => 8.0,
            ConsensusLabel::Neutral => 0.0,
            ConsensusLabel::Sell => -8.0,
            ConsensusLabel::StrongSell => -15.0,
        }
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            ConsensusLabel::StrongBuy => "STRONG_BUY",
            ConsensusLabel::Buy => "BUY",
            ConsensusLabel::Neutral => "NEUTRAL",
            ConsensusLabel::Sell => "SELL",
            ConsensusLabel::StrongSell => "STRONG_SELL",
        }
    }
}

/// How two stages resolve a metric present in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Later stage wins when it has a value.
    PreferLatest,
    /// Earlier stage wins when it has a value.
    PreferEarliest,
}

macro_rules! metrics {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Every numeric attribute a security can carry.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum Metric {
            $($variant),+
        }

        impl Metric {
            pub const ALL: &'static [Metric] = &[$(Metric::$variant),+];

            /// Column name used in stage tables.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Metric::$variant => $name),+
                }
            }

            pub fn from_name(name: &str) -> Option<Metric> {
                match name {
                    $($name => Some(Metric::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

metrics! {
    // fundamentals
    AnnReturn => "Ann_Return",
    AnnVolatility => "Ann_Volatility",
    SharpeRatio => "Sharpe_Ratio",
    MaxDrawdown => "Max_Drawdown",
    ForwardPe => "Forward_PE",
    PegRatio => "PEG_Ratio",
    EvToEbitda => "EV_EBITDA",
    RevenueGrowth => "Revenue_Growth",
    EarningsGrowth => "Earnings_Growth",
    Roe => "ROE",
    Roa => "ROA",
    DebtToEquity => "Debt_to_Equity",
    CurrentRatio => "Current_Ratio",
    FreeCashflow => "Free_Cashflow",
    ShortInterestPct => "Short_Interest_Pct",
    ShortRatio => "Short_Ratio",
    InsiderOwnership => "Insider_Ownership",
    DividendYield => "Dividend_Yield",
    BookValue => "Book_Value",
    PriceToBook => "Price_to_Book",
    AnalystTarget => "Analyst_Target",
    AnalystRec => "Analyst_Rec",
    High52w => "52W_High",
    Low52w => "52W_Low",
    PriceVs52wHigh => "Price_vs_52W_High",
    PiotroskiFScore => "Piotroski_F_Score",
    AltmanZScore => "Altman_Z_Score",
    BeneishMScore => "Beneish_M_Score",
    Momentum1Y => "Momentum_1Y",
    Top10InstitutionalPct => "Top10_Institutional_Pct",
    FundamentalScore => "Fundamental_Score",
    // deep valuation
    CurrentPrice => "Current_Price",
    Eps => "EPS",
    GrowthRate => "Growth_Rate",
    IntrinsicValue => "Intrinsic_Value",
    MarginOfSafety => "Margin_of_Safety",
    InstitutionalOwnership => "Institutional_Ownership",
    DeepValueScore => "Deep_Value_Score",
    // technicals
    LastPrice => "Last_Price",
    Sma50 => "SMA_50",
    Sma200 => "SMA_200",
    BbLower => "BB_Lower",
    BbUpper => "BB_Upper",
    Atr14 => "ATR_14",
    RelativeVolume => "Relative_Volume",
    StochK => "Stoch_K",
    StochD => "Stoch_D",
    TechnicalScore => "Technical_Score",
    // quant risk
    Vwap => "VWAP",
    PriceVsVwap => "Price_vs_VWAP",
    VaR95 => "VaR_95",
    HurstExponent => "Hurst_Exponent",
    Beta => "Beta",
    RsVsBenchmark => "RS_vs_Benchmark",
    Momentum1M => "Momentum_1M",
    CommodityAdj => "Commodity_Adj",
    QuantRiskScore => "Quant_Risk_Score",
    // event-driven
    EventScore => "Event_Score",
    // external signals
    HeadlineSentiment => "Headline_Sentiment",
    NarrativeScore => "Narrative_Score",
    ConvictionScore => "Ultimate_Conviction_Score",
}

impl Metric {
    /// Value assumed when no stage produced this metric.
    ///
    /// Only externally sourced signals have a neutral default; computed
    /// metrics stay missing so they rank last.
    pub fn default_value(&self) -> Option<f64> {
        match self {
            Metric::NarrativeScore => Some(50.0),
            Metric::HeadlineSentiment => Some(0.0),
            Metric::CommodityAdj => Some(0.0),
            _ => None,
        }
    }

    pub fn merge_rule(&self) -> MergeRule {
        MergeRule::PreferLatest
    }
}

pub const NOT_AVAILABLE: &str = "N/A";

/// One tradable instrument and every attribute the pipeline knows about it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Security {
    pub ticker: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub index_membership: Option<String>,
    metrics: BTreeMap<Metric, f64>,
    pub bullish_divergence: Option<bool>,
    pub consensus: Option<ConsensusLabel>,
    pub catalysts: Option<String>,
    pub threats: Option<String>,
    pub ai_impact: Option<String>,
}

impl Security {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }

    /// Stores a value; `None` and non-finite values clear the metric.
    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        match value {
            Some(v) if v.is_finite() => {
                self.metrics.insert(metric, v);
            }
            _ => {
                self.metrics.remove(&metric);
            }
        }
    }

    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.set(metric, Some(value));
        self
    }

    pub fn has(&self, metric: Metric) -> bool {
        self.metrics.contains_key(&metric)
    }

    pub fn metrics(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.metrics.iter().map(|(m, v)| (*m, *v))
    }

    /// Folds a later stage's record for the same ticker into this one.
    pub fn merge_from(&mut self, later: &Security) {
        for (metric, value) in later.metrics() {
            let take = match metric.merge_rule() {
                MergeRule::PreferLatest => true,
                MergeRule::PreferEarliest => !self.has(metric),
            };
            if take {
                self.metrics.insert(metric, value);
            }
        }
        fn prefer_later<T: Clone>(current: &mut Option<T>, later: &Option<T>) {
            if later.is_some() {
                *current = later.clone();
            }
        }
        prefer_later(&mut self.sector, &later.sector);
        prefer_later(&mut self.industry, &later.industry);
        prefer_later(&mut self.index_membership, &later.index_membership);
        prefer_later(&mut self.bullish_divergence, &later.bullish_divergence);
        prefer_later(&mut self.consensus, &later.consensus);
        prefer_later(&mut self.catalysts, &later.catalysts);
        prefer_later(&mut self.threats, &later.threats);
        prefer_later(&mut self.ai_impact, &later.ai_impact);
    }

    /// Fills every absent attribute that has a declared default.
    pub fn apply_defaults(&mut self) {
        for metric in Metric::ALL {
            if !self.has(*metric) {
                if let Some(default) = metric.default_value() {
                    self.metrics.insert(*metric, default);
                }
            }
        }
        for text in [&mut self.catalysts, &mut self.threats, &mut self.ai_impact] {
            if text.as_deref().map_or(true, |t| t.trim().is_empty()) {
                *text = Some(NOT_AVAILABLE.to_string());
            }
        }
        if self.bullish_divergence.is_none() {
            self.bullish_divergence = Some(false);
        }
    }
}
