use serde::{Deserialize, Serialize};

/// Percentage move that makes a commodity trend up or down.
pub const TREND_THRESHOLD_PCT: f64 = 3.0;
pub const MIN_TREND_CLOSES: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommodityTrend {
    Up,
    Down,
    #[default]
    Flat,
}

impl CommodityTrend {
    /// Classifies the change from the first to the last close.
    pub fn from_closes(closes: &[f64]) -> Self {
        if closes.len() < MIN_TREND_CLOSES {
            return Self::Flat;
        }
        let first = closes[0];
        let last = closes[closes.len() - 1];
        if first <= 0.0 || !last.is_finite() {
            return Self::Flat;
        }
        let change_pct = (last - first) / first * 100.0;
        if change_pct > TREND_THRESHOLD_PCT {
            Self::Up
        } else if change_pct < -TREND_THRESHOLD_PCT {
            Self::Down
        } else {
            Self::Flat
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Flat => "FLAT",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroTrends {
    pub oil: CommodityTrend,
    pub gold: CommodityTrend,
}

impl MacroTrends {
    pub fn from_closes(oil: &[f64], gold: &[f64]) -> Self {
        Self {
            oil: CommodityTrend::from_closes(oil),
            gold: CommodityTrend::from_closes(gold),
        }
    }
}

const OIL_SENSITIVE: [&str; 3] = ["industrial", "transport", "airline"];

/// Score points added for a sector's exposure to the oil trend.
pub fn commodity_adjustment(sector: Option<&str>, trends: &MacroTrends) -> f64 {
    let Some(sector) = sector else {
        return 0.0;
    };
    let sector = sector.to_lowercase();

    if sector.contains("energy") {
        return match trends.oil {
            CommodityTrend::Up => 8.0,
            CommodityTrend::Down => -5.0,
            CommodityTrend::Flat => 0.0,
        };
    }
    if trends.oil == CommodityTrend::Up && OIL_SENSITIVE.iter().any(|s| sector.contains(s)) {
        return -5.0;
    }
    0.0
}
