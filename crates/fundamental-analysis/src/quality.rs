//! Balance-sheet heuristics: Altman Z (bankruptcy), Beneish M (earnings
//! manipulation) and Piotroski F (financial health).

use analysis_core::{FinancialStatements, FundamentalSnapshot, StatementPeriod};
use serde::Serialize;

pub const ALTMAN_SAFE: f64 = 2.99;
pub const ALTMAN_GREY: f64 = 1.81;

/// M-scores above this mark a probable manipulator.
pub const BENEISH_THRESHOLD: f64 = -1.78;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AltmanZone {
    Safe,
    Grey,
    Distress,
}

impl AltmanZone {
    pub fn classify(z: f64) -> Self {
        if z >= ALTMAN_SAFE {
            AltmanZone::Safe
        } else if z >= ALTMAN_GREY {
            AltmanZone::Grey
        } else {
            AltmanZone::Distress
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator).filter(|v| v.is_finite())
}

/// Altman Z from the latest balance sheet plus market cap and revenue.
pub fn altman_z(latest: &StatementPeriod, market_cap: Option<f64>, revenue: Option<f64>) -> Option<f64> {
    let total_assets = latest.total_assets?;
    let current_assets = latest.current_assets?;
    let current_liabilities = latest.current_liabilities?;
    let retained_earnings = latest.retained_earnings?;
    let total_liabilities = latest.total_liabilities?;
    let ebit = latest.ebit?;
    let market_cap = market_cap?;
    let revenue = revenue?;

    if total_assets == 0.0 || total_liabilities == 0.0 {
        return None;
    }

    let x1 = (current_assets - current_liabilities) / total_assets;
    let x2 = retained_earnings / total_assets;
    let x3 = ebit / total_assets;
    let x4 = market_cap / total_liabilities;
    let x5 = revenue / total_assets;

    let z = 1.2 * x1 + 1.4 * x2 + 3.3 * x3 + 0.6 * x4 + 1.0 * x5;
    Some(z).filter(|v| v.is_finite())
}

/// Depreciation rate index; neutral when depreciation is not reported.
fn depreciation_index(t: &StatementPeriod, t1: &StatementPeriod, ppe_t: f64, ppe_t1: f64) -> Option<f64> {
    match (t.depreciation, t1.depreciation) {
        (Some(da_t), Some(da_t1)) => {
            let rate_t = ratio(da_t, da_t + ppe_t)?;
            let rate_t1 = ratio(da_t1, da_t1 + ppe_t1)?;
            ratio(rate_t1, rate_t)
        }
        _ => Some(1.0),
    }
}

/// Beneish eight-ratio M-score comparing the latest period with the prior one.
pub fn beneish_m(statements: &FinancialStatements) -> Option<f64> {
    let t = statements.latest()?;
    let t1 = statements.prior()?;

    let rev_t = t.revenue?;
    let rev_t1 = t1.revenue?;
    let cogs_t = t.cost_of_revenue?;
    let cogs_t1 = t1.cost_of_revenue?;
    let sga_t = t.sga?;
    let sga_t1 = t1.sga?;
    let ni_t = t.net_income?;
    let ta_t = t.total_assets?;
    let ta_t1 = t1.total_assets?;
    let ca_t = t.current_assets?;
    let ca_t1 = t1.current_assets?;
    let ppe_t = t.net_ppe?;
    let ppe_t1 = t1.net_ppe?;
    let recv_t = t.receivables?;
    let recv_t1 = t1.receivables?;
    let cl_t = t.current_liabilities?;
    let cl_t1 = t1.current_liabilities?;
    let cfo_t = t.operating_cash_flow?;
    let ltd_t = t.long_term_debt.unwrap_or(0.0);
    let ltd_t1 = t1.long_term_debt.unwrap_or(0.0);

    let dsri = ratio(ratio(recv_t, rev_t)?, ratio(recv_t1, rev_t1)?)?;

    let gm_t = ratio(rev_t - cogs_t, rev_t)?;
    let gm_t1 = ratio(rev_t1 - cogs_t1, rev_t1)?;
    let gmi = ratio(gm_t1, gm_t)?;

    let hard_t = ratio(ca_t + ppe_t, ta_t)?;
    let hard_t1 = ratio(ca_t1 + ppe_t1, ta_t1)?;
    let aqi = ratio(1.0 - hard_t, 1.0 - hard_t1)?;

    let sgi = ratio(rev_t, rev_t1)?;
    let depi = depreciation_index(t, t1, ppe_t, ppe_t1)?;
    let sgai = ratio(ratio(sga_t, rev_t)?, ratio(sga_t1, rev_t1)?)?;

    let lev_t = ratio(cl_t + ltd_t, ta_t)?;
    let lev_t1 = ratio(cl_t1 + ltd_t1, ta_t1)?;
    let lvgi = ratio(lev_t, lev_t1)?;

    let tata = ratio(ni_t - cfo_t, ta_t)?;

    let m = -4.84 + 0.920 * dsri + 0.528 * gmi + 0.404 * aqi + 0.892 * sgi + 0.115 * depi
        - 0.172 * sgai
        + 4.679 * tata
        - 0.327 * lvgi;
    Some(m).filter(|v| v.is_finite())
}

pub fn is_probable_manipulator(m_score: f64) -> bool {
    m_score > BENEISH_THRESHOLD
}

/// Piotroski F-score (0-9) over the latest period only. A check whose inputs
/// are missing scores zero.
pub fn piotroski_f(snapshot: &FundamentalSnapshot) -> u8 {
    let roa = snapshot.roa;
    let cfo = snapshot.operating_cashflow;
    let total_assets = snapshot.total_assets.filter(|ta| *ta != 0.0);

    let checks = [
        roa.map_or(false, |r| r > 0.0),
        cfo.map_or(false, |c| c > 0.0),
        snapshot.net_income.map_or(false, |n| n > 0.0),
        match (cfo, total_assets, roa) {
            (Some(c), Some(ta), Some(r)) => c / ta > r,
            _ => false,
        },
        match (snapshot.long_term_debt, total_assets) {
            (Some(ltd), Some(ta)) => ltd / ta < 0.5,
            _ => false,
        },
        snapshot.current_ratio.map_or(false, |cr| cr > 1.0),
        snapshot.shares_outstanding.map_or(false, |s| s > 0.0),
        snapshot.gross_margins.map_or(false, |gm| gm > 0.0),
        match (snapshot.total_revenue, total_assets) {
            (Some(rev), Some(ta)) => rev / ta > 0.0,
            _ => false,
        },
    ];
    checks.iter().filter(|passed| **passed).count() as u8
}
