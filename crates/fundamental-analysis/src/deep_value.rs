pub const GRAHAM_MULTIPLIER: f64 = 8.5;
pub const DEFAULT_GROWTH: f64 = 0.05;
pub const MAX_GROWTH: f64 = 0.30;

/// Graham-style intrinsic value per share:
/// `EPS * (2g*100 + 8.5) * (4.4 / (rf*100))`.
///
/// Growth defaults to 5% when unknown and is clamped to [0, 30%].
pub fn intrinsic_value(eps: Option<f64>, growth: Option<f64>, risk_free_rate: f64) -> Option<f64> {
    let eps = eps.filter(|e| e.is_finite() && *e > 0.0)?;
    if risk_free_rate <= 0.0 {
        return None;
    }
    let growth = growth
        .filter(|g| g.is_finite())
        .unwrap_or(DEFAULT_GROWTH)
        .clamp(0.0, MAX_GROWTH);
    let iv = eps * (2.0 * growth * 100.0 + GRAHAM_MULTIPLIER) * (4.4 / (risk_free_rate * 100.0));
    Some(iv).filter(|v| v.is_finite() && *v > 0.0)
}

/// `(IV - price) / IV`; positive means the price sits below intrinsic value.
pub fn margin_of_safety(intrinsic: Option<f64>, price: Option<f64>) -> Option<f64> {
    let intrinsic = intrinsic.filter(|iv| iv.is_finite() && *iv > 0.0)?;
    let price = price.filter(|p| p.is_finite() && *p > 0.0)?;
    Some((intrinsic - price) / intrinsic)
}
