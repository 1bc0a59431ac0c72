pub const DIVERGENCE_WINDOW: usize = 14;

fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Bullish divergence over the last `window` observations: the recent half
/// makes a lower price low while %K makes a higher low than the earlier half.
///
/// `stoch_k` is aligned to the end of `closes`. Too little data is `false`.
pub fn bullish_divergence(closes: &[f64], stoch_k: &[f64], window: usize) -> bool {
    if window < 2 || closes.len() < window || stoch_k.len() < window {
        return false;
    }
    let prices = &closes[closes.len() - window..];
    let k = &stoch_k[stoch_k.len() - window..];
    let split = window / 2;

    let (earlier_price, recent_price) = prices.split_at(split);
    let (earlier_k, recent_k) = k.split_at(split);

    min_of(recent_price) < min_of(earlier_price) && min_of(recent_k) > min_of(earlier_k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_low_with_higher_oscillator_low() {
        let closes = vec![
            50.0, 49.0, 48.0, 47.0, 46.0, 47.0, 48.0, // earlier low 46
            47.0, 46.0, 45.0, 45.5, 46.0, 46.5, 47.0, // recent low 45
        ];
        let k = vec![
            30.0, 20.0, 10.0, 5.0, 8.0, 15.0, 25.0, // earlier low 5
            20.0, 15.0, 12.0, 18.0, 22.0, 30.0, 35.0, // recent low 12
        ];
        assert!(bullish_divergence(&closes, &k, DIVERGENCE_WINDOW));
    }

    #[test]
    fn test_confirmed_low_is_not_divergence() {
        let closes: Vec<f64> = (0..14).map(|i| 100.0 - i as f64).collect();
        let k: Vec<f64> = (0..14).map(|i| 60.0 - 4.0 * i as f64).collect();
        assert!(!bullish_divergence(&closes, &k, DIVERGENCE_WINDOW));
    }

    #[test]
    fn test_short_input_is_false() {
        assert!(!bullish_divergence(&[1.0; 10], &[50.0; 10], DIVERGENCE_WINDOW));
    }
}
