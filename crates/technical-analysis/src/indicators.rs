use analysis_core::Bar;

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    let mut window_sum: f64 = data[..period].iter().sum();
    result.push(window_sum / period as f64);
    for i in period..data.len() {
        window_sum += data[i] - data[i - period];
        result.push(window_sum / period as f64);
    }
    result
}

/// Latest SMA value, `None` until `period` values exist.
pub fn last_sma(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period {
        return None;
    }
    let window = &data[data.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Bollinger Bands
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

impl BollingerBands {
    /// Most recent (lower, upper) pair.
    pub fn last(&self) -> Option<(f64, f64)> {
        Some((*self.lower.last()?, *self.upper.last()?))
    }
}

/// Bands at `num_std` population standard deviations around the SMA.
pub fn bollinger_bands(data: &[f64], period: usize, num_std: f64) -> BollingerBands {
    if period == 0 || data.len() < period {
        return BollingerBands { upper: vec![], middle: vec![], lower: vec![] };
    }

    let middle = sma(data, period);
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for (offset, mean) in middle.iter().enumerate() {
        let window = &data[offset..offset + period];
        let variance: f64 = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();

        upper.push(mean + num_std * std);
        lower.push(mean - num_std * std);
    }

    BollingerBands { upper, middle, lower }
}

/// Average True Range with Wilder smoothing, seeded by the mean of the first
/// `period` true ranges.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return vec![];
    }

    let true_ranges: Vec<f64> = bars
        .windows(2)
        .map(|w| {
            let (prev, bar) = (&w[0], &w[1]);
            let high_low = bar.high - bar.low;
            let high_close = (bar.high - prev.close).abs();
            let low_close = (bar.low - prev.close).abs();
            high_low.max(high_close).max(low_close)
        })
        .collect();

    let mut atr_values = Vec::with_capacity(true_ranges.len() - period + 1);
    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    atr_values.push(atr);

    for tr in &true_ranges[period..] {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
        atr_values.push(atr);
    }

    atr_values
}

/// Stochastic Oscillator
pub struct StochasticResult {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

impl StochasticResult {
    pub fn last_k(&self) -> Option<f64> {
        self.k.last().copied()
    }

    pub fn last_d(&self) -> Option<f64> {
        self.d.last().copied()
    }
}

/// Raw %K over `k_period` bars (50 when the range is flat) and %D as the
/// `d_period` SMA of %K. `k[i]` belongs to bar `i + k_period - 1`.
pub fn stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> StochasticResult {
    if k_period == 0 || bars.len() < k_period {
        return StochasticResult { k: vec![], d: vec![] };
    }

    let k_values: Vec<f64> = bars
        .windows(k_period)
        .map(|window| {
            let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let close = window[window.len() - 1].close;
            if highest == lowest {
                50.0
            } else {
                100.0 * (close - lowest) / (highest - lowest)
            }
        })
        .collect();

    let d_values = sma(&k_values, d_period);

    StochasticResult { k: k_values, d: d_values }
}

/// Volume-weighted average price over the whole window, using the typical
/// price `(high + low + close) / 3`. `None` when no volume traded.
pub fn vwap(bars: &[Bar]) -> Option<f64> {
    let (tpv, volume) = bars.iter().fold((0.0, 0.0), |(tpv, vol), bar| {
        let typical_price = (bar.high + bar.low + bar.close) / 3.0;
        (tpv + typical_price * bar.volume, vol + bar.volume)
    });
    if volume > 0.0 {
        Some(tpv / volume)
    } else {
        None
    }
}

/// Last bar's volume over the `period`-bar volume SMA.
pub fn relative_volume(bars: &[Bar], period: usize) -> Option<f64> {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let average = last_sma(&volumes, period)?;
    let last = *volumes.last()?;
    if average == 0.0 {
        return None;
    }
    Some(last / average)
}
