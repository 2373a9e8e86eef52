//! Technical indicator primitives
//!
//! All functions operate on a full series and return a series of the
//! same length, with `f64::NAN` marking positions where the value is
//! undefined (leading windows, missing inputs). A NaN anywhere inside
//! a rolling window makes that window's output NaN.

/// Simple rolling mean over a trailing window (inclusive).
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Rolling sample standard deviation (n - 1 denominator) over a
/// trailing window.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| {
        let n = w.len() as f64;
        let mean = w.iter().sum::<f64>() / n;
        let var = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    })
}

fn rolling(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return result;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = f(slice);
    }
    result
}

/// Fractional change versus the value `periods` rows earlier:
/// `v[t] / v[t-periods] - 1`.
pub fn pct_change(values: &[f64], periods: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    for i in periods..values.len() {
        result[i] = values[i] / values[i - periods] - 1.0;
    }
    result
}

/// Shift a series forward by `periods` rows, filling the head with NaN.
pub fn shift(values: &[f64], periods: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    for i in periods..values.len() {
        result[i] = values[i - periods];
    }
    result
}

/// Exponential moving average with recursive smoothing:
/// `e[t] = alpha * v[t] + (1 - alpha) * e[t-1]`, `alpha = 2/(span+1)`,
/// seeded by the first observation.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let mut result = Vec::with_capacity(values.len());
    if values.is_empty() {
        return result;
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev = values[0];
    result.push(prev);

    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        result.push(prev);
    }

    result
}

/// Relative Strength Index over rolling-mean gains and losses.
///
/// The first delta is undefined; comparing NaN is false, so it counts
/// as a zero gain and a zero loss, exactly like the masked series the
/// reference formula produces. When the average loss is zero the raw
/// ratio is left to IEEE arithmetic (all-gain window -> 100, flat
/// window -> NaN) rather than clamped.
pub fn rsi(closes: &[f64], window: usize) -> Vec<f64> {
    let n = closes.len();
    let mut gains = vec![f64::NAN; n];
    let mut losses = vec![f64::NAN; n];

    for i in 0..n {
        let delta = if i == 0 {
            f64::NAN
        } else {
            closes[i] - closes[i - 1]
        };
        gains[i] = if delta > 0.0 { delta } else { 0.0 };
        losses[i] = if delta < 0.0 { -delta } else { 0.0 };
    }

    let avg_gain = rolling_mean(&gains, window);
    let avg_loss = rolling_mean(&losses, window);

    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(g, l)| {
            let rs = g / l;
            100.0 - 100.0 / (1.0 + rs)
        })
        .collect()
}
