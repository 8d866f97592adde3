//! Descriptive statistics over small samples
//!
//! All functions return `None` for empty input. Standard deviation is the
//! population variant. Quantiles pick a sample element, averaging two
//! neighbours only when the index is exact on an even-length sample.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Quantile `p` of an ascending sample
fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 || !(0.0..=1.0).contains(&p) {
        return None;
    }
    if p == 1.0 {
        return sorted.last().copied();
    }
    if p == 0.0 {
        return sorted.first().copied();
    }

    let idx = n as f64 * p;
    if idx.fract() != 0.0 {
        Some(sorted[idx.ceil() as usize - 1])
    } else {
        let idx = idx as usize;
        if n % 2 == 0 {
            Some((sorted[idx - 1] + sorted[idx]) / 2.0)
        } else {
            Some(sorted[idx])
        }
    }
}

pub fn interquartile_range(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(quantile_sorted(&sorted, 0.75)? - quantile_sorted(&sorted, 0.25)?)
}

/// `Σ(value·weight) / Σ(weight)`, `None` when the weights sum to zero
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Option<f64> {
    let total: f64 = weights.iter().sum();
    if values.is_empty() || values.len() != weights.len() || total == 0.0 {
        return None;
    }
    Some(values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total)
}
