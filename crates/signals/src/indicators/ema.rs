/// Exponential moving average, seeded with the first price (no bias adjustment).
///
///   bar 0  → value = price
///   bar 1+ → value = α·price + (1−α)·prev   where α = 2/(period+1)
pub fn alpha(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// One step of the recurrence; `prev` is `None` on the first bar.
pub fn ema_step(prev: Option<f64>, value: f64, period: usize) -> f64 {
    match prev {
        None => value,
        Some(p) => {
            let a = alpha(period);
            a * value + (1.0 - a) * p
        }
    }
}
