use common::Candle;

/// Stochastic %K: where the close sits within the high/low range of the
/// trailing `window` bars, scaled to 0..100.
///
/// Undefined until `window` bars exist, and undefined when the range is zero.
pub fn percent_k_at(bars: &[Candle], index: usize, window: usize) -> Option<f64> {
    if window == 0 || index + 1 < window || index >= bars.len() {
        return None;
    }
    let slice = &bars[index + 1 - window..=index];
    let highest = slice.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let lowest = slice.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let range = highest - lowest;
    if range == 0.0 {
        return None;
    }
    Some((bars[index].close - lowest) * 100.0 / range)
}
