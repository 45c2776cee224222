use common::Candle;

/// Bollinger Bands: rolling SMA of close ± `num_std` population standard
/// deviations (ddof=0) over the same window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

pub fn bands_at(bars: &[Candle], index: usize, period: usize, num_std: f64) -> Option<Bands> {
    if period == 0 || index + 1 < period || index >= bars.len() {
        return None;
    }
    let window = &bars[index + 1 - period..=index];
    let n = period as f64;
    let middle = window.iter().map(|b| b.close).sum::<f64>() / n;
    let variance = window
        .iter()
        .map(|b| (b.close - middle).powi(2))
        .sum::<f64>()
        / n;
    let std = variance.sqrt();

    Some(Bands {
        upper: middle + num_std * std,
        middle,
        lower: middle - num_std * std,
    })
}
