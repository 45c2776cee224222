use super::ema::ema_step;

/// Running MACD state for one bar.
///
/// MACD line = EMA(fast) − EMA(slow), signal = EMA(macd, signal period).
/// All three recurrences start at bar 0; warm-up masking is applied on
/// read, not here.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MacdState {
    pub fast: f64,
    pub slow: f64,
    pub macd: f64,
    pub signal: f64,
}

pub fn macd_step(
    prev: Option<&MacdState>,
    close: f64,
    fast: usize,
    slow: usize,
    signal: usize,
) -> MacdState {
    let fast_ema = ema_step(prev.map(|p| p.fast), close, fast);
    let slow_ema = ema_step(prev.map(|p| p.slow), close, slow);
    let macd = fast_ema - slow_ema;
    MacdState {
        fast: fast_ema,
        slow: slow_ema,
        macd,
        signal: ema_step(prev.map(|p| p.signal), macd, signal),
    }
}

/// First index at which the MACD line is reported.
pub fn macd_warmup(slow: usize) -> usize {
    slow.saturating_sub(1)
}

/// First index at which the signal line is reported: it needs `slow + signal`
/// bars.
pub fn signal_warmup(slow: usize, signal: usize) -> usize {
    (slow + signal).saturating_sub(1)
}
