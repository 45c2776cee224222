/// Simple moving average over `[index + 1 - period, index]`.
///
/// `value_at` supplies the input at a given index; `None` there (an
/// undefined upstream value) makes the average undefined too, as does a
/// window that reaches before index 0.
pub fn sma_at<F>(value_at: F, index: usize, period: usize) -> Option<f64>
where
    F: Fn(usize) -> Option<f64>,
{
    if period == 0 || index + 1 < period {
        return None;
    }
    let start = index + 1 - period;
    let mut sum = 0.0;
    for i in start..=index {
        sum += value_at(i)?;
    }
    Some(sum / period as f64)
}
