//! Heikin-Ashi candle transform.
//!
//! Each transformed bar depends on the previously *transformed* bar, so the
//! transform must be applied in arrival order:
//!
//!   first bar → open  = (open + close) / 2
//!               close = (open + high + low + close) / 4
//!   later     → open  = (prev_ha.open + prev_ha.close) / 2
//!               close = (open + high + low + close) / 4
//!               high  = max(high, ha.open, ha.close)
//!               low   = min(low, ha.open, ha.close)
//!
//! Timestamps and volume pass through untouched.

use common::Candle;

pub fn transform(raw: &Candle, prev: Option<&Candle>) -> Candle {
    let close = (raw.open + raw.high + raw.low + raw.close) / 4.0;
    let open = match prev {
        Some(p) => (p.open + p.close) / 2.0,
        None => (raw.open + raw.close) / 2.0,
    };

    Candle {
        opentime: raw.opentime,
        open,
        high: raw.high.max(open).max(close),
        low: raw.low.min(open).min(close),
        close,
        volume: raw.volume,
        closetime: raw.closetime,
    }
}
