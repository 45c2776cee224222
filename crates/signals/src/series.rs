use tracing::debug;

use common::{AppendOutcome, Candle, Error, PriceSource, Result};

use crate::heikin_ashi;

/// Append-only, strictly time-ordered store of closed bars for one pair.
///
/// When Heikin-Ashi is enabled the stored bars are the transformed ones, so
/// everything downstream (indicators, rules, history export) sees the same
/// bars.
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    bars: Vec<Candle>,
    heikin_ashi: bool,
}

impl CandleSeries {
    pub fn new(heikin_ashi: bool) -> Self {
        Self {
            bars: Vec::new(),
            heikin_ashi,
        }
    }

    pub fn heikin_ashi(&self) -> bool {
        self.heikin_ashi
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Candle] {
        &self.bars
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.bars.get(index)
    }

    pub fn last_bar(&self) -> Option<&Candle> {
        self.bars.last()
    }

    /// Add a closed bar.
    ///
    /// A bar with the same opentime as the last one replaces it (the exchange
    /// re-sends the bar that was still open when the backfill was taken).
    /// Invalid or older bars are rejected and the series is left untouched.
    pub fn append(&mut self, candle: Candle) -> Result<AppendOutcome> {
        candle.validate()?;

        let len = self.bars.len();
        match self.bars.last() {
            Some(last) if candle.opentime < last.opentime => Err(Error::OutOfOrderCandle {
                last: last.opentime,
                got: candle.opentime,
            }),
            Some(last) if candle.opentime == last.opentime => {
                let prev = len.checked_sub(2).and_then(|i| self.bars.get(i));
                let bar = self.prepare(&candle, prev);
                self.bars[len - 1] = bar;
                debug!(opentime = %candle.opentime, "Replaced last bar");
                Ok(AppendOutcome::Replaced)
            }
            prev => {
                let bar = self.prepare(&candle, prev);
                self.bars.push(bar);
                Ok(AppendOutcome::Appended)
            }
        }
    }

    /// The newest `n` bars, oldest first.
    pub fn last(&self, n: usize) -> Result<&[Candle]> {
        if n > self.bars.len() {
            return Err(Error::InsufficientHistory {
                requested: n,
                available: self.bars.len(),
            });
        }
        Ok(&self.bars[self.bars.len() - n..])
    }

    /// Every value of one raw column (`open`, `high`, `low`, `close`, `volume`).
    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        let source: PriceSource = name.parse()?;
        Ok(self.bars.iter().map(|bar| bar.value(source)).collect())
    }

    /// The newest `n` values of one raw column.
    pub fn tail(&self, name: &str, n: usize) -> Result<Vec<f64>> {
        let source: PriceSource = name.parse()?;
        Ok(self.last(n)?.iter().map(|bar| bar.value(source)).collect())
    }

    fn prepare(&self, candle: &Candle, prev: Option<&Candle>) -> Candle {
        if self.heikin_ashi {
            heikin_ashi::transform(candle, prev)
        } else {
            *candle
        }
    }
}
