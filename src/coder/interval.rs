// The (low, high) coding register shared by the encoder and decoder.
//
// Both sides must narrow and rescale identically, so the arithmetic lives in
// one place. Products are taken in u128: `range` can reach 2^63 and the
// cumulative counts 2^60.

use super::model::FrequencyModel;

/// Which renormalization applies to the current interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rescale {
    /// E1: both bounds in the lower half. Emits 0.
    Lower,
    /// E2: both bounds in the upper half. Emits 1.
    Upper,
    /// E3: bounds straddle the midpoint inside the middle half. Deferred.
    Straddle,
}

#[derive(Debug, Clone)]
pub struct Interval {
    low: u64,
    high: u64,
    mask: u64,
    half: u64,
    quarter: u64,
}

impl Interval {
    /// Full register `[0, 2^precision - 1]`.
    ///
    /// `precision` comes from a validated model, so it lies in `3..=63`.
    pub fn new(precision: u32) -> Self {
        debug_assert!((3..=63).contains(&precision));
        let mask = (1u64 << precision) - 1;
        Self {
            low: 0,
            high: mask,
            mask,
            half: 1 << (precision - 1),
            quarter: 1 << (precision - 2),
        }
    }

    #[inline]
    pub fn low(&self) -> u64 {
        self.low
    }

    #[inline]
    pub fn high(&self) -> u64 {
        self.high
    }

    #[inline]
    pub fn mask(&self) -> u64 {
        self.mask
    }

    #[inline]
    pub fn half(&self) -> u64 {
        self.half
    }

    #[inline]
    pub fn quarter(&self) -> u64 {
        self.quarter
    }

    /// `high - low + 1`.
    #[inline]
    pub fn range(&self) -> u64 {
        self.high - self.low + 1
    }

    /// Restrict the interval to the sub-range owned by `symbol`.
    ///
    /// The symbol must have a non-zero count, otherwise the new upper bound
    /// would fall below the new lower bound.
    #[inline]
    pub fn narrow(&mut self, model: &FrequencyModel, symbol: u8) {
        let range = u128::from(self.range());
        let total = u128::from(model.total_count());
        let lo = range * u128::from(model.cum(symbol, false)) / total;
        let hi = range * u128::from(model.cum(symbol, true)) / total;
        // Both quotients are <= range <= 2^63, so the casts are lossless.
        self.high = self.low + hi as u64 - 1;
        self.low += lo as u64;
    }

    /// The renormalization step the current bounds call for, if any.
    #[inline]
    pub fn classify(&self) -> Option<Rescale> {
        if (self.low ^ self.high) & self.half == 0 {
            if self.low & self.half == 0 {
                Some(Rescale::Lower)
            } else {
                Some(Rescale::Upper)
            }
        } else if self.low & self.quarter != 0 && self.high & self.quarter == 0 {
            Some(Rescale::Straddle)
        } else {
            None
        }
    }

    /// Double the interval for the given step. `high` gains a trailing 1.
    #[inline]
    pub fn rescale(&mut self, step: Rescale) {
        if step == Rescale::Straddle {
            self.low ^= self.quarter;
            self.high ^= self.quarter;
        }
        self.low = (self.low << 1) & self.mask;
        self.high = ((self.high << 1) & self.mask) | 1;
    }
}
