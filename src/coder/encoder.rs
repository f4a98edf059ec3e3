// Arithmetic encoder.
//
// Narrows the interval per symbol, emits determined leading bits (E1/E2) and
// defers bits while the interval straddles the midpoint (E3). Output goes to
// any `Write`; completed bytes are written as the BitEmitter produces them.

use std::io::{self, Write};

use thiserror::Error;

use super::bits::BitEmitter;
use super::interval::{Interval, Rescale};
use super::model::FrequencyModel;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The symbol has a zero count; coding it would collapse the interval.
    #[error("symbol {symbol:#04X} does not occur in the model")]
    SymbolNotInModel { symbol: u8 },
}

// ---------------------------------------------------------------------------
// ArithmeticEncoder
// ---------------------------------------------------------------------------

/// Streaming arithmetic encoder over a frozen model.
///
/// # Example
/// ```
/// use artpack::coder::{ArithmeticEncoder, FrequencyModel};
///
/// let model = FrequencyModel::build(b"abba\0").unwrap();
/// let mut enc = ArithmeticEncoder::new(&model, Vec::new());
/// for &b in b"abba\0" {
///     enc.encode(b).unwrap();
/// }
/// let payload = enc.finish().unwrap();
/// assert!(!payload.is_empty());
/// ```
pub struct ArithmeticEncoder<'m, W: Write> {
    model: &'m FrequencyModel,
    sink: W,
    interval: Interval,
    emitter: BitEmitter,
    /// Deferred E3 bits awaiting the next determined bit.
    scale3: u64,
    symbols_coded: u64,
    bytes_written: u64,
}

impl<'m, W: Write> ArithmeticEncoder<'m, W> {
    pub fn new(model: &'m FrequencyModel, sink: W) -> Self {
        Self {
            model,
            sink,
            interval: Interval::new(model.precision()),
            emitter: BitEmitter::new(),
            scale3: 0,
            symbols_coded: 0,
            bytes_written: 0,
        }
    }

    /// Code one symbol.
    pub fn encode(&mut self, symbol: u8) -> Result<(), EncodeError> {
        if self.model.count(symbol) == 0 {
            return Err(EncodeError::SymbolNotInModel { symbol });
        }
        self.interval.narrow(self.model, symbol);

        while let Some(step) = self.interval.classify() {
            match step {
                Rescale::Lower => self.emit_with_pending(false)?,
                Rescale::Upper => self.emit_with_pending(true)?,
                Rescale::Straddle => self.scale3 += 1,
            }
            self.interval.rescale(step);
        }

        self.symbols_coded += 1;
        Ok(())
    }

    /// Code every symbol of `symbols` in order.
    pub fn encode_all(&mut self, symbols: &[u8]) -> Result<(), EncodeError> {
        symbols.iter().try_for_each(|&s| self.encode(s))
    }

    /// Symbols coded so far.
    pub fn symbols_coded(&self) -> u64 {
        self.symbols_coded
    }

    /// Flush the final interval position and the padding byte.
    ///
    /// Writes the MSB of `low`, the deferred E3 bits as its complement, then
    /// the remaining `precision - 1` bits of `low`.
    pub fn finish(mut self) -> io::Result<W> {
        let precision = self.model.precision();
        let low = self.interval.low();
        let msb = low & self.interval.half() != 0;
        self.emit_with_pending(msb)?;
        for shift in (0..precision - 1).rev() {
            self.emit((low >> shift) & 1 == 1)?;
        }

        if let Some(byte) = self.emitter.close() {
            self.sink.write_all(&[byte])?;
            self.bytes_written += 1;
        }
        log::trace!(
            "encoder finished: {} symbols, {} payload bytes",
            self.symbols_coded,
            self.bytes_written
        );
        Ok(self.sink)
    }

    #[inline]
    fn emit(&mut self, bit: bool) -> io::Result<()> {
        if let Some(byte) = self.emitter.push(bit) {
            self.sink.write_all(&[byte])?;
            self.bytes_written += 1;
        }
        Ok(())
    }

    fn emit_with_pending(&mut self, bit: bool) -> io::Result<()> {
        self.emit(bit)?;
        while self.scale3 > 0 {
            self.emit(!bit)?;
            self.scale3 -= 1;
        }
        Ok(())
    }
}

/// Encode `symbols` (terminator included) into a fresh payload buffer.
pub fn encode_payload(model: &FrequencyModel, symbols: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut enc = ArithmeticEncoder::new(model, Vec::new());
    enc.encode_all(symbols)?;
    Ok(enc.finish()?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
