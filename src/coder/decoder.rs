// Arithmetic decoder.
//
// Mirrors the encoder's interval arithmetic and keeps an m-bit tag register
// fed from the payload bits. Termination is driven by the symbol count from
// the container header, never by the bit stream.

use std::io::{self, Read};

use thiserror::Error;

use super::bits::BitReader;
use super::interval::{Interval, Rescale};
use super::model::FrequencyModel;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The payload ran out of bits before every symbol was produced.
    #[error("payload truncated: decoded {decoded} of {expected} symbols")]
    Truncated { decoded: u64, expected: u64 },
    /// The tag left the coding interval; the payload does not match the model.
    #[error("corrupt payload: tag outside the coding interval")]
    TagOutOfRange,
    /// The final decoded symbol was not the terminator.
    #[error("corrupt payload: final symbol {found:#04X} is not the terminator")]
    MissingTerminator { found: u8 },
    /// A previous call already failed.
    #[error("decoder halted after an earlier error")]
    Halted,
}

// ---------------------------------------------------------------------------
// ArithmeticDecoder
// ---------------------------------------------------------------------------

/// Pull-based decoder yielding exactly `message_length` symbols.
///
/// Iterating stops after the last symbol or at the first error.
pub struct ArithmeticDecoder<'m, R: Read> {
    model: &'m FrequencyModel,
    bits: BitReader<R>,
    interval: Interval,
    tag: u64,
    message_length: u64,
    decoded: u64,
    primed: bool,
    failed: bool,
}

impl<'m, R: Read> ArithmeticDecoder<'m, R> {
    /// Create a decoder; the first `precision` bits are read lazily on the
    /// first call to [`next_symbol`](Self::next_symbol).
    pub fn new(model: &'m FrequencyModel, payload: R, message_length: u64) -> Self {
        Self {
            model,
            bits: BitReader::new(payload),
            interval: Interval::new(model.precision()),
            tag: 0,
            message_length,
            decoded: 0,
            primed: false,
            failed: false,
        }
    }

    /// Symbols produced so far.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Symbols still to come.
    pub fn remaining(&self) -> u64 {
        self.message_length - self.decoded
    }

    /// Payload bits consumed so far.
    pub fn bits_consumed(&self) -> u64 {
        self.bits.bits_read()
    }

    /// Decode the next symbol, or `None` once `message_length` are out.
    ///
    /// After the first error every further call returns
    /// [`DecodeError::Halted`]; the register state is no longer meaningful.
    pub fn next_symbol(&mut self) -> Result<Option<u8>, DecodeError> {
        if self.failed {
            return Err(DecodeError::Halted);
        }
        let result = self.step();
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn step(&mut self) -> Result<Option<u8>, DecodeError> {
        if self.decoded == self.message_length {
            return Ok(None);
        }
        if !self.primed {
            self.prime()?;
        }

        let low = self.interval.low();
        let high = self.interval.high();
        if self.tag < low || self.tag > high {
            return Err(DecodeError::TagOutOfRange);
        }

        let total = u128::from(self.model.total_count());
        let offset = u128::from(self.tag - low + 1);
        let current = (offset * total - 1) / u128::from(self.interval.range());
        let symbol = u64::try_from(current)
            .ok()
            .and_then(|v| self.model.symbol_for(v))
            .ok_or(DecodeError::TagOutOfRange)?;

        self.interval.narrow(self.model, symbol);
        self.decoded += 1;
        let last = self.decoded == self.message_length;

        while let Some(step) = self.interval.classify() {
            let bit = match self.bits.next_bit()? {
                Some(bit) => bit,
                // Running dry after the final symbol is the normal ending.
                None if last => break,
                None => {
                    return Err(DecodeError::Truncated {
                        decoded: self.decoded,
                        expected: self.message_length,
                    });
                }
            };
            self.interval.rescale(step);
            self.shift_tag(step, bit);
        }

        Ok(Some(symbol))
    }

    /// Load the first `precision` payload bits into the tag.
    fn prime(&mut self) -> Result<(), DecodeError> {
        let precision = self.model.precision();
        let (tag, got) = self.bits.read_bits(precision)?;
        if got < precision {
            return Err(DecodeError::Truncated {
                decoded: 0,
                expected: self.message_length,
            });
        }
        self.tag = tag;
        self.primed = true;
        Ok(())
    }

    #[inline]
    fn shift_tag(&mut self, step: Rescale, bit: bool) {
        if step == Rescale::Straddle {
            self.tag ^= self.interval.quarter();
        }
        self.tag = ((self.tag << 1) & self.interval.mask()) | u64::from(bit);
    }
}

impl<R: Read> Iterator for ArithmeticDecoder<'_, R> {
    type Item = Result<u8, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.next_symbol().transpose()
    }
}

/// Decode `message_length` symbols (terminator included) from `payload`.
pub fn decode_payload(
    model: &FrequencyModel,
    payload: &[u8],
    message_length: u64,
) -> Result<Vec<u8>, DecodeError> {
    ArithmeticDecoder::new(model, payload, message_length).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coder::encoder::encode_payload;

    fn roundtrip(symbols: &[u8]) -> Vec<u8> {
        let m = FrequencyModel::build(symbols).unwrap();
        let payload = encode_payload(&m, symbols).unwrap();
        decode_payload(&m, &payload, symbols.len() as u64).unwrap()
    }

    #[test]
    fn known_payload_decodes() {
        let m = FrequencyModel::build(b"A\0").unwrap();
        assert_eq!(decode_payload(&m, &[0x80], 2).unwrap(), b"A\0");
    }

    #[test]
    fn roundtrips() {
        for data in [
            &b"\0"[..],
            b"A\0",
            b"AAAAAAAAAA\0",
            b"abracadabra\0",
            b"\0\0\0\0\x01\0",
            b"The quick brown fox jumps over the lazy dog\0",
        ] {
            assert_eq!(roundtrip(data), data);
        }
    }

    #[test]
    fn straddle_heavy_roundtrip() {
        // Near-equal middle symbols keep the interval around the midpoint.
        let mut data: Vec<u8> = (0..5000).map(|i| [b'a', b'b', b'c'][i % 3]).collect();
        data.push(0);
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn all_byte_values_roundtrip() {
        let mut data: Vec<u8> = (0..=255u8).collect();
        data.push(0);
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn empty_payload_is_truncated() {
        let m = FrequencyModel::build(b"abc\0").unwrap();
        let err = decode_payload(&m, &[], 4).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { decoded: 0, .. }));
    }

    #[test]
    fn short_payload_is_truncated() {
        let data: Vec<u8> = b"a fairly long message that needs many payload bytes\0".to_vec();
        let m = FrequencyModel::build(&data).unwrap();
        let payload = encode_payload(&m, &data).unwrap();
        let cut = &payload[..payload.len() / 2];
        let err = decode_payload(&m, cut, data.len() as u64).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }), "{err}");
    }

    #[test]
    fn decoder_stops_at_message_length() {
        let data = b"xyzzy\0";
        let m = FrequencyModel::build(data).unwrap();
        let mut payload = encode_payload(&m, data).unwrap();
        payload.extend_from_slice(&[0xAA; 16]);
        let mut dec = ArithmeticDecoder::new(&m, &payload[..], data.len() as u64);
        let out: Vec<u8> = dec.by_ref().map(|s| s.unwrap()).collect();
        assert_eq!(out, data);
        assert_eq!(dec.remaining(), 0);
        assert_eq!(dec.next_symbol().unwrap(), None);
        assert!(dec.bits_consumed() <= (payload.len() as u64 - 16) * 8);
    }

    #[test]
    fn errors_are_sticky() {
        let data = b"a message that will be cut well before its end\0";
        let m = FrequencyModel::build(data).unwrap();
        let payload = encode_payload(&m, data).unwrap();
        let mut dec = ArithmeticDecoder::new(&m, &payload[..2], data.len() as u64);

        let first_err = loop {
            match dec.next_symbol() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("decoded a truncated payload"),
                Err(e) => break e,
            }
        };
        assert!(matches!(first_err, DecodeError::Truncated { .. }));
        let decoded = dec.decoded();
        assert!(matches!(dec.next_symbol(), Err(DecodeError::Halted)));
        assert_eq!(dec.decoded(), decoded);
        assert!(dec.next().is_none());
    }

    #[test]
    fn flipped_bits_never_panic() {
        let data = b"bit flips must surface as errors or wrong output\0";
        let m = FrequencyModel::build(data).unwrap();
        let payload = encode_payload(&m, data).unwrap();
        for bit in 0..payload.len() * 8 {
            let mut corrupt = payload.clone();
            corrupt[bit / 8] ^= 0x80 >> (bit % 8);
            let _ = decode_payload(&m, &corrupt, data.len() as u64);
        }
    }
}
