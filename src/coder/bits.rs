// Bit-granular I/O, MSB-first within each byte.
//
// BitEmitter hands completed bytes back to the caller instead of owning a
// sink, so the encoder decides where bytes go. BitReader pulls bits lazily
// from any `Read`; trailing padding is simply never requested.

use std::io::{self, Read};

// ---------------------------------------------------------------------------
// BitEmitter
// ---------------------------------------------------------------------------

/// Accumulates single bits into bytes.
///
/// # Invariants
/// - `pending` holds at most 7 bits, right-aligned
/// - `count` is always < 8
#[derive(Debug, Clone, Default)]
pub struct BitEmitter {
    pending: u8,
    count: u8,
    bits_pushed: u64,
}

impl BitEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one bit. Returns the completed byte on every 8th bit.
    #[inline]
    pub fn push(&mut self, bit: bool) -> Option<u8> {
        self.pending = (self.pending << 1) | u8::from(bit);
        self.count += 1;
        self.bits_pushed += 1;
        if self.count == 8 {
            let byte = self.pending;
            self.pending = 0;
            self.count = 0;
            Some(byte)
        } else {
            None
        }
    }

    /// Flush the partial byte, left-aligned and zero-padded.
    ///
    /// Emits nothing when the stream is already byte-aligned.
    pub fn close(self) -> Option<u8> {
        if self.count == 0 {
            None
        } else {
            Some(self.pending << (8 - self.count))
        }
    }

    /// Total bits pushed so far.
    pub fn bits_pushed(&self) -> u64 {
        self.bits_pushed
    }
}

// ---------------------------------------------------------------------------
// BitReader
// ---------------------------------------------------------------------------

/// Lazy MSB-first bit source over a byte reader.
///
/// Bytes are fetched one at a time on demand; wrap unbuffered readers in a
/// `BufReader`. Once the underlying reader is exhausted, `next_bit` keeps
/// returning `Ok(None)`.
#[derive(Debug)]
pub struct BitReader<R> {
    inner: R,
    current: u8,
    remaining: u8,
    bits_read: u64,
    exhausted: bool,
}

impl<R: Read> BitReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            current: 0,
            remaining: 0,
            bits_read: 0,
            exhausted: false,
        }
    }

    /// Next bit, or `None` at end of input.
    pub fn next_bit(&mut self) -> io::Result<Option<bool>> {
        if self.remaining == 0 && (self.exhausted || !self.refill()?) {
            self.exhausted = true;
            return Ok(None);
        }
        self.remaining -= 1;
        self.bits_read += 1;
        Ok(Some((self.current >> self.remaining) & 1 == 1))
    }

    /// Read up to `n` (<= 64) bits into an integer, MSB first.
    ///
    /// Returns the value and the number of bits actually read; fewer than `n`
    /// means the input ended.
    pub fn read_bits(&mut self, n: u32) -> io::Result<(u64, u32)> {
        debug_assert!(n <= 64);
        let mut value = 0u64;
        for got in 0..n {
            match self.next_bit()? {
                Some(bit) => value = (value << 1) | u64::from(bit),
                None => return Ok((value, got)),
            }
        }
        Ok((value, n))
    }

    /// Bits handed out so far.
    pub fn bits_read(&self) -> u64 {
        self.bits_read
    }

    /// Bits of the current byte not yet handed out.
    pub fn buffered_bits(&self) -> u8 {
        self.remaining
    }

    fn refill(&mut self) -> io::Result<bool> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(false),
                Ok(_) => {
                    self.current = byte[0];
                    self.remaining = 8;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read> Iterator for BitReader<R> {
    type Item = io::Result<bool>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_bit().transpose()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_all(bits: &[u8]) -> Vec<u8> {
        let mut e = BitEmitter::new();
        let mut out: Vec<u8> = bits.iter().filter_map(|&b| e.push(b == 1)).collect();
        out.extend(e.close());
        out
    }

    #[test]
    fn full_byte_is_returned_on_eighth_bit() {
        let mut e = BitEmitter::new();
        for bit in [true, false, true, true, false, false, true] {
            assert_eq!(e.push(bit), None);
        }
        assert_eq!(e.push(false), Some(0b1011_0010));
        assert_eq!(e.bits_pushed(), 8);
    }

    #[test]
    fn close_left_aligns_partial_byte() {
        assert_eq!(emit_all(&[1, 0, 1]), vec![0b1010_0000]);
        assert_eq!(emit_all(&[0, 0, 0, 0, 0, 0, 0, 1, 1]), vec![0x01, 0x80]);
    }

    #[test]
    fn close_when_aligned_emits_nothing() {
        assert_eq!(emit_all(&[]), Vec::<u8>::new());
        assert_eq!(emit_all(&[1, 1, 1, 1, 0, 0, 0, 0]), vec![0xF0]);
    }

    #[test]
    fn reader_is_msb_first() {
        let data = [0b1000_0001u8, 0b0100_0000];
        let bits: Vec<bool> = BitReader::new(&data[..]).map(|b| b.unwrap()).collect();
        assert_eq!(bits.len(), 16);
        assert!(bits[0]);
        assert!(bits[7]);
        assert!(bits[9]);
        assert_eq!(bits.iter().filter(|&&b| b).count(), 3);
    }

    #[test]
    fn reader_stays_exhausted() {
        let data = [0xFFu8];
        let mut r = BitReader::new(&data[..]);
        assert_eq!(r.read_bits(8).unwrap(), (0xFF, 8));
        assert_eq!(r.next_bit().unwrap(), None);
        assert_eq!(r.next_bit().unwrap(), None);
        assert_eq!(r.bits_read(), 8);
    }

    #[test]
    fn read_bits_reports_short_reads() {
        let data = [0b1010_1010u8];
        let mut r = BitReader::new(&data[..]);
        assert_eq!(r.read_bits(3).unwrap(), (0b101, 3));
        assert_eq!(r.buffered_bits(), 5);
        assert_eq!(r.read_bits(10).unwrap(), (0b01010, 5));
    }

    #[test]
    fn emitter_and_reader_agree() {
        let pattern: Vec<u8> = (0..29).map(|i| ((i * 7 + 3) % 5 % 2) as u8).collect();
        let bytes = emit_all(&pattern);
        assert_eq!(bytes.len(), 4);
        let back: Vec<u8> = BitReader::new(&bytes[..])
            .take(pattern.len())
            .map(|b| u8::from(b.unwrap()))
            .collect();
        assert_eq!(back, pattern);
    }
}
