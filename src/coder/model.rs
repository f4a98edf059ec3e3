// Static byte-histogram model.
//
// The model is frozen before any symbol is coded. Only the 256 counts travel
// on the wire; the cumulative table, total and precision are always derived
// from them, so the encoder and decoder agree bit-for-bit.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Number of distinct symbols (one per byte value).
pub const ALPHABET_SIZE: usize = 256;

/// Largest register width the interval arithmetic supports.
pub const MAX_PRECISION: u32 = 63;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ModelError {
    /// Every count is zero, so no interval can be assigned.
    #[error("model has no symbols (total count is zero)")]
    EmptyModel,
    /// The total is too large for a 63-bit coding register.
    #[error("total count {total} exceeds the supported coding precision")]
    TotalTooLarge { total: u64 },
}

// ---------------------------------------------------------------------------
// FrequencyModel
// ---------------------------------------------------------------------------

/// Per-byte occurrence counts with the derived cumulative table.
///
/// `cum[b]` is the inclusive prefix sum `counts[0] + .. + counts[b]`, so
/// `cum[255] == total_count` and the exclusive sum of byte 0 is zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyModel {
    counts: [u64; ALPHABET_SIZE],
    cum: [u64; ALPHABET_SIZE],
    total_count: u64,
    precision: u32,
}

impl FrequencyModel {
    /// Count every byte of `bytes`.
    ///
    /// The caller is responsible for having appended the terminator.
    pub fn build(bytes: &[u8]) -> Result<Self, ModelError> {
        let mut builder = ModelBuilder::new();
        builder.feed(bytes);
        builder.finish()
    }

    /// Start an incremental histogram (used by the chunked first pass).
    pub fn builder() -> ModelBuilder {
        ModelBuilder::new()
    }

    /// Derive the cumulative table and precision from raw counts.
    pub fn from_counts(counts: [u64; ALPHABET_SIZE]) -> Result<Self, ModelError> {
        let mut cum = [0u64; ALPHABET_SIZE];
        let mut running: u64 = 0;
        for (slot, &count) in cum.iter_mut().zip(counts.iter()) {
            running = running
                .checked_add(count)
                .ok_or(ModelError::TotalTooLarge { total: u64::MAX })?;
            *slot = running;
        }

        let total_count = running;
        if total_count == 0 {
            return Err(ModelError::EmptyModel);
        }
        let precision = precision_for(total_count)?;

        Ok(Self {
            counts,
            cum,
            total_count,
            precision,
        })
    }

    /// Occurrence count of every byte value.
    #[inline]
    pub fn counts(&self) -> &[u64; ALPHABET_SIZE] {
        &self.counts
    }

    /// Occurrence count of one byte value.
    #[inline]
    pub fn count(&self, symbol: u8) -> u64 {
        self.counts[symbol as usize]
    }

    #[inline]
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Register width `m`: the smallest integer with `2^m > 4 * total_count`.
    #[inline]
    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Cumulative count up to `symbol`, inclusive or exclusive of it.
    #[inline]
    pub fn cum(&self, symbol: u8, include_self: bool) -> u64 {
        if include_self {
            self.cum[symbol as usize]
        } else if symbol == 0 {
            0
        } else {
            self.cum[symbol as usize - 1]
        }
    }

    /// Smallest symbol whose inclusive cumulative count exceeds `value`.
    ///
    /// Returns `None` when `value >= total_count`.
    pub fn symbol_for(&self, value: u64) -> Option<u8> {
        let idx = self.cum.partition_point(|&c| c <= value);
        u8::try_from(idx).ok()
    }

    /// Number of byte values with a non-zero count.
    pub fn distinct_symbols(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Shannon bound, in bits, for coding the whole message under this model.
    pub fn entropy_bits(&self) -> f64 {
        let total = self.total_count as f64;
        self.counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let c = c as f64;
                -c * (c / total).log2()
            })
            .sum()
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Bytes per count on the wire: enough to hold the largest count.
    pub fn count_width(&self) -> u8 {
        width_for(self.max_count())
    }

    /// Serialized size: one width byte plus 256 counts.
    pub fn serialized_len(&self) -> usize {
        1 + ALPHABET_SIZE * self.count_width() as usize
    }

    /// Width byte followed by all 256 counts, big-endian.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_len());
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        out
    }

    /// Stream the serialized form into `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let width = self.count_width();
        w.write_all(&[width])?;
        for &count in &self.counts {
            write_be(w, count, width)?;
        }
        Ok(())
    }

    /// Inverse of [`serialize`](Self::serialize).
    ///
    /// The width byte must be in `1..=8`; anything else is reported as
    /// `InvalidData`.
    pub fn deserialize(bytes: &[u8]) -> io::Result<Self> {
        let mut cursor = bytes;
        Self::read_from(&mut cursor)
    }

    /// Read the serialized form from a stream.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut width = [0u8; 1];
        r.read_exact(&mut width)?;
        let counts = read_counts(r, width[0])?;
        Self::from_counts(counts).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

// ---------------------------------------------------------------------------
// ModelBuilder
// ---------------------------------------------------------------------------

/// Incremental histogram; feed chunks, then [`finish`](Self::finish).
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    counts: [u64; ALPHABET_SIZE],
    seen: u64,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            counts: [0; ALPHABET_SIZE],
            seen: 0,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.counts[b as usize] += 1;
        }
        self.seen += bytes.len() as u64;
    }

    /// Bytes fed so far.
    pub fn len(&self) -> u64 {
        self.seen
    }

    pub fn is_empty(&self) -> bool {
        self.seen == 0
    }

    pub fn finish(self) -> Result<FrequencyModel, ModelError> {
        FrequencyModel::from_counts(self.counts)
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn precision_for(total: u64) -> Result<u32, ModelError> {
    // 2^m > 4T  <=>  m = bit length of 4T.
    let quadrupled = total
        .checked_mul(4)
        .ok_or(ModelError::TotalTooLarge { total })?;
    let m = u64::BITS - quadrupled.leading_zeros();
    if m > MAX_PRECISION {
        return Err(ModelError::TotalTooLarge { total });
    }
    Ok(m)
}

/// Minimal number of big-endian bytes needed to hold `value` (at least 1).
pub(crate) fn width_for(value: u64) -> u8 {
    let bits = u64::BITS - value.leading_zeros();
    bits.div_ceil(8).max(1) as u8
}

pub(crate) fn write_be<W: Write>(w: &mut W, value: u64, width: u8) -> io::Result<()> {
    let bytes = value.to_be_bytes();
    w.write_all(&bytes[8 - width as usize..])
}

pub(crate) fn read_be<R: Read>(r: &mut R, width: u8) -> io::Result<u64> {
    if !(1..=8).contains(&width) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("integer width {width} out of range 1..=8"),
        ));
    }
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf[8 - width as usize..])?;
    Ok(u64::from_be_bytes(buf))
}

fn read_counts<R: Read>(r: &mut R, width: u8) -> io::Result<[u64; ALPHABET_SIZE]> {
    if !(1..=8).contains(&width) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("count width {width} out of range 1..=8"),
        ));
    }
    let w = width as usize;
    let mut raw = vec![0u8; ALPHABET_SIZE * w];
    r.read_exact(&mut raw)?;

    let mut counts = [0u64; ALPHABET_SIZE];
    for (count, chunk) in counts.iter_mut().zip(raw.chunks_exact(w)) {
        let mut buf = [0u8; 8];
        buf[8 - w..].copy_from_slice(chunk);
        *count = u64::from_be_bytes(buf);
    }
    Ok(counts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
