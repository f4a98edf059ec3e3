// Container codec: orchestrates the two-pass encode and one-pass decode.
//
// compress:   histogram pass (+ terminator) -> header -> coding pass
// decompress: header -> decoder for `message_length` symbols -> drop terminator

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use thiserror::Error;

use crate::coder::decoder::{ArithmeticDecoder, DecodeError};
use crate::coder::encoder::{ArithmeticEncoder, EncodeError};
use crate::coder::model::{FrequencyModel, ModelError};

use super::header::{FormatError, Header, TERMINATOR};

/// Default chunk size for both passes. Never affects the output bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// The second pass saw different bytes than the histogram pass.
    #[error("input changed between the histogram and coding passes")]
    InputChanged,
    /// Input and output resolve to the same file.
    #[error("input and output are the same file: {}", path.display())]
    SameFile { path: PathBuf },
}

impl From<EncodeError> for CodecError {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::Io(e) => Self::Io(e),
            EncodeError::SymbolNotInModel { .. } => Self::InputChanged,
        }
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Result of a compression run.
#[derive(Debug, Clone)]
pub struct CompressSummary {
    pub header: Header,
    /// Header bytes written.
    pub header_size: u64,
    /// Payload bytes written.
    pub payload_size: u64,
}

impl CompressSummary {
    pub fn compressed_size(&self) -> u64 {
        self.header_size + self.payload_size
    }
}

/// Result of a decompression run.
#[derive(Debug, Clone)]
pub struct DecompressSummary {
    pub header: Header,
    /// Plaintext bytes written (terminator excluded).
    pub output_size: u64,
    /// Payload bits the decoder consumed.
    pub payload_bits: u64,
}

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// Compress a seekable stream.
///
/// Reads `reader` twice: once to build the model, once to code it. The
/// reader is rewound to its starting position between passes.
pub fn compress_stream<R: Read + Seek, W: Write>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
) -> Result<CompressSummary, CodecError> {
    let start = reader.stream_position()?;
    let mut buf = vec![0u8; buffer_size.max(1)];

    // Pass 1: histogram.
    let mut builder = FrequencyModel::builder();
    loop {
        let n = read_chunk(reader, &mut buf)?;
        if n == 0 {
            break;
        }
        builder.feed(&buf[..n]);
    }
    let plaintext_len = builder.len();
    builder.feed(&[TERMINATOR]);
    let model = builder.finish()?;
    let header = Header::new(plaintext_len + 1, model);
    log::debug!(
        "model built: {} bytes, {} distinct symbols, precision {}",
        plaintext_len,
        header.model.distinct_symbols(),
        header.model.precision()
    );

    header.encode(writer)?;
    let header_size = header.encoded_len() as u64;

    // Pass 2: coding.
    reader.seek(SeekFrom::Start(start))?;
    let mut counting = CountingWriter::new(&mut *writer);
    let mut encoder = ArithmeticEncoder::new(&header.model, &mut counting);
    loop {
        let n = read_chunk(reader, &mut buf)?;
        if n == 0 {
            break;
        }
        encoder.encode_all(&buf[..n])?;
        if encoder.symbols_coded() > plaintext_len {
            return Err(CodecError::InputChanged);
        }
    }
    if encoder.symbols_coded() != plaintext_len {
        return Err(CodecError::InputChanged);
    }
    encoder.encode(TERMINATOR)?;
    encoder.finish()?;
    let payload_size = counting.written;

    log::debug!("compressed {plaintext_len} bytes into {header_size} + {payload_size} bytes");
    Ok(CompressSummary {
        header,
        header_size,
        payload_size,
    })
}

/// Compress an in-memory buffer into `writer`.
pub fn compress_to<W: Write>(data: &[u8], writer: &mut W) -> Result<CompressSummary, CodecError> {
    compress_stream(&mut Cursor::new(data), writer, DEFAULT_BUFFER_SIZE)
}

/// Compress an in-memory buffer.
///
/// # Example
/// ```
/// let packed = artpack::container::compress(b"hello hello hello").unwrap();
/// let unpacked = artpack::container::decompress(&packed).unwrap();
/// assert_eq!(unpacked, b"hello hello hello");
/// ```
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    compress_to(data, &mut out)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Decompression
// ---------------------------------------------------------------------------

/// Decompress a container stream into `writer`.
///
/// The terminator is verified and withheld from the output. On error,
/// `writer` may have received a prefix of the plaintext.
pub fn decompress_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> Result<DecompressSummary, CodecError> {
    let header = Header::decode(reader)?;
    let plaintext_len = header.plaintext_len();

    let mut decoder = ArithmeticDecoder::new(&header.model, &mut *reader, header.message_length);
    let mut chunk = Vec::with_capacity(DEFAULT_BUFFER_SIZE);
    let mut written = 0u64;

    while let Some(symbol) = decoder.next_symbol()? {
        if decoder.decoded() > plaintext_len {
            if symbol != TERMINATOR {
                return Err(DecodeError::MissingTerminator { found: symbol }.into());
            }
            break;
        }
        chunk.push(symbol);
        if chunk.len() == DEFAULT_BUFFER_SIZE {
            writer.write_all(&chunk)?;
            written += chunk.len() as u64;
            chunk.clear();
        }
    }
    debug_assert_eq!(decoder.remaining(), 0);
    writer.write_all(&chunk)?;
    written += chunk.len() as u64;
    let payload_bits = decoder.bits_consumed();

    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing)? > 0 {
        log::warn!("ignoring trailing bytes after the payload");
    }

    log::debug!("decompressed {written} bytes from {payload_bits} payload bits");
    Ok(DecompressSummary {
        header,
        output_size: written,
        payload_bits,
    })
}

/// Decompress an in-memory container.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    decompress_stream(&mut &data[..], &mut out)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_chunk<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match r.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
