// Container header: magic, message length, serialized model, separator.
//
// Layout (all integers big-endian):
//
//   "ARTPACK\n"             8 bytes
//   length width            1 byte
//   message length          `length width` bytes
//   count width             1 byte
//   256 counts              256 * `count width` bytes
//   "\n"                    1 byte
//   payload                 arithmetic-coded bits, zero-padded to a byte

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::coder::model::{self, ALPHABET_SIZE, FrequencyModel, ModelError};

pub const ARTPACK_MAGIC: [u8; 8] = *b"ARTPACK\n";

pub const SEPARATOR: u8 = b'\n';

/// Synthetic symbol appended to every message before modelling.
pub const TERMINATOR: u8 = 0x00;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(io::Error),
    #[error("not an artpack file: bad magic {found:02X?}")]
    BadMagic { found: Vec<u8> },
    #[error("invalid {field} width {width} (expected 1..=8)")]
    InvalidWidth { field: &'static str, width: u8 },
    #[error("missing header separator: found {found:#04X}")]
    MissingSeparator { found: u8 },
    #[error("header truncated")]
    Truncated,
    #[error("invalid model: {0}")]
    Model(#[from] ModelError),
    /// Every coded symbol is counted once, so the two must agree.
    #[error("message length {message_length} disagrees with model total {total_count}")]
    LengthMismatch {
        message_length: u64,
        total_count: u64,
    },
    #[error("model has no count for the terminator symbol")]
    MissingTerminatorCount,
}

impl From<io::Error> for FormatError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Parsed container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Coded symbols, terminator included.
    pub message_length: u64,
    pub model: FrequencyModel,
}

impl Header {
    pub fn new(message_length: u64, model: FrequencyModel) -> Self {
        Self {
            message_length,
            model,
        }
    }

    /// Plaintext length (the message minus its terminator).
    pub fn plaintext_len(&self) -> u64 {
        self.message_length.saturating_sub(1)
    }

    /// Bytes `encode` will write.
    pub fn encoded_len(&self) -> usize {
        ARTPACK_MAGIC.len()
            + 1
            + model::width_for(self.message_length) as usize
            + self.model.serialized_len()
            + 1
    }

    /// Write the header; the payload follows directly.
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&ARTPACK_MAGIC)?;
        let width = model::width_for(self.message_length);
        w.write_all(&[width])?;
        model::write_be(w, self.message_length, width)?;
        self.model.write_to(w)?;
        w.write_all(&[SEPARATOR])
    }

    /// Parse and validate a header, leaving `r` at the first payload byte.
    pub fn decode<R: Read>(r: &mut R) -> Result<Self, FormatError> {
        let mut magic = [0u8; 8];
        let got = read_up_to(r, &mut magic)?;
        if got < magic.len() || magic != ARTPACK_MAGIC {
            return Err(FormatError::BadMagic {
                found: magic[..got].to_vec(),
            });
        }

        let length_width = read_u8(r)?;
        if !(1..=8).contains(&length_width) {
            return Err(FormatError::InvalidWidth {
                field: "message length",
                width: length_width,
            });
        }
        let message_length = model::read_be(r, length_width)?;

        let count_width = read_u8(r)?;
        if !(1..=8).contains(&count_width) {
            return Err(FormatError::InvalidWidth {
                field: "model count",
                width: count_width,
            });
        }
        let counts = read_counts(r, count_width)?;

        let separator = read_u8(r)?;
        if separator != SEPARATOR {
            return Err(FormatError::MissingSeparator { found: separator });
        }

        let model = FrequencyModel::from_counts(counts)?;
        if model.total_count() != message_length {
            return Err(FormatError::LengthMismatch {
                message_length,
                total_count: model.total_count(),
            });
        }
        if model.count(TERMINATOR) == 0 {
            return Err(FormatError::MissingTerminatorCount);
        }

        log::debug!(
            "header: message_length={message_length}, count_width={count_width}, precision={}",
            model.precision()
        );
        Ok(Self {
            message_length,
            model,
        })
    }
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

fn read_counts<R: Read>(r: &mut R, width: u8) -> io::Result<[u64; ALPHABET_SIZE]> {
    let mut counts = [0u64; ALPHABET_SIZE];
    for count in counts.iter_mut() {
        *count = model::read_be(r, width)?;
    }
    Ok(counts)
}

/// Fill as much of `buf` as the reader allows; returns the bytes read.
fn read_up_to<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn header_for(data: &[u8]) -> Header {
        let mut msg = data.to_vec();
        msg.push(TERMINATOR);
        Header::new(msg.len() as u64, FrequencyModel::build(&msg).unwrap())
    }

    fn encoded(h: &Header) -> Vec<u8> {
        let mut out = Vec::new();
        h.encode(&mut out).unwrap();
        out
    }

    #[test]
    fn empty_message_layout() {
        let h = header_for(b"");
        let bytes = encoded(&h);
        assert_eq!(bytes.len(), h.encoded_len());
        assert_eq!(bytes.len(), 8 + 1 + 1 + 1 + 256 + 1);
        assert_eq!(&bytes[..8], b"ARTPACK\n");
        assert_eq!(&bytes[8..11], &[1, 1, 1]);
        assert_eq!(bytes[11], 1); // count of 0x00
        assert!(bytes[12..267].iter().all(|&b| b == 0));
        assert_eq!(bytes[267], b'\n');
        assert_eq!(h.plaintext_len(), 0);
    }

    #[test]
    fn header_roundtrip_leaves_reader_at_payload() {
        let h = header_for(&vec![b'q'; 70_000]);
        let mut bytes = encoded(&h);
        // 70_001 needs three bytes, both as a length and as a count.
        assert_eq!(bytes[8], 3);
        bytes.extend_from_slice(&[0xDE, 0xAD]);

        let mut cursor = &bytes[..];
        let back = Header::decode(&mut cursor).unwrap();
        assert_eq!(back, h);
        assert_eq!(cursor, &[0xDE, 0xAD]);
    }

    #[test]
    fn bad_magic() {
        let mut bytes = encoded(&header_for(b"x"));
        bytes[0] = b'X';
        assert!(matches!(
            Header::decode(&mut &bytes[..]),
            Err(FormatError::BadMagic { .. })
        ));
        assert!(matches!(
            Header::decode(&mut &b"ART"[..]),
            Err(FormatError::BadMagic { .. })
        ));
    }

    #[test]
    fn truncated_header() {
        let bytes = encoded(&header_for(b"hello"));
        for cut in [9, 11, 100, bytes.len() - 1] {
            assert!(
                matches!(
                    Header::decode(&mut &bytes[..cut]),
                    Err(FormatError::Truncated)
                ),
                "cut={cut}"
            );
        }
    }

    #[test]
    fn invalid_widths() {
        let mut bytes = encoded(&header_for(b"hello"));
        bytes[8] = 0;
        assert!(matches!(
            Header::decode(&mut &bytes[..]),
            Err(FormatError::InvalidWidth { width: 0, .. })
        ));

        let mut bytes = encoded(&header_for(b"hello"));
        bytes[10] = 9;
        assert!(matches!(
            Header::decode(&mut &bytes[..]),
            Err(FormatError::InvalidWidth { width: 9, .. })
        ));
    }

    #[test]
    fn missing_separator() {
        let mut bytes = encoded(&header_for(b"hello"));
        let last = bytes.len() - 1;
        bytes[last] = b'!';
        assert!(matches!(
            Header::decode(&mut &bytes[..]),
            Err(FormatError::MissingSeparator { found: b'!' })
        ));
    }

    #[test]
    fn length_must_match_model_total() {
        let mut bytes = encoded(&header_for(b"hello"));
        bytes[9] = 42;
        assert!(matches!(
            Header::decode(&mut &bytes[..]),
            Err(FormatError::LengthMismatch {
                message_length: 42,
                total_count: 6
            })
        ));
    }

    #[test]
    fn terminator_count_required() {
        let mut counts = [0u64; ALPHABET_SIZE];
        counts[b'z' as usize] = 3;
        let h = Header::new(3, FrequencyModel::from_counts(counts).unwrap());
        let bytes = encoded(&h);
        assert!(matches!(
            Header::decode(&mut &bytes[..]),
            Err(FormatError::MissingTerminatorCount)
        ));
    }

    #[test]
    fn all_zero_counts() {
        let mut bytes = encoded(&header_for(b""));
        bytes[9] = 0; // message length
        bytes[11] = 0; // terminator count
        assert!(matches!(
            Header::decode(&mut &bytes[..]),
            Err(FormatError::Model(ModelError::EmptyModel))
        ));
    }
}
