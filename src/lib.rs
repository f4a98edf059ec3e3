//! Artpack: static-model arithmetic coding in Rust.
//!
//! The crate provides:
//! - The arithmetic coding core (`coder`): frequency model, bit I/O,
//!   encoder and decoder
//! - The `.artpack` container (`container`): header framing and the
//!   two-pass compress / one-pass decompress pipeline
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use artpack::container;
//!
//! let data = b"abracadabra abracadabra";
//! let packed = container::compress(data).unwrap();
//! let unpacked = container::decompress(&packed).unwrap();
//! assert_eq!(unpacked, data);
//! ```

pub mod coder;
pub mod container;
pub mod io;

#[cfg(feature = "cli")]
pub mod cli;

pub use coder::FrequencyModel;
pub use container::CodecError;
pub use io::{compress_file, decompress_file};
