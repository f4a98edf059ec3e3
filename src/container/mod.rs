// Self-describing container around the arithmetic-coded payload.
//
// - `header`: magic, message length, serialized model, separator
// - `codec`:  two-pass compression and one-pass decompression over streams

pub mod codec;
pub mod header;

pub use codec::{
    CodecError, CompressSummary, DEFAULT_BUFFER_SIZE, DecompressSummary, compress, compress_stream,
    compress_to, decompress, decompress_stream,
};
pub use header::{ARTPACK_MAGIC, FormatError, Header, TERMINATOR};
