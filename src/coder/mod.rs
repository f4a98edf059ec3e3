// Static-model arithmetic coding core.
//
// # Modules
//
// - `model`:    byte histogram, cumulative table, precision, serialization
// - `bits`:     BitEmitter (bits -> bytes) and BitReader (bytes -> bits)
// - `interval`: the shared (low, high) register and E1/E2/E3 rescaling
// - `encoder`:  interval narrowing + bit emission with deferred E3 bits
// - `decoder`:  tag-register decoding driven by the symbol count

pub mod bits;
pub mod decoder;
pub mod encoder;
pub mod interval;
pub mod model;

pub use bits::{BitEmitter, BitReader};
pub use decoder::{ArithmeticDecoder, DecodeError, decode_payload};
pub use encoder::{ArithmeticEncoder, EncodeError, encode_payload};
pub use interval::{Interval, Rescale};
pub use model::{ALPHABET_SIZE, FrequencyModel, ModelBuilder, ModelError};
