#![no_main]
use artpack::coder::{FrequencyModel, decode_payload};
use artpack::container::{self, Header};
use libfuzzer_sys::fuzz_target;

/// Headers may legally promise enormous messages; skip those to stay fast.
const MAX_MESSAGE: u64 = 1 << 20;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a container. Must never panic, only return errors.
    if let Ok(header) = Header::decode(&mut &data[..]) {
        if header.message_length <= MAX_MESSAGE {
            let _ = container::decompress(data);
        }
    }

    // Arbitrary bytes as a payload under a fixed model.
    let model = FrequencyModel::build(b"fuzzing the payload decoder\0").unwrap();
    let _ = decode_payload(&model, data, model.total_count());
});
