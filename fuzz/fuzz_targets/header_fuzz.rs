#![no_main]
use artpack::container::Header;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(header) = Header::decode(&mut &data[..]) else {
        return;
    };
    assert_eq!(header.model.total_count(), header.message_length);

    // Widths may be non-minimal on input; the canonical form must be stable.
    let mut encoded = Vec::new();
    header.encode(&mut encoded).unwrap();
    assert_eq!(encoded.len(), header.encoded_len());
    let again = Header::decode(&mut &encoded[..]).unwrap();
    assert_eq!(again, header);
});
