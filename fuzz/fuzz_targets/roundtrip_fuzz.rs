#![no_main]
use artpack::container;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let packed = container::compress(data).unwrap();
    let unpacked = container::decompress(&packed).unwrap();
    assert_eq!(unpacked, data);
});
