#![no_main]
use libfuzzer_sys::fuzz_target;
use zimfile_rs::core::varint;

fuzz_target!(|data: &[u8]| {
    if let Ok((value, used)) = varint::decode(data) {
        // Accepted input is canonical: re-encoding reproduces it exactly
        let mut out = Vec::new();
        assert_eq!(varint::encode(value, &mut out), used);
        assert_eq!(&out[..], &data[..used]);
    }
});
