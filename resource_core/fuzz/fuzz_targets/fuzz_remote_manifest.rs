#![no_main]

use libfuzzer_sys::fuzz_target;
use resource_core::codec;

fuzz_target!(|data: &[u8]| {
    if let Ok(manifest) = codec::decode_remote(data) {
        assert!(codec::encode_remote(&manifest).is_ok());
    }
});
