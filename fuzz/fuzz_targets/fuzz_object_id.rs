#![no_main]

use dbwire::ObjectId;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(id) = ObjectId::parse_str(text) {
            assert_eq!(id.to_hex(), text.to_ascii_lowercase());
        }
    }
});
