#![no_main]

use libfuzzer_sys::fuzz_target;
use saturn_core::core_identity::{
    import_private_key_pem, import_private_key_raw, import_public_key_pem, import_public_key_raw,
};

fuzz_target!(|data: &[u8]| {
    // Raw DER paths take the bytes as they are
    let _ = import_private_key_raw(data);
    let _ = import_public_key_raw(data);

    // PEM paths need text
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = import_private_key_pem(text);
        let _ = import_public_key_pem(text);
    }
});
