#![no_main]

use libfuzzer_sys::fuzz_target;
use saturn_core::core_identity::{unmarshal_private_key, unmarshal_public_key, PeerId};

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must hash to a peer id without panicking
    if let Ok(public) = unmarshal_public_key(data) {
        let _ = PeerId::from_public_key(&public);
    }
    if let Ok(kp) = unmarshal_private_key(data) {
        let _ = PeerId::from_public_key(kp.public_key());
    }

    let _ = PeerId::from_bytes(data);
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = text.parse::<PeerId>();
    }
});
