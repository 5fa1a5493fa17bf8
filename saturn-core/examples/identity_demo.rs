//! Generate an identity key, push it through every encoding and print the
//! peer id
//!
//! Run with:
//! ```bash
//! cargo run --example identity_demo -- 2048
//! ```

use rand::rngs::OsRng;
use saturn_core::core_identity::{
    export_private_key_pem, export_private_key_raw, export_public_key_pem, import_private_key_pem,
    import_private_key_raw, KeyPair, PeerId,
};
use saturn_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use tracing::{error, info};

fn main() {
    let config = LogConfig::new(LogLevel::Debug).with_target(false);
    init_logging_with_config(config).expect("Failed to initialize logging");

    let bits = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(2048);

    let kp = match KeyPair::generate(bits, &mut OsRng) {
        Ok(kp) => kp,
        Err(e) => {
            error!(error = %e, "key generation failed");
            std::process::exit(1);
        }
    };

    let pem = export_private_key_pem(&kp).expect("PEM export");
    let from_pem = import_private_key_pem(&pem).expect("PEM import");
    info!(matches = (from_pem == kp), "private key PEM round trip");

    let der = export_private_key_raw(&kp).expect("raw export");
    let from_der = import_private_key_raw(&der).expect("raw import");
    info!(matches = (from_der == kp), bytes = der.len(), "private key raw round trip");

    let peer_id = PeerId::from_public_key(kp.public_key()).expect("peer id");
    info!(%peer_id, bits = kp.bits(), "identity ready");

    println!("{}", export_public_key_pem(&kp).expect("public PEM export"));
}
