//! Fuzz target for the TOML configuration loader
//!
//! Run with: cargo +nightly fuzz run fuzz_config

#![no_main]

use libfuzzer_sys::fuzz_target;
use aegis_dns_shield::ShieldConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(config) = ShieldConfig::from_toml(text) {
            // Validation must never panic, whatever was parsed
            let _ = config.validate();
            let _ = config.epoch();
        }
    }
});
