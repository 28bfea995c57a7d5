//! Fuzz target for `Fingerprint` hex parsing.
//!
//! Parsing arbitrary strings as fingerprints must never panic; accepted
//! inputs must round-trip through hex.

#![no_main]

use alcove_crypto::Fingerprint;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let result = s.parse::<Fingerprint>();

        if let Ok(fingerprint) = result {
            let hex = fingerprint.to_hex();
            let roundtrip: Fingerprint = hex.parse().unwrap();
            assert_eq!(fingerprint, roundtrip);
        }
    }
});
