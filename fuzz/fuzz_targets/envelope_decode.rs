//! Fuzz target for `KeyEnvelope::decode`.
//!
//! Parsing arbitrary bytes as a key envelope must never panic; valid
//! encodings must round-trip.

#![no_main]

use alcove_crypto::KeyEnvelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let result = KeyEnvelope::decode(data);

    if let Ok(envelope) = result {
        let bytes = envelope.encode();
        assert_eq!(bytes.as_slice(), data);

        let roundtrip = KeyEnvelope::decode(&bytes).unwrap();
        assert_eq!(envelope, roundtrip);
    }
});
