//! Fuzz target for PoP token validation
//!
//! Untrusted tokens must be rejected with an error, never a panic.

#![no_main]

use arbitrary::Arbitrary;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use libfuzzer_sys::fuzz_target;
use oauth_pop::{validate_token_response, PopToken};

#[derive(Arbitrary, Debug)]
struct FuzzTokenInput {
    /// Raw token text
    raw: String,
    /// JSON-ish header and payload, encoded into a well-formed envelope
    header: String,
    payload: String,
    signature: Vec<u8>,
}

fuzz_target!(|input: FuzzTokenInput| {
    let _ = validate_token_response(&input.raw);
    let _ = PopToken::parse(&input.raw);

    let token = format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(&input.header),
        URL_SAFE_NO_PAD.encode(&input.payload),
        URL_SAFE_NO_PAD.encode(&input.signature)
    );
    if let Ok(at) = validate_token_response(&token) {
        assert!(!at.is_empty());
    }
});
