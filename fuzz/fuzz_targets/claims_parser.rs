//! Fuzz target for PoP claim specification parsing
//!
//! Parsing must never panic, and every accepted spec must satisfy the
//! claim set invariants.

#![no_main]

use libfuzzer_sys::fuzz_target;
use oauth_pop::{parse_claims, RESOURCE_CLAIM};

fuzz_target!(|spec: &str| {
    let Ok(claims) = parse_claims(spec) else {
        return;
    };

    assert!(!claims.resource().is_empty());
    assert!(claims.get(RESOURCE_CLAIM).is_some());
    for (key, value) in claims.iter() {
        assert!(!key.is_empty() && key.trim() == key);
        assert!(!value.is_empty() && value.trim() == value);
    }

    // Display output parses back to the same set
    assert_eq!(parse_claims(&claims.to_string()).ok(), Some(claims));
});
