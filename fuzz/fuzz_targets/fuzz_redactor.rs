//! Fuzz target for credential redaction.
//!
//! An org key embedded in arbitrary text must not survive redaction.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_redactor -- -max_total_time=600

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use machineid_gate::redaction::Redactor;

#[derive(Arbitrary, Debug)]
struct RedactorInput {
    before: String,
    key_suffix: String,
    after: String,
}

fuzz_target!(|input: RedactorInput| {
    if input.before.len() + input.after.len() > 4096 {
        return;
    }

    let suffix: String = input
        .key_suffix
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(64)
        .collect();
    if suffix.len() < 4 {
        return;
    }

    let key = format!(" org_{suffix} ");
    let text = format!("{}{key}{}", input.before, input.after);
    let redacted = Redactor::new().redact(&text);

    assert!(!redacted.contains(&key));
});
