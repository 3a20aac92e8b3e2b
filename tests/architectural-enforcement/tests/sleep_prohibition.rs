//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the reading core and the reader MUST NOT
//! call sleep methods. Background work is awaited on channels; the reader
//! applies it on a `tokio::time::interval` tick.
//! **Exceptions**: test code

use architectural_enforcement::find_violations;

const PRODUCTION_DIRS: &[&str] = &["arcana/core/src", "arcana/reader/src"];

#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_violations(PRODUCTION_DIRS, &["::sleep(", ".sleep("]);

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nWait on the channel that delivers the result, or tick an interval.");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}

#[test]
fn test_no_blocking_sleep_anywhere_in_core() {
    // Not even in helpers that only tests reach
    let violations = find_violations(&["arcana/core/src"], &["std::thread::sleep"]);
    assert!(violations.is_empty(), "{violations:#?}");
}
