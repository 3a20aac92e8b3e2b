//! Integration Test: Headless Core
//!
//! **Policy**: The reading core never talks to a terminal. Everything a user
//! sees leaves the core as a `ConductorMessage`; everything they do enters
//! it as a `SurfaceEvent`. Diagnostics go through `tracing`.

use architectural_enforcement::find_violations;

#[test]
fn test_core_has_no_terminal_io() {
    let violations = find_violations(
        &["arcana/core/src"],
        &["println!", "eprintln!", "print!(", "eprint!(", "std::io::stdin", "std::io::stdout"],
    );

    assert!(
        violations.is_empty(),
        "Terminal I/O in the reading core:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_core_does_not_depend_on_reader() {
    let violations = find_violations(&["arcana/core/src"], &["arcana_reader"]);
    assert!(violations.is_empty(), "{violations:#?}");
}
