//! Integration Test: Panic Prohibition
//!
//! **Policy**: production code propagates errors. A handler that panics is
//! caught by the router, but a panic anywhere else takes a connection or the
//! whole daemon down.

use architectural_enforcement::{report, scan_production};

const PANICKING: [&str; 5] = [".unwrap()", ".expect(", "panic!(", "todo!(", "unimplemented!("];

#[test]
fn test_no_panicking_shortcuts_in_production_code() {
    let violations = scan_production(|code, _| PANICKING.iter().any(|p| code.contains(p)));

    report(
        "Panicking shortcut in production code",
        &violations,
        &[
            "propagate with ? and a typed error",
            "use unwrap_or / unwrap_or_default / unwrap_or_else for real defaults",
            "tests are exempt (everything after #[cfg(test)])",
        ],
    );
}
