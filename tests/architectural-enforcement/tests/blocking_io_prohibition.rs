//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async functions in the core and the daemon MUST NOT block the
//! runtime. Use `tokio::fs`, `tokio::net` and async `reqwest`.
//!
//! Blocking calls are acceptable in plain functions that run before the
//! runtime is busy (config loading, PID files, socket preparation).

use architectural_enforcement::{report, scan_production, FnContext};

/// `fs::` not qualified by `tokio::`
fn blocking_fs(code: &str) -> bool {
    code.match_indices("fs::")
        .any(|(at, _)| !code[..at].ends_with("tokio::"))
}

fn blocking_io(code: &str) -> bool {
    blocking_fs(code)
        || code.contains("std::net::")
        || code.contains("reqwest::blocking")
        || code.contains("std::io::stdin()")
        || code.contains("std::process::Command")
}

#[test]
fn test_no_blocking_io_in_async_functions() {
    let violations = scan_production(|code, context| {
        context == FnContext::Async && blocking_io(code)
    });

    report(
        "Blocking I/O inside async functions",
        &violations,
        &[
            "tokio::fs::read(..).await instead of std::fs::read(..)",
            "tokio::net::UnixStream instead of std::os::unix::net",
            "move one-off setup into a plain fn called before serving",
        ],
    );
}

#[test]
fn test_detector_distinguishes_tokio_fs() {
    assert!(blocking_fs("let s = std::fs::read_to_string(p)?;"));
    assert!(blocking_fs("fs::remove_file(&path)?;"));
    assert!(!blocking_fs("tokio::fs::write(&tmp, &bytes).await?;"));
    assert!(!blocking_fs("let config = Config::default();"));
}
