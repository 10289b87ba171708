//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code waits on events, channels or timeouts, never
//! on a fixed sleep. Bounded waits use `tokio::time::timeout`.

use architectural_enforcement::{report, scan_production};

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan_production(|code, _| {
        code.contains("thread::sleep") || code.contains("time::sleep(") || code.contains("sleep_until(")
    });

    report(
        "Sleep in production code",
        &violations,
        &[
            "wait on a channel, Notify or watch instead of polling",
            "bound a wait with tokio::time::timeout",
        ],
    );
}
