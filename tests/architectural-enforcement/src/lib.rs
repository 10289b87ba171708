//! Architectural Enforcement
//!
//! Line-based source scanners behind the integration tests in `tests/`.
//! They enforce rules that the compiler and clippy cannot:
//! - No blocking I/O inside async functions
//! - No panicking shortcuts (`unwrap`, `expect`, `panic!`) in production code
//! - No sleeping as a substitute for waiting on an event
//!
//! The scanners are heuristics. Everything from the first `#[cfg(test)]` in a
//! file onward is treated as test code, matching how the crates lay out
//! their unit tests.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees checked by every rule, relative to the workspace root
pub const PRODUCTION_DIRS: [&str; 2] = ["steward/core/src", "steward/daemon/src"];

/// Kind of function body a line belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnContext {
    /// Outside any function (imports, items, statics)
    Module,
    /// Inside a plain `fn`
    Sync,
    /// Inside an `async fn`
    Async,
}

/// One rule violation
#[derive(Clone, Debug)]
pub struct Violation {
    /// File the line is in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// Classify a line as a function signature
///
/// Visibility, `const` and `unsafe` qualifiers are skipped.
#[must_use]
pub fn fn_signature(line: &str) -> Option<FnContext> {
    let mut rest = line.trim_start();
    loop {
        let before = rest;
        for qualifier in ["pub(crate) ", "pub(super) ", "pub ", "const ", "unsafe "] {
            if let Some(stripped) = rest.strip_prefix(qualifier) {
                rest = stripped;
            }
        }
        if rest == before {
            break;
        }
    }
    if rest.starts_with("async fn ") {
        Some(FnContext::Async)
    } else if rest.starts_with("fn ") {
        Some(FnContext::Sync)
    } else {
        None
    }
}

/// Code portion of each production line with its function context
///
/// Comments are stripped; scanning stops at the first `#[cfg(test)]`.
#[must_use]
pub fn production_lines(source: &str) -> Vec<(usize, &str, FnContext)> {
    let mut context = FnContext::Module;
    let mut lines = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if let Some(kind) = fn_signature(line) {
            context = kind;
        } else if line.starts_with('}') && context != FnContext::Module {
            // A closing brace in column 0 ends a free function
            context = FnContext::Module;
        } else if line.starts_with("impl") || line.starts_with("pub struct") {
            context = FnContext::Module;
        }

        let code = line.split("//").next().unwrap_or(line);
        if !code.trim().is_empty() {
            lines.push((idx + 1, code, context));
        }
    }
    lines
}

/// Every `.rs` file under `dir`
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// Apply `is_violation` to every production line of every production file
///
/// # Panics
///
/// Panics if a production directory is missing, so a moved crate cannot
/// silently pass.
pub fn scan_production<F>(is_violation: F) -> Vec<Violation>
where
    F: Fn(&str, FnContext) -> bool,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        let dir = root.join(dir);
        assert!(dir.is_dir(), "missing production directory {}", dir.display());

        for path in rust_files(&dir) {
            let Ok(source) = fs::read_to_string(&path) else {
                continue;
            };
            for (line, code, context) in production_lines(&source) {
                if is_violation(code, context) {
                    violations.push(Violation {
                        path: path.clone(),
                        line,
                        text: code.trim().to_string(),
                    });
                }
            }
        }
    }
    violations
}

/// Print violations with guidance and fail the test if there are any
///
/// # Panics
///
/// Panics when `violations` is not empty.
pub fn report(rule: &str, violations: &[Violation], guidance: &[&str]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n{rule}\n");
    for violation in violations {
        eprintln!("  {violation}");
    }
    eprintln!();
    for hint in guidance {
        eprintln!("  - {hint}");
    }

    panic!(
        "\nFound {} violation(s) of '{rule}'.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_detection() {
        assert_eq!(fn_signature("    pub async fn run(&self) {"), Some(FnContext::Async));
        assert_eq!(fn_signature("pub(crate) fn unrouted() {"), Some(FnContext::Sync));
        assert_eq!(fn_signature("    const fn new() -> Self {"), Some(FnContext::Sync));
        assert_eq!(fn_signature("    let f = fn_ptr;"), None);
        assert_eq!(fn_signature("    // fn commented()"), None);
    }

    #[test]
    fn test_contexts_follow_functions() {
        let source = "\
use std::fs;

async fn bad() {
    std::fs::read(\"x\");
}

fn fine() {
    std::fs::read(\"x\"); // trailing comment
}

#[cfg(test)]
mod tests {
    async fn ignored() { std::fs::read(\"x\"); }
}
";
        let lines = production_lines(source);
        let contexts: Vec<(usize, FnContext)> =
            lines.iter().map(|(n, _, c)| (*n, *c)).collect();
        assert_eq!(
            contexts,
            vec![
                (1, FnContext::Module),
                (3, FnContext::Async),
                (4, FnContext::Async),
                (5, FnContext::Module),
                (7, FnContext::Sync),
                (8, FnContext::Sync),
                (9, FnContext::Module),
            ]
        );
        assert!(!lines[5].1.contains("comment"));
    }

    #[test]
    fn test_impl_methods_keep_their_context() {
        let source = "\
impl Server {
    pub async fn serve(&self) {
        work().await;
    }

    fn shutdown(&self) {
        cleanup();
    }
}
";
        let contexts: Vec<FnContext> = production_lines(source)
            .into_iter()
            .map(|(_, _, c)| c)
            .collect();
        assert_eq!(
            contexts,
            vec![
                FnContext::Module,
                FnContext::Async,
                FnContext::Async,
                FnContext::Async,
                FnContext::Sync,
                FnContext::Sync,
                FnContext::Sync,
                FnContext::Module,
            ]
        );
    }
}
