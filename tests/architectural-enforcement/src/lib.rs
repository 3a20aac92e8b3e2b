//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code
//! - The reading core stays headless (no terminal I/O)
//!
//! The helpers here walk the workspace sources and hand the tests only the
//! production lines of each file.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// All `.rs` files below a workspace-relative directory
#[must_use]
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let root = workspace_root().join(dir);
    if !root.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Production lines of a source file as `(line_number, code)`
///
/// Everything from the first `#[cfg(test)]` on is test code and skipped, as
/// are line comments and doc comments.
#[must_use]
pub fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    production_lines_of(&content)
}

/// [`production_lines`] over source text
#[must_use]
pub fn production_lines_of(content: &str) -> Vec<(usize, String)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .filter_map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line);
            if code.trim().is_empty() {
                None
            } else {
                Some((idx + 1, code.to_string()))
            }
        })
        .collect()
}

/// Lines of the given directories containing any of the patterns
#[must_use]
pub fn find_violations(dirs: &[&str], patterns: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for dir in dirs {
        for path in rust_files(dir) {
            for (line_number, code) in production_lines(&path) {
                if patterns.iter().any(|p| code.contains(p)) {
                    violations.push(format!(
                        "{}:{} - {}",
                        path.display(),
                        line_number,
                        code.trim()
                    ));
                }
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_module_is_skipped() {
        let source = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() { sleep(); }\n}\n";
        let lines = production_lines_of(source);
        assert_eq!(lines, vec![(1, "fn a() {}".to_string())]);
    }

    #[test]
    fn test_comments_are_skipped() {
        let source = "// std::thread::sleep(d)\nlet x = 1; // .sleep(\n";
        let lines = production_lines_of(source);
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].1.contains("sleep"));
    }

    #[test]
    fn test_sources_are_found() {
        assert!(!rust_files("arcana/core/src").is_empty());
    }
}
