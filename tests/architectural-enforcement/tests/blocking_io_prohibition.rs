//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Production code in the arena crates MUST NOT use blocking I/O.
//! **Required**: `tokio::fs`, `tokio::net` and async `reqwest`, never
//! `std::fs`, `std::net` or `reqwest::blocking`.

use std::fs;
use std::path::Path;

use architectural_enforcement::{test_module_start, workspace_root, PRODUCTION_DIRS};

/// Test that production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n❌ FORBIDDEN blocking I/O:");
        eprintln!("  - std::fs::read_to_string(), std::fs::File");
        eprintln!("  - std::net::TcpStream");
        eprintln!("  - std::process::Command::output()");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::read_to_string().await");
        eprintln!("  - tokio_tungstenite::connect_async().await");
        eprintln!("  - reqwest::Client::get().send().await");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Find all blocking I/O calls in production code
fn find_blocking_io_violations() -> Vec<String> {
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        assert!(path.exists(), "missing source directory {}", path.display());
        check_directory(&path, &mut violations);
    }

    violations
}

fn check_directory(dir: &Path, violations: &mut Vec<String>) {
    for entry in walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
            check_file(entry.path(), violations);
        }
    }
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    let lines: Vec<&str> = content.lines().collect();
    let end = test_module_start(&lines).unwrap_or(lines.len());

    for (idx, line) in lines[..end].iter().enumerate() {
        if let Some(kind) = blocking_kind(line) {
            violations.push(format!(
                "{}:{} - {kind}: {}",
                path.display(),
                idx + 1,
                line.trim()
            ));
        }
    }
}

/// Classify a blocking call on `line`, ignoring comments
fn blocking_kind(line: &str) -> Option<&'static str> {
    let code_part = line.split("//").next().unwrap_or(line);

    if code_part.contains("std::fs::") || code_part.contains("use std::fs") {
        return Some("Blocking file I/O");
    }
    if code_part.contains("std::net::") || code_part.contains("use std::net") {
        return Some("Blocking network I/O");
    }
    if code_part.contains("std::process::Command") {
        return Some("Blocking process I/O");
    }
    if code_part.contains("reqwest::blocking") {
        return Some("Blocking HTTP client");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_io_detection() {
        assert_eq!(
            blocking_kind("    let contents = std::fs::read_to_string(\"file.txt\")?;"),
            Some("Blocking file I/O")
        );
        assert_eq!(
            blocking_kind("use std::net::TcpStream;"),
            Some("Blocking network I/O")
        );
        assert_eq!(
            blocking_kind("    let client = reqwest::blocking::Client::new();"),
            Some("Blocking HTTP client")
        );
    }

    #[test]
    fn test_async_io_is_allowed() {
        assert_eq!(
            blocking_kind("        match tokio::fs::read_to_string(&config_path).await {"),
            None
        );
        assert_eq!(blocking_kind("    // std::fs::read is what we avoid"), None);
    }
}
