//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the arena crates MUST NOT call sleep.
//! Waiting happens on I/O, on channels, or on `tokio::time::interval`.
//! The polling adapter is the only periodic task and it must use an interval.
//!
//! **Exceptions**: test code (`#[cfg(test)]` modules and `tests/` directories).

use std::fs;
use std::path::Path;

use architectural_enforcement::{test_module_start, workspace_root, PRODUCTION_DIRS};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE:");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("  - Test code (#[cfg(test)] modules)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// The polling adapter paces itself with an interval, not a sleep loop
#[test]
fn test_polling_uses_interval() {
    let path = workspace_root().join("arena/core/src/transport/polling.rs");
    let content = fs::read_to_string(&path).expect("polling adapter source");

    assert!(
        content.contains("tokio::time::interval"),
        "{} must pace status checks with tokio::time::interval",
        path.display()
    );
    assert!(
        content.contains("MissedTickBehavior::Delay"),
        "{} must not burst missed ticks after a slow fetch",
        path.display()
    );
}

/// Find all sleep() calls in production code
fn find_sleep_violations() -> Vec<String> {
    let root = workspace_root();
    let mut violations = Vec::new();
    let mut scanned = 0;

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        assert!(path.exists(), "missing source directory {}", path.display());
        scanned += check_directory(&path, &mut violations);
    }
    assert!(scanned > 0, "no Rust sources were scanned");

    violations
}

fn check_directory(dir: &Path, violations: &mut Vec<String>) -> usize {
    let mut scanned = 0;
    for entry in walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
            check_file(entry.path(), violations);
            scanned += 1;
        }
    }
    scanned
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    let lines: Vec<&str> = content.lines().collect();
    let end = test_module_start(&lines).unwrap_or(lines.len());

    for (idx, line) in lines[..end].iter().enumerate() {
        if is_sleep_call(line) {
            violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
        }
    }
}

/// Whether the code part of `line` calls a sleep function
fn is_sleep_call(line: &str) -> bool {
    let code_part = line.split("//").next().unwrap_or(line);
    code_part.contains("::sleep(") || code_part.contains(".sleep(")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_call_detection() {
        assert!(is_sleep_call(
            "    tokio::time::sleep(Duration::from_millis(10)).await;"
        ));
        assert!(is_sleep_call("    std::thread::sleep(delay);"));
        assert!(!is_sleep_call("    // no tokio::time::sleep( here"));
        assert!(!is_sleep_call("    ticker.tick().await;"));
    }

    #[test]
    fn test_test_module_is_skipped() {
        let lines = vec![
            "fn production() {}",
            "#[cfg(test)]",
            "mod tests {",
            "    fn helper() { tokio::time::sleep(d); }",
            "}",
        ];
        assert_eq!(test_module_start(&lines), Some(1));
    }
}
