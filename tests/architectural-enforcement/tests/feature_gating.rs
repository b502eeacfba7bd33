//! Integration Test: WebSocket Feature Gating
//!
//! **Policy**: Crates that only the WebSocket transport needs MUST be optional
//! dependencies of `arena-core`, enabled by its `websocket` feature, and MUST
//! NOT be imported outside `transport/websocket`.
//!
//! A polling-only build (`--no-default-features`) then compiles none of them.

use std::fs;
use std::path::Path;

use architectural_enforcement::{workspace_root, PRODUCTION_DIRS};

/// Manifest name and Rust path of each WebSocket-only crate
const WEBSOCKET_ONLY: [(&str, &str); 2] = [
    ("tokio-tungstenite", "tokio_tungstenite"),
    ("futures", "futures"),
];

const WEBSOCKET_DIR: &str = "transport/websocket";

#[test]
fn test_websocket_crates_are_optional_and_feature_gated() {
    let manifest_path = workspace_root().join("arena/core/Cargo.toml");
    let manifest = fs::read_to_string(&manifest_path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", manifest_path.display()));

    let feature_line = manifest
        .lines()
        .find(|line| line.trim_start().starts_with("websocket ="))
        .expect("arena-core must declare a `websocket` feature");

    for (name, _) in WEBSOCKET_ONLY {
        let declaration = manifest
            .lines()
            .find(|line| line.trim_start().starts_with(&format!("{name} =")))
            .unwrap_or_else(|| panic!("`{name}` is not declared in arena-core"));

        assert!(
            declaration.contains("optional = true"),
            "`{name}` must be optional: {declaration}"
        );
        assert!(
            feature_line.contains(&format!("\"{name}\"")),
            "`websocket` feature must enable `{name}`: {feature_line}"
        );
    }
}

#[test]
fn test_websocket_crates_not_used_outside_websocket_module() {
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for entry in walkdir::WalkDir::new(root.join(dir))
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("rs") || in_websocket_module(path) {
                continue;
            }
            let Ok(content) = fs::read_to_string(path) else {
                continue;
            };
            for (idx, line) in content.lines().enumerate() {
                if let Some(krate) = websocket_import(line) {
                    violations.push(format!("{}:{} - {krate}", path.display(), idx + 1));
                }
            }
        }
    }

    assert!(
        violations.is_empty(),
        "WebSocket-only crates used outside {WEBSOCKET_DIR}:\n  {}",
        violations.join("\n  ")
    );
}

fn in_websocket_module(path: &Path) -> bool {
    path.to_string_lossy().replace('\\', "/").contains(WEBSOCKET_DIR)
}

/// The WebSocket-only crate referenced on `line`, ignoring comments
fn websocket_import(line: &str) -> Option<&'static str> {
    let code_part = line.split("//").next().unwrap_or(line);
    WEBSOCKET_ONLY
        .iter()
        .map(|(_, path)| *path)
        .find(|path| code_part.contains(&format!("{path}::")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_detection() {
        assert_eq!(websocket_import("use futures::{SinkExt, StreamExt};"), Some("futures"));
        assert_eq!(
            websocket_import("    let (ws, _) = tokio_tungstenite::connect_async(url).await?;"),
            Some("tokio_tungstenite")
        );
        assert_eq!(websocket_import("use tokio_stream::StreamExt;"), None);
        assert_eq!(websocket_import("// futures::join! would also work"), None);
    }

    #[test]
    fn test_websocket_module_detection() {
        assert!(in_websocket_module(Path::new("arena/core/src/transport/websocket/mod.rs")));
        assert!(!in_websocket_module(Path::new("arena/core/src/transport/polling.rs")));
    }
}
