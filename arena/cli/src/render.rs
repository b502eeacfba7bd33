//! Plain-text rendering of sessions and backend listings
//!
//! Arabic text mixes wide and zero-width code points, so every column is
//! padded by display width rather than by `char` count.

use std::collections::HashMap;
use std::fmt::Write as _;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use arena_core::{
    Evaluation, HealthStatus, ModelInfo, ModelStreamState, PaginatedEvaluations, Session,
    SessionStatus,
};

const PROMPT_COLUMN: usize = 40;
const ELLIPSIS: char = '…';

// ============================================================================
// Column helpers
// ============================================================================

/// Pad `text` with spaces to `width` display columns
pub fn pad(text: &str, width: usize) -> String {
    let used = text.width();
    if used >= width {
        return text.to_string();
    }
    format!("{text}{}", " ".repeat(width - used))
}

/// Cut `text` to at most `width` display columns, marking the cut
pub fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let budget = width.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push(ELLIPSIS);
    out
}

fn score(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
}

// ============================================================================
// Live progress
// ============================================================================

/// Turns successive snapshots into one-line progress messages
///
/// Only changes are reported: a new status, a new evaluation id, or a model
/// moving to another stream state.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    status: Option<SessionStatus>,
    evaluation_id: Option<String>,
    models: HashMap<String, &'static str>,
}

impl ProgressTracker {
    /// Lines describing what changed since the previous snapshot
    pub fn observe(&mut self, session: &Session) -> Vec<String> {
        let mut lines = Vec::new();

        if self.status != Some(session.status()) {
            self.status = Some(session.status());
            let via = session
                .transport()
                .map(|kind| format!(" via {kind}"))
                .unwrap_or_default();
            lines.push(format!("● {}{via}", session.status()));
            if session.migrated() && session.status() == SessionStatus::Pending {
                lines.push("  socket lost, continuing by polling".to_string());
            }
        }

        let id = session.evaluation().map(|e| e.id.clone());
        if id.is_some() && id != self.evaluation_id {
            if let Some(id) = &id {
                lines.push(format!("  evaluation {id}"));
            }
            self.evaluation_id = id;
        }

        for (model, state) in session.model_states() {
            let label = state.label();
            if self.models.get(model) == Some(&label) {
                continue;
            }
            self.models.insert(model.clone(), label);
            let detail = match state {
                ModelStreamState::Streaming => {
                    format!(" ({} chars so far)", session.tokens_for(model).chars().count())
                }
                ModelStreamState::Finished {
                    latency_ms: Some(ms),
                    ..
                } if *ms >= 0 => format!(" in {ms}ms"),
                ModelStreamState::Failed { error } => format!(": {error}"),
                _ => String::new(),
            };
            lines.push(format!("  [{model}] {label}{detail}"));
        }

        lines
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Ranked results of a finished evaluation
pub fn evaluation_report(evaluation: &Evaluation) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Evaluation {} ({}, {}, {})",
        evaluation.id, evaluation.dialect, evaluation.category, evaluation.status
    );
    if let Some(winner) = &evaluation.winner_model_id {
        let _ = writeln!(out, "Winner: {winner}");
    }
    out.push('\n');

    let order: Vec<&str> = if evaluation.ranking.is_empty() {
        evaluation
            .model_responses
            .iter()
            .map(|r| r.model_id.as_str())
            .collect()
    } else {
        evaluation.ranking.iter().map(String::as_str).collect()
    };
    let name_width = order.iter().map(|m| m.width()).max().unwrap_or(0).max(5);

    let _ = writeln!(
        out,
        "{}  {}  {}  {}",
        pad("#", 3),
        pad("model", name_width),
        pad("overall", 7),
        "latency"
    );
    for (rank, model_id) in order.iter().enumerate() {
        let Some(response) = evaluation.response_for(model_id) else {
            continue;
        };
        let latency = match response.latency_ms {
            Some(ms) if ms >= 0 => format!("{ms}ms"),
            _ => "-".to_string(),
        };
        let _ = writeln!(
            out,
            "{}  {}  {}  {latency}",
            pad(&(rank + 1).to_string(), 3),
            pad(model_id, name_width),
            pad(&score(response.scores.overall), 7),
        );
    }

    for model_id in &order {
        let Some(response) = evaluation.response_for(model_id) else {
            continue;
        };
        let _ = writeln!(out, "\n── {model_id} ──");
        match (&response.error, &response.response_text) {
            (Some(error), _) => {
                let _ = writeln!(out, "error: {error}");
            }
            (None, Some(text)) => {
                let _ = writeln!(out, "{text}");
            }
            (None, None) => {
                let _ = writeln!(out, "(no answer)");
            }
        }
        if let Some(reasoning) = &response.scores.reasoning {
            let _ = writeln!(out, "judge: {reasoning}");
        }
    }
    out
}

/// One page of the evaluation history
pub fn history_table(listing: &PaginatedEvaluations) -> String {
    let mut out = String::new();
    for item in &listing.items {
        let winner = item.winner_model_id.as_deref().unwrap_or("-");
        let _ = writeln!(
            out,
            "{}  {}  {}  {}  {}",
            item.created_at.format("%Y-%m-%d %H:%M"),
            pad(item.status.as_str(), 9),
            pad(item.dialect.as_str(), 9),
            pad(&truncate(&item.prompt, PROMPT_COLUMN), PROMPT_COLUMN),
            winner,
        );
    }
    let _ = writeln!(
        out,
        "page {}/{} ({} total)",
        listing.page,
        listing.pages.max(1),
        listing.total
    );
    out
}

/// Model registry, one row per model
pub fn models_table(models: &[ModelInfo]) -> String {
    let id_width = models.iter().map(|m| m.id.width()).max().unwrap_or(0).max(2);
    let mut out = String::new();
    for model in models {
        let mut flags = Vec::new();
        if model.arabic_native {
            flags.push("arabic-native");
        }
        if !model.available {
            flags.push("unavailable");
        }
        let _ = writeln!(
            out,
            "{}  {}  {}  {}",
            pad(&model.id, id_width),
            pad(&model.provider, 10),
            pad(&model.tier, 8),
            flags.join(", ")
        );
    }
    out
}

/// Single-line health summary
pub fn health_line(health: &HealthStatus) -> String {
    let mut line = format!("{} (version {})", health.status, health.version);
    for (name, value) in [
        ("env", &health.environment),
        ("database", &health.database),
        ("redis", &health.redis),
    ] {
        if let Some(value) = value {
            let _ = write!(line, ", {name}: {value}");
        }
    }
    line
}
