//! Polling Channel Adapter
//!
//! Create the job once, then fetch its status on a fixed cadence until the
//! backend reports a terminal status or the attempt budget runs out. A failed
//! fetch is logged and counted; it never ends the loop on its own.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::lifecycle::EventSink;
use super::traits::EvaluationApi;
use crate::evaluation::EvaluationRequest;
use crate::events::EventKind;

/// Default delay between status fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Default number of status fetches before giving up
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Cadence and budget of the status loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between fetches
    pub interval: Duration,
    /// Fetches before the budget is exhausted
    pub max_attempts: u32,
}

impl PollSettings {
    /// Create settings; a zero interval is raised to one millisecond
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            max_attempts,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_POLL_ATTEMPTS)
    }
}

/// Run the polling adapter to completion
pub async fn run_polling(
    api: Arc<dyn EvaluationApi>,
    request: EvaluationRequest,
    settings: PollSettings,
    mut sink: EventSink,
) {
    let generation = sink.generation();
    let mut cancel = sink.cancel_signal();

    let created = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = api.create_evaluation(&request) => result,
    };

    let evaluation = match created {
        Ok(evaluation) => evaluation,
        Err(e) => {
            tracing::warn!(%generation, error = %e, "Evaluation creation failed");
            sink.emit(EventKind::Failed {
                message: e.to_string(),
            })
            .await;
            return;
        }
    };

    let evaluation_id = evaluation.id.clone();
    let already_terminal = evaluation.status.is_terminal();
    tracing::info!(%generation, %evaluation_id, status = %evaluation.status, "Evaluation created");
    if !sink.emit(EventKind::Created(Box::new(evaluation))).await || already_terminal {
        return;
    }

    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; consume it so the first fetch waits a period
    ticker.tick().await;

    for attempt in 1..=settings.max_attempts {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = api.fetch_evaluation(&evaluation_id) => result,
        };

        match fetched {
            Ok(evaluation) => {
                let terminal = evaluation.status.is_terminal();
                tracing::debug!(%generation, attempt, status = %evaluation.status, "Poll result");
                let delivered = sink
                    .emit(EventKind::PollResult {
                        attempt,
                        evaluation: Box::new(evaluation),
                    })
                    .await;
                if !delivered || terminal {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(%generation, attempt, error = %e, "Status fetch failed");
            }
        }
    }

    tracing::warn!(%generation, attempts = settings.max_attempts, "Polling budget exhausted");
    sink.emit(EventKind::PollBudgetExhausted {
        attempts: settings.max_attempts,
    })
    .await;
}
