//! Scripted in-memory transports for driving a real `SessionController`
//! without a network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use arena_core::{
    ApiError, Dialect, EvalCategory, EvalStatus, Evaluation, EvaluationApi, EvaluationRequest,
    FrameStream, ModelResponse, PollSettings, ScoreBreakdown, StreamConnector, TransportError,
    Transports,
};

// =============================================================================
// Fixtures
// =============================================================================

pub fn request_with_models(models: &[&str]) -> EvaluationRequest {
    EvaluationRequest::new(
        "ما الفرق بين الذكاء الاصطناعي والتعلم الآلي؟",
        Dialect::Msa,
        EvalCategory::Reasoning,
        models.iter().copied(),
    )
    .with_max_tokens(512)
}

pub fn request() -> EvaluationRequest {
    request_with_models(&["a", "b"])
}

pub fn snapshot(id: &str, status: EvalStatus) -> Evaluation {
    let mut evaluation = Evaluation::skeleton(id, &request());
    evaluation.status = status;
    evaluation
}

/// A finished evaluation with one scored response per model
pub fn finished(id: &str, request: &EvaluationRequest, winner: &str) -> Evaluation {
    let mut evaluation = Evaluation::skeleton(id, request);
    evaluation.status = EvalStatus::Completed;
    evaluation.winner_model_id = Some(winner.to_string());
    evaluation.ranking = request.models.clone();
    evaluation.model_responses = request
        .models
        .iter()
        .map(|model| ModelResponse {
            model_id: model.clone(),
            model_name: model.to_uppercase(),
            provider: "test".into(),
            response_text: Some(format!("answer from {model}")),
            latency_ms: Some(100),
            token_count: Some(3),
            cost_usd: Some(0.25),
            error: None,
            scores: ScoreBreakdown {
                overall: Some(7.5),
                ..ScoreBreakdown::default()
            },
            arabic_metrics: None,
        })
        .collect();
    evaluation.completed_at = Some(chrono::Utc::now());
    evaluation
}

pub fn start_frame(id: &str) -> String {
    serde_json::json!({"type": "evaluation_start", "evaluation_id": id}).to_string()
}

pub fn token_frame(model: &str, token: &str) -> String {
    serde_json::json!({"type": "token", "model_id": model, "token": token}).to_string()
}

pub fn error_frame(message: &str) -> String {
    serde_json::json!({"type": "error", "message": message}).to_string()
}

pub fn complete_frame(evaluation: &Evaluation) -> String {
    let mut value = serde_json::to_value(evaluation).unwrap();
    value["type"] = serde_json::json!("evaluation_complete");
    value.to_string()
}

pub fn fast_polling() -> PollSettings {
    PollSettings::new(Duration::from_millis(1), 60)
}

// =============================================================================
// Scripted socket
// =============================================================================

/// One step of a scripted connection
#[derive(Clone)]
pub enum Step {
    /// Deliver a text frame
    Frame(String),
    /// Fail the read with a transport error
    Fail(String),
    /// Wait until the test releases the gate
    Gate(Arc<Notify>),
    /// Never deliver anything else
    Hang,
}

/// What a `connect()` call does
pub enum Script {
    Refuse(String),
    Steps(Vec<Step>),
}

#[derive(Default)]
pub struct SocketLog {
    pub connects: AtomicU32,
    pub closes: AtomicU32,
    pub sent: Mutex<Vec<String>>,
}

pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    stall_close: bool,
    pub log: Arc<SocketLog>,
}

impl ScriptedConnector {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            stall_close: false,
            log: Arc::new(SocketLog::default()),
        })
    }

    pub fn with_frames(steps: Vec<Step>) -> Arc<Self> {
        Self::new(vec![Script::Steps(steps)])
    }

    /// Like `with_frames`, but `close()` never completes
    pub fn with_stalled_close(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(vec![Script::Steps(steps)].into()),
            stall_close: true,
            log: Arc::new(SocketLog::default()),
        })
    }

    pub fn connects(&self) -> u32 {
        self.log.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.log.closes.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.log.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Refuse("no script left".into()));
        match script {
            Script::Refuse(reason) => Err(TransportError::ConnectionFailed(reason)),
            Script::Steps(steps) => Ok(Box::new(ScriptedStream {
                steps: steps.into(),
                stall_close: self.stall_close,
                log: Arc::clone(&self.log),
            })),
        }
    }
}

struct ScriptedStream {
    steps: VecDeque<Step>,
    stall_close: bool,
    log: Arc<SocketLog>,
}

#[async_trait]
impl FrameStream for ScriptedStream {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.log.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.steps.pop_front()? {
                Step::Frame(text) => return Some(Ok(text)),
                Step::Fail(reason) => return Some(Err(TransportError::ReceiveFailed(reason))),
                Step::Gate(gate) => gate.notified().await,
                Step::Hang => std::future::pending::<()>().await,
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        if self.stall_close {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

// =============================================================================
// Scripted REST API
// =============================================================================

pub struct ScriptedApi {
    create: Mutex<Option<Result<Evaluation, ApiError>>>,
    fetches: Mutex<VecDeque<Result<Evaluation, ApiError>>>,
    pub created: Mutex<Vec<EvaluationRequest>>,
    fetch_calls: AtomicU32,
}

impl ScriptedApi {
    pub fn new(
        create: Result<Evaluation, ApiError>,
        fetches: Vec<Result<Evaluation, ApiError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            create: Mutex::new(Some(create)),
            fetches: Mutex::new(fetches.into()),
            created: Mutex::new(Vec::new()),
            fetch_calls: AtomicU32::new(0),
        })
    }

    /// Creates `id` as pending and reports it completed on the first fetch
    pub fn completes(id: &str, winner: &str) -> Arc<Self> {
        Self::new(
            Ok(snapshot(id, EvalStatus::Pending)),
            vec![Ok(finished(id, &request(), winner))],
        )
    }

    pub fn created_requests(&self) -> Vec<EvaluationRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvaluationApi for ScriptedApi {
    async fn create_evaluation(&self, request: &EvaluationRequest) -> Result<Evaluation, ApiError> {
        self.created.lock().unwrap().push(request.clone());
        self.create
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(ApiError::Network("unexpected second create".into())))
    }

    async fn fetch_evaluation(&self, evaluation_id: &str) -> Result<Evaluation, ApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(snapshot(evaluation_id, EvalStatus::Running)))
    }
}

// =============================================================================
// Wiring
// =============================================================================

pub fn polling_only(api: &Arc<ScriptedApi>) -> Transports {
    Transports::polling_only(Arc::clone(api) as Arc<dyn EvaluationApi>, fast_polling())
}

pub fn streaming(connector: &Arc<ScriptedConnector>, api: &Arc<ScriptedApi>) -> Transports {
    polling_only(api).with_streaming(Arc::clone(connector) as Arc<dyn StreamConnector>)
}
