//! Server 모듈 - HTTP 검색 API
//!
//! - `POST /search`: 융합 검색
//! - `GET /health`: 상태 확인
//!
//! 실패는 항상 구조화된 JSON 에러로 응답합니다 (부분 결과의 200 없음).
//! 잘못된 요청은 400 `invalid_request`, 모든 시그널 실패는 503 `total_failure`.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::config::WeightProfile;
use crate::coordinator::{
    FailedSignal, ProfileSource, RetrievalCoordinator, SearchResponse, SearchState,
};
use crate::error::RetrievalError;
use crate::model::{
    CandidateMetadata, FusedCandidate, Intent, IntentClassification, Query, SignalContribution,
    SignalKind,
};

#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<RetrievalCoordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<RetrievalCoordinator>) -> Self {
        Self { coordinator }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .with_state(state)
}

/// 주소에 바인드해서 서빙 (종료 시그널 전까지)
pub async fn serve(coordinator: Arc<RetrievalCoordinator>, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    let addr = listener.local_addr().context("Failed to read local address")?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, router(AppState::new(coordinator)))
        .await
        .context("HTTP server error")
}

async fn health() -> StatusCode {
    StatusCode::OK
}

// ============================================================================
// Request / Response
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRequest {
    pub query: String,
    pub namespace_id: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub intent_override: Option<Intent>,
    #[serde(default)]
    pub relationship_types: Vec<String>,
    #[serde(default)]
    pub max_hops: Option<u32>,
    #[serde(default)]
    pub include_paths: bool,
}

impl SearchRequest {
    fn into_query(self, default_top_k: usize) -> Query {
        let mut query = Query::new(self.query, self.namespace_id)
            .with_top_k(self.top_k.unwrap_or(default_top_k))
            .with_relationship_types(self.relationship_types)
            .with_paths(self.include_paths);
        if let Some(intent) = self.intent_override {
            query = query.with_intent(intent);
        }
        if let Some(hops) = self.max_hops {
            query = query.with_max_hops(hops);
        }
        query
    }
}

#[derive(Debug, Serialize)]
pub struct ResultItem {
    pub id: String,
    pub text: String,
    pub fused_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
    pub contributing_signals: Vec<ContributionBody>,
    pub metadata: CandidateMetadata,
}

#[derive(Debug, Serialize)]
pub struct ContributionBody {
    pub signal: SignalKind,
    pub rank: usize,
    pub source_score: f64,
}

impl From<&SignalContribution> for ContributionBody {
    fn from(c: &SignalContribution) -> Self {
        Self {
            signal: c.signal,
            rank: c.rank,
            source_score: c.source_score,
        }
    }
}

impl From<FusedCandidate> for ResultItem {
    fn from(item: FusedCandidate) -> Self {
        Self {
            contributing_signals: item.contributing_signals.iter().map(Into::into).collect(),
            id: item.candidate.id,
            text: item.candidate.text,
            fused_score: item.fused_score,
            rerank_score: item.rerank_score,
            metadata: item.candidate.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchBody {
    pub request_id: Uuid,
    pub results: Vec<ResultItem>,
    pub intent_used: IntentClassification,
    pub profile_source: ProfileSource,
    pub weights_used: WeightProfile,
    pub renormalized: bool,
    pub hops: u32,
    pub reranked: bool,
    pub signals_attempted: Vec<SignalKind>,
    pub signals_succeeded: Vec<SignalKind>,
    pub signals_timed_out: Vec<SignalKind>,
    pub signals_failed: Vec<FailedSignal>,
    pub candidate_counts: BTreeMap<SignalKind, usize>,
    pub state: SearchState,
    pub elapsed_ms: u64,
}

impl From<SearchResponse> for SearchBody {
    fn from(r: SearchResponse) -> Self {
        Self {
            request_id: r.request_id,
            results: r.results.items.into_iter().map(ResultItem::from).collect(),
            intent_used: r.intent,
            profile_source: r.profile_source,
            weights_used: r.weights_used,
            renormalized: r.renormalized,
            hops: r.hops,
            reranked: r.reranked,
            signals_attempted: r.manifest.attempted,
            signals_succeeded: r.manifest.succeeded,
            signals_timed_out: r.manifest.timed_out,
            signals_failed: r.manifest.failed,
            candidate_counts: r.manifest.candidate_counts,
            state: r.state,
            elapsed_ms: r.elapsed_ms,
        }
    }
}

async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchBody>, ApiError> {
    let Json(request) = payload?;
    let query = request.into_query(state.coordinator.settings().default_top_k);
    let response = state.coordinator.search(&query).await?;
    Ok(Json(response.into()))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
struct ErrorBody {
    error_code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    signals_attempted: Option<Vec<SignalKind>>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error_code: &'static str,
    message: String,
    signals_attempted: Option<Vec<SignalKind>>,
}

impl ApiError {
    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error_code: "invalid_request",
            message: message.into(),
            signals_attempted: None,
        }
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::Configuration(message) => Self::invalid_request(message),
            RetrievalError::TotalFailure { attempted, failures } => {
                let message = failures
                    .iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                Self {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    error_code: "total_failure",
                    message: format!("all attempted signals failed: {}", message),
                    signals_attempted: Some(attempted),
                }
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error_code: self.error_code.to_string(),
            message: self.message,
            signals_attempted: self.signals_attempted,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Tests
// ============================================================================
