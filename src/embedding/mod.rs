//! 임베딩 모듈 - 질의 텍스트 벡터화
//!
//! Dense Vector, Graph-Global 시그널과 제로샷 의도 분류가
//! 같은 임베딩 공간을 공유하도록 하나의 프로바이더를 씁니다.
//! 서빙 경로에서는 [`CachedEmbedder`]로 감싸 요청당 한 번만 임베딩합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env(&config.embedding)?;
//! let vector = embedder.embed("who founded RAG frameworks").await?;
//! ```

mod cache;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::EmbeddingSettings;

pub use cache::CachedEmbedder;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 2;
/// 재시도 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 200;

/// 검색 질의용 task type
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const QUERY_TASK_TYPE: &str = "RETRIEVAL_QUERY";

/// Gemini 임베딩 구현체
///
/// 질의 경로용이라 재시도 횟수와 백오프가 짧습니다.
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    settings: EmbeddingSettings,
    cooldown: Arc<Mutex<Cooldown>>,
}

/// 429 이후 모든 호출이 함께 기다리는 시점
///
/// 평상시에는 대기 없이 바로 호출합니다.
#[derive(Debug, Default)]
struct Cooldown {
    until: Option<Instant>,
}

impl Cooldown {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.until
            .and_then(|until| until.checked_duration_since(now))
            .filter(|wait| !wait.is_zero())
    }

    /// 더 늦은 시점으로만 연장
    fn extend(&mut self, until: Instant) {
        self.until = Some(self.until.map_or(until, |current| current.max(until)));
    }
}

impl GeminiEmbedding {
    /// 새 인스턴스 생성
    pub fn new(api_key: String, settings: EmbeddingSettings) -> Result<Self> {
        if settings.dimension == 0 {
            anyhow::bail!("Invalid embedding dimension: 0");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            settings,
            cooldown: Arc::new(Mutex::new(Cooldown::default())),
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key, settings.clone())
    }

    /// 쿨다운 중이면 끝날 때까지 대기 (락은 대기 동안 잡지 않음)
    async fn wait_for_cooldown(&self) {
        let remaining = self.cooldown.lock().await.remaining(Instant::now());
        if let Some(wait) = remaining {
            tracing::debug!("Embedding cooldown: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    fn request_body(&self, text: &str) -> EmbedRequest {
        EmbedRequest {
            model: self.settings.model.clone(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: QUERY_TASK_TYPE.to_string(),
            output_dimensionality: Some(self.settings.dimension),
        }
    }
}

/// Gemini API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            anyhow::bail!("Cannot embed empty text");
        }

        let request = self.request_body(text);

        for attempt in 0..=MAX_RETRIES {
            self.wait_for_cooldown().await;

            let response = self
                .client
                .post(&self.settings.endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
                .context("Failed to send embedding request")?;

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                let parsed: EmbedResponse =
                    serde_json::from_str(&body).context("Failed to parse embedding response")?;
                let values = parsed.embedding.values;
                if values.len() != self.settings.dimension {
                    anyhow::bail!(
                        "Embedding dimension mismatch: expected {}, got {}",
                        self.settings.dimension,
                        values.len()
                    );
                }
                return Ok(values);
            }

            if status.as_u16() == 429 && attempt < MAX_RETRIES {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                tracing::warn!(
                    "Embedding rate limited (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                self.cooldown.lock().await.extend(Instant::now() + backoff);
                continue;
            }

            if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                anyhow::bail!(
                    "Gemini API error ({}): {}",
                    error.error.status,
                    error.error.message
                );
            }
            anyhow::bail!("Gemini API error ({}): {}", status, body);
        }

        anyhow::bail!("Embedding failed after {} retries", MAX_RETRIES)
    }

    fn dimension(&self) -> usize {
        self.settings.dimension
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY`
/// 2. `GOOGLE_AI_API_KEY`
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable."
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 (-1.0 ~ 1.0)
///
/// 길이가 다르거나 영벡터면 0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 벡터 평균 (참조 임베딩 centroid 계산용)
pub fn mean_vector(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
        return None;
    }

    let mut sum = vec![0.0f32; dim];
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += x;
        }
    }

    let n = vectors.len() as f32;
    Some(sum.into_iter().map(|x| x / n).collect())
}

// ============================================================================
// Tests
// ============================================================================
