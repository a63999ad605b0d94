//! HTTP 크로스 인코더 (재순위)
//!
//! `{model, query, documents}`를 보내고 `results[].index / relevance_score`를 받는
//! 재순위 API(TEI, Jina, Cohere 호환)를 호출합니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::CrossEncoder;
use crate::config::RerankerSettings;

pub struct HttpCrossEncoder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    #[serde(alias = "data")]
    results: Vec<RerankItem>,
}

#[derive(Debug, Deserialize)]
struct RerankItem {
    index: usize,
    #[serde(alias = "score")]
    relevance_score: f32,
}

impl HttpCrossEncoder {
    /// 설정에서 생성 (endpoint 필수)
    pub fn from_settings(settings: &RerankerSettings) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("reranker.endpoint is not set"))?;

        let api_key = match &settings.api_key_env {
            Some(var) => Some(
                std::env::var(var)
                    .with_context(|| format!("Reranker API key env {} is not set", var))?,
            ),
            None => None,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            model: settings.model.clone(),
            api_key,
        })
    }
}

/// 응답을 입력 순서로 정렬
///
/// 범위를 벗어난 index는 무시하고, 점수가 빠진 문서가 있으면 에러입니다.
fn align_scores(response: RerankResponse, doc_count: usize) -> Result<Vec<f32>> {
    let mut scores: Vec<Option<f32>> = vec![None; doc_count];
    for item in response.results {
        if let Some(slot) = scores.get_mut(item.index) {
            *slot = Some(item.relevance_score);
        }
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.ok_or_else(|| anyhow::anyhow!("Rerank response missing index {}", i)))
        .collect()
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut request = self.client.post(&self.endpoint).json(&RerankRequest {
            model: &self.model,
            query,
            documents: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Failed to send rerank request")?
            .error_for_status()
            .context("Rerank API returned an error status")?;

        let parsed: RerankResponse = response
            .json()
            .await
            .context("Failed to parse rerank response")?;

        align_scores(parsed, texts.len())
    }

    fn name(&self) -> &str {
        &self.model
    }
}
