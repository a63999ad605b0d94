//! Rerank 모듈 - 융합 상위 N개 재순위
//!
//! 크로스 인코더로 상위 N개만 다시 점수를 매겨 순서를 바꿉니다.
//! 후보를 추가하거나 빼지 않고, `fused_score`는 그대로 둔 채 `rerank_score`를 채웁니다.
//! 모델이 없거나 실패/타임아웃이면 경고 로그만 남기고 입력을 그대로 돌려줍니다.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::CrossEncoder;
use crate::config::RerankerSettings;
use crate::model::FusedResult;

pub struct Reranker {
    encoder: Option<Arc<dyn CrossEncoder>>,
    top_n: usize,
    timeout: Duration,
}

impl Reranker {
    pub fn new(encoder: Option<Arc<dyn CrossEncoder>>, top_n: usize, timeout: Duration) -> Self {
        Self {
            encoder,
            top_n,
            timeout,
        }
    }

    pub fn from_settings(encoder: Option<Arc<dyn CrossEncoder>>, settings: &RerankerSettings) -> Self {
        Self::new(
            encoder,
            settings.top_n,
            Duration::from_millis(settings.timeout_ms),
        )
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn is_available(&self) -> bool {
        self.encoder.is_some()
    }

    /// 상위 N개 재순위 (실패 시 pass-through)
    pub async fn rerank(&self, query: &str, mut result: FusedResult) -> FusedResult {
        let Some(encoder) = &self.encoder else {
            tracing::warn!("Reranker model unavailable, passing fused order through");
            return result;
        };

        let n = self.top_n.min(result.len());
        if n == 0 {
            return result;
        }

        let texts: Vec<String> = result.items[..n]
            .iter()
            .map(|item| item.candidate.text.clone())
            .collect();

        let scores = match tokio::time::timeout(self.timeout, encoder.score(query, &texts)).await {
            Ok(Ok(scores)) => scores,
            Ok(Err(e)) => {
                tracing::warn!("Reranker {} failed, passing through: {:#}", encoder.name(), e);
                return result;
            }
            Err(_) => {
                tracing::warn!(
                    "Reranker {} timed out after {:?}, passing through",
                    encoder.name(),
                    self.timeout
                );
                return result;
            }
        };

        if scores.len() != n || scores.iter().any(|s| !s.is_finite()) {
            tracing::warn!(
                "Reranker {} returned {} scores for {} candidates, passing through",
                encoder.name(),
                scores.len(),
                n
            );
            return result;
        }

        for (item, score) in result.items[..n].iter_mut().zip(scores) {
            item.rerank_score = Some(score as f64);
        }

        // 안정 정렬: 동점이면 융합 순서 유지
        result.items[..n].sort_by(|a, b| {
            let sa = a.rerank_score.unwrap_or(f64::NEG_INFINITY);
            let sb = b.rerank_score.unwrap_or(f64::NEG_INFINITY);
            sb.total_cmp(&sa)
        });

        tracing::debug!("Reranked top {} candidates with {}", n, encoder.name());
        result
    }
}
