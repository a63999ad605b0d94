//! Intent 모듈 - 질의 의도 분류 캐스케이드
//!
//! 단계 순서:
//! 1. 파인튜닝 모델 (있을 때만)
//! 2. 제로샷 (참조 임베딩 코사인 유사도)
//! 3. 정규식 규칙 (항상 성공)
//!
//! 각 단계는 `(의도, 신뢰도)`를 돌려주고, 신뢰도가 임계값 이상인 첫 단계에서 멈춥니다.
//! 단계 내부 에러나 단계 타임아웃(`stage_timeout_ms`)은 경고 로그만 남기고
//! 다음 단계로 넘어가므로 `classify`는 실패하지 않습니다.

mod cache;
mod rules;
mod zero_shot;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::ClassifierSettings;
use crate::model::{ClassificationMethod, Intent, IntentClassification, Query};

pub use cache::IntentCache;
pub use rules::RuleStage;
pub use zero_shot::{ZeroShotStage, DEFAULT_REFERENCES};

// ============================================================================
// Stage Traits
// ============================================================================

/// 캐스케이드의 한 단계
#[async_trait]
pub trait ClassifierStage: Send + Sync {
    fn method(&self) -> ClassificationMethod;

    /// `None`이면 이 단계는 판단하지 않음
    async fn predict(&self, text: &str) -> Result<Option<(Intent, f32)>>;
}

/// 파인튜닝 의도 분류 모델 (단일 forward pass)
#[async_trait]
pub trait IntentModel: Send + Sync {
    async fn predict(&self, text: &str) -> Result<(Intent, f32)>;

    fn name(&self) -> &str;
}

/// `IntentModel`을 캐스케이드 단계로 감쌈
pub struct FineTunedStage {
    model: Arc<dyn IntentModel>,
}

impl FineTunedStage {
    pub fn new(model: Arc<dyn IntentModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ClassifierStage for FineTunedStage {
    fn method(&self) -> ClassificationMethod {
        ClassificationMethod::FineTuned
    }

    async fn predict(&self, text: &str) -> Result<Option<(Intent, f32)>> {
        self.model.predict(text).await.map(Some)
    }
}

// ============================================================================
// IntentClassifier
// ============================================================================

pub struct IntentClassifier {
    stages: Vec<Arc<dyn ClassifierStage>>,
    rules: RuleStage,
    threshold: f32,
    stage_timeout: Duration,
    cache: Option<IntentCache>,
}

impl IntentClassifier {
    /// 규칙 단계만 있는 분류기
    pub fn new(settings: &ClassifierSettings) -> Self {
        Self {
            stages: Vec::new(),
            rules: RuleStage::new(settings.rule_confidence),
            threshold: settings.confidence_threshold,
            stage_timeout: settings.stage_timeout(),
            cache: None,
        }
    }

    /// 규칙 단계 앞에 단계 추가 (추가한 순서대로 시도)
    pub fn with_stage(mut self, stage: Arc<dyn ClassifierStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_cache(mut self, cache: IntentCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// 모델 단계 이름 목록 (규칙 단계 제외)
    pub fn stage_methods(&self) -> Vec<ClassificationMethod> {
        self.stages.iter().map(|s| s.method()).collect()
    }

    /// 질의 분류 (명시 의도가 있으면 그대로 사용)
    pub async fn classify(&self, query: &Query) -> IntentClassification {
        if let Some(intent) = query.intent_override() {
            return IntentClassification::new(intent, 1.0, ClassificationMethod::Override);
        }
        self.classify_text(query.text()).await
    }

    /// 텍스트 분류 (캐시 → 캐스케이드)
    pub async fn classify_text(&self, text: &str) -> IntentClassification {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(text) {
                tracing::debug!("Intent cache hit: {} ({:?})", hit.intent, hit.method);
                return hit;
            }
        }

        let (result, degraded) = self.run_cascade(text).await;

        // 단계가 실패/타임아웃으로 건너뛰어진 결과는 캐시하지 않음
        if let Some(cache) = self.cache.as_ref().filter(|_| !degraded) {
            cache.insert(text, result.clone());
        }
        result
    }

    /// (결과, 건너뛴 단계가 있었는지)
    async fn run_cascade(&self, text: &str) -> (IntentClassification, bool) {
        let mut degraded = false;
        for stage in &self.stages {
            let predicted = match tokio::time::timeout(self.stage_timeout, stage.predict(text)).await {
                Ok(predicted) => predicted,
                Err(_) => {
                    tracing::warn!(
                        "Classifier stage {:?} timed out after {:?}, falling through",
                        stage.method(),
                        self.stage_timeout
                    );
                    degraded = true;
                    continue;
                }
            };

            match predicted {
                Ok(Some((intent, confidence))) => {
                    let result = IntentClassification::new(intent, confidence, stage.method());
                    if result.confidence >= self.threshold {
                        tracing::debug!(
                            "Intent {} from {:?} (confidence {:.2})",
                            result.intent,
                            result.method,
                            result.confidence
                        );
                        return (result, degraded);
                    }
                    tracing::debug!(
                        "{:?} below threshold ({:.2} < {:.2}), falling through",
                        result.method,
                        result.confidence,
                        self.threshold
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Classifier stage {:?} failed: {:#}", stage.method(), e);
                    degraded = true;
                }
            }
        }

        (self.rules.classify(text), degraded)
    }
}

// ============================================================================
// Tests
// ============================================================================
