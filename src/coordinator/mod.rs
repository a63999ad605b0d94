//! Coordinator 모듈 - 검색 파이프라인 오케스트레이션
//!
//! classify → 시그널 동시 실행 (시그널별 타임아웃 + 공유 데드라인) → fuse → rerank
//!
//! 시그널 에러는 이 경계를 넘지 않습니다. 호출자에게 보이는 에러는
//! 잘못된 요청(`Configuration`)과 모든 시그널 실패(`TotalFailure`)뿐입니다.
//!
//! 시그널 future는 spawn하지 않고 `join_all`로 기다리므로,
//! `search()` future가 drop되면 진행 중인 백엔드 호출도 함께 취소됩니다.

mod manifest;

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{Config, RetrievalSettings, SignalTimeouts, WeightProfile, WeightTable};
use crate::error::{RetrievalError, RetrievalResult, SignalError};
use crate::fusion::FusionEngine;
use crate::intent::IntentClassifier;
use crate::model::{ClassificationMethod, FusedResult, IntentClassification, Query, SignalKind};
use crate::rerank::Reranker;
use crate::signal::{SignalContext, SignalSet};

pub use manifest::{FailedSignal, SearchState, SignalManifest, SignalOutcome};

/// 요청에서 허용하는 최대 홉 수
pub const MAX_REQUEST_HOPS: u32 = 5;

/// 가중치 프로파일 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    /// 요청의 명시 의도
    Override,
    /// 분류된 의도
    Classified,
    /// 규칙 기본값일 때 균등 프로파일
    Balanced,
}

/// 검색 결과 + 실행 기록
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub request_id: Uuid,
    pub results: FusedResult,
    pub intent: IntentClassification,
    pub profile_source: ProfileSource,
    /// 재분배 후 실제 사용된 가중치
    pub weights_used: WeightProfile,
    pub renormalized: bool,
    pub hops: u32,
    pub manifest: SignalManifest,
    pub reranked: bool,
    pub state: SearchState,
    pub elapsed_ms: u64,
}

pub struct RetrievalCoordinator {
    classifier: Arc<IntentClassifier>,
    signals: SignalSet,
    fusion: FusionEngine,
    reranker: Option<Reranker>,
    profiles: Arc<WeightTable>,
    settings: RetrievalSettings,
    timeouts: SignalTimeouts,
}

impl RetrievalCoordinator {
    /// 설정 검증 후 생성
    pub fn new(
        config: &Config,
        classifier: Arc<IntentClassifier>,
        signals: SignalSet,
    ) -> RetrievalResult<Self> {
        config.validate()?;
        if signals.is_empty() {
            return Err(RetrievalError::Configuration(
                "at least one signal retriever must be registered".to_string(),
            ));
        }

        Ok(Self {
            classifier,
            signals,
            fusion: FusionEngine::new(config.retrieval.rrf_k, config.retrieval.fallback_min_mass),
            reranker: None,
            profiles: Arc::new(config.profiles.clone()),
            settings: config.retrieval.clone(),
            timeouts: config.timeouts.clone(),
        })
    }

    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn signal_kinds(&self) -> Vec<SignalKind> {
        self.signals.kinds()
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// 검색 실행
    pub async fn search(&self, query: &Query) -> RetrievalResult<SearchResponse> {
        self.validate_query(query)?;

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("search", %request_id, namespace = query.namespace_id());
        self.run(query, request_id).instrument(span).await
    }

    async fn run(&self, query: &Query, request_id: Uuid) -> RetrievalResult<SearchResponse> {
        let started = Instant::now();
        let deadline = started + self.settings.deadline();

        // CLASSIFYING
        tracing::debug!(state = %SearchState::Classifying, "Classifying intent");
        let intent = self.classifier.classify(query).await;
        let (profile, profile_source) = self.resolve_profile(&intent);
        let hops = query
            .max_hops()
            .unwrap_or_else(|| intent.intent.default_hops())
            .min(self.settings.max_graph_hops);

        let ctx = SignalContext {
            top_k: query.top_k().saturating_mul(self.settings.candidate_multiplier),
            intent: intent.intent,
            max_hops: hops,
        };

        // RETRIEVING
        tracing::debug!(state = %SearchState::Retrieving, signals = self.signals.len(), "Dispatching signals");
        let outcomes = self.dispatch(query, &ctx, started, deadline).await;

        let mut manifest = SignalManifest::default();
        let mut lists = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (signal, outcome) in outcomes {
            manifest.record(signal, &outcome);
            match outcome {
                SignalOutcome::Succeeded(list) => lists.push(list),
                SignalOutcome::Failed(err) => failures.push(err),
            }
        }

        if manifest.all_failed() {
            let unavailable: Vec<SignalKind> = failures
                .iter()
                .filter(|f| !f.is_timeout())
                .map(SignalError::signal)
                .collect();
            tracing::warn!(
                state = %SearchState::Failed,
                ?unavailable,
                "All {} signals failed ({} timed out)",
                manifest.attempted.len(),
                manifest.timed_out.len()
            );
            return Err(RetrievalError::TotalFailure {
                attempted: manifest.attempted,
                failures,
            });
        }

        // FUSING
        tracing::debug!(state = %SearchState::Fusing, "Fusing {} lists", lists.len());
        let (mut results, effective) = self.fusion.fuse_with_fallback(&lists, &profile);

        // RERANKING
        let mut reranked = false;
        if let Some(reranker) = &self.reranker {
            tracing::debug!(state = %SearchState::Reranking, "Reranking top {}", reranker.top_n());
            results = reranker.rerank(query.text(), results).await;
            reranked = results.items.iter().any(|i| i.rerank_score.is_some());
        }

        results.truncate(query.top_k());
        let elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            intent = %intent.intent,
            method = ?intent.method,
            results = results.len(),
            succeeded = manifest.succeeded.len(),
            timed_out = manifest.timed_out.len(),
            failed = manifest.failed.len(),
            renormalized = effective.renormalized,
            elapsed_ms,
            "Search complete"
        );

        Ok(SearchResponse {
            request_id,
            results,
            intent,
            profile_source,
            weights_used: effective.weights,
            renormalized: effective.renormalized,
            hops,
            manifest,
            reranked,
            state: SearchState::Done,
            elapsed_ms,
        })
    }

    /// 요청 검증 (백엔드 호출 전)
    fn validate_query(&self, query: &Query) -> RetrievalResult<()> {
        let invalid = |msg: String| -> RetrievalResult<()> { Err(RetrievalError::Configuration(msg)) };

        if query.text().trim().is_empty() {
            return invalid("query must not be empty".to_string());
        }
        if query.namespace_id().trim().is_empty() {
            return invalid("namespace_id must not be empty".to_string());
        }
        if query.top_k() == 0 || query.top_k() > self.settings.max_top_k {
            return invalid(format!(
                "top_k must be between 1 and {} (got {})",
                self.settings.max_top_k,
                query.top_k()
            ));
        }
        if let Some(hops) = query.max_hops() {
            if !(1..=MAX_REQUEST_HOPS).contains(&hops) {
                return invalid(format!(
                    "max_hops must be between 1 and {} (got {})",
                    MAX_REQUEST_HOPS, hops
                ));
            }
        }
        if query.relationship_types().iter().any(|t| t.trim().is_empty()) {
            return invalid("relationship_types must not contain empty names".to_string());
        }
        Ok(())
    }

    /// 명시 의도 > 분류된 의도 > 균등 프로파일
    fn resolve_profile(&self, intent: &IntentClassification) -> (WeightProfile, ProfileSource) {
        match intent.method {
            ClassificationMethod::Override => {
                (*self.profiles.for_intent(intent.intent), ProfileSource::Override)
            }
            ClassificationMethod::RuleDefault => {
                (*self.profiles.balanced(), ProfileSource::Balanced)
            }
            _ => (*self.profiles.for_intent(intent.intent), ProfileSource::Classified),
        }
    }

    /// 모든 시그널 동시 실행
    ///
    /// 각 시그널은 `min(시작 + 시그널 예산, 공유 데드라인)`까지 기다립니다.
    async fn dispatch(
        &self,
        query: &Query,
        ctx: &SignalContext,
        started: Instant,
        deadline: Instant,
    ) -> Vec<(SignalKind, SignalOutcome)> {
        let tasks = self.signals.iter().map(|(signal, retriever)| {
            let budget = self.timeouts.for_signal(signal);
            let signal_deadline = (started + budget).min(deadline);

            async move {
                let result =
                    tokio::time::timeout_at(signal_deadline, retriever.retrieve(query, ctx)).await;
                let elapsed = started.elapsed();

                let outcome = match result {
                    Ok(Ok(mut list)) => {
                        list.signal = signal;
                        list.candidates.truncate(ctx.top_k);
                        for candidate in &mut list.candidates {
                            candidate.source_signal = signal;
                        }
                        tracing::debug!(
                            %signal,
                            outcome = "succeeded",
                            candidates = list.len(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Signal finished"
                        );
                        SignalOutcome::Succeeded(list)
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(
                            %signal,
                            outcome = "failed",
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Signal unavailable: {:#}",
                            e
                        );
                        SignalOutcome::Failed(SignalError::Unavailable {
                            signal,
                            reason: format!("{:#}", e),
                        })
                    }
                    Err(_) => {
                        tracing::warn!(
                            %signal,
                            outcome = "timed_out",
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Signal timed out"
                        );
                        SignalOutcome::Failed(SignalError::Timeout {
                            signal,
                            elapsed_ms: elapsed.as_millis() as u64,
                        })
                    }
                };
                (signal, outcome)
            }
        });

        join_all(tasks).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::backend::CrossEncoder;
    use crate::intent::FineTunedStage;
    use crate::model::Intent;
    use crate::signal::{DenseVectorRetriever, SignalRetriever};
    use crate::test_support::{
        FakeCrossEncoder, FakeEmbedder, FakeIntentModel, FakeVectorIndex, ScriptedRetriever,
    };

    fn config() -> Config {
        Config::default()
    }

    fn classifier(config: &Config, prediction: Option<(Intent, f32)>) -> Arc<IntentClassifier> {
        let mut classifier = IntentClassifier::new(&config.classifier);
        if let Some((intent, confidence)) = prediction {
            let model = Arc::new(FakeIntentModel::new(intent, confidence));
            classifier = classifier.with_stage(Arc::new(FineTunedStage::new(model)));
        }
        Arc::new(classifier)
    }

    fn coordinator(
        config: &Config,
        prediction: Option<(Intent, f32)>,
        retrievers: &[Arc<ScriptedRetriever>],
    ) -> RetrievalCoordinator {
        let mut signals = SignalSet::new();
        for r in retrievers {
            signals.insert(r.clone() as Arc<dyn SignalRetriever>);
        }
        RetrievalCoordinator::new(config, classifier(config, prediction), signals).unwrap()
    }

    fn scenario_a() -> Vec<Arc<ScriptedRetriever>> {
        vec![
            Arc::new(ScriptedRetriever::ok(SignalKind::Vector, &["A", "B"])),
            Arc::new(ScriptedRetriever::ok(SignalKind::Lexical, &["B", "C"])),
            Arc::new(ScriptedRetriever::ok(SignalKind::GraphLocal, &["A"])),
            Arc::new(ScriptedRetriever::ok(SignalKind::GraphGlobal, &[])),
        ]
    }

    fn ids(response: &SearchResponse) -> Vec<&str> {
        response
            .results
            .items
            .iter()
            .map(|i| i.candidate.id.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_factual_search_fuses_all_signals() {
        let config = config();
        let coord = coordinator(&config, Some((Intent::Factual, 0.9)), &scenario_a());

        let response = coord.search(&Query::new("who founded RAG", "ns")).await.unwrap();

        assert_eq!(response.intent.intent, Intent::Factual);
        assert_eq!(response.intent.method, ClassificationMethod::FineTuned);
        assert_eq!(response.profile_source, ProfileSource::Classified);
        assert_eq!(response.weights_used, config.profiles.factual);
        assert!(!response.renormalized);
        assert_eq!(response.state, SearchState::Done);
        assert_eq!(response.hops, 2);

        assert_eq!(response.results.len(), 3);
        assert_eq!(response.results.position("C"), Some(2));
        assert_eq!(response.results.get("C").unwrap().contributing_signals.len(), 1);

        // 빈 목록도 성공
        assert_eq!(response.manifest.succeeded.len(), 4);
        assert!(response.manifest.succeeded.contains(&SignalKind::GraphGlobal));
        assert_eq!(response.manifest.candidate_counts[&SignalKind::GraphGlobal], 0);
        assert!(response.manifest.failed.is_empty());
        assert!(response.manifest.timed_out.is_empty());
    }

    #[tokio::test]
    async fn test_low_damping_ranks_double_first_place_on_top() {
        let mut config = config();
        config.retrieval.rrf_k = 1.0;
        let coord = coordinator(&config, Some((Intent::Factual, 0.9)), &scenario_a());

        let response = coord.search(&Query::new("who founded RAG", "ns")).await.unwrap();
        assert_eq!(ids(&response), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_all_signals_timing_out_is_total_failure() {
        let mut config = config();
        config.timeouts.vector_ms = 50;
        config.timeouts.lexical_ms = 50;
        config.timeouts.graph_local_ms = 50;
        config.timeouts.graph_global_ms = 50;

        let slow = Duration::from_secs(2);
        let retrievers: Vec<_> = SignalKind::ALL
            .iter()
            .map(|s| Arc::new(ScriptedRetriever::ok(*s, &["x"]).with_delay(slow)))
            .collect();
        let coord = coordinator(&config, Some((Intent::Factual, 0.9)), &retrievers);

        let started = std::time::Instant::now();
        let err = coord.search(&Query::new("who founded RAG", "ns")).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(1));

        match err {
            RetrievalError::TotalFailure { attempted, failures } => {
                assert_eq!(attempted.len(), 4);
                assert_eq!(failures.len(), 4);
                assert!(failures.iter().all(|f| f.is_timeout()));
            }
            other => panic!("expected total failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_signals_unavailable_is_total_failure() {
        let retrievers = vec![
            Arc::new(ScriptedRetriever::failing(SignalKind::Vector, "index offline")),
            Arc::new(ScriptedRetriever::failing(SignalKind::Lexical, "database locked")),
        ];
        let coord = coordinator(&config(), None, &retrievers);

        let err = coord.search(&Query::new("who founded RAG", "ns")).await.unwrap_err();
        assert!(matches!(err, RetrievalError::TotalFailure { ref attempted, .. } if attempted.len() == 2));
        assert_eq!(err.to_string(), "all 2 attempted signals failed");
    }

    #[tokio::test]
    async fn test_partial_failure_is_recorded_in_manifest() {
        let mut config = config();
        config.timeouts.graph_local_ms = 50;

        let retrievers = vec![
            Arc::new(ScriptedRetriever::failing(SignalKind::Vector, "index offline")),
            Arc::new(ScriptedRetriever::ok(SignalKind::Lexical, &["x", "y"])),
            Arc::new(
                ScriptedRetriever::ok(SignalKind::GraphLocal, &["z"])
                    .with_delay(Duration::from_secs(2)),
            ),
            Arc::new(ScriptedRetriever::ok(SignalKind::GraphGlobal, &[])),
        ];
        let coord = coordinator(&config, Some((Intent::Factual, 0.9)), &retrievers);

        let response = coord.search(&Query::new("who founded RAG", "ns")).await.unwrap();

        assert_eq!(ids(&response), vec!["x", "y"]);
        assert_eq!(response.manifest.attempted.len(), 4);
        assert_eq!(
            response.manifest.succeeded,
            vec![SignalKind::Lexical, SignalKind::GraphGlobal]
        );
        assert_eq!(response.manifest.timed_out, vec![SignalKind::GraphLocal]);
        assert_eq!(response.manifest.failed.len(), 1);
        assert_eq!(response.manifest.failed[0].signal, SignalKind::Vector);
        assert!(response.manifest.failed[0].reason.contains("index offline"));
        // 빈 vector/graph 가중치가 lexical로 재분배됨
        assert!(response.renormalized);
        assert!((response.weights_used.lexical - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_shared_deadline_caps_signal_budget() {
        let mut config = config();
        config.retrieval.deadline_ms = 100;

        let slow = Arc::new(
            ScriptedRetriever::ok(SignalKind::GraphLocal, &["z"]).with_delay(Duration::from_secs(3)),
        );
        let retrievers = vec![
            Arc::new(ScriptedRetriever::ok(SignalKind::Vector, &["a"])),
            slow.clone(),
        ];
        let coord = coordinator(&config, Some((Intent::Factual, 0.9)), &retrievers);

        let started = std::time::Instant::now();
        let response = coord.search(&Query::new("who founded RAG", "ns")).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(response.manifest.timed_out, vec![SignalKind::GraphLocal]);
        assert_eq!(ids(&response), vec!["a"]);
        assert_eq!(slow.finishes(), 0);
    }

    #[tokio::test]
    async fn test_slow_classifier_does_not_consume_signal_deadline() {
        let mut config = config();
        config.retrieval.deadline_ms = 400;

        let model = Arc::new(
            FakeIntentModel::new(Intent::Summary, 0.99).with_delay(Duration::from_millis(600)),
        );
        let classifier = IntentClassifier::new(&config.classifier)
            .with_stage(Arc::new(FineTunedStage::new(model)));

        let mut signals = SignalSet::new();
        for kind in SignalKind::ALL {
            let retriever = ScriptedRetriever::ok(kind, &["a"]).with_delay(Duration::from_millis(20));
            signals.insert(Arc::new(retriever) as Arc<dyn SignalRetriever>);
        }
        let coord = RetrievalCoordinator::new(&config, Arc::new(classifier), signals).unwrap();

        let response = coord.search(&Query::new("who founded RAG", "ns")).await.unwrap();

        assert_eq!(response.intent.method, ClassificationMethod::Rules);
        assert_eq!(response.manifest.succeeded.len(), 4);
        assert!(response.manifest.timed_out.is_empty());
        assert_eq!(ids(&response), vec!["a"]);
    }

    #[tokio::test]
    async fn test_vector_index_error_is_reported_as_failed() {
        let vector = DenseVectorRetriever::new(
            Arc::new(FakeEmbedder::new(4)),
            Arc::new(FakeVectorIndex::failing("table listing failed")),
        );
        let signals = SignalSet::new()
            .with(Arc::new(vector))
            .with(Arc::new(ScriptedRetriever::ok(SignalKind::Lexical, &["b"])));
        let config = config();
        let coord =
            RetrievalCoordinator::new(&config, classifier(&config, None), signals).unwrap();

        let response = coord.search(&Query::new("who founded RAG", "ns")).await.unwrap();

        assert_eq!(response.manifest.succeeded, vec![SignalKind::Lexical]);
        assert_eq!(response.manifest.failed.len(), 1);
        assert_eq!(response.manifest.failed[0].signal, SignalKind::Vector);
        assert!(response.manifest.failed[0].reason.contains("table listing failed"));
    }

    #[tokio::test]
    async fn test_dropping_search_cancels_in_flight_signals() {
        let slow = Arc::new(
            ScriptedRetriever::ok(SignalKind::Vector, &["a"]).with_delay(Duration::from_secs(5)),
        );
        let coord = Arc::new(coordinator(&config(), None, &[slow.clone()]));

        let handle = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move { coord.search(&Query::new("who founded RAG", "ns")).await })
        };

        while slow.starts() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        assert_eq!(slow.finishes(), 0);
        assert_eq!(slow.cancellations(), 1);
    }

    #[tokio::test]
    async fn test_repeated_search_is_stable() {
        let coord = coordinator(&config(), Some((Intent::Factual, 0.9)), &scenario_a());
        let query = Query::new("who founded RAG", "ns");

        let first = coord.search(&query).await.unwrap();
        let second = coord.search(&query).await.unwrap();

        assert_eq!(first.results, second.results);
        assert_eq!(first.weights_used, second.weights_used);
        assert_ne!(first.request_id, second.request_id);
    }

    #[tokio::test]
    async fn test_invalid_queries_never_reach_signals() {
        let retriever = Arc::new(ScriptedRetriever::ok(SignalKind::Vector, &["a"]));
        let coord = coordinator(&config(), None, &[retriever.clone()]);

        let bad = vec![
            Query::new("   ", "ns"),
            Query::new("who founded RAG", ""),
            Query::new("who founded RAG", "ns").with_top_k(0),
            Query::new("who founded RAG", "ns").with_top_k(101),
            Query::new("who founded RAG", "ns").with_max_hops(0),
            Query::new("who founded RAG", "ns").with_max_hops(6),
            Query::new("who founded RAG", "ns").with_relationship_types(vec![" ".to_string()]),
        ];
        for query in bad {
            let err = coord.search(&query).await.unwrap_err();
            assert!(matches!(err, RetrievalError::Configuration(_)), "{:?}", query);
        }
        assert_eq!(retriever.starts(), 0);
    }

    #[tokio::test]
    async fn test_override_intent_selects_profile_and_hops() {
        let config = config();
        let model = Arc::new(FakeIntentModel::new(Intent::Factual, 0.99));
        let classifier = Arc::new(
            IntentClassifier::new(&config.classifier)
                .with_stage(Arc::new(FineTunedStage::new(model.clone()))),
        );
        let retrievers = scenario_a();
        let mut signals = SignalSet::new();
        for r in &retrievers {
            signals.insert(r.clone() as Arc<dyn SignalRetriever>);
        }
        let coord = RetrievalCoordinator::new(&config, classifier, signals).unwrap();

        let query = Query::new("who founded RAG", "ns").with_intent(Intent::Keyword);
        let response = coord.search(&query).await.unwrap();

        assert_eq!(model.calls(), 0);
        assert_eq!(response.profile_source, ProfileSource::Override);
        assert_eq!(response.weights_used, config.profiles.keyword);
        assert_eq!(response.hops, 1);
        assert_eq!(retrievers[2].last_ctx().unwrap().max_hops, 1);
    }

    #[tokio::test]
    async fn test_requested_hops_are_capped_by_config() {
        let retrievers = scenario_a();
        let coord = coordinator(&config(), Some((Intent::Factual, 0.9)), &retrievers);

        let query = Query::new("who founded RAG", "ns").with_max_hops(5).with_top_k(4);
        let response = coord.search(&query).await.unwrap();

        assert_eq!(response.hops, 3);
        let ctx = retrievers[2].last_ctx().unwrap();
        assert_eq!(ctx.max_hops, 3);
        assert_eq!(ctx.top_k, 8);
        assert_eq!(ctx.intent, Intent::Factual);
    }

    #[tokio::test]
    async fn test_rule_default_uses_balanced_profile() {
        let retrievers = vec![
            Arc::new(ScriptedRetriever::ok(SignalKind::Vector, &["a"])),
            Arc::new(ScriptedRetriever::ok(SignalKind::Lexical, &["b"])),
            Arc::new(ScriptedRetriever::ok(SignalKind::GraphLocal, &["c"])),
            Arc::new(ScriptedRetriever::ok(SignalKind::GraphGlobal, &["d"])),
        ];
        let coord = coordinator(&config(), None, &retrievers);

        let query = Query::new("tell me something interesting about deployment pipelines today", "ns");
        let response = coord.search(&query).await.unwrap();

        assert_eq!(response.intent.method, ClassificationMethod::RuleDefault);
        assert_eq!(response.profile_source, ProfileSource::Balanced);
        assert_eq!(response.weights_used, WeightProfile::balanced());
    }

    #[tokio::test]
    async fn test_results_truncated_to_top_k() {
        let retrievers = vec![Arc::new(ScriptedRetriever::ok(
            SignalKind::Vector,
            &["a", "b", "c", "d", "e", "f"],
        ))];
        let coord = coordinator(&config(), None, &retrievers);

        let query = Query::new("who founded RAG", "ns").with_top_k(2);
        let response = coord.search(&query).await.unwrap();

        assert_eq!(ids(&response), vec!["a", "b"]);
        // over-fetch 한도(2 * 2)를 넘는 후보는 잘림
        assert_eq!(response.manifest.candidate_counts[&SignalKind::Vector], 4);
    }

    #[tokio::test]
    async fn test_reranker_reorders_results() {
        let encoder: Arc<dyn CrossEncoder> =
            Arc::new(FakeCrossEncoder::new().with_score("C", 0.99).with_score("A", 0.1));
        let coord = coordinator(&config(), Some((Intent::Factual, 0.9)), &scenario_a())
            .with_reranker(Reranker::new(Some(encoder), 10, Duration::from_secs(1)));

        let response = coord.search(&Query::new("who founded RAG", "ns")).await.unwrap();

        assert!(response.reranked);
        assert_eq!(response.results.items[0].candidate.id, "C");
        assert_eq!(response.results.len(), 3);
    }

    #[tokio::test]
    async fn test_reranker_failure_keeps_fused_order() {
        let config = config();
        let plain = coordinator(&config, Some((Intent::Factual, 0.9)), &scenario_a());
        let encoder: Arc<dyn CrossEncoder> = Arc::new(FakeCrossEncoder::failing());
        let with_failing = coordinator(&config, Some((Intent::Factual, 0.9)), &scenario_a())
            .with_reranker(Reranker::new(Some(encoder), 10, Duration::from_secs(1)));

        let query = Query::new("who founded RAG", "ns");
        let expected = plain.search(&query).await.unwrap();
        let response = with_failing.search(&query).await.unwrap();

        assert!(!response.reranked);
        assert_eq!(response.results, expected.results);
    }

    #[test]
    fn test_new_rejects_empty_signal_set_and_bad_profiles() {
        let config = config();
        let err = RetrievalCoordinator::new(&config, classifier(&config, None), SignalSet::new())
            .err()
            .unwrap();
        assert!(matches!(err, RetrievalError::Configuration(_)));

        let mut bad = config.clone();
        bad.profiles.factual = WeightProfile::new(0.5, 0.5, 0.5, 0.0);
        let signals = SignalSet::new().with(Arc::new(ScriptedRetriever::ok(SignalKind::Vector, &[])));
        let err = RetrievalCoordinator::new(&bad, classifier(&bad, None), signals)
            .err()
            .unwrap();
        assert!(matches!(err, RetrievalError::Configuration(_)));
    }
}
