//! Bootstrap 모듈 - 설정으로부터 검색 엔진 조립
//!
//! - SQLite (`knowledge.db`): FTS5 키워드 인덱스 + 지식 그래프
//! - LanceDB (`vectors/`): 벡터 인덱스
//! - Gemini 임베딩: API 키가 있을 때만 (Vector, Graph-Global, 제로샷 분류)
//!
//! API 키가 없으면 Lexical + Graph-Local 두 시그널로 동작합니다.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::backend::{CrossEncoder, HttpCrossEncoder, LanceVectorIndex, SqliteGraphStore, SqliteLexicalIndex};
use crate::config::Config;
use crate::coordinator::RetrievalCoordinator;
use crate::embedding::{has_api_key, CachedEmbedder, EmbeddingProvider, GeminiEmbedding};
use crate::intent::{IntentCache, IntentClassifier, ZeroShotStage, DEFAULT_REFERENCES};
use crate::rerank::Reranker;
use crate::signal::{
    DenseVectorRetriever, GraphGlobalRetriever, GraphLocalRetriever, SignalSet,
    SparseLexicalRetriever,
};

/// 열린 저장소 핸들
pub struct Backends {
    pub lexical: Arc<SqliteLexicalIndex>,
    pub graph: Arc<SqliteGraphStore>,
    pub vectors: Arc<LanceVectorIndex>,
}

/// 저장소 상태 (CLI status)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendStatus {
    pub passages: usize,
    pub vectors: usize,
    pub entities: usize,
    pub relationships: usize,
    pub communities: usize,
}

impl Backends {
    pub async fn open(config: &Config) -> Result<Self> {
        let db_path = config.storage.knowledge_db();
        let lexical = SqliteLexicalIndex::open(&db_path)
            .with_context(|| format!("Failed to open lexical index at {:?}", db_path))?;
        let graph = SqliteGraphStore::open(&db_path)
            .with_context(|| format!("Failed to open knowledge graph at {:?}", db_path))?;

        let vectors_dir = config.storage.vectors_dir();
        let vectors = LanceVectorIndex::open(&vectors_dir, config.embedding.dimension)
            .await
            .with_context(|| format!("Failed to open vector index at {:?}", vectors_dir))?;

        tracing::debug!("Backends opened under {:?}", config.storage.data_dir);

        Ok(Self {
            lexical: Arc::new(lexical),
            graph: Arc::new(graph),
            vectors: Arc::new(vectors),
        })
    }

    pub async fn status(&self) -> Result<BackendStatus> {
        let (entities, relationships, communities) = self.graph.counts()?;
        Ok(BackendStatus {
            passages: self.lexical.count()?,
            vectors: self.vectors.count().await?,
            entities,
            relationships,
            communities,
        })
    }
}

/// 환경변수에 키가 있으면 Gemini 임베딩 생성
///
/// 분류기와 두 시그널이 같은 질의 벡터를 쓰도록 캐시로 감쌉니다.
pub fn embedder_from_env(config: &Config) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    if !has_api_key() {
        tracing::warn!("No embedding API key found, running without vector and graph-global signals");
        return Ok(None);
    }
    let embedder = GeminiEmbedding::from_env(&config.embedding)?;
    Ok(Some(Arc::new(CachedEmbedder::new(Arc::new(embedder), &config.cache))))
}

/// 분류기 조립: (제로샷) → 규칙, 캐시 포함
pub async fn build_classifier(
    config: &Config,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
) -> IntentClassifier {
    let mut classifier =
        IntentClassifier::new(&config.classifier).with_cache(IntentCache::new(&config.cache));

    match embedder {
        Some(embedder) if config.classifier.zero_shot_enabled => {
            match ZeroShotStage::build(embedder, &DEFAULT_REFERENCES).await {
                Ok(stage) => classifier = classifier.with_stage(Arc::new(stage)),
                Err(e) => tracing::warn!("Zero-shot stage disabled: {:#}", e),
            }
        }
        _ => tracing::debug!("Zero-shot stage not configured"),
    }

    classifier
}

/// 재순위기 조립 (설정이 꺼져 있으면 None)
pub fn build_reranker(config: &Config) -> Option<Reranker> {
    if !config.reranker.enabled {
        return None;
    }

    let encoder: Option<Arc<dyn CrossEncoder>> = match HttpCrossEncoder::from_settings(&config.reranker) {
        Ok(encoder) => Some(Arc::new(encoder)),
        Err(e) => {
            tracing::warn!("Reranker model unavailable: {:#}", e);
            None
        }
    };
    let reranker = Reranker::from_settings(encoder, &config.reranker);
    if !reranker.is_available() {
        tracing::warn!("Reranker enabled without a model, fused order will pass through");
    }
    Some(reranker)
}

/// 시그널 집합 조립
pub fn build_signals(
    config: &Config,
    backends: &Backends,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
) -> SignalSet {
    let mut signals = SignalSet::new()
        .with(Arc::new(SparseLexicalRetriever::new(backends.lexical.clone())))
        .with(Arc::new(GraphLocalRetriever::new(
            backends.graph.clone(),
            config.retrieval.max_seed_entities,
        )));

    if let Some(embedder) = embedder {
        signals.insert(Arc::new(DenseVectorRetriever::new(
            embedder.clone(),
            backends.vectors.clone(),
        )));
        signals.insert(Arc::new(GraphGlobalRetriever::new(
            embedder,
            backends.graph.clone(),
        )));
    }

    signals
}

/// 설정 검증 → 저장소 열기 → 코디네이터 생성
pub async fn build_coordinator(
    config: &Config,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
) -> Result<RetrievalCoordinator> {
    config.validate().context("Invalid configuration")?;

    let backends = Backends::open(config).await?;
    let classifier = build_classifier(config, embedder.clone()).await;
    let signals = build_signals(config, &backends, embedder);

    tracing::info!(
        "Retrieval engine ready: signals {:?}, classifier stages {:?}",
        signals.kinds(),
        classifier.stage_methods()
    );

    let mut coordinator = RetrievalCoordinator::new(config, Arc::new(classifier), signals)?;
    if let Some(reranker) = build_reranker(config) {
        coordinator = coordinator.with_reranker(reranker);
    }
    Ok(coordinator)
}
