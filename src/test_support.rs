//! 테스트용 가짜 협력자 (in-memory)

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::backend::{
    CommunityHit, CrossEncoder, HitPayload, IndexHit, KnowledgeGraph, Subgraph, VectorIndex,
};
use crate::embedding::EmbeddingProvider;
use crate::intent::IntentModel;
use crate::model::{Candidate, CandidateMetadata, Intent, Provenance, Query, RankedList, SignalKind};
use crate::signal::{SignalContext, SignalRetriever};

// ============================================================================
// Candidates
// ============================================================================

/// 텍스트 = id 인 후보 (콘텐츠 키는 id로 결정)
pub fn candidate(signal: SignalKind, id: &str, score: f64) -> Candidate {
    Candidate {
        id: id.to_string(),
        text: id.to_string(),
        source_signal: signal,
        source_score: score,
        metadata: CandidateMetadata {
            document_id: None,
            chunk_id: None,
            namespace_id: "ns".to_string(),
            provenance: Provenance::default(),
        },
    }
}

/// 주어진 순서의 순위 목록 (점수 1/(i+1))
pub fn list(signal: SignalKind, ids: &[&str]) -> RankedList {
    let candidates = ids
        .iter()
        .enumerate()
        .map(|(i, id)| candidate(signal, id, 1.0 / (i as f64 + 1.0)))
        .collect();
    RankedList::new(signal, candidates)
}

// ============================================================================
// Embedding
// ============================================================================

pub struct FakeEmbedder {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
            fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("embedding backend unreachable");
        }
        if let Some(v) = self.vectors.get(text) {
            return Ok(v.clone());
        }
        // 알 수 없는 텍스트는 바이트 합 기반 결정적 벡터
        let seed: u32 = text.bytes().map(u32::from).sum();
        Ok((0..self.dimension)
            .map(|i| ((seed + i as u32) % 7) as f32 + 1.0)
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "fake-embedder"
    }
}

// ============================================================================
// Indexes / Graph
// ============================================================================

#[derive(Default)]
pub struct FakeVectorIndex {
    hits: Vec<(String, IndexHit)>,
    error: Option<String>,
}

impl FakeVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_hit(mut self, namespace: &str, id: &str, score: f64, text: &str) -> Self {
        self.hits.push((
            namespace.to_string(),
            IndexHit {
                id: id.to_string(),
                score,
                payload: HitPayload {
                    text: text.to_string(),
                    document_id: None,
                    chunk_id: None,
                },
            },
        ));
        self
    }
}

#[async_trait]
impl VectorIndex for FakeVectorIndex {
    async fn search(&self, _vector: &[f32], namespace: &str, top_k: usize) -> Result<Vec<IndexHit>> {
        if let Some(message) = &self.error {
            anyhow::bail!("{}", message);
        }
        let mut hits: Vec<IndexHit> = self
            .hits
            .iter()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, hit)| hit.clone())
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[derive(Default)]
pub struct FakeGraph {
    communities: Vec<CommunityHit>,
}

impl FakeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_community(mut self, id: &str, summary: &str, score: f64, members: &[&str]) -> Self {
        self.communities.push(CommunityHit {
            summary_id: id.to_string(),
            summary: summary.to_string(),
            score,
            member_entities: members.iter().map(|m| m.to_string()).collect(),
        });
        self
    }
}

#[async_trait]
impl KnowledgeGraph for FakeGraph {
    async fn match_entities(&self, _namespace: &str, _text: &str, _limit: usize) -> Result<Vec<String>> {
        Ok(vec![])
    }

    async fn neighbors(
        &self,
        _namespace: &str,
        _entity_ids: &[String],
        _max_hops: u32,
        _relationship_types: &[String],
    ) -> Result<Subgraph> {
        Ok(Subgraph::default())
    }

    async fn community_summaries(
        &self,
        _namespace: &str,
        _query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<CommunityHit>> {
        let mut hits = self.communities.clone();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

// ============================================================================
// CrossEncoder
// ============================================================================

/// 텍스트별 고정 점수 (모르는 텍스트는 0.0)
#[derive(Default)]
pub struct FakeCrossEncoder {
    scores: HashMap<String, f32>,
    fail: bool,
    delay: Option<Duration>,
    fixed_len: Option<usize>,
}

impl FakeCrossEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_score(mut self, text: &str, score: f32) -> Self {
        self.scores.insert(text.to_string(), score);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 입력 수와 무관하게 n개 점수 반환
    pub fn with_fixed_len(mut self, n: usize) -> Self {
        self.fixed_len = Some(n);
        self
    }
}

#[async_trait]
impl CrossEncoder for FakeCrossEncoder {
    async fn score(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("cross-encoder model not loaded");
        }
        if let Some(n) = self.fixed_len {
            return Ok(vec![0.5; n]);
        }
        Ok(texts
            .iter()
            .map(|t| self.scores.get(t).copied().unwrap_or(0.0))
            .collect())
    }

    fn name(&self) -> &str {
        "fake-cross-encoder"
    }
}

// ============================================================================
// Intent Model
// ============================================================================

pub struct FakeIntentModel {
    prediction: Option<(Intent, f32)>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeIntentModel {
    pub fn new(intent: Intent, confidence: f32) -> Self {
        Self {
            prediction: Some((intent, confidence)),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            prediction: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentModel for FakeIntentModel {
    async fn predict(&self, _text: &str) -> Result<(Intent, f32)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.prediction
            .ok_or_else(|| anyhow::anyhow!("intent model weights missing"))
    }

    fn name(&self) -> &str {
        "fake-intent-model"
    }
}

// ============================================================================
// Scripted Retriever
// ============================================================================

/// 정해진 결과를 (지연 후) 돌려주는 시그널
pub struct ScriptedRetriever {
    kind: SignalKind,
    result: std::result::Result<Vec<Candidate>, String>,
    delay: Option<Duration>,
    started: AtomicUsize,
    finished: AtomicUsize,
    cancelled: Arc<AtomicUsize>,
    last_ctx: Mutex<Option<SignalContext>>,
}

/// 완료 전에 drop되면 취소 횟수 증가
struct CancelGuard {
    counter: Arc<AtomicUsize>,
    armed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl ScriptedRetriever {
    fn with_result(kind: SignalKind, result: std::result::Result<Vec<Candidate>, String>) -> Self {
        Self {
            kind,
            result,
            delay: None,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            cancelled: Arc::new(AtomicUsize::new(0)),
            last_ctx: Mutex::new(None),
        }
    }

    pub fn ok(kind: SignalKind, ids: &[&str]) -> Self {
        Self::with_result(kind, Ok(list(kind, ids).candidates))
    }

    pub fn failing(kind: SignalKind, message: &str) -> Self {
        Self::with_result(kind, Err(message.to_string()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn starts(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finishes(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn cancellations(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn last_ctx(&self) -> Option<SignalContext> {
        self.last_ctx.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalRetriever for ScriptedRetriever {
    fn kind(&self) -> SignalKind {
        self.kind
    }

    async fn retrieve(&self, _query: &Query, ctx: &SignalContext) -> Result<RankedList> {
        self.started.fetch_add(1, Ordering::SeqCst);
        *self.last_ctx.lock().unwrap() = Some(ctx.clone());

        let mut guard = CancelGuard {
            counter: Arc::clone(&self.cancelled),
            armed: true,
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        guard.armed = false;
        self.finished.fetch_add(1, Ordering::SeqCst);

        match &self.result {
            Ok(candidates) => Ok(RankedList::new(self.kind, candidates.clone())),
            Err(message) => anyhow::bail!("{}", message),
        }
    }
}
