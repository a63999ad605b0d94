//! Signal 모듈 - 독립 검색 시그널 어댑터
//!
//! 네 시그널 모두 `SignalRetriever` 하나로 호출됩니다.
//! 코디네이터는 `SignalKind -> Arc<dyn SignalRetriever>` 맵만 알고,
//! 다섯 번째 시그널은 어댑터 하나와 `SignalKind` 항목 하나로 추가됩니다.
//!
//! 약속:
//! - 매치가 없으면 빈 `RankedList` (에러 아님)
//! - 백엔드 불가/입력 오류만 `Err`
//! - 타임아웃은 호출자가 겁니다

mod graph_global;
mod graph_local;
mod lexical;
mod vector;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::backend::IndexHit;
use crate::model::{Candidate, CandidateMetadata, Intent, Provenance, Query, RankedList, SignalKind};

pub use graph_global::GraphGlobalRetriever;
pub use graph_local::GraphLocalRetriever;
pub use lexical::SparseLexicalRetriever;
pub use vector::DenseVectorRetriever;

/// 요청 단위 검색 파라미터 (코디네이터가 결정)
#[derive(Debug, Clone, PartialEq)]
pub struct SignalContext {
    /// 시그널별 요청 후보 수 (over-fetch 적용 후)
    pub top_k: usize,
    pub intent: Intent,
    /// 그래프 확장 홉 수
    pub max_hops: u32,
}

/// 시그널 공통 인터페이스
#[async_trait]
pub trait SignalRetriever: Send + Sync {
    fn kind(&self) -> SignalKind;

    async fn retrieve(&self, query: &Query, ctx: &SignalContext) -> Result<RankedList>;
}

/// 등록된 시그널 집합 (SignalKind 순서로 순회)
#[derive(Clone, Default)]
pub struct SignalSet {
    retrievers: BTreeMap<SignalKind, Arc<dyn SignalRetriever>>,
}

impl SignalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 같은 kind가 이미 있으면 교체
    pub fn with(mut self, retriever: Arc<dyn SignalRetriever>) -> Self {
        self.insert(retriever);
        self
    }

    pub fn insert(&mut self, retriever: Arc<dyn SignalRetriever>) {
        self.retrievers.insert(retriever.kind(), retriever);
    }

    pub fn get(&self, kind: SignalKind) -> Option<&Arc<dyn SignalRetriever>> {
        self.retrievers.get(&kind)
    }

    pub fn kinds(&self) -> Vec<SignalKind> {
        self.retrievers.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalKind, &Arc<dyn SignalRetriever>)> {
        self.retrievers.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.retrievers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retrievers.is_empty()
    }
}

/// 인덱스 히트 → 후보
pub(crate) fn candidate_from_hit(hit: IndexHit, signal: SignalKind, namespace: &str) -> Candidate {
    Candidate {
        id: hit.id,
        text: hit.payload.text,
        source_signal: signal,
        source_score: hit.score,
        metadata: CandidateMetadata {
            document_id: hit.payload.document_id,
            chunk_id: hit.payload.chunk_id,
            namespace_id: namespace.to_string(),
            provenance: Provenance::default(),
        },
    }
}
