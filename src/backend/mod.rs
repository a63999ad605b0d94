//! Backend 모듈 - 외부 저장소/모델 인터페이스
//!
//! 시그널 어댑터가 호출하는 좁은 인터페이스와 구현체입니다.
//!
//! - `VectorIndex`: 벡터 ANN 검색 (LanceDB)
//! - `LexicalIndex`: 키워드 검색 (SQLite FTS5 BM25)
//! - `KnowledgeGraph`: 엔티티 이웃 탐색 + 커뮤니티 요약 (SQLite)
//! - `CrossEncoder`: 쌍별 재순위 모델 (HTTP)
//!
//! 모든 구현체는 읽기 전용으로 공유되며 요청 간 가변 상태가 없습니다.
//! SQLite 구현체는 호출 future가 drop되면 진행 중인 쿼리를 인터럽트합니다.

mod cross_encoder;
mod graph;
mod lance;
mod lexical;
mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cross_encoder::HttpCrossEncoder;
pub use graph::{NewCommunity, NewEntity, NewRelationship, SqliteGraphStore};
pub use lance::{LanceVectorIndex, VectorRecord};
pub use lexical::{escape_fts5_query, NewPassage, SqliteLexicalIndex};

// ============================================================================
// Index Types
// ============================================================================

/// 인덱스 히트의 부가 정보
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitPayload {
    pub text: String,
    pub document_id: Option<String>,
    pub chunk_id: Option<String>,
}

/// 벡터/키워드 인덱스 검색 결과 한 건
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    /// 인덱스 고유 스코어 (높을수록 좋음)
    pub score: f64,
    pub payload: HitPayload,
}

/// 벡터 인덱스 (ANN)
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 네임스페이스 안에서 최근접 이웃 검색 (유사도 내림차순)
    async fn search(&self, vector: &[f32], namespace: &str, top_k: usize) -> Result<Vec<IndexHit>>;
}

/// 키워드 인덱스
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// 네임스페이스 안에서 키워드 검색 (스코어 내림차순)
    async fn search(&self, text: &str, namespace: &str, top_k: usize) -> Result<Vec<IndexHit>>;
}

// ============================================================================
// Graph Types
// ============================================================================

/// 서브그래프 노드
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub entity_id: String,
    pub name: String,
    pub description: String,
    pub document_id: Option<String>,
    pub chunk_id: Option<String>,
    /// 가장 가까운 시드로부터의 홉 수 (시드 = 0)
    pub hop: u32,
}

/// 서브그래프 엣지 (방향: source → target)
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relationship: String,
    pub weight: f64,
}

/// 이웃 탐색 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subgraph {
    pub seeds: Vec<String>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// 커뮤니티 요약 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityHit {
    pub summary_id: String,
    pub summary: String,
    /// 질의 벡터와의 유사도
    pub score: f64,
    pub member_entities: Vec<String>,
}

/// 지식 그래프 저장소
#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    /// 질의 텍스트에 이름이 등장하는 엔티티 (시드 후보)
    async fn match_entities(&self, namespace: &str, text: &str, limit: usize)
        -> Result<Vec<String>>;

    /// 시드로부터 `max_hops`까지 확장한 서브그래프
    ///
    /// `relationship_types`가 비어 있으면 모든 관계 타입을 따라갑니다.
    async fn neighbors(
        &self,
        namespace: &str,
        entity_ids: &[String],
        max_hops: u32,
        relationship_types: &[String],
    ) -> Result<Subgraph>;

    /// 질의 벡터와 가까운 커뮤니티 요약
    async fn community_summaries(
        &self,
        namespace: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<CommunityHit>>;
}

// ============================================================================
// CrossEncoder
// ============================================================================

/// 쌍별 재순위 모델
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// 입력 순서와 같은 순서의 관련도 스코어
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>>;

    fn name(&self) -> &str;
}
