//! Graph-Global 시그널: 커뮤니티 요약 검색
//!
//! Dense Vector와 같은 임베딩 공간을 씁니다.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{SignalContext, SignalRetriever};
use crate::backend::KnowledgeGraph;
use crate::embedding::EmbeddingProvider;
use crate::model::{Candidate, CandidateMetadata, Provenance, Query, RankedList, SignalKind};

pub struct GraphGlobalRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    graph: Arc<dyn KnowledgeGraph>,
}

impl GraphGlobalRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, graph: Arc<dyn KnowledgeGraph>) -> Self {
        Self { embedder, graph }
    }
}

#[async_trait]
impl SignalRetriever for GraphGlobalRetriever {
    fn kind(&self) -> SignalKind {
        SignalKind::GraphGlobal
    }

    async fn retrieve(&self, query: &Query, ctx: &SignalContext) -> Result<RankedList> {
        let vector = self
            .embedder
            .embed(query.text())
            .await
            .context("Failed to embed query")?;

        let hits = self
            .graph
            .community_summaries(query.namespace_id(), &vector, ctx.top_k)
            .await
            .context("Community summary search failed")?;

        let candidates = hits
            .into_iter()
            .take(ctx.top_k)
            .map(|hit| Candidate {
                id: hit.summary_id.clone(),
                text: hit.summary,
                source_signal: SignalKind::GraphGlobal,
                source_score: hit.score,
                metadata: CandidateMetadata {
                    document_id: None,
                    chunk_id: None,
                    namespace_id: query.namespace_id().to_string(),
                    provenance: Provenance {
                        entities: hit.member_entities,
                        community_id: Some(hit.summary_id),
                        ..Default::default()
                    },
                },
            })
            .collect();

        Ok(RankedList::new(SignalKind::GraphGlobal, candidates))
    }
}
