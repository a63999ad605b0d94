//! Dense Vector 시그널: 질의 임베딩 → ANN 검색

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{candidate_from_hit, SignalContext, SignalRetriever};
use crate::backend::VectorIndex;
use crate::embedding::EmbeddingProvider;
use crate::model::{Query, RankedList, SignalKind};

pub struct DenseVectorRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl DenseVectorRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }
}

#[async_trait]
impl SignalRetriever for DenseVectorRetriever {
    fn kind(&self) -> SignalKind {
        SignalKind::Vector
    }

    async fn retrieve(&self, query: &Query, ctx: &SignalContext) -> Result<RankedList> {
        let vector = self
            .embedder
            .embed(query.text())
            .await
            .context("Failed to embed query")?;

        let hits = self
            .index
            .search(&vector, query.namespace_id(), ctx.top_k)
            .await
            .context("Vector index search failed")?;

        let candidates = hits
            .into_iter()
            .take(ctx.top_k)
            .map(|hit| candidate_from_hit(hit, SignalKind::Vector, query.namespace_id()))
            .collect();

        Ok(RankedList::new(SignalKind::Vector, candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Intent;
    use crate::test_support::{FakeEmbedder, FakeVectorIndex};

    fn ctx(top_k: usize) -> SignalContext {
        SignalContext {
            top_k,
            intent: Intent::Factual,
            max_hops: 2,
        }
    }

    #[tokio::test]
    async fn test_returns_hits_in_index_order() {
        let embedder = Arc::new(FakeEmbedder::new(2).with("rag", vec![1.0, 0.0]));
        let index = Arc::new(
            FakeVectorIndex::new()
                .with_hit("ns", "c1", 0.9, "first")
                .with_hit("ns", "c2", 0.7, "second")
                .with_hit("other", "x", 0.99, "wrong tenant"),
        );
        let retriever = DenseVectorRetriever::new(embedder, index);

        let list = retriever.retrieve(&Query::new("rag", "ns"), &ctx(5)).await.unwrap();
        let ids: Vec<_> = list.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(list.signal, SignalKind::Vector);
        assert_eq!(list.candidates[0].metadata.namespace_id, "ns");
    }

    #[tokio::test]
    async fn test_embedding_failure_is_hard_error() {
        let embedder = Arc::new(FakeEmbedder::new(2).failing());
        let index = Arc::new(FakeVectorIndex::new());
        let retriever = DenseVectorRetriever::new(embedder, index);

        assert!(retriever.retrieve(&Query::new("rag", "ns"), &ctx(5)).await.is_err());
    }
}
