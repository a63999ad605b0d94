//! Sparse Lexical 시그널: BM25 키워드 검색

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{candidate_from_hit, SignalContext, SignalRetriever};
use crate::backend::LexicalIndex;
use crate::model::{Query, RankedList, SignalKind};

pub struct SparseLexicalRetriever {
    index: Arc<dyn LexicalIndex>,
}

impl SparseLexicalRetriever {
    pub fn new(index: Arc<dyn LexicalIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl SignalRetriever for SparseLexicalRetriever {
    fn kind(&self) -> SignalKind {
        SignalKind::Lexical
    }

    async fn retrieve(&self, query: &Query, ctx: &SignalContext) -> Result<RankedList> {
        let hits = self
            .index
            .search(query.text(), query.namespace_id(), ctx.top_k)
            .await
            .context("Lexical index search failed")?;

        let candidates = hits
            .into_iter()
            .take(ctx.top_k)
            .map(|hit| candidate_from_hit(hit, SignalKind::Lexical, query.namespace_id()))
            .collect();

        Ok(RankedList::new(SignalKind::Lexical, candidates))
    }
}
