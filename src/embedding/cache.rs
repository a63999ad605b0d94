//! 질의 임베딩 캐시
//!
//! 제로샷 분류, Dense Vector, Graph-Global이 한 요청 안에서 같은 질의를 임베딩하므로
//! 정규화된 텍스트를 키로 벡터를 공유합니다. 동시에 들어온 같은 키의 미스는
//! 프로바이더 호출 한 번으로 합쳐집니다. 실패는 캐시하지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;

use super::EmbeddingProvider;
use crate::config::CacheSettings;
use crate::model::normalize_text;

pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, settings: &CacheSettings) -> Self {
        let cache = Cache::builder()
            .max_capacity(settings.capacity)
            .time_to_live(Duration::from_secs(settings.ttl_secs))
            .build();

        Self { inner, cache }
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self
            .cache
            .try_get_with(normalize_text(text), async {
                self.inner.embed(text).await.map(Arc::new)
            })
            .await
            .map_err(|e| anyhow::anyhow!("{:#}", e))?;

        Ok(vector.as_ref().clone())
    }

    /// 배치(참조 문장 등)는 캐시를 거치지 않음
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
