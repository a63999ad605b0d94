//! 의도 분류 결과 캐시 (moka, 용량 제한 + TTL)

use std::time::Duration;

use moka::sync::Cache;

use crate::config::CacheSettings;
use crate::model::{normalize_text, IntentClassification};

/// 정규화된 질의 텍스트 → 분류 결과
///
/// 동시 요청에서 공유되며, 미스는 캐시가 없는 것과 똑같이 동작합니다.
#[derive(Clone)]
pub struct IntentCache {
    cache: Cache<String, IntentClassification>,
}

impl IntentCache {
    pub fn new(settings: &CacheSettings) -> Self {
        let cache = Cache::builder()
            .max_capacity(settings.capacity)
            .time_to_live(Duration::from_secs(settings.ttl_secs))
            .build();

        Self { cache }
    }

    /// 캐시 조회 (히트 시 `cached = true`)
    pub fn get(&self, text: &str) -> Option<IntentClassification> {
        self.cache.get(&normalize_text(text)).map(|mut hit| {
            hit.cached = true;
            hit
        })
    }

    pub fn insert(&self, text: &str, classification: IntentClassification) {
        self.cache.insert(normalize_text(text), classification);
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
