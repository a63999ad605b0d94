//! palank-fusion - 의도 기반 멀티 시그널 검색 엔진
//!
//! 질의 의도를 분류하고 네 가지 검색 시그널
//! (Vector, Lexical FTS5, Graph-Local, Graph-Global)을 동시에 실행한 뒤
//! 의도별 가중 RRF로 융합합니다.

pub mod backend;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod intent;
pub mod model;
pub mod rerank;
pub mod server;
pub mod signal;

#[cfg(test)]
mod test_support;

// Re-exports
pub use config::{Config, WeightProfile, WeightTable};
pub use coordinator::{RetrievalCoordinator, SearchResponse, SearchState, SignalManifest};
pub use embedding::{CachedEmbedder, EmbeddingProvider, GeminiEmbedding, get_api_key, has_api_key};
pub use error::{ConfigError, RetrievalError, RetrievalResult, SignalError};
pub use fusion::FusionEngine;
pub use intent::IntentClassifier;
pub use model::{
    Candidate, FusedCandidate, FusedResult, Intent, IntentClassification, Query, RankedList,
    SignalKind,
};
pub use rerank::Reranker;
pub use signal::{SignalRetriever, SignalSet};
