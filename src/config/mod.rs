//! 설정 모듈 - TOML 설정 로드 및 검증
//!
//! 기본 위치: ~/.palank-fusion/config.toml
//! 파일이 없으면 `Config::default()`를 사용합니다.
//! 로드 직후 한 번만 검증하고, 이후에는 읽기 전용으로 공유합니다.

mod profile;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::SignalKind;

pub use profile::{WeightProfile, WeightTable, WEIGHT_SUM_TOLERANCE};

/// 설정 파일 경로 환경변수
pub const CONFIG_ENV: &str = "PALANK_FUSION_CONFIG";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.palank-fusion/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".palank-fusion")
}

/// 기본 설정 파일 경로
pub fn default_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

// ============================================================================
// Sections
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub retrieval: RetrievalSettings,
    pub timeouts: SignalTimeouts,
    pub classifier: ClassifierSettings,
    pub cache: CacheSettings,
    pub reranker: RerankerSettings,
    pub profiles: WeightTable,
    pub embedding: EmbeddingSettings,
    pub storage: StorageSettings,
    pub server: ServerSettings,
}

/// 검색/융합 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// RRF 감쇠 상수 k
    pub rrf_k: f64,
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// 시그널별 요청 후보 수 = top_k * multiplier
    pub candidate_multiplier: usize,
    /// 전체 검색 데드라인 (ms)
    pub deadline_ms: u64,
    /// 빈 시그널 가중치 합이 이 값 이상이면 재정규화
    pub fallback_min_mass: f64,
    /// Graph-Local 최대 홉 수
    pub max_graph_hops: u32,
    /// Graph-Local 시드 엔티티 최대 개수
    pub max_seed_entities: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            default_top_k: 10,
            max_top_k: 100,
            candidate_multiplier: 2,
            deadline_ms: 8000,
            fallback_min_mass: 0.15,
            max_graph_hops: 3,
            max_seed_entities: 8,
        }
    }
}

impl RetrievalSettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// 시그널별 타임아웃 (ms)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalTimeouts {
    pub vector_ms: u64,
    pub lexical_ms: u64,
    pub graph_local_ms: u64,
    pub graph_global_ms: u64,
}

impl Default for SignalTimeouts {
    fn default() -> Self {
        Self {
            vector_ms: 2000,
            lexical_ms: 2000,
            graph_local_ms: 5000,
            graph_global_ms: 5000,
        }
    }
}

impl SignalTimeouts {
    pub fn for_signal(&self, signal: SignalKind) -> Duration {
        let ms = match signal {
            SignalKind::Vector => self.vector_ms,
            SignalKind::Lexical => self.lexical_ms,
            SignalKind::GraphLocal => self.graph_local_ms,
            SignalKind::GraphGlobal => self.graph_global_ms,
        };
        Duration::from_millis(ms)
    }
}

/// 의도 분류기 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// 이 값 미만이면 다음 단계로 진행
    pub confidence_threshold: f32,
    /// 규칙 단계 고정 신뢰도
    pub rule_confidence: f32,
    pub zero_shot_enabled: bool,
    /// 모델 단계 하나의 최대 대기 시간 (ms), 초과하면 다음 단계로
    pub stage_timeout_ms: u64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
            rule_confidence: 0.7,
            zero_shot_enabled: true,
            stage_timeout_ms: 100,
        }
    }
}

impl ClassifierSettings {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }
}

/// 분류 결과 캐시 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            capacity: 10_000,
        }
    }
}

/// 리랭커 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    pub enabled: bool,
    pub top_n: usize,
    /// 크로스 인코더 HTTP 엔드포인트 (없으면 pass-through)
    pub endpoint: Option<String>,
    pub model: String,
    pub api_key_env: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            top_n: 20,
            endpoint: None,
            model: "bge-reranker-v2-m3".to_string(),
            api_key_env: None,
            timeout_ms: 1500,
        }
    }
}

/// 임베딩 프로바이더 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: String,
    pub endpoint: String,
    pub dimension: usize,
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "models/gemini-embedding-001".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent".to_string(),
            dimension: 768,
            timeout_ms: 10_000,
        }
    }
}

/// 백엔드 저장소 위치
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
        }
    }
}

impl StorageSettings {
    /// SQLite (FTS5 + 그래프) 경로
    pub fn knowledge_db(&self) -> PathBuf {
        self.data_dir.join("knowledge.db")
    }

    /// LanceDB 경로
    pub fn vectors_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }
}

/// HTTP 서버 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8088".to_string(),
        }
    }
}

// ============================================================================
// Load / Validate
// ============================================================================

impl Config {
    /// 파일에서 로드 후 검증
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// 명시된 경로 > 기본 경로 > 기본값 순으로 로드
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = default_config_path();
        if default_path.exists() {
            return Self::load(&default_path);
        }

        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// 전체 설정 검증 (서빙 전 1회)
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.profiles.validate()?;

        let r = &self.retrieval;
        if !r.rrf_k.is_finite() || r.rrf_k <= 0.0 {
            return Err(ConfigError::validation(
                "retrieval.rrf_k must be a positive finite number",
            ));
        }
        if r.default_top_k == 0 || r.max_top_k == 0 {
            return Err(ConfigError::validation(
                "retrieval.default_top_k and retrieval.max_top_k must be greater than zero",
            ));
        }
        if r.default_top_k > r.max_top_k {
            return Err(ConfigError::validation(
                "retrieval.default_top_k must not exceed retrieval.max_top_k",
            ));
        }
        if r.candidate_multiplier == 0 {
            return Err(ConfigError::validation(
                "retrieval.candidate_multiplier must be greater than zero",
            ));
        }
        if r.deadline_ms == 0 {
            return Err(ConfigError::validation(
                "retrieval.deadline_ms must be greater than zero",
            ));
        }
        if !(0.0..=1.0).contains(&r.fallback_min_mass) {
            return Err(ConfigError::validation(
                "retrieval.fallback_min_mass must be in the range 0.0-1.0",
            ));
        }
        if r.max_graph_hops == 0 || r.max_graph_hops > 3 {
            return Err(ConfigError::validation(
                "retrieval.max_graph_hops must be in the range 1-3",
            ));
        }

        for signal in SignalKind::ALL {
            if self.timeouts.for_signal(signal).is_zero() {
                return Err(ConfigError::validation(format!(
                    "timeouts.{}_ms must be greater than zero",
                    signal
                )));
            }
        }

        let c = &self.classifier;
        if !(0.0..=1.0).contains(&c.confidence_threshold) {
            return Err(ConfigError::validation(
                "classifier.confidence_threshold must be in the range 0.0-1.0",
            ));
        }
        if !(0.0..=1.0).contains(&c.rule_confidence) {
            return Err(ConfigError::validation(
                "classifier.rule_confidence must be in the range 0.0-1.0",
            ));
        }
        if c.stage_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "classifier.stage_timeout_ms must be greater than zero",
            ));
        }

        if self.cache.capacity == 0 || self.cache.ttl_secs == 0 {
            return Err(ConfigError::validation(
                "cache.capacity and cache.ttl_secs must be greater than zero",
            ));
        }

        if self.reranker.top_n == 0 {
            return Err(ConfigError::validation(
                "reranker.top_n must be greater than zero",
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(ConfigError::validation(
                "embedding.dimension must be greater than zero",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
