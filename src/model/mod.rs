//! 검색 도메인 모델
//!
//! 요청 단위로 생성되고 버려지는 값 타입들입니다.
//! - Query: 불변 검색 요청
//! - Intent / IntentClassification: 질의 의도
//! - Candidate / RankedList: 시그널별 후보 목록
//! - FusedResult: RRF 융합 결과

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// SignalKind
// ============================================================================

/// 검색 시그널 종류 (고정 집합)
///
/// 선언 순서가 곧 융합 시 리스트 처리 순서입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// 덴스 벡터 유사도
    Vector,
    /// 스파스 키워드 (BM25)
    Lexical,
    /// 엔티티 이웃 그래프 탐색
    GraphLocal,
    /// 커뮤니티 요약 검색
    GraphGlobal,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::Vector,
        SignalKind::Lexical,
        SignalKind::GraphLocal,
        SignalKind::GraphGlobal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Vector => "vector",
            SignalKind::Lexical => "lexical",
            SignalKind::GraphLocal => "graph_local",
            SignalKind::GraphGlobal => "graph_global",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Intent
// ============================================================================

/// 질의 의도
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Factual,
    Keyword,
    Exploratory,
    Summary,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::Factual,
        Intent::Keyword,
        Intent::Exploratory,
        Intent::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Factual => "factual",
            Intent::Keyword => "keyword",
            Intent::Exploratory => "exploratory",
            Intent::Summary => "summary",
        }
    }

    /// 의도별 기본 그래프 홉 수
    pub fn default_hops(&self) -> u32 {
        match self {
            Intent::Factual => 2,
            Intent::Keyword => 1,
            Intent::Exploratory => 3,
            Intent::Summary => 1,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "factual" => Ok(Intent::Factual),
            "keyword" => Ok(Intent::Keyword),
            "exploratory" => Ok(Intent::Exploratory),
            "summary" => Ok(Intent::Summary),
            other => Err(format!(
                "unknown intent '{}': expected factual, keyword, exploratory or summary",
                other
            )),
        }
    }
}

/// 분류 캐스케이드에서 결과를 낸 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    /// 요청에 명시된 의도
    Override,
    /// 파인튜닝 분류 모델
    FineTuned,
    /// 참조 임베딩 기반 제로샷
    ZeroShot,
    /// 정규식 규칙 매칭
    Rules,
    /// 어떤 규칙도 맞지 않은 기본값
    RuleDefault,
}

/// 의도 분류 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentClassification {
    pub intent: Intent,
    /// 0.0 ~ 1.0
    pub confidence: f32,
    pub method: ClassificationMethod,
    /// 캐시에서 조회된 결과인지
    pub cached: bool,
}

impl IntentClassification {
    pub fn new(intent: Intent, confidence: f32, method: ClassificationMethod) -> Self {
        Self {
            intent,
            confidence: confidence.clamp(0.0, 1.0),
            method,
            cached: false,
        }
    }
}

// ============================================================================
// Query
// ============================================================================

/// 기본 결과 개수
pub const DEFAULT_TOP_K: usize = 10;

/// 검색 요청 (생성 후 변경 불가)
///
/// 빌더 메서드로 구성한 뒤에는 `&Query`로만 전달됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    text: String,
    namespace_id: String,
    intent_override: Option<Intent>,
    relationship_types: Vec<String>,
    top_k: usize,
    max_hops: Option<u32>,
    include_paths: bool,
}

impl Query {
    pub fn new(text: impl Into<String>, namespace_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            namespace_id: namespace_id.into(),
            intent_override: None,
            relationship_types: Vec::new(),
            top_k: DEFAULT_TOP_K,
            max_hops: None,
            include_paths: false,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent_override = Some(intent);
        self
    }

    pub fn with_relationship_types(mut self, types: Vec<String>) -> Self {
        self.relationship_types = types;
        self
    }

    pub fn with_max_hops(mut self, hops: u32) -> Self {
        self.max_hops = Some(hops);
        self
    }

    pub fn with_paths(mut self, include: bool) -> Self {
        self.include_paths = include;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn namespace_id(&self) -> &str {
        &self.namespace_id
    }

    pub fn intent_override(&self) -> Option<Intent> {
        self.intent_override
    }

    pub fn relationship_types(&self) -> &[String] {
        &self.relationship_types
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn max_hops(&self) -> Option<u32> {
        self.max_hops
    }

    pub fn include_paths(&self) -> bool {
        self.include_paths
    }
}

// ============================================================================
// Candidate
// ============================================================================

/// 그래프 경로의 한 단계
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub from: String,
    pub relationship: String,
    pub to: String,
    pub weight: f64,
}

/// 후보의 출처 정보
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// 관련 엔티티 (그래프 노드 또는 커뮤니티 멤버)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,
    /// 시드 엔티티로부터의 홉 거리
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hop_distance: Option<u32>,
    /// 시드 → 노드 최적 경로 (include_paths 요청 시)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathStep>>,
    /// 커뮤니티 요약 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_id: Option<String>,
}

/// 후보 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    pub document_id: Option<String>,
    pub chunk_id: Option<String>,
    pub namespace_id: String,
    #[serde(default)]
    pub provenance: Provenance,
}

/// 단일 시그널이 반환한 후보
///
/// `id`는 시그널 안에서만 유일합니다. 시그널 간 동일 콘텐츠 판별은
/// [`Candidate::content_key`]로 합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub text: String,
    pub source_signal: SignalKind,
    /// 시그널 고유 스코어 (시그널 간 비교 금지)
    pub source_score: f64,
    pub metadata: CandidateMetadata,
}

impl Candidate {
    /// 콘텐츠 식별자
    ///
    /// 문서/청크 ID가 모두 있으면 `chunk:<doc 길이>:<doc>#<chunk>`,
    /// 없으면 정규화된 텍스트의 SHA-256 (`text:<hex>`).
    ///
    /// 문서 ID 길이를 앞에 붙여 ID에 `#`이 들어가도 키가 겹치지 않습니다.
    pub fn content_key(&self) -> String {
        match (&self.metadata.document_id, &self.metadata.chunk_id) {
            (Some(doc), Some(chunk)) => format!("chunk:{}:{}#{}", doc.len(), doc, chunk),
            _ => {
                let digest = Sha256::digest(normalize_text(&self.text).as_bytes());
                format!("text:{:x}", digest)
            }
        }
    }
}

/// 소문자 변환 + 공백 정리
///
/// 콘텐츠 식별과 분류 캐시 키에 같이 씁니다.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// RankedList / FusedResult
// ============================================================================

/// 시그널 하나의 순위 목록 (빈 목록 = "찾은 것 없음", 에러 아님)
#[derive(Debug, Clone, PartialEq)]
pub struct RankedList {
    pub signal: SignalKind,
    pub candidates: Vec<Candidate>,
}

impl RankedList {
    pub fn new(signal: SignalKind, candidates: Vec<Candidate>) -> Self {
        Self { signal, candidates }
    }

    pub fn empty(signal: SignalKind) -> Self {
        Self::new(signal, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

/// 후보가 특정 시그널 목록에서 차지한 위치
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalContribution {
    pub signal: SignalKind,
    /// 1부터 시작하는 순위
    pub rank: usize,
    pub source_score: f64,
}

/// 융합된 후보
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedCandidate {
    pub candidate: Candidate,
    pub fused_score: f64,
    pub contributing_signals: Vec<SignalContribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

impl FusedCandidate {
    /// 기여 시그널 중 가장 높은 원본 스코어
    pub fn best_source_score(&self) -> f64 {
        self.contributing_signals
            .iter()
            .map(|c| c.source_score)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn rank_in(&self, signal: SignalKind) -> Option<usize> {
        self.contributing_signals
            .iter()
            .find(|c| c.signal == signal)
            .map(|c| c.rank)
    }
}

/// 융합 결과 (콘텐츠 중복 없음, fused_score 내림차순)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FusedResult {
    pub items: Vec<FusedCandidate>,
}

impl FusedResult {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.candidate.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&FusedCandidate> {
        self.items.iter().find(|item| item.candidate.id == id)
    }
}

// ============================================================================
// Tests
// ============================================================================
