//! 정규식 규칙 분류 (캐스케이드 마지막 단계)
//!
//! 항상 결과를 냅니다. 어떤 패턴도 맞지 않으면 `RuleDefault`로 표시합니다.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{ClassificationMethod, Intent, IntentClassification};

static SUMMARY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(summari[sz]e|summary|overview|tl;?dr|recap|high[- ]level|main (themes|topics|points)|in a nutshell)\b",
    )
    .unwrap()
});

static EXPLORATORY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(relat(e|es|ed|ionship|ionships)|connect(ed|ion|ions)?|compare|comparison|versus|vs|difference|differences|impact|influence|explore|why)\b",
    )
    .unwrap()
});

static FACTUAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(who|what|when|where|which|whose|how (many|much|old|long)|is|are|does|did)\b")
        .unwrap()
});

/// 따옴표 구문, 코드 식별자 (snake_case, camelCase, `a::b`, `f()`), 티켓 번호
static KEYWORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""[^"]+"|\b[a-z0-9]+_[a-z0-9_]+\b|\b[a-z]+[A-Z][A-Za-z0-9]*\b|\w::\w|\w\(\)|\b[A-Z]{2,}-\d+\b"#)
        .unwrap()
});

static QUESTION_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(who|what|when|where|which|why|how)\b").unwrap()
});

/// 짧은 질의로 취급하는 최대 토큰 수
const SHORT_QUERY_TOKENS: usize = 3;

#[derive(Debug, Clone)]
pub struct RuleStage {
    confidence: f32,
}

impl RuleStage {
    pub fn new(confidence: f32) -> Self {
        Self { confidence }
    }

    /// 규칙 순서: summary > exploratory > factual > keyword
    pub fn classify(&self, text: &str) -> IntentClassification {
        let matched = if SUMMARY_PATTERN.is_match(text) {
            Some(Intent::Summary)
        } else if EXPLORATORY_PATTERN.is_match(text) {
            Some(Intent::Exploratory)
        } else if FACTUAL_PATTERN.is_match(text) {
            Some(Intent::Factual)
        } else if is_keyword_query(text) {
            Some(Intent::Keyword)
        } else {
            None
        };

        match matched {
            Some(intent) => IntentClassification::new(intent, self.confidence, ClassificationMethod::Rules),
            None => IntentClassification::new(
                Intent::Factual,
                self.confidence,
                ClassificationMethod::RuleDefault,
            ),
        }
    }
}

fn is_keyword_query(text: &str) -> bool {
    if KEYWORD_PATTERN.is_match(text) {
        return true;
    }

    let tokens = text.split_whitespace().count();
    tokens > 0
        && tokens <= SHORT_QUERY_TOKENS
        && !text.contains('?')
        && !QUESTION_WORD.is_match(text)
}
