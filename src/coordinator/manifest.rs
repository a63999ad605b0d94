//! 검색 진행 상태와 시그널 실행 기록

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::SignalError;
use crate::model::{RankedList, SignalKind};

/// 검색 파이프라인 상태
///
/// `Classifying → Retrieving → Fusing → (Reranking) → Done`,
/// 모든 시그널이 실패했을 때만 `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Classifying,
    Retrieving,
    Fusing,
    Reranking,
    Done,
    Failed,
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchState::Classifying => "classifying",
            SearchState::Retrieving => "retrieving",
            SearchState::Fusing => "fusing",
            SearchState::Reranking => "reranking",
            SearchState::Done => "done",
            SearchState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 시그널 하나의 실행 결과
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    /// 빈 목록도 성공
    Succeeded(RankedList),
    Failed(SignalError),
}

/// 실패한 시그널과 사유
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedSignal {
    pub signal: SignalKind,
    pub reason: String,
}

/// 시도/성공/타임아웃/실패 시그널 목록
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalManifest {
    pub attempted: Vec<SignalKind>,
    pub succeeded: Vec<SignalKind>,
    pub timed_out: Vec<SignalKind>,
    pub failed: Vec<FailedSignal>,
    /// 성공한 시그널의 후보 수
    pub candidate_counts: BTreeMap<SignalKind, usize>,
}

impl SignalManifest {
    pub fn record(&mut self, signal: SignalKind, outcome: &SignalOutcome) {
        self.attempted.push(signal);
        match outcome {
            SignalOutcome::Succeeded(list) => {
                self.succeeded.push(signal);
                self.candidate_counts.insert(signal, list.len());
            }
            SignalOutcome::Failed(err) if err.is_timeout() => self.timed_out.push(signal),
            SignalOutcome::Failed(err) => self.failed.push(FailedSignal {
                signal,
                reason: err.to_string(),
            }),
        }
    }

    pub fn all_failed(&self) -> bool {
        !self.attempted.is_empty() && self.succeeded.is_empty()
    }
}
