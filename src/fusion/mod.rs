//! Fusion 모듈 - 가중 RRF (Reciprocal Rank Fusion)
//!
//! 순위 r(1부터)인 후보의 기여도 = weight[signal] / (k + r)
//! 융합 점수 = 후보가 등장한 모든 시그널 기여도의 합
//!
//! 시그널 고유 점수는 서로 비교하지 않고 순위만 씁니다.
//! 동점 처리: 기여 시그널 수 > 최고 원본 점수 > 후보 id > 콘텐츠 키
//! ref: https://plg.uwaterloo.ca/~gvcormac/cormacksigir09-rrf.pdf

mod fallback;

use std::collections::{BTreeMap, BTreeSet};

use crate::config::WeightProfile;
use crate::model::{
    Candidate, FusedCandidate, FusedResult, RankedList, SignalContribution, SignalKind,
};

pub use fallback::{effective_weights, EffectiveWeights};

/// 기본 RRF 감쇠 상수
pub const DEFAULT_RRF_K: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionEngine {
    k: f64,
    min_mass: f64,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_RRF_K, 0.15)
    }
}

struct Accumulator {
    candidate: Candidate,
    score: f64,
    contributions: Vec<SignalContribution>,
}

impl FusionEngine {
    /// `k`는 검증된 설정값(> 0)이어야 함
    pub fn new(k: f64, min_mass: f64) -> Self {
        Self { k, min_mass }
    }

    /// 빈 시그널 재분배 후 융합
    pub fn fuse_with_fallback(
        &self,
        lists: &[RankedList],
        profile: &WeightProfile,
    ) -> (FusedResult, EffectiveWeights) {
        let mut non_empty: Vec<SignalKind> = lists
            .iter()
            .filter(|l| !l.is_empty())
            .map(|l| l.signal)
            .collect();
        non_empty.sort();
        non_empty.dedup();

        let effective = effective_weights(profile, &non_empty, self.min_mass);
        (self.fuse(lists, &effective.weights), effective)
    }

    /// 가중 RRF 융합
    ///
    /// 입력 순서와 무관하게 SignalKind 순서로 처리하므로 결과가 결정적입니다.
    /// 같은 시그널 안의 중복 콘텐츠는 가장 좋은(첫) 순위만 남깁니다.
    pub fn fuse(&self, lists: &[RankedList], weights: &WeightProfile) -> FusedResult {
        let mut ordered: Vec<&RankedList> = lists.iter().collect();
        ordered.sort_by_key(|l| l.signal);

        let mut acc: BTreeMap<String, Accumulator> = BTreeMap::new();
        let mut seen: BTreeSet<(SignalKind, String)> = BTreeSet::new();
        let mut next_rank: BTreeMap<SignalKind, usize> = BTreeMap::new();

        for list in ordered {
            let weight = weights.weight(list.signal);

            for candidate in &list.candidates {
                let key = candidate.content_key();
                if !seen.insert((list.signal, key.clone())) {
                    continue;
                }

                let rank = next_rank.entry(list.signal).or_insert(0);
                *rank += 1;
                let contribution = weight / (self.k + *rank as f64);

                let entry = acc.entry(key).or_insert_with(|| Accumulator {
                    candidate: candidate.clone(),
                    score: 0.0,
                    contributions: Vec::new(),
                });
                entry.score += contribution;
                entry.contributions.push(SignalContribution {
                    signal: list.signal,
                    rank: *rank,
                    source_score: candidate.source_score,
                });
            }
        }

        let mut items: Vec<(String, FusedCandidate)> = acc
            .into_iter()
            .map(|(key, a)| {
                (
                    key,
                    FusedCandidate {
                        candidate: a.candidate,
                        fused_score: a.score,
                        contributing_signals: a.contributions,
                        rerank_score: None,
                    },
                )
            })
            .collect();

        items.sort_by(|(ka, a), (kb, b)| {
            b.fused_score
                .total_cmp(&a.fused_score)
                .then_with(|| b.contributing_signals.len().cmp(&a.contributing_signals.len()))
                .then_with(|| b.best_source_score().total_cmp(&a.best_source_score()))
                .then_with(|| a.candidate.id.cmp(&b.candidate.id))
                .then_with(|| ka.cmp(kb))
        });

        FusedResult {
            items: items.into_iter().map(|(_, item)| item).collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
