//! 빈 시그널 가중치 재분배
//!
//! 빈 목록(타임아웃/실패 포함)의 가중치 합이 `min_mass` 이상이면
//! 그 몫을 비어 있지 않은 시그널에 비례 배분합니다.
//! 비어 있지 않은 시그널 가중치가 모두 0이면 균등 배분합니다.

use serde::Serialize;

use crate::config::WeightProfile;
use crate::model::SignalKind;

/// 융합에 실제로 쓰인 가중치
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectiveWeights {
    pub weights: WeightProfile,
    /// 재분배가 일어났는지
    pub renormalized: bool,
}

pub fn effective_weights(
    profile: &WeightProfile,
    non_empty: &[SignalKind],
    min_mass: f64,
) -> EffectiveWeights {
    let unchanged = EffectiveWeights {
        weights: *profile,
        renormalized: false,
    };

    if non_empty.is_empty() {
        return unchanged;
    }

    let empty_mass: f64 = SignalKind::ALL
        .iter()
        .filter(|s| !non_empty.contains(s))
        .map(|s| profile.weight(*s))
        .sum();

    if empty_mass <= 0.0 || empty_mass < min_mass {
        return unchanged;
    }

    let live_mass: f64 = SignalKind::ALL
        .iter()
        .filter(|s| non_empty.contains(s))
        .map(|s| profile.weight(*s))
        .sum();
    let live_count = SignalKind::ALL
        .iter()
        .filter(|s| non_empty.contains(s))
        .count() as f64;

    let mut weights = WeightProfile::new(0.0, 0.0, 0.0, 0.0);
    for signal in SignalKind::ALL {
        if !non_empty.contains(&signal) {
            continue;
        }
        let w = if live_mass > 0.0 {
            profile.weight(signal) / live_mass
        } else {
            1.0 / live_count
        };
        weights.set(signal, w);
    }

    tracing::debug!(
        "Renormalized weights: {:.3} of signal mass was empty (threshold {:.3})",
        empty_mass,
        min_mass
    );

    EffectiveWeights {
        weights,
        renormalized: true,
    }
}
