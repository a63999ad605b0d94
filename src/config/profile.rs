//! 의도별 가중치 프로파일
//!
//! 시작 시 한 번 검증된 뒤 `Arc<WeightTable>`로 공유됩니다.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{Intent, SignalKind};

/// 가중치 합 허용 오차
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// 시그널 가중치 4-튜플 (합 = 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightProfile {
    pub vector: f64,
    pub lexical: f64,
    pub graph_local: f64,
    pub graph_global: f64,
}

impl WeightProfile {
    pub const fn new(vector: f64, lexical: f64, graph_local: f64, graph_global: f64) -> Self {
        Self {
            vector,
            lexical,
            graph_local,
            graph_global,
        }
    }

    /// 균등 가중치
    pub const fn balanced() -> Self {
        Self::new(0.25, 0.25, 0.25, 0.25)
    }

    pub fn weight(&self, signal: SignalKind) -> f64 {
        match signal {
            SignalKind::Vector => self.vector,
            SignalKind::Lexical => self.lexical,
            SignalKind::GraphLocal => self.graph_local,
            SignalKind::GraphGlobal => self.graph_global,
        }
    }

    pub fn set(&mut self, signal: SignalKind, weight: f64) {
        match signal {
            SignalKind::Vector => self.vector = weight,
            SignalKind::Lexical => self.lexical = weight,
            SignalKind::GraphLocal => self.graph_local = weight,
            SignalKind::GraphGlobal => self.graph_global = weight,
        }
    }

    pub fn sum(&self) -> f64 {
        SignalKind::ALL.iter().map(|s| self.weight(*s)).sum()
    }

    /// 음수/비유한 값과 합계 검증
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        for signal in SignalKind::ALL {
            let w = self.weight(signal);
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::validation(format!(
                    "profiles.{}.{} must be a finite, non-negative number (got {})",
                    name, signal, w
                )));
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::validation(format!(
                "profiles.{} weights must sum to 1.0 (got {})",
                name, sum
            )));
        }

        Ok(())
    }
}

/// 의도 → 가중치 프로파일 테이블
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightTable {
    pub factual: WeightProfile,
    pub keyword: WeightProfile,
    pub exploratory: WeightProfile,
    pub summary: WeightProfile,
    pub balanced: WeightProfile,
}

impl Default for WeightTable {
    // 평가셋 기반 재튜닝 전의 예시 기본값
    fn default() -> Self {
        Self {
            factual: WeightProfile::new(0.5, 0.3, 0.2, 0.0),
            keyword: WeightProfile::new(0.2, 0.6, 0.1, 0.1),
            exploratory: WeightProfile::new(0.3, 0.1, 0.4, 0.2),
            summary: WeightProfile::new(0.25, 0.1, 0.15, 0.5),
            balanced: WeightProfile::balanced(),
        }
    }
}

impl WeightTable {
    pub fn for_intent(&self, intent: Intent) -> &WeightProfile {
        match intent {
            Intent::Factual => &self.factual,
            Intent::Keyword => &self.keyword,
            Intent::Exploratory => &self.exploratory,
            Intent::Summary => &self.summary,
        }
    }

    pub fn balanced(&self) -> &WeightProfile {
        &self.balanced
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for intent in Intent::ALL {
            self.for_intent(intent).validate(intent.as_str())?;
        }
        self.balanced.validate("balanced")
    }
}
