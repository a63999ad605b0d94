//! 제로샷 분류: 의도별 참조 문장 임베딩 centroid와의 코사인 유사도

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::ClassifierStage;
use crate::embedding::{cosine_similarity, mean_vector, EmbeddingProvider};
use crate::model::{ClassificationMethod, Intent};

/// 기본 참조 문장
pub const DEFAULT_REFERENCES: [(Intent, &[&str]); 4] = [
    (
        Intent::Factual,
        &[
            "who invented the transformer architecture",
            "what is the default port of the database",
            "when was the company founded",
            "where is the configuration file stored",
        ],
    ),
    (
        Intent::Keyword,
        &[
            "error code E0425",
            "tokio::spawn",
            "\"connection refused\"",
            "max_graph_hops setting",
        ],
    ),
    (
        Intent::Exploratory,
        &[
            "how does the retriever relate to the graph store",
            "what connects these two projects",
            "explain the relationship between authentication and sessions",
            "why did the migration affect latency",
        ],
    ),
    (
        Intent::Summary,
        &[
            "summarize the main themes of the corpus",
            "give me an overview of the project",
            "what are the key topics across all documents",
            "high level recap of the incident reports",
        ],
    ),
];

pub struct ZeroShotStage {
    embedder: Arc<dyn EmbeddingProvider>,
    centroids: Vec<(Intent, Vec<f32>)>,
}

impl ZeroShotStage {
    /// 참조 문장을 임베딩해 centroid 계산 (시작 시 1회)
    pub async fn build(
        embedder: Arc<dyn EmbeddingProvider>,
        references: &[(Intent, &[&str])],
    ) -> Result<Self> {
        let mut centroids = Vec::with_capacity(references.len());

        for (intent, phrases) in references {
            let texts: Vec<String> = phrases.iter().map(|p| p.to_string()).collect();
            let vectors = embedder
                .embed_batch(&texts)
                .await
                .with_context(|| format!("Failed to embed {} reference phrases", intent))?;
            let centroid = mean_vector(&vectors)
                .ok_or_else(|| anyhow::anyhow!("No usable reference vectors for {}", intent))?;
            centroids.push((*intent, centroid));
        }

        tracing::info!(
            "Zero-shot classifier ready ({} intents, {})",
            centroids.len(),
            embedder.name()
        );

        Ok(Self {
            embedder,
            centroids,
        })
    }
}

#[async_trait]
impl ClassifierStage for ZeroShotStage {
    fn method(&self) -> ClassificationMethod {
        ClassificationMethod::ZeroShot
    }

    async fn predict(&self, text: &str) -> Result<Option<(Intent, f32)>> {
        let vector = self.embedder.embed(text).await?;

        let best = self
            .centroids
            .iter()
            .map(|(intent, centroid)| (*intent, cosine_similarity(&vector, centroid)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        Ok(best.map(|(intent, score)| (intent, score.clamp(0.0, 1.0))))
    }
}
