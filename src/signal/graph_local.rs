//! Graph-Local 시그널: 시드 엔티티 주변 이웃 탐색
//!
//! 1. 질의 텍스트에서 시드 엔티티 연결 (`match_entities`)
//! 2. 의도별 홉 수만큼 서브그래프 확장 (관계 타입 필터 적용)
//! 3. 노드 점수 = 시드까지 최적 경로의 엣지 가중치 곱 / (1 + 홉 거리)
//!
//! 시드가 없으면 빈 목록을 돌려줍니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{SignalContext, SignalRetriever};
use crate::backend::{KnowledgeGraph, Subgraph};
use crate::model::{
    Candidate, CandidateMetadata, PathStep, Provenance, Query, RankedList, SignalKind,
};

pub struct GraphLocalRetriever {
    graph: Arc<dyn KnowledgeGraph>,
    max_seeds: usize,
}

impl GraphLocalRetriever {
    pub fn new(graph: Arc<dyn KnowledgeGraph>, max_seeds: usize) -> Self {
        Self { graph, max_seeds }
    }
}

/// 노드까지의 최적 경로
#[derive(Debug, Clone)]
struct BestPath {
    strength: f64,
    steps: Vec<PathStep>,
}

/// 홉 제한 안에서 시드 → 노드 최대 곱 경로 (계층별 완화)
///
/// 엣지는 양방향으로 따라가며, 가중치는 [0, 1]로 자릅니다.
fn best_paths(subgraph: &Subgraph, max_hops: u32) -> BTreeMap<String, BestPath> {
    let mut best: BTreeMap<String, BestPath> = subgraph
        .seeds
        .iter()
        .map(|seed| {
            (
                seed.clone(),
                BestPath {
                    strength: 1.0,
                    steps: Vec::new(),
                },
            )
        })
        .collect();

    for _ in 0..max_hops {
        let mut next = best.clone();
        for edge in &subgraph.edges {
            let weight = edge.weight.clamp(0.0, 1.0);
            for (from, to) in [(&edge.source, &edge.target), (&edge.target, &edge.source)] {
                let Some(origin) = best.get(from) else {
                    continue;
                };
                let strength = origin.strength * weight;
                let improves = next.get(to).map_or(true, |current| strength > current.strength);
                if improves {
                    let mut steps = origin.steps.clone();
                    steps.push(PathStep {
                        from: from.clone(),
                        relationship: edge.relationship.clone(),
                        to: to.clone(),
                        weight: edge.weight,
                    });
                    next.insert(to.clone(), BestPath { strength, steps });
                }
            }
        }
        best = next;
    }

    best
}

fn rank_subgraph(subgraph: &Subgraph, query: &Query, max_hops: u32, top_k: usize) -> Vec<Candidate> {
    let paths = best_paths(subgraph, max_hops);

    let mut scored: Vec<(f64, Candidate)> = subgraph
        .nodes
        .iter()
        .filter_map(|node| {
            let path = paths.get(&node.entity_id)?;
            let score = path.strength / (1.0 + node.hop as f64);
            let text = if node.description.trim().is_empty() {
                node.name.clone()
            } else {
                node.description.clone()
            };

            Some((
                score,
                Candidate {
                    id: node.entity_id.clone(),
                    text,
                    source_signal: SignalKind::GraphLocal,
                    source_score: score,
                    metadata: CandidateMetadata {
                        document_id: node.document_id.clone(),
                        chunk_id: node.chunk_id.clone(),
                        namespace_id: query.namespace_id().to_string(),
                        provenance: Provenance {
                            entities: vec![node.entity_id.clone()],
                            hop_distance: Some(node.hop),
                            path: query.include_paths().then(|| path.steps.clone()),
                            community_id: None,
                        },
                    },
                },
            ))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
    scored.truncate(top_k);
    scored.into_iter().map(|(_, c)| c).collect()
}

#[async_trait]
impl SignalRetriever for GraphLocalRetriever {
    fn kind(&self) -> SignalKind {
        SignalKind::GraphLocal
    }

    async fn retrieve(&self, query: &Query, ctx: &SignalContext) -> Result<RankedList> {
        let seeds = self
            .graph
            .match_entities(query.namespace_id(), query.text(), self.max_seeds)
            .await
            .context("Seed entity lookup failed")?;

        if seeds.is_empty() {
            tracing::debug!("Graph-local: no seed entities for query");
            return Ok(RankedList::empty(SignalKind::GraphLocal));
        }

        let subgraph = self
            .graph
            .neighbors(
                query.namespace_id(),
                &seeds,
                ctx.max_hops,
                query.relationship_types(),
            )
            .await
            .context("Neighbor traversal failed")?;

        tracing::debug!(
            "Graph-local: {} seeds, {} nodes, {} edges ({} hops)",
            subgraph.seeds.len(),
            subgraph.nodes.len(),
            subgraph.edges.len(),
            ctx.max_hops
        );

        let candidates = rank_subgraph(&subgraph, query, ctx.max_hops, ctx.top_k);
        Ok(RankedList::new(SignalKind::GraphLocal, candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GraphEdge, GraphNode, NewEntity, NewRelationship, SqliteGraphStore};
    use crate::model::Intent;
    use tempfile::TempDir;

    fn node(id: &str, hop: u32) -> GraphNode {
        GraphNode {
            entity_id: id.to_string(),
            name: id.to_uppercase(),
            description: String::new(),
            document_id: None,
            chunk_id: None,
            hop,
        }
    }

    fn edge(source: &str, target: &str, weight: f64) -> GraphEdge {
        GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            relationship: "rel".to_string(),
            weight,
        }
    }

    #[test]
    fn test_scores_decay_with_hops_and_weights() {
        // s - a (0.9), a - b (0.5), s - b (0.2)
        let subgraph = Subgraph {
            seeds: vec!["s".to_string()],
            nodes: vec![node("s", 0), node("a", 1), node("b", 1)],
            edges: vec![edge("s", "a", 0.9), edge("a", "b", 0.5), edge("b", "s", 0.2)],
        };
        let query = Query::new("q", "ns").with_paths(true);

        let ranked = rank_subgraph(&subgraph, &query, 2, 10);
        let ids: Vec<_> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["s", "a", "b"]);

        // b: 최적 경로 s-a-b (0.45) > 직접 s-b (0.2)
        let b = &ranked[2];
        assert!((b.source_score - 0.45 / 2.0).abs() < 1e-12);
        let path = b.metadata.provenance.path.as_ref().unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].from, "s");
        assert_eq!(path[1].to, "b");
        assert_eq!(b.text, "B");
    }

    #[test]
    fn test_paths_omitted_unless_requested() {
        let subgraph = Subgraph {
            seeds: vec!["s".to_string()],
            nodes: vec![node("s", 0), node("a", 1)],
            edges: vec![edge("s", "a", 1.0)],
        };
        let ranked = rank_subgraph(&subgraph, &Query::new("q", "ns"), 1, 10);
        assert!(ranked.iter().all(|c| c.metadata.provenance.path.is_none()));
        assert_eq!(ranked[1].metadata.provenance.hop_distance, Some(1));
    }

    #[tokio::test]
    async fn test_retrieve_against_sqlite_graph() {
        let dir = TempDir::new().unwrap();
        let store = SqliteGraphStore::open(&dir.path().join("g.db")).unwrap();
        for (id, name) in [("e-rag", "RAG"), ("e-lewis", "Patrick Lewis"), ("e-meta", "Meta AI")] {
            store
                .add_entity(NewEntity {
                    id: id.to_string(),
                    namespace: "ns".to_string(),
                    name: name.to_string(),
                    description: format!("About {}", name),
                    document_id: Some(format!("doc-{}", id)),
                    chunk_id: Some("0".to_string()),
                })
                .unwrap();
        }
        for (s, t, r) in [("e-lewis", "e-rag", "created"), ("e-lewis", "e-meta", "works_at")] {
            store
                .add_relationship(NewRelationship {
                    namespace: "ns".to_string(),
                    source: s.to_string(),
                    target: t.to_string(),
                    relationship: r.to_string(),
                    weight: 1.0,
                })
                .unwrap();
        }

        let retriever = GraphLocalRetriever::new(Arc::new(store), 8);
        let ctx = SignalContext {
            top_k: 10,
            intent: Intent::Factual,
            max_hops: 2,
        };

        let list = retriever
            .retrieve(&Query::new("who created RAG frameworks", "ns"), &ctx)
            .await
            .unwrap();
        let ids: Vec<_> = list.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["e-rag", "e-lewis", "e-meta"]);

        // 관계 타입 필터
        let query = Query::new("who created RAG frameworks", "ns")
            .with_relationship_types(vec!["created".to_string()]);
        let list = retriever.retrieve(&query, &ctx).await.unwrap();
        assert_eq!(list.len(), 2);

        // 시드 없음 = 빈 목록
        let list = retriever
            .retrieve(&Query::new("unrelated words", "ns"), &ctx)
            .await
            .unwrap();
        assert!(list.is_empty());
    }
}
