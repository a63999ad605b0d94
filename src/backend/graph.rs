//! SQLite 지식 그래프 저장소
//!
//! 엔티티, 관계, 커뮤니티 요약을 `knowledge.db`에 함께 보관합니다.
//! 커뮤니티 임베딩은 JSON 배열로 저장하고 검색 시 코사인 유사도로 비교합니다.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};

use super::sqlite::{SharedConnection, TaskCheck};
use super::{CommunityHit, GraphEdge, GraphNode, KnowledgeGraph, Subgraph};
use crate::embedding::cosine_similarity;
use crate::model::normalize_text;

// ============================================================================
// Input Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewEntity {
    pub id: String,
    pub namespace: String,
    pub name: String,
    pub description: String,
    pub document_id: Option<String>,
    pub chunk_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRelationship {
    pub namespace: String,
    pub source: String,
    pub target: String,
    pub relationship: String,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct NewCommunity {
    pub id: String,
    pub namespace: String,
    pub summary: String,
    pub embedding: Vec<f32>,
    pub members: Vec<String>,
}

// ============================================================================
// SqliteGraphStore
// ============================================================================

pub struct SqliteGraphStore {
    conn: SharedConnection,
}

/// 프론티어 확장 쿼리 한 번에 넣는 엔티티 수 (SQLite 바인드 변수 제한 아래)
const FRONTIER_CHUNK: usize = 400;

impl SqliteGraphStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                document_id TEXT,
                chunk_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_entities_namespace ON entities(namespace);

            CREATE TABLE IF NOT EXISTS relationships (
                namespace TEXT NOT NULL,
                source TEXT NOT NULL,
                target TEXT NOT NULL,
                relationship TEXT NOT NULL,
                weight REAL NOT NULL DEFAULT 1.0,
                PRIMARY KEY (namespace, source, target, relationship)
            );
            CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(namespace, target);

            CREATE TABLE IF NOT EXISTS communities (
                id TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                summary TEXT NOT NULL,
                embedding TEXT NOT NULL,
                members TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_communities_namespace ON communities(namespace);
            "#,
        )
        .context("Failed to create graph tables")?;

        tracing::debug!("Graph store initialized at {:?}", path);
        Ok(Self {
            conn: SharedConnection::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock()
    }

    pub fn add_entity(&self, entity: NewEntity) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO entities (id, namespace, name, description, document_id, chunk_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entity.id,
                    entity.namespace,
                    entity.name,
                    entity.description,
                    entity.document_id,
                    entity.chunk_id
                ],
            )
            .context("Failed to insert entity")?;
        Ok(())
    }

    pub fn add_relationship(&self, rel: NewRelationship) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO relationships (namespace, source, target, relationship, weight)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![rel.namespace, rel.source, rel.target, rel.relationship, rel.weight],
            )
            .context("Failed to insert relationship")?;
        Ok(())
    }

    pub fn add_community(&self, community: NewCommunity) -> Result<()> {
        let embedding = serde_json::to_string(&community.embedding)?;
        let members = serde_json::to_string(&community.members)?;

        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO communities (id, namespace, summary, embedding, members)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    community.id,
                    community.namespace,
                    community.summary,
                    embedding,
                    members
                ],
            )
            .context("Failed to insert community")?;
        Ok(())
    }

    /// (엔티티 수, 관계 수, 커뮤니티 수)
    pub fn counts(&self) -> Result<(usize, usize, usize)> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })
                .with_context(|| format!("Failed to count {}", table))?;
            Ok(n as usize)
        };
        Ok((count("entities")?, count("relationships")?, count("communities")?))
    }
}

// ============================================================================
// Blocking Queries
// ============================================================================

/// 단어 경계 비교용: 영숫자 외 문자를 공백으로 바꾸고 양끝에 공백을 붙임
fn padded_words(text: &str) -> String {
    let cleaned: String = normalize_text(text)
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn match_entities_blocking(
    conn: &Connection,
    namespace: &str,
    text: &str,
    limit: usize,
) -> Result<Vec<String>> {
    let haystack = padded_words(text);

    let mut stmt = conn.prepare("SELECT id, name FROM entities WHERE namespace = ?1")?;
    let rows = stmt
        .query_map(params![namespace], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut matched: Vec<(usize, String)> = rows
        .into_iter()
        .filter_map(|(id, name)| {
            let needle = padded_words(&name);
            if needle.trim().is_empty() || !haystack.contains(&needle) {
                return None;
            }
            Some((needle.len(), id))
        })
        .collect();

    // 긴 이름 우선, 동률은 id 순
    matched.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    Ok(matched.into_iter().take(limit).map(|(_, id)| id).collect())
}

/// `frontier`에 닿는 관계 (양방향, 타입 필터 적용)
fn edges_touching(
    conn: &Connection,
    namespace: &str,
    frontier: &[String],
    type_filter: &BTreeSet<&str>,
) -> Result<Vec<GraphEdge>> {
    let mut edges = Vec::new();

    for chunk in frontier.chunks(FRONTIER_CHUNK) {
        let placeholders = (0..chunk.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT source, target, relationship, weight FROM relationships
             WHERE namespace = ?1 AND (source IN ({0}) OR target IN ({0}))",
            placeholders
        );

        let mut stmt = conn.prepare_cached(&sql)?;
        let values = std::iter::once(namespace).chain(chunk.iter().map(String::as_str));
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(GraphEdge {
                    source: row.get(0)?,
                    target: row.get(1)?,
                    relationship: row.get(2)?,
                    weight: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read relationships")?;

        edges.extend(
            rows.into_iter()
                .filter(|e| type_filter.is_empty() || type_filter.contains(e.relationship.as_str())),
        );
    }

    Ok(edges)
}

/// 시드에서 한 홉씩 프론티어를 넓히는 BFS
///
/// 마지막 홉의 노드는 더 확장하지 않고, 방문한 노드끼리의 관계만 추가로 모읍니다.
fn neighbors_blocking(
    conn: &Connection,
    check: &TaskCheck,
    namespace: &str,
    entity_ids: &[String],
    max_hops: u32,
    relationship_types: &[String],
) -> Result<Subgraph> {
    let type_filter: BTreeSet<&str> = relationship_types.iter().map(String::as_str).collect();

    let mut entity_stmt = conn.prepare(
        "SELECT name, description, document_id, chunk_id FROM entities
         WHERE namespace = ?1 AND id = ?2",
    )?;

    let mut hops: BTreeMap<String, u32> = BTreeMap::new();
    let mut seeds = Vec::new();

    for seed in entity_ids {
        if hops.contains_key(seed) {
            continue;
        }
        if entity_stmt.exists(params![namespace, seed])? {
            hops.insert(seed.clone(), 0);
            seeds.push(seed.clone());
        }
    }

    let mut edges: BTreeMap<(String, String, String), GraphEdge> = BTreeMap::new();
    let mut frontier = seeds.clone();

    for hop in 0..=max_hops {
        if frontier.is_empty() {
            break;
        }
        check.check()?;

        let expand = hop < max_hops;
        let mut next = Vec::new();

        for edge in edges_touching(conn, namespace, &frontier, &type_filter)? {
            if expand {
                for endpoint in [&edge.source, &edge.target] {
                    if !hops.contains_key(endpoint) {
                        hops.insert(endpoint.clone(), hop + 1);
                        next.push(endpoint.clone());
                    }
                }
            } else if !(hops.contains_key(&edge.source) && hops.contains_key(&edge.target)) {
                continue;
            }

            let key = (
                edge.source.clone(),
                edge.target.clone(),
                edge.relationship.clone(),
            );
            edges.insert(key, edge);
        }

        frontier = next;
    }

    check.check()?;

    let mut nodes = Vec::with_capacity(hops.len());
    for (entity_id, hop) in &hops {
        let node = entity_stmt.query_row(params![namespace, entity_id], |row| {
            Ok(GraphNode {
                entity_id: entity_id.clone(),
                name: row.get(0)?,
                description: row.get(1)?,
                document_id: row.get(2)?,
                chunk_id: row.get(3)?,
                hop: *hop,
            })
        });
        match node {
            Ok(node) => nodes.push(node),
            // 관계에만 등장하고 엔티티 행이 없는 노드
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                tracing::debug!("Dangling graph node {} in {}", entity_id, namespace);
            }
            Err(e) => return Err(e).context("Failed to load entity"),
        }
    }
    nodes.sort_by(|a, b| a.hop.cmp(&b.hop).then_with(|| a.entity_id.cmp(&b.entity_id)));

    Ok(Subgraph {
        seeds,
        nodes,
        edges: edges.into_values().collect(),
    })
}

fn community_summaries_blocking(
    conn: &Connection,
    namespace: &str,
    query_vector: &[f32],
    top_k: usize,
) -> Result<Vec<CommunityHit>> {
    let mut stmt = conn.prepare(
        "SELECT id, summary, embedding, members FROM communities WHERE namespace = ?1",
    )?;
    let rows = stmt
        .query_map(params![namespace], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut hits = Vec::with_capacity(rows.len());
    for (id, summary, embedding_json, members_json) in rows {
        let embedding: Vec<f32> = serde_json::from_str(&embedding_json)
            .with_context(|| format!("Corrupt embedding for community {}", id))?;
        if embedding.len() != query_vector.len() {
            tracing::debug!(
                "Skipping community {}: dimension {} != {}",
                id,
                embedding.len(),
                query_vector.len()
            );
            continue;
        }
        let member_entities: Vec<String> = serde_json::from_str(&members_json)
            .with_context(|| format!("Corrupt members for community {}", id))?;

        hits.push(CommunityHit {
            score: cosine_similarity(query_vector, &embedding) as f64,
            summary_id: id,
            summary,
            member_entities,
        });
    }

    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.summary_id.cmp(&b.summary_id))
    });
    hits.truncate(top_k);
    Ok(hits)
}

// ============================================================================
// KnowledgeGraph impl
// ============================================================================

#[async_trait]
impl KnowledgeGraph for SqliteGraphStore {
    async fn match_entities(
        &self,
        namespace: &str,
        text: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let namespace = namespace.to_string();
        let text = text.to_string();

        self.conn
            .run("entity match", move |conn, _| {
                match_entities_blocking(conn, &namespace, &text, limit)
            })
            .await
    }

    async fn neighbors(
        &self,
        namespace: &str,
        entity_ids: &[String],
        max_hops: u32,
        relationship_types: &[String],
    ) -> Result<Subgraph> {
        let namespace = namespace.to_string();
        let entity_ids = entity_ids.to_vec();
        let relationship_types = relationship_types.to_vec();

        self.conn
            .run("neighbor traversal", move |conn, check| {
                neighbors_blocking(
                    conn,
                    check,
                    &namespace,
                    &entity_ids,
                    max_hops,
                    &relationship_types,
                )
            })
            .await
    }

    async fn community_summaries(
        &self,
        namespace: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<CommunityHit>> {
        let namespace = namespace.to_string();
        let query_vector = query_vector.to_vec();

        self.conn
            .run("community search", move |conn, _| {
                community_summaries_blocking(conn, &namespace, &query_vector, top_k)
            })
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entity(id: &str, name: &str) -> NewEntity {
        NewEntity {
            id: id.to_string(),
            namespace: "ns".to_string(),
            name: name.to_string(),
            description: format!("{} description", name),
            document_id: Some(format!("doc-{}", id)),
            chunk_id: Some("0".to_string()),
        }
    }

    fn rel(source: &str, target: &str, relationship: &str, weight: f64) -> NewRelationship {
        NewRelationship {
            namespace: "ns".to_string(),
            source: source.to_string(),
            target: target.to_string(),
            relationship: relationship.to_string(),
            weight,
        }
    }

    /// rust -> tokio -> mio, rust -> cargo (uses)
    fn create_test_store() -> (TempDir, SqliteGraphStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteGraphStore::open(&dir.path().join("graph.db")).unwrap();

        store.add_entity(entity("e-rust", "Rust")).unwrap();
        store.add_entity(entity("e-tokio", "Tokio")).unwrap();
        store.add_entity(entity("e-mio", "mio")).unwrap();
        store.add_entity(entity("e-cargo", "Cargo")).unwrap();
        store.add_entity(entity("e-rust-lang", "Rust language")).unwrap();

        store.add_relationship(rel("e-tokio", "e-rust", "written_in", 1.0)).unwrap();
        store.add_relationship(rel("e-tokio", "e-mio", "depends_on", 0.8)).unwrap();
        store.add_relationship(rel("e-rust", "e-cargo", "uses", 0.5)).unwrap();

        (dir, store)
    }

    #[tokio::test]
    async fn test_match_entities_whole_words_longest_first() {
        let (_dir, store) = create_test_store();

        let ids = store
            .match_entities("ns", "What is the Rust language built with?", 8)
            .await
            .unwrap();
        assert_eq!(ids, vec!["e-rust-lang".to_string(), "e-rust".to_string()]);

        // "rusty"는 "rust"와 매칭되지 않음
        let ids = store.match_entities("ns", "rusty nails", 8).await.unwrap();
        assert!(ids.is_empty());

        let ids = store.match_entities("other", "Rust", 8).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_neighbors_respects_hop_limit() {
        let (_dir, store) = create_test_store();
        let seeds = vec!["e-mio".to_string()];

        let one = store.neighbors("ns", &seeds, 1, &[]).await.unwrap();
        let ids: Vec<_> = one.nodes.iter().map(|n| n.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["e-mio", "e-tokio"]);

        let three = store.neighbors("ns", &seeds, 3, &[]).await.unwrap();
        let cargo = three.nodes.iter().find(|n| n.entity_id == "e-cargo").unwrap();
        assert_eq!(cargo.hop, 3);
        assert_eq!(three.edges.len(), 3);
        assert_eq!(three.seeds, seeds);
    }

    #[tokio::test]
    async fn test_neighbors_relationship_filter() {
        let (_dir, store) = create_test_store();
        let seeds = vec!["e-tokio".to_string()];

        let sub = store
            .neighbors("ns", &seeds, 3, &["depends_on".to_string()])
            .await
            .unwrap();
        let ids: Vec<_> = sub.nodes.iter().map(|n| n.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["e-tokio", "e-mio"]);
        assert!(sub.edges.iter().all(|e| e.relationship == "depends_on"));
    }

    #[tokio::test]
    async fn test_neighbors_unknown_seed_is_empty() {
        let (_dir, store) = create_test_store();
        let sub = store
            .neighbors("ns", &["missing".to_string()], 2, &[])
            .await
            .unwrap();
        assert!(sub.seeds.is_empty());
        assert!(sub.nodes.is_empty());
    }

    #[tokio::test]
    async fn test_community_summaries_ranked_by_similarity() {
        let (_dir, store) = create_test_store();
        store
            .add_community(NewCommunity {
                id: "c-async".to_string(),
                namespace: "ns".to_string(),
                summary: "Async runtime ecosystem".to_string(),
                embedding: vec![1.0, 0.0],
                members: vec!["e-tokio".to_string(), "e-mio".to_string()],
            })
            .unwrap();
        store
            .add_community(NewCommunity {
                id: "c-tooling".to_string(),
                namespace: "ns".to_string(),
                summary: "Build tooling".to_string(),
                embedding: vec![0.0, 1.0],
                members: vec!["e-cargo".to_string()],
            })
            .unwrap();

        let hits = store.community_summaries("ns", &[0.9, 0.1], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].summary_id, "c-async");
        assert_eq!(hits[0].member_entities.len(), 2);

        let hits = store.community_summaries("ns", &[0.9, 0.1], 1).await.unwrap();
        assert_eq!(hits.len(), 1);

        assert_eq!(store.counts().unwrap(), (5, 3, 2));
    }
}
