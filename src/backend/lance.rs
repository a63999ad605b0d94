//! LanceDB 벡터 인덱스
//!
//! 청크 임베딩을 네임스페이스 컬럼과 함께 저장하고,
//! 검색 시 `namespace = '<ns>'` 조건으로 테넌트를 격리합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::{HitPayload, IndexHit, VectorIndex};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "chunks";

/// 저장용 벡터 레코드
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub namespace: String,
    pub document_id: Option<String>,
    pub chunk_id: Option<String>,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// LanceDB 벡터 인덱스 구현
pub struct LanceVectorIndex {
    db: Connection,
    dimension: i32,
}

impl LanceVectorIndex {
    /// LanceDB 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - LanceDB 디렉토리 경로
    /// * `dimension` - 임베딩 차원 (프로바이더와 일치해야 함)
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        Ok(Self { db, dimension })
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("namespace", DataType::Utf8, false),
            Field::new("document_id", DataType::Utf8, true),
            Field::new("chunk_id", DataType::Utf8, true),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    fn records_to_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch> {
        if records.is_empty() {
            anyhow::bail!("Cannot create batch from empty records");
        }
        if let Some(bad) = records
            .iter()
            .find(|r| r.embedding.len() != self.dimension as usize)
        {
            anyhow::bail!(
                "Record {} has dimension {}, expected {}",
                bad.id,
                bad.embedding.len(),
                self.dimension
            );
        }

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let namespaces: Vec<&str> = records.iter().map(|r| r.namespace.as_str()).collect();
        let document_ids: Vec<Option<&str>> =
            records.iter().map(|r| r.document_id.as_deref()).collect();
        let chunk_ids: Vec<Option<&str>> = records.iter().map(|r| r.chunk_id.as_deref()).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();

        let embeddings_flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(self.schema()),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(namespaces)),
                Arc::new(StringArray::from(document_ids)),
                Arc::new(StringArray::from(chunk_ids)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// 테이블이 아직 만들어지지 않았으면 `false`, 목록 조회 실패는 에러
    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list vector tables")?;
        Ok(names.iter().any(|n| n == TABLE_NAME))
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")
    }

    /// 레코드 배치 삽입 (픽스처/운영 도구용)
    pub async fn insert_batch(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let batch = self.records_to_batch(records)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await? {
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(records.len())
    }

    /// 저장된 벡터 개수
    pub async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")
    }
}

/// 네임스페이스 필터 (작은따옴표 이스케이프)
fn namespace_filter(namespace: &str) -> String {
    format!("namespace = '{}'", namespace.replace('\'', "''"))
}

fn optional_value(column: &StringArray, row: usize) -> Option<String> {
    if column.is_null(row) {
        None
    } else {
        Some(column.value(row).to_string())
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn search(&self, vector: &[f32], namespace: &str, top_k: usize) -> Result<Vec<IndexHit>> {
        if vector.len() != self.dimension as usize {
            anyhow::bail!(
                "Query vector has dimension {}, index expects {}",
                vector.len(),
                self.dimension
            );
        }
        if top_k == 0 || !self.table_exists().await? {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;

        let stream = table
            .vector_search(vector.to_vec())
            .context("Failed to create vector search")?
            .only_if(namespace_filter(namespace))
            .limit(top_k)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut hits = Vec::new();

        for batch in batches {
            let column = |name: &str| {
                batch
                    .column_by_name(name)
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                    .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
            };

            let ids = column("id")?;
            let document_ids = column("document_id")?;
            let chunk_ids = column("chunk_id")?;
            let texts = column("text")?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                // 거리 -> 0~1 유사도
                let similarity = 1.0 / (1.0 + distances.value(i) as f64);

                hits.push(IndexHit {
                    id: ids.value(i).to_string(),
                    score: similarity,
                    payload: HitPayload {
                        text: texts.value(i).to_string(),
                        document_id: optional_value(document_ids, i),
                        chunk_id: optional_value(chunk_ids, i),
                    },
                });
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(hits)
    }
}

// ============================================================================
// Tests
// ============================================================================
