//! SQLite FTS5 키워드 인덱스
//!
//! 패시지 본문을 FTS5 가상 테이블로 색인하고 BM25로 순위를 매깁니다.
//! 저장 위치: `<data_dir>/knowledge.db`
//! source: https://www.sqlite.org/fts5.html

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};

use super::sqlite::SharedConnection;
use super::{HitPayload, IndexHit, LexicalIndex};

/// 새 패시지 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewPassage {
    pub id: String,
    pub namespace: String,
    pub document_id: Option<String>,
    pub chunk_id: Option<String>,
    pub text: String,
}

/// FTS5 기반 키워드 인덱스
pub struct SqliteLexicalIndex {
    conn: SharedConnection,
    db_path: PathBuf,
}

impl SqliteLexicalIndex {
    /// 인덱스 열기 (없으면 생성)
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

        let index = Self {
            conn: SharedConnection::new(conn),
            db_path: path.to_path_buf(),
        };

        index.initialize()?;
        Ok(index)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS passages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                namespace TEXT NOT NULL,
                document_id TEXT,
                chunk_id TEXT,
                text TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_passages_namespace ON passages(namespace);
            "#,
        )
        .context("Failed to create passages table")?;

        // 키워드 시그널은 FTS5 없이는 동작할 수 없으므로 실패를 그대로 올림
        conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS passages_fts USING fts5(
                text,
                content=passages,
                content_rowid=seq
            )",
            [],
        )
        .context("Failed to create FTS5 table")?;

        conn.execute_batch(
            r#"
            CREATE TRIGGER IF NOT EXISTS passages_ai AFTER INSERT ON passages BEGIN
                INSERT INTO passages_fts(rowid, text) VALUES (new.seq, new.text);
            END;

            CREATE TRIGGER IF NOT EXISTS passages_ad AFTER DELETE ON passages BEGIN
                INSERT INTO passages_fts(passages_fts, rowid, text)
                VALUES('delete', old.seq, old.text);
            END;

            CREATE TRIGGER IF NOT EXISTS passages_au AFTER UPDATE ON passages BEGIN
                INSERT INTO passages_fts(passages_fts, rowid, text)
                VALUES('delete', old.seq, old.text);
                INSERT INTO passages_fts(rowid, text) VALUES (new.seq, new.text);
            END;
            "#,
        )
        .context("Failed to create FTS5 triggers")?;

        tracing::debug!("Lexical index initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 패시지 저장 (id가 같으면 갱신)
    pub fn add_passage(&self, passage: NewPassage) -> Result<()> {
        let conn = self.conn.lock()?;

        conn.execute(
            "INSERT INTO passages (id, namespace, document_id, chunk_id, text)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                namespace = excluded.namespace,
                document_id = excluded.document_id,
                chunk_id = excluded.chunk_id,
                text = excluded.text",
            params![
                passage.id,
                passage.namespace,
                passage.document_id,
                passage.chunk_id,
                passage.text
            ],
        )
        .context("Failed to insert passage")?;

        tracing::debug!("Indexed passage {} in {}", passage.id, passage.namespace);
        Ok(())
    }

    /// 저장된 패시지 개수
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock()?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))
            .context("Failed to count passages")?;
        Ok(count as usize)
    }
}

/// BM25 검색 (블로킹)
fn search_blocking(
    conn: &Connection,
    fts_query: &str,
    namespace: &str,
    top_k: usize,
) -> Result<Vec<IndexHit>> {
    // bm25()는 낮을수록 관련도가 높음
    // source: https://www.sqlite.org/fts5.html#the_bm25_function
    let mut stmt = conn.prepare(
        r#"
        SELECT p.id, p.document_id, p.chunk_id, p.text, bm25(passages_fts) AS rank_score
        FROM passages_fts
        JOIN passages p ON p.seq = passages_fts.rowid
        WHERE passages_fts MATCH ?1 AND p.namespace = ?2
        ORDER BY rank_score, p.id
        LIMIT ?3
        "#,
    )?;

    let hits = stmt
        .query_map(params![fts_query, namespace, top_k as i64], |row| {
            let bm25: f64 = row.get(4)?;
            Ok(IndexHit {
                id: row.get(0)?,
                score: -bm25,
                payload: HitPayload {
                    document_id: row.get(1)?,
                    chunk_id: row.get(2)?,
                    text: row.get(3)?,
                },
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read FTS5 rows")?;

    Ok(hits)
}

#[async_trait]
impl LexicalIndex for SqliteLexicalIndex {
    async fn search(&self, text: &str, namespace: &str, top_k: usize) -> Result<Vec<IndexHit>> {
        let fts_query = escape_fts5_query(text);
        if fts_query.is_empty() || top_k == 0 {
            return Ok(vec![]);
        }

        let namespace = namespace.to_string();

        self.conn
            .run("FTS5 search", move |conn, _| {
                search_blocking(conn, &fts_query, &namespace, top_k)
            })
            .await
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// FTS5 쿼리 이스케이프
///
/// 단어에서 특수 문자를 제거하고 각 단어를 따옴표로 감싸 OR로 잇습니다.
/// source: https://www.sqlite.org/fts5.html#full_text_query_syntax
pub fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w))
        .collect::<Vec<_>>()
        .join(" OR ")
}

// ============================================================================
// Tests
// ============================================================================
