//! SQLite-backed store with migrations
//!
//! One `documents` table holds every corpus. Embeddings live next to the
//! text as little-endian f32 blobs; similarity is computed in-process.

use super::{
    decode_vector, encode_vector, CitationGraph, KeywordStore, ScoredDocument, StoreError,
    StoredDocument, VectorStore,
};
use crate::embedding::cosine_similarity;
use crate::error::{LexfuseError, Result};
use crate::retrieval::Corpus;
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

const DOCUMENT_COLUMNS: &str = "id, corpus, title, content, chunk_index, metadata";

/// Store over a pooled SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`
    pub fn new(db_path: &Path, pool_size: u32) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LexfuseError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e| LexfuseError::Config(format!("Failed to create connection pool: {}", e)))?;

        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| LexfuseError::Config(format!("Failed to get connection: {}", e)))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;
            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Insert or replace a document and, optionally, its embedding
    pub fn upsert_document(&self, doc: &StoredDocument, embedding: Option<&[f32]>) -> Result<()> {
        let conn = self.get_conn()?;
        let metadata = serde_json::to_string(&doc.metadata).map_err(|e| LexfuseError::Json {
            source: e,
            context: format!("Failed to encode metadata of {}", doc.id),
        })?;

        conn.execute(
            "INSERT OR REPLACE INTO documents
                (corpus, id, title, content, chunk_index, metadata, law_number, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                doc.corpus.as_str(),
                doc.id,
                doc.title,
                doc.content,
                doc.chunk_index,
                metadata,
                doc.law_number(),
                embedding.map(encode_vector),
            ],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.get_conn()?;
        let mut per_corpus = Vec::new();
        for corpus in Corpus::ALL {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE corpus = ?1",
                params![corpus.as_str()],
                |row| row.get(0),
            )?;
            per_corpus.push((corpus, count as usize));
        }
        let embedded: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            per_corpus,
            embedded_count: embedded as usize,
        })
    }

    /// Run a blocking query on the pool without stalling the async runtime
    async fn blocking<T, F>(&self, f: F) -> std::result::Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Document counts
#[derive(Debug)]
pub struct StoreStats {
    pub per_corpus: Vec<(Corpus, usize)>,
    pub embedded_count: usize,
}

impl StoreStats {
    pub fn total(&self) -> usize {
        self.per_corpus.iter().map(|(_, n)| n).sum()
    }
}

struct RawDocument {
    id: String,
    corpus: String,
    title: String,
    content: String,
    chunk_index: i64,
    metadata: String,
}

impl RawDocument {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            corpus: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            chunk_index: row.get(4)?,
            metadata: row.get(5)?,
        })
    }

    fn into_document(self) -> std::result::Result<StoredDocument, StoreError> {
        let corpus = self.corpus.parse::<Corpus>().map_err(StoreError::Query)?;
        Ok(StoredDocument {
            id: self.id,
            corpus,
            title: self.title,
            content: self.content,
            chunk_index: self.chunk_index,
            metadata: serde_json::from_str(&self.metadata)?,
        })
    }
}

fn query_documents(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> std::result::Result<Vec<StoredDocument>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map(params, RawDocument::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(RawDocument::into_document).collect()
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn top_k_similar(
        &self,
        corpus: Corpus,
        vector: &[f32],
        k: usize,
        threshold: f32,
    ) -> std::result::Result<Vec<ScoredDocument>, StoreError> {
        let query = vector.to_vec();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {}, embedding FROM documents
                 WHERE corpus = ?1 AND embedding IS NOT NULL
                 ORDER BY rowid",
                DOCUMENT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![corpus.as_str()], |row| {
                    Ok((RawDocument::from_row(row)?, row.get::<_, Vec<u8>>(6)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut hits = Vec::new();
            for (raw, blob) in rows {
                let Some(score) = cosine_similarity(&query, &decode_vector(&blob)) else {
                    continue;
                };
                if score >= threshold {
                    hits.push(ScoredDocument {
                        document: raw.into_document()?,
                        score,
                    });
                }
            }

            hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(k);
            Ok(hits)
        })
        .await
    }

    async fn embeddings(
        &self,
        corpus: Corpus,
        ids: &[String],
    ) -> std::result::Result<HashMap<String, Vec<f32>>, StoreError> {
        let ids = ids.to_vec();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT embedding FROM documents
                 WHERE corpus = ?1 AND id = ?2 AND embedding IS NOT NULL",
            )?;
            let mut found = HashMap::new();
            for id in ids {
                let mut rows = stmt.query(params![corpus.as_str(), id])?;
                if let Some(row) = rows.next()? {
                    let blob: Vec<u8> = row.get(0)?;
                    found.insert(id, decode_vector(&blob));
                }
            }
            Ok(found)
        })
        .await
    }
}

#[async_trait]
impl KeywordStore for SqliteStore {
    async fn match_keywords(
        &self,
        corpus: Corpus,
        keywords: &[String],
    ) -> std::result::Result<Vec<StoredDocument>, StoreError> {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        self.blocking(move |conn| {
            let docs = query_documents(
                conn,
                &format!(
                    "SELECT {} FROM documents WHERE corpus = ?1 ORDER BY rowid",
                    DOCUMENT_COLUMNS
                ),
                params![corpus.as_str()],
            )?;
            // SQLite's LOWER() only folds ASCII, so matching happens here
            Ok(docs
                .into_iter()
                .filter(|doc| {
                    let text = doc.searchable_text();
                    keywords.iter().any(|k| text.contains(k.as_str()))
                })
                .collect())
        })
        .await
    }
}

#[async_trait]
impl CitationGraph for SqliteStore {
    async fn lookup_by_law_number(
        &self,
        number: &str,
    ) -> std::result::Result<Vec<StoredDocument>, StoreError> {
        let number = number.to_string();
        self.blocking(move |conn| {
            query_documents(
                conn,
                &format!(
                    "SELECT {} FROM documents
                     WHERE corpus = ?1 AND law_number = ?2 ORDER BY rowid",
                    DOCUMENT_COLUMNS
                ),
                params![Corpus::Laws.as_str(), number],
            )
        })
        .await
    }

    async fn lookup_by_case_number(
        &self,
        pattern: &str,
    ) -> std::result::Result<Vec<StoredDocument>, StoreError> {
        let pattern = pattern.to_lowercase();
        self.blocking(move |conn| {
            let docs = query_documents(
                conn,
                &format!(
                    "SELECT {} FROM documents WHERE corpus != ?1 ORDER BY rowid",
                    DOCUMENT_COLUMNS
                ),
                params![Corpus::Laws.as_str()],
            )?;
            Ok(docs
                .into_iter()
                .filter(|doc| doc.id.to_lowercase().contains(&pattern))
                .collect())
        })
        .await
    }
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: document table
    r#"
    CREATE TABLE documents (
        corpus TEXT NOT NULL,
        id TEXT NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        content TEXT NOT NULL,
        chunk_index INTEGER NOT NULL DEFAULT 0,
        metadata TEXT NOT NULL DEFAULT '{}',
        law_number TEXT,
        embedding BLOB,
        PRIMARY KEY (corpus, id)
    );

    CREATE INDEX idx_documents_corpus ON documents(corpus);
    CREATE INDEX idx_documents_law_number ON documents(law_number);
    "#,
];
