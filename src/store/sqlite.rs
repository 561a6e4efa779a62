//! Local SQLite backend.
//!
//! Vectors are stored as little-endian `f32` blobs next to their text. Similarity is computed
//! in-process over every row, which is adequate for the document counts a single workspace
//! holds.

use super::record::{
    DocumentRecord, ScoredRecord, StoredDocument, compute_content_hash, current_timestamp_rfc3339,
};
use super::{StoreError, VectorBackend};
use crate::embedding::cosine_similarity;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// SQLite limits bound parameters per statement; stay well below the default.
const KEY_LOOKUP_BATCH: usize = 500;

/// Durable backend persisting documents in a single SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    path: PathBuf,
}

impl SqliteBackend {
    /// Open (creating when missing) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                StoreError::Unavailable(format!(
                    "failed to create store directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        tracing::debug!(path = %path.display(), "SQLite store connected");
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }
}

#[async_trait]
impl VectorBackend for SqliteBackend {
    async fn ensure_ready(&self, dimension: usize) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                source_key TEXT PRIMARY KEY NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL,
                dimension INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                ingested_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let stored: Option<i64> = sqlx::query_scalar("SELECT dimension FROM documents LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        if let Some(actual) = stored
            && actual as usize != dimension
        {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: actual as usize,
            });
        }
        Ok(())
    }

    async fn existing_keys(&self, keys: &[String]) -> Result<HashSet<String>, StoreError> {
        let mut found = HashSet::new();
        for batch in keys.chunks(KEY_LOOKUP_BATCH) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT source_key FROM documents WHERE source_key IN (");
            let mut separated = builder.separated(", ");
            for key in batch {
                separated.push_bind(key);
            }
            separated.push_unseparated(")");

            let rows: Vec<String> = builder
                .build_query_scalar::<String>()
                .fetch_all(&self.pool)
                .await?;
            found.extend(rows);
        }
        Ok(found)
    }

    async fn insert(&self, records: Vec<DocumentRecord>) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;
        for record in records {
            let result = sqlx::query(
                "INSERT INTO documents
                    (source_key, text, vector, dimension, content_hash, ingested_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(source_key) DO NOTHING",
            )
            .bind(&record.source_key)
            .bind(&record.text)
            .bind(encode_vector(&record.vector))
            .bind(record.vector.len() as i64)
            .bind(compute_content_hash(&record.text))
            .bind(current_timestamp_rfc3339())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>, StoreError> {
        let mut rows = sqlx::query("SELECT source_key, text, vector FROM documents")
            .fetch(&self.pool);

        let mut scored = Vec::new();
        while let Some(row) = rows.try_next().await? {
            let blob: Vec<u8> = row.try_get("vector")?;
            let candidate = decode_vector(&blob);
            scored.push(ScoredRecord {
                source_key: row.try_get("source_key")?,
                text: row.try_get("text")?,
                score: cosine_similarity(vector, &candidate),
            });
        }

        scored.sort_by(|left, right| {
            right
                .score
                .partial_cmp(&left.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.source_key.cmp(&right.source_key))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn get(&self, source_key: &str) -> Result<Option<StoredDocument>, StoreError> {
        let row = sqlx::query(
            "SELECT source_key, text, content_hash, ingested_at FROM documents WHERE source_key = ?",
        )
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<StoredDocument, StoreError> {
            Ok(StoredDocument {
                source_key: row.try_get("source_key")?,
                text: row.try_get("text")?,
                content_hash: row.try_get("content_hash")?,
                ingested_at: row.try_get("ingested_at")?,
            })
        })
        .transpose()
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
