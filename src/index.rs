//! Persisted vector index over one document's chunks.
//!
//! A [`VectorIndex`] is a SQLite database at `<dir>/index.sqlite` holding
//! every chunk's text, metadata and embedding. It is written once by
//! [`VectorIndex::build`] and only read afterwards; a new document gets a
//! new index, never an update of the old one.
//!
//! Search is brute force: all stored vectors are scored against the query
//! with cosine similarity in Rust. A single document is small enough that
//! this beats maintaining an ANN structure.
//!
//! Vectors are stored as little-endian `f32` BLOBs (see [`vec_to_blob`]).

use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::db;
use crate::error::QaError;
use crate::migrate;
use crate::models::{Chunk, Locator, RetrievedChunk};

pub const INDEX_FILE: &str = "index.sqlite";

/// What the index was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexMeta {
    pub document_id: String,
    pub model: String,
    pub dims: usize,
    pub chunk_count: usize,
    pub created_at: i64,
}

pub struct VectorIndex {
    pool: SqlitePool,
    meta: IndexMeta,
}

impl VectorIndex {
    /// Path of the database file inside an index directory.
    pub fn db_path(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE)
    }

    /// Persist `chunks` with their `vectors` into a fresh database in `dir`.
    ///
    /// Everything is written in one transaction; the index is marked
    /// complete only when the commit succeeds.
    pub async fn build(
        dir: &Path,
        document_id: &str,
        model: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<Self, QaError> {
        if chunks.len() != vectors.len() {
            return Err(QaError::Index(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
            return Err(QaError::Index(
                "embedding vectors are empty or of mixed dimensions".to_string(),
            ));
        }

        let pool = db::connect(&Self::db_path(dir)).await?;
        migrate::run_migrations(&pool).await?;

        let created_at = Utc::now().timestamp();
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM index_meta").execute(&mut *tx).await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, locator, text, hash, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(chunk.locator.encode())
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO index_meta (id, document_id, model, dims, chunk_count, created_at, complete) \
             VALUES (1, ?, ?, ?, ?, ?, 1)",
        )
        .bind(document_id)
        .bind(model)
        .bind(dims as i64)
        .bind(chunks.len() as i64)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Self {
            pool,
            meta: IndexMeta {
                document_id: document_id.to_string(),
                model: model.to_string(),
                dims,
                chunk_count: chunks.len(),
                created_at,
            },
        })
    }

    /// Open a previously built index in `dir`.
    ///
    /// Returns `Ok(None)` when there is no database, or when it was never
    /// marked complete.
    pub async fn open(dir: &Path) -> Result<Option<Self>, QaError> {
        let path = Self::db_path(dir);
        if !path.exists() {
            return Ok(None);
        }

        let pool = db::connect(&path).await?;
        let row = sqlx::query(
            "SELECT document_id, model, dims, chunk_count, created_at \
             FROM index_meta WHERE id = 1 AND complete = 1",
        )
        .fetch_optional(&pool)
        .await;

        let row = match row {
            Ok(Some(row)) => row,
            Ok(None) => {
                pool.close().await;
                return Ok(None);
            }
            Err(e) => {
                pool.close().await;
                return Err(e.into());
            }
        };

        let meta = IndexMeta {
            document_id: row.try_get("document_id")?,
            model: row.try_get("model")?,
            dims: row.try_get::<i64, _>("dims")? as usize,
            chunk_count: row.try_get::<i64, _>("chunk_count")? as usize,
            created_at: row.try_get("created_at")?,
        };
        Ok(Some(Self { pool, meta }))
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Return the `k` chunks most similar to `query`.
    ///
    /// `k` is clamped to `[1, chunk_count]`. Results are ordered by
    /// descending score, ties by ascending `chunk_index`.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, QaError> {
        if query.len() != self.meta.dims {
            return Err(QaError::Index(format!(
                "query vector has {} dimensions, index was built with {}",
                query.len(),
                self.meta.dims
            )));
        }

        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, locator, text, hash, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let locator: String = row.try_get("locator")?;
            let blob: Vec<u8> = row.try_get("embedding")?;
            let chunk = Chunk {
                id: row.try_get("id")?,
                document_id: row.try_get("document_id")?,
                chunk_index: row.try_get("chunk_index")?,
                locator: Locator::decode(&locator)
                    .ok_or_else(|| QaError::Index(format!("bad locator '{}'", locator)))?,
                text: row.try_get("text")?,
                hash: row.try_get("hash")?,
            };
            let score = cosine_similarity(query, &blob_to_vec(&blob));
            scored.push(RetrievedChunk { chunk, score });
        }

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        if !scored.is_empty() {
            scored.truncate(k.clamp(1, scored.len()));
        }

        debug!(
            candidates = self.meta.chunk_count,
            returned = scored.len(),
            top_score = scored.first().map(|r| r.score),
            "vector search"
        );
        Ok(scored)
    }

    /// Close the pool so the directory can be removed.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Encode a float vector as a BLOB of little-endian `f32` bytes.
///
/// ```rust
/// use docask::index::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
