//! The single active index and the lock that guards it.
//!
//! [`Session`] owns at most one [`VectorIndex`] together with the id of the
//! document it was built from. Both live in one `Option`, so "an index
//! without a document" (or the reverse) cannot be represented.
//!
//! Lock discipline:
//! - a whole rebuild (and a user reset) holds the rebuild mutex, so
//!   attempts run one at a time and the last one started decides the state;
//! - rebuild swap and reset take the write lock;
//! - searches take the read lock for the lookup only.
//!
//! A search in flight during a swap either finishes against the old index
//! or waits for the new one; it never sees a half-torn-down index.

use std::path::{Path, PathBuf};

use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{info, warn};

use crate::error::QaError;
use crate::index::VectorIndex;
use crate::models::{Chunk, RetrievedChunk, SessionStatus};

struct ActiveIndex {
    document_id: String,
    index: VectorIndex,
}

pub struct Session {
    index_dir: PathBuf,
    active: RwLock<Option<ActiveIndex>>,
    rebuilding: Mutex<()>,
}

impl Session {
    /// An empty session. Nothing on disk is touched until the first rebuild.
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            active: RwLock::new(None),
            rebuilding: Mutex::new(()),
        }
    }

    /// Reopen the index a previous process left in `index_dir`.
    ///
    /// An index that is incomplete, unreadable, or was embedded with a model
    /// other than `model` is deleted and the session starts empty.
    pub async fn restore(index_dir: impl Into<PathBuf>, model: &str) -> Self {
        let session = Self::new(index_dir);
        match VectorIndex::open(&session.index_dir).await {
            Ok(Some(index)) if index.meta().model != model => {
                warn!(
                    indexed_with = %index.meta().model,
                    configured = %model,
                    "discarding index built with a different embedding model"
                );
                index.close().await;
                if let Err(e) = remove_dir(&session.index_dir).await {
                    warn!(error = %e, "could not clear stale index directory");
                }
            }
            Ok(Some(index)) => {
                let document_id = index.meta().document_id.clone();
                info!(
                    document = %document_id,
                    chunks = index.meta().chunk_count,
                    "restored persisted index"
                );
                *session.active.write().await = Some(ActiveIndex { document_id, index });
            }
            Ok(None) if VectorIndex::db_path(&session.index_dir).exists() => {
                warn!(dir = %session.index_dir.display(), "discarding incomplete index");
                if let Err(e) = remove_dir(&session.index_dir).await {
                    warn!(error = %e, "could not clear stale index directory");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, dir = %session.index_dir.display(), "discarding unreadable index");
                if let Err(e) = remove_dir(&session.index_dir).await {
                    warn!(error = %e, "could not clear stale index directory");
                }
            }
        }
        session
    }

    pub async fn is_ready(&self) -> bool {
        self.active.read().await.is_some()
    }

    pub async fn status(&self) -> SessionStatus {
        match self.active.read().await.as_ref() {
            Some(active) => SessionStatus {
                ready: true,
                document_id: Some(active.document_id.clone()),
                chunk_count: Some(active.index.meta().chunk_count),
                model: Some(active.index.meta().model.clone()),
            },
            None => SessionStatus::default(),
        }
    }

    /// Drop the active index and delete its directory.
    ///
    /// Waits for an in-flight rebuild to finish first.
    pub async fn reset(&self) -> Result<(), QaError> {
        let _rebuild = self.rebuilding.lock().await;
        self.clear().await
    }

    /// Hold this for the whole of a rebuild attempt.
    pub(crate) async fn begin_rebuild(&self) -> MutexGuard<'_, ()> {
        self.rebuilding.lock().await
    }

    /// [`Session::reset`] for a caller that already holds the rebuild guard.
    pub(crate) async fn clear(&self) -> Result<(), QaError> {
        let mut active = self.active.write().await;
        if let Some(old) = active.take() {
            old.index.close().await;
        }
        remove_dir(&self.index_dir).await
    }

    /// Swap in a freshly built index for `document_id`.
    ///
    /// The previous index is closed and its directory wiped before the new
    /// one is written. If writing fails the session is left empty.
    pub(crate) async fn replace(
        &self,
        document_id: &str,
        model: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize, QaError> {
        let mut active = self.active.write().await;
        if let Some(old) = active.take() {
            info!(document = %old.document_id, "discarding previous index");
            old.index.close().await;
        }

        remove_dir(&self.index_dir).await?;
        tokio::fs::create_dir_all(&self.index_dir)
            .await
            .map_err(QaError::index)?;

        let index =
            match VectorIndex::build(&self.index_dir, document_id, model, chunks, vectors).await {
                Ok(index) => index,
                Err(e) => {
                    // The half-written database must not be restored later.
                    if let Err(cleanup) = remove_dir(&self.index_dir).await {
                        warn!(error = %cleanup, "could not remove partial index");
                    }
                    return Err(e);
                }
            };

        let dims = index.meta().dims;
        *active = Some(ActiveIndex {
            document_id: document_id.to_string(),
            index,
        });
        Ok(dims)
    }

    /// Nearest-neighbour lookup against the active index.
    pub(crate) async fn search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, QaError> {
        let active = self.active.read().await;
        match active.as_ref() {
            Some(a) => a.index.search(query, k).await,
            None => Err(QaError::NoActiveIndex),
        }
    }
}

async fn remove_dir(dir: &Path) -> Result<(), QaError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(QaError::Index(format!(
            "cannot remove {}: {}",
            dir.display(),
            e
        ))),
    }
}
