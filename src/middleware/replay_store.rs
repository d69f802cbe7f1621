//! Keyed persistence of responses for the [`Replay`](super::Replay)
//! middleware.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;
use xxhash_rust::xxh3::xxh3_64;

use crate::codec::{MetaCodec, ResponseRecord};
use crate::response::Response;

/// Abstract storage for replayable responses, namespaced by session.
///
/// Missing entries are absent, not errors; implementations log their own I/O
/// failures and degrade to absent on read and to a no-op on write. Concurrent
/// `set` calls on one key are last-writer-wins, and a `get` racing a partial
/// write returns absent.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    async fn has(&self, session: &str, id: &str) -> bool;
    async fn get(&self, session: &str, id: &str) -> Option<Response>;
    async fn set(&self, session: &str, id: &str, res: &Response);
}

/// A [`ReplayStore`] backed by an in-memory concurrent map.
#[derive(Default)]
pub struct MemoryReplayStore {
    entries: DashMap<String, Response>,
}

impl MemoryReplayStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(session: &str, id: &str) -> String {
        format!("{session}:{id}")
    }
}

#[async_trait]
impl ReplayStore for MemoryReplayStore {
    async fn has(&self, session: &str, id: &str) -> bool {
        self.entries.contains_key(&Self::key(session, id))
    }

    async fn get(&self, session: &str, id: &str) -> Option<Response> {
        self.entries
            .get(&Self::key(session, id))
            .map(|entry| entry.value().clone())
    }

    async fn set(&self, session: &str, id: &str, res: &Response) {
        self.entries.insert(Self::key(session, id), res.clone());
    }
}

/// A [`ReplayStore`] backed by the local filesystem.
///
/// Entries live at `<root>/<session>/<xxh3_64(id)>` and hold the response
/// status, request (metadata included, serialized through the configured
/// [`MetaCodec`]), final URL, headers, and body in MessagePack.
pub struct FsReplayStore {
    root: PathBuf,
    codec: Arc<dyn MetaCodec>,
}

impl FsReplayStore {
    pub fn new(root: impl Into<PathBuf>, codec: Arc<dyn MetaCodec>) -> Self {
        Self {
            root: root.into(),
            codec,
        }
    }

    fn entry_path(&self, session: &str, id: &str) -> PathBuf {
        self.root
            .join(session)
            .join(xxh3_64(id.as_bytes()).to_string())
    }
}

#[async_trait]
impl ReplayStore for FsReplayStore {
    async fn has(&self, session: &str, id: &str) -> bool {
        tokio::fs::try_exists(self.entry_path(session, id))
            .await
            .unwrap_or(false)
    }

    async fn get(&self, session: &str, id: &str) -> Option<Response> {
        let path = self.entry_path(session, id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to read replay entry");
                return None;
            }
        };
        let record: ResponseRecord = match rmp_serde::from_slice(&bytes) {
            Ok(record) => record,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to decode replay entry");
                return None;
            }
        };
        match record.into_response(self.codec.as_ref()) {
            Ok(res) => Some(res),
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to decode replay entry");
                None
            }
        }
    }

    async fn set(&self, session: &str, id: &str, res: &Response) {
        let dir = self.root.join(session);
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            warn!(dir = %dir.display(), %err, "failed to create replay session dir");
            return;
        }

        let record = match ResponseRecord::from_response(res, self.codec.as_ref()) {
            Ok(record) => record,
            Err(err) => {
                warn!(url = %res.url(), %err, "failed to encode replay entry");
                return;
            }
        };
        let bytes = match rmp_serde::to_vec(&record) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(url = %res.url(), %err, "failed to encode replay entry");
                return;
            }
        };

        let path = self.entry_path(session, id);
        if let Err(err) = tokio::fs::write(&path, bytes).await {
            warn!(path = %path.display(), %err, "failed to write replay entry");
        }
    }
}
