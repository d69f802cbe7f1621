//! Suspend/resume state: the snapshot format and where it is kept.
//!
//! When a run is cancelled, whatever jobs are still queued are encoded into a
//! [`Snapshot`] and handed to the configured [`StateStore`]; the next run
//! re-enqueues them instead of starting from the spider's starting requests.
//! This is best-effort: store failures are logged and ignored, and a snapshot
//! that no longer decodes (say, a metadata tag was renamed) makes the run
//! proceed from scratch with a warning.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::codec::{ItemRecord, MetaCodec, RequestRecord};
use crate::error::ScavengeError;
use crate::item::Item;
use crate::request::Request;

/// Persistent storage for scraping state. The state itself is an opaque byte
/// buffer of arbitrary length.
pub trait StateStore: Send + Sync {
    /// Returns the stored state, or `None` if nothing has been stored yet.
    fn load(&self) -> io::Result<Option<Vec<u8>>>;
    fn store(&self, bytes: &[u8]) -> io::Result<()>;
}

/// A [`StateStore`] backed by a single file.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn store(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        // Write-then-rename so a crash mid-write cannot leave a torn file.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)
    }
}

/// Wire form of the pending work at suspension time.
#[derive(Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    reqs: Vec<ReqRecord>,
    items: Vec<ItemRecord>,
}

#[derive(Serialize, Deserialize)]
struct ReqRecord {
    request: RequestRecord,
    referer: Option<String>,
}

impl Snapshot {
    pub(crate) fn is_empty(&self) -> bool {
        self.reqs.is_empty() && self.items.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.reqs.len() + self.items.len()
    }

    /// Adds a pending request. Requests carrying a streaming body cannot be
    /// persisted and are skipped with an error.
    pub(crate) fn push_request(
        &mut self,
        req: &Request,
        referer: Option<&Url>,
        codec: &dyn MetaCodec,
    ) -> Result<(), ScavengeError> {
        if req.has_stream_body() {
            return Err(ScavengeError::State(format!(
                "request to '{}' has a streaming body and cannot be snapshotted",
                req.url
            )));
        }
        self.reqs.push(ReqRecord {
            request: RequestRecord::from_request(req, codec)?,
            referer: referer.map(|u| u.to_string()),
        });
        Ok(())
    }

    pub(crate) fn push_item(
        &mut self,
        item: &Item,
        codec: &dyn MetaCodec,
    ) -> Result<(), ScavengeError> {
        self.items.push(ItemRecord::from_item(item, codec)?);
        Ok(())
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, ScavengeError> {
        rmp_serde::to_vec(self)
            .map_err(|err| ScavengeError::Codec(format!("encode snapshot: {err}")))
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, ScavengeError> {
        rmp_serde::from_slice(bytes)
            .map_err(|err| ScavengeError::Codec(format!("decode snapshot: {err}")))
    }

    /// Turns the snapshot back into jobs. Attempt counters restart at zero on
    /// resume; they are intentionally not part of the wire format.
    pub(crate) fn into_jobs(
        self,
        codec: &dyn MetaCodec,
    ) -> Result<(Vec<(Request, Option<Url>)>, Vec<Item>), ScavengeError> {
        let mut reqs = Vec::with_capacity(self.reqs.len());
        for record in self.reqs {
            let referer = match record.referer {
                Some(raw) => Some(
                    Url::parse(&raw)
                        .map_err(|err| ScavengeError::Codec(format!("decode referer: {err}")))?,
                ),
                None => None,
            };
            reqs.push((record.request.into_request(codec)?, referer));
        }
        let mut items = Vec::with_capacity(self.items.len());
        for record in self.items {
            items.push(record.into_item(codec)?);
        }
        Ok((reqs, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::codec::TaggedCodec;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Depth(u32);

    #[test]
    fn snapshot_round_trips_requests_and_items() {
        let codec = TaggedCodec::new().register::<Depth>("depth");

        let mut req = Request::get(Url::parse("https://example.com/a").unwrap());
        req.add_meta(Depth(2));
        let referer = Url::parse("https://example.com/").unwrap();

        let mut snapshot = Snapshot::default();
        snapshot.push_request(&req, Some(&referer), &codec).unwrap();
        snapshot.push_item(&Item::of(Depth(9)), &codec).unwrap();
        assert_eq!(snapshot.len(), 2);

        let bytes = snapshot.encode().unwrap();
        let decoded = Snapshot::decode(&bytes).unwrap();
        let (reqs, items) = decoded.into_jobs(&codec).unwrap();

        assert_eq!(reqs.len(), 1);
        let (restored, restored_referer) = &reqs[0];
        assert_eq!(restored.url.as_str(), "https://example.com/a");
        assert_eq!(restored.meta::<Depth>(), Some(&Depth(2)));
        assert_eq!(
            restored_referer.as_ref().unwrap().as_str(),
            "https://example.com/"
        );

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get::<Depth>(), Some(&Depth(9)));
    }

    #[test]
    fn unregistered_types_fail_the_decode() {
        let full = TaggedCodec::new().register::<Depth>("depth");
        let empty = TaggedCodec::new();

        let mut snapshot = Snapshot::default();
        snapshot.push_item(&Item::of(Depth(1)), &full).unwrap();
        let bytes = snapshot.encode().unwrap();

        let decoded = Snapshot::decode(&bytes).unwrap();
        assert!(decoded.into_jobs(&empty).is_err());
    }

    #[test]
    fn streaming_requests_are_rejected() {
        let codec = TaggedCodec::new();
        let mut req = Request::post(Url::parse("https://example.com/up").unwrap());
        req.set_stream_body(Box::new(std::io::Cursor::new(Vec::new())));

        let mut snapshot = Snapshot::default();
        assert!(snapshot.push_request(&req, None, &codec).is_err());
    }

    #[test]
    fn file_store_round_trips_and_reports_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("state.bin"));

        assert!(store.load().unwrap().is_none());
        store.store(b"blob").unwrap();
        assert_eq!(store.load().unwrap().unwrap(), b"blob");
    }
}
