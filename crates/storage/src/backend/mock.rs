//! In-memory blob store for testing.

use super::{BlobInfoStream, MAX_BLOCK_SIZE};
use crate::BlobStore;
use crate::error::{ErrorKind, Result};
use crate::models::{BlobInfo, Block, BlockId, BlockList, Digest};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// A store operation, as recorded by [`MockStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateContainer { container: String },
    ListBlobs { container: String },
    PutBlob { container: String, name: String, size: u64 },
    PutBlock { container: String, name: String, id: BlockId, size: u64 },
    PutBlockList { container: String, name: String, ids: Vec<BlockId>, content_md5: Option<Digest> },
}
impl Call {
    /// Whether this call writes blob data.
    pub fn is_upload(&self) -> bool {
        matches!(self, Self::PutBlob { .. } | Self::PutBlock { .. } | Self::PutBlockList { .. })
    }

    /// Blob name targeted by this call, if any.
    pub fn blob(&self) -> Option<&str> {
        match self {
            Self::PutBlob { name, .. } | Self::PutBlock { name, .. } | Self::PutBlockList { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Clone)]
struct StoredBlob {
    data: Vec<u8>,
    content_md5: Option<Digest>,
}

#[derive(Default)]
struct State {
    containers: BTreeMap<String, BTreeMap<String, StoredBlob>>,
    staged: HashMap<(String, String), HashMap<BlockId, Vec<u8>>>,
    calls: Vec<Call>,
}

/// In-memory blob store for testing.
///
/// Containers, blobs and staged blocks live behind a [`RwLock`], and every
/// trait call is recorded so tests can assert on exactly which requests a
/// sync run made. Whole-blob uploads get a content digest like the real
/// service computes one; block list commits only store the digest handed to
/// them.
pub struct MockStore {
    name: String,
    state: RwLock<State>,
    fail_create_container: bool,
    fail_put_block_at: Option<usize>,
    fail_commit: bool,
}

impl MockStore {
    /// Create a mock store with one container pre-populated with blobs.
    ///
    /// Pre-populated blobs carry the digest of their content, as if they had
    /// been uploaded whole.
    pub fn with_blobs(
        container: impl Into<String>,
        blobs: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>,
    ) -> Self {
        let blobs = blobs
            .into_iter()
            .map(|(name, data)| {
                let data = data.into();
                let content_md5 = Some(Digest::of(&data));
                (name.into(), StoredBlob { data, content_md5 })
            })
            .collect();
        let mut state = State::default();
        state.containers.insert(container.into(), blobs);
        Self { state: RwLock::new(state), ..Self::default() }
    }

    /// Change the name of the mock store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a blob whose stored digest is set explicitly (or missing).
    pub fn with_blob_digest(
        mut self,
        container: impl Into<String>,
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
        content_md5: Option<Digest>,
    ) -> Self {
        let blob = StoredBlob { data: data.into(), content_md5 };
        self.state.get_mut().containers.entry(container.into()).or_default().insert(name.into(), blob);
        self
    }

    /// Make container creation fail.
    pub fn failing_create_container(mut self) -> Self {
        self.fail_create_container = true;
        self
    }

    /// Make the `n`th (zero-based) staged block upload fail.
    pub fn failing_put_block_at(mut self, n: usize) -> Self {
        self.fail_put_block_at = Some(n);
        self
    }

    /// Make every block list commit fail.
    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Snapshot of all calls made so far, in order.
    pub async fn calls(&self) -> Vec<Call> {
        self.state.read().await.calls.clone()
    }

    /// Current content of a committed blob.
    pub async fn blob(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        let guard = self.state.read().await;
        guard.containers.get(container)?.get(name).map(|blob| blob.data.clone())
    }

    /// Stored content digest of a committed blob.
    pub async fn blob_digest(&self, container: &str, name: &str) -> Option<Digest> {
        let guard = self.state.read().await;
        guard.containers.get(container)?.get(name)?.content_md5
    }

    pub async fn container_exists(&self, container: &str) -> bool {
        self.state.read().await.containers.contains_key(container)
    }

    async fn record(&self, call: Call) {
        self.state.write().await.calls.push(call);
    }
}
impl Default for MockStore {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            state: RwLock::new(State::default()),
            fail_create_container: false,
            fail_put_block_at: None,
            fail_commit: false,
        }
    }
}

#[async_trait]
impl BlobStore for MockStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_container_if_absent(&self, container: &str) -> Result<bool> {
        self.record(Call::CreateContainer { container: container.to_string() }).await;
        if self.fail_create_container {
            exn::bail!(ErrorKind::Service { status: 403, code: "AuthorizationFailure".to_string() });
        }
        let mut guard = self.state.write().await;
        if guard.containers.contains_key(container) {
            return Ok(false);
        }
        guard.containers.insert(container.to_string(), BTreeMap::new());
        Ok(true)
    }

    fn list_blobs_stream<'a>(&'a self, container: &'a str) -> BlobInfoStream<'a> {
        Box::pin(stream! {
            self.record(Call::ListBlobs { container: container.to_string() }).await;
            // Snapshot under the read lock, then drop it before yielding.
            let entries: Option<Vec<BlobInfo>> = {
                let guard = self.state.read().await;
                guard.containers.get(container).map(|blobs| {
                    blobs
                        .iter()
                        .map(|(name, blob)| BlobInfo {
                            name: name.clone(),
                            size: blob.data.len() as u64,
                            content_md5: blob.content_md5,
                        })
                        .collect()
                })
            };
            match entries {
                Some(entries) => {
                    for info in entries {
                        yield Ok(info);
                    }
                },
                None => {
                    yield Err(exn::Exn::from(ErrorKind::NotFound(container.to_string())));
                },
            }
        })
    }

    async fn put_blob(&self, container: &str, name: &str, data: Vec<u8>) -> Result<()> {
        self.record(Call::PutBlob { container: container.to_string(), name: name.to_string(), size: data.len() as u64 })
            .await;
        let mut guard = self.state.write().await;
        let blobs = guard
            .containers
            .get_mut(container)
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(container.to_string())))?;
        let content_md5 = Some(Digest::of(&data));
        blobs.insert(name.to_string(), StoredBlob { data, content_md5 });
        Ok(())
    }

    async fn put_block(&self, container: &str, name: &str, block: Block) -> Result<()> {
        let size = block.data.len() as u64;
        let attempt = {
            let mut guard = self.state.write().await;
            guard.calls.push(Call::PutBlock {
                container: container.to_string(),
                name: name.to_string(),
                id: block.id.clone(),
                size,
            });
            guard.calls.iter().filter(|call| matches!(call, Call::PutBlock { .. })).count() - 1
        };
        if self.fail_put_block_at == Some(attempt) {
            exn::bail!(ErrorKind::Network("connection reset by peer".to_string()));
        }
        if size > MAX_BLOCK_SIZE {
            exn::bail!(ErrorKind::Service { status: 413, code: "RequestBodyTooLarge".to_string() });
        }
        let mut guard = self.state.write().await;
        if !guard.containers.contains_key(container) {
            exn::bail!(ErrorKind::NotFound(container.to_string()));
        }
        guard
            .staged
            .entry((container.to_string(), name.to_string()))
            .or_default()
            .insert(block.id, block.data);
        Ok(())
    }

    async fn put_block_list(
        &self,
        container: &str,
        name: &str,
        blocks: &BlockList,
        content_md5: Option<&Digest>,
    ) -> Result<()> {
        self.record(Call::PutBlockList {
            container: container.to_string(),
            name: name.to_string(),
            ids: blocks.ids().cloned().collect(),
            content_md5: content_md5.copied(),
        })
        .await;
        if self.fail_commit {
            exn::bail!(ErrorKind::Service { status: 400, code: "InvalidBlockList".to_string() });
        }
        let mut guard = self.state.write().await;
        let key = (container.to_string(), name.to_string());
        let staged = guard.staged.remove(&key).unwrap_or_default();
        let mut data = Vec::new();
        for id in blocks.ids() {
            let block = staged.get(id).ok_or_else(|| exn::Exn::from(ErrorKind::InvalidBlockList(id.to_string())))?;
            data.extend_from_slice(block);
        }
        let blobs = guard
            .containers
            .get_mut(container)
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(container.to_string())))?;
        blobs.insert(name.to_string(), StoredBlob { data, content_md5: content_md5.copied() });
        Ok(())
    }
}
