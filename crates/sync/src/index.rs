use crate::error::{ErrorKind, Result};
use absync_storage::{BlobInfo, BlobStore, Digest};
use exn::ResultExt;
use std::collections::HashMap;

/// Content digests of the blobs already in a container, keyed by blob name.
///
/// Built once per run from a single full listing and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct RemoteBlobIndex {
    digests: HashMap<String, Option<Digest>>,
}
impl RemoteBlobIndex {
    pub async fn fetch(store: &dyn BlobStore, container: &str) -> Result<Self> {
        let blobs = store.list_blobs(container).await.or_raise(|| ErrorKind::List(container.to_string()))?;
        let index = Self::from_blobs(blobs);
        tracing::debug!(container, blobs = index.len(), "Fetched remote blob index");
        Ok(index)
    }

    pub fn from_blobs(blobs: impl IntoIterator<Item = BlobInfo>) -> Self {
        Self { digests: blobs.into_iter().map(|blob| (blob.name, blob.content_md5)).collect() }
    }

    /// Stored digest of `name`; `None` when the blob is absent or has no
    /// usable digest.
    pub fn digest(&self, name: &str) -> Option<&Digest> {
        self.digests.get(name).and_then(Option::as_ref)
    }

    pub(crate) fn len(&self) -> usize {
        self.digests.len()
    }
}
