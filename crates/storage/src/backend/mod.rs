//! Blob store trait and implementations.
//!
//! This module defines the `BlobStore` trait: the handful of capabilities
//! the sync pipeline needs from a remote blob service (containers, listings,
//! whole-blob uploads and the stage-then-commit block protocol).
//!

#[cfg(feature = "azure")]
mod azure;
mod dry_run;
#[cfg(any(test, feature = "mock"))]
mod mock;

#[cfg(feature = "azure")]
pub use self::azure::AzureBackend;
pub use self::dry_run::DryRunStore;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::{Call, MockStore};
use crate::error::Result;
use crate::models::{BlobInfo, Block, BlockList, Digest};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub(crate) type BlobInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<BlobInfo>> + Send + 'a>>;

/// Largest body accepted by a single whole-blob upload (256 MiB).
pub const MAX_PUT_BLOB_SIZE: u64 = 268_435_456;
/// Largest payload accepted for a single staged block (100 MiB).
pub const MAX_BLOCK_SIZE: u64 = 104_857_600;

/// Unified interface for blob stores.
///
/// Every operation names its container explicitly; a store holds account
/// level state (credentials, connection pool) only.
///
/// # Block uploads
///
/// Blobs larger than [`MAX_PUT_BLOB_SIZE`] are uploaded by staging blocks
/// with [`put_block()`](Self::put_block) and then committing their ids with
/// [`put_block_list()`](Self::put_block_list). The service concatenates the
/// blocks in list order, not in upload order.
///
/// ```no_run
/// use absync_storage::{Block, BlockList, BlobStore, error::Result};
///
/// async fn upload_two_blocks(store: &dyn BlobStore) -> Result<()> {
///     let mut list = BlockList::new();
///     for (index, data) in [b"hello ".to_vec(), b"world".to_vec()].into_iter().enumerate() {
///         let block = Block::new(index as u64, data);
///         list.push(&block);
///         store.put_block("default", "greeting.txt", block).await?;
///     }
///     store.put_block_list("default", "greeting.txt", &list, None).await
/// }
/// ```
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Name of the store (account name or similar); used for logging only.
    fn name(&self) -> &str;

    /// Create a private container unless it already exists.
    ///
    /// Returns `true` if the container was created by this call.
    async fn create_container_if_absent(&self, container: &str) -> Result<bool>;

    /// List every blob in a container.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_blobs_stream()`](Self::list_blobs_stream) into a [`Vec`]
    /// before returning.
    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobInfo>> {
        self.list_blobs_stream(container).try_collect().await
    }

    /// Stream blob metadata for a container.
    ///
    /// Implementations backed by a paged API must follow continuation
    /// markers until the listing is exhausted.
    fn list_blobs_stream<'a>(&'a self, container: &'a str) -> BlobInfoStream<'a>;

    /// Upload a whole blob in a single request, replacing any existing blob.
    async fn put_blob(&self, container: &str, name: &str, data: Vec<u8>) -> Result<()>;

    /// Stage one block of a future blob.
    ///
    /// The block is taken by value so its payload becomes the request body
    /// without a copy.
    async fn put_block(&self, container: &str, name: &str, block: Block) -> Result<()>;

    /// Commit staged blocks, in list order, as the content of `name`.
    ///
    /// `content_md5` is stored as the blob's content digest when given;
    /// services do not compute one for block list commits.
    async fn put_block_list(
        &self,
        container: &str,
        name: &str,
        blocks: &BlockList,
        content_md5: Option<&Digest>,
    ) -> Result<()>;
}
