//! Dry-run blob store.
//!
//! This module provides a blob store implementation that wraps another store
//! and prevents write operations from executing, while still indicating
//! success on return.

use async_stream::stream;
use async_trait::async_trait;

use crate::error::{ErrorKind, Result};
use crate::{BlobStore, Block, BlockList, Digest, StoreHandle, backend::BlobInfoStream};

/// Dry-run blob store.
///
/// Wraps another store, passes listings through, and drops all write
/// operations after logging an [`info event`](tracing::Event). A container
/// that does not exist yet lists as empty, since the run would have created
/// it.
#[derive(Clone)]
pub struct DryRunStore {
    inner: StoreHandle,
}
impl DryRunStore {
    pub fn new(inner: StoreHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl BlobStore for DryRunStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create_container_if_absent(&self, container: &str) -> Result<bool> {
        tracing::info!(container, "Skipping container creation during dry run");
        Ok(false)
    }

    fn list_blobs_stream<'a>(&'a self, container: &'a str) -> BlobInfoStream<'a> {
        Box::pin(stream! {
            for await item in self.inner.list_blobs_stream(container) {
                match item {
                    Err(e) if matches!(&*e, ErrorKind::NotFound(_)) => {
                        tracing::debug!(container, "Container does not exist yet; listing as empty");
                        break;
                    },
                    other => yield other,
                }
            }
        })
    }

    async fn put_blob(&self, container: &str, name: &str, data: Vec<u8>) -> Result<()> {
        tracing::info!(container, blob = name, bytes = data.len(), "Skipping blob upload during dry run");
        Ok(())
    }

    async fn put_block(&self, container: &str, name: &str, block: Block) -> Result<()> {
        let bytes = block.len();
        tracing::info!(container, blob = name, block = %block.id, bytes, "Skipping block upload during dry run");
        Ok(())
    }

    async fn put_block_list(
        &self,
        container: &str,
        name: &str,
        blocks: &BlockList,
        _content_md5: Option<&Digest>,
    ) -> Result<()> {
        tracing::info!(container, blob = name, blocks = blocks.len(), "Skipping block list commit during dry run");
        Ok(())
    }
}
