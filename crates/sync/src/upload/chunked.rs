use super::CommitPolicy;
use crate::checksum::ContentHasher;
use crate::error::{ErrorKind, Result};
use absync_storage::{BlobStore, Block, BlockList, Digest};
use exn::ResultExt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Outcome of a chunked upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedUpload {
    /// Number of blocks staged
    pub blocks: u64,
    /// Total payload bytes staged
    pub bytes: u64,
    /// Digest of the whole content, sent along with the commit
    pub content_md5: Digest,
    /// `false` only when the commit failed under [`CommitPolicy::Legacy`]
    pub committed: bool,
}

/// Upload `reader` as blob `name` by staging blocks of `block_size` bytes
/// and committing them in order.
///
/// Blocks are read and sent one at a time, so at most one block is held in
/// memory. A failed block aborts the upload before anything is committed;
/// a failed commit is handled according to `policy`.
pub async fn upload_chunked<R>(
    store: &dyn BlobStore,
    container: &str,
    name: &str,
    mut reader: R,
    block_size: u64,
    policy: CommitPolicy,
) -> Result<ChunkedUpload>
where
    R: AsyncRead + Unpin,
{
    let mut list = BlockList::new();
    let mut hasher = ContentHasher::default();
    let mut bytes = 0;
    let mut index = 0;
    loop {
        let data = read_block(&mut reader, block_size).await.or_raise(|| ErrorKind::Read(name.to_string()))?;
        if data.is_empty() {
            break;
        }
        let last = (data.len() as u64) < block_size;
        hasher.update(&data);
        bytes += data.len() as u64;

        let block = Block::new(index, data);
        let size = block.len();
        list.push(&block);
        store
            .put_block(container, name, block)
            .await
            .or_raise(|| ErrorKind::BlockUpload { blob: name.to_string(), index })?;
        tracing::debug!(blob = name, index, size, "Uploaded block");

        if last {
            break;
        }
        index += 1;
    }

    let content_md5 = hasher.finish();
    let committed = match store.put_block_list(container, name, &list, Some(&content_md5)).await {
        Ok(()) => true,
        Err(err) => match policy {
            CommitPolicy::Strict => return Err(err.raise(ErrorKind::BlockListCommit(name.to_string()))),
            CommitPolicy::Legacy => {
                tracing::warn!(blob = name, blocks = list.len(), error = ?err, "Block list commit failed, continuing");
                false
            },
        },
    };
    Ok(ChunkedUpload { blocks: list.len() as u64, bytes, content_md5, committed })
}

/// Read until `block_size` bytes are buffered or the reader is exhausted.
async fn read_block<R>(reader: &mut R, block_size: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::with_capacity(usize::try_from(block_size).unwrap_or_default());
    // `take` keeps reading across short reads until the limit or EOF.
    reader.take(block_size).read_to_end(&mut data).await?;
    Ok(data)
}
