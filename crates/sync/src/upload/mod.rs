//! Upload strategies.
//!
//! A file is sent either as one whole blob or, once it is larger than
//! [`SINGLE_UPLOAD_LIMIT`], as a sequence of staged blocks followed by a
//! block list commit. Which one is chosen depends on the file size alone.

mod chunked;

pub use self::chunked::{ChunkedUpload, upload_chunked};
use crate::error::{Error, ErrorKind, Result};
use absync_storage::BlobStore;
use absync_storage::backend::{MAX_BLOCK_SIZE, MAX_PUT_BLOB_SIZE};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest file uploaded in a single request.
pub const SINGLE_UPLOAD_LIMIT: u64 = MAX_PUT_BLOB_SIZE;
/// Size of every block but the last in a chunked upload (half the largest
/// block the service accepts).
pub const BLOCK_SIZE: u64 = MAX_BLOCK_SIZE / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMethod {
    Whole,
    Chunked,
}

/// Size thresholds of the upload strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    /// Files up to and including this size are uploaded whole.
    pub single_upload_limit: u64,
    /// Payload size of each staged block.
    pub block_size: u64,
}
impl Default for UploadLimits {
    fn default() -> Self {
        Self { single_upload_limit: SINGLE_UPLOAD_LIMIT, block_size: BLOCK_SIZE }
    }
}
impl UploadLimits {
    pub fn method_for(&self, size: u64) -> UploadMethod {
        if size <= self.single_upload_limit { UploadMethod::Whole } else { UploadMethod::Chunked }
    }
}

/// What happens when committing a block list fails.
///
/// Names are matched case-insensitively, whether they come from the
/// command line or from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum CommitPolicy {
    /// The failure aborts the run like any other upload failure.
    #[default]
    Strict,
    /// The failure is logged and counted, and the run carries on. The
    /// staged blocks stay uncommitted and the blob keeps its old content.
    Legacy,
}
impl CommitPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Legacy => "legacy",
        }
    }
}
impl FromStr for CommitPolicy {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "strict" => Self::Strict,
            "legacy" => Self::Legacy,
            _ => exn::bail!(ErrorKind::InvalidCommitPolicy(s.to_string())),
        })
    }
}
impl TryFrom<String> for CommitPolicy {
    type Error = ErrorKind;
    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse().map_err(|_| ErrorKind::InvalidCommitPolicy(value))
    }
}
impl Display for CommitPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Upload everything `reader` yields as the content of blob `name`.
///
/// `size` is only a capacity hint. Returns the number of bytes sent.
pub async fn upload_whole<R>(
    store: &dyn BlobStore,
    container: &str,
    name: &str,
    mut reader: R,
    size: u64,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
    reader.read_to_end(&mut data).await.or_raise(|| ErrorKind::Read(name.to_string()))?;
    let bytes = data.len() as u64;
    store.put_blob(container, name, data).await.or_raise(|| ErrorKind::PutBlob(name.to_string()))?;
    tracing::debug!(blob = name, bytes, "Uploaded whole blob");
    Ok(bytes)
}
