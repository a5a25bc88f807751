//! Content digests of local files and the skip decision.

use crate::error::{ErrorKind, Result};
use absync_storage::Digest;
use exn::ResultExt;
use md5::{Digest as _, Md5};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Read buffer used while hashing; files are never loaded whole.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Incremental MD5 over content that arrives in pieces.
#[derive(Default)]
pub(crate) struct ContentHasher(Md5);
impl ContentHasher {
    pub(crate) fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub(crate) fn finish(self) -> Digest {
        Digest::from_bytes(self.0.finalize().into())
    }
}

/// Compute the MD5 digest of a file by streaming it.
pub async fn digest(path: &Path) -> Result<Digest> {
    let mut file = File::open(path).await.or_raise(|| ErrorKind::FileOpen(path.to_path_buf()))?;
    let mut hasher = ContentHasher::default();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer).await.or_raise(|| ErrorKind::Read(path.display().to_string()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finish())
}

/// Whether a local file can be skipped because the remote blob already holds
/// the same content.
///
/// Only an exact digest match skips; a missing digest on either side means
/// the file gets uploaded.
///
/// # Examples
///
/// ```
/// use absync_storage::Digest;
/// use absync_sync::checksum::should_skip;
///
/// let local = Digest::of(b"hello world");
/// let remote = Digest::from_base64("XrY7u+Ae7tCTyyK7j1rNww==").unwrap();
/// assert!(should_skip(Some(&local), Some(&remote)));
/// assert!(!should_skip(Some(&local), None));
/// ```
pub fn should_skip(local: Option<&Digest>, remote: Option<&Digest>) -> bool {
    matches!((local, remote), (Some(local), Some(remote)) if local == remote)
}
