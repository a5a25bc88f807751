//! Sync Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Each variant names the operation
//! that failed; the underlying cause hangs off it as a child in the tree.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The destination container could not be created or checked.
    #[display("create container {_0} failed")]
    ContainerCreate(#[error(not(source))] String),
    /// Listing the existing blobs failed.
    #[display("could not list existing blobs in {_0}")]
    List(#[error(not(source))] String),
    /// A local file could not be opened (or inspected once open).
    #[display("failed to open {}", _0.display())]
    FileOpen(#[error(not(source))] PathBuf),
    /// A directory entry turned out not to be a regular file.
    #[display("not a regular file: {}", _0.display())]
    NotAFile(#[error(not(source))] PathBuf),
    /// Reading file content failed part-way.
    #[display("failed to read {_0}")]
    Read(#[error(not(source))] String),
    /// The file name cannot be used as a blob name.
    #[display("invalid blob name for {}", _0.display())]
    InvalidName(#[error(not(source))] PathBuf),
    /// Uploading a file failed; the child error says which step.
    #[display("failed to upload {}", _0.display())]
    Upload(#[error(not(source))] PathBuf),
    /// Uploading the whole blob in one request failed.
    #[display("failed to put blob {_0}")]
    PutBlob(#[error(not(source))] String),
    /// Staging one block failed.
    #[display("failed to upload block {index} of {blob}")]
    BlockUpload { blob: String, index: u64 },
    /// Committing the block list failed.
    #[display("failed to commit block list of {_0}")]
    BlockListCommit(#[error(not(source))] String),
    /// Unknown commit policy name.
    #[display("unknown commit policy: {_0} (expected strict or legacy)")]
    InvalidCommitPolicy(#[error(not(source))] String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(
            ErrorKind::BlockUpload { blob: "big.iso".to_string(), index: 2 }.to_string(),
            "failed to upload block 2 of big.iso"
        );
        assert_eq!(ErrorKind::FileOpen(PathBuf::from("dir/a.txt")).to_string(), "failed to open dir/a.txt");
        assert_eq!(ErrorKind::ContainerCreate("default".to_string()).to_string(), "create container default failed");
    }
}
