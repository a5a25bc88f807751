//! The sync pipeline: enumerate local files, compare their digests with the
//! remote listing, and upload whatever differs.
//!
//! Files up to [`SINGLE_UPLOAD_LIMIT`] bytes are uploaded in one request;
//! anything larger goes through the [chunked uploader](upload::upload_chunked)
//! in blocks of [`BLOCK_SIZE`] bytes.

pub mod checksum;
pub mod error;
mod index;
mod local;
mod sync;
pub mod upload;

pub use crate::index::RemoteBlobIndex;
pub use crate::local::{LocalFile, enumerate};
pub use crate::sync::{SyncContext, SyncReport, sync};
pub use crate::upload::{BLOCK_SIZE, CommitPolicy, SINGLE_UPLOAD_LIMIT, UploadLimits, UploadMethod};
