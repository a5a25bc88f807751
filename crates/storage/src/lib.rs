pub mod backend;
pub mod error;
mod models;
mod name;

pub use crate::backend::BlobStore;
pub use crate::models::{BlobInfo, Block, BlockId, BlockList, BlockStatus, Digest};
pub use crate::name::{validate_blob, validate_container};
use std::sync::Arc;

pub type StoreHandle = Arc<dyn BlobStore + Send + Sync>;
