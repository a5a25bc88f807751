use crate::checksum::should_skip;
use crate::error::{ErrorKind, Result};
use crate::index::RemoteBlobIndex;
use crate::local::{LocalFile, enumerate};
use crate::upload::{CommitPolicy, UploadLimits, UploadMethod, upload_chunked, upload_whole};
use absync_storage::{StoreHandle, validate_blob};
use exn::ResultExt;
use std::path::PathBuf;
use tokio::fs::File;

/// Everything a sync run needs to know about its destination.
#[derive(Clone)]
pub struct SyncContext {
    store: StoreHandle,
    container: String,
    commit_policy: CommitPolicy,
    limits: UploadLimits,
}
impl SyncContext {
    pub fn new(store: StoreHandle, container: impl Into<String>) -> Self {
        Self {
            store,
            container: container.into(),
            commit_policy: CommitPolicy::default(),
            limits: UploadLimits::default(),
        }
    }

    pub fn with_commit_policy(mut self, commit_policy: CommitPolicy) -> Self {
        self.commit_policy = commit_policy;
        self
    }

    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }
}
impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("store", &self.store.name())
            .field("container", &self.container)
            .field("commit_policy", &self.commit_policy)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Counters of a finished sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Directory entries considered
    pub files: u64,
    /// Files whose content already matched the remote blob
    pub skipped: u64,
    pub uploaded_whole: u64,
    pub uploaded_chunked: u64,
    /// Blocks staged across all chunked uploads
    pub blocks: u64,
    /// Payload bytes sent
    pub bytes: u64,
    /// Block list commits that failed without aborting the run
    pub failed_commits: u64,
}
impl SyncReport {
    pub fn uploaded(&self) -> u64 {
        self.uploaded_whole + self.uploaded_chunked
    }
}

/// Upload every file of `dirs` whose content differs from the blob of the
/// same name in the context's container.
///
/// The container is created first if it does not exist, then the remote
/// listing is fetched once. Files are processed one after another in
/// enumeration order and the first failure ends the run.
pub async fn sync(ctx: &SyncContext, dirs: &[PathBuf]) -> Result<SyncReport> {
    let container = ctx.container.as_str();
    let created = ctx
        .store
        .create_container_if_absent(container)
        .await
        .or_raise(|| ErrorKind::ContainerCreate(container.to_string()))?;
    if created {
        tracing::info!(store = ctx.store.name(), container, "Created container");
    }

    let files = enumerate(dirs).await;
    let index = RemoteBlobIndex::fetch(ctx.store.as_ref(), container).await?;
    tracing::info!(container, files = files.len(), blobs = index.len(), "Starting sync");

    let mut report = SyncReport::default();
    for mut file in files {
        report.files += 1;
        validate_blob(file.name()).or_raise(|| ErrorKind::InvalidName(file.path().to_path_buf()))?;
        // Local content is only hashed when there is a remote digest to compare with.
        if let Some(remote) = index.digest(file.name()) {
            let local = file.digest().await;
            if should_skip(local.as_ref(), Some(remote)) {
                tracing::debug!(blob = file.name(), digest = %remote, "Unchanged, skipping");
                report.skipped += 1;
                continue;
            }
        }
        upload_file(ctx, &file, &mut report).await.or_raise(|| ErrorKind::Upload(file.path().to_path_buf()))?;
    }
    Ok(report)
}

async fn upload_file(ctx: &SyncContext, file: &LocalFile, report: &mut SyncReport) -> Result<()> {
    let path = file.path();
    let handle = File::open(path).await.or_raise(|| ErrorKind::FileOpen(path.to_path_buf()))?;
    let metadata = handle.metadata().await.or_raise(|| ErrorKind::FileOpen(path.to_path_buf()))?;
    if !metadata.is_file() {
        exn::bail!(ErrorKind::NotAFile(path.to_path_buf()));
    }
    let size = metadata.len();
    let store = ctx.store.as_ref();
    match ctx.limits.method_for(size) {
        UploadMethod::Whole => {
            let bytes = upload_whole(store, &ctx.container, file.name(), handle, size).await?;
            tracing::info!(blob = file.name(), bytes, "Uploaded");
            report.uploaded_whole += 1;
            report.bytes += bytes;
        },
        UploadMethod::Chunked => {
            let upload =
                upload_chunked(store, &ctx.container, file.name(), handle, ctx.limits.block_size, ctx.commit_policy)
                    .await?;
            tracing::info!(blob = file.name(), bytes = upload.bytes, blocks = upload.blocks, "Uploaded in blocks");
            report.uploaded_chunked += 1;
            report.blocks += upload.blocks;
            report.bytes += upload.bytes;
            if !upload.committed {
                report.failed_commits += 1;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use absync_storage::Digest;
    use absync_storage::backend::{Call, MockStore};
    use std::sync::Arc;

    fn small_limits() -> UploadLimits {
        UploadLimits { single_upload_limit: 16, block_size: 8 }
    }

    #[tokio::test]
    async fn test_dispatch_by_size() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("small.txt"), b"sixteen bytes!!!").unwrap();
        std::fs::write(dir.path().join("large.bin"), b"seventeen bytes!!").unwrap();
        let store = Arc::new(MockStore::default());
        let ctx = SyncContext::new(store.clone(), "default").with_limits(small_limits());

        let report = sync(&ctx, &[dir.path().to_path_buf()]).await.unwrap();
        assert_eq!(report.files, 2);
        assert_eq!(report.uploaded_whole, 1);
        assert_eq!(report.uploaded_chunked, 1);
        assert_eq!(report.blocks, 3);
        assert_eq!(report.bytes, 33);
        assert_eq!(store.blob("default", "large.bin").await.unwrap(), b"seventeen bytes!!");
        assert_eq!(store.blob_digest("default", "large.bin").await, Some(Digest::of(b"seventeen bytes!!")));
    }

    #[tokio::test]
    async fn test_container_created_before_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MockStore::default());
        let ctx = SyncContext::new(store.clone(), "fresh");

        let report = sync(&ctx, &[dir.path().to_path_buf()]).await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(
            store.calls().await,
            [
                Call::CreateContainer { container: "fresh".to_string() },
                Call::ListBlobs { container: "fresh".to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn test_blob_without_remote_digest_is_uploaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello world").unwrap();
        let store = Arc::new(MockStore::default().with_blob_digest("default", "a.txt", b"hello world".to_vec(), None));
        let ctx = SyncContext::new(store.clone(), "default");

        let report = sync(&ctx, &[dir.path().to_path_buf()]).await.unwrap();
        assert_eq!(report.skipped, 0);
        assert_eq!(report.uploaded(), 1);
    }

    #[tokio::test]
    async fn test_legacy_commit_failure_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), [7u8; 20]).unwrap();
        std::fs::write(dir.path().join("b.txt"), b"small").unwrap();
        let store = Arc::new(MockStore::default().failing_commit());
        let ctx = SyncContext::new(store.clone(), "default")
            .with_limits(small_limits())
            .with_commit_policy(CommitPolicy::Legacy);

        let report = sync(&ctx, &[dir.path().to_path_buf()]).await.unwrap();
        assert_eq!(report.failed_commits, 1);
        assert_eq!(report.uploaded_chunked, 1);
        assert_eq!(report.uploaded_whole, 1);
        assert_eq!(store.blob("default", "b.txt").await.unwrap(), b"small");
    }

    #[tokio::test]
    async fn test_strict_commit_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), [7u8; 20]).unwrap();
        std::fs::write(dir.path().join("b.txt"), b"small").unwrap();
        let store = Arc::new(MockStore::default().failing_commit());
        let ctx = SyncContext::new(store.clone(), "default").with_limits(small_limits());

        let err = sync(&ctx, &[dir.path().to_path_buf()]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Upload(path) if path.ends_with("a.bin")));
        assert_eq!(store.blob("default", "b.txt").await, None);
    }
}
