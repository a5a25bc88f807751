use crate::checksum;
use absync_storage::Digest;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A candidate for upload found in one of the source directories.
///
/// The blob name is the entry's base name; the directory it came from does
/// not become part of the name.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    digest: Option<Option<Digest>>,
}
impl LocalFile {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self { path: path.into(), name: name.into(), digest: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content digest, computed on first use and cached afterwards.
    ///
    /// Returns `None` if the file cannot be read; the caller then treats the
    /// file as changed.
    pub async fn digest(&mut self) -> Option<Digest> {
        if let Some(digest) = self.digest {
            return digest;
        }
        let digest = match checksum::digest(&self.path).await {
            Ok(digest) => Some(digest),
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "No local digest, file will be uploaded");
                None
            },
        };
        self.digest = Some(digest);
        digest
    }
}

/// List the entries of every directory, in the order the directories are
/// given and sorted by name within each directory.
///
/// Directories are not descended into: a subdirectory shows up as an entry
/// like any file and fails once opened for upload. A directory that cannot be
/// read is skipped with a warning.
pub async fn enumerate(dirs: &[PathBuf]) -> Vec<LocalFile> {
    let mut files = Vec::new();
    for dir in dirs {
        let mut entries = match list_dir(dir).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "Skipping unreadable directory");
                continue;
            },
        };
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!(dir = %dir.display(), count = entries.len(), "Enumerated directory");
        files.extend(entries);
    }
    files
}

async fn list_dir(dir: &Path) -> std::io::Result<Vec<LocalFile>> {
    let mut reader = fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            tracing::warn!(path = %entry.path().display(), "Skipping entry with a non UTF-8 name");
            continue;
        };
        entries.push(LocalFile::new(entry.path(), name));
    }
    Ok(entries)
}
