//! Container and blob name validation.
//!
//! Names are checked before any request is made so that a bad name fails
//! the run up front instead of after the service rejects it.

use crate::error::{ErrorKind, Result};

const MAX_BLOB_NAME_LEN: usize = 1024;

/// Validates a container name against the service's naming rules.
///
/// Container names are 3 to 63 characters of lower-case letters, digits and
/// single hyphens, starting and ending with a letter or digit.
///
/// # Examples
///
/// ```
/// use absync_storage::validate_container;
///
/// assert!(validate_container("backups-2024").is_ok());
/// assert!(validate_container("Backups").is_err());
/// assert!(validate_container("a--b").is_err());
/// ```
pub fn validate_container(name: &str) -> Result<&str> {
    let valid_chars = name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    let valid_edges = !name.starts_with('-') && !name.ends_with('-');
    if !(3..=63).contains(&name.len()) || !valid_chars || !valid_edges || name.contains("--") {
        exn::bail!(ErrorKind::InvalidName(name.to_string()));
    }
    Ok(name)
}

/// Validates a blob name derived from a local base filename.
///
/// Blob names map one-to-one onto base filenames, so `/`, `.` and `..` are
/// rejected along with null bytes and names longer than the service allows.
/// A backslash is an ordinary character on the service and is kept.
pub fn validate_blob(name: &str) -> Result<&str> {
    if name.is_empty()
        || name.len() > MAX_BLOB_NAME_LEN
        || name == "."
        || name == ".."
        || name.contains(['/', '\0'])
    {
        exn::bail!(ErrorKind::InvalidName(name.to_string()));
    }
    Ok(name)
}
