//! Content digests for cached engine binaries.
//!
//! The digest tells the update channel which build is already cached and
//! verifies that a download arrived intact. MD5 matches the channel's `x-md5`
//! header.
//!
//! # Example
//!
//! ```rust
//! use dm_launch::integrity::digest_file;
//! use std::path::Path;
//!
//! assert!(digest_file(Path::new("/nonexistent/dm-langserver")).is_err());
//! ```

use md5::{Digest, Md5};
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Lowercase hex MD5 digest of a file's contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileDigest(String);

impl FileDigest {
    /// The hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a hex digest from elsewhere (e.g. a response header),
    /// ignoring case and surrounding whitespace.
    pub fn matches(&self, other_hex: &str) -> bool {
        self.0.eq_ignore_ascii_case(other_hex.trim())
    }
}

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the digest of a file, reading it in 64 KiB chunks.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn digest_file(path: &Path) -> io::Result<FileDigest> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 65_536];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(FileDigest(format!("{:x}", hasher.finalize())))
}

/// [`digest_file`] on the blocking thread pool.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the blocking task fails.
pub async fn digest_file_async(path: PathBuf) -> io::Result<FileDigest> {
    tokio::task::spawn_blocking(move || digest_file(&path))
        .await
        .map_err(io::Error::other)?
}
