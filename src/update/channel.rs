//! Update channel client.
//!
//! One GET per check, identifying the platform, architecture, client version
//! and (when a build is already cached) its digest. The response status is
//! mapped onto an [`UpdateOutcome`]; nothing is retried here. A failed check
//! is simply repeated on the next resolution.

use crate::integrity::{FileDigest, digest_file_async};
use crate::platform::{PlatformKey, set_executable};
use futures_util::StreamExt;
use reqwest::StatusCode;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// Response header carrying the expected digest of a 200 body.
pub const DIGEST_HEADER: &str = "x-md5";

/// Suffix of in-progress downloads. Such files are never promoted.
pub const PART_SUFFIX: &str = ".part";

const USER_AGENT: &str = concat!("dm-launch/", env!("CARGO_PKG_VERSION"), " (self-update)");

/// Result of one update channel query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new build was written to the destination and verified.
    Updated,
    /// The cached build is current.
    Unmodified,
    /// No build exists for this platform/architecture.
    Unavailable {
        /// Human-readable reason.
        reason: String,
    },
    /// Transport failure, unexpected status, or a corrupt download.
    NetworkError {
        /// Human-readable detail.
        detail: String,
    },
    /// The channel has been retired; auto-update should be turned off.
    ChannelRemoved {
        /// Message from the server, or a generic one.
        detail: String,
    },
}

impl UpdateOutcome {
    /// Returns `true` if a new build was downloaded.
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated)
    }

    /// Returns `true` if the caller should durably disable auto-update.
    pub fn disables_auto_update(&self) -> bool {
        matches!(self, Self::ChannelRemoved { .. })
    }

    fn network(detail: impl Into<String>) -> Self {
        Self::NetworkError {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated => write!(f, "updated"),
            Self::Unmodified => write!(f, "up to date"),
            Self::Unavailable { reason } => write!(f, "unavailable: {reason}"),
            Self::NetworkError { detail } => write!(f, "network error: {detail}"),
            Self::ChannelRemoved { detail } => write!(f, "update channel removed: {detail}"),
        }
    }
}

/// HTTP client for the engine update channel.
#[derive(Debug, Clone)]
pub struct UpdateChannelClient {
    client: std::result::Result<reqwest::Client, String>,
    url: String,
}

fn build_client(user_agent: &str) -> std::result::Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(15))
        .user_agent(user_agent)
        .build()
        .map_err(|e| {
            tracing::error!(error = %e, "cannot build HTTP client, update checks will fail");
            e.to_string()
        })
}

impl UpdateChannelClient {
    /// Create a client for the endpoint at `url`.
    ///
    /// If the HTTP client cannot be initialised every check reports a
    /// [`UpdateOutcome::NetworkError`].
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: build_client(USER_AGENT),
            url: url.into(),
        }
    }

    /// The endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Ask the channel for a build newer than `current_hash` and, if one is
    /// served, stream it to `dest`.
    ///
    /// Omitting `current_hash` asks for any available build. The body is
    /// streamed into a temporary file beside `dest`, which is renamed onto
    /// `dest` only once it is complete, verified, and executable. On any
    /// failure `dest` is left as it was.
    pub async fn check_and_fetch(
        &self,
        platform: &PlatformKey,
        version: &str,
        current_hash: Option<&FileDigest>,
        dest: &Path,
    ) -> UpdateOutcome {
        let mut query = vec![
            ("platform", platform.os.as_str()),
            ("arch", platform.arch.as_str()),
            ("client_version", version),
        ];
        if let Some(hash) = current_hash {
            query.push(("hash", hash.as_str()));
        }

        let client = match &self.client {
            Ok(client) => client,
            Err(e) => return UpdateOutcome::network(format!("HTTP client unavailable: {e}")),
        };

        tracing::debug!(url = %self.url, %platform, has_hash = current_hash.is_some(), "checking for engine update");
        let response = match client.get(&self.url).query(&query).send().await {
            Ok(r) => r,
            Err(e) => return UpdateOutcome::network(format!("update check failed: {e}")),
        };

        match response.status() {
            StatusCode::OK => download(response, dest).await,
            StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED => UpdateOutcome::Unmodified,
            StatusCode::NOT_FOUND => UpdateOutcome::Unavailable {
                reason: "no build for this platform/arch".to_owned(),
            },
            StatusCode::GONE => {
                let body = response.text().await.unwrap_or_default();
                let body = body.trim();
                UpdateOutcome::ChannelRemoved {
                    detail: if body.is_empty() {
                        "the update channel has been retired".to_owned()
                    } else {
                        body.to_owned()
                    },
                }
            }
            other => UpdateOutcome::network(format!(
                "{} {}",
                other.as_u16(),
                other.canonical_reason().unwrap_or("Unknown Status")
            )),
        }
    }
}

async fn download(response: reqwest::Response, dest: &Path) -> UpdateOutcome {
    let expected = response
        .headers()
        .get(DIGEST_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    // Dropping `part` on any early return removes the temporary file.
    let part = match stream_to_temp(response, dest).await {
        Ok(part) => part,
        Err(e) => return UpdateOutcome::network(format!("download failed: {e}")),
    };

    if let Some(expected) = expected {
        match digest_file_async(part.to_path_buf()).await {
            Ok(actual) if actual.matches(&expected) => {}
            Ok(actual) => {
                tracing::warn!(
                    path = %dest.display(),
                    expected = %expected.trim(),
                    %actual,
                    "downloaded engine build is corrupt, discarding"
                );
                return UpdateOutcome::network(format!(
                    "downloaded build failed verification (expected md5 {}, got {actual})",
                    expected.trim()
                ));
            }
            Err(e) => return UpdateOutcome::network(format!("cannot verify download: {e}")),
        }
    }

    if let Err(e) = set_executable(&part) {
        return UpdateOutcome::network(format!("cannot mark download executable: {e}"));
    }
    if let Err(e) = part.persist(dest) {
        return UpdateOutcome::network(format!(
            "cannot move download to {}: {}",
            dest.display(),
            e.error
        ));
    }

    tracing::info!(path = %dest.display(), "engine build downloaded");
    UpdateOutcome::Updated
}

/// Stream the body into a uniquely named `.part` file in `dest`'s directory.
async fn stream_to_temp(response: reqwest::Response, dest: &Path) -> std::io::Result<TempPath> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tokio::fs::create_dir_all(dir).await?;

    let prefix = format!(
        ".{}.",
        dest.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    let (file, part) = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(PART_SUFFIX)
        .tempfile_in(dir)?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(std::io::Error::other)?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    Ok(part)
}
