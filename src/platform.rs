//! Host platform identification and cache-path layout.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Base name of the engine executable.
pub const ENGINE_NAME: &str = "dm-langserver";

/// Suffix appended to the primary path to form the staging path.
pub const STAGED_SUFFIX: &str = ".update";

/// Operating system family, as the update channel names it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OsFamily {
    /// Microsoft Windows (`win32`).
    Windows,
    /// Linux (`linux`).
    Linux,
    /// macOS (`darwin`).
    MacOs,
    /// Any other Unix-like OS, named as Rust names it.
    OtherUnix(String),
}

impl OsFamily {
    fn from_rust_os(os: &str) -> Self {
        match os {
            "windows" => Self::Windows,
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            other => Self::OtherUnix(other.to_owned()),
        }
    }

    /// Name sent as the `platform` query parameter.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Windows => "win32",
            Self::Linux => "linux",
            Self::MacOs => "darwin",
            Self::OtherUnix(name) => name,
        }
    }

    /// Executable file extension, including the dot.
    pub fn exe_suffix(&self) -> &'static str {
        match self {
            Self::Windows => ".exe",
            _ => "",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `(os, arch)` pair identifying which engine build to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformKey {
    /// Operating system family.
    pub os: OsFamily,
    /// CPU architecture in channel naming (`x64`, `arm64`, ...).
    pub arch: String,
}

impl PlatformKey {
    /// Build a key from Rust's `std::env::consts` names.
    pub fn from_rust_names(os: &str, arch: &str) -> Self {
        let arch = match arch {
            "x86_64" => "x64",
            "x86" => "ia32",
            "aarch64" => "arm64",
            "arm" => "arm",
            other => other,
        };
        Self {
            os: OsFamily::from_rust_os(os),
            arch: arch.to_owned(),
        }
    }

    /// The host platform. Computed once per process.
    pub fn current() -> &'static PlatformKey {
        static CURRENT: OnceLock<PlatformKey> = OnceLock::new();
        CURRENT.get_or_init(|| {
            Self::from_rust_names(std::env::consts::OS, std::env::consts::ARCH)
        })
    }

    /// Cached binary filename: `dm-langserver-<arch>-<os>[.exe]`.
    pub fn binary_file_name(&self) -> String {
        format!(
            "{ENGINE_NAME}-{}-{}{}",
            self.arch,
            self.os,
            self.os.exe_suffix()
        )
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Staging path for a binary: the same path with `.update` appended.
pub fn staged_path_for(primary: &Path) -> PathBuf {
    let mut name = primary.as_os_str().to_owned();
    name.push(STAGED_SUFFIX);
    PathBuf::from(name)
}

/// Returns `true` if `path` is a regular file the current user may execute.
///
/// On Windows any regular file counts; execute permission is not a file
/// attribute there.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Set `rwxr-xr-x` on Unix platforms.
///
/// # Errors
///
/// Returns an error if the permissions cannot be changed.
pub fn set_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    let _ = path;
    Ok(())
}
