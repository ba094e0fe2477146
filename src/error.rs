//! Error types for Burrow
//!
//! All modules use `BurrowResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Burrow operations
pub type BurrowResult<T> = Result<T, BurrowError>;

/// All errors that can occur in Burrow
#[derive(Error, Debug)]
pub enum BurrowError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid chroot layout: {0}")]
    ChrootInvalid(String),

    // Lock errors
    #[error("Timed out after {secs}s waiting for lock on {path}")]
    LockTimeout { path: PathBuf, secs: u64 },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Cache errors
    #[error("Cache entry for key {key:?} must be acquired before use")]
    CacheNotAcquired { key: Vec<String> },

    // Fetch errors
    #[error("No such object: {url}")]
    NoSuchObject { url: String },

    #[error("Download of {url} failed after {attempts} attempts: {reason}")]
    FetchExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Download of {url} is incomplete: got {got} of {want} bytes")]
    FetchTruncated { url: String, got: u64, want: u64 },

    #[error("No SDK version recorded for board {board} and none given")]
    SdkVersionUnresolved { board: String },

    #[error("No board given")]
    BoardUnset,

    // Chroot version errors
    #[error("Chroot at {path} is not initialized (missing {version_file})")]
    UninitializedChroot {
        path: PathBuf,
        version_file: PathBuf,
    },

    #[error("Invalid chroot version in {path}: {reason}")]
    InvalidChrootVersion { path: PathBuf, reason: String },

    #[error("Chroot is deprecated: no upgrade hook for version {version} (have {current}, need {latest})")]
    ChrootDeprecated {
        version: u32,
        current: u32,
        latest: u32,
    },

    #[error("Multiple upgrade hooks claim version {version}: {first} and {second}")]
    VersionHasMultipleHooks {
        version: u32,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Upgrade hook for version {version} failed with exit code {code}: {hook}")]
    ChrootUpdate {
        version: u32,
        hook: PathBuf,
        code: i32,
    },

    // Chroot creation errors
    #[error("User {name} already exists in the SDK image")]
    UserCollision { name: String },

    #[error("Group {name} already exists with gid {existing}, wanted {wanted}")]
    GroupCollision {
        name: String,
        existing: u32,
        wanted: u32,
    },

    // Mount errors
    #[error("{path} is not a mount point")]
    NotMounted { path: PathBuf },

    #[error("Mount operation on {path} failed: {source}")]
    Mount {
        path: PathBuf,
        #[source]
        source: nix::errno::Errno,
    },

    // Enter errors
    #[error("Cannot enter chroot: {path} is on a nosuid filesystem")]
    SudoNosuid { path: PathBuf },

    #[error("Operation must run {expected} a chroot")]
    WrongContext { expected: &'static str },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, exit code {code}: {stderr}")]
    CommandExecution {
        command: String,
        code: i32,
        stderr: String,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BurrowError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ChrootDeprecated { .. } => {
                Some("Delete the chroot and recreate it: burrow delete && burrow create")
            }
            Self::UninitializedChroot { .. } => Some("Run: burrow create"),
            Self::InvalidChrootVersion { .. } => {
                Some("The chroot may be from a newer checkout; recreate it with: burrow create")
            }
            Self::ChrootUpdate { .. } => {
                Some("The chroot was left at the last good version; rerun: burrow update")
            }
            Self::SudoNosuid { .. } => {
                Some("Remount the filesystem holding the chroot without the nosuid option")
            }
            Self::SdkVersionUnresolved { .. } => Some("Pass --version or --sdk-path"),
            Self::BoardUnset => Some("Pass --board or set sdk.board in the config"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_path() {
        let err = BurrowError::UninitializedChroot {
            path: PathBuf::from("/build/chroot"),
            version_file: PathBuf::from("/build/chroot/etc/chroot_version"),
        };
        assert!(err.to_string().contains("/build/chroot"));
    }

    #[test]
    fn error_hint() {
        let err = BurrowError::ChrootDeprecated {
            version: 10,
            current: 8,
            latest: 11,
        };
        assert!(err.hint().unwrap().contains("burrow create"));
        let hintless = BurrowError::NotMounted {
            path: PathBuf::from("/x"),
        };
        assert!(hintless.hint().is_none());
    }

    #[test]
    fn command_exec_helper() {
        let err = BurrowError::command_exec("tar -xf sdk.tar.xz", 2, "unexpected EOF");
        assert!(err.to_string().contains("exit code 2"));
        assert!(err.to_string().contains("unexpected EOF"));
    }
}
