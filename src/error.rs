use std::fmt;

use thiserror::Error;

/// Lifecycle phase a driver error surfaced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Install,
    Uninstall,
    Upgrade,
    Start,
    Stop,
    Service,
    Network,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Upgrade => "upgrade",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Service => "service",
            Self::Network => "network",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("unsupported operating system")]
    UnsupportedPlatform,

    #[error("could not find a supported package manager")]
    PackageManagerNotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("command failed: {command} output: {output} error: {source}")]
    CommandFailed {
        command: String,
        output: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unauthorized: the management API rejected the token")]
    Unauthorized,

    #[error("invalid status response: {code}")]
    Status { code: u16, body: String },

    #[error("{phase} failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: Box<NodeError>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("settings parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("settings serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl NodeError {
    pub fn in_phase(self, phase: Phase) -> Self {
        NodeError::Phase {
            phase,
            source: Box::new(self),
        }
    }

    /// Strips any phase annotations.
    pub fn root(&self) -> &NodeError {
        match self {
            NodeError::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        NodeError::Validation(detail.into())
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        NodeError::NotFound(detail.into())
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_unwraps_nested_phases() {
        let err = NodeError::PackageManagerNotFound
            .in_phase(Phase::Uninstall)
            .in_phase(Phase::Install);
        assert!(matches!(err.root(), NodeError::PackageManagerNotFound));
        assert_eq!(
            err.to_string(),
            "install failed: uninstall failed: could not find a supported package manager"
        );
    }

    #[test]
    fn test_command_failed_message() {
        let err = NodeError::CommandFailed {
            command: "sudo apt-get update".into(),
            output: "E: lock held".into(),
            source: std::io::Error::other("exit status: 100"),
        };
        assert_eq!(
            err.to_string(),
            "command failed: sudo apt-get update output: E: lock held error: exit status: 100"
        );
    }
}
