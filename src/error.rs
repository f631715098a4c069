//! Error taxonomy for synthesis and hand-off.
//!
//! Every failure aborts the whole synthesis pass. Nothing is retried here;
//! retry and backoff belong to the provisioning engine.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving, building, rendering, or handing off a stack.
#[derive(Error, Debug)]
pub enum Error {
    /// Required context key is absent and has no default.
    #[error("missing configuration: context key '{key}' is not set")]
    MissingConfiguration { key: String },

    /// Context key is present but has the wrong shape.
    #[error("invalid context value for '{key}': {message}")]
    InvalidContext { key: String, message: String },

    /// A resource referenced a logical ID that was not yet declared.
    #[error("invalid reference: '{from}' refers to undeclared resource '{to}'")]
    InvalidReference { from: String, to: String },

    /// The same logical ID was declared twice.
    #[error("duplicate resource: logical ID '{id}' is already declared")]
    DuplicateResource { id: String },

    /// The resource graph is not acyclic.
    #[error("dependency cycle detected involving: {}", members.join(", "))]
    DependencyCycle { members: Vec<String> },

    /// The provisioning engine rejected the template. `stderr` is verbatim.
    #[error("provisioning of stack '{stack}' failed (exit {exit_code}): {stderr}")]
    ExternalProvisioningFailure {
        stack: String,
        exit_code: i32,
        stderr: String,
    },

    /// Project file failed structural validation.
    #[error("{count} validation error(s)")]
    Validation { count: usize },

    /// Drift detected while running in tripwire mode.
    #[error("{count} drift finding(s)")]
    Drift { count: usize },

    /// Generic usage error (bad CLI input, existing files, etc.).
    #[error("{0}")]
    Usage(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configuration_names_key() {
        let e = Error::MissingConfiguration {
            key: "mydomain".to_string(),
        };
        assert!(e.to_string().contains("'mydomain'"));
    }

    #[test]
    fn test_cycle_lists_members() {
        let e = Error::DependencyCycle {
            members: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(e.to_string(), "dependency cycle detected involving: a, b");
    }

    #[test]
    fn test_external_failure_keeps_stderr() {
        let e = Error::ExternalProvisioningFailure {
            stack: "S".to_string(),
            exit_code: 254,
            stderr: "An error occurred (ValidationError)".to_string(),
        };
        assert!(e
            .to_string()
            .ends_with("An error occurred (ValidationError)"));
    }
}
