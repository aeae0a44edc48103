use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Io,
    Remote,
}

#[derive(Debug, Error)]
pub enum ReportError {
    /// Missing or malformed caller input. Never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("issue {0} not found")]
    NotFound(String),

    #[error("cannot read attachment {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Transport, authentication or tracker-side rejection.
    #[error("{operation} failed{}: {message}", status_suffix(.status))]
    Remote {
        operation: String,
        status: Option<u16>,
        message: String,
    },
}

impl ReportError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn remote(
        operation: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::Remote {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io { .. } => ErrorKind::Io,
            Self::Remote { .. } => ErrorKind::Remote,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (status {code})"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ReportError};

    #[test]
    fn remote_message_includes_status_when_known() {
        let error = ReportError::remote("create issue", Some(400), "project is required");
        assert_eq!(
            error.to_string(),
            "create issue failed (status 400): project is required"
        );
        assert_eq!(error.kind(), ErrorKind::Remote);

        let error = ReportError::remote("search", None, "connection refused");
        assert_eq!(error.to_string(), "search failed: connection refused");
    }

    #[test]
    fn io_message_names_the_path() {
        let error = ReportError::Io {
            path: "target/missing.png".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert!(error.to_string().contains("target/missing.png"));
        assert_eq!(error.kind(), ErrorKind::Io);
    }
}
