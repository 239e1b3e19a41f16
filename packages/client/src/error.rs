use serde::{Deserialize, Serialize};

/// Failure reported by the transport before any HTTP status was seen.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("{message}")]
    Other { message: String },
}

impl TransportError {
    pub fn other(message: impl Into<String>) -> Self {
        TransportError::Other {
            message: message.into(),
        }
    }
}

/// Structured error carried in a response envelope with `ok == false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ServerError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl ServerError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(&self.code)
    }
}

/// Classification of server error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    VersionConflict,
    InvalidArgument,
    LeaseExpired,
    DeadlineExceeded,
    Other,
}

impl ErrorKind {
    /// Map a server code string onto a kind. Unknown codes are `Other`.
    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "NOT_FOUND" | "KEY_NOT_FOUND" => ErrorKind::NotFound,
            "VERSION_CONFLICT" | "REVISION_CONFLICT" | "OUT_OF_DATE" | "TEST_FAILED" => {
                ErrorKind::VersionConflict
            }
            "INVALID_PARAM" | "INVALID_ARGUMENT" | "INVALID_NAME" | "INVALID_VALUE"
            | "INVALID_VERSION" | "INVALID_ADDRESS" | "INVALID_ENDPOINT" => {
                ErrorKind::InvalidArgument
            }
            "LEASE_EXPIRED" | "LEASE_NOT_FOUND" => ErrorKind::LeaseExpired,
            "DEADLINE_EXCEEDED" | "TIMEOUT" => ErrorKind::DeadlineExceeded,
            _ => ErrorKind::Other,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("request failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("server error: {0}")]
    Domain(#[from] ServerError),

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Kind of a server-reported failure. Client-side argument checks count
    /// as `InvalidArgument`; everything else that did not come from the
    /// server is `None`.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Domain(e) => Some(e.kind()),
            Error::InvalidArgument { .. } => Some(ErrorKind::InvalidArgument),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }

    pub fn is_version_conflict(&self) -> bool {
        self.kind() == Some(ErrorKind::VersionConflict)
    }

    /// The lease (and every endpoint bound to it) is gone. A keep-alive loop
    /// that sees this has to plug again.
    pub fn is_lease_gone(&self) -> bool {
        matches!(
            self.kind(),
            Some(ErrorKind::NotFound) | Some(ErrorKind::LeaseExpired)
        )
    }

    /// Network level failure or non-2xx status; the usual candidates for
    /// backoff and retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Status { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_codes_map_to_kinds() {
        assert_eq!(ErrorKind::from_code("NOT_FOUND"), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_code("not_found"), ErrorKind::NotFound);
        assert_eq!(
            ErrorKind::from_code("VERSION_CONFLICT"),
            ErrorKind::VersionConflict
        );
        assert_eq!(
            ErrorKind::from_code("INVALID_PARAM"),
            ErrorKind::InvalidArgument
        );
        assert_eq!(ErrorKind::from_code("LEASE_EXPIRED"), ErrorKind::LeaseExpired);
        assert_eq!(
            ErrorKind::from_code("DEADLINE_EXCEEDED"),
            ErrorKind::DeadlineExceeded
        );
        assert_eq!(ErrorKind::from_code("SYSTEM_ERROR"), ErrorKind::Other);
    }

    #[test]
    fn lease_gone_covers_not_found_and_expired() {
        let not_found = Error::Domain(ServerError::new("NOT_FOUND", "no lease"));
        let expired = Error::Domain(ServerError::new("LEASE_EXPIRED", "expired"));
        let conflict = Error::Domain(ServerError::new("VERSION_CONFLICT", "stale"));

        assert!(not_found.is_lease_gone());
        assert!(expired.is_lease_gone());
        assert!(!conflict.is_lease_gone());
        assert!(conflict.is_version_conflict());
    }

    #[test]
    fn transport_classification() {
        let status = Error::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert!(status.is_transport());
        assert_eq!(status.kind(), None);

        let refused = Error::from(TransportError::other("connection refused"));
        assert!(refused.is_transport());

        assert!(!Error::Cancelled.is_transport());
        assert!(Error::Cancelled.is_cancelled());
    }

    #[test]
    fn display_includes_server_code() {
        let err = Error::Domain(ServerError::new("NOT_FOUND", "key db.url"));
        assert_eq!(err.to_string(), "server error: NOT_FOUND: key db.url");
    }
}
