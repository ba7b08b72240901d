//! Error taxonomy for filesystem-style WebDAV operations, and the mapping
//! from HTTP status codes into it.

use std::io;

use http::StatusCode;
use thiserror::Error;

/// The errors that filesystem-style operations can produce.
///
/// WebDAV status semantics are richer than this; the taxonomy is a
/// deliberate lossy compression because callers of a filesystem interface
/// only distinguish a handful of cases.
#[derive(Debug, Error)]
pub enum FsError {
    /// The resource does not exist.
    #[error("no such file or directory: {0}")]
    NotFound(String),
    /// The resource already exists.
    #[error("file already exists: {0}")]
    Exists(String),
    /// The server refused access (403 or locked).
    #[error("permission denied: {0}")]
    Forbidden(String),
    /// Bad seek, wrong handle mode, directory/non-directory mismatch.
    #[error("invalid argument: {op} {path}")]
    InvalidArgument { op: &'static str, path: String },
    /// Operation on a handle that was already closed.
    #[error("file already closed: {0}")]
    Closed(String),
    /// The server reported it is out of space (507).
    #[error("insufficient storage: {0}")]
    InsufficientStorage(String),
    /// Any other non-success HTTP status, with diagnostics.
    #[error("webdav {method} {path}: status {status}: {message}")]
    Protocol {
        status: u16,
        method: String,
        path: String,
        message: String,
    },
    /// Invalid or missing connection settings.
    #[error("config error: {field}: {reason}")]
    Config { field: String, reason: String },
    /// Malformed multistatus body.
    #[error("xml parse error: {0}")]
    Xml(String),
    /// The HTTP round trip itself failed (connect, timeout, ...).
    #[error("transport error for {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// Local filesystem I/O failure.
    #[error("io error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }

    pub fn is_exists(&self) -> bool {
        matches!(self, FsError::Exists(_))
    }

    pub(crate) fn invalid(op: &'static str, path: &str) -> FsError {
        FsError::InvalidArgument {
            op,
            path: path.to_string(),
        }
    }

    /// Wrap a local I/O error, promoting the kinds that have a direct
    /// equivalent in the taxonomy.
    pub(crate) fn from_io(err: io::Error, path: &str) -> FsError {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
            io::ErrorKind::AlreadyExists => FsError::Exists(path.to_string()),
            io::ErrorKind::PermissionDenied => FsError::Forbidden(path.to_string()),
            _ => FsError::Io {
                path: path.to_string(),
                source: err,
            },
        }
    }
}

/// Map an HTTP response status onto the filesystem error taxonomy.
///
/// Total over all status codes; anything unrecognized becomes a generic
/// protocol error carrying the raw status.
pub fn status_to_error(status: StatusCode, path: &str) -> FsError {
    match status.as_u16() {
        404 => FsError::NotFound(path.to_string()),
        403 => FsError::Forbidden(path.to_string()),
        // Conflict: typically the parent collection does not exist.
        409 => FsError::NotFound(path.to_string()),
        // Precondition Failed: used as an existence guard (Overwrite: F).
        412 => FsError::Exists(path.to_string()),
        // Locked.
        423 => FsError::Forbidden(path.to_string()),
        507 => FsError::InsufficientStorage(path.to_string()),
        code => FsError::Protocol {
            status: code,
            method: "webdav".to_string(),
            path: path.to_string(),
            message: String::new(),
        },
    }
}

impl From<FsError> for io::Error {
    fn from(e: FsError) -> io::Error {
        let kind = match &e {
            FsError::NotFound(_) => io::ErrorKind::NotFound,
            FsError::Exists(_) => io::ErrorKind::AlreadyExists,
            FsError::Forbidden(_) => io::ErrorKind::PermissionDenied,
            FsError::InvalidArgument { .. } | FsError::Closed(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert!(matches!(
            status_to_error(StatusCode::NOT_FOUND, "/a"),
            FsError::NotFound(_)
        ));
        assert!(matches!(
            status_to_error(StatusCode::FORBIDDEN, "/a"),
            FsError::Forbidden(_)
        ));
        assert!(matches!(
            status_to_error(StatusCode::CONFLICT, "/a"),
            FsError::NotFound(_)
        ));
        assert!(matches!(
            status_to_error(StatusCode::PRECONDITION_FAILED, "/a"),
            FsError::Exists(_)
        ));
        assert!(matches!(
            status_to_error(StatusCode::LOCKED, "/a"),
            FsError::Forbidden(_)
        ));
        assert!(matches!(
            status_to_error(StatusCode::INSUFFICIENT_STORAGE, "/a"),
            FsError::InsufficientStorage(_)
        ));
    }

    #[test]
    fn unknown_status_is_protocol_error() {
        match status_to_error(StatusCode::IM_A_TEAPOT, "/pot") {
            FsError::Protocol { status, path, .. } => {
                assert_eq!(status, 418);
                assert_eq!(path, "/pot");
            }
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[test]
    fn io_error_kinds_round_trip() {
        let e: io::Error = FsError::NotFound("/x".into()).into();
        assert_eq!(e.kind(), io::ErrorKind::NotFound);
        let e: io::Error = FsError::invalid("seek", "/x").into();
        assert_eq!(e.kind(), io::ErrorKind::InvalidInput);
    }
}
