//! Error types for multipart segmentation.

use std::io;

use thiserror::Error;

/// Errors that can occur while splitting a body into multipart parts.
#[derive(Debug, Error)]
pub enum MultipartError {
    /// The request carries no Content-Type header.
    #[error("missing Content-Type header")]
    MissingContentType,
    /// The Content-Type is not `multipart/form-data` (or is not valid text).
    #[error("content type is not multipart/form-data")]
    InvalidContentType,
    /// Missing boundary in Content-Type header.
    #[error("missing boundary in multipart Content-Type")]
    MissingBoundary,
    /// Invalid boundary format.
    #[error("invalid multipart boundary")]
    InvalidBoundary,
    /// Invalid multipart framing.
    #[error("invalid multipart format: {detail}")]
    InvalidFormat { detail: &'static str },
    /// A part's header block exceeds the configured size.
    #[error("part headers exceed limit of {max} bytes")]
    HeadersTooLarge { max: usize },
    /// A part carries more header lines than allowed.
    #[error("part has more than {max} headers")]
    TooManyHeaders { max: usize },
    /// The body ended before the closing boundary.
    #[error("unexpected end of multipart data")]
    UnexpectedEof,
    /// The underlying body reader failed.
    #[error("multipart I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<MultipartError> for io::Error {
    fn from(err: MultipartError) -> Self {
        match err {
            MultipartError::Io(inner) => inner,
            MultipartError::UnexpectedEof => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Result alias for multipart segmentation.
pub type MultipartResult<T> = Result<T, MultipartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_passes_through_unwrapped() {
        let err = MultipartError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_framing_errors_map_to_io_kinds() {
        let eof: io::Error = MultipartError::UnexpectedEof.into();
        assert_eq!(eof.kind(), io::ErrorKind::UnexpectedEof);

        let bad: io::Error = MultipartError::InvalidFormat {
            detail: "expected line break after boundary",
        }
        .into();
        assert_eq!(bad.kind(), io::ErrorKind::InvalidData);
        assert!(bad.to_string().contains("expected line break"));
    }
}
