//! Binder error types.

use std::io;

use multipart_stream_core::MultipartError;
use thiserror::Error;

/// Errors that abort construction or a [`Binder::bind`](crate::Binder::bind) call.
#[derive(Debug, Error)]
pub enum BindError {
    /// The binder was misused, e.g. bound twice.
    #[error("invalid input: {detail}")]
    InvalidInput { detail: &'static str },

    /// The request is not a readable multipart/form-data request.
    #[error("malformed multipart request: {0}")]
    MalformedRequest(#[source] MultipartError),

    /// Form values used up the whole byte budget.
    #[error("form_part: field `{field}` exhausts the {max} byte value budget")]
    ValueTooLarge { field: String, max: u64 },

    /// The part source failed for a reason other than clean exhaustion.
    #[error("{stage}: error reading multipart part: {source}")]
    PartReadError {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    /// A file part exceeded the configured per-file cap.
    #[error("file_part: file `{field}` is {size} bytes, exceeds limit of {max}")]
    FileTooLarge { field: String, size: u64, max: u64 },

    /// The destination sink rejected a write.
    #[error("file_part: error writing to destination: {0}")]
    SinkWriteError(#[source] io::Error),
}

/// Failure category of a [`BindError`], for matching without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    MalformedRequest,
    ValueTooLarge,
    PartReadError,
    FileTooLarge,
    SinkWriteError,
}

impl BindError {
    /// The failure category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::MalformedRequest(_) => ErrorKind::MalformedRequest,
            Self::ValueTooLarge { .. } => ErrorKind::ValueTooLarge,
            Self::PartReadError { .. } => ErrorKind::PartReadError,
            Self::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            Self::SinkWriteError(_) => ErrorKind::SinkWriteError,
        }
    }

    pub(crate) fn part_read(stage: &'static str, source: impl Into<io::Error>) -> Self {
        Self::PartReadError {
            stage,
            source: source.into(),
        }
    }
}

/// Result alias for binder operations.
pub type BindResult<T> = Result<T, BindError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = BindError::ValueTooLarge {
            field: "name".to_string(),
            max: 1,
        };
        assert_eq!(err.kind(), ErrorKind::ValueTooLarge);
        assert!(err.to_string().starts_with("form_part:"));

        let err = BindError::MalformedRequest(MultipartError::MissingBoundary);
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
    }

    #[test]
    fn test_part_read_keeps_stage_and_source() {
        let err = BindError::part_read("next_part", MultipartError::UnexpectedEof);
        assert_eq!(err.kind(), ErrorKind::PartReadError);
        assert!(err.to_string().starts_with("next_part:"));
        let source = std::error::Error::source(&err).expect("source");
        let io_err = source.downcast_ref::<io::Error>().expect("io error source");
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
