//! Synthetic multipart bodies for tests.
//!
//! # Example
//!
//! ```ignore
//! use multipart_stream_core::testing::MultipartBuilder;
//!
//! let request = MultipartBuilder::new()
//!     .field("name", "Jobby")
//!     .file("file", "body.txt", "text/plain", b"hello")
//!     .into_request();
//! ```

use crate::request::{Body, Method, Request};

/// Boundary used when none is given.
pub const DEFAULT_TEST_BOUNDARY: &str = "----MultipartStreamTestBoundary7MA4YWxkTrZu0gW";

/// Builds `multipart/form-data` bodies part by part.
#[derive(Debug, Clone)]
pub struct MultipartBuilder {
    boundary: String,
    body: Vec<u8>,
}

impl Default for MultipartBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBuilder {
    /// Create a builder using [`DEFAULT_TEST_BOUNDARY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_boundary(DEFAULT_TEST_BOUNDARY)
    }

    /// Create a builder with a custom boundary.
    #[must_use]
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            body: Vec::new(),
        }
    }

    /// Append a plain form field.
    #[must_use]
    pub fn field(self, name: &str, value: impl AsRef<[u8]>) -> Self {
        let disposition = format!("Content-Disposition: form-data; name=\"{name}\"");
        self.part(&[disposition.as_str()], value)
    }

    /// Append a file part.
    #[must_use]
    pub fn file(
        self,
        name: &str,
        file_name: &str,
        content_type: &str,
        data: impl AsRef<[u8]>,
    ) -> Self {
        let disposition =
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"");
        let content_type = format!("Content-Type: {content_type}");
        self.part(&[disposition.as_str(), content_type.as_str()], data)
    }

    /// Append a part with verbatim header lines (without trailing CRLF).
    #[must_use]
    pub fn part(mut self, headers: &[&str], data: impl AsRef<[u8]>) -> Self {
        self.body.extend_from_slice(b"--");
        self.body.extend_from_slice(self.boundary.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        for header in headers {
            self.body.extend_from_slice(header.as_bytes());
            self.body.extend_from_slice(b"\r\n");
        }
        self.body.extend_from_slice(b"\r\n");
        self.body.extend_from_slice(data.as_ref());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// The boundary in use.
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Content-Type header value announcing this body.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Finish the body with the closing delimiter.
    #[must_use]
    pub fn build(mut self) -> Vec<u8> {
        self.body.extend_from_slice(b"--");
        self.body.extend_from_slice(self.boundary.as_bytes());
        self.body.extend_from_slice(b"--\r\n");
        self.body
    }

    /// Finish the body and wrap it in a `POST /` request.
    #[must_use]
    pub fn into_request(self) -> Request {
        let content_type = self.content_type();
        Request::new(Method::Post, "/")
            .with_header("content-type", content_type)
            .with_body(Body::Bytes(self.build()))
    }
}
