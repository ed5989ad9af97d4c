//! HTTP request types.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Cursor, Read};

/// Boxed blocking body reader.
pub type BodyReader = Box<dyn Read + Send>;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Canonical upper-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP headers collection.
#[derive(Debug, Default, Clone)]
pub struct Headers {
    inner: HashMap<String, Vec<u8>>,
}

impl Headers {
    /// Create empty headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a header value by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// Insert a header.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.inner
            .insert(name.into().to_ascii_lowercase(), value.into());
    }

    /// Iterate over all headers as (name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.inner
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_slice()))
    }

    /// Returns the number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Request body.
pub enum Body {
    /// Empty body.
    Empty,
    /// Fully buffered body.
    Bytes(Vec<u8>),
    /// Body pulled from the wire on demand.
    Stream(BodyReader),
}

impl Body {
    /// Wrap a blocking reader as a streamed body.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self::Stream(Box::new(reader))
    }

    /// Convert any variant into a single-pass reader.
    #[must_use]
    pub fn into_reader(self) -> BodyReader {
        match self {
            Self::Empty => Box::new(io::empty()),
            Self::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            Self::Stream(reader) => reader,
        }
    }

    /// Check if body is known to be empty.
    ///
    /// A streamed body is never reported empty since its length is unknown.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty) || matches!(self, Self::Bytes(b) if b.is_empty())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// HTTP request.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    headers: Headers,
    body: Body,
}

impl Request {
    /// Create a new request.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Headers::new(),
            body: Body::Empty,
        }
    }

    /// Get the HTTP method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Get the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get mutable headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// The Content-Type header as text, if present and valid UTF-8.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get("content-type")
            .and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Get the body.
    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Take the body, replacing with Empty.
    pub fn take_body(&mut self) -> Body {
        std::mem::replace(&mut self.body, Body::Empty)
    }

    /// Set the body.
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Builder-style body setter.
    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Builder-style header setter.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "multipart/form-data; boundary=x");
        assert_eq!(
            headers.get("CONTENT-TYPE"),
            Some(&b"multipart/form-data; boundary=x"[..])
        );
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_content_type_rejects_non_utf8() {
        let req = Request::new(Method::Post, "/").with_header("content-type", vec![0xff, 0xfe]);
        assert_eq!(req.content_type(), None);
    }

    #[test]
    fn test_request_accessors() {
        let mut req = Request::new(Method::Post, "/upload");
        assert_eq!(req.method(), Method::Post);
        assert_eq!(req.method().as_str(), "POST");
        assert_eq!(req.path(), "/upload");

        req.headers_mut().insert("X-Upload-Id", "42");
        let names: Vec<_> = req.headers().iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["x-upload-id"]);

        req.set_body(Body::Bytes(b"abc".to_vec()));
        assert!(!req.body().is_empty());
    }

    #[test]
    fn test_take_body_leaves_empty() {
        let mut req = Request::new(Method::Post, "/upload").with_body(Body::Bytes(b"abc".to_vec()));
        let body = req.take_body();
        assert!(req.body().is_empty());

        let mut out = String::new();
        body.into_reader().read_to_string(&mut out).unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn test_stream_body_is_not_reported_empty() {
        let body = Body::from_reader(io::empty());
        assert!(!body.is_empty());
        assert_eq!(format!("{body:?}"), "Stream(..)");
    }
}
