//! Blocking multipart/form-data part reader.
//!
//! [`MultipartReader`] splits any [`Read`] into a forward-only sequence of
//! [`Part`]s. Part bodies are never buffered whole: the reader keeps at most
//! one read's worth of bytes plus the tail that could still start a
//! delimiter, so memory stays bounded no matter how large a file part is.
//!
//! ```ignore
//! use multipart_stream_core::MultipartReader;
//!
//! let mut reader = MultipartReader::new(body, "----boundary");
//! while let Some(mut part) = reader.next_part()? {
//!     let mut value = Vec::new();
//!     part.read_to_end(&mut value)?;
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};

use memchr::memmem;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{MultipartError, MultipartResult};
use crate::request::{BodyReader, Request};

/// Default maximum size of one part's header block (8KB).
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8 * 1024;

/// Default maximum number of header lines per part.
pub const DEFAULT_MAX_HEADERS: usize = 32;

/// Default number of bytes requested from the body per read (8KB).
pub const DEFAULT_READ_SIZE: usize = 8 * 1024;

/// RFC 2046 recommends multipart boundary length <= 70 characters.
const MAX_BOUNDARY_LEN: usize = 70;

/// Configuration for the part reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Maximum size of one part's header block in bytes.
    max_header_size: usize,
    /// Maximum number of header lines per part.
    max_headers: usize,
    /// Bytes requested from the body per read.
    read_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_headers: DEFAULT_MAX_HEADERS,
            read_size: DEFAULT_READ_SIZE,
        }
    }
}

impl ReaderConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum header block size.
    #[must_use]
    pub fn max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size;
        self
    }

    /// Set the maximum number of header lines.
    #[must_use]
    pub fn max_headers(mut self, count: usize) -> Self {
        self.max_headers = count;
        self
    }

    /// Set the read size. Zero selects the default.
    #[must_use]
    pub fn read_size(mut self, size: usize) -> Self {
        self.read_size = size;
        self
    }

    /// Get the maximum header block size.
    #[must_use]
    pub fn get_max_header_size(&self) -> usize {
        self.max_header_size
    }

    /// Get the maximum number of header lines.
    #[must_use]
    pub fn get_max_headers(&self) -> usize {
        self.max_headers
    }

    /// Get the effective read size.
    #[must_use]
    pub fn get_read_size(&self) -> usize {
        if self.read_size == 0 {
            DEFAULT_READ_SIZE
        } else {
            self.read_size
        }
    }
}

/// Parse boundary from Content-Type header.
///
/// Content-Type format: `multipart/form-data; boundary=----WebKitFormBoundary...`
pub fn parse_boundary(content_type: &str) -> MultipartResult<String> {
    let content_type = content_type.trim();
    let main = content_type.split(';').next().unwrap_or("").trim();
    if !main.eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::InvalidContentType);
    }

    for param in split_params(content_type).into_iter().skip(1) {
        let Some((k, v)) = param.split_once('=') else {
            continue;
        };
        if k.trim().eq_ignore_ascii_case("boundary") {
            let boundary = unquote(v);
            if boundary.is_empty()
                || boundary.len() > MAX_BOUNDARY_LEN
                || boundary.contains(['\r', '\n'])
            {
                return Err(MultipartError::InvalidBoundary);
            }
            return Ok(boundary);
        }
    }

    Err(MultipartError::MissingBoundary)
}

/// Headers of a single part, parsed up front by [`MultipartReader::next_part`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders {
    name: Option<String>,
    file_name: Option<String>,
    content_type: Option<String>,
    raw: HashMap<String, String>,
}

impl PartHeaders {
    /// Parse a header block. Lines may end in CRLF or a bare LF; bytes that
    /// are not UTF-8 (legacy-encoded file names) are replaced, not rejected.
    fn parse(block: &[u8], max_headers: usize) -> MultipartResult<Self> {
        let text = String::from_utf8_lossy(block);

        let mut raw = HashMap::new();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if raw.len() == max_headers {
                return Err(MultipartError::TooManyHeaders { max: max_headers });
            }
            raw.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let (name, file_name) = raw
            .get("content-disposition")
            .map(|v| parse_content_disposition(v))
            .unwrap_or_default();
        let content_type = raw.get("content-type").cloned();

        Ok(Self {
            name,
            file_name,
            content_type,
            raw,
        })
    }
}

/// Parse Content-Disposition header value.
///
/// Format: `form-data; name="field"; filename="file.txt"`. Only `form-data`
/// dispositions yield a field name; empty names and file names count as absent.
/// A decodable `filename*` wins over `filename`.
fn parse_content_disposition(value: &str) -> (Option<String>, Option<String>) {
    let params = split_params(value);
    let is_form_data = params
        .first()
        .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("form-data"));

    let mut name = None;
    let mut file_name = None;
    let mut extended_file_name = None;
    for param in params.iter().skip(1) {
        let Some((key, raw_value)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("name") {
            name = Some(unquote(raw_value));
        } else if key.eq_ignore_ascii_case("filename") {
            file_name = Some(unquote(raw_value));
        } else if key.eq_ignore_ascii_case("filename*") {
            extended_file_name = decode_ext_value(&unquote(raw_value));
        }
    }

    let name = name.filter(|n| is_form_data && !n.is_empty());
    let file_name = extended_file_name
        .or(file_name)
        .filter(|f| !f.is_empty());
    (name, file_name)
}

/// Decode an RFC 5987 `charset'language'value` parameter.
///
/// Only UTF-8 and US-ASCII are understood; anything else yields `None`.
fn decode_ext_value(value: &str) -> Option<String> {
    let mut pieces = value.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;
    if !(charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("us-ascii")) {
        return None;
    }
    Some(
        percent_encoding::percent_decode_str(encoded)
            .decode_utf8_lossy()
            .into_owned(),
    )
}

/// Split a header value on `;`, leaving separators inside quotes alone.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        let mut out = String::with_capacity(s.len() - 2);
        let mut escaped = false;
        for c in s[1..s.len() - 1].chars() {
            if escaped || c != '\\' {
                out.push(c);
                escaped = false;
            } else {
                escaped = true;
            }
        }
        out
    } else if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Bytes before the first delimiter.
    Preamble,
    /// Inside the body of the part last handed out.
    Body,
    /// Just past a delimiter, before its `--` or line break suffix.
    Boundary,
    Done,
}

enum Scan {
    /// This many leading buffer bytes belong to the current body.
    Data(usize),
    /// The buffer starts with a complete delimiter.
    End,
    NeedMore,
}

fn is_delimiter_suffix(suffix: &[u8]) -> bool {
    suffix == b"--" || matches!(suffix[0], b'\r' | b'\n' | b' ' | b'\t')
}

/// Forward-only multipart part reader over a blocking byte source.
pub struct MultipartReader<R> {
    source: R,
    buffer: Vec<u8>,
    boundary: String,
    /// `CRLF` or a bare `LF`, fixed by the first boundary line.
    newline: &'static [u8],
    delimiter: Vec<u8>,
    finder: memmem::Finder<'static>,
    config: ReaderConfig,
    phase: Phase,
    eof: bool,
    parts_seen: usize,
}

impl<R> fmt::Debug for MultipartReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartReader")
            .field("phase", &self.phase)
            .field("buffered", &self.buffer.len())
            .field("eof", &self.eof)
            .field("parts_seen", &self.parts_seen)
            .finish_non_exhaustive()
    }
}

impl MultipartReader<BodyReader> {
    /// Take the body of a `multipart/form-data` request and read it part by part.
    pub fn from_request(request: &mut Request, config: ReaderConfig) -> MultipartResult<Self> {
        let content_type = request
            .content_type()
            .ok_or(MultipartError::MissingContentType)?;
        let boundary = parse_boundary(content_type)?;
        let body = request.take_body().into_reader();
        Ok(Self::with_config(body, &boundary, config))
    }
}

impl<R: Read> MultipartReader<R> {
    /// Create a reader with the default configuration.
    pub fn new(source: R, boundary: &str) -> Self {
        Self::with_config(source, boundary, ReaderConfig::default())
    }

    /// Create a reader with the given configuration.
    pub fn with_config(source: R, boundary: &str, config: ReaderConfig) -> Self {
        // Until the first boundary line settles the line ending, look for
        // `LF--boundary`, which matches under either convention.
        let delimiter = format!("\n--{boundary}").into_bytes();
        let finder = memmem::Finder::new(&delimiter).into_owned();
        Self {
            source,
            // The leading LF lets a delimiter at the very start of the body
            // match the same pattern as every later one.
            buffer: b"\n".to_vec(),
            boundary: boundary.to_string(),
            newline: b"\r\n",
            delimiter,
            finder,
            config,
            phase: Phase::Preamble,
            eof: false,
            parts_seen: 0,
        }
    }

    /// Number of parts handed out so far.
    #[must_use]
    pub fn parts_seen(&self) -> usize {
        self.parts_seen
    }

    /// Bytes currently held in the internal buffer.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Advance to the next part.
    ///
    /// Any unread remainder of the previous part (or the preamble) is
    /// discarded. Returns `None` once the closing delimiter is reached.
    pub fn next_part(&mut self) -> MultipartResult<Option<Part<'_, R>>> {
        let first = self.phase == Phase::Preamble;
        if matches!(self.phase, Phase::Preamble | Phase::Body) {
            self.discard_body()?;
        }
        if self.phase == Phase::Done {
            return Ok(None);
        }

        self.fill_to(2)?;
        if self.buffer.starts_with(b"--") {
            self.phase = Phase::Done;
            self.buffer.clear();
            debug!(parts = self.parts_seen, "reached closing boundary");
            return Ok(None);
        }

        // Transport padding is allowed between the boundary and its line break.
        loop {
            self.fill_to(1)?;
            if !matches!(self.buffer[0], b' ' | b'\t') {
                break;
            }
            self.buffer.drain(..1);
        }
        if first {
            self.fill_to(2)?;
            let newline: &'static [u8] = if self.buffer.starts_with(b"\r\n") {
                b"\r\n"
            } else {
                b"\n"
            };
            self.set_newline(newline);
        }
        self.fill_to(self.newline.len())?;
        if !self.buffer.starts_with(self.newline) {
            return Err(MultipartError::InvalidFormat {
                detail: "expected line break after boundary",
            });
        }
        self.buffer.drain(..self.newline.len());

        let headers = self.read_headers()?;
        self.phase = Phase::Body;
        self.parts_seen += 1;
        debug!(
            index = self.parts_seen,
            name = headers.name.as_deref().unwrap_or(""),
            file_name = headers.file_name.as_deref().unwrap_or(""),
            "multipart part started"
        );

        Ok(Some(Part {
            reader: self,
            headers,
        }))
    }

    fn set_newline(&mut self, newline: &'static [u8]) {
        let mut delimiter = newline.to_vec();
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(self.boundary.as_bytes());
        self.finder = memmem::Finder::new(&delimiter).into_owned();
        self.delimiter = delimiter;
        self.newline = newline;
        trace!(crlf = newline == b"\r\n", "multipart line ending detected");
    }

    fn read_headers(&mut self) -> MultipartResult<PartHeaders> {
        let newline = self.newline;
        self.fill_to(newline.len())?;
        if self.buffer.starts_with(newline) {
            self.buffer.drain(..newline.len());
            return Ok(PartHeaders::default());
        }

        let terminator: &[u8] = if newline == b"\r\n" { b"\r\n\r\n" } else { b"\n\n" };
        let max = self.config.max_header_size;
        let mut searched = 0;
        let end = loop {
            if let Some(pos) = memmem::find(&self.buffer[searched..], terminator) {
                break searched + pos;
            }
            if self.buffer.len() > max {
                return Err(MultipartError::HeadersTooLarge { max });
            }
            searched = self.buffer.len().saturating_sub(terminator.len() - 1);
            if self.fill()? == 0 {
                return Err(MultipartError::UnexpectedEof);
            }
        };
        if end > max {
            return Err(MultipartError::HeadersTooLarge { max });
        }

        let headers = PartHeaders::parse(&self.buffer[..end], self.config.max_headers)?;
        self.buffer.drain(..end + terminator.len());
        Ok(headers)
    }

    /// Read body bytes of the current part into `out`. Zero means the part ended.
    fn read_body(&mut self, out: &mut [u8]) -> MultipartResult<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let Some(available) = self.advance()? else {
            return Ok(0);
        };
        let n = available.min(out.len());
        out[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.drain(..n);
        Ok(n)
    }

    fn discard_body(&mut self) -> MultipartResult<()> {
        let mut discarded = 0usize;
        while let Some(available) = self.advance()? {
            self.buffer.drain(..available);
            discarded += available;
        }
        if discarded > 0 {
            trace!(discarded, "skipped unread multipart bytes");
        }
        Ok(())
    }

    /// Make body bytes available at the front of the buffer.
    ///
    /// Returns how many leading bytes belong to the current body, or `None`
    /// once its terminating delimiter has been consumed.
    fn advance(&mut self) -> MultipartResult<Option<usize>> {
        if !matches!(self.phase, Phase::Preamble | Phase::Body) {
            return Ok(None);
        }
        loop {
            match self.scan()? {
                Scan::Data(n) => return Ok(Some(n)),
                Scan::End => {
                    self.buffer.drain(..self.delimiter.len());
                    self.phase = Phase::Boundary;
                    return Ok(None);
                }
                Scan::NeedMore => {
                    self.fill()?;
                }
            }
        }
    }

    fn scan(&self) -> MultipartResult<Scan> {
        let buf = &self.buffer;
        let delimiter_len = self.delimiter.len();
        let mut from = 0;

        while let Some(offset) = self.finder.find(&buf[from..]) {
            let at = from + offset;
            let after = at + delimiter_len;
            if buf.len() < after + 2 {
                // Cannot tell a real delimiter from content until the suffix arrives.
                if at > 0 {
                    return Ok(Scan::Data(at));
                }
                if self.eof {
                    return Err(MultipartError::UnexpectedEof);
                }
                return Ok(Scan::NeedMore);
            }
            if is_delimiter_suffix(&buf[after..after + 2]) {
                return Ok(if at == 0 { Scan::End } else { Scan::Data(at) });
            }
            // `--boundaryX`: content, keep looking past it.
            from = after;
        }

        if self.eof {
            return if buf.is_empty() {
                Err(MultipartError::UnexpectedEof)
            } else {
                Ok(Scan::Data(buf.len()))
            };
        }

        // The tail may hold the start of a delimiter split across reads.
        let safe = buf.len().saturating_sub(delimiter_len - 1).max(from);
        Ok(if safe > 0 {
            Scan::Data(safe)
        } else {
            Scan::NeedMore
        })
    }

    fn fill_to(&mut self, len: usize) -> MultipartResult<()> {
        while self.buffer.len() < len {
            if self.fill()? == 0 {
                return Err(MultipartError::UnexpectedEof);
            }
        }
        Ok(())
    }

    fn fill(&mut self) -> MultipartResult<usize> {
        if self.eof {
            return Ok(0);
        }
        let start = self.buffer.len();
        self.buffer.resize(start + self.config.get_read_size(), 0);
        loop {
            match self.source.read(&mut self.buffer[start..]) {
                Ok(n) => {
                    self.buffer.truncate(start + n);
                    if n == 0 {
                        self.eof = true;
                    }
                    return Ok(n);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    self.buffer.truncate(start);
                    return Err(err.into());
                }
            }
        }
    }
}

/// One part of a multipart body.
///
/// Borrows the reader, so only one part can be live at a time. Reading it
/// yields the raw body bytes; a part dropped before its end is skipped when
/// the next part is requested.
pub struct Part<'a, R> {
    reader: &'a mut MultipartReader<R>,
    headers: PartHeaders,
}

impl<R> Part<'_, R> {
    /// Field name from a `form-data` Content-Disposition.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.headers.name.as_deref()
    }

    /// File name from Content-Disposition (if present and non-empty).
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.headers.file_name.as_deref()
    }

    /// Content-Type of the part (if present).
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.content_type.as_deref()
    }

    /// All part headers, keyed by lower-case name.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers.raw
    }

    /// Returns true if this part is a file upload.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.headers.file_name.is_some()
    }

    /// Returns true if this part is a regular form field.
    #[must_use]
    pub fn is_field(&self) -> bool {
        self.headers.file_name.is_none()
    }
}

impl<R: Read> Read for Part<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read_body(buf).map_err(io::Error::from)
    }
}

impl<R> fmt::Debug for Part<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
