//! The streaming binder.
//!
//! A [`Binder`] walks the parts of one multipart/form-data body exactly once.
//! Form fields are read into [`FormValues`] under a cumulative byte budget;
//! file parts are copied chunk by chunk into a caller-supplied sink, so an
//! upload of any size costs one chunk of memory.
//!
//! # Budget
//!
//! Each form value is read with at most the remaining budget. The budget
//! shrinks by the bytes read, and reaching exactly zero fails the bind with
//! [`BindError::ValueTooLarge`], even when the value ended right on the limit.
//!
//! # Example
//!
//! ```ignore
//! let mut binder = Binder::new(request, 0)?;
//! let mut file = std::fs::File::create("upload.bin")?;
//! binder.bind(&mut file, None)?;
//! let name = binder.values().get("name");
//! ```

use std::fmt;
use std::io::{self, Read, Write};

use multipart_stream_core::{BodyReader, MultipartReader, Request, parse_boundary};
use tracing::{debug, trace, warn};

use crate::config::BinderConfig;
use crate::error::{BindError, BindResult};
use crate::progress::{Progress, ProgressListener};
use crate::values::FormValues;

/// Binds one multipart body into form values and a file byte stream.
pub struct Binder<R = BodyReader> {
    reader: MultipartReader<R>,
    values: FormValues,
    remaining: u64,
    config: BinderConfig,
    bound: bool,
}

impl<R> fmt::Debug for Binder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("reader", &self.reader)
            .field("values", &self.values)
            .field("remaining", &self.remaining)
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

impl Binder<BodyReader> {
    /// Create a binder over a request's multipart body.
    ///
    /// `max_values_size` is the form value budget in bytes; zero selects the
    /// 10MB default.
    pub fn new(request: Request, max_values_size: u64) -> BindResult<Self> {
        Self::with_config(
            request,
            BinderConfig::new().max_values_size(max_values_size),
        )
    }

    /// Create a binder over a request's multipart body with full configuration.
    pub fn with_config(mut request: Request, config: BinderConfig) -> BindResult<Self> {
        let reader = MultipartReader::from_request(&mut request, config.get_reader().clone())
            .map_err(BindError::MalformedRequest)?;
        Ok(Self::from_parts(reader, config))
    }
}

impl<R: Read> Binder<R> {
    /// Create a binder over a raw body, given its Content-Type value.
    pub fn from_reader(content_type: &str, source: R, config: BinderConfig) -> BindResult<Self> {
        let boundary = parse_boundary(content_type).map_err(BindError::MalformedRequest)?;
        let reader = MultipartReader::with_config(source, &boundary, config.get_reader().clone());
        Ok(Self::from_parts(reader, config))
    }

    fn from_parts(reader: MultipartReader<R>, config: BinderConfig) -> Self {
        let remaining = config.get_max_values_size();
        debug!(
            max_values_size = remaining,
            chunk_size = config.get_chunk_size(),
            "multipart binder created"
        );
        Self {
            reader,
            values: FormValues::new(),
            remaining,
            config,
            bound: false,
        }
    }

    /// Values collected so far. Partial if `bind` failed.
    #[must_use]
    pub fn values(&self) -> &FormValues {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> FormValues {
        self.values
    }

    /// Form value bytes still allowed.
    #[must_use]
    pub fn remaining_budget(&self) -> u64 {
        self.remaining
    }

    #[must_use]
    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    /// Drain every part: form fields into [`values`](Self::values), file
    /// bytes into `dst` in wire order.
    ///
    /// Stops at the first error. Bytes already written to `dst` stay there.
    /// A binder can be bound once; later calls fail with `InvalidInput`.
    pub fn bind<W>(
        &mut self,
        dst: &mut W,
        mut listener: Option<&mut dyn ProgressListener>,
    ) -> BindResult<()>
    where
        W: Write + ?Sized,
    {
        if self.bound {
            return Err(BindError::InvalidInput {
                detail: "bind called more than once on the same binder",
            });
        }
        self.bound = true;

        let result = self.bind_parts(dst, &mut listener);
        if let Err(err) = &result {
            warn!(error = %err, kind = ?err.kind(), "multipart bind aborted");
        }
        result
    }

    fn bind_parts<W>(
        &mut self,
        dst: &mut W,
        listener: &mut Option<&mut dyn ProgressListener>,
    ) -> BindResult<()>
    where
        W: Write + ?Sized,
    {
        let max_values_size = self.config.get_max_values_size();
        let mut chunk = vec![0u8; self.config.get_chunk_size()];
        let mut files = 0usize;
        let mut skipped = 0usize;

        while let Some(mut part) = self
            .reader
            .next_part()
            .map_err(|e| BindError::part_read("next_part", e))?
        {
            let Some(name) = part.name().map(str::to_owned) else {
                skipped += 1;
                trace!("skipping anonymous part");
                continue;
            };

            if part.is_field() {
                let value = read_form_value(&mut part, &name, &mut self.remaining, max_values_size)?;
                self.values.add(name, value);
            } else {
                stream_file_part(
                    &mut part,
                    &name,
                    dst,
                    &mut chunk,
                    self.config.get_max_file_size(),
                    listener,
                )?;
                files += 1;
            }
        }

        dst.flush().map_err(BindError::SinkWriteError)?;
        debug!(
            fields = self.values.len(),
            files,
            skipped,
            remaining = self.remaining,
            "multipart bind finished"
        );
        Ok(())
    }
}

/// Read one form value with at most `remaining` bytes of budget.
fn read_form_value<P: Read>(
    part: &mut P,
    field: &str,
    remaining: &mut u64,
    max: u64,
) -> BindResult<String> {
    let mut buf = Vec::new();
    let read = part
        .by_ref()
        .take(*remaining)
        .read_to_end(&mut buf)
        .map_err(|e| BindError::part_read("form_part", e))?;

    *remaining -= u64::try_from(read).unwrap_or(u64::MAX).min(*remaining);
    if *remaining == 0 {
        return Err(BindError::ValueTooLarge {
            field: field.to_owned(),
            max,
        });
    }

    trace!(field, bytes = read, remaining = *remaining, "form value read");
    Ok(match String::from_utf8(buf) {
        Ok(value) => value,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}

/// Copy one file part into `dst`, one chunk at a time.
fn stream_file_part<P, W>(
    part: &mut P,
    field: &str,
    dst: &mut W,
    chunk: &mut [u8],
    max_file_size: Option<u64>,
    listener: &mut Option<&mut dyn ProgressListener>,
) -> BindResult<u64>
where
    P: Read,
    W: Write + ?Sized,
{
    let mut streamed = 0u64;
    loop {
        let n = match part.read(chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BindError::part_read("file_part", e)),
        };

        let next = streamed.saturating_add(u64::try_from(n).unwrap_or(u64::MAX));
        if let Some(max) = max_file_size {
            if next > max {
                return Err(BindError::FileTooLarge {
                    field: field.to_owned(),
                    size: next,
                    max,
                });
            }
        }

        dst.write_all(&chunk[..n])
            .map_err(BindError::SinkWriteError)?;
        streamed = next;
        trace!(field, bytes = n, streamed, "file chunk written");
        notify(listener, Progress::streaming(streamed));
    }

    notify(listener, Progress::completed(streamed));
    debug!(field, bytes = streamed, "file part streamed");
    Ok(streamed)
}

fn notify(listener: &mut Option<&mut dyn ProgressListener>, progress: Progress) {
    if let Some(listener) = listener.as_mut() {
        listener.on_progress(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::progress::State;
    use multipart_stream_core::testing::MultipartBuilder;
    use multipart_stream_core::{Body, Method};
    use std::io::Cursor;

    const LOREM: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n\
        Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.\n";

    fn jobby_request() -> Request {
        MultipartBuilder::new()
            .field("name", "Jobby")
            .field("fave", "Wotsits")
            .file("file", "body.txt", "text/plain", LOREM)
            .into_request()
    }

    #[test]
    fn test_bind_splits_fields_and_file() {
        let mut binder = Binder::new(jobby_request(), 0).expect("binder");
        let mut out = Vec::new();
        binder.bind(&mut out, None).expect("bind");

        assert_eq!(out, LOREM.as_bytes());
        assert_eq!(binder.values().get_all("name"), ["Jobby".to_string()]);
        assert_eq!(binder.values().get_all("fave"), ["Wotsits".to_string()]);
        assert_eq!(binder.values().len(), 2);
    }

    #[test]
    fn test_zero_budget_selects_default() {
        let binder = Binder::new(jobby_request(), 0).expect("binder");
        assert_eq!(binder.remaining_budget(), 10 * 1024 * 1024);
        assert_eq!(binder.config().get_max_values_size(), 10 * 1024 * 1024);
        assert_eq!(binder.config().get_chunk_size(), 100_000);
    }

    #[test]
    fn test_budget_decreases_by_bytes_read() {
        let mut binder = Binder::new(jobby_request(), 100).expect("binder");
        binder.bind(&mut io::sink(), None).expect("bind");
        assert_eq!(binder.remaining_budget(), 100 - 5 - 7);
    }

    #[test]
    fn test_one_byte_budget_fails_before_file() {
        let mut binder = Binder::new(jobby_request(), 1).expect("binder");
        let mut out = Vec::new();
        let err = binder.bind(&mut out, None).expect_err("budget exhausted");

        assert_eq!(err.kind(), ErrorKind::ValueTooLarge);
        assert!(out.is_empty());
        assert!(binder.values().is_empty());
        assert_eq!(binder.remaining_budget(), 0);
    }

    #[test]
    fn test_value_landing_exactly_on_budget_fails() {
        let request = MultipartBuilder::new().field("a", "12345").into_request();
        let mut binder = Binder::new(request, 5).expect("binder");
        let err = binder.bind(&mut io::sink(), None).expect_err("exact budget");
        assert!(matches!(err, BindError::ValueTooLarge { ref field, max: 5 } if field == "a"));

        let request = MultipartBuilder::new().field("a", "12345").into_request();
        let mut binder = Binder::new(request, 6).expect("binder");
        binder.bind(&mut io::sink(), None).expect("one byte to spare");
        assert_eq!(binder.values().get("a"), Some("12345"));
    }

    #[test]
    fn test_missing_content_type_is_malformed() {
        let request = Request::new(Method::Post, "/").with_body(Body::Bytes(Vec::new()));
        let err = Binder::new(request, 0).expect_err("no content type");
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);

        let request = Request::new(Method::Post, "/").with_header("content-type", "text/plain");
        let err = Binder::new(request, 0).expect_err("not multipart");
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
    }

    #[test]
    fn test_second_bind_is_invalid_input() {
        let mut binder = Binder::new(jobby_request(), 0).expect("binder");
        let mut out = Vec::new();
        binder.bind(&mut out, None).expect("first bind");
        let written = out.len();

        let err = binder.bind(&mut out, None).expect_err("second bind");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(out.len(), written);
    }

    #[test]
    fn test_listener_sees_streaming_then_completed() {
        let config = BinderConfig::new().chunk_size(16);
        let mut binder = Binder::with_config(jobby_request(), config).expect("binder");
        let mut events = Vec::new();
        let mut listener = |p: Progress| events.push(p);
        binder
            .bind(&mut io::sink(), Some(&mut listener))
            .expect("bind");

        let total = LOREM.len() as u64;
        let (last, streaming) = events.split_last().expect("events");
        assert_eq!(*last, Progress::completed(total));
        assert!(streaming.iter().all(|p| p.state == State::Streaming));
        assert!(streaming.windows(2).all(|w| w[0].bytes_streamed < w[1].bytes_streamed));
        assert_eq!(streaming.last().map(|p| p.bytes_streamed), Some(total));
        assert!(streaming.len() >= LOREM.len() / 16);
    }

    #[test]
    fn test_from_reader_over_raw_body() {
        let builder = MultipartBuilder::with_boundary("raw").field("k", "v");
        let content_type = builder.content_type();
        let body = Cursor::new(builder.build());

        let mut binder =
            Binder::from_reader(&content_type, body, BinderConfig::default()).expect("binder");
        binder.bind(&mut io::sink(), None).expect("bind");
        assert_eq!(binder.into_values().get("k"), Some("v"));
    }

    #[test]
    fn test_from_reader_rejects_bad_content_type() {
        let err = Binder::from_reader("multipart/form-data", io::empty(), BinderConfig::default())
            .expect_err("no boundary");
        assert!(matches!(
            err,
            BindError::MalformedRequest(multipart_stream_core::MultipartError::MissingBoundary)
        ));
    }

    #[test]
    fn test_invalid_utf8_value_is_decoded_lossily() {
        let request = MultipartBuilder::new()
            .field("bin", [b'o', b'k', 0xff])
            .into_request();
        let mut binder = Binder::new(request, 0).expect("binder");
        binder.bind(&mut io::sink(), None).expect("bind");
        assert_eq!(binder.values().get("bin"), Some("ok\u{fffd}"));
    }

    #[test]
    fn test_legacy_encoded_file_name_still_streams() {
        let mut body = Vec::new();
        body.extend_from_slice(b"--b\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nJobby\r\n");
        body.extend_from_slice(
            b"--b\r\nContent-Disposition: form-data; name=\"file\"; filename=\"caf\xe9.txt\"\r\n\r\n",
        );
        body.extend_from_slice(LOREM.as_bytes());
        body.extend_from_slice(b"\r\n--b--\r\n");

        let content_type = "multipart/form-data; boundary=b";
        let mut binder =
            Binder::from_reader(content_type, Cursor::new(body), BinderConfig::default())
                .expect("binder");
        let mut out = Vec::new();
        binder.bind(&mut out, None).expect("bind");

        assert_eq!(out, LOREM.as_bytes());
        assert_eq!(binder.values().get("name"), Some("Jobby"));
        assert!(!binder.values().contains("file"));
    }

    #[test]
    fn test_extended_file_name_part_is_streamed() {
        let request = MultipartBuilder::new()
            .part(
                &["Content-Disposition: form-data; name=\"file\"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"],
                "PDFDATA",
            )
            .into_request();
        let mut binder = Binder::new(request, 0).expect("binder");
        let mut out = Vec::new();
        binder.bind(&mut out, None).expect("bind");

        assert_eq!(out, b"PDFDATA");
        assert!(binder.values().is_empty());
        assert_eq!(binder.remaining_budget(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_lf_only_body_binds() {
        let body = concat!(
            "--b\n",
            "Content-Disposition: form-data; name=\"name\"\n",
            "\n",
            "Jobby\n",
            "--b\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"body.txt\"\n",
            "\n",
            "lorem\n",
            "--b--\n"
        );
        let mut binder = Binder::from_reader(
            "multipart/form-data; boundary=b",
            Cursor::new(body),
            BinderConfig::default(),
        )
        .expect("binder");
        let mut out = Vec::new();
        binder.bind(&mut out, None).expect("bind");

        assert_eq!(out, b"lorem");
        assert_eq!(binder.values().get("name"), Some("Jobby"));
    }
}
