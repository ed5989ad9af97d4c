//! Streaming multipart/form-data binder.
//!
//! Decodes a `multipart/form-data` body into two disjoint outputs:
//! - [`FormValues`]: scalar fields, accumulated under a byte budget
//! - a caller-supplied [`Write`](std::io::Write) sink receiving every file
//!   part's bytes as they arrive, concatenated in wire order
//!
//! File uploads are never buffered whole; at most one copy chunk is held in
//! memory at a time.
//!
//! # Example
//!
//! ```ignore
//! use multipart_stream::{Binder, Progress};
//!
//! let mut binder = Binder::new(request, 0)?;
//! let mut on_progress = |p: Progress| eprintln!("{p:?}");
//! binder.bind(&mut destination, Some(&mut on_progress))?;
//! println!("{:?}", binder.values().get("name"));
//! ```

#![forbid(unsafe_code)]

mod binder;
pub mod config;
pub mod error;
pub mod progress;
mod values;

pub use binder::Binder;
pub use config::{BinderConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_VALUES_SIZE};
pub use error::{BindError, BindResult, ErrorKind};
pub use progress::{NoopListener, Progress, ProgressListener, State};
pub use values::FormValues;

// Re-export the request and reader types callers construct binders from
pub use multipart_stream_core::{
    Body, BodyReader, Headers, Method, MultipartError, ReaderConfig, Request,
};
