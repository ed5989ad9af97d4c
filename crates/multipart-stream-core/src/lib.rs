//! Request types and a blocking multipart/form-data part reader.
//!
//! This crate provides the leaf pieces the streaming binder drives:
//! - [`Request`], [`Headers`] and [`Body`] (buffered or streamed)
//! - [`parse_boundary`] for `multipart/form-data` content types
//! - [`MultipartReader`], a forward-only, single-pass source of [`Part`]s
//! - [`testing::MultipartBuilder`] for synthetic bodies
//!
//! # Design Principles
//!
//! - Blocking pull model over [`std::io::Read`]
//! - Bounded buffering: part bodies are never held whole
//! - Parts are visited once, in wire order

#![forbid(unsafe_code)]

pub mod error;
pub mod multipart;
mod request;
pub mod testing;

pub use error::{MultipartError, MultipartResult};
pub use multipart::{
    DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_HEADERS, DEFAULT_READ_SIZE, MultipartReader, Part,
    PartHeaders, ReaderConfig, parse_boundary,
};
pub use request::{Body, BodyReader, Headers, Method, Request};
