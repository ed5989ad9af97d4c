//! Upload progress notifications.
//!
//! Progress is advisory: the binder reports it but never reads it back, and
//! a listener has no way to influence the copy.

use serde::Serialize;

/// Stage of a file part copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Streaming,
    Completed,
}

/// One progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub state: State,
    /// Bytes of the current file part written so far.
    pub bytes_streamed: u64,
}

impl Progress {
    #[must_use]
    pub fn streaming(bytes_streamed: u64) -> Self {
        Self {
            state: State::Streaming,
            bytes_streamed,
        }
    }

    #[must_use]
    pub fn completed(bytes_streamed: u64) -> Self {
        Self {
            state: State::Completed,
            bytes_streamed,
        }
    }
}

/// Receives progress while file parts are copied.
pub trait ProgressListener {
    fn on_progress(&mut self, progress: Progress);
}

impl<F: FnMut(Progress)> ProgressListener for F {
    fn on_progress(&mut self, progress: Progress) {
        self(progress);
    }
}

/// Listener that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl ProgressListener for NoopListener {
    fn on_progress(&mut self, _progress: Progress) {}
}
