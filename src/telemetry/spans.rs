//! Span utilities and extension traits for session tracing.

use tracing::{info_span, Span};
use uuid::Uuid;

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for `generation_session` spans.
pub struct SessionSpan;

impl SessionSpan {
    /// Fields:
    /// - `session_id`: unique per session
    /// - `max_length`: token ceiling
    /// - `status` / `error.message`: filled by `SpanExt::record_result`
    pub fn new(session_id: &Uuid, max_length: usize) -> Span {
        info_span!(
            "generation_session",
            session_id = %session_id,
            max_length,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
