//! Session error types.
//!
//! Construction errors are fatal: no session exists to recover into.
//! `ContextOverflow` and `EmptyPrompt` leave the session resumable.

use thiserror::Error;

use super::TokenId;

/// Errors that can occur while acquiring or driving a generation session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to load model: {0}")]
    Load(String),

    #[error("Failed to create context: {0}")]
    Context(String),

    #[error("Context length exceeded: max {max}, got {got}")]
    ContextOverflow { max: usize, got: usize },

    #[error("Prompt produced no tokens")]
    EmptyPrompt,

    #[error("Decode batch full: capacity {capacity}")]
    BatchFull { capacity: usize },

    #[error("Engine decode failed with status {status}")]
    DecodeFailed { status: i32 },

    #[error("Token {token} piece needs {required} bytes after retry")]
    DecodeOverflow { token: TokenId, required: usize },

    #[error("Tokenization failed: {0}")]
    Tokenize(String),

    #[error("Sampling failed: {0}")]
    Sampling(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Session handles already released")]
    Released,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    /// Returns true if the caller may retry with different input on the same session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ContextOverflow { .. } | Self::EmptyPrompt)
    }

    /// Returns true if this error can only come from construction.
    pub fn is_construction(&self) -> bool {
        matches!(self, Self::Load(_) | Self::Context(_) | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_and_empty_prompt_are_recoverable() {
        assert!(SessionError::ContextOverflow { max: 4, got: 9 }.is_recoverable());
        assert!(SessionError::EmptyPrompt.is_recoverable());
        assert!(!SessionError::DecodeFailed { status: 1 }.is_recoverable());
        assert!(!SessionError::BatchFull { capacity: 1 }.is_recoverable());
    }

    #[test]
    fn construction_errors_are_classified() {
        assert!(SessionError::Load("x".into()).is_construction());
        assert!(SessionError::Context("x".into()).is_construction());
        assert!(!SessionError::Released.is_construction());
    }

    #[test]
    fn overflow_message_names_both_lengths() {
        let msg = SessionError::ContextOverflow { max: 5, got: 7 }.to_string();
        assert_eq!(msg, "Context length exceeded: max 5, got 7");
    }
}
