//! Engine boundary and generation session for GG-SESSION.
//!
//! The inference engine (kernels, weights, KV cache) is an external
//! collaborator reached through the [`Backend`], [`ModelHandle`] and
//! [`ContextHandle`] traits. Everything above that boundary lives here:
//! handle lifecycle, tokenization, the decode batch, sampling and the
//! session state machine.

pub mod batch;
pub mod config;
pub mod error;
pub mod gguf;
pub mod guarded;
pub mod handles;
pub mod sampler;
pub mod session;
pub mod shared;
pub mod streaming;
pub mod stub;
pub mod text;
pub mod tokenizer;

use std::path::Path;

use thiserror::Error;

pub use batch::DecodeBatch;
pub use config::{ContextOptions, ModelOptions, SamplingConfig, SessionConfig};
pub use error::SessionError;
pub use guarded::GuardedSession;
pub use handles::HandlePair;
pub use sampler::{Candidate, CandidateSet, Sampler};
pub use session::{FinishReason, Session, SessionState, StepOutput};
pub use shared::{BackendLease, SharedBackend};
pub use streaming::{stream, StreamEvent, TextStream};
pub use stub::{StubBackend, StubContext, StubModel, StubProbe, StubScript};
pub use text::TextAssembler;
pub use tokenizer::Tokenizer;

/// Vocabulary id understood only by the engine.
pub type TokenId = u32;

/// Engine failure while writing into a caller-provided buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Output did not fit; the engine reports the size it needs.
    #[error("buffer too small: {required} required")]
    TooSmall { required: usize },

    #[error("engine error: {0}")]
    Engine(String),
}

/// A process-wide inference backend that owns model loading.
///
/// Only one instance is live at a time; see [`SharedBackend`].
pub trait Backend: Send + Sync + 'static {
    type Model: ModelHandle;
    type Context: ContextHandle;

    /// Load a model file. Fails with [`SessionError::Load`].
    fn load_model(&self, path: &Path, options: &ModelOptions)
        -> Result<Self::Model, SessionError>;

    /// Create an inference context over a loaded model.
    /// Fails with [`SessionError::Context`].
    ///
    /// The returned context may borrow from `model`; callers must drop it first.
    fn new_context(
        &self,
        model: &Self::Model,
        options: &ContextOptions,
    ) -> Result<Self::Context, SessionError>;
}

/// Loaded model weights and vocabulary.
pub trait ModelHandle {
    /// Vocabulary size; every logits row has this length.
    fn n_vocab(&self) -> usize;

    /// Tokenize `text` into `out`, returning the number of tokens written.
    fn tokenize(
        &self,
        text: &str,
        add_bos: bool,
        out: &mut [TokenId],
    ) -> Result<usize, BufferError>;

    /// Write the raw bytes of `token` into `out`, returning the byte count.
    fn token_to_piece(&self, token: TokenId, out: &mut [u8]) -> Result<usize, BufferError>;
}

/// Inference context: KV cache plus decode state.
pub trait ContextHandle {
    /// Context window in tokens.
    fn n_ctx(&self) -> u32;

    /// Process the active slots of `batch`. Returns the engine status (0 = success).
    fn decode(&mut self, batch: &DecodeBatch) -> i32;

    /// Logits row for batch slot `slot`, if that slot requested logits in the last decode.
    fn logits_ith(&self, slot: usize) -> Option<&[f32]>;

    /// End-of-sequence token id.
    fn eos_token(&self) -> TokenId;

    /// Drop all cached positions for sequence 0.
    fn clear_cache(&mut self);
}
