//! gg-session
//!
//! Single-sequence autoregressive text generation over an external LLM
//! engine. The crate owns the session lifecycle above the engine boundary:
//! model and context handles, tokenization, the decode batch, the sampling
//! pipeline and incremental text assembly. Kernels, weights and the KV cache
//! stay inside the engine.
//!
//! # Lifecycle
//!
//! 1. [`Session::acquire`](engine::Session::acquire) leases the process-wide
//!    backend, loads a model and creates a context.
//! 2. [`begin`](engine::Session::begin) tokenizes and decodes the prompt.
//! 3. [`step`](engine::Session::step) samples one token, reports the text
//!    delta and feeds the token back, until end-of-sequence or `max_length`.
//! 4. [`release`](engine::Session::release) frees context, model and lease.
//!
//! GGUF models are served through llama.cpp with the `gguf` feature; the
//! [`StubBackend`](engine::StubBackend) is a deterministic byte-level engine
//! for tests and dry runs.

pub mod cli;
pub mod config;
pub mod engine;
pub mod telemetry;

pub use config::{ConfigError, EffectiveConfig, EnvConfig};
pub use engine::{
    FinishReason, GuardedSession, SamplingConfig, Session, SessionConfig, SessionError,
    SessionState, StepOutput,
};
