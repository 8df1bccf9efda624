//! GGUF models through llama.cpp.
//!
//! Compiled with the `gguf` feature.

#[cfg(feature = "gguf")]
mod backend;

#[cfg(feature = "gguf")]
pub use backend::{GgufContext, GgufModel, LlamaCppBackend};

#[cfg(feature = "gguf")]
use std::path::Path;

#[cfg(feature = "gguf")]
use crate::engine::{SessionConfig, SessionError, Session, SharedBackend};

/// The one llama.cpp runtime for this process.
#[cfg(feature = "gguf")]
pub static BACKEND: SharedBackend<LlamaCppBackend> = SharedBackend::new();

/// Open a session over the GGUF file at `path`.
///
/// The llama.cpp runtime is initialized on first use and torn down when the
/// last session releases.
#[cfg(feature = "gguf")]
pub fn open(path: &Path, config: &SessionConfig) -> Result<Session<LlamaCppBackend>, SessionError> {
    Session::acquire(&BACKEND, LlamaCppBackend::init, path, config)
}

/// Whether this build can load GGUF files.
pub const fn available() -> bool {
    cfg!(feature = "gguf")
}
