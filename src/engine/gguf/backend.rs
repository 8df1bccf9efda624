//! llama-cpp-2 backend for GGUF inference.
//!
//! Model loading, context creation, tokenization, and decode via the
//! llama-cpp-2 Rust bindings. Sampling stays on our side of the boundary;
//! only raw logits rows are read back.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::token::LlamaToken;
use llama_cpp_2::{DecodeError, TokenToStringError};

use crate::engine::batch::SEQUENCE_ID;
use crate::engine::{
    Backend, BufferError, ContextHandle, ContextOptions, DecodeBatch, ModelHandle, ModelOptions,
    SessionError, TokenId,
};

/// Process-wide llama.cpp runtime.
pub struct LlamaCppBackend {
    backend: LlamaBackend,
}

impl LlamaCppBackend {
    /// Initialize llama.cpp. Fails if another instance is live.
    pub fn init() -> Result<Self, SessionError> {
        let backend = LlamaBackend::init().map_err(|e| SessionError::Load(format!("backend init: {e}")))?;
        tracing::info!("llama.cpp backend initialized");
        Ok(Self { backend })
    }
}

impl Backend for LlamaCppBackend {
    type Model = GgufModel;
    type Context = GgufContext;

    fn load_model(&self, path: &Path, options: &ModelOptions) -> Result<GgufModel, SessionError> {
        let params = LlamaModelParams::default().with_n_gpu_layers(options.n_gpu_layers);
        let model = LlamaModel::load_from_file(&self.backend, path, &params)
            .map_err(|e| SessionError::Load(format!("{}: {e}", path.display())))?;
        let n_vocab = usize::try_from(model.n_vocab()).unwrap_or(0);
        tracing::debug!(n_vocab, size = model.size(), "gguf model loaded");
        Ok(GgufModel { inner: Arc::new(model), n_vocab })
    }

    fn new_context(&self, model: &GgufModel, options: &ContextOptions) -> Result<GgufContext, SessionError> {
        let params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(options.n_ctx))
            .with_n_threads(options.resolved_threads())
            .with_n_threads_batch(options.resolved_threads_batch());
        let ctx = model
            .inner
            .new_context(&self.backend, params)
            .map_err(|e| SessionError::Context(format!("ctx: {e}")))?;
        // SAFETY: the context keeps its own `Arc` to the model and drops it
        // after `inner`, so the borrowed model outlives the context no matter
        // when the caller drops its `GgufModel`.
        let ctx = unsafe { std::mem::transmute::<LlamaContext<'_>, LlamaContext<'static>>(ctx) };
        Ok(GgufContext {
            inner: ctx,
            _model: Arc::clone(&model.inner),
            batch: None,
            batch_capacity: 0,
            logits_slot: None,
            eos: model.inner.token_eos(),
        })
    }
}

/// Loaded GGUF weights and vocabulary.
pub struct GgufModel {
    inner: Arc<LlamaModel>,
    n_vocab: usize,
}

impl GgufModel {
    fn check_token(&self, token: TokenId) -> Result<LlamaToken, BufferError> {
        if token as usize >= self.n_vocab {
            return Err(BufferError::Engine(format!("token {token} outside vocabulary of {}", self.n_vocab)));
        }
        Ok(LlamaToken(token as i32))
    }
}

impl ModelHandle for GgufModel {
    fn n_vocab(&self) -> usize {
        self.n_vocab
    }

    fn tokenize(&self, text: &str, add_bos: bool, out: &mut [TokenId]) -> Result<usize, BufferError> {
        let bos = if add_bos { AddBos::Always } else { AddBos::Never };
        let tokens = self
            .inner
            .str_to_token(text, bos)
            .map_err(|e| BufferError::Engine(format!("tokenize: {e}")))?;
        if tokens.len() > out.len() {
            return Err(BufferError::TooSmall { required: tokens.len() });
        }
        for (slot, token) in out.iter_mut().zip(&tokens) {
            *slot = token.0 as TokenId;
        }
        Ok(tokens.len())
    }

    fn token_to_piece(&self, token: TokenId, out: &mut [u8]) -> Result<usize, BufferError> {
        let token = self.check_token(token)?;
        match self.inner.token_to_bytes_with_size(token, out.len(), Special::Tokenize, None) {
            Ok(bytes) if bytes.len() <= out.len() => {
                out[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Ok(bytes) => Err(BufferError::TooSmall { required: bytes.len() }),
            Err(TokenToStringError::InsufficientBufferSpace(n)) => {
                Err(BufferError::TooSmall { required: n.unsigned_abs() as usize })
            }
            Err(e) => Err(BufferError::Engine(format!("piece: {e}"))),
        }
    }
}

/// llama.cpp context plus the native batch it is fed from.
///
/// Field order matters: `inner` borrows from `_model` and is dropped first.
pub struct GgufContext {
    inner: LlamaContext<'static>,
    _model: Arc<LlamaModel>,
    batch: Option<LlamaBatch>,
    batch_capacity: usize,
    logits_slot: Option<usize>,
    eos: LlamaToken,
}

// SAFETY: a context is driven by one owner at a time; `Session` requires
// `&mut self` for every call that reaches it.
unsafe impl Send for GgufContext {}

fn fill_native(native: &mut LlamaBatch, batch: &DecodeBatch) -> Result<(), i32> {
    native.clear();
    for ((&token, &pos), &logits) in batch.tokens().iter().zip(batch.positions()).zip(batch.logits()) {
        native
            .add(LlamaToken(token as i32), pos, &[SEQUENCE_ID], logits)
            .map_err(|e| {
                tracing::warn!(error = %e, "native batch rejected slot");
                -1
            })?;
    }
    Ok(())
}

/// Readable logits slot once a decode with `status` has returned.
fn logits_slot_after(previous: Option<usize>, status: i32, batch: &DecodeBatch) -> Option<usize> {
    if status == 0 {
        batch.last_logits_index()
    } else {
        previous
    }
}

impl ContextHandle for GgufContext {
    fn n_ctx(&self) -> u32 {
        self.inner.n_ctx()
    }

    /// A failed decode keeps the logits of the last successful one.
    fn decode(&mut self, batch: &DecodeBatch) -> i32 {
        let mut native = match self.batch.take() {
            Some(native) if self.batch_capacity >= batch.capacity() => native,
            _ => {
                self.batch_capacity = batch.capacity().max(1);
                LlamaBatch::new(self.batch_capacity, 1)
            }
        };
        let status = match fill_native(&mut native, batch) {
            Err(status) => status,
            Ok(()) => match self.inner.decode(&mut native) {
                Ok(()) => 0,
                Err(DecodeError::NoKvCacheSlot) => 1,
                Err(DecodeError::NTokensZero) => -1,
                Err(DecodeError::Unknown(code)) => code,
            },
        };
        self.batch = Some(native);
        self.logits_slot = logits_slot_after(self.logits_slot, status, batch);
        status
    }

    fn logits_ith(&self, slot: usize) -> Option<&[f32]> {
        (self.logits_slot == Some(slot)).then(|| self.inner.get_logits_ith(slot as i32))
    }

    fn eos_token(&self) -> TokenId {
        self.eos.0 as TokenId
    }

    fn clear_cache(&mut self) {
        self.inner.clear_kv_cache();
        self.logits_slot = None;
    }
}
