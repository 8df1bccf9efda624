//! Deterministic in-process backend.
//!
//! Byte-level vocabulary: ids `0..256` are single bytes, followed by the
//! BOS and EOS markers and any extra multi-byte words. Logits follow a
//! script of token ids, one per decode, then EOS. Used by tests, benches
//! and `gg-session-cli generate --stub`.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::batch::DecodeBatch;
use super::config::{ContextOptions, ModelOptions};
use super::error::SessionError;
use super::{Backend, BufferError, ContextHandle, ModelHandle, TokenId};

/// Logit given to the scripted token; every other id gets 0.
const SCRIPTED_LOGIT: f32 = 20.0;

/// Behaviour of a [`StubBackend`].
#[derive(Debug, Clone, Default)]
pub struct StubScript {
    /// Token favoured after the n-th decode; EOS once exhausted.
    pub tokens: Vec<TokenId>,
    /// Extra vocabulary entries with ids from `StubBackend::FIRST_WORD`.
    pub words: Vec<Vec<u8>>,
    pub fail_load: bool,
    pub fail_context: bool,
    /// Zero-based decode call that returns status 1.
    pub fail_decode_at: Option<usize>,
    /// Report this window instead of `ContextOptions::n_ctx`.
    pub n_ctx: Option<u32>,
    /// Return an all-zero row after every decode instead of following `tokens`.
    pub flat_logits: bool,
}

impl StubScript {
    /// Script that emits the bytes of `text` one token each.
    pub fn bytes(text: &str) -> Self {
        Self {
            tokens: text.bytes().map(TokenId::from).collect(),
            ..Default::default()
        }
    }
}

/// Shared observation point for everything a stub backend does.
#[derive(Debug, Default)]
pub struct StubProbe {
    models_live: AtomicUsize,
    contexts_live: AtomicUsize,
    decode_calls: AtomicUsize,
    cache_clears: AtomicUsize,
    drops: Mutex<Vec<&'static str>>,
    batches: Mutex<Vec<Vec<(TokenId, i32, bool)>>>,
    logits_reads: Mutex<Vec<usize>>,
}

impl StubProbe {
    pub fn models_live(&self) -> usize {
        self.models_live.load(Ordering::SeqCst)
    }

    pub fn contexts_live(&self) -> usize {
        self.contexts_live.load(Ordering::SeqCst)
    }

    pub fn decode_calls(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }

    pub fn cache_clears(&self) -> usize {
        self.cache_clears.load(Ordering::SeqCst)
    }

    /// Drop order of `"context"`, `"model"` and `"backend"`.
    pub fn drops(&self) -> Vec<&'static str> {
        self.drops.lock().clone()
    }

    /// Every submitted batch as `(token, position, wants_logits)` slots.
    pub fn batches(&self) -> Vec<Vec<(TokenId, i32, bool)>> {
        self.batches.lock().clone()
    }

    /// Slot indices passed to `logits_ith`.
    pub fn logits_reads(&self) -> Vec<usize> {
        self.logits_reads.lock().clone()
    }

    fn record_drop(&self, what: &'static str) {
        self.drops.lock().push(what);
    }
}

/// Backend whose models speak the byte vocabulary.
pub struct StubBackend {
    script: Arc<StubScript>,
    probe: Arc<StubProbe>,
}

impl StubBackend {
    pub const BOS: TokenId = 256;
    pub const EOS: TokenId = 257;
    pub const FIRST_WORD: TokenId = 258;

    pub fn new(script: StubScript) -> Self {
        Self {
            script: Arc::new(script),
            probe: Arc::new(StubProbe::default()),
        }
    }

    pub fn probe(&self) -> Arc<StubProbe> {
        Arc::clone(&self.probe)
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.probe.record_drop("backend");
    }
}

impl Backend for StubBackend {
    type Model = StubModel;
    type Context = StubContext;

    fn load_model(&self, path: &Path, _options: &ModelOptions) -> Result<StubModel, SessionError> {
        if self.script.fail_load {
            return Err(SessionError::Load(format!("stub refused {}", path.display())));
        }
        self.probe.models_live.fetch_add(1, Ordering::SeqCst);
        Ok(StubModel {
            script: Arc::clone(&self.script),
            probe: Arc::clone(&self.probe),
        })
    }

    fn new_context(&self, model: &StubModel, options: &ContextOptions) -> Result<StubContext, SessionError> {
        if self.script.fail_context {
            return Err(SessionError::Context("stub context refused".into()));
        }
        self.probe.contexts_live.fetch_add(1, Ordering::SeqCst);
        Ok(StubContext {
            script: Arc::clone(&self.script),
            probe: Arc::clone(&self.probe),
            n_ctx: self.script.n_ctx.unwrap_or(options.n_ctx),
            n_vocab: model.n_vocab(),
            decodes_since_clear: 0,
            logits_slot: None,
            row: Vec::new(),
        })
    }
}

pub struct StubModel {
    script: Arc<StubScript>,
    probe: Arc<StubProbe>,
}

impl Drop for StubModel {
    fn drop(&mut self) {
        self.probe.models_live.fetch_sub(1, Ordering::SeqCst);
        self.probe.record_drop("model");
    }
}

impl ModelHandle for StubModel {
    fn n_vocab(&self) -> usize {
        StubBackend::FIRST_WORD as usize + self.script.words.len()
    }

    fn tokenize(&self, text: &str, add_bos: bool, out: &mut [TokenId]) -> Result<usize, BufferError> {
        let required = text.len() + usize::from(add_bos);
        if required > out.len() {
            return Err(BufferError::TooSmall { required });
        }
        let ids = std::iter::once(StubBackend::BOS)
            .filter(|_| add_bos)
            .chain(text.bytes().map(TokenId::from));
        for (slot, id) in out.iter_mut().zip(ids) {
            *slot = id;
        }
        Ok(required)
    }

    fn token_to_piece(&self, token: TokenId, out: &mut [u8]) -> Result<usize, BufferError> {
        let byte = [token as u8];
        let piece: &[u8] = match token {
            0..=255 => &byte,
            StubBackend::BOS | StubBackend::EOS => &[],
            _ => self
                .script
                .words
                .get((token - StubBackend::FIRST_WORD) as usize)
                .map(Vec::as_slice)
                .ok_or_else(|| BufferError::Engine(format!("unknown token {token}")))?,
        };
        if piece.len() > out.len() {
            return Err(BufferError::TooSmall { required: piece.len() });
        }
        out[..piece.len()].copy_from_slice(piece);
        Ok(piece.len())
    }
}

pub struct StubContext {
    script: Arc<StubScript>,
    probe: Arc<StubProbe>,
    n_ctx: u32,
    n_vocab: usize,
    decodes_since_clear: usize,
    logits_slot: Option<usize>,
    row: Vec<f32>,
}

impl Drop for StubContext {
    fn drop(&mut self) {
        self.probe.contexts_live.fetch_sub(1, Ordering::SeqCst);
        self.probe.record_drop("context");
    }
}

impl ContextHandle for StubContext {
    fn n_ctx(&self) -> u32 {
        self.n_ctx
    }

    fn decode(&mut self, batch: &DecodeBatch) -> i32 {
        let call = self.probe.decode_calls.fetch_add(1, Ordering::SeqCst);
        let slots = batch
            .tokens()
            .iter()
            .zip(batch.positions())
            .zip(batch.logits())
            .map(|((&t, &p), &l)| (t, p, l))
            .collect();
        self.probe.batches.lock().push(slots);
        if self.script.fail_decode_at == Some(call) {
            return 1;
        }
        if batch.is_empty() {
            return -1;
        }

        let step = self.decodes_since_clear;
        self.decodes_since_clear += 1;
        let target = self
            .script
            .tokens
            .get(step)
            .copied()
            .filter(|&t| (t as usize) < self.n_vocab)
            .unwrap_or(StubBackend::EOS);
        self.row = vec![0.0; self.n_vocab];
        if !self.script.flat_logits {
            self.row[target as usize] = SCRIPTED_LOGIT;
        }
        self.logits_slot = batch.last_logits_index();
        0
    }

    fn logits_ith(&self, slot: usize) -> Option<&[f32]> {
        self.probe.logits_reads.lock().push(slot);
        (self.logits_slot == Some(slot)).then_some(self.row.as_slice())
    }

    fn eos_token(&self) -> TokenId {
        StubBackend::EOS
    }

    fn clear_cache(&mut self) {
        self.probe.cache_clears.fetch_add(1, Ordering::SeqCst);
        self.decodes_since_clear = 0;
        self.logits_slot = None;
        self.row.clear();
    }
}
