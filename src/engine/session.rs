//! Generation session state machine.
//!
//! `Created` → `begin` → `Initialized` → `step`* → `Generating` → `Terminal`.
//! A session owns its handles exclusively; every mutating call takes
//! `&mut self`, so the single-writer rule is enforced by the borrow checker
//! (see [`GuardedSession`](super::GuardedSession) for shared ownership).

use std::path::Path;
use std::time::Instant;

use tracing::Span;
use uuid::Uuid;

use super::batch::DecodeBatch;
use super::config::SessionConfig;
use super::error::SessionError;
use super::handles::HandlePair;
use super::sampler::Sampler;
use super::shared::SharedBackend;
use super::text::TextAssembler;
use super::tokenizer::Tokenizer;
use super::{Backend, ContextHandle, TokenId};
use crate::telemetry::{self, SessionSpan, SpanExt};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handles acquired, no prompt yet.
    Created,
    /// Prompt decoded; first token not yet sampled.
    Initialized,
    /// At least one generated token accepted.
    Generating,
    /// End-of-sequence sampled or length ceiling reached.
    Terminal,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The engine's end-of-sequence token was drawn.
    Eos,
    /// The cursor reached `max_length`.
    MaxLength,
}

/// Result of one `step`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// All text so far (prompt included when echoed).
    pub text: String,
    /// Text completed by this step.
    pub delta: String,
    /// Accepted token; `None` on a terminal step.
    pub token: Option<TokenId>,
    pub terminal: bool,
    pub finish: Option<FinishReason>,
}

/// Single-sequence autoregressive generation over one model and context.
pub struct Session<B: Backend> {
    id: Uuid,
    handles: HandlePair<B>,
    batch: DecodeBatch,
    sampler: Sampler,
    max_length: usize,
    echo_prompt: bool,
    state: SessionState,
    finish: Option<FinishReason>,
    cursor: usize,
    decoded_count: usize,
    prompt_len: usize,
    logits_slot: Option<usize>,
    token_history: Vec<TokenId>,
    output_bytes: Vec<u8>,
    completion_start: usize,
    assembler: TextAssembler,
    span: Span,
}

impl<B: Backend> Session<B> {
    /// Lease the backend, load `model_path` and create a context.
    ///
    /// `init` runs only if no other session currently holds the backend.
    pub fn acquire<F>(
        registry: &'static SharedBackend<B>,
        init: F,
        model_path: &Path,
        config: &SessionConfig,
    ) -> Result<Self, SessionError>
    where
        F: FnOnce() -> Result<B, SessionError>,
    {
        config.validate()?;
        let handles = HandlePair::acquire(registry, init, model_path, config)?;
        let id = Uuid::new_v4();
        let span = SessionSpan::new(&id, config.max_length);
        tracing::info!(parent: &span, max_length = config.max_length, "session created");
        Ok(Self {
            id,
            handles,
            batch: DecodeBatch::new(config.max_length),
            sampler: Sampler::new(config.sampling.clone(), config.context.seed),
            max_length: config.max_length,
            echo_prompt: config.echo_prompt,
            state: SessionState::Created,
            finish: None,
            cursor: 0,
            decoded_count: 0,
            prompt_len: 0,
            logits_slot: None,
            token_history: Vec::new(),
            output_bytes: Vec::new(),
            completion_start: 0,
            assembler: TextAssembler::new(),
            span,
        })
    }

    /// Tokenize and decode the prompt. Valid only in `Created`.
    ///
    /// `ContextOverflow` and `EmptyPrompt` leave the session in `Created`
    /// so a shorter input can be retried.
    pub fn begin(&mut self, text: &str) -> Result<(), SessionError> {
        let span = self.span.clone();
        let _enter = span.enter();
        let result = self.begin_inner(text);
        span.record_result(&result);
        result
    }

    fn begin_inner(&mut self, text: &str) -> Result<(), SessionError> {
        if self.handles.is_released() {
            return Err(SessionError::Released);
        }
        if self.state != SessionState::Created {
            return Err(SessionError::InvalidState(format!(
                "begin called in state {:?}",
                self.state
            )));
        }
        let (model, context) = self.handles.split_mut()?;
        let tokens = Tokenizer::new(model).encode(text, true)?;
        if tokens.is_empty() {
            return Err(SessionError::EmptyPrompt);
        }
        if tokens.len() > self.max_length {
            tracing::warn!(max = self.max_length, got = tokens.len(), "prompt exceeds max_length");
            return Err(SessionError::ContextOverflow { max: self.max_length, got: tokens.len() });
        }
        self.batch.fill_prompt(&tokens)?;
        if let Err(e) = self.batch.submit(context) {
            self.batch.reset();
            context.clear_cache();
            telemetry::record_decode_failure();
            return Err(e);
        }

        self.logits_slot = self.batch.last_logits_index();
        self.cursor = tokens.len();
        self.prompt_len = tokens.len();
        telemetry::record_prompt_tokens(tokens.len());
        tracing::debug!(prompt_tokens = tokens.len(), "prompt decoded");
        self.token_history = tokens;
        if self.echo_prompt {
            self.output_bytes.extend_from_slice(text.as_bytes());
            self.assembler.push(text.as_bytes());
        }
        self.completion_start = self.output_bytes.len();
        self.state = SessionState::Initialized;
        Ok(())
    }

    /// Sample the next token and feed it back to the engine.
    ///
    /// A terminal step returns the accumulated text without decoding and
    /// without advancing `cursor` or `decoded_count`. A failed step leaves
    /// counters, history and output untouched.
    pub fn step(&mut self) -> Result<StepOutput, SessionError> {
        let span = self.span.clone();
        let _enter = span.enter();
        let started = Instant::now();
        let result = self.step_inner();
        if let Ok(out) = &result {
            if !out.terminal {
                telemetry::record_step_latency(started.elapsed());
            }
        }
        span.record_result(&result);
        result
    }

    fn step_inner(&mut self) -> Result<StepOutput, SessionError> {
        if self.handles.is_released() {
            return Err(SessionError::Released);
        }
        match self.state {
            SessionState::Created => {
                return Err(SessionError::InvalidState("step called before begin".into()));
            }
            SessionState::Terminal => return Ok(self.terminal_output(String::new())),
            SessionState::Initialized | SessionState::Generating => {}
        }

        let slot = self
            .logits_slot
            .ok_or_else(|| SessionError::InvalidState("no slot requested logits".into()))?;
        let (model, context) = self.handles.split_mut()?;
        let logits = context
            .logits_ith(slot)
            .ok_or_else(|| SessionError::Sampling(format!("no logits for slot {slot}")))?;
        let checkpoint = self.sampler.checkpoint();
        let token = self.sampler.sample(logits, &self.token_history)?;

        let finish = if token == context.eos_token() {
            Some(FinishReason::Eos)
        } else if self.cursor >= self.max_length {
            Some(FinishReason::MaxLength)
        } else {
            None
        };
        if let Some(reason) = finish {
            self.state = SessionState::Terminal;
            self.finish = Some(reason);
            let delta = self.assembler.finish().to_string();
            telemetry::record_finish(reason);
            tracing::info!(?reason, decoded = self.decoded_count, cursor = self.cursor, "generation finished");
            return Ok(self.terminal_output(delta));
        }

        // Nothing below commits until the decode succeeds, the RNG included.
        let piece = match Tokenizer::new(model).decode_one(token) {
            Ok(piece) => piece,
            Err(e) => {
                self.sampler.restore(checkpoint);
                return Err(e);
            }
        };
        let submitted = self
            .batch
            .fill_single(token, self.cursor)
            .and_then(|()| self.batch.submit(context));
        if let Err(e) = submitted {
            self.batch.reset();
            self.sampler.restore(checkpoint);
            telemetry::record_decode_failure();
            return Err(e);
        }

        self.logits_slot = self.batch.last_logits_index();
        self.token_history.push(token);
        self.output_bytes.extend_from_slice(&piece);
        let delta = self.assembler.push(&piece).to_string();
        self.cursor += 1;
        self.decoded_count += 1;
        self.state = SessionState::Generating;
        telemetry::record_token();
        tracing::trace!(token, cursor = self.cursor, "token accepted");

        Ok(StepOutput {
            text: self.assembler.text().to_string(),
            delta,
            token: Some(token),
            terminal: false,
            finish: None,
        })
    }

    fn terminal_output(&self, delta: String) -> StepOutput {
        StepOutput {
            text: self.assembler.text().to_string(),
            delta,
            token: None,
            terminal: true,
            finish: self.finish,
        }
    }

    /// Forget the prompt and everything generated; handles are kept.
    ///
    /// Token history, output bytes, cursor and step count are reset and
    /// the engine cache for sequence 0 is cleared, so `begin` may be
    /// called again.
    pub fn clear(&mut self) {
        self.token_history.clear();
        self.output_bytes.clear();
        self.assembler = TextAssembler::new();
        self.cursor = 0;
        self.decoded_count = 0;
        self.prompt_len = 0;
        self.completion_start = 0;
        self.logits_slot = None;
        self.finish = None;
        self.batch.reset();
        if let Ok((_, context)) = self.handles.split_mut() {
            context.clear_cache();
        }
        self.state = SessionState::Created;
        tracing::debug!(parent: &self.span, "session cleared");
    }

    /// Free context, model and backend lease. Safe to call repeatedly.
    ///
    /// Returns `false` if the handles were already released.
    pub fn release(&mut self) -> bool {
        let released = self.handles.release();
        if released {
            tracing::info!(parent: &self.span, decoded = self.decoded_count, "session released");
        }
        released
    }

    /// Reseed the sampling draw.
    pub fn reseed(&mut self, seed: u64) {
        self.sampler.reseed(seed);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish
    }

    pub fn is_terminal(&self) -> bool {
        self.state == SessionState::Terminal
    }

    pub fn is_released(&self) -> bool {
        self.handles.is_released()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn decoded_count(&self) -> usize {
        self.decoded_count
    }

    pub fn prompt_len(&self) -> usize {
        self.prompt_len
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Prompt tokens followed by accepted tokens.
    pub fn tokens(&self) -> &[TokenId] {
        &self.token_history
    }

    pub fn output_bytes(&self) -> &[u8] {
        &self.output_bytes
    }

    /// Bytes produced by generation only.
    pub fn completion_bytes(&self) -> &[u8] {
        &self.output_bytes[self.completion_start..]
    }

    /// Complete characters decoded so far.
    pub fn text(&self) -> &str {
        self.assembler.text()
    }

    pub fn handles(&self) -> &HandlePair<B> {
        &self.handles
    }
}
