//! Session configuration types.
//!
//! All fields have safe defaults. Configuration is validated before use.

use serde::{Deserialize, Serialize};

use super::error::SessionError;

/// Options applied when the engine loads a model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Number of layers to offload to GPU (0 = CPU only).
    pub n_gpu_layers: u32,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self { n_gpu_layers: 0 }
    }
}

/// Options applied when the engine creates an inference context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Seed for the sampling draw.
    pub seed: u64,
    /// Context window in tokens.
    pub n_ctx: u32,
    /// Threads used for single-token decode (0 = auto).
    pub n_threads: u32,
    /// Threads used for prompt batch decode (0 = auto).
    pub n_threads_batch: u32,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            seed: 1234,
            n_ctx: 2048,
            n_threads: 8,
            n_threads_batch: 8,
        }
    }
}

impl ContextOptions {
    /// Decode thread count with `0` resolved to the detected core count.
    pub fn resolved_threads(&self) -> i32 {
        resolve_threads(self.n_threads)
    }

    /// Batch thread count with `0` resolved to the detected core count.
    pub fn resolved_threads_batch(&self) -> i32 {
        resolve_threads(self.n_threads_batch)
    }
}

/// Smallest non-zero temperature; below it scaled logits overflow to infinity.
pub const MIN_TEMPERATURE: f32 = 1e-3;

/// Sampling pipeline parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Top-k limit (0 = disabled)
    pub top_k: u32,
    /// Nucleus threshold in (0.0, 1.0]
    pub top_p: f32,
    /// Min-p threshold relative to the most probable candidate
    pub min_p: f32,
    /// Temperature (0.0 = greedy)
    pub temperature: f32,
    /// Repetition penalty (1.0 = none)
    pub repeat_penalty: f32,
    /// Number of most recent history tokens the penalty looks at
    pub penalty_last_n: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            top_k: 40,
            top_p: 0.95,
            min_p: 0.05,
            temperature: 0.8,
            repeat_penalty: 1.0,
            penalty_last_n: 64,
        }
    }
}

impl SamplingConfig {
    /// Deterministic configuration: top-k of 1 and greedy selection.
    pub fn greedy() -> Self {
        Self {
            top_k: 1,
            temperature: 0.0,
            ..Self::default()
        }
    }

    /// Validate configuration values. Returns error on invalid values.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.temperature != 0.0 && !(MIN_TEMPERATURE..=2.0).contains(&self.temperature) {
            return Err(SessionError::Config(format!(
                "temperature must be 0.0 or between {MIN_TEMPERATURE} and 2.0"
            )));
        }
        if self.top_p <= 0.0 || self.top_p > 1.0 || self.top_p.is_nan() {
            return Err(SessionError::Config(
                "top_p must be in range (0.0, 1.0]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_p) {
            return Err(SessionError::Config(
                "min_p must be in range [0.0, 1.0]".into(),
            ));
        }
        if self.repeat_penalty < 1.0 || self.repeat_penalty.is_nan() {
            return Err(SessionError::Config(
                "repeat_penalty must be >= 1.0".into(),
            ));
        }
        Ok(())
    }
}

/// Everything needed to acquire a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Generation ceiling: prompt plus generated tokens.
    pub max_length: usize,
    /// Seed the output buffer with the prompt text.
    pub echo_prompt: bool,
    pub model: ModelOptions,
    pub context: ContextOptions,
    pub sampling: SamplingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_length: 2048,
            echo_prompt: true,
            model: ModelOptions::default(),
            context: ContextOptions::default(),
            sampling: SamplingConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Validate configuration values. Returns error on invalid values.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.max_length == 0 {
            return Err(SessionError::Config("max_length must be > 0".into()));
        }
        if self.context.n_ctx == 0 {
            return Err(SessionError::Config("n_ctx must be > 0".into()));
        }
        if self.max_length > self.context.n_ctx as usize {
            return Err(SessionError::Config(format!(
                "max_length {} exceeds n_ctx {}",
                self.max_length, self.context.n_ctx
            )));
        }
        self.sampling.validate()
    }
}

fn resolve_threads(n: u32) -> i32 {
    if n == 0 {
        // Cap at 16 to avoid diminishing returns on high-core systems
        let optimal = num_cpus::get().clamp(1, 16);
        i32::try_from(optimal).unwrap_or(4)
    } else {
        i32::try_from(n).unwrap_or(4)
    }
}
