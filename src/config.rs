//! Runtime configuration loading from environment variables and TOML files.
//!
//! All configuration values are loaded from `GG_SESSION_*` environment
//! variables with sensible defaults. Invalid values fall back to defaults
//! without crashing; out-of-range values are clamped.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `GG_SESSION_MAX_LENGTH` | 2048 | Token ceiling (prompt + generated) |
//! | `GG_SESSION_SEED` | 1234 | Sampling seed |
//! | `GG_SESSION_N_CTX` | 2048 | Context window size |
//! | `GG_SESSION_N_THREADS` | 8 | Inference threads (0 = auto) |
//! | `GG_SESSION_N_THREADS_BATCH` | 8 | Prompt-batch threads (0 = auto) |
//! | `GG_SESSION_N_GPU_LAYERS` | 0 | Layers offloaded to GPU |
//! | `GG_SESSION_TOP_K` | 40 | Top-k (0 = disabled) |
//! | `GG_SESSION_TOP_P` | 0.95 | Nucleus mass |
//! | `GG_SESSION_MIN_P` | 0.05 | Min-p ratio |
//! | `GG_SESSION_TEMPERATURE` | 0.8 | Temperature (0 = greedy) |
//! | `GG_SESSION_REPEAT_PENALTY` | 1.0 | Repetition penalty (1 = off) |
//! | `GG_SESSION_PENALTY_LAST_N` | 64 | Penalty window (tokens) |
//! | `GG_SESSION_LOG_LEVEL` | info | Log filter directive |
//! | `GG_SESSION_LOG_FORMAT` | pretty | `json` or `pretty` |
//! | `GG_SESSION_LOG_FILE` | unset | Log file path (stderr when unset) |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::config::MIN_TEMPERATURE;
use crate::engine::{SessionConfig, SessionError};
use crate::telemetry::{LogConfig, LogFormat};

/// Upper clamp for `max_length` and `n_ctx`.
const MAX_TOKENS: usize = 1_048_576;

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub max_length: usize,
    pub echo_prompt: bool,
    pub seed: u64,
    pub n_ctx: u32,
    pub n_threads: u32,
    pub n_threads_batch: u32,
    pub n_gpu_layers: u32,
    pub top_k: u32,
    pub top_p: f32,
    pub min_p: f32,
    pub temperature: f32,
    pub repeat_penalty: f32,
    pub penalty_last_n: usize,
    pub log_level: String,
    pub log_format: &'static str,
    pub log_file: Option<PathBuf>,
}

/// Everything a binary needs to start a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    #[serde(flatten)]
    pub session: SessionConfig,
    pub log: LogConfig,
}

/// Errors from reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] SessionError),
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a finite `f32` env var, returning `default` on missing or invalid.
fn parse_f32(key: &str, default: f32) -> f32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<f32>().ok().filter(|v| v.is_finite()).unwrap_or(default),
        Err(_) => default,
    }
}

/// Overlay `GG_SESSION_*` values onto `base`.
fn apply_session_env(base: SessionConfig) -> SessionConfig {
    let mut cfg = base;

    let n_ctx = parse_u32("GG_SESSION_N_CTX", cfg.context.n_ctx);
    cfg.context.n_ctx = n_ctx.clamp(16, MAX_TOKENS as u32);
    let max_length = parse_usize("GG_SESSION_MAX_LENGTH", cfg.max_length);
    // max_length never exceeds the window it must fit in.
    cfg.max_length = max_length.clamp(1, cfg.context.n_ctx as usize);

    cfg.context.seed = parse_u64("GG_SESSION_SEED", cfg.context.seed);
    cfg.context.n_threads = parse_u32("GG_SESSION_N_THREADS", cfg.context.n_threads).min(256);
    cfg.context.n_threads_batch =
        parse_u32("GG_SESSION_N_THREADS_BATCH", cfg.context.n_threads_batch).min(256);
    cfg.model.n_gpu_layers = parse_u32("GG_SESSION_N_GPU_LAYERS", cfg.model.n_gpu_layers);

    let s = &mut cfg.sampling;
    s.top_k = parse_u32("GG_SESSION_TOP_K", s.top_k);
    s.top_p = parse_f32("GG_SESSION_TOP_P", s.top_p).clamp(0.01, 1.0);
    s.min_p = parse_f32("GG_SESSION_MIN_P", s.min_p).clamp(0.0, 1.0);
    s.temperature = match parse_f32("GG_SESSION_TEMPERATURE", s.temperature).clamp(0.0, 2.0) {
        t if t > 0.0 && t < MIN_TEMPERATURE => MIN_TEMPERATURE,
        t => t,
    };
    s.repeat_penalty = parse_f32("GG_SESSION_REPEAT_PENALTY", s.repeat_penalty).max(1.0);
    s.penalty_last_n = parse_usize("GG_SESSION_PENALTY_LAST_N", s.penalty_last_n);
    cfg
}

/// Overlay `GG_SESSION_LOG_*` values onto `base`.
fn apply_log_env(base: LogConfig) -> LogConfig {
    let mut log = base;
    if let Ok(level) = std::env::var("GG_SESSION_LOG_LEVEL") {
        if !level.trim().is_empty() {
            log.level = level.trim().to_string();
        }
    }
    if let Some(format) = std::env::var("GG_SESSION_LOG_FORMAT").ok().and_then(|f| LogFormat::parse(&f)) {
        log.format = format;
    }
    if let Ok(path) = std::env::var("GG_SESSION_LOG_FILE") {
        if !path.trim().is_empty() {
            log.output_path = Some(PathBuf::from(path.trim()));
        }
    }
    log
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    EnvConfig::default().with_env()
}

/// Parse a TOML document. Absent keys take their defaults.
pub fn from_toml_str(text: &str) -> Result<EnvConfig, ConfigError> {
    let cfg: EnvConfig = toml::from_str(text)?;
    cfg.session.validate()?;
    Ok(cfg)
}

/// Read a TOML file, then overlay environment variables.
pub fn load_file(path: &Path) -> Result<EnvConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg = from_toml_str(&text)?.with_env();
    cfg.session.validate()?;
    Ok(cfg)
}

impl EnvConfig {
    /// This configuration with `GG_SESSION_*` values applied on top.
    pub fn with_env(self) -> Self {
        Self {
            session: apply_session_env(self.session),
            log: apply_log_env(self.log),
        }
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        let s = &self.session;
        EffectiveConfig {
            max_length: s.max_length,
            echo_prompt: s.echo_prompt,
            seed: s.context.seed,
            n_ctx: s.context.n_ctx,
            n_threads: s.context.n_threads,
            n_threads_batch: s.context.n_threads_batch,
            n_gpu_layers: s.model.n_gpu_layers,
            top_k: s.sampling.top_k,
            top_p: s.sampling.top_p,
            min_p: s.sampling.min_p,
            temperature: s.sampling.temperature,
            repeat_penalty: s.sampling.repeat_penalty,
            penalty_last_n: s.sampling.penalty_last_n,
            log_level: self.log.level.clone(),
            log_format: self.log.format.as_str(),
            log_file: self.log.output_path.clone(),
        }
    }
}
