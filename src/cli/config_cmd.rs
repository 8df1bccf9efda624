//! Config CLI subcommands: show, defaults.
//!
//! These commands read configuration from environment variables and an
//! optional TOML file; no model is loaded.

use std::path::Path;

use super::exit;
use crate::config::{self, EffectiveConfig, EnvConfig};

/// Print the effective config to stdout, as `KEY=value` lines or JSON.
pub fn run_show(json: bool, file: Option<&Path>) -> i32 {
    let env = match file {
        Some(path) => match config::load_file(path) {
            Ok(env) => env,
            Err(e) => {
                eprintln!("Config error: {e}");
                return exit::CONFIG;
            }
        },
        None => config::load(),
    };
    let cfg = env.effective_config();
    if json {
        match serde_json::to_string_pretty(&cfg) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Failed to serialize config: {e}");
                return exit::FAILURE;
            }
        }
    } else {
        print!("{}", render(&cfg));
    }
    exit::SUCCESS
}

/// Print built-in defaults (no env overrides) to stdout.
pub fn run_defaults() {
    print!("{}", render(&EnvConfig::default().effective_config()));
}

/// `KEY=value` lines using the environment variable names.
pub fn render(cfg: &EffectiveConfig) -> String {
    let mut out = String::new();
    let mut line = |key: &str, value: String| {
        out.push_str("GG_SESSION_");
        out.push_str(key);
        out.push('=');
        out.push_str(&value);
        out.push('\n');
    };
    line("MAX_LENGTH", cfg.max_length.to_string());
    line("SEED", cfg.seed.to_string());
    line("N_CTX", cfg.n_ctx.to_string());
    line("N_THREADS", cfg.n_threads.to_string());
    line("N_THREADS_BATCH", cfg.n_threads_batch.to_string());
    line("N_GPU_LAYERS", cfg.n_gpu_layers.to_string());
    line("TOP_K", cfg.top_k.to_string());
    line("TOP_P", cfg.top_p.to_string());
    line("MIN_P", cfg.min_p.to_string());
    line("TEMPERATURE", cfg.temperature.to_string());
    line("REPEAT_PENALTY", cfg.repeat_penalty.to_string());
    line("PENALTY_LAST_N", cfg.penalty_last_n.to_string());
    line("LOG_LEVEL", cfg.log_level.clone());
    line("LOG_FORMAT", cfg.log_format.to_string());
    if let Some(path) = &cfg.log_file {
        line("LOG_FILE", path.display().to_string());
    }
    out
}
