//! CLI module for gg-session commands.
//!
//! ## Usage
//!
//! ```bash
//! gg-session-cli generate --model m.gguf --prompt "Hello"   # Generate text
//! gg-session-cli generate --stub --prompt "Hello"           # Deterministic stub engine
//! gg-session-cli config show --json                         # Effective configuration
//! gg-session-cli config defaults                            # Built-in defaults
//! ```

pub mod config_cmd;
pub mod generate_cmd;

pub use generate_cmd::{GenerateArgs, ParseError};

/// Process exit codes.
pub mod exit {
    pub const SUCCESS: i32 = 0;
    /// Generation or engine failure.
    pub const FAILURE: i32 = 1;
    /// Bad arguments or configuration.
    pub const CONFIG: i32 = 2;
}
