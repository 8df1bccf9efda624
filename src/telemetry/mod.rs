//! Telemetry for gg-session.
//!
//! Structured logging, tracing spans, and metrics through the `metrics`
//! facade. The library installs no exporter; binaries choose one.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_decode_failure, record_finish, record_prompt_tokens, record_step_latency, record_token,
    DECODE_FAILURES, PROMPT_TOKENS, SESSIONS_FINISHED, STEP_LATENCY, TOKENS_GENERATED,
};
pub use spans::{SessionSpan, SpanExt};
