//! Metric names and recorders.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::engine::FinishReason;

pub const TOKENS_GENERATED: &str = "gg_session_tokens_generated_total";
pub const PROMPT_TOKENS: &str = "gg_session_prompt_tokens_total";
pub const DECODE_FAILURES: &str = "gg_session_decode_failures_total";
pub const SESSIONS_FINISHED: &str = "gg_session_finished_total";
pub const STEP_LATENCY: &str = "gg_session_step_latency_seconds";

pub fn record_token() {
    counter!(TOKENS_GENERATED).increment(1);
}

pub fn record_prompt_tokens(n: usize) {
    counter!(PROMPT_TOKENS).increment(n as u64);
}

pub fn record_decode_failure() {
    counter!(DECODE_FAILURES).increment(1);
}

pub fn record_finish(reason: FinishReason) {
    let reason = match reason {
        FinishReason::Eos => "eos",
        FinishReason::MaxLength => "max_length",
    };
    counter!(SESSIONS_FINISHED, "reason" => reason).increment(1);
}

pub fn record_step_latency(elapsed: Duration) {
    histogram!(STEP_LATENCY).record(elapsed.as_secs_f64());
}
