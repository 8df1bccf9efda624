//! Session lifecycle tests against the stub engine.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use gg_session::engine::{
    FinishReason, Session, SessionConfig, SessionError, SessionState, SharedBackend, StubBackend,
    StubScript,
};

fn config(max_length: usize) -> SessionConfig {
    SessionConfig { max_length, ..Default::default() }
}

fn open(
    registry: &'static SharedBackend<StubBackend>,
    backend: StubBackend,
    max_length: usize,
) -> Result<Session<StubBackend>, SessionError> {
    Session::acquire(registry, move || Ok(backend), Path::new("stub.gguf"), &config(max_length))
}

// =============================================================================
// Termination
// =============================================================================

#[test]
fn test_max_length_scenario_stops_after_two_tokens() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let mut session = open(&REGISTRY, StubBackend::new(StubScript::bytes("abcdefgh")), 5).unwrap();

    // BOS + "ab" = 3 prompt tokens
    session.begin("ab").unwrap();
    assert_eq!(session.cursor(), 3);

    let outputs: Vec<_> = (0..5).map(|_| session.step().unwrap()).collect();
    assert!(!outputs[0].terminal);
    assert!(!outputs[1].terminal);
    assert!(outputs[2].terminal);
    assert_eq!(outputs[2].finish, Some(FinishReason::MaxLength));
    assert!(outputs[3].terminal && outputs[4].terminal);

    assert_eq!(session.decoded_count(), 2);
    assert_eq!(session.cursor(), 5);
    assert_eq!(session.state(), SessionState::Terminal);
    assert_eq!(session.completion_bytes(), b"ab");
    assert_eq!(session.text(), "abab");
}

#[test]
fn test_terminal_steps_never_advance_counters() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript::bytes("x"));
    let probe = backend.probe();
    let mut session = open(&REGISTRY, backend, 64).unwrap();
    session.begin("q").unwrap();

    assert!(!session.step().unwrap().terminal);
    let done = session.step().unwrap();
    assert!(done.terminal);
    assert_eq!(done.finish, Some(FinishReason::Eos));
    assert_eq!(done.token, None);

    let decodes = probe.decode_calls();
    for _ in 0..3 {
        let again = session.step().unwrap();
        assert!(again.terminal);
        assert_eq!(again.delta, "");
        assert_eq!(again.text, "qx");
    }
    assert_eq!(session.decoded_count(), 1);
    assert_eq!(session.cursor(), 3);
    assert_eq!(probe.decode_calls(), decodes, "terminal steps must not decode");
}

#[test]
fn test_state_progression() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let mut session = open(&REGISTRY, StubBackend::new(StubScript::bytes("ok")), 64).unwrap();
    assert_eq!(session.state(), SessionState::Created);
    session.begin("say").unwrap();
    assert_eq!(session.state(), SessionState::Initialized);
    session.step().unwrap();
    assert_eq!(session.state(), SessionState::Generating);
    session.step().unwrap();
    assert_eq!(session.state(), SessionState::Generating);
    session.step().unwrap();
    assert_eq!(session.state(), SessionState::Terminal);
    assert_eq!(session.finish_reason(), Some(FinishReason::Eos));
}

// =============================================================================
// Overflow and release
// =============================================================================

#[test]
fn test_prompt_longer_than_max_length_is_context_overflow() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript::default());
    let probe = backend.probe();
    let mut session = open(&REGISTRY, backend, 4).unwrap();

    let err = session.begin("hello").unwrap_err();
    assert!(matches!(err, SessionError::ContextOverflow { max: 4, got: 6 }));
    assert!(err.is_recoverable());
    assert_eq!(session.state(), SessionState::Created);
    assert_eq!(probe.decode_calls(), 0);

    // A shorter prompt still works on the same session.
    session.begin("hi").unwrap();

    assert!(session.release());
    assert_eq!(probe.contexts_live(), 0);
    assert_eq!(probe.models_live(), 0);
    assert_eq!(probe.drops(), vec!["context", "model", "backend"]);
    assert_eq!(REGISTRY.live_leases(), 0);
}

#[test]
fn test_repeated_release_is_a_no_op() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript::default());
    let probe = backend.probe();
    let mut session = open(&REGISTRY, backend, 16).unwrap();

    assert!(session.release());
    assert!(!session.release());
    assert!(!session.release());
    assert!(session.is_released());
    assert_eq!(probe.drops().len(), 3);

    drop(session);
    assert_eq!(probe.drops().len(), 3, "drop after release must not free again");
}

#[test]
fn test_drop_releases_handles() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript::default());
    let probe = backend.probe();
    let session = open(&REGISTRY, backend, 16).unwrap();
    drop(session);
    assert_eq!(probe.drops(), vec!["context", "model", "backend"]);
    assert!(!REGISTRY.is_initialized());
}

#[test]
fn test_operations_after_release_fail() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let mut session = open(&REGISTRY, StubBackend::new(StubScript::bytes("a")), 16).unwrap();
    session.begin("x").unwrap();
    session.release();
    assert!(matches!(session.step(), Err(SessionError::Released)));
    session.clear();
    assert!(matches!(session.begin("x"), Err(SessionError::Released)));
}

// =============================================================================
// Construction failures
// =============================================================================

#[test]
fn test_load_failure_releases_backend() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript { fail_load: true, ..Default::default() });
    let probe = backend.probe();
    let err = open(&REGISTRY, backend, 16).err().unwrap();
    assert!(matches!(err, SessionError::Load(_)));
    assert!(err.is_construction());
    assert_eq!(probe.drops(), vec!["backend"]);
    assert_eq!(REGISTRY.live_leases(), 0);
}

#[test]
fn test_context_failure_frees_model() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript { fail_context: true, ..Default::default() });
    let probe = backend.probe();
    let err = open(&REGISTRY, backend, 16).err().unwrap();
    assert!(matches!(err, SessionError::Context(_)));
    assert_eq!(probe.drops(), vec!["model", "backend"]);
}

#[test]
fn test_window_smaller_than_max_length_is_rejected() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript { n_ctx: Some(4), ..Default::default() });
    let probe = backend.probe();
    let err = open(&REGISTRY, backend, 8).err().unwrap();
    assert!(matches!(err, SessionError::Context(_)));
    assert_eq!(probe.contexts_live(), 0);
    assert_eq!(probe.models_live(), 0);
}

#[test]
fn test_invalid_config_is_rejected_before_loading() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    static INITS: AtomicUsize = AtomicUsize::new(0);
    let err = Session::acquire(
        &REGISTRY,
        || {
            INITS.fetch_add(1, Ordering::SeqCst);
            Ok(StubBackend::new(StubScript::default()))
        },
        Path::new("stub.gguf"),
        &config(0),
    )
    .err()
    .unwrap();
    assert!(matches!(err, SessionError::Config(_)));
    assert_eq!(INITS.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Decode batch traffic
// =============================================================================

#[test]
fn test_prompt_batch_requests_logits_for_last_slot_only() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript::bytes("z"));
    let probe = backend.probe();
    let mut session = open(&REGISTRY, backend, 16).unwrap();
    session.begin("abc").unwrap();
    session.step().unwrap();

    let batches = probe.batches();
    assert_eq!(
        batches[0],
        vec![
            (StubBackend::BOS, 0, false),
            (u32::from(b'a'), 1, false),
            (u32::from(b'b'), 2, false),
            (u32::from(b'c'), 3, true),
        ]
    );
    assert_eq!(batches[1], vec![(u32::from(b'z'), 4, true)]);
    assert_eq!(probe.logits_reads(), vec![3]);

    session.step().unwrap();
    assert_eq!(probe.logits_reads(), vec![3, 0]);
}

#[test]
fn test_decode_failure_leaves_counters_untouched() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript {
        tokens: b"xyz".iter().map(|&b| u32::from(b)).collect(),
        fail_decode_at: Some(2),
        ..Default::default()
    });
    let mut session = open(&REGISTRY, backend, 16).unwrap();
    session.begin("p").unwrap();
    session.step().unwrap();

    let cursor = session.cursor();
    let decoded = session.decoded_count();
    let tokens = session.tokens().to_vec();
    let bytes = session.output_bytes().to_vec();

    let err = session.step().unwrap_err();
    assert!(matches!(err, SessionError::DecodeFailed { status: 1 }));
    assert_eq!(session.cursor(), cursor);
    assert_eq!(session.decoded_count(), decoded);
    assert_eq!(session.tokens(), tokens.as_slice());
    assert_eq!(session.output_bytes(), bytes.as_slice());
    assert_eq!(session.state(), SessionState::Generating);

    // Retrying redraws from the same logits and succeeds.
    let out = session.step().unwrap();
    assert_eq!(out.token, Some(u32::from(b'y')));
    assert_eq!(session.decoded_count(), decoded + 1);
}

fn flat_run(registry: &'static SharedBackend<StubBackend>, fail_decode_at: Option<usize>) -> Vec<u32> {
    let backend = StubBackend::new(StubScript { flat_logits: true, fail_decode_at, ..Default::default() });
    let mut session = open(registry, backend, 12).unwrap();
    session.begin("p").unwrap();
    loop {
        match session.step() {
            Ok(out) if out.terminal => break,
            Ok(_) => {}
            Err(SessionError::DecodeFailed { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    session.tokens().to_vec()
}

#[test]
fn test_failed_step_does_not_consume_a_draw() {
    static CLEAN: SharedBackend<StubBackend> = SharedBackend::new();
    static FAILING: SharedBackend<StubBackend> = SharedBackend::new();

    // Uniform rows keep dozens of candidates, so every draw depends on the RNG.
    let clean = flat_run(&CLEAN, None);
    let retried = flat_run(&FAILING, Some(2));

    assert_eq!(clean.len(), 12);
    assert!(clean[2..].windows(2).any(|w| w[0] != w[1]), "draws were not random: {clean:?}");
    assert_eq!(retried, clean);
}

#[test]
fn test_prompt_decode_failure_keeps_session_created() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript { fail_decode_at: Some(0), ..Default::default() });
    let probe = backend.probe();
    let mut session = open(&REGISTRY, backend, 16).unwrap();

    assert!(matches!(session.begin("p"), Err(SessionError::DecodeFailed { status: 1 })));
    assert_eq!(session.state(), SessionState::Created);
    assert_eq!(session.cursor(), 0);
    assert_eq!(probe.cache_clears(), 1);

    session.begin("p").unwrap();
    assert_eq!(session.cursor(), 2);
}

// =============================================================================
// Text assembly
// =============================================================================

#[test]
fn test_split_character_is_reported_once_complete() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript::bytes("é!"));
    let mut session = open(&REGISTRY, backend, 16).unwrap();
    session.begin("").unwrap();
    assert_eq!(session.cursor(), 1, "empty prompt decodes the BOS marker alone");

    let first = session.step().unwrap();
    assert_eq!(first.delta, "");
    let second = session.step().unwrap();
    assert_eq!(second.delta, "é");
    let third = session.step().unwrap();
    assert_eq!(third.delta, "!");
    assert_eq!(third.text, "é!");
}

#[test]
fn test_long_piece_uses_exact_size_retry() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript {
        tokens: vec![StubBackend::FIRST_WORD],
        words: vec![b"a-long-word!".to_vec()],
        ..Default::default()
    });
    let mut session = open(&REGISTRY, backend, 16).unwrap();
    session.begin("w").unwrap();
    let out = session.step().unwrap();
    assert_eq!(out.delta, "a-long-word!");
    assert_eq!(session.completion_bytes(), b"a-long-word!");
}

#[test]
fn test_echo_disabled_reports_completion_only() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let cfg = SessionConfig { max_length: 16, echo_prompt: false, ..Default::default() };
    let mut session = Session::acquire(
        &REGISTRY,
        || Ok(StubBackend::new(StubScript::bytes("yo"))),
        Path::new("stub.gguf"),
        &cfg,
    )
    .unwrap();
    session.begin("prompt").unwrap();
    while !session.step().unwrap().terminal {}
    assert_eq!(session.text(), "yo");
    assert_eq!(session.output_bytes(), session.completion_bytes());
}

// =============================================================================
// Clear
// =============================================================================

#[test]
fn test_clear_resets_and_allows_new_prompt() {
    static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();
    let backend = StubBackend::new(StubScript::bytes("12"));
    let probe = backend.probe();
    let mut session = open(&REGISTRY, backend, 16).unwrap();
    session.begin("first").unwrap();
    while !session.step().unwrap().terminal {}

    session.clear();
    assert_eq!(session.state(), SessionState::Created);
    assert!(session.tokens().is_empty());
    assert!(session.output_bytes().is_empty());
    assert_eq!(session.text(), "");
    assert_eq!((session.cursor(), session.decoded_count()), (0, 0));
    assert_eq!(probe.cache_clears(), 1);

    session.begin("again").unwrap();
    let out = session.step().unwrap();
    assert_eq!(out.text, "again1");
    assert_eq!(probe.batches().last().unwrap()[0].1, 6, "positions restart after clear");
}
