//! `generate` subcommand: run one prompt to completion and stream the text.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::exit;
use crate::config::{self, EnvConfig};
use crate::engine::{
    stream, Backend, GuardedSession, Session, SessionConfig, SessionError, SharedBackend, StreamEvent,
    StubBackend, StubScript,
};
use crate::telemetry::{init_logging, LogError};

/// Registry for `--stub` runs.
static STUB_BACKEND: SharedBackend<StubBackend> = SharedBackend::new();

/// Events buffered between the generation task and stdout.
const STREAM_BUFFER: usize = 32;

/// Parsed `generate` arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateArgs {
    pub model: Option<PathBuf>,
    pub prompt: String,
    pub max_length: Option<usize>,
    pub seed: Option<u64>,
    pub config: Option<PathBuf>,
    pub stub: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Missing value for {0}")]
    MissingValue(&'static str),
    #[error("Invalid value for {flag}: {value}")]
    InvalidValue { flag: &'static str, value: String },
    #[error("Unknown argument: {0}")]
    Unknown(String),
    #[error("--prompt is required")]
    MissingPrompt,
    #[error("--model is required unless --stub is given")]
    MissingModel,
}

impl GenerateArgs {
    /// Parse the arguments that follow `generate`.
    pub fn parse(args: &[String]) -> Result<Self, ParseError> {
        let mut out = Self::default();
        let mut prompt = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--model" => {
                    let value = iter.next().ok_or(ParseError::MissingValue("--model"))?;
                    out.model = Some(PathBuf::from(value));
                }
                "--prompt" => {
                    prompt = Some(iter.next().ok_or(ParseError::MissingValue("--prompt"))?.clone());
                }
                "--max-length" => {
                    let value = iter.next().ok_or(ParseError::MissingValue("--max-length"))?;
                    out.max_length = Some(value.parse().map_err(|_| ParseError::InvalidValue {
                        flag: "--max-length",
                        value: value.clone(),
                    })?);
                }
                "--seed" => {
                    let value = iter.next().ok_or(ParseError::MissingValue("--seed"))?;
                    out.seed = Some(value.parse().map_err(|_| ParseError::InvalidValue {
                        flag: "--seed",
                        value: value.clone(),
                    })?);
                }
                "--config" => {
                    let value = iter.next().ok_or(ParseError::MissingValue("--config"))?;
                    out.config = Some(PathBuf::from(value));
                }
                "--stub" => out.stub = true,
                other => return Err(ParseError::Unknown(other.to_string())),
            }
        }
        out.prompt = prompt.ok_or(ParseError::MissingPrompt)?;
        if out.model.is_none() && !out.stub {
            return Err(ParseError::MissingModel);
        }
        Ok(out)
    }

    /// File or environment configuration with command-line overrides applied.
    pub fn resolve_config(&self) -> Result<EnvConfig, config::ConfigError> {
        let mut env = match &self.config {
            Some(path) => config::load_file(path)?,
            None => config::load(),
        };
        if let Some(max_length) = self.max_length {
            env.session.max_length = max_length;
            let n_ctx = env.session.context.n_ctx as usize;
            if max_length > n_ctx {
                env.session.context.n_ctx = u32::try_from(max_length).unwrap_or(u32::MAX);
            }
        }
        if let Some(seed) = self.seed {
            env.session.context.seed = seed;
        }
        env.session.validate()?;
        Ok(env)
    }
}

/// Run `generate`, printing text to stdout as it is produced.
pub async fn run(args: &GenerateArgs) -> i32 {
    let env = match args.resolve_config() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("Config error: {e}");
            return exit::CONFIG;
        }
    };
    match init_logging(&env.log) {
        Ok(()) | Err(LogError::AlreadyInitialized) => {}
        Err(e) => {
            eprintln!("Logging error: {e}");
            return exit::CONFIG;
        }
    }

    let result = if args.stub {
        let script = StubScript::bytes(&args.prompt);
        let session = Session::acquire(
            &STUB_BACKEND,
            move || Ok(StubBackend::new(script)),
            Path::new("stub"),
            &env.session,
        );
        match session {
            Ok(session) => drive(session, &args.prompt, &env.session, &mut std::io::stdout()).await,
            Err(e) => Err(e),
        }
    } else {
        run_model(args, &env.session).await
    };

    match result {
        Ok(()) => exit::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "generation failed");
            eprintln!("Generation failed: {e}");
            if matches!(e, SessionError::EmptyPrompt | SessionError::ContextOverflow { .. }) {
                exit::CONFIG
            } else {
                exit::FAILURE
            }
        }
    }
}

#[cfg(feature = "gguf")]
async fn run_model(args: &GenerateArgs, config: &SessionConfig) -> Result<(), SessionError> {
    let model = args.model.as_deref().ok_or_else(|| SessionError::Load("no model path".into()))?;
    let session = crate::engine::gguf::open(model, config)?;
    drive(session, &args.prompt, config, &mut std::io::stdout()).await
}

#[cfg(not(feature = "gguf"))]
async fn run_model(_args: &GenerateArgs, _config: &SessionConfig) -> Result<(), SessionError> {
    Err(SessionError::Load(
        "this build has no GGUF support; rebuild with --features gguf or pass --stub".into(),
    ))
}

async fn drive<B, W>(
    session: Session<B>,
    prompt: &str,
    config: &SessionConfig,
    out: &mut W,
) -> Result<(), SessionError>
where
    B: Backend,
    B::Model: Send,
    B::Context: Send,
    W: Write,
{
    let guarded = GuardedSession::new(session);
    let mut text = stream(guarded.clone(), prompt.to_string(), STREAM_BUFFER);
    let mut written = if config.echo_prompt { write!(out, "{prompt}") } else { Ok(()) };
    let mut outcome = Ok(());
    while written.is_ok() {
        let Some(event) = text.next().await else { break };
        match event {
            StreamEvent::Delta(delta) => {
                written = write!(out, "{delta}").and_then(|()| out.flush());
            }
            StreamEvent::Done { finish, .. } => {
                written = writeln!(out);
                tracing::info!(?finish, "generation complete");
                break;
            }
            StreamEvent::Error(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    if let Err(e) = written {
        // The reader is gone; the cancelled stream stops the worker.
        tracing::warn!(error = %e, "output closed, stopping generation");
    }
    text.cancel();
    // Waits for the worker to finish its current step.
    guarded.release();
    outcome
}
