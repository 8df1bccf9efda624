//! gg-session CLI entry point.
//!
//! ## Subcommands
//!
//! - `gg-session-cli generate` - Generate text from a prompt
//! - `gg-session-cli config show` - Print effective configuration
//! - `gg-session-cli config defaults` - Print built-in defaults

use std::path::PathBuf;
use std::process::ExitCode;

use gg_session::cli::{config_cmd, exit, generate_cmd, GenerateArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    let code = match command {
        "generate" => match GenerateArgs::parse(&args[2..]) {
            Ok(parsed) => generate_cmd::run(&parsed).await,
            Err(e) => {
                eprintln!("{e}");
                print_command_help("generate");
                exit::CONFIG
            }
        },
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => run_config_show(&args[3.min(args.len())..]),
                "defaults" => {
                    config_cmd::run_defaults();
                    exit::SUCCESS
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    exit::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            exit::SUCCESS
        }
        "version" | "--version" | "-V" => {
            let gguf = if gg_session::engine::gguf::available() { "enabled" } else { "disabled" };
            println!("gg-session {} (gguf backend {gguf})", env!("CARGO_PKG_VERSION"));
            exit::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            exit::FAILURE
        }
    };
    ExitCode::from(code as u8)
}

fn run_config_show(rest: &[String]) -> i32 {
    let mut json = false;
    let mut file = None;
    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--config" => match iter.next() {
                Some(path) => file = Some(PathBuf::from(path)),
                None => {
                    eprintln!("Missing value for --config");
                    return exit::CONFIG;
                }
            },
            other => {
                eprintln!("Unknown argument: {}", other);
                return exit::CONFIG;
            }
        }
    }
    config_cmd::run_show(json, file.as_deref())
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "gg-session v{}

USAGE:
    gg-session-cli [COMMAND] [OPTIONS]

COMMANDS:
    generate     Generate text from a prompt
    config       Show configuration (show, defaults)
    version      Show version information
    help         Show this help message

EXAMPLES:
    gg-session-cli generate --model model.gguf --prompt \"Hello\"
    gg-session-cli generate --stub --prompt \"Hello\" --max-length 32
    gg-session-cli config show --json

ENVIRONMENT:
    GG_SESSION_*          Session, sampling and logging settings
                          (see `gg-session-cli config defaults`)

EXIT CODES:
    0  Success
    1  Generation failure
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "generate" => {
            eprintln!(
                "gg-session-cli generate - Generate text

USAGE:
    gg-session-cli generate --model <PATH> --prompt <TEXT> [OPTIONS]

OPTIONS:
    --model <PATH>       GGUF model file (requires the gguf feature)
    --prompt <TEXT>      Prompt text
    --max-length <N>     Token ceiling, prompt included
    --seed <N>           Sampling seed
    --config <FILE>      TOML configuration file
    --stub               Use the deterministic stub engine instead of a model

DESCRIPTION:
    Decodes the prompt, then samples until end-of-sequence or the token
    ceiling, printing text as it is produced.
"
            );
        }
        "config" => {
            eprintln!(
                "gg-session-cli config - Configuration

USAGE:
    gg-session-cli config show [--json] [--config FILE]
    gg-session-cli config defaults
"
            );
        }
        _ => print_usage(),
    }
}
