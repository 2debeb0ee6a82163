//! rawline - a minimal raw-mode terminal line editor
//!
//! rawline keeps the bottom screen row as an editable input line and uses the
//! rows above it as a scrolling log region. Control sequences come from the
//! terminfo description of `$TERM`, so any terminal with cursor addressing
//! and scroll regions works.
//!
//! # Quick Start
//!
//! ```text
//! rawline                # Use $TERM
//! rawline -t vt100       # Force a terminal type
//! rawline -T 250 -q      # 250 ms idle timeout, no idle notices
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Ctrl+C / Ctrl+D | Exit |
//! | Backspace / Ctrl+H | Delete last character |
//! | Enter | Commit the line |
//! | Ctrl+U | Clear the line |
//! | Ctrl+Z | Suspend |

mod config;
mod core;
mod ui;

use std::env;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config as RawlineConfig;

/// Command line options
#[derive(Debug, Default)]
struct Config {
    /// Terminal type override
    term: Option<String>,
    /// Idle timeout in milliseconds
    timeout_ms: Option<u64>,
    /// Prompt tag
    prompt: Option<String>,
    /// Disable idle notices
    quiet: bool,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding a tracing filter
const LOG_ENV: &str = "RAWLINE_LOG";

fn print_version() {
    eprintln!("rawline {}", VERSION);
}

fn print_help() {
    eprintln!("rawline {} - A minimal raw-mode terminal line editor", VERSION);
    eprintln!();
    eprintln!("Usage: rawline [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -t, --term <NAME>     Terminal type (default: $TERM)");
    eprintln!("  -T, --timeout <MS>    Idle timeout in milliseconds (default: 1000)");
    eprintln!("  -p, --prompt <TAG>    Prompt tag (default: input)");
    eprintln!("  -q, --quiet           Do not log idle notices");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  Ctrl+C, Ctrl+D        Exit");
    eprintln!("  Backspace, Ctrl+H     Delete last character");
    eprintln!("  Enter                 Commit the line");
    eprintln!("  Ctrl+U                Clear the line");
    eprintln!("  Ctrl+Z                Suspend");
    eprintln!();
    eprintln!("Configuration: ~/.rawline/config.toml");
    eprintln!("Log file:      ~/.rawline/rawline.log ({} sets the filter)", LOG_ENV);
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Config, String> {
    let args: Vec<String> = args.into_iter().collect();
    let mut config = Config::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-t" | "--term" => {
                i += 1;
                let term = args.get(i).ok_or("Missing terminal type argument")?;
                config.term = Some(term.clone());
            }
            "-T" | "--timeout" => {
                i += 1;
                let value = args.get(i).ok_or("Missing timeout argument")?;
                let ms = value
                    .parse::<u64>()
                    .map_err(|_| format!("Invalid timeout: {}", value))?;
                if ms == 0 {
                    return Err("Timeout must be at least 1 ms".to_string());
                }
                config.timeout_ms = Some(ms);
            }
            "-p" | "--prompt" => {
                i += 1;
                let tag = args.get(i).ok_or("Missing prompt argument")?;
                config.prompt = Some(tag.clone());
            }
            "-q" | "--quiet" => {
                config.quiet = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Command line values win over the config file
fn merge(cli: Config, mut file: RawlineConfig) -> RawlineConfig {
    if cli.term.is_some() {
        file.term = cli.term;
    }
    if let Some(ms) = cli.timeout_ms {
        file.poll_timeout_ms = ms;
    }
    if let Some(tag) = cli.prompt {
        file.prompt_tag = tag;
    }
    if cli.quiet {
        file.idle_log = false;
    }
    file
}

/// Send tracing output to the log file; the terminal belongs to the editor
fn init_logging(level: &str) {
    let log_path = RawlineConfig::get_log_path();

    // Create log directory if needed
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = match parse_args(env::args()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let (file_config, config_error) = match RawlineConfig::load() {
        Ok(c) => (c, None),
        Err(e) => (RawlineConfig::default(), Some(e)),
    };

    init_logging(&file_config.log_level);
    info!("rawline {} starting...", VERSION);
    if let Some(e) = config_error {
        warn!("{}; using defaults", e);
    }

    let config = merge(cli, file_config);

    // The terminal is restored by the time run_editor returns.
    if let Err(e) = run_editor(&config) {
        error!("rawline failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    info!("rawline exiting");
    Ok(())
}

#[cfg(not(unix))]
fn run_editor(_config: &RawlineConfig) -> anyhow::Result<()> {
    anyhow::bail!("rawline currently only supports Unix terminals")
}

/// Set up the terminal, run the session, and restore the terminal
#[cfg(unix)]
fn run_editor(config: &RawlineConfig) -> anyhow::Result<()> {
    use anyhow::Context;

    use crate::core::session::{Session, SessionOptions};
    use crate::core::term::CapabilitySet;
    use crate::core::tty::StdinTty;
    use crate::ui::{LineEditor, Renderer};

    let term = match &config.term {
        Some(term) => term.clone(),
        None => env::var("TERM").context("TERM is not set")?,
    };
    info!("Terminal type: {}", term);

    let caps = CapabilitySet::load(&term)
        .with_context(|| format!("Cannot use terminal type '{}'", term))?;

    let tty = StdinTty::open().context("Cannot set up the terminal")?;
    let renderer = Renderer::new(std::io::stdout(), caps);
    let editor = LineEditor::new(config.prompt_tag.clone());
    let options = SessionOptions {
        poll_timeout: config.poll_timeout(),
        idle_log: config.idle_log,
    };

    let mut session = Session::new(tty, renderer, editor, options);
    session.start()?;
    session.run()?;

    // Dropping the session restores the original terminal attributes.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("rawline")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let cli = parse_args(args(&["-t", "vt100", "--timeout", "250", "-p", "cmd", "-q"])).unwrap();
        assert_eq!(cli.term.as_deref(), Some("vt100"));
        assert_eq!(cli.timeout_ms, Some(250));
        assert_eq!(cli.prompt.as_deref(), Some("cmd"));
        assert!(cli.quiet);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(args(&["--term"])).is_err());
        assert!(parse_args(args(&["-T", "soon"])).is_err());
        assert!(parse_args(args(&["-T", "0"])).is_err());
        assert!(parse_args(args(&["--bogus"])).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = RawlineConfig {
            term: Some("xterm".to_string()),
            prompt_tag: "file".to_string(),
            ..RawlineConfig::default()
        };
        let cli = parse_args(args(&["-p", "cli", "-q"])).unwrap();
        let merged = merge(cli, file);

        assert_eq!(merged.term.as_deref(), Some("xterm"));
        assert_eq!(merged.prompt_tag, "cli");
        assert!(!merged.idle_log);
        assert_eq!(merged.poll_timeout_ms, 1000);
    }
}
