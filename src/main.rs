use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn, LevelFilter};

use tailpush::utils::DEFAULT_LOG_FILTER;
use tailpush::{config, upload, CancelToken, Outcome};

const LOG_ENV: &str = "TAILPUSH_LOG";

/// Command-line interface for tailpush
#[derive(Parser, Debug)]
#[command(
    name = "tailpush",
    version,
    about = "Uploads the files listed in its embedded configuration"
)]
struct Cli {
    /// Read the embedded configuration from FILE instead of this executable
    #[arg(long, value_name = "FILE")]
    trailer: Option<PathBuf>,
}

/// Returns true when the log filter was set explicitly through the environment.
fn init_logging() -> bool {
    let explicit = std::env::var_os(LOG_ENV).is_some();
    let env = env_logger::Env::new().filter_or(LOG_ENV, DEFAULT_LOG_FILTER);
    env_logger::Builder::from_env(env)
        .format_timestamp_micros()
        .init();
    if !explicit {
        log::set_max_level(LevelFilter::Info);
    }
    explicit
}

fn main() -> ExitCode {
    let explicit_log = init_logging();
    let cli = Cli::parse();

    let cancel = CancelToken::new();
    let handler_cancel = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_cancel.cancel()) {
        warn!("could not install interrupt handler: {}", e);
    }

    let host = match cli.trailer {
        Some(path) => path,
        None => match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                error!("cannot locate own executable: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };
    let base_dir = host
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let cfg = match config::load(&host) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("config from {}: {}", host.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if cfg.debug && !explicit_log && tailpush::utils::stdout_is_terminal() {
        log::set_max_level(LevelFilter::Debug);
    }
    info!("uploading to {} ({} sources)", cfg.url, cfg.list.len());

    match upload::run(Arc::new(cfg), &base_dir, &cancel) {
        Outcome::Completed(_) => ExitCode::SUCCESS,
        Outcome::Cancelled(_) => {
            warn!("stopped: interrupted");
            ExitCode::FAILURE
        }
    }
}
