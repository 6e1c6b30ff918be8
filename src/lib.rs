pub mod cli;
pub mod config;
pub mod logging;
pub mod model;
pub mod providers;
pub mod render;
pub mod status;
pub mod stream;

use anyhow::{Context, Result};
use clap::Parser;
use std::error::Error;
use std::fmt;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::{debug, info, warn};

use cli::Cli;
use config::Config;
use status::StatusIndicator;

/// Exit status used when the user interrupts a request.
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

/// The user pressed Ctrl-C while the answer was being streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interrupted before the answer was complete.")
    }
}

impl Error for Interrupted {}

pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if err.downcast_ref::<Interrupted>().is_some() {
        ExitCode::from(INTERRUPTED_EXIT_CODE)
    } else {
        ExitCode::FAILURE
    }
}

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let question = cli.question()?;
    let cfg = Config::from_env()?;
    info!(
        model = %cfg.model,
        api_url = %cfg.api_url,
        request_timeout_secs = cfg.request_timeout_secs,
        "loaded runtime configuration"
    );

    let client = providers::openrouter::build_client(&cfg)?;
    let messages = model::question_messages(&cfg, &question);

    let mut status = StatusIndicator::start();
    let outcome = tokio::select! {
        result = model::chat_stream(&client, &cfg, &messages, &mut status) => Some(result),
        _ = wait_for_interrupt() => None,
    };
    status.clear();

    let Some(result) = outcome else {
        warn!("request interrupted by user");
        return Err(Interrupted.into());
    };
    let answer = result?;

    if answer.trim().is_empty() {
        warn!(model = %cfg.model, "model returned an empty answer");
        return Ok(());
    }

    let rendered = render::render_markdown(&answer);
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{rendered}").context("Failed to write answer to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves,
/// leaving the default signal disposition in place.
async fn wait_for_interrupt() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        debug!(error = %err, "failed to listen for interrupt signal");
        std::future::pending::<()>().await;
    }
}
