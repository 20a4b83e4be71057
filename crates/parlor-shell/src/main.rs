#![allow(clippy::print_stdout, clippy::print_stderr)] // CLI binary: stdout/stderr is the UI

mod cli;
mod commands;
mod config;
mod input;
mod render;
mod shell;
mod tracing_setup;

use anyhow::{Context, Result};
use clap::Parser;
use parlor_client::Session;
use std::io::Write;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::Config;
use crate::input::{InputLines, spawn_line_reader};
use crate::shell::Shell;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing_guard = tracing_setup::init(cli.verbose);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "parlor starting"
    );

    let config_file = Config::find_config_path(cli.config.as_deref());
    let config = if cli.config.is_some() {
        Config::load(&config_file)?
    } else {
        Config::load_or_default(&config_file)?
    };

    let mut input = spawn_line_reader(std::io::stdin()).context("failed to start input reader")?;
    let nick = match cli.nick {
        Some(nick) => nick,
        None => prompt_nick(&mut input).await?,
    };
    let nick = nick.trim().to_owned();
    anyhow::ensure!(!nick.is_empty(), "username must not be empty");

    let session_config = config.session_config(cli.server.as_deref(), &nick);
    let url = session_config.url.clone();
    let session = Session::connect(session_config)
        .await
        .with_context(|| format!("could not connect to {url}"))?;
    let events = session.subscribe();

    if let Err(error) = session.request_roster().await {
        warn!(error = %error, "initial roster request failed");
    }

    println!("connected to {url} as {nick}. /help lists commands.");
    Shell::new(session, std::io::stdout())
        .run(input, events)
        .await
}

async fn prompt_nick(input: &mut InputLines) -> Result<String> {
    print!("Send username: ");
    std::io::stdout().flush().context("failed to write prompt")?;

    match input.recv().await {
        Some(line) => line.context("failed to read username"),
        None => anyhow::bail!("no username given"),
    }
}
