mod config;
mod input;
mod render;

use std::{io, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{Gesture, HttpGateway, Reconciler, ViewBinder};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{
    config::load_settings,
    input::{parse_command, Command, HELP},
    render::TerminalRenderer,
};

const GESTURE_QUEUE: usize = 32;

#[derive(Parser, Debug)]
#[command(name = "shoplist", about = "Terminal client for a shoplist items server")]
struct Args {
    /// Overrides the configured server base URL.
    #[arg(long)]
    server_url: Option<String>,
    /// Config file path; defaults to ./shoplist.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let gateway = HttpGateway::with_timeout(
        &settings.server_url,
        Duration::from_secs(settings.request_timeout_secs),
    )
    .with_context(|| format!("invalid server url '{}'", settings.server_url))?;
    info!(items_url = %gateway.items_url(), "starting shoplist");

    let reconciler = Reconciler::new(Arc::new(gateway));
    let mut binder = ViewBinder::new(reconciler, TerminalRenderer::new(io::stdout())).await;

    let (gestures_tx, gestures_rx) = mpsc::channel(GESTURE_QUEUE);
    gestures_tx
        .send(Gesture::Refresh)
        .await
        .context("gesture queue closed")?;
    tokio::spawn(read_gestures(gestures_tx));

    binder.run(gestures_rx).await;
    println!();
    info!("stdin closed; exiting");
    Ok(())
}

async fn read_gestures(gestures: mpsc::Sender<Gesture>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!(%err, "failed to read stdin");
                break;
            }
        };
        match parse_command(&line) {
            Ok(Command::Gesture(gesture)) => {
                if gestures.send(gesture).await.is_err() {
                    break;
                }
            }
            Ok(Command::Help) => eprintln!("{HELP}"),
            Ok(Command::Quit) => break,
            Ok(Command::Empty) => {}
            Err(err) => eprintln!("{err}"),
        }
    }
}
