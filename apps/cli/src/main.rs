use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use client_core::{ChannelRenderer, ChatSession, RenderEvent, SessionError, StompTransport};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::load_settings;
use render::format_event;

#[derive(Parser, Debug)]
#[command(about = "Join the public chat room from a terminal")]
struct Args {
    #[arg(long)]
    username: String,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long, default_value = "chat.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config);
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    info!(server_url = %settings.server_url, "chat: starting");

    let (renderer, mut rendered) = ChannelRenderer::new();
    let session = ChatSession::new(
        settings.session.clone(),
        Arc::new(StompTransport::new(settings.server_url.clone())),
        Arc::new(renderer),
    );

    let connected = session.request_connect(&args.username).await;
    print_pending(&mut rendered);
    connected.context("could not join the chat")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if line.trim() == "/quit" {
                    break;
                }
                match session.request_send(&line).await {
                    Ok(()) => {}
                    Err(err @ SessionError::InvalidState { .. }) => {
                        warn!(error = %err, "chat: session is no longer connected");
                        break;
                    }
                    Err(err) => warn!(error = %err, "chat: message not sent"),
                }
            }
            event = rendered.recv() => {
                let Some(event) = event else {
                    break;
                };
                print_event(&event);
                if matches!(event, RenderEvent::ConnectionError(_)) {
                    break;
                }
            }
        }
    }

    session.request_disconnect().await;
    print_pending(&mut rendered);
    Ok(())
}

fn print_event(event: &RenderEvent) {
    println!("{}", format_event(event, Local::now().time()));
}

fn print_pending(rendered: &mut mpsc::UnboundedReceiver<RenderEvent>) {
    while let Ok(event) = rendered.try_recv() {
        print_event(&event);
    }
}
