//! Line-oriented chat client.
//!
//! Run with: cargo run -p chat-cli -- <username>
//!
//! Plain lines go to the active conversation. Commands:
//! `/open <user>`, `/close`, `/users [filter]`, `/file <path> [mime]`, `/hide`, `/show`,
//! `/quit`.

use std::{env, sync::Arc};

use anyhow::{Context, bail};
use chatline_core::{Connectivity, MessageKind, SessionState, Visibility};
use chatline_session::{FilePartnerStore, SessionConfig, SessionHandle, SessionManager};
use chatline_transport::WebSocketConnector;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Some(username) = env::args().nth(1).or_else(|| env::var("CHATLINE_USER").ok()) else {
        bail!("usage: chat-cli <username> (or set CHATLINE_USER)");
    };

    let config = SessionConfig::from_env().context("invalid configuration")?;
    let store = match &config.state_dir {
        Some(dir) => FilePartnerStore::in_dir(dir),
        None => FilePartnerStore::default_location()
            .context("no data directory; set CHATLINE_STATE_DIR")?,
    };
    info!(endpoint = %config.endpoint, store = %store.path().display(), "starting session");

    let (manager, handle) =
        SessionManager::new(&config, &username, WebSocketConnector, Arc::new(store))?;
    let session = manager.spawn();
    let printer = tokio::spawn(print_updates(handle.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !run_command(&handle, line.trim())? {
            break;
        }
    }

    handle.shutdown().ok();
    session.await?;
    printer.abort();
    Ok(())
}

/// Apply one input line. Returns false when the user asked to quit.
fn run_command(handle: &SessionHandle, line: &str) -> anyhow::Result<bool> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "" => {}
        "/quit" => return Ok(false),
        "/open" if !rest.is_empty() => handle.open_conversation(rest)?,
        "/close" => handle.close_conversation()?,
        "/users" => {
            handle.request_roster()?;
            let state = handle.state();
            for entry in state.roster_view(rest) {
                let online = if entry.is_online.unwrap_or(false) { "*" } else { " " };
                let unread = state.unread(&entry.identity);
                println!(" {online} {} ({unread} unread)", entry.identity);
            }
        }
        "/file" if !rest.is_empty() => {
            let Some(partner) = handle.state().active_partner else {
                println!("open a conversation first");
                return Ok(true);
            };
            let (path, mime) = rest.split_once(' ').unwrap_or((rest, ""));
            let mime = Some(mime.trim().to_owned()).filter(|m| !m.is_empty());
            handle.send_file(partner, path, None, mime)?;
        }
        "/hide" => handle.set_visibility(Visibility::Hidden)?,
        "/show" => handle.set_visibility(Visibility::Foreground)?,
        _ if command.starts_with('/') => println!("unknown command: {command}"),
        _ => {
            let Some(partner) = handle.state().active_partner else {
                println!("open a conversation first");
                return Ok(true);
            };
            handle.send_text(partner, line)?;
        }
    }
    Ok(true)
}

async fn print_updates(handle: SessionHandle) {
    let mut updates = handle.updates();
    let mut connectivity = None;
    let mut error = None;
    let mut shown = 0;
    let mut partner = None;

    while let Some(state) = updates.next().await {
        if connectivity != Some(state.connectivity) {
            connectivity = Some(state.connectivity);
            println!("-- {}", describe(&state));
        }
        if error != state.error {
            error.clone_from(&state.error);
            if let Some(e) = &error {
                println!("!! {e}");
            }
        }
        if partner != state.active_partner {
            partner.clone_from(&state.active_partner);
            shown = 0;
        }

        let conversation = state.active_conversation();
        for message in conversation.iter().skip(shown) {
            let body = match message.kind {
                MessageKind::Text => message.payload.clone(),
                MessageKind::File => format!(
                    "[file {}]",
                    message.file_name.as_deref().unwrap_or(&message.payload)
                ),
            };
            println!("{} {}: {body}", message.sent_at, message.sender);
        }
        shown = conversation.len();
    }
}

fn describe(state: &SessionState) -> String {
    match state.connectivity {
        Connectivity::Connected => "connected".to_owned(),
        Connectivity::Connecting => "connecting".to_owned(),
        Connectivity::Disconnected if state.reconnect_attempt > 0 => {
            format!("disconnected (attempt {})", state.reconnect_attempt)
        }
        Connectivity::Disconnected => "disconnected".to_owned(),
    }
}
