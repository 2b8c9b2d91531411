mod config;
mod handoff;
mod input;
mod render;

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use guided_sync::{
    ChatSession, ConnectionManager, HistoryLoader, RestHistory, SendOutcome, SessionEvent, SessionHandle,
    WsConnector,
};
use guided_types::{RoomId, UserId};
use guided_types::api::Handoff;

use crate::config::ClientConfig;
use crate::handoff::AiHandoff;
use crate::input::Input;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout is the chat
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guided=info,guided_sync=info".into()),
        )
        .init();

    let config = ClientConfig::from_env()?;
    info!("user {} via {} (history from {})", config.user, config.gateway_url, config.api_url);

    let connection = ConnectionManager::new(WsConnector::new(config.gateway_url.as_str()), &config.sync);
    let history = HistoryLoader::new(RestHistory::new(config.api_url.as_str()));
    let (session, mut events) = ChatSession::spawn(config.user.clone(), connection, history, &config.sync);
    let ai = config.ai_url.as_deref().map(AiHandoff::new);

    session.set_channel(config.channel.clone());
    match config.room.clone() {
        Some(room) => session.set_active_room(Some(room)),
        None => println!("{}", input::HELP),
    }

    let mut view = session.watch_view();
    let mut shown_room: Option<RoomId> = None;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !handle_input(input::parse(&line), &session) {
                    break;
                }
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                if let Some(text) = render::on_room_change(&mut shown_room, &current, &config.user) {
                    print!("{}", text);
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                handle_event(event, &session, &config.user, ai.as_ref());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    session.shutdown();
    Ok(())
}

/// Returns false when the user asked to quit.
fn handle_input(input: Input, session: &SessionHandle) -> bool {
    match input {
        Input::Send(text) => {
            let session = session.clone();
            tokio::spawn(async move {
                match session.send(text).await {
                    SendOutcome::Delivered => debug!("message delivered"),
                    // Failures arrive as session events
                    SendOutcome::Failed(_) => {}
                    SendOutcome::Rejected(reason) => debug!("send rejected: {}", reason),
                }
            });
        }
        Input::Room(room) => session.set_active_room(room),
        Input::Channel(channel) => session.set_channel(channel),
        Input::Refresh => session.refresh(),
        Input::Ai(pick) => {
            let view = session.view();
            let message = match pick {
                Some(n) => match view.history.get(n - 1) {
                    Some(m) => Some(m.body.clone()),
                    None => {
                        println!("no message {}", n);
                        return true;
                    }
                },
                None => None,
            };
            session.hand_off(message);
        }
        Input::Copy(n) => match session.view().history.get(n - 1) {
            Some(m) => {
                print!("{}", render::clipboard_sequence(&m.body));
                println!("copied message {}", n);
                let _ = std::io::stdout().flush();
            }
            None => println!("no message {}", n),
        },
        Input::Quit => return false,
        Input::Unknown(cmd) => println!("unknown command {}; {}", cmd, input::HELP),
    }
    true
}

fn handle_event(event: SessionEvent, session: &SessionHandle, me: &UserId, ai: Option<&AiHandoff>) {
    match event {
        SessionEvent::HistoryUpdated { room, count } => {
            debug!("room {} now shows {} messages", room, count);
            print!("{}", render::render_history(&session.view(), me));
        }
        SessionEvent::Notice(text) => println!("! {}", text),
        SessionEvent::SendSucceeded { .. } => {}
        SessionEvent::SendFailed { text, .. } => println!("! not sent, kept as draft: {}", text),
        SessionEvent::Escalated(signal) => {
            println!("No reply yet, asking the AI about \"{}\"", signal.last_message);
            forward(Handoff::from(signal), ai);
        }
        SessionEvent::Handoff(handoff) => forward(handoff, ai),
    }
}

/// Hand off to the AI endpoint in the background, or just show what would be
/// handed off when none is configured.
fn forward(handoff: Handoff, ai: Option<&AiHandoff>) {
    let Some(ai) = ai.cloned() else {
        match &handoff.message {
            Some(message) => println!("AI hand-off: {}", message),
            None => println!("AI hand-off"),
        }
        return;
    };

    tokio::spawn(async move {
        match ai.forward(&handoff).await {
            Ok(reply) => println!("AI: {}", reply.trim()),
            Err(e) => {
                warn!("AI hand-off failed: {}", e);
                println!("! AI unavailable: {}", e);
            }
        }
    });
}
