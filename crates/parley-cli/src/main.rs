//! Terminal client for Parley chat rooms.

mod commands;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use parley_core::{
    Delivery, OutgoingMessage, ParleyEvent, RoomController, SessionManager, SettingsStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use commands::Command;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Chat in Parley rooms from the terminal")]
struct Cli {
    /// Chat server URL; saved for next time
    #[arg(short, long)]
    server: Option<String>,

    /// Name to chat as; saved for next time
    #[arg(short, long)]
    username: Option<String>,

    /// Room to join once connected (defaults to the last room)
    #[arg(short, long)]
    room: Option<String>,

    /// Seconds to wait for the server before giving up; saved for next time
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Where settings are kept
    #[arg(long, env = "PARLEY_DATA_DIR", default_value = ".parley")]
    data_dir: PathBuf,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("parley_core=info,parley_cli=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let store = SettingsStore::new(&cli.data_dir);
    if let Some(server) = cli.server {
        store.set_server_url(server);
    }
    if let Some(secs) = cli.connect_timeout {
        store.set_connect_timeout_secs(Some(secs));
    }
    let username = match cli.username {
        Some(name) => {
            store.set_display_name(Some(name.clone()));
            name
        }
        None => store
            .get()
            .display_name
            .context("no saved display name, pass --username")?,
    };

    let settings = store.get();
    tracing::debug!("settings loaded from {}", store.path().display());
    let session = Arc::new(SessionManager::websocket(settings.session_config()));
    let rooms = RoomController::new(session.clone(), settings.history_limit);
    session.add_listener(Arc::new(print_event));

    session.connect(&username)?;
    if let Some(room) = cli.room.or(settings.last_room) {
        join(&rooms, &store, &room)?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("! {e}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(e) = run(command, &rooms, &store, &username).await {
            println!("! {e:#}");
        }
    }

    // Closing the connection is what tells the server we left.
    session.disconnect();
    Ok(())
}

async fn run(
    command: Command,
    rooms: &RoomController,
    store: &SettingsStore,
    username: &str,
) -> Result<()> {
    match command {
        Command::Say(text) => send(rooms, OutgoingMessage::text(text)?)?,
        Command::Join(room) => join(rooms, store, &room)?,
        Command::Leave => {
            note(&rooms.leave_room()?);
            store.set_last_room(None);
        }
        Command::File(path) => send(rooms, OutgoingMessage::from_path(&path).await?)?,
        Command::Voice(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            send(rooms, OutgoingMessage::audio_clip(bytes)?)?;
        }
        Command::Connect => rooms.session().connect(username)?,
        Command::Disconnect => rooms.session().disconnect(),
        Command::History => {
            for message in rooms.messages() {
                println!("{}", render::message_line(&message, &Local));
            }
        }
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => {}
    }
    Ok(())
}

fn join(rooms: &RoomController, store: &SettingsStore, room: &str) -> Result<()> {
    let delivery = rooms.join_room(room)?;
    if !matches!(delivery, Delivery::Dropped(_)) {
        println!("* joining {room}");
        store.set_last_room(Some(room.to_string()));
    }
    note(&delivery);
    Ok(())
}

fn send(rooms: &RoomController, message: OutgoingMessage) -> Result<()> {
    // Our own messages are printed when the server relays them back.
    note(&rooms.send_message(message)?);
    Ok(())
}

fn note<T>(delivery: &Delivery<T>) {
    if let Some(note) = render::delivery_note(delivery) {
        println!("! {note}");
    }
}

fn print_event(event: &ParleyEvent) {
    match event {
        ParleyEvent::ConnectionStateChanged(state) => {
            println!("* {}", render::state_line(*state));
        }
        ParleyEvent::MessageReceived { message, .. } => {
            println!("{}", render::message_line(message, &Local));
        }
        ParleyEvent::UserJoined(presence) | ParleyEvent::UserLeft(presence) => {
            println!("* {}", render::presence_line(presence));
        }
        ParleyEvent::Error(reason) => println!("! {reason}"),
    }
}
