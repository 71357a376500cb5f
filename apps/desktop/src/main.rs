use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use client_core::{
    load_settings, load_settings_from, wrap_preview, BearerTokenIdentity, ChatClient, ChatSession,
    ClientEvent, HttpChatApi, IdentityProvider, Reconciled, SessionSnapshot, StaticIdentity,
};
use shared::{
    domain::{ChatId, MessageKind, UserId},
    protocol::{MessagePayload, UserSummary},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::warn;

mod commands;

use commands::Command;

#[derive(Parser, Debug)]
#[command(name = "chat-desktop", about = "Console client for the realtime chat service")]
struct Args {
    /// Bearer token issued by the identity provider; its `sub` claim is the user id.
    #[arg(long)]
    token: Option<String>,
    /// Overrides the token subject (or names the user when no token is given).
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    ws_url: Option<String>,
    /// Explicit config file instead of ./client.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn build_identity(args: &Args) -> Result<Arc<dyn IdentityProvider>> {
    let identity: Arc<dyn IdentityProvider> = match (&args.token, &args.user_id) {
        (Some(token), Some(user_id)) => {
            Arc::new(StaticIdentity::new(user_id.as_str(), token.as_str()))
        }
        (Some(token), None) => Arc::new(
            BearerTokenIdentity::from_token(token.as_str())
                .context("could not read the user id from --token")?,
        ),
        (None, Some(user_id)) => Arc::new(StaticIdentity {
            subject: Some(UserId::from(user_id.as_str())),
            token: None,
        }),
        (None, None) => Arc::new(StaticIdentity::anonymous()),
    };
    Ok(identity)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => load_settings_from(path)?,
        None => load_settings(),
    };
    if let Some(api_url) = &args.api_url {
        settings.api_url = api_url.clone();
    }
    if let Some(ws_url) = &args.ws_url {
        settings.ws_url = ws_url.clone();
    }

    let identity = build_identity(&args)?;
    let api = Arc::new(HttpChatApi::new(&settings, Arc::clone(&identity))?);
    let client = ChatClient::mount(&settings, Arc::clone(&identity), api).await?;
    println!(
        "connected as {} (notifications: {})",
        identity
            .subject()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<anonymous>".into()),
        client.connection_state()
    );
    print_chats(&client.session().snapshot().await);

    let printer = tokio::spawn(print_events(client.subscribe_events()));

    let mut contacts: Vec<UserSummary> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(err) = run_command(client.session(), command, &mut contacts).await {
            println!("error: {err:#}");
        }
    }

    printer.abort();
    client.unmount().await;
    Ok(())
}

async fn run_command(
    session: &Arc<ChatSession>,
    command: Command,
    contacts: &mut Vec<UserSummary>,
) -> Result<()> {
    match command {
        Command::Chats => print_chats(&session.snapshot().await),
        Command::Open(target) => {
            let chat_id = resolve_chat(&session.snapshot().await, &target)?;
            session.select_chat(&chat_id).await?;
            print_thread(&session.snapshot().await);
        }
        Command::Send(text) => session.send_text(&text).await?,
        Command::Upload(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {path}"))?;
            let file_name = std::path::Path::new(&path)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("attachment")
                .to_string();
            session
                .upload_media(&file_name, commands::mime_for(&path), bytes)
                .await?;
            println!("uploaded {file_name}");
        }
        Command::Seen => session.mark_seen().await?,
        Command::Contacts => {
            *contacts = session.fetch_contacts().await?;
            for (index, contact) in contacts.iter().enumerate() {
                let status = if contact.online { "online" } else { "offline" };
                println!("{:>3}. {} ({status})", index + 1, contact.display_name());
            }
        }
        Command::New(index) => {
            let contact = index
                .checked_sub(1)
                .and_then(|i| contacts.get(i))
                .ok_or_else(|| anyhow!("no contact #{index}; run /contacts first"))?
                .clone();
            session.create_chat(&contact).await?;
            print_thread(&session.snapshot().await);
        }
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => {}
    }
    Ok(())
}

fn resolve_chat(snapshot: &SessionSnapshot, target: &str) -> Result<ChatId> {
    if let Ok(index) = target.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| snapshot.chats.get(i))
            .map(|chat| chat.id.clone())
            .ok_or_else(|| anyhow!("no chat #{index}"));
    }
    Ok(ChatId::from(target))
}

fn print_chats(snapshot: &SessionSnapshot) {
    if snapshot.chats.is_empty() {
        println!("no chats yet; /contacts then /new <n> to start one");
        return;
    }
    for (index, chat) in snapshot.chats.iter().enumerate() {
        let marker = if snapshot.selected_chat_id.as_ref() == Some(&chat.id) {
            '*'
        } else {
            ' '
        };
        let unread = if chat.unread_count > 0 {
            format!(" [{}]", chat.unread_count)
        } else {
            String::new()
        };
        let online = if chat.recipient_online { " ●" } else { "" };
        println!(
            "{marker}{:>3}. {}{online}{unread}  {}",
            index + 1,
            chat.name,
            wrap_preview(chat.last_message.as_deref().unwrap_or_default())
        );
    }
}

fn print_thread(snapshot: &SessionSnapshot) {
    if let Some(chat) = snapshot.selected_chat() {
        println!("--- {} ---", chat.name);
    }
    for message in &snapshot.messages {
        print_message(message);
    }
}

fn print_message(message: &MessagePayload) {
    let body = match message.kind {
        MessageKind::Text => message.content.clone().unwrap_or_default(),
        _ => format!("<{} attachment(s)>", message.media.len().max(1)),
    };
    println!("{}: {body} ({:?})", message.sender_id, message.state);
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<ClientEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "console fell behind client events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            ClientEvent::Reconciled(Reconciled::AppendedToOpenChat { message, .. }) => {
                print_message(&message);
            }
            ClientEvent::Reconciled(Reconciled::MarkedSeen { updated, .. }) if updated > 0 => {
                println!("(seen)");
            }
            ClientEvent::Reconciled(Reconciled::UpdatedBackgroundChat {
                chat_id,
                unread_count,
            }) => {
                println!("new message in {chat_id} ({unread_count} unread)");
            }
            ClientEvent::Reconciled(Reconciled::MaterializedChat { chat_id }) => {
                println!("new chat {chat_id}");
            }
            ClientEvent::ConnectionStateChanged(state) => println!("notifications: {state}"),
            ClientEvent::Error(message) => println!("error: {message}"),
            _ => {}
        }
    }
}
