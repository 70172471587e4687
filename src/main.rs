use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use deskchat::api::ApiClient;
use deskchat::channel::{Channel, ConnectionState};
use deskchat::config::Config;
use deskchat::conversation::Conversation;
use deskchat::models::message::{ChatMessage, Origin};
use deskchat::models::user::UserId;
use deskchat::session::Session;

/// Terminal client for the helpdesk realtime chat.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    #[arg(long, env = "DESKCHAT_EMAIL")]
    email: String,
    #[arg(long, env = "DESKCHAT_PASSWORD", hide_env_values = true)]
    password: String,
    /// Peer to chat with. Defaults to the first entry of the directory.
    #[arg(long)]
    peer: Option<UserId>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deskchat=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    print_banner(&config);

    let session = Session::new();
    let api = ApiClient::with_timeout(&config.api_url, session.clone(), config.http_timeout);

    if let Err(e) = api.login(&args.email, &args.password).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }

    let peers = api.peers_or_empty().await;
    eprintln!("  \x1b[2mpeers\x1b[0m        {}", peers.len());
    for peer in &peers {
        let status = if peer.active { "" } else { " \x1b[2m(inactive)\x1b[0m" };
        eprintln!("    {:>6}  {}{status}", peer.id, peer.display_name());
    }
    eprintln!();

    let Some(peer) = args.peer.or_else(|| peers.first().map(|p| p.id)) else {
        eprintln!("  \x1b[33m! nobody to talk to\x1b[0m");
        api.logout().await;
        return;
    };

    let conversation = Arc::new(Mutex::new(Conversation::with_history(
        peer,
        api.history_or_empty(peer).await,
    )));
    if let Ok(conv) = conversation.lock() {
        for message in conv.messages() {
            print_message(message);
        }
    }

    let channel = Channel::new(config.channel.clone(), session.clone());
    let log = Arc::clone(&conversation);
    let _subscription = channel.on_message(move |message| {
        let accepted = log
            .lock()
            .map(|mut conv| conv.accept(message.clone()))
            .unwrap_or(false);
        if accepted {
            print_message(message);
        }
    });

    if let Err(e) = channel.connect().await {
        tracing::error!("{e}");
        api.logout().await;
        std::process::exit(1);
    }
    eprintln!("  \x1b[32m→ chatting with {peer}\x1b[0m");
    eprintln!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state = channel.watch_state();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let body = line.trim();
                    if body.is_empty() {
                        continue;
                    }
                    if let Err(e) = channel.send_message(peer, body) {
                        tracing::warn!("message not sent: {e}");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("stdin: {e}");
                    break;
                }
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if current == ConnectionState::Disconnected {
                    if let Some(e) = channel.last_error() {
                        tracing::error!("channel closed: {e}");
                    }
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    channel.disconnect();
    api.logout().await;
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let build = env!("DESKCHAT_BUILD");

    eprintln!();
    eprintln!("  \x1b[1;36mdeskchat\x1b[0m \x1b[2mv{version} ({build})\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mapi\x1b[0m          {}", config.api_url);
    eprintln!("  \x1b[2mbroker\x1b[0m       {}", config.channel.ws_url);
    eprintln!(
        "  \x1b[2mreconnect\x1b[0m    {:?}",
        config.channel.reconnect_delay
    );
    eprintln!();
}

fn print_message(message: &ChatMessage) {
    let time = message.timestamp.format("%H:%M");
    match message.origin {
        Origin::Own => println!("\x1b[2m{time}\x1b[0m \x1b[36myou\x1b[0m: {}", message.body),
        Origin::Other => println!(
            "\x1b[2m{time}\x1b[0m \x1b[33m{}\x1b[0m: {}",
            message.sender_name, message.body
        ),
    }
}
