#![deny(dead_code)] // DO NOT REMOVE THIS EVER
use anyhow::{anyhow, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

mod credentials;
mod ui;
mod utils;

use crate::{
    credentials::{credentials_from_env, load_credentials, save_credentials, Credentials},
    ui::{ConsoleView, Input},
};
use golance_chat::{
    config, ChatConfig, ChatSession, Command, PushChannel, RestApi, SessionOptions, StompTransport, UserId,
};

/// Command line arguments for the GoLance chat console
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "GoLance chat: a console client for GoLance messaging.",
    long_about = "Console client for GoLance messaging with live push delivery, HTTP fallback and polling.\n\n\
    Credentials come from GOLANCE_USER_ID / GOLANCE_TOKEN, the saved credentials file, or a prompt."
)]
struct Args {
    /// Directory holding config.json and credentials.json
    #[arg(long, value_name = "PATH")]
    config_dir: Option<PathBuf>,

    /// REST backend base URL (overrides config and GOLANCE_API_URL)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// STOMP WebSocket endpoint (overrides config and GOLANCE_WS_URL)
    #[arg(long, value_name = "URL")]
    ws_url: Option<String>,

    /// Open the conversation with this user once contacts are loaded
    #[arg(long, value_name = "USER_ID")]
    resume: Option<UserId>,

    /// Log file path
    #[arg(long, value_name = "PATH", default_value = "golance-chat.log")]
    log_file: PathBuf,
}

/// Prompts for the user id and bearer token
fn prompt_credentials() -> Result<(UserId, String)> {
    eprintln!("Enter your GoLance user id:");
    let id = utils::read_line()?;
    let user_id = id
        .parse::<UserId>()
        .map_err(|e| anyhow!("'{}' is not a valid user id: {}", id, e))?;

    eprintln!("Enter your access token:");
    let token = utils::read_line()?;
    if token.is_empty() {
        return Err(anyhow!("An access token is required"));
    }
    Ok((user_id, token))
}

/// Environment first, then the saved file, then a prompt (saved on success)
fn resolve_credentials() -> Result<(UserId, String)> {
    if let Some(found) = credentials_from_env()? {
        info!("Using credentials from environment for user {}", found.0);
        return Ok(found);
    }
    if let Some(saved) = load_credentials()? {
        if let Some(token) = saved.get_token() {
            return Ok((saved.user_id, token));
        }
    }
    let (user_id, token) = prompt_credentials()?;
    if let Err(e) = save_credentials(&Credentials::new(user_id, &token)) {
        eprintln!("Warning: Failed to save credentials: {}", e);
    }
    Ok((user_id, token))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    utils::setup_logging(args.log_file.to_str(), LevelFilter::Debug)?;
    info!("System information: {} {}", std::env::consts::OS, std::env::consts::ARCH);

    if let Some(dir) = &args.config_dir {
        std::fs::create_dir_all(dir)?;
        config::set_config_dir_override(dir.clone());
        info!("Config directory overridden to: {}", dir.display());
    }

    let mut chat_config = ChatConfig::load()?;
    if let Some(url) = args.api_url {
        chat_config.api_base_url = url;
    }
    if let Some(url) = args.ws_url {
        chat_config.ws_url = url;
    }

    let (me, token) = resolve_credentials()?;
    println!("Connecting to {} as user {}...", chat_config.api_base_url, me);

    let api = Arc::new(RestApi::new(&chat_config.api_base_url, &token));
    let (transport, inbound) = StompTransport::connect(&chat_config, me, &token);
    let transport: Arc<dyn PushChannel> = Arc::new(transport);

    let mut options = SessionOptions::from_config(&chat_config);
    if let Some(contact) = args.resume {
        options = options.with_resume_contact(contact);
    }

    let (session, mut notices) = ChatSession::new(me, api, transport, inbound, options);
    let mut view_rx = session.view();
    let (command_tx, command_rx) = mpsc::channel(32);
    let session_task = tokio::spawn(session.run(command_rx));

    println!("{}", ui::HELP);
    run_console(&command_tx, &mut view_rx, &mut notices).await?;

    if command_tx.send(Command::Shutdown).await.is_err() {
        error!("Chat session ended before shutdown was requested");
    }
    if let Err(e) = session_task.await {
        error!("Chat session task failed: {}", e);
    }

    println!("Chat session ended.");
    Ok(())
}

async fn run_console(
    commands: &mpsc::Sender<Command>,
    view_rx: &mut tokio::sync::watch::Receiver<golance_chat::ChatView>,
    notices: &mut mpsc::UnboundedReceiver<golance_chat::Notice>,
) -> Result<()> {
    let mut console = ConsoleView::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => return Ok(()),
                };
                match ui::parse_input(&line) {
                    None => {}
                    Some(Input::Quit) => return Ok(()),
                    Some(Input::Help) => println!("{}", ui::HELP),
                    Some(Input::ShowContacts) => print!("{}", ui::render_contacts(&view_rx.borrow())),
                    Some(Input::Invalid(reason)) => println!("{}", reason),
                    Some(Input::Session(command)) => {
                        if commands.send(command).await.is_err() {
                            return Err(anyhow!("Chat session stopped"));
                        }
                    }
                }
            }
            changed = view_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let view = view_rx.borrow_and_update().clone();
                for line in console.update(&view) {
                    println!("{}", line);
                }
            }
            Some(notice) = notices.recv() => println!("{}", ui::format_notice(&notice)),
        }
    }
}
