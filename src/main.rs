mod common;
mod config;
mod error;
mod network;
mod session;
mod storage;
mod ui;

use std::error::Error;

use clap::Parser;
use dotenvy::dotenv;
use network::client::parse_bootstrap_peers;
use network::{HandleIds, P2PClient, P2PTransport};
use session::{ChatSession, Identity};
use storage::ChatDatabase;
use tokio::sync::mpsc;
use ui::ChatApp;

#[derive(Parser)]
#[command(
    name = "peer_messenger",
    version,
    about = "Peer-to-peer chat with local history"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Override the database location from the config file
    #[arg(long, value_name = "FILE")]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    if let Some(database) = cli.database {
        app_config.database_path = database;
    }

    config::ensure_parent_dir(&app_config.database_path)?;
    let store = ChatDatabase::with_path(&app_config.database_path)?;
    let Identity { user, keypair } = session::load_or_create_identity(&store)?;
    log::info!(
        "Using database {} ({} chats, {} messages)",
        app_config.database_path,
        store.chat_count()?,
        store.message_count()?
    );

    // Session -> Network
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Network -> Session
    let (event_tx, event_rx) = mpsc::channel(100);
    let handle_ids = HandleIds::default();

    let bootstrap_peers = parse_bootstrap_peers(&app_config.bootstrap_nodes);
    let client = P2PClient::new(
        event_tx,
        cmd_rx,
        bootstrap_peers,
        app_config.clone(),
        handle_ids.clone(),
    );
    tokio::spawn(async move {
        if let Err(err) = client.run(keypair).await {
            log::error!("Network client terminated: {err}");
        }
    });

    let session = ChatSession::new(store, user, P2PTransport::new(cmd_tx, handle_ids));
    let options = eframe::NativeOptions::default();

    eframe::run_native(
        "Peer Messenger",
        options,
        Box::new(move |cc| Ok(Box::new(ChatApp::new(cc, session, event_rx)))),
    )?;

    Ok(())
}
