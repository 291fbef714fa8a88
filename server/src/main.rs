//! Backbone process entry point: loads configuration, opens storage, and
//! runs the three client/server-facing TCP endpoints (account, game-server
//! link, chat) plus the ops HTTP server, side by side until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::interval;

use protocol::account::{AccountMessage, AccountReply};
use protocol::chat::{ChatMessage, ChatReply};
use protocol::game::GameLinkMessage;
use protocol::{CodecError, Frame, MessageId};

use server::account::{AccountEndpoint, AccountSession, ChatHandoff};
use server::chat::{ChatEndpoint, ChatSession};
use server::config::BackboneConfig;
use server::db::{AccountId, InMemoryStorage, MongoStorage, Storage};
use server::game::{GameServerLink, GameSession};
use server::monitor::{self, HealthMonitor, MonitorState};
use server::registry::{CharacterIdMap, MapRegistry};
use server::token::TokenCollector;

const READ_CHUNK: usize = 4096;
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    log::info!("starting backbone server");

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "server/config/backbone.toml".into());
    let config = match BackboneConfig::load_from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("failed to load config from '{config_path}': {e}, using defaults");
            BackboneConfig::default()
        }
    };
    if let Err(e) = config.validate() {
        log::error!("invalid configuration: {e}");
        std::process::exit(2);
    }
    let config = Arc::new(config);

    let storage: Arc<dyn Storage> = if let Ok(uri) = std::env::var("MONGODB_URI") {
        let client = mongodb::Client::with_uri_str(&uri)
            .await
            .expect("failed to connect to MongoDB");
        let database_name = std::env::var("DATABASE_NAME").unwrap_or_else(|_| "mu_backbone".into());
        log::info!("storage: MongoDB ({database_name})");
        Arc::new(MongoStorage::new(client, &database_name))
    } else {
        log::warn!("MONGODB_URI not set, falling back to in-memory storage");
        Arc::new(InMemoryStorage::new())
    };
    storage.open().await.unwrap_or_else(|e| {
        log::error!("database version check failed: {e}");
        std::process::exit(2);
    });
    storage
        .clear_all_online_status()
        .await
        .expect("failed to clear stale online status on startup");

    let map_registry = MapRegistry::new();
    let character_ids = CharacterIdMap::new();
    let chat_tokens: Arc<TokenCollector<ChatHandoff>> = Arc::new(TokenCollector::new());
    let reconnect_tokens: Arc<TokenCollector<AccountId>> = Arc::new(TokenCollector::new());
    let health = HealthMonitor::new();
    let (announce_tx, announce_rx) = mpsc::channel(256);

    let account_endpoint = Arc::new(AccountEndpoint::new(
        storage.clone(),
        config.clone(),
        map_registry.clone(),
        chat_tokens.clone(),
        reconnect_tokens.clone(),
        character_ids.clone(),
    ));
    let game_link = Arc::new(GameServerLink::new(
        storage.clone(),
        config.clone(),
        map_registry.clone(),
        character_ids.clone(),
        account_endpoint.clone(),
        announce_tx,
        health.clone(),
    ));
    let chat_endpoint = Arc::new(ChatEndpoint::new(
        storage.clone(),
        chat_tokens.clone(),
        config.chat.max_channel_name_length,
    ));

    {
        let chat_endpoint = chat_endpoint.clone();
        tokio::spawn(async move { chat_endpoint.run_announce_loop(announce_rx).await });
    }

    spawn_sweeper(
        account_endpoint.clone(),
        chat_tokens.clone(),
        reconnect_tokens.clone(),
        health.clone(),
        storage.clone(),
    );

    let account_addr: SocketAddr =
        format!("0.0.0.0:{}", config.net.account_listen_to_client_port).parse()?;
    let game_addr: SocketAddr =
        format!("0.0.0.0:{}", config.net.game_listen_to_client_port).parse()?;
    let chat_addr: SocketAddr =
        format!("0.0.0.0:{}", config.net.chat_listen_to_client_port).parse()?;

    let monitor_state = MonitorState {
        map_registry,
        health,
        chat_tokens,
        reconnect_tokens,
    };
    let monitor_addr = std::env::var("MONITOR_BIND").unwrap_or_else(|_| "0.0.0.0:8090".into());

    tokio::try_join!(
        run_account_listener(account_endpoint, account_addr),
        run_game_listener(game_link, game_addr),
        run_chat_listener(chat_endpoint, chat_addr),
        run_monitor(monitor_state, monitor_addr),
    )?;

    Ok(())
}

async fn run_monitor(state: MonitorState, bind_addr: String) -> anyhow::Result<()> {
    log::info!("ops monitor listening on {bind_addr}");
    monitor::run(state, &bind_addr).await.map_err(Into::into)
}

fn spawn_sweeper(
    account: Arc<AccountEndpoint>,
    chat_tokens: Arc<TokenCollector<ChatHandoff>>,
    reconnect_tokens: Arc<TokenCollector<AccountId>>,
    health: HealthMonitor,
    storage: Arc<dyn Storage>,
) {
    tokio::spawn(async move {
        let mut ticker = interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            account.sweep_expired();
            chat_tokens.sweep_expired();
            reconnect_tokens.sweep_expired();
            health.cleanup_stale_heartbeats();
            match storage.check_banned_accounts().await {
                Ok(unbanned) if !unbanned.is_empty() => {
                    log::info!("{} account(s) ban expired, restored", unbanned.len());
                }
                Ok(_) => {}
                Err(e) => log::warn!("failed to sweep expired bans: {e}"),
            }
        }
    });
}

/// Reads frames off `reader` into `buf`, decoding as many as are already
/// buffered before asking the socket for more. Returns `Ok(None)` on a
/// clean EOF or a malformed frame (spec §7: anything but an unknown
/// message id drops the connection).
async fn next_frame(
    reader: &mut (impl AsyncReadExt + Unpin),
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<Frame>> {
    loop {
        match Frame::try_decode(buf) {
            Ok(Some((frame, consumed))) => {
                buf.drain(..consumed);
                return Ok(Some(frame));
            }
            Ok(None) => {}
            Err(e) => {
                log::debug!("dropping connection on malformed frame: {e}");
                return Ok(None);
            }
        }
        let mut chunk = [0u8; READ_CHUNK];
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn frame_bytes(id: u16, body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::new();
    Frame { id: MessageId(id), body }.encode_into(&mut out);
    out
}

async fn run_account_listener(
    endpoint: Arc<AccountEndpoint>,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("account endpoint listening on {addr}");
    loop {
        let (stream, peer) = listener.accept().await?;
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_account_connection(endpoint, stream, peer).await {
                log::debug!("account connection from {peer} ended: {e}");
            }
        });
    }
}

/// Decrements the endpoint's live-connection count when a connection task
/// ends, regardless of which return path it takes.
struct AccountConnectionGuard(Arc<AccountEndpoint>);

impl Drop for AccountConnectionGuard {
    fn drop(&mut self) {
        self.0.on_disconnect();
    }
}

async fn handle_account_connection(
    endpoint: Arc<AccountEndpoint>,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> std::io::Result<()> {
    endpoint.on_connect();
    let _guard = AccountConnectionGuard(endpoint.clone());

    let mut session = AccountSession::new(peer.ip());
    let mut buf = Vec::new();
    loop {
        let Some(frame) = next_frame(&mut stream, &mut buf).await? else {
            return Ok(());
        };
        let reply = match AccountMessage::decode(frame.id.0, &frame.body) {
            Ok(msg) => endpoint.handle(&mut session, msg).await,
            Err(CodecError::UnknownMessageId(id)) => {
                log::debug!("account: unknown message id {id} from {peer}");
                AccountReply::InvalidMessage
            }
            Err(e) => {
                log::debug!("account: malformed frame from {peer}: {e}");
                return Ok(());
            }
        };
        let (id, body) = reply.encode();
        stream.write_all(&frame_bytes(id, body)).await?;
    }
}

async fn run_game_listener(link: Arc<GameServerLink>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("game-server link listening on {addr}");
    loop {
        let (stream, peer) = listener.accept().await?;
        let link = link.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_game_connection(link, stream, peer).await {
                log::debug!("game-server connection from {peer} ended: {e}");
            }
        });
    }
}

async fn handle_game_connection(
    link: Arc<GameServerLink>,
    stream: TcpStream,
    peer: SocketAddr,
) -> std::io::Result<()> {
    let (mut read_half, mut write_half) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(256);

    let writer_task = tokio::spawn(async move {
        while let Some(bytes) = outbound_rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let mut session = GameSession::new(link.next_server_id());
    let mut buf = Vec::new();
    let result =
        read_game_frames(&link, &mut session, &mut read_half, &mut buf, &outbound_tx, peer).await;

    link.on_disconnect(&session);
    drop(outbound_tx);
    let _ = writer_task.await;
    result
}

async fn read_game_frames(
    link: &Arc<GameServerLink>,
    session: &mut GameSession,
    read_half: &mut OwnedReadHalf,
    buf: &mut Vec<u8>,
    outbound: &mpsc::Sender<Vec<u8>>,
    peer: SocketAddr,
) -> std::io::Result<()> {
    loop {
        let Some(frame) = next_frame(read_half, buf).await? else {
            return Ok(());
        };
        match GameLinkMessage::decode(frame.id.0, &frame.body) {
            Ok(msg) => {
                if let Some(reply) = link.handle(session, outbound, msg).await {
                    let (id, body) = reply.encode();
                    if outbound.send(frame_bytes(id, body)).await.is_err() {
                        return Ok(());
                    }
                }
            }
            Err(CodecError::UnknownMessageId(id)) => {
                // GameLinkReply carries no InvalidMessage variant: log and
                // drop this one frame, connection stays up.
                log::debug!("game link: unknown message id {id} from {peer}");
            }
            Err(e) => {
                log::debug!("game link: malformed frame from {peer}: {e}");
                return Ok(());
            }
        }
    }
}

async fn run_chat_listener(endpoint: Arc<ChatEndpoint>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("chat endpoint listening on {addr}");
    loop {
        let (stream, peer) = listener.accept().await?;
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_chat_connection(endpoint, stream, peer).await {
                log::debug!("chat connection from {peer} ended: {e}");
            }
        });
    }
}

async fn handle_chat_connection(
    endpoint: Arc<ChatEndpoint>,
    stream: TcpStream,
    peer: SocketAddr,
) -> std::io::Result<()> {
    let (mut read_half, mut write_half) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(256);

    let writer_task = tokio::spawn(async move {
        while let Some(bytes) = outbound_rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let mut session = ChatSession::new();
    let mut buf = Vec::new();
    let result =
        read_chat_frames(&endpoint, &mut session, &outbound_tx, &mut read_half, &mut buf, peer)
            .await;

    endpoint.on_disconnect(&mut session).await;
    drop(outbound_tx);
    let _ = writer_task.await;
    result
}

async fn read_chat_frames(
    endpoint: &Arc<ChatEndpoint>,
    session: &mut ChatSession,
    outbound: &mpsc::Sender<Vec<u8>>,
    read_half: &mut OwnedReadHalf,
    buf: &mut Vec<u8>,
    peer: SocketAddr,
) -> std::io::Result<()> {
    loop {
        let Some(frame) = next_frame(read_half, buf).await? else {
            return Ok(());
        };
        let reply = match ChatMessage::decode(frame.id.0, &frame.body) {
            Ok(msg) => endpoint.handle(session, outbound, msg).await,
            Err(CodecError::UnknownMessageId(id)) => {
                log::debug!("chat: unknown message id {id} from {peer}");
                Some(ChatReply::InvalidMessage)
            }
            Err(e) => {
                log::debug!("chat: malformed frame from {peer}: {e}");
                return Ok(());
            }
        };
        if let Some(reply) = reply {
            let (id, body) = reply.encode();
            if outbound.send(frame_bytes(id, body)).await.is_err() {
                return Ok(());
            }
        }
    }
}
