//! Ambient ops surface: an actix-web diagnostics server exposing registry,
//! token-collector, and game-server health state. Not a spec module — spec
//! §1 treats admin/ops tooling as an external collaborator — but carried
//! because the teacher ships one and a real deployment needs it regardless
//! of what the domain spec excludes.

pub mod health;

pub use health::HealthMonitor;

use actix_web::{get, web, App, HttpServer};
use serde::Serialize;
use std::sync::Arc;

use crate::account::ChatHandoff;
use crate::db::AccountId;
use crate::registry::MapRegistry;
use crate::token::TokenCollector;

#[derive(Clone)]
pub struct MonitorState {
    pub map_registry: MapRegistry,
    pub health: HealthMonitor,
    pub chat_tokens: Arc<TokenCollector<ChatHandoff>>,
    pub reconnect_tokens: Arc<TokenCollector<AccountId>>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[get("/healthz")]
async fn health_check() -> web::Json<HealthResponse> {
    web::Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct MapEntry {
    map_id: i16,
    server_id: u64,
    address: String,
    port: i16,
}

#[derive(Serialize)]
struct RegistryResponse {
    map_count: usize,
    maps: Vec<MapEntry>,
}

#[get("/registry")]
async fn registry_status(state: web::Data<MonitorState>) -> web::Json<RegistryResponse> {
    let maps = state
        .map_registry
        .iterate()
        .into_iter()
        .map(|(map_id, handle)| MapEntry {
            map_id,
            server_id: handle.server_id,
            address: handle.address,
            port: handle.port,
        })
        .collect();
    web::Json(RegistryResponse { map_count: state.map_registry.map_count(), maps })
}

#[derive(Serialize)]
struct WorldStatus {
    name: String,
    players: u32,
}

#[derive(Serialize)]
struct HealthSummary {
    online_servers: usize,
    worlds: Vec<WorldStatus>,
}

#[get("/servers")]
async fn server_health(state: web::Data<MonitorState>) -> web::Json<HealthSummary> {
    let worlds = state
        .health
        .get_all_online_worlds()
        .into_iter()
        .map(|(name, players)| WorldStatus { name, players })
        .collect();
    web::Json(HealthSummary { online_servers: state.health.online_world_count(), worlds })
}

#[derive(Serialize)]
struct TokenSummary {
    pending_chat_handoffs: usize,
    pending_reconnects: usize,
}

#[get("/tokens")]
async fn token_status(state: web::Data<MonitorState>) -> web::Json<TokenSummary> {
    web::Json(TokenSummary {
        pending_chat_handoffs: state.chat_tokens.pending_client_count(),
        pending_reconnects: state.reconnect_tokens.pending_client_count(),
    })
}

/// Runs the ops HTTP server until the process shuts down. Intended to be
/// spawned as its own task alongside the three TCP endpoints.
pub async fn run(state: MonitorState, bind_addr: &str) -> std::io::Result<()> {
    let state = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(health_check)
            .service(registry_status)
            .service(server_health)
            .service(token_status)
    })
    .bind(bind_addr)?
    .run()
    .await
}
