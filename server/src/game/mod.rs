//! Game-server link (spec §4.4): the long-lived server-to-server connection
//! between a map/game server and this backbone. One `GameSession` per
//! connection; `GameServerLink` holds the shared state every connection
//! dispatches against (storage, registry, the account endpoint for
//! reconnect priming, and a channel to forward `ANNOUNCE` to chat).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use protocol::game::{
    FloorItem, GameLinkMessage, GameLinkReply, MailAttachment, StoredLetter, SyncEntry,
};
use protocol::{Frame, MessageId};
use tokio::sync::mpsc;

use crate::account::AccountEndpoint;
use crate::config::BackboneConfig;
use crate::db::models::{AttributeRow, FloorItemRow, LetterAttachmentRow, LetterRow, TransactionRow};
use crate::db::Storage;
use crate::monitor::HealthMonitor;
use crate::registry::{CharacterIdMap, GameServerHandle, MapRegistry};

/// Forwarded to the chat endpoint so it can broadcast a system announcement.
#[derive(Debug, Clone)]
pub struct AnnounceEvent {
    pub message: String,
    pub sender_id: i32,
    pub sender_name: String,
}

pub struct GameSession {
    pub server_id: u64,
    pub name: String,
    pub registered: bool,
}

impl GameSession {
    #[must_use]
    pub fn new(server_id: u64) -> Self {
        Self {
            server_id,
            name: String::new(),
            registered: false,
        }
    }
}

fn encode(reply: &GameLinkReply) -> Vec<u8> {
    let (id, body) = reply.encode();
    let mut out = Vec::new();
    Frame {
        id: MessageId(id),
        body,
    }
    .encode_into(&mut out);
    out
}

pub struct GameServerLink {
    storage: Arc<dyn Storage>,
    config: Arc<BackboneConfig>,
    map_registry: MapRegistry,
    character_ids: CharacterIdMap,
    account: Arc<AccountEndpoint>,
    announce_tx: mpsc::Sender<AnnounceEvent>,
    health: HealthMonitor,
    next_server_id: AtomicU64,
}

impl GameServerLink {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<dyn Storage>,
        config: Arc<BackboneConfig>,
        map_registry: MapRegistry,
        character_ids: CharacterIdMap,
        account: Arc<AccountEndpoint>,
        announce_tx: mpsc::Sender<AnnounceEvent>,
        health: HealthMonitor,
    ) -> Self {
        Self {
            storage,
            config,
            map_registry,
            character_ids,
            account,
            announce_tx,
            health,
            next_server_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn next_server_id(&self) -> u64 {
        self.next_server_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn on_disconnect(&self, session: &GameSession) {
        if session.registered {
            self.map_registry.release(session.server_id);
            log::info!("game server '{}' disconnected, maps released", session.name);
        }
    }

    /// Dispatches one decoded message. Returns the reply this connection
    /// should receive directly, if any — several handlers (fan-out,
    /// priming another endpoint) have no per-message reply of their own.
    pub async fn handle(
        &self,
        session: &mut GameSession,
        outbound: &mpsc::Sender<Vec<u8>>,
        msg: GameLinkMessage,
    ) -> Option<GameLinkReply> {
        match msg {
            GameLinkMessage::Register {
                name,
                address,
                port,
                password,
                item_db_version,
            } => {
                self.register(session, outbound, name, address, port, password, item_db_version)
                    .await
            }
            GameLinkMessage::PlayerData {
                character_id,
                snapshot,
            } => {
                self.player_data(character_id, snapshot).await;
                None
            }
            GameLinkMessage::PlayerSync { entries } => {
                self.player_sync(entries).await;
                None
            }
            GameLinkMessage::Redirect { character_id } => self.redirect(character_id).await,
            GameLinkMessage::PlayerReconnect { character_id, token } => {
                self.player_reconnect(character_id, &token).await;
                None
            }
            GameLinkMessage::GetVarChr { character_id, name } => {
                self.get_var_chr(character_id, name).await
            }
            GameLinkMessage::SetVarChr {
                character_id,
                name,
                value,
            } => {
                self.set_var_chr(character_id, name, value).await;
                None
            }
            GameLinkMessage::SetVarWorld { name, value } => {
                self.set_var_world(name, value).await;
                None
            }
            GameLinkMessage::SetVarMap { map_id, name, value } => {
                self.set_var_map(map_id, name, value).await;
                None
            }
            GameLinkMessage::BanPlayer {
                character_id,
                duration_minutes,
            } => {
                self.ban_player(character_id, duration_minutes).await;
                None
            }
            GameLinkMessage::ChangeAccountLevel { character_id, level } => {
                self.change_account_level(character_id, level).await;
                None
            }
            GameLinkMessage::Statistics { entries } => {
                self.statistics(session, entries);
                None
            }
            GameLinkMessage::CreateItemOnMap {
                map_id,
                item_id,
                amount,
                x,
                y,
            } => {
                self.create_item_on_map(map_id, item_id, amount, x, y).await;
                None
            }
            GameLinkMessage::RemoveItemOnMap { map_id, item_id, x, y } => {
                self.remove_item_on_map(map_id, item_id, x, y).await;
                None
            }
            GameLinkMessage::Announce {
                message,
                sender_id,
                sender_name,
            } => {
                self.announce(message, sender_id, sender_name).await;
                None
            }
            GameLinkMessage::Transaction {
                character_id,
                action,
                message,
            } => {
                self.transaction(character_id, action, message).await;
                None
            }
            GameLinkMessage::RequestPost { character_id } => {
                self.request_post(character_id).await
            }
            GameLinkMessage::StorePost {
                sender_id,
                receiver_name,
                text,
                attachments,
            } => {
                self.store_post(sender_id, receiver_name, text, attachments).await;
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn register(
        &self,
        session: &mut GameSession,
        outbound: &mpsc::Sender<Vec<u8>>,
        name: String,
        address: String,
        port: i16,
        password: String,
        item_db_version: i32,
    ) -> Option<GameLinkReply> {
        if password != self.config.net.password {
            log::warn!("game server '{name}' rejected: shared secret mismatch");
            return Some(GameLinkReply::RegisterResponse {
                db_status: protocol::ErrorKind::Failure,
                password_status: protocol::ErrorKind::PasswordBad,
                world_vars: Vec::new(),
            });
        }

        session.registered = true;
        session.name = name.clone();
        let handle = GameServerHandle {
            server_id: session.server_id,
            address,
            port,
            sender: outbound.clone(),
        };

        for (map_id, owner) in &self.config.game.map_assignments {
            if owner != &name {
                continue;
            }
            let map_id = *map_id;
            self.map_registry.claim(map_id, handle.clone());
            let vars = self
                .storage
                .get_all_world_state_vars(i32::from(map_id))
                .await
                .unwrap_or_default();
            let floor_items = self
                .storage
                .get_floor_items_from_map(map_id)
                .await
                .unwrap_or_default()
                .into_iter()
                .map(|row| FloorItem {
                    item_id: row.item_id,
                    amount: row.amount,
                    x: row.x,
                    y: row.y,
                })
                .collect();
            let active_map = GameLinkReply::ActiveMap {
                map_id,
                vars,
                floor_items,
            };
            let _ = outbound.send(encode(&active_map)).await;
        }

        let world_vars = self
            .storage
            .get_all_world_state_vars(0)
            .await
            .unwrap_or_default();
        // Mirrors the original's REGISTER handshake: the connecting game
        // server reports the version of its local item database copy, and
        // the backbone accepts it only if it matches the version recorded
        // against the account store (serverhandler.cpp's
        // `dbversion == mStorage->getItemDatabaseVersion()`).
        let db_status = match self.storage.get_db_version().await {
            Ok(Some(stored)) if stored == item_db_version => protocol::ErrorKind::DataVersionOk,
            Ok(_) => protocol::ErrorKind::DataVersionOutdated,
            Err(e) => {
                log::error!("failed to read db version while registering '{name}': {e}");
                protocol::ErrorKind::Failure
            }
        };

        log::info!("game server '{name}' registered, claiming its configured maps");
        Some(GameLinkReply::RegisterResponse {
            db_status,
            password_status: protocol::ErrorKind::Ok,
            world_vars,
        })
    }

    async fn player_data(&self, wire_character_id: i32, snapshot: protocol::game::CharacterSnapshot) {
        let Some(character_id) = self.character_ids.resolve(wire_character_id) else {
            log::warn!("PLAYER_DATA for unknown character {wire_character_id}");
            return;
        };
        let Ok(Some(mut row)) = self.storage.get_character_by_id(character_id).await else {
            return;
        };
        apply_snapshot(&mut row, &snapshot);
        let _ = self.storage.update_character(row).await;
    }

    async fn player_sync(&self, entries: Vec<SyncEntry>) {
        for entry in entries {
            match entry {
                SyncEntry::CharPoints {
                    char_id,
                    attr_points,
                    corr_points,
                } => {
                    if let Some(id) = self.character_ids.resolve(char_id) {
                        let _ = self
                            .storage
                            .update_character_points(id, attr_points, corr_points)
                            .await;
                    }
                }
                SyncEntry::Attribute {
                    char_id,
                    attr_id,
                    base,
                    modified,
                } => {
                    if let Some(id) = self.character_ids.resolve(char_id) {
                        let _ = self
                            .storage
                            .update_attribute(id, AttributeRow { attr_id, base, modified })
                            .await;
                    }
                }
                SyncEntry::OnlineStatus { char_id, online } => {
                    if let Some(id) = self.character_ids.resolve(char_id) {
                        if let Ok(Some(row)) = self.storage.get_character_by_id(id).await {
                            let _ = self.storage.set_online_status(row.account_id, online).await;
                        }
                    }
                }
            }
        }
    }

    async fn redirect(&self, wire_character_id: i32) -> Option<GameLinkReply> {
        let character_id = self.character_ids.resolve(wire_character_id)?;
        let row = self.storage.get_character_by_id(character_id).await.ok()??;
        let target = self.map_registry.lookup(row.map_id)?;

        let token = crate::token::generate_token();
        self.character_ids.insert(wire_character_id, character_id);
        let account = self.storage.get_account_by_id(row.account_id).await.ok()??;
        let snapshot =
            crate::account::character_row_to_snapshot(&row, account.account.access_level as i8);
        let player_enter = GameLinkReply::PlayerEnter {
            token: token.clone(),
            character_id: wire_character_id,
            name: row.name.clone(),
            snapshot,
        };
        let _ = target.sender.send(encode(&player_enter)).await;

        Some(GameLinkReply::RedirectResponse {
            character_id: wire_character_id,
            token,
            address: target.address,
            port: target.port,
        })
    }

    async fn player_reconnect(&self, wire_character_id: i32, token: &str) {
        let Some(character_id) = self.character_ids.resolve(wire_character_id) else {
            return;
        };
        let Ok(Some(row)) = self.storage.get_character_by_id(character_id).await else {
            return;
        };
        self.account.prime_reconnect(token, row.account_id);
    }

    async fn get_var_chr(&self, wire_character_id: i32, name: String) -> Option<GameLinkReply> {
        let character_id = self.character_ids.resolve(wire_character_id)?;
        let value = self
            .storage
            .get_quest_var(character_id, &name)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        Some(GameLinkReply::GetVarChrResponse {
            character_id: wire_character_id,
            name,
            value,
        })
    }

    async fn set_var_chr(&self, wire_character_id: i32, name: String, value: String) {
        if let Some(character_id) = self.character_ids.resolve(wire_character_id) {
            let _ = self.storage.set_quest_var(character_id, &name, &value).await;
        }
    }

    async fn set_var_world(&self, name: String, value: String) {
        if self.storage.set_world_state_var(0, &name, &value).await.is_err() {
            return;
        }
        let reply = GameLinkReply::SetVarWorld { name, value };
        for server in self.map_registry.distinct_servers() {
            let _ = server.sender.send(encode(&reply)).await;
        }
    }

    async fn set_var_map(&self, map_id: i16, name: String, value: String) {
        let _ = self
            .storage
            .set_world_state_var(i32::from(map_id), &name, &value)
            .await;
    }

    async fn ban_player(&self, wire_character_id: i32, duration_minutes: i32) {
        let Some(character_id) = self.character_ids.resolve(wire_character_id) else {
            return;
        };
        let Ok(Some(row)) = self.storage.get_character_by_id(character_id).await else {
            return;
        };
        let banned_until = Utc::now() + chrono::Duration::minutes(i64::from(duration_minutes));
        let _ = self.storage.ban_account(row.account_id, banned_until).await;
    }

    async fn change_account_level(&self, wire_character_id: i32, level: i8) {
        let Some(character_id) = self.character_ids.resolve(wire_character_id) else {
            return;
        };
        let Ok(Some(row)) = self.storage.get_character_by_id(character_id).await else {
            return;
        };
        let _ = self.storage.set_account_level(row.account_id, level as u8).await;
    }

    /// No per-map counter is modeled in storage; unknown map ids are
    /// silently skipped per spec §4.4, known ones just logged. Total player
    /// count across this server's maps doubles as its health heartbeat.
    fn statistics(&self, session: &GameSession, entries: Vec<(i16, i16, i16, i16)>) {
        let mut total_players: u32 = 0;
        for (map_id, players, monsters, map_entities) in entries {
            if self.map_registry.lookup(map_id).is_none() {
                continue;
            }
            total_players += u32::from(players.max(0) as u16);
            log::debug!(
                "map {map_id} stats: players={players} monsters={monsters} entities={map_entities}"
            );
        }
        if session.registered {
            self.health.record_heartbeat(session.name.clone(), total_players);
        }
    }

    async fn create_item_on_map(&self, map_id: i16, item_id: i32, amount: i16, x: i16, y: i16) {
        let _ = self
            .storage
            .add_floor_item(FloorItemRow {
                map_id,
                item_id,
                amount,
                x,
                y,
            })
            .await;
    }

    /// `REMOVE_ITEM_ON_MAP` carries no `amount` (spec §6) even though floor
    /// items are keyed by `(mapId, itemId, amount, x, y)` — look up whatever
    /// stack occupies the tile and remove that exact row.
    async fn remove_item_on_map(&self, map_id: i16, item_id: i32, x: i16, y: i16) {
        let Ok(items) = self.storage.get_floor_items_from_map(map_id).await else {
            return;
        };
        if let Some(row) = items
            .into_iter()
            .find(|row| row.item_id == item_id && row.x == x && row.y == y)
        {
            let _ = self.storage.remove_floor_item(row).await;
        }
    }

    async fn announce(&self, message: String, sender_id: i32, sender_name: String) {
        log::info!("ANNOUNCE audit: sender={sender_name} ({sender_id}): {message}");
        let _ = self
            .announce_tx
            .send(AnnounceEvent {
                message,
                sender_id,
                sender_name,
            })
            .await;
    }

    async fn transaction(&self, wire_character_id: i32, action: i32, message: String) {
        let Some(character_id) = self.character_ids.resolve(wire_character_id) else {
            return;
        };
        let _ = self
            .storage
            .add_transaction(TransactionRow {
                id: None,
                character_id,
                action,
                message,
                occurred_at: Utc::now(),
            })
            .await;
    }

    async fn request_post(&self, wire_character_id: i32) -> Option<GameLinkReply> {
        let character_id = self.character_ids.resolve(wire_character_id)?;
        let letters = self.storage.get_stored_post(character_id).await.ok()?;
        for letter in &letters {
            if let Some(id) = letter.id {
                let _ = self.storage.delete_post(id).await;
            }
        }
        let letters = letters
            .into_iter()
            .map(|row| StoredLetter {
                id: row.id.map_or(0, crate::db::character_id_to_i32),
                sender_name: row.sender_name,
                expiry: row.expiry.timestamp(),
                letter_type: row.letter_type,
                text: row.text,
                attachments: row
                    .attachments
                    .into_iter()
                    .map(|a| (a.item_id, a.amount))
                    .collect(),
            })
            .collect();
        Some(GameLinkReply::RequestPostResponse {
            character_id: wire_character_id,
            letters,
        })
    }

    async fn store_post(
        &self,
        sender_wire_id: i32,
        receiver_name: String,
        text: String,
        attachments: Vec<MailAttachment>,
    ) {
        let Ok(Some(receiver)) = self.storage.get_character_by_name(&receiver_name).await else {
            return;
        };
        let sender_name = match self.character_ids.resolve(sender_wire_id) {
            Some(id) => self
                .storage
                .get_character_by_id(id)
                .await
                .ok()
                .flatten()
                .map(|row| row.name)
                .unwrap_or_default(),
            None => String::new(),
        };
        let cap = self.config.mail.max_attachments as usize;
        let attachments: Vec<LetterAttachmentRow> = attachments
            .into_iter()
            .take(cap)
            .map(|a| LetterAttachmentRow {
                item_id: a.item_id,
                amount: a.amount,
            })
            .collect();

        let letter = LetterRow {
            id: None,
            sender_character_id: self
                .character_ids
                .resolve(sender_wire_id)
                .unwrap_or_else(bson::oid::ObjectId::new),
            sender_name,
            receiver_character_id: receiver.id.expect("persisted character has an id"),
            expiry: Utc::now() + chrono::Duration::days(30),
            letter_type: 0,
            text,
            attachments,
        };
        let _ = self.storage.store_letter(letter).await;
    }
}

fn apply_snapshot(row: &mut crate::db::models::CharacterRow, snapshot: &protocol::game::CharacterSnapshot) {
    row.gender = snapshot.gender;
    row.hair_style = snapshot.hair_style;
    row.hair_color = snapshot.hair_color;
    row.attr_points = snapshot.attr_points;
    row.corr_points = snapshot.corr_points;
    row.map_id = snapshot.map_id;
    row.x = snapshot.x;
    row.y = snapshot.y;
    row.attributes = snapshot
        .attributes
        .iter()
        .map(|&(attr_id, base)| AttributeRow {
            attr_id,
            base,
            modified: base,
        })
        .collect();
    row.status_effects = snapshot
        .status_effects
        .iter()
        .map(|s| crate::db::models::StatusEffectRow {
            status_id: s.id,
            ticks: s.ticks,
        })
        .collect();
    row.kill_counts = snapshot
        .kill_counts
        .iter()
        .map(|k| crate::db::models::KillCountRow {
            monster_id: k.monster_id,
            kills: k.kills,
        })
        .collect();
    row.ability_ids = snapshot.ability_ids.clone();
    row.quest_log = snapshot
        .quest_log
        .iter()
        .map(|q| crate::db::models::QuestLogRow {
            quest_id: q.id,
            state: q.state,
            title: q.title.clone(),
            description: q.description.clone(),
        })
        .collect();
    row.inventory = snapshot
        .inventory
        .iter()
        .map(|i| crate::db::models::InventoryRow {
            slot: i.slot,
            item_id: i.item_id,
            amount: i.amount,
            equipped_slot: if i.equipped { Some(i.slot) } else { None },
        })
        .collect();
}
