//! Account endpoint (spec §4.3): the per-connection `{Login, Queued,
//! Connected}` state machine, character creation/select, and the client ↔
//! account message dispatch. Dispatch here is a `match` over the decoded
//! [`AccountMessage`] — the idiomatic replacement (spec §9) for the source's
//! virtual `processMessage` override: one dispatch point, no per-message
//! subclass.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use protocol::account::{AccountMessage, AccountReply, AttributeEntry, CharacterSummary, EquipEntry};
use protocol::game::{CharacterSnapshot, GameLinkReply, KillCountEntry, QuestLogEntry, StatusEffectEntry};
use protocol::{AccessLevel, ErrorKind};
use sha2::{Digest, Sha256};

use crate::config::BackboneConfig;
use crate::db::models::{AccountRow, AttributeRow, CharacterRow};
use crate::db::{AccountId, Storage};
use crate::registry::{CharacterIdMap, MapRegistry};
use crate::token::TokenCollector;

const LOGIN_RATE_LIMIT: Duration = Duration::from_secs(1);
const PENDING_LOGIN_DEADLINE: Duration = Duration::from_secs(30);
const CHAR_SELECT_TOKEN_TIMEOUT: Duration = Duration::from_secs(15);
const RECONNECT_TOKEN_TIMEOUT: Duration = Duration::from_secs(20);

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rejects stray quotes and any character that would break the legacy
/// client's fixed-width text fields. Real profanity filtering is out of
/// scope; this is the structural half of "content filter pass".
pub(crate) fn passes_content_filter(text: &str) -> bool {
    !text.is_empty()
        && !common::has_stray_quotes(text)
        && !text.contains('\'')
        && text.chars().all(|c| !c.is_control())
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

struct PendingLogin {
    account_id: AccountId,
    salt: String,
    deadline: Instant,
}

/// Minted on `CharSelect` and handed to the chat endpoint's token collector
/// via `addPendingConnect` so the chat client's later `CONNECT(token)`
/// resolves to a bound character.
#[derive(Debug, Clone)]
pub struct ChatHandoff {
    pub character_name: String,
    pub account_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Login,
    Queued,
    Connected { account_id: AccountId },
}

pub struct AccountSession {
    pub state: SessionState,
    pub peer_addr: IpAddr,
}

impl AccountSession {
    #[must_use]
    pub fn new(peer_addr: IpAddr) -> Self {
        Self {
            state: SessionState::Login,
            peer_addr,
        }
    }
}

pub struct AccountEndpoint {
    storage: Arc<dyn Storage>,
    config: Arc<BackboneConfig>,
    map_registry: MapRegistry,
    chat_tokens: Arc<TokenCollector<ChatHandoff>>,
    /// Primed by the game-server link's `PLAYER_RECONNECT` (spec §4.4) and
    /// consumed here by a client's own `Reconnect(token)` — the same
    /// rendezvous shape as `chat_tokens`, keyed by account id instead.
    reconnect_tokens: Arc<TokenCollector<AccountId>>,
    character_ids: CharacterIdMap,
    last_login_attempt: DashMap<IpAddr, Instant>,
    pending_logins: DashMap<String, PendingLogin>,
    connected_clients: AtomicU32,
}

impl AccountEndpoint {
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        config: Arc<BackboneConfig>,
        map_registry: MapRegistry,
        chat_tokens: Arc<TokenCollector<ChatHandoff>>,
        reconnect_tokens: Arc<TokenCollector<AccountId>>,
        character_ids: CharacterIdMap,
    ) -> Self {
        Self {
            storage,
            config,
            map_registry,
            chat_tokens,
            reconnect_tokens,
            character_ids,
            last_login_attempt: DashMap::new(),
            pending_logins: DashMap::new(),
            connected_clients: AtomicU32::new(0),
        }
    }

    /// Called by the game-server link when it receives `PLAYER_RECONNECT`:
    /// primes the rendezvous so a client dialing back in with this token is
    /// bound to `account_id` rather than timing out.
    pub fn prime_reconnect(&self, token: &str, account_id: AccountId) {
        self.reconnect_tokens
            .deposit_client_with_token(token, account_id, RECONNECT_TOKEN_TIMEOUT);
    }

    pub async fn handle(&self, session: &mut AccountSession, msg: AccountMessage) -> AccountReply {
        match msg {
            AccountMessage::LoginRandTrigger { username } => {
                self.login_rand_trigger(session, username).await
            }
            AccountMessage::Login {
                version,
                username,
                salted_hash,
            } => self.login(session, version, username, salted_hash).await,
            AccountMessage::Logout => self.logout(session).await,
            AccountMessage::Reconnect { token } => self.reconnect(session, token).await,
            AccountMessage::Register {
                version,
                username,
                password_hash,
                email,
                captcha,
            } => {
                self.register(session, version, username, password_hash, email, captcha)
                    .await
            }
            AccountMessage::Unregister {
                username,
                password_hash,
            } => self.unregister(session, username, password_hash).await,
            AccountMessage::EmailChange { email } => self.email_change(session, email).await,
            AccountMessage::PasswordChange { old_hash, new_hash } => {
                self.password_change(session, old_hash, new_hash).await
            }
            AccountMessage::CharCreate {
                name,
                hair_style,
                hair_color,
                gender,
                slot,
                attributes,
            } => {
                self.char_create(session, name, hair_style, hair_color, gender, slot, attributes)
                    .await
            }
            AccountMessage::CharSelect { slot } => self.char_select(session, slot).await,
            AccountMessage::CharDelete { slot } => self.char_delete(session, slot).await,
            AccountMessage::RequestRegisterInfo => self.request_register_info(),
        }
    }

    fn rate_limited(&self, addr: IpAddr) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_login_attempt.get(&addr) {
            if now.duration_since(*last) < LOGIN_RATE_LIMIT {
                return true;
            }
        }
        self.last_login_attempt.insert(addr, now);
        false
    }

    async fn login_rand_trigger(&self, session: &mut AccountSession, username: String) -> AccountReply {
        if session.state != SessionState::Login {
            return AccountReply::LoginRandTriggerResponse { salt: String::new() };
        }
        let Ok(Some(found)) = self.storage.get_account_by_username(&username).await else {
            // Don't reveal account existence: still hand back a salt.
            let salt = generate_salt();
            return AccountReply::LoginRandTriggerResponse { salt };
        };
        let salt = generate_salt();
        self.pending_logins.insert(
            username,
            PendingLogin {
                account_id: found.account.id.expect("stored account has an id"),
                salt: salt.clone(),
                deadline: Instant::now() + PENDING_LOGIN_DEADLINE,
            },
        );
        AccountReply::LoginRandTriggerResponse { salt }
    }

    async fn login(
        &self,
        session: &mut AccountSession,
        version: i32,
        username: String,
        salted_hash: String,
    ) -> AccountReply {
        if self.rate_limited(session.peer_addr) {
            return AccountReply::LoginResponse {
                status: ErrorKind::InvalidTime,
                update_host: String::new(),
                data_url: String::new(),
                max_chars: 0,
                characters: Vec::new(),
            };
        }

        const MIN_VERSION: i32 = 1;
        if version < MIN_VERSION {
            return fail_login(ErrorKind::InvalidVersion);
        }

        let Some((_, pending)) = self.pending_logins.remove(&username) else {
            return fail_login(ErrorKind::NoLogin);
        };
        if pending.deadline < Instant::now() {
            return fail_login(ErrorKind::InvalidTime);
        }

        let Ok(Some(found)) = self.storage.get_account_by_id(pending.account_id).await else {
            return fail_login(ErrorKind::InvalidArgument);
        };

        let expected = sha256_hex(&format!("{}{}", found.account.password_hash, pending.salt));
        if expected != salted_hash {
            return fail_login(ErrorKind::PasswordBad);
        }
        if found.account.access_level() == AccessLevel::Banned {
            return fail_login(ErrorKind::Banned);
        }
        if self.connected_client_count() >= self.config.net.max_clients {
            return fail_login(ErrorKind::ServerFull);
        }

        let account_id = found.account.id.expect("stored account has an id");
        if self.storage.update_last_login(account_id).await.is_err() {
            return fail_login(ErrorKind::Failure);
        }
        let _ = self.storage.set_online_status(account_id, true).await;
        session.state = SessionState::Connected { account_id };

        let characters = found
            .characters
            .iter()
            .map(character_row_to_summary)
            .collect();

        AccountReply::LoginResponse {
            status: ErrorKind::Ok,
            update_host: self.config.net.default_update_host.clone(),
            data_url: self.config.net.client_data_url.clone(),
            max_chars: self.config.account.max_characters as i8,
            characters,
        }
    }

    async fn logout(&self, session: &mut AccountSession) -> AccountReply {
        if let SessionState::Connected { account_id } = session.state {
            let _ = self.storage.set_online_status(account_id, false).await;
        }
        session.state = SessionState::Login;
        AccountReply::LogoutResponse { status: ErrorKind::Ok }
    }

    async fn reconnect(&self, session: &mut AccountSession, token: String) -> AccountReply {
        if session.state != SessionState::Login {
            return AccountReply::ReconnectResponse { status: ErrorKind::InvalidArgument };
        }
        session.state = SessionState::Queued;

        let Some(account_id) = self
            .reconnect_tokens
            .await_connect(&token, RECONNECT_TOKEN_TIMEOUT)
            .await
        else {
            session.state = SessionState::Login;
            return AccountReply::ReconnectResponse { status: ErrorKind::TimeOut };
        };
        let Ok(Some(_found)) = self.storage.get_account_by_id(account_id).await else {
            session.state = SessionState::Login;
            return AccountReply::ReconnectResponse { status: ErrorKind::Failure };
        };
        session.state = SessionState::Connected { account_id };
        AccountReply::ReconnectResponse { status: ErrorKind::Ok }
    }

    async fn register(
        &self,
        session: &mut AccountSession,
        version: i32,
        username: String,
        password_hash: String,
        email: String,
        _captcha: String,
    ) -> AccountReply {
        if session.state != SessionState::Login {
            return AccountReply::RegisterResponse { status: ErrorKind::InvalidArgument };
        }
        if !self.config.account.allow_register {
            return AccountReply::RegisterResponse { status: ErrorKind::InsufficientRights };
        }
        const MIN_VERSION: i32 = 1;
        if version < MIN_VERSION {
            return AccountReply::RegisterResponse { status: ErrorKind::InvalidVersion };
        }
        if !passes_content_filter(&username) || !common::length_in_range(&username, 4, 32) {
            return AccountReply::RegisterResponse { status: ErrorKind::InvalidArgument };
        }
        if !looks_like_email(&email) {
            return AccountReply::RegisterResponse { status: ErrorKind::InvalidArgument };
        }
        let email_hash = sha256_hex(&email);
        match self.storage.username_exists(&username).await {
            Ok(true) => return AccountReply::RegisterResponse { status: ErrorKind::ExistsUsername },
            Err(_) => return AccountReply::RegisterResponse { status: ErrorKind::Failure },
            Ok(false) => {}
        }
        match self.storage.email_exists(&email_hash).await {
            Ok(true) => return AccountReply::RegisterResponse { status: ErrorKind::ExistsEmail },
            Err(_) => return AccountReply::RegisterResponse { status: ErrorKind::Failure },
            Ok(false) => {}
        }

        let now = chrono::Utc::now();
        let account = AccountRow {
            id: None,
            username: username.clone(),
            password_hash: sha256_hex(&password_hash),
            email_hash,
            access_level: AccessLevel::Player.to_u8(),
            banned_until: None,
            prior_level: None,
            online: true,
            registration_date: now,
            last_login: now,
        };
        let Ok(account_id) = self.storage.add_account(account).await else {
            return AccountReply::RegisterResponse { status: ErrorKind::Failure };
        };
        log::info!("account registered: {username} ({account_id})");
        session.state = SessionState::Connected { account_id };
        AccountReply::RegisterResponse { status: ErrorKind::Ok }
    }

    async fn unregister(
        &self,
        session: &mut AccountSession,
        username: String,
        password_hash: String,
    ) -> AccountReply {
        let SessionState::Connected { account_id } = session.state else {
            return AccountReply::UnregisterResponse { status: ErrorKind::NoLogin };
        };
        let Ok(Some(found)) = self.storage.get_account_by_id(account_id).await else {
            return AccountReply::UnregisterResponse { status: ErrorKind::Failure };
        };
        if found.account.username != username
            || found.account.password_hash != sha256_hex(&password_hash)
        {
            return AccountReply::UnregisterResponse { status: ErrorKind::PasswordBad };
        }
        if self.storage.delete_account(account_id).await.is_err() {
            return AccountReply::UnregisterResponse { status: ErrorKind::Failure };
        }
        session.state = SessionState::Login;
        AccountReply::UnregisterResponse { status: ErrorKind::Ok }
    }

    async fn email_change(&self, session: &mut AccountSession, email: String) -> AccountReply {
        let SessionState::Connected { account_id } = session.state else {
            return AccountReply::EmailChangeResponse { status: ErrorKind::NoLogin };
        };
        if !looks_like_email(&email) {
            return AccountReply::EmailChangeResponse { status: ErrorKind::InvalidArgument };
        }
        let email_hash = sha256_hex(&email);
        match self.storage.email_exists(&email_hash).await {
            Ok(true) => return AccountReply::EmailChangeResponse { status: ErrorKind::ExistsEmail },
            Err(_) => return AccountReply::EmailChangeResponse { status: ErrorKind::Failure },
            Ok(false) => {}
        }
        let Ok(Some(mut found)) = self.storage.get_account_by_id(account_id).await else {
            return AccountReply::EmailChangeResponse { status: ErrorKind::Failure };
        };
        found.account.email_hash = email_hash;
        if self
            .storage
            .flush_account(account_id, found.account, found.characters)
            .await
            .is_err()
        {
            return AccountReply::EmailChangeResponse { status: ErrorKind::Failure };
        }
        AccountReply::EmailChangeResponse { status: ErrorKind::Ok }
    }

    async fn password_change(
        &self,
        session: &mut AccountSession,
        old_hash: String,
        new_hash: String,
    ) -> AccountReply {
        let SessionState::Connected { account_id } = session.state else {
            return AccountReply::PasswordChangeResponse { status: ErrorKind::NoLogin };
        };
        let Ok(Some(mut found)) = self.storage.get_account_by_id(account_id).await else {
            return AccountReply::PasswordChangeResponse { status: ErrorKind::Failure };
        };
        if found.account.password_hash != sha256_hex(&old_hash) {
            return AccountReply::PasswordChangeResponse { status: ErrorKind::PasswordBad };
        }
        // As-observed inconsistency (spec §9): unlike `Login`'s salted
        // comparison, `new_hash` is stored with a bare digest, no salt.
        found.account.password_hash = sha256_hex(&new_hash);
        if self
            .storage
            .flush_account(account_id, found.account, found.characters)
            .await
            .is_err()
        {
            return AccountReply::PasswordChangeResponse { status: ErrorKind::Failure };
        }
        AccountReply::PasswordChangeResponse { status: ErrorKind::Ok }
    }

    #[allow(clippy::too_many_arguments)]
    async fn char_create(
        &self,
        session: &mut AccountSession,
        name: String,
        hair_style: i8,
        hair_color: i8,
        gender: i8,
        slot: i8,
        attributes: Vec<i32>,
    ) -> AccountReply {
        let SessionState::Connected { account_id } = session.state else {
            return AccountReply::CharCreateResponse { status: ErrorKind::NoLogin, character: None };
        };

        if !passes_content_filter(&name)
            || !common::length_in_range(
                &name,
                self.config.character.min_name_length as usize,
                self.config.character.max_name_length as usize,
            )
        {
            return AccountReply::CharCreateResponse { status: ErrorKind::InvalidArgument, character: None };
        }
        if hair_style < 0 || hair_style as u8 >= self.config.character.num_hair_styles {
            return AccountReply::CharCreateResponse { status: ErrorKind::InvalidHairstyle, character: None };
        }
        if hair_color < 0 || hair_color as u8 >= self.config.character.num_hair_colors {
            return AccountReply::CharCreateResponse { status: ErrorKind::InvalidHaircolor, character: None };
        }
        if gender < 0 || gender as u8 >= self.config.character.num_genders {
            return AccountReply::CharCreateResponse { status: ErrorKind::InvalidGender, character: None };
        }
        if slot < 1 || slot as u8 > self.config.account.max_characters {
            return AccountReply::CharCreateResponse { status: ErrorKind::InvalidSlot, character: None };
        }

        let Ok(Some(found)) = self.storage.get_account_by_id(account_id).await else {
            return AccountReply::CharCreateResponse { status: ErrorKind::Failure, character: None };
        };
        if found.characters.len() as u8 >= self.config.account.max_characters {
            return AccountReply::CharCreateResponse { status: ErrorKind::TooManyChars, character: None };
        }
        if found.characters.iter().any(|c| c.slot == slot) {
            return AccountReply::CharCreateResponse { status: ErrorKind::InvalidSlot, character: None };
        }
        match self.storage.character_name_exists(&name).await {
            Ok(true) => return AccountReply::CharCreateResponse { status: ErrorKind::ExistsCharName, character: None },
            Err(_) => return AccountReply::CharCreateResponse { status: ErrorKind::Failure, character: None },
            Ok(false) => {}
        }

        let modifiable = &self.config.character.modifiable_attributes;
        if attributes.len() != modifiable.len() {
            return AccountReply::CharCreateResponse { status: ErrorKind::AttributesOutOfRange, character: None };
        }
        let mut sum = 0i64;
        for &value in &attributes {
            if value < self.config.character.attribute_min {
                return AccountReply::CharCreateResponse { status: ErrorKind::AttributesTooLow, character: None };
            }
            if value > self.config.character.attribute_max {
                return AccountReply::CharCreateResponse { status: ErrorKind::AttributesTooHigh, character: None };
            }
            sum += i64::from(value);
        }
        if sum != i64::from(self.config.character.starting_points) {
            return AccountReply::CharCreateResponse { status: ErrorKind::AttributesOutOfRange, character: None };
        }

        let attribute_rows: Vec<AttributeRow> = modifiable
            .iter()
            .zip(attributes.iter())
            .map(|(&attr_id, &value)| AttributeRow {
                attr_id,
                base: f64::from(value),
                modified: f64::from(value),
            })
            .collect();

        let character = CharacterRow {
            id: None,
            account_id,
            name: name.clone(),
            slot,
            gender,
            hair_style,
            hair_color,
            attr_points: self.config.character.starting_points,
            corr_points: 0,
            map_id: self.config.character.start_map,
            x: self.config.character.start_x,
            y: self.config.character.start_y,
            attributes: attribute_rows,
            status_effects: Vec::new(),
            kill_counts: Vec::new(),
            ability_ids: Vec::new(),
            quest_log: Vec::new(),
            inventory: Vec::new(),
        };

        let mut characters = found.characters;
        characters.push(character.clone());
        if self
            .storage
            .flush_account(account_id, found.account, characters)
            .await
            .is_err()
        {
            return AccountReply::CharCreateResponse { status: ErrorKind::Failure, character: None };
        }
        log::info!("CHAR_CREATE audit: account={account_id} name={name} slot={slot}");

        AccountReply::CharCreateResponse {
            status: ErrorKind::Ok,
            character: Some(character_row_to_summary(&character)),
        }
    }

    /// Pushes the character snapshot directly to the owning game server's
    /// link (no token rendezvous needed — that connection is already live)
    /// and deposits `(token, name, level)` with the chat endpoint's
    /// collector so the client's follow-up `CONNECT(token)` resolves.
    async fn char_select(&self, session: &mut AccountSession, slot: i8) -> AccountReply {
        let SessionState::Connected { account_id } = session.state else {
            return select_failure(ErrorKind::NoLogin);
        };
        let Ok(Some(found)) = self.storage.get_account_by_id(account_id).await else {
            return select_failure(ErrorKind::Failure);
        };
        let Some(character) = found.characters.iter().find(|c| c.slot == slot) else {
            return select_failure(ErrorKind::InvalidSlot);
        };
        let Some(game_handle) = self.map_registry.lookup(character.map_id) else {
            return select_failure(ErrorKind::Failure);
        };

        let game_token = crate::token::generate_token();
        let character_id = character.id.expect("persisted character has an id");
        let wire_character_id = crate::db::character_id_to_i32(character_id);
        self.character_ids.insert(wire_character_id, character_id);
        let snapshot = character_row_to_snapshot(character, found.account.access_level as i8);
        let player_enter = GameLinkReply::PlayerEnter {
            token: game_token.clone(),
            character_id: wire_character_id,
            name: character.name.clone(),
            snapshot,
        };
        let (id, body) = player_enter.encode();
        let mut frame = Vec::new();
        protocol::Frame {
            id: protocol::MessageId(id),
            body,
        }
        .encode_into(&mut frame);
        if game_handle.sender.send(frame).await.is_err() {
            return select_failure(ErrorKind::Failure);
        }

        self.chat_tokens.deposit_client_with_token(
            &game_token,
            ChatHandoff {
                character_name: character.name.clone(),
                account_level: found.account.access_level,
            },
            CHAR_SELECT_TOKEN_TIMEOUT,
        );

        log::info!("CHAR_SELECTED audit: account={account_id} slot={slot} map={}", character.map_id);

        AccountReply::CharSelectResponse {
            status: ErrorKind::Ok,
            token: game_token,
            game_address: game_handle.address.clone(),
            game_port: game_handle.port,
            chat_address: self.config.net.chat_host.clone(),
            chat_port: self.config.net.chat_listen_to_client_port as i16,
        }
    }

    async fn char_delete(&self, session: &mut AccountSession, slot: i8) -> AccountReply {
        let SessionState::Connected { account_id } = session.state else {
            return AccountReply::CharDeleteResponse { status: ErrorKind::NoLogin };
        };
        let Ok(Some(found)) = self.storage.get_account_by_id(account_id).await else {
            return AccountReply::CharDeleteResponse { status: ErrorKind::Failure };
        };
        if !found.characters.iter().any(|c| c.slot == slot) {
            return AccountReply::CharDeleteResponse { status: ErrorKind::InvalidSlot };
        }
        let remaining: Vec<CharacterRow> = found
            .characters
            .into_iter()
            .filter(|c| c.slot != slot)
            .collect();
        if self
            .storage
            .flush_account(account_id, found.account, remaining)
            .await
            .is_err()
        {
            return AccountReply::CharDeleteResponse { status: ErrorKind::Failure };
        }
        log::info!("CHAR_DELETE audit: account={account_id} slot={slot}");
        AccountReply::CharDeleteResponse { status: ErrorKind::Ok }
    }

    fn request_register_info(&self) -> AccountReply {
        AccountReply::RegisterInfoResponse {
            min_name_length: self.config.character.min_name_length as i8,
            max_name_length: self.config.character.max_name_length as i8,
            captcha_url: String::new(),
            allowed: self.config.account.allow_register,
            deny_reason: self.config.account.deny_register_reason.clone(),
        }
    }

    /// Called once per accepted TCP connection; paired with
    /// [`Self::on_disconnect`] so `connected_client_count` reflects live
    /// sessions rather than a placeholder.
    pub fn on_connect(&self) {
        self.connected_clients.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_disconnect(&self) {
        self.connected_clients.fetch_sub(1, Ordering::SeqCst);
    }

    fn connected_client_count(&self) -> u32 {
        self.connected_clients.load(Ordering::SeqCst)
    }

    /// Drops pending logins and party-style rendezvous entries whose
    /// deadline has passed. Called periodically by the endpoint's loop.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.pending_logins.retain(|_, entry| entry.deadline > now);
    }
}

fn generate_salt() -> String {
    use rand::Rng;
    let bytes: [u8; 8] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn fail_login(status: ErrorKind) -> AccountReply {
    AccountReply::LoginResponse {
        status,
        update_host: String::new(),
        data_url: String::new(),
        max_chars: 0,
        characters: Vec::new(),
    }
}

fn select_failure(status: ErrorKind) -> AccountReply {
    AccountReply::CharSelectResponse {
        status,
        token: String::new(),
        game_address: String::new(),
        game_port: 0,
        chat_address: String::new(),
        chat_port: 0,
    }
}

fn character_row_to_summary(row: &CharacterRow) -> CharacterSummary {
    CharacterSummary {
        slot: row.slot,
        name: row.name.clone(),
        gender: row.gender,
        hair_style: row.hair_style,
        hair_color: row.hair_color,
        attr_points: row.attr_points,
        corr_points: row.corr_points,
        equipment: row
            .inventory
            .iter()
            .filter_map(|item| {
                item.equipped_slot.map(|equip_slot| EquipEntry {
                    equip_slot,
                    item_id: item.item_id,
                })
            })
            .collect(),
        attributes: row
            .attributes
            .iter()
            .map(|a| AttributeEntry {
                id: a.attr_id,
                base_scaled: (a.base * 256.0) as i32,
                modified_scaled: (a.modified * 256.0) as i32,
            })
            .collect(),
    }
}

pub(crate) fn character_row_to_snapshot(row: &CharacterRow, account_level: i8) -> CharacterSnapshot {
    CharacterSnapshot {
        account_level,
        gender: row.gender,
        hair_style: row.hair_style,
        hair_color: row.hair_color,
        attr_points: row.attr_points,
        corr_points: row.corr_points,
        attributes: row.attributes.iter().map(|a| (a.attr_id, a.base)).collect(),
        status_effects: row
            .status_effects
            .iter()
            .map(|s| StatusEffectEntry { id: s.status_id, ticks: s.ticks })
            .collect(),
        map_id: row.map_id,
        x: row.x,
        y: row.y,
        kill_counts: row
            .kill_counts
            .iter()
            .map(|k| KillCountEntry { monster_id: k.monster_id, kills: k.kills })
            .collect(),
        ability_ids: row.ability_ids.clone(),
        quest_log: row
            .quest_log
            .iter()
            .map(|q| QuestLogEntry {
                id: q.quest_id,
                state: q.state,
                title: q.title.clone(),
                description: q.description.clone(),
            })
            .collect(),
        inventory: row
            .inventory
            .iter()
            .map(|i| protocol::game::InventoryEntry {
                slot: i.slot,
                item_id: i.item_id,
                amount: i.amount,
                equipped: i.equipped_slot.is_some(),
            })
            .collect(),
    }
}
