//! Storage abstraction (spec §4.7): a single object-safe async trait that
//! both the in-memory test double and the Mongo-backed implementation
//! satisfy. Nothing upstream of this module ever sees a `Collection<T>`.

pub mod memory;
pub mod models;
pub mod mongo;

pub use memory::InMemoryStorage;
pub use mongo::MongoStorage;

use async_trait::async_trait;
use bson::oid::ObjectId;

use crate::error::{BackboneError, Result};
use models::{
    AccountRow, AttributeRow, CharacterRow, FloorItemRow, GuildRow, KillCountRow, LetterRow,
    StatusEffectRow, TransactionRow,
};

pub type AccountId = ObjectId;
pub type CharacterId = ObjectId;
pub type GuildId = ObjectId;

/// The wire protocol carries 32-bit character ids (spec §6); storage keys
/// rows by `ObjectId`. Folds the id's low 4 bytes into an `i32` surrogate —
/// stable for a given `ObjectId`, not reversible, good enough since nothing
/// round-trips this value back into a lookup (every handler that needs the
/// character looks it up by `CharacterId`/name, never by this surrogate).
#[must_use]
pub fn character_id_to_i32(id: CharacterId) -> i32 {
    let bytes = id.bytes();
    i32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]])
}

/// An account together with the character rows filed under it, the shape
/// `getAccount` hands back per spec §4.7 ("populated character map").
#[derive(Debug, Clone)]
pub struct AccountWithCharacters {
    pub account: AccountRow,
    pub characters: Vec<CharacterRow>,
}

/// Storage backend used by every endpoint that needs persistence. All
/// methods are idempotent failure points: a storage error folds into
/// `ErrorKind::Failure` rather than dropping the caller's connection
/// (spec §7).
///
/// Invariants enforced by every implementation:
/// - passwords and emails arrive pre-hashed; this trait never hashes.
/// - `flush_account` is atomic per account: either every character row
///   and the account row land together, or none do.
/// - on process start the online-status flag on every account is cleared
///   (a crash never leaves an account "stuck" online).
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AccountWithCharacters>>;
    async fn get_account_by_id(&self, id: AccountId) -> Result<Option<AccountWithCharacters>>;
    async fn add_account(&self, account: AccountRow) -> Result<AccountId>;

    /// Atomic upsert/insert/update/delete-diff of an account plus its full
    /// roster against what's currently stored.
    async fn flush_account(
        &self,
        account_id: AccountId,
        account: AccountRow,
        characters: Vec<CharacterRow>,
    ) -> Result<()>;

    /// Cascades to every character row, guild membership, letter and
    /// transaction filed under the account.
    async fn delete_account(&self, account_id: AccountId) -> Result<()>;
    async fn update_last_login(&self, account_id: AccountId) -> Result<()>;
    async fn username_exists(&self, username: &str) -> Result<bool>;
    async fn email_exists(&self, email_hash: &str) -> Result<bool>;
    async fn set_online_status(&self, account_id: AccountId, online: bool) -> Result<()>;
    async fn set_account_level(&self, account_id: AccountId, level: u8) -> Result<()>;

    /// Bans until `banned_until`, stashing the level that was active so it
    /// can be restored (spec §9 open question: restoration is modeled only
    /// when a prior level was actually recorded).
    async fn ban_account(
        &self,
        account_id: AccountId,
        banned_until: chrono::DateTime<chrono::Utc>,
    ) -> Result<()>;

    /// Clears bans whose `banned_until` has passed, restoring `prior_level`
    /// where present. Returns the accounts that were unbanned.
    async fn check_banned_accounts(&self) -> Result<Vec<AccountId>>;

    async fn get_character_by_id(&self, id: CharacterId) -> Result<Option<CharacterRow>>;
    async fn get_character_by_name(&self, name: &str) -> Result<Option<CharacterRow>>;
    async fn get_character_id(&self, name: &str) -> Result<Option<CharacterId>>;
    async fn character_name_exists(&self, name: &str) -> Result<bool>;
    async fn update_character(&self, character: CharacterRow) -> Result<()>;
    async fn update_character_points(
        &self,
        id: CharacterId,
        attr_points: i32,
        corr_points: i32,
    ) -> Result<()>;
    async fn update_attribute(&self, id: CharacterId, attribute: AttributeRow) -> Result<()>;
    async fn update_kill_count(&self, id: CharacterId, kill_count: KillCountRow) -> Result<()>;
    async fn insert_status_effect(
        &self,
        id: CharacterId,
        status_effect: StatusEffectRow,
    ) -> Result<()>;

    async fn get_quest_var(&self, owner_id: CharacterId, name: &str) -> Result<Option<String>>;
    async fn set_quest_var(&self, owner_id: CharacterId, name: &str, value: &str) -> Result<()>;

    async fn get_world_state_var(&self, map_id: i32, name: &str) -> Result<Option<String>>;
    async fn set_world_state_var(&self, map_id: i32, name: &str, value: &str) -> Result<()>;
    async fn get_all_world_state_vars(&self, map_id: i32) -> Result<Vec<(String, String)>>;

    async fn add_floor_item(&self, item: FloorItemRow) -> Result<()>;
    async fn remove_floor_item(&self, item: FloorItemRow) -> Result<()>;
    async fn get_floor_items_from_map(&self, map_id: i16) -> Result<Vec<FloorItemRow>>;

    async fn add_transaction(&self, transaction: TransactionRow) -> Result<()>;
    async fn get_transactions(&self, character_id: CharacterId) -> Result<Vec<TransactionRow>>;

    async fn store_letter(&self, letter: LetterRow) -> Result<()>;
    async fn get_stored_post(&self, receiver_character_id: CharacterId) -> Result<Vec<LetterRow>>;
    async fn delete_post(&self, letter_id: ObjectId) -> Result<()>;

    async fn create_guild(&self, guild: GuildRow) -> Result<GuildId>;
    async fn delete_guild(&self, guild_id: GuildId) -> Result<()>;
    async fn get_guild_by_name(&self, name: &str) -> Result<Option<GuildRow>>;
    async fn get_guild_by_member(&self, character_id: CharacterId) -> Result<Option<GuildRow>>;
    async fn add_guild_member(
        &self,
        guild_id: GuildId,
        character_id: CharacterId,
        rights: i16,
    ) -> Result<()>;
    async fn remove_guild_member(&self, guild_id: GuildId, character_id: CharacterId)
        -> Result<()>;
    async fn set_guild_member_rights(
        &self,
        guild_id: GuildId,
        character_id: CharacterId,
        rights: i16,
    ) -> Result<()>;

    /// Clears every account's online flag. Called once at startup (spec
    /// §4.7): a crash must never leave an account stuck "online" forever.
    async fn clear_all_online_status(&self) -> Result<()>;

    async fn get_db_version(&self) -> Result<Option<i32>>;
    async fn set_db_version(&self, version: i32) -> Result<()>;

    /// Checks the persisted `db_version` document against
    /// [`SUPPORTED_DB_VERSION`] (spec §4.7). A fresh store (no document
    /// yet) is stamped with the current version; a stored version this
    /// build doesn't understand refuses to start rather than risk
    /// silently misreading rows written by a different schema (spec §1
    /// Non-goals: no migration beyond this single check).
    async fn open(&self) -> Result<()> {
        match self.get_db_version().await? {
            None => self.set_db_version(SUPPORTED_DB_VERSION).await,
            Some(version) if version == SUPPORTED_DB_VERSION => Ok(()),
            Some(version) => Err(BackboneError::Config(format!(
                "unsupported database version {version}, expected {SUPPORTED_DB_VERSION}"
            ))),
        }
    }
}

/// Schema version this build understands. Bump alongside any change to
/// the persisted row shapes that isn't self-describing.
pub const SUPPORTED_DB_VERSION: i32 = 1;
