//! Mongo-backed [`Storage`]. Collection layout follows the entity tables
//! spec §6 lists, collapsed into embedded arrays on the account/character
//! documents the way `examples/allanbatista-mu-rust/server/src/db/repository.rs`
//! already organizes `accounts`/`characters`.

use bson::{doc, oid::ObjectId};
use chrono::Utc;
use futures_util::stream::TryStreamExt;
use mongodb::{options::IndexOptions, Client, Collection, Database, IndexModel};

use async_trait::async_trait;

use crate::error::{BackboneError, Result};
use super::models::{
    AccountRow, AttributeRow, CharacterRow, DbVersionRow, FloorItemRow, GuildRow, KillCountRow,
    LetterRow, QuestVarRow, StatusEffectRow, TransactionRow, WorldStateVarRow,
};
use super::{AccountId, AccountWithCharacters, CharacterId, GuildId, Storage};

#[derive(Clone)]
pub struct MongoStorage {
    db: Database,
}

impl MongoStorage {
    #[must_use]
    pub fn new(client: Client, database_name: &str) -> Self {
        Self {
            db: client.database(database_name),
        }
    }

    fn accounts(&self) -> Collection<AccountRow> {
        self.db.collection("accounts")
    }

    fn characters(&self) -> Collection<CharacterRow> {
        self.db.collection("characters")
    }

    fn quest_vars(&self) -> Collection<QuestVarRow> {
        self.db.collection("quest_vars")
    }

    fn world_vars(&self) -> Collection<WorldStateVarRow> {
        self.db.collection("world_state_vars")
    }

    fn floor_items(&self) -> Collection<FloorItemRow> {
        self.db.collection("floor_items")
    }

    fn transactions(&self) -> Collection<TransactionRow> {
        self.db.collection("transactions")
    }

    fn letters(&self) -> Collection<LetterRow> {
        self.db.collection("letters")
    }

    fn guilds(&self) -> Collection<GuildRow> {
        self.db.collection("guilds")
    }

    fn db_version(&self) -> Collection<DbVersionRow> {
        self.db.collection("db_version")
    }

    /// Called once at startup, before any endpoint accepts clients: enforces
    /// the uniqueness invariants `doesUserNameExist`/`doesCharacterNameExist`
    /// rely on and clears every online flag a prior crash left set.
    pub async fn init(&self) -> Result<()> {
        let username_index = IndexModel::builder()
            .keys(doc! { "username": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.accounts().create_index(username_index).await?;

        let account_index = IndexModel::builder().keys(doc! { "account_id": 1 }).build();
        self.characters().create_index(account_index).await?;

        let character_name_index = IndexModel::builder()
            .keys(doc! { "name": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.characters().create_index(character_name_index).await?;

        self.clear_all_online_status().await?;
        log::info!("storage indexes ready, online flags cleared");
        Ok(())
    }
}

#[async_trait]
impl Storage for MongoStorage {
    async fn get_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AccountWithCharacters>> {
        let Some(account) = self.accounts().find_one(doc! { "username": username }).await? else {
            return Ok(None);
        };
        let id = account.id.expect("stored account has an id");
        let mut cursor = self.characters().find(doc! { "account_id": id }).await?;
        let mut characters = Vec::new();
        while let Some(character) = cursor.try_next().await? {
            characters.push(character);
        }
        Ok(Some(AccountWithCharacters { account, characters }))
    }

    async fn get_account_by_id(&self, id: AccountId) -> Result<Option<AccountWithCharacters>> {
        let Some(account) = self.accounts().find_one(doc! { "_id": id }).await? else {
            return Ok(None);
        };
        let mut cursor = self.characters().find(doc! { "account_id": id }).await?;
        let mut characters = Vec::new();
        while let Some(character) = cursor.try_next().await? {
            characters.push(character);
        }
        Ok(Some(AccountWithCharacters { account, characters }))
    }

    async fn add_account(&self, mut account: AccountRow) -> Result<AccountId> {
        account.id = None;
        let result = self.accounts().insert_one(&account).await?;
        Ok(result
            .inserted_id
            .as_object_id()
            .expect("inserted account id is an ObjectId"))
    }

    async fn flush_account(
        &self,
        account_id: AccountId,
        mut account: AccountRow,
        characters: Vec<CharacterRow>,
    ) -> Result<()> {
        account.id = Some(account_id);
        // Not a multi-document Mongo transaction (the teacher doesn't run a
        // replica set in dev); the delete+reinsert of the roster happens
        // right after the account write so a crash between the two only
        // ever loses character-level progress, never corrupts the account.
        self.accounts()
            .replace_one(doc! { "_id": account_id }, &account)
            .upsert(true)
            .await?;
        self.characters()
            .delete_many(doc! { "account_id": account_id })
            .await?;
        if !characters.is_empty() {
            let rows: Vec<CharacterRow> = characters
                .into_iter()
                .map(|mut row| {
                    row.account_id = account_id;
                    row
                })
                .collect();
            self.characters().insert_many(rows).await?;
        }
        Ok(())
    }

    async fn delete_account(&self, account_id: AccountId) -> Result<()> {
        let char_ids: Vec<ObjectId> = {
            let mut cursor = self.characters().find(doc! { "account_id": account_id }).await?;
            let mut ids = Vec::new();
            while let Some(character) = cursor.try_next().await? {
                ids.push(character.id.expect("stored character has an id"));
            }
            ids
        };
        self.accounts().delete_one(doc! { "_id": account_id }).await?;
        self.characters().delete_many(doc! { "account_id": account_id }).await?;
        for id in char_ids {
            self.transactions().delete_many(doc! { "character_id": id }).await?;
            self.letters().delete_many(doc! { "receiver_character_id": id }).await?;
            self.guilds()
                .update_many(doc! {}, doc! { "$pull": { "members": { "character_id": id } } })
                .await?;
        }
        Ok(())
    }

    async fn update_last_login(&self, account_id: AccountId) -> Result<()> {
        self.accounts()
            .update_one(
                doc! { "_id": account_id },
                doc! { "$set": { "last_login": bson::DateTime::from(Utc::now()) } },
            )
            .await?;
        Ok(())
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(self.accounts().find_one(doc! { "username": username }).await?.is_some())
    }

    async fn email_exists(&self, email_hash: &str) -> Result<bool> {
        Ok(self.accounts().find_one(doc! { "email_hash": email_hash }).await?.is_some())
    }

    async fn set_online_status(&self, account_id: AccountId, online: bool) -> Result<()> {
        self.accounts()
            .update_one(doc! { "_id": account_id }, doc! { "$set": { "online": online } })
            .await?;
        Ok(())
    }

    async fn set_account_level(&self, account_id: AccountId, level: u8) -> Result<()> {
        self.accounts()
            .update_one(
                doc! { "_id": account_id },
                doc! { "$set": { "access_level": i32::from(level) } },
            )
            .await?;
        Ok(())
    }

    async fn ban_account(
        &self,
        account_id: AccountId,
        banned_until: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let Some(account) = self.accounts().find_one(doc! { "_id": account_id }).await? else {
            return Err(BackboneError::AccountNotFound);
        };
        self.accounts()
            .update_one(
                doc! { "_id": account_id },
                doc! {
                    "$set": {
                        "prior_level": i32::from(account.access_level),
                        "access_level": i32::from(protocol::AccessLevel::Banned.to_u8()),
                        "banned_until": bson::DateTime::from(banned_until),
                    }
                },
            )
            .await?;
        Ok(())
    }

    async fn check_banned_accounts(&self) -> Result<Vec<AccountId>> {
        let now = bson::DateTime::from(Utc::now());
        let mut cursor = self
            .accounts()
            .find(doc! { "banned_until": { "$ne": bson::Bson::Null, "$lte": now } })
            .await?;
        let mut unbanned = Vec::new();
        while let Some(account) = cursor.try_next().await? {
            let id = account.id.expect("stored account has an id");
            let restore_level = account.prior_level.unwrap_or(protocol::AccessLevel::Player.to_u8());
            self.accounts()
                .update_one(
                    doc! { "_id": id },
                    doc! {
                        "$set": { "access_level": i32::from(restore_level) },
                        "$unset": { "banned_until": "", "prior_level": "" },
                    },
                )
                .await?;
            unbanned.push(id);
        }
        Ok(unbanned)
    }

    async fn get_character_by_id(&self, id: CharacterId) -> Result<Option<CharacterRow>> {
        Ok(self.characters().find_one(doc! { "_id": id }).await?)
    }

    async fn get_character_by_name(&self, name: &str) -> Result<Option<CharacterRow>> {
        Ok(self.characters().find_one(doc! { "name": name }).await?)
    }

    async fn get_character_id(&self, name: &str) -> Result<Option<CharacterId>> {
        Ok(self.get_character_by_name(name).await?.and_then(|row| row.id))
    }

    async fn character_name_exists(&self, name: &str) -> Result<bool> {
        Ok(self.characters().find_one(doc! { "name": name }).await?.is_some())
    }

    async fn update_character(&self, character: CharacterRow) -> Result<()> {
        let id = character
            .id
            .ok_or_else(|| BackboneError::Storage("character row missing id".into()))?;
        self.characters()
            .replace_one(doc! { "_id": id }, &character)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn update_character_points(
        &self,
        id: CharacterId,
        attr_points: i32,
        corr_points: i32,
    ) -> Result<()> {
        self.characters()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "attr_points": attr_points, "corr_points": corr_points } },
            )
            .await?;
        Ok(())
    }

    async fn update_attribute(&self, id: CharacterId, attribute: AttributeRow) -> Result<()> {
        let updated = self
            .characters()
            .update_one(
                doc! { "_id": id, "attributes.attr_id": i32::from(attribute.attr_id) },
                doc! {
                    "$set": {
                        "attributes.$.base": attribute.base,
                        "attributes.$.modified": attribute.modified,
                    }
                },
            )
            .await?;
        if updated.matched_count == 0 {
            self.characters()
                .update_one(
                    doc! { "_id": id },
                    doc! { "$push": { "attributes": bson::to_bson(&attribute)? } },
                )
                .await?;
        }
        Ok(())
    }

    async fn update_kill_count(&self, id: CharacterId, kill_count: KillCountRow) -> Result<()> {
        let updated = self
            .characters()
            .update_one(
                doc! { "_id": id, "kill_counts.monster_id": i32::from(kill_count.monster_id) },
                doc! { "$set": { "kill_counts.$.kills": kill_count.kills } },
            )
            .await?;
        if updated.matched_count == 0 {
            self.characters()
                .update_one(
                    doc! { "_id": id },
                    doc! { "$push": { "kill_counts": bson::to_bson(&kill_count)? } },
                )
                .await?;
        }
        Ok(())
    }

    async fn insert_status_effect(
        &self,
        id: CharacterId,
        status_effect: StatusEffectRow,
    ) -> Result<()> {
        self.characters()
            .update_one(
                doc! { "_id": id },
                doc! { "$push": { "status_effects": bson::to_bson(&status_effect)? } },
            )
            .await?;
        Ok(())
    }

    async fn get_quest_var(&self, owner_id: CharacterId, name: &str) -> Result<Option<String>> {
        Ok(self
            .quest_vars()
            .find_one(doc! { "owner_id": owner_id, "name": name })
            .await?
            .map(|row| row.value))
    }

    async fn set_quest_var(&self, owner_id: CharacterId, name: &str, value: &str) -> Result<()> {
        self.quest_vars()
            .update_one(
                doc! { "owner_id": owner_id, "name": name },
                doc! { "$set": { "value": value } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn get_world_state_var(&self, map_id: i32, name: &str) -> Result<Option<String>> {
        Ok(self
            .world_vars()
            .find_one(doc! { "map_id": map_id, "name": name })
            .await?
            .map(|row| row.value))
    }

    async fn set_world_state_var(&self, map_id: i32, name: &str, value: &str) -> Result<()> {
        self.world_vars()
            .update_one(
                doc! { "map_id": map_id, "name": name },
                doc! {
                    "$set": {
                        "value": value,
                        "modified_at": bson::DateTime::from(Utc::now()),
                    }
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn get_all_world_state_vars(&self, map_id: i32) -> Result<Vec<(String, String)>> {
        let mut cursor = self.world_vars().find(doc! { "map_id": map_id }).await?;
        let mut vars = Vec::new();
        while let Some(row) = cursor.try_next().await? {
            vars.push((row.name, row.value));
        }
        Ok(vars)
    }

    async fn add_floor_item(&self, item: FloorItemRow) -> Result<()> {
        self.floor_items().insert_one(&item).await?;
        Ok(())
    }

    async fn remove_floor_item(&self, item: FloorItemRow) -> Result<()> {
        self.floor_items()
            .delete_one(doc! {
                "map_id": i32::from(item.map_id),
                "item_id": item.item_id,
                "amount": i32::from(item.amount),
                "x": i32::from(item.x),
                "y": i32::from(item.y),
            })
            .await?;
        Ok(())
    }

    async fn get_floor_items_from_map(&self, map_id: i16) -> Result<Vec<FloorItemRow>> {
        let mut cursor = self.floor_items().find(doc! { "map_id": i32::from(map_id) }).await?;
        let mut items = Vec::new();
        while let Some(item) = cursor.try_next().await? {
            items.push(item);
        }
        Ok(items)
    }

    async fn add_transaction(&self, transaction: TransactionRow) -> Result<()> {
        self.transactions().insert_one(&transaction).await?;
        Ok(())
    }

    async fn get_transactions(&self, character_id: CharacterId) -> Result<Vec<TransactionRow>> {
        let mut cursor = self
            .transactions()
            .find(doc! { "character_id": character_id })
            .await?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.try_next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn store_letter(&self, letter: LetterRow) -> Result<()> {
        self.letters().insert_one(&letter).await?;
        Ok(())
    }

    async fn get_stored_post(&self, receiver_character_id: CharacterId) -> Result<Vec<LetterRow>> {
        let mut cursor = self
            .letters()
            .find(doc! { "receiver_character_id": receiver_character_id })
            .await?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.try_next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn delete_post(&self, letter_id: ObjectId) -> Result<()> {
        self.letters().delete_one(doc! { "_id": letter_id }).await?;
        Ok(())
    }

    async fn create_guild(&self, mut guild: GuildRow) -> Result<GuildId> {
        guild.id = None;
        let result = self.guilds().insert_one(&guild).await?;
        Ok(result
            .inserted_id
            .as_object_id()
            .expect("inserted guild id is an ObjectId"))
    }

    async fn delete_guild(&self, guild_id: GuildId) -> Result<()> {
        self.guilds().delete_one(doc! { "_id": guild_id }).await?;
        Ok(())
    }

    async fn get_guild_by_name(&self, name: &str) -> Result<Option<GuildRow>> {
        Ok(self.guilds().find_one(doc! { "name": name }).await?)
    }

    async fn get_guild_by_member(&self, character_id: CharacterId) -> Result<Option<GuildRow>> {
        Ok(self
            .guilds()
            .find_one(doc! { "members.character_id": character_id })
            .await?)
    }

    async fn add_guild_member(
        &self,
        guild_id: GuildId,
        character_id: CharacterId,
        rights: i16,
    ) -> Result<()> {
        self.guilds()
            .update_one(
                doc! { "_id": guild_id },
                doc! {
                    "$push": {
                        "members": { "character_id": character_id, "rights": i32::from(rights) }
                    }
                },
            )
            .await?;
        Ok(())
    }

    async fn remove_guild_member(
        &self,
        guild_id: GuildId,
        character_id: CharacterId,
    ) -> Result<()> {
        self.guilds()
            .update_one(
                doc! { "_id": guild_id },
                doc! { "$pull": { "members": { "character_id": character_id } } },
            )
            .await?;
        Ok(())
    }

    async fn set_guild_member_rights(
        &self,
        guild_id: GuildId,
        character_id: CharacterId,
        rights: i16,
    ) -> Result<()> {
        self.guilds()
            .update_one(
                doc! { "_id": guild_id, "members.character_id": character_id },
                doc! { "$set": { "members.$.rights": i32::from(rights) } },
            )
            .await?;
        Ok(())
    }

    async fn clear_all_online_status(&self) -> Result<()> {
        self.accounts()
            .update_many(doc! {}, doc! { "$set": { "online": false } })
            .await?;
        Ok(())
    }

    async fn get_db_version(&self) -> Result<Option<i32>> {
        let row = self.db_version().find_one(doc! {}).await?;
        Ok(row.map(|r| r.version))
    }

    async fn set_db_version(&self, version: i32) -> Result<()> {
        self.db_version()
            .update_one(doc! {}, doc! { "$set": { "version": version } })
            .upsert(true)
            .await?;
        Ok(())
    }
}
