//! A dashmap-backed `Storage` used by unit and integration tests. Keeps the
//! same atomicity contract as the Mongo backend without needing a server.

use bson::oid::ObjectId;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{BackboneError, Result};
use super::models::{
    AccountRow, AttributeRow, CharacterRow, FloorItemRow, GuildRow, KillCountRow, LetterRow,
    StatusEffectRow, TransactionRow,
};
use super::{AccountId, AccountWithCharacters, CharacterId, GuildId, Storage};

#[derive(Default)]
pub struct InMemoryStorage {
    accounts: DashMap<AccountId, AccountRow>,
    characters: DashMap<CharacterId, CharacterRow>,
    quest_vars: DashMap<(CharacterId, String), String>,
    world_vars: DashMap<(i32, String), String>,
    floor_items: Mutex<Vec<FloorItemRow>>,
    transactions: DashMap<CharacterId, Vec<TransactionRow>>,
    letters: DashMap<ObjectId, LetterRow>,
    guilds: DashMap<GuildId, GuildRow>,
    db_version: Mutex<Option<i32>>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AccountWithCharacters>> {
        let Some(account) = self
            .accounts
            .iter()
            .find(|entry| entry.username == username)
            .map(|entry| entry.clone())
        else {
            return Ok(None);
        };
        self.get_account_by_id(account.id.expect("stored account has an id"))
            .await
    }

    async fn get_account_by_id(&self, id: AccountId) -> Result<Option<AccountWithCharacters>> {
        let Some(account) = self.accounts.get(&id).map(|entry| entry.clone()) else {
            return Ok(None);
        };
        let characters = self
            .characters
            .iter()
            .filter(|entry| entry.account_id == id)
            .map(|entry| entry.clone())
            .collect();
        Ok(Some(AccountWithCharacters { account, characters }))
    }

    async fn add_account(&self, mut account: AccountRow) -> Result<AccountId> {
        let id = ObjectId::new();
        account.id = Some(id);
        self.accounts.insert(id, account);
        Ok(id)
    }

    async fn flush_account(
        &self,
        account_id: AccountId,
        mut account: AccountRow,
        characters: Vec<CharacterRow>,
    ) -> Result<()> {
        account.id = Some(account_id);
        self.characters.retain(|_, row| row.account_id != account_id);
        for mut character in characters {
            let char_id = character.id.unwrap_or_else(ObjectId::new);
            character.id = Some(char_id);
            character.account_id = account_id;
            self.characters.insert(char_id, character);
        }
        self.accounts.insert(account_id, account);
        Ok(())
    }

    async fn delete_account(&self, account_id: AccountId) -> Result<()> {
        self.accounts.remove(&account_id);
        let dead: Vec<CharacterId> = self
            .characters
            .iter()
            .filter(|entry| entry.account_id == account_id)
            .map(|entry| entry.id.expect("stored character has an id"))
            .collect();
        self.characters.retain(|_, row| row.account_id != account_id);
        for id in dead {
            self.transactions.remove(&id);
            self.letters.retain(|_, letter| letter.receiver_character_id != id);
            self.guilds.retain(|_, guild| {
                guild.members.iter().all(|member| member.character_id != id)
            });
        }
        Ok(())
    }

    async fn update_last_login(&self, account_id: AccountId) -> Result<()> {
        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            account.last_login = Utc::now();
        }
        Ok(())
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(self.accounts.iter().any(|entry| entry.username == username))
    }

    async fn email_exists(&self, email_hash: &str) -> Result<bool> {
        Ok(self.accounts.iter().any(|entry| entry.email_hash == email_hash))
    }

    async fn set_online_status(&self, account_id: AccountId, online: bool) -> Result<()> {
        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            account.online = online;
        }
        Ok(())
    }

    async fn set_account_level(&self, account_id: AccountId, level: u8) -> Result<()> {
        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            account.access_level = level;
        }
        Ok(())
    }

    async fn ban_account(
        &self,
        account_id: AccountId,
        banned_until: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            account.prior_level = Some(account.access_level);
            account.access_level = protocol::AccessLevel::Banned.to_u8();
            account.banned_until = Some(banned_until);
        }
        Ok(())
    }

    async fn check_banned_accounts(&self) -> Result<Vec<AccountId>> {
        let now = Utc::now();
        let mut unbanned = Vec::new();
        for mut entry in self.accounts.iter_mut() {
            if let Some(until) = entry.banned_until {
                if until <= now {
                    if let Some(level) = entry.prior_level.take() {
                        entry.access_level = level;
                    }
                    entry.banned_until = None;
                    unbanned.push(entry.id.expect("stored account has an id"));
                }
            }
        }
        Ok(unbanned)
    }

    async fn get_character_by_id(&self, id: CharacterId) -> Result<Option<CharacterRow>> {
        Ok(self.characters.get(&id).map(|entry| entry.clone()))
    }

    async fn get_character_by_name(&self, name: &str) -> Result<Option<CharacterRow>> {
        Ok(self
            .characters
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
            .map(|entry| entry.clone()))
    }

    async fn get_character_id(&self, name: &str) -> Result<Option<CharacterId>> {
        Ok(self.get_character_by_name(name).await?.and_then(|row| row.id))
    }

    async fn character_name_exists(&self, name: &str) -> Result<bool> {
        Ok(self.get_character_by_name(name).await?.is_some())
    }

    async fn update_character(&self, character: CharacterRow) -> Result<()> {
        let id = character
            .id
            .ok_or_else(|| BackboneError::Storage("character row missing id".into()))?;
        self.characters.insert(id, character);
        Ok(())
    }

    async fn update_character_points(
        &self,
        id: CharacterId,
        attr_points: i32,
        corr_points: i32,
    ) -> Result<()> {
        if let Some(mut character) = self.characters.get_mut(&id) {
            character.attr_points = attr_points;
            character.corr_points = corr_points;
        }
        Ok(())
    }

    async fn update_attribute(&self, id: CharacterId, attribute: AttributeRow) -> Result<()> {
        if let Some(mut character) = self.characters.get_mut(&id) {
            match character
                .attributes
                .iter_mut()
                .find(|row| row.attr_id == attribute.attr_id)
            {
                Some(existing) => *existing = attribute,
                None => character.attributes.push(attribute),
            }
        }
        Ok(())
    }

    async fn update_kill_count(&self, id: CharacterId, kill_count: KillCountRow) -> Result<()> {
        if let Some(mut character) = self.characters.get_mut(&id) {
            match character
                .kill_counts
                .iter_mut()
                .find(|row| row.monster_id == kill_count.monster_id)
            {
                Some(existing) => existing.kills = kill_count.kills,
                None => character.kill_counts.push(kill_count),
            }
        }
        Ok(())
    }

    async fn insert_status_effect(
        &self,
        id: CharacterId,
        status_effect: StatusEffectRow,
    ) -> Result<()> {
        if let Some(mut character) = self.characters.get_mut(&id) {
            character.status_effects.push(status_effect);
        }
        Ok(())
    }

    async fn get_quest_var(&self, owner_id: CharacterId, name: &str) -> Result<Option<String>> {
        Ok(self.quest_vars.get(&(owner_id, name.to_string())).map(|v| v.clone()))
    }

    async fn set_quest_var(&self, owner_id: CharacterId, name: &str, value: &str) -> Result<()> {
        self.quest_vars.insert((owner_id, name.to_string()), value.to_string());
        Ok(())
    }

    async fn get_world_state_var(&self, map_id: i32, name: &str) -> Result<Option<String>> {
        Ok(self.world_vars.get(&(map_id, name.to_string())).map(|v| v.clone()))
    }

    async fn set_world_state_var(&self, map_id: i32, name: &str, value: &str) -> Result<()> {
        self.world_vars.insert((map_id, name.to_string()), value.to_string());
        Ok(())
    }

    async fn get_all_world_state_vars(&self, map_id: i32) -> Result<Vec<(String, String)>> {
        Ok(self
            .world_vars
            .iter()
            .filter(|entry| entry.key().0 == map_id)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect())
    }

    async fn add_floor_item(&self, item: FloorItemRow) -> Result<()> {
        self.floor_items.lock().expect("floor item lock poisoned").push(item);
        Ok(())
    }

    async fn remove_floor_item(&self, item: FloorItemRow) -> Result<()> {
        let mut items = self.floor_items.lock().expect("floor item lock poisoned");
        if let Some(pos) = items.iter().position(|row| *row == item) {
            items.remove(pos);
        }
        Ok(())
    }

    async fn get_floor_items_from_map(&self, map_id: i16) -> Result<Vec<FloorItemRow>> {
        let items = self.floor_items.lock().expect("floor item lock poisoned");
        Ok(items.iter().filter(|row| row.map_id == map_id).cloned().collect())
    }

    async fn add_transaction(&self, transaction: TransactionRow) -> Result<()> {
        self.transactions
            .entry(transaction.character_id)
            .or_default()
            .push(transaction);
        Ok(())
    }

    async fn get_transactions(&self, character_id: CharacterId) -> Result<Vec<TransactionRow>> {
        Ok(self
            .transactions
            .get(&character_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn store_letter(&self, mut letter: LetterRow) -> Result<()> {
        let id = letter.id.unwrap_or_else(ObjectId::new);
        letter.id = Some(id);
        self.letters.insert(id, letter);
        Ok(())
    }

    async fn get_stored_post(&self, receiver_character_id: CharacterId) -> Result<Vec<LetterRow>> {
        Ok(self
            .letters
            .iter()
            .filter(|entry| entry.receiver_character_id == receiver_character_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn delete_post(&self, letter_id: ObjectId) -> Result<()> {
        self.letters.remove(&letter_id);
        Ok(())
    }

    async fn create_guild(&self, mut guild: GuildRow) -> Result<GuildId> {
        let id = ObjectId::new();
        guild.id = Some(id);
        self.guilds.insert(id, guild);
        Ok(id)
    }

    async fn delete_guild(&self, guild_id: GuildId) -> Result<()> {
        self.guilds.remove(&guild_id);
        Ok(())
    }

    async fn get_guild_by_name(&self, name: &str) -> Result<Option<GuildRow>> {
        Ok(self
            .guilds
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
            .map(|entry| entry.clone()))
    }

    async fn get_guild_by_member(&self, character_id: CharacterId) -> Result<Option<GuildRow>> {
        Ok(self
            .guilds
            .iter()
            .find(|entry| entry.members.iter().any(|m| m.character_id == character_id))
            .map(|entry| entry.clone()))
    }

    async fn add_guild_member(
        &self,
        guild_id: GuildId,
        character_id: CharacterId,
        rights: i16,
    ) -> Result<()> {
        if let Some(mut guild) = self.guilds.get_mut(&guild_id) {
            guild.members.push(super::models::GuildMemberRow { character_id, rights });
        }
        Ok(())
    }

    async fn remove_guild_member(
        &self,
        guild_id: GuildId,
        character_id: CharacterId,
    ) -> Result<()> {
        if let Some(mut guild) = self.guilds.get_mut(&guild_id) {
            guild.members.retain(|m| m.character_id != character_id);
        }
        Ok(())
    }

    async fn set_guild_member_rights(
        &self,
        guild_id: GuildId,
        character_id: CharacterId,
        rights: i16,
    ) -> Result<()> {
        if let Some(mut guild) = self.guilds.get_mut(&guild_id) {
            if let Some(member) = guild.members.iter_mut().find(|m| m.character_id == character_id) {
                member.rights = rights;
            }
        }
        Ok(())
    }

    async fn clear_all_online_status(&self) -> Result<()> {
        for mut entry in self.accounts.iter_mut() {
            entry.online = false;
        }
        Ok(())
    }

    async fn get_db_version(&self) -> Result<Option<i32>> {
        Ok(*self.db_version.lock().expect("db_version lock poisoned"))
    }

    async fn set_db_version(&self, version: i32) -> Result<()> {
        *self.db_version.lock().expect("db_version lock poisoned") = Some(version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_account() -> AccountRow {
        AccountRow {
            id: None,
            username: "player1".into(),
            password_hash: "hash".into(),
            email_hash: "email-hash".into(),
            access_level: protocol::AccessLevel::Player.to_u8(),
            banned_until: None,
            prior_level: None,
            online: false,
            registration_date: Utc::now(),
            last_login: Utc::now(),
        }
    }

    #[tokio::test]
    async fn add_then_fetch_by_username() {
        let storage = InMemoryStorage::new();
        let id = storage.add_account(sample_account()).await.unwrap();
        let found = storage.get_account_by_username("player1").await.unwrap().unwrap();
        assert_eq!(found.account.id, Some(id));
        assert!(found.characters.is_empty());
    }

    #[tokio::test]
    async fn flush_replaces_roster_atomically() {
        let storage = InMemoryStorage::new();
        let id = storage.add_account(sample_account()).await.unwrap();
        let character = CharacterRow {
            id: None,
            account_id: id,
            name: "Hero".into(),
            slot: 0,
            gender: 0,
            hair_style: 0,
            hair_color: 0,
            attr_points: 60,
            corr_points: 0,
            map_id: 1,
            x: 100,
            y: 100,
            attributes: vec![],
            status_effects: vec![],
            kill_counts: vec![],
            ability_ids: vec![],
            quest_log: vec![],
            inventory: vec![],
        };
        storage
            .flush_account(id, sample_account(), vec![character])
            .await
            .unwrap();
        let found = storage.get_account_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.characters.len(), 1);
        assert_eq!(found.characters[0].name, "Hero");

        storage.flush_account(id, sample_account(), vec![]).await.unwrap();
        let found = storage.get_account_by_id(id).await.unwrap().unwrap();
        assert!(found.characters.is_empty());
    }

    #[tokio::test]
    async fn ban_and_unban_restores_prior_level() {
        let storage = InMemoryStorage::new();
        let mut account = sample_account();
        account.access_level = protocol::AccessLevel::Gm.to_u8();
        let id = storage.add_account(account).await.unwrap();

        storage
            .ban_account(id, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        let banned = storage.get_account_by_id(id).await.unwrap().unwrap();
        assert_eq!(banned.account.access_level, protocol::AccessLevel::Banned.to_u8());

        let unbanned = storage.check_banned_accounts().await.unwrap();
        assert_eq!(unbanned, vec![id]);
        let restored = storage.get_account_by_id(id).await.unwrap().unwrap();
        assert_eq!(restored.account.access_level, protocol::AccessLevel::Gm.to_u8());
    }

    #[tokio::test]
    async fn delete_account_cascades_to_characters() {
        let storage = InMemoryStorage::new();
        let id = storage.add_account(sample_account()).await.unwrap();
        let character = CharacterRow {
            id: None,
            account_id: id,
            name: "Hero".into(),
            slot: 0,
            gender: 0,
            hair_style: 0,
            hair_color: 0,
            attr_points: 60,
            corr_points: 0,
            map_id: 1,
            x: 100,
            y: 100,
            attributes: vec![],
            status_effects: vec![],
            kill_counts: vec![],
            ability_ids: vec![],
            quest_log: vec![],
            inventory: vec![],
        };
        storage.flush_account(id, sample_account(), vec![character]).await.unwrap();
        storage.delete_account(id).await.unwrap();
        assert!(storage.get_account_by_id(id).await.unwrap().is_none());
    }
}
