use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use protocol::status::AccessLevel;
use serde::{Deserialize, Serialize};

/// Persisted account row. Passwords and emails arrive already hashed —
/// this layer never hashes (spec §4.7 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRow {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub username: String,
    pub password_hash: String,
    pub email_hash: String,
    pub access_level: u8,
    pub banned_until: Option<DateTime<Utc>>,
    pub prior_level: Option<u8>,
    pub online: bool,
    pub registration_date: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

impl AccountRow {
    #[must_use]
    pub fn access_level(&self) -> AccessLevel {
        AccessLevel::from_u8(self.access_level).unwrap_or(AccessLevel::Player)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeRow {
    pub attr_id: i16,
    pub base: f64,
    pub modified: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEffectRow {
    pub status_id: i16,
    pub ticks: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillCountRow {
    pub monster_id: i16,
    pub kills: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestLogRow {
    pub quest_id: i16,
    pub state: i8,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRow {
    pub slot: i16,
    pub item_id: i16,
    pub amount: i16,
    pub equipped_slot: Option<i16>,
}

/// Persisted character row. §6 lists `char_attributes`, `char_status_effects`,
/// `char_kill_count`, `char_abilities`, `quest_log` and `inventory` as their
/// own tables keyed by `charId`; the document store collapses them into
/// embedded arrays on the character document — `flush` still replaces each
/// array wholesale, matching the "delete and re-insert" semantics spec §6
/// describes for `inventory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterRow {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub account_id: ObjectId,
    pub name: String,
    pub slot: i8,
    pub gender: i8,
    pub hair_style: i8,
    pub hair_color: i8,
    pub attr_points: i32,
    pub corr_points: i32,
    pub map_id: i16,
    pub x: i16,
    pub y: i16,
    pub attributes: Vec<AttributeRow>,
    pub status_effects: Vec<StatusEffectRow>,
    pub kill_counts: Vec<KillCountRow>,
    pub ability_ids: Vec<i32>,
    pub quest_log: Vec<QuestLogRow>,
    pub inventory: Vec<InventoryRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildRow {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub owner_character_id: ObjectId,
    pub members: Vec<GuildMemberRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMemberRow {
    pub character_id: ObjectId,
    pub rights: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterAttachmentRow {
    pub item_id: i32,
    pub amount: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterRow {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub sender_character_id: ObjectId,
    pub sender_name: String,
    pub receiver_character_id: ObjectId,
    pub expiry: DateTime<Utc>,
    pub letter_type: i8,
    pub text: String,
    pub attachments: Vec<LetterAttachmentRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRow {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub character_id: ObjectId,
    pub action: i32,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// `mapId = 0` world scope, `-1` system scope, `>0` a specific map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldStateVarRow {
    pub name: String,
    pub map_id: i32,
    pub value: String,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestVarRow {
    pub owner_id: ObjectId,
    pub name: String,
    pub value: String,
}

/// Identity includes `amount`: two stacks of the same item at the same
/// tile with different amounts coexist (spec §9 open question, preserved
/// as-observed).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FloorItemRow {
    pub map_id: i16,
    pub item_id: i32,
    pub amount: i16,
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbVersionRow {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub version: i32,
}
