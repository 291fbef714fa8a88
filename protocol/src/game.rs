//! Account ↔ game-server link wire messages (spec §4.4, §6).

use crate::error::CodecError;
use crate::ids::{game_in, game_out};
use crate::status::ErrorKind;
use crate::wire::{Reader, Writer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyValue<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

fn write_kv_pairs(w: &mut Writer, pairs: &[(String, String)]) {
    w.write_u16(pairs.len() as u16);
    for (k, v) in pairs {
        w.write_str(k);
        w.write_str(v);
    }
}

fn read_kv_pairs(r: &mut Reader<'_>) -> Result<Vec<(String, String)>, CodecError> {
    let count = r.read_u16()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push((r.read_str()?, r.read_str()?));
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloorItem {
    pub item_id: i32,
    pub amount: i16,
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEffectEntry {
    pub id: i16,
    pub ticks: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillCountEntry {
    pub monster_id: i16,
    pub kills: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestLogEntry {
    pub id: i16,
    pub state: i8,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryEntry {
    pub slot: i16,
    pub item_id: i16,
    pub amount: i16,
    pub equipped: bool,
}

/// Full authoritative character state, serialised in the exact field order
/// spec §6 mandates for `PLAYER_ENTER`/`PLAYER_DATA`. Attribute base values
/// are carried as `f64` here (the legacy scaling by 256 only applies to the
/// client-facing roster in [`crate::account::CharacterSummary`]).
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterSnapshot {
    pub account_level: i8,
    pub gender: i8,
    pub hair_style: i8,
    pub hair_color: i8,
    pub attr_points: i32,
    pub corr_points: i32,
    pub attributes: Vec<(i16, f64)>,
    pub status_effects: Vec<StatusEffectEntry>,
    pub map_id: i16,
    pub x: i16,
    pub y: i16,
    pub kill_counts: Vec<KillCountEntry>,
    pub ability_ids: Vec<i32>,
    pub quest_log: Vec<QuestLogEntry>,
    pub inventory: Vec<InventoryEntry>,
}

impl CharacterSnapshot {
    fn encode(&self, w: &mut Writer) {
        w.write_i8(self.account_level);
        w.write_i8(self.gender);
        w.write_i8(self.hair_style);
        w.write_i8(self.hair_color);
        w.write_i32(self.attr_points);
        w.write_i32(self.corr_points);
        w.write_u16(self.attributes.len() as u16);
        for (id, base) in &self.attributes {
            w.write_i16(*id);
            w.write_f64(*base);
        }
        w.write_u16(self.status_effects.len() as u16);
        for s in &self.status_effects {
            w.write_i16(s.id);
            w.write_i16(s.ticks);
        }
        w.write_i16(self.map_id);
        w.write_i16(self.x);
        w.write_i16(self.y);
        w.write_u16(self.kill_counts.len() as u16);
        for k in &self.kill_counts {
            w.write_i16(k.monster_id);
            w.write_i32(k.kills);
        }
        w.write_u16(self.ability_ids.len() as u16);
        for a in &self.ability_ids {
            w.write_i32(*a);
        }
        w.write_u16(self.quest_log.len() as u16);
        for q in &self.quest_log {
            w.write_i16(q.id);
            w.write_i8(q.state);
            w.write_str(&q.title);
            w.write_str(&q.description);
        }
        // Inventory runs to end-of-message: no count prefix, per spec §6.
        for item in &self.inventory {
            w.write_i16(item.slot);
            w.write_i16(item.item_id);
            w.write_i16(item.amount);
            w.write_i8(i8::from(item.equipped));
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let account_level = r.read_i8()?;
        let gender = r.read_i8()?;
        let hair_style = r.read_i8()?;
        let hair_color = r.read_i8()?;
        let attr_points = r.read_i32()?;
        let corr_points = r.read_i32()?;
        let attr_count = r.read_u16()?;
        let mut attributes = Vec::with_capacity(attr_count as usize);
        for _ in 0..attr_count {
            attributes.push((r.read_i16()?, r.read_f64()?));
        }
        let status_count = r.read_u16()?;
        let mut status_effects = Vec::with_capacity(status_count as usize);
        for _ in 0..status_count {
            status_effects.push(StatusEffectEntry {
                id: r.read_i16()?,
                ticks: r.read_i16()?,
            });
        }
        let map_id = r.read_i16()?;
        let x = r.read_i16()?;
        let y = r.read_i16()?;
        let kill_count = r.read_u16()?;
        let mut kill_counts = Vec::with_capacity(kill_count as usize);
        for _ in 0..kill_count {
            kill_counts.push(KillCountEntry {
                monster_id: r.read_i16()?,
                kills: r.read_i32()?,
            });
        }
        let ability_count = r.read_u16()?;
        let mut ability_ids = Vec::with_capacity(ability_count as usize);
        for _ in 0..ability_count {
            ability_ids.push(r.read_i32()?);
        }
        let quest_count = r.read_u16()?;
        let mut quest_log = Vec::with_capacity(quest_count as usize);
        for _ in 0..quest_count {
            quest_log.push(QuestLogEntry {
                id: r.read_i16()?,
                state: r.read_i8()?,
                title: r.read_str()?,
                description: r.read_str()?,
            });
        }
        let mut inventory = Vec::new();
        while !r.is_empty() {
            inventory.push(InventoryEntry {
                slot: r.read_i16()?,
                item_id: r.read_i16()?,
                amount: r.read_i16()?,
                equipped: r.read_i8()? != 0,
            });
        }
        Ok(Self {
            account_level,
            gender,
            hair_style,
            hair_color,
            attr_points,
            corr_points,
            attributes,
            status_effects,
            map_id,
            x,
            y,
            kill_counts,
            ability_ids,
            quest_log,
            inventory,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncEntry {
    CharPoints {
        char_id: i32,
        attr_points: i32,
        corr_points: i32,
    },
    Attribute {
        char_id: i32,
        attr_id: i16,
        base: f64,
        modified: f64,
    },
    OnlineStatus {
        char_id: i32,
        online: bool,
    },
}

impl SyncEntry {
    fn encode(&self, w: &mut Writer) {
        match self {
            SyncEntry::CharPoints {
                char_id,
                attr_points,
                corr_points,
            } => {
                w.write_u8(0);
                w.write_i32(*char_id);
                w.write_i32(*attr_points);
                w.write_i32(*corr_points);
            }
            SyncEntry::Attribute {
                char_id,
                attr_id,
                base,
                modified,
            } => {
                w.write_u8(1);
                w.write_i32(*char_id);
                w.write_i16(*attr_id);
                w.write_f64(*base);
                w.write_f64(*modified);
            }
            SyncEntry::OnlineStatus { char_id, online } => {
                w.write_u8(2);
                w.write_i32(*char_id);
                w.write_bool(*online);
            }
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(match r.read_u8()? {
            0 => SyncEntry::CharPoints {
                char_id: r.read_i32()?,
                attr_points: r.read_i32()?,
                corr_points: r.read_i32()?,
            },
            1 => SyncEntry::Attribute {
                char_id: r.read_i32()?,
                attr_id: r.read_i16()?,
                base: r.read_f64()?,
                modified: r.read_f64()?,
            },
            2 => SyncEntry::OnlineStatus {
                char_id: r.read_i32()?,
                online: r.read_bool()?,
            },
            other => {
                return Err(CodecError::InvalidDiscriminant(
                    other as u32,
                    "SyncEntry",
                ))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailAttachment {
    pub item_id: i32,
    pub amount: i16,
}

/// Game server → account.
#[derive(Debug, Clone, PartialEq)]
pub enum GameLinkMessage {
    Register {
        name: String,
        address: String,
        port: i16,
        password: String,
        item_db_version: i32,
    },
    PlayerData {
        character_id: i32,
        snapshot: CharacterSnapshot,
    },
    PlayerSync {
        entries: Vec<SyncEntry>,
    },
    Redirect {
        character_id: i32,
    },
    PlayerReconnect {
        character_id: i32,
        token: String,
    },
    GetVarChr {
        character_id: i32,
        name: String,
    },
    SetVarChr {
        character_id: i32,
        name: String,
        value: String,
    },
    SetVarWorld {
        name: String,
        value: String,
    },
    SetVarMap {
        map_id: i16,
        name: String,
        value: String,
    },
    BanPlayer {
        character_id: i32,
        duration_minutes: i32,
    },
    ChangeAccountLevel {
        character_id: i32,
        level: i8,
    },
    Statistics {
        entries: Vec<(i16, i16, i16, i16)>,
    },
    CreateItemOnMap {
        map_id: i16,
        item_id: i32,
        amount: i16,
        x: i16,
        y: i16,
    },
    RemoveItemOnMap {
        map_id: i16,
        item_id: i32,
        x: i16,
        y: i16,
    },
    Announce {
        message: String,
        sender_id: i32,
        sender_name: String,
    },
    Transaction {
        character_id: i32,
        action: i32,
        message: String,
    },
    RequestPost {
        character_id: i32,
    },
    StorePost {
        sender_id: i32,
        receiver_name: String,
        text: String,
        attachments: Vec<MailAttachment>,
    },
}

impl GameLinkMessage {
    pub fn decode(id: u16, body: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(body);
        let msg = match id {
            game_in::REGISTER => GameLinkMessage::Register {
                name: r.read_str()?,
                address: r.read_str()?,
                port: r.read_i16()?,
                password: r.read_str()?,
                item_db_version: r.read_i32()?,
            },
            game_in::PLAYER_DATA => GameLinkMessage::PlayerData {
                character_id: r.read_i32()?,
                snapshot: CharacterSnapshot::decode(&mut r)?,
            },
            game_in::PLAYER_SYNC => {
                let count = r.read_u16()?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    entries.push(SyncEntry::decode(&mut r)?);
                }
                GameLinkMessage::PlayerSync { entries }
            }
            game_in::REDIRECT => GameLinkMessage::Redirect {
                character_id: r.read_i32()?,
            },
            game_in::PLAYER_RECONNECT => GameLinkMessage::PlayerReconnect {
                character_id: r.read_i32()?,
                token: r.read_str()?,
            },
            game_in::GET_VAR_CHR => GameLinkMessage::GetVarChr {
                character_id: r.read_i32()?,
                name: r.read_str()?,
            },
            game_in::SET_VAR_CHR => GameLinkMessage::SetVarChr {
                character_id: r.read_i32()?,
                name: r.read_str()?,
                value: r.read_str()?,
            },
            game_in::SET_VAR_WORLD => GameLinkMessage::SetVarWorld {
                name: r.read_str()?,
                value: r.read_str()?,
            },
            game_in::SET_VAR_MAP => GameLinkMessage::SetVarMap {
                map_id: r.read_i16()?,
                name: r.read_str()?,
                value: r.read_str()?,
            },
            game_in::BAN_PLAYER => GameLinkMessage::BanPlayer {
                character_id: r.read_i32()?,
                duration_minutes: r.read_i32()?,
            },
            game_in::CHANGE_ACCOUNT_LEVEL => GameLinkMessage::ChangeAccountLevel {
                character_id: r.read_i32()?,
                level: r.read_i8()?,
            },
            game_in::STATISTICS => {
                let count = r.read_u16()?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    entries.push((
                        r.read_i16()?,
                        r.read_i16()?,
                        r.read_i16()?,
                        r.read_i16()?,
                    ));
                }
                GameLinkMessage::Statistics { entries }
            }
            game_in::CREATE_ITEM_ON_MAP => GameLinkMessage::CreateItemOnMap {
                map_id: r.read_i16()?,
                item_id: r.read_i32()?,
                amount: r.read_i16()?,
                x: r.read_i16()?,
                y: r.read_i16()?,
            },
            game_in::REMOVE_ITEM_ON_MAP => GameLinkMessage::RemoveItemOnMap {
                map_id: r.read_i16()?,
                item_id: r.read_i32()?,
                x: r.read_i16()?,
                y: r.read_i16()?,
            },
            game_in::ANNOUNCE => GameLinkMessage::Announce {
                message: r.read_str()?,
                sender_id: r.read_i32()?,
                sender_name: r.read_str()?,
            },
            game_in::TRANSACTION => GameLinkMessage::Transaction {
                character_id: r.read_i32()?,
                action: r.read_i32()?,
                message: r.read_str()?,
            },
            game_in::REQUEST_POST => GameLinkMessage::RequestPost {
                character_id: r.read_i32()?,
            },
            game_in::STORE_POST => {
                let sender_id = r.read_i32()?;
                let receiver_name = r.read_str()?;
                let text = r.read_str()?;
                let count = r.read_u16()?;
                let mut attachments = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    attachments.push(MailAttachment {
                        item_id: r.read_i32()?,
                        amount: r.read_i16()?,
                    });
                }
                GameLinkMessage::StorePost {
                    sender_id,
                    receiver_name,
                    text,
                    attachments,
                }
            }
            other => return Err(CodecError::UnknownMessageId(other)),
        };
        Ok(msg)
    }

    #[must_use]
    pub fn encode(&self) -> (u16, Vec<u8>) {
        let mut w = Writer::new();
        let id = match self {
            GameLinkMessage::Register {
                name,
                address,
                port,
                password,
                item_db_version,
            } => {
                w.write_str(name);
                w.write_str(address);
                w.write_i16(*port);
                w.write_str(password);
                w.write_i32(*item_db_version);
                game_in::REGISTER
            }
            GameLinkMessage::PlayerData {
                character_id,
                snapshot,
            } => {
                w.write_i32(*character_id);
                snapshot.encode(&mut w);
                game_in::PLAYER_DATA
            }
            GameLinkMessage::PlayerSync { entries } => {
                w.write_u16(entries.len() as u16);
                for e in entries {
                    e.encode(&mut w);
                }
                game_in::PLAYER_SYNC
            }
            GameLinkMessage::Redirect { character_id } => {
                w.write_i32(*character_id);
                game_in::REDIRECT
            }
            GameLinkMessage::PlayerReconnect { character_id, token } => {
                w.write_i32(*character_id);
                w.write_str(token);
                game_in::PLAYER_RECONNECT
            }
            GameLinkMessage::GetVarChr { character_id, name } => {
                w.write_i32(*character_id);
                w.write_str(name);
                game_in::GET_VAR_CHR
            }
            GameLinkMessage::SetVarChr {
                character_id,
                name,
                value,
            } => {
                w.write_i32(*character_id);
                w.write_str(name);
                w.write_str(value);
                game_in::SET_VAR_CHR
            }
            GameLinkMessage::SetVarWorld { name, value } => {
                w.write_str(name);
                w.write_str(value);
                game_in::SET_VAR_WORLD
            }
            GameLinkMessage::SetVarMap { map_id, name, value } => {
                w.write_i16(*map_id);
                w.write_str(name);
                w.write_str(value);
                game_in::SET_VAR_MAP
            }
            GameLinkMessage::BanPlayer {
                character_id,
                duration_minutes,
            } => {
                w.write_i32(*character_id);
                w.write_i32(*duration_minutes);
                game_in::BAN_PLAYER
            }
            GameLinkMessage::ChangeAccountLevel { character_id, level } => {
                w.write_i32(*character_id);
                w.write_i8(*level);
                game_in::CHANGE_ACCOUNT_LEVEL
            }
            GameLinkMessage::Statistics { entries } => {
                w.write_u16(entries.len() as u16);
                for (map_id, players, monsters, map_entities) in entries {
                    w.write_i16(*map_id);
                    w.write_i16(*players);
                    w.write_i16(*monsters);
                    w.write_i16(*map_entities);
                }
                game_in::STATISTICS
            }
            GameLinkMessage::CreateItemOnMap {
                map_id,
                item_id,
                amount,
                x,
                y,
            } => {
                w.write_i16(*map_id);
                w.write_i32(*item_id);
                w.write_i16(*amount);
                w.write_i16(*x);
                w.write_i16(*y);
                game_in::CREATE_ITEM_ON_MAP
            }
            GameLinkMessage::RemoveItemOnMap {
                map_id,
                item_id,
                x,
                y,
            } => {
                w.write_i16(*map_id);
                w.write_i32(*item_id);
                w.write_i16(*x);
                w.write_i16(*y);
                game_in::REMOVE_ITEM_ON_MAP
            }
            GameLinkMessage::Announce {
                message,
                sender_id,
                sender_name,
            } => {
                w.write_str(message);
                w.write_i32(*sender_id);
                w.write_str(sender_name);
                game_in::ANNOUNCE
            }
            GameLinkMessage::Transaction {
                character_id,
                action,
                message,
            } => {
                w.write_i32(*character_id);
                w.write_i32(*action);
                w.write_str(message);
                game_in::TRANSACTION
            }
            GameLinkMessage::RequestPost { character_id } => {
                w.write_i32(*character_id);
                game_in::REQUEST_POST
            }
            GameLinkMessage::StorePost {
                sender_id,
                receiver_name,
                text,
                attachments,
            } => {
                w.write_i32(*sender_id);
                w.write_str(receiver_name);
                w.write_str(text);
                w.write_u16(attachments.len() as u16);
                for a in attachments {
                    w.write_i32(a.item_id);
                    w.write_i16(a.amount);
                }
                game_in::STORE_POST
            }
        };
        (id, w.into_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLetter {
    pub id: i32,
    pub sender_name: String,
    pub expiry: i64,
    pub letter_type: i8,
    pub text: String,
    pub attachments: Vec<(i32, i16)>,
}

/// Account → game server.
#[derive(Debug, Clone, PartialEq)]
pub enum GameLinkReply {
    RegisterResponse {
        db_status: ErrorKind,
        password_status: ErrorKind,
        world_vars: Vec<(String, String)>,
    },
    ActiveMap {
        map_id: i16,
        vars: Vec<(String, String)>,
        floor_items: Vec<FloorItem>,
    },
    PlayerEnter {
        token: String,
        character_id: i32,
        name: String,
        snapshot: CharacterSnapshot,
    },
    RedirectResponse {
        character_id: i32,
        token: String,
        address: String,
        port: i16,
    },
    GetVarChrResponse {
        character_id: i32,
        name: String,
        value: String,
    },
    SetVarWorld {
        name: String,
        value: String,
    },
    RequestPostResponse {
        character_id: i32,
        letters: Vec<StoredLetter>,
    },
}

impl GameLinkReply {
    #[must_use]
    pub fn encode(&self) -> (u16, Vec<u8>) {
        let mut w = Writer::new();
        let id = match self {
            GameLinkReply::RegisterResponse {
                db_status,
                password_status,
                world_vars,
            } => {
                w.write_u8(db_status.to_u8());
                w.write_u8(password_status.to_u8());
                write_kv_pairs(&mut w, world_vars);
                game_out::REGISTER_RESPONSE
            }
            GameLinkReply::ActiveMap {
                map_id,
                vars,
                floor_items,
            } => {
                w.write_i16(*map_id);
                write_kv_pairs(&mut w, vars);
                w.write_i16(floor_items.len() as i16);
                for item in floor_items {
                    w.write_i32(item.item_id);
                    w.write_i16(item.amount);
                    w.write_i16(item.x);
                    w.write_i16(item.y);
                }
                game_out::ACTIVE_MAP
            }
            GameLinkReply::PlayerEnter {
                token,
                character_id,
                name,
                snapshot,
            } => {
                w.write_str(token);
                w.write_i32(*character_id);
                w.write_str(name);
                snapshot.encode(&mut w);
                game_out::PLAYER_ENTER
            }
            GameLinkReply::RedirectResponse {
                character_id,
                token,
                address,
                port,
            } => {
                w.write_i32(*character_id);
                w.write_str(token);
                w.write_str(address);
                w.write_i16(*port);
                game_out::REDIRECT_RESPONSE
            }
            GameLinkReply::GetVarChrResponse {
                character_id,
                name,
                value,
            } => {
                w.write_i32(*character_id);
                w.write_str(name);
                w.write_str(value);
                game_out::GET_VAR_CHR_RESPONSE
            }
            GameLinkReply::SetVarWorld { name, value } => {
                w.write_str(name);
                w.write_str(value);
                game_out::SET_VAR_WORLD
            }
            GameLinkReply::RequestPostResponse {
                character_id,
                letters,
            } => {
                w.write_i32(*character_id);
                w.write_u16(letters.len() as u16);
                for letter in letters {
                    w.write_i32(letter.id);
                    w.write_str(&letter.sender_name);
                    w.write_u64(letter.expiry as u64);
                    w.write_i8(letter.letter_type);
                    w.write_str(&letter.text);
                    w.write_u16(letter.attachments.len() as u16);
                    for (item_id, amount) in &letter.attachments {
                        w.write_i32(*item_id);
                        w.write_i16(*amount);
                    }
                }
                game_out::REQUEST_POST_RESPONSE
            }
        };
        (id, w.into_bytes())
    }

    pub fn decode(id: u16, body: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(body);
        let reply = match id {
            game_out::REGISTER_RESPONSE => GameLinkReply::RegisterResponse {
                db_status: ErrorKind::from_u8(r.read_u8()?)?,
                password_status: ErrorKind::from_u8(r.read_u8()?)?,
                world_vars: read_kv_pairs(&mut r)?,
            },
            game_out::ACTIVE_MAP => {
                let map_id = r.read_i16()?;
                let vars = read_kv_pairs(&mut r)?;
                let floor_count = r.read_i16()?;
                let mut floor_items = Vec::with_capacity(floor_count.max(0) as usize);
                for _ in 0..floor_count {
                    floor_items.push(FloorItem {
                        item_id: r.read_i32()?,
                        amount: r.read_i16()?,
                        x: r.read_i16()?,
                        y: r.read_i16()?,
                    });
                }
                GameLinkReply::ActiveMap {
                    map_id,
                    vars,
                    floor_items,
                }
            }
            game_out::PLAYER_ENTER => GameLinkReply::PlayerEnter {
                token: r.read_str()?,
                character_id: r.read_i32()?,
                name: r.read_str()?,
                snapshot: CharacterSnapshot::decode(&mut r)?,
            },
            game_out::REDIRECT_RESPONSE => GameLinkReply::RedirectResponse {
                character_id: r.read_i32()?,
                token: r.read_str()?,
                address: r.read_str()?,
                port: r.read_i16()?,
            },
            game_out::GET_VAR_CHR_RESPONSE => GameLinkReply::GetVarChrResponse {
                character_id: r.read_i32()?,
                name: r.read_str()?,
                value: r.read_str()?,
            },
            game_out::SET_VAR_WORLD => GameLinkReply::SetVarWorld {
                name: r.read_str()?,
                value: r.read_str()?,
            },
            game_out::REQUEST_POST_RESPONSE => {
                let character_id = r.read_i32()?;
                let count = r.read_u16()?;
                let mut letters = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let id = r.read_i32()?;
                    let sender_name = r.read_str()?;
                    let expiry = r.read_u64()? as i64;
                    let letter_type = r.read_i8()?;
                    let text = r.read_str()?;
                    let attach_count = r.read_u16()?;
                    let mut attachments = Vec::with_capacity(attach_count as usize);
                    for _ in 0..attach_count {
                        attachments.push((r.read_i32()?, r.read_i16()?));
                    }
                    letters.push(StoredLetter {
                        id,
                        sender_name,
                        expiry,
                        letter_type,
                        text,
                        attachments,
                    });
                }
                GameLinkReply::RequestPostResponse {
                    character_id,
                    letters,
                }
            }
            other => return Err(CodecError::UnknownMessageId(other)),
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> CharacterSnapshot {
        CharacterSnapshot {
            account_level: 0,
            gender: 0,
            hair_style: 0,
            hair_color: 0,
            attr_points: 0,
            corr_points: 0,
            attributes: vec![(1, 20.0), (2, 20.0)],
            status_effects: vec![StatusEffectEntry { id: 3, ticks: 10 }],
            map_id: 1,
            x: 100,
            y: 200,
            kill_counts: vec![KillCountEntry {
                monster_id: 7,
                kills: 3,
            }],
            ability_ids: vec![1, 2, 3],
            quest_log: vec![QuestLogEntry {
                id: 1,
                state: 0,
                title: "intro".into(),
                description: "the beginning".into(),
            }],
            inventory: vec![InventoryEntry {
                slot: 0,
                item_id: 501,
                amount: 1,
                equipped: true,
            }],
        }
    }

    #[test]
    fn player_enter_roundtrips() {
        let reply = GameLinkReply::PlayerEnter {
            token: "abcd1234".into(),
            character_id: 42,
            name: "Hero".into(),
            snapshot: sample_snapshot(),
        };
        let (id, body) = reply.encode();
        assert_eq!(GameLinkReply::decode(id, &body).unwrap(), reply);
    }

    #[test]
    fn player_sync_roundtrips() {
        let msg = GameLinkMessage::PlayerSync {
            entries: vec![
                SyncEntry::CharPoints {
                    char_id: 1,
                    attr_points: 5,
                    corr_points: 2,
                },
                SyncEntry::OnlineStatus {
                    char_id: 1,
                    online: true,
                },
            ],
        };
        let (id, body) = msg.encode();
        assert_eq!(GameLinkMessage::decode(id, &body).unwrap(), msg);
    }

    #[test]
    fn register_roundtrips() {
        let msg = GameLinkMessage::Register {
            name: "mapserver01".into(),
            address: "10.0.0.5".into(),
            port: 9701,
            password: "shared-secret".into(),
            item_db_version: 7,
        };
        let (id, body) = msg.encode();
        assert_eq!(GameLinkMessage::decode(id, &body).unwrap(), msg);
    }
}
