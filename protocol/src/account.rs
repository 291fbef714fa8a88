//! Client ↔ account wire messages (spec §4.3, §6).

use crate::error::CodecError;
use crate::ids::{account_in, account_out};
use crate::status::ErrorKind;
use crate::wire::{Reader, Writer};

/// One attribute entry as carried in a character roster or snapshot:
/// `(id, base*256, modified*256)` per spec §6's legacy-client scaling note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeEntry {
    pub id: i16,
    pub base_scaled: i32,
    pub modified_scaled: i32,
}

/// One equipped-slot entry: `(equipSlot, itemId)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquipEntry {
    pub equip_slot: i16,
    pub item_id: i16,
}

/// A character roster row as sent in `LoginResponse`, and the reply payload
/// for a successful `CharCreate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterSummary {
    pub slot: i8,
    pub name: String,
    pub gender: i8,
    pub hair_style: i8,
    pub hair_color: i8,
    pub attr_points: i32,
    pub corr_points: i32,
    pub equipment: Vec<EquipEntry>,
    pub attributes: Vec<AttributeEntry>,
}

impl CharacterSummary {
    fn encode(&self, w: &mut Writer) {
        w.write_i8(self.slot);
        w.write_str(&self.name);
        w.write_i8(self.gender);
        w.write_i8(self.hair_style);
        w.write_i8(self.hair_color);
        w.write_i32(self.attr_points);
        w.write_i32(self.corr_points);
        w.write_u16(self.equipment.len() as u16);
        for eq in &self.equipment {
            w.write_i16(eq.equip_slot);
            w.write_i16(eq.item_id);
        }
        w.write_u16(self.attributes.len() as u16);
        for attr in &self.attributes {
            w.write_i16(attr.id);
            w.write_i32(attr.base_scaled);
            w.write_i32(attr.modified_scaled);
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let slot = r.read_i8()?;
        let name = r.read_str()?;
        let gender = r.read_i8()?;
        let hair_style = r.read_i8()?;
        let hair_color = r.read_i8()?;
        let attr_points = r.read_i32()?;
        let corr_points = r.read_i32()?;
        let equip_count = r.read_u16()?;
        let mut equipment = Vec::with_capacity(equip_count as usize);
        for _ in 0..equip_count {
            equipment.push(EquipEntry {
                equip_slot: r.read_i16()?,
                item_id: r.read_i16()?,
            });
        }
        let attr_count = r.read_u16()?;
        let mut attributes = Vec::with_capacity(attr_count as usize);
        for _ in 0..attr_count {
            attributes.push(AttributeEntry {
                id: r.read_i16()?,
                base_scaled: r.read_i32()?,
                modified_scaled: r.read_i32()?,
            });
        }
        Ok(Self {
            slot,
            name,
            gender,
            hair_style,
            hair_color,
            attr_points,
            corr_points,
            equipment,
            attributes,
        })
    }
}

/// Client → account messages.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountMessage {
    LoginRandTrigger {
        username: String,
    },
    Login {
        version: i32,
        username: String,
        salted_hash: String,
    },
    Logout,
    Reconnect {
        token: String,
    },
    Register {
        version: i32,
        username: String,
        password_hash: String,
        email: String,
        captcha: String,
    },
    Unregister {
        username: String,
        password_hash: String,
    },
    EmailChange {
        email: String,
    },
    PasswordChange {
        old_hash: String,
        new_hash: String,
    },
    CharCreate {
        name: String,
        hair_style: i8,
        hair_color: i8,
        gender: i8,
        slot: i8,
        attributes: Vec<i32>,
    },
    CharSelect {
        slot: i8,
    },
    CharDelete {
        slot: i8,
    },
    RequestRegisterInfo,
}

impl AccountMessage {
    pub fn decode(id: u16, body: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(body);
        let msg = match id {
            account_in::LOGIN_RAND_TRIGGER => AccountMessage::LoginRandTrigger {
                username: r.read_str()?,
            },
            account_in::LOGIN => AccountMessage::Login {
                version: r.read_i32()?,
                username: r.read_str()?,
                salted_hash: r.read_str()?,
            },
            account_in::LOGOUT => AccountMessage::Logout,
            account_in::RECONNECT => AccountMessage::Reconnect {
                token: r.read_str()?,
            },
            account_in::REGISTER => AccountMessage::Register {
                version: r.read_i32()?,
                username: r.read_str()?,
                password_hash: r.read_str()?,
                email: r.read_str()?,
                captcha: r.read_str()?,
            },
            account_in::UNREGISTER => AccountMessage::Unregister {
                username: r.read_str()?,
                password_hash: r.read_str()?,
            },
            account_in::EMAIL_CHANGE => AccountMessage::EmailChange {
                email: r.read_str()?,
            },
            account_in::PASSWORD_CHANGE => AccountMessage::PasswordChange {
                old_hash: r.read_str()?,
                new_hash: r.read_str()?,
            },
            account_in::CHAR_CREATE => {
                let name = r.read_str()?;
                let hair_style = r.read_i8()?;
                let hair_color = r.read_i8()?;
                let gender = r.read_i8()?;
                let slot = r.read_i8()?;
                let attr_count = r.read_u16()?;
                let mut attributes = Vec::with_capacity(attr_count as usize);
                for _ in 0..attr_count {
                    attributes.push(r.read_i32()?);
                }
                AccountMessage::CharCreate {
                    name,
                    hair_style,
                    hair_color,
                    gender,
                    slot,
                    attributes,
                }
            }
            account_in::CHAR_SELECT => AccountMessage::CharSelect { slot: r.read_i8()? },
            account_in::CHAR_DELETE => AccountMessage::CharDelete { slot: r.read_i8()? },
            account_in::REQUEST_REGISTER_INFO => AccountMessage::RequestRegisterInfo,
            other => return Err(CodecError::UnknownMessageId(other)),
        };
        Ok(msg)
    }

    #[must_use]
    pub fn encode(&self) -> (u16, Vec<u8>) {
        let mut w = Writer::new();
        let id = match self {
            AccountMessage::LoginRandTrigger { username } => {
                w.write_str(username);
                account_in::LOGIN_RAND_TRIGGER
            }
            AccountMessage::Login {
                version,
                username,
                salted_hash,
            } => {
                w.write_i32(*version);
                w.write_str(username);
                w.write_str(salted_hash);
                account_in::LOGIN
            }
            AccountMessage::Logout => account_in::LOGOUT,
            AccountMessage::Reconnect { token } => {
                w.write_str(token);
                account_in::RECONNECT
            }
            AccountMessage::Register {
                version,
                username,
                password_hash,
                email,
                captcha,
            } => {
                w.write_i32(*version);
                w.write_str(username);
                w.write_str(password_hash);
                w.write_str(email);
                w.write_str(captcha);
                account_in::REGISTER
            }
            AccountMessage::Unregister {
                username,
                password_hash,
            } => {
                w.write_str(username);
                w.write_str(password_hash);
                account_in::UNREGISTER
            }
            AccountMessage::EmailChange { email } => {
                w.write_str(email);
                account_in::EMAIL_CHANGE
            }
            AccountMessage::PasswordChange { old_hash, new_hash } => {
                w.write_str(old_hash);
                w.write_str(new_hash);
                account_in::PASSWORD_CHANGE
            }
            AccountMessage::CharCreate {
                name,
                hair_style,
                hair_color,
                gender,
                slot,
                attributes,
            } => {
                w.write_str(name);
                w.write_i8(*hair_style);
                w.write_i8(*hair_color);
                w.write_i8(*gender);
                w.write_i8(*slot);
                w.write_u16(attributes.len() as u16);
                for a in attributes {
                    w.write_i32(*a);
                }
                account_in::CHAR_CREATE
            }
            AccountMessage::CharSelect { slot } => {
                w.write_i8(*slot);
                account_in::CHAR_SELECT
            }
            AccountMessage::CharDelete { slot } => {
                w.write_i8(*slot);
                account_in::CHAR_DELETE
            }
            AccountMessage::RequestRegisterInfo => account_in::REQUEST_REGISTER_INFO,
        };
        (id, w.into_bytes())
    }
}

/// Account → client messages.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountReply {
    LoginRandTriggerResponse {
        salt: String,
    },
    LoginResponse {
        status: ErrorKind,
        update_host: String,
        data_url: String,
        max_chars: i8,
        characters: Vec<CharacterSummary>,
    },
    LogoutResponse {
        status: ErrorKind,
    },
    ReconnectResponse {
        status: ErrorKind,
    },
    RegisterResponse {
        status: ErrorKind,
    },
    UnregisterResponse {
        status: ErrorKind,
    },
    EmailChangeResponse {
        status: ErrorKind,
    },
    PasswordChangeResponse {
        status: ErrorKind,
    },
    CharCreateResponse {
        status: ErrorKind,
        character: Option<CharacterSummary>,
    },
    CharSelectResponse {
        status: ErrorKind,
        token: String,
        game_address: String,
        game_port: i16,
        chat_address: String,
        chat_port: i16,
    },
    CharDeleteResponse {
        status: ErrorKind,
    },
    RegisterInfoResponse {
        min_name_length: i8,
        max_name_length: i8,
        captcha_url: String,
        allowed: bool,
        deny_reason: String,
    },
    InvalidMessage,
}

impl AccountReply {
    #[must_use]
    pub fn encode(&self) -> (u16, Vec<u8>) {
        let mut w = Writer::new();
        let id = match self {
            AccountReply::LoginRandTriggerResponse { salt } => {
                w.write_str(salt);
                account_out::LOGIN_RAND_TRIGGER_RESPONSE
            }
            AccountReply::LoginResponse {
                status,
                update_host,
                data_url,
                max_chars,
                characters,
            } => {
                w.write_u8(status.to_u8());
                w.write_str(update_host);
                w.write_str(data_url);
                w.write_i8(*max_chars);
                for c in characters {
                    c.encode(&mut w);
                }
                account_out::LOGIN_RESPONSE
            }
            AccountReply::LogoutResponse { status } => {
                w.write_u8(status.to_u8());
                account_out::LOGOUT_RESPONSE
            }
            AccountReply::ReconnectResponse { status } => {
                w.write_u8(status.to_u8());
                account_out::RECONNECT_RESPONSE
            }
            AccountReply::RegisterResponse { status } => {
                w.write_u8(status.to_u8());
                account_out::REGISTER_RESPONSE
            }
            AccountReply::UnregisterResponse { status } => {
                w.write_u8(status.to_u8());
                account_out::UNREGISTER_RESPONSE
            }
            AccountReply::EmailChangeResponse { status } => {
                w.write_u8(status.to_u8());
                account_out::EMAIL_CHANGE_RESPONSE
            }
            AccountReply::PasswordChangeResponse { status } => {
                w.write_u8(status.to_u8());
                account_out::PASSWORD_CHANGE_RESPONSE
            }
            AccountReply::CharCreateResponse { status, character } => {
                w.write_u8(status.to_u8());
                w.write_bool(character.is_some());
                if let Some(c) = character {
                    c.encode(&mut w);
                }
                account_out::CHAR_CREATE_RESPONSE
            }
            AccountReply::CharSelectResponse {
                status,
                token,
                game_address,
                game_port,
                chat_address,
                chat_port,
            } => {
                w.write_u8(status.to_u8());
                w.write_str(token);
                w.write_str(game_address);
                w.write_i16(*game_port);
                w.write_str(chat_address);
                w.write_i16(*chat_port);
                account_out::CHAR_SELECT_RESPONSE
            }
            AccountReply::CharDeleteResponse { status } => {
                w.write_u8(status.to_u8());
                account_out::CHAR_DELETE_RESPONSE
            }
            AccountReply::RegisterInfoResponse {
                min_name_length,
                max_name_length,
                captcha_url,
                allowed,
                deny_reason,
            } => {
                w.write_i8(*min_name_length);
                w.write_i8(*max_name_length);
                w.write_str(captcha_url);
                w.write_bool(*allowed);
                w.write_str(deny_reason);
                account_out::REGISTER_INFO_RESPONSE
            }
            AccountReply::InvalidMessage => account_out::INVALID_MESSAGE,
        };
        (id, w.into_bytes())
    }

    pub fn decode(id: u16, body: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(body);
        let reply = match id {
            account_out::LOGIN_RAND_TRIGGER_RESPONSE => AccountReply::LoginRandTriggerResponse {
                salt: r.read_str()?,
            },
            account_out::LOGIN_RESPONSE => {
                let status = ErrorKind::from_u8(r.read_u8()?)?;
                let update_host = r.read_str()?;
                let data_url = r.read_str()?;
                let max_chars = r.read_i8()?;
                let mut characters = Vec::new();
                while !r.is_empty() {
                    characters.push(CharacterSummary::decode(&mut r)?);
                }
                AccountReply::LoginResponse {
                    status,
                    update_host,
                    data_url,
                    max_chars,
                    characters,
                }
            }
            account_out::LOGOUT_RESPONSE => AccountReply::LogoutResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            account_out::RECONNECT_RESPONSE => AccountReply::ReconnectResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            account_out::REGISTER_RESPONSE => AccountReply::RegisterResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            account_out::UNREGISTER_RESPONSE => AccountReply::UnregisterResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            account_out::EMAIL_CHANGE_RESPONSE => AccountReply::EmailChangeResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            account_out::PASSWORD_CHANGE_RESPONSE => AccountReply::PasswordChangeResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            account_out::CHAR_CREATE_RESPONSE => {
                let status = ErrorKind::from_u8(r.read_u8()?)?;
                let has_char = r.read_bool()?;
                let character = if has_char {
                    Some(CharacterSummary::decode(&mut r)?)
                } else {
                    None
                };
                AccountReply::CharCreateResponse { status, character }
            }
            account_out::CHAR_SELECT_RESPONSE => AccountReply::CharSelectResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
                token: r.read_str()?,
                game_address: r.read_str()?,
                game_port: r.read_i16()?,
                chat_address: r.read_str()?,
                chat_port: r.read_i16()?,
            },
            account_out::CHAR_DELETE_RESPONSE => AccountReply::CharDeleteResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            account_out::REGISTER_INFO_RESPONSE => AccountReply::RegisterInfoResponse {
                min_name_length: r.read_i8()?,
                max_name_length: r.read_i8()?,
                captcha_url: r.read_str()?,
                allowed: r.read_bool()?,
                deny_reason: r.read_str()?,
            },
            account_out::INVALID_MESSAGE => AccountReply::InvalidMessage,
            other => return Err(CodecError::UnknownMessageId(other)),
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_roundtrips() {
        let msg = AccountMessage::Login {
            version: 10,
            username: "alice".into(),
            salted_hash: "deadbeef".into(),
        };
        let (id, body) = msg.encode();
        assert_eq!(AccountMessage::decode(id, &body).unwrap(), msg);
    }

    #[test]
    fn char_create_roundtrips() {
        let msg = AccountMessage::CharCreate {
            name: "Hero".into(),
            hair_style: 0,
            hair_color: 0,
            gender: 0,
            slot: 1,
            attributes: vec![20, 20, 20],
        };
        let (id, body) = msg.encode();
        assert_eq!(AccountMessage::decode(id, &body).unwrap(), msg);
    }

    #[test]
    fn login_response_with_roster_roundtrips() {
        let reply = AccountReply::LoginResponse {
            status: ErrorKind::Ok,
            update_host: String::new(),
            data_url: String::new(),
            max_chars: 3,
            characters: vec![CharacterSummary {
                slot: 1,
                name: "Hero".into(),
                gender: 0,
                hair_style: 0,
                hair_color: 0,
                attr_points: 0,
                corr_points: 0,
                equipment: vec![EquipEntry {
                    equip_slot: 0,
                    item_id: 5,
                }],
                attributes: vec![AttributeEntry {
                    id: 1,
                    base_scaled: 5120,
                    modified_scaled: 5120,
                }],
            }],
        };
        let (id, body) = reply.encode();
        assert_eq!(AccountReply::decode(id, &body).unwrap(), reply);
    }

    #[test]
    fn unknown_message_id_is_an_error() {
        assert!(AccountMessage::decode(0xffff, &[]).is_err());
    }
}
