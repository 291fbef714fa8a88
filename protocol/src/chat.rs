//! Client ↔ chat wire messages (spec §4.5, §6).
//!
//! Ground: `examples/original_source/src/chat-server/chathandler.cpp`'s
//! `PCMSG_*`/`CPMSG_*` dispatch (channel chat, private message, who,
//! enter/kick/quit/mode/topic/list channel, guild create/invite/accept/
//! members/promote/kick/quit, party invite answer/quit) names the message
//! catalogue; field order here follows each handler's `msg.read*()` call
//! sequence.

use crate::error::CodecError;
use crate::ids::{chat_in, chat_out};
use crate::status::ErrorKind;
use crate::wire::{Reader, Writer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEventKind {
    NewPlayer,
    LeavingPlayer,
    TopicChange,
    ModeChange,
}

impl ChannelEventKind {
    fn to_u8(self) -> u8 {
        match self {
            ChannelEventKind::NewPlayer => 0,
            ChannelEventKind::LeavingPlayer => 1,
            ChannelEventKind::TopicChange => 2,
            ChannelEventKind::ModeChange => 3,
        }
    }

    fn from_u8(v: u8) -> Result<Self, CodecError> {
        Ok(match v {
            0 => ChannelEventKind::NewPlayer,
            1 => ChannelEventKind::LeavingPlayer,
            2 => ChannelEventKind::TopicChange,
            3 => ChannelEventKind::ModeChange,
            other => {
                return Err(CodecError::InvalidDiscriminant(
                    other as u32,
                    "ChannelEventKind",
                ))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: i16,
    pub name: String,
    pub announcement: String,
}

/// Client → chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    Connect {
        token: String,
    },
    Say {
        channel_id: i16,
        text: String,
    },
    PrivateMessage {
        to_character: String,
        text: String,
    },
    Who,
    EnterChannel {
        channel_name: String,
        password: String,
    },
    UserMode {
        channel_id: i16,
        user: String,
        mode: i8,
    },
    KickUser {
        channel_id: i16,
        user: String,
    },
    QuitChannel {
        channel_id: i16,
    },
    ListChannels,
    ListChannelUsers {
        channel_name: String,
    },
    TopicChange {
        channel_id: i16,
        topic: String,
    },
    Disconnect,
    GuildCreate {
        guild_name: String,
    },
    GuildInvite {
        guild_name: String,
        character_name: String,
    },
    GuildAccept {
        guild_name: String,
    },
    GuildGetMembers {
        guild_name: String,
    },
    GuildPromoteMember {
        guild_name: String,
        member_name: String,
        rights: i16,
    },
    GuildKickMember {
        guild_name: String,
        member_name: String,
    },
    GuildQuit {
        guild_name: String,
    },
    PartyInvite {
        character_name: String,
    },
    PartyInviteAnswer {
        accepted: bool,
    },
    PartyQuit,
}

impl ChatMessage {
    pub fn decode(id: u16, body: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(body);
        let msg = match id {
            chat_in::CONNECT => ChatMessage::Connect {
                token: r.read_str()?,
            },
            chat_in::SAY => ChatMessage::Say {
                channel_id: r.read_i16()?,
                text: r.read_str()?,
            },
            chat_in::PRIVATE_MESSAGE => ChatMessage::PrivateMessage {
                to_character: r.read_str()?,
                text: r.read_str()?,
            },
            chat_in::WHO => ChatMessage::Who,
            chat_in::ENTER_CHANNEL => ChatMessage::EnterChannel {
                channel_name: r.read_str()?,
                password: r.read_str()?,
            },
            chat_in::USER_MODE => ChatMessage::UserMode {
                channel_id: r.read_i16()?,
                user: r.read_str()?,
                mode: r.read_i8()?,
            },
            chat_in::KICK_USER => ChatMessage::KickUser {
                channel_id: r.read_i16()?,
                user: r.read_str()?,
            },
            chat_in::QUIT_CHANNEL => ChatMessage::QuitChannel {
                channel_id: r.read_i16()?,
            },
            chat_in::LIST_CHANNELS => ChatMessage::ListChannels,
            chat_in::LIST_CHANNEL_USERS => ChatMessage::ListChannelUsers {
                channel_name: r.read_str()?,
            },
            chat_in::TOPIC_CHANGE => ChatMessage::TopicChange {
                channel_id: r.read_i16()?,
                topic: r.read_str()?,
            },
            chat_in::DISCONNECT => ChatMessage::Disconnect,
            chat_in::GUILD_CREATE => ChatMessage::GuildCreate {
                guild_name: r.read_str()?,
            },
            chat_in::GUILD_INVITE => ChatMessage::GuildInvite {
                guild_name: r.read_str()?,
                character_name: r.read_str()?,
            },
            chat_in::GUILD_ACCEPT => ChatMessage::GuildAccept {
                guild_name: r.read_str()?,
            },
            chat_in::GUILD_GET_MEMBERS => ChatMessage::GuildGetMembers {
                guild_name: r.read_str()?,
            },
            chat_in::GUILD_PROMOTE_MEMBER => ChatMessage::GuildPromoteMember {
                guild_name: r.read_str()?,
                member_name: r.read_str()?,
                rights: r.read_i16()?,
            },
            chat_in::GUILD_KICK_MEMBER => ChatMessage::GuildKickMember {
                guild_name: r.read_str()?,
                member_name: r.read_str()?,
            },
            chat_in::GUILD_QUIT => ChatMessage::GuildQuit {
                guild_name: r.read_str()?,
            },
            chat_in::PARTY_INVITE => ChatMessage::PartyInvite {
                character_name: r.read_str()?,
            },
            chat_in::PARTY_INVITE_ANSWER => ChatMessage::PartyInviteAnswer {
                accepted: r.read_bool()?,
            },
            chat_in::PARTY_QUIT => ChatMessage::PartyQuit,
            other => return Err(CodecError::UnknownMessageId(other)),
        };
        Ok(msg)
    }

    #[must_use]
    pub fn encode(&self) -> (u16, Vec<u8>) {
        let mut w = Writer::new();
        let id = match self {
            ChatMessage::Connect { token } => {
                w.write_str(token);
                chat_in::CONNECT
            }
            ChatMessage::Say { channel_id, text } => {
                w.write_i16(*channel_id);
                w.write_str(text);
                chat_in::SAY
            }
            ChatMessage::PrivateMessage { to_character, text } => {
                w.write_str(to_character);
                w.write_str(text);
                chat_in::PRIVATE_MESSAGE
            }
            ChatMessage::Who => chat_in::WHO,
            ChatMessage::EnterChannel {
                channel_name,
                password,
            } => {
                w.write_str(channel_name);
                w.write_str(password);
                chat_in::ENTER_CHANNEL
            }
            ChatMessage::UserMode {
                channel_id,
                user,
                mode,
            } => {
                w.write_i16(*channel_id);
                w.write_str(user);
                w.write_i8(*mode);
                chat_in::USER_MODE
            }
            ChatMessage::KickUser { channel_id, user } => {
                w.write_i16(*channel_id);
                w.write_str(user);
                chat_in::KICK_USER
            }
            ChatMessage::QuitChannel { channel_id } => {
                w.write_i16(*channel_id);
                chat_in::QUIT_CHANNEL
            }
            ChatMessage::ListChannels => chat_in::LIST_CHANNELS,
            ChatMessage::ListChannelUsers { channel_name } => {
                w.write_str(channel_name);
                chat_in::LIST_CHANNEL_USERS
            }
            ChatMessage::TopicChange { channel_id, topic } => {
                w.write_i16(*channel_id);
                w.write_str(topic);
                chat_in::TOPIC_CHANGE
            }
            ChatMessage::Disconnect => chat_in::DISCONNECT,
            ChatMessage::GuildCreate { guild_name } => {
                w.write_str(guild_name);
                chat_in::GUILD_CREATE
            }
            ChatMessage::GuildInvite {
                guild_name,
                character_name,
            } => {
                w.write_str(guild_name);
                w.write_str(character_name);
                chat_in::GUILD_INVITE
            }
            ChatMessage::GuildAccept { guild_name } => {
                w.write_str(guild_name);
                chat_in::GUILD_ACCEPT
            }
            ChatMessage::GuildGetMembers { guild_name } => {
                w.write_str(guild_name);
                chat_in::GUILD_GET_MEMBERS
            }
            ChatMessage::GuildPromoteMember {
                guild_name,
                member_name,
                rights,
            } => {
                w.write_str(guild_name);
                w.write_str(member_name);
                w.write_i16(*rights);
                chat_in::GUILD_PROMOTE_MEMBER
            }
            ChatMessage::GuildKickMember {
                guild_name,
                member_name,
            } => {
                w.write_str(guild_name);
                w.write_str(member_name);
                chat_in::GUILD_KICK_MEMBER
            }
            ChatMessage::GuildQuit { guild_name } => {
                w.write_str(guild_name);
                chat_in::GUILD_QUIT
            }
            ChatMessage::PartyInvite { character_name } => {
                w.write_str(character_name);
                chat_in::PARTY_INVITE
            }
            ChatMessage::PartyInviteAnswer { accepted } => {
                w.write_bool(*accepted);
                chat_in::PARTY_INVITE_ANSWER
            }
            ChatMessage::PartyQuit => chat_in::PARTY_QUIT,
        };
        (id, w.into_bytes())
    }
}

/// Chat → client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    ConnectResponse {
        status: ErrorKind,
    },
    ChatEvent {
        channel_id: i16,
        speaker: String,
        text: String,
    },
    PrivateMessage {
        from_character: String,
        text: String,
    },
    WhoResponse {
        characters: Vec<String>,
    },
    EnterChannelResponse {
        status: ErrorKind,
        channel: Option<ChannelInfo>,
    },
    UserModeResponse {
        status: ErrorKind,
    },
    KickUserResponse {
        status: ErrorKind,
    },
    QuitChannelResponse {
        status: ErrorKind,
    },
    ListChannelsResponse {
        channels: Vec<ChannelInfo>,
    },
    ListChannelUsersResponse {
        users: Vec<String>,
    },
    TopicChangeResponse {
        status: ErrorKind,
    },
    ChannelEvent {
        channel_id: i16,
        kind: ChannelEventKind,
        character: String,
    },
    GuildCreateResponse {
        status: ErrorKind,
    },
    GuildInviteResponse {
        status: ErrorKind,
    },
    GuildAcceptResponse {
        status: ErrorKind,
    },
    GuildMembersResponse {
        members: Vec<(String, i16)>,
    },
    GuildPromoteResponse {
        status: ErrorKind,
    },
    GuildKickResponse {
        status: ErrorKind,
    },
    GuildQuitResponse {
        status: ErrorKind,
    },
    PartyInviteResponse {
        status: ErrorKind,
    },
    PartyInviteAnswerResponse {
        status: ErrorKind,
    },
    PartyQuitResponse {
        status: ErrorKind,
    },
    Announcement {
        message: String,
        sender_name: String,
    },
    InvalidMessage,
}

impl ChatReply {
    #[must_use]
    pub fn encode(&self) -> (u16, Vec<u8>) {
        let mut w = Writer::new();
        let id = match self {
            ChatReply::ConnectResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::CONNECT_RESPONSE
            }
            ChatReply::ChatEvent {
                channel_id,
                speaker,
                text,
            } => {
                w.write_i16(*channel_id);
                w.write_str(speaker);
                w.write_str(text);
                chat_out::CHAT_EVENT
            }
            ChatReply::PrivateMessage { from_character, text } => {
                w.write_str(from_character);
                w.write_str(text);
                chat_out::PRIVATE_MESSAGE
            }
            ChatReply::WhoResponse { characters } => {
                w.write_u16(characters.len() as u16);
                for c in characters {
                    w.write_str(c);
                }
                chat_out::WHO_RESPONSE
            }
            ChatReply::EnterChannelResponse { status, channel } => {
                w.write_u8(status.to_u8());
                w.write_bool(channel.is_some());
                if let Some(c) = channel {
                    w.write_i16(c.id);
                    w.write_str(&c.name);
                    w.write_str(&c.announcement);
                }
                chat_out::ENTER_CHANNEL_RESPONSE
            }
            ChatReply::UserModeResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::USER_MODE_RESPONSE
            }
            ChatReply::KickUserResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::KICK_USER_RESPONSE
            }
            ChatReply::QuitChannelResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::QUIT_CHANNEL_RESPONSE
            }
            ChatReply::ListChannelsResponse { channels } => {
                w.write_u16(channels.len() as u16);
                for c in channels {
                    w.write_i16(c.id);
                    w.write_str(&c.name);
                    w.write_str(&c.announcement);
                }
                chat_out::LIST_CHANNELS_RESPONSE
            }
            ChatReply::ListChannelUsersResponse { users } => {
                w.write_u16(users.len() as u16);
                for u in users {
                    w.write_str(u);
                }
                chat_out::LIST_CHANNEL_USERS_RESPONSE
            }
            ChatReply::TopicChangeResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::TOPIC_CHANGE_RESPONSE
            }
            ChatReply::ChannelEvent {
                channel_id,
                kind,
                character,
            } => {
                w.write_i16(*channel_id);
                w.write_u8(kind.to_u8());
                w.write_str(character);
                chat_out::CHANNEL_EVENT
            }
            ChatReply::GuildCreateResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::GUILD_CREATE_RESPONSE
            }
            ChatReply::GuildInviteResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::GUILD_INVITE_RESPONSE
            }
            ChatReply::GuildAcceptResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::GUILD_ACCEPT_RESPONSE
            }
            ChatReply::GuildMembersResponse { members } => {
                w.write_u16(members.len() as u16);
                for (name, rights) in members {
                    w.write_str(name);
                    w.write_i16(*rights);
                }
                chat_out::GUILD_MEMBERS_RESPONSE
            }
            ChatReply::GuildPromoteResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::GUILD_PROMOTE_RESPONSE
            }
            ChatReply::GuildKickResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::GUILD_KICK_RESPONSE
            }
            ChatReply::GuildQuitResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::GUILD_QUIT_RESPONSE
            }
            ChatReply::PartyInviteResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::PARTY_INVITE_RESPONSE
            }
            ChatReply::PartyInviteAnswerResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::PARTY_INVITE_ANSWER_RESPONSE
            }
            ChatReply::PartyQuitResponse { status } => {
                w.write_u8(status.to_u8());
                chat_out::PARTY_QUIT_RESPONSE
            }
            ChatReply::Announcement {
                message,
                sender_name,
            } => {
                w.write_str(message);
                w.write_str(sender_name);
                chat_out::ANNOUNCEMENT
            }
            ChatReply::InvalidMessage => chat_out::INVALID_MESSAGE,
        };
        (id, w.into_bytes())
    }

    pub fn decode(id: u16, body: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(body);
        let reply = match id {
            chat_out::CONNECT_RESPONSE => ChatReply::ConnectResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::CHAT_EVENT => ChatReply::ChatEvent {
                channel_id: r.read_i16()?,
                speaker: r.read_str()?,
                text: r.read_str()?,
            },
            chat_out::PRIVATE_MESSAGE => ChatReply::PrivateMessage {
                from_character: r.read_str()?,
                text: r.read_str()?,
            },
            chat_out::WHO_RESPONSE => {
                let count = r.read_u16()?;
                let mut characters = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    characters.push(r.read_str()?);
                }
                ChatReply::WhoResponse { characters }
            }
            chat_out::ENTER_CHANNEL_RESPONSE => {
                let status = ErrorKind::from_u8(r.read_u8()?)?;
                let has_channel = r.read_bool()?;
                let channel = if has_channel {
                    Some(ChannelInfo {
                        id: r.read_i16()?,
                        name: r.read_str()?,
                        announcement: r.read_str()?,
                    })
                } else {
                    None
                };
                ChatReply::EnterChannelResponse { status, channel }
            }
            chat_out::USER_MODE_RESPONSE => ChatReply::UserModeResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::KICK_USER_RESPONSE => ChatReply::KickUserResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::QUIT_CHANNEL_RESPONSE => ChatReply::QuitChannelResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::LIST_CHANNELS_RESPONSE => {
                let count = r.read_u16()?;
                let mut channels = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    channels.push(ChannelInfo {
                        id: r.read_i16()?,
                        name: r.read_str()?,
                        announcement: r.read_str()?,
                    });
                }
                ChatReply::ListChannelsResponse { channels }
            }
            chat_out::LIST_CHANNEL_USERS_RESPONSE => {
                let count = r.read_u16()?;
                let mut users = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    users.push(r.read_str()?);
                }
                ChatReply::ListChannelUsersResponse { users }
            }
            chat_out::TOPIC_CHANGE_RESPONSE => ChatReply::TopicChangeResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::CHANNEL_EVENT => ChatReply::ChannelEvent {
                channel_id: r.read_i16()?,
                kind: ChannelEventKind::from_u8(r.read_u8()?)?,
                character: r.read_str()?,
            },
            chat_out::GUILD_CREATE_RESPONSE => ChatReply::GuildCreateResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::GUILD_INVITE_RESPONSE => ChatReply::GuildInviteResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::GUILD_ACCEPT_RESPONSE => ChatReply::GuildAcceptResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::GUILD_MEMBERS_RESPONSE => {
                let count = r.read_u16()?;
                let mut members = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    members.push((r.read_str()?, r.read_i16()?));
                }
                ChatReply::GuildMembersResponse { members }
            }
            chat_out::GUILD_PROMOTE_RESPONSE => ChatReply::GuildPromoteResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::GUILD_KICK_RESPONSE => ChatReply::GuildKickResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::GUILD_QUIT_RESPONSE => ChatReply::GuildQuitResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::PARTY_INVITE_RESPONSE => ChatReply::PartyInviteResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::PARTY_INVITE_ANSWER_RESPONSE => ChatReply::PartyInviteAnswerResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::PARTY_QUIT_RESPONSE => ChatReply::PartyQuitResponse {
                status: ErrorKind::from_u8(r.read_u8()?)?,
            },
            chat_out::ANNOUNCEMENT => ChatReply::Announcement {
                message: r.read_str()?,
                sender_name: r.read_str()?,
            },
            chat_out::INVALID_MESSAGE => ChatReply::InvalidMessage,
            other => return Err(CodecError::UnknownMessageId(other)),
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_channel_roundtrips() {
        let msg = ChatMessage::EnterChannel {
            channel_name: "General".into(),
            password: String::new(),
        };
        let (id, body) = msg.encode();
        assert_eq!(ChatMessage::decode(id, &body).unwrap(), msg);
    }

    #[test]
    fn channel_event_roundtrips() {
        let reply = ChatReply::ChannelEvent {
            channel_id: 3,
            kind: ChannelEventKind::NewPlayer,
            character: "Hero".into(),
        };
        let (id, body) = reply.encode();
        assert_eq!(ChatReply::decode(id, &body).unwrap(), reply);
    }

    #[test]
    fn guild_members_roundtrips() {
        let reply = ChatReply::GuildMembersResponse {
            members: vec![("Hero".into(), 3), ("Sidekick".into(), 1)],
        };
        let (id, body) = reply.encode();
        assert_eq!(ChatReply::decode(id, &body).unwrap(), reply);
    }
}
