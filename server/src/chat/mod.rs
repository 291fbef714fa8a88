//! Chat endpoint (spec §4.5): channel membership, guild chat, private
//! messages, party invitations, and the broadcast relay for
//! `GameLinkMessage::Announce`. Authentication rides the same token
//! rendezvous the account endpoint deposits into on `CharSelect` — this
//! module only ever *waits* on `chat_tokens`, never mints into it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use protocol::chat::{ChannelEventKind, ChannelInfo, ChatMessage, ChatReply};
use protocol::status::ErrorKind;
use tokio::sync::{mpsc, Mutex};

use crate::account::{passes_content_filter, ChatHandoff};
use crate::db::models::GuildMemberRow;
use crate::db::Storage;
use crate::game::AnnounceEvent;
use crate::token::TokenCollector;

const CONNECT_TOKEN_TIMEOUT: Duration = Duration::from_secs(15);
const PARTY_INVITE_TIMEOUT: Duration = Duration::from_secs(60);
const GUILD_OWNER_RIGHTS: i16 = i16::MAX;
/// Mode bit granting channel-operator rights (`o` in the original's per-user
/// mode string). Any non-zero `mode` in `PCMSG_USER_MODE` sets it, zero clears it.
const OPERATOR_MODE_BIT: i8 = 0x01;

fn encode(reply: &ChatReply) -> Vec<u8> {
    let (id, body) = reply.encode();
    let mut frame = Vec::new();
    protocol::Frame {
        id: protocol::MessageId(id),
        body,
    }
    .encode_into(&mut frame);
    frame
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    Unknown,
    Authenticated,
}

pub struct ChatSession {
    pub state: ChatState,
    pub character_name: Option<String>,
    pub account_level: Option<u8>,
    joined_channels: HashSet<i16>,
}

impl ChatSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ChatState::Unknown,
            character_name: None,
            account_level: None,
            joined_channels: HashSet::new(),
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

struct Channel {
    id: i16,
    name: String,
    announcement: String,
    password: String,
    guild_bound: bool,
    /// Member name → operator bit (spec §4.5's loose "user mode"; the
    /// original's `ChatChannel::getUserMode` contains 'o' for the same bit).
    members: HashMap<String, bool>,
}

impl Channel {
    fn info(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.id,
            name: self.name.clone(),
            announcement: self.announcement.clone(),
        }
    }

    fn is_operator(&self, name: &str) -> bool {
        self.members.get(name).copied().unwrap_or(false)
    }
}

/// Channel ids are drawn from a freelist before a monotonic counter (spec
/// §4.5), so a long-lived server recycles small ids instead of growing
/// without bound.
struct ChannelRegistry {
    channels: DashMap<i16, Channel>,
    name_to_id: DashMap<String, i16>,
    freelist: Mutex<Vec<i16>>,
    next_id: AtomicI16,
}

impl ChannelRegistry {
    fn new() -> Self {
        Self {
            channels: DashMap::new(),
            name_to_id: DashMap::new(),
            freelist: Mutex::new(Vec::new()),
            next_id: AtomicI16::new(1),
        }
    }

    async fn alloc_id(&self) -> i16 {
        let mut freelist = self.freelist.lock().await;
        freelist.pop().unwrap_or_else(|| self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn free_id(&self, id: i16) {
        self.freelist.lock().await.push(id);
    }

    fn find_by_name(&self, name: &str) -> Option<i16> {
        self.name_to_id.get(name).map(|entry| *entry)
    }
}

struct PartyInviteEntry {
    from: String,
    deadline: Instant,
}

struct PartyState {
    members: HashSet<String>,
}

pub struct ChatEndpoint {
    storage: Arc<dyn Storage>,
    chat_tokens: Arc<TokenCollector<ChatHandoff>>,
    channels: ChannelRegistry,
    /// Character name → outbound sender, used to route broadcasts and
    /// private messages without holding a connection reference.
    clients: DashMap<String, mpsc::Sender<Vec<u8>>>,
    party_invites: DashMap<String, VecDeque<PartyInviteEntry>>,
    guild_invites: DashMap<String, HashSet<String>>,
    parties: DashMap<u64, PartyState>,
    member_party: DashMap<String, u64>,
    next_party_id: AtomicU64,
    max_channel_name_length: u8,
}

impl ChatEndpoint {
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        chat_tokens: Arc<TokenCollector<ChatHandoff>>,
        max_channel_name_length: u8,
    ) -> Self {
        Self {
            storage,
            chat_tokens,
            channels: ChannelRegistry::new(),
            clients: DashMap::new(),
            party_invites: DashMap::new(),
            guild_invites: DashMap::new(),
            parties: DashMap::new(),
            member_party: DashMap::new(),
            next_party_id: AtomicU64::new(1),
            max_channel_name_length,
        }
    }

    /// Consumes `AnnounceEvent`s forwarded from the game-server link and
    /// relays each as a `ChatReply::Announcement` to every connected client.
    /// Runs for the lifetime of the process; intended to be spawned once.
    pub async fn run_announce_loop(&self, mut events: mpsc::Receiver<AnnounceEvent>) {
        while let Some(event) = events.recv().await {
            let reply = ChatReply::Announcement {
                message: event.message,
                sender_name: event.sender_name,
            };
            let frame = encode(&reply);
            for client in self.clients.iter() {
                let _ = client.value().send(frame.clone()).await;
            }
        }
    }

    pub async fn handle(
        &self,
        session: &mut ChatSession,
        outbound: &mpsc::Sender<Vec<u8>>,
        msg: ChatMessage,
    ) -> Option<ChatReply> {
        match msg {
            ChatMessage::Connect { token } => Some(self.connect(session, outbound, token).await),
            ChatMessage::Disconnect => {
                self.on_disconnect(session).await;
                None
            }
            other => {
                let Some(name) = session.character_name.clone() else {
                    return Some(ChatReply::InvalidMessage);
                };
                self.dispatch_authenticated(session, &name, other).await
            }
        }
    }

    async fn connect(
        &self,
        session: &mut ChatSession,
        outbound: &mpsc::Sender<Vec<u8>>,
        token: String,
    ) -> ChatReply {
        if session.state != ChatState::Unknown {
            return ChatReply::ConnectResponse { status: ErrorKind::InvalidArgument };
        }
        let Some(handoff) = self.chat_tokens.await_connect(&token, CONNECT_TOKEN_TIMEOUT).await else {
            return ChatReply::ConnectResponse { status: ErrorKind::TimeOut };
        };
        session.state = ChatState::Authenticated;
        session.character_name = Some(handoff.character_name.clone());
        session.account_level = Some(handoff.account_level);
        self.clients.insert(handoff.character_name, outbound.clone());
        ChatReply::ConnectResponse { status: ErrorKind::Ok }
    }

    #[allow(clippy::too_many_lines)]
    async fn dispatch_authenticated(
        &self,
        session: &mut ChatSession,
        name: &str,
        msg: ChatMessage,
    ) -> Option<ChatReply> {
        match msg {
            ChatMessage::Connect { .. } | ChatMessage::Disconnect => unreachable!("handled by caller"),
            ChatMessage::Say { channel_id, text } => {
                self.say(session, name, channel_id, text).await;
                None
            }
            ChatMessage::PrivateMessage { to_character, text } => {
                self.private_message(name, to_character, text).await
            }
            ChatMessage::Who => Some(ChatReply::WhoResponse {
                characters: self.clients.iter().map(|e| e.key().clone()).collect(),
            }),
            ChatMessage::EnterChannel { channel_name, password } => {
                Some(self.enter_channel(session, name, channel_name, password).await)
            }
            ChatMessage::UserMode { channel_id, user, mode } => {
                Some(self.user_mode(name, channel_id, user, mode))
            }
            ChatMessage::KickUser { channel_id, user } => {
                Some(self.kick_user(name, channel_id, user).await)
            }
            ChatMessage::QuitChannel { channel_id } => {
                Some(self.quit_channel(session, name, channel_id).await)
            }
            ChatMessage::ListChannels => Some(ChatReply::ListChannelsResponse {
                channels: self.channels.channels.iter().map(|e| e.info()).collect(),
            }),
            ChatMessage::ListChannelUsers { channel_name } => {
                Some(self.list_channel_users(channel_name))
            }
            ChatMessage::TopicChange { channel_id, topic } => {
                Some(self.topic_change(name, channel_id, topic))
            }
            ChatMessage::GuildCreate { guild_name } => {
                Some(self.guild_create(name, guild_name).await)
            }
            ChatMessage::GuildInvite { guild_name, character_name } => {
                Some(self.guild_invite(name, guild_name, character_name).await)
            }
            ChatMessage::GuildAccept { guild_name } => {
                Some(self.guild_accept(name, guild_name).await)
            }
            ChatMessage::GuildGetMembers { guild_name } => {
                Some(self.guild_get_members(guild_name).await)
            }
            ChatMessage::GuildPromoteMember { guild_name, member_name, rights } => {
                Some(self.guild_promote(name, guild_name, member_name, rights).await)
            }
            ChatMessage::GuildKickMember { guild_name, member_name } => {
                Some(self.guild_kick(name, guild_name, member_name).await)
            }
            ChatMessage::GuildQuit { guild_name } => Some(self.guild_quit(name, guild_name).await),
            ChatMessage::PartyInvite { character_name } => {
                Some(self.party_invite(name, character_name))
            }
            ChatMessage::PartyInviteAnswer { accepted } => {
                Some(self.party_invite_answer(name, accepted))
            }
            ChatMessage::PartyQuit => Some(self.party_quit(name)),
        }
    }

    async fn send_to(&self, target: &str, reply: &ChatReply) {
        if let Some(sender) = self.clients.get(target) {
            let _ = sender.send(encode(reply)).await;
        }
    }

    async fn broadcast_to_channel(&self, channel_id: i16, reply: &ChatReply) {
        let Some(channel) = self.channels.channels.get(&channel_id) else {
            return;
        };
        let frame = encode(reply);
        for member in channel.members.keys() {
            if let Some(sender) = self.clients.get(member) {
                let _ = sender.send(frame.clone()).await;
            }
        }
    }

    async fn say(&self, session: &ChatSession, name: &str, channel_id: i16, text: String) {
        if !session.joined_channels.contains(&channel_id) || text.is_empty() {
            return;
        }
        self.broadcast_to_channel(
            channel_id,
            &ChatReply::ChatEvent { channel_id, speaker: name.to_string(), text },
        )
        .await;
    }

    async fn private_message(&self, from: &str, to: String, text: String) -> Option<ChatReply> {
        if !self.clients.contains_key(&to) {
            return Some(ChatReply::InvalidMessage);
        }
        self.send_to(
            &to,
            &ChatReply::PrivateMessage { from_character: from.to_string(), text },
        )
        .await;
        None
    }

    async fn channel_name_available(&self, channel_name: &str) -> bool {
        passes_content_filter(channel_name)
            && common::length_in_range(channel_name, 1, self.max_channel_name_length as usize)
            && self.storage.get_guild_by_name(channel_name).await.unwrap_or(None).is_none()
    }

    async fn enter_channel(
        &self,
        session: &mut ChatSession,
        name: &str,
        channel_name: String,
        password: String,
    ) -> ChatReply {
        let existing_id = self.channels.find_by_name(&channel_name);
        let channel_id = match existing_id {
            Some(id) => id,
            None => {
                if !self.channel_name_available(&channel_name).await {
                    return ChatReply::EnterChannelResponse { status: ErrorKind::InvalidArgument, channel: None };
                }
                let id = self.channels.alloc_id().await;
                self.channels.channels.insert(
                    id,
                    Channel {
                        id,
                        name: channel_name.clone(),
                        announcement: String::new(),
                        password: String::new(),
                        guild_bound: false,
                        // Creator takes the operator bit, same as the
                        // original's channel owner.
                        members: HashMap::from([(name.to_string(), true)]),
                    },
                );
                self.channels.name_to_id.insert(channel_name.clone(), id);
                session.joined_channels.insert(id);
                self.broadcast_to_channel(
                    id,
                    &ChatReply::ChannelEvent { channel_id: id, kind: ChannelEventKind::NewPlayer, character: name.to_string() },
                )
                .await;
                let info = self.channels.channels.get(&id).expect("just created").info();
                log::info!("chat: {name} created channel {channel_name} ({id})");
                return ChatReply::EnterChannelResponse { status: ErrorKind::Ok, channel: Some(info) };
            }
        };

        {
            let channel = self.channels.channels.get(&channel_id).expect("just found");
            if !channel.password.is_empty() && channel.password != password {
                return ChatReply::EnterChannelResponse { status: ErrorKind::PasswordBad, channel: None };
            }
        }

        let info = {
            let mut channel = self.channels.channels.get_mut(&channel_id).expect("exists");
            channel.members.insert(name.to_string(), false);
            channel.info()
        };
        session.joined_channels.insert(channel_id);

        self.broadcast_to_channel(
            channel_id,
            &ChatReply::ChannelEvent {
                channel_id,
                kind: ChannelEventKind::NewPlayer,
                character: name.to_string(),
            },
        )
        .await;
        log::info!("chat: {name} entered channel {channel_name} ({channel_id})");

        ChatReply::EnterChannelResponse { status: ErrorKind::Ok, channel: Some(info) }
    }

    /// Only a channel operator may change another user's mode bit, mirroring
    /// the original's `channel->getUserMode(&client).contains('o')` guard.
    fn user_mode(&self, name: &str, channel_id: i16, user: String, mode: i8) -> ChatReply {
        let Some(mut channel) = self.channels.channels.get_mut(&channel_id) else {
            return ChatReply::UserModeResponse { status: ErrorKind::InvalidArgument };
        };
        if !channel.is_operator(name) {
            return ChatReply::UserModeResponse { status: ErrorKind::InsufficientRights };
        }
        let Some(is_operator) = channel.members.get_mut(&user) else {
            return ChatReply::UserModeResponse { status: ErrorKind::InvalidArgument };
        };
        *is_operator = mode & OPERATOR_MODE_BIT != 0;
        ChatReply::UserModeResponse { status: ErrorKind::Ok }
    }

    /// Only a channel operator may kick another member, mirroring the
    /// original's `handleKickUserMessage` guard.
    async fn kick_user(&self, name: &str, channel_id: i16, user: String) -> ChatReply {
        let removed = {
            let Some(mut channel) = self.channels.channels.get_mut(&channel_id) else {
                return ChatReply::KickUserResponse { status: ErrorKind::InvalidArgument };
            };
            if !channel.is_operator(name) {
                return ChatReply::KickUserResponse { status: ErrorKind::InsufficientRights };
            }
            channel.members.remove(&user).is_some()
        };
        if !removed {
            return ChatReply::KickUserResponse { status: ErrorKind::InvalidArgument };
        }
        self.broadcast_to_channel(
            channel_id,
            &ChatReply::ChannelEvent { channel_id, kind: ChannelEventKind::LeavingPlayer, character: user },
        )
        .await;
        self.garbage_collect_channel(channel_id).await;
        ChatReply::KickUserResponse { status: ErrorKind::Ok }
    }

    async fn quit_channel(&self, session: &mut ChatSession, name: &str, channel_id: i16) -> ChatReply {
        if !session.joined_channels.remove(&channel_id) {
            return ChatReply::QuitChannelResponse { status: ErrorKind::InvalidArgument };
        }
        if let Some(mut channel) = self.channels.channels.get_mut(&channel_id) {
            channel.members.remove(name);
        }
        self.broadcast_to_channel(
            channel_id,
            &ChatReply::ChannelEvent {
                channel_id,
                kind: ChannelEventKind::LeavingPlayer,
                character: name.to_string(),
            },
        )
        .await;
        self.garbage_collect_channel(channel_id).await;
        ChatReply::QuitChannelResponse { status: ErrorKind::Ok }
    }

    /// Empty non-guild channels are garbage-collected (spec §4.5); guild
    /// channels are sticky and survive emptying out.
    async fn garbage_collect_channel(&self, channel_id: i16) {
        let should_remove = self
            .channels
            .channels
            .get(&channel_id)
            .is_some_and(|c| c.members.is_empty() && !c.guild_bound);
        if should_remove {
            if let Some((_, channel)) = self.channels.channels.remove(&channel_id) {
                self.channels.name_to_id.remove(&channel.name);
                self.channels.free_id(channel_id).await;
            }
        }
    }

    fn list_channel_users(&self, channel_name: String) -> ChatReply {
        let Some(channel_id) = self.channels.find_by_name(&channel_name) else {
            return ChatReply::ListChannelUsersResponse { users: Vec::new() };
        };
        let users = self
            .channels
            .channels
            .get(&channel_id)
            .map(|c| c.members.keys().cloned().collect())
            .unwrap_or_default();
        ChatReply::ListChannelUsersResponse { users }
    }

    fn topic_change(&self, _name: &str, channel_id: i16, topic: String) -> ChatReply {
        let Some(mut channel) = self.channels.channels.get_mut(&channel_id) else {
            return ChatReply::TopicChangeResponse { status: ErrorKind::InvalidArgument };
        };
        channel.announcement = topic;
        ChatReply::TopicChangeResponse { status: ErrorKind::Ok }
    }

    async fn guild_create(&self, name: &str, guild_name: String) -> ChatReply {
        if !passes_content_filter(&guild_name) {
            return ChatReply::GuildCreateResponse { status: ErrorKind::InvalidArgument };
        }
        let Ok(Some(character_id)) = self.storage.get_character_id(name).await else {
            return ChatReply::GuildCreateResponse { status: ErrorKind::Failure };
        };
        match self.storage.get_guild_by_member(character_id).await {
            Ok(Some(_)) => return ChatReply::GuildCreateResponse { status: ErrorKind::InvalidArgument },
            Err(_) => return ChatReply::GuildCreateResponse { status: ErrorKind::Failure },
            Ok(None) => {}
        }
        if self.storage.get_guild_by_name(&guild_name).await.unwrap_or(None).is_some()
            || self.channels.find_by_name(&guild_name).is_some()
        {
            return ChatReply::GuildCreateResponse { status: ErrorKind::InvalidArgument };
        }

        let guild = crate::db::models::GuildRow {
            id: None,
            name: guild_name.clone(),
            owner_character_id: character_id,
            members: vec![GuildMemberRow { character_id, rights: GUILD_OWNER_RIGHTS }],
        };
        if self.storage.create_guild(guild).await.is_err() {
            return ChatReply::GuildCreateResponse { status: ErrorKind::Failure };
        }

        let channel_id = self.channels.alloc_id().await;
        self.channels.channels.insert(
            channel_id,
            Channel {
                id: channel_id,
                name: guild_name.clone(),
                announcement: String::new(),
                password: String::new(),
                guild_bound: true,
                members: HashMap::from([(name.to_string(), true)]),
            },
        );
        self.channels.name_to_id.insert(guild_name, channel_id);
        log::info!("guild created by {name}, channel {channel_id}");
        ChatReply::GuildCreateResponse { status: ErrorKind::Ok }
    }

    async fn guild_invite(&self, _from: &str, guild_name: String, character_name: String) -> ChatReply {
        if self.storage.get_guild_by_name(&guild_name).await.unwrap_or(None).is_none() {
            return ChatReply::GuildInviteResponse { status: ErrorKind::InvalidArgument };
        }
        self.guild_invites.entry(character_name).or_default().insert(guild_name);
        ChatReply::GuildInviteResponse { status: ErrorKind::Ok }
    }

    async fn guild_accept(&self, name: &str, guild_name: String) -> ChatReply {
        let has_invite = self
            .guild_invites
            .get_mut(name)
            .is_some_and(|mut set| set.remove(&guild_name));
        if !has_invite {
            return ChatReply::GuildAcceptResponse { status: ErrorKind::InvalidArgument };
        }
        let Ok(Some(guild)) = self.storage.get_guild_by_name(&guild_name).await else {
            return ChatReply::GuildAcceptResponse { status: ErrorKind::Failure };
        };
        let Ok(Some(character_id)) = self.storage.get_character_id(name).await else {
            return ChatReply::GuildAcceptResponse { status: ErrorKind::Failure };
        };
        let guild_id = guild.id.expect("persisted guild has an id");
        if self.storage.add_guild_member(guild_id, character_id, 0).await.is_err() {
            return ChatReply::GuildAcceptResponse { status: ErrorKind::Failure };
        }
        if let Some(channel_id) = self.channels.find_by_name(&guild_name) {
            if let Some(mut channel) = self.channels.channels.get_mut(&channel_id) {
                channel.members.insert(name.to_string(), false);
            }
        }
        ChatReply::GuildAcceptResponse { status: ErrorKind::Ok }
    }

    async fn guild_get_members(&self, guild_name: String) -> ChatReply {
        let Ok(Some(guild)) = self.storage.get_guild_by_name(&guild_name).await else {
            return ChatReply::GuildMembersResponse { members: Vec::new() };
        };
        let mut members = Vec::with_capacity(guild.members.len());
        for member in &guild.members {
            if let Ok(Some(character)) = self.storage.get_character_by_id(member.character_id).await {
                members.push((character.name, member.rights));
            }
        }
        ChatReply::GuildMembersResponse { members }
    }

    /// Only the guild owner may promote or kick (spec leaves rights
    /// semantics open; owner-only admin actions is the decision recorded
    /// in the design ledger).
    async fn guild_owner_rights(
        &self,
        name: &str,
        guild_name: &str,
    ) -> Result<crate::db::models::GuildRow, ErrorKind> {
        let Ok(Some(guild)) = self.storage.get_guild_by_name(guild_name).await else {
            return Err(ErrorKind::InvalidArgument);
        };
        let Ok(Some(caller_id)) = self.storage.get_character_id(name).await else {
            return Err(ErrorKind::Failure);
        };
        if guild.owner_character_id != caller_id {
            return Err(ErrorKind::InsufficientRights);
        }
        Ok(guild)
    }

    async fn guild_promote(&self, name: &str, guild_name: String, member_name: String, rights: i16) -> ChatReply {
        let guild = match self.guild_owner_rights(name, &guild_name).await {
            Ok(g) => g,
            Err(status) => return ChatReply::GuildPromoteResponse { status },
        };
        let Ok(Some(member_id)) = self.storage.get_character_id(&member_name).await else {
            return ChatReply::GuildPromoteResponse { status: ErrorKind::InvalidArgument };
        };
        if self
            .storage
            .set_guild_member_rights(guild.id.expect("persisted guild has an id"), member_id, rights)
            .await
            .is_err()
        {
            return ChatReply::GuildPromoteResponse { status: ErrorKind::Failure };
        }
        ChatReply::GuildPromoteResponse { status: ErrorKind::Ok }
    }

    async fn guild_kick(&self, name: &str, guild_name: String, member_name: String) -> ChatReply {
        let guild = match self.guild_owner_rights(name, &guild_name).await {
            Ok(g) => g,
            Err(status) => return ChatReply::GuildKickResponse { status },
        };
        let Ok(Some(member_id)) = self.storage.get_character_id(&member_name).await else {
            return ChatReply::GuildKickResponse { status: ErrorKind::InvalidArgument };
        };
        if member_id == guild.owner_character_id {
            return ChatReply::GuildKickResponse { status: ErrorKind::InvalidArgument };
        }
        let guild_id = guild.id.expect("persisted guild has an id");
        if self.storage.remove_guild_member(guild_id, member_id).await.is_err() {
            return ChatReply::GuildKickResponse { status: ErrorKind::Failure };
        }
        self.remove_from_guild_channel(&guild_name, &member_name).await;
        ChatReply::GuildKickResponse { status: ErrorKind::Ok }
    }

    async fn guild_quit(&self, name: &str, guild_name: String) -> ChatReply {
        let Ok(Some(guild)) = self.storage.get_guild_by_name(&guild_name).await else {
            return ChatReply::GuildQuitResponse { status: ErrorKind::InvalidArgument };
        };
        let Ok(Some(character_id)) = self.storage.get_character_id(name).await else {
            return ChatReply::GuildQuitResponse { status: ErrorKind::Failure };
        };
        let guild_id = guild.id.expect("persisted guild has an id");
        if character_id == guild.owner_character_id || guild.members.len() <= 1 {
            // Owner leaving (or the last member leaving) has no succession
            // rule in spec — dissolve the guild and its bound channel.
            if self.storage.delete_guild(guild_id).await.is_err() {
                return ChatReply::GuildQuitResponse { status: ErrorKind::Failure };
            }
            if let Some(channel_id) = self.channels.find_by_name(&guild_name) {
                if let Some((_, channel)) = self.channels.channels.remove(&channel_id) {
                    self.channels.name_to_id.remove(&channel.name);
                    self.channels.free_id(channel_id).await;
                }
            }
        } else {
            if self.storage.remove_guild_member(guild_id, character_id).await.is_err() {
                return ChatReply::GuildQuitResponse { status: ErrorKind::Failure };
            }
            self.remove_from_guild_channel(&guild_name, name).await;
        }
        ChatReply::GuildQuitResponse { status: ErrorKind::Ok }
    }

    async fn remove_from_guild_channel(&self, guild_name: &str, member_name: &str) {
        let Some(channel_id) = self.channels.find_by_name(guild_name) else {
            return;
        };
        if let Some(mut channel) = self.channels.channels.get_mut(&channel_id) {
            channel.members.remove(member_name);
        }
        self.broadcast_to_channel(
            channel_id,
            &ChatReply::ChannelEvent {
                channel_id,
                kind: ChannelEventKind::LeavingPlayer,
                character: member_name.to_string(),
            },
        )
        .await;
    }

    fn sweep_party_invites(&self, name: &str) {
        let now = Instant::now();
        if let Some(mut queue) = self.party_invites.get_mut(name) {
            queue.retain(|entry| entry.deadline > now);
        }
    }

    fn party_invite(&self, from: &str, character_name: String) -> ChatReply {
        self.sweep_party_invites(&character_name);
        self.party_invites.entry(character_name).or_default().push_back(PartyInviteEntry {
            from: from.to_string(),
            deadline: Instant::now() + PARTY_INVITE_TIMEOUT,
        });
        ChatReply::PartyInviteResponse { status: ErrorKind::Ok }
    }

    fn party_invite_answer(&self, name: &str, accepted: bool) -> ChatReply {
        self.sweep_party_invites(name);
        let Some(entry) = self.party_invites.get_mut(name).and_then(|mut q| q.pop_front()) else {
            return ChatReply::PartyInviteAnswerResponse { status: ErrorKind::InvalidArgument };
        };
        if accepted {
            self.join_party(&entry.from, name);
        }
        ChatReply::PartyInviteAnswerResponse { status: ErrorKind::Ok }
    }

    fn join_party(&self, inviter: &str, invitee: &str) {
        let party_id = self.member_party.get(inviter).map(|e| *e).unwrap_or_else(|| {
            let id = self.next_party_id.fetch_add(1, Ordering::SeqCst);
            self.parties.insert(id, PartyState { members: HashSet::from([inviter.to_string()]) });
            self.member_party.insert(inviter.to_string(), id);
            id
        });
        if let Some(mut party) = self.parties.get_mut(&party_id) {
            party.members.insert(invitee.to_string());
        }
        self.member_party.insert(invitee.to_string(), party_id);
    }

    fn party_quit(&self, name: &str) -> ChatReply {
        let Some((_, party_id)) = self.member_party.remove(name) else {
            return ChatReply::PartyQuitResponse { status: ErrorKind::InvalidArgument };
        };
        let remaining = if let Some(mut party) = self.parties.get_mut(&party_id) {
            party.members.remove(name);
            party.members.len()
        } else {
            0
        };
        if remaining <= 1 {
            if let Some((_, party)) = self.parties.remove(&party_id) {
                for member in party.members {
                    self.member_party.remove(&member);
                }
            }
        }
        ChatReply::PartyQuitResponse { status: ErrorKind::Ok }
    }

    /// Removes the session from every channel (broadcasting `LeavingPlayer`
    /// on each), drops its party membership, and forgets its routing entry.
    pub async fn on_disconnect(&self, session: &mut ChatSession) {
        let Some(name) = session.character_name.take() else {
            return;
        };
        for channel_id in session.joined_channels.drain().collect::<Vec<_>>() {
            if let Some(mut channel) = self.channels.channels.get_mut(&channel_id) {
                channel.members.remove(&name);
            }
            self.broadcast_to_channel(
                channel_id,
                &ChatReply::ChannelEvent { channel_id, kind: ChannelEventKind::LeavingPlayer, character: name.clone() },
            )
            .await;
            self.garbage_collect_channel(channel_id).await;
        }
        let _ = self.party_quit(&name);
        self.clients.remove(&name);
        session.state = ChatState::Unknown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStorage;

    fn endpoint() -> ChatEndpoint {
        ChatEndpoint::new(Arc::new(InMemoryStorage::new()), Arc::new(TokenCollector::new()), 32)
    }

    #[tokio::test]
    async fn connect_without_matching_token_times_out() {
        let ep = endpoint();
        let mut session = ChatSession::new();
        let (tx, _rx) = mpsc::channel(4);
        let reply = ep.connect(&mut session, &tx, "missing".into()).await;
        assert_eq!(reply, ChatReply::ConnectResponse { status: ErrorKind::TimeOut });
        assert_eq!(session.state, ChatState::Unknown);
    }

    #[tokio::test]
    async fn connect_completes_when_token_already_deposited() {
        let ep = endpoint();
        ep.chat_tokens.deposit_client_with_token(
            "tok",
            ChatHandoff { character_name: "Hero".into(), account_level: 0 },
            Duration::from_secs(5),
        );
        let mut session = ChatSession::new();
        let (tx, _rx) = mpsc::channel(4);
        let reply = ep.connect(&mut session, &tx, "tok".into()).await;
        assert_eq!(reply, ChatReply::ConnectResponse { status: ErrorKind::Ok });
        assert_eq!(session.character_name.as_deref(), Some("Hero"));
    }

    #[tokio::test]
    async fn enter_channel_then_say_broadcasts_to_self() {
        let ep = endpoint();
        let mut session = ChatSession::new();
        session.state = ChatState::Authenticated;
        session.character_name = Some("Hero".into());
        let (tx, mut rx) = mpsc::channel(4);
        ep.clients.insert("Hero".into(), tx);

        let enter = ep.enter_channel(&mut session, "Hero", "General".into(), String::new()).await;
        assert_eq!(
            enter,
            ChatReply::EnterChannelResponse {
                status: ErrorKind::Ok,
                channel: Some(ChannelInfo { id: 1, name: "General".into(), announcement: String::new() }),
            }
        );
        // drain the NewPlayer channel event from entering
        rx.recv().await.unwrap();

        ep.say(&session, "Hero", 1, "hi".into()).await;
        let frame = rx.recv().await.unwrap();
        let (decoded, _consumed) = protocol::Frame::try_decode(&frame).unwrap().unwrap();
        let reply = ChatReply::decode(decoded.id.0, &decoded.body).unwrap();
        assert_eq!(
            reply,
            ChatReply::ChatEvent { channel_id: 1, speaker: "Hero".into(), text: "hi".into() }
        );
    }
}
