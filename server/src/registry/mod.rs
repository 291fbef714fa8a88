//! Map-to-game-server directory (spec §4.2). A single axis — `mapId` to the
//! game server that currently claims it — simplified from the teacher's
//! multi-instance `WorldDirectory` (world/entry/map/instance), since this
//! backbone only ever routes a client to the map it asked for, never to a
//! specific entry or instance within it.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::db::CharacterId;

/// Outbound half of a connected game server's link, identified by the link
/// itself so a registry entry can be torn down when that link drops.
#[derive(Clone)]
pub struct GameServerHandle {
    pub server_id: u64,
    pub address: String,
    pub port: i16,
    pub sender: mpsc::Sender<Vec<u8>>,
}

impl PartialEq for GameServerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.server_id == other.server_id
    }
}

impl Eq for GameServerHandle {}

/// Maps `mapId -> GameServerHandle`. Readers get a consistent snapshot per
/// lookup; writers (registration, redirect claims, disconnect) mutate one
/// entry at a time without a global lock, matching dashmap's per-shard
/// locking the teacher already relies on elsewhere.
#[derive(Clone, Default)]
pub struct MapRegistry {
    maps: Arc<DashMap<i16, GameServerHandle>>,
}

impl MapRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A `REGISTER` announcing ownership of `map_id`. Spec §4.4 leaves last-
    /// writer-wins as the resolution when two servers claim the same map;
    /// we follow that here rather than rejecting the second claim.
    pub fn claim(&self, map_id: i16, handle: GameServerHandle) {
        self.maps.insert(map_id, handle);
    }

    #[must_use]
    pub fn lookup(&self, map_id: i16) -> Option<GameServerHandle> {
        self.maps.get(&map_id).map(|entry| entry.clone())
    }

    #[must_use]
    pub fn iterate(&self) -> Vec<(i16, GameServerHandle)> {
        self.maps
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Every distinct game server currently holding at least one map, in
    /// the order `REGISTER` announced them. Used to fan `SET_VAR_WORLD` out
    /// to every connected server exactly once.
    #[must_use]
    pub fn distinct_servers(&self) -> Vec<GameServerHandle> {
        let mut seen = Vec::new();
        for entry in self.maps.iter() {
            if !seen.iter().any(|h: &GameServerHandle| h.server_id == entry.server_id) {
                seen.push(entry.value().clone());
            }
        }
        seen
    }

    /// Called when a game server's link drops. Removes every map it held
    /// and aborts any in-flight handoff still pointed at it — the next
    /// `CharSelect`/`Redirect` for those maps fails with `NoRouteForMap`
    /// until a server re-registers them.
    pub fn release(&self, server_id: u64) {
        self.maps.retain(|_, handle| handle.server_id != server_id);
    }

    #[must_use]
    pub fn map_count(&self) -> usize {
        self.maps.len()
    }
}

/// Bridges the wire protocol's 32-bit character ids (spec §6 — a legacy
/// constraint the message catalogue still carries) to storage's
/// `ObjectId`s. Populated whenever the account endpoint hands a character
/// off to a game server (`PLAYER_ENTER`); consulted by the game-server link
/// whenever an incoming message names a character only by that i32 (e.g.
/// `BAN_PLAYER`, `REDIRECT`).
#[derive(Clone, Default)]
pub struct CharacterIdMap {
    ids: Arc<DashMap<i32, CharacterId>>,
}

impl CharacterIdMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, wire_id: i32, character_id: CharacterId) {
        self.ids.insert(wire_id, character_id);
    }

    #[must_use]
    pub fn resolve(&self, wire_id: i32) -> Option<CharacterId> {
        self.ids.get(&wire_id).map(|entry| *entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(server_id: u64) -> GameServerHandle {
        let (sender, _receiver) = mpsc::channel(1);
        GameServerHandle {
            server_id,
            address: "127.0.0.1".into(),
            port: 9700,
            sender,
        }
    }

    #[test]
    fn claim_then_lookup() {
        let registry = MapRegistry::new();
        registry.claim(1, handle(7));
        assert_eq!(registry.lookup(1).unwrap().server_id, 7);
        assert!(registry.lookup(2).is_none());
    }

    #[test]
    fn last_writer_wins_on_conflicting_claim() {
        let registry = MapRegistry::new();
        registry.claim(1, handle(7));
        registry.claim(1, handle(9));
        assert_eq!(registry.lookup(1).unwrap().server_id, 9);
    }

    #[test]
    fn release_drops_every_map_for_that_server() {
        let registry = MapRegistry::new();
        registry.claim(1, handle(7));
        registry.claim(2, handle(7));
        registry.claim(3, handle(9));
        registry.release(7);
        assert!(registry.lookup(1).is_none());
        assert!(registry.lookup(2).is_none());
        assert_eq!(registry.lookup(3).unwrap().server_id, 9);
    }

    #[test]
    fn distinct_servers_deduplicates_by_id() {
        let registry = MapRegistry::new();
        registry.claim(1, handle(7));
        registry.claim(2, handle(7));
        registry.claim(3, handle(9));
        assert_eq!(registry.distinct_servers().len(), 2);
    }

    #[test]
    fn character_id_map_resolves_after_insert() {
        let map = CharacterIdMap::new();
        let oid = CharacterId::new();
        map.insert(42, oid);
        assert_eq!(map.resolve(42), Some(oid));
        assert_eq!(map.resolve(43), None);
    }
}
