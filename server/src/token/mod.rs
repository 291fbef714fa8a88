//! Token-rendezvous for handoffs between endpoints (spec §4.1): the account
//! endpoint mints a token and tells a client to reconnect elsewhere with it;
//! whichever of the two sides — the waiting client or the waiting endpoint —
//! arrives second completes the handoff. Generic over the payload each side
//! carries so the same machinery serves game-server redirects and chat
//! connects.

use dashmap::DashMap;
use rand::{distributions::Alphanumeric, Rng};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

const TOKEN_LENGTH: usize = 32;

#[must_use]
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

struct PendingClient<C> {
    payload: C,
    deadline: Instant,
}

struct PendingConnect<C> {
    responder: oneshot::Sender<C>,
    deadline: Instant,
}

/// Two-sided rendezvous keyed by token. `deposit_client` is called by
/// whichever side learns the token first (typically the account endpoint
/// minting it for a client about to reconnect); `await_connect` is called
/// by the side waiting for that client to show up (the game-server link or
/// chat endpoint). Whichever call happens second resolves immediately;
/// whichever happens first waits up to its own deadline.
pub struct TokenCollector<C> {
    pending_clients: DashMap<String, PendingClient<C>>,
    pending_connects: DashMap<String, PendingConnect<C>>,
}

impl<C> Default for TokenCollector<C> {
    fn default() -> Self {
        Self {
            pending_clients: DashMap::new(),
            pending_connects: DashMap::new(),
        }
    }
}

impl<C> TokenCollector<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a fresh token and records `payload` as available for
    /// `timeout`. If a connect is already waiting on the returned token
    /// (vanishingly unlikely given the token space, but handled to keep
    /// the rendezvous at-most-once) it is completed immediately.
    pub fn deposit_client(&self, payload: C, timeout: Duration) -> String {
        let token = generate_token();
        if let Some((_, connect)) = self.pending_connects.remove(&token) {
            let _ = connect.responder.send(payload);
            return token;
        }
        self.pending_clients.insert(
            token.clone(),
            PendingClient {
                payload,
                deadline: Instant::now() + timeout,
            },
        );
        token
    }

    /// Like [`Self::deposit_client`] but for a token minted elsewhere (e.g.
    /// the account endpoint's own `CharSelect` handoff token), rather than
    /// one generated here.
    pub fn deposit_client_with_token(&self, token: &str, payload: C, timeout: Duration) -> bool {
        if let Some((_, connect)) = self.pending_connects.remove(token) {
            return connect.responder.send(payload).is_ok();
        }
        self.pending_clients.insert(
            token.to_string(),
            PendingClient {
                payload,
                deadline: Instant::now() + timeout,
            },
        );
        true
    }

    /// Waits for a client to present `token`, or times out after `timeout`.
    /// Returns `None` on timeout or on a second concurrent wait for the
    /// same token (at-most-once matching: the first waiter wins).
    pub async fn await_connect(&self, token: &str, timeout: Duration) -> Option<C> {
        if let Some((_, client)) = self.pending_clients.remove(token) {
            return Some(client.payload);
        }
        if self.pending_connects.contains_key(token) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.pending_connects.insert(
            token.to_string(),
            PendingConnect {
                responder: tx,
                deadline: Instant::now() + timeout,
            },
        );
        let result = tokio::time::timeout(timeout, rx).await;
        self.pending_connects.remove(token);
        result.ok().and_then(std::result::Result::ok)
    }

    /// Presents `token` from the client side, immediately completing a
    /// waiting `await_connect` if one exists, or filing the payload for a
    /// connect that hasn't arrived yet.
    pub fn present_token(&self, token: &str, payload: C) -> bool {
        if let Some((_, connect)) = self.pending_connects.remove(token) {
            return connect.responder.send(payload).is_ok();
        }
        false
    }

    /// Periodic sweep dropping anything past its deadline. Pending connects
    /// are left for `await_connect`'s own `tokio::time::timeout` to reap;
    /// this only needs to clear `pending_clients` that nobody ever claimed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.pending_clients.len();
        self.pending_clients.retain(|_, entry| entry.deadline > now);
        before - self.pending_clients.len()
    }

    #[must_use]
    pub fn pending_client_count(&self) -> usize {
        self.pending_clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn client_deposits_before_connect_arrives() {
        let collector: TokenCollector<u32> = TokenCollector::new();
        let token = collector.deposit_client(42, Duration::from_secs(5));
        let payload = collector.await_connect(&token, Duration::from_secs(1)).await;
        assert_eq!(payload, Some(42));
    }

    #[tokio::test]
    async fn connect_waits_then_client_presents_token() {
        let collector: Arc<TokenCollector<u32>> = Arc::new(TokenCollector::new());
        let token = generate_token();
        let waiter = {
            let collector = collector.clone();
            let token = token.clone();
            tokio::spawn(async move { collector.await_connect(&token, Duration::from_secs(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(collector.present_token(&token, 7));
        assert_eq!(waiter.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn connect_times_out_when_nobody_presents() {
        let collector: TokenCollector<u32> = TokenCollector::new();
        let payload = collector
            .await_connect("never-presented", Duration::from_millis(20))
            .await;
        assert_eq!(payload, None);
    }

    #[tokio::test]
    async fn sweep_clears_expired_deposits() {
        let collector: TokenCollector<u32> = TokenCollector::new();
        collector.deposit_client(1, Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(collector.sweep_expired(), 1);
        assert_eq!(collector.pending_client_count(), 0);
    }
}
