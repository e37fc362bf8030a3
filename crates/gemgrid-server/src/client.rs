use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use gemgrid_core::ids::GameId;
use gemgrid_core::slot::PlayerSlot;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// Unique client identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl ClientId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected WebSocket client, optionally bound to a player seat in
/// one game after a successful `game.join`.
pub struct Client {
    pub id: ClientId,
    pub game: Option<(GameId, PlayerSlot)>,
    pub tx: mpsc::Sender<String>,
    pub connected: AtomicBool,
    pub last_pong: std::sync::atomic::AtomicU64,
}

impl Client {
    fn new(id: ClientId, tx: mpsc::Sender<String>) -> Self {
        let now = now_secs();
        Self {
            id,
            game: None,
            tx,
            connected: AtomicBool::new(true),
            last_pong: std::sync::atomic::AtomicU64::new(now),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn bind_game(&mut self, game_id: GameId, slot: PlayerSlot) {
        self.game = Some((game_id, slot));
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CLIENT_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected WebSocket clients.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<Mutex<Client>>>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new client and return its ID + receiver.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let client = Arc::new(Mutex::new(Client::new(id.clone(), tx)));
        self.clients.insert(id.clone(), client);
        (id, rx)
    }

    /// Remove a client, returning its game binding if it had one. Awaits
    /// the client lock so a concurrent reader can't make the binding go
    /// missing; the entry is already out of the map, so the wait is
    /// bounded.
    pub async fn unregister(&self, id: &ClientId) -> Option<(GameId, PlayerSlot)> {
        if let Some((_, client)) = self.clients.remove(id) {
            let c = client.lock().await;
            c.connected.store(false, Ordering::Relaxed);
            return c.game.clone();
        }
        None
    }

    /// Bind a client to its seat in a game after a successful join.
    pub async fn bind_game(&self, client_id: &ClientId, game_id: GameId, slot: PlayerSlot) {
        if let Some(client) = self.clients.get(client_id) {
            client.lock().await.bind_game(game_id, slot);
        }
    }

    pub async fn binding(&self, client_id: &ClientId) -> Option<(GameId, PlayerSlot)> {
        let client = self.clients.get(client_id)?;
        let client = client.lock().await;
        client.game.clone()
    }

    /// Send a message to a specific client. Messages to a full queue
    /// are dropped with a warning rather than blocking the caller.
    pub async fn send_to(&self, client_id: &ClientId, message: String) -> bool {
        if let Some(client) = self.clients.get(client_id) {
            let tx = client.lock().await.tx.clone();
            match tx.try_send(message) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(msg)) => {
                    tracing::warn!(
                        client_id = %client_id,
                        msg_len = msg.len(),
                        "Send queue full, dropping message"
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        } else {
            false
        }
    }

    /// Broadcast the same message to every client watching a game.
    pub fn broadcast_to_game(&self, game_id: &GameId, message: &str) {
        for entry in self.clients.iter() {
            if let Ok(client) = entry.value().try_lock() {
                let watching = client.game.as_ref().map(|(id, _)| id) == Some(game_id);
                if watching && client.is_connected() {
                    let _ = client.tx.try_send(message.to_string());
                }
            }
        }
    }

    /// All clients watching a game, with their seats. Used to push each
    /// viewer its own projection.
    pub async fn viewers_of_game(&self, game_id: &GameId) -> Vec<(ClientId, PlayerSlot)> {
        let mut result = Vec::new();
        for entry in self.clients.iter() {
            let client = entry.value().lock().await;
            if let Some((id, slot)) = &client.game {
                if id == game_id {
                    result.push((client.id.clone(), *slot));
                }
            }
        }
        result
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Remove clients that haven't responded to pings within the timeout.
    /// Returns the seats the dead clients held, so the caller can mark
    /// them disconnected in their games.
    pub async fn cleanup_dead_clients(&self) -> Vec<(ClientId, GameId, PlayerSlot)> {
        let dead: Vec<ClientId> = self
            .clients
            .iter()
            .filter_map(|entry| {
                if let Ok(client) = entry.value().try_lock() {
                    if !client.is_alive() {
                        return Some(client.id.clone());
                    }
                }
                None
            })
            .collect();

        let mut reaped = Vec::new();
        for id in dead {
            let binding = self.unregister(&id).await;
            tracing::info!(client_id = %id, "Cleaned up dead client");
            if let Some((game_id, slot)) = binding {
                reaped.push((id, game_id, slot));
            }
        }
        reaped
    }

    /// Backdate a client's last pong so the cleanup path sees it as dead.
    #[cfg(test)]
    pub(crate) fn expire_for_test(&self, id: &ClientId) {
        if let Some(client) = self.clients.get(id) {
            if let Ok(c) = client.try_lock() {
                c.last_pong.store(0, Ordering::Relaxed);
            }
        }
    }
}

/// Handle a WebSocket connection: split into reader/writer, manage the
/// lifecycle with heartbeats. Returns the client's game binding at close
/// time so the caller can mark the seat disconnected.
pub async fn handle_ws_connection(
    socket: WebSocket,
    client_id: ClientId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ClientRegistry>,
    on_message: mpsc::Sender<(ClientId, String)>,
) -> Option<(GameId, PlayerSlot)> {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward messages from channel to WebSocket + periodic ping
    let writer_cid = client_id.clone();
    let writer_registry = Arc::clone(&registry);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(client_id = %writer_cid, "Sent ping");
                }
            }
        }

        // Mark as disconnected
        if let Some(client) = writer_registry.clients.get(&writer_cid) {
            if let Ok(c) = client.try_lock() {
                c.connected.store(false, Ordering::Relaxed);
            }
        }
    });

    // Reader task: forward WebSocket messages to the dispatcher, track pongs
    let reader_cid = client_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let _ = on_message.send((reader_cid.clone(), text.to_string())).await;
                }
                WsMessage::Pong(_) => {
                    if let Some(client) = reader_registry.clients.get(&reader_cid) {
                        if let Ok(c) = client.try_lock() {
                            c.record_pong();
                        }
                    }
                }
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum answers pings automatically
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    registry.unregister(&client_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_unique() {
        let a = ClientId::new();
        let b = ClientId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("client_"));
    }

    #[tokio::test]
    async fn registry_register_and_unregister() {
        let registry = ClientRegistry::new(32);
        assert_eq!(registry.count(), 0);

        let (id1, _rx1) = registry.register();
        let (id2, _rx2) = registry.register();
        assert_eq!(registry.count(), 2);

        registry.unregister(&id1).await;
        assert_eq!(registry.count(), 1);

        registry.unregister(&id2).await;
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn unregister_returns_the_game_binding() {
        let registry = ClientRegistry::new(32);
        let (id, _rx) = registry.register();
        let game_id = GameId::new();

        registry
            .bind_game(&id, game_id.clone(), PlayerSlot::Two)
            .await;
        assert_eq!(
            registry.binding(&id).await,
            Some((game_id.clone(), PlayerSlot::Two))
        );

        let binding = registry.unregister(&id).await;
        assert_eq!(binding, Some((game_id, PlayerSlot::Two)));
    }

    #[tokio::test]
    async fn unregister_waits_out_a_concurrent_lock_holder() {
        let registry = Arc::new(ClientRegistry::new(32));
        let (id, _rx) = registry.register();
        let game_id = GameId::new();
        registry.bind_game(&id, game_id.clone(), PlayerSlot::One).await;

        // Hold the client lock briefly from another task while the
        // unregister runs; the binding must still come back.
        let held = {
            let entry = registry.clients.get(&id).unwrap();
            Arc::clone(entry.value())
        };
        let holder = tokio::spawn(async move {
            let _guard = held.lock().await;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        });
        tokio::task::yield_now().await;

        let binding = registry.unregister(&id).await;
        assert_eq!(binding, Some((game_id, PlayerSlot::One)));
        holder.await.unwrap();
    }

    #[tokio::test]
    async fn viewers_of_game_lists_bound_clients_with_seats() {
        let registry = ClientRegistry::new(32);
        let (id1, _rx1) = registry.register();
        let (id2, _rx2) = registry.register();
        let (_id3, _rx3) = registry.register();

        let game_id = GameId::new();
        registry.bind_game(&id1, game_id.clone(), PlayerSlot::One).await;
        registry.bind_game(&id2, game_id.clone(), PlayerSlot::Two).await;

        let mut viewers = registry.viewers_of_game(&game_id).await;
        viewers.sort_by_key(|(_, slot)| *slot as u8);
        assert_eq!(viewers.len(), 2);
        assert_eq!(viewers[0], (id1, PlayerSlot::One));
        assert_eq!(viewers[1], (id2, PlayerSlot::Two));
    }

    #[test]
    fn broadcast_reaches_only_bound_clients() {
        let registry = ClientRegistry::new(32);
        let (id1, mut rx1) = registry.register();
        let (id2, mut rx2) = registry.register();
        let (_id3, mut rx3) = registry.register();

        let game_id = GameId::new();
        {
            let entry = registry.clients.get(&id1).unwrap();
            entry
                .try_lock()
                .unwrap()
                .bind_game(game_id.clone(), PlayerSlot::One);
        }
        {
            let entry = registry.clients.get(&id2).unwrap();
            entry
                .try_lock()
                .unwrap()
                .bind_game(game_id.clone(), PlayerSlot::Two);
        }

        registry.broadcast_to_game(&game_id, "hello");

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_specific_client() {
        let registry = ClientRegistry::new(32);
        let (id, mut rx) = registry.register();

        let sent = registry.send_to(&id, "test message".into()).await;
        assert!(sent);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg, "test message");
    }

    #[tokio::test]
    async fn send_to_full_queue_drops() {
        let registry = ClientRegistry::new(2);
        let (id, _rx) = registry.register();

        assert!(registry.send_to(&id, "msg1".into()).await);
        assert!(registry.send_to(&id, "msg2".into()).await);
        assert!(!registry.send_to(&id, "msg3".into()).await);
    }

    #[tokio::test]
    async fn cleanup_dead_clients_removes_expired() {
        let registry = ClientRegistry::new(32);
        let (id, _rx) = registry.register();
        assert_eq!(registry.count(), 1);

        registry.expire_for_test(&id);

        // Unbound client: removed, but there is no seat to report.
        let reaped = registry.cleanup_dead_clients().await;
        assert!(reaped.is_empty());
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn cleanup_reports_the_seats_of_reaped_clients() {
        let registry = ClientRegistry::new(32);
        let (dead, _rx1) = registry.register();
        let (alive, _rx2) = registry.register();
        let game_id = GameId::new();
        registry.bind_game(&dead, game_id.clone(), PlayerSlot::Two).await;
        registry.bind_game(&alive, game_id.clone(), PlayerSlot::One).await;

        registry.expire_for_test(&dead);

        let reaped = registry.cleanup_dead_clients().await;
        assert_eq!(reaped, vec![(dead, game_id, PlayerSlot::Two)]);
        assert_eq!(registry.count(), 1);
    }
}
