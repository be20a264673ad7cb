use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use harbor_types::events::GatewayEvent;

/// Tracks which users have a live gateway connection and fans events out to
/// them. This is the only mutable shared state the relay owns; the map is
/// reachable exclusively through these methods.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for events every connected client receives.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// user_id -> (conn_id, targeted send channel). At most one entry per
    /// user: a new handshake for the same user replaces the old entry.
    connections: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to the broadcast feed. Each connection forwards what it
    /// receives here to its client.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Register a live connection for `user_id`, superseding any previous
    /// one. Returns the new connection id and the targeted event receiver.
    ///
    /// The dropped sender of a superseded entry ends that connection's
    /// forward loop; the stale socket tears itself down from there.
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut connections = self.inner.connections.write().await;
        connections.insert(user_id, (conn_id, tx));
        self.broadcast_presence(&connections);

        (conn_id, rx)
    }

    /// Remove the mapping for `user_id`, but only if `conn_id` still owns
    /// it. A late disconnect from a superseded connection is a no-op and
    /// does not broadcast.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut connections = self.inner.connections.write().await;
        match connections.get(&user_id) {
            Some((owner, _)) if *owner == conn_id => {
                connections.remove(&user_id);
                self.broadcast_presence(&connections);
            }
            _ => {}
        }
    }

    /// Connection id for `user_id`, if online. Pure read.
    pub async fn lookup(&self, user_id: Uuid) -> Option<Uuid> {
        self.inner
            .connections
            .read()
            .await
            .get(&user_id)
            .map(|(conn_id, _)| *conn_id)
    }

    /// Snapshot of the currently online user ids. Absence from this set is
    /// the sole definition of "offline".
    pub async fn online_user_ids(&self) -> Vec<Uuid> {
        self.inner.connections.read().await.keys().copied().collect()
    }

    /// Best-effort targeted push. Does nothing when the user is offline or
    /// its channel already closed.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let connections = self.inner.connections.read().await;
        if let Some((_, tx)) = connections.get(&user_id) {
            let _ = tx.send(event);
        }
    }

    /// Full-set presence broadcast. Called with the write lock held so the
    /// sequence of snapshots clients observe matches the sequence of
    /// registry mutations.
    fn broadcast_presence(
        &self,
        connections: &HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>,
    ) {
        let user_ids = connections.keys().copied().collect();
        let _ = self
            .inner
            .broadcast_tx
            .send(GatewayEvent::PresenceUpdate { user_ids });
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(event: GatewayEvent) -> Vec<Uuid> {
        match event {
            GatewayEvent::PresenceUpdate { user_ids } => user_ids,
            other => panic!("expected PresenceUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn register_then_unregister_updates_online_set() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (conn_id, _rx) = dispatcher.register(user).await;
        assert_eq!(dispatcher.online_user_ids().await, vec![user]);
        assert_eq!(dispatcher.lookup(user).await, Some(conn_id));

        dispatcher.unregister(user, conn_id).await;
        assert!(dispatcher.online_user_ids().await.is_empty());
        assert_eq!(dispatcher.lookup(user).await, None);
    }

    #[tokio::test]
    async fn second_register_supersedes_first() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (first_conn, mut first_rx) = dispatcher.register(user).await;
        let (second_conn, mut second_rx) = dispatcher.register(user).await;
        assert_ne!(first_conn, second_conn);

        // Exactly one entry remains, owned by the latest connection.
        assert_eq!(dispatcher.online_user_ids().await, vec![user]);
        assert_eq!(dispatcher.lookup(user).await, Some(second_conn));

        // Targeted sends reach only the new channel; the old one is closed.
        dispatcher
            .send_to_user(user, GatewayEvent::SeenAck { conversation_id: Uuid::new_v4() })
            .await;
        assert!(second_rx.recv().await.is_some());
        assert!(first_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stale_unregister_is_a_noop() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (first_conn, _first_rx) = dispatcher.register(user).await;
        let (second_conn, _second_rx) = dispatcher.register(user).await;

        // The superseded connection disconnects late; the user stays online.
        dispatcher.unregister(user, first_conn).await;
        assert_eq!(dispatcher.lookup(user).await, Some(second_conn));

        // Repeating an unregister that already happened is also fine.
        dispatcher.unregister(user, second_conn).await;
        dispatcher.unregister(user, second_conn).await;
        assert!(dispatcher.online_user_ids().await.is_empty());
    }

    #[tokio::test]
    async fn every_mutation_broadcasts_the_full_online_set() {
        let dispatcher = Dispatcher::new();
        let mut feed = dispatcher.subscribe();
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let (c1, _rx1) = dispatcher.register(u1).await;
        let (_c2, _rx2) = dispatcher.register(u2).await;
        dispatcher.unregister(u1, c1).await;

        let first = presence(feed.recv().await.unwrap());
        assert_eq!(first, vec![u1]);

        let second = presence(feed.recv().await.unwrap());
        assert_eq!(second.len(), 2);
        assert!(second.contains(&u1) && second.contains(&u2));

        let third = presence(feed.recv().await.unwrap());
        assert_eq!(third, vec![u2]);
    }

    #[tokio::test]
    async fn connection_flap_leaves_user_offline() {
        let dispatcher = Dispatcher::new();
        let mut feed = dispatcher.subscribe();
        let user = Uuid::new_v4();

        let (conn_id, _rx) = dispatcher.register(user).await;
        dispatcher.unregister(user, conn_id).await;

        // Two broadcasts: one with the user, one without.
        assert_eq!(presence(feed.recv().await.unwrap()), vec![user]);
        assert!(presence(feed.recv().await.unwrap()).is_empty());
        assert!(dispatcher.online_user_ids().await.is_empty());
    }

    #[tokio::test]
    async fn send_to_offline_user_does_nothing() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .send_to_user(
                Uuid::new_v4(),
                GatewayEvent::SeenAck { conversation_id: Uuid::new_v4() },
            )
            .await;
    }
}
