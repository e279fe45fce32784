use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use courier_types::events::GatewayEvent;

/// Routes events to connected clients.
///
/// Connections are grouped into per-user "rooms": every live connection
/// owned by one user identity shares that user's room, and a publish to the
/// room reaches all of them. Rooms are ephemeral — membership lives only as
/// long as the connections do, and a room with no members silently drops
/// whatever is published to it. Durable history comes from the store, never
/// from here.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for global events (presence) — all connected
    /// clients receive these.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Rooms: user_id -> (conn_id -> sender). A user with several open
    /// sessions has several entries in the same room.
    rooms: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,

    /// Reverse index: conn_id -> room it joined.
    members: RwLock<HashMap<Uuid, Uuid>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                rooms: RwLock::new(HashMap::new()),
                members: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to global events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Adds a connection to the room for `user_id`. The room is created on
    /// first join; the user's first connection also announces them online.
    pub async fn join(
        &self,
        conn_id: Uuid,
        user_id: Uuid,
        tx: mpsc::UnboundedSender<GatewayEvent>,
    ) {
        self.inner.members.write().await.insert(conn_id, user_id);

        let came_online = {
            let mut rooms = self.inner.rooms.write().await;
            let room = rooms.entry(user_id).or_default();
            let was_empty = room.is_empty();
            room.insert(conn_id, tx);
            was_empty
        };

        if came_online {
            self.broadcast(GatewayEvent::Presence {
                user_id,
                online: true,
            });
        }
    }

    /// Delivers `event` to every connection currently joined to the room.
    /// Connections that join later do not receive it — there is no replay.
    pub async fn publish(&self, room_id: Uuid, event: GatewayEvent) {
        let rooms = self.inner.rooms.read().await;
        if let Some(room) = rooms.get(&room_id) {
            for tx in room.values() {
                // A send failure just means the connection is tearing down;
                // its disconnect will clean the entry up.
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Removes a connection from whatever room it joined. Dropping a user's
    /// last connection announces them offline.
    pub async fn disconnect(&self, conn_id: Uuid) {
        let Some(user_id) = self.inner.members.write().await.remove(&conn_id) else {
            return;
        };

        let went_offline = {
            let mut rooms = self.inner.rooms.write().await;
            match rooms.get_mut(&user_id) {
                Some(room) => {
                    room.remove(&conn_id);
                    if room.is_empty() {
                        rooms.remove(&user_id);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if went_offline {
            self.broadcast(GatewayEvent::Presence {
                user_id,
                online: false,
            });
        }
    }

    /// Presence is room membership: a user is online while their room has
    /// at least one connection.
    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.rooms.read().await.contains_key(&user_id)
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.rooms.read().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(sender: Uuid, receiver: Uuid, body: &str) -> GatewayEvent {
        GatewayEvent::NewMessage {
            id: Uuid::new_v4(),
            sender_id: sender,
            receiver_id: receiver,
            message: body.into(),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_session_in_the_room() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        dispatcher.join(Uuid::new_v4(), user, tx1).await;
        dispatcher.join(Uuid::new_v4(), user, tx2).await;

        dispatcher
            .publish(user, new_message(Uuid::new_v4(), user, "hi"))
            .await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn publish_does_not_cross_rooms() {
        let dispatcher = Dispatcher::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        dispatcher.join(Uuid::new_v4(), alice, tx_a).await;
        dispatcher.join(Uuid::new_v4(), bob, tx_b).await;

        dispatcher
            .publish(alice, new_message(bob, alice, "for alice only"))
            .await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_to_empty_room_is_a_no_op() {
        let dispatcher = Dispatcher::new();

        // Nobody joined — nothing to assert beyond "does not panic"
        dispatcher
            .publish(Uuid::new_v4(), new_message(Uuid::new_v4(), Uuid::new_v4(), "x"))
            .await;
    }

    #[tokio::test]
    async fn presence_follows_room_membership() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (conn1, conn2) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(!dispatcher.is_online(user).await);

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        dispatcher.join(conn1, user, tx1).await;
        dispatcher.join(conn2, user, tx2).await;
        assert!(dispatcher.is_online(user).await);

        // Closing one tab keeps the user online
        dispatcher.disconnect(conn1).await;
        assert!(dispatcher.is_online(user).await);

        dispatcher.disconnect(conn2).await;
        assert!(!dispatcher.is_online(user).await);
        assert!(dispatcher.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn presence_is_broadcast_on_edges_only() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let mut events = dispatcher.subscribe();

        let (conn1, conn2) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        // Second join of the same user is not a presence edge
        dispatcher.join(conn1, user, tx1).await;
        dispatcher.join(conn2, user, tx2).await;
        dispatcher.disconnect(conn1).await;
        dispatcher.disconnect(conn2).await;

        let online = events.try_recv().unwrap();
        assert!(matches!(
            online,
            GatewayEvent::Presence { user_id, online: true } if user_id == user
        ));
        let offline = events.try_recv().unwrap();
        assert!(matches!(
            offline,
            GatewayEvent::Presence { user_id, online: false } if user_id == user
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_of_unknown_connection_is_harmless() {
        let dispatcher = Dispatcher::new();
        dispatcher.disconnect(Uuid::new_v4()).await;
    }
}
