use std::collections::HashMap;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::context::RoomId;

pub type ConnectionId = Uuid;

pub type Peer = mpsc::Sender<Message>;

/// Rooms are spread over the map's shards, so a join in one room never waits
/// on a broadcast in another. Empty rooms are removed as soon as their last
/// member leaves.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, HashMap<ConnectionId, Peer>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, room: &RoomId, id: ConnectionId, peer: Peer) -> bool {
        let mut members = self.rooms.entry(room.clone()).or_default();
        if members.contains_key(&id) {
            return false;
        }
        members.insert(id, peer);
        true
    }

    pub fn leave(&self, room: &RoomId, id: ConnectionId) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(mut members) => members.remove(&id).is_some(),
            None => false,
        };

        // re-checked under the shard lock, a join may have slipped in
        if self.rooms.remove_if(room, |_, members| members.is_empty()).is_some() {
            debug!(%room, "room pruned");
        }

        removed
    }

    /// Queues `payload` for every member of `room` except `sender`.
    ///
    /// Works on a snapshot of the member set taken under the shard lock and
    /// never waits on a peer: a peer whose queue is full loses this frame, a
    /// peer whose queue is gone is skipped. Neither is removed here.
    pub fn broadcast(&self, room: &RoomId, sender: ConnectionId, payload: &Message) -> Delivery {
        let peers: Vec<(ConnectionId, Peer)> = match self.rooms.get(room) {
            Some(members) => members
                .iter()
                .filter(|(id, _)| **id != sender)
                .map(|(id, peer)| (*id, peer.clone()))
                .collect(),
            None => return Delivery::default(),
        };

        let mut delivery = Delivery::default();
        for (id, peer) in peers {
            match peer.try_send(payload.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(%room, connection = %id, "peer is not keeping up, frame dropped");
                    delivery.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%room, connection = %id, "peer already closing");
                    delivery.dropped += 1;
                }
            }
        }
        delivery
    }

    pub fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, room: &RoomId, id: ConnectionId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains_key(&id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(capacity: usize) -> (Peer, mpsc::Receiver<Message>) {
        mpsc::channel(capacity)
    }

    #[test]
    fn join_is_idempotent() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("abc123");
        let id = Uuid::now_v7();
        let (tx, _rx) = peer(4);

        assert!(registry.join(&room, id, tx.clone()));
        assert!(!registry.join(&room, id, tx));
        assert_eq!(registry.members(&room), vec![id]);
    }

    #[test]
    fn last_leave_prunes_the_room() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("abc123");
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let (tx, _rx) = peer(4);

        registry.join(&room, a, tx.clone());
        registry.join(&room, b, tx);
        assert_eq!(registry.room_count(), 1);

        assert!(registry.leave(&room, a));
        assert_eq!(registry.room_count(), 1);
        assert!(registry.leave(&room, b));
        assert_eq!(registry.room_count(), 0);

        assert!(!registry.leave(&room, b));
        assert!(!registry.leave(&RoomId::from("nowhere"), a));
    }

    #[test]
    fn broadcast_skips_sender_and_other_rooms() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("abc123");
        let other = RoomId::from("xyz");
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let (tx_a, mut rx_a) = peer(4);
        let (tx_b, mut rx_b) = peer(4);
        let (tx_c, mut rx_c) = peer(4);
        registry.join(&room, a, tx_a);
        registry.join(&room, b, tx_b);
        registry.join(&other, c, tx_c);

        let delivery = registry.broadcast(&room, a, &Message::from("hi"));

        assert_eq!(delivery, Delivery { delivered: 1, dropped: 0 });
        assert_eq!(rx_b.try_recv().unwrap(), Message::from("hi"));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn full_peer_loses_frames_without_blocking_others() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("abc123");
        let (sender, slow, fast) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let (tx_sender, _rx_sender) = peer(1);
        let (tx_slow, mut rx_slow) = peer(1);
        let (tx_fast, mut rx_fast) = peer(8);
        registry.join(&room, sender, tx_sender);
        registry.join(&room, slow, tx_slow);
        registry.join(&room, fast, tx_fast);

        registry.broadcast(&room, sender, &Message::from("one"));
        let delivery = registry.broadcast(&room, sender, &Message::from("two"));

        assert_eq!(delivery, Delivery { delivered: 1, dropped: 1 });
        assert_eq!(rx_slow.try_recv().unwrap(), Message::from("one"));
        assert!(rx_slow.try_recv().is_err());
        assert_eq!(rx_fast.try_recv().unwrap(), Message::from("one"));
        assert_eq!(rx_fast.try_recv().unwrap(), Message::from("two"));
        assert!(registry.contains(&room, slow));
    }

    #[test]
    fn closed_peer_stays_until_it_leaves() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("abc123");
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let (tx_a, _rx_a) = peer(1);
        let (tx_b, rx_b) = peer(1);
        registry.join(&room, a, tx_a);
        registry.join(&room, b, tx_b);
        drop(rx_b);

        let delivery = registry.broadcast(&room, a, &Message::from("hi"));

        assert_eq!(delivery, Delivery { delivered: 0, dropped: 1 });
        assert!(registry.contains(&room, b));
    }

    #[test]
    fn broadcast_to_unknown_room_is_a_no_op() {
        let registry = RoomRegistry::new();
        let delivery = registry.broadcast(&RoomId::from("ghost"), Uuid::now_v7(), &Message::from("hi"));
        assert_eq!(delivery, Delivery::default());
        assert_eq!(registry.room_count(), 0);
    }
}
