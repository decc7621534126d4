//! # Outbound Packets
//!
//! The world never talks to sockets. Each player holds a
//! [`PlayerConnection`]; the network layer behind it is somebody else's
//! concern. Sends are fire-and-forget: a failing connection is logged and
//! the remaining players still get their packets.
//!
//! ## Queue
//!
//! Packets produced during a tick that must go out together (drop pickups,
//! chat) are pushed to the [`PacketQueue`] and flushed once per tick, in
//! push order.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use strata_shared::{Packet, PacketName, PlayerId};

use crate::error::ConnectionError;
use crate::player::ServerPlayer;

/// Connected players by id.
pub type Players = BTreeMap<PlayerId, ServerPlayer>;

/// Delivery endpoint of one player.
pub trait PlayerConnection: Send {
    /// Sends a batch of packets.
    ///
    /// # Errors
    ///
    /// Fails when the connection is closed.
    fn send(&mut self, packets: &[Packet]) -> Result<(), ConnectionError>;
}

/// Connection backed by a channel drained by the network layer.
pub struct ChannelConnection {
    player: PlayerId,
    tx: Sender<Vec<Packet>>,
}

impl ChannelConnection {
    /// Creates the connection and the receiving end for the network layer.
    #[must_use]
    pub fn new(player: PlayerId) -> (Self, Receiver<Vec<Packet>>) {
        let (tx, rx) = unbounded();
        (Self { player, tx }, rx)
    }
}

impl PlayerConnection for ChannelConnection {
    fn send(&mut self, packets: &[Packet]) -> Result<(), ConnectionError> {
        self.tx
            .send(packets.to_vec())
            .map_err(|_| ConnectionError { player: self.player })
    }
}

/// Shared record of every packet a [`RecordingConnection`] received.
#[derive(Clone, Default)]
pub struct PacketLog(Arc<Mutex<Vec<Packet>>>);

impl PacketLog {
    /// Removes and returns everything recorded so far.
    #[must_use]
    pub fn take(&self) -> Vec<Packet> {
        std::mem::take(&mut *self.0.lock())
    }

    /// Names of the recorded packets, in arrival order.
    #[must_use]
    pub fn names(&self) -> Vec<PacketName> {
        self.0.lock().iter().map(|p| p.name).collect()
    }

    /// Recorded packets with the given name.
    #[must_use]
    pub fn named(&self, name: PacketName) -> Vec<Packet> {
        self.0
            .lock()
            .iter()
            .filter(|p| p.name == name)
            .cloned()
            .collect()
    }

    /// Number of recorded packets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// In-process connection that records packets; used by embedders and
/// tests. A closed recording connection fails every send.
pub struct RecordingConnection {
    player: PlayerId,
    log: PacketLog,
    closed: bool,
}

impl RecordingConnection {
    /// Creates an open connection and its log.
    #[must_use]
    pub fn new(player: PlayerId) -> (Self, PacketLog) {
        let log = PacketLog::default();
        (
            Self {
                player,
                log: log.clone(),
                closed: false,
            },
            log,
        )
    }

    /// Creates a connection whose sends always fail.
    #[must_use]
    pub fn closed(player: PlayerId) -> Self {
        Self {
            player,
            log: PacketLog::default(),
            closed: true,
        }
    }
}

impl PlayerConnection for RecordingConnection {
    fn send(&mut self, packets: &[Packet]) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError { player: self.player });
        }
        self.log.0.lock().extend_from_slice(packets);
        Ok(())
    }
}

/// Sends to every connected player except `except`.
///
/// Returns the number of players that received the batch.
pub fn send_all(players: &mut Players, packets: &[Packet], except: &[PlayerId]) -> usize {
    if packets.is_empty() {
        return 0;
    }
    players
        .values_mut()
        .filter(|p| !except.contains(&p.id))
        .map(|p| usize::from(p.send(packets)))
        .sum()
}

/// Sends to the listed players except `except`; unknown ids are skipped.
///
/// Returns the number of players that received the batch.
pub fn send_selected(
    players: &mut Players,
    packets: &[Packet],
    targets: &[PlayerId],
    except: &[PlayerId],
) -> usize {
    if packets.is_empty() {
        return 0;
    }
    let mut delivered = 0;
    for id in targets {
        if except.contains(id) {
            continue;
        }
        if let Some(player) = players.get_mut(id) {
            delivered += usize::from(player.send(packets));
        }
    }
    delivered
}

/// Recipients of a queued batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Targets {
    /// Every connected player.
    All,
    /// The listed players.
    Selected(Vec<PlayerId>),
}

#[derive(Clone, Debug)]
struct Batch {
    targets: Targets,
    except: Vec<PlayerId>,
    packets: Vec<Packet>,
}

/// Packets waiting for the outbound flush.
#[derive(Default)]
pub struct PacketQueue {
    batches: Vec<Batch>,
}

impl PacketQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a batch.
    pub fn push(&mut self, targets: Targets, packets: Vec<Packet>, except: Vec<PlayerId>) {
        if packets.is_empty() {
            return;
        }
        self.batches.push(Batch {
            targets,
            except,
            packets,
        });
    }

    /// Queued batches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Sends every queued batch in push order and clears the queue.
    ///
    /// Returns the number of deliveries.
    pub fn flush(&mut self, players: &mut Players) -> usize {
        let mut delivered = 0;
        for batch in self.batches.drain(..) {
            delivered += match &batch.targets {
                Targets::All => send_all(players, &batch.packets, &batch.except),
                Targets::Selected(ids) => {
                    send_selected(players, &batch.packets, ids, &batch.except)
                }
            };
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_shared::Vec3;

    fn player(id: PlayerId) -> (ServerPlayer, PacketLog) {
        let (conn, log) = RecordingConnection::new(id);
        (
            ServerPlayer::new(id, format!("p{id}"), Vec3::ZERO, Box::new(conn)),
            log,
        )
    }

    fn chat(text: &str) -> Packet {
        Packet::new(PacketName::ChatMessage, json!({ "text": text }))
    }

    #[test]
    fn test_send_all_honours_except() {
        let mut players = Players::new();
        let (a, log_a) = player(1);
        let (b, log_b) = player(2);
        players.insert(1, a);
        players.insert(2, b);

        assert_eq!(send_all(&mut players, &[chat("hi")], &[1]), 1);
        assert!(log_a.is_empty());
        assert_eq!(log_b.len(), 1);
    }

    #[test]
    fn test_failing_connection_does_not_block_others() {
        let mut players = Players::new();
        players.insert(
            1,
            ServerPlayer::new(1, "gone".into(), Vec3::ZERO, Box::new(RecordingConnection::closed(1))),
        );
        let (b, log_b) = player(2);
        players.insert(2, b);

        assert_eq!(send_selected(&mut players, &[chat("x")], &[1, 2, 3], &[]), 1);
        assert_eq!(log_b.len(), 1);
    }

    #[test]
    fn test_queue_flushes_in_order_once() {
        let mut players = Players::new();
        let (a, log_a) = player(1);
        players.insert(1, a);

        let mut queue = PacketQueue::new();
        queue.push(Targets::All, vec![chat("first")], vec![]);
        queue.push(Targets::Selected(vec![1]), vec![chat("second")], vec![]);
        queue.push(Targets::All, vec![], vec![]);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.flush(&mut players), 2);
        assert!(queue.is_empty());
        let texts: Vec<_> = log_a.take().iter().map(|p| p.data["text"].clone()).collect();
        assert_eq!(texts, vec![json!("first"), json!("second")]);
        assert_eq!(queue.flush(&mut players), 0);
    }

    #[test]
    fn test_channel_connection() {
        let (mut conn, rx) = ChannelConnection::new(5);
        conn.send(&[chat("a"), chat("b")]).unwrap();
        assert_eq!(rx.try_recv().unwrap().len(), 2);
        drop(rx);
        assert_eq!(conn.send(&[chat("c")]), Err(ConnectionError { player: 5 }));
    }
}
