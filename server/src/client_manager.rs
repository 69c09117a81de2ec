//! Client connection registry for the game server
//!
//! This module owns the server-side record of every connected client:
//! - Slot-based identity assignment (`client_id` is the slot index)
//! - Nickname and transport endpoints (TCP peer, latched UDP return address)
//! - The weak reference from a client to the room it currently occupies
//! - The per-client outbound frame queue used by the session writer task
//!
//! The registry is the single source of truth for client identity. Per-round
//! flags (ready, painter, guess) deliberately do not live here; they belong
//! to the room that seats the client and reset on round boundaries.

use log::info;
use shared::MAX_CLIENTS;
use std::net::SocketAddr;
use tokio::sync::mpsc::UnboundedSender;

/// Queue handle for frames destined to one client's TCP stream.
///
/// Enqueueing never blocks; the session's writer task drains the queue and
/// performs the actual socket writes, so no registry lock is ever held
/// across network I/O.
pub type FrameSender = UnboundedSender<Vec<u8>>;

/// Represents one connected client.
#[derive(Debug)]
pub struct ClientEntry {
    /// Slot index in the registry, used as the wire `client_id`.
    pub id: u8,
    /// TCP peer address the client connected from.
    pub addr: SocketAddr,
    /// Nickname, set by the first room create/join request.
    pub nickname: String,
    /// Datagram return address, latched from the most recent datagram.
    pub udp_addr: Option<SocketAddr>,
    /// Room currently occupied, if any. Resolving it requires the room
    /// registry lock.
    pub room_id: Option<u8>,
    /// Outbound frame queue feeding the session writer task.
    pub sender: FrameSender,
}

impl ClientEntry {
    fn new(id: u8, addr: SocketAddr, sender: FrameSender) -> Self {
        Self {
            id,
            addr,
            nickname: String::new(),
            udp_addr: None,
            room_id: None,
            sender,
        }
    }
}

/// Manages the fixed table of client slots
///
/// Capacity is `MAX_CLIENTS`; ids are reused as slots free up, with the
/// lowest free slot always winning. An accept that finds no free slot is
/// refused by the dispatcher.
pub struct ClientManager {
    slots: [Option<ClientEntry>; MAX_CLIENTS],
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Claims the lowest free slot for a new connection.
    ///
    /// Returns the assigned client id, or `None` when the server is full.
    pub fn add_client(&mut self, addr: SocketAddr, sender: FrameSender) -> Option<u8> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                let id = i as u8;
                *slot = Some(ClientEntry::new(id, addr, sender));
                info!("Client {} connected from {}", id, addr);
                return Some(id);
            }
        }
        None
    }

    /// Frees a client slot, returning the entry that occupied it.
    ///
    /// Room membership cleanup is the engine's job; the caller is expected
    /// to unseat the returned entry's `room_id` afterwards.
    pub fn remove_client(&mut self, client_id: u8) -> Option<ClientEntry> {
        let entry = self
            .slots
            .get_mut(client_id as usize)
            .and_then(Option::take);
        if let Some(ref entry) = entry {
            info!("Client {} disconnected", entry.id);
        }
        entry
    }

    pub fn get(&self, client_id: u8) -> Option<&ClientEntry> {
        self.slots.get(client_id as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, client_id: u8) -> Option<&mut ClientEntry> {
        self.slots.get_mut(client_id as usize).and_then(Option::as_mut)
    }

    /// Clones the outbound queue handle for a client.
    pub fn sender(&self, client_id: u8) -> Option<FrameSender> {
        self.get(client_id).map(|entry| entry.sender.clone())
    }

    /// Number of connected clients.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
