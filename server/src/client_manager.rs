//! Connection registry and per-connection action mailboxes.
//!
//! Every accepted stream gets an id and an outgoing channel drained by its
//! writer task. Actions are stamped with a global arrival sequence when they
//! are queued, so draining all mailboxes yields them in the order the server
//! received them regardless of which connection they came from.

use log::{debug, info};
use shared::{Action, Packet};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outgoing packets are shared so one delta can be fanned out without copies.
pub type PacketSender = mpsc::UnboundedSender<Arc<Packet>>;

#[derive(Debug)]
/// A connected socket and its pending actions
pub struct Client {
    pub id: u32,
    pub addr: SocketAddr,
    sender: PacketSender,
    /// Set once the client has sent `Connect` and received its snapshot.
    pub joined: bool,
    pending_actions: Vec<(u64, Action)>,
}

impl Client {
    /// Creates a connection entry that has not joined the match yet
    pub fn new(id: u32, addr: SocketAddr, sender: PacketSender) -> Self {
        Self {
            id,
            addr,
            sender,
            joined: false,
            pending_actions: Vec::new(),
        }
    }

    /// Queues a packet for the writer task. Returns false once the writer is gone.
    pub fn send(&self, packet: Arc<Packet>) -> bool {
        self.sender.send(packet).is_ok()
    }
}

/// Registry of live connections, capped at `max_clients`
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    next_arrival: u64,
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty registry accepting at most `max_clients` connections
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            next_arrival: 0,
            max_clients,
        }
    }

    /// Registers a connection under the next free id, starting at 1. Returns
    /// `None` when the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, sender: PacketSender) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));
        Some(client_id)
    }

    /// Drops a connection and its unprocessed actions. Returns false for an
    /// unknown id.
    pub fn remove_client(&mut self, client_id: u32) -> bool {
        match self.clients.remove(&client_id) {
            Some(client) => {
                info!("Client {} disconnected ({})", client.id, client.addr);
                true
            }
            None => false,
        }
    }

    /// Gets a connection by id
    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Marks a connection as joined so it receives actions and deltas
    pub fn mark_joined(&mut self, client_id: u32) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.joined = true;
                true
            }
            None => false,
        }
    }

    /// Whether the connection has completed its `Connect` handshake
    pub fn is_joined(&self, client_id: u32) -> bool {
        self.clients.get(&client_id).map_or(false, |c| c.joined)
    }

    /// Queues an action in the client's mailbox. Actions from connections that
    /// have not joined are discarded.
    pub fn queue_action(&mut self, client_id: u32, action: Action) -> bool {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return false;
        };
        if !client.joined {
            debug!("Client {} sent {:?} before joining", client_id, action);
            return false;
        }
        client.pending_actions.push((self.next_arrival, action));
        self.next_arrival += 1;
        true
    }

    /// Empties every mailbox, returning actions in arrival order.
    pub fn drain_actions(&mut self) -> Vec<(u32, Action)> {
        let mut all: Vec<(u64, u32, Action)> = Vec::new();
        for client in self.clients.values_mut() {
            let id = client.id;
            all.extend(
                client
                    .pending_actions
                    .drain(..)
                    .map(|(seq, action)| (seq, id, action)),
            );
        }
        all.sort_by_key(|(seq, _, _)| *seq);
        all.into_iter().map(|(_, id, action)| (id, action)).collect()
    }

    /// Queues a packet for one connection. Returns false when the id is
    /// unknown or its writer is gone.
    pub fn send_to(&self, client_id: u32, packet: Arc<Packet>) -> bool {
        self.clients
            .get(&client_id)
            .map_or(false, |client| client.send(packet))
    }

    /// Sends one shared packet to every joined client. Returns the ids whose
    /// writer has already gone away.
    pub fn broadcast(&self, packet: &Arc<Packet>) -> Vec<u32> {
        self.clients
            .values()
            .filter(|client| client.joined)
            .filter(|client| !client.send(Arc::clone(packet)))
            .map(|client| client.id)
            .collect()
    }

    /// Number of registered connections, joined or not
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
