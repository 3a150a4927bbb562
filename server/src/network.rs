//! Server network layer: TCP connection tasks and the fixed-rate match loop

use crate::client_manager::ClientManager;
use crate::game::{GameState, MatchLayout};
use log::{debug, error, info, warn};
use shared::{
    read_packet, write_packet, Action, Packet, BOARD_HEIGHT, BOARD_WIDTH, DEFAULT_TICK_PERIOD_MS,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

const TICK_LOG_INTERVAL: u64 = 20;

/// Runtime settings for a [`Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_duration: Duration,
    pub max_clients: usize,
    pub height: usize,
    pub width: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(DEFAULT_TICK_PERIOD_MS),
            max_clients: 8,
            height: BOARD_HEIGHT,
            width: BOARD_WIDTH,
        }
    }
}

/// Messages sent from connection tasks to the match loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { client_id: u32, packet: Packet },
    ConnectionLost { client_id: u32 },
    Shutdown,
}

/// Owns the authoritative match and drives it at a fixed tick rate
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    tick_duration: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Binds the listener and lays out the match board. Fails when the
    /// address cannot be bound or the board size is rejected.
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let game_state = GameState::new(MatchLayout::standard(config.height, config.width)?)?;
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            game_state,
            tick_duration: config.tick_duration,
            server_tx,
            server_rx,
        })
    }

    /// Address the listener is bound to, useful after binding port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sender for injecting messages, e.g. [`ServerMessage::Shutdown`].
    pub fn handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    fn tick_period_ms(&self) -> u64 {
        self.tick_duration.as_millis() as u64
    }

    /// Spawns task that accepts connections and starts their reader and writer
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                }

                let (packet_tx, packet_rx) = mpsc::unbounded_channel();
                let client_id = clients.write().await.add_client(addr, packet_tx);
                match client_id {
                    Some(client_id) => {
                        let (reader, writer) = stream.into_split();
                        spawn_writer(client_id, writer, packet_rx);
                        spawn_reader(client_id, reader, server_tx.clone());
                    }
                    None => {
                        info!("Rejecting {}: server full", addr);
                        tokio::spawn(reject(stream, "Server full"));
                    }
                }
            }
        });
    }

    /// Full board for a joining or resyncing client
    fn snapshot(&self) -> Arc<Packet> {
        Arc::new(self.game_state.snapshot_packet(self.tick_period_ms()))
    }

    /// Queues a packet for one client, logging when it is already gone
    async fn send_to(&self, client_id: u32, packet: Packet) {
        let delivered = self.clients.read().await.send_to(client_id, Arc::new(packet));
        if !delivered {
            debug!("Dropped packet for closed client {}", client_id);
        }
    }

    /// Removes the connection and its player. Queued packets are still flushed
    /// by the writer before the stream closes.
    async fn drop_client(&mut self, client_id: u32) {
        let removed = self.clients.write().await.remove_client(client_id);
        if removed {
            if let Err(e) = self.game_state.remove_player(client_id) {
                error!("Failed to remove player {}: {}", client_id, e);
            }
        }
    }

    /// Processes one packet from a connected client. Actions only fill the
    /// mailbox; they take effect on the next tick.
    async fn handle_packet(&mut self, client_id: u32, packet: Packet) {
        if self.clients.read().await.get(client_id).is_none() {
            debug!("Ignoring packet from removed client {}", client_id);
            return;
        }

        match packet {
            Packet::Connect { client_version } => {
                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Client {} uses protocol {}, expected {}",
                        client_id, client_version, PROTOCOL_VERSION
                    );
                    let reason = format!("Unsupported client version {}", client_version);
                    self.send_to(client_id, Packet::Disconnected { reason }).await;
                    self.drop_client(client_id).await;
                    return;
                }

                if self.clients.read().await.is_joined(client_id) {
                    debug!("Client {} reconnected, resending snapshot", client_id);
                    let snapshot = self.snapshot();
                    self.clients.read().await.send_to(client_id, snapshot);
                    return;
                }

                match self.game_state.add_player(client_id) {
                    Ok(Some(team)) => {
                        self.send_to(client_id, Packet::Connected { client_id, team })
                            .await;
                        let snapshot = self.snapshot();
                        let mut clients = self.clients.write().await;
                        clients.send_to(client_id, snapshot);
                        clients.mark_joined(client_id);
                    }
                    Ok(None) => {
                        let reason = "No free spawn point".to_string();
                        self.send_to(client_id, Packet::Disconnected { reason }).await;
                        self.drop_client(client_id).await;
                    }
                    Err(e) => {
                        error!("Failed to place player {}: {}", client_id, e);
                        self.drop_client(client_id).await;
                    }
                }
            }

            Packet::Action { code } => match Action::from_code(code) {
                Some(action) => {
                    self.clients.write().await.queue_action(client_id, action);
                }
                None => warn!("Client {} sent unknown action code {}", client_id, code),
            },

            Packet::ResyncRequest => {
                if self.clients.read().await.is_joined(client_id) {
                    info!("Client {} requested a resync", client_id);
                    let snapshot = self.snapshot();
                    self.clients.read().await.send_to(client_id, snapshot);
                }
            }

            Packet::Disconnect => {
                self.drop_client(client_id).await;
            }

            other => {
                warn!("Unexpected packet from client {}: {:?}", client_id, other);
            }
        }
    }

    /// Runs one simulation step and fans the resulting delta out to every
    /// joined client, even when nothing changed.
    async fn run_tick(&mut self) {
        let actions = self.clients.write().await.drain_actions();
        let output = self.game_state.tick(actions);
        let tick_id = output.tick_id;
        let writes = output.deltas.len();

        let packet = Arc::new(output.into_packet());
        let closed = self.clients.read().await.broadcast(&packet);
        for client_id in closed {
            self.drop_client(client_id).await;
        }

        if tick_id % TICK_LOG_INTERVAL == 0 {
            let client_count = self.clients.read().await.len();
            debug!(
                "Tick {}: {} clients, {} cell writes, points {:?}",
                tick_id,
                client_count,
                writes,
                self.game_state.points()
            );
        }
    }

    /// Main server loop; ticks never overlap because the tick body completes
    /// before the next message or tick is polled.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server started, ticking every {}ms",
            self.tick_duration.as_millis()
        );

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { client_id, packet }) => {
                            self.handle_packet(client_id, packet).await;
                        },
                        Some(ServerMessage::ConnectionLost { client_id }) => {
                            info!("Connection to client {} lost", client_id);
                            self.drop_client(client_id).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.run_tick().await;
                },
            }
        }

        Ok(())
    }
}

/// Reads frames until the stream ends or sends garbage.
fn spawn_reader(
    client_id: u32,
    mut reader: OwnedReadHalf,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    tokio::spawn(async move {
        loop {
            match read_packet(&mut reader).await {
                Ok(Some(packet)) => {
                    if server_tx
                        .send(ServerMessage::PacketReceived { client_id, packet })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Closing client {}: {}", client_id, e);
                    break;
                }
            }
        }
        let _ = server_tx.send(ServerMessage::ConnectionLost { client_id });
    });
}

/// Writes queued packets until the registry drops the sender.
fn spawn_writer(
    client_id: u32,
    mut writer: OwnedWriteHalf,
    mut packet_rx: mpsc::UnboundedReceiver<Arc<Packet>>,
) {
    tokio::spawn(async move {
        while let Some(packet) = packet_rx.recv().await {
            if let Err(e) = write_packet(&mut writer, &packet).await {
                debug!("Write to client {} failed: {}", client_id, e);
                break;
            }
        }
    });
}

/// Tells a connection why it was turned away, then closes it.
async fn reject(mut stream: TcpStream, reason: &str) {
    let packet = Packet::Disconnected {
        reason: reason.to_string(),
    };
    if let Err(e) = write_packet(&mut stream, &packet).await {
        debug!("Failed to send rejection: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn start(config: ServerConfig) -> (SocketAddr, mpsc::UnboundedSender<ServerMessage>) {
        let mut server = Server::new("127.0.0.1:0", config).await.unwrap();
        let addr = server.local_addr();
        let handle = server.handle();
        tokio::spawn(async move { server.run().await.unwrap() });
        (addr, handle)
    }

    async fn next(stream: &mut TcpStream) -> Packet {
        read_packet(stream).await.unwrap().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_duration, Duration::from_millis(50));
        assert_eq!((config.height, config.width), (21, 51));
    }

    #[tokio::test]
    async fn test_board_too_large_for_snapshot_is_refused() {
        let config = ServerConfig {
            height: 300,
            width: 300,
            ..ServerConfig::default()
        };
        let result = Server::new("127.0.0.1:0", config).await;

        let error = result.err().expect("oversized board must be refused");
        assert!(error.to_string().contains("300x300"));
    }

    #[tokio::test]
    async fn test_join_receives_connected_then_snapshot() {
        let (addr, handle) = start(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        write_packet(&mut stream, &Packet::Connect { client_version: PROTOCOL_VERSION })
            .await
            .unwrap();

        assert!(matches!(next(&mut stream).await, Packet::Connected { client_id: 1, .. }));
        let snapshot_tick = match next(&mut stream).await {
            Packet::Snapshot {
                tick_id,
                tick_period_ms,
                board,
                ..
            } => {
                assert_eq!(tick_period_ms, 50);
                assert_eq!((board.height(), board.width()), (21, 51));
                tick_id
            }
            other => panic!("Expected snapshot, got {:?}", other),
        };
        match next(&mut stream).await {
            Packet::Delta { tick_id, .. } => assert!(tick_id > snapshot_tick),
            other => panic!("Expected delta, got {:?}", other),
        }

        handle.send(ServerMessage::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn test_wrong_version_is_disconnected() {
        let (addr, handle) = start(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        write_packet(&mut stream, &Packet::Connect { client_version: 99 })
            .await
            .unwrap();

        assert!(matches!(next(&mut stream).await, Packet::Disconnected { .. }));
        assert_eq!(read_packet(&mut stream).await.unwrap(), None);

        handle.send(ServerMessage::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn test_full_server_rejects() {
        let config = ServerConfig {
            max_clients: 1,
            ..ServerConfig::default()
        };
        let (addr, handle) = start(config).await;
        let _first = TcpStream::connect(addr).await.unwrap();
        let mut second = TcpStream::connect(addr).await.unwrap();

        match next(&mut second).await {
            Packet::Disconnected { reason } => assert_eq!(reason, "Server full"),
            other => panic!("Expected rejection, got {:?}", other),
        }

        handle.send(ServerMessage::Shutdown).unwrap();
    }
}
