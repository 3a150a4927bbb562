use crate::game::{DashCooldown, Reconciler};
use crate::input::{self, Command};
use crate::rendering::{FrameView, Renderer};
use log::{debug, error, info, warn};
use shared::{
    read_packet, ticks_to_duration, write_packet, Action, Packet, Team, DASH_COOLDOWN_TICKS,
    PROTOCOL_VERSION,
};
use std::time::{Duration, Instant};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Everything the event loop reacts to, fed by independent tasks.
#[derive(Debug)]
pub enum ClientEvent {
    Packet(Packet),
    Key(char),
    CooldownTick,
    ConnectionLost(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
    Ended(String),
}

pub struct Client {
    client_id: Option<u32>,
    team: Option<Team>,
    reconciler: Reconciler,
    cooldown: DashCooldown,
    renderer: Renderer,
    resync_pending: bool,

    ticker: Option<(Duration, JoinHandle<()>)>,
    outgoing: Option<mpsc::UnboundedSender<Packet>>,
    writer: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events_rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Client {
    pub async fn connect(
        server_addr: &str,
        render: bool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", server_addr);

        let (reader, writer) = stream.into_split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let mut client = Self::with_outgoing(outgoing_tx, Renderer::new(render));

        spawn_reader(reader, client.events_tx.clone());
        client.writer = Some(spawn_writer(writer, outgoing_rx, client.events_tx.clone()));
        Ok(client)
    }

    fn with_outgoing(outgoing: mpsc::UnboundedSender<Packet>, renderer: Renderer) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reconciler = Reconciler::new();
        let cooldown = DashCooldown::for_tick_period(reconciler.tick_period());
        Self {
            client_id: None,
            team: None,
            reconciler,
            cooldown,
            renderer,
            resync_pending: false,
            ticker: None,
            outgoing: Some(outgoing),
            writer: None,
            events_tx,
            events_rx,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    pub fn team(&self) -> Option<Team> {
        self.team
    }

    /// Period of the local cooldown tick: the negotiated tick period, or the
    /// default one until a snapshot arrives.
    pub fn cooldown_period(&self) -> Duration {
        self.reconciler.tick_period()
    }

    /// Keeps a running ticker in step with the tick period. Does nothing
    /// before [`Client::run`] has started one.
    fn retune_ticker(&mut self) {
        let period = self.cooldown_period();
        match &self.ticker {
            Some((current, _)) if *current != period => {}
            _ => return,
        }
        if let Some((_, old)) = self.ticker.take() {
            old.abort();
        }
        debug!("Cooldown tick now every {:?}", period);
        self.ticker = Some((period, spawn_cooldown_ticker(self.events_tx.clone(), period)));
    }

    /// Fire-and-forget; a dead writer shows up as a `ConnectionLost` event.
    fn send(&self, packet: Packet) {
        if let Some(outgoing) = &self.outgoing {
            if outgoing.send(packet).is_err() {
                debug!("Writer closed, packet dropped");
            }
        }
    }

    /// Asks for a fresh snapshot once; further violations are ignored until
    /// it arrives.
    fn request_resync(&mut self) {
        if self.resync_pending {
            return;
        }
        self.resync_pending = true;
        self.send(Packet::ResyncRequest);
    }

    pub fn handle_event(&mut self, event: ClientEvent) -> Flow {
        match event {
            ClientEvent::Packet(packet) => self.handle_packet(packet),
            ClientEvent::Key(key) => self.handle_key(key, Instant::now()),
            ClientEvent::CooldownTick => {
                let before = self.cooldown.percent();
                if self.cooldown.update(Instant::now()) != before {
                    self.render();
                }
                Flow::Continue
            }
            ClientEvent::ConnectionLost(reason) => {
                error!("Connection lost: {}", reason);
                Flow::Ended(reason)
            }
        }
    }

    fn handle_packet(&mut self, packet: Packet) -> Flow {
        match packet {
            Packet::Connected { client_id, team } => {
                info!("Joined as client {} on team {:?}", client_id, team);
                self.client_id = Some(client_id);
                self.team = Some(team);
            }

            Packet::Snapshot {
                tick_id,
                tick_period_ms,
                board,
                points,
                health,
            } => {
                info!(
                    "Snapshot at tick {} ({}x{}, {}ms ticks)",
                    tick_id,
                    board.height(),
                    board.width(),
                    tick_period_ms
                );
                self.reconciler
                    .apply_snapshot(tick_id, tick_period_ms, board, points, health);
                self.cooldown
                    .set_duration(ticks_to_duration(DASH_COOLDOWN_TICKS, tick_period_ms));
                self.resync_pending = false;
                self.retune_ticker();
                self.render();
            }

            Packet::Delta {
                tick_id,
                points,
                health,
                deltas,
            } => {
                if self.resync_pending && !self.reconciler.has_snapshot() {
                    debug!("Skipping delta {} while waiting for snapshot", tick_id);
                    return Flow::Continue;
                }
                match self.reconciler.apply_delta(tick_id, points, health, &deltas) {
                    Ok(()) => {
                        if !self.renderer.is_enabled() && !deltas.is_empty() {
                            debug!("Tick {}: {} cell writes", tick_id, deltas.len());
                        }
                        self.render();
                    }
                    Err(e) => {
                        warn!("Protocol violation at tick {}: {}", tick_id, e);
                        self.reconciler.invalidate();
                        self.request_resync();
                    }
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected by server: {}", reason);
                return Flow::Ended(reason);
            }

            other => {
                warn!("Unexpected packet from server: {:?}", other);
            }
        }
        Flow::Continue
    }

    fn handle_key(&mut self, key: char, now: Instant) -> Flow {
        match input::map_key(key) {
            Some(Command::Quit) => {
                info!("Quitting");
                self.send(Packet::Disconnect);
                Flow::Quit
            }
            Some(Command::Act(action)) => {
                if self.client_id.is_none() {
                    return Flow::Continue;
                }
                if action == Action::Dash && !self.cooldown.try_start(now) {
                    debug!("Dash still cooling down");
                    return Flow::Continue;
                }
                self.send(Packet::Action {
                    code: action.code(),
                });
                Flow::Continue
            }
            None => Flow::Continue,
        }
    }

    fn render(&mut self) {
        let Some(replica) = self.reconciler.replica() else {
            return;
        };
        let view = FrameView {
            replica,
            points: self.reconciler.points(),
            health: self.reconciler.health(),
            clock: self.reconciler.format_clock(),
            cooldown_percent: self.cooldown.percent(),
        };
        if let Err(e) = self.renderer.draw(&view) {
            error!("Error drawing frame: {}", e);
        }
    }

    /// Closes the outgoing channel and waits for queued packets to flush.
    async fn shutdown(&mut self) {
        self.outgoing.take();
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                debug!("Writer task ended abnormally: {}", e);
            }
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.send(Packet::Connect {
            client_version: PROTOCOL_VERSION,
        });

        let keys = input::spawn_key_reader(self.events_tx.clone());
        let period = self.cooldown_period();
        self.ticker = Some((period, spawn_cooldown_ticker(self.events_tx.clone(), period)));

        let outcome = loop {
            let Some(event) = self.events_rx.recv().await else {
                break Flow::Quit;
            };
            match self.handle_event(event) {
                Flow::Continue => {}
                done => break done,
            }
        };

        if let Some((_, ticker)) = self.ticker.take() {
            ticker.abort();
        }
        // The key reader stops at its next poll once the channel is closed.
        self.events_rx.close();
        self.shutdown().await;
        if let Err(e) = keys.await {
            debug!("Key reader ended abnormally: {}", e);
        }
        match outcome {
            Flow::Ended(reason) => Err(reason.into()),
            _ => Ok(()),
        }
    }
}

fn spawn_reader(mut reader: OwnedReadHalf, events: mpsc::UnboundedSender<ClientEvent>) {
    tokio::spawn(async move {
        let reason = loop {
            match read_packet(&mut reader).await {
                Ok(Some(packet)) => {
                    if events.send(ClientEvent::Packet(packet)).is_err() {
                        return;
                    }
                }
                Ok(None) => break "server closed the connection".to_string(),
                Err(e) => break e.to_string(),
            }
        };
        let _ = events.send(ClientEvent::ConnectionLost(reason));
    });
}

fn spawn_writer(
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Packet>,
    events: mpsc::UnboundedSender<ClientEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(packet) = outgoing.recv().await {
            if let Err(e) = write_packet(&mut writer, &packet).await {
                let _ = events.send(ClientEvent::ConnectionLost(e.to_string()));
                return;
            }
        }
    })
}

fn spawn_cooldown_ticker(
    events: mpsc::UnboundedSender<ClientEvent>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            if events.send(ClientEvent::CooldownTick).is_err() {
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Cell, CellDelta, Grid};

    fn offline_client() -> (Client, mpsc::UnboundedReceiver<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Client::with_outgoing(tx, Renderer::new(false)), rx)
    }

    fn snapshot(tick_id: u64) -> ClientEvent {
        ClientEvent::Packet(Packet::Snapshot {
            tick_id,
            tick_period_ms: 50,
            board: Grid::filled(21, 51, Cell::Empty),
            points: [0, 0],
            health: [100, 100],
        })
    }

    fn delta(tick_id: u64, deltas: Vec<CellDelta>) -> ClientEvent {
        ClientEvent::Packet(Packet::Delta {
            tick_id,
            points: [0, 0],
            health: [100, 100],
            deltas,
        })
    }

    fn joined_client() -> (Client, mpsc::UnboundedReceiver<Packet>) {
        let (mut client, rx) = offline_client();
        client.handle_event(ClientEvent::Packet(Packet::Connected {
            client_id: 3,
            team: Team::Red,
        }));
        client.handle_event(snapshot(0));
        (client, rx)
    }

    #[test]
    fn test_keys_send_action_codes() {
        let (mut client, mut rx) = joined_client();

        assert_eq!(client.handle_event(ClientEvent::Key('a')), Flow::Continue);
        assert_eq!(client.handle_event(ClientEvent::Key('j')), Flow::Continue);

        assert_eq!(rx.try_recv().unwrap(), Packet::Action { code: 3 });
        assert_eq!(rx.try_recv().unwrap(), Packet::Action { code: 6 });
    }

    #[test]
    fn test_dash_gated_by_local_cooldown() {
        let (mut client, mut rx) = joined_client();

        client.handle_event(ClientEvent::Key(' '));
        client.handle_event(ClientEvent::Key(' '));

        assert_eq!(rx.try_recv().unwrap(), Packet::Action { code: 5 });
        assert!(rx.try_recv().is_err());
        assert!(!client.cooldown.is_ready());
    }

    #[test]
    fn test_actions_ignored_before_join() {
        let (mut client, mut rx) = offline_client();
        client.handle_event(ClientEvent::Key('w'));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_quit_sends_disconnect() {
        let (mut client, mut rx) = joined_client();
        assert_eq!(client.handle_event(ClientEvent::Key('q')), Flow::Quit);
        assert_eq!(rx.try_recv().unwrap(), Packet::Disconnect);
    }

    #[test]
    fn test_violation_requests_single_resync() {
        let (mut client, mut rx) = joined_client();
        client.handle_event(delta(2, vec![]));

        client.handle_event(delta(1, vec![]));
        assert_eq!(rx.try_recv().unwrap(), Packet::ResyncRequest);
        assert!(!client.reconciler().has_snapshot());

        client.handle_event(delta(3, vec![]));
        client.handle_event(delta(4, vec![CellDelta::new(99, 0, Cell::Wall)]));
        assert!(rx.try_recv().is_err());

        client.handle_event(snapshot(4));
        client.handle_event(delta(5, vec![CellDelta::new(1, 1, Cell::Wall)]));
        assert_eq!(
            client.reconciler().replica().unwrap().get(1, 1),
            Ok(Cell::Wall)
        );

        client.handle_event(delta(6, vec![CellDelta::new(51, 1, Cell::Wall)]));
        assert_eq!(rx.try_recv().unwrap(), Packet::ResyncRequest);
    }

    #[test]
    fn test_cooldown_period_follows_tick_period() {
        let (mut client, _rx) = offline_client();
        assert_eq!(
            client.cooldown_period(),
            Duration::from_millis(shared::DEFAULT_TICK_PERIOD_MS)
        );

        client.handle_event(ClientEvent::Packet(Packet::Snapshot {
            tick_id: 0,
            tick_period_ms: 40,
            board: Grid::filled(21, 51, Cell::Empty),
            points: [0, 0],
            health: [100, 100],
        }));
        assert_eq!(client.cooldown_period(), Duration::from_millis(40));
        assert!(client.ticker.is_none());
    }

    #[tokio::test]
    async fn test_cooldown_ticker_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ticker = spawn_cooldown_ticker(tx, Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(130)).await;
        ticker.abort();

        let mut ticks = 0;
        while let Ok(ClientEvent::CooldownTick) = rx.try_recv() {
            ticks += 1;
        }
        // Immediate first tick, then one per 50ms
        assert!((2..=4).contains(&ticks), "got {} ticks", ticks);
    }

    #[tokio::test]
    async fn test_snapshot_retunes_running_ticker() {
        let (mut client, _rx) = offline_client();
        let period = client.cooldown_period();
        client.ticker = Some((
            period,
            spawn_cooldown_ticker(client.events_tx.clone(), period),
        ));

        client.handle_event(ClientEvent::Packet(Packet::Snapshot {
            tick_id: 0,
            tick_period_ms: 25,
            board: Grid::filled(21, 51, Cell::Empty),
            points: [0, 0],
            health: [100, 100],
        }));

        let (current, handle) = client.ticker.take().unwrap();
        assert_eq!(current, Duration::from_millis(25));
        handle.abort();
    }

    #[test]
    fn test_connection_lost_ends_session() {
        let (mut client, _rx) = joined_client();
        assert_eq!(
            client.handle_event(ClientEvent::ConnectionLost("reset".to_string())),
            Flow::Ended("reset".to_string())
        );
    }

    #[test]
    fn test_server_disconnect_ends_session() {
        let (mut client, _rx) = offline_client();
        let flow = client.handle_event(ClientEvent::Packet(Packet::Disconnected {
            reason: "Server full".to_string(),
        }));
        assert_eq!(flow, Flow::Ended("Server full".to_string()));
    }
}
