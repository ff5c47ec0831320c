//! Server network layer: accept loop, per-client readers, main game loop
//!
//! Per-client reader tasks feed a single event channel; the main loop
//! owns all game state, fires due timers on a 100 ms tick, and writes
//! each player's queued lines back out. Game semantics therefore stay
//! strictly single-threaded.

use crate::game::{ClientId, GameState};
use crate::timers::{TimerEvent, TimerQueue};
use approx_shared::{LineBuffer, Message, HELLO_WAIT_SECS, RESET_DELAY_MS};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};

/// Messages sent from network tasks to the main game loop
#[derive(Debug)]
enum ServerEvent {
    Connected {
        client: ClientId,
        addr: SocketAddr,
        writer: OwnedWriteHalf,
        reader_task: JoinHandle<()>,
    },
    Line {
        client: ClientId,
        line: Vec<u8>,
    },
    Disconnected {
        client: ClientId,
    },
}

struct Connection {
    writer: OwnedWriteHalf,
    reader_task: JoinHandle<()>,
}

/// Main server coordinating networking and the game engine
pub struct Server {
    game: GameState,
    timers: TimerQueue,
    connections: HashMap<ClientId, Connection>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the listening socket and wires up the accept loop.
    ///
    /// IPv6 any-address is tried first so IPv4-mapped clients are also
    /// reachable where the platform allows it; a failed v6 bind falls
    /// back to IPv4-only.
    pub async fn bind(port: u16, game: GameState) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let listener = match TcpListener::bind(("::", port)).await {
            Ok(listener) => {
                info!("Listening on IPv6.");
                listener
            }
            Err(e) => {
                warn!("IPv6 bind failed ({}), falling back to IPv4", e);
                let listener = TcpListener::bind(("0.0.0.0", port)).await?;
                info!("Listening on IPv4.");
                listener
            }
        };
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(accept_loop(listener, event_tx));

        Ok(Server {
            game,
            timers: TimerQueue::new(),
            connections: HashMap::new(),
            event_rx,
            local_addr,
        })
    }

    /// The address the listening socket actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Main loop: events from the network tasks plus a 100 ms tick that
    /// pumps the timer queue.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut tick = interval(Duration::from_millis(100));

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event)?,
                        None => {
                            info!("Accept loop gone, shutting down");
                            return Ok(());
                        }
                    }
                }
                _ = tick.tick() => {}
            }

            // A finished game drains and resets before any pending
            // timer may fire into the next one.
            if self.game.is_stopping() {
                self.finish_game().await;
                continue;
            }

            self.fire_due_timers().await;
            self.flush_outgoing().await;
        }
    }

    fn handle_event(&mut self, event: ServerEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match event {
            ServerEvent::Connected { client, addr, writer, reader_task } => {
                self.connections.insert(client, Connection { writer, reader_task });
                self.game.register_client(client, addr.ip(), addr.port());
                self.timers.schedule(
                    Instant::now() + Duration::from_secs(HELLO_WAIT_SECS),
                    TimerEvent::HelloWait { client, ip: addr.ip(), port: addr.port() },
                );
                Ok(())
            }
            ServerEvent::Line { client, line } => self.handle_line(client, line),
            ServerEvent::Disconnected { client } => {
                if self.game.is_connected(client) {
                    self.disconnect_client(client);
                }
                Ok(())
            }
        }
    }

    fn handle_line(
        &mut self,
        client: ClientId,
        line: Vec<u8>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.game.is_connected(client) {
            return Ok(()); // disconnected while the line was in flight
        }
        if self.game.is_stopping() {
            return Ok(());
        }

        let accepted = match Message::parse_bytes(&line) {
            Ok(msg) => self.game.handle_message(client, msg, &mut self.timers)?,
            Err(_) => false,
        };
        if !accepted {
            error!(
                "bad message from {}: {}",
                self.game.describe(client),
                String::from_utf8_lossy(&line)
            );
        }

        if !self.game.is_known(client) {
            info!("Client sent message before hello.");
            self.disconnect_client(client);
        }
        Ok(())
    }

    async fn fire_due_timers(&mut self) {
        for event in self.timers.pop_due(Instant::now()) {
            match event {
                TimerEvent::HelloWait { client, ip, port } => {
                    if self.game.validate_client(client, ip, port) && !self.game.is_known(client) {
                        info!("Did not receive hello from [{}]:{}.", ip, port);
                        self.disconnect_client(client);
                    }
                }
                TimerEvent::BadPutReply { identity, point, value } => {
                    self.game.fire_bad_put(&identity, point, value);
                }
                TimerEvent::StateReply { identity, line } => {
                    self.game.fire_state(&identity, line);
                }
            }
        }
    }

    /// Writes every queued line of every player. A failed write drops
    /// the client.
    async fn flush_outgoing(&mut self) {
        for client in self.game.client_ids() {
            if !self.game.has_outgoing(client) {
                continue;
            }
            while let Some(line) = self.game.take_outgoing(client) {
                let Some(conn) = self.connections.get_mut(&client) else {
                    break;
                };
                if let Err(e) = conn.writer.write_all(line.as_bytes()).await {
                    error!("error writing to client {}: {}", self.game.describe(client), e);
                    self.disconnect_client(client);
                    break;
                }
            }
        }
    }

    fn disconnect_client(&mut self, client: ClientId) {
        info!("Disconnecting {}", self.game.describe(client));
        self.game.disconnect(client);
        if let Some(conn) = self.connections.remove(&client) {
            conn.reader_task.abort();
        }
    }

    /// Best-effort drain of the SCORING lines, then close everything,
    /// pause, and start the next game with the same coefficient file.
    async fn finish_game(&mut self) {
        self.flush_outgoing().await;

        for (_, conn) in self.connections.drain() {
            conn.reader_task.abort();
            // Dropping the write half closes the socket.
        }
        self.timers.clear();
        self.game.reset();

        sleep(Duration::from_millis(RESET_DELAY_MS)).await;
        info!("Starting a new game");
    }
}

async fn accept_loop(listener: TcpListener, event_tx: mpsc::UnboundedSender<ServerEvent>) {
    let mut next_client: ClientId = 1;

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let client = next_client;
                next_client += 1;
                if event_tx
                    .send(spawn_client(client, stream, addr, event_tx.clone()))
                    .is_err()
                {
                    return; // main loop gone
                }
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

fn spawn_client(
    client: ClientId,
    stream: TcpStream,
    addr: SocketAddr,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) -> ServerEvent {
    let (reader, writer) = stream.into_split();
    let reader_task = tokio::spawn(client_reader(client, reader, event_tx));
    ServerEvent::Connected { client, addr, writer, reader_task }
}

async fn client_reader(
    client: ClientId,
    mut reader: OwnedReadHalf,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    let mut buf = vec![0u8; 65535];
    let mut lines = LineBuffer::new();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                lines.extend(&buf[..n]);
                while let Some(line) = lines.next_line() {
                    if event_tx.send(ServerEvent::Line { client, line }).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                debug!("read error from client #{}: {}", client, e);
                break;
            }
        }
    }

    let _ = event_tx.send(ServerEvent::Disconnected { client });
}
