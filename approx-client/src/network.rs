//! Network receiver and sender threads
//!
//! The receiver owns the read direction with a 200 ms timeout so it can
//! notice `game_over` promptly; the sender drains the outgoing queue
//! with the same cadence. Both talk to the rest of the client only via
//! channels.

use crate::game::{fatal, ClientShared};
use crate::logs::Log;
use approx_shared::{LineBuffer, Message, CLIENT_TIMEOUT_MS};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Thread body: reads the socket, reassembles CRLF lines, parses them
/// and forwards messages to the processor.
///
/// A malformed very first message is fatal; later ones are only logged.
/// The server closing the connection ends the game.
pub fn network_receiver(
    shared: Arc<ClientShared>,
    mut stream: TcpStream,
    incoming: Sender<Message>,
    log: Log,
) {
    let mut buf = vec![0u8; 65535];
    let mut lines = LineBuffer::new();
    let mut first_message = true;

    while !shared.game_over.load(Ordering::Relaxed) {
        match stream.read(&mut buf) {
            Ok(0) => {
                shared.game_over.store(true, Ordering::Relaxed);
            }
            Ok(n) => {
                lines.extend(&buf[..n]);
                while let Some(line) = lines.next_line() {
                    match Message::parse_bytes(&line) {
                        Ok(msg) => {
                            let _ = incoming.send(msg);
                        }
                        Err(_) => {
                            let text = format!(
                                "bad message from {}: {}",
                                shared.full_info,
                                String::from_utf8_lossy(&line)
                            );
                            if first_message {
                                fatal(&text);
                            }
                            log.stderr(text);
                        }
                    }
                    first_message = false;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => fatal(&format!("recv: {}", e)),
        }
    }

    if !lines.is_empty() {
        log.stderr(format!(
            "partial message remaining in buffer at disconnection: {}",
            String::from_utf8_lossy(lines.remainder())
        ));
    }
}

/// Thread body: serializes queued messages onto the socket in FIFO
/// order.
pub fn network_sender(shared: Arc<ClientShared>, mut stream: TcpStream, outgoing: Receiver<Message>) {
    let timeout = Duration::from_millis(CLIENT_TIMEOUT_MS);

    while !shared.game_over.load(Ordering::Relaxed) {
        let msg = match outgoing.recv_timeout(timeout) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let Err(e) = stream.write_all(msg.to_wire().as_bytes()) {
            if shared.game_over.load(Ordering::Relaxed) {
                break;
            }
            fatal(&format!("write: {}", e));
        }
    }
}
