//! Log printer thread: the only writer of stdout and stderr
//!
//! Every other thread pushes entries onto a channel so narrative and
//! error lines never interleave mid-line.

use approx_shared::CLIENT_TIMEOUT_MS;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::game::ClientShared;

#[derive(Debug)]
pub struct LogEntry {
    pub text: String,
    pub is_error: bool,
}

/// Cloneable handle for queueing log lines.
#[derive(Clone)]
pub struct Log {
    tx: Sender<LogEntry>,
}

impl Log {
    pub fn new(tx: Sender<LogEntry>) -> Self {
        Log { tx }
    }

    pub fn stdout(&self, text: impl Into<String>) {
        let _ = self.tx.send(LogEntry { text: text.into(), is_error: false });
    }

    pub fn stderr(&self, text: impl Into<String>) {
        let _ = self.tx.send(LogEntry { text: text.into(), is_error: true });
    }
}

fn print_entry(entry: &LogEntry) {
    if entry.is_error {
        eprintln!("ERROR: {}", entry.text);
    } else {
        println!("{}.", entry.text);
    }
}

/// Thread body: print until the game ends, then drain what is left.
pub fn log_printer(shared: Arc<ClientShared>, rx: Receiver<LogEntry>) {
    let timeout = Duration::from_millis(CLIENT_TIMEOUT_MS);

    while !shared.game_over.load(Ordering::Relaxed) {
        match rx.recv_timeout(timeout) {
            Ok(entry) => print_entry(&entry),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }

    // One last grace period for stragglers, then the backlog.
    if let Ok(entry) = rx.recv_timeout(timeout) {
        print_entry(&entry);
    }
    while let Ok(entry) = rx.try_recv() {
        print_entry(&entry);
    }
}
