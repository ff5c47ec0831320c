//! Put strategies: manual (stdin-driven) and automatic
//!
//! Both produce PUT messages into the outgoing queue; only the auto
//! strategy observes the `puts_without_answer` gate.

use crate::game::ClientShared;
use crate::logs::Log;
use approx_shared::{
    format_double, parse_double, parse_integer, split_params, Message, CLIENT_TIMEOUT_MS,
};
use std::io::BufRead;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn send_put(outgoing: &Sender<Message>, log: &Log, point: i32, value: f64) {
    log.stdout(format!(
        "Putting {} in point {}",
        format_double(value),
        point
    ));
    let _ = outgoing.send(Message::Put { point, value });
}

/// Thread body: reads `point value` lines from stdin and turns them
/// into puts. Parse errors are reported and skipped.
pub fn manual_strategy(shared: Arc<ClientShared>, outgoing: Sender<Message>, log: Log) {
    let timeout = Duration::from_millis(CLIENT_TIMEOUT_MS);

    // stdin has no timed read; a helper thread feeds lines through a
    // channel so this loop can keep watching game_over. The helper is
    // deliberately left blocked at process exit.
    let (line_tx, line_rx) = mpsc::channel::<std::io::Result<String>>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if line_tx.send(line).is_err() {
                return;
            }
        }
    });

    while !shared.game_over.load(Ordering::Relaxed) {
        let line = match line_rx.recv_timeout(timeout) {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                log.stderr(format!("Error reading from stdin: {}", e));
                continue;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break, // stdin closed
        };

        let Some(params) = split_params(&line) else {
            log.stderr(format!("invalid input line {}", line));
            continue;
        };
        if params.len() != 2 {
            log.stderr(format!("invalid input line {}", line));
            continue;
        }
        let (Some(point), Some(value)) = (parse_integer(params[0]), parse_double(params[1]))
        else {
            log.stderr(format!("invalid input line {}", line));
            continue;
        };

        send_put(&outgoing, &log, point, value);
    }
}

/// Thread body: whenever every previous put has been answered, puts the
/// clamped difference at the worst-approximated point.
pub fn auto_strategy(shared: Arc<ClientShared>, outgoing: Sender<Message>, log: Log) {
    let timeout = Duration::from_millis(CLIENT_TIMEOUT_MS);

    while !shared.game_over.load(Ordering::Relaxed) {
        if !shared.puts.wait_until_zero(timeout) {
            continue;
        }
        shared.puts.increment();
        let (point, value) = shared.poly.lock().unwrap().best_put();
        send_put(&outgoing, &log, point, value);
    }
}
