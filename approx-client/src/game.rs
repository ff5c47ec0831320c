//! Client-side game state and the message processor thread
//!
//! The polynomial state (coefficients, local approximation, real
//! values) is shared between the processor and the auto strategy under
//! one mutex. The `puts_without_answer` counter gates the auto
//! strategy: it starts at 1 so nothing is put before COEFF arrives, and
//! every answered put wakes the strategy through the condition variable.

use crate::logs::Log;
use approx_shared::{
    format_double, Message, CLIENT_TIMEOUT_MS, MAX_PUT_VALUE, MIN_PUT_VALUE,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Prints the error and terminates the whole process, as any thread may
/// hit a fatal condition.
pub fn fatal(message: &str) -> ! {
    eprintln!("ERROR: {}", message);
    std::process::exit(1);
}

/// Counter of puts awaiting a server answer, with a condition variable
/// the auto strategy sleeps on.
pub struct PutsCounter {
    count: Mutex<i32>,
    zero: Condvar,
}

impl PutsCounter {
    /// Starts at 1: the COEFF message is the first expected "answer".
    pub fn new() -> Self {
        PutsCounter { count: Mutex::new(1), zero: Condvar::new() }
    }

    pub fn increment(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
    }

    /// Returns false when there was nothing outstanding to answer.
    pub fn decrement(&self) -> bool {
        let mut count = self.count.lock().unwrap();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        if *count == 0 {
            self.zero.notify_one();
        }
        true
    }

    /// Waits up to `timeout` for the counter to reach zero.
    pub fn wait_until_zero(&self, timeout: Duration) -> bool {
        let count = self.count.lock().unwrap();
        let (count, _) = self
            .zero
            .wait_timeout_while(count, timeout, |count| *count != 0)
            .unwrap();
        *count == 0
    }
}

impl Default for PutsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Polynomial knowledge shared by the processor and the auto strategy
#[derive(Debug, Default)]
pub struct PolyState {
    pub coeffs: Vec<f64>,
    /// Largest valid abscissa, once learned from the first STATE.
    pub k: Option<usize>,
    pub approximation: Vec<f64>,
    pub real_values: Vec<f64>,
}

impl PolyState {
    pub fn poly_at(&self, x: f64) -> f64 {
        let mut result = 0.0;
        let mut x_pow = 1.0;
        for coeff in &self.coeffs {
            result += coeff * x_pow;
            x_pow *= x;
        }
        result
    }

    /// Installs the coefficients from COEFF. K is still unknown, but it
    /// is at least 1, so points 0 and 1 are always valid targets.
    pub fn install_coeffs(&mut self, coeffs: Vec<f64>) {
        self.coeffs = coeffs;
        self.approximation = vec![0.0, 0.0];
        self.real_values = vec![self.poly_at(0.0), self.poly_at(1.0)];
    }

    /// Learns K from the first STATE, growing the vectors while keeping
    /// the approximation accumulated so far.
    pub fn learn_k(&mut self, k: usize) {
        self.k = Some(k);
        self.approximation.resize(k + 1, 0.0);
        self.real_values = (0..=k).map(|x| self.poly_at(x as f64)).collect();
    }

    /// Picks the point with the largest squared error, puts the clamped
    /// difference there and updates the local approximation.
    pub fn best_put(&mut self) -> (i32, f64) {
        let max_point = self.k.unwrap_or(1);

        let mut best_idx = 0;
        let mut best_sq = f64::MIN;
        for i in 0..=max_point {
            let diff = self.approximation[i] - self.real_values[i];
            let sq = diff * diff;
            if sq > best_sq {
                best_sq = sq;
                best_idx = i;
            }
        }

        let diff = self.real_values[best_idx] - self.approximation[best_idx];
        let value = diff.clamp(MIN_PUT_VALUE, MAX_PUT_VALUE);
        self.approximation[best_idx] += value;
        (best_idx as i32, value)
    }
}

/// State shared by all five client threads
pub struct ClientShared {
    pub game_over: AtomicBool,
    pub puts: PutsCounter,
    pub poly: Mutex<PolyState>,
    pub auto_strategy: bool,
    /// `[ip]:port` of the server, for log correlation.
    pub server_info: String,
    /// `[ip]:port, player_id`.
    pub full_info: String,
}

impl ClientShared {
    pub fn new(auto_strategy: bool, server_info: String, player_id: &str) -> Self {
        let full_info = format!("{}, {}", server_info, player_id);
        ClientShared {
            game_over: AtomicBool::new(false),
            puts: PutsCounter::new(),
            poly: Mutex::new(PolyState::default()),
            auto_strategy,
            server_info,
            full_info,
        }
    }
}

/// Thread body: consumes parsed incoming messages and updates state.
///
/// The first message must be COEFF; a server that disconnects without
/// ever sending SCORING is a fatal error.
pub fn message_processor(shared: Arc<ClientShared>, incoming: Receiver<Message>, log: Log) {
    let timeout = Duration::from_millis(CLIENT_TIMEOUT_MS);
    let mut first_message = true;
    let mut scoring_received = false;

    while !shared.game_over.load(Ordering::Relaxed) {
        let msg = match incoming.recv_timeout(timeout) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if first_message {
            first_message = false;
            let accepted = match &msg {
                Message::Coeff(coeffs) => {
                    process_coeff(&shared, coeffs.clone(), &log);
                    true
                }
                _ => false,
            };
            if !accepted {
                fatal(&format!("bad message from {}: {}", shared.full_info, msg));
            }
            continue;
        }

        let accepted = match &msg {
            Message::BadPut { point, value } => process_bad_put(&shared, *point, *value, &log),
            Message::State(values) => process_state(&shared, values, &log),
            Message::Penalty { point, value } => process_penalty(*point, *value, &log),
            Message::Scoring(entries) => {
                scoring_received = true;
                process_scoring(&shared, entries, &log)
            }
            _ => false,
        };
        if !accepted {
            log.stderr(format!("bad message from {}: {}", shared.full_info, msg));
        }
    }

    if !scoring_received {
        fatal("unexpected server disconnect");
    }
}

fn process_coeff(shared: &ClientShared, coeffs: Vec<f64>, log: &Log) {
    let rendered = coeffs
        .iter()
        .map(|c| format_double(*c))
        .collect::<Vec<_>>()
        .join(" ");
    log.stdout(format!("Received coefficients: {}", rendered));

    shared.poly.lock().unwrap().install_coeffs(coeffs);
    shared.puts.decrement();
}

fn process_bad_put(shared: &ClientShared, point: i32, value: f64, log: &Log) -> bool {
    log.stdout(format!(
        "Received bad put response ({} in {})",
        format_double(value),
        point
    ));
    if shared.auto_strategy {
        shared.puts.decrement();
    }
    true
}

fn process_state(shared: &ClientShared, values: &[f64], log: &Log) -> bool {
    let rendered = values
        .iter()
        .map(|v| format_double(*v))
        .collect::<Vec<_>>()
        .join(" ");
    log.stdout(format!("Received state: {}", rendered));

    if !shared.auto_strategy {
        return true;
    }

    let mut poly = shared.poly.lock().unwrap();
    if poly.k.is_none() {
        poly.learn_k(values.len() - 1);
        drop(poly);
        shared.puts.decrement();
        return true;
    }
    drop(poly);
    // A STATE nobody asked for is still reported as unexpected.
    shared.puts.decrement()
}

fn process_penalty(point: i32, value: f64, log: &Log) -> bool {
    // No counter change: the put was not answered, the player retries.
    log.stdout(format!(
        "Received penalty response ({} in {})",
        format_double(value),
        point
    ));
    true
}

fn process_scoring(shared: &ClientShared, entries: &[(String, f64)], log: &Log) -> bool {
    let rendered = entries
        .iter()
        .map(|(id, score)| format!("{} {}", id, format_double(*score)))
        .collect::<Vec<_>>()
        .join(" ");
    log.stdout(format!("Game end, scoring: {}", rendered));

    shared.game_over.store(true, Ordering::Relaxed);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::sync::mpsc;

    fn shared(auto: bool) -> Arc<ClientShared> {
        Arc::new(ClientShared::new(auto, "[::1]:4000".to_string(), "tester"))
    }

    fn test_log() -> (Log, mpsc::Receiver<crate::logs::LogEntry>) {
        let (tx, rx) = mpsc::channel();
        (Log::new(tx), rx)
    }

    #[test]
    fn test_counter_starts_gated() {
        let counter = PutsCounter::new();
        assert!(!counter.wait_until_zero(Duration::from_millis(1)));
        assert!(counter.decrement());
        assert!(counter.wait_until_zero(Duration::from_millis(1)));
    }

    #[test]
    fn test_counter_decrement_below_zero_fails() {
        let counter = PutsCounter::new();
        assert!(counter.decrement());
        assert!(!counter.decrement());
    }

    #[test]
    fn test_poly_evaluation() {
        let mut poly = PolyState::default();
        poly.install_coeffs(vec![1.0, 2.0]);
        assert_approx_eq!(poly.poly_at(0.0), 1.0);
        assert_approx_eq!(poly.poly_at(1.0), 3.0);
        assert_approx_eq!(poly.poly_at(2.0), 5.0);
        assert_eq!(poly.approximation, vec![0.0, 0.0]);
        assert_eq!(poly.real_values, vec![1.0, 3.0]);
    }

    #[test]
    fn test_best_put_targets_largest_error() {
        let mut poly = PolyState::default();
        poly.install_coeffs(vec![1.0, 2.0]); // real values [1, 3]

        let (point, value) = poly.best_put();
        assert_eq!(point, 1);
        assert_approx_eq!(value, 3.0);
        assert_approx_eq!(poly.approximation[1], 3.0);

        let (point, value) = poly.best_put();
        assert_eq!(point, 0);
        assert_approx_eq!(value, 1.0);
    }

    #[test]
    fn test_best_put_clamps_value() {
        let mut poly = PolyState::default();
        poly.install_coeffs(vec![0.0, 10.0]); // real values [0, 10]
        let (point, value) = poly.best_put();
        assert_eq!(point, 1);
        assert_approx_eq!(value, 5.0); // clamped from 10
        assert_approx_eq!(poly.approximation[1], 5.0);
    }

    #[test]
    fn test_learn_k_grows_vectors_and_keeps_progress() {
        let mut poly = PolyState::default();
        poly.install_coeffs(vec![1.0, 2.0]);
        poly.approximation[1] = 3.0;

        poly.learn_k(4);
        assert_eq!(poly.k, Some(4));
        assert_eq!(poly.approximation, vec![0.0, 3.0, 0.0, 0.0, 0.0]);
        assert_eq!(poly.real_values, vec![1.0, 3.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_first_state_learns_k_and_releases_strategy() {
        let shared = shared(true);
        let (log, _rx) = test_log();
        process_coeff(&shared, vec![1.0, 2.0], &log);
        // COEFF released the initial gate; simulate one sent put.
        shared.puts.increment();

        assert!(process_state(&shared, &[0.0, 3.0, 0.0], &log));
        let poly = shared.poly.lock().unwrap();
        assert_eq!(poly.k, Some(2));
        drop(poly);
        assert!(shared.puts.wait_until_zero(Duration::from_millis(1)));
    }

    #[test]
    fn test_unsolicited_state_is_unexpected_in_auto_mode() {
        let shared = shared(true);
        let (log, _rx) = test_log();
        process_coeff(&shared, vec![1.0], &log);
        assert!(process_state(&shared, &[0.0, 0.0], &log)); // learns K

        // Counter is zero; another STATE has nothing to answer.
        assert!(!process_state(&shared, &[0.0, 0.0], &log));
    }

    #[test]
    fn test_penalty_does_not_release_strategy() {
        let shared = shared(true);
        let (log, _rx) = test_log();
        process_coeff(&shared, vec![1.0], &log);
        shared.puts.increment();

        assert!(process_penalty(0, 1.0, &log));
        assert!(!shared.puts.wait_until_zero(Duration::from_millis(1)));
    }

    #[test]
    fn test_bad_put_releases_strategy_in_auto_mode() {
        let shared = shared(true);
        let (log, _rx) = test_log();
        process_coeff(&shared, vec![1.0], &log);
        shared.puts.increment();

        assert!(process_bad_put(&shared, 7, 0.0, &log));
        assert!(shared.puts.wait_until_zero(Duration::from_millis(1)));
    }

    #[test]
    fn test_scoring_sets_game_over() {
        let shared = shared(false);
        let (log, rx) = test_log();
        assert!(process_scoring(&shared, &[("amy".to_string(), 1.5)], &log));
        assert!(shared.game_over.load(Ordering::Relaxed));
        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.text, "Game end, scoring: amy 1.5000000");
    }

    #[test]
    fn test_manual_mode_state_never_touches_counter() {
        let shared = shared(false);
        let (log, _rx) = test_log();
        process_coeff(&shared, vec![1.0], &log);
        // Counter already zero after COEFF; STATE must not fail on it.
        assert!(process_state(&shared, &[0.0, 0.0], &log));
        assert!(process_state(&shared, &[0.0, 0.0], &log));
    }
}
