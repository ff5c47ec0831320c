//! Server-side game engine: players, put accounting, scoring
//!
//! All state is owned by the main loop; handlers are synchronous and
//! communicate with the outside world through per-player outbound
//! queues and the [`TimerQueue`].

use crate::timers::{TimerEvent, TimerQueue};
use approx_shared::{
    format_double, Message, BAD_PUT_DELAY_SECS, BAD_PUT_PENALTY, EARLY_PUT_PENALTY, EPS,
    MAX_PUT_VALUE, MIN_PUT_VALUE,
};
use log::{info, warn};
use std::collections::{BTreeMap, VecDeque};
use std::io::BufRead;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Handle for a connected client. Handles are never reused, which the
/// scheduled-callback identity checks rely on.
pub type ClientId = u64;

/// Identity captured when scheduling a callback, validated when it
/// fires so a replaced client is never mistaken for the original.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientIdentity {
    pub client: ClientId,
    pub ip: IpAddr,
    pub port: u16,
    pub player_id: String,
}

/// Per-player record
#[derive(Debug)]
pub struct PlayerInfo {
    pub id: String,
    pub ip: IpAddr,
    pub port: u16,
    pub outgoing: VecDeque<String>,
    pub approximations: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub penalty: f64,
    pub is_known: bool,
    pub correct_puts: u64,
    pub can_put: bool,
    /// STATE reply delay in seconds: lowercase letters in the player id.
    pub delay: u64,
}

pub struct GameState {
    k: usize,
    n: usize,
    m: u64,
    total_correct_puts: u64,
    stopping: bool,
    players: BTreeMap<ClientId, PlayerInfo>,
    coeff_source: Box<dyn BufRead + Send>,
}

impl GameState {
    pub fn new(k: usize, n: usize, m: u64, coeff_source: Box<dyn BufRead + Send>) -> Self {
        GameState {
            k,
            n,
            m,
            total_correct_puts: 0,
            stopping: false,
            players: BTreeMap::new(),
            coeff_source,
        }
    }

    /// Registers a freshly accepted connection as an unknown player.
    pub fn register_client(&mut self, client: ClientId, ip: IpAddr, port: u16) {
        info!("New client [{}]:{}", ip, port);
        self.players.insert(
            client,
            PlayerInfo {
                id: "UNKNOWN".to_string(),
                ip,
                port,
                outgoing: VecDeque::new(),
                approximations: vec![0.0; self.k + 1],
                coefficients: Vec::new(),
                penalty: 0.0,
                is_known: false,
                correct_puts: 0,
                can_put: false,
                delay: 0,
            },
        );
    }

    /// Removes a client; its correct puts no longer count toward the
    /// game total.
    pub fn disconnect(&mut self, client: ClientId) -> bool {
        if let Some(player) = self.players.remove(&client) {
            self.total_correct_puts -= player.correct_puts;
            true
        } else {
            false
        }
    }

    pub fn is_connected(&self, client: ClientId) -> bool {
        self.players.contains_key(&client)
    }

    pub fn is_known(&self, client: ClientId) -> bool {
        self.players.get(&client).is_some_and(|p| p.is_known)
    }

    pub fn player(&self, client: ClientId) -> Option<&PlayerInfo> {
        self.players.get(&client)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    pub fn total_correct_puts(&self) -> u64 {
        self.total_correct_puts
    }

    /// Whether `client` still refers to the same connection.
    pub fn validate_client(&self, client: ClientId, ip: IpAddr, port: u16) -> bool {
        self.players
            .get(&client)
            .is_some_and(|p| p.ip == ip && p.port == port)
    }

    fn identity_matches(&self, identity: &ClientIdentity) -> bool {
        self.players.get(&identity.client).is_some_and(|p| {
            p.ip == identity.ip && p.port == identity.port && p.id == identity.player_id
        })
    }

    fn identity_of(player: &PlayerInfo, client: ClientId) -> ClientIdentity {
        ClientIdentity {
            client,
            ip: player.ip,
            port: player.port,
            player_id: player.id.clone(),
        }
    }

    /// Short `[ip]:port player_id` tag for diagnostics.
    pub fn describe(&self, client: ClientId) -> String {
        match self.players.get(&client) {
            Some(p) => format!("[{}]:{} {}", p.ip, p.port, p.id),
            None => format!("client #{}", client),
        }
    }

    /// Handles one parsed message. Returns whether the message was
    /// expected at this point; an unexpected message is the caller's to
    /// log. Only HELLO can fail hard, when the coefficient file runs dry
    /// or yields garbage.
    pub fn handle_message(
        &mut self,
        client: ClientId,
        msg: Message,
        timers: &mut TimerQueue,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        match msg {
            Message::Hello(player_id) => self.handle_hello(client, player_id),
            Message::Put { point, value } => Ok(self.handle_put(client, point, value, timers)),
            _ => Ok(false),
        }
    }

    fn handle_hello(
        &mut self,
        client: ClientId,
        player_id: String,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        {
            let Some(player) = self.players.get_mut(&client) else {
                return Ok(false);
            };
            if player.is_known {
                return Ok(false);
            }
            player.delay = player_id.chars().filter(|c| c.is_ascii_lowercase()).count() as u64;
            player.id = player_id;
            player.is_known = true;
            player.can_put = true;
            info!("[{}]:{} is now known as {}.", player.ip, player.port, player.id);
        }

        let coefficients = self.next_coefficients()?;
        let coeff_msg = Message::Coeff(coefficients.clone());

        let player = self
            .players
            .get_mut(&client)
            .expect("player registered above");
        info!("{}'s coefficients are {}.", player.id, coeff_msg);
        player.coefficients = coefficients;
        player.outgoing.push_back(coeff_msg.to_wire());
        Ok(true)
    }

    /// Reads the next non-empty line of the coefficient file as a COEFF
    /// message. The file is consumed sequentially across games and is
    /// never rewound.
    fn next_coefficients(&mut self) -> Result<Vec<f64>, Box<dyn std::error::Error + Send + Sync>> {
        loop {
            let mut line = String::new();
            let read = self.coeff_source.read_line(&mut line)?;
            if read == 0 {
                return Err("coefficient file exhausted".into());
            }
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            match Message::parse(trimmed) {
                Ok(Message::Coeff(coeffs)) => {
                    if coeffs.len() != self.n + 1 {
                        warn!(
                            "coefficient line has {} values, expected {}",
                            coeffs.len(),
                            self.n + 1
                        );
                    }
                    return Ok(coeffs);
                }
                _ => return Err(format!("malformed coefficient line: {}", trimmed).into()),
            }
        }
    }

    /// The PUT state machine. The order of the checks is significant:
    /// pacing first (immediate PENALTY, putting re-enabled), then range
    /// (delayed BAD_PUT), then the successful path (delayed STATE).
    fn handle_put(
        &mut self,
        client: ClientId,
        point: i32,
        value: f64,
        timers: &mut TimerQueue,
    ) -> bool {
        let k = self.k;
        let Some(player) = self.players.get_mut(&client) else {
            return false;
        };
        if !player.is_known {
            return false;
        }

        let could_put = player.can_put;
        player.can_put = false;

        if !could_put {
            info!(
                "{} tried to put {} in {} before it could put.",
                player.id,
                format_double(value),
                point
            );
            player.penalty += EARLY_PUT_PENALTY;
            player.can_put = true;
            player
                .outgoing
                .push_back(Message::Penalty { point, value }.to_wire());
            return false;
        }

        let out_of_range = point < 0
            || point as usize > k
            || value + EPS < MIN_PUT_VALUE
            || value - EPS > MAX_PUT_VALUE;
        if out_of_range {
            info!(
                "{} tried to put {} in {} which is out of range.",
                player.id,
                format_double(value),
                point
            );
            player.penalty += BAD_PUT_PENALTY;
            let identity = Self::identity_of(player, client);
            timers.schedule(
                Instant::now() + Duration::from_secs(BAD_PUT_DELAY_SECS),
                TimerEvent::BadPutReply { identity, point, value },
            );
            return false;
        }

        player.correct_puts += 1;
        player.approximations[point as usize] += value;

        let state_msg = Message::State(player.approximations.clone());
        info!(
            "{} puts {} in {}, current state {}",
            player.id,
            format_double(value),
            point,
            state_body(&state_msg.to_line())
        );

        let identity = Self::identity_of(player, client);
        let delay = player.delay;
        timers.schedule(
            Instant::now() + Duration::from_secs(delay),
            TimerEvent::StateReply { identity, line: state_msg.to_wire() },
        );

        self.total_correct_puts += 1;
        if self.total_correct_puts >= self.m {
            self.game_over();
        }
        true
    }

    /// Fires a delayed BAD_PUT reply; no-ops for a stale identity.
    pub fn fire_bad_put(&mut self, identity: &ClientIdentity, point: i32, value: f64) {
        if !self.identity_matches(identity) {
            return;
        }
        let player = self.players.get_mut(&identity.client).expect("validated");
        player.can_put = true;
        player
            .outgoing
            .push_back(Message::BadPut { point, value }.to_wire());
    }

    /// Fires a delayed STATE reply; no-ops for a stale identity.
    pub fn fire_state(&mut self, identity: &ClientIdentity, line: String) {
        if !self.identity_matches(identity) {
            return;
        }
        info!(
            "Sending state {} to {}.",
            state_body(line.trim_end_matches(['\r', '\n'])),
            identity.player_id
        );
        let player = self.players.get_mut(&identity.client).expect("validated");
        player.outgoing.push_back(line);
        player.can_put = true;
    }

    /// Ends the game: queue a single SCORING to every known player and
    /// flag the main loop to drain and reset.
    fn game_over(&mut self) {
        let entries: Vec<(String, f64)> = self
            .players
            .values()
            .filter(|p| p.is_known)
            .map(|p| (p.id.clone(), Self::calculate_score(p, self.k)))
            .collect();
        let scoring = Message::Scoring(entries);
        info!("Game end, scoring: {}", scoring_body(&scoring.to_line()));

        let line = scoring.to_wire();
        for player in self.players.values_mut().filter(|p| p.is_known) {
            player.outgoing.push_back(line.clone());
        }
        self.stopping = true;
    }

    /// penalty + Σ (P(x) − approximations[x])² over x in 0..=K, with P
    /// the player's own polynomial.
    fn calculate_score(player: &PlayerInfo, k: usize) -> f64 {
        let mut score = player.penalty;
        for x in 0..=k {
            let real = poly_at(&player.coefficients, x as f64);
            let diff = real - player.approximations[x];
            score += diff * diff;
        }
        score
    }

    pub fn has_outgoing(&self, client: ClientId) -> bool {
        self.players
            .get(&client)
            .is_some_and(|p| !p.outgoing.is_empty())
    }

    pub fn take_outgoing(&mut self, client: ClientId) -> Option<String> {
        self.players.get_mut(&client)?.outgoing.pop_front()
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.players.keys().copied().collect()
    }

    /// Clears all per-game state; the coefficient file cursor stays put.
    pub fn reset(&mut self) {
        self.players.clear();
        self.total_correct_puts = 0;
        self.stopping = false;
    }
}

fn poly_at(coefficients: &[f64], x: f64) -> f64 {
    let mut result = 0.0;
    let mut x_pow = 1.0;
    for coeff in coefficients {
        result += coeff * x_pow;
        x_pow *= x;
    }
    result
}

fn state_body(line: &str) -> &str {
    line.strip_prefix("STATE ").unwrap_or(line)
}

fn scoring_body(line: &str) -> &str {
    line.strip_prefix("SCORING ").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    fn source(lines: &str) -> Box<dyn BufRead + Send> {
        Box::new(Cursor::new(lines.to_string()))
    }

    fn game(k: usize, n: usize, m: u64, coeff_lines: &str) -> GameState {
        GameState::new(k, n, m, source(coeff_lines))
    }

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    fn join(game: &mut GameState, client: ClientId, id: &str) {
        let mut timers = TimerQueue::new();
        game.register_client(client, ip(), 40000 + client as u16);
        let accepted = game
            .handle_message(client, Message::Hello(id.to_string()), &mut timers)
            .unwrap();
        assert!(accepted);
    }

    #[test]
    fn test_hello_marks_player_known_and_queues_coeff() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\n");
        join(&mut game, 1, "Bob");

        let player = game.player(1).unwrap();
        assert!(player.is_known);
        assert!(player.can_put);
        assert_eq!(player.id, "Bob");
        assert_eq!(player.delay, 2); // 'o' and 'b'
        assert_eq!(player.coefficients, vec![1.0, 2.0]);
        assert_eq!(player.approximations.len(), 11);
        assert_eq!(
            player.outgoing.front().unwrap(),
            "COEFF 1.0000000 2.0000000\r\n"
        );
    }

    #[test]
    fn test_second_hello_is_unexpected() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\nCOEFF 3 4\r\n");
        join(&mut game, 1, "Bob");
        let mut timers = TimerQueue::new();
        let accepted = game
            .handle_message(1, Message::Hello("Eve".to_string()), &mut timers)
            .unwrap();
        assert!(!accepted);
        assert_eq!(game.player(1).unwrap().id, "Bob");
    }

    #[test]
    fn test_each_hello_consumes_next_coefficient_line() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\n\r\nCOEFF 3 4\r\n");
        join(&mut game, 1, "a");
        join(&mut game, 2, "b");
        assert_eq!(game.player(1).unwrap().coefficients, vec![1.0, 2.0]);
        // The empty line in between is skipped
        assert_eq!(game.player(2).unwrap().coefficients, vec![3.0, 4.0]);
    }

    #[test]
    fn test_exhausted_coefficient_file_is_fatal() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\n");
        join(&mut game, 1, "a");
        let mut timers = TimerQueue::new();
        game.register_client(2, ip(), 40002);
        let result = game.handle_message(2, Message::Hello("b".to_string()), &mut timers);
        assert!(result.is_err());
    }

    #[test]
    fn test_put_before_hello_is_unexpected() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\n");
        let mut timers = TimerQueue::new();
        game.register_client(1, ip(), 40001);
        let accepted = game
            .handle_message(1, Message::Put { point: 0, value: 1.0 }, &mut timers)
            .unwrap();
        assert!(!accepted);
    }

    #[test]
    fn test_valid_put_schedules_delayed_state() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\n");
        join(&mut game, 1, "Bob");
        let mut timers = TimerQueue::new();

        let accepted = game
            .handle_message(1, Message::Put { point: 3, value: 2.5 }, &mut timers)
            .unwrap();
        assert!(accepted);

        let player = game.player(1).unwrap();
        assert!(!player.can_put); // until the STATE reply fires
        assert_eq!(player.correct_puts, 1);
        assert_approx_eq!(player.approximations[3], 2.5);
        assert_eq!(game.total_correct_puts(), 1);
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn test_state_reply_reenables_putting() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\n");
        join(&mut game, 1, "Bob");
        let mut timers = TimerQueue::new();
        game.handle_message(1, Message::Put { point: 0, value: 1.0 }, &mut timers)
            .unwrap();
        game.take_outgoing(1); // drop the COEFF line

        let due = timers.pop_due(Instant::now() + Duration::from_secs(60));
        match due.into_iter().next().unwrap() {
            TimerEvent::StateReply { identity, line } => {
                game.fire_state(&identity, line);
            }
            other => panic!("expected StateReply, got {:?}", other),
        }

        let player = game.player(1).unwrap();
        assert!(player.can_put);
        assert_eq!(player.outgoing.front().unwrap().split(' ').next(), Some("STATE"));
    }

    #[test]
    fn test_bad_put_penalizes_and_delays_reply() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\n");
        join(&mut game, 1, "Bob");
        let mut timers = TimerQueue::new();
        game.take_outgoing(1);

        // Point 15 is outside [0, 10]
        let accepted = game
            .handle_message(1, Message::Put { point: 15, value: 0.0 }, &mut timers)
            .unwrap();
        assert!(!accepted);

        let player = game.player(1).unwrap();
        assert!(!player.can_put);
        assert_approx_eq!(player.penalty, 10.0);
        assert_eq!(player.correct_puts, 0);
        assert!(player.approximations.iter().all(|v| *v == 0.0));
        assert!(player.outgoing.is_empty()); // reply comes later
        assert_eq!(timers.len(), 1);

        let due = timers.pop_due(Instant::now() + Duration::from_secs(60));
        match due.into_iter().next().unwrap() {
            TimerEvent::BadPutReply { identity, point, value } => {
                game.fire_bad_put(&identity, point, value);
            }
            other => panic!("expected BadPutReply, got {:?}", other),
        }
        let player = game.player(1).unwrap();
        assert!(player.can_put);
        assert_eq!(player.outgoing.front().unwrap(), "BAD_PUT 15 0.0000000\r\n");
    }

    #[test]
    fn test_out_of_range_value_is_a_bad_put() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\n");
        join(&mut game, 1, "Bob");
        let mut timers = TimerQueue::new();
        let accepted = game
            .handle_message(1, Message::Put { point: 0, value: 5.1 }, &mut timers)
            .unwrap();
        assert!(!accepted);
        assert_approx_eq!(game.player(1).unwrap().penalty, 10.0);
    }

    #[test]
    fn test_early_put_gets_immediate_penalty() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\n");
        join(&mut game, 1, "Bob");
        let mut timers = TimerQueue::new();
        game.handle_message(1, Message::Put { point: 0, value: 1.0 }, &mut timers)
            .unwrap();
        game.take_outgoing(1); // COEFF

        // Second put while the STATE reply is still pending
        let accepted = game
            .handle_message(1, Message::Put { point: 1, value: 1.0 }, &mut timers)
            .unwrap();
        assert!(!accepted);

        let player = game.player(1).unwrap();
        assert_approx_eq!(player.penalty, 20.0);
        // PENALTY is immediate and putting is allowed again at once
        assert!(player.can_put);
        assert_eq!(player.outgoing.front().unwrap(), "PENALTY 1 1.0000000\r\n");
        assert_approx_eq!(player.approximations[1], 0.0);
        assert_eq!(player.correct_puts, 1); // only the first put counted
    }

    #[test]
    fn test_early_put_stops_before_the_range_check() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\n");
        join(&mut game, 1, "Bob");
        let mut timers = TimerQueue::new();
        game.handle_message(1, Message::Put { point: 0, value: 1.0 }, &mut timers)
            .unwrap();

        // Early *and* out of range: only the pacing penalty applies.
        game.handle_message(1, Message::Put { point: 99, value: 9.0 }, &mut timers)
            .unwrap();
        let player = game.player(1).unwrap();
        assert_approx_eq!(player.penalty, 20.0);
        assert_eq!(timers.len(), 1); // just the pending STATE reply
    }

    #[test]
    fn test_stale_identity_does_not_fire() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\nCOEFF 3 4\r\n");
        join(&mut game, 1, "Bob");
        let mut timers = TimerQueue::new();
        game.handle_message(1, Message::Put { point: 0, value: 1.0 }, &mut timers)
            .unwrap();
        let event = timers
            .pop_due(Instant::now() + Duration::from_secs(60))
            .into_iter()
            .next()
            .unwrap();

        // The client goes away and a different one joins.
        game.disconnect(1);
        game.register_client(2, ip(), 40002);

        match event {
            TimerEvent::StateReply { identity, line } => game.fire_state(&identity, line),
            other => panic!("expected StateReply, got {:?}", other),
        }
        assert!(game.player(2).unwrap().outgoing.is_empty());
        assert!(!game.player(2).unwrap().can_put);
    }

    #[test]
    fn test_disconnect_subtracts_correct_puts() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\nCOEFF 3 4\r\n");
        join(&mut game, 1, "Bob");
        join(&mut game, 2, "Eve");
        let mut timers = TimerQueue::new();
        game.handle_message(1, Message::Put { point: 0, value: 1.0 }, &mut timers)
            .unwrap();
        assert_eq!(game.total_correct_puts(), 1);

        game.disconnect(1);
        assert_eq!(game.total_correct_puts(), 0);
        assert!(game.is_connected(2));
    }

    #[test]
    fn test_reaching_m_stops_game_with_sorted_scoring() {
        // K=2, N=1, M=1; P(x) = 1 + 2x, so real values are [1, 3, 5].
        let mut game = game(2, 1, 1, "COEFF 1 2\r\n");
        join(&mut game, 1, "player1");
        let mut timers = TimerQueue::new();

        game.handle_message(1, Message::Put { point: 0, value: 3.0 }, &mut timers)
            .unwrap();

        assert!(game.is_stopping());
        // approximations [3, 0, 0]: score (1-3)² + (3-0)² + (5-0)² = 38
        let player = game.player(1).unwrap();
        let scoring = player.outgoing.back().unwrap();
        assert_eq!(scoring, "SCORING player1 38.0000000\r\n");
    }

    #[test]
    fn test_scoring_includes_penalties_and_sorts_ids() {
        let mut game = game(1, 1, 3, "COEFF 0 0\r\nCOEFF 0 0\r\n");
        join(&mut game, 1, "zoe");
        join(&mut game, 2, "amy");
        let mut timers = TimerQueue::new();

        // zoe: one valid put of 0 at 0 (perfect for P(x)=0), then a bad put
        game.handle_message(1, Message::Put { point: 0, value: 0.0 }, &mut timers)
            .unwrap();
        game.fire_state(
            &ClientIdentity { client: 1, ip: ip(), port: 40001, player_id: "zoe".into() },
            Message::State(vec![0.0, 0.0]).to_wire(),
        );
        game.handle_message(1, Message::Put { point: 5, value: 0.0 }, &mut timers)
            .unwrap();

        // amy: two perfect puts end the game at M=3
        game.handle_message(2, Message::Put { point: 0, value: 0.0 }, &mut timers)
            .unwrap();
        game.fire_state(
            &ClientIdentity { client: 2, ip: ip(), port: 40002, player_id: "amy".into() },
            Message::State(vec![0.0, 0.0]).to_wire(),
        );
        game.handle_message(2, Message::Put { point: 1, value: 0.0 }, &mut timers)
            .unwrap();

        assert!(game.is_stopping());
        let scoring = game.player(2).unwrap().outgoing.back().unwrap().clone();
        assert_eq!(scoring, "SCORING amy 0.0000000 zoe 10.0000000\r\n");
        // Both known players get the same line
        assert_eq!(game.player(1).unwrap().outgoing.back().unwrap(), &scoring);
    }

    #[test]
    fn test_reset_clears_players_but_keeps_file_cursor() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\nCOEFF 3 4\r\n");
        join(&mut game, 1, "Bob");
        game.reset();
        assert!(!game.is_connected(1));
        assert_eq!(game.total_correct_puts(), 0);
        assert!(!game.is_stopping());

        // The next game reads the *second* line.
        join(&mut game, 2, "Eve");
        assert_eq!(game.player(2).unwrap().coefficients, vec![3.0, 4.0]);
    }

    #[test]
    fn test_unexpected_message_types_are_rejected() {
        let mut game = game(10, 1, 100, "COEFF 1 2\r\n");
        join(&mut game, 1, "Bob");
        let mut timers = TimerQueue::new();
        for msg in [
            Message::State(vec![1.0]),
            Message::Penalty { point: 0, value: 1.0 },
            Message::BadPut { point: 0, value: 1.0 },
            Message::Scoring(vec![]),
            Message::Coeff(vec![1.0]),
        ] {
            assert!(!game.handle_message(1, msg, &mut timers).unwrap());
        }
        // The connection itself stays registered
        assert!(game.is_connected(1));
    }
}
