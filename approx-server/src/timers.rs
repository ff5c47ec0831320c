//! Deadline-ordered queue of scheduled game callbacks
//!
//! Events fire between poll iterations of the main loop. Each event
//! carries enough client identity to detect that the client it was
//! scheduled for is gone or has been replaced; stale events no-op.

use crate::game::{ClientId, ClientIdentity};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Instant;

/// A scheduled callback, tagged with the identity of the client it
/// belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    /// Disconnect the client if it has not said HELLO by now.
    HelloWait {
        client: ClientId,
        ip: IpAddr,
        port: u16,
    },
    /// Deliver the delayed BAD_PUT answer and re-enable putting.
    BadPutReply {
        identity: ClientIdentity,
        point: i32,
        value: f64,
    },
    /// Deliver the delayed STATE answer and re-enable putting.
    StateReply {
        identity: ClientIdentity,
        line: String,
    },
}

/// Events keyed by deadline; the sequence number keeps same-instant
/// events ordered by insertion.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_seq: u64,
    events: BTreeMap<(Instant, u64), TimerEvent>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Instant, event: TimerEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.insert((deadline, seq), event);
    }

    /// Removes and returns every event due at `now`, in deadline order.
    pub fn pop_due(&mut self, now: Instant) -> Vec<TimerEvent> {
        let mut due = Vec::new();
        while let Some(entry) = self.events.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    /// Drops every scheduled event (used on game reset).
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
