//! # Approximator Client
//!
//! Multi-threaded client for the polynomial approximation game. Five
//! threads cooperate through channels: the log printer, the strategy
//! (manual stdin-driven or automatic), the network receiver, the
//! network sender and the message processor.
//!
//! Modules:
//! - [`game`]: shared state, puts gate, message processor
//! - [`strategy`]: manual and auto put generation
//! - [`network`]: receiver and sender threads
//! - [`logs`]: serialized stdout/stderr printing

pub mod game;
pub mod logs;
pub mod network;
pub mod strategy;
