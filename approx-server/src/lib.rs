//! # Approximator Server
//!
//! Authoritative server for the polynomial approximation game. Clients
//! introduce themselves, receive a polynomial, and submit additive puts
//! at integer abscissas; the server enforces pacing and ranges, keeps
//! penalty accounts, and scores everyone once the game-wide quota of
//! correct puts is spent.
//!
//! Modules:
//! - [`game`]: the game engine owned by the main loop
//! - [`timers`]: deadline queue for delayed replies and hello waits
//! - [`network`]: accept loop, per-client readers, main select loop

pub mod game;
pub mod network;
pub mod timers;
