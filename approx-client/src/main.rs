//! Entry point: argument parsing, connection, thread orchestration
//!
//! Five threads cooperate through channels and shared state: the log
//! printer, the strategy (manual or auto), the network receiver, the
//! network sender and the message processor. They are joined in the
//! reverse of their startup order.

use approx_client::game::{self, ClientShared};
use approx_client::logs::{log_printer, Log};
use approx_client::{network, strategy};
use clap::Parser;
use log::info;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Polynomial approximation game client", long_about = None)]
struct Args {
    /// Player id (alphanumeric)
    #[arg(short = 'u', long = "user", value_parser = parse_player_id)]
    player_id: String,

    /// Server host name or address
    #[arg(short = 's', long)]
    server: String,

    /// Server port
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Resolve the server to IPv4 only
    #[arg(short = '4')]
    ipv4: bool,

    /// Resolve the server to IPv6 only
    #[arg(short = '6')]
    ipv6: bool,

    /// Play automatically instead of reading puts from stdin
    #[arg(short = 'a')]
    auto: bool,
}

fn parse_player_id(s: &str) -> Result<String, String> {
    if s.is_empty() || !approx_shared::is_alphanumeric(s) {
        return Err("player id must contain only alphanumeric characters".to_string());
    }
    Ok(s.to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    // Forcing both families forces neither.
    let (force_ipv4, force_ipv6) = if args.ipv4 && args.ipv6 {
        (false, false)
    } else {
        (args.ipv4, args.ipv6)
    };

    info!(
        "Starting with id '{}' on server [{}]:{}{}{}",
        args.player_id,
        args.server,
        args.port,
        match (force_ipv4, force_ipv6) {
            (true, _) => " forcing IPv4",
            (_, true) => " forcing IPv6",
            _ => "",
        },
        if args.auto { " using auto strategy" } else { " reading from stdin" },
    );

    let stream = connect(&args.server, args.port, force_ipv4, force_ipv6)?;
    stream.set_read_timeout(Some(Duration::from_millis(approx_shared::CLIENT_TIMEOUT_MS)))?;
    let peer = stream.peer_addr()?;
    let server_info = format!("[{}]:{}", peer.ip(), peer.port());

    let shared = Arc::new(ClientShared::new(args.auto, server_info.clone(), &args.player_id));

    let (incoming_tx, incoming_rx) = mpsc::channel();
    let (outgoing_tx, outgoing_rx) = mpsc::channel();
    let (log_tx, log_rx) = mpsc::channel();
    let log = Log::new(log_tx);

    log.stdout(format!("Connected to {}", server_info));

    let log_thread = thread::spawn({
        let shared = Arc::clone(&shared);
        move || log_printer(shared, log_rx)
    });

    let strategy_thread = {
        let shared = Arc::clone(&shared);
        let outgoing = outgoing_tx.clone();
        let log = log.clone();
        if args.auto {
            thread::spawn(move || strategy::auto_strategy(shared, outgoing, log))
        } else {
            thread::spawn(move || strategy::manual_strategy(shared, outgoing, log))
        }
    };

    let receiver_thread = {
        let shared = Arc::clone(&shared);
        let stream = stream.try_clone()?;
        let log = log.clone();
        thread::spawn(move || network::network_receiver(shared, stream, incoming_tx, log))
    };

    let sender_thread = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || network::network_sender(shared, stream, outgoing_rx))
    };

    let processor_thread = {
        let shared = Arc::clone(&shared);
        let log = log.clone();
        thread::spawn(move || game::message_processor(shared, incoming_rx, log))
    };

    outgoing_tx
        .send(approx_shared::Message::Hello(args.player_id.clone()))
        .expect("sender thread just started");

    // Main keeps no channel handles so each drains and closes cleanly.
    drop(outgoing_tx);
    drop(log);

    let _ = processor_thread.join();
    let _ = sender_thread.join();
    let _ = receiver_thread.join();
    let _ = strategy_thread.join();
    let _ = log_thread.join();

    Ok(())
}

/// Resolves the server and connects to the first reachable address of
/// the requested family.
fn connect(
    host: &str,
    port: u16,
    force_ipv4: bool,
    force_ipv6: bool,
) -> Result<TcpStream, Box<dyn std::error::Error>> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()?
        .filter(|addr| {
            if force_ipv4 {
                addr.is_ipv4()
            } else if force_ipv6 {
                addr.is_ipv6()
            } else {
                true
            }
        })
        .collect();
    if addrs.is_empty() {
        return Err(format!("no matching addresses for '{}':{}", host, port).into());
    }

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(format!(
        "Could not connect to '{}':{}: {}",
        host,
        port,
        last_error.expect("at least one address was tried")
    )
    .into())
}
