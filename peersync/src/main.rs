//! Entry point: argument parsing, socket setup, node startup

use clap::Parser;
use log::info;
use peersync::clock::NaturalClock;
use peersync::node::Node;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;

#[derive(Parser, Debug)]
#[command(author, version, about = "UDP peer clock synchronization node", long_about = None)]
struct Args {
    /// IPv4 address to bind to (all interfaces when omitted)
    #[arg(short = 'b', long = "bind")]
    bind: Option<Ipv4Addr>,

    /// Port to listen on (0 lets the system choose)
    #[arg(short = 'p', long = "port", default_value_t = 0)]
    port: u16,

    /// Host of a known peer to introduce ourselves to
    #[arg(short = 'a', long = "peer-address", requires = "peer_port")]
    peer_address: Option<String>,

    /// Port of the known peer (must not be 0)
    #[arg(
        short = 'r',
        long = "peer-port",
        requires = "peer_address",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    peer_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let clock = NaturalClock::new();
    let args = Args::parse();

    let bind_ip = args.bind.unwrap_or(Ipv4Addr::UNSPECIFIED);
    let socket = UdpSocket::bind(SocketAddrV4::new(bind_ip, args.port)).await?;
    let local_port = match socket.local_addr()? {
        SocketAddr::V4(addr) => addr.port(),
        SocketAddr::V6(addr) => addr.port(),
    };
    info!("node listening on {}:{}", bind_ip, local_port);

    let my_addresses = own_addresses(bind_ip, local_port)?;
    let known_peer = match (&args.peer_address, args.peer_port) {
        (Some(host), Some(port)) => Some(resolve_peer(host, port).await?),
        _ => None,
    };

    let mut node = Node::new(my_addresses, known_peer, clock);
    node.start_discovery();
    Ok(node.run(socket).await?)
}

/// The set of addresses this node answers on: the bound address, or every
/// IPv4 interface address when bound to the wildcard.
fn own_addresses(
    bind_ip: Ipv4Addr,
    port: u16,
) -> Result<Vec<SocketAddrV4>, Box<dyn std::error::Error>> {
    if !bind_ip.is_unspecified() {
        return Ok(vec![SocketAddrV4::new(bind_ip, port)]);
    }

    let mut addresses = Vec::new();
    for iface in if_addrs::get_if_addrs()? {
        if let IpAddr::V4(ip) = iface.addr.ip() {
            addresses.push(SocketAddrV4::new(ip, port));
        }
    }
    Ok(addresses)
}

/// Resolves the known peer to an IPv4 socket address.
async fn resolve_peer(host: &str, port: u16) -> Result<SocketAddrV4, Box<dyn std::error::Error>> {
    let resolved = tokio::net::lookup_host((host, port))
        .await?
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        });
    resolved.ok_or_else(|| format!("no IPv4 address found for {}", host).into())
}
