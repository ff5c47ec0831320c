//! Entry point: argument parsing, coefficient file, server startup

use approx_server::game::GameState;
use approx_server::network::Server;
use clap::Parser;
use log::info;
use std::fs::File;
use std::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about = "Polynomial approximation game server", long_about = None)]
struct Args {
    /// Port to listen on (0 lets the system choose)
    #[arg(short = 'p', long, default_value_t = 0)]
    port: u16,

    /// Largest valid abscissa K
    #[arg(
        short = 'k',
        default_value_t = 100,
        value_parser = clap::value_parser!(u64).range(1..=approx_shared::MAX_K as u64)
    )]
    k: u64,

    /// Polynomial degree N
    #[arg(
        short = 'n',
        default_value_t = 4,
        value_parser = clap::value_parser!(u64).range(1..=approx_shared::MAX_N as u64)
    )]
    n: u64,

    /// Number of correct puts that ends a game
    #[arg(
        short = 'm',
        default_value_t = 131,
        value_parser = clap::value_parser!(u64).range(1..=approx_shared::MAX_M)
    )]
    m: u64,

    /// Coefficient file: one COEFF line per new player, consumed in order
    #[arg(short = 'f', long)]
    file: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!(
        "Starting with port={}, k={}, n={}, m={}, file='{}'",
        args.port, args.k, args.n, args.m, args.file
    );

    let coeff_file = File::open(&args.file)
        .map_err(|e| format!("could not open coefficients file {}: {}", args.file, e))?;
    let game = GameState::new(
        args.k as usize,
        args.n as usize,
        args.m,
        Box::new(BufReader::new(coeff_file)),
    );

    let mut server = Server::bind(args.port, game).await?;
    Ok(server.run().await?)
}
