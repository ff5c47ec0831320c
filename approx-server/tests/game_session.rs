//! Integration tests running a live server over real TCP connections

use approx_server::game::GameState;
use approx_server::network::Server;
use approx_shared::LineBuffer;
use std::io::Cursor;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Starts a server on an ephemeral port and runs it in the background.
async fn start_server(k: usize, n: usize, m: u64, coeff_lines: &str) -> SocketAddr {
    let game = GameState::new(k, n, m, Box::new(Cursor::new(coeff_lines.to_string())));
    let mut server = Server::bind(0, game).await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn connect(addr: SocketAddr) -> Client {
    let host: &str = if addr.is_ipv6() { "::1" } else { "127.0.0.1" };
    let stream = TcpStream::connect((host, addr.port())).await.unwrap();
    Client { stream, lines: LineBuffer::new() }
}

struct Client {
    stream: TcpStream,
    lines: LineBuffer,
}

impl Client {
    async fn send(&mut self, line: &str) {
        self.stream
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
    }

    /// Reads the next CRLF line, waiting up to `wait`.
    async fn next_line(&mut self, wait: Duration) -> String {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(line) = self.lines.next_line() {
                return String::from_utf8(line).unwrap();
            }
            let mut chunk = [0u8; 1024];
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let n = timeout(remaining, self.stream.read(&mut chunk))
                .await
                .expect("no line before timeout")
                .unwrap();
            assert!(n > 0, "server closed the connection");
            self.lines.extend(&chunk[..n]);
        }
    }

    /// Waits until the server closes the connection.
    async fn expect_close(&mut self, wait: Duration) {
        let deadline = tokio::time::Instant::now() + wait;
        let mut chunk = [0u8; 1024];
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let n = timeout(remaining, self.stream.read(&mut chunk))
                .await
                .expect("connection not closed before timeout")
                .unwrap_or(0);
            if n == 0 {
                return;
            }
            self.lines.extend(&chunk[..n]);
        }
    }
}

#[tokio::test]
async fn hello_gets_the_next_coefficient_line() {
    let addr = start_server(10, 1, 100, "COEFF 1 2\r\nCOEFF 3 4\r\n").await;

    let mut first = connect(addr).await;
    first.send("HELLO A").await;
    assert_eq!(
        first.next_line(Duration::from_secs(5)).await,
        "COEFF 1.0000000 2.0000000"
    );

    let mut second = connect(addr).await;
    second.send("HELLO B").await;
    assert_eq!(
        second.next_line(Duration::from_secs(5)).await,
        "COEFF 3.0000000 4.0000000"
    );
}

#[tokio::test]
async fn final_put_is_answered_with_sorted_scoring() {
    // K=2, N=1, M=1; P(x) = 1 + 2x. One put of 3 at 0 ends the game:
    // score = (1-3)² + 3² + 5² = 38.
    let addr = start_server(2, 1, 1, "COEFF 1 2\r\n").await;

    let mut client = connect(addr).await;
    client.send("HELLO A").await;
    client.next_line(Duration::from_secs(5)).await;

    client.send("PUT 0 3").await;
    assert_eq!(
        client.next_line(Duration::from_secs(5)).await,
        "SCORING A 38.0000000"
    );
    client.expect_close(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn out_of_range_put_gets_a_delayed_bad_put() {
    let addr = start_server(10, 1, 100, "COEFF 1 2\r\n").await;

    let mut client = connect(addr).await;
    client.send("HELLO A").await;
    client.next_line(Duration::from_secs(5)).await;

    client.send("PUT 15 0").await;
    // The reply is scheduled one second out.
    assert_eq!(
        client.next_line(Duration::from_secs(5)).await,
        "BAD_PUT 15 0.0000000"
    );
}

#[tokio::test]
async fn state_reply_is_delayed_by_lowercase_letters() {
    let addr = start_server(3, 1, 100, "COEFF 0 1\r\n").await;

    // "A" has no lowercase letters: the STATE reply is immediate.
    let mut client = connect(addr).await;
    client.send("HELLO A").await;
    client.next_line(Duration::from_secs(5)).await;

    client.send("PUT 1 1").await;
    assert_eq!(
        client.next_line(Duration::from_secs(5)).await,
        "STATE 0.0000000 1.0000000 0.0000000 0.0000000"
    );
}

#[tokio::test]
async fn first_message_other_than_hello_disconnects() {
    let addr = start_server(10, 1, 100, "COEFF 1 2\r\n").await;

    let mut client = connect(addr).await;
    client.send("PUT 1 1").await;
    client.expect_close(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn silent_client_is_dropped_after_hello_wait() {
    let addr = start_server(10, 1, 100, "COEFF 1 2\r\n").await;

    let mut client = connect(addr).await;
    // Say nothing; the three-second hello wait must fire.
    client.expect_close(Duration::from_secs(8)).await;
}

#[tokio::test]
async fn early_put_is_penalized_immediately() {
    // "abc" has three lowercase letters, so the STATE reply lags and
    // the second put lands while the first is unanswered.
    let addr = start_server(10, 1, 100, "COEFF 1 2\r\n").await;

    let mut client = connect(addr).await;
    client.send("HELLO abc").await;
    client.next_line(Duration::from_secs(5)).await;

    client.send("PUT 0 1").await;
    client.send("PUT 1 2").await;
    assert_eq!(
        client.next_line(Duration::from_secs(2)).await,
        "PENALTY 1 2.0000000"
    );
}
