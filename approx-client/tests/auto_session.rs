//! Integration test: the five client threads against a scripted server

use approx_client::game::{message_processor, ClientShared};
use approx_client::logs::{log_printer, Log};
use approx_client::network::{network_receiver, network_sender};
use approx_client::strategy::auto_strategy;
use approx_shared::Message;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

#[test]
fn auto_strategy_plays_until_scoring() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    // Scripted server: P(x) = x over K=1, so the client should first
    // put 1 at point 1, then 0 at point 0, and stop at SCORING.
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut out = stream;
        let mut line = String::new();

        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "HELLO tester\r\n");
        out.write_all(b"COEFF 0 1\r\n").unwrap();

        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "PUT 1 1.0000000\r\n");
        out.write_all(b"STATE 0.0000000 1.0000000\r\n").unwrap();

        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "PUT 0 0.0000000\r\n");
        out.write_all(b"SCORING tester 0.0000000\r\n").unwrap();
    });

    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();

    let server_info = format!("[{}]:{}", addr.ip(), addr.port());
    let shared = Arc::new(ClientShared::new(true, server_info, "tester"));

    let (incoming_tx, incoming_rx) = mpsc::channel();
    let (outgoing_tx, outgoing_rx) = mpsc::channel();
    let (log_tx, log_rx) = mpsc::channel();
    let log = Log::new(log_tx);

    let log_thread = thread::spawn({
        let shared = Arc::clone(&shared);
        move || log_printer(shared, log_rx)
    });
    let strategy_thread = thread::spawn({
        let shared = Arc::clone(&shared);
        let outgoing = outgoing_tx.clone();
        let log = log.clone();
        move || auto_strategy(shared, outgoing, log)
    });
    let receiver_thread = thread::spawn({
        let shared = Arc::clone(&shared);
        let stream = stream.try_clone().unwrap();
        let log = log.clone();
        move || network_receiver(shared, stream, incoming_tx, log)
    });
    let sender_thread = thread::spawn({
        let shared = Arc::clone(&shared);
        move || network_sender(shared, stream, outgoing_rx)
    });
    let processor_thread = thread::spawn({
        let shared = Arc::clone(&shared);
        let log = log.clone();
        move || message_processor(shared, incoming_rx, log)
    });

    outgoing_tx
        .send(Message::Hello("tester".to_string()))
        .unwrap();
    drop(outgoing_tx);
    drop(log);

    server.join().expect("scripted server finished cleanly");
    processor_thread.join().unwrap();
    sender_thread.join().unwrap();
    receiver_thread.join().unwrap();
    strategy_thread.join().unwrap();
    log_thread.join().unwrap();

    assert!(shared.game_over.load(std::sync::atomic::Ordering::Relaxed));
    let poly = shared.poly.lock().unwrap();
    assert_eq!(poly.k, Some(1));
    assert_eq!(poly.approximation, vec![0.0, 1.0]);
}
