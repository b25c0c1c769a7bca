//! Integration tests for the chat server and client
//!
//! These tests run a real server on a loopback port and talk to it over TCP,
//! either with raw protocol lines or through the client library.

use server::network::{ChatServer, ServerConfig};
use shared::LineReader;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

const SECRET: &str = "letmein";
const PATIENCE: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(150);

async fn start_server() -> (Arc<ChatServer>, SocketAddr) {
    start_server_with_queue(shared::OUTBOUND_CAPACITY).await
}

async fn start_server_with_queue(outbound_capacity: usize) -> (Arc<ChatServer>, SocketAddr) {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret: SECRET.to_string(),
        throttle: Duration::ZERO,
        outbound_capacity,
    };
    let server = Arc::new(ChatServer::bind(config).await.expect("Failed to bind server"));
    let addr = server.local_addr().unwrap();
    tokio::spawn(Arc::clone(&server).run());
    (server, addr)
}

/// A raw protocol connection driven line by line
struct TestPeer {
    lines: LineReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestPeer {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Failed to connect");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: LineReader::new(read_half),
            writer,
        }
    }

    /// Connects, authenticates and joins as `name`, consuming the peer's
    /// own `ENTER` broadcast.
    async fn join(addr: SocketAddr, name: &str) -> Self {
        let mut peer = Self::connect(addr).await;
        peer.expect("AUTH:").await;
        peer.send(&format!("AUTH:{}", SECRET)).await;
        peer.expect("OK:").await;
        peer.expect("WHO:").await;
        peer.send(&format!("NAME:{}", name)).await;
        peer.expect("OK:").await;
        peer.expect(&format!("ENTER:{}", name)).await;
        peer
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .expect("Failed to send");
    }

    async fn recv(&mut self) -> Option<String> {
        timeout(PATIENCE, self.lines.read_line())
            .await
            .expect("Timed out waiting for the server")
    }

    async fn expect(&mut self, line: &str) {
        assert_eq!(self.recv().await.as_deref(), Some(line));
    }

    async fn expect_closed(&mut self) {
        assert_eq!(self.recv().await, None);
    }

    async fn expect_quiet(&mut self) {
        if let Ok(line) = timeout(QUIET, self.lines.read_line()).await {
            panic!("Expected no traffic, got {:?}", line);
        }
    }
}

/// Extracts the sequence number from `MSG:<speaker>:<n>`.
fn numbered(line: &str, speaker: &str) -> Option<usize> {
    line.strip_prefix(&format!("MSG:{}:", speaker))?.parse().ok()
}

fn assert_consecutive(heard: &[usize], who: &str) {
    for pair in heard.windows(2) {
        assert_eq!(pair[1], pair[0] + 1, "{} heard {:?}", who, heard);
    }
}

/// END-TO-END SCENARIOS
mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn handshake_announces_arrival() {
        let (_server, addr) = start_server().await;
        let mut alice = TestPeer::connect(addr).await;

        alice.expect("AUTH:").await;
        alice.send("AUTH:letmein").await;
        alice.expect("OK:").await;
        alice.expect("WHO:").await;
        alice.send("NAME:alice").await;
        alice.expect("OK:").await;
        alice.expect("ENTER:alice").await;
    }

    #[tokio::test]
    async fn taken_name_is_refused_until_free() {
        let (_server, addr) = start_server().await;
        let mut alice = TestPeer::join(addr, "alice").await;

        let mut bob = TestPeer::connect(addr).await;
        bob.expect("AUTH:").await;
        bob.send("AUTH:letmein").await;
        bob.expect("OK:").await;
        bob.expect("WHO:").await;
        bob.send("NAME:alice").await;
        bob.expect("NAME_TAKEN:").await;
        bob.expect("WHO:").await;
        bob.send("NAME:bob2").await;
        bob.expect("OK:").await;
        bob.expect("ENTER:bob2").await;

        alice.expect("ENTER:bob2").await;
    }

    #[tokio::test]
    async fn say_reaches_everyone_and_counts() {
        let (server, addr) = start_server().await;
        let mut alice = TestPeer::join(addr, "alice").await;
        let mut bob = TestPeer::join(addr, "bob").await;
        alice.expect("ENTER:bob").await;

        alice.send("SAY:hello").await;

        alice.expect("MSG:alice:hello").await;
        bob.expect("MSG:alice:hello").await;
        let report = server.dump_stats().await;
        let alice_stats = report
            .clients
            .iter()
            .find(|(name, _)| name == "alice")
            .map(|(_, stats)| stats.say);
        assert_eq!(alice_stats, Some(1));
    }

    #[tokio::test]
    async fn kick_removes_other_session() {
        let (_server, addr) = start_server().await;
        let mut alice = TestPeer::join(addr, "alice").await;
        let mut bob = TestPeer::join(addr, "bob").await;
        alice.expect("ENTER:bob").await;

        alice.send("KICK:bob").await;

        bob.expect("KICK:").await;
        bob.expect_closed().await;
        alice.expect("LEAVE:bob").await;

        alice.send("LIST:").await;
        alice.expect("LIST:alice").await;
    }
}

/// KICK AND LEAVE SEMANTICS
mod departure_tests {
    use super::*;

    #[tokio::test]
    async fn self_kick_notifies_once() {
        let (_server, addr) = start_server().await;
        let mut alice = TestPeer::join(addr, "alice").await;
        let mut bob = TestPeer::join(addr, "bob").await;
        alice.expect("ENTER:bob").await;

        bob.send("KICK:bob").await;

        bob.expect("KICK:").await;
        bob.expect_closed().await;
        alice.expect("LEAVE:bob").await;
        alice.expect_quiet().await;
    }

    #[tokio::test]
    async fn kicking_unknown_name_is_silent() {
        let (server, addr) = start_server().await;
        let mut alice = TestPeer::join(addr, "alice").await;

        alice.send("KICK:ghost").await;
        alice.send("LIST:").await;

        alice.expect("LIST:alice").await;
        assert_eq!(server.dump_stats().await.server.kicks, 1);
    }

    #[tokio::test]
    async fn leave_closes_connection_and_broadcasts_once() {
        let (server, addr) = start_server().await;
        let mut alice = TestPeer::join(addr, "alice").await;
        let mut bob = TestPeer::join(addr, "bob").await;
        alice.expect("ENTER:bob").await;

        bob.send("LEAVE:").await;
        bob.send("LEAVE:").await;

        bob.expect_closed().await;
        alice.expect("LEAVE:bob").await;
        alice.expect_quiet().await;
        assert_eq!(server.dump_stats().await.server.leaves, 1);
    }

    #[tokio::test]
    async fn abrupt_disconnect_counts_as_leave() {
        let (server, addr) = start_server().await;
        let mut alice = TestPeer::join(addr, "alice").await;
        let bob = TestPeer::join(addr, "bob").await;
        alice.expect("ENTER:bob").await;

        drop(bob);

        alice.expect("LEAVE:bob").await;
        alice.send("LIST:").await;
        alice.expect("LIST:alice").await;
        assert_eq!(server.dump_stats().await.server.leaves, 0);
    }

    #[tokio::test]
    async fn name_is_reusable_after_kick() {
        let (_server, addr) = start_server().await;
        let mut alice = TestPeer::join(addr, "alice").await;
        let mut bob = TestPeer::join(addr, "bob").await;
        alice.expect("ENTER:bob").await;

        alice.send("KICK:bob").await;
        bob.expect("KICK:").await;
        alice.expect("LEAVE:bob").await;

        let _bob_again = TestPeer::join(addr, "bob").await;
        alice.expect("ENTER:bob").await;
        alice.send("LIST:").await;
        alice.expect("LIST:alice,bob").await;
    }
}

/// BROADCASTS UNDER LOAD
mod broadcast_tests {
    use super::*;

    #[tokio::test]
    async fn broadcasts_stay_whole_while_peers_come_and_go() {
        const BURST: usize = 400;
        let (_server, addr) = start_server().await;
        let mut speaker = TestPeer::join(addr, "speaker").await;

        let mut visitors = Vec::new();
        for i in 0..6usize {
            visitors.push(tokio::spawn(async move {
                let name = format!("visitor{}", i);
                let mut peer = TestPeer::join(addr, &name).await;
                let mut heard = Vec::new();
                let mut left = false;

                loop {
                    let line = if left {
                        peer.recv().await
                    } else {
                        match timeout(QUIET, peer.lines.read_line()).await {
                            Ok(line) => line,
                            Err(_) => {
                                peer.send("LEAVE:").await;
                                left = true;
                                continue;
                            }
                        }
                    };
                    let Some(line) = line else { break };
                    if let Some(n) = numbered(&line, "speaker") {
                        heard.push(n);
                    }
                    if !left && heard.len() >= 10 + i * 15 {
                        peer.send("LEAVE:").await;
                        left = true;
                    }
                }
                (name, heard)
            }));
        }

        for chunk in (0..BURST).collect::<Vec<_>>().chunks(20) {
            let lines: String = chunk.iter().map(|n| format!("SAY:{}\n", n)).collect();
            speaker.writer.write_all(lines.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let mut heard = Vec::new();
        while heard.len() < BURST {
            let line = speaker.recv().await.expect("Speaker was disconnected");
            if let Some(n) = numbered(&line, "speaker") {
                heard.push(n);
            }
        }
        assert_eq!(heard, (0..BURST).collect::<Vec<_>>());

        for visitor in visitors {
            let (name, heard) = timeout(PATIENCE * 2, visitor).await.unwrap().unwrap();
            assert_consecutive(&heard, &name);
        }
    }

    #[tokio::test]
    async fn peer_that_stops_reading_is_disconnected() {
        let (server, addr) = start_server_with_queue(32).await;
        let _idle = TestPeer::join(addr, "idle").await;
        let talker = TestPeer::join(addr, "talker").await;
        let TestPeer { mut lines, mut writer } = talker;

        let padding = "x".repeat(8 * 1024);
        let flood = tokio::spawn(async move {
            for _ in 0..4_000 {
                let line = format!("SAY:{}\n", padding);
                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
            writer
        });

        let evicted = timeout(Duration::from_secs(30), async {
            while let Some(line) = lines.read_line().await {
                if line == "LEAVE:idle" {
                    return true;
                }
            }
            false
        })
        .await
        .expect("Idle peer was never disconnected");
        flood.abort();

        assert!(evicted, "Talker lost its connection before the idle peer did");
        let report = server.dump_stats().await;
        assert!(report.clients.iter().all(|(name, _)| name != "idle"));
        assert_eq!(report.server.leaves, 0);
    }
}

/// ADMISSION AND PROTOCOL EDGE CASES
mod admission_tests {
    use super::*;

    #[tokio::test]
    async fn wrong_secret_is_disconnected_silently() {
        let (server, addr) = start_server().await;
        let mut alice = TestPeer::join(addr, "alice").await;

        let mut intruder = TestPeer::connect(addr).await;
        intruder.expect("AUTH:").await;
        intruder.send("AUTH:guess").await;
        intruder.expect_closed().await;

        alice.expect_quiet().await;
        assert_eq!(server.dump_stats().await.server.connections, 1);
    }

    #[tokio::test]
    async fn unexpected_name_reply_is_rejected() {
        let (_server, addr) = start_server().await;
        let mut peer = TestPeer::connect(addr).await;

        peer.expect("AUTH:").await;
        peer.send("AUTH:letmein").await;
        peer.expect("OK:").await;
        peer.expect("WHO:").await;
        peer.send("SAY:hi").await;
        peer.expect_closed().await;
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let (_server, addr) = start_server().await;
        let mut peers = Vec::new();
        for name in ["mallory", "Zed", "carol", "alice"] {
            peers.push(TestPeer::join(addr, name).await);
        }
        let mut mallory = peers.remove(0);

        mallory.send("LIST:").await;
        loop {
            let line = mallory.recv().await.expect("Connection closed early");
            if line.starts_with("LIST:") {
                assert_eq!(line, "LIST:Zed,alice,carol,mallory");
                break;
            }
        }
    }

    #[tokio::test]
    async fn malformed_commands_are_ignored() {
        let (server, addr) = start_server().await;
        let mut alice = TestPeer::join(addr, "alice").await;

        for line in ["", "HELLO", "SAY:", "SAY:a:b", "KICK:", "LIST:x", "NAME:eve"] {
            alice.send(line).await;
        }
        alice.send("LIST:").await;

        alice.expect("LIST:alice").await;
        let stats = server.dump_stats().await.server;
        assert_eq!((stats.says, stats.kicks, stats.lists), (0, 0, 1));
    }
}

/// STATISTICS
mod stats_tests {
    use super::*;

    #[tokio::test]
    async fn stats_dump_format() {
        let (server, addr) = start_server().await;
        let mut alice = TestPeer::join(addr, "alice").await;
        let mut bob = TestPeer::join(addr, "bob").await;
        alice.expect("ENTER:bob").await;

        alice.send("SAY:hi").await;
        alice.expect("MSG:alice:hi").await;
        bob.expect("MSG:alice:hi").await;
        bob.send("LIST:").await;
        bob.expect("LIST:alice,bob").await;

        assert_eq!(
            server.dump_stats().await.to_string(),
            "@CLIENTS@\n\
             alice:SAY:1:KICK:0:LIST:0\n\
             bob:SAY:0:KICK:0:LIST:1\n\
             @SERVER@\n\
             server:AUTH:2:NAME:2:SAY:1:KICK:0:LIST:1:LEAVE:0\n"
        );
    }
}

/// CLIENT LIBRARY AGAINST A REAL SERVER
mod client_tests {
    use super::*;
    use client::error::ClientError;
    use client::network::{Client, ClientConfig};

    fn client_config(addr: SocketAddr, name: &str, secret: &str) -> ClientConfig {
        ClientConfig {
            name: name.to_string(),
            secret: secret.to_string(),
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }

    #[tokio::test]
    async fn client_retries_taken_name() {
        let (_server, addr) = start_server().await;
        let mut bob = TestPeer::join(addr, "bob").await;

        let client = Client::connect(client_config(addr, "bob", SECRET)).await.unwrap();
        let (mut terminal, input) = tokio::io::duplex(64);
        terminal.write_all(b"hi all\n*LEAVE:\n").await.unwrap();

        let mut output = Vec::new();
        assert_eq!(client.run(input, &mut output).await, Ok(()));

        bob.expect("ENTER:bob0").await;
        bob.expect("MSG:bob0:hi all").await;
        bob.expect("LEAVE:bob0").await;
    }

    #[tokio::test]
    async fn client_reports_bad_secret() {
        let (_server, addr) = start_server().await;

        let client = Client::connect(client_config(addr, "eve", "guess")).await.unwrap();
        let (_terminal, input) = tokio::io::duplex(64);

        let mut output = Vec::new();
        assert_eq!(
            client.run(input, &mut output).await,
            Err(ClientError::Authentication)
        );
    }

    #[tokio::test]
    async fn client_reports_kick() {
        let (_server, addr) = start_server().await;
        let mut alice = TestPeer::join(addr, "alice").await;

        let client = Client::connect(client_config(addr, "bob", SECRET)).await.unwrap();
        let (_terminal, input) = tokio::io::duplex(64);
        let run = tokio::spawn(async move {
            let mut output = Vec::new();
            let result = client.run(input, &mut output).await;
            (result, String::from_utf8(output).unwrap())
        });

        alice.expect("ENTER:bob").await;
        alice.send("SAY:bye bob").await;
        alice.expect("MSG:alice:bye bob").await;
        alice.send("KICK:bob").await;
        alice.expect("LEAVE:bob").await;

        let (result, output) = timeout(PATIENCE, run).await.unwrap().unwrap();
        assert_eq!(result, Err(ClientError::Kicked));
        assert_eq!(output, "(bob has entered the chat)\nalice: bye bob\n");
    }
}
