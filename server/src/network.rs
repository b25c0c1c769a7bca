//! Server network layer: the accept loop and one handler per connection

use crate::commands::{self, Flow};
use crate::handshake::{self, Admitted};
use crate::state::{ServerState, SharedState};
use crate::stats::StatsReport;
use log::{debug, error, info, warn};
use shared::{outbound_queue, write_lines, Frame, LineReader, OUTBOUND_CAPACITY};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

/// How long a closing connection may spend flushing queued lines
const WRITER_LINGER: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
}

/// Settings the server runs with
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// 0 asks the OS for an ephemeral port
    pub port: u16,
    /// Secret every client must present with `AUTH:`
    pub secret: String,
    /// Pause after each processed chat command, per session
    pub throttle: Duration,
    /// Lines queued for one connection before it counts as not reading
    /// and is disconnected
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 0,
            secret: String::new(),
            throttle: Duration::from_millis(100),
            outbound_capacity: OUTBOUND_CAPACITY,
        }
    }
}

/// Chat server owning the listener and the shared session state
pub struct ChatServer {
    listener: TcpListener,
    state: SharedState,
    secret: String,
    throttle: Duration,
    outbound_capacity: usize,
    next_id: AtomicU64,
}

impl ChatServer {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
        info!("Server listening on {}", addr);

        Ok(Self {
            listener,
            state: ServerState::shared(),
            secret: config.secret,
            throttle: config.throttle,
            outbound_capacity: config.outbound_capacity,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Snapshot of every counter, taken under the state lock.
    ///
    /// Safe to call from any task while the server is running.
    pub async fn dump_stats(&self) -> StatsReport {
        self.state.lock().await.report()
    }

    /// Accepts connections forever, spawning one task per connection.
    ///
    /// The accept loop itself never touches the session state. A failed
    /// accept is logged and skipped.
    pub async fn run(self: Arc<Self>) {
        info!("Server started successfully");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_connection(stream, addr).await;
                    });
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("Connection {} accepted from {}", id, addr);

        let (read_half, write_half) = stream.into_split();
        let (outbound, queue) = outbound_queue(self.outbound_capacity);
        let mut writer = tokio::spawn(async move {
            if let Err(e) = write_lines(write_half, queue).await {
                debug!("Writer for connection {} stopped: {}", id, e);
            }
        });

        let mut reader = LineReader::new(read_half);
        match handshake::admit(&mut reader, &outbound, &self.state, &self.secret, id).await {
            Ok(admitted) => self.serve(&mut reader, admitted).await,
            Err(e) => info!("Rejected connection {} from {}: {}", id, addr, e),
        }

        // The writer finishes once every queue handle is gone, after which
        // the socket is closed. A peer that stopped reading would keep it
        // blocked on the socket forever.
        drop(outbound);
        match timeout(WRITER_LINGER, &mut writer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Writer task for connection {} panicked: {}", id, e),
            Err(_) => {
                info!("Connection {} still not reading, dropping queued lines", id);
                writer.abort();
            }
        }
        debug!("Connection {} closed", id);
    }

    /// Reads commands from an active session until it leaves, disconnects
    /// or is kicked.
    async fn serve<R: AsyncRead + Unpin>(&self, reader: &mut LineReader<R>, admitted: Admitted) {
        let Admitted {
            key,
            mut kill_switch,
        } = admitted;

        loop {
            let frame = tokio::select! {
                biased;
                _ = &mut kill_switch => {
                    // Already removed and announced, by a kick or an eviction.
                    info!("{} was disconnected by the server", key.name);
                    return;
                }
                frame = reader.next_frame() => frame,
            };

            let flow = {
                let mut state = self.state.lock().await;
                match frame {
                    Frame::Line(message) => commands::process(&mut state, &key, &message),
                    Frame::Eof => {
                        commands::disconnect(&mut state, &key);
                        Flow::Gone
                    }
                }
            };

            if flow != Flow::Continue {
                debug!("Session {} finished: {:?}", key.name, flow);
                return;
            }

            if !self.throttle.is_zero() {
                sleep(self.throttle).await;
            }
        }
    }
}
