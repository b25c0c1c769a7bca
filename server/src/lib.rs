//! # Chat Server Library
//!
//! This library provides the server side of a multi-user text chat spoken
//! over TCP. Clients authenticate with a shared secret, negotiate a unique
//! display name, and then exchange chat lines that the server fans out to
//! everyone currently in the room.
//!
//! ## Core Responsibilities
//!
//! ### Admission
//! Every accepted connection is challenged for the secret and then asked
//! for a name until it proposes one nobody holds. Only connections that get
//! through both steps are ever visible to other participants.
//!
//! ### Session Tracking
//! The registry is the authoritative list of who is in the chat. Names are
//! unique and kept in lexicographic order, which is the order `LIST`
//! replies and broadcasts use.
//!
//! ### Broadcasting
//! Chat messages, arrivals and departures are queued to every registered
//! session while the state lock is held, so each broadcast reaches exactly
//! the sessions present at that instant.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! The accept loop spawns one reader task per connection plus a writer task
//! that drains the connection's outbound queue onto the socket. The reader
//! never writes to a socket itself, so the state lock is never held across
//! network I/O.
//!
//! ### Single Lock
//! Registry and counters live together in [`state::ServerState`] behind one
//! `tokio::sync::Mutex`. Joins, leaves, kicks, broadcasts and statistics
//! dumps are all serialized by it.
//!
//! ### Kicking
//! Each session owns a `oneshot` kill switch. Kicking another session
//! removes it from the registry, queues `KICK:` for it, and fires the
//! switch so its handler abandons the pending read.
//!
//! ## Module Organization
//!
//! - `registry`: name-keyed session storage with unique, ordered names
//! - `handshake`: authentication and name negotiation
//! - `commands`: post-handshake `SAY`, `KICK`, `LEAVE` and `LIST` handling
//! - `stats`: per-session and server-wide counters and the stats report
//! - `state`: the shared state guarded by the server lock
//! - `network`: listener, accept loop and per-connection handler
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{ChatServer, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         secret: "opensesame".to_string(),
//!         ..ServerConfig::default()
//!     };
//!     let server = Arc::new(ChatServer::bind(config).await?);
//!     eprintln!("{}", server.local_addr()?.port());
//!
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod handshake;
pub mod network;
pub mod registry;
pub mod state;
pub mod stats;
