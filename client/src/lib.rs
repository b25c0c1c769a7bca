//! # Chat Client Library
//!
//! Terminal client for the chat server. It answers the server's
//! authentication and naming prompts on its own, prints chat traffic, and
//! forwards lines typed by the user once it has joined.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Pure protocol state machine. Each frame read from the server becomes a
//! [`session::Reaction`]: a reply to send, a line to print, the signal that
//! the client has joined, or an error that ends the run.
//!
//! ### Input Module (`input`)
//! Turns typed lines into protocol commands. Plain text is sent as
//! `SAY:<text>`; a line starting with `*` is sent verbatim as a raw command,
//! and `*LEAVE:` leaves the chat.
//!
//! ### Network Module (`network`)
//! Owns the TCP connection, a writer task draining the outbound queue, and
//! the task forwarding terminal input.
//!
//! ### Error Module (`error`)
//! [`error::ClientError`] and the process exit code for each outcome.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClientConfig {
//!         name: "bob".to_string(),
//!         secret: "opensesame".to_string(),
//!         host: "localhost".to_string(),
//!         port: 4000,
//!     };
//!
//!     let outcome = match Client::connect(config).await {
//!         Ok(client) => client.run(tokio::io::stdin(), &mut tokio::io::stdout()).await,
//!         Err(e) => Err(e),
//!     };
//!     if let Err(e) = outcome {
//!         eprintln!("{}", e);
//!         std::process::exit(e.exit_code());
//!     }
//! }
//! ```

pub mod error;
pub mod input;
pub mod network;
pub mod session;
