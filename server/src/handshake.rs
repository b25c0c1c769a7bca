//! Authentication and name negotiation for a freshly accepted connection.
//!
//! A connection moves through these phases:
//!
//! ```text
//! connected -> authenticating -> negotiating name -> active
//!                   |                   |
//!                   +----> rejected <---+
//! ```
//!
//! Only a connection that reaches `active` is ever added to the registry,
//! so a rejected connection never produces an `ENTER` or `LEAVE`
//! broadcast. The state lock is taken only around counter updates and the
//! registry insert, never while waiting for the client to answer.

use crate::registry::{RegistryError, Session, SessionKey};
use crate::state::ServerState;
use log::{debug, info};
use shared::{ClientCommand, Frame, LineReader, Outbound, ServerEvent};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::{oneshot, Mutex};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("expected a NAME reply, got {0:?}")]
    UnexpectedReply(String),
    #[error("connection closed during handshake")]
    Disconnected,
}

/// A connection that completed the handshake and is now registered.
#[derive(Debug)]
pub struct Admitted {
    pub key: SessionKey,
    /// Resolves when another session kicks this one
    pub kill_switch: oneshot::Receiver<()>,
}

/// Runs the whole handshake for connection `id`.
pub async fn admit<R: AsyncRead + Unpin>(
    reader: &mut LineReader<R>,
    outbound: &Outbound,
    state: &Mutex<ServerState>,
    secret: &str,
    id: u64,
) -> Result<Admitted, HandshakeError> {
    authenticate(reader, outbound, state, secret).await?;
    negotiate_name(reader, outbound, state, id).await
}

/// Challenges the client for the shared secret.
///
/// Anything other than exactly `AUTH:<secret>` rejects the connection.
pub async fn authenticate<R: AsyncRead + Unpin>(
    reader: &mut LineReader<R>,
    outbound: &Outbound,
    state: &Mutex<ServerState>,
    secret: &str,
) -> Result<(), HandshakeError> {
    send(outbound, &ServerEvent::Auth);

    let message = match reader.next_frame().await {
        Frame::Line(message) => message,
        Frame::Eof => return Err(HandshakeError::Disconnected),
    };
    match ClientCommand::parse(&message) {
        Some(ClientCommand::Auth(offered)) if offered == secret => {}
        _ => return Err(HandshakeError::AuthenticationFailed),
    }

    state.lock().await.stats.connections += 1;
    send(outbound, &ServerEvent::Ok);
    Ok(())
}

/// Asks for a name until the client proposes one nobody holds.
///
/// There is no limit on retries. On success the client gets `OK:` and every
/// session, the new one included, gets `ENTER:<name>`, all under the same
/// lock that made the insert.
pub async fn negotiate_name<R: AsyncRead + Unpin>(
    reader: &mut LineReader<R>,
    outbound: &Outbound,
    state: &Mutex<ServerState>,
    id: u64,
) -> Result<Admitted, HandshakeError> {
    loop {
        send(outbound, &ServerEvent::Who);

        let message = match reader.next_frame().await {
            Frame::Line(message) => message,
            Frame::Eof => return Err(HandshakeError::Disconnected),
        };
        let proposed = match ClientCommand::parse(&message) {
            Some(ClientCommand::Name(name)) => name,
            _ => return Err(HandshakeError::UnexpectedReply(message.to_string())),
        };

        let mut state = state.lock().await;
        state.stats.names += 1;

        let (kill_switch, killed) = oneshot::channel();
        let session = Session::new(id, proposed.clone(), outbound.clone(), kill_switch);
        match state.registry.insert(session) {
            Ok(()) => {
                send(outbound, &ServerEvent::Ok);
                state.broadcast(&ServerEvent::Enter(proposed.clone()).to_line());
                println!("({} has entered the chat)", proposed);
                return Ok(Admitted {
                    key: SessionKey { id, name: proposed },
                    kill_switch: killed,
                });
            }
            Err(RegistryError::NameConflict(name)) => {
                debug!("Connection {} asked for taken name {}", id, name);
                send(outbound, &ServerEvent::NameTaken);
            }
            // `Registry::insert` only ever fails with `NameConflict`.
            Err(RegistryError::Backlogged(_)) => unreachable!("insert never reports a backlog"),
        }
    }
}

fn send(outbound: &Outbound, event: &ServerEvent) {
    if let Err(e) = outbound.try_send(event.to_line()) {
        info!("Could not queue {:?}: {}", event, e);
    }
}
