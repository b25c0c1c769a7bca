//! Terminal input handling: turns typed lines into protocol commands

use log::{debug, info};
use shared::{ClientCommand, LineReader, Outbound};
use tokio::io::AsyncRead;
use tokio::sync::oneshot;

/// What a single line of terminal input asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Send this encoded line to the server
    Send(String),
    /// Send `LEAVE:` and stop
    Leave,
}

/// How input forwarding ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEnd {
    /// Terminal input reached end of file
    Closed,
    /// The user typed `*LEAVE:`
    Left,
    /// The conversation ended before the client joined the chat
    NeverJoined,
}

/// Maps a typed line to an action.
///
/// A leading `*` sends the rest of the line verbatim as a raw protocol
/// command. Anything else is chat text.
pub fn translate(line: &str) -> InputAction {
    match line.strip_prefix('*') {
        Some(raw) if raw == "LEAVE:" => InputAction::Leave,
        Some(raw) => InputAction::Send(format!("{}\n", raw)),
        None => InputAction::Send(ClientCommand::Say(line.to_string()).to_line()),
    }
}

/// Forwards terminal lines to the server once `gate` opens.
///
/// The gate opens when the server announces this client's own arrival, so
/// nothing typed during the handshake is interleaved with it.
pub async fn forward_input<R: AsyncRead + Unpin>(
    input: R,
    outbound: Outbound,
    gate: oneshot::Receiver<()>,
) -> InputEnd {
    if gate.await.is_err() {
        return InputEnd::NeverJoined;
    }
    debug!("Forwarding terminal input");

    let mut lines = LineReader::new(input);
    while let Some(line) = lines.read_line().await {
        let encoded = match translate(&line) {
            InputAction::Send(encoded) => encoded,
            InputAction::Leave => {
                info!("Leaving the chat");
                if outbound.send(ClientCommand::Leave.to_line()).await.is_err() {
                    debug!("Connection closed before LEAVE could be sent");
                }
                return InputEnd::Left;
            }
        };
        if outbound.send(encoded).await.is_err() {
            debug!("Connection closed, no longer forwarding input");
            break;
        }
    }

    InputEnd::Closed
}
