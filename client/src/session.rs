//! Client-side view of the conversation with the server.
//!
//! [`ChatSession`] is a pure state machine: it turns each frame read from
//! the server into a [`Reaction`] and never touches a socket, which keeps
//! the protocol rules testable without a network.

use crate::error::ClientError;
use log::debug;
use shared::{ClientCommand, Frame, ServerEvent};

/// What the client should do in response to one server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Send this encoded line back to the server
    Reply(String),
    /// Print this line for the user
    Show(String),
    /// The server announced our own arrival: print the line and start
    /// forwarding terminal input
    Joined(String),
    Ignore,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    base_name: String,
    secret: String,
    /// `None` until the first `NAME_TAKEN:`, then the suffix to try next
    retries: Option<u32>,
    /// Set after answering `AUTH:` until the server confirms with `OK:`
    awaiting_auth: bool,
}

impl ChatSession {
    pub fn new(base_name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            secret: secret.into(),
            retries: None,
            awaiting_auth: false,
        }
    }

    /// The name proposed on the next `WHO:`.
    ///
    /// The bare name comes first, then the name with 0, 1, 2, ... appended.
    pub fn current_name(&self) -> String {
        match self.retries {
            Some(n) => format!("{}{}", self.base_name, n),
            None => self.base_name.clone(),
        }
    }

    pub fn react(&mut self, frame: &Frame) -> Result<Reaction, ClientError> {
        let message = match frame {
            Frame::Line(message) => message,
            Frame::Eof if self.awaiting_auth => return Err(ClientError::Authentication),
            Frame::Eof => return Err(ClientError::Communications),
        };

        let reaction = match ServerEvent::parse(message) {
            Some(ServerEvent::Who) => {
                Reaction::Reply(ClientCommand::Name(self.current_name()).to_line())
            }
            Some(ServerEvent::NameTaken) => {
                self.retries = Some(self.retries.map_or(0, |n| n + 1));
                debug!("Name taken, next attempt is {}", self.current_name());
                Reaction::Ignore
            }
            Some(ServerEvent::Auth) => {
                self.awaiting_auth = true;
                Reaction::Reply(ClientCommand::Auth(self.secret.clone()).to_line())
            }
            Some(ServerEvent::Ok) => {
                self.awaiting_auth = false;
                Reaction::Ignore
            }
            // Any other bare command where OK: was due means the secret was refused.
            _ if self.awaiting_auth && message.len() == 1 => {
                return Err(ClientError::Authentication)
            }
            Some(ServerEvent::Kick) => return Err(ClientError::Kicked),
            Some(ServerEvent::List(names)) => {
                Reaction::Show(format!("(current chatters: {})", names.join(",")))
            }
            Some(ServerEvent::Msg { name, text }) => Reaction::Show(format!("{}: {}", name, text)),
            Some(ServerEvent::Enter(name)) => {
                let line = format!("({} has entered the chat)", name);
                if name == self.current_name() {
                    Reaction::Joined(line)
                } else {
                    Reaction::Show(line)
                }
            }
            Some(ServerEvent::Leave(name)) => Reaction::Show(format!("({} has left the chat)", name)),
            None => {
                debug!("Ignoring unrecognised line {:?}", message);
                Reaction::Ignore
            }
        };

        Ok(reaction)
    }
}
