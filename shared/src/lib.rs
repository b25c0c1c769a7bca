//! Wire protocol shared by the chat server and client.
//!
//! Every protocol message is a single newline-terminated line whose fields
//! are joined by `:`. The first field is the command tag, the rest are its
//! arguments. Fields are never escaped, so chat text containing `:` or a
//! newline does not survive the trip intact.

use log::debug;
use std::fmt;
use std::path::Path;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

pub const DELIMITER: char = ':';
pub const LIST_SEPARATOR: char = ',';

pub const WHO: &str = "WHO";
pub const AUTH: &str = "AUTH";
pub const OK: &str = "OK";
pub const NAME: &str = "NAME";
pub const NAME_TAKEN: &str = "NAME_TAKEN";
pub const KICK: &str = "KICK";
pub const ENTER: &str = "ENTER";
pub const LEAVE: &str = "LEAVE";
pub const MSG: &str = "MSG";
pub const SAY: &str = "SAY";
pub const LIST: &str = "LIST";

/// Lines a connection may have queued but not yet written.
pub const OUTBOUND_CAPACITY: usize = 1024;

/// Queue of encoded lines waiting to be written to one connection.
///
/// The queue is bounded, so a peer that stops reading cannot make its
/// sender buffer without limit.
pub type Outbound = mpsc::Sender<String>;

/// Creates a connection's outbound queue.
pub fn outbound_queue(capacity: usize) -> (Outbound, mpsc::Receiver<String>) {
    mpsc::channel(capacity.max(1))
}

/// Encodes a command and its arguments into one protocol line.
///
/// The command is always followed by the delimiter, so argument-less
/// commands come out as `WHO:\n`. Arguments are not validated.
pub fn encode(command: &str, args: &[&str]) -> String {
    format!("{}{}{}\n", command, DELIMITER, args.join(":"))
}

/// Splits a received line (without its newline) into terms.
///
/// Empty fields are skipped, so `AUTH:` has a single term and an empty line
/// has none. Decoding never fails; callers reject term lists of the wrong
/// shape.
pub fn decode(line: &str) -> Message {
    Message {
        terms: line
            .split(DELIMITER)
            .filter(|term| !term.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// A decoded protocol line: the command tag followed by its arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    terms: Vec<String>,
}

impl Message {
    pub fn new(command: &str, args: &[&str]) -> Self {
        let mut terms = Vec::with_capacity(args.len() + 1);
        terms.push(command.to_string());
        terms.extend(args.iter().map(|arg| arg.to_string()));
        Self { terms }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn command(&self) -> Option<&str> {
        self.terms.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.terms.get(1..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Returns true if this message is exactly `command` with `arity` terms
    /// in total (tag included).
    pub fn is(&self, command: &str, arity: usize) -> bool {
        self.terms.len() == arity && self.command() == Some(command)
    }

    pub fn encode(&self) -> String {
        match self.terms.split_first() {
            Some((command, args)) => {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                encode(command, &args)
            }
            None => "\n".to_string(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.terms.join(":"))
    }
}

/// Commands a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Auth(String),
    Name(String),
    Say(String),
    Kick(String),
    Leave,
    List,
}

impl ClientCommand {
    /// Matches a message against the exact tag and arity of each command.
    pub fn parse(message: &Message) -> Option<Self> {
        let arg = || message.args()[0].clone();
        match message.command()? {
            AUTH if message.len() == 2 => Some(ClientCommand::Auth(arg())),
            NAME if message.len() == 2 => Some(ClientCommand::Name(arg())),
            SAY if message.len() == 2 => Some(ClientCommand::Say(arg())),
            KICK if message.len() == 2 => Some(ClientCommand::Kick(arg())),
            LEAVE if message.len() == 1 => Some(ClientCommand::Leave),
            LIST if message.len() == 1 => Some(ClientCommand::List),
            _ => None,
        }
    }

    pub fn to_line(&self) -> String {
        match self {
            ClientCommand::Auth(secret) => encode(AUTH, &[secret.as_str()]),
            ClientCommand::Name(name) => encode(NAME, &[name.as_str()]),
            ClientCommand::Say(text) => encode(SAY, &[text.as_str()]),
            ClientCommand::Kick(target) => encode(KICK, &[target.as_str()]),
            ClientCommand::Leave => encode(LEAVE, &[]),
            ClientCommand::List => encode(LIST, &[]),
        }
    }
}

/// Messages the server sends to a client, either as handshake prompts,
/// direct replies, or broadcasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Who,
    Auth,
    Ok,
    NameTaken,
    Kick,
    Enter(String),
    Leave(String),
    Msg { name: String, text: String },
    List(Vec<String>),
}

impl ServerEvent {
    pub fn parse(message: &Message) -> Option<Self> {
        let args = message.args();
        match message.command()? {
            WHO if message.len() == 1 => Some(ServerEvent::Who),
            AUTH if message.len() == 1 => Some(ServerEvent::Auth),
            OK if message.len() == 1 => Some(ServerEvent::Ok),
            NAME_TAKEN if message.len() == 1 => Some(ServerEvent::NameTaken),
            KICK if message.len() == 1 => Some(ServerEvent::Kick),
            ENTER if message.len() == 2 => Some(ServerEvent::Enter(args[0].clone())),
            LEAVE if message.len() == 2 => Some(ServerEvent::Leave(args[0].clone())),
            MSG if message.len() == 3 => Some(ServerEvent::Msg {
                name: args[0].clone(),
                text: args[1].clone(),
            }),
            LIST if message.len() == 2 => Some(ServerEvent::List(
                args[0].split(LIST_SEPARATOR).map(str::to_string).collect(),
            )),
            _ => None,
        }
    }

    pub fn to_line(&self) -> String {
        match self {
            ServerEvent::Who => encode(WHO, &[]),
            ServerEvent::Auth => encode(AUTH, &[]),
            ServerEvent::Ok => encode(OK, &[]),
            ServerEvent::NameTaken => encode(NAME_TAKEN, &[]),
            ServerEvent::Kick => encode(KICK, &[]),
            ServerEvent::Enter(name) => encode(ENTER, &[name.as_str()]),
            ServerEvent::Leave(name) => encode(LEAVE, &[name.as_str()]),
            ServerEvent::Msg { name, text } => encode(MSG, &[name.as_str(), text.as_str()]),
            ServerEvent::List(names) => {
                let joined = names.join(&LIST_SEPARATOR.to_string());
                encode(LIST, &[joined.as_str()])
            }
        }
    }
}

/// One unit read off a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(Message),
    /// The peer went away: end of stream, a read error, or a trailing
    /// partial line with no newline.
    Eof,
}

/// Buffered newline-delimited reader over any async byte stream.
pub struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::with_capacity(256),
        }
    }

    /// Reads the next complete line with its terminator stripped.
    ///
    /// Returns `None` once the stream can no longer produce a full line.
    /// Not cancel safe: dropping the future mid-line loses buffered bytes.
    pub async fn read_line(&mut self) -> Option<String> {
        self.buf.clear();
        match self.inner.read_until(b'\n', &mut self.buf).await {
            Ok(0) => None,
            Ok(_) if self.buf.last() != Some(&b'\n') => {
                debug!("Discarding partial line of {} bytes at end of stream", self.buf.len());
                None
            }
            Ok(_) => {
                self.buf.pop();
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
                Some(String::from_utf8_lossy(&self.buf).into_owned())
            }
            Err(e) => {
                debug!("Read failed: {}", e);
                None
            }
        }
    }

    pub async fn next_frame(&mut self) -> Frame {
        match self.read_line().await {
            Some(line) => Frame::Line(decode(&line)),
            None => Frame::Eof,
        }
    }
}

/// Drains queued lines onto `writer` until every sender is dropped, then
/// shuts the write side down.
///
/// Each connection owns one of these so that senders never touch the
/// socket.
pub async fn write_lines<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut lines: mpsc::Receiver<String>,
) -> io::Result<()> {
    while let Some(line) = lines.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

/// Reads the shared secret, which is the first line of the auth file.
///
/// An empty file yields an empty secret.
pub async fn read_secret(path: impl AsRef<Path>) -> io::Result<String> {
    let contents = tokio::fs::read_to_string(path).await?;
    Ok(contents.lines().next().unwrap_or_default().to_string())
}
