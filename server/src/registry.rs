//! Registry of the chat sessions that completed the handshake
//!
//! This module holds the server's authoritative view of who is in the chat:
//! - Name-keyed storage with unique names and lexicographic ordering
//! - Per-session outbound queue and kick switch
//! - Ordered scans used for listing and broadcasting
//!
//! The registry has no lock of its own. It lives inside `ServerState`, and
//! every method is called by a task that holds the state mutex, so every
//! insert, removal and scan is serialized.

use crate::stats::SessionStats;
use log::{debug, info, warn};
use shared::Outbound;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("name {0:?} is already taken")]
    NameConflict(String),
    #[error("outbound queue for {0:?} is full")]
    Backlogged(String),
}

/// What a connection handler knows about the session it owns.
///
/// Names can be reused once a session is gone, so the connection id is what
/// tells a stale handler apart from the current owner of a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub id: u64,
    pub name: String,
}

/// A connected, authenticated and named chat participant
#[derive(Debug)]
pub struct Session {
    /// Connection id assigned when the socket was accepted
    pub id: u64,
    /// Unique display name negotiated during the handshake
    pub name: String,
    /// Commands issued since joining
    pub stats: SessionStats,
    /// Queue drained onto this session's socket by its writer task
    outbound: Outbound,
    /// Fired when another session kicks this one
    kill_switch: Option<oneshot::Sender<()>>,
}

impl Session {
    pub fn new(id: u64, name: String, outbound: Outbound, kill_switch: oneshot::Sender<()>) -> Self {
        Self {
            id,
            name,
            stats: SessionStats::default(),
            outbound,
            kill_switch: Some(kill_switch),
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Queues an encoded line for this session without waiting.
    ///
    /// A closed queue means the connection is already going away, so the
    /// line is dropped. A full queue means the peer stopped reading and is
    /// reported as `Backlogged`; the caller decides what to do with it.
    pub fn send(&self, line: &str) -> Result<(), RegistryError> {
        match self.outbound.try_send(line.to_string()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => {
                debug!("Dropping line for {}: connection closed", self.name);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue for {} is full", self.name);
                Err(RegistryError::Backlogged(self.name.clone()))
            }
        }
    }

    /// Interrupts the owning handler's pending read.
    ///
    /// Returns false if the switch was already used or the handler is gone.
    pub fn kill(&mut self) -> bool {
        match self.kill_switch.take() {
            Some(switch) => switch.send(()).is_ok(),
            None => false,
        }
    }
}

/// Ordered collection of active sessions keyed by name
///
/// Names are compared byte-wise, so iteration order is the lexicographic
/// order clients see in `LIST` replies and the order broadcasts go out in.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: BTreeMap<String, Session>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session under its name
    ///
    /// Fails with `NameConflict` if any live session already holds the name;
    /// the rejected session is dropped.
    pub fn insert(&mut self, session: Session) -> Result<(), RegistryError> {
        match self.sessions.entry(session.name.clone()) {
            Entry::Occupied(_) => Err(RegistryError::NameConflict(session.name)),
            Entry::Vacant(slot) => {
                info!("Session {} joined as {}", session.id, session.name);
                slot.insert(session);
                Ok(())
            }
        }
    }

    /// Removes whichever session holds `name`. A missing name is a no-op.
    pub fn remove(&mut self, name: &str) -> Option<Session> {
        let removed = self.sessions.remove(name);
        if let Some(session) = &removed {
            info!("Session {} ({}) removed", session.id, session.name);
        }
        removed
    }

    /// Removes the session only if `key` still identifies its current owner
    ///
    /// This is the removal path used by a session's own handler, which makes
    /// leaving idempotent and keeps a handler that was kicked from touching
    /// a newer session that reused its name.
    pub fn remove_current(&mut self, key: &SessionKey) -> Option<Session> {
        if self.is_current(key) {
            self.remove(&key.name)
        } else {
            None
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    /// Returns true if `key` names a registered session owned by the same
    /// connection.
    pub fn is_current(&self, key: &SessionKey) -> bool {
        self.sessions
            .get(&key.name)
            .is_some_and(|session| session.id == key.id)
    }

    pub fn get(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    pub fn get_current_mut(&mut self, key: &SessionKey) -> Option<&mut Session> {
        self.sessions
            .get_mut(&key.name)
            .filter(|session| session.id == key.id)
    }

    /// Names of every session, in order
    pub fn snapshot(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn for_each<F: FnMut(&Session)>(&self, f: F) {
        self.sessions.values().for_each(f);
    }

    /// Queues `line` for every registered session, in order
    ///
    /// Every session is offered the line even if some are backlogged.
    /// Returns the names of the sessions whose queues were full.
    pub fn broadcast(&self, line: &str) -> Vec<String> {
        self.sessions
            .values()
            .filter(|session| session.send(line).is_err())
            .map(|session| session.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
