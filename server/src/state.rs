//! The single piece of shared mutable state on the server.

use crate::registry::Registry;
use crate::stats::{ServerStats, StatsReport};
use log::info;
use shared::ServerEvent;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle passed to every connection task.
pub type SharedState = Arc<Mutex<ServerState>>;

/// Active sessions plus the server-wide counters.
///
/// Both live behind one lock so that broadcasts, kicks and stats dumps all
/// see the same consistent view.
#[derive(Debug, Default)]
pub struct ServerState {
    pub registry: Registry,
    pub stats: ServerStats,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn report(&self) -> StatsReport {
        StatsReport::collect(&self.registry, &self.stats)
    }

    /// Queues `line` for every session, then drops the sessions that could
    /// not take it.
    ///
    /// Every session registered at this instant is offered the line before
    /// anyone is evicted.
    pub fn broadcast(&mut self, line: &str) {
        let backlogged = self.registry.broadcast(line);
        self.evict(backlogged);
    }

    /// Disconnects sessions whose outbound queue is full.
    ///
    /// Each one is removed, its handler is interrupted and the remaining
    /// sessions get `LEAVE:<name>`. A session that overflows on one of those
    /// notices is evicted in turn. Names no longer registered are skipped.
    pub fn evict(&mut self, mut names: Vec<String>) {
        while let Some(name) = names.pop() {
            let Some(mut session) = self.registry.remove(&name) else {
                continue;
            };
            info!("Disconnecting {}: peer stopped reading", name);
            session.kill();
            announce_departure(&name);
            names.extend(self.registry.broadcast(&ServerEvent::Leave(name).to_line()));
        }
    }
}

/// Echoes a departure on the server's stdout.
pub fn announce_departure(name: &str) {
    println!("({} has left the chat)", name);
}
