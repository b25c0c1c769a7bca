//! Post-handshake command processing.
//!
//! Every function here takes `&mut ServerState`, so the caller must hold
//! the state lock for the whole call. Broadcasts are queued while the lock
//! is held, which means each one reaches exactly the sessions registered at
//! that instant.

use crate::registry::SessionKey;
use crate::state::{announce_departure, ServerState};
use log::{debug, info};
use shared::{ClientCommand, Message, ServerEvent};

/// What the connection handler should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading commands
    Continue,
    /// The session left voluntarily and has been removed
    Left,
    /// The session kicked itself and has been removed
    Kicked,
    /// The session was already removed by someone else; do nothing more
    Gone,
}

/// Handles one decoded line from an active session.
///
/// Unknown commands and wrong arities are ignored without a reply.
pub fn process(state: &mut ServerState, me: &SessionKey, message: &Message) -> Flow {
    if !state.registry.is_current(me) {
        debug!("Dropping {:?} from {}: session no longer registered", message, me.name);
        return Flow::Gone;
    }

    match ClientCommand::parse(message) {
        Some(ClientCommand::Say(text)) => say(state, me, &text),
        Some(ClientCommand::Kick(target)) => kick(state, me, &target),
        Some(ClientCommand::Leave) => leave(state, me),
        Some(ClientCommand::List) => list(state, me),
        _ => {
            debug!("Ignoring {:?} from {}", message, me.name);
            Flow::Continue
        }
    }
}

/// Cleans up after a session whose connection ended without `LEAVE:`.
///
/// Returns true if the session was still registered and a `LEAVE`
/// broadcast went out.
pub fn disconnect(state: &mut ServerState, me: &SessionKey) -> bool {
    let departed = depart(state, me);
    if departed {
        info!("{} disconnected", me.name);
    }
    departed
}

fn say(state: &mut ServerState, me: &SessionKey, text: &str) -> Flow {
    if let Some(session) = state.registry.get_current_mut(me) {
        session.stats.say += 1;
    }
    state.stats.says += 1;

    let line = ServerEvent::Msg {
        name: me.name.clone(),
        text: text.to_string(),
    }
    .to_line();
    state.broadcast(&line);
    println!("{}: {}", me.name, text);

    Flow::Continue
}

/// Kicks `target`, which may be the requester itself.
///
/// Kicking a name nobody holds succeeds silently.
fn kick(state: &mut ServerState, me: &SessionKey, target: &str) -> Flow {
    if let Some(session) = state.registry.get_current_mut(me) {
        session.stats.kick += 1;
    }
    state.stats.kicks += 1;

    let notice = ServerEvent::Kick.to_line();
    let farewell = ServerEvent::Leave(target.to_string()).to_line();

    if target == me.name {
        if let Some(session) = state.registry.remove_current(me) {
            if let Err(e) = session.send(&notice) {
                debug!("KICK notice for {} dropped: {}", me.name, e);
            }
        }
        state.broadcast(&farewell);
        announce_departure(target);
        info!("{} kicked themselves", me.name);
        return Flow::Kicked;
    }

    match state.registry.remove(target) {
        Some(mut victim) => {
            if let Err(e) = victim.send(&notice) {
                debug!("KICK notice for {} dropped: {}", target, e);
            }
            if !victim.kill() {
                debug!("Handler for {} already stopped", target);
            }
            state.broadcast(&farewell);
            announce_departure(target);
            info!("{} kicked {}", me.name, target);
        }
        None => debug!("{} tried to kick unknown name {}", me.name, target),
    }

    Flow::Continue
}

fn leave(state: &mut ServerState, me: &SessionKey) -> Flow {
    state.stats.leaves += 1;
    depart(state, me);
    Flow::Left
}

fn list(state: &mut ServerState, me: &SessionKey) -> Flow {
    let reply = ServerEvent::List(state.registry.snapshot()).to_line();
    let delivered = match state.registry.get_current_mut(me) {
        Some(session) => {
            session.stats.list += 1;
            session.send(&reply).is_ok()
        }
        None => true,
    };
    state.stats.lists += 1;
    if !delivered {
        state.evict(vec![me.name.clone()]);
    }

    Flow::Continue
}

/// The single removal path for a session's own handler.
fn depart(state: &mut ServerState, me: &SessionKey) -> bool {
    if state.registry.remove_current(me).is_none() {
        return false;
    }
    state.broadcast(&ServerEvent::Leave(me.name.clone()).to_line());
    announce_departure(&me.name);
    true
}
