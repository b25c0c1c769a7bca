//! Chat statistics kept per session and for the whole server.
//!
//! Counters are plain integers. Every mutation site already holds the
//! server state lock, which also makes a dump consistent with the set of
//! sessions visible at that moment.

use crate::registry::Registry;
use std::fmt;

/// Commands issued by one session since it joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub say: u64,
    pub kick: u64,
    pub list: u64,
}

/// Server-wide counters, never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Connections that presented the right secret
    pub connections: u64,
    /// Name proposals received during negotiation
    pub names: u64,
    pub says: u64,
    pub kicks: u64,
    pub lists: u64,
    /// Explicit `LEAVE:` commands
    pub leaves: u64,
}

/// Point-in-time copy of all counters, in registry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReport {
    pub clients: Vec<(String, SessionStats)>,
    pub server: ServerStats,
}

impl StatsReport {
    pub fn collect(registry: &Registry, server: &ServerStats) -> Self {
        let mut clients = Vec::with_capacity(registry.len());
        registry.for_each(|session| clients.push((session.name.clone(), session.stats)));
        Self {
            clients,
            server: *server,
        }
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "@CLIENTS@")?;
        for (name, stats) in &self.clients {
            writeln!(
                f,
                "{}:SAY:{}:KICK:{}:LIST:{}",
                name, stats.say, stats.kick, stats.list
            )?;
        }
        writeln!(f, "@SERVER@")?;
        let s = &self.server;
        writeln!(
            f,
            "server:AUTH:{}:NAME:{}:SAY:{}:KICK:{}:LIST:{}:LEAVE:{}",
            s.connections, s.names, s.says, s.kicks, s.lists, s.leaves
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_format() {
        let report = StatsReport {
            clients: Vec::new(),
            server: ServerStats::default(),
        };

        assert_eq!(
            report.to_string(),
            "@CLIENTS@\n@SERVER@\nserver:AUTH:0:NAME:0:SAY:0:KICK:0:LIST:0:LEAVE:0\n"
        );
    }

    #[test]
    fn test_report_lists_clients_before_server_totals() {
        let report = StatsReport {
            clients: vec![
                (
                    "alice".to_string(),
                    SessionStats {
                        say: 3,
                        kick: 1,
                        list: 0,
                    },
                ),
                (
                    "bob".to_string(),
                    SessionStats {
                        say: 0,
                        kick: 0,
                        list: 2,
                    },
                ),
            ],
            server: ServerStats {
                connections: 2,
                names: 3,
                says: 3,
                kicks: 1,
                lists: 2,
                leaves: 0,
            },
        };

        let text = report.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "@CLIENTS@",
                "alice:SAY:3:KICK:1:LIST:0",
                "bob:SAY:0:KICK:0:LIST:2",
                "@SERVER@",
                "server:AUTH:2:NAME:3:SAY:3:KICK:1:LIST:2:LEAVE:0",
            ]
        );
    }
}
