//! Shared activity heartbeat.
//!
//! Every session context writes its last-activity timestamp under a shared
//! key and observes writes made by the others, so activity anywhere keeps
//! the whole profile signed in. Writes are last-writer-wins; the value is a
//! liveness signal, not a consistency-critical record, so a stale read only
//! delays a resynchronization.

pub mod file;
pub mod memory;

use thiserror::Error;
use tokio::sync::broadcast;

pub use file::FileHeartbeat;
pub use memory::MemoryHeartbeat;

/// Shared key holding the last-activity timestamp (epoch milliseconds).
pub const HEARTBEAT_KEY: &str = "zportal:lastActivity";

/// One-shot flag telling the login surface that the previous session ended
/// because of inactivity.
pub const LOGOUT_FLAG_KEY: &str = "idleLogout";

/// Value written under [`LOGOUT_FLAG_KEY`].
pub const LOGOUT_FLAG_VALUE: &str = "1";

/// A heartbeat value observed on the shared key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatEvent {
    /// The activity timestamp that was written, in epoch milliseconds.
    pub at_ms: u64,
}

#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("heartbeat storage I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Publish/subscribe seam over the shared heartbeat storage.
///
/// Implementations may echo a publisher's own write back to its subscriber;
/// the monitor filters those by timestamp. All operations are best-effort:
/// when storage fails, each context still enforces its own idle limit and
/// only the convenience of shared resets is lost.
pub trait HeartbeatBus: Send + Sync {
    /// Write the shared last-activity timestamp (epoch milliseconds).
    fn publish(&self, at_ms: u64) -> Result<(), HeartbeatError>;

    /// Observe heartbeat values written to the shared key.
    fn subscribe(&self) -> broadcast::Receiver<HeartbeatEvent>;

    /// Record that the session ended due to inactivity.
    fn set_logout_flag(&self) -> Result<(), HeartbeatError>;

    /// Consume the idle-logout flag, clearing it. Returns whether it was set.
    fn take_logout_flag(&self) -> Result<bool, HeartbeatError>;
}

/// Map a shared key to a filesystem-safe file name.
pub(crate) fn key_file_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_are_filesystem_safe() {
        assert_eq!(key_file_name(HEARTBEAT_KEY), "zportal-lastActivity");
        assert_eq!(key_file_name(LOGOUT_FLAG_KEY), "idleLogout");
    }
}
