//! In-memory heartbeat bus.
//!
//! Clones share one channel and one flag, so each clone behaves like a
//! separate session context of the same profile. Used by tests to simulate
//! a second tab, and as a fallback when shared storage is unavailable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{HeartbeatBus, HeartbeatError, HeartbeatEvent};

#[derive(Clone)]
pub struct MemoryHeartbeat {
    tx: broadcast::Sender<HeartbeatEvent>,
    logout_flag: Arc<AtomicBool>,
}

impl MemoryHeartbeat {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            logout_flag: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for MemoryHeartbeat {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatBus for MemoryHeartbeat {
    fn publish(&self, at_ms: u64) -> Result<(), HeartbeatError> {
        // No subscribers is fine; the heartbeat is advisory.
        let _ = self.tx.send(HeartbeatEvent { at_ms });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<HeartbeatEvent> {
        self.tx.subscribe()
    }

    fn set_logout_flag(&self) -> Result<(), HeartbeatError> {
        self.logout_flag.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn take_logout_flag(&self) -> Result<bool, HeartbeatError> {
        Ok(self.logout_flag.swap(false, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_the_channel_and_flag() {
        let a = MemoryHeartbeat::new();
        let b = a.clone();

        let mut rx = a.subscribe();
        b.publish(99).unwrap();
        assert_eq!(rx.recv().await.unwrap(), HeartbeatEvent { at_ms: 99 });

        b.set_logout_flag().unwrap();
        assert!(a.take_logout_flag().unwrap());
        assert!(!b.take_logout_flag().unwrap());
    }
}
