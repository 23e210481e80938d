//! File-backed heartbeat shared between processes of the same profile.
//!
//! The shared keys live as small files under the profile data directory. A
//! poll task watches the heartbeat file and broadcasts every value change it
//! observes; change notification is polling-based because plain files have
//! no cross-process watch primitive we can rely on everywhere.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{
    key_file_name, HeartbeatBus, HeartbeatError, HeartbeatEvent, HEARTBEAT_KEY, LOGOUT_FLAG_KEY,
    LOGOUT_FLAG_VALUE,
};

pub struct FileHeartbeat {
    dir: PathBuf,
    poll_interval: Duration,
    tx: broadcast::Sender<HeartbeatEvent>,
    running: Arc<AtomicBool>,
}

impl FileHeartbeat {
    /// Create a heartbeat store rooted at `dir`, creating it if needed.
    pub fn new(dir: PathBuf, poll_interval: Duration) -> Result<Self, HeartbeatError> {
        fs::create_dir_all(&dir)?;
        let (tx, _) = broadcast::channel(16);
        Ok(Self {
            dir,
            poll_interval,
            tx,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key_file_name(key))
    }

    /// Start the poll task watching the heartbeat file. Must be called from
    /// within a tokio runtime. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(
            "watching shared heartbeat at {:?} every {:?}",
            self.key_path(HEARTBEAT_KEY),
            self.poll_interval
        );

        let path = self.key_path(HEARTBEAT_KEY);
        let poll_interval = self.poll_interval;
        let tx = self.tx.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            run_poller(path, poll_interval, tx, running).await;
        });
    }

    /// Stop the poll task.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl HeartbeatBus for FileHeartbeat {
    fn publish(&self, at_ms: u64) -> Result<(), HeartbeatError> {
        fs::write(self.key_path(HEARTBEAT_KEY), at_ms.to_string())?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<HeartbeatEvent> {
        self.tx.subscribe()
    }

    fn set_logout_flag(&self) -> Result<(), HeartbeatError> {
        fs::write(self.key_path(LOGOUT_FLAG_KEY), LOGOUT_FLAG_VALUE)?;
        Ok(())
    }

    fn take_logout_flag(&self) -> Result<bool, HeartbeatError> {
        let path = self.key_path(LOGOUT_FLAG_KEY);
        match fs::read_to_string(&path) {
            Ok(value) => {
                fs::remove_file(&path)?;
                Ok(value.trim() == LOGOUT_FLAG_VALUE)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for FileHeartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_millis(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

async fn run_poller(
    path: PathBuf,
    poll_interval: Duration,
    tx: broadcast::Sender<HeartbeatEvent>,
    running: Arc<AtomicBool>,
) {
    let mut interval = tokio::time::interval(poll_interval);
    let mut last_seen = read_millis(&path);

    while running.load(Ordering::SeqCst) {
        interval.tick().await;

        let Some(value) = read_millis(&path) else {
            continue;
        };
        if last_seen != Some(value) {
            last_seen = Some(value);
            let _ = tx.send(HeartbeatEvent { at_ms: value });
        }
    }

    debug!("heartbeat poller exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store(dir: &Path) -> FileHeartbeat {
        FileHeartbeat::new(dir.to_path_buf(), Duration::from_millis(10)).unwrap()
    }

    #[test]
    fn publish_writes_parseable_millis() {
        let dir = tempfile::tempdir().unwrap();
        let hb = store(dir.path());
        hb.publish(1_700_000_000_123).unwrap();

        let raw = fs::read_to_string(dir.path().join("zportal-lastActivity")).unwrap();
        assert_eq!(raw.trim().parse::<u64>().unwrap(), 1_700_000_000_123);
    }

    #[test]
    fn logout_flag_is_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let hb = store(dir.path());

        assert!(!hb.take_logout_flag().unwrap());
        hb.set_logout_flag().unwrap();
        assert!(hb.take_logout_flag().unwrap());
        // Consumed: a second read sees nothing.
        assert!(!hb.take_logout_flag().unwrap());
    }

    #[tokio::test]
    async fn poller_broadcasts_foreign_writes() {
        let dir = tempfile::tempdir().unwrap();
        let hb = store(dir.path());
        let mut rx = hb.subscribe();
        hb.start();

        // Give the poller a cycle to record its baseline.
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Simulate another process touching the shared key.
        fs::write(dir.path().join("zportal-lastActivity"), "424242").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("poller should observe the write")
            .unwrap();
        assert_eq!(event, HeartbeatEvent { at_ms: 424242 });

        hb.stop();
    }

    #[tokio::test]
    async fn poller_ignores_unchanged_values() {
        let dir = tempfile::tempdir().unwrap();
        let hb = store(dir.path());
        hb.publish(7).unwrap();

        let mut rx = hb.subscribe();
        hb.start();

        // Rewrite the same value: no change, no event.
        tokio::time::sleep(Duration::from_millis(50)).await;
        hb.publish(7).unwrap();

        let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(result.is_err(), "unchanged value must not be broadcast");

        hb.stop();
    }
}
