//! JSONL audit trail of session lifecycle events.
//!
//! One line per event, one file per day. This is the record an admin checks
//! after the fact to see when sessions were warned, extended, or ended.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::debug;

use crate::session::LogoutReason;

/// Session lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SessionEvent {
    #[serde(rename = "session_start")]
    SessionStart {
        timestamp: DateTime<Utc>,
        version: String,
        idle_limit_secs: u64,
        warn_secs: u64,
    },
    #[serde(rename = "warning_shown")]
    WarningShown {
        timestamp: DateTime<Utc>,
        seconds_left: u64,
    },
    #[serde(rename = "session_extended")]
    SessionExtended { timestamp: DateTime<Utc> },
    #[serde(rename = "logout")]
    Logout {
        timestamp: DateTime<Utc>,
        idle: bool,
        signout_ok: bool,
    },
}

/// JSONL writer for session events.
pub struct SessionLog {
    logs_dir: PathBuf,
    current_file: Option<BufWriter<File>>,
    current_date: Option<String>,
}

impl SessionLog {
    pub fn new(logs_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;

        Ok(Self {
            logs_dir,
            current_file: None,
            current_date: None,
        })
    }

    /// Get or create the log file for today.
    fn get_writer(&mut self) -> Result<&mut BufWriter<File>> {
        let today = Local::now().format("%Y-%m-%d").to_string();

        if self.current_date.as_ref() != Some(&today) {
            let log_path = self.logs_dir.join(format!("{}.jsonl", today));

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .with_context(|| format!("Failed to open log file: {:?}", log_path))?;

            self.current_file = Some(BufWriter::new(file));
            self.current_date = Some(today);

            debug!("Opened session log: {:?}", log_path);
        }

        self.current_file
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("No log file available"))
    }

    fn write_line(&mut self, event: &SessionEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        let writer = self.get_writer()?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    pub fn log_session_start(
        &mut self,
        version: &str,
        idle_limit_secs: u64,
        warn_secs: u64,
    ) -> Result<()> {
        self.write_line(&SessionEvent::SessionStart {
            timestamp: Utc::now(),
            version: version.to_string(),
            idle_limit_secs,
            warn_secs,
        })
    }

    pub fn log_warning_shown(&mut self, seconds_left: u64) -> Result<()> {
        self.write_line(&SessionEvent::WarningShown {
            timestamp: Utc::now(),
            seconds_left,
        })
    }

    pub fn log_session_extended(&mut self) -> Result<()> {
        self.write_line(&SessionEvent::SessionExtended {
            timestamp: Utc::now(),
        })
    }

    pub fn log_logout(&mut self, reason: LogoutReason, signout_ok: bool) -> Result<()> {
        self.write_line(&SessionEvent::Logout {
            timestamp: Utc::now(),
            idle: reason == LogoutReason::Idle,
            signout_ok,
        })
    }
}

impl Drop for SessionLog {
    fn drop(&mut self) {
        if let Some(ref mut writer) = self.current_file {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_land_in_daily_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SessionLog::new(dir.path().to_path_buf()).unwrap();

        log.log_session_start("0.1.0", 1800, 60).unwrap();
        log.log_warning_shown(60).unwrap();
        log.log_session_extended().unwrap();
        log.log_logout(LogoutReason::Idle, false).unwrap();

        let today = Local::now().format("%Y-%m-%d").to_string();
        let content =
            std::fs::read_to_string(dir.path().join(format!("{}.jsonl", today))).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("\"session_start\""));
        assert!(lines[1].contains("\"warning_shown\""));
        assert!(lines[2].contains("\"session_extended\""));
        assert!(lines[3].contains("\"logout\""));
        assert!(lines[3].contains("\"idle\":true"));
        assert!(lines[3].contains("\"signout_ok\":false"));

        // Every line must round-trip as a SessionEvent.
        for line in lines {
            let _: SessionEvent = serde_json::from_str(line).unwrap();
        }
    }
}
