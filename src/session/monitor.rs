//! Async driver for the idle-session state machine.
//!
//! Owns the machine plus the three capability seams (banner, auth client,
//! heartbeat bus) and runs the select loop: sleep until the machine's next
//! deadline, local input events, heartbeat writes from other contexts.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::auth::AuthClient;
use crate::banner::Banner;
use crate::heartbeat::{HeartbeatBus, HeartbeatEvent};
use crate::logging::SessionLog;
use crate::session::machine::{Effect, IdleMachine, ResetOutcome};
use crate::session::ActivityKind;

/// Input from this context: activity signals and the two banner actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Activity(ActivityKind),
    StaySignedIn,
    LogOutNow,
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The idle limit was reached without an explicit stay-signed-in.
    Idle,
    /// The user chose "log out now".
    Manual,
}

/// Idle watchdog for a single session context.
pub struct IdleMonitor {
    machine: IdleMachine,
    banner: Box<dyn Banner>,
    auth: Arc<dyn AuthClient>,
    heartbeat: Arc<dyn HeartbeatBus>,
    audit: Option<SessionLog>,
    /// Last heartbeat value this context wrote, used to drop the echo of
    /// our own write coming back through the bus.
    last_published_ms: Option<u64>,
}

impl IdleMonitor {
    pub fn new(
        idle_limit: Duration,
        warn_duration: Duration,
        banner: Box<dyn Banner>,
        auth: Arc<dyn AuthClient>,
        heartbeat: Arc<dyn HeartbeatBus>,
    ) -> Result<Self> {
        let machine = IdleMachine::new(idle_limit, warn_duration, monotonic_now())?;
        Ok(Self {
            machine,
            banner,
            auth,
            heartbeat,
            audit: None,
            last_published_ms: None,
        })
    }

    /// Attach a JSONL audit log for session lifecycle events.
    pub fn with_session_log(mut self, audit: SessionLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Run until the session ends. Always terminates in a logout: either
    /// the idle limit is reached or the user asks to log out now.
    pub async fn run(mut self, mut input_rx: mpsc::Receiver<InputEvent>) -> Result<LogoutReason> {
        let mut remote_rx = self.heartbeat.subscribe();

        if let Some(log) = &mut self.audit {
            if let Err(e) = log.log_session_start(
                env!("CARGO_PKG_VERSION"),
                self.machine.idle_limit().as_secs(),
                self.machine.warn_duration().as_secs(),
            ) {
                warn!("audit log write failed: {}", e);
            }
        }

        // Mark activity on load so other contexts see us, and start the
        // clock from "now" rather than from construction time.
        self.mark_activity();
        self.machine.on_activity(monotonic_now());

        info!(
            "idle monitor armed: limit {:?}, warning window {:?}",
            self.machine.idle_limit(),
            self.machine.warn_duration(),
        );

        loop {
            // Expired without an expiry effect cannot happen; bail cleanly
            // rather than spin if it ever does.
            let Some(wakeup) = self.machine.next_wakeup() else {
                return Ok(LogoutReason::Idle);
            };

            tokio::select! {
                _ = time::sleep_until(Instant::from_std(wakeup)) => {
                    for effect in self.machine.poll(monotonic_now()) {
                        match effect {
                            Effect::ShowWarning { seconds_left } => {
                                info!("inactivity warning: {}s until sign-out", seconds_left);
                                if let Some(log) = &mut self.audit {
                                    if let Err(e) = log.log_warning_shown(seconds_left) {
                                        warn!("audit log write failed: {}", e);
                                    }
                                }
                                self.banner.show(seconds_left);
                            }
                            Effect::CountdownTick { seconds_left } => {
                                self.banner.update(seconds_left);
                            }
                            Effect::Expire => {
                                self.expire(LogoutReason::Idle).await;
                                return Ok(LogoutReason::Idle);
                            }
                        }
                    }
                }
                Some(event) = input_rx.recv() => {
                    match event {
                        InputEvent::Activity(kind) => {
                            // Unconditional, so other contexts see fresh
                            // activity even while this one is warning.
                            self.mark_activity();
                            match self.machine.on_activity(monotonic_now()) {
                                ResetOutcome::Reset => self.banner.hide(),
                                ResetOutcome::Suppressed => {
                                    debug!(activity = ?kind, "activity ignored during warning");
                                }
                                ResetOutcome::Expired => {}
                            }
                        }
                        InputEvent::StaySignedIn => {
                            self.mark_activity();
                            if self.machine.on_stay_signed_in(monotonic_now())
                                == ResetOutcome::Reset
                            {
                                info!("session extended by user");
                                self.banner.hide();
                                if let Some(log) = &mut self.audit {
                                    if let Err(e) = log.log_session_extended() {
                                        warn!("audit log write failed: {}", e);
                                    }
                                }
                            }
                        }
                        InputEvent::LogOutNow => {
                            if self.machine.force_expire() {
                                self.expire(LogoutReason::Manual).await;
                            }
                            return Ok(LogoutReason::Manual);
                        }
                    }
                }
                Ok(event) = remote_rx.recv() => {
                    self.on_remote(event);
                }
            }
        }
    }

    /// Write the shared heartbeat. Failure degrades to a per-context timer.
    fn mark_activity(&mut self) {
        let at_ms = Utc::now().timestamp_millis().max(0) as u64;
        self.last_published_ms = Some(at_ms);
        if let Err(e) = self.heartbeat.publish(at_ms) {
            debug!("heartbeat write failed, cross-context sync degraded: {}", e);
        }
    }

    fn on_remote(&mut self, event: HeartbeatEvent) {
        if self.last_published_ms == Some(event.at_ms) {
            // Echo of our own write.
            return;
        }
        match self.machine.on_remote_activity(monotonic_now()) {
            ResetOutcome::Reset => {
                debug!("activity in another context reset the idle clock");
                self.banner.hide();
            }
            ResetOutcome::Suppressed => {
                debug!("remote activity ignored during warning");
            }
            ResetOutcome::Expired => {}
        }
    }

    /// Terminal sequence: best-effort sign-out, record the idle-logout
    /// flag, dismiss the banner. Runs at most once per monitor.
    async fn expire(&mut self, reason: LogoutReason) {
        info!("session ending ({:?}); signing out", reason);

        let auth = Arc::clone(&self.auth);
        let signout_ok = match task::spawn_blocking(move || auth.sign_out()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("sign-out failed, ending session anyway: {}", e);
                false
            }
            Err(e) => {
                warn!("sign-out task failed: {}", e);
                false
            }
        };

        if let Err(e) = self.heartbeat.set_logout_flag() {
            debug!("could not record idle-logout flag: {}", e);
        }

        self.banner.hide();

        if let Some(log) = &mut self.audit {
            if let Err(e) = log.log_logout(reason, signout_ok) {
                warn!("audit log write failed: {}", e);
            }
        }
    }
}

/// Monotonic "now" that respects tokio's paused clock under test.
fn monotonic_now() -> std::time::Instant {
    Instant::now().into_std()
}
