//! Pure idle-timeout state machine.
//!
//! All methods take `now` explicitly and perform no I/O, so the machine can
//! be driven deterministically in tests and by any clock in production. The
//! driver in [`super::monitor`] owns the actual timers; here a "scheduled
//! callback" is just a deadline value, so a reset fully supersedes the
//! previous schedule and stale timers cannot fire by construction.

use anyhow::{bail, Result};
use std::time::{Duration, Instant};

/// Current state of one session's idle clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Counting down silently; activity resets the clock.
    Active,
    /// Warning shown, countdown running. Incidental activity no longer
    /// resets the clock; only an explicit stay-signed-in does.
    Warning,
    /// Terminal. The session is over and no further effects are emitted.
    Expired,
}

/// What an activity-style signal did to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Both deadlines rescheduled from `now`; phase is Active.
    Reset,
    /// Signal arrived during the warning window and was ignored.
    Suppressed,
    /// Machine already expired; nothing to reset.
    Expired,
}

/// Side effect the driver must apply after advancing the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Warning window entered; show the banner with this many seconds left.
    ShowWarning { seconds_left: u64 },
    /// One second of the warning countdown elapsed.
    CountdownTick { seconds_left: u64 },
    /// Idle limit reached; run the sign-out sequence. Emitted at most once.
    Expire,
}

/// Idle-timeout state machine for a single session context.
pub struct IdleMachine {
    idle_limit: Duration,
    warn_duration: Duration,
    phase: Phase,
    warning_deadline: Instant,
    idle_deadline: Instant,
    /// Next countdown tick while in Warning phase.
    next_tick: Option<Instant>,
}

impl IdleMachine {
    /// Create a machine in Active phase with deadlines scheduled from `now`.
    ///
    /// Rejects configurations where the warning window would not end
    /// strictly before the idle limit.
    pub fn new(idle_limit: Duration, warn_duration: Duration, now: Instant) -> Result<Self> {
        if idle_limit.is_zero() || warn_duration.is_zero() {
            bail!("idle limit and warning duration must both be nonzero");
        }
        if warn_duration >= idle_limit {
            bail!(
                "warning duration ({:?}) must be shorter than the idle limit ({:?})",
                warn_duration,
                idle_limit
            );
        }

        let mut machine = Self {
            idle_limit,
            warn_duration,
            phase: Phase::Active,
            warning_deadline: now,
            idle_deadline: now,
            next_tick: None,
        };
        machine.reschedule(now);
        Ok(machine)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn idle_limit(&self) -> Duration {
        self.idle_limit
    }

    pub fn warn_duration(&self) -> Duration {
        self.warn_duration
    }

    pub fn warning_deadline(&self) -> Instant {
        self.warning_deadline
    }

    pub fn idle_deadline(&self) -> Instant {
        self.idle_deadline
    }

    fn reschedule(&mut self, now: Instant) {
        self.warning_deadline = now + (self.idle_limit - self.warn_duration);
        self.idle_deadline = now + self.idle_limit;
        self.next_tick = None;
        self.phase = Phase::Active;
    }

    /// A qualifying activity signal from this context.
    ///
    /// Suppressed during Warning so that a user who is merely present
    /// (mouse resting, incidental scroll) cannot silently extend the
    /// session without acknowledging the prompt.
    pub fn on_activity(&mut self, now: Instant) -> ResetOutcome {
        match self.phase {
            Phase::Expired => ResetOutcome::Expired,
            Phase::Warning => ResetOutcome::Suppressed,
            Phase::Active => {
                self.reschedule(now);
                ResetOutcome::Reset
            }
        }
    }

    /// Activity observed from another context via the shared heartbeat.
    /// Same rule as local activity: a visible warning is never cancelled
    /// by background cross-context activity.
    pub fn on_remote_activity(&mut self, now: Instant) -> ResetOutcome {
        self.on_activity(now)
    }

    /// Explicit "stay signed in". The one path that resets out of Warning.
    pub fn on_stay_signed_in(&mut self, now: Instant) -> ResetOutcome {
        if self.phase == Phase::Expired {
            return ResetOutcome::Expired;
        }
        self.reschedule(now);
        ResetOutcome::Reset
    }

    /// Explicit "log out now". Returns true only on the first call; the
    /// caller runs the sign-out sequence exactly when it gets true.
    pub fn force_expire(&mut self) -> bool {
        if self.phase == Phase::Expired {
            return false;
        }
        self.phase = Phase::Expired;
        self.next_tick = None;
        true
    }

    /// Earliest instant at which `poll` would emit an effect, or `None`
    /// once the machine has expired.
    pub fn next_wakeup(&self) -> Option<Instant> {
        match self.phase {
            Phase::Expired => None,
            Phase::Active => Some(self.warning_deadline.min(self.idle_deadline)),
            Phase::Warning => {
                let tick = self.next_tick.unwrap_or(self.idle_deadline);
                Some(tick.min(self.idle_deadline))
            }
        }
    }

    /// Whole seconds remaining until the idle deadline, rounded up so the
    /// countdown starts at the full warning duration.
    pub fn seconds_left(&self, now: Instant) -> u64 {
        let remaining = self.idle_deadline.saturating_duration_since(now);
        ((remaining.as_millis() + 999) / 1000) as u64
    }

    /// Advance the machine to `now` and return the effects that became due.
    ///
    /// Emits nothing once expired, even if stale deadlines are polled again.
    pub fn poll(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.phase == Phase::Expired {
            return effects;
        }

        if self.phase == Phase::Active
            && now >= self.warning_deadline
            && now < self.idle_deadline
        {
            self.phase = Phase::Warning;
            self.next_tick = Some(self.warning_deadline + Duration::from_secs(1));
            effects.push(Effect::ShowWarning {
                seconds_left: self.seconds_left(now),
            });
        }

        if self.phase == Phase::Warning {
            while let Some(tick) = self.next_tick {
                if now < tick || tick >= self.idle_deadline {
                    break;
                }
                effects.push(Effect::CountdownTick {
                    seconds_left: self.seconds_left(tick),
                });
                self.next_tick = Some(tick + Duration::from_secs(1));
            }
        }

        if now >= self.idle_deadline {
            // Also covers the defensive Active -> Expired transition when
            // the warning deadline was skipped over entirely.
            self.phase = Phase::Expired;
            self.next_tick = None;
            effects.push(Effect::Expire);
        }

        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_millis(5000);
    const WARN: Duration = Duration::from_millis(3000);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn machine(t0: Instant) -> IdleMachine {
        IdleMachine::new(IDLE, WARN, t0).unwrap()
    }

    #[test]
    fn rejects_warning_not_shorter_than_idle_limit() {
        let now = Instant::now();
        assert!(IdleMachine::new(ms(1000), ms(1000), now).is_err());
        assert!(IdleMachine::new(ms(1000), ms(2000), now).is_err());
        assert!(IdleMachine::new(Duration::ZERO, ms(10), now).is_err());
        assert!(IdleMachine::new(ms(10), Duration::ZERO, now).is_err());
    }

    #[test]
    fn deadline_gap_equals_warning_duration() {
        let t0 = Instant::now();
        let m = machine(t0);
        assert!(m.warning_deadline() < m.idle_deadline());
        assert_eq!(m.idle_deadline() - m.warning_deadline(), WARN);
        assert_eq!(m.idle_deadline() - t0, IDLE);
    }

    #[test]
    fn repeated_activity_leaves_single_deadline_pair() {
        let t0 = Instant::now();
        let mut m = machine(t0);

        // Burst of resets in Active phase.
        for i in 0..10 {
            assert_eq!(m.on_activity(t0 + ms(100 * i)), ResetOutcome::Reset);
        }
        let last_reset = t0 + ms(900);
        assert_eq!(m.warning_deadline(), last_reset + (IDLE - WARN));
        assert_eq!(m.idle_deadline(), last_reset + IDLE);

        // Polling across every superseded deadline fires nothing.
        assert!(m.poll(t0 + ms(1999)).is_empty());
        assert!(m.poll(last_reset + ms(1999)).is_empty());
        assert_eq!(m.phase(), Phase::Active);
    }

    #[test]
    fn warning_fires_then_counts_down() {
        let t0 = Instant::now();
        let mut m = machine(t0);

        let effects = m.poll(t0 + ms(2000));
        assert_eq!(effects, vec![Effect::ShowWarning { seconds_left: 3 }]);
        assert_eq!(m.phase(), Phase::Warning);

        // Two full seconds elapse inside the warning window.
        let effects = m.poll(t0 + ms(4500));
        assert_eq!(
            effects,
            vec![
                Effect::CountdownTick { seconds_left: 2 },
                Effect::CountdownTick { seconds_left: 1 },
            ]
        );

        let effects = m.poll(t0 + ms(5000));
        assert_eq!(effects, vec![Effect::Expire]);
        assert_eq!(m.phase(), Phase::Expired);
    }

    #[test]
    fn activity_during_warning_is_suppressed() {
        let t0 = Instant::now();
        let mut m = machine(t0);
        m.poll(t0 + ms(2000));
        assert_eq!(m.phase(), Phase::Warning);

        let original_deadline = m.idle_deadline();
        assert_eq!(m.on_activity(t0 + ms(2500)), ResetOutcome::Suppressed);
        assert_eq!(m.on_remote_activity(t0 + ms(2600)), ResetOutcome::Suppressed);

        // The countdown was not touched and expiry fires on schedule.
        assert_eq!(m.idle_deadline(), original_deadline);
        assert!(m.poll(t0 + ms(5000)).contains(&Effect::Expire));
    }

    #[test]
    fn stay_signed_in_resets_out_of_warning() {
        let t0 = Instant::now();
        let mut m = machine(t0);
        m.poll(t0 + ms(2000));
        assert_eq!(m.phase(), Phase::Warning);

        assert_eq!(m.on_stay_signed_in(t0 + ms(2500)), ResetOutcome::Reset);
        assert_eq!(m.phase(), Phase::Active);
        assert_eq!(m.warning_deadline(), t0 + ms(2500) + (IDLE - WARN));
        assert_eq!(m.idle_deadline(), t0 + ms(2500) + IDLE);

        // The superseded warning deadline no longer fires.
        assert!(m.poll(t0 + ms(3000)).is_empty());
    }

    #[test]
    fn remote_activity_resets_while_active() {
        let t0 = Instant::now();
        let mut m = machine(t0);
        assert_eq!(m.on_remote_activity(t0 + ms(1000)), ResetOutcome::Reset);
        assert_eq!(m.idle_deadline(), t0 + ms(1000) + IDLE);
    }

    #[test]
    fn expiry_is_terminal_and_idempotent() {
        let t0 = Instant::now();
        let mut m = machine(t0);
        assert_eq!(m.poll(t0 + ms(6000)), vec![Effect::Expire]);

        // No further effects, wakeups, or resets of any kind.
        assert!(m.poll(t0 + ms(7000)).is_empty());
        assert_eq!(m.next_wakeup(), None);
        assert!(!m.force_expire());
        assert_eq!(m.on_activity(t0 + ms(7000)), ResetOutcome::Expired);
        assert_eq!(m.on_stay_signed_in(t0 + ms(7000)), ResetOutcome::Expired);
    }

    #[test]
    fn missed_warning_still_expires() {
        let t0 = Instant::now();
        let mut m = machine(t0);
        // Jump straight past both deadlines in one poll: the machine must
        // not get stuck showing a warning that can never complete.
        let effects = m.poll(t0 + ms(9000));
        assert_eq!(effects, vec![Effect::Expire]);
        assert_eq!(m.phase(), Phase::Expired);
    }

    #[test]
    fn force_expire_fires_once() {
        let t0 = Instant::now();
        let mut m = machine(t0);
        assert!(m.force_expire());
        assert!(!m.force_expire());
        assert_eq!(m.next_wakeup(), None);
    }

    #[test]
    fn next_wakeup_tracks_phase() {
        let t0 = Instant::now();
        let mut m = machine(t0);
        assert_eq!(m.next_wakeup(), Some(t0 + ms(2000)));

        m.poll(t0 + ms(2000));
        // First countdown tick.
        assert_eq!(m.next_wakeup(), Some(t0 + ms(3000)));

        m.poll(t0 + ms(3000));
        assert_eq!(m.next_wakeup(), Some(t0 + ms(4000)));
    }

    /// The reference timeline: idle limit 5s, warning 3s.
    #[test]
    fn reference_scenario() {
        let t0 = Instant::now();
        let mut m = machine(t0);

        // t=1000: click resets; warning moves to t=3000, expiry to t=6000.
        assert_eq!(m.on_activity(t0 + ms(1000)), ResetOutcome::Reset);
        assert_eq!(m.warning_deadline(), t0 + ms(3000));
        assert_eq!(m.idle_deadline(), t0 + ms(6000));

        // t=3000: warning fires with a 3s countdown.
        assert_eq!(
            m.poll(t0 + ms(3000)),
            vec![Effect::ShowWarning { seconds_left: 3 }]
        );

        // t=4000: a scroll mid-warning does not reset; the countdown shows 2s.
        assert_eq!(m.on_activity(t0 + ms(4000)), ResetOutcome::Suppressed);
        assert_eq!(
            m.poll(t0 + ms(4000)),
            vec![Effect::CountdownTick { seconds_left: 2 }]
        );

        // t=5000 then t=6000: final tick, then expiry.
        assert_eq!(
            m.poll(t0 + ms(5000)),
            vec![Effect::CountdownTick { seconds_left: 1 }]
        );
        assert_eq!(m.poll(t0 + ms(6000)), vec![Effect::Expire]);
        assert_eq!(m.phase(), Phase::Expired);
    }
}
