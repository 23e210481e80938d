//! Idle-session state machine and its async driver.

pub mod machine;
pub mod monitor;

pub use machine::{Effect, IdleMachine, Phase, ResetOutcome};
pub use monitor::{IdleMonitor, InputEvent, LogoutReason};

/// Qualifying user-activity signals. Anything else (window focus,
/// network traffic, ...) is not treated as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    PointerMove,
    KeyDown,
    Scroll,
    TouchStart,
    Click,
}
