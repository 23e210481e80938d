//! Warning affordance seam.
//!
//! The banner is deliberately dumb: it displays whatever countdown the state
//! machine hands it and never drives a transition itself. A broken or
//! missing banner must not prevent the forced logout, so implementations
//! swallow their own output errors.

use std::io::Write;

pub trait Banner: Send {
    /// Show the warning with the initial countdown value.
    fn show(&mut self, seconds_left: u64);
    /// Update the countdown while the warning is visible.
    fn update(&mut self, seconds_left: u64);
    /// Dismiss the warning. Must be a no-op when nothing is shown.
    fn hide(&mut self);
}

/// Banner rendered on the controlling terminal.
pub struct ConsoleBanner {
    visible: bool,
}

impl ConsoleBanner {
    pub fn new() -> Self {
        Self { visible: false }
    }

    fn print(&self, line: &str) {
        let mut err = std::io::stderr();
        let _ = writeln!(err, "{}", line);
    }
}

impl Default for ConsoleBanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Banner for ConsoleBanner {
    fn show(&mut self, seconds_left: u64) {
        self.visible = true;
        self.print(&format!(
            "*** Session timing out: {}s left. Type 'stay' to stay signed in, 'logout' to log out now. ***",
            seconds_left
        ));
    }

    fn update(&mut self, seconds_left: u64) {
        if self.visible {
            self.print(&format!("*** {}s left ***", seconds_left));
        }
    }

    fn hide(&mut self) {
        if self.visible {
            self.visible = false;
            self.print("*** Warning dismissed, session extended. ***");
        }
    }
}
