//! External auth collaborator.
//!
//! The watchdog consumes exactly one operation: sign out the current
//! session. The call is fallible but its failure never blocks the local
//! logout; losing the auth backend must not trap the user in a dead
//! session.

use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("sign-out request failed: {0}")]
    Transport(String),
    #[error("sign-out endpoint returned status {0}")]
    Status(u16),
}

pub trait AuthClient: Send + Sync {
    /// Invalidate the current session with the auth provider.
    fn sign_out(&self) -> Result<(), AuthError>;
}

/// Sign-out against an HTTP endpoint.
pub struct HttpAuthClient {
    url: String,
    agent: ureq::Agent,
}

impl HttpAuthClient {
    pub fn new(url: String) -> Self {
        // Bound the call so a dead endpoint cannot stall the logout.
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();
        Self { url, agent }
    }
}

impl AuthClient for HttpAuthClient {
    fn sign_out(&self) -> Result<(), AuthError> {
        let response = self.agent.post(&self.url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => AuthError::Status(code),
            other => AuthError::Transport(other.to_string()),
        })?;
        debug!("sign-out endpoint answered {}", response.status());
        Ok(())
    }
}

/// Used when no sign-out endpoint is configured; the session is local-only.
pub struct NoopAuthClient;

impl AuthClient for NoopAuthClient {
    fn sign_out(&self) -> Result<(), AuthError> {
        debug!("no sign-out endpoint configured");
        Ok(())
    }
}
