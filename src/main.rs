//! zportal-idled - Session Idle Watchdog
//!
//! Watches user activity for one session context, warns before the idle
//! limit with a cancelable countdown, and forces a sign-out when it runs
//! out. Activity is synchronized across concurrent contexts of the same
//! profile through a shared heartbeat, so working in any of them keeps all
//! of them signed in.

mod auth;
mod banner;
mod config;
mod heartbeat;
mod logging;
mod session;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::{AuthClient, HttpAuthClient, NoopAuthClient};
use crate::banner::ConsoleBanner;
use crate::config::Config;
use crate::heartbeat::{FileHeartbeat, HeartbeatBus};
use crate::logging::SessionLog;
use crate::session::{ActivityKind, IdleMonitor, InputEvent};

/// Application version.
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    // Load configuration
    let config = Config::load(config_path.as_deref())?;
    config.validate()?;

    // Initialize tracing
    init_tracing(&config.logging.level)?;

    info!("Starting zportal-idled v{}", VERSION);
    info!(
        "Session timing: idle limit={}s, warning window={}s",
        config.session.idle_limit_secs, config.session.warn_secs
    );

    let heartbeat = Arc::new(FileHeartbeat::new(
        config.heartbeat.data_dir.clone(),
        config.heartbeat.poll_interval(),
    )?);
    heartbeat.start();

    // Login-surface duty: report and clear a pending idle-logout flag left
    // by the previous session.
    match heartbeat.take_logout_flag() {
        Ok(true) => info!("Previous session was signed out due to inactivity"),
        Ok(false) => {}
        Err(e) => debug!("Could not check idle-logout flag: {}", e),
    }

    let auth: Arc<dyn AuthClient> = match config.auth.signout_url.as_deref() {
        Some(url) if !url.is_empty() => {
            info!("Sign-out endpoint: {}", url);
            Arc::new(HttpAuthClient::new(url.to_string()))
        }
        _ => {
            info!("No sign-out endpoint configured; session is local-only");
            Arc::new(NoopAuthClient)
        }
    };

    let session_log = SessionLog::new(config.heartbeat.logs_dir())?;

    let monitor = IdleMonitor::new(
        config.session.idle_limit(),
        config.session.warn_duration(),
        Box::new(ConsoleBanner::new()),
        auth,
        heartbeat.clone(),
    )?
    .with_session_log(session_log);

    // Activity source: every line on stdin counts as activity, with the
    // two banner actions spelled out as commands.
    let (input_tx, input_rx) = mpsc::channel::<InputEvent>(32);
    spawn_input_reader(input_tx);

    let reason = monitor.run(input_rx).await?;

    heartbeat.stop();
    info!(
        "Session over ({:?}); redirecting to {}",
        reason, config.auth.login_url
    );

    Ok(())
}

/// Read activity and commands from stdin until it closes.
fn spawn_input_reader(tx: mpsc::Sender<InputEvent>) {
    tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let event = match line.trim() {
                        "stay" => InputEvent::StaySignedIn,
                        "logout" => InputEvent::LogOutNow,
                        _ => InputEvent::Activity(ActivityKind::KeyDown),
                    };
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed; timers keep running");
                    break;
                }
                Err(e) => {
                    warn!("stdin read error: {}", e);
                    break;
                }
            }
        }
    });
}

/// Initialize tracing subscriber with the given log level.
fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
