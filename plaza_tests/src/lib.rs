//! Shared helpers for the plaza integration tests.

use std::time::Duration;

use plaza_server::server::bind_ephemeral;
use plaza_shared::config::ClientConfig;
use tokio::task::JoinHandle;

/// Upper bound for any condition the tests wait on.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Starts a room server on an ephemeral port, serving in the background.
pub async fn spawn_server() -> anyhow::Result<(JoinHandle<anyhow::Result<()>>, ClientConfig)> {
    let (mut server, cfg) = bind_ephemeral().await?;
    let handle = tokio::spawn(async move { server.run().await });
    Ok((handle, cfg))
}

/// Polls `check` every few milliseconds until it holds or [`WAIT`] elapses.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
