use std::net::SocketAddr;
use std::time::Duration;

use mcphost_common::{Error, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::SharedState;

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Serves the HTTP front end until the state's shutdown token is cancelled.
pub struct GatewayServer {
    state: SharedState,
    listen: SocketAddr,
}

impl GatewayServer {
    pub fn new(state: SharedState, listen: SocketAddr) -> Self {
        Self { state, listen }
    }

    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.listen)
            .await
            .map_err(|e| Error::Gateway(format!("failed to bind {}: {e}", self.listen)))?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        let shutdown = self.state.shutdown.clone();
        tokio::spawn(sweep_idle(self.state.clone()));
        let app = build_router(self.state);

        info!("gateway listening on http://{addr}");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| Error::Gateway(format!("server error: {e}")))?;
        info!("gateway stopped");
        Ok(())
    }
}

/// Periodically drop idle conversations until shutdown.
async fn sweep_idle(state: SharedState) {
    let period = state
        .idle_timeout()
        .min(MAX_SWEEP_INTERVAL)
        .max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                state.evict_idle();
            }
        }
    }
}
