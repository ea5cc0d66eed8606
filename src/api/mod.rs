//! TCP command listener and session manager.
//!
//! One independent task per accepted connection; sessions share the
//! account registry and the other capabilities through `ServerContext`.
//! Shutdown is cooperative: the accept loop watches the process-wide
//! shutdown channel and stops taking new connections, while in-flight
//! sessions finish on their next read or an explicit `exit`.

pub mod commands;
pub mod protocol;
pub mod session;

use crate::accounts::Accounts;
use crate::files::UserFiles;
use crate::runner::Runner;
use crate::scripts::ScriptStore;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Capabilities shared by every session's handlers.
pub struct ServerContext {
    pub accounts: Arc<Accounts>,
    pub runner: Arc<dyn Runner>,
    pub scripts: ScriptStore,
    pub files: UserFiles,
}

/// Thread-safe view of listener vitals, shared with the web console.
#[derive(Clone)]
pub struct ApiStats {
    connections: Arc<AtomicUsize>,
    port: u16,
    started_at: Instant,
}

impl ApiStats {
    /// Number of currently live connections.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// The bound TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Decrements the live-connection counter when a session task ends,
/// however it ends.
struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    fn register(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The command-protocol listener.
pub struct ApiServer {
    listener: TcpListener,
    stats: ApiStats,
    ctx: Arc<ServerContext>,
}

impl ApiServer {
    /// Bind the listener. Port 0 requests an OS-assigned port; the
    /// actual port is available through `stats()`.
    pub async fn bind(host: &str, port: u16, ctx: Arc<ServerContext>) -> Result<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .with_context(|| format!("binding command listener on {host}:{port}"))?;
        let port = listener
            .local_addr()
            .context("reading bound listener address")?
            .port();
        tracing::info!(port, "Command server is running");
        Ok(Self {
            listener,
            stats: ApiStats {
                connections: Arc::new(AtomicUsize::new(0)),
                port,
                started_at: Instant::now(),
            },
            ctx,
        })
    }

    pub fn stats(&self) -> ApiStats {
        self.stats.clone()
    }

    /// Accept connections until the shutdown signal fires. In-flight
    /// sessions are not drained; they end on their own.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Error accepting connection: {e}");
                            continue;
                        }
                    };
                    let ctx = Arc::clone(&self.ctx);
                    let guard = ConnectionGuard::register(&self.stats.connections);
                    tokio::spawn(async move {
                        session::run(stream, peer, ctx).await;
                        drop(guard);
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Command server stopped accepting connections");
    }
}

// ── Tests ───────────────────────────────────────────────────────────
