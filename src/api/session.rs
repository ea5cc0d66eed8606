//! Per-connection session: identity state machine and read loop.
//!
//! A session is born anonymous, may become authenticated through a
//! successful `login_attempt`, and ends when a handler marks it
//! closing or the transport drops. There is no logout-in-place on this
//! transport; only connection close resets identity. The admin flag
//! is a snapshot taken at login time and deliberately does not track
//! later changes to the stored record.

use super::commands;
use super::protocol::CommandEnvelope;
use super::ServerContext;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Identity {
    Anonymous,
    Authenticated { username: String, admin: bool },
}

/// Mutable per-connection context handed to every handler.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    peer: SocketAddr,
    identity: Identity,
    closing: bool,
}

impl Session {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            identity: Identity::Anonymous,
            closing: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The authenticated username, if any.
    pub fn username(&self) -> Option<&str> {
        match &self.identity {
            Identity::Anonymous => None,
            Identity::Authenticated { username, .. } => Some(username),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.username().is_some()
    }

    /// Admin snapshot taken at login time.
    pub fn is_admin(&self) -> bool {
        matches!(&self.identity, Identity::Authenticated { admin: true, .. })
    }

    /// Adopt an identity after credential validation. A repeated login
    /// on the same connection replaces the previous identity.
    pub fn authenticate(&mut self, username: String, admin: bool) {
        self.identity = Identity::Authenticated { username, admin };
    }

    /// Mark the session for termination after the current response.
    pub fn request_close(&mut self) {
        self.closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }
}

/// Drive one connection until it closes.
///
/// Reads one newline-terminated envelope per iteration. Parse failures
/// are logged and skipped without a response and without touching the
/// session state; every successfully parsed command produces exactly
/// one response, in receive order.
pub async fn run(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) {
    let mut session = Session::new(peer);
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    tracing::info!(session = %session.id(), peer = %peer, "New connection established");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(session = %session.id(), "Error reading from connection: {e}");
                break;
            }
        };

        let envelope: CommandEnvelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(session = %session.id(), "Unable to parse command envelope: {e}");
                continue;
            }
        };

        let response = commands::dispatch(&envelope, &mut session, &ctx).await;
        let mut payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(session = %session.id(), "Unable to serialize response: {e}");
                continue;
            }
        };
        payload.push(b'\n');
        if let Err(e) = write_half.write_all(&payload).await {
            tracing::warn!(session = %session.id(), "Error writing to connection: {e}");
            break;
        }

        if session.is_closing() {
            break;
        }
    }

    tracing::info!(session = %session.id(), peer = %peer, "Closing connection");
}

// ── Tests ───────────────────────────────────────────────────────────
