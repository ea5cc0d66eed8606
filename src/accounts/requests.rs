//! Pending account-request ledger.
//!
//! Self-service registrations land here with a fresh salt and verifier
//! and wait for an administrator to accept them. The table is
//! snapshotted to `register_requests.json` after every mutation, same
//! write-through discipline as the user table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File name of the serialized request table.
pub const REQUESTS_FILE: &str = "register_requests.json";

/// A pending registration. Carries the verifier and salt that become
/// the user's credentials on acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRequest {
    pub username: String,
    pub password: String,
    pub salt: String,
    pub requested_at: String,
}

/// In-memory request table plus the path of its backing snapshot.
///
/// Not internally synchronized; the owning registry serializes access.
pub(crate) struct RequestTable {
    requests: HashMap<String, AccountRequest>,
    path: PathBuf,
}

impl RequestTable {
    pub(crate) fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(REQUESTS_FILE);
        let requests = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::error!("Unable to parse {}: {e}", path.display());
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self { requests, path }
    }

    pub(crate) fn save(&self) {
        let data = match serde_json::to_vec_pretty(&self.requests) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Unable to serialize request table: {e}");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, data) {
            tracing::error!("Unable to write {}: {e}", self.path.display());
        }
    }

    pub(crate) fn exists(&self, username: &str) -> bool {
        self.requests.contains_key(username)
    }

    pub(crate) fn insert(&mut self, request: AccountRequest) {
        self.requests.insert(request.username.clone(), request);
        self.save();
    }

    /// Remove and return a pending request. The caller persists via the
    /// subsequent `save` so promotion stays a single observable step.
    pub(crate) fn take(&mut self, username: &str) -> Option<AccountRequest> {
        self.requests.remove(username)
    }

    pub(crate) fn all(&self) -> HashMap<String, AccountRequest> {
        self.requests.clone()
    }
}

// ── Tests ───────────────────────────────────────────────────────────
