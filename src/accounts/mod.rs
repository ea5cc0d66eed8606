//! Account registry: credential store + pending-request ledger.
//!
//! Both tables sit behind one `parking_lot::Mutex`, so every
//! check-then-act sequence (exists → insert, take → promote) is atomic
//! across connection tasks. Two concurrent registrations for the same
//! username resolve to exactly one success, and accepting a request
//! promotes it and removes it as a single observable step.

mod requests;
mod store;

pub use requests::AccountRequest;
pub use store::User;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use requests::RequestTable;
use std::collections::HashMap;
use std::path::Path;
use store::UserTable;

/// Conflict and validation failures surfaced to command handlers.
/// Display strings double as wire-level failure messages.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Username already exists")]
    UserExists,
    #[error("Request already exists with this username")]
    RequestPending,
    #[error("No pending request for this username")]
    NoSuchRequest,
    #[error("Invalid username")]
    InvalidUsername,
}

/// Identity snapshot handed to a session at login time. The admin flag
/// reflects the record at that moment; later changes to the record do
/// not propagate into live sessions.
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    pub admin: bool,
    pub admin_grade: u8,
}

struct Inner {
    users: UserTable,
    requests: RequestTable,
}

/// Process-wide account registry shared by every transport.
pub struct Accounts {
    inner: Mutex<Inner>,
}

impl Accounts {
    /// Load both tables from `data_dir`, creating the directory and
    /// bootstrapping the default admin account on first run.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        Ok(Self {
            inner: Mutex::new(Inner {
                users: UserTable::load(data_dir),
                requests: RequestTable::load(data_dir),
            }),
        })
    }

    // ── Credential store ────────────────────────────────────────────

    /// Validate credentials and return the identity snapshot on success.
    pub fn login(&self, username: &str, password: &str) -> Option<Identity> {
        let inner = self.inner.lock();
        if !inner.users.authenticate(username, password) {
            return None;
        }
        inner.users.get(username).map(|user| Identity {
            username: user.username.clone(),
            admin: user.admin,
            admin_grade: user.admin_grade,
        })
    }

    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.login(username, password).is_some()
    }

    pub fn user_exists(&self, username: &str) -> bool {
        self.inner.lock().users.exists(username)
    }

    /// Live admin check against the stored record (not a session
    /// snapshot). The console re-checks this per privileged request.
    pub fn user_is_admin(&self, username: &str) -> bool {
        self.inner.lock().users.get(username).is_some_and(|u| u.admin)
    }

    /// Create a user directly (console `add_user`, tests). Returns
    /// false when the username is taken or invalid; never overwrites.
    pub fn create_user(&self, username: &str, password: &str, admin: bool, grade: u8) -> bool {
        self.inner.lock().users.create(username, password, admin, grade)
    }

    /// Recompute the verifier with the existing salt. Returns false
    /// when the user does not exist.
    pub fn change_password(&self, username: &str, new_password: &str) -> bool {
        self.inner.lock().users.change_password(username, new_password)
    }

    pub fn list_users(&self) -> Vec<String> {
        self.inner.lock().users.usernames()
    }

    // ── Request ledger ──────────────────────────────────────────────

    /// Place a self-service registration. Rejected when the username is
    /// already a user or already has a pending request; the check and
    /// the insert happen under one lock acquisition.
    pub fn request_account(&self, username: &str, password: &str) -> Result<(), AccountError> {
        if !store::valid_username(username) {
            return Err(AccountError::InvalidUsername);
        }
        let mut inner = self.inner.lock();
        if inner.users.exists(username) {
            return Err(AccountError::UserExists);
        }
        if inner.requests.exists(username) {
            return Err(AccountError::RequestPending);
        }
        let salt = store::generate_salt();
        inner.requests.insert(AccountRequest {
            username: username.to_string(),
            password: store::hash_password(password, &salt),
            salt,
            requested_at: store::now_rfc3339(),
        });
        Ok(())
    }

    /// The entire pending table, for the admin listing.
    pub fn list_requests(&self) -> HashMap<String, AccountRequest> {
        self.inner.lock().requests.all()
    }

    /// Promote a pending request into a user, carrying over its
    /// verifier and salt. The request must exist; acting on a missing
    /// one is a validated error, never a fabricated blank user. Both
    /// snapshots are persisted before the lock is released.
    pub fn accept_request(&self, username: &str, admin: bool, grade: u8) -> Result<(), AccountError> {
        let mut inner = self.inner.lock();
        if inner.users.exists(username) {
            return Err(AccountError::UserExists);
        }
        let Some(request) = inner.requests.take(username) else {
            return Err(AccountError::NoSuchRequest);
        };
        inner.users.insert(User {
            username: request.username,
            password: request.password,
            salt: request.salt,
            created_at: store::now_rfc3339(),
            last_login: store::epoch_rfc3339(),
            admin,
            admin_grade: grade,
        });
        inner.requests.save();
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
