//! Flat-file credential store.
//!
//! The whole user table lives in memory and is snapshotted to
//! `users.json` after every mutation: no partial updates, last write
//! wins. On first run (no file, or an unreadable one) a default `admin`
//! record is created with a random password that is surfaced exactly
//! once: logged to the console and written to a clear-text recovery
//! file next to the table.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Length of the generated default-admin password.
const GENERATED_PASSWORD_LEN: usize = 12;

/// File name of the serialized user table.
pub const USERS_FILE: &str = "users.json";

/// File name of the one-time admin password recovery file.
pub const RECOVERY_FILE: &str = "admin_credentials.txt";

/// A registered user. `password` is the hex-encoded salted verifier,
/// never the plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    pub salt: String,
    pub created_at: String,
    /// Set once at creation and never updated on login.
    pub last_login: String,
    pub admin: bool,
    pub admin_grade: u8,
}

/// In-memory user table plus the path of its backing snapshot.
///
/// Not internally synchronized; the owning registry serializes access.
pub(crate) struct UserTable {
    users: HashMap<String, User>,
    path: PathBuf,
}

impl UserTable {
    /// Load the table from `data_dir`, bootstrapping a default admin
    /// account when no usable snapshot exists.
    pub(crate) fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(USERS_FILE);
        let users = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, User>>(&bytes) {
                Ok(users) => Some(users),
                Err(e) => {
                    tracing::error!("Unable to parse {}: {e}", path.display());
                    None
                }
            },
            Err(_) => None,
        };

        let mut table = Self {
            users: users.unwrap_or_default(),
            path,
        };
        if table.users.is_empty() {
            table.bootstrap_default_admin(data_dir);
        }
        table
    }

    /// Create the default `admin` record with a generated password,
    /// surface the password once, and persist the fresh table.
    fn bootstrap_default_admin(&mut self, data_dir: &Path) {
        let password = generate_password();
        let salt = generate_salt();
        let now = now_rfc3339();
        self.users.insert(
            "admin".to_string(),
            User {
                username: "admin".to_string(),
                password: hash_password(&password, &salt),
                salt,
                created_at: now,
                last_login: epoch_rfc3339(),
                admin: true,
                admin_grade: 0,
            },
        );

        tracing::warn!("No users found, created a default admin account");
        tracing::warn!("Admin username: admin");
        tracing::warn!("Admin password: {password}");
        tracing::warn!("Change the default admin password after your first login");

        let recovery = data_dir.join(RECOVERY_FILE);
        if let Err(e) = std::fs::write(
            &recovery,
            format!("Username: admin\nTemporary Password: {password}\n"),
        ) {
            tracing::error!("Unable to write {}: {e}", recovery.display());
        }
        self.save();
    }

    /// Snapshot the full table to disk. Failures are logged; the
    /// in-memory table stays authoritative until the next write.
    pub(crate) fn save(&self) {
        let data = match serde_json::to_vec_pretty(&self.users) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Unable to serialize user table: {e}");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, data) {
            tracing::error!("Unable to write {}: {e}", self.path.display());
        }
    }

    pub(crate) fn exists(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub(crate) fn get(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    /// Verify a password attempt against the stored verifier.
    pub(crate) fn authenticate(&self, username: &str, password: &str) -> bool {
        let Some(user) = self.users.get(username) else {
            // Dummy hash to keep the miss path the same cost as a hit.
            let _ = hash_password(password, "0000000000000000");
            return false;
        };
        let attempt = hash_password(password, &user.salt);
        constant_time_eq(attempt.as_bytes(), user.password.as_bytes())
    }

    /// Create a user with a fresh salt. Returns false (no overwrite)
    /// when the username is taken or unusable as a directory name.
    pub(crate) fn create(&mut self, username: &str, password: &str, admin: bool, grade: u8) -> bool {
        if !valid_username(username) || self.exists(username) {
            return false;
        }
        let salt = generate_salt();
        self.insert(User {
            username: username.to_string(),
            password: hash_password(password, &salt),
            salt,
            created_at: now_rfc3339(),
            last_login: epoch_rfc3339(),
            admin,
            admin_grade: grade,
        });
        true
    }

    /// Insert a fully-formed record (used when promoting an account
    /// request that already carries its verifier and salt).
    pub(crate) fn insert(&mut self, user: User) {
        self.users.insert(user.username.clone(), user);
        self.save();
    }

    /// Recompute the verifier with the record's existing salt (no salt
    /// rotation). Returns false when the user does not exist.
    pub(crate) fn change_password(&mut self, username: &str, new_password: &str) -> bool {
        let Some(user) = self.users.get_mut(username) else {
            return false;
        };
        user.password = hash_password(new_password, &user.salt);
        self.save();
        true
    }

    pub(crate) fn usernames(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }
}

/// Usernames double as directory names under the per-user file area,
/// so anything that could escape or confuse a path is rejected.
pub(crate) fn valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= 64
        && !username.contains(['/', '\\', ':'])
        && username != "."
        && username != ".."
}

// ── Cryptographic helpers ───────────────────────────────────────────

/// Generate a random salt (hex-encoded).
pub(crate) fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Single-pass salted digest: sha256(password || salt), hex-encoded.
pub(crate) fn hash_password(password: &str, salt: &str) -> String {
    let mut hash = Sha256::new();
    hash.update(password.as_bytes());
    hash.update(salt.as_bytes());
    hex::encode(hash.finalize())
}

/// Random alphanumeric password for the bootstrapped admin account.
fn generate_password() -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut bytes = [0u8; GENERATED_PASSWORD_LEN];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| CHARS[(*b as usize) % CHARS.len()] as char)
        .collect()
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Placeholder timestamp for the write-only `last_login` field.
pub(crate) fn epoch_rfc3339() -> String {
    chrono::DateTime::from_timestamp(0, 0)
        .unwrap_or_default()
        .to_rfc3339()
}

// ── Tests ───────────────────────────────────────────────────────────
