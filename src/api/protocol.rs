//! Wire envelopes for the command protocol.
//!
//! Inbound: one JSON object per line, `{"cmd": ..., "args": [...]}`.
//! Outbound: `{"status", "process_type", "message"}` where `message`
//! sometimes carries a nested JSON payload (listings, command output).

use serde::{Deserialize, Serialize};

/// A parsed inbound command line.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandEnvelope {
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Outcome classification carried on every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "fail")]
    Fail,
    #[serde(rename = "Unauthorized")]
    Unauthorized,
}

/// One response envelope per parsed command, echoing the command name
/// as `process_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub process_type: String,
    pub message: String,
}

impl Response {
    pub fn success(process_type: &str, message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            process_type: process_type.to_string(),
            message: message.into(),
        }
    }

    pub fn fail(process_type: &str, message: impl Into<String>) -> Self {
        Self {
            status: Status::Fail,
            process_type: process_type.to_string(),
            message: message.into(),
        }
    }

    pub fn unauthorized(process_type: &str, message: impl Into<String>) -> Self {
        Self {
            status: Status::Unauthorized,
            process_type: process_type.to_string(),
            message: message.into(),
        }
    }
}

/// The closed set of protocol commands. Dispatch matches exhaustively;
/// an unrecognized name never reaches a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    ConsoleCmd,
    LoginAttempt,
    RequestAccount,
    ListAccountRequests,
    AcceptAccountRequest,
    ListUserFolder,
    CreateUserFolder,
    UploadUserFile,
    UploadScript,
    ListScripts,
    RunScript,
    Exit,
}

impl CommandKind {
    /// Map a wire command name to its kind. `None` is the typed
    /// unknown-command outcome.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "console_cmd" => Self::ConsoleCmd,
            "login_attempt" => Self::LoginAttempt,
            "request_account" => Self::RequestAccount,
            "list_account_requests" => Self::ListAccountRequests,
            "accept_account_request" => Self::AcceptAccountRequest,
            "list_user_folder" => Self::ListUserFolder,
            "create_user_folder" => Self::CreateUserFolder,
            "upload_user_file" => Self::UploadUserFile,
            "upload_script" => Self::UploadScript,
            "list_scripts" => Self::ListScripts,
            "run_script" => Self::RunScript,
            "exit" => Self::Exit,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ConsoleCmd => "console_cmd",
            Self::LoginAttempt => "login_attempt",
            Self::RequestAccount => "request_account",
            Self::ListAccountRequests => "list_account_requests",
            Self::AcceptAccountRequest => "accept_account_request",
            Self::ListUserFolder => "list_user_folder",
            Self::CreateUserFolder => "create_user_folder",
            Self::UploadUserFile => "upload_user_file",
            Self::UploadScript => "upload_script",
            Self::ListScripts => "list_scripts",
            Self::RunScript => "run_script",
            Self::Exit => "exit",
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
