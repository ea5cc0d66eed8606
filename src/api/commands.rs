//! Command dispatch and handlers.
//!
//! Dispatch resolves the wire command name against a closed enum; an
//! unrecognized name gets a defined `fail` response instead of ever
//! reaching a handler. The table itself performs no gating; each
//! handler enforces its own authorization precondition, and argument
//! counts are validated before any side effect, naming the expected
//! shape on mismatch. Nothing here propagates an error out of the
//! connection task: every outcome becomes a response envelope.

use super::protocol::{CommandEnvelope, CommandKind, Response};
use super::session::Session;
use super::ServerContext;
use crate::scripts::{ScriptArea, ScriptError};
use crate::files::UserFileError;
use serde::Serialize;

/// Fallback admin grade when the accept argument does not parse.
const DEFAULT_ACCEPT_GRADE: u8 = 5;

const NOT_LOGGED_IN: &str = "You need to be logged in";
const ADMIN_ONLY: &str = "You need to be logged in to have access to this functionality";

/// Resolve and run one parsed command, producing exactly one response.
pub async fn dispatch(
    envelope: &CommandEnvelope,
    session: &mut Session,
    ctx: &ServerContext,
) -> Response {
    let Some(kind) = CommandKind::parse(&envelope.cmd) else {
        tracing::debug!(session = %session.id(), cmd = %envelope.cmd, "Unknown command");
        return Response::fail(&envelope.cmd, format!("Unknown command: {}", envelope.cmd));
    };

    match kind {
        CommandKind::ConsoleCmd => console_cmd(envelope, session, ctx).await,
        CommandKind::LoginAttempt => login_attempt(envelope, session, ctx),
        CommandKind::RequestAccount => request_account(envelope, ctx),
        CommandKind::ListAccountRequests => list_account_requests(envelope, session, ctx),
        CommandKind::AcceptAccountRequest => accept_account_request(envelope, session, ctx),
        CommandKind::ListUserFolder => list_user_folder(envelope, session, ctx),
        CommandKind::CreateUserFolder => create_user_folder(envelope, session, ctx),
        CommandKind::UploadUserFile => upload_user_file(envelope, session, ctx),
        CommandKind::UploadScript => upload_script(envelope, session, ctx),
        CommandKind::ListScripts => list_scripts(envelope, session, ctx),
        CommandKind::RunScript => run_script(envelope, session, ctx).await,
        CommandKind::Exit => exit(envelope, session),
    }
}

// ── Public commands ─────────────────────────────────────────────────

fn login_attempt(env: &CommandEnvelope, session: &mut Session, ctx: &ServerContext) -> Response {
    let kind = CommandKind::LoginAttempt.name();
    if env.args.len() != 2 {
        return Response::unauthorized(kind, "You need 2 arguments: username, password");
    }
    match ctx.accounts.login(&env.args[0], &env.args[1]) {
        Some(identity) => {
            tracing::info!(session = %session.id(), user = %identity.username, "Login");
            session.authenticate(identity.username, identity.admin);
            Response::success(kind, "Logged in successfully")
        }
        None => Response::fail(kind, "Invalid username or password"),
    }
}

fn request_account(env: &CommandEnvelope, ctx: &ServerContext) -> Response {
    let kind = CommandKind::RequestAccount.name();
    if env.args.len() != 2 {
        return Response::unauthorized(kind, "You need 2 arguments: username, password");
    }
    match ctx.accounts.request_account(&env.args[0], &env.args[1]) {
        Ok(()) => Response::success(kind, "Request placed successfully"),
        Err(e) => Response::fail(kind, e.to_string()),
    }
}

fn exit(env: &CommandEnvelope, session: &mut Session) -> Response {
    let kind = CommandKind::Exit.name();
    if !env.args.is_empty() {
        return Response::fail(kind, "exit takes no arguments");
    }
    session.request_close();
    Response::success(kind, "Closing connection")
}

// ── Administrative commands ─────────────────────────────────────────

async fn console_cmd(env: &CommandEnvelope, session: &Session, ctx: &ServerContext) -> Response {
    let kind = CommandKind::ConsoleCmd.name();
    if !session.is_admin() {
        return Response::unauthorized(
            kind,
            "You need to be logged in as an administrator to run shell commands",
        );
    }
    if env.args.is_empty() {
        return Response::unauthorized(kind, "You need at least one argument: command, args...");
    }

    let output = ctx.runner.run_command(&env.args).await;
    if output.out.is_empty() && output.error.is_empty() {
        return Response::fail(kind, "Empty result");
    }
    Response::success(kind, encode(&output))
}

fn list_account_requests(
    env: &CommandEnvelope,
    session: &Session,
    ctx: &ServerContext,
) -> Response {
    let kind = CommandKind::ListAccountRequests.name();
    if !session.is_admin() {
        return Response::unauthorized(kind, ADMIN_ONLY);
    }
    if !env.args.is_empty() {
        return Response::fail(kind, "list_account_requests takes no arguments");
    }
    Response::success(kind, encode(&ctx.accounts.list_requests()))
}

fn accept_account_request(
    env: &CommandEnvelope,
    session: &Session,
    ctx: &ServerContext,
) -> Response {
    let kind = CommandKind::AcceptAccountRequest.name();
    if !session.is_admin() {
        return Response::unauthorized(kind, ADMIN_ONLY);
    }
    if env.args.len() != 3 {
        return Response::fail(kind, "You need 3 arguments: username, is_admin, admin_grade");
    }
    let admin = env.args[1] == "true";
    // An unparseable grade falls back to the default instead of
    // failing the whole acceptance.
    let grade = env.args[2].parse().unwrap_or(DEFAULT_ACCEPT_GRADE);
    match ctx.accounts.accept_request(&env.args[0], admin, grade) {
        Ok(()) => {
            tracing::info!(session = %session.id(), user = %env.args[0], "Account request accepted");
            Response::success(kind, "User request has been accepted")
        }
        Err(e) => Response::fail(kind, e.to_string()),
    }
}

// ── Script commands ─────────────────────────────────────────────────

async fn run_script(env: &CommandEnvelope, session: &Session, ctx: &ServerContext) -> Response {
    let kind = CommandKind::RunScript.name();
    if !session.is_authenticated() {
        return Response::fail(kind, NOT_LOGGED_IN);
    }
    if env.args.is_empty() || env.args.len() > 2 {
        return Response::unauthorized(kind, "You need 1 or 2 arguments: script_name, area");
    }

    // The private area is reachable only by an admin session that
    // explicitly selects a non-public area; everyone else gets public.
    let area = if session.is_admin() && env.args.len() == 2 && env.args[1] != "public" {
        ScriptArea::Private
    } else {
        ScriptArea::Public
    };

    let path = match ctx.scripts.resolve(area, &env.args[0]) {
        Ok(path) => path,
        Err(_) => return Response::fail(kind, "Invalid script name"),
    };
    let output = ctx.runner.run_script(&path, &[]).await;
    Response::success(kind, encode(&output))
}

fn list_scripts(env: &CommandEnvelope, session: &Session, ctx: &ServerContext) -> Response {
    let kind = CommandKind::ListScripts.name();
    if !session.is_authenticated() {
        return Response::fail(kind, NOT_LOGGED_IN);
    }
    if !env.args.is_empty() {
        return Response::fail(kind, "list_scripts takes no arguments");
    }

    #[derive(Serialize)]
    struct TotalScripts {
        scripts: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        private: Option<Vec<String>>,
    }

    let listing = TotalScripts {
        scripts: ctx.scripts.list(ScriptArea::Public),
        private: session
            .is_admin()
            .then(|| ctx.scripts.list(ScriptArea::Private)),
    };
    Response::success(kind, encode(&listing))
}

fn upload_script(env: &CommandEnvelope, session: &Session, ctx: &ServerContext) -> Response {
    let kind = CommandKind::UploadScript.name();
    if !session.is_authenticated() {
        return Response::fail(kind, NOT_LOGGED_IN);
    }
    if env.args.len() != 3 {
        return Response::fail(
            kind,
            "You need 3 arguments: is_public, script_name, script_content",
        );
    }
    let area = if env.args[0] == "true" {
        ScriptArea::Public
    } else {
        ScriptArea::Private
    };
    if area == ScriptArea::Private && !session.is_admin() {
        return Response::unauthorized(
            kind,
            "Uploading to the private script area requires administrator access",
        );
    }
    match ctx.scripts.upload(area, &env.args[1], &env.args[2]) {
        Ok(()) => Response::success(kind, "Script uploaded successfully"),
        Err(e @ (ScriptError::InvalidName | ScriptError::AlreadyExists)) => {
            Response::fail(kind, e.to_string())
        }
        Err(ScriptError::Io(e)) => {
            tracing::error!(session = %session.id(), "Script upload failed: {e}");
            Response::fail(kind, "Unable to upload script")
        }
    }
}

// ── Personal file-area commands ─────────────────────────────────────

fn upload_user_file(env: &CommandEnvelope, session: &Session, ctx: &ServerContext) -> Response {
    let kind = CommandKind::UploadUserFile.name();
    let Some(username) = session.username() else {
        return Response::fail(kind, NOT_LOGGED_IN);
    };
    if env.args.len() != 2 {
        return Response::fail(kind, "You need 2 arguments for this: path, file_content");
    }
    match ctx.files.write_file(username, &env.args[0], &env.args[1]) {
        Ok(()) => Response::success(kind, "File uploaded successfully"),
        Err(UserFileError::InvalidPath) => Response::fail(kind, "Invalid path"),
        Err(e) => {
            tracing::error!(session = %session.id(), "File upload failed: {e}");
            Response::fail(kind, "Unable to upload file")
        }
    }
}

fn create_user_folder(env: &CommandEnvelope, session: &Session, ctx: &ServerContext) -> Response {
    let kind = CommandKind::CreateUserFolder.name();
    let Some(username) = session.username() else {
        return Response::fail(kind, NOT_LOGGED_IN);
    };
    if env.args.len() != 1 {
        return Response::fail(kind, "You need 1 argument: path");
    }
    match ctx.files.create_folder(username, &env.args[0]) {
        Ok(()) => Response::success(kind, "Folder created successfully"),
        Err(UserFileError::InvalidPath) => Response::fail(kind, "Invalid path"),
        Err(e) => {
            tracing::error!(session = %session.id(), "Folder creation failed: {e}");
            Response::fail(kind, "Unable to create folder")
        }
    }
}

fn list_user_folder(env: &CommandEnvelope, session: &Session, ctx: &ServerContext) -> Response {
    let kind = CommandKind::ListUserFolder.name();
    let Some(username) = session.username() else {
        return Response::fail(kind, NOT_LOGGED_IN);
    };
    if env.args.len() != 1 {
        return Response::fail(kind, "You need 1 argument: path");
    }
    match ctx.files.list_folder(username, &env.args[0]) {
        Ok(entries) => Response::success(kind, encode(&entries)),
        Err(UserFileError::InvalidPath) => Response::fail(kind, "Invalid path"),
        Err(UserFileError::UnknownPath) => Response::fail(kind, "Unknown path"),
        Err(UserFileError::Io(e)) => {
            tracing::error!(session = %session.id(), "Folder listing failed: {e}");
            Response::fail(kind, "Unable to read folder contents")
        }
    }
}

/// Nested-JSON payloads ride inside the response `message` string.
fn encode<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!("Unable to encode response payload: {e}");
        String::new()
    })
}

// ── Tests ───────────────────────────────────────────────────────────
