//! Pawlink daemon entrypoint.
//!
//! A small, single-writer service that owns the tag registry, the owner
//! and pet records, and the append-only scan log. Clients speak a
//! line-delimited JSON protocol over a Unix socket; every method maps
//! onto one core operation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fs_err as fs;
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pawlink_core::ActivationRequest;
use pawlink_daemon_protocol::{
    parse_claim, parse_deactivate, parse_params, parse_recent_scans, parse_record_scan,
    ActivateLostParams, CompleteClaimParams, EntryParams, ErrorInfo, Method, Request, Response,
    ResumeSessionParams, SavePetParams, UpdateOwnerParams, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};

mod config;
mod db;
mod geo;
mod state;

use db::Db;
use state::AppState;

const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT: Duration = Duration::from_secs(2);
const READ_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Parser)]
#[command(name = "pawlink-daemon", about = "Pawlink single-writer daemon")]
struct Args {
    /// Unix socket path. Defaults to ~/.pawlink/daemon.sock.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// SQLite database path. Defaults to ~/.pawlink/state.db.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Optional TOML config file for resolver budgets and the IP
    /// geolocation endpoint.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Provision tags at startup, format CODE:PIN. Repeatable.
    #[arg(long = "seed-tag", value_name = "CODE:PIN")]
    seed_tags: Vec<String>,
}

#[tokio::main]
async fn main() {
    init_logging();
    let args = Args::parse();

    let config = match config::load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load daemon config; using defaults");
            config::DaemonConfig::default()
        }
    };

    let socket_path = match args.socket.map(Ok).unwrap_or_else(default_socket_path) {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon socket path");
            std::process::exit(1);
        }
    };

    let db_path = match args.db.map(Ok).unwrap_or_else(default_db_path) {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon database path");
            std::process::exit(1);
        }
    };

    if let Err(err) = prepare_parent_dir(&db_path) {
        error!(error = %err, "Failed to prepare daemon data directory");
        std::process::exit(1);
    }

    let db = match Db::new(db_path) {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "Failed to initialize daemon database");
            std::process::exit(1);
        }
    };

    for entry in &args.seed_tags {
        match entry.split_once(':') {
            Some((code, pin)) if !code.is_empty() && !pin.is_empty() => {
                if let Err(err) = db.insert_tag(code, pin) {
                    warn!(code, error = %err, "Failed to seed tag");
                }
            }
            _ => warn!(entry = %entry, "Ignoring malformed --seed-tag value"),
        }
    }

    if let Err(err) = prepare_parent_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(path = %socket_path.display(), "Pawlink daemon started");

    let shared_state = Arc::new(AppState::new(db, config));

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let state = Arc::clone(&shared_state);
                tokio::spawn(handle_connection(stream, state));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn init_logging() {
    let debug_enabled = std::env::var("PAWLINK_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn default_socket_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".pawlink").join(SOCKET_NAME))
}

fn default_db_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".pawlink").join("state.db"))
}

fn prepare_parent_dir(path: &Path) -> Result<(), String> {
    let parent = path
        .parent()
        .ok_or_else(|| "Path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

async fn handle_connection(mut stream: UnixStream, state: Arc<AppState>) {
    let request = match read_request(&mut stream).await {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response).await;
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, &state).await;
    let _ = write_response(&mut stream, response).await;
}

async fn read_request(
    stream: &mut (impl AsyncRead + Unpin),
) -> Result<Request, ErrorInfo> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        let n = match timeout(READ_TIMEOUT, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(err)) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ))
            }
            Err(_) => return Err(ErrorInfo::new("read_timeout", "request timed out")),
        };

        buffer.extend_from_slice(&chunk[..n]);
        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(ErrorInfo::new(
                "request_too_large",
                "request exceeded maximum size",
            ));
        }
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }

    if buffer.is_empty() {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let request_bytes = match newline_index {
        Some(index) => {
            let trailing = &buffer[index + 1..];
            if trailing.iter().any(|b| !b.is_ascii_whitespace()) {
                warn!("Extra bytes detected after newline; ignoring trailing data");
            }
            &buffer[..index]
        }
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

async fn write_response(
    stream: &mut (impl AsyncWrite + Unpin),
    response: Response,
) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec(&response)?;
    payload.push(b'\n');
    stream.write_all(&payload).await?;
    stream.flush().await
}

fn ok_json<T: Serialize>(id: Option<String>, value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(
            id,
            "serialization_error",
            format!("Failed to serialize response: {}", err),
        ),
    }
}

fn core_error(id: Option<String>, err: pawlink_core::CoreError) -> Response {
    Response::error(id, err.code(), err.to_string())
}

async fn handle_request(request: Request, state: &AppState) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    let id = request.id;
    match request.method {
        Method::GetHealth => Response::ok(
            id,
            json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
            }),
        ),
        Method::EntryDecision => {
            let params: EntryParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            let code = match params.resolve_code() {
                Ok(code) => code,
                Err(err) => return Response::error_with_info(id, err),
            };
            match state.entry_decision(&code).await {
                Ok(decision) => ok_json(id, &decision),
                Err(err) => core_error(id, err),
            }
        }
        Method::ClaimOrAuthenticate => {
            let params = match parse_claim(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match state.claim_or_authenticate(&params.code, &params.pin).await {
                Ok(outcome) => ok_json(id, &outcome),
                Err(err) => core_error(id, err),
            }
        }
        Method::CompleteClaim => {
            let params: CompleteClaimParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match state.complete_claim(params.owner).await {
                Ok(session) => ok_json(id, &session),
                Err(err) => core_error(id, err),
            }
        }
        Method::UpdateOwner => {
            let params: UpdateOwnerParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match state.update_owner(&params.session, params.owner).await {
                Ok(session) => ok_json(id, &session),
                Err(err) => core_error(id, err),
            }
        }
        Method::SavePet => {
            let params: SavePetParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match state.save_pet(&params.session, params.pet).await {
                Ok(pet) => ok_json(id, &pet),
                Err(err) => core_error(id, err),
            }
        }
        Method::ActivateLost => {
            let params: ActivateLostParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            let request = ActivationRequest {
                consent: params.consent,
                location: params.location,
                message: params.message,
            };
            match state.activate_lost(&params.session, request).await {
                Ok(pet) => ok_json(id, &pet),
                Err(err) => core_error(id, err),
            }
        }
        Method::DeactivateLost => {
            let params = match parse_deactivate(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match state.deactivate_lost(&params.session, &params.pin).await {
                Ok(pet) => ok_json(id, &pet),
                Err(err) => core_error(id, err),
            }
        }
        Method::RecordScan => {
            let params = match parse_record_scan(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            let event_id = state.record_scan(params).await;
            Response::ok(
                id,
                json!({ "acknowledged": true, "event_id": event_id }),
            )
        }
        Method::RecentScans => {
            let params = match parse_recent_scans(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match state.recent_scans(&params.session, params.limit).await {
                Ok(events) => ok_json(id, &events),
                Err(err) => core_error(id, err),
            }
        }
        Method::ResumeSession => {
            let params: ResumeSessionParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match state.resume_session(&params.session).await {
                Ok(snapshot) => ok_json(id, &snapshot),
                Err(err) => core_error(id, err),
            }
        }
    }
}
