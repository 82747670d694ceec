//! HTTP server exposing the structure store as a JSON API
//!
//! `structure-store serve` → starts a blocking server on localhost.
//! Routing lives in [`dispatch`], which takes the request pieces and
//! returns a status plus a JSON body, so it can be driven without a socket.

use crate::db::{CreateStructure, Database, StructureUpdate};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::io::Read;
use tiny_http::{Header, Method, Request, Response, Server};

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }
}

impl ApiResponse<()> {
    fn failure(message: String) -> Self {
        Self { ok: false, data: None, error: Some(message) }
    }
}

#[derive(Deserialize, Debug, Default)]
struct ListParams {
    #[serde(default)]
    include_deleted: bool,
}

/// Status code and serialized envelope for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(_) => ApiError::BadRequest(e.to_string()),
            StoreError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

type Handled = Result<(u16, serde_json::Value), ApiError>;

/// Start server and serve requests until the process exits
pub fn start(port: u16, db: Database) -> std::io::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let server = Server::http(&addr).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    log::info!("serving {} on http://{}", db.path().display(), addr);

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, &db) {
            log::error!("failed to respond: {}", e);
        }
    }

    Ok(())
}

fn handle_request(mut request: Request, db: &Database) -> std::io::Result<()> {
    let method = request.method().clone();
    let url = request.url().to_string();

    let mut raw = Vec::new();
    let reply = match request.as_reader().read_to_end(&mut raw) {
        Ok(_) => match decode_body(raw) {
            Ok(body) => dispatch(db, &method, &url, &body),
            Err(reply) => reply,
        },
        Err(e) => failure(400, format!("Unreadable body: {}", e)),
    };
    log::debug!("{} {} -> {}", method, url, reply.status);

    let mut response = Response::from_string(reply.body).with_status_code(reply.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response.add_header(header);
    }
    request.respond(response)
}

/// Request bodies must be UTF-8; anything else is answered with a 400
pub fn decode_body(raw: Vec<u8>) -> Result<String, ApiReply> {
    String::from_utf8(raw).map_err(|e| failure(400, format!("Invalid body: {}", e)))
}

/// Route one request against the store
pub fn dispatch(db: &Database, method: &Method, url: &str, body: &str) -> ApiReply {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let handled = match (method, segments.as_slice()) {
        (Method::Post, ["api", "structures"]) => create(db, body),
        (Method::Get, ["api", "structures", id]) => {
            parse_id(id).and_then(|id| json(200, db.find_by_id(id)?))
        }
        (Method::Patch, ["api", "structures", id]) => parse_id(id).and_then(|id| update(db, id, body)),
        (Method::Delete, ["api", "structures", id]) => {
            parse_id(id).and_then(|id| json(200, db.soft_delete(id)?))
        }
        (Method::Post, ["api", "structures", id, "restore"]) => {
            parse_id(id).and_then(|id| json(200, db.restore(id)?))
        }
        (Method::Get, ["api", "connections", cid, "structures"]) => {
            parse_id(cid).and_then(|cid| list(db, cid, query))
        }
        (Method::Get, ["api", "connections", cid, "structures", "latest"]) => {
            parse_id(cid).and_then(|cid| latest(db, cid))
        }
        (Method::Get, ["api", "summary"]) => db
            .get_summary()
            .map_err(ApiError::from)
            .and_then(|summary| json(200, summary)),
        _ => Err(ApiError::NotFound(format!("No route for {} {}", method, path))),
    };

    match handled {
        Ok((status, data)) => reply(status, &ApiResponse::success(data)),
        Err(ApiError::BadRequest(msg)) => failure(400, msg),
        Err(ApiError::NotFound(msg)) => failure(404, msg),
        Err(ApiError::Internal(msg)) => failure(500, format!("{} {}: {}", method, path, msg)),
    }
}

fn create(db: &Database, body: &str) -> Handled {
    let input: CreateStructure = if body.trim().is_empty() {
        CreateStructure::default()
    } else {
        serde_json::from_str(body).map_err(|e| ApiError::BadRequest(format!("Invalid body: {}", e)))?
    };
    json(201, db.create_from(&input)?)
}

fn update(db: &Database, id: i64, body: &str) -> Handled {
    let changes: StructureUpdate =
        serde_json::from_str(body).map_err(|e| ApiError::BadRequest(format!("Invalid body: {}", e)))?;
    json(200, db.update(id, &changes)?)
}

fn list(db: &Database, connection_id: i64, query: &str) -> Handled {
    let params: ListParams = serde_urlencoded::from_str(query)
        .map_err(|e| ApiError::BadRequest(format!("Invalid query: {}", e)))?;
    json(200, db.list_by_connection(connection_id, params.include_deleted)?)
}

fn latest(db: &Database, connection_id: i64) -> Handled {
    match db.latest_for_connection(connection_id)? {
        Some(record) => json(200, record),
        None => Err(ApiError::NotFound(format!(
            "No live structure for connection {}",
            connection_id
        ))),
    }
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid id '{}'", raw)))
}

fn json<T: Serialize>(status: u16, data: T) -> Handled {
    Ok((status, serde_json::to_value(data)?))
}

fn failure(status: u16, message: String) -> ApiReply {
    if status >= 500 {
        log::error!("request failed: {}", message);
    } else {
        log::warn!("request rejected: {}", message);
    }
    reply(status, &ApiResponse::<()>::failure(message))
}

fn reply<T: Serialize>(status: u16, envelope: &ApiResponse<T>) -> ApiReply {
    match serde_json::to_string(envelope) {
        Ok(body) => ApiReply { status, body },
        Err(e) => ApiReply {
            status: 500,
            body: format!(r#"{{"ok":false,"data":null,"error":"{}"}}"#, e),
        },
    }
}
