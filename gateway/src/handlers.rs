//! Request state machines.
//!
//! Every handler is a two-phase pipeline: dispatch (validate, build the
//! request, issue the storage operation) and completion (interpret the
//! aggregated result, render the response). Validation and auth failures
//! short-circuit in dispatch; everything else surfaces after the await.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use balancer::Mastermind;
use chrono::DateTime;
use storage::{Key, ScatterResult, Session, WriteMode, UF_EMBEDS};
use tracing::{debug, error, info};

use crate::auth;
use crate::container::DataContainer;
use crate::error::{GatewayError, GatewayResult};
use crate::lookup::{render_addr, LookupEntry};
use crate::query::Query;
use crate::registry::{split_target, Registry};
use crate::resolve;
use crate::xml;

/// Process-wide read-only context injected into every request.
pub struct AppState {
    /// Ambient session template; requests take private clones.
    pub session: Session,
    pub balancer: Arc<dyn Mastermind>,
    pub registry: Registry,
    /// Minimum live storage connections required to attempt an operation.
    pub die_limit: usize,
    /// Appended to reverse-resolved hostnames in download-info responses.
    pub sign_port: Option<String>,
}

const CONTENT_TYPE: &str = "content-type";
const TEXT_PLAIN: &str = "text/plain";
const TEXT_XML: &str = "text/xml";

fn http_date(seconds: u64) -> String {
    DateTime::from_timestamp(seconds as i64, 0)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

// ---------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------

pub async fn upload(state: Arc<AppState>, req: Request<Body>) -> GatewayResult<Response> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let query = Query::parse(parts.uri.query());

    let payload = to_bytes(body, usize::MAX)
        .await
        .map_err(|err| GatewayError::Internal(format!("cannot read request body: {err}")))?;
    info!("upload: handle request: {path}; body size: {}", payload.len());
    debug!(headers = ?parts.headers, "upload: request headers");

    let target = split_target(&path)
        .ok_or_else(|| GatewayError::Validation("upload: cannot determine a namespace".into()))?;
    let namespace = state
        .registry
        .get(&target.namespace)
        .ok_or_else(|| GatewayError::Validation("upload: cannot determine a namespace".into()))?;
    auth::check_basic_auth(namespace, &parts.headers)?;

    let mut session = state.session.clone_session();
    resolve::apply_success_policy(&mut session, namespace);
    session.set_groups(resolve::upload_groups(&*state.balancer, namespace));

    if session.live_connection_count() < state.die_limit {
        return Err(GatewayError::Precondition(
            "too low number of existing states".into(),
        ));
    }

    let key = Key::from_name(target.filename);

    let mut container = DataContainer::new(payload);
    if query.has_item("embed") || query.has_item("embed_timestamp") {
        container.set_timestamp(query.get_arg("timestamp", 0u64)?);
    }
    if container.embeds_count() != 0 {
        session.set_user_flags(session.user_flags() | UF_EMBEDS);
    }
    // the container envelope is written unconditionally; the embed flag
    // only tells the read path whether to parse it
    let content = container.pack();

    let offset = query.get_arg("offset", 0u64)?;
    let mode = if let Some(raw) = query.item_value("prepare") {
        let size = raw.parse().map_err(|_| {
            GatewayError::Validation(format!("malformed query value 'prepare': {raw}"))
        })?;
        WriteMode::Prepare { size }
    } else if let Some(raw) = query.item_value("commit") {
        let size = raw.parse().map_err(|_| {
            GatewayError::Validation(format!("malformed query value 'commit': {raw}"))
        })?;
        WriteMode::Commit { size }
    } else if query.has_item("plain_write") || query.has_item("plain-write") {
        WriteMode::Plain
    } else {
        WriteMode::Data
    };

    info!(
        "upload: writing content by key={} into groups={:?}",
        key.name(),
        session.groups()
    );
    let result = session.write(&key, content.clone(), offset, mode).await?;

    finish_upload(&session, &key, content.len(), result, state.sign_port.clone())
}

/// Completion half of the upload pipeline.
fn finish_upload(
    session: &Session,
    key: &Key,
    content_len: usize,
    result: ScatterResult,
    sign_port: Option<String>,
) -> GatewayResult<Response> {
    debug!("upload: prepare response");

    if let Some(err) = result.error {
        error!(
            "upload finish ERROR: {err}; wrote into groups: {:?}; cannot write into: {:?}",
            result.good_groups, result.bad_groups
        );
        return Err(GatewayError::ReplicationPolicy);
    }

    let mut entries = Vec::with_capacity(result.entries.len());
    for entry in &result.entries {
        // transport-level failures carry no address or file-info record
        let (addr, path) = if entry.addr.is_empty() {
            (String::new(), String::new())
        } else {
            let parsed = LookupEntry::new(entry, sign_port.clone());
            (parsed.addr()?, parsed.full_path()?)
        };
        entries.push(xml::CompleteEntry {
            addr,
            path,
            group: entry.group,
            status: entry.status,
        });
    }

    let min_group = session.groups().iter().min().copied().unwrap_or(0);
    let body = xml::render_upload_post(
        key.name(),
        &key.id_hex(),
        result.entries.len(),
        content_len,
        min_group,
        &entries,
    );

    info!(
        "upload: done; status code: 200; wrote into groups: {:?}",
        result.good_groups
    );
    Ok((StatusCode::OK, [(CONTENT_TYPE, TEXT_PLAIN)], body).into_response())
}

// ---------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------

pub async fn get(state: Arc<AppState>, req: Request<Body>) -> GatewayResult<Response> {
    let path = req.uri().path().to_string();
    info!("get: handle request: {path}");
    let query = Query::parse(req.uri().query());

    let target = resolve::resolve_target(&*state.balancer, &path);
    let mut session = state.session.clone_session();
    session.set_groups(target.groups);
    if session.groups().is_empty() {
        return Err(GatewayError::NotFound("get: no replica groups".into()));
    }

    let offset = query.get_arg("offset", 0u64)?;
    let size = query.get_arg("size", 0u64)?;
    let if_modified_since = header_string(req.headers(), "if-modified-since");

    debug!("get: reading data");
    let result = session
        .read(&Key::from_name(target.filename), offset, size)
        .await?;

    let query_embeds = query.has_item("embed") || query.has_item("embed_timestamp");
    finish_get(result, query_embeds, if_modified_since)
}

/// Completion half of the get pipeline.
///
/// Whether the fetched bytes carry an embed region is decided by the
/// request's query flags OR'd with the stored user flag from the write
/// path; this out-of-band coupling is part of the write/read contract.
fn finish_get(
    result: storage::ReadResult,
    query_embeds: bool,
    if_modified_since: Option<String>,
) -> GatewayResult<Response> {
    debug!("get: prepare response");

    let embeds = query_embeds || result.user_flags & UF_EMBEDS != 0;
    let container = DataContainer::unpack(result.data, embeds)?;

    let mut last_modified = None;
    if let Some(seconds) = container.timestamp() {
        let stamp = http_date(seconds);
        if if_modified_since.as_deref() == Some(stamp.as_str()) {
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
        last_modified = Some(stamp);
    }

    debug!("get: sending response");
    let mut response =
        (StatusCode::OK, [(CONTENT_TYPE, TEXT_PLAIN)], container.payload).into_response();
    if let Some(stamp) = last_modified {
        response.headers_mut().insert(
            axum::http::header::LAST_MODIFIED,
            stamp.parse().map_err(|_| {
                GatewayError::Internal("unrenderable Last-Modified value".into())
            })?,
        );
    }
    Ok(response)
}

// ---------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------

pub async fn delete(state: Arc<AppState>, req: Request<Body>) -> GatewayResult<Response> {
    let path = req.uri().path().to_string();
    info!("delete: handle request: {path}");

    let target = split_target(&path)
        .ok_or_else(|| GatewayError::Validation("delete: cannot determine a namespace".into()))?;
    let namespace = state
        .registry
        .get(&target.namespace)
        .ok_or_else(|| GatewayError::Validation("delete: cannot determine a namespace".into()))?;
    auth::check_basic_auth(namespace, req.headers())?;

    let mut session = state.session.clone_session();
    let filename = match target.filename.split_once('/') {
        Some((token, filename)) => {
            session.set_groups(resolve::resolve_groups(&*state.balancer, token, filename));
            filename.to_string()
        }
        None => {
            info!("delete: cannot determine a group from key");
            String::new()
        }
    };
    if session.groups().is_empty() {
        return Err(GatewayError::NotFound("delete: no replica groups".into()));
    }

    if session.live_connection_count() < state.die_limit {
        return Err(GatewayError::Precondition(
            "too low number of existing states".into(),
        ));
    }
    session.set_collect_all(true);

    let key = Key::from_name(format!("{}.{}", namespace.name, filename));
    debug!("delete: removing data");
    let result = session.remove(&key).await?;

    if let Some(err) = result.error {
        error!("delete finish ERROR: {err}");
        return Err(GatewayError::Storage(err));
    }
    debug!("delete: sending reply");
    Ok(StatusCode::OK.into_response())
}

// ---------------------------------------------------------------------
// Download info
// ---------------------------------------------------------------------

pub async fn download_info(state: Arc<AppState>, req: Request<Body>) -> GatewayResult<Response> {
    let path = req.uri().path().to_string();
    info!("download info: handle request: {path}");

    let target = resolve::resolve_target(&*state.balancer, &path);
    let mut session = state.session.clone_session();
    session.set_groups(target.groups);
    if session.groups().is_empty() {
        return Err(GatewayError::NotFound("download info: no replica groups".into()));
    }
    session.set_collect_all(true);

    debug!("download info: looking up");
    let result = session.lookup(&Key::from_name(target.filename)).await?;

    finish_download_info(result, state.sign_port.clone())
}

/// Completion half of the download-info pipeline: first entry that
/// succeeded wins; a fully-failed lookup is a 503.
fn finish_download_info(
    result: ScatterResult,
    sign_port: Option<String>,
) -> GatewayResult<Response> {
    debug!("download info: prepare response");

    if let Some(err) = result.error {
        error!("download info finish ERROR: {err}");
        return Err(GatewayError::Storage(err));
    }

    for entry in &result.entries {
        if !entry.is_ok() {
            continue;
        }
        let parsed = LookupEntry::new(entry, sign_port.clone());
        let body = xml::render_download_info(&parsed.host()?, &parsed.path()?);
        return Ok((StatusCode::OK, [(CONTENT_TYPE, TEXT_XML)], body).into_response());
    }

    Err(GatewayError::AllLookupsFailed)
}

// ---------------------------------------------------------------------
// Stat log
// ---------------------------------------------------------------------

pub async fn stat_log(state: Arc<AppState>, req: Request<Body>) -> GatewayResult<Response> {
    info!("stat log: handle request: {}", req.uri().path());

    let session = state.session.clone_session();
    debug!("stat log: process 'stat_log'");
    let stats = session.cluster_stat().await?;

    let mut nodes = Vec::with_capacity(stats.len());
    for stat in &stats {
        let mut id = String::with_capacity(stat.id.len() * 2);
        for b in &stat.id {
            id.push_str(&format!("{b:02x}"));
        }
        nodes.push(xml::StatNode {
            addr: render_addr(&stat.addr)?,
            id,
            la: stat.la,
            vm_total: stat.vm_total,
            vm_free: stat.vm_free,
            vm_cached: stat.vm_cached,
            frsize: stat.frsize,
            bsize: stat.bsize,
            blocks: stat.blocks,
            bavail: stat.bavail,
            files: stat.files,
            fsid: stat.fsid,
        });
    }

    debug!("stat log: sending response");
    let body = xml::render_stat_log(&nodes);
    Ok((StatusCode::OK, [(CONTENT_TYPE, TEXT_XML)], body).into_response())
}

// ---------------------------------------------------------------------
// Ping
// ---------------------------------------------------------------------

pub async fn ping(state: Arc<AppState>, req: Request<Body>) -> GatewayResult<Response> {
    info!("ping: handle request: {}", req.uri().path());

    let session = state.session.clone_session();
    let code = if session.live_connection_count() < state.die_limit {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Ok(code.into_response())
}

// ---------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------

/// Recognized table flags, in the fixed order fields render in.
const CACHE_FIELDS: [&str; 4] = [
    "group-weights",
    "symmetric-groups",
    "bad-groups",
    "cache-groups",
];

pub async fn cache(state: Arc<AppState>, req: Request<Body>) -> GatewayResult<Response> {
    info!("cache: handle request: {}", req.uri().path());
    let query = Query::parse(req.uri().query());

    let mut fields = Vec::new();
    for name in CACHE_FIELDS {
        if !query.has_item(name) {
            continue;
        }
        let fragment = match name {
            "group-weights" => state.balancer.weights_json(),
            "symmetric-groups" => state.balancer.symmetric_groups_json(),
            "bad-groups" => state.balancer.bad_groups_json(),
            _ => state.balancer.cache_groups_json(),
        };
        fields.push((name, fragment));
    }

    debug!("cache: sending response");
    let body = xml::render_cache(&fields);
    Ok((StatusCode::OK, [(CONTENT_TYPE, TEXT_PLAIN)], body).into_response())
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}
