//! Reverse proxy to the upstream git host.
//!
//! Every request under the route prefix is checked against the access list
//! and forwarded upstream with the prefix stripped. `git-receive-pack`
//! bodies up to `max_push_body_bytes` are buffered so a copy can be decoded
//! and logged off the request task. Larger bodies are forwarded without
//! being decoded. The bytes sent upstream are always the bytes received.

use crate::access::{AccessList, RepoPath};
use crate::config::Config;
use crate::observability::{request_id_middleware, RequestId};
use axum::{
    body::{Body, BodyDataStream, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use flate2::read::GzDecoder;
use futures_util::{stream, StreamExt};
use gitgate_git::PushEvent;
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Path suffix of the push endpoint.
const RECEIVE_PACK_SUFFIX: &str = "/git-receive-pack";

/// Connection-scoped headers that are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Node configuration.
    pub config: Arc<Config>,
    /// Repositories allowed through the proxy.
    pub access: Arc<AccessList>,
    /// Client used for upstream requests.
    pub client: reqwest::Client,
}

impl AppState {
    /// Creates the state with a client that does not follow redirects.
    pub fn new(config: Config, access: AccessList) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            access: Arc::new(access),
            client,
        })
    }
}

/// Proxy error type.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("repository not allowed: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid upstream url: {0}")]
    Url(String),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ProxyError::Forbidden(_) => {
                (StatusCode::FORBIDDEN, "Repository not allowed".to_string())
            }
            ProxyError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ProxyError::Url(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ProxyError::Upstream(e) => {
                tracing::warn!(error = %e, "Upstream request failed");
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Creates the proxy router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .fallback(proxy_request)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Forwards a request to the upstream host.
pub async fn proxy_request(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ProxyError> {
    let path = request.uri().path().to_string();
    let repo = RepoPath::parse(&path, &state.config.route_prefix)
        .ok_or_else(|| ProxyError::NotFound(path.clone()))?;

    if !state.access.is_allowed(&repo) {
        tracing::warn!(
            owner = %repo.owner,
            name = %repo.name,
            slug = %repo.slug,
            "Blocked repo"
        );
        return Err(ProxyError::Forbidden(repo.slug));
    }

    let request_id = request.extensions().get::<RequestId>().cloned();
    let (parts, body) = request.into_parts();
    let url = upstream_url(&state.config, &parts.uri)?;
    let headers = forward_headers(&parts.headers);

    let mut upstream_request = state.client.request(parts.method.clone(), url).headers(headers);

    if parts.method == Method::POST && path.ends_with(RECEIVE_PACK_SUFFIX) {
        let limit = state.config.max_push_body_bytes;
        upstream_request = match read_push_body(body, &parts.headers, limit).await {
            PushBody::Buffered(bytes) => {
                spawn_observe_push(repo.clone(), bytes.clone(), &parts.headers, limit, request_id);
                upstream_request.body(bytes)
            }
            PushBody::Passthrough(body) => upstream_request.body(body),
        };
    } else if !matches!(parts.method, Method::GET | Method::HEAD) {
        let streamed = reqwest::Body::wrap_stream(body.into_data_stream());
        upstream_request = upstream_request.body(streamed);
    }

    let upstream = upstream_request.send().await?;

    tracing::debug!(
        slug = %repo.slug,
        status = upstream.status().as_u16(),
        "Upstream responded"
    );

    let status = upstream.status();
    let headers = forward_headers(upstream.headers());

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    Ok(response)
}

/// A push body as read for observation.
enum PushBody {
    /// The whole body, within the decode limit.
    Buffered(Bytes),
    /// Over the limit or cut short. Forwarded as received, never decoded.
    Passthrough(reqwest::Body),
}

/// Buffers a push body of at most `limit` bytes.
///
/// Anything larger is handed back as a stream that replays the bytes
/// already read, so the upstream still gets the whole request.
async fn read_push_body(body: Body, headers: &HeaderMap, limit: usize) -> PushBody {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let mut rest = body.into_data_stream();

    if let Some(len) = declared.filter(|len| *len > limit as u64) {
        tracing::warn!(bytes = len, limit, "Push body over decode limit, forwarding undecoded");
        return PushBody::Passthrough(reqwest::Body::wrap_stream(rest));
    }

    let mut chunks = Vec::new();
    let mut read = 0usize;

    while let Some(next) = rest.next().await {
        match next {
            Ok(chunk) => {
                read += chunk.len();
                chunks.push(chunk);
                if read > limit {
                    tracing::warn!(
                        bytes = read,
                        limit,
                        "Push body over decode limit, forwarding undecoded"
                    );
                    return PushBody::Passthrough(replay(chunks, None, rest));
                }
            }
            Err(e) => {
                tracing::warn!(bytes = read, error = %e, "Push body read failed");
                return PushBody::Passthrough(replay(chunks, Some(e), rest));
            }
        }
    }

    let mut buffered = Vec::with_capacity(read);
    for chunk in &chunks {
        buffered.extend_from_slice(chunk);
    }
    PushBody::Buffered(Bytes::from(buffered))
}

/// Chains already read chunks, and the read error if any, back onto the
/// remaining body.
fn replay(read: Vec<Bytes>, error: Option<axum::Error>, rest: BodyDataStream) -> reqwest::Body {
    let head = read.into_iter().map(Ok).chain(error.map(Err));
    reqwest::Body::wrap_stream(stream::iter(head).chain(rest))
}

/// Decodes a buffered push on the blocking pool, inside the request span.
fn spawn_observe_push(
    repo: RepoPath,
    body: Bytes,
    headers: &HeaderMap,
    limit: usize,
    request_id: Option<RequestId>,
) {
    let headers = headers.clone();
    let span = tracing::Span::current();

    tokio::task::spawn_blocking(move || {
        span.in_scope(|| observe_push(&repo, &body, &headers, limit, request_id.as_ref()));
    });
}

/// Decodes and logs a push body.
///
/// Never fails the request: an unreadable body is logged and `None` is
/// returned. A gzip body is inflated to at most `limit` bytes.
pub fn observe_push(
    repo: &RepoPath,
    body: &[u8],
    headers: &HeaderMap,
    limit: usize,
    request_id: Option<&RequestId>,
) -> Option<PushEvent> {
    let request_id = request_id.map_or("", |id| id.0.as_str());
    let gzipped = headers
        .get(header::CONTENT_ENCODING)
        .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"gzip"));

    let inflated;
    let body = if gzipped {
        let mut out = Vec::new();
        let mut decoder = GzDecoder::new(body).take(limit as u64 + 1);
        if let Err(e) = decoder.read_to_end(&mut out) {
            tracing::warn!(request_id, slug = %repo.slug, error = %e, "Failed to gunzip push body");
            return None;
        }
        if out.len() > limit {
            tracing::warn!(request_id, slug = %repo.slug, limit, "Gunzipped push body over limit");
            return None;
        }
        inflated = out;
        inflated.as_slice()
    } else {
        body
    };

    match PushEvent::decode(body) {
        Ok(event) => {
            log_push(repo, &event, request_id);
            Some(event)
        }
        Err(e) => {
            tracing::warn!(
                request_id,
                slug = %repo.slug,
                bytes = body.len(),
                error = %e,
                "Unparseable push body"
            );
            None
        }
    }
}

fn log_push(repo: &RepoPath, event: &PushEvent, request_id: &str) {
    match &event.commit {
        Some(commit) => tracing::info!(
            request_id,
            slug = %repo.slug,
            branch = %event.reference,
            old = %event.old_commit_id,
            new = %event.new_commit_id,
            parent = %commit.parent,
            author = %commit.author,
            email = %commit.email,
            date = %commit.date,
            message = %commit.message,
            "Push"
        ),
        None => tracing::info!(
            request_id,
            slug = %repo.slug,
            branch = %event.reference,
            old = %event.old_commit_id,
            new = %event.new_commit_id,
            "Push"
        ),
    }
}

/// Maps `{prefix}rest?query` onto the upstream base URL.
fn upstream_url(config: &Config, uri: &Uri) -> Result<reqwest::Url, ProxyError> {
    let path = uri.path();
    let rest = path.strip_prefix(config.route_prefix.as_str()).unwrap_or(path);

    let mut target = format!("{}/{}", config.upstream.trim_end_matches('/'), rest);
    if let Some(query) = uri.query() {
        target.push('?');
        target.push_str(query);
    }

    reqwest::Url::parse(&target).map_err(|e| ProxyError::Url(format!("{}: {}", target, e)))
}

/// Copies end-to-end headers.
fn forward_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !HOP_BY_HOP.contains(&name.as_str()) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use gitgate_git::{encode_line, ObjectKind, PackBuilder, FLUSH};
    use std::io::Write;

    const OLD: &str = "1111111111111111111111111111111111111111";
    const NEW: &str = "2222222222222222222222222222222222222222";
    const LIMIT: usize = 64 * 1024;

    fn repo() -> RepoPath {
        RepoPath::parse("/github.com/octo/hello.git/git-receive-pack", "/github.com/").unwrap()
    }

    fn push_body() -> Vec<u8> {
        let line = format!("{} {} refs/heads/main\0report-status\n", OLD, NEW);
        let pack = PackBuilder::new()
            .add(ObjectKind::Commit, b"tree t\nauthor A <a@x.com> 0 +0000\n\nhello".to_vec())
            .build()
            .unwrap();

        let mut body = encode_line(line.as_bytes());
        body.extend_from_slice(FLUSH);
        body.extend_from_slice(&pack);
        body
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn gzip_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers
    }

    #[test]
    fn test_observe_push() {
        let request_id = RequestId("req-1".to_string());
        let event =
            observe_push(&repo(), &push_body(), &HeaderMap::new(), LIMIT, Some(&request_id))
                .unwrap();
        assert_eq!(event.reference, "refs/heads/main");

        let commit = event.commit.unwrap();
        assert_eq!(commit.sha, NEW);
        assert_eq!(commit.parent, OLD);
        assert_eq!(commit.message, "hello");
    }

    #[test]
    fn test_observe_gzipped_push() {
        let gzipped = gzip(&push_body());

        let event = observe_push(&repo(), &gzipped, &gzip_headers(), LIMIT, None).unwrap();
        assert_eq!(event.new_commit_id, NEW);
    }

    #[test]
    fn test_observe_gzip_expansion_is_capped() {
        // Well under the limit compressed, far over it inflated.
        let bomb = gzip(&vec![0u8; 16 * LIMIT]);
        assert!(bomb.len() < LIMIT);

        assert!(observe_push(&repo(), &bomb, &gzip_headers(), LIMIT, None).is_none());
    }

    #[test]
    fn test_observe_gzip_at_limit() {
        let body = push_body();
        let gzipped = gzip(&body);

        assert!(observe_push(&repo(), &gzipped, &gzip_headers(), body.len(), None).is_some());
        assert!(observe_push(&repo(), &gzipped, &gzip_headers(), body.len() - 1, None).is_none());
    }

    #[test]
    fn test_observe_unparseable_push() {
        assert!(observe_push(&repo(), b"garbage", &HeaderMap::new(), LIMIT, None).is_none());
        assert!(observe_push(&repo(), &push_body(), &gzip_headers(), LIMIT, None).is_none());
    }

    #[tokio::test]
    async fn test_read_push_body_within_limit() {
        let body = push_body();
        match read_push_body(Body::from(body.clone()), &HeaderMap::new(), LIMIT).await {
            PushBody::Buffered(bytes) => assert_eq!(bytes, body),
            PushBody::Passthrough(_) => panic!("expected a buffered body"),
        }
    }

    #[tokio::test]
    async fn test_read_push_body_over_limit_passes_through() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(LIMIT + 1));
        let declared = read_push_body(Body::from(vec![0u8; LIMIT + 1]), &headers, LIMIT).await;
        assert!(matches!(declared, PushBody::Passthrough(_)));

        let chunks = (0..4).map(|_| Ok::<_, std::io::Error>(vec![0u8; LIMIT / 2]));
        let streamed = Body::from_stream(stream::iter(chunks));
        let undeclared = read_push_body(streamed, &HeaderMap::new(), LIMIT).await;
        assert!(matches!(undeclared, PushBody::Passthrough(_)));
    }

    #[test]
    fn test_upstream_url() {
        let config = Config::default();
        let uri: Uri = "/github.com/octo/hello.git/info/refs?service=git-receive-pack"
            .parse()
            .unwrap();

        let url = upstream_url(&config, &uri).unwrap();
        assert_eq!(
            url.as_str(),
            "https://github.com/octo/hello.git/info/refs?service=git-receive-pack"
        );
    }

    #[test]
    fn test_upstream_url_trailing_slash() {
        let config = Config {
            upstream: "http://127.0.0.1:3000/".to_string(),
            route_prefix: "/git/".to_string(),
            ..Config::default()
        };
        let uri: Uri = "/git/a/b/git-upload-pack".parse().unwrap();

        let url = upstream_url(&config, &uri).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3000/a/b/git-upload-pack");
    }

    #[test]
    fn test_forward_headers_drops_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:8080"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-git-receive-pack-request"),
        );

        let forwarded = forward_headers(&headers);
        assert_eq!(forwarded.len(), 2);
        assert!(forwarded.contains_key(header::AUTHORIZATION));
        assert!(forwarded.contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn test_forbidden_response() {
        let response = ProxyError::Forbidden("octo/other".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ProxyError::NotFound("/elsewhere".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
