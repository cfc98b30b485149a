use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{LogLevel, SharedLogger};
use crate::translate::model_list::prefix_model_list;
use crate::translate::vision::set_vision_header;
use crate::translate::RequestPipeline;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::Response;
use bytes::Bytes;
use reqwest::header::{
    HeaderName, ACCEPT_ENCODING, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_ENCODING, CONTENT_LENGTH,
    CONTENT_TYPE, HOST,
};
use reqwest::Url;
use uuid::Uuid;

/// Headers that describe one connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Where and how requests are forwarded.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub base: Url,
    pub authority: String,
    pub vision_header: HeaderName,
}

impl Upstream {
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let vision_header = HeaderName::from_bytes(config.routing.vision_header.as_bytes())
            .map_err(|e| ProxyError::config(format!("Invalid vision_header: {e}")))?;
        Ok(Self {
            base: config.target()?,
            authority: config.target_authority()?,
            vision_header,
        })
    }

    /// The upstream URL for an inbound path and query; the base path is replaced.
    pub fn url_for(&self, uri: &Uri) -> Result<Url> {
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
        self.base
            .join(path_and_query)
            .map_err(|e| ProxyError::upstream(format!("Invalid upstream path {path_and_query}: {e}")))
    }
}

/// Everything a forwarder needs, borrowed from the app state.
pub struct ProxyContext<'a> {
    pub client: &'a reqwest::Client,
    pub upstream: &'a Upstream,
    pub pipeline: &'a RequestPipeline,
    pub logger: &'a SharedLogger,
    pub max_body_bytes: usize,
    pub request_id: Uuid,
}

/// Copy inbound headers for the upstream call: hop-by-hop headers are
/// dropped, `host` points at the upstream, and `content-length` is replaced
/// when the body was rewritten.
pub fn outbound_headers(
    inbound: &HeaderMap,
    authority: &str,
    content_length: Option<usize>,
) -> Result<HeaderMap> {
    let mut out = HeaderMap::with_capacity(inbound.len() + 2);
    for (name, value) in inbound {
        if !is_hop_by_hop(name) {
            out.append(name.clone(), value.clone());
        }
    }

    let host = HeaderValue::from_str(authority)
        .map_err(|e| ProxyError::config(format!("Invalid upstream authority {authority}: {e}")))?;
    out.insert(HOST, host);

    if let Some(len) = content_length {
        out.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }

    Ok(out)
}

/// Upstream response headers as relayed to the client. CORS headers are
/// added by the router, so the upstream's own are not copied.
pub fn relayed_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !is_hop_by_hop(name) && *name != ACCESS_CONTROL_ALLOW_ORIGIN {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Rewrite a chat-completion request and stream the upstream answer back.
/// Non-2xx answers are relayed verbatim after being logged.
pub async fn forward_chat_completion(
    ctx: &ProxyContext<'_>,
    uri: &Uri,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response> {
    let raw = axum::body::to_bytes(body, ctx.max_body_bytes)
        .await
        .map_err(|e| ProxyError::other(format!("Failed to read request body: {e}")))?;

    let rewritten = ctx.pipeline.rewrite(&raw)?;
    let url = ctx.upstream.url_for(uri)?;

    ctx.logger.request(
        ctx.request_id,
        LogLevel::Info,
        "pipeline",
        format!("POST {} model={}", url.path(), rewritten.route.internal_id),
        Some(serde_json::json!({
            "prefixed": rewritten.route.prefixed,
            "family": rewritten.route.family.as_str(),
            "vision": rewritten.vision,
            "body_len": rewritten.body.len(),
        })),
    );

    let mut out_headers =
        outbound_headers(headers, &ctx.upstream.authority, Some(rewritten.body.len()))?;
    if rewritten.vision {
        set_vision_header(&mut out_headers, &ctx.upstream.vision_header);
    }

    let response = ctx
        .client
        .post(url.clone())
        .headers(out_headers)
        .body(rewritten.body)
        .send()
        .await
        .map_err(|e| ProxyError::upstream(format!("Request to {url} failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let resp_headers = response.headers().clone();
        let body = response.bytes().await?;
        let text = String::from_utf8_lossy(&body);
        tracing::error!(status = status.as_u16(), body = %text, "Upstream error");
        ctx.logger.request(
            ctx.request_id,
            LogLevel::Error,
            "proxy",
            format!("Upstream error ({}): {}", status.as_u16(), truncate(&text, 500)),
            None,
        );
        return Ok(buffered_response(status, &resp_headers, body));
    }

    Ok(streaming_response(response))
}

/// Fetch the models list and re-add the external prefix to every id.
pub async fn forward_models(
    ctx: &ProxyContext<'_>,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<Response> {
    let url = ctx.upstream.url_for(uri)?;

    let mut out_headers = outbound_headers(headers, &ctx.upstream.authority, None)?;
    // The body is parsed here, so ask for it uncompressed.
    out_headers.remove(ACCEPT_ENCODING);

    let response = ctx
        .client
        .get(url.clone())
        .headers(out_headers)
        .send()
        .await
        .map_err(|e| ProxyError::upstream(format!("Request to {url} failed: {e}")))?;

    let status = response.status();
    let resp_headers = response.headers().clone();
    let body = response.bytes().await?;

    if !status.is_success() {
        return Ok(buffered_response(status, &resp_headers, body));
    }

    let parsed: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Models response is not JSON, relaying unchanged");
            return Ok(buffered_response(status, &resp_headers, body));
        }
    };

    let rewritten = prefix_model_list(parsed, ctx.pipeline.router().prefix());
    let out = Bytes::from(serde_json::to_vec(&rewritten)?);

    ctx.logger.request(
        ctx.request_id,
        LogLevel::Info,
        "models",
        format!("GET {} prefixed with {}", url.path(), ctx.pipeline.router().prefix()),
        None,
    );

    let mut headers = relayed_headers(&resp_headers);
    headers.remove(CONTENT_LENGTH);
    headers.remove(CONTENT_ENCODING);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let mut resp = Response::new(Body::from(out));
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    Ok(resp)
}

/// Relay any other request without looking at it. The request body is
/// buffered; the response body is streamed.
pub async fn forward_raw(
    ctx: &ProxyContext<'_>,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response> {
    let raw = axum::body::to_bytes(body, ctx.max_body_bytes)
        .await
        .map_err(|e| ProxyError::other(format!("Failed to read request body: {e}")))?;

    let url = ctx.upstream.url_for(uri)?;
    let content_length = (!raw.is_empty()).then_some(raw.len());
    let out_headers = outbound_headers(headers, &ctx.upstream.authority, content_length)?;

    let mut request = ctx.client.request(method.clone(), url.clone()).headers(out_headers);
    if !raw.is_empty() {
        request = request.body(raw);
    }

    let response = request
        .send()
        .await
        .map_err(|e| ProxyError::upstream(format!("Request to {url} failed: {e}")))?;

    ctx.logger.request(
        ctx.request_id,
        LogLevel::Debug,
        "relay",
        format!("{} {} -> {}", method, url.path(), response.status().as_u16()),
        None,
    );

    Ok(streaming_response(response))
}

fn streaming_response(response: reqwest::Response) -> Response {
    let status = response.status();
    let headers = relayed_headers(response.headers());
    let mut resp = Response::new(Body::from_stream(response.bytes_stream()));
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    resp
}

fn buffered_response(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Response {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    *resp.headers_mut() = relayed_headers(headers);
    resp
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
