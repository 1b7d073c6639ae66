//! Upstream MCP server client.
//!
//! Rewrites the inbound request onto the configured base URL, injects the
//! bearer token, and streams both bodies through without buffering.

use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::{Method, Uri};
use axum::response::Response;
use futures::TryStreamExt;
use reqwest::{redirect, Client, Url};
use tracing::{info, warn};

use crate::config::ProxySettings;
use crate::error::{ProxyError, Result};
use crate::headers::{outbound_request_headers, relayed_response_headers};

/// Forwards requests to the upstream MCP server.
pub struct Upstream {
    client: Client,
    settings: Arc<ProxySettings>,
}

impl Upstream {
    /// Create the forwarder and its pooled HTTP client.
    pub fn new(settings: Arc<ProxySettings>) -> anyhow::Result<Self> {
        let redirect_policy = if settings.follow_redirects {
            redirect::Policy::default()
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .redirect(redirect_policy)
            .build()?;

        Ok(Self { client, settings })
    }

    /// Resolve the upstream URL for an inbound request target.
    pub fn target_url(&self, uri: &Uri) -> Result<Url> {
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
        if !path_and_query.starts_with('/') {
            return Err(ProxyError::BadRequest(format!(
                "Unsupported request target: {}",
                path_and_query
            )));
        }

        if has_dot_segment(uri.path()) {
            return Err(ProxyError::BadRequest(format!(
                "Dot segments are not allowed in the request path: {}",
                uri.path()
            )));
        }

        let base = self.settings.upstream_base_url.as_str().trim_end_matches('/');
        let target = format!("{}{}", base, path_and_query);

        Url::parse(&target)
            .map_err(|e| ProxyError::BadRequest(format!("Invalid request target: {}", e)))
    }

    /// Forward one request and relay the upstream response.
    ///
    /// Only the response head is awaited here; the body is handed back as a
    /// stream. Dropping the returned response (caller gone) drops the upstream
    /// connection with it.
    pub async fn forward(&self, req: Request) -> Result<Response> {
        let started = Instant::now();
        let (parts, body) = req.into_parts();

        if parts.method == Method::CONNECT {
            return Err(ProxyError::BadRequest(
                "CONNECT is not supported".to_string(),
            ));
        }

        let url = self.target_url(&parts.uri)?;
        let headers = outbound_request_headers(
            &parts.headers,
            self.settings.authorization(),
            &self.settings.extra_forward_headers,
        );

        let mut outbound = self
            .client
            .request(parts.method.clone(), url)
            .headers(headers);

        // A streamed empty body would go out chunked, which some servers reject on GET.
        if body.size_hint().exact() != Some(0) {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let timeout = self.settings.upstream_timeout;
        let upstream = tokio::time::timeout(timeout, outbound.send())
            .await
            .map_err(|_| ProxyError::UpstreamTimeout(timeout))?
            .map_err(|e| ProxyError::from_upstream(e, timeout))?;

        let status = upstream.status();
        info!(
            method = %parts.method,
            path = %parts.uri.path(),
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Forwarded request"
        );

        let headers = relayed_response_headers(upstream.headers());
        let path = parts.uri.path().to_string();
        let stream = upstream.bytes_stream().inspect_err(move |e| {
            warn!("Upstream body stream for {} failed: {}", path, e);
        });

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// True when a path segment is `.` or `..`, literally or percent-encoded.
/// URL parsing would collapse it and move the target outside the base path.
fn has_dot_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

/// Shared forwarder.
pub type SharedUpstream = Arc<Upstream>;
