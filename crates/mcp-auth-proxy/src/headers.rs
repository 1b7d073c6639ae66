//! Header rewriting between the caller and upstream.
//!
//! Both directions drop hop-by-hop headers (RFC 9110 §7.6.1) plus anything the
//! peer listed in its `Connection` header. Requests are further narrowed to an
//! allow-list of end-to-end headers and always carry the proxy's own
//! `Authorization`; responses pass everything else through.

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

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

/// End-to-end request headers forwarded to upstream.
const REQUEST_ALLOW_LIST: &[&str] = &[
    "accept",
    "accept-encoding",
    "accept-language",
    "cache-control",
    "content-encoding",
    "content-language",
    "content-length",
    "content-type",
    "if-match",
    "if-modified-since",
    "if-none-match",
    "if-unmodified-since",
    "last-event-id",
    "pragma",
    "range",
    "user-agent",
    "x-request-id",
    "traceparent",
    "tracestate",
];

/// Streamable HTTP session and protocol headers (`Mcp-Session-Id`, `Mcp-Protocol-Version`).
const MCP_HEADER_PREFIX: &str = "mcp-";

/// Build the header set sent upstream.
pub fn outbound_request_headers(
    inbound: &HeaderMap,
    authorization: &HeaderValue,
    extra: &[HeaderName],
) -> HeaderMap {
    let dropped = connection_tokens(inbound);
    let mut outbound = HeaderMap::with_capacity(inbound.keys_len() + 1);

    for (name, value) in inbound {
        if is_hop_by_hop(name) || dropped.contains(name) {
            continue;
        }
        if !is_forwardable(name, extra) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }

    outbound.insert(header::AUTHORIZATION, authorization.clone());
    outbound
}

/// Build the header set relayed back to the caller.
pub fn relayed_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let dropped = connection_tokens(upstream);
    let mut relayed = HeaderMap::with_capacity(upstream.keys_len());

    for (name, value) in upstream {
        if is_hop_by_hop(name) || dropped.contains(name) {
            continue;
        }
        relayed.append(name.clone(), value.clone());
    }

    relayed
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

fn is_forwardable(name: &HeaderName, extra: &[HeaderName]) -> bool {
    let name_str = name.as_str();
    REQUEST_ALLOW_LIST.contains(&name_str)
        || name_str.starts_with(MCP_HEADER_PREFIX)
        || extra.contains(name)
}

/// Header names listed in `Connection`, which are hop-by-hop for this message only.
fn connection_tokens(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}
