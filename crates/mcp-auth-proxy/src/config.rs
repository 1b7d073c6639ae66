use std::fmt;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use clap::Parser;
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::error::ConfigError;

/// Configuration for the mcp-auth-proxy server.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-auth-proxy")]
#[command(about = "HTTP proxy that injects a bearer token in front of a remote MCP server")]
pub struct Config {
    /// Base URL of the upstream MCP server
    #[arg(long, env = "MCP_SERVER_URL")]
    pub mcp_server_url: String,

    /// Bearer token injected into every forwarded request
    #[arg(long, env = "BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: String,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to bind to
    #[arg(long, default_value = "8000", env = "PORT")]
    pub port: u16,

    /// Time allowed for upstream to produce a response
    #[arg(long, default_value = "30", env = "UPSTREAM_TIMEOUT_SECS")]
    pub upstream_timeout_secs: u64,

    /// Time allowed to establish the upstream connection
    #[arg(long, default_value = "10", env = "UPSTREAM_CONNECT_TIMEOUT_SECS")]
    pub connect_timeout_secs: u64,

    /// Path answered locally as a liveness probe
    #[arg(long, default_value = "/health", env = "HEALTH_PATH")]
    pub health_path: String,

    /// Follow upstream redirects instead of relaying them
    #[arg(long, env = "FOLLOW_REDIRECTS")]
    pub follow_redirects: bool,

    /// Extra request headers to pass through to upstream
    #[arg(long = "forward-header", env = "FORWARD_HEADERS", value_delimiter = ',')]
    pub forward_headers: Vec<String>,

    /// Answer CORS preflight requests locally
    #[arg(long, env = "ENABLE_CORS")]
    pub enable_cors: bool,
}

/// Validated settings, built once at startup and shared read-only by every request.
#[derive(Clone)]
pub struct ProxySettings {
    pub upstream_base_url: Url,
    pub health_path: String,
    pub upstream_timeout: Duration,
    pub connect_timeout: Duration,
    pub follow_redirects: bool,
    pub extra_forward_headers: Vec<HeaderName>,
    pub enable_cors: bool,
    authorization: HeaderValue,
    token_fingerprint: String,
}

impl ProxySettings {
    /// Validate the raw configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let upstream_base_url = parse_base_url(&config.mcp_server_url)?;

        let token = config.bearer_token.trim();
        if token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ConfigError::InvalidToken)?;
        authorization.set_sensitive(true);

        if config.upstream_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("upstream-timeout-secs"));
        }
        if config.connect_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("connect-timeout-secs"));
        }

        let health_path = config.health_path.trim().to_string();
        if !health_path.starts_with('/') || health_path.contains(['{', '}', '?', '#', '*', ':']) {
            return Err(ConfigError::InvalidHealthPath(health_path));
        }

        let extra_forward_headers = config
            .forward_headers
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| ConfigError::InvalidHeaderName(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            upstream_base_url,
            health_path,
            upstream_timeout: Duration::from_secs(config.upstream_timeout_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            follow_redirects: config.follow_redirects,
            extra_forward_headers,
            enable_cors: config.enable_cors,
            authorization,
            token_fingerprint: fingerprint(token),
        })
    }

    /// The `Authorization` value injected into outbound requests.
    pub fn authorization(&self) -> &HeaderValue {
        &self.authorization
    }

    /// Short SHA-256 prefix of the token, safe to log.
    pub fn token_fingerprint(&self) -> &str {
        &self.token_fingerprint
    }
}

impl fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySettings")
            .field("upstream_base_url", &self.upstream_base_url.as_str())
            .field("health_path", &self.health_path)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("follow_redirects", &self.follow_redirects)
            .field("extra_forward_headers", &self.extra_forward_headers)
            .field("enable_cors", &self.enable_cors)
            .field("token", &format_args!("<redacted {}>", self.token_fingerprint))
            .finish()
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: "base URL must not carry a query string or fragment".to_string(),
        });
    }

    Ok(url)
}

fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> Config {
        let mut argv = vec!["mcp-auth-proxy"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config(&[
            "--mcp-server-url",
            "https://mcp.example.com",
            "--bearer-token",
            "secret",
        ]);
        let settings = ProxySettings::from_config(&config).unwrap();

        assert_eq!(settings.health_path, "/health");
        assert_eq!(settings.upstream_timeout, Duration::from_secs(30));
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert!(!settings.follow_redirects);
        assert!(!settings.enable_cors);
        assert_eq!(settings.authorization(), "Bearer secret");
        assert!(settings.authorization().is_sensitive());
    }

    #[test]
    fn test_token_is_trimmed() {
        let config = config(&["--mcp-server-url", "http://localhost:8080", "--bearer-token", " abc \n"]);
        let settings = ProxySettings::from_config(&config).unwrap();
        assert_eq!(settings.authorization(), "Bearer abc");
    }

    #[test]
    fn test_empty_token_rejected() {
        let config = config(&["--mcp-server-url", "http://localhost:8080", "--bearer-token", "  "]);
        assert!(matches!(
            ProxySettings::from_config(&config),
            Err(ConfigError::EmptyToken)
        ));
    }

    #[test]
    fn test_token_with_control_chars_rejected() {
        let config = config(&["--mcp-server-url", "http://localhost:8080", "--bearer-token", "a\u{7}b"]);
        assert!(matches!(
            ProxySettings::from_config(&config),
            Err(ConfigError::InvalidToken)
        ));
    }

    #[test]
    fn test_base_url_validation() {
        for (url, ok) in [
            ("https://mcp.example.com/api/v1", true),
            ("http://127.0.0.1:9000", true),
            ("ftp://mcp.example.com", false),
            ("not a url", false),
            ("https://mcp.example.com/?x=1", false),
            ("https://mcp.example.com/#frag", false),
        ] {
            let config = config(&["--mcp-server-url", url, "--bearer-token", "t"]);
            assert_eq!(ProxySettings::from_config(&config).is_ok(), ok, "{url}");
        }
    }

    #[test]
    fn test_health_path_validation() {
        for (path, ok) in [("/healthz", true), ("healthz", false), ("/{*rest}", false), ("/:id", false)] {
            let config = config(&[
                "--mcp-server-url",
                "http://localhost",
                "--bearer-token",
                "t",
                "--health-path",
                path,
            ]);
            assert_eq!(ProxySettings::from_config(&config).is_ok(), ok, "{path}");
        }
    }

    #[test]
    fn test_forward_headers_list() {
        let cfg = config(&[
            "--mcp-server-url",
            "http://localhost",
            "--bearer-token",
            "t",
            "--forward-header",
            "X-Tenant, X-Trace",
        ]);
        let settings = ProxySettings::from_config(&cfg).unwrap();
        assert_eq!(
            settings.extra_forward_headers,
            vec![
                HeaderName::from_static("x-tenant"),
                HeaderName::from_static("x-trace")
            ]
        );

        let bad = config(&[
            "--mcp-server-url",
            "http://localhost",
            "--bearer-token",
            "t",
            "--forward-header",
            "bad header",
        ]);
        assert!(matches!(
            ProxySettings::from_config(&bad),
            Err(ConfigError::InvalidHeaderName(_))
        ));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        for flag in ["--upstream-timeout-secs", "--connect-timeout-secs"] {
            let cfg = config(&[
                "--mcp-server-url",
                "http://localhost",
                "--bearer-token",
                "t",
                flag,
                "0",
            ]);
            assert!(
                matches!(
                    ProxySettings::from_config(&cfg),
                    Err(ConfigError::ZeroTimeout(_))
                ),
                "{flag}"
            );
        }
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = config(&["--mcp-server-url", "http://localhost", "--bearer-token", "supersecret"]);
        let settings = ProxySettings::from_config(&config).unwrap();
        let rendered = format!("{:?}", settings);

        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains(settings.token_fingerprint()));
        assert_eq!(settings.token_fingerprint().len(), 12);
    }
}
