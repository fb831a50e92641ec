//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the contract host.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Prefixes and accept fan-out.
    pub listener: ListenerConfig,

    /// Cross-origin policy.
    pub cors: CorsConfig,

    /// Error exposure and payload formatting.
    pub dispatch: DispatchConfig,

    /// Static sites, tried after every service.
    pub sites: Vec<SiteConfig>,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Server prefixes (e.g., "http://+:8080/api/").
    pub prefixes: Vec<String>,

    /// Concurrent accept tasks per endpoint.
    pub max_concurrent_requests: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["http://127.0.0.1:8080/".to_string()],
            max_concurrent_requests: 16,
        }
    }
}

/// CORS policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// "*" or a comma-separated origin list. Unset means same-origin only.
    pub allow_origin: Option<String>,

    /// "*" echoes `Access-Control-Request-Headers`.
    pub allow_headers: String,

    /// "*" echoes `Access-Control-Request-Method`.
    pub allow_methods: String,

    /// Preflight cache lifetime in seconds.
    pub max_age_secs: Option<u64>,

    pub allow_credentials: bool,

    /// Allow requests whose Origin equals the request's own origin when no
    /// allow-list is configured.
    pub same_origin_fallback: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: None,
            allow_headers: "*".to_string(),
            allow_methods: "*".to_string(),
            max_age_secs: None,
            allow_credentials: true,
            same_origin_fallback: true,
        }
    }
}

/// Dispatch behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Send error messages in 400 bodies.
    pub expose_error_details: bool,

    /// Indent JSON responses.
    pub pretty_json: bool,

    /// Largest request body buffered for binding, in bytes. Larger bodies
    /// are answered with 413. Stream parameters are not limited.
    pub max_body_bytes: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            expose_error_details: cfg!(debug_assertions),
            pretty_json: false,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

/// A static site served from a directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Router prefix, relative to the server prefix.
    pub path_prefix: String,

    /// Directory the site is served from.
    pub document_root: String,

    pub default_document: String,

    pub not_found_document: String,

    pub directory_listing: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            path_prefix: String::new(),
            document_root: String::new(),
            default_document: "index.html".to_string(),
            not_found_document: "404.html".to_string(),
            directory_listing: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
