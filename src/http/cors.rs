//! CORS negotiation.
//!
//! # Data Flow
//! ```text
//! no Origin header                     → NoOrigin (skip)
//! Origin, no allow-list
//!     same origin (fallback enabled)   → Allowed, or Preflight when OPTIONS
//!     otherwise                        → Denied (403)
//! Origin, allow-list "*" or match      → SimpleCrossOrigin, or Preflight when OPTIONS
//! Origin, no match                     → Denied (403)
//! ```
//!
//! # Design Decisions
//! - Preflight and denial are terminal: the response is closed here
//! - Origins compare case-insensitively; the list splits on commas
//! - "*" for headers/methods echoes what the client asked for
//! - The same-origin fallback compares serialized origins, not string prefixes

use http::header::{
    HeaderName, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
    ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, VARY,
};
use http::StatusCode;

use crate::config::CorsConfig;
use crate::http::context::RequestContext;

pub const ORIGIN_NOT_ALLOWED: &str = "Origin not allowed";

/// Outcome of negotiating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsState {
    NoOrigin,
    /// Allowed cross-origin request; routing continues with allow headers attached.
    SimpleCrossOrigin,
    /// Answered preflight; terminal.
    Preflight,
    /// Rejected with 403; terminal.
    Denied,
    /// Same-origin request allowed without allow headers.
    Allowed,
}

impl CorsState {
    /// Whether the response is complete and routing must not run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CorsState::Preflight | CorsState::Denied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AllowList {
    /// Echo the client's request header, or `*` when it sent none.
    Echo,
    Fixed(String),
}

impl AllowList {
    fn parse(raw: &str) -> Self {
        match raw.trim() {
            "*" => AllowList::Echo,
            fixed => AllowList::Fixed(fixed.to_owned()),
        }
    }

    fn resolve<'a>(&'a self, ctx: &'a RequestContext, requested: &[HeaderName]) -> &'a str {
        match self {
            AllowList::Fixed(value) => value.as_str(),
            AllowList::Echo => requested
                .iter()
                .find_map(|name| ctx.header(name))
                .unwrap_or("*"),
        }
    }
}

enum Resolution {
    Denied,
    SameOrigin,
    Explicit(String),
}

/// Compiled CORS policy shared by every request.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_origin: Option<AllowedOrigins>,
    allow_headers: AllowList,
    allow_methods: AllowList,
    max_age: Option<u64>,
    allow_credentials: bool,
    same_origin_fallback: bool,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::from_config(&CorsConfig::default())
    }
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Self {
        let allow_origin = config
            .allow_origin
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                if raw == "*" {
                    AllowedOrigins::Any
                } else {
                    AllowedOrigins::List(
                        raw.split(',')
                            .map(str::trim)
                            .filter(|origin| !origin.is_empty())
                            .map(str::to_owned)
                            .collect(),
                    )
                }
            });

        Self {
            allow_origin,
            allow_headers: AllowList::parse(&config.allow_headers),
            allow_methods: AllowList::parse(&config.allow_methods),
            max_age: config.max_age_secs,
            allow_credentials: config.allow_credentials,
            same_origin_fallback: config.same_origin_fallback,
        }
    }

    /// Negotiate `ctx`, writing headers and closing the response when terminal.
    pub fn negotiate(&self, ctx: &mut RequestContext) -> CorsState {
        let Some(origin) = ctx.origin().map(str::to_owned) else {
            return CorsState::NoOrigin;
        };

        match self.resolve(&origin, ctx) {
            Resolution::Denied => {
                tracing::debug!(origin = %origin, "Cross-origin request denied");
                ctx.response_mut().deny(StatusCode::FORBIDDEN, ORIGIN_NOT_ALLOWED);
                CorsState::Denied
            }
            Resolution::SameOrigin => {
                if ctx.is_preflight() {
                    self.answer_preflight(ctx);
                    CorsState::Preflight
                } else {
                    CorsState::Allowed
                }
            }
            Resolution::Explicit(value) => {
                let response = ctx.response_mut();
                response.set_header(ACCESS_CONTROL_ALLOW_ORIGIN, &value);
                if value != "*" {
                    response.append_header(VARY, "Origin");
                }
                if self.allow_credentials {
                    response.set_header(ACCESS_CONTROL_ALLOW_CREDENTIALS, "true");
                }
                if ctx.is_preflight() {
                    self.answer_preflight(ctx);
                    CorsState::Preflight
                } else {
                    CorsState::SimpleCrossOrigin
                }
            }
        }
    }

    fn resolve(&self, origin: &str, ctx: &RequestContext) -> Resolution {
        match &self.allow_origin {
            Some(AllowedOrigins::Any) => Resolution::Explicit("*".to_owned()),
            Some(AllowedOrigins::List(origins)) => {
                if origins.iter().any(|allowed| allowed.eq_ignore_ascii_case(origin)) {
                    Resolution::Explicit(origin.to_owned())
                } else {
                    Resolution::Denied
                }
            }
            None if self.same_origin_fallback && is_same_origin(origin, ctx) => Resolution::SameOrigin,
            None => Resolution::Denied,
        }
    }

    fn answer_preflight(&self, ctx: &mut RequestContext) {
        let headers = self
            .allow_headers
            .resolve(ctx, &[ACCESS_CONTROL_REQUEST_HEADERS])
            .to_owned();
        let methods = self
            .allow_methods
            .resolve(
                ctx,
                &[
                    ACCESS_CONTROL_REQUEST_METHOD,
                    HeaderName::from_static("access-control-request-methods"),
                ],
            )
            .to_owned();

        let response = ctx.response_mut();
        response.set_header(ACCESS_CONTROL_ALLOW_HEADERS, &headers);
        response.set_header(ACCESS_CONTROL_ALLOW_METHODS, &methods);
        if let Some(max_age) = self.max_age {
            response.set_header(ACCESS_CONTROL_MAX_AGE, &max_age.to_string());
        }
        response.close();
    }
}

fn is_same_origin(origin: &str, ctx: &RequestContext) -> bool {
    let Some(own) = ctx.request_origin() else {
        return false;
    };
    match url::Url::parse(origin) {
        Ok(parsed) => parsed.origin().ascii_serialization().eq_ignore_ascii_case(&own),
        Err(_) => false,
    }
}
