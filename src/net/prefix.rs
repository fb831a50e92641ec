//! Server prefixes.
//!
//! A prefix names the endpoint a server listens on and the path below which it
//! answers, e.g. `http://localhost:8080/api/`. The host may be `+` or `*` to
//! accept any host name.
//!
//! # Design Decisions
//! - Only `http` is accepted; TLS is terminated before requests reach the server
//! - Port 0 binds an ephemeral port; the prefix is rewritten once bound
//! - Path prefixes match case-insensitively on a segment boundary

use std::fmt;
use std::str::FromStr;

use crate::net::listener::BindError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Any,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPrefix {
    host: HostPattern,
    port: u16,
    /// Path without leading or trailing `/`.
    path: String,
}

impl ServerPrefix {
    pub fn host(&self) -> &HostPattern {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Host name to bind.
    pub fn bind_host(&self) -> &str {
        match &self.host {
            HostPattern::Any => "0.0.0.0",
            HostPattern::Name(name) => name.trim_start_matches('[').trim_end_matches(']'),
        }
    }

    pub(crate) fn with_port(&self, port: u16) -> Self {
        Self {
            port,
            ..self.clone()
        }
    }

    /// Strip this prefix from a request. Returns the remaining path and query,
    /// or `None` if the request was not addressed to this prefix.
    pub fn strip(&self, host: &str, port: u16, path_and_query: &str) -> Option<String> {
        if port != self.port {
            return None;
        }
        if let HostPattern::Name(name) = &self.host {
            if !name.eq_ignore_ascii_case(host) {
                return None;
            }
        }
        if self.path.is_empty() {
            return Some(path_and_query.to_owned());
        }

        let rest = path_and_query.strip_prefix('/')?;
        let head = rest.get(..self.path.len())?;
        if !head.eq_ignore_ascii_case(&self.path) {
            return None;
        }
        let tail = &rest[self.path.len()..];
        if tail.is_empty() || tail.starts_with('/') || tail.starts_with('?') {
            Some(tail.to_owned())
        } else {
            None
        }
    }
}

impl FromStr for ServerPrefix {
    type Err = BindError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| BindError::InvalidPrefix {
            prefix: raw.to_owned(),
            reason: reason.to_owned(),
        };

        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        if scheme.eq_ignore_ascii_case("https") {
            return Err(invalid("TLS must be terminated in front of the server"));
        }
        if !scheme.eq_ignore_ascii_case("http") {
            return Err(invalid("unsupported scheme"));
        }

        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        if authority.is_empty() {
            return Err(invalid("missing host"));
        }
        let (host, port) = split_authority(authority).ok_or_else(|| invalid("invalid port"))?;
        let port = port.unwrap_or(80);
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let host = match host {
            "+" | "*" => HostPattern::Any,
            name => HostPattern::Name(name.to_ascii_lowercase()),
        };

        Ok(Self {
            host,
            port,
            path: path.trim_matches('/').to_owned(),
        })
    }
}

impl fmt::Display for ServerPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = match &self.host {
            HostPattern::Any => "+",
            HostPattern::Name(name) => name.as_str(),
        };
        write!(f, "http://{}:{}/", host, self.port)?;
        if !self.path.is_empty() {
            write!(f, "{}/", self.path)?;
        }
        Ok(())
    }
}

/// Split `host[:port]`, keeping IPv6 brackets on the host.
pub(crate) fn split_authority(authority: &str) -> Option<(&str, Option<u16>)> {
    let port_start = if authority.starts_with('[') {
        authority.find(']').map(|end| end + 1)?
    } else {
        authority.rfind(':').unwrap_or(authority.len())
    };
    let (host, port) = authority.split_at(port_start);
    match port.strip_prefix(':') {
        Some(port) => port.parse().ok().map(|port| (host, Some(port))),
        None if port.is_empty() => Some((host, None)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port_and_path() {
        let prefix: ServerPrefix = "http://LocalHost:8080/Api/".parse().unwrap();
        assert_eq!(prefix.host(), &HostPattern::Name("localhost".into()));
        assert_eq!(prefix.port(), 8080);
        assert_eq!(prefix.path(), "Api");
        assert_eq!(prefix.to_string(), "http://localhost:8080/Api/");
    }

    #[test]
    fn wildcard_host_and_default_port() {
        let prefix: ServerPrefix = "http://+/".parse().unwrap();
        assert_eq!(prefix.host(), &HostPattern::Any);
        assert_eq!(prefix.port(), 80);
        assert_eq!(prefix.bind_host(), "0.0.0.0");
    }

    #[test]
    fn rejects_malformed_prefixes() {
        for raw in ["localhost:8080", "https://a.test/", "ftp://a.test/", "http://a.test:x/", "http:///"] {
            assert!(raw.parse::<ServerPrefix>().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn strip_root_prefix_keeps_whole_path() {
        let prefix: ServerPrefix = "http://a.test:8080/".parse().unwrap();
        assert_eq!(prefix.strip("a.test", 8080, "/add?a=1").as_deref(), Some("/add?a=1"));
        assert_eq!(prefix.strip("b.test", 8080, "/add"), None);
        assert_eq!(prefix.strip("a.test", 8081, "/add"), None);
    }

    #[test]
    fn strip_path_prefix_on_segment_boundary() {
        let prefix: ServerPrefix = "http://*:8080/api/".parse().unwrap();
        assert_eq!(prefix.strip("any", 8080, "/API/add").as_deref(), Some("/add"));
        assert_eq!(prefix.strip("any", 8080, "/api").as_deref(), Some(""));
        assert_eq!(prefix.strip("any", 8080, "/api?x=1").as_deref(), Some("?x=1"));
        assert_eq!(prefix.strip("any", 8080, "/apix/add"), None);
    }

    #[test]
    fn splits_ipv6_authority() {
        assert_eq!(split_authority("[::1]:80"), Some(("[::1]", Some(80))));
        assert_eq!(split_authority("[::1]"), Some(("[::1]", None)));
        assert_eq!(split_authority("a.test"), Some(("a.test", None)));
    }
}
