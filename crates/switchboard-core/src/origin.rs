//! Origin metadata derived from the WebSocket handshake request.
//!
//! Built once per connection and shared immutably by every envelope for that
//! connection.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Parsed request URL of a connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// `ws` or `wss`.
    pub scheme: String,
    /// Host including a non-default port, e.g. `example.com:8080`.
    pub host: String,
    /// Host without the port.
    pub hostname: String,
    /// Explicit port, `None` when the scheme default is used.
    pub port: Option<u16>,
    /// Request path, always starting with `/`.
    pub path: String,
    /// Query string without the leading `?`.
    pub query: Option<String>,
    /// Fragment without the leading `#`. Browsers never send one, so this is
    /// normally `None`.
    pub fragment: Option<String>,
    /// Full serialized URL.
    pub href: String,
}

impl Origin {
    /// Assemble origin metadata from the pieces available on an HTTP request.
    ///
    /// `host` is the `Host` header value and `path_and_query` the request
    /// target. Unparseable input falls back to a best-effort split instead of
    /// failing the connection.
    pub fn parse(scheme: &str, host: &str, path_and_query: &str) -> Self {
        let target = if path_and_query.starts_with('/') {
            path_and_query.to_owned()
        } else {
            format!("/{path_and_query}")
        };
        let raw = format!("{scheme}://{host}{target}");
        match Url::parse(&raw) {
            Ok(url) => Self::from_url(&url),
            Err(e) => {
                debug!(raw, error = %e, "unparseable origin, using raw parts");
                let (path, query) = match target.split_once('?') {
                    Some((p, q)) => (p.to_owned(), Some(q.to_owned())),
                    None => (target.clone(), None),
                };
                Self {
                    scheme: scheme.to_owned(),
                    host: host.to_owned(),
                    hostname: host.to_owned(),
                    port: None,
                    path,
                    query,
                    fragment: None,
                    href: raw,
                }
            }
        }
    }

    /// Build origin metadata from an already-parsed URL.
    pub fn from_url(url: &Url) -> Self {
        let hostname = url.host_str().unwrap_or_default().to_owned();
        let host = match url.port() {
            Some(port) => format!("{hostname}:{port}"),
            None => hostname.clone(),
        };
        Self {
            scheme: url.scheme().to_owned(),
            host,
            hostname,
            port: url.port(),
            path: url.path().to_owned(),
            query: url.query().map(str::to_owned),
            fragment: url.fragment().map(str::to_owned),
            href: url.as_str().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port_path_and_query() {
        let origin = Origin::parse("ws", "localhost:8080", "/lobby?room=7&name=a");
        assert_eq!(origin.scheme, "ws");
        assert_eq!(origin.host, "localhost:8080");
        assert_eq!(origin.hostname, "localhost");
        assert_eq!(origin.port, Some(8080));
        assert_eq!(origin.path, "/lobby");
        assert_eq!(origin.query.as_deref(), Some("room=7&name=a"));
        assert_eq!(origin.fragment, None);
        assert_eq!(origin.href, "ws://localhost:8080/lobby?room=7&name=a");
    }

    #[test]
    fn default_port_is_omitted() {
        let origin = Origin::parse("wss", "example.com:443", "/");
        assert_eq!(origin.port, None);
        assert_eq!(origin.host, "example.com");
        assert_eq!(origin.href, "wss://example.com/");
    }

    #[test]
    fn root_path_without_query() {
        let origin = Origin::parse("ws", "127.0.0.1:9000", "/");
        assert_eq!(origin.path, "/");
        assert!(origin.query.is_none());
    }

    #[test]
    fn missing_leading_slash_is_tolerated() {
        let origin = Origin::parse("ws", "localhost", "chat");
        assert_eq!(origin.path, "/chat");
    }

    #[test]
    fn unparseable_host_falls_back_to_raw_parts() {
        let origin = Origin::parse("ws", "bad host", "/p?q=1");
        assert_eq!(origin.hostname, "bad host");
        assert_eq!(origin.path, "/p");
        assert_eq!(origin.query.as_deref(), Some("q=1"));
    }

    #[test]
    fn fragment_is_kept_when_present() {
        let url = Url::parse("ws://localhost/a#frag").unwrap();
        let origin = Origin::from_url(&url);
        assert_eq!(origin.fragment.as_deref(), Some("frag"));
    }
}
