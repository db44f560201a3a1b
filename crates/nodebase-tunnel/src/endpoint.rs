//! Relay URL handling.

use nodebase_core::{NodebaseError, NodebaseResult};
use url::Url;

/// Path the relay serves its WebSocket endpoint on when given a bare origin.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Build the URL to dial for a relay.
///
/// `ws://` and `wss://` URLs are used as given. An `http://` or `https://`
/// origin is mapped to `ws://` or `wss://` on the same host, with the path
/// defaulting to `/ws`. A non-empty `server_token` is appended as the `token`
/// query parameter.
pub fn build_ws_url(base: &str, server_token: Option<&str>) -> NodebaseResult<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| NodebaseError::InvalidArgument(format!("invalid relay URL {base:?}: {e}")))?;

    let ws_scheme = match url.scheme() {
        "ws" | "wss" => None,
        "http" => Some("ws"),
        "https" => Some("wss"),
        other => {
            return Err(NodebaseError::InvalidArgument(format!(
                "unsupported relay URL scheme: {other} (expected ws, wss, http or https)"
            )))
        }
    };

    if let Some(scheme) = ws_scheme {
        url.set_scheme(scheme).map_err(|()| {
            NodebaseError::InvalidArgument(format!("cannot use {base:?} as a WebSocket URL"))
        })?;
        if url.path() == "/" {
            url.set_path(DEFAULT_WS_PATH);
        }
    }

    if let Some(token) = server_token.filter(|t| !t.is_empty()) {
        url.query_pairs_mut().append_pair("token", token);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_is_kept() {
        let url = build_ws_url("ws://relay.local:8080/ws", None).unwrap();
        assert_eq!(url.as_str(), "ws://relay.local:8080/ws");
    }

    #[test]
    fn server_token_becomes_query_parameter() {
        let url = build_ws_url("wss://relay.example.com/ws", Some("abc 123")).unwrap();
        assert_eq!(url.scheme(), "wss");
        let pairs: Vec<_> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("token".to_string(), "abc 123".to_string())]);
    }

    #[test]
    fn empty_token_is_ignored() {
        let url = build_ws_url("ws://relay.local/ws", Some("")).unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn http_origin_maps_to_ws_endpoint() {
        let url = build_ws_url("http://192.168.1.5:8080", None).unwrap();
        assert_eq!(url.as_str(), "ws://192.168.1.5:8080/ws");

        let url = build_ws_url("https://relay.example.com/", None).unwrap();
        assert_eq!(url.as_str(), "wss://relay.example.com/ws");

        let url = build_ws_url("https://relay.example.com/tunnel", None).unwrap();
        assert_eq!(url.as_str(), "wss://relay.example.com/tunnel");
    }

    #[test]
    fn bad_urls_are_rejected() {
        assert!(matches!(
            build_ws_url("not a url", None),
            Err(NodebaseError::InvalidArgument(_))
        ));
        assert!(matches!(
            build_ws_url("ftp://relay.local/ws", None),
            Err(NodebaseError::InvalidArgument(_))
        ));
    }
}
