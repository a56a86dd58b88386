use url::Url;

use crate::errors::ParleyError;

/// Query parameter carrying the connecting user's identity.
const IDENTITY_PARAM: &str = "username";

/// Build the WebSocket URL for a session.
///
/// `server_url` may be given as `ws(s)://` or `http(s)://`; HTTP schemes are
/// mapped to their WebSocket counterparts. A bare `host[:port]/path` is
/// treated as `wss://`. The identity is attached as the `username` query
/// parameter, which is how the server authenticates the connection.
pub fn build_endpoint(server_url: &str, identity: &str) -> Result<Url, ParleyError> {
    let identity = validate_identity(identity)?;
    let mut url = parse_server_url(server_url)?;
    url.query_pairs_mut().append_pair(IDENTITY_PARAM, identity);
    Ok(url)
}

/// Trim an identity and reject it if nothing is left.
pub fn validate_identity(identity: &str) -> Result<&str, ParleyError> {
    let identity = identity.trim();
    if identity.is_empty() {
        return Err(ParleyError::InvalidIdentity);
    }
    Ok(identity)
}

fn parse_server_url(server_url: &str) -> Result<Url, ParleyError> {
    let raw = server_url.trim();
    if raw.is_empty() {
        return Err(ParleyError::InvalidUrl("server url is empty".into()));
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("wss://{raw}")
    };

    let (scheme, rest) = with_scheme
        .split_once("://")
        .ok_or_else(|| ParleyError::InvalidUrl(format!("missing scheme in '{raw}'")))?;
    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(ParleyError::InvalidUrl(format!(
                "unsupported scheme '{other}'"
            )));
        }
    };

    let url = Url::parse(&format!("{ws_scheme}://{rest}"))
        .map_err(|e| ParleyError::InvalidUrl(format!("'{raw}': {e}")))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ParleyError::InvalidUrl(format!("no host in '{raw}'")));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_becomes_wss() {
        let url = build_endpoint("https://chat.example.com/ws", "alice").unwrap();
        assert_eq!(url.as_str(), "wss://chat.example.com/ws?username=alice");
    }

    #[test]
    fn http_becomes_ws() {
        let url = build_endpoint("http://localhost:3000", "alice").unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.port(), Some(3000));
    }

    #[test]
    fn ws_scheme_kept() {
        let url = build_endpoint("ws://127.0.0.1:9000/ws", "bob").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9000/ws?username=bob");
    }

    #[test]
    fn bare_host_defaults_to_wss() {
        let url = build_endpoint("chat.example.com/socket", "bob").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/socket");
    }

    #[test]
    fn identity_is_url_encoded() {
        let url = build_endpoint("wss://chat.example.com", "Jean Dupont&co").unwrap();
        assert_eq!(url.query(), Some("username=Jean+Dupont%26co"));
        let (_, value) = url.query_pairs().next().unwrap();
        assert_eq!(value, "Jean Dupont&co");
    }

    #[test]
    fn existing_query_is_preserved() {
        let url = build_endpoint("wss://chat.example.com/ws?v=2", "alice").unwrap();
        assert_eq!(url.query(), Some("v=2&username=alice"));
    }

    #[test]
    fn empty_identity_rejected() {
        assert_eq!(
            build_endpoint("wss://chat.example.com", "   "),
            Err(ParleyError::InvalidIdentity)
        );
    }

    #[test]
    fn invalid_urls_rejected() {
        assert!(build_endpoint("", "alice").is_err());
        assert!(build_endpoint("ftp://chat.example.com", "alice").is_err());
        assert!(build_endpoint("wss://", "alice").is_err());
    }
}
