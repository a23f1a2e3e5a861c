use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid origin `{origin}`: {source}")]
    Parse {
        origin: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported scheme `{0}`, expected http(s) or ws(s)")]
    Scheme(String),
}

/// WebSocket endpoint for a backend served at `origin`: same host and port,
/// `ws` for `http`, `wss` for `https`, path `/ws`.
pub fn ws_endpoint(origin: &str) -> Result<Url, EndpointError> {
    let origin = origin.trim();
    let mut url = Url::parse(origin).map_err(|source| EndpointError::Parse {
        origin: origin.to_string(),
        source,
    })?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(EndpointError::Scheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| EndpointError::Scheme(scheme.to_string()))?;
    url.set_path("/ws");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
