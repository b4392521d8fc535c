use http::header::LOCATION;
use http::{HeaderName, HeaderValue, StatusCode, Uri};
use serde_json::Value;
use url::Url;

use crate::error::{Error, TransportErrorKind};
use crate::headers::HeaderStore;
use crate::response::ResponseBody;

const MAX_ERROR_BODY_LEN: usize = 2048;

pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName, Error> {
    name.parse().map_err(|source| Error::InvalidHeaderName {
        name: name.to_owned(),
        source,
    })
}

pub(crate) fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    value.parse().map_err(|source| Error::InvalidHeaderValue {
        name: name.to_owned(),
        source,
    })
}

pub(crate) fn invalid_url(url: impl Into<String>) -> Error {
    Error::InvalidUrl { url: url.into() }
}

/// Resolves the call target against the configured base. Absolute http(s)
/// targets stand alone; anything else joins the base. The `protocol` and
/// `port` options fill in only what the target itself did not pin down:
/// an absolute target keeps its scheme, an explicit `:port` wins over the
/// option.
pub(crate) fn resolve_call_url(
    base: &Url,
    target: &str,
    protocol: Option<&str>,
    port: Option<u16>,
) -> Result<Url, Error> {
    let absolute = target.starts_with("http://") || target.starts_with("https://");
    let mut url = if absolute {
        Url::parse(target).map_err(|_| invalid_url(target))?
    } else {
        base.join(target).map_err(|_| invalid_url(target))?
    };

    if !absolute && let Some(protocol) = protocol {
        let scheme = protocol.trim_end_matches(':').to_ascii_lowercase();
        url.set_scheme(&scheme).map_err(|_| invalid_url(target))?;
    }
    if url.port().is_none()
        && let Some(port) = port
    {
        url.set_port(Some(port)).map_err(|_| invalid_url(target))?;
    }

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid_url(url.as_str()));
    }
    if url.host_str().is_none() {
        return Err(invalid_url(url.as_str()));
    }
    Ok(url)
}

pub(crate) fn url_to_uri(url: &Url) -> Result<Uri, Error> {
    url.as_str()
        .parse()
        .map_err(|_| invalid_url(url.as_str()))
}

pub(crate) fn is_redirect_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

pub(crate) fn redirect_location(headers: &HeaderStore) -> Option<String> {
    headers
        .get(LOCATION.as_str())
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}

pub(crate) fn resolve_redirect_url(current: &Url, location: &str) -> Option<Url> {
    let joined = current.join(location).ok()?;
    matches!(joined.scheme(), "http" | "https").then_some(joined)
}

pub(crate) fn same_origin(left: &Url, right: &Url) -> bool {
    if !left.scheme().eq_ignore_ascii_case(right.scheme()) {
        return false;
    }

    let left_host = left.host_str().unwrap_or_default();
    let right_host = right.host_str().unwrap_or_default();
    if !left_host.eq_ignore_ascii_case(right_host) {
        return false;
    }

    left.port_or_known_default() == right.port_or_known_default()
}

pub(crate) fn classify_transport_error(
    error: &hyper_util::client::legacy::Error,
) -> TransportErrorKind {
    // The client error's own display text is only the error kind; the
    // resolver, io and protocol detail lives further down the chain.
    let text = error_chain_text(error);

    if error.is_connect() {
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }

    if text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
        || text.contains("connection closed")
        || text.contains("incomplete message")
        || text.contains("read")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}

fn error_chain_text(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut cause = error.source();
    while let Some(source) = cause {
        text.push_str(": ");
        text.push_str(&source.to_string());
        cause = source.source();
    }
    text.make_ascii_lowercase();
    text
}

/// Media-type check for the parse decision: parameters are stripped, so
/// `application/json; charset=UTF-8` still counts, as does any `+json`
/// suffix type.
pub(crate) fn is_json_media_type(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media_type == "application/json" || media_type.ends_with("+json")
}

/// One display line for a status error: the text itself for text bodies and
/// bare JSON strings, the `message` field for JSON objects that carry one,
/// the compact JSON rendering otherwise.
pub(crate) fn body_summary(body: &ResponseBody) -> String {
    let summary = match body {
        ResponseBody::Text(text) => text.clone(),
        ResponseBody::Json(Value::String(text)) => text.clone(),
        ResponseBody::Json(Value::Object(map)) => match map.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => Value::Object(map.clone()).to_string(),
        },
        ResponseBody::Json(value) => value.to_string(),
    };
    truncate_text(&summary)
}

pub(crate) fn truncate_text(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_BODY_LEN {
        return text.to_owned();
    }

    let truncated: String = text.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{truncated}...(truncated)")
}

pub(crate) fn truncate_body(body: &[u8]) -> String {
    truncate_text(&String::from_utf8_lossy(body))
}
