use bytes::Bytes;
use http::{Method, StatusCode};
use hyper::body::Incoming;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::CallResult;
use crate::body::read_all_body;
use crate::error::{Error, TransportErrorKind};
use crate::headers::HeaderStore;
use crate::util::truncate_text;

/// Parsed response payload: JSON when the server declared a JSON media type,
/// raw text otherwise.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Text(text) => Some(text),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Json(Value::Array(_)))
    }
}

impl std::fmt::Display for ResponseBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(value) => write!(formatter, "{value}"),
            Self::Text(text) => formatter.write_str(text),
        }
    }
}

/// Final outcome of a non-raw call: one status/header set plus the parsed
/// body, which for paginated calls is the accumulated sequence.
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderStore,
    body: ResponseBody,
}

impl Response {
    pub(crate) fn new(status: StatusCode, headers: HeaderStore, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderStore {
        &self.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Typed extraction. Text bodies are re-parsed so mislabeled JSON still
    /// deserializes.
    pub fn json<T>(&self) -> CallResult<T>
    where
        T: DeserializeOwned,
    {
        match &self.body {
            ResponseBody::Json(value) => {
                serde_json::from_value(value.clone()).map_err(|source| Error::Deserialize {
                    source,
                    body: truncate_text(&value.to_string()),
                })
            }
            ResponseBody::Text(text) => {
                serde_json::from_str(text).map_err(|source| Error::Deserialize {
                    source,
                    body: truncate_text(text),
                })
            }
        }
    }

    pub fn text(&self) -> String {
        self.body.to_string()
    }
}

/// Raw-mode outcome: status and headers are available up front, the body is
/// the unconsumed transport stream.
#[derive(Debug)]
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderStore,
    body: Incoming,
    method: Method,
    url: String,
}

impl RawResponse {
    pub(crate) fn new(
        status: StatusCode,
        headers: HeaderStore,
        body: Incoming,
        method: Method,
        url: String,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            method,
            url,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderStore {
        &self.headers
    }

    pub fn into_body(self) -> Incoming {
        self.body
    }

    /// Drains the stream into one buffer.
    pub async fn into_bytes(self) -> CallResult<Bytes> {
        read_all_body(self.body)
            .await
            .map_err(|source| Error::Transport {
                kind: TransportErrorKind::Read,
                method: self.method,
                url: self.url,
                source: Box::new(source),
            })
    }
}
