use std::error::Error as StdError;
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::CallResult;
use crate::body::{OutgoingBody, stream_req_body};
use crate::client::{CallOptions, Client};
use crate::headers::HeaderStore;
use crate::proxy::Agent;
use crate::retry::RetryPolicy;
use crate::util::{parse_header_name, parse_header_value};

/// Builder for a single call. Obtained from the [`Client`] method helpers
/// and consumed by one of the `send*` finishers.
pub struct RequestBuilder<'a> {
    client: &'a Client,
    method: Method,
    target: String,
    headers: HeaderStore,
    body: OutgoingBody,
    partial: bool,
    port: Option<u16>,
    protocol: Option<String>,
    timeout: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
    agent: Option<Agent>,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a Client, method: Method, target: String) -> Self {
        Self {
            client,
            method,
            target,
            headers: HeaderStore::new(),
            body: OutgoingBody::Empty,
            partial: false,
            port: None,
            protocol: None,
            timeout: None,
            retry_policy: None,
            agent: None,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> CallResult<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn headers<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (HeaderName, HeaderValue)>,
    {
        for (name, value) in entries {
            self.headers.insert(name, value);
        }
        self
    }

    /// Serializes the payload as the request body. Sets
    /// `content-type: application/json` unless the builder already carries a
    /// content-type, in whichever order the two were applied.
    pub fn json<T>(mut self, payload: &T) -> CallResult<Self>
    where
        T: Serialize + ?Sized,
    {
        let body =
            serde_json::to_vec(payload).map_err(|source| crate::Error::Serialize { source })?;
        self.body = OutgoingBody::Buffered(Bytes::from(body));
        if !self.headers.contains(CONTENT_TYPE.as_str()) {
            self = self.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Ok(self)
    }

    /// Raw buffered body. No content-type is assumed; set one with
    /// [`header`](Self::header) if the server needs it.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = OutgoingBody::Buffered(body.into());
        self
    }

    /// Streaming body, sent without buffering (chunked unless a
    /// content-length header is set). Streamed calls are dispatched exactly
    /// once: they are not retried and a redirect answered after the stream
    /// started fails the call.
    pub fn body_stream<S, E>(mut self, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Sync + 'static,
        E: StdError + Send + Sync + 'static,
    {
        self.body = OutgoingBody::Streaming(Some(stream_req_body(stream)));
        self
    }

    pub fn body_reader<R>(self, reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        self.body_stream(ReaderStream::new(reader))
    }

    /// Marks the response as intentionally partial, which disables
    /// `next-range` pagination for this call.
    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Port override, honored only when the resolved URL does not pin one.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Scheme override (`"http"` or `"https"`), honored only for relative
    /// targets; absolute URLs keep their own scheme.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    /// Explicit proxy transport for this call. Overrides environment proxy
    /// resolution and sticks across redirects.
    pub fn agent(mut self, agent: Agent) -> Self {
        self.agent = Some(agent);
        self
    }

    pub async fn send(self) -> CallResult<crate::response::Response> {
        let options = CallOptions {
            partial: self.partial,
            port: self.port,
            protocol: self.protocol,
            timeout: self.timeout,
            retry_policy: self.retry_policy,
            agent: self.agent,
        };
        self.client
            .execute(self.method, self.target, self.headers, self.body, options)
            .await
    }

    pub async fn send_stream(self) -> CallResult<crate::response::RawResponse> {
        let options = CallOptions {
            partial: self.partial,
            port: self.port,
            protocol: self.protocol,
            timeout: self.timeout,
            retry_policy: self.retry_policy,
            agent: self.agent,
        };
        self.client
            .execute_stream(self.method, self.target, self.headers, self.body, options)
            .await
    }

    pub async fn send_json<T>(self) -> CallResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send().await?;
        response.json()
    }
}
