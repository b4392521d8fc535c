use std::sync::Arc;
use std::time::Duration;

use http::header::{AUTHORIZATION, CONTENT_LENGTH, RANGE, USER_AGENT};
use http::{HeaderName, HeaderValue, Method, Request, StatusCode};
use hyper::body::Incoming;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client as LegacyClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{Instrument, Span, debug, info_span, trace, warn};
use url::Url;

use crate::CallResult;
use crate::body::{OutgoingBody, ReqBody, build_http_request, decode_response_body, read_all_body};
use crate::error::{Error, TransportErrorKind};
use crate::headers::HeaderStore;
use crate::proxy::{Agent, ProxyConfig};
use crate::request::RequestBuilder;
use crate::response::{RawResponse, Response, ResponseBody};
use crate::retry::{RetryClassifier, RetryPolicy, TransientRetryClassifier};
use crate::util::{
    body_summary, classify_transport_error, invalid_url, is_redirect_status, redirect_location,
    resolve_call_url, resolve_redirect_url, same_origin, truncate_body, url_to_uri,
};

const DEFAULT_BASE_URL: &str = "https://localhost";
const DEFAULT_MAX_REDIRECTS: usize = 10;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub(crate) const NEXT_RANGE_HEADER: &str = "next-range";

/// Identity sent when the caller sets nothing else.
pub const DEFAULT_USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
    " rust-",
    env!("CARGO_PKG_RUST_VERSION")
);

type DirectConnector = hyper_rustls::HttpsConnector<HttpConnector>;
type DirectTransport = LegacyClient<DirectConnector, ReqBody>;

fn build_direct_transport() -> CallResult<DirectTransport> {
    let mut connector = HttpConnector::new();
    connector.enforce_http(false);
    let https = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
        .map_err(|source| Error::TlsInit {
            message: source.to_string(),
        })?
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(connector);
    let transport = LegacyClient::builder(TokioExecutor::new())
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .build(https);
    Ok(transport)
}

enum TransportRequestError {
    Transport(hyper_util::client::legacy::Error),
    Timeout,
}

enum ReadBodyFailure {
    Read(hyper::Error),
    Timeout,
}

enum CallTransport {
    Direct,
    Proxied(Agent),
}

pub(crate) struct CallOptions {
    pub(crate) partial: bool,
    pub(crate) port: Option<u16>,
    pub(crate) protocol: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry_policy: Option<RetryPolicy>,
    pub(crate) agent: Option<Agent>,
}

/// Everything one call mutates while it runs: the URL moves on redirects,
/// headers lose authorization on cross-origin hops and gain `range` on
/// pagination, and the two hop counters gate the loops.
struct CallState {
    method: Method,
    url: Url,
    headers: HeaderStore,
    body: OutgoingBody,
    transport: CallTransport,
    caller_agent: bool,
    partial: bool,
    timeout: Option<Duration>,
    policy: RetryPolicy,
    retry_count: usize,
    redirect_hops: usize,
}

pub struct ClientBuilder {
    base_url: String,
    default_headers: HeaderStore,
    user_agent: String,
    default_port: Option<u16>,
    timeout: Option<Duration>,
    retry_policy: RetryPolicy,
    retry_classifier: Arc<dyn RetryClassifier>,
    max_redirects: usize,
    proxy: Option<ProxyConfig>,
}

impl ClientBuilder {
    pub(crate) fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            default_headers: HeaderStore::new(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            default_port: None,
            timeout: None,
            retry_policy: RetryPolicy::standard(),
            retry_classifier: Arc::new(TransientRetryClassifier),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            proxy: None,
        }
    }

    /// Base every relative call target joins against.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn try_default_header(mut self, name: &str, value: &str) -> CallResult<Self> {
        self.default_headers.set(name, value)?;
        Ok(self)
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Port applied to any call URL that does not pin one itself.
    pub fn default_port(mut self, default_port: u16) -> Self {
        self.default_port = Some(default_port);
        self
    }

    /// Per-exchange timeout. Unset means wait indefinitely.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Predicate deciding which transport failures are worth another
    /// attempt. DNS resolution failures retry regardless of the predicate.
    pub fn retry_classifier(mut self, retry_classifier: Arc<dyn RetryClassifier>) -> Self {
        self.retry_classifier = retry_classifier;
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Proxy selection snapshot. When unset the process environment is
    /// captured at build time.
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn try_build(self) -> CallResult<Client> {
        let base_url = Url::parse(&self.base_url).map_err(|_| invalid_url(&self.base_url))?;
        let user_agent =
            HeaderValue::from_str(&self.user_agent).map_err(|source| Error::InvalidHeaderValue {
                name: USER_AGENT.as_str().to_owned(),
                source,
            })?;
        let transport = build_direct_transport()?;

        Ok(Client {
            base_url,
            default_headers: self.default_headers,
            user_agent,
            default_port: self.default_port,
            timeout: self.timeout,
            retry_policy: self.retry_policy,
            retry_classifier: self.retry_classifier,
            max_redirects: self.max_redirects,
            proxy: self.proxy.unwrap_or_else(ProxyConfig::from_env),
            transport,
        })
    }

    pub fn build(self) -> Client {
        self.try_build()
            .unwrap_or_else(|error| panic!("failed to build client: {error}"))
    }
}

#[derive(Clone)]
pub struct Client {
    base_url: Url,
    default_headers: HeaderStore,
    user_agent: HeaderValue,
    default_port: Option<u16>,
    timeout: Option<Duration>,
    retry_policy: RetryPolicy,
    retry_classifier: Arc<dyn RetryClassifier>,
    max_redirects: usize,
    proxy: ProxyConfig,
    transport: DirectTransport,
}

impl Client {
    /// Client with all defaults: base `https://localhost`, standard retry
    /// policy, proxy settings from the environment.
    pub fn new() -> Self {
        ClientBuilder::new().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn request(&self, method: Method, target: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, target.into())
    }

    pub fn get(&self, target: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::GET, target)
    }

    pub fn post(&self, target: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::POST, target)
    }

    pub fn put(&self, target: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PUT, target)
    }

    pub fn patch(&self, target: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PATCH, target)
    }

    pub fn delete(&self, target: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::DELETE, target)
    }

    fn prepare(
        &self,
        method: Method,
        target: &str,
        headers: HeaderStore,
        body: OutgoingBody,
        options: CallOptions,
    ) -> CallResult<CallState> {
        let url = resolve_call_url(
            &self.base_url,
            target,
            options.protocol.as_deref(),
            options.port.or(self.default_port),
        )?;

        let mut merged = HeaderStore::new();
        merged.insert(USER_AGENT, self.user_agent.clone());
        merged.merge(&self.default_headers);
        merged.merge(&headers);
        if let Some(length) = body.content_length()
            && !merged.contains(CONTENT_LENGTH.as_str())
        {
            merged.insert(CONTENT_LENGTH, HeaderValue::from(length));
        }

        let secure = url.scheme() == "https";
        let host = url.host_str().unwrap_or_default().to_owned();
        let (transport, caller_agent) = match options.agent {
            Some(agent) => (CallTransport::Proxied(agent), true),
            None => match self.proxy.agent(secure, &host)? {
                Some(agent) => (CallTransport::Proxied(agent), false),
                None => (CallTransport::Direct, false),
            },
        };

        Ok(CallState {
            method,
            url,
            headers: merged,
            body,
            transport,
            caller_agent,
            partial: options.partial,
            timeout: options.timeout.or(self.timeout),
            policy: options.retry_policy.unwrap_or_else(|| self.retry_policy.clone()),
            retry_count: 0,
            redirect_hops: 0,
        })
    }

    /// Consumes one retry from the budget if this failure kind qualifies,
    /// returning the backoff to sleep. `None` means the error is terminal.
    fn next_retry_delay(
        &self,
        state: &mut CallState,
        kind: TransportErrorKind,
    ) -> Option<Duration> {
        if !state.body.is_replayable() {
            return None;
        }
        let retryable =
            kind == TransportErrorKind::Dns || self.retry_classifier.should_retry(kind);
        if !retryable {
            return None;
        }
        if state.retry_count >= state.policy.configured_max_retries() {
            return None;
        }
        state.retry_count += 1;
        Some(state.policy.backoff_for_retry(state.retry_count))
    }

    async fn send_transport_request(
        &self,
        transport: &CallTransport,
        limit: Option<Duration>,
        request: Request<ReqBody>,
    ) -> Result<http::Response<Incoming>, TransportRequestError> {
        let pending = async {
            match transport {
                CallTransport::Direct => self.transport.request(request).await,
                CallTransport::Proxied(agent) => agent.send(request).await,
            }
        };
        match limit {
            Some(limit) => match timeout(limit, pending).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(source)) => Err(TransportRequestError::Transport(source)),
                Err(_) => Err(TransportRequestError::Timeout),
            },
            None => pending.await.map_err(TransportRequestError::Transport),
        }
    }

    async fn read_response_body(
        &self,
        limit: Option<Duration>,
        body: Incoming,
    ) -> Result<bytes::Bytes, ReadBodyFailure> {
        match limit {
            Some(limit) => match timeout(limit, read_all_body(body)).await {
                Ok(Ok(bytes)) => Ok(bytes),
                Ok(Err(source)) => Err(ReadBodyFailure::Read(source)),
                Err(_) => Err(ReadBodyFailure::Timeout),
            },
            None => read_all_body(body).await.map_err(ReadBodyFailure::Read),
        }
    }

    fn timeout_error(&self, state: &CallState) -> Error {
        Error::Timeout {
            timeout_ms: state
                .timeout
                .map(|limit| limit.as_millis())
                .unwrap_or_default(),
            method: state.method.clone(),
            url: state.url.to_string(),
        }
    }

    /// Span for one logical call. The attempt counters ride on the events
    /// emitted inside it.
    fn call_span(&self, state: &CallState) -> Span {
        info_span!(
            "onereq.call",
            method = %state.method,
            url = %state.url,
            max_retries = state.policy.configured_max_retries(),
            max_redirects = self.max_redirects
        )
    }

    /// Dispatches until a response arrives or the retry budget is spent.
    /// Retries re-send the same URL and headers after exponential backoff.
    async fn dispatch_with_retry(
        &self,
        state: &mut CallState,
    ) -> CallResult<http::Response<Incoming>> {
        loop {
            debug!(
                retry = state.retry_count,
                redirects = state.redirect_hops,
                "dispatching request"
            );
            trace!(headers = ?state.headers.redacted(), "request headers");

            let request_body = state.body.take_req_body(&state.method, state.url.as_str())?;
            let request = build_http_request(
                state.method.clone(),
                url_to_uri(&state.url)?,
                &state.headers,
                request_body,
            )?;

            match self
                .send_transport_request(&state.transport, state.timeout, request)
                .await
            {
                Ok(response) => return Ok(response),
                Err(TransportRequestError::Transport(source)) => {
                    let kind = classify_transport_error(&source);
                    let error = Error::Transport {
                        kind,
                        method: state.method.clone(),
                        url: state.url.to_string(),
                        source: Box::new(source),
                    };
                    match self.next_retry_delay(state, kind) {
                        Some(delay) => {
                            warn!(
                                retry = state.retry_count,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "retrying after transport error"
                            );
                            sleep(delay).await;
                        }
                        None => return Err(error),
                    }
                }
                Err(TransportRequestError::Timeout) => {
                    let error = self.timeout_error(state);
                    match self.next_retry_delay(state, TransportErrorKind::Timeout) {
                        Some(delay) => {
                            warn!(
                                retry = state.retry_count,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "retrying after timeout"
                            );
                            sleep(delay).await;
                        }
                        None => return Err(error),
                    }
                }
            }
        }
    }

    /// Applies one redirect hop to the call state: checks the hop budget,
    /// resolves the location, and on cross-origin moves drops authorization
    /// and re-resolves the proxy agent (unless one was caller-supplied).
    fn follow_redirect(
        &self,
        state: &mut CallState,
        status: StatusCode,
        response_headers: &HeaderStore,
    ) -> CallResult<()> {
        if state.redirect_hops >= self.max_redirects {
            return Err(Error::RedirectLoop {
                hops: state.redirect_hops,
                method: state.method.clone(),
                url: state.url.to_string(),
            });
        }
        let Some(location) = redirect_location(response_headers) else {
            return Err(Error::MissingRedirectLocation {
                status: status.as_u16(),
                method: state.method.clone(),
                url: state.url.to_string(),
            });
        };
        let Some(next_url) = resolve_redirect_url(&state.url, &location) else {
            return Err(Error::InvalidRedirectLocation {
                location,
                method: state.method.clone(),
                url: state.url.to_string(),
            });
        };

        if !same_origin(&state.url, &next_url) {
            state.headers.remove(AUTHORIZATION.as_str());
            if !state.caller_agent {
                let secure = next_url.scheme() == "https";
                let host = next_url.host_str().unwrap_or_default().to_owned();
                state.transport = match self.proxy.agent(secure, &host)? {
                    Some(agent) => CallTransport::Proxied(agent),
                    None => CallTransport::Direct,
                };
            }
        }

        state.redirect_hops += 1;
        debug!(status = status.as_u16(), location = %next_url, "following redirect");
        state.url = next_url;
        Ok(())
    }

    fn status_error(&self, state: &CallState, status: StatusCode, body: ResponseBody) -> Error {
        Error::HttpStatus {
            status: status.as_u16(),
            method: state.method.clone(),
            url: state.url.to_string(),
            summary: body_summary(&body),
            body,
        }
    }

    pub(crate) async fn execute(
        &self,
        method: Method,
        target: String,
        headers: HeaderStore,
        body: OutgoingBody,
        options: CallOptions,
    ) -> CallResult<Response> {
        let state = self.prepare(method, &target, headers, body, options)?;
        let span = self.call_span(&state);
        self.run(state).instrument(span).await
    }

    async fn run(&self, mut state: CallState) -> CallResult<Response> {
        let mut collected: Vec<Value> = Vec::new();
        let mut paginated = false;

        loop {
            let response = self.dispatch_with_retry(&mut state).await?;
            let status = response.status();
            let response_headers = HeaderStore::from_header_map(response.headers());

            if is_redirect_status(status) {
                self.follow_redirect(&mut state, status, &response_headers)?;
                continue;
            }

            let bytes = match self
                .read_response_body(state.timeout, response.into_body())
                .await
            {
                Ok(bytes) => bytes,
                Err(ReadBodyFailure::Read(source)) => {
                    let error = Error::Transport {
                        kind: TransportErrorKind::Read,
                        method: state.method.clone(),
                        url: state.url.to_string(),
                        source: Box::new(source),
                    };
                    match self.next_retry_delay(&mut state, TransportErrorKind::Read) {
                        Some(delay) => {
                            warn!(
                                retry = state.retry_count,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "retrying after body read error"
                            );
                            sleep(delay).await;
                            continue;
                        }
                        None => return Err(error),
                    }
                }
                Err(ReadBodyFailure::Timeout) => {
                    let error = self.timeout_error(&state);
                    match self.next_retry_delay(&mut state, TransportErrorKind::Timeout) {
                        Some(delay) => {
                            warn!(
                                retry = state.retry_count,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "retrying after body read timeout"
                            );
                            sleep(delay).await;
                            continue;
                        }
                        None => return Err(error),
                    }
                }
            };

            let body = decode_response_body(&bytes, response_headers.get_str("content-type"))
                .map_err(|source| Error::Deserialize {
                    source,
                    body: truncate_body(&bytes),
                })?;

            if !status.is_success() {
                return Err(self.status_error(&state, status, body));
            }

            let next_range = if state.method == Method::GET && !state.partial {
                response_headers.get(NEXT_RANGE_HEADER).cloned()
            } else {
                None
            };
            if let Some(range_value) = next_range
                && body.is_array()
            {
                if let ResponseBody::Json(Value::Array(mut items)) = body {
                    collected.append(&mut items);
                }
                paginated = true;
                state.headers.insert(RANGE, range_value);
                debug!(items = collected.len(), "following next-range");
                continue;
            }

            let body = if paginated {
                let mut items = collected;
                match body {
                    ResponseBody::Json(Value::Array(mut tail)) => items.append(&mut tail),
                    ResponseBody::Json(other) => items.push(other),
                    ResponseBody::Text(text) => items.push(Value::String(text)),
                }
                ResponseBody::Json(Value::Array(items))
            } else {
                body
            };

            debug!(status = status.as_u16(), "call completed");
            return Ok(Response::new(status, response_headers, body));
        }
    }

    pub(crate) async fn execute_stream(
        &self,
        method: Method,
        target: String,
        headers: HeaderStore,
        body: OutgoingBody,
        options: CallOptions,
    ) -> CallResult<RawResponse> {
        let state = self.prepare(method, &target, headers, body, options)?;
        let span = self.call_span(&state);
        self.run_stream(state).instrument(span).await
    }

    async fn run_stream(&self, mut state: CallState) -> CallResult<RawResponse> {
        loop {
            let response = self.dispatch_with_retry(&mut state).await?;
            let status = response.status();
            let response_headers = HeaderStore::from_header_map(response.headers());

            if is_redirect_status(status) {
                self.follow_redirect(&mut state, status, &response_headers)?;
                continue;
            }

            if !status.is_success() {
                let bytes = match self
                    .read_response_body(state.timeout, response.into_body())
                    .await
                {
                    Ok(bytes) => bytes,
                    Err(ReadBodyFailure::Read(source)) => {
                        let error = Error::Transport {
                            kind: TransportErrorKind::Read,
                            method: state.method.clone(),
                            url: state.url.to_string(),
                            source: Box::new(source),
                        };
                        match self.next_retry_delay(&mut state, TransportErrorKind::Read) {
                            Some(delay) => {
                                warn!(
                                    retry = state.retry_count,
                                    delay_ms = delay.as_millis() as u64,
                                    error = %error,
                                    "retrying after body read error"
                                );
                                sleep(delay).await;
                                continue;
                            }
                            None => return Err(error),
                        }
                    }
                    Err(ReadBodyFailure::Timeout) => {
                        let error = self.timeout_error(&state);
                        match self.next_retry_delay(&mut state, TransportErrorKind::Timeout) {
                            Some(delay) => {
                                warn!(
                                    retry = state.retry_count,
                                    delay_ms = delay.as_millis() as u64,
                                    error = %error,
                                    "retrying after body read timeout"
                                );
                                sleep(delay).await;
                                continue;
                            }
                            None => return Err(error),
                        }
                    }
                };
                let body = decode_response_body(&bytes, response_headers.get_str("content-type"))
                    .map_err(|source| Error::Deserialize {
                        source,
                        body: truncate_body(&bytes),
                    })?;
                return Err(self.status_error(&state, status, body));
            }

            debug!(status = status.as_u16(), "call streaming");
            return Ok(RawResponse::new(
                status,
                response_headers,
                response.into_body(),
                state.method,
                state.url.to_string(),
            ));
        }
    }
}
