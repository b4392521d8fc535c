use std::error::Error as StdError;
use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::header::HeaderValue;
use http::{Request, Response, Uri};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client as LegacyClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::connect::proxy::Tunnel;
use hyper_util::rt::TokioExecutor;
use rustls::pki_types::CertificateDer;
use tower_service::Service;
use url::Url;

use crate::CallResult;
use crate::body::ReqBody;
use crate::error::Error;

pub(crate) type BoxConnectError = Box<dyn StdError + Send + Sync>;

pub(crate) const DEFAULT_PROXY_PORT: u16 = 8080;

fn proxy_setup_error(message: String) -> Error {
    Error::ProxySetup { message }
}

/// One `NO_PROXY` pattern. Suffix rules keep the observed string-suffix
/// semantics: a leading dot is stripped before matching, and a bare pattern
/// matches any host ending in it, label boundary or not.
#[derive(Clone, Debug, PartialEq)]
pub enum NoProxyRule {
    Any,
    Suffix(String),
}

impl NoProxyRule {
    pub fn parse(text: &str) -> Option<Self> {
        let candidate = text.trim();
        if candidate.is_empty() {
            return None;
        }
        if candidate == "*" {
            return Some(Self::Any);
        }
        Some(Self::Suffix(candidate.to_ascii_lowercase()))
    }

    pub fn matches(&self, host: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Suffix(pattern) => {
                let suffix = pattern.strip_prefix('.').unwrap_or(pattern);
                host.ends_with(suffix)
            }
        }
    }
}

pub(crate) fn parse_no_proxy_rules(text: &str) -> Vec<NoProxyRule> {
    text.split(',').filter_map(NoProxyRule::parse).collect()
}

/// Environment snapshot the resolver works from. `from_env` captures
/// `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` (upper-case wins over lower-case)
/// plus `SSL_CERT_FILE`/`SSL_CERT_DIR`; the chainable setters assemble the
/// same snapshot directly for tests and embedders.
#[derive(Clone, Default)]
pub struct ProxyConfig {
    http_proxy: Option<String>,
    https_proxy: Option<String>,
    no_proxy_rules: Vec<NoProxyRule>,
    ssl_cert_file: Option<PathBuf>,
    ssl_cert_dir: Option<PathBuf>,
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self {
            http_proxy: env_var_pair("HTTP_PROXY", "http_proxy"),
            https_proxy: env_var_pair("HTTPS_PROXY", "https_proxy"),
            no_proxy_rules: env_var_pair("NO_PROXY", "no_proxy")
                .map(|text| parse_no_proxy_rules(&text))
                .unwrap_or_default(),
            ssl_cert_file: std::env::var("SSL_CERT_FILE").ok().map(PathBuf::from),
            ssl_cert_dir: std::env::var("SSL_CERT_DIR").ok().map(PathBuf::from),
        }
    }

    pub fn http_proxy(mut self, url: impl Into<String>) -> Self {
        self.http_proxy = Some(url.into());
        self
    }

    pub fn https_proxy(mut self, url: impl Into<String>) -> Self {
        self.https_proxy = Some(url.into());
        self
    }

    /// Comma-separated pattern list, same syntax as the `NO_PROXY` variable.
    pub fn no_proxy(mut self, patterns: &str) -> Self {
        self.no_proxy_rules = parse_no_proxy_rules(patterns);
        self
    }

    pub fn ssl_cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssl_cert_file = Some(path.into());
        self
    }

    pub fn ssl_cert_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssl_cert_dir = Some(path.into());
        self
    }

    pub fn should_bypass(&self, host: &str) -> bool {
        let normalized = host.to_ascii_lowercase();
        self.no_proxy_rules
            .iter()
            .any(|rule| rule.matches(&normalized))
    }

    pub fn using_proxy(&self, host: &str) -> bool {
        if self.should_bypass(host) {
            return false;
        }
        self.http_proxy.is_some() || self.https_proxy.is_some()
    }

    fn proxy_url_text(&self, secure: bool) -> Option<&str> {
        if secure {
            self.https_proxy.as_deref().or(self.http_proxy.as_deref())
        } else {
            self.http_proxy.as_deref()
        }
    }

    /// Parses the proxy endpoint for the given target scheme: secure targets
    /// take `HTTPS_PROXY` falling back to `HTTP_PROXY`, plain targets take
    /// `HTTP_PROXY` only. `Ok(None)` when no suitable URL is configured.
    pub fn resolve_target(&self, secure: bool) -> CallResult<Option<ProxyTarget>> {
        let Some(text) = self.proxy_url_text(secure) else {
            return Ok(None);
        };
        let url = Url::parse(text)
            .map_err(|_| proxy_setup_error(format!("invalid proxy url: {text}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| proxy_setup_error(format!("proxy url missing host: {text}")))?
            .to_owned();
        let port = url.port().unwrap_or(DEFAULT_PROXY_PORT);
        let credentials = if url.username().is_empty() {
            None
        } else {
            let mut credentials = url.username().to_owned();
            credentials.push(':');
            credentials.push_str(url.password().unwrap_or_default());
            Some(credentials)
        };
        Ok(Some(ProxyTarget {
            host,
            port,
            credentials,
        }))
    }

    /// Paths the CA material comes from: the configured file plus every
    /// regular file in the configured directory.
    pub fn cert_sources(&self) -> CallResult<Vec<PathBuf>> {
        let mut sources = Vec::new();
        if let Some(file) = &self.ssl_cert_file {
            sources.push(file.clone());
        }
        if let Some(dir) = &self.ssl_cert_dir {
            let entries = fs::read_dir(dir).map_err(|error| {
                proxy_setup_error(format!(
                    "failed to read certificate directory {}: {error}",
                    dir.display()
                ))
            })?;
            for entry in entries {
                let entry = entry.map_err(|error| {
                    proxy_setup_error(format!(
                        "failed to read certificate directory {}: {error}",
                        dir.display()
                    ))
                })?;
                let path = entry.path();
                if path.is_file() {
                    sources.push(path);
                }
            }
        }
        Ok(sources)
    }

    fn load_root_certificates(&self) -> CallResult<Vec<CertificateDer<'static>>> {
        let mut certificates = Vec::new();
        for path in self.cert_sources()? {
            let data = fs::read(&path).map_err(|error| {
                proxy_setup_error(format!(
                    "failed to read certificate file {}: {error}",
                    path.display()
                ))
            })?;
            let mut reader = &data[..];
            for certificate in rustls_pemfile::certs(&mut reader) {
                let certificate = certificate.map_err(|error| {
                    proxy_setup_error(format!(
                        "failed to parse certificate file {}: {error}",
                        path.display()
                    ))
                })?;
                certificates.push(certificate);
            }
        }
        Ok(certificates)
    }

    /// The per-call resolution step: `Ok(None)` means go direct, otherwise a
    /// CONNECT-tunneling transport for the selected proxy with any
    /// configured CA material attached.
    pub fn agent(&self, secure: bool, host: &str) -> CallResult<Option<Agent>> {
        if !self.using_proxy(host) {
            return Ok(None);
        }
        let Some(target) = self.resolve_target(secure)? else {
            return Ok(None);
        };
        let roots = self.load_root_certificates()?;
        Agent::tunnel_through(&target, &roots).map(Some)
    }
}

/// Parsed proxy endpoint: host, port (8080 unless the URL pins one), and
/// optional `user:pass` credentials.
#[derive(Clone, Debug, PartialEq)]
pub struct ProxyTarget {
    host: String,
    port: u16,
    credentials: Option<String>,
}

impl ProxyTarget {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credentials(&self) -> Option<&str> {
        self.credentials.as_deref()
    }

    pub(crate) fn uri(&self) -> CallResult<Uri> {
        let text = format!("http://{}:{}", self.host, self.port);
        text.parse()
            .map_err(|_| proxy_setup_error(format!("invalid proxy endpoint: {text}")))
    }

    pub(crate) fn authorization_header(&self) -> CallResult<Option<HeaderValue>> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };
        let encoded = BASE64.encode(credentials);
        let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|_| proxy_setup_error("invalid proxy credentials".to_owned()))?;
        value.set_sensitive(true);
        Ok(Some(value))
    }
}

/// Opaque tunneling transport handle. Resolved once per call by
/// [`ProxyConfig::agent`] and reusable as an explicit per-call override.
#[derive(Clone)]
pub struct Agent {
    client: LegacyClient<HttpsConnector<TunnelConnector>, ReqBody>,
}

impl Agent {
    pub(crate) fn tunnel_through(
        target: &ProxyTarget,
        roots: &[CertificateDer<'static>],
    ) -> CallResult<Self> {
        let mut direct = HttpConnector::new();
        direct.enforce_http(false);

        let mut tunnel = Tunnel::new(target.uri()?, direct);
        if let Some(authorization) = target.authorization_header()? {
            tunnel = tunnel.with_auth(authorization);
        }

        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config_with_roots(roots)?)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(TunnelConnector { tunnel });
        let client = LegacyClient::builder(TokioExecutor::new()).build(https);
        Ok(Self { client })
    }

    pub(crate) async fn send(
        &self,
        request: Request<ReqBody>,
    ) -> Result<Response<Incoming>, hyper_util::client::legacy::Error> {
        self.client.request(request).await
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Agent").finish_non_exhaustive()
    }
}

fn tls_config_with_roots(roots: &[CertificateDer<'static>]) -> CallResult<rustls::ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    for certificate in roots {
        root_store.add(certificate.clone()).map_err(|error| {
            proxy_setup_error(format!("failed to add proxy ca certificate: {error}"))
        })?;
    }

    let provider = rustls::crypto::ring::default_provider();
    let config = rustls::ClientConfig::builder_with_provider(provider.into())
        .with_safe_default_protocol_versions()
        .map_err(|error| {
            proxy_setup_error(format!("failed to configure tls protocol versions: {error}"))
        })?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(config)
}

/// CONNECT tunnel as a connector. The only twist over the plain
/// [`Tunnel`] is authority normalization: CONNECT targets must carry an
/// explicit port, 443 for secure destinations and 80 otherwise.
#[derive(Clone)]
pub(crate) struct TunnelConnector {
    tunnel: Tunnel<HttpConnector>,
}

impl Service<Uri> for TunnelConnector {
    type Response = <HttpConnector as Service<Uri>>::Response;
    type Error = BoxConnectError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.tunnel.poll_ready(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
            Poll::Ready(Err(error)) => Poll::Ready(Err(Box::new(error))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let connecting = self.tunnel.call(normalize_tunnel_target_uri(dst));
        Box::pin(async move { connecting.await.map_err(|error| Box::new(error) as _) })
    }
}

pub(crate) fn normalize_tunnel_target_uri(dst: Uri) -> Uri {
    if dst.port().is_some() {
        return dst;
    }

    let Some(scheme) = dst.scheme_str() else {
        return dst;
    };
    let default_port = if scheme.eq_ignore_ascii_case("https") {
        443
    } else if scheme.eq_ignore_ascii_case("http") {
        80
    } else {
        return dst;
    };
    let Some(host) = dst.host() else {
        return dst;
    };
    let authority_text = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{default_port}")
    } else {
        format!("{host}:{default_port}")
    };

    let Ok(authority) = authority_text.parse() else {
        return dst;
    };
    let original = dst.clone();
    let mut parts = dst.into_parts();
    parts.authority = Some(authority);
    Uri::from_parts(parts).unwrap_or(original)
}

fn env_var_pair(upper: &str, lower: &str) -> Option<String> {
    std::env::var(upper)
        .ok()
        .filter(|value| !value.is_empty())
        .or_else(|| std::env::var(lower).ok().filter(|value| !value.is_empty()))
}
