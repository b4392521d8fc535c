//! `onereq` makes one-shot JSON API calls over HTTP/1.1 and HTTP/2, with
//! retries, redirect following and `next-range` pagination built in.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use onereq::prelude::{Client, RetryPolicy};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct App {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")
//!         .timeout(Duration::from_secs(5))
//!         .retry_policy(RetryPolicy::standard().max_retries(3))
//!         .try_build()?;
//!
//!     let apps: Vec<App> = client
//!         .get("/apps")
//!         .try_header("authorization", "Bearer s3cr3t")?
//!         .send_json()
//!         .await?;
//!
//!     println!("{} apps", apps.len());
//!     Ok(())
//! }
//! ```
//!
//! # Defaults
//!
//! - Relative targets join the base URL, `https://localhost` unless set.
//! - Transient transport failures retry up to 5 times with exponential
//!   backoff; failed DNS lookups always retry.
//! - Redirects are followed for up to 10 hops; a cross-origin hop drops the
//!   `authorization` header.
//! - A `GET` response carrying a `next-range` header and an array body is
//!   fetched to completion and concatenated. Opt out per call with
//!   `partial()`.
//! - `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` are honored, with CONNECT
//!   tunneling and `SSL_CERT_FILE`/`SSL_CERT_DIR` CA material.

mod body;
mod client;
mod error;
mod headers;
mod proxy;
mod request;
mod response;
mod retry;
mod util;

pub use crate::client::{Client, ClientBuilder, DEFAULT_USER_AGENT};
pub use crate::error::{Error, ErrorCode, TransportErrorKind};
pub use crate::headers::HeaderStore;
pub use crate::proxy::{Agent, NoProxyRule, ProxyConfig, ProxyTarget};
pub use crate::request::RequestBuilder;
pub use crate::response::{RawResponse, Response, ResponseBody};
pub use crate::retry::{RetryClassifier, RetryPolicy, TransientRetryClassifier};

pub type CallResult<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        CallResult, Client, Error, ErrorCode, RawResponse, Response, ResponseBody, RetryClassifier,
        RetryPolicy, TransientRetryClassifier, TransportErrorKind,
    };
}

#[cfg(test)]
mod tests;
