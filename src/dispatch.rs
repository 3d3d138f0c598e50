//! Bounded concurrent request dispatch.
//!
//! A [`Dispatcher`] takes a batch of already-authenticated [`RequestDescriptor`]s
//! and runs them through a [`Transport`] with at most `concurrency` requests in
//! flight. Every request runs to a terminal state; failures are logged with the
//! request URL and dropped, so the caller receives only the successful bodies,
//! in completion order.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::{Error, ResponseError, ValidationError};

/// Upper bound on in-flight requests per batch when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 75;

/// Largest cap the limiter can hold.
pub const MAX_CONCURRENCY: usize = Semaphore::MAX_PERMITS;

/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl FromStr for Method {
    type Err = ValidationError;

    /// Case-insensitive. An empty string means GET.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            _ => Err(ValidationError::InvalidMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

/// One fully-composed request: method, absolute URL and query pairs (API key included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
}

impl RequestDescriptor {
    pub(crate) fn new(method: Method, url: String, query: Vec<(String, String)>) -> Self {
        Self { method, url, query }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }
}

/// Executes a single request and decodes its JSON body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &RequestDescriptor) -> Result<Value, ResponseError>;
}

/// [`Transport`] backed by a `reqwest` connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("espapi-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("espapi-rs")),
        );

        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &RequestDescriptor) -> Result<Value, ResponseError> {
        let method = request.method().as_str();
        let url = request.url();
        debug!("sending {} {}", method, url);

        let resp = self
            .http
            .request(request.method().into(), url)
            .query(request.query())
            .send()
            .await
            .map_err(|e| ResponseError::transport(method, url, &e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ResponseError::transport(method, url, &e))?;
        debug!("received HTTP {} from {} {}", status.as_u16(), method, url);

        if !status.is_success() {
            return Err(ResponseError::status(method, url, status, &text));
        }

        serde_json::from_str::<Value>(&text).map_err(|e| ResponseError::decode(method, url, &e))
    }
}

pub(crate) fn clamp_concurrency(concurrency: usize) -> usize {
    concurrency.clamp(1, MAX_CONCURRENCY)
}

/// Runs a batch of requests under a concurrency cap, keeping only the successes.
///
/// The limiter is created per [`Dispatcher::dispatch`] call and never shared
/// between batches.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    concurrency: usize,
    progress: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl Dispatcher {
    /// `concurrency` is clamped to `1..=MAX_CONCURRENCY`.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: clamp_concurrency(concurrency),
            progress: false,
        }
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Executes every descriptor and returns the decoded bodies of those that succeeded.
    ///
    /// Never fails: transport errors, non-2xx statuses and undecodable bodies are
    /// logged and the request is left out of the result. The returned order is
    /// completion order, not input order.
    pub async fn dispatch<T>(&self, transport: &T, batch: &[RequestDescriptor]) -> Vec<Value>
    where
        T: Transport + ?Sized,
    {
        let total = batch.len();
        let limiter = Semaphore::new(self.concurrency);
        let progress = self.progress_bar(total as u64);

        let mut pending: FuturesUnordered<_> = batch
            .iter()
            .enumerate()
            .map(|(index, descriptor)| {
                let limiter = &limiter;
                async move {
                    // Only fails once closed, and this limiter never is.
                    let _permit = limiter.acquire().await.ok();
                    let outcome = transport.execute(descriptor).await;
                    (index, descriptor, outcome)
                }
            })
            .collect();

        let mut bodies = Vec::with_capacity(total);
        while let Some((index, descriptor, outcome)) = pending.next().await {
            match outcome {
                Ok(body) => bodies.push(body),
                Err(err) => error!(
                    "{} => request {}/{} dropped from batch: {}",
                    descriptor.url(),
                    index + 1,
                    total,
                    err
                ),
            }
            if let Some(pb) = &progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }
        debug!(
            "batch finished: {}/{} request(s) succeeded (concurrency {})",
            bodies.len(),
            total,
            self.concurrency
        );
        bodies
    }

    fn progress_bar(&self, len: u64) -> Option<ProgressBar> {
        if !self.progress {
            return None;
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} {pos}/{len} requests {wide_bar} {eta}")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        Some(pb)
    }
}
