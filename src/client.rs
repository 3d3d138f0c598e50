use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::dispatch::{
    DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT, Dispatcher, Method, ReqwestTransport, RequestDescriptor,
    Transport, clamp_concurrency,
};
use crate::error::{Error, ValidationError};
use crate::util::{
    API_KEY_PARAM, authenticated_query, split_query, urljoin, validate_path, validate_url,
};

/// Query parameters supplied by a caller.
pub type Params = BTreeMap<String, String>;

/// Base URL of the API, validated to carry a scheme and host, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn parse(url: &str) -> Result<Self, ValidationError> {
        Ok(Self(validate_url(url)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Endpoint {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A non-empty API key. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self, Error> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::Authentication("API key cannot be empty".to_string()));
        }
        Ok(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Authenticated client for one API key.
///
/// Single requests go through a long-lived connection pool and surface every
/// failure. Batches get their own pool and limiter for the duration of the call
/// and silently drop failed requests; see [`BaseClient::request_batch`].
#[derive(Debug, Clone)]
pub struct BaseClient {
    endpoint: Endpoint,
    key: ApiKey,

    timeout: Duration,
    concurrency: usize,
    progress: bool,

    transport: ReqwestTransport,
}

impl BaseClient {
    /// Fails with [`Error::Authentication`] when `api_key` is empty or whitespace.
    pub fn new(endpoint: Endpoint, api_key: &str) -> Result<Self, Error> {
        let key = ApiKey::new(api_key)?;
        let transport = ReqwestTransport::new(DEFAULT_TIMEOUT)?;

        Ok(Self {
            endpoint,
            key,
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            progress: false,
            transport,
        })
    }

    /// Builds a client from loaded configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, Error> {
        let endpoint = Endpoint::parse(&config.url)?;
        let key = config.key.as_deref().unwrap_or_default();
        Ok(Self::new(endpoint, key)?.with_concurrency(config.concurrency))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, Error> {
        self.transport = ReqwestTransport::new(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    /// Maximum in-flight requests per batch, clamped to `1..=MAX_CONCURRENCY`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = clamp_concurrency(concurrency);
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.key
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Query parameters merged into every request.
    pub fn default_params(&self) -> Params {
        let mut params = Params::new();
        params.insert(API_KEY_PARAM.to_string(), self.key.expose().to_string());
        params
    }

    /// Absolute URL for a relative resource path.
    pub fn get_url(&self, path: &str) -> Result<String, ValidationError> {
        Ok(urljoin(self.endpoint.as_str(), &validate_path(path)?))
    }

    /// Composes an authenticated request.
    ///
    /// A query string embedded in `path` is moved into the request parameters.
    /// Any caller-supplied `api_key`, from `params` or from the path, is discarded.
    pub fn describe(
        &self,
        path: &str,
        method: Method,
        params: &Params,
    ) -> Result<RequestDescriptor, ValidationError> {
        let path = validate_path(path)?;
        let (resource, embedded) = split_query(&path);
        if resource.is_empty() {
            return Err(ValidationError::InvalidPath {
                path: path.clone(),
                reason: "path is empty",
            });
        }

        let url = urljoin(self.endpoint.as_str(), resource);
        let merged = embedded.iter().map(|(k, v)| (k, v)).chain(params);
        let query = authenticated_query(merged, self.key.expose());
        Ok(RequestDescriptor::new(method, url, query))
    }

    /// Performs one request and returns its decoded JSON body.
    ///
    /// `method` is case-insensitive and must be GET or POST. Transport errors,
    /// non-2xx statuses and undecodable bodies are returned as [`Error::Response`].
    pub async fn request(&self, path: &str, method: &str, params: &Params) -> Result<Value, Error> {
        let method: Method = method.parse()?;
        let descriptor = self.describe(path, method, params)?;
        Ok(self.transport.execute(&descriptor).await?)
    }

    /// Performs many requests concurrently and returns the bodies that succeeded.
    ///
    /// Paths and method are validated up front; a bad one fails the whole call
    /// before anything is sent. After that the call cannot fail: requests that
    /// error are logged and left out, whatever the batch size, including a batch
    /// of one. Results are in completion order, not input order.
    pub async fn request_batch<S>(
        &self,
        paths: &[S],
        method: &str,
        params: &Params,
    ) -> Result<Vec<Value>, Error>
    where
        S: AsRef<str>,
    {
        let method: Method = method.parse()?;
        let batch = paths
            .iter()
            .map(|p| self.describe(p.as_ref(), method, params))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "dispatching batch of {} {} request(s) to {}",
            batch.len(),
            method,
            self.endpoint
        );

        // Pool and limiter live only for this call.
        let transport = ReqwestTransport::new(self.timeout)?;
        let dispatcher = Dispatcher::new(self.concurrency).with_progress(self.progress);
        Ok(dispatcher.dispatch(&transport, &batch).await)
    }
}
