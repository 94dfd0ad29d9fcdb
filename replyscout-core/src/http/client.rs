use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::{Host, Url};

use super::error::{HttpError, HttpResult};
use super::resolver::{HostResolver, SystemResolver};
use super::retry::RetryPolicy;
use super::transport::{HttpResponse, HttpTransport, PreparedRequest, ReqwestTransport};
use crate::config::HttpSection;

#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone)]
pub struct ResilientClient {
    transport: Arc<dyn HttpTransport>,
    resolver: Arc<dyn HostResolver>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ResilientClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        resolver: Arc<dyn HostResolver>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            resolver,
            policy,
        }
    }

    pub fn from_config(config: &HttpSection) -> HttpResult<Self> {
        let transport =
            ReqwestTransport::new(Duration::from_secs(config.request_timeout_seconds.max(1)))?;
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(SystemResolver),
            RetryPolicy::new(config),
        ))
    }

    pub async fn send(&self, spec: &RequestSpec) -> HttpResult<HttpResponse> {
        self.execute(spec, &self.policy).await
    }

    /// Runs `spec` under `policy`. Non-success responses come back as
    /// `HttpError::Status`; after the last retry the final error is returned
    /// untouched.
    pub async fn execute(&self, spec: &RequestSpec, policy: &RetryPolicy) -> HttpResult<HttpResponse> {
        let url = Url::parse(&spec.url)
            .map_err(|err| HttpError::InvalidRequest(format!("{}: {err}", spec.url)))?;
        let mut retry = 0u32;
        loop {
            let pin = policy.force_resolve || retry > 0;
            let result = match self.prepare(spec, &url, pin).await {
                Ok(prepared) => self.attempt(prepared).await,
                Err(err) => Err(err),
            };
            let err = match result {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            if !err.is_retryable() || retry >= policy.max_retries {
                return Err(err);
            }
            let delay = policy.next_delay(retry, err.retry_after());
            warn!(
                url = %spec.url,
                attempt = retry + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "request failed, retrying"
            );
            sleep(delay).await;
            retry += 1;
        }
    }

    async fn attempt(&self, prepared: PreparedRequest) -> HttpResult<HttpResponse> {
        let response = self.transport.send(prepared).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(response.into_status_error())
        }
    }

    async fn prepare(&self, spec: &RequestSpec, url: &Url, pin: bool) -> HttpResult<PreparedRequest> {
        let mut prepared = PreparedRequest {
            method: spec.method.clone(),
            url: url.clone(),
            pinned: None,
            headers: spec.headers.clone(),
            body: spec.body.clone(),
            timeout: spec.timeout,
        };
        if !pin {
            return Ok(prepared);
        }
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            // Already a literal address; nothing to pin.
            Some(_) => return Ok(prepared),
            None => {
                return Err(HttpError::InvalidRequest(format!(
                    "{} has no host",
                    spec.url
                )))
            }
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| HttpError::InvalidRequest(format!("{} has no port", spec.url)))?;
        let addr = self.resolver.resolve(&host, port).await?;

        let mut rewritten = url.clone();
        rewritten
            .set_ip_host(addr.ip())
            .map_err(|_| HttpError::InvalidRequest(format!("cannot rewrite host of {}", spec.url)))?;
        let authority = match url.port() {
            Some(explicit) => format!("{host}:{explicit}"),
            None => host.clone(),
        };
        prepared
            .headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("host"));
        prepared.headers.push(("Host".to_string(), authority));
        debug!(host = %host, addr = %addr, "pinned request to resolved address");
        prepared.url = rewritten;
        prepared.pinned = Some((host, addr));
        Ok(prepared)
    }
}
