use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, HOST};
use reqwest::Method;
use url::Url;

use super::error::{HttpError, HttpResult};
use super::retry::parse_retry_after;

#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    /// Target URL; carries the literal address when `pinned` is set.
    pub url: Url,
    /// Original hostname and the address it was resolved to.
    pub pinned: Option<(String, SocketAddr)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> HttpResult<serde_json::Value> {
        serde_json::from_str(&self.body).map_err(|err| HttpError::Decode(err.to_string()))
    }

    pub fn into_status_error(self) -> HttpError {
        let retry_after = self
            .headers
            .get("retry-after")
            .and_then(|value| parse_retry_after(value));
        HttpError::Status {
            status: self.status,
            retry_after,
            body: self.body,
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> HttpResult<HttpResponse>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(default_timeout: Duration) -> HttpResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(default_timeout)
            .build()
            .map_err(HttpError::from_reqwest)?;
        Ok(Self {
            client,
            default_timeout,
        })
    }

    /// TLS needs the hostname for SNI and certificate checks, so https targets
    /// keep their original URL and the resolved address is pinned in a
    /// dedicated client instead.
    fn client_for(&self, request: &PreparedRequest) -> HttpResult<(reqwest::Client, Url)> {
        match &request.pinned {
            Some((host, addr)) if request.url.scheme() == "https" => {
                let client = reqwest::Client::builder()
                    .timeout(self.default_timeout)
                    .resolve(host, *addr)
                    .build()
                    .map_err(HttpError::from_reqwest)?;
                let mut url = request.url.clone();
                url.set_host(Some(host))
                    .map_err(|err| HttpError::InvalidRequest(err.to_string()))?;
                Ok((client, url))
            }
            _ => Ok((self.client.clone(), request.url.clone())),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> HttpResult<HttpResponse> {
        let (client, url) = self.client_for(&request)?;
        let pinned_https = request.pinned.is_some() && url.scheme() == "https";

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            if pinned_https && name.eq_ignore_ascii_case(HOST.as_str()) {
                continue;
            }
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| HttpError::InvalidRequest(err.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| HttpError::InvalidRequest(err.to_string()))?;
            headers.insert(name, value);
        }

        let mut builder = client.request(request.method.clone(), url).headers(headers);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(HttpError::from_reqwest)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_lowercase(), value.to_string()))
            })
            .collect::<HashMap<_, _>>();
        let body = response.text().await.map_err(HttpError::from_reqwest)?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
