//! The agent's view of the network.

use std::future::Future;
use std::time::Duration;

use majic_core::{AgentConfig, NetworkError, ReqwestErrorExt};
use reqwest::Method;

use crate::store::content_hash;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// An intercepted request from a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub method: Method,
    /// Path and query, relative to the app origin.
    pub path: String,
}

impl AgentRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Key the response is stored under.
    pub fn cache_key(&self) -> &str {
        &self.path
    }
}

/// Whatever the network answered, success or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl NetworkResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.body)
    }
}

/// Transport used by the agent. Failing to get any answer is an error; an
/// answer with a non-2xx status is not.
pub trait Network: Send + Sync + 'static {
    fn fetch(
        &self,
        request: &AgentRequest,
    ) -> impl Future<Output = Result<NetworkResponse, NetworkError>> + Send;
}

/// Real network access against the app origin.
pub struct HttpNetwork {
    client: reqwest::Client,
    origin: String,
}

impl HttpNetwork {
    pub fn new(origin: &str) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NetworkError::ConnectionFailed(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            origin: origin.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, NetworkError> {
        Self::new(&config.origin)
    }

    pub fn url_for(&self, request: &AgentRequest) -> String {
        format!("{}{}", self.origin, request.path)
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &AgentRequest) -> Result<NetworkResponse, NetworkError> {
        let url = self.url_for(request);
        tracing::debug!(method = %request.method, %url, "Agent network request");

        let response = self
            .client
            .request(request.method.clone(), &url)
            .send()
            .await
            .map_err(|e| e.into_network_error())?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| e.into_network_error())?
            .to_vec();

        Ok(NetworkResponse {
            status,
            content_type,
            body,
        })
    }
}
