//! Transports: the servlet fronting a bus, and client conduits.

use crate::bus::Bus;
use crate::error::ClientError;
use async_trait::async_trait;
use http::{Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Prefix of addresses served by the in-process transport.
pub const LOCAL_TRANSPORT_PREFIX: &str = "local:";

/// Timeouts applied by a client conduit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpClientPolicy {
    pub connect_timeout: Duration,
    pub receive_timeout: Duration,
}

impl Default for HttpClientPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
            receive_timeout: Duration::from_millis(2000),
        }
    }
}

/// Sends a request to a remote endpoint.
#[async_trait]
pub trait Conduit: Send + Sync {
    async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, ClientError>;
}

/// HTTP conduit backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpConduit {
    client: reqwest::Client,
}

impl HttpConduit {
    pub fn new(policy: &HttpClientPolicy) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(policy.connect_timeout)
            .timeout(policy.receive_timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Conduit for HttpConduit {
    async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, ClientError> {
        let (parts, body) = request.into_parts();
        let response = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?;

        let mut result = Response::new(body.to_vec());
        *result.status_mut() = status;
        *result.headers_mut() = headers;
        Ok(result)
    }
}

fn transport_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout(err.to_string())
    } else {
        ClientError::Transport(err.to_string())
    }
}

/// In-process conduit dispatching straight into a bus.
#[derive(Debug, Clone)]
pub struct LocalConduit {
    bus: Arc<Bus>,
    address: String,
    receive_timeout: Duration,
}

impl LocalConduit {
    pub fn new(bus: Arc<Bus>, address: impl Into<String>, policy: &HttpClientPolicy) -> Self {
        Self {
            bus,
            address: address.into(),
            receive_timeout: policy.receive_timeout,
        }
    }
}

#[async_trait]
impl Conduit for LocalConduit {
    async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, ClientError> {
        let bus = self.bus.clone();
        let address = self.address.clone();
        let dispatch = tokio::task::spawn_blocking(move || bus.dispatch(&address, request));

        match tokio::time::timeout(self.receive_timeout, dispatch).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(join)) => Err(ClientError::Transport(join.to_string())),
            Err(_) => Err(ClientError::Timeout(format!(
                "no response from {} within {:?}",
                self.address, self.receive_timeout
            ))),
        }
    }
}

/// Serves the endpoints of a bus under a servlet path.
#[derive(Debug, Clone)]
pub struct SoapServlet {
    bus: Arc<Bus>,
    root: String,
}

impl SoapServlet {
    /// `root` is the servlet path without the trailing `/*`.
    pub fn new(bus: Arc<Bus>, root: impl Into<String>) -> Self {
        Self {
            bus,
            root: root.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Endpoint address for a request path, if the path is under the root.
    pub fn address_for(&self, path: &str) -> Option<String> {
        let relative = path.strip_prefix(&self.root)?;
        if !relative.is_empty() && !relative.starts_with('/') {
            return None;
        }
        Some(if relative.is_empty() { "/".to_string() } else { relative.to_string() })
    }

    pub async fn service(&self, request: Request<Vec<u8>>) -> Response<Vec<u8>> {
        let Some(address) = self.address_for(request.uri().path()) else {
            debug!(path = %request.uri().path(), root = %self.root, "Request outside servlet root");
            return status_response(StatusCode::NOT_FOUND);
        };

        let bus = self.bus.clone();
        match tokio::task::spawn_blocking(move || bus.dispatch(&address, request)).await {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, "Dispatch task failed");
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn status_response(status: StatusCode) -> Response<Vec<u8>> {
    let mut response = Response::new(Vec::new());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = HttpClientPolicy::default();
        assert_eq!(policy.connect_timeout, Duration::from_millis(500));
        assert_eq!(policy.receive_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_servlet_addresses() {
        let servlet = SoapServlet::new(Arc::new(Bus::new()), "/soap");
        assert_eq!(servlet.address_for("/soap/hello").as_deref(), Some("/hello"));
        assert_eq!(servlet.address_for("/soap").as_deref(), Some("/"));
        assert_eq!(servlet.address_for("/soapy"), None);
        assert_eq!(servlet.address_for("/other/hello"), None);
    }

    #[tokio::test]
    async fn test_servlet_not_found_outside_root() {
        let servlet = SoapServlet::new(Arc::new(Bus::new()), "/soap/");
        let request = Request::post("/elsewhere").body(Vec::new()).unwrap();
        assert_eq!(servlet.service(request).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_local_conduit_reaches_bus() {
        let conduit = LocalConduit::new(Arc::new(Bus::new()), "local://missing", &HttpClientPolicy::default());
        let request = Request::post("local://missing").body(Vec::new()).unwrap();
        let response = conduit.send(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
