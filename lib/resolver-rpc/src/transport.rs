//! Unary call transport over pooled HTTP/1.1 connections

use crate::codec::{self, CONTENT_TYPE};
use crate::metadata::Metadata;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use resolver_api::v1::STATUS_HEADER;
use resolver_api::{Code, Status};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout as tokio_timeout;
use tracing::debug;

/// Default deadline for a single call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Client side of the RPC protocol with connection pooling and a per-call deadline.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct RpcTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl RpcTransport {
    pub fn new(timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        connector.set_keepalive(Some(Duration::from_secs(30)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build::<_, Full<Bytes>>(connector);

        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send raw bytes to `method` on `address` and return the raw reply.
    ///
    /// Transport failures map to `Unavailable`, an expired deadline to
    /// `DeadlineExceeded`.
    pub async fn unary(
        &self,
        address: &str,
        method: &str,
        metadata: &Metadata,
        body: Bytes,
    ) -> Result<Bytes, Status> {
        let uri: Uri = format!("http://{}{}", address, method)
            .parse()
            .map_err(|e| Status::invalid_argument(format!("invalid address '{}': {}", address, e)))?;

        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Full::new(body))
            .map_err(|e| Status::internal(format!("cannot build request: {}", e)))?;
        metadata.write_headers(request.headers_mut());
        request
            .headers_mut()
            .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(CONTENT_TYPE));

        debug!("Calling {} on {} with {}s deadline", method, address, self.timeout.as_secs());

        let response = match tokio_timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Err(Status::unavailable(format!(
                    "cannot reach {}: {}",
                    address, e
                )))
            }
            Err(_) => {
                return Err(Status::deadline_exceeded(format!(
                    "{} on {} timed out after {}s",
                    method,
                    address,
                    self.timeout.as_secs()
                )))
            }
        };

        let code = response
            .headers()
            .get(STATUS_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i32>().ok())
            .map(Code::from_i32)
            .unwrap_or_else(|| Code::from_http_status(response.status().as_u16()));

        let body = match tokio_timeout(self.timeout, response.into_body().collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                return Err(Status::unavailable(format!(
                    "cannot read reply from {}: {}",
                    address, e
                )))
            }
            Err(_) => {
                return Err(Status::deadline_exceeded(format!(
                    "reading reply from {} timed out",
                    address
                )))
            }
        };

        if code == Code::Ok {
            Ok(body)
        } else {
            Err(Status::new(code, String::from_utf8_lossy(&body).trim().to_string()))
        }
    }

    /// Typed unary call with JSON messages
    pub async fn call<Req, Resp>(
        &self,
        address: &str,
        method: &str,
        metadata: &Metadata,
        request: &Req,
    ) -> Result<Resp, Status>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = codec::encode(request)?;
        let reply = self.unary(address, method, metadata, body).await?;
        codec::decode_response(&reply)
    }
}

impl Default for RpcTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_TIMEOUT)
    }
}
