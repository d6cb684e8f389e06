//! RPC server: routes `POST /<package.Service>/<Method>` to registered services

use crate::codec::{self, CONTENT_TYPE};
use crate::error::{Result, RpcError};
use crate::interceptor::{CallContext, InterceptorChain};
use crate::metadata::Metadata;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use resolver_api::v1::STATUS_HEADER;
use resolver_api::{Code, Status};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// An inbound unary call as seen by a service
#[derive(Clone, Debug)]
pub struct RpcRequest {
    pub metadata: Metadata,
    /// Remote socket address of the caller, as `ip:port`
    pub peer: Option<String>,
    pub body: Bytes,
}

impl RpcRequest {
    pub fn new(body: Bytes) -> Self {
        Self {
            metadata: Metadata::new(),
            peer: None,
            body,
        }
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    pub fn decode<T: DeserializeOwned>(&self) -> std::result::Result<T, Status> {
        codec::decode_request(&self.body)
    }
}

/// A named service answering unary calls
#[async_trait::async_trait]
pub trait RpcService: Send + Sync {
    /// Fully qualified service name, e.g. `miniresolver.MiniResolver`
    fn name(&self) -> &str;

    /// Handle `method` (the bare method name) and return the encoded reply
    async fn call(&self, method: &str, request: RpcRequest) -> std::result::Result<Bytes, Status>;
}

/// HTTP/1.1 server hosting one or more [`RpcService`]s
#[derive(Default)]
pub struct RpcServer {
    services: HashMap<String, Arc<dyn RpcService>>,
    interceptors: InterceptorChain,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service<S: RpcService + 'static>(self, service: S) -> Result<Self> {
        self.add_arc_service(Arc::new(service))
    }

    pub fn add_arc_service(mut self, service: Arc<dyn RpcService>) -> Result<Self> {
        let name = service.name().to_string();
        if self.services.contains_key(&name) {
            return Err(RpcError::DuplicateService(name));
        }
        self.services.insert(name, service);
        Ok(self)
    }

    pub fn with_interceptors(mut self, interceptors: InterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Names of the hosted services, sorted
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Bind `addr` and serve until `shutdown` is cancelled
    pub async fn serve_on(self, addr: &str, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(addr).await.map_err(|source| RpcError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from `listener` until `shutdown` is cancelled.
    ///
    /// Open connections are shut down gracefully once the token fires.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(
            "RPC server listening on {} serving {:?}",
            local_addr,
            self.service_names()
        );
        let server = Arc::new(self);

        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Error accepting connection: {}", e);
                        continue;
                    }
                },
            };
            debug!("Accepted connection from {}", peer);

            let server = server.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.handle(req, peer).await) }
                });

                let conn = http1::Builder::new().serve_connection(io, service);
                tokio::pin!(conn);
                let result = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        conn.as_mut().await
                    }
                    result = conn.as_mut() => result,
                };
                if let Err(e) = result {
                    debug!("Connection from {} closed with error: {}", peer, e);
                }
            });
        }

        info!("RPC server on {} stopped", local_addr);
        Ok(())
    }

    async fn handle(&self, req: Request<Incoming>, peer: SocketAddr) -> Response<Full<Bytes>> {
        let method = req.uri().path().to_string();
        let authority = req
            .uri()
            .authority()
            .map(|a| a.to_string())
            .or_else(|| {
                req.headers()
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        let mut context = CallContext::new(authority, method, Metadata::from_headers(req.headers()));
        let result = match self.interceptors.on_request(&mut context).await {
            Ok(()) => self.dispatch(req, &context, peer).await,
            Err(status) => Err(status),
        };
        self.interceptors
            .on_response(&context, result.as_ref().err())
            .await;

        match result {
            Ok(body) => reply(Code::Ok, body),
            Err(status) => reply(status.code(), Bytes::from(status.message().to_string())),
        }
    }

    async fn dispatch(
        &self,
        req: Request<Incoming>,
        context: &CallContext,
        peer: SocketAddr,
    ) -> std::result::Result<Bytes, Status> {
        if req.method() != Method::POST {
            return Err(Status::unimplemented(format!(
                "method {} not supported",
                req.method()
            )));
        }
        let (service_name, method_name) = split_method(&context.method)
            .ok_or_else(|| Status::unimplemented(format!("malformed method '{}'", context.method)))?;
        let service = self
            .services
            .get(service_name)
            .ok_or_else(|| Status::unimplemented(format!("unknown service {}", service_name)))?;

        let body = req
            .into_body()
            .collect()
            .await
            .map_err(|e| Status::cancelled(format!("cannot read request: {}", e)))?
            .to_bytes();

        let request = RpcRequest {
            metadata: context.metadata.clone(),
            peer: Some(peer.to_string()),
            body,
        };
        service.call(method_name, request).await
    }
}

/// Split `/package.Service/Method` into its two halves
fn split_method(path: &str) -> Option<(&str, &str)> {
    let (service, method) = path.strip_prefix('/')?.split_once('/')?;
    if service.is_empty() || method.is_empty() || method.contains('/') {
        return None;
    }
    Some((service, method))
}

fn reply(code: Code, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() =
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let content_type = if code == Code::Ok {
        HeaderValue::from_static(CONTENT_TYPE)
    } else {
        HeaderValue::from_static("text/plain; charset=utf-8")
    };
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(STATUS_HEADER, HeaderValue::from(code.as_i32()));
    response
}
