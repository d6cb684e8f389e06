//! Interceptor framework wrapping every unary call on both sides of the wire

use crate::metadata::Metadata;
use resolver_api::v1::DOMAIN_METADATA_KEY;
use resolver_api::{domain_of, Code, Status, Target};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, span, warn, Instrument, Level};

/// Call state passed through an interceptor chain
#[derive(Clone, Debug)]
pub struct CallContext {
    /// Client side: the dialed target. Server side: the request authority
    pub target: String,
    /// Full method path, e.g. `/miniresolver.MiniResolver/Ping`
    pub method: String,
    /// Outgoing (client) or incoming (server) metadata
    pub metadata: Metadata,
    /// When the call started
    pub started: Instant,
}

impl CallContext {
    pub fn new(target: impl Into<String>, method: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            metadata,
            started: Instant::now(),
        }
    }

    /// Routing domain stamped on the call, if any
    pub fn domain(&self) -> Option<&str> {
        self.metadata
            .get(DOMAIN_METADATA_KEY)
            .filter(|d| !d.is_empty())
    }
}

/// Hook around a unary call
#[async_trait::async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str {
        "UnnamedInterceptor"
    }

    /// Called before the call is sent or dispatched; an error aborts the call
    async fn on_request(&self, _context: &mut CallContext) -> Result<(), Status> {
        Ok(())
    }

    /// Called once the call completed, with its failure if any
    async fn on_response(&self, _context: &CallContext, _error: Option<&Status>) {}
}

/// Interceptors executed in order on request and in reverse order on response
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn add_arc(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub async fn on_request(&self, context: &mut CallContext) -> Result<(), Status> {
        for interceptor in &self.interceptors {
            let span = span!(Level::DEBUG, "interceptor", name = interceptor.name());
            debug!(parent: &span, "Processing on_request for {}", context.method);
            interceptor.on_request(context).instrument(span).await?;
        }
        Ok(())
    }

    pub async fn on_response(&self, context: &CallContext, error: Option<&Status>) {
        for interceptor in self.interceptors.iter().rev() {
            let span = span!(Level::DEBUG, "interceptor", name = interceptor.name());
            debug!(parent: &span, "Processing on_response for {}", context.method);
            interceptor.on_response(context, error).instrument(span).await;
        }
    }
}

/// Something that can force a fresh resolution of a target
#[async_trait::async_trait]
pub trait RefreshTarget: Send + Sync {
    async fn refresh(&self, target: &str);
}

/// Client interceptor stamping the routing domain on outgoing calls.
///
/// The domain comes from explicit call metadata or, failing that, from the
/// first label of a `miniresolver:domain.pkg.Service` target. Calls failing
/// with `Unavailable` trigger a refresh of the target they were sent to.
#[derive(Clone, Default)]
pub struct ClientDomainInterceptor {
    refresher: Option<Arc<dyn RefreshTarget>>,
}

impl ClientDomainInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_refresher(refresher: Arc<dyn RefreshTarget>) -> Self {
        Self {
            refresher: Some(refresher),
        }
    }
}

#[async_trait::async_trait]
impl Interceptor for ClientDomainInterceptor {
    fn name(&self) -> &'static str {
        "ClientDomainInterceptor"
    }

    async fn on_request(&self, context: &mut CallContext) -> Result<(), Status> {
        if context.domain().is_some() {
            return Ok(());
        }
        let domain = context
            .target
            .parse::<Target>()
            .ok()
            .and_then(|t| t.domain().map(str::to_string));
        if let Some(domain) = domain {
            debug!("Stamping domain {} on call to {}", domain, context.target);
            context.metadata.insert(DOMAIN_METADATA_KEY, domain);
        }
        Ok(())
    }

    async fn on_response(&self, context: &CallContext, error: Option<&Status>) {
        let Some(status) = error else {
            return;
        };
        if status.code() != Code::Unavailable {
            return;
        }
        if let Some(refresher) = &self.refresher {
            warn!("{} unavailable, refreshing {}", context.method, context.target);
            refresher.refresh(&context.target).await;
        }
    }
}

/// Server interceptor filling in the routing domain from the request authority
/// when the caller did not send one.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerDomainInterceptor;

#[async_trait::async_trait]
impl Interceptor for ServerDomainInterceptor {
    fn name(&self) -> &'static str {
        "ServerDomainInterceptor"
    }

    async fn on_request(&self, context: &mut CallContext) -> Result<(), Status> {
        if context.domain().is_some() {
            return Ok(());
        }
        let host = strip_port(&context.target);
        if host.parse::<IpAddr>().is_ok() {
            return Ok(());
        }
        if let Some(domain) = domain_of(host).map(str::to_string) {
            context.metadata.insert(DOMAIN_METADATA_KEY, domain);
        }
        Ok(())
    }
}

/// Logs every completed call with its routing domain and latency
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingInterceptor;

#[async_trait::async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "LoggingInterceptor"
    }

    async fn on_response(&self, context: &CallContext, error: Option<&Status>) {
        let elapsed = context.started.elapsed().as_millis();
        let domain = context.domain().unwrap_or("-");
        match error {
            None => debug!(
                "{} {} domain={} {}ms",
                context.target, context.method, domain, elapsed
            ),
            Some(status) => debug!(
                "{} {} domain={} {}ms failed: {}",
                context.target, context.method, domain, elapsed, status
            ),
        }
    }
}

fn strip_port(authority: &str) -> &str {
    if authority.starts_with('[') {
        return authority;
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRefresher {
        targets: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl RefreshTarget for RecordingRefresher {
        async fn refresh(&self, target: &str) {
            self.targets.lock().unwrap().push(target.to_string());
        }
    }

    struct Reject;

    #[async_trait::async_trait]
    impl Interceptor for Reject {
        async fn on_request(&self, _context: &mut CallContext) -> Result<(), Status> {
            Err(Status::invalid_argument("rejected"))
        }
    }

    fn context(target: &str) -> CallContext {
        CallContext::new(target, "/mediaserver.Database/Get", Metadata::new())
    }

    #[tokio::test]
    async fn test_client_stamps_domain_from_target() {
        let interceptor = ClientDomainInterceptor::new();
        let mut ctx = context("miniresolver:ubbasel.mediaserver.Database");
        interceptor.on_request(&mut ctx).await.unwrap();
        assert_eq!(ctx.domain(), Some("ubbasel"));
    }

    #[tokio::test]
    async fn test_client_keeps_explicit_domain() {
        let interceptor = ClientDomainInterceptor::new();
        let mut ctx = context("miniresolver:ubbasel.mediaserver.Database");
        ctx.metadata.insert(DOMAIN_METADATA_KEY, "other");
        interceptor.on_request(&mut ctx).await.unwrap();
        assert_eq!(ctx.domain(), Some("other"));
    }

    #[tokio::test]
    async fn test_client_leaves_plain_targets_alone() {
        let interceptor = ClientDomainInterceptor::new();
        for target in ["miniresolver:calc", "127.0.0.1:7777"] {
            let mut ctx = context(target);
            interceptor.on_request(&mut ctx).await.unwrap();
            assert_eq!(ctx.domain(), None);
        }
    }

    #[tokio::test]
    async fn test_client_refreshes_only_on_unavailable() {
        let refresher = Arc::new(RecordingRefresher::default());
        let interceptor = ClientDomainInterceptor::with_refresher(refresher.clone());
        let ctx = context("miniresolver:a.pkg.Svc");

        interceptor.on_response(&ctx, None).await;
        interceptor
            .on_response(&ctx, Some(&Status::not_found("gone")))
            .await;
        assert!(refresher.targets.lock().unwrap().is_empty());

        interceptor
            .on_response(&ctx, Some(&Status::unavailable("down")))
            .await;
        assert_eq!(
            *refresher.targets.lock().unwrap(),
            vec!["miniresolver:a.pkg.Svc".to_string()]
        );
    }

    #[tokio::test]
    async fn test_server_derives_domain_from_authority() {
        let interceptor = ServerDomainInterceptor;
        let mut ctx = context("ubbasel.mediaserver.Database:8080");
        interceptor.on_request(&mut ctx).await.unwrap();
        assert_eq!(ctx.domain(), Some("ubbasel"));

        let mut ctx = context("127.0.0.1:8080");
        interceptor.on_request(&mut ctx).await.unwrap();
        assert_eq!(ctx.domain(), None);
    }

    #[tokio::test]
    async fn test_chain_stops_on_rejection() {
        let chain = InterceptorChain::new()
            .add(Reject)
            .add(ClientDomainInterceptor::new());
        assert_eq!(chain.len(), 2);

        let mut ctx = context("miniresolver:a.pkg.Svc");
        let err = chain.on_request(&mut ctx).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        // the domain interceptor never ran
        assert_eq!(ctx.domain(), None);
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("a.b.c:80"), "a.b.c");
        assert_eq!(strip_port("a.b.c"), "a.b.c");
        assert_eq!(strip_port("[::1]:80"), "[::1]:80");
    }
}
