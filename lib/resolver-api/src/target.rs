//! Resolver target grammar: `miniresolver:<qualified-name>`

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// URI scheme handled by the miniresolver resolver
pub const SCHEME: &str = "miniresolver";

#[allow(clippy::expect_used)] // literal pattern, cannot fail
static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9-]+)\.([a-zA-Z0-9-]+)\.([a-zA-Z0-9-]+)")
        .expect("static regex should not panic")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("unsupported scheme in target '{0}'")]
    UnsupportedScheme(String),

    #[error("empty endpoint in target '{0}'")]
    EmptyEndpoint(String),
}

/// A parsed resolver target
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    endpoint: String,
}

impl Target {
    /// Target for an already qualified service name
    pub fn new(qualified: impl Into<String>) -> Self {
        Self {
            endpoint: qualified.into(),
        }
    }

    /// Target for `service` reached through `domain`
    pub fn for_service(service: &str, domain: &str) -> Self {
        Self::new(qualified_name(domain, service))
    }

    /// The qualified service name being resolved
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Routing domain encoded in the endpoint, if it follows `domain.package.Service`
    pub fn domain(&self) -> Option<&str> {
        domain_of(&self.endpoint)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", SCHEME, self.endpoint)
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let endpoint = s
            .strip_prefix(SCHEME)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| TargetError::UnsupportedScheme(s.to_string()))?;
        let endpoint = endpoint.trim_start_matches('/');
        if endpoint.is_empty() {
            return Err(TargetError::EmptyEndpoint(s.to_string()));
        }
        Ok(Self::new(endpoint))
    }
}

/// First label of a `domain.package.Service` style name
pub fn domain_of(name: &str) -> Option<&str> {
    DOMAIN_REGEX
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Directory lookup key: `domain.service`, or `service` when the domain is empty
pub fn qualified_name(domain: &str, service: &str) -> String {
    if domain.is_empty() {
        service.to_string()
    } else {
        format!("{}.{}", domain, service)
    }
}

/// `<package>.<Service>` from a full method path like `/pkg.Svc/Method`
pub fn service_from_method(full_method: &str) -> Option<&str> {
    let trimmed = full_method.trim_start_matches('/');
    let mut parts = trimmed.splitn(2, '/');
    let service = parts.next()?;
    parts.next()?;
    if service.is_empty() {
        None
    } else {
        Some(service)
    }
}

/// Resolver target serving the service a method belongs to
pub fn target_for_method(full_method: &str) -> Option<Target> {
    service_from_method(full_method).map(Target::new)
}
