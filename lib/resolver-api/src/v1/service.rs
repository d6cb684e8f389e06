use serde::{Deserialize, Serialize};

/// Outcome flag carried by generic responses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    #[default]
    Ok,
    Error,
    NotFound,
}

/// Request of `Ping`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Generic status/message pair returned by `Ping` and `RemoveService`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultResponse {
    pub status: ResultStatus,
    #[serde(default)]
    pub message: String,
}

impl DefaultResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Ok,
            message: message.into(),
        }
    }
}

/// Registration payload for `AddService` and `RemoveService`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceData {
    /// Logical service name, e.g. `mediaserver.Database`
    pub service: String,

    /// Explicit host; when absent the directory uses the caller's peer address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port the service listens on
    pub port: u16,

    /// Domains the service is reachable through (empty = unqualified)
    #[serde(default)]
    pub domains: Vec<String>,

    /// Keep at most one address per qualified name
    #[serde(default)]
    pub single: bool,
}

impl ServiceData {
    /// Address as registered when an explicit host is supplied
    pub fn explicit_address(&self) -> Option<String> {
        self.host
            .as_deref()
            .filter(|h| !h.is_empty())
            .map(|h| format!("{}:{}", h, self.port))
    }
}

/// Response of `AddService`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverDefaultResponse {
    pub response: DefaultResponse,
    /// Seconds until the registrant should renew
    pub next_call_wait: i64,
}

/// Request of `ResolveService` and `ResolveServices`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveRequest {
    /// Qualified service name
    pub name: String,
}

impl ResolveRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Response of `ResolveService`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    pub addr: String,
    pub next_call_wait: i64,
}

/// Response of `ResolveServices`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesResponse {
    #[serde(default)]
    pub addrs: Vec<String>,
    pub next_call_wait: i64,
}
