//! Echo service: answers with the message and the domain it was routed through

use hyper::body::Bytes;
use resolver_api::v1::DOMAIN_METADATA_KEY;
use resolver_api::Status;
use resolver_rpc::codec::encode;
use resolver_rpc::{RpcRequest, RpcService};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const SERVICE_NAME: &str = "mrecho.Echo";
pub const SAY: &str = "/mrecho.Echo/Say";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoRequest {
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoReply {
    pub message: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub served_by: String,
}

/// Echo service instance, tagged with the listen address that serves it
pub struct Echo {
    served_by: String,
}

impl Echo {
    pub fn new(served_by: impl Into<String>) -> Self {
        Self {
            served_by: served_by.into(),
        }
    }

    pub fn say(&self, request: EchoRequest, domain: Option<&str>) -> EchoReply {
        EchoReply {
            message: request.message,
            domain: domain.unwrap_or_default().to_string(),
            served_by: self.served_by.clone(),
        }
    }
}

#[async_trait::async_trait]
impl RpcService for Echo {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn call(&self, method: &str, request: RpcRequest) -> Result<Bytes, Status> {
        match method {
            "Say" => {
                let domain = request.metadata.get(DOMAIN_METADATA_KEY);
                let reply = self.say(request.decode()?, domain);
                info!("Echoing '{}' for domain '{}'", reply.message, reply.domain);
                encode(&reply)
            }
            other => Err(Status::unimplemented(format!(
                "unknown method {}/{}",
                SERVICE_NAME, other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resolver_api::Code;
    use resolver_rpc::codec::decode_response;

    #[tokio::test]
    async fn test_say_echoes_domain() {
        let mut request = RpcRequest::new(Bytes::from_static(br#"{"message":"hi"}"#));
        request.metadata.insert(DOMAIN_METADATA_KEY, "ubbasel");

        let reply = Echo::new("10.0.0.1:9000").call("Say", request).await.unwrap();
        let reply: EchoReply = decode_response(&reply).unwrap();
        assert_eq!(
            reply,
            EchoReply {
                message: "hi".to_string(),
                domain: "ubbasel".to_string(),
                served_by: "10.0.0.1:9000".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let err = Echo::new("x")
            .call("Shout", RpcRequest::new(Bytes::new()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }

    #[test]
    fn test_reply_tolerates_missing_fields() {
        let reply: EchoReply = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(reply.domain.is_empty());
    }
}
