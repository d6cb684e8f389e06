//! JSON message encoding

use hyper::body::Bytes;
use resolver_api::Status;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const CONTENT_TYPE: &str = "application/json";

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes, Status> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| Status::internal(format!("cannot encode message: {}", e)))
}

/// Decode an inbound request; malformed input is the caller's fault
pub fn decode_request<T: DeserializeOwned>(body: &[u8]) -> Result<T, Status> {
    serde_json::from_slice(body)
        .map_err(|e| Status::invalid_argument(format!("cannot decode request: {}", e)))
}

/// Decode a response; malformed input means the peer is broken
pub fn decode_response<T: DeserializeOwned>(body: &[u8]) -> Result<T, Status> {
    serde_json::from_slice(body)
        .map_err(|e| Status::internal(format!("cannot decode response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use resolver_api::{Code, ResolveRequest};

    #[test]
    fn test_decode_errors_carry_the_right_code() {
        let err = decode_request::<ResolveRequest>(b"not json").unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let err = decode_response::<ResolveRequest>(b"{}").unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }

    #[test]
    fn test_encode_request() {
        let bytes = encode(&ResolveRequest::new("calc")).unwrap();
        assert_eq!(&bytes[..], br#"{"name":"calc"}"#);
    }
}
