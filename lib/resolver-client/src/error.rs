use resolver_api::{Status, TargetError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("RPC failed: {0}")]
    Rpc(#[from] Status),

    #[error("Invalid target: {0}")]
    Target(#[from] TargetError),

    #[error("No directory client configured")]
    NoDirectory,

    #[error("Cannot find client address for {0}")]
    NoAddress(String),
}
