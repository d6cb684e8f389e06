use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid service name: {0:?}")]
    InvalidService(String),

    #[error("Invalid address for service {service}: {address:?}")]
    InvalidAddress { service: String, address: String },
}
