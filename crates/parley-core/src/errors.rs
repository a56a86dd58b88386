use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParleyError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("room error: {0}")]
    Room(String),
    #[error("identity must not be empty")]
    InvalidIdentity,
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("attachment error: {0}")]
    Attachment(String),
    #[error("settings error: {0}")]
    Settings(String),
}
