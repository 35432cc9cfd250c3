//! Boundary to the server that owns instance records.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ActionReply, InstanceRequest, StatusReport};

pub mod http;

pub use http::{HttpBackend, HttpBackendConfig};

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum BackendError {
    /// No response was obtained at all.
    #[error("transport failure: {0}")]
    Transport(String),
    /// A response arrived but was marked unsuccessful.
    #[error("request rejected (status {status:?}): {}", message.as_deref().unwrap_or("no message"))]
    Rejected {
        status: Option<u16>,
        message: Option<String>,
    },
    #[error("unreadable response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// The text a user should see, preferring whatever the backend said.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            BackendError::Rejected {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            _ => fallback.to_string(),
        }
    }
}

#[async_trait]
pub trait InstanceBackend: Send + Sync {
    /// Read every instance record the backend is willing to show this user.
    async fn fetch_status(&self) -> Result<StatusReport, BackendError>;

    /// Start or stop the instance described by `request`.
    async fn request_instance(&self, request: &InstanceRequest)
    -> Result<ActionReply, BackendError>;
}
