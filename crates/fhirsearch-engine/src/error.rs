use fhirsearch_backend::BackendError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid value '{value}' for parameter {name}: {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SearchError {
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
