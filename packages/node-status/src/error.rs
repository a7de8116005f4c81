//! Error types for the node status facade
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeStatusError {
    #[error("Node unavailable: {0}")]
    Unavailable(String),
}

impl NodeStatusError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, NodeStatusError>;
