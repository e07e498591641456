//! Recommender error types
//!
//! Every failure the engine can surface carries an [`ErrorCategory`] so callers
//! can tell a fatal request failure (vector store down, deadline elapsed) apart
//! from per-resource failures that the scan pipeline absorbs.

use crate::types::ResourceTypeRef;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Error category for structured logging and behavior mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration file or values are invalid
    ConfigError,
    /// Cluster schema service could not return a schema
    SchemaUnavailable,
    /// AI completion call failed or timed out
    AiInferenceFailed,
    /// AI completion returned something that does not fit the response schema
    AiResponseInvalid,
    /// Capability vector store is unreachable or rejected the call
    VectorStoreUnavailable,
    /// Embedding model failed to produce a vector
    EmbeddingError,
    /// Dependency edge storage failed
    RelationshipStoreError,
    /// Caller-supplied deadline elapsed
    Timeout,
    /// Caller cancelled the request
    Cancelled,
    /// Unexpected logic bugs
    InternalError,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigError => "CONFIG_ERROR",
            Self::SchemaUnavailable => "SCHEMA_UNAVAILABLE",
            Self::AiInferenceFailed => "AI_INFERENCE_FAILED",
            Self::AiResponseInvalid => "AI_RESPONSE_INVALID",
            Self::VectorStoreUnavailable => "VECTOR_STORE_UNAVAILABLE",
            Self::EmbeddingError => "EMBEDDING_ERROR",
            Self::RelationshipStoreError => "RELATIONSHIP_STORE_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether a `recommend` call must fail outright on this error
    pub fn is_fatal_for_recommend(&self) -> bool {
        !self.degrades_gracefully() && !matches!(self, Self::SchemaUnavailable)
    }

    /// Whether inference continues on deterministic signals after this error
    pub fn degrades_gracefully(&self) -> bool {
        matches!(self, Self::AiInferenceFailed | Self::AiResponseInvalid)
    }

    /// Whether the caller may reasonably retry with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::VectorStoreUnavailable | Self::SchemaUnavailable
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommender error with category and context
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("schema unavailable for {resource}: {message}")]
    SchemaUnavailable {
        resource: String,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("AI inference failed: {message}")]
    AiInferenceFailed {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("AI response invalid: {message}")]
    AiResponseInvalid {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("vector store unavailable: {message}")]
    VectorStoreUnavailable {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("embedding error: {message}")]
    Embedding {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("relationship store error: {message}")]
    RelationshipStore {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("deadline elapsed: {message}")]
    Timeout { message: String },

    #[error("request cancelled: {message}")]
    Cancelled { message: String },

    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl RecommendError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::ConfigError,
            Self::SchemaUnavailable { .. } => ErrorCategory::SchemaUnavailable,
            Self::AiInferenceFailed { .. } => ErrorCategory::AiInferenceFailed,
            Self::AiResponseInvalid { .. } => ErrorCategory::AiResponseInvalid,
            Self::VectorStoreUnavailable { .. } => ErrorCategory::VectorStoreUnavailable,
            Self::Embedding { .. } => ErrorCategory::EmbeddingError,
            Self::RelationshipStore { .. } => ErrorCategory::RelationshipStoreError,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::Internal { .. } => ErrorCategory::InternalError,
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a schema-unavailable error for one resource type
    pub fn schema_unavailable(resource: &ResourceTypeRef, message: impl Into<String>) -> Self {
        Self::SchemaUnavailable {
            resource: resource.to_string(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an AI inference error
    pub fn ai_failed(message: impl Into<String>) -> Self {
        Self::AiInferenceFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an AI response validation error
    pub fn ai_invalid(message: impl Into<String>) -> Self {
        Self::AiResponseInvalid {
            message: message.into(),
            source: None,
        }
    }

    /// Create an AI response validation error with source
    pub fn ai_invalid_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::AiResponseInvalid {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a vector store error
    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::VectorStoreUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create a vector store error with source
    pub fn vector_store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::VectorStoreUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            source: None,
        }
    }

    /// Create a relationship store error
    pub fn relationship_store(message: impl Into<String>) -> Self {
        Self::RelationshipStore {
            message: message.into(),
            source: None,
        }
    }

    /// Create a relationship store error with source
    pub fn relationship_store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::RelationshipStore {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }
}

impl From<kindscout_async_utils::Interrupted> for RecommendError {
    fn from(value: kindscout_async_utils::Interrupted) -> Self {
        match value {
            kindscout_async_utils::Interrupted::DeadlineElapsed => {
                Self::timeout("request did not finish before its deadline")
            }
            kindscout_async_utils::Interrupted::Cancelled => {
                Self::cancelled("request cancelled by caller")
            }
        }
    }
}

impl Clone for RecommendError {
    fn clone(&self) -> Self {
        match self {
            Self::Config { message, .. } => Self::config(message.clone()),
            Self::SchemaUnavailable {
                resource, message, ..
            } => Self::SchemaUnavailable {
                resource: resource.clone(),
                message: message.clone(),
                source: None,
            },
            Self::AiInferenceFailed { message, .. } => Self::ai_failed(message.clone()),
            Self::AiResponseInvalid { message, .. } => Self::ai_invalid(message.clone()),
            Self::VectorStoreUnavailable { message, .. } => Self::vector_store(message.clone()),
            Self::Embedding { message, .. } => Self::embedding(message.clone()),
            Self::RelationshipStore { message, .. } => Self::relationship_store(message.clone()),
            Self::Timeout { message } => Self::timeout(message.clone()),
            Self::Cancelled { message } => Self::cancelled(message.clone()),
            Self::Internal { message, .. } => Self::internal(message.clone()),
        }
    }
}

/// Result type for recommender operations
pub type Result<T> = std::result::Result<T, RecommendError>;
