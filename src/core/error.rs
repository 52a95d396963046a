// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wisdom Core Error Types
//!
//! Error handling for graph construction and runtime event processing.
//!
//! Validation errors are returned while an application graph is being built
//! and prevent it from starting. Runtime errors raised while processing an
//! event are routed through [`handler::ExceptionHandler`] and never reach
//! the producer.

pub mod handler;

use thiserror::Error;

/// Result type for Wisdom operations
pub type WisdomResult<T> = Result<T, WisdomError>;

/// Wisdom error types
#[derive(Error, Debug)]
pub enum WisdomError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Missing required property: {property}")]
    MissingProperty { property: String },

    #[error("Invalid property '{property}': {message}")]
    InvalidProperty { message: String, property: String },

    #[error("Stream '{stream_id}' is not defined")]
    StreamNotFound { stream_id: String },

    #[error("Extension '{extension_type}:{namespace}' was not imported")]
    ExtensionNotFound {
        extension_type: String,
        namespace: String,
    },

    #[error("Initialization failed: {message}")]
    Initialization {
        message: String,
        component: Option<String>,
    },

    #[error("Runtime error: {message}")]
    Runtime {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Discriminant of [`WisdomError`], used to key exception listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    MissingProperty,
    InvalidProperty,
    StreamNotFound,
    ExtensionNotFound,
    Initialization,
    Runtime,
    Io,
    Other,
}

impl WisdomError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific field
    pub fn validation_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a missing property error
    pub fn missing_property(property: impl Into<String>) -> Self {
        Self::MissingProperty {
            property: property.into(),
        }
    }

    /// Create an invalid property error
    pub fn invalid_property(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidProperty {
            message: message.into(),
            property: property.into(),
        }
    }

    /// Create a stream not found error
    pub fn stream_not_found(stream_id: impl Into<String>) -> Self {
        Self::StreamNotFound {
            stream_id: stream_id.into(),
        }
    }

    /// Create an extension not found error
    pub fn extension_not_found(
        extension_type: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::ExtensionNotFound {
            extension_type: extension_type.into(),
            namespace: namespace.into(),
        }
    }

    /// Create an initialization error
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization {
            message: message.into(),
            component: None,
        }
    }

    /// Create an initialization error naming the failing component
    pub fn initialization_with_component(
        message: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self::Initialization {
            message: message.into(),
            component: Some(component.into()),
        }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            source: None,
        }
    }

    /// Create a runtime error wrapping its cause
    pub fn runtime_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Runtime {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a generic error from a string
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::MissingProperty { .. } => ErrorKind::MissingProperty,
            Self::InvalidProperty { .. } => ErrorKind::InvalidProperty,
            Self::StreamNotFound { .. } => ErrorKind::StreamNotFound,
            Self::ExtensionNotFound { .. } => ErrorKind::ExtensionNotFound,
            Self::Initialization { .. } => ErrorKind::Initialization,
            Self::Runtime { .. } => ErrorKind::Runtime,
            Self::IoError(_) => ErrorKind::Io,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether the error is raised while building an application graph
    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation
                | ErrorKind::MissingProperty
                | ErrorKind::InvalidProperty
                | ErrorKind::StreamNotFound
                | ErrorKind::ExtensionNotFound
        )
    }
}
