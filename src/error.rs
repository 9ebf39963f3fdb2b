use std::error::Error as StdError;

use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by a render request.
///
/// `Argument` is returned synchronously from the dispatcher; every other
/// variant reaches the caller through the response callback.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("the {0} is required")]
    Argument(&'static str),
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl RenderError {
    pub fn is_argument(&self) -> bool {
        matches!(self, Self::Argument(_))
    }
}

/// Failure reported by a component's construction hook.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConstructionError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ConstructionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure raised by the external rendering engine while producing markup
/// or mounting onto a surface.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("render engine failed: {message}")]
    Failed { message: String },
    #[error("live surface rendering is unavailable on the service runtime")]
    SurfaceUnavailable,
}

impl EngineError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("cannot serialize render context: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CacheUpdateError {
    #[error("cache write failed: {message}")]
    Write { message: String },
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl CacheUpdateError {
    pub fn write(message: impl std::fmt::Display) -> Self {
        Self::Write {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}
