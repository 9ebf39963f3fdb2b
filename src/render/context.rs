//! Context objects handed to the caller alongside a response.

use std::sync::Arc;

use serde_json::Value;
use tracing::error;

use crate::error::SerializationError;
use crate::pipeline::{PendingCacheUpdate, Pipeline};

use super::types::{HydrationPayload, RenderOutput};

/// What produced a response, and how to serialize it for hydration.
#[derive(Debug)]
pub enum ResponseContext {
    /// Response produced through a construction hook.
    Pipeline(Arc<Pipeline>),
    /// Response produced without a construction hook.
    Direct(DirectContext),
    /// Response served from the cache by a construction hook.
    Cached(CachedContext),
}

impl ResponseContext {
    pub fn to_json(&self) -> Result<String, SerializationError> {
        match self {
            Self::Pipeline(pipeline) => pipeline.to_json(),
            Self::Direct(direct) => direct.to_json(),
            Self::Cached(cached) => Ok(cached.to_json()),
        }
    }

    pub fn pipeline(&self) -> Option<&Arc<Pipeline>> {
        match self {
            Self::Pipeline(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    /// Cache write to schedule after delivering `output`, if this context supports one.
    pub(crate) fn cache_update(&self, output: &RenderOutput) -> Option<PendingCacheUpdate> {
        match self {
            Self::Pipeline(pipeline) => pipeline.pending_cache_update(output.as_markup()?),
            Self::Direct(_) | Self::Cached(_) => None,
        }
    }
}

/// Hydration context for the direct path. Props are never part of its payload.
#[derive(Debug, Clone, Default)]
pub struct DirectContext {
    request_context: Option<Value>,
}

impl DirectContext {
    pub fn new(request_context: Option<Value>) -> Self {
        Self { request_context }
    }

    pub fn to_json(&self) -> Result<String, SerializationError> {
        let payload = HydrationPayload {
            request_context: self.request_context.clone(),
            props: None,
            coordinator_state: None,
        };

        serde_json::to_string(&payload).map_err(|err| {
            error!(error = %err, "cannot serialize direct render context");
            SerializationError::from(err)
        })
    }
}

/// Wraps the context payload stored next to a cached render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedContext {
    payload: String,
}

impl CachedContext {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Returns the stored payload verbatim.
    pub fn to_json(&self) -> String {
        self.payload.clone()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn direct_context_serializes_fixed_shape_without_props() {
        let context = DirectContext::new(Some(json!({ "user": "ana" })));
        let value: Value = serde_json::from_str(&context.to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "requestContext": { "user": "ana" },
                "props": null,
                "coordinatorState": null
            })
        );
    }

    #[test]
    fn cached_context_returns_payload_verbatim() {
        let raw = r#"{"props":{"id":1},  "extra":true}"#;
        let context = ResponseContext::Cached(CachedContext::new(raw));
        assert_eq!(context.to_json().unwrap(), raw);
        assert!(context.pipeline().is_none());
    }

    #[test]
    fn only_pipeline_contexts_schedule_cache_updates() {
        let output = RenderOutput::Markup("<p>x</p>".into());
        assert!(
            ResponseContext::Direct(DirectContext::default())
                .cache_update(&output)
                .is_none()
        );
        assert!(
            ResponseContext::Cached(CachedContext::new("{}"))
                .cache_update(&output)
                .is_none()
        );
    }
}
