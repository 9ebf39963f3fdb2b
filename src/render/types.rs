use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConstructionError;
use crate::isolator::Isolator;
use crate::pipeline::Pipeline;
use crate::surface::Surface;
use crate::transport::Transport;

use super::context::ResponseContext;

pub type Props = Map<String, Value>;

/// Render target requested for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderMode {
    /// Markup without hydration attributes.
    #[serde(rename = "static")]
    Static,
    /// Full markup that the presentation side can hydrate.
    #[serde(rename = "markup")]
    Markup,
    /// Mount or update a live presentation surface.
    #[serde(rename = "dom")]
    Live,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Markup => "markup",
            Self::Live => "dom",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "static" => Ok(Self::Static),
            "markup" => Ok(Self::Markup),
            "dom" => Ok(Self::Live),
            other => Err(format!("unknown render mode `{other}`")),
        }
    }
}

/// Serialized state exchanged between the service and presentation sides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationPayload {
    #[serde(default)]
    pub request_context: Option<Value>,
    #[serde(default)]
    pub props: Option<Props>,
    #[serde(default)]
    pub coordinator_state: Option<Map<String, Value>>,
}

/// Per-request options. `RenderOptions::default()` stands in for omitted options.
#[derive(Debug, Default)]
pub struct RenderOptions {
    /// Resolved from the renderer's runtime target when unset.
    pub mode: Option<RenderMode>,
    /// Surface to mount onto in `dom` mode.
    pub target: Option<Arc<Surface>>,
    /// Serialized state received from the other side.
    pub context: Option<HydrationPayload>,
    pub props: Option<Props>,
    pub http: Arc<Transport>,
    pub isolated_config: Option<Value>,
    pub request_context: Option<Value>,
    pub locales: Vec<String>,
    /// Unmount whatever the target currently shows before mounting.
    pub unmount_before_mount: bool,
}

/// Output of a successful render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutput {
    Markup(String),
    Mounted { surface_id: String },
}

impl RenderOutput {
    pub fn as_markup(&self) -> Option<&str> {
        match self {
            Self::Markup(markup) => Some(markup.as_str()),
            Self::Mounted { .. } => None,
        }
    }

    pub fn into_markup(self) -> Option<String> {
        match self {
            Self::Markup(markup) => Some(markup),
            Self::Mounted { .. } => None,
        }
    }
}

/// Successful delivery. `body` is `None` when the pipeline decided not to render.
#[derive(Debug)]
pub struct Response {
    pub body: Option<RenderOutput>,
    pub context: ResponseContext,
}

pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    /// Pre-render hook. Components without one take the direct path.
    fn construction(&self) -> Option<&dyn Construction> {
        None
    }
}

/// Asynchronous pre-render phase run with the request's pipeline as receiver.
#[async_trait]
pub trait Construction: Send + Sync {
    async fn construct(
        &self,
        pipeline: Arc<Pipeline>,
        initial: Value,
    ) -> Result<(), ConstructionError>;
}

/// Context made available to the whole tree during a render.
#[derive(Debug, Clone)]
pub struct RenderScope {
    pub root_isolator: Arc<Isolator>,
    pub request_context: Option<Value>,
    pub locales: Vec<String>,
}

impl RenderScope {
    pub fn new(
        isolated_config: Option<Value>,
        request_context: Option<Value>,
        locales: Vec<String>,
    ) -> Self {
        Self {
            root_isolator: Isolator::root(isolated_config),
            request_context,
            locales,
        }
    }
}

/// A component bound to its props and render scope, ready for the engine.
pub struct Element {
    pub component: Arc<dyn Component>,
    pub props: Option<Props>,
    pub scope: RenderScope,
}

impl Element {
    pub fn new(component: Arc<dyn Component>, props: Option<Props>, scope: RenderScope) -> Self {
        Self {
            component,
            props,
            scope,
        }
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn render_mode_uses_wire_names() {
        assert_eq!(serde_json::to_value(RenderMode::Live).unwrap(), json!("dom"));
        assert_eq!(
            serde_json::from_value::<RenderMode>(json!("static")).unwrap(),
            RenderMode::Static
        );
        assert_eq!("markup".parse::<RenderMode>(), Ok(RenderMode::Markup));
        assert!("html".parse::<RenderMode>().is_err());
    }

    #[test]
    fn hydration_payload_accepts_partial_input() {
        let payload: HydrationPayload =
            serde_json::from_value(json!({ "props": { "id": 3 } })).unwrap();
        assert_eq!(payload.props.unwrap()["id"], json!(3));
        assert!(payload.request_context.is_none());
        assert!(payload.coordinator_state.is_none());
    }

    #[test]
    fn render_scope_wraps_config_in_fresh_root() {
        let scope = RenderScope::new(Some(json!({ "flag": true })), None, vec!["fr".into()]);
        assert!(scope.root_isolator.parent().is_none());
        assert_eq!(
            scope.root_isolator.isolated_config(),
            Some(&json!({ "flag": true }))
        );
    }
}
