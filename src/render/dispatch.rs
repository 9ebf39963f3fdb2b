//! Request dispatcher: validates a render call and drives it down either the
//! pipeline path (component has a construction hook) or the direct path.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::{Instrument, debug, info_span, warn};

use crate::config::{RuntimeSettings, RuntimeTarget};
use crate::error::RenderError;
use crate::instrument::{Instrumentation, Timer};
use crate::pipeline::{CacheHit, CacheHitFn, CacheWriter, Pipeline};
use crate::responder::{RenderCallback, Responder};
use crate::surface::Document;
use crate::transport::Transport;

use super::context::{CachedContext, DirectContext, ResponseContext};
use super::engine::RenderEngine;
use super::types::{
    Component, Construction, Element, Props, RenderMode, RenderOptions, RenderOutput, RenderScope,
    Response,
};

pub(crate) const EVENT_COUNT: &str = "count";
pub(crate) const EVENT_CACHE_HIT: &str = "cacheHit";
pub(crate) const EVENT_CONSTRUCTION_ERROR: &str = "err";
pub(crate) const EVENT_ABORT: &str = "abort";
pub(crate) const EVENT_CACHE_ABORT: &str = "cacheAbort";

/// Renders components for one runtime target.
///
/// The engine, instrumentation client, and cache writer are injected; nothing
/// here reads process-global state.
pub struct Renderer {
    pub(super) engine: Arc<dyn RenderEngine>,
    pub(super) instrumentation: Arc<dyn Instrumentation>,
    pub(super) runtime: RuntimeSettings,
    pub(super) document: Option<Arc<Document>>,
    cache_writer: Option<Arc<dyn CacheWriter>>,
}

impl Renderer {
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        instrumentation: Arc<dyn Instrumentation>,
        runtime: RuntimeSettings,
    ) -> Self {
        Self {
            engine,
            instrumentation,
            runtime,
            document: None,
            cache_writer: None,
        }
    }

    /// Surfaces available to `dom` renders on a presentation runtime.
    pub fn with_document(mut self, document: Arc<Document>) -> Self {
        self.document = Some(document);
        self
    }

    /// Store that receives freshly rendered markup after delivery.
    pub fn with_cache_writer(mut self, writer: Arc<dyn CacheWriter>) -> Self {
        self.cache_writer = Some(writer);
        self
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    /// Mode to use when the caller did not pick one.
    pub fn resolve_mode(&self, requested: Option<RenderMode>) -> RenderMode {
        requested.unwrap_or(match self.runtime.target {
            RuntimeTarget::Service => RenderMode::Markup,
            RuntimeTarget::Presentation => RenderMode::Live,
        })
    }

    /// Validate a render call and return the work to drive it.
    ///
    /// A missing component or callback fails here, before anything runs.
    /// Every other outcome reaches `callback` exactly once.
    ///
    /// The returned future can be driven by any executor. Cache write-back is
    /// spawned onto the current tokio runtime; when the future is polled
    /// outside one, the write is skipped and counted as `cacheUpdateError`.
    pub fn render_component(
        &self,
        component: Option<Arc<dyn Component>>,
        options: RenderOptions,
        callback: Option<RenderCallback>,
    ) -> Result<BoxFuture<'_, ()>, RenderError> {
        let component = component.ok_or(RenderError::Argument("component"))?;
        let callback = callback.ok_or(RenderError::Argument("callback"))?;

        let mode = self.resolve_mode(options.mode);
        let span = info_span!(
            "render_component",
            component = %component.name(),
            mode = mode.as_str()
        );

        Ok(self
            .dispatch(component, options, mode, callback)
            .instrument(span)
            .boxed())
    }

    /// `render_component` with omitted options.
    pub fn render_component_default(
        &self,
        component: Option<Arc<dyn Component>>,
        callback: Option<RenderCallback>,
    ) -> Result<BoxFuture<'_, ()>, RenderError> {
        self.render_component(component, RenderOptions::default(), callback)
    }

    async fn dispatch(
        &self,
        component: Arc<dyn Component>,
        options: RenderOptions,
        mode: RenderMode,
        callback: RenderCallback,
    ) {
        let mut timer = Timer::start(Arc::clone(&self.instrumentation));
        self.instrumentation.increment(EVENT_COUNT);
        let responder = Arc::new(Responder::new(callback));

        match component.construction() {
            Some(construction) => {
                self.render_through_pipeline(
                    &component,
                    construction,
                    &options,
                    mode,
                    &responder,
                    &mut timer,
                )
                .await;
            }
            None => self.render_direct(&component, &options, mode, &responder, &mut timer),
        }
    }

    async fn render_through_pipeline(
        &self,
        component: &Arc<dyn Component>,
        construction: &dyn Construction,
        options: &RenderOptions,
        mode: RenderMode,
        responder: &Arc<Responder>,
        timer: &mut Timer,
    ) {
        let mut pipeline = Pipeline::new(
            options.context.clone(),
            Arc::clone(&options.http),
            options.isolated_config.clone(),
            options.request_context.clone(),
            options.locales.clone(),
            self.cache_hit_fn(Arc::clone(responder), Arc::clone(&options.http)),
        );
        if let Some(writer) = self.cache_writer.as_ref() {
            pipeline = pipeline.with_cache_writer(Arc::clone(writer));
        }
        // Route props must be visible to the hook.
        if let Some(props) = options.props.clone() {
            pipeline.set_props(props);
        }
        let pipeline = Arc::new(pipeline);
        timer.mark("create_pipeline");

        let constructed = construction
            .construct(Arc::clone(&pipeline), Value::Object(Map::new()))
            .await;
        timer.mark("component_construction");

        if let Err(error) = constructed {
            self.instrumentation.increment(EVENT_CONSTRUCTION_ERROR);
            warn!(error = %error, "construction hook failed");
            pipeline.release();
            timer.mark("release");
            responder.deliver(Err(error.into()));
            return;
        }

        pipeline.flush().await;

        let decision = pipeline.decide();
        if decision != Pipeline::RENDER_NEEDED {
            pipeline.release();
            timer.mark("release");

            if decision == Pipeline::RENDER_ABORT {
                self.instrumentation.increment(EVENT_ABORT);
            } else if decision == Pipeline::RENDER_NO_CHANGE {
                self.instrumentation.increment(EVENT_CACHE_ABORT);
            }
            debug!(decision = decision.as_str(), "render skipped");

            responder.deliver(Ok(Response {
                body: None,
                context: ResponseContext::Pipeline(pipeline),
            }));
            return;
        }

        let scope = RenderScope::new(
            pipeline.root_isolator().isolated_config().cloned(),
            options.request_context.clone(),
            options.locales.clone(),
        );
        let element = Element::new(Arc::clone(component), pipeline.props(), scope);
        timer.mark("react_context");

        pipeline.release();
        timer.mark("release");

        self.render_step(
            element,
            ResponseContext::Pipeline(pipeline),
            mode,
            options,
            responder,
            timer,
        );
    }

    fn render_direct(
        &self,
        component: &Arc<dyn Component>,
        options: &RenderOptions,
        mode: RenderMode,
        responder: &Responder,
        timer: &mut Timer,
    ) {
        let props = merge_direct_props(
            options
                .context
                .as_ref()
                .and_then(|context| context.props.as_ref()),
            options.props.as_ref(),
        );
        let scope = RenderScope::new(
            options.isolated_config.clone(),
            options.request_context.clone(),
            options.locales.clone(),
        );
        let element = Element::new(Arc::clone(component), props, scope);
        let context = ResponseContext::Direct(DirectContext::new(options.request_context.clone()));

        self.render_step(element, context, mode, options, responder, timer);
    }

    /// Cache hand-off installed on each pipeline: merge head tags, deliver the
    /// cached markup, and leave the responder marked as delivered.
    fn cache_hit_fn(&self, responder: Arc<Responder>, transport: Arc<Transport>) -> CacheHitFn {
        let instrumentation = Arc::clone(&self.instrumentation);

        Box::new(move |hit: CacheHit| {
            instrumentation.increment(EVENT_CACHE_HIT);

            if let Some(head_tags) = hit.head_tags.as_deref() {
                let added = transport.merge_head_tags(head_tags);
                debug!(added, "merged cached head tags");
            }

            responder.deliver(Ok(Response {
                body: Some(RenderOutput::Markup(hit.markup)),
                context: ResponseContext::Cached(CachedContext::new(hit.context)),
            }));
        })
    }
}

/// Props for the direct path: incoming context props unioned with explicit
/// props, explicit props winning on collision.
pub(crate) fn merge_direct_props(
    context_props: Option<&Props>,
    explicit: Option<&Props>,
) -> Option<Props> {
    match (context_props, explicit) {
        (Some(context_props), Some(explicit)) => {
            let mut merged = context_props.clone();
            merged.extend(explicit.iter().map(|(key, value)| (key.clone(), value.clone())));
            Some(merged)
        }
        (Some(props), None) | (None, Some(props)) => Some(props.clone()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn props(value: Value) -> Props {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn explicit_props_win_on_collision() {
        let context = props(json!({ "a": 1, "b": 2 }));
        let explicit = props(json!({ "b": 3, "c": 4 }));

        assert_eq!(
            merge_direct_props(Some(&context), Some(&explicit)),
            Some(props(json!({ "a": 1, "b": 3, "c": 4 })))
        );
    }

    #[test]
    fn single_source_is_used_as_is() {
        let only = props(json!({ "x": true }));

        assert_eq!(merge_direct_props(Some(&only), None), Some(only.clone()));
        assert_eq!(merge_direct_props(None, Some(&only)), Some(only));
        assert_eq!(merge_direct_props(None, None), None);
    }
}
