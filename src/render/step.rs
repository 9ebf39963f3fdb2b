//! The render step: the only place the external engine is invoked.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::RuntimeTarget;
use crate::error::EngineError;
use crate::instrument::{Instrumentation, Timer};
use crate::pipeline::PendingCacheUpdate;
use crate::responder::Responder;
use crate::surface::{LOADING_CLASS, UNINITIALIZED_CLASS};

use super::context::ResponseContext;
use super::dispatch::Renderer;
use super::types::{Element, RenderMode, RenderOptions, RenderOutput, Response};

pub(crate) const EVENT_ENGINE_ERROR: &str = "error";
pub(crate) const EVENT_CACHE_UPDATE: &str = "cacheUpdate";
pub(crate) const EVENT_CACHE_UPDATE_ERROR: &str = "cacheUpdateError";

impl Renderer {
    pub(super) fn render_step(
        &self,
        element: Element,
        context: ResponseContext,
        mode: RenderMode,
        options: &RenderOptions,
        responder: &Responder,
        timer: &mut Timer,
    ) {
        let rendered = match mode {
            RenderMode::Static => self.engine.render_static(&element).map(RenderOutput::Markup),
            RenderMode::Markup if self.runtime.markup_uses_static => {
                self.engine.render_static(&element).map(RenderOutput::Markup)
            }
            RenderMode::Markup => self.engine.render_markup(&element).map(RenderOutput::Markup),
            RenderMode::Live => self.mount_live(&element, options, timer),
        };
        timer.mark("react_render");

        let output = match rendered {
            Ok(output) => output,
            Err(err) => {
                error!(component = %element.name(), error = %err, "render engine failed");
                responder.deliver(Err(err.into()));
                self.instrumentation.increment(EVENT_ENGINE_ERROR);
                return;
            }
        };

        let cache_update = context.cache_update(&output);
        let delivered = responder.deliver(Ok(Response {
            body: Some(output),
            context,
        }));
        if !delivered {
            debug!("render finished after another path already responded");
        }

        if let Some(update) = cache_update {
            spawn_cache_update(update, Arc::clone(&self.instrumentation));
        }
    }

    fn mount_live(
        &self,
        element: &Element,
        options: &RenderOptions,
        timer: &mut Timer,
    ) -> Result<RenderOutput, EngineError> {
        if self.runtime.target != RuntimeTarget::Presentation {
            return Err(EngineError::SurfaceUnavailable);
        }
        let document = self
            .document
            .as_ref()
            .ok_or(EngineError::SurfaceUnavailable)?;

        let target = match options.target.as_ref() {
            Some(target) => Arc::clone(target),
            None => document.mount_surface(&self.runtime.mount_surface_id),
        };

        if options.unmount_before_mount {
            self.engine.unmount(&target)?;
            timer.mark("react_unmount");
        }

        self.engine.mount(element, &target)?;

        if target.mark_loaded(LOADING_CLASS) {
            debug!(surface = target.id(), "mount surface initialized");
        }
        document.body().mark_loaded(UNINITIALIZED_CLASS);

        Ok(RenderOutput::Mounted {
            surface_id: target.id().to_string(),
        })
    }
}

/// Write fresh markup back to the cache without holding up the response.
///
/// The write runs on the ambient tokio runtime. Without one it is skipped and
/// counted as a failed update.
fn spawn_cache_update(update: PendingCacheUpdate, instrumentation: Arc<dyn Instrumentation>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        instrumentation.increment(EVENT_CACHE_UPDATE_ERROR);
        error!(
            cache_key = %update.key(),
            "no tokio runtime available, skipping cache update"
        );
        return;
    };

    runtime.spawn(async move {
        let key = update.key().to_string();
        match update.run().await {
            Ok(()) => {
                instrumentation.increment(EVENT_CACHE_UPDATE);
                info!(cache_key = %key, "cache updated");
            }
            Err(err) => {
                instrumentation.increment(EVENT_CACHE_UPDATE_ERROR);
                error!(cache_key = %key, error = %err, "cannot update cache key");
            }
        }
    });
}
