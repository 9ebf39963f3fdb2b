//! Render orchestration.
//!
//! `Renderer::render_component` is the entry point. Components with a
//! construction hook go through a per-request [`Pipeline`](crate::pipeline::Pipeline)
//! that may short-circuit via the cache or decide not to render at all;
//! components without one are rendered directly. Both paths end in the render
//! step, which invokes the host's [`RenderEngine`], delivers the response, and
//! schedules a cache write when the context supports one.

mod context;
mod dispatch;
mod engine;
mod step;
mod types;

pub use context::{CachedContext, DirectContext, ResponseContext};
pub use dispatch::Renderer;
pub use engine::RenderEngine;
pub use types::{
    Component, Construction, Element, HydrationPayload, Props, RenderMode, RenderOptions,
    RenderOutput, RenderScope, Response,
};
