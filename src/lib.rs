//! Isomorphic component rendering.
//!
//! Renders a component tree to static markup, hydratable markup, or a live
//! presentation surface, with the same orchestration on the service and
//! presentation sides: an asynchronous construction phase, a cache hand-off,
//! head-tag merging, and exactly-once delivery to the caller's callback.

pub mod config;
pub mod error;
pub mod instrument;
pub mod isolator;
mod lock;
pub mod pipeline;
pub mod render;
pub mod responder;
pub mod surface;
pub mod telemetry;
pub mod transport;

pub use config::{RuntimeSettings, RuntimeTarget, Settings};
pub use error::RenderError;
pub use pipeline::{CacheHit, Pipeline, RenderDecision};
pub use render::{Component, Construction, RenderMode, RenderOptions, Renderer, Response};
pub use responder::RenderCallback;
