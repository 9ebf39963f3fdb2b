//! Hand-off contract between construction hooks and the page cache.
//!
//! Storage is owned by the host. Hooks report hits through [`CacheHit`];
//! fresh renders are written back through a [`CacheWriter`] after the
//! response has been delivered.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CacheUpdateError;

use super::Pipeline;

/// A previously rendered result found by a construction hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub markup: String,
    /// Serialized hydration context stored with the markup, returned verbatim.
    pub context: String,
    pub head_tags: Option<Vec<String>>,
}

impl CacheHit {
    pub fn new(markup: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            context: context.into(),
            head_tags: None,
        }
    }

    pub fn with_head_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.head_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }
}

/// Callback installed on every pipeline to short-circuit the render.
pub type CacheHitFn = Box<dyn Fn(CacheHit) + Send + Sync + 'static>;

/// Everything a cache needs to serve the same response later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub markup: String,
    pub context: String,
    pub head_tags: Vec<String>,
}

#[async_trait]
pub trait CacheWriter: Send + Sync {
    async fn update(&self, entry: CacheEntry) -> Result<(), CacheUpdateError>;
}

/// A cache write scheduled after delivery.
pub(crate) struct PendingCacheUpdate {
    writer: Arc<dyn CacheWriter>,
    pipeline: Arc<Pipeline>,
    key: String,
    markup: String,
}

impl PendingCacheUpdate {
    pub(crate) fn new(
        writer: Arc<dyn CacheWriter>,
        pipeline: Arc<Pipeline>,
        key: String,
        markup: String,
    ) -> Self {
        Self {
            writer,
            pipeline,
            key,
            markup,
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) async fn run(self) -> Result<(), CacheUpdateError> {
        let entry = CacheEntry {
            context: self.pipeline.to_json()?,
            head_tags: self.pipeline.transport().head_tags(),
            key: self.key,
            markup: self.markup,
        };
        self.writer.update(entry).await
    }
}
