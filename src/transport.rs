//! Per-request transport context shared between the caller and the renderer.

use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::lock::mutex_lock;

const SOURCE: &str = "transport";

/// Request/response transport fields that survive the render.
///
/// The head-tag collection belongs to the transport for the lifetime of a
/// single request. The only writer is the cache hand-off; the caller reads it
/// back once the response has been delivered.
#[derive(Debug, Default)]
pub struct Transport {
    head_tags: Mutex<Vec<String>>,
    fields: Map<String, Value>,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_head_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            head_tags: Mutex::new(tags.into_iter().map(Into::into).collect()),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Snapshot of the current head tags in insertion order.
    pub fn head_tags(&self) -> Vec<String> {
        mutex_lock(&self.head_tags, SOURCE, "head_tags").clone()
    }

    /// Append every tag not already present, preserving existing order.
    ///
    /// Returns the number of tags actually appended.
    pub fn merge_head_tags(&self, incoming: &[String]) -> usize {
        let mut tags = mutex_lock(&self.head_tags, SOURCE, "merge_head_tags");
        merge_unique(&mut tags, incoming)
    }
}

fn merge_unique(existing: &mut Vec<String>, incoming: &[String]) -> usize {
    let before = existing.len();
    for tag in incoming {
        if !existing.contains(tag) {
            existing.push(tag.clone());
        }
    }
    existing.len() - before
}
