//! Live presentation surfaces used by the `dom` render mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::lock::mutex_lock;

const SOURCE: &str = "surface";

/// Class removed from a mount target the first time it receives a render.
pub const LOADING_CLASS: &str = "loading_and_uninitialized";
/// Class removed from the shared root surface the first time any render lands.
pub const UNINITIALIZED_CLASS: &str = "uninitialized";

#[derive(Debug)]
pub struct Surface {
    id: String,
    class_name: Mutex<String>,
    loaded: AtomicBool,
}

impl Surface {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_class(id, "")
    }

    pub fn with_class(id: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class_name: Mutex::new(class_name.into()),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn class_name(&self) -> String {
        mutex_lock(&self.class_name, SOURCE, "class_name").clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Flip the surface to its loaded state, stripping `pending_class` from
    /// its class list. Only the first call has any effect.
    pub fn mark_loaded(&self, pending_class: &str) -> bool {
        if self.loaded.swap(true, Ordering::AcqRel) {
            return false;
        }

        let mut class_name = mutex_lock(&self.class_name, SOURCE, "mark_loaded");
        if !class_name.is_empty() {
            *class_name = class_name.replacen(pending_class, "", 1).trim().to_string();
        }
        true
    }
}

/// The surfaces known to a presentation runtime: a shared root plus any
/// surfaces addressable by id.
#[derive(Debug)]
pub struct Document {
    body: Arc<Surface>,
    surfaces: HashMap<String, Arc<Surface>>,
}

impl Document {
    pub fn new(body: Surface) -> Self {
        Self {
            body: Arc::new(body),
            surfaces: HashMap::new(),
        }
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surfaces
            .insert(surface.id().to_string(), Arc::new(surface));
        self
    }

    pub fn body(&self) -> &Arc<Surface> {
        &self.body
    }

    pub fn surface(&self, id: &str) -> Option<Arc<Surface>> {
        self.surfaces.get(id).cloned()
    }

    /// Surface registered under `id`, falling back to the root surface.
    pub fn mount_surface(&self, id: &str) -> Arc<Surface> {
        self.surface(id).unwrap_or_else(|| Arc::clone(&self.body))
    }
}
