use crate::error::EngineError;
use crate::surface::Surface;

use super::types::Element;

/// The tree-diffing/markup engine the renderer drives. Supplied by the host.
pub trait RenderEngine: Send + Sync {
    /// Markup without hydration attributes.
    fn render_static(&self, element: &Element) -> Result<String, EngineError>;

    /// Markup the presentation side can hydrate.
    fn render_markup(&self, element: &Element) -> Result<String, EngineError>;

    /// Mount the element onto a live surface, or update what is mounted there.
    fn mount(&self, element: &Element, surface: &Surface) -> Result<(), EngineError>;

    fn unmount(&self, surface: &Surface) -> Result<(), EngineError>;
}
