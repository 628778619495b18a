mod bsp;
mod cache;
mod clip;
mod draw;
mod light;
mod renderer;
mod scan;
mod sky;
mod types;
mod warp;

pub use cache::{CacheError, SurfaceCache};
pub use light::{LightSystem, MAX_LIGHT_STYLES, MAX_LIGHTS};
pub use renderer::{RenderBuffer, RenderError, Renderer};
pub use sky::SkyCanvas;
pub use types::MAX_PIXEL_HEIGHT;
