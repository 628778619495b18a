mod loader;
#[allow(clippy::module_inception)]
mod pak;

pub use loader::{BSP_VERSION, BspError, load_brush_model};
pub use pak::{Pak, PakEntry, PakError};
