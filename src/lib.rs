//! # yaquake_rs
//!
//! A Quake-style software rasterizer: a CPU-only renderer turning a
//! BSP-partitioned brush world with lightmapped textures, an animated
//! sky, turbulent liquids and dynamic lights into an 8-bit palettized
//! framebuffer, using span-based edge sorting with a perspective-correct
//! texture mapper and a demand-filled surface cache.
//!
//! ```no_run
//! use yaquake_rs::engine::{RenderBuffer, Renderer};
//! use yaquake_rs::pak::{Pak, load_brush_model};
//! use yaquake_rs::world::{Camera, Colormap};
//!
//! # fn main() -> anyhow::Result<()> {
//! let pak = Pak::from_file("id1/pak0.pak")?;
//! let mut model = load_brush_model(pak.read("maps/start.bsp").unwrap())?;
//! let colormap = Colormap::from_bytes(pak.read("gfx/colormap.lmp").unwrap())?;
//!
//! let mut renderer = Renderer::new(640, 480, colormap);
//! renderer.set_world(&model);
//!
//! let mut camera = Camera::new(glam::vec3(544.6, 290.0, 50.0), glam::Vec3::ZERO);
//! camera.set_screen(0, 0, 640, 480, 90.0);
//!
//! let mut target = RenderBuffer::new(640, 480);
//! renderer.render_view(&mut model, &mut camera, &mut target, 1.0 / 60.0)?;
//! # Ok(()) }
//! ```

pub mod defs;
pub mod engine;
pub mod pak;
pub mod world;
