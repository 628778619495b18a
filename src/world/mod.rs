mod bsp;
mod camera;
mod geometry;
mod texture;

#[cfg(test)]
pub(crate) mod testworld;

pub use camera::{Camera, ClipPlane};
pub use geometry::{
    BrushModel, ChildRef, Edge, EdgeCache, Leaf, Node, Plane, Submodel, Surface, TexInfo,
    TILED_UV_EXTENT, TILED_UV_MIN, Vertex,
};
pub use geometry::ClipNode;
pub use texture::{
    COLORMAP_SHADES, Colormap, MipTexture, Palette, TextureError, build_gamma_table,
};
