//! ----------------------------------------------------------------------------
//! **Brush-model world data**
//!
//! Everything the rasterizer reads during a frame lives here:
//! vertices, edges, planes, texinfos, surfaces, the BSP node/leaf trees,
//! marksurfaces, clipnodes, submodels and the raw lighting / visibility blobs.
//!
//! The tables are plain `Vec`s and cross-reference each other with `u32`
//! indices, so the whole model is a value type that the loader builds once
//! and the renderer borrows for the lifetime of a frame.  A handful of
//! fields (`visible_frame`, the edge clip cache, `lightbits`, `cachespots`)
//! are mutated by the renderer while it walks the tree.
//! ----------------------------------------------------------------------------

use glam::Vec3;

use crate::defs::{MAX_LIGHT_MAPS, MIP_LEVELS, PLANE_X, PLANE_Y, PLANE_Z, SurfaceFlags, TexFlags};

/// `uv_min` sentinel of tiled (sky / turbulent) surfaces.
pub const TILED_UV_MIN: i16 = 16384;
/// `uv_extents` sentinel of tiled surfaces; negative means "wrap, ignore extents".
pub const TILED_UV_EXTENT: i16 = -8192;

/// One world-space position referenced by edges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
}

/// Per-frame clip state a world edge carries between the surfaces that
/// share it.  Every arm is tagged with the frame that produced it, so a
/// stale entry invalidates itself the moment the frame counter moves on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeCache {
    /// Fully clipped away (or horizontal and accepted) during `frame`:
    /// nothing to emit for any other surface using this edge.
    Clipped { frame: i32 },
    /// Partially clipped during `frame`; the clipped geometry is
    /// surface-specific, so the result must never be reused.
    Partial { frame: i32 },
    /// An IEdge was emitted into the per-frame arena at `offset` during
    /// `frame`; another surface sharing the edge re-tags that record
    /// instead of clipping again.
    Emitted { frame: i32, offset: u32 },
}

impl Default for EdgeCache {
    fn default() -> Self {
        EdgeCache::Clipped { frame: -1 }
    }
}

/// Undirected world edge; surfedges pick the direction by sign.
#[derive(Clone, Copy, Debug, Default)]
pub struct Edge {
    pub verts: [u16; 2],
    pub cache: EdgeCache,
}

/// Splitting / face plane.
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
    /// PLANE_X/Y/Z for axial planes, PLANE_ANY* otherwise.
    pub kind: u8,
    /// Per-component sign of the normal, `x | y<<1 | z<<2`.
    pub sign_bits: u8,
}

impl Plane {
    /// Build a plane, deriving `sign_bits` from the normal.
    pub fn new(normal: Vec3, distance: f32, kind: u8) -> Self {
        let mut bits = 0u8;
        for j in 0..3 {
            if normal[j] < 0.0 {
                bits |= 1 << j;
            }
        }
        Plane {
            normal,
            distance,
            kind,
            sign_bits: bits,
        }
    }

    /// Signed distance of `point` to the plane, with the axial fast paths.
    #[inline]
    pub fn distance_to(&self, point: Vec3) -> f32 {
        match self.kind {
            k if k == PLANE_X => point.x - self.distance,
            k if k == PLANE_Y => point.y - self.distance,
            k if k == PLANE_Z => point.z - self.distance,
            _ => point.dot(self.normal) - self.distance,
        }
    }
}

/// Texture-space mapping of a surface.
#[derive(Clone, Debug)]
pub struct TexInfo {
    pub u_axis: Vec3,
    pub u_offset: f32,
    pub v_axis: Vec3,
    pub v_offset: f32,
    /// Index into [`BrushModel::textures`].
    pub texture: u32,
    /// Mip-selection bias classified from the axis lengths at load time.
    pub mip_adjust: f32,
    pub flags: TexFlags,
}

/// One convex lightmapped polygon.
#[derive(Clone, Debug)]
pub struct Surface {
    pub plane: u32,
    pub tex_info: u32,
    pub flags: SurfaceFlags,

    /// First index into [`BrushModel::surfedges`] and how many follow.
    pub first_edge: u32,
    pub num_edge: u32,

    /// Texel-space bounding box, discretised to multiples of 16
    /// (or the tiled sentinels for sky / turbulent faces).
    pub uv_min: [i16; 2],
    pub uv_extents: [i16; 2],

    pub styles: [u8; MAX_LIGHT_MAPS],
    /// Offset into [`BrushModel::light_data`]; `None` = unlit.
    pub samples: Option<u32>,

    /// Stamped with the frame counter when the PVS marks the face.
    pub visible_frame: i32,
    /// Frame stamp + bitmask of the dynamic lights touching the face.
    pub light_frame: i32,
    pub light_bits: u32,

    /// Surface-cache blocks holding the lit texture per mip level;
    /// cleared by the cache when the rover evicts a block.
    pub cachespots: [Option<u32>; MIP_LEVELS],
}

/// Reference to either child of a BSP node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildRef {
    Node(u32),
    Leaf(u32),
}

impl ChildRef {
    /// Decode the on-disk child encoding: non-negative = node index,
    /// negative = `-(leaf + 1)`.
    #[inline]
    pub fn decode(raw: i32) -> Self {
        if raw >= 0 {
            ChildRef::Node(raw as u32)
        } else {
            ChildRef::Leaf((-1 - raw) as u32)
        }
    }
}

/// Interior BSP node; `contents` is implicitly 0.
#[derive(Clone, Debug)]
pub struct Node {
    pub plane: u32,
    /// Raw child encoding, see [`ChildRef::decode`].
    pub children: [i32; 2],
    /// min x/y/z then max x/y/z, for bounding-box culling.
    pub minmax: [i16; 6],
    pub first_surface: u32,
    pub num_surface: u32,
    pub visible_frame: i32,
    pub parent: Option<u32>,
}

/// BSP leaf; `contents` is always negative.
#[derive(Clone, Debug)]
pub struct Leaf {
    pub contents: i32,
    pub minmax: [i16; 6],
    pub first_marksurface: u32,
    pub num_marksurface: u32,
    /// Offset of the run-length compressed PVS in
    /// [`BrushModel::visibility`]; `None` = everything visible.
    pub vis_offset: Option<u32>,
    pub ambient_sound: [u8; 4],
    /// Front-to-back sequence number assigned during the world walk;
    /// smaller = nearer the viewpoint.
    pub key: i32,
    pub visible_frame: i32,
    pub parent: Option<u32>,
}

/// Collision BSP node (point-sized and player-sized hulls).
#[derive(Clone, Copy, Debug)]
pub struct ClipNode {
    pub plane: u32,
    pub children: [i16; 2],
}

/// Inline brush entity (doors, platforms, ...) carved from the world BSP.
#[derive(Clone, Debug)]
pub struct Submodel {
    pub min: Vec3,
    pub max: Vec3,
    pub origin: Vec3,
    pub head_nodes: [i32; 4],
    pub visible_leaves: i32,
    pub first_face: u32,
    pub num_face: u32,
}

/// A parsed brush model: the whole static world.
#[derive(Default, Clone, Debug)]
pub struct BrushModel {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
    /// Signed indices into `edges`; a negative index walks the edge
    /// from its second vertex to its first.
    pub surfedges: Vec<i32>,
    pub planes: Vec<Plane>,
    pub textures: Vec<crate::world::texture::MipTexture>,
    pub tex_infos: Vec<TexInfo>,
    pub surfaces: Vec<Surface>,
    /// Surface indices referenced by leaves.
    pub marksurfaces: Vec<u32>,
    pub nodes: Vec<Node>,
    /// Leaf 0 is the shared solid leaf; real leaves follow.
    pub leaves: Vec<Leaf>,
    pub clipnodes: Vec<ClipNode>,
    pub submodels: Vec<Submodel>,
    /// Run-length compressed PVS for all leaves.
    pub visibility: Vec<u8>,
    /// Raw lightmap samples referenced by surfaces.
    pub light_data: Vec<u8>,
    /// Entity description text, parsed by the game layer.
    pub entities: String,
}

impl Default for Vertex {
    fn default() -> Self {
        Vertex {
            position: Vec3::ZERO,
        }
    }
}
