use bitflags::bitflags;

bitflags! {
    /// Drawing / orientation flags carried by every [`Surface`] at runtime.
    ///
    /// The numeric values match the on-disk conventions of BSP version 29
    /// compilers, so loaded maps keep their meaning bit-for-bit.
    ///
    /// [`Surface`]: crate::world::Surface
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SurfaceFlags: u32 {
        /// The viewer sees this face from the back side of its plane.
        const PLANE_BACK      = 0x02;
        /// Sky face, sampled from the composited sky canvas.
        const DRAW_SKY        = 0x04;
        /// Water / slime / lava, drawn with the turbulence warp.
        const DRAW_TURB       = 0x10;
        /// Texture wraps instead of honouring uv extents (sky and turb).
        const DRAW_TILED      = 0x20;
        /// The pseudo-surface that fills pixels no real face covers.
        const DRAW_BACKGROUND = 0x40;
    }
}

bitflags! {
    /// Texinfo flags straight from the Texinfo lump.
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TexFlags: u32 {
        /// Sky or liquid: no lightmap, no 256-texel subdivision limit.
        const SPECIAL = 0x01;
    }
}

/// Leaf contents values (always negative; a node stores 0).
pub const CONTENTS_EMPTY: i32 = -1;
pub const CONTENTS_SOLID: i32 = -2;
pub const CONTENTS_WATER: i32 = -3;
pub const CONTENTS_SLIME: i32 = -4;
pub const CONTENTS_LAVA: i32 = -5;
pub const CONTENTS_SKY: i32 = -6;

/// True for the liquid contents that trigger the underwater screen warp.
#[inline]
pub fn contents_is_liquid(contents: i32) -> bool {
    matches!(contents, CONTENTS_WATER | CONTENTS_SLIME | CONTENTS_LAVA)
}

/// Axial plane types; 3-5 are non-axial snapped to the dominant axis.
pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;
pub const PLANE_ANYX: u8 = 3;
pub const PLANE_ANYY: u8 = 4;
pub const PLANE_ANYZ: u8 = 5;

/// Mip pyramid depth of every world texture.
pub const MIP_LEVELS: usize = 4;

/// Lightmap style slots per surface.
pub const MAX_LIGHT_MAPS: usize = 4;
