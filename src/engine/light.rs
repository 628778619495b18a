//! ----------------------------------------------------------------------------
//! **Light animation, dynamic lights and the block-lights build**
//!
//! * Up to 64 named *styles*: a wave string of `'a'..'z'` sampled at 10 Hz,
//!   `'a'` dark, `'m'` normal, `'z'` double bright.
//! * Up to 32 *dynamic lights* marked onto BSP surfaces before the world
//!   walk; each marked surface remembers the frame and a bitmask of the
//!   lights touching it.
//! * `build_block_lights` folds lightmap samples, style brightness and
//!   dynamic contributions into the 18x18 grid the surface cache
//!   interpolates while it shades texels.
//! ----------------------------------------------------------------------------

use glam::Vec3;

use crate::world::{BrushModel, ChildRef, Surface};

pub const MAX_LIGHT_STYLES: usize = 64;
pub const MAX_LIGHTS: usize = 32;

/// One past the largest lightmap grid: extents cap at 256 texels, i.e.
/// 17 sample points, so 18 leaves headroom for the bilinear right column.
pub const BLOCKLIGHT_DIM: usize = 18;

/// Style brightness of an empty wave string.
const STYLE_DEFAULT_VALUE: i32 = 256;

/// Brightness step per wave character: 'm' - 'a' = 12 maps to 264 ~ 1.0.
const STYLE_STEP: i32 = 22;

/// An animated brightness curve shared by many surfaces.
#[derive(Clone, Default)]
pub struct LightStyle {
    /// One char per 0.1 s; loops.
    pub wave: String,
    cur_value: i32,
}

/// A short-lived point light.
#[derive(Clone, Copy, Default)]
pub struct Light {
    pub position: Vec3,
    pub radius: f32,
    pub minlight: f32,
    /// Seconds until the light dies.
    pub duration: f32,
    pub time_passed: f32,
}

impl Light {
    #[inline]
    fn alive(&self) -> bool {
        self.radius > 0.0 && self.time_passed < self.duration
    }
}

/// All lighting state the renderer consults during a frame.
pub struct LightSystem {
    pub styles: [LightStyle; MAX_LIGHT_STYLES],
    pub lights: [Light; MAX_LIGHTS],
    /// Frame stamp used when marking surfaces, advanced by the renderer.
    pub light_framecount: i32,
    /// Scratch grid for the surface-cache build, light values in 8.8.
    pub blocklights: [i32; BLOCKLIGHT_DIM * BLOCKLIGHT_DIM],
}

impl Default for LightSystem {
    fn default() -> Self {
        LightSystem {
            styles: std::array::from_fn(|_| LightStyle::default()),
            lights: [Light::default(); MAX_LIGHTS],
            light_framecount: 0,
            blocklights: [0; BLOCKLIGHT_DIM * BLOCKLIGHT_DIM],
        }
    }
}

impl LightSystem {
    /// Fresh system with the stock id wave table installed.
    pub fn with_default_styles() -> Self {
        let mut sys = LightSystem::default();
        for &(i, wave) in DEFAULT_STYLE_WAVES {
            sys.set_style(i, wave);
        }
        sys
    }

    pub fn set_style(&mut self, index: usize, wave: &str) {
        self.styles[index].wave = wave.into();
    }

    /// Current brightness of style `index` (0..550-ish, 256 = fullbright
    /// for styles without a wave).
    #[inline]
    pub fn style_value(&self, index: usize) -> i32 {
        self.styles[index & (MAX_LIGHT_STYLES - 1)].cur_value
    }

    /// Sample every wave at `time` (seconds).  Called once per frame.
    pub fn animate(&mut self, time: f32) {
        let tick = (time * 10.0) as usize;
        for style in self.styles.iter_mut() {
            if style.wave.is_empty() {
                style.cur_value = STYLE_DEFAULT_VALUE;
                continue;
            }
            let c = style.wave.as_bytes()[tick % style.wave.len()];
            style.cur_value = c.saturating_sub(b'a') as i32 * STYLE_STEP;
        }
    }

    /// Spawn a dynamic light in the first free slot; silently drops the
    /// light when all 32 are burning.
    pub fn add_light(&mut self, position: Vec3, radius: f32, minlight: f32, duration: f32) {
        if let Some(slot) = self.lights.iter_mut().find(|l| !l.alive()) {
            *slot = Light {
                position,
                radius,
                minlight,
                duration,
                time_passed: 0.0,
            };
        }
    }

    /// Age the dynamic lights by `dt` seconds.
    pub fn decay_lights(&mut self, dt: f32) {
        for light in self.lights.iter_mut() {
            if light.radius > 0.0 {
                light.time_passed += dt;
                if light.time_passed >= light.duration {
                    light.radius = 0.0;
                }
            }
        }
    }

    /// Stamp `lightframe`/`lightbits` on every surface each live light can
    /// reach.  Runs once per frame before the world walk.
    pub fn mark_lights(&mut self, model: &mut BrushModel, framecount: i32) {
        self.light_framecount = framecount;
        if model.nodes.is_empty() {
            return;
        }
        for index in 0..MAX_LIGHTS {
            let light = self.lights[index];
            if !light.alive() {
                continue;
            }
            mark_light_on_node(model, &light, 1 << index, 0, framecount);
        }
    }

    /*──────────────────── block-lights build ─────────────────────────*/

    /// Accumulate lightmap + dynamic light into [`Self::blocklights`] for
    /// surface `surf_idx` and return the grid dimensions `(smax, tmax)`.
    ///
    /// Values end up inverted into colormap shade units: 0 is fullbright,
    /// `63 << 8` darkest, with a floor of one shade grade.
    pub fn build_block_lights(
        &mut self,
        model: &BrushModel,
        surf_idx: usize,
        framecount: i32,
    ) -> (usize, usize) {
        let surface = &model.surfaces[surf_idx];
        let smax = (surface.uv_extents[0] >> 4) as usize + 1;
        let tmax = (surface.uv_extents[1] >> 4) as usize + 1;
        let size = smax * tmax;
        debug_assert!(smax <= BLOCKLIGHT_DIM && tmax <= BLOCKLIGHT_DIM);

        let grid = &mut self.blocklights[..size];
        grid.fill(0);

        // a world with no lighting at all renders fullbright: shade row 0
        if model.light_data.is_empty() {
            return (smax, tmax);
        }

        // accumulate every lightmap scaled by its style's brightness
        if let Some(sample_ofs) = surface.samples {
            let mut samples = &model.light_data[sample_ofs as usize..];
            for style in surface.styles {
                if style == 255 {
                    break;
                }
                let scale = self.styles[style as usize & (MAX_LIGHT_STYLES - 1)].cur_value;
                for (dst, &src) in self.blocklights[..size].iter_mut().zip(samples) {
                    *dst += src as i32 * scale;
                }
                samples = samples.get(size..).unwrap_or(&[]);
            }
        }

        if surface.light_frame == framecount {
            add_dynamic_lights(&mut self.blocklights, model, surf_idx, &self.lights);
        }

        // bound, invert and shift into colormap shade units
        for light in self.blocklights[..size].iter_mut() {
            let t = ((255 * 256 - *light) >> 2).max(1 << 6);
            *light = t;
        }

        (smax, tmax)
    }
}

/// Recursive half of [`LightSystem::mark_lights`].
fn mark_light_on_node(model: &mut BrushModel, light: &Light, bit: u32, node_idx: u32, frame: i32) {
    let node = &model.nodes[node_idx as usize];
    let children = node.children;
    let (first, count) = (node.first_surface as usize, node.num_surface as usize);
    let dist = model.planes[node.plane as usize].distance_to(light.position);

    if dist > light.radius {
        if let ChildRef::Node(n) = ChildRef::decode(children[0]) {
            mark_light_on_node(model, light, bit, n, frame);
        }
        return;
    }
    if dist < -light.radius {
        if let ChildRef::Node(n) = ChildRef::decode(children[1]) {
            mark_light_on_node(model, light, bit, n, frame);
        }
        return;
    }

    // the light straddles the splitting plane: its sphere can touch the
    // node's own faces and both subtrees
    for surface in &mut model.surfaces[first..first + count] {
        if surface.light_frame != frame {
            surface.light_bits = 0;
            surface.light_frame = frame;
        }
        surface.light_bits |= bit;
    }

    for child in children {
        if let ChildRef::Node(n) = ChildRef::decode(child) {
            mark_light_on_node(model, light, bit, n, frame);
        }
    }
}

/// Splash every flagged dynamic light onto the block-lights grid.
fn add_dynamic_lights(
    blocklights: &mut [i32],
    model: &BrushModel,
    surf_idx: usize,
    lights: &[Light; MAX_LIGHTS],
) {
    let surface: &Surface = &model.surfaces[surf_idx];
    let tex_info = &model.tex_infos[surface.tex_info as usize];
    let plane = &model.planes[surface.plane as usize];

    let smax = (surface.uv_extents[0] >> 4) as i32 + 1;
    let tmax = (surface.uv_extents[1] >> 4) as i32 + 1;

    for (index, light) in lights.iter().enumerate() {
        if surface.light_bits & (1 << index) == 0 {
            continue;
        }

        let dist = plane.distance_to(light.position);
        let rad = light.radius - dist.abs();
        if rad < light.minlight {
            continue;
        }
        let minlight = rad - light.minlight;

        // project the light onto the surface plane, then into texel space
        let impact = light.position - plane.normal * dist;
        let local = [
            impact.dot(tex_info.u_axis) + tex_info.u_offset - surface.uv_min[0] as f32,
            impact.dot(tex_info.v_axis) + tex_info.v_offset - surface.uv_min[1] as f32,
        ];

        for t in 0..tmax {
            let td = (local[1] - (t * 16) as f32).abs() as i32;
            for s in 0..smax {
                let sd = (local[0] - (s * 16) as f32).abs() as i32;
                // octagonal distance: max + min/2
                let approx = if sd > td { sd + (td >> 1) } else { td + (sd >> 1) };
                if (approx as f32) < minlight {
                    blocklights[(t * smax + s) as usize] += ((rad - approx as f32) * 256.0) as i32;
                }
            }
        }
    }
}

/// Stock wave table id maps assume: style 0 steady, 1-13 the classic
/// flicker and pulse curves, 32-36 and 63 switchable lights.
const DEFAULT_STYLE_WAVES: &[(usize, &str)] = &[
    (0, "m"),
    (1, "mmnmmommommnonmmonqnmmo"),
    (2, "mmnmmommommnonmmonqnmmo"),
    (3, "abcdefghijklmnopqrstuvwxyzyxwvutsrqponmlkjihgfedcba"),
    (4, "mmmmmaaaaammmmmaaaaaabcdefgabcdefg"),
    (5, "mamamamamama"),
    (7, "jklmnopqrstuvwxyzyxwvutsrqponmlkj"),
    (8, "nmonqnmomnmomomno"),
    (9, "mmmaaaabcdefgmmmmaaaammmaamm"),
    (10, "mmmaaammmaaammmabcdefaaaammmmabcdefmmmaaaa"),
    (11, "aaaaaaaazzzzzzzz"),
    (12, "mmamammmmammamamaaamammma"),
    (13, "abcdefghijklmnopqrrqponmlkjihgfedcba"),
    (32, "m"),
    (33, "a"),
    (34, "a"),
    (35, "a"),
    (36, "a"),
    (63, "a"),
];

/*======================================================================*/
/*                               Tests                                  */
/*======================================================================*/
