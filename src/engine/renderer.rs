//! ----------------------------------------------------------------------------
//! **The renderer aggregate**
//!
//! Owns every piece of mutable rendering state - the per-frame edge /
//! surface / span arenas, the light system, the sky canvas, the surface
//! cache and the scratch buffers - and drives one frame through the
//! pipeline:
//!
//! 1. frame setup: view leaf, PVS expansion, light animation, frustum
//! 2. front-to-back world walk emitting edges and surfaces
//! 3. scanline sweep generating spans
//! 4. span drawing through the surface cache
//! 5. underwater warp when the view leaf is liquid
//!
//! Everything happens synchronously inside [`Renderer::render_view`]; the
//! world model is borrowed mutably for the duration of the call and no
//! state escapes it except the finished frame.
//! ----------------------------------------------------------------------------

use thiserror::Error;

use crate::defs::{SurfaceFlags, contents_is_liquid};
use crate::engine::cache::{CacheError, SurfaceCache};
use crate::engine::draw;
use crate::engine::light::LightSystem;
use crate::engine::sky::SkyCanvas;
use crate::engine::types::{
    ESpan, IEdge, ISurface, MAX_PIXEL_HEIGHT, MAX_SPAN, NONE, NUM_STACK_EDGE, NUM_STACK_SURFACE,
    SURF_BACKGROUND,
};
use crate::engine::warp::warp_screen;
use crate::world::{BrushModel, Camera, Colormap};

/// The framebuffer the platform hands in: 8-bit palettized pixels plus a
/// float z-buffer of the same dimensions.
pub struct RenderBuffer {
    pub width: usize,
    pub height: usize,
    pub bytes_per_row: usize,
    pub pixels: Vec<u8>,
    pub zbuffer: Vec<f32>,
}

impl RenderBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        RenderBuffer {
            width,
            height,
            bytes_per_row: width,
            pixels: vec![0; width * height],
            zbuffer: vec![0.0; width * height],
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("render target {width}x{height} unsupported (height cap {max})")]
    BadTarget {
        width: usize,
        height: usize,
        max: usize,
    },
}

pub struct Renderer {
    pub(crate) frame_count: i32,
    pub(crate) pvs_count: i32,
    pub(crate) old_view_leaf: Option<u32>,
    pub(crate) view_leaf: u32,
    pub(crate) time: f32,

    /* per-frame arenas; slots 0..4 / 0..2 are reserved sentinels */
    pub(crate) iedges: Vec<IEdge>,
    pub(crate) isurfaces: Vec<ISurface>,
    pub(crate) isurface_limit: usize,
    pub(crate) spans: Vec<ESpan>,
    /// Head of the singly-linked bucket of edges starting on scanline y.
    pub(crate) new_edges: Vec<u32>,
    /// Head of the chain of edges retiring after scanline y.
    pub(crate) remove_edges: Vec<u32>,

    pub(crate) nearest_invz: f32,
    pub(crate) current_key: i32,
    pub(crate) out_of_iedges: u32,
    pub(crate) surface_count: u32,

    /// Palette index pixels fall back to where no surface lands.
    pub clear_color: u8,
    pub lights: LightSystem,
    pub(crate) sky: Option<SkyCanvas>,
    pub(crate) cache: SurfaceCache,
    pub(crate) colormap: Colormap,

    warp_scratch: Vec<u8>,
    pub(crate) vis_scratch: Vec<u8>,
}

impl Renderer {
    /// Build a renderer for a given output resolution; the surface cache
    /// is sized with the traditional `16 * w * h` heuristic.
    pub fn new(width: usize, height: usize, colormap: Colormap) -> Self {
        Renderer {
            frame_count: 0,
            pvs_count: 0,
            old_view_leaf: None,
            view_leaf: 0,
            time: 0.0,
            iedges: Vec::with_capacity(NUM_STACK_EDGE),
            isurfaces: Vec::with_capacity(NUM_STACK_SURFACE),
            isurface_limit: NUM_STACK_SURFACE,
            spans: Vec::with_capacity(MAX_SPAN),
            new_edges: vec![NONE; height],
            remove_edges: vec![NONE; height],
            nearest_invz: 0.0,
            current_key: 0,
            out_of_iedges: 0,
            surface_count: 0,
            clear_color: 2,
            lights: LightSystem::with_default_styles(),
            sky: None,
            cache: SurfaceCache::new(SurfaceCache::size_for_resolution(width, height)),
            colormap,
            warp_scratch: Vec::new(),
            vis_scratch: Vec::new(),
        }
    }

    /// Bind a freshly loaded world: unpack its sky texture (if any) and
    /// forget every cached surface of the previous world.
    pub fn set_world(&mut self, model: &BrushModel) {
        self.sky = model
            .textures
            .iter()
            .find(|t| t.name.starts_with("sky"))
            .and_then(SkyCanvas::from_texture);
        self.cache.reset();
        self.old_view_leaf = None;
        log::info!(
            "world bound: {} surfaces, {} leaves, sky {}",
            model.surfaces.len(),
            model.leaves.len(),
            if self.sky.is_some() { "yes" } else { "no" }
        );
    }

    /// Render one frame into `target`.  `dt` advances the animation
    /// clock; the camera's angles are re-derived here so the host only
    /// moves `position` and `angles`.
    pub fn render_view(
        &mut self,
        model: &mut BrushModel,
        camera: &mut Camera,
        target: &mut RenderBuffer,
        dt: f32,
    ) -> Result<(), RenderError> {
        self.time += dt;
        self.frame_count += 1;

        /* 1 - frame setup */
        camera.update_vectors();
        camera.transform_frustum();
        camera.setup_frustum_indices();

        self.old_view_leaf = (self.frame_count > 1).then_some(self.view_leaf);
        self.view_leaf = model.find_leaf(camera.position);

        self.lights.animate(self.time);
        self.lights.mark_lights(model, self.frame_count);

        self.update_visible_leaves(model);

        if let Some(sky) = &mut self.sky {
            sky.setup_frame();
            sky.animate();
        }

        /* 2..4 - edge drawing */
        self.setup_edge_frame(target)?;
        self.render_world(model, camera);
        self.scan_edges(model, camera, target)?;

        /* 5 - post-process */
        if contents_is_liquid(model.leaves[self.view_leaf as usize].contents) {
            warp_screen(
                &mut target.pixels,
                &mut self.warp_scratch,
                target.width,
                target.height,
                self.time,
            );
        }

        self.lights.decay_lights(dt);

        if self.out_of_iedges > 0 {
            log::warn!(
                "edge pool exhausted, {} edges dropped this frame",
                self.out_of_iedges
            );
        }
        Ok(())
    }

    /// Reset the per-frame arenas and scanline buckets.
    pub(crate) fn setup_edge_frame(&mut self, target: &RenderBuffer) -> Result<(), RenderError> {
        if target.height == 0 || target.height > MAX_PIXEL_HEIGHT || target.width == 0 {
            return Err(RenderError::BadTarget {
                width: target.width,
                height: target.height,
                max: MAX_PIXEL_HEIGHT,
            });
        }

        self.iedges.clear();
        // head, tail, after-tail and guard sentinels; scan_edges fills in
        // their links and bounds
        for _ in 0..4 {
            self.iedges.push(IEdge::default());
        }

        self.isurfaces.clear();
        // slot 0 is the "no surface" dummy, slot 1 the background
        self.isurfaces.push(ISurface::default());
        self.isurfaces.push(ISurface {
            flags: SurfaceFlags::DRAW_BACKGROUND,
            key: i32::MAX,
            ..Default::default()
        });

        self.spans.clear();

        self.new_edges.clear();
        self.new_edges.resize(target.height, NONE);
        self.remove_edges.clear();
        self.remove_edges.resize(target.height, NONE);

        self.current_key = 0;
        self.nearest_invz = 0.0;
        self.out_of_iedges = 0;
        self.surface_count = 0;
        Ok(())
    }

    /// Draw every surface that accumulated spans, picking the drawer by
    /// surface kind; shared by the mid-frame flush and the final pass.
    pub(crate) fn draw_surfaces(
        &mut self,
        model: &mut BrushModel,
        camera: &Camera,
        target: &mut RenderBuffer,
    ) -> Result<(), RenderError> {
        for index in SURF_BACKGROUND as usize..self.isurfaces.len() {
            let isurf = self.isurfaces[index];
            if isurf.spans == NONE {
                continue;
            }
            let zi = (isurf.zi_stepx, isurf.zi_stepy, isurf.zi_start);

            if isurf.flags.contains(SurfaceFlags::DRAW_SKY) {
                if let Some(sky) = &self.sky {
                    draw::draw_spans_sky(
                        &self.spans,
                        isurf.spans,
                        camera,
                        sky,
                        &mut target.pixels,
                        target.bytes_per_row,
                    );
                } else {
                    draw::draw_spans_solid(
                        &self.spans,
                        isurf.spans,
                        self.clear_color,
                        &mut target.pixels,
                        target.bytes_per_row,
                    );
                }
                draw::draw_spans_z(&self.spans, isurf.spans, zi, &mut target.zbuffer, target.width);
            } else if isurf.flags.contains(SurfaceFlags::DRAW_BACKGROUND) {
                draw::draw_spans_solid(
                    &self.spans,
                    isurf.spans,
                    self.clear_color,
                    &mut target.pixels,
                    target.bytes_per_row,
                );
                // the background sits at infinity
                draw::draw_spans_z(
                    &self.spans,
                    isurf.spans,
                    (0.0, 0.0, 0.0),
                    &mut target.zbuffer,
                    target.width,
                );
            } else if isurf.flags.contains(SurfaceFlags::DRAW_TURB) {
                let surface = &model.surfaces[isurf.data as usize];
                let tex_info = &model.tex_infos[surface.tex_info as usize];
                let texture = &model.textures[tex_info.texture as usize];
                // liquids always draw from mip 0 and wrap at 64 texels
                if texture.mips[0].len() >= 64 * 64 {
                    let g = draw::calc_gradients(
                        camera,
                        tex_info,
                        surface.uv_min,
                        surface.uv_extents,
                        0,
                        zi,
                    );
                    draw::draw_spans_turbulent(
                        &self.spans,
                        isurf.spans,
                        &g,
                        &texture.mips[0],
                        self.time,
                        &mut target.pixels,
                        target.bytes_per_row,
                    );
                } else {
                    draw::draw_spans_solid(
                        &self.spans,
                        isurf.spans,
                        self.clear_color,
                        &mut target.pixels,
                        target.bytes_per_row,
                    );
                }
                draw::draw_spans_z(&self.spans, isurf.spans, zi, &mut target.zbuffer, target.width);
            } else {
                let surf_idx = isurf.data as usize;
                let tex_info_idx = model.surfaces[surf_idx].tex_info as usize;
                let mip_adjust = model.tex_infos[tex_info_idx].mip_adjust;
                // the thresholds are tuned against a hundredth of the
                // projected scale at the surface's nearest point
                let scale = isurf.nearest_invz * camera.scale_z * 0.01 * mip_adjust;
                let mip = draw::mip_level_for_scale(scale);

                let block = self.cache.cache_surface(
                    model,
                    surf_idx,
                    mip,
                    &mut self.lights,
                    self.frame_count,
                    &self.colormap,
                )?;

                let surface = &model.surfaces[surf_idx];
                let tex_info = &model.tex_infos[surface.tex_info as usize];
                let g = draw::calc_gradients(
                    camera,
                    tex_info,
                    surface.uv_min,
                    surface.uv_extents,
                    mip,
                    zi,
                );
                let (source, cache_width) = self.cache.block_pixels(block);
                draw::draw_spans_opaque(
                    &self.spans,
                    isurf.spans,
                    &g,
                    source,
                    cache_width,
                    &mut target.pixels,
                    target.bytes_per_row,
                );
                draw::draw_spans_z(&self.spans, isurf.spans, zi, &mut target.zbuffer, target.width);
            }
        }
        Ok(())
    }
}

/*======================================================================*/
/*                               Tests                                  */
/*======================================================================*/
