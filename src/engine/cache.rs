//! ----------------------------------------------------------------------------
//! **Surface cache**
//!
//! Materialising a face's lit texture (texture texels convolved with the
//! interpolated lightmap through the colormap) is the most expensive step
//! of the pipeline, so the result is kept in a fixed-size byte buffer and
//! reused across frames while the lighting is unchanged.
//!
//! The allocator is a *rover ring*: blocks tile the whole buffer, the
//! rover sweeps forward, and whatever it passes over is evicted.  Hot
//! surfaces re-insert themselves ahead of the rover every frame; cold
//! ones get overwritten.  This is deliberately not an LRU - there is no
//! bookkeeping beyond the block list itself.
//! ----------------------------------------------------------------------------

use thiserror::Error;

use crate::defs::MAX_LIGHT_MAPS;
use crate::engine::light::LightSystem;
use crate::world::{BrushModel, Colormap, Surface};

/// Accounting size of a block header; the split threshold and the
/// allocation rounding both count it.
pub const CACHE_HEADER_SIZE: usize = 64;

/// A trailing fragment larger than this becomes its own free block.
const MIN_FRAGMENT: usize = CACHE_HEADER_SIZE + 256;

/// Guard word kept past the end of the buffer to detect overruns.
const GUARD: [u8; 4] = *b"CSWL";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// A single lit texture is larger than the whole cache: fatal, the
    /// cache can never make progress.
    #[error("surface cache too small: block of {needed} bytes, cache holds {cache}")]
    BlockTooBig { needed: usize, cache: usize },

    /// The tail guard word was overwritten or the block list broke.
    #[error("surface cache corrupted")]
    Corrupted,
}

/// One region of the cache buffer.  `size` includes the header
/// accounting; the payload lives at `offset + CACHE_HEADER_SIZE`.
#[derive(Clone, Copy, Debug)]
struct Block {
    offset: usize,
    size: usize,
    /// Back-reference to the `(surface, mip)` cachespot pointing here;
    /// cleared through this tag when the rover evicts the block.
    owner: Option<(u32, usize)>,
    texture: u32,
    bright_adjusts: [i32; MAX_LIGHT_MAPS],
    dlight: bool,
    width: usize,
    height: usize,
}

impl Block {
    fn free(offset: usize, size: usize) -> Self {
        Block {
            offset,
            size,
            owner: None,
            texture: 0,
            bright_adjusts: [0; MAX_LIGHT_MAPS],
            dlight: false,
            width: 0,
            height: 0,
        }
    }
}

pub struct SurfaceCache {
    size: usize,
    /// `size` payload bytes plus the guard word.
    data: Vec<u8>,
    /// Blocks sorted by offset, tiling `[0, size)` exactly.
    blocks: Vec<Block>,
    /// Byte offset the next allocation starts searching from; always a
    /// block boundary (or `size`, which wraps).
    rover: usize,
}

impl SurfaceCache {
    /// The traditional sizing heuristic for a given output resolution.
    pub fn size_for_resolution(width: usize, height: usize) -> usize {
        16 * width * height
    }

    pub fn new(size: usize) -> Self {
        assert!(size > CACHE_HEADER_SIZE, "surface cache absurdly small");
        let mut data = vec![0u8; size + GUARD.len()];
        data[size..].copy_from_slice(&GUARD);
        SurfaceCache {
            size,
            data,
            blocks: vec![Block::free(0, size)],
            rover: 0,
        }
    }

    /// Forget every block without touching cachespots; used when the
    /// world that owned them is being discarded anyway.
    pub fn reset(&mut self) {
        self.blocks = vec![Block::free(0, self.size)];
        self.rover = 0;
    }

    /// Drop every cached block, e.g. after a mode change or palette remap.
    pub fn flush(&mut self, surfaces: &mut [Surface]) {
        for block in &mut self.blocks {
            if let Some((s, m)) = block.owner.take() {
                surfaces[s as usize].cachespots[m] = None;
            }
        }
        self.blocks = vec![Block::free(0, self.size)];
        self.rover = 0;
        log::debug!("surface cache flushed ({} bytes)", self.size);
    }

    /// Pixels and row width of the block at `offset`.
    pub fn block_pixels(&self, offset: usize) -> (&[u8], usize) {
        let block = &self.blocks[self.block_index(offset)];
        let start = block.offset + CACHE_HEADER_SIZE;
        (
            &self.data[start..start + block.width * block.height],
            block.width,
        )
    }

    fn block_index(&self, offset: usize) -> usize {
        self.blocks
            .binary_search_by_key(&offset, |b| b.offset)
            .expect("cache offset is not a block boundary")
    }

    /*────────────────────────── allocation ───────────────────────────*/

    /// Claim a block for a `width` x `height` lit texture, evicting
    /// whatever the rover rolls over.
    fn alloc(
        &mut self,
        surfaces: &mut [Surface],
        width: usize,
        height: usize,
    ) -> Result<usize, CacheError> {
        let total = (width * height + CACHE_HEADER_SIZE + 3) & !3;
        if total > self.size {
            return Err(CacheError::BlockTooBig {
                needed: total,
                cache: self.size,
            });
        }
        if self.data[self.size..] != GUARD {
            return Err(CacheError::Corrupted);
        }

        // not enough room between the rover and the end: wrap
        if self.rover > self.size - total {
            self.rover = 0;
        }

        let index = self.block_index(self.rover);
        if let Some((s, m)) = self.blocks[index].owner.take() {
            surfaces[s as usize].cachespots[m] = None;
        }

        // coalesce successors until the block is big enough
        while self.blocks[index].size < total {
            if index + 1 >= self.blocks.len() {
                return Err(CacheError::Corrupted);
            }
            let absorbed = self.blocks.remove(index + 1);
            if let Some((s, m)) = absorbed.owner {
                surfaces[s as usize].cachespots[m] = None;
            }
            self.blocks[index].size += absorbed.size;
        }

        let offset = self.blocks[index].offset;
        let leftover = self.blocks[index].size - total;
        if leftover > MIN_FRAGMENT {
            self.blocks[index].size = total;
            self.blocks
                .insert(index + 1, Block::free(offset + total, leftover));
            self.rover = offset + total;
        } else {
            self.rover = offset + self.blocks[index].size;
        }

        let block = &mut self.blocks[index];
        block.owner = None;
        block.width = width;
        block.height = height;
        Ok(offset)
    }

    /*──────────────────────── surface caching ────────────────────────*/

    /// Return a block holding the lit texture of `surf_idx` at `mip`,
    /// building it unless the cached copy is still valid: a cachespot
    /// exists, neither the old nor the new frame has a dynamic light on
    /// the face, and all four style brightnesses are unchanged.
    pub fn cache_surface(
        &mut self,
        model: &mut BrushModel,
        surf_idx: usize,
        mip: usize,
        lights: &mut LightSystem,
        framecount: i32,
        colormap: &Colormap,
    ) -> Result<usize, CacheError> {
        let surface = &model.surfaces[surf_idx];
        let texture_id = model.tex_infos[surface.tex_info as usize].texture;
        let dlight = surface.light_frame == framecount;

        let mut adjusts = [0i32; MAX_LIGHT_MAPS];
        for (adj, &style) in adjusts.iter_mut().zip(surface.styles.iter()) {
            *adj = lights.style_value(style as usize);
        }

        if let Some(offset) = surface.cachespots[mip] {
            let block = &self.blocks[self.block_index(offset as usize)];
            if !block.dlight
                && !dlight
                && block.texture == texture_id
                && block.bright_adjusts == adjusts
            {
                return Ok(offset as usize);
            }
        }

        let width = (surface.uv_extents[0] >> mip) as usize;
        let height = (surface.uv_extents[1] >> mip) as usize;

        let offset = self.alloc(&mut model.surfaces, width, height)?;
        {
            let block_index = self.block_index(offset);
            let block = &mut self.blocks[block_index];
            block.owner = Some((surf_idx as u32, mip));
            block.texture = texture_id;
            block.bright_adjusts = adjusts;
            block.dlight = dlight;
        }
        model.surfaces[surf_idx].cachespots[mip] = Some(offset as u32);

        let (smax, _tmax) = lights.build_block_lights(model, surf_idx, framecount);
        self.draw_surface_block(model, surf_idx, mip, offset, smax, &lights.blocklights, colormap);

        Ok(offset)
    }

    /// Fill a freshly allocated block: walk the face in 16-texel (shifted
    /// by mip) cells, bilinearly interpolating the corner block-lights
    /// across each cell while pushing texels through the colormap.
    #[allow(clippy::too_many_arguments)]
    fn draw_surface_block(
        &mut self,
        model: &BrushModel,
        surf_idx: usize,
        mip: usize,
        offset: usize,
        smax: usize,
        blocklights: &[i32],
        colormap: &Colormap,
    ) {
        let surface = &model.surfaces[surf_idx];
        let texture_id = model.tex_infos[surface.tex_info as usize].texture;
        let (src, tex_w, tex_h) = model.textures[texture_id as usize].mip(mip);
        let (tex_w, tex_h) = (tex_w as usize, tex_h as usize);

        let width = (surface.uv_extents[0] >> mip) as usize;
        let height = (surface.uv_extents[1] >> mip) as usize;
        let cell = 16usize >> mip;
        let cell_shift = 4 - mip as u32;
        let hblocks = width / cell;
        let vblocks = height / cell;

        // source texel origin, wrapped into the mip's dimensions
        let s_origin = ((surface.uv_min[0] as i32 >> mip).rem_euclid(tex_w as i32)) as usize;
        let t_origin = ((surface.uv_min[1] as i32 >> mip).rem_euclid(tex_h as i32)) as usize;

        let dest_base = offset + CACHE_HEADER_SIZE;
        let dest = &mut self.data[dest_base..dest_base + width * height];

        let mut s_off = s_origin;
        for u in 0..hblocks {
            let mut src_row = t_origin;
            let mut dest_row = u * cell;

            for v in 0..vblocks {
                let mut light_left = blocklights[v * smax + u];
                let mut light_right = blocklights[v * smax + u + 1];
                let left_step = (blocklights[(v + 1) * smax + u] - light_left) >> cell_shift;
                let right_step = (blocklights[(v + 1) * smax + u + 1] - light_right) >> cell_shift;

                for _ in 0..cell {
                    // texel light runs right to left inside the cell
                    let light_step = (light_left - light_right) >> cell_shift;
                    let mut light = light_right;
                    for b in (0..cell).rev() {
                        let pix = src[src_row * tex_w + s_off + b];
                        dest[dest_row + b] = colormap.shade(light, pix);
                        light += light_step;
                    }

                    src_row += 1;
                    if src_row >= tex_h {
                        src_row = 0;
                    }
                    dest_row += width;
                    light_left += left_step;
                    light_right += right_step;
                }
            }

            s_off += cell;
            if s_off >= tex_w {
                s_off = 0;
            }
        }
    }
}

/*======================================================================*/
/*                               Tests                                  */
/*======================================================================*/
