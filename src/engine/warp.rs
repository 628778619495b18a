//! Underwater screen warp: after the scanline pass, the framebuffer is
//! copied through a sine distortion of both axes.  The image is stretched
//! by `w / (w + 2 * amplitude)` so the wobble never reads outside the
//! frame, and the copy goes through a scratch buffer so the distortion is
//! safe to apply in place.

use once_cell::sync::Lazy;

use crate::engine::draw::TURB_SPEED;

/// Warp amplitude in pixels; peak displacement is twice this.
const WARP_AMP: i32 = 3;
const WARP_CYCLE: usize = 128;

/// Small integer sine table: values in `0 ..= 2 * WARP_AMP`.
static INT_SIN_TABLE: Lazy<[i32; WARP_CYCLE * 2]> = Lazy::new(|| {
    let mut table = [0i32; WARP_CYCLE * 2];
    for (i, v) in table.iter_mut().enumerate() {
        let s = (i as f32 * std::f32::consts::TAU / WARP_CYCLE as f32).sin();
        *v = WARP_AMP + (s * WARP_AMP as f32).round() as i32;
    }
    table
});

/// Warp `pixels` (a `width` x `height` 8-bit frame) in place, using
/// `scratch` as the temporary copy of the undistorted frame.
pub fn warp_screen(pixels: &mut [u8], scratch: &mut Vec<u8>, width: usize, height: usize, time: f32) {
    scratch.clear();
    scratch.extend_from_slice(pixels);

    let pad = (WARP_AMP * 2) as usize;

    // remap tables: destination coordinate plus wobble -> source coordinate,
    // squeezed so coordinate + 2*amp stays in range
    let mut rows = vec![0usize; height + pad];
    for (v, row) in rows.iter_mut().enumerate() {
        *row = v * height / (height + pad);
    }
    let mut cols = vec![0usize; width + pad];
    for (u, col) in cols.iter_mut().enumerate() {
        *col = u * width / (width + pad);
    }

    let turb = &INT_SIN_TABLE[(time * TURB_SPEED) as usize & (WARP_CYCLE - 1)..];

    for v in 0..height {
        let dest = &mut pixels[v * width..(v + 1) * width];
        for (u, pixel) in dest.iter_mut().enumerate() {
            let src_row = rows[v + turb[u & (WARP_CYCLE - 1)] as usize];
            let src_col = cols[u + turb[v & (WARP_CYCLE - 1)] as usize];
            *pixel = scratch[src_row * width + src_col];
        }
    }
}

/*======================================================================*/
/*                               Tests                                  */
/*======================================================================*/
