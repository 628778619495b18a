//! ----------------------------------------------------------------------------
//! **Span drawers**
//!
//! Three perspective-correct drawers consume a surface's span list:
//! * opaque lit textures, one reciprocal per 8 pixels,
//! * turbulent liquids, one per 16 pixels plus a sine warp,
//! * sky, sampled from the composite canvas at 32-pixel intervals.
//!
//! Between reciprocals, texture coordinates interpolate linearly in 16.16
//! fixed point.  A float z-span writer runs alongside so later composition
//! passes can depth-test against the frame.
//! ----------------------------------------------------------------------------

use once_cell::sync::Lazy;

use crate::engine::sky::SkyCanvas;
use crate::engine::types::{ESpan, Fixed16, NONE};
use crate::world::{Camera, TexInfo};

/// Turbulence cycle length in pixels (and sine-table period).
pub const TURB_CYCLE: usize = 128;
/// Texture warp amplitude, 16.16.
const TURB_AMP: i32 = 8 << 16;
/// Sine-table advance in entries per second.
pub const TURB_SPEED: f32 = 20.0;
/// Liquid textures wrap at 64 texels.
const TURB_TEX_MASK: i32 = 63;

/// 16.16 sine table for the texture warp; two cycles so a wrapped start
/// offset can index a full cycle without masking twice.
static SIN_TABLE: Lazy<[i32; TURB_CYCLE * 2]> = Lazy::new(|| {
    let mut table = [0i32; TURB_CYCLE * 2];
    for (i, v) in table.iter_mut().enumerate() {
        let s = (i as f32 * std::f32::consts::TAU / TURB_CYCLE as f32).sin();
        *v = TURB_AMP + (s * TURB_AMP as f32) as i32;
    }
    table
});

/// Per-surface texture-mapping gradients, rebuilt whenever a surface is
/// drawn: everything the inner loops need to turn `(x, y, 1/z)` into
/// texel fetches.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gradients {
    pub uinvz_stepx: f32,
    pub uinvz_stepy: f32,
    pub uinvz_origin: f32,
    pub vinvz_stepx: f32,
    pub vinvz_stepy: f32,
    pub vinvz_origin: f32,

    pub zi_stepx: f32,
    pub zi_stepy: f32,
    pub zi_origin: f32,

    /// 16.16 offsets folding in the camera displacement along the texture
    /// axes, the texture offset and `uv_min >> mip`.
    pub u_adjust: Fixed16,
    pub v_adjust: Fixed16,
    /// Inclusive 16.16 clamp bounds, `(uv_extents << 16 >> mip) - 1`.
    pub u_extent: Fixed16,
    pub v_extent: Fixed16,
}

/// Build the gradients for one surface at one mip level.
///
/// The u/z, v/z screen steps are the texture axes rotated into view space
/// and scaled by `1/scale_z`; the y step is negated because screen y grows
/// downward.  `zi` is the surface's plane-equation 1/z triple
/// `(stepx, stepy, origin)` computed by the face emitter.
pub fn calc_gradients(
    camera: &Camera,
    tex_info: &TexInfo,
    uv_min: [i16; 2],
    uv_extents: [i16; 2],
    mip: usize,
    zi: (f32, f32, f32),
) -> Gradients {
    let mipscale = 1.0 / (1 << mip) as f32;

    let u_axis = camera.transform_direction(tex_info.u_axis);
    let v_axis = camera.transform_direction(tex_info.v_axis);

    let t = camera.scale_invz * mipscale;
    let uinvz_stepx = u_axis.x * t;
    let vinvz_stepx = v_axis.x * t;
    let uinvz_stepy = -u_axis.y * t;
    let vinvz_stepy = -v_axis.y * t;

    let center = camera.screen_center;
    let uinvz_origin = u_axis.z * mipscale - center.x * uinvz_stepx - center.y * uinvz_stepy;
    let vinvz_origin = v_axis.z * mipscale - center.x * vinvz_stepx - center.y * vinvz_stepy;

    // dot products are rotation-invariant, so the camera displacement
    // along the texture axes can be taken in world space directly
    let t16 = 65536.0 * mipscale;
    let u_adjust = (camera.position.dot(tex_info.u_axis) * t16 + 0.5) as i32
        + (tex_info.u_offset * t16) as i32
        - (((uv_min[0] as i32) << 16) >> mip);
    let v_adjust = (camera.position.dot(tex_info.v_axis) * t16 + 0.5) as i32
        + (tex_info.v_offset * t16) as i32
        - (((uv_min[1] as i32) << 16) >> mip);

    Gradients {
        uinvz_stepx,
        uinvz_stepy,
        uinvz_origin,
        vinvz_stepx,
        vinvz_stepy,
        vinvz_origin,
        zi_stepx: zi.0,
        zi_stepy: zi.1,
        zi_origin: zi.2,
        u_adjust,
        v_adjust,
        // -1 so interpolation overshoot can never read past the mipmap
        u_extent: (((uv_extents[0] as i32) << 16) >> mip) - 1,
        v_extent: (((uv_extents[1] as i32) << 16) >> mip) - 1,
    }
}

/// Pick a mip level from the projected scale of the nearest surface point.
pub fn mip_level_for_scale(scale: f32) -> usize {
    if scale >= 1.0 {
        0
    } else if scale >= 0.4 {
        1
    } else if scale >= 0.2 {
        2
    } else {
        3
    }
}

#[inline]
fn walk_spans(pool: &[ESpan], mut head: u32, mut body: impl FnMut(ESpan)) {
    while head != NONE {
        let span = pool[head as usize];
        body(span);
        head = span.next;
    }
}

/*──────────────────────────── opaque drawer ──────────────────────────*/

/// Draw a lit, cached texture with one perspective divide per 8 pixels.
#[allow(clippy::too_many_arguments)]
pub fn draw_spans_opaque(
    pool: &[ESpan],
    head: u32,
    g: &Gradients,
    source: &[u8],
    source_width: usize,
    pixels: &mut [u8],
    stride: usize,
) {
    let uinvz_step8 = g.uinvz_stepx * 8.0;
    let vinvz_step8 = g.vinvz_stepx * 8.0;
    let zi_step8 = g.zi_stepx * 8.0;

    walk_spans(pool, head, |span| {
        let mut count = span.count;
        if count <= 0 {
            return;
        }
        let du = span.x_start as f32;
        let dv = span.y as f32;

        let mut uinvz = g.uinvz_origin + dv * g.uinvz_stepy + du * g.uinvz_stepx;
        let mut vinvz = g.vinvz_origin + dv * g.vinvz_stepy + du * g.vinvz_stepx;
        let mut zi = g.zi_origin + dv * g.zi_stepy + du * g.zi_stepx;
        // prescale the reciprocal into 16.16
        let mut z = 65536.0 / zi;

        let mut s = ((uinvz * z) as i32 + g.u_adjust).clamp(0, g.u_extent);
        let mut t = ((vinvz * z) as i32 + g.v_adjust).clamp(0, g.v_extent);
        let mut snext = s;
        let mut tnext = t;
        let mut sstep = 0i32;
        let mut tstep = 0i32;

        let mut dest = span.y as usize * stride + span.x_start as usize;

        loop {
            let spancount = count.min(8);
            count -= spancount;

            if count > 0 {
                // step a full 8 pixels ahead and interpolate between
                uinvz += uinvz_step8;
                vinvz += vinvz_step8;
                zi += zi_step8;
                z = 65536.0 / zi;
                // low clamp of 8 guards <0 steps against rounding off the
                // left texture edge mid-span
                snext = ((uinvz * z) as i32 + g.u_adjust).clamp(8, g.u_extent);
                tnext = ((vinvz * z) as i32 + g.v_adjust).clamp(8, g.v_extent);
                sstep = (snext - s) >> 3;
                tstep = (tnext - t) >> 3;
            } else if spancount > 1 {
                // tail: evaluate at the last pixel and divide
                let cm1 = (spancount - 1) as f32;
                uinvz += g.uinvz_stepx * cm1;
                vinvz += g.vinvz_stepx * cm1;
                zi += g.zi_stepx * cm1;
                z = 65536.0 / zi;
                snext = ((uinvz * z) as i32 + g.u_adjust).clamp(8, g.u_extent);
                tnext = ((vinvz * z) as i32 + g.v_adjust).clamp(8, g.v_extent);
                sstep = (snext - s) / (spancount - 1);
                tstep = (tnext - t) / (spancount - 1);
            }

            for _ in 0..spancount {
                pixels[dest] = source[(t >> 16) as usize * source_width + (s >> 16) as usize];
                dest += 1;
                s += sstep;
                t += tstep;
            }
            s = snext;
            t = tnext;

            if count <= 0 {
                break;
            }
        }
    });
}

/*─────────────────────────── turbulent drawer ────────────────────────*/

/// Draw a liquid surface: 16-pixel reciprocal stride, a sine-table
/// distortion of each coordinate by the other, wrap at 64 texels.
#[allow(clippy::too_many_arguments)]
pub fn draw_spans_turbulent(
    pool: &[ESpan],
    head: u32,
    g: &Gradients,
    source: &[u8],
    time: f32,
    pixels: &mut [u8],
    stride: usize,
) {
    let turb = &SIN_TABLE[(time * TURB_SPEED) as usize & (TURB_CYCLE - 1)..];

    let uinvz_step16 = g.uinvz_stepx * 16.0;
    let vinvz_step16 = g.vinvz_stepx * 16.0;
    let zi_step16 = g.zi_stepx * 16.0;

    walk_spans(pool, head, |span| {
        let mut count = span.count;
        if count <= 0 {
            return;
        }
        let du = span.x_start as f32;
        let dv = span.y as f32;

        let mut uinvz = g.uinvz_origin + dv * g.uinvz_stepy + du * g.uinvz_stepx;
        let mut vinvz = g.vinvz_origin + dv * g.vinvz_stepy + du * g.vinvz_stepx;
        let mut zi = g.zi_origin + dv * g.zi_stepy + du * g.zi_stepx;
        let mut z = 65536.0 / zi;

        let mut s = (uinvz * z) as i32 + g.u_adjust;
        let mut t = (vinvz * z) as i32 + g.v_adjust;
        let mut snext = s;
        let mut tnext = t;
        let mut sstep = 0i32;
        let mut tstep = 0i32;

        let mut dest = span.y as usize * stride + span.x_start as usize;

        loop {
            let spancount = count.min(16);
            count -= spancount;

            if count > 0 {
                uinvz += uinvz_step16;
                vinvz += vinvz_step16;
                zi += zi_step16;
                z = 65536.0 / zi;
                snext = (uinvz * z) as i32 + g.u_adjust;
                tnext = (vinvz * z) as i32 + g.v_adjust;
                sstep = (snext - s) >> 4;
                tstep = (tnext - t) >> 4;
            } else if spancount > 1 {
                let cm1 = (spancount - 1) as f32;
                uinvz += g.uinvz_stepx * cm1;
                vinvz += g.vinvz_stepx * cm1;
                zi += g.zi_stepx * cm1;
                z = 65536.0 / zi;
                snext = (uinvz * z) as i32 + g.u_adjust;
                tnext = (vinvz * z) as i32 + g.v_adjust;
                sstep = (snext - s) / (spancount - 1);
                tstep = (tnext - t) / (spancount - 1);
            }

            for _ in 0..spancount {
                let sturb =
                    ((s + turb[((t >> 16) & (TURB_CYCLE as i32 - 1)) as usize]) >> 16)
                        & TURB_TEX_MASK;
                let tturb =
                    ((t + turb[((s >> 16) & (TURB_CYCLE as i32 - 1)) as usize]) >> 16)
                        & TURB_TEX_MASK;
                pixels[dest] = source[(tturb << 6 | sturb) as usize];
                dest += 1;
                s += sstep;
                t += tstep;
            }
            s = snext;
            t = tnext;

            if count <= 0 {
                break;
            }
        }
    });
}

/*────────────────────────────── sky drawer ───────────────────────────*/

const SKY_SPAN_SHIFT: i32 = 5;
const SKY_SPAN_MAX: i32 = 1 << SKY_SPAN_SHIFT;
/// Multiplier mapping a unit direction into sky texels.
const SKY_SCALE: f32 = 320.0;

/// Sky-space 16.16 coordinates of the ray through pixel `(x, y)`.
fn sky_uv(x: i32, y: i32, camera: &Camera, shift: f32) -> (Fixed16, Fixed16) {
    let wu = x as f32 - camera.screen_center.x;
    let wv = camera.screen_center.y - y as f32;

    let mut dir = camera.scale_z * camera.roty + wu * camera.rotx + wv * camera.rotz;
    // flatten the horizon so the sky dome reads as distant
    dir.z *= 3.0;
    dir = dir.normalize();

    (
        ((shift + SKY_SCALE * dir.x) * 65536.0) as i32,
        ((shift + SKY_SCALE * dir.y) * 65536.0) as i32,
    )
}

/// Draw sky spans: exact directions every 32 pixels, linear in between.
pub fn draw_spans_sky(
    pool: &[ESpan],
    head: u32,
    camera: &Camera,
    sky: &SkyCanvas,
    pixels: &mut [u8],
    stride: usize,
) {
    let shift = sky.shift();

    walk_spans(pool, head, |span| {
        let mut count = span.count;
        if count <= 0 {
            return;
        }
        let mut x = span.x_start;
        let (mut s, mut t) = sky_uv(x, span.y, camera, shift);
        let mut snext = s;
        let mut tnext = t;
        let mut sstep = 0i32;
        let mut tstep = 0i32;

        let mut dest = span.y as usize * stride + span.x_start as usize;

        loop {
            let spancount = count.min(SKY_SPAN_MAX);
            count -= spancount;

            if count > 0 {
                x += SKY_SPAN_MAX;
                (snext, tnext) = sky_uv(x, span.y, camera, shift);
                sstep = (snext - s) >> SKY_SPAN_SHIFT;
                tstep = (tnext - t) >> SKY_SPAN_SHIFT;
            } else if spancount > 1 {
                x += spancount - 1;
                (snext, tnext) = sky_uv(x, span.y, camera, shift);
                sstep = (snext - s) / (spancount - 1);
                tstep = (tnext - t) / (spancount - 1);
            }

            for _ in 0..spancount {
                pixels[dest] = sky.sample(s, t);
                dest += 1;
                s += sstep;
                t += tstep;
            }
            s = snext;
            t = tnext;

            if count <= 0 {
                break;
            }
        }
    });
}

/*──────────────────────────── z and solid ────────────────────────────*/

/// Write the surface's planar 1/z across its spans.
pub fn draw_spans_z(
    pool: &[ESpan],
    head: u32,
    zi: (f32, f32, f32),
    zbuffer: &mut [f32],
    width: usize,
) {
    let (zi_stepx, zi_stepy, zi_origin) = zi;
    walk_spans(pool, head, |span| {
        let mut invz = zi_origin + span.y as f32 * zi_stepy + span.x_start as f32 * zi_stepx;
        let base = span.y as usize * width + span.x_start as usize;
        for zpixel in &mut zbuffer[base..base + span.count.max(0) as usize] {
            *zpixel = invz;
            invz += zi_stepx;
        }
    });
}

/// Flat-fill the spans with one palette index (the background surface).
pub fn draw_spans_solid(pool: &[ESpan], head: u32, color: u8, pixels: &mut [u8], stride: usize) {
    walk_spans(pool, head, |span| {
        let base = span.y as usize * stride + span.x_start as usize;
        pixels[base..base + span.count.max(0) as usize].fill(color);
    });
}

/*======================================================================*/
/*                               Tests                                  */
/*======================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::ESpan;
    use crate::world::testworld;
    use glam::vec3;

    const W: usize = 640;
    const H: usize = 480;

    fn one_span(x: i32, y: i32, count: i32) -> (Vec<ESpan>, u32) {
        (
            vec![ESpan {
                next: NONE,
                x_start: x,
                y,
                count,
            }],
            0,
        )
    }

    /// Gradients for the cube room's far wall as seen by the room camera.
    fn wall_gradients(mip: usize) -> (Gradients, crate::world::Camera) {
        let model = testworld::cube_room();
        let mut cam = testworld::room_camera();
        cam.transform_frustum();

        let surf = &model.surfaces[3];
        let tex_info = &model.tex_infos[surf.tex_info as usize];
        let plane = &model.planes[surf.plane as usize];

        // plane-equation 1/z gradients, same math the face emitter uses
        let normal_view = cam.transform_direction(plane.normal);
        let dist_inv = 1.0 / (plane.distance - cam.position.dot(plane.normal));
        let zi_stepx = normal_view.x * cam.scale_invz * dist_inv;
        let zi_stepy = normal_view.y * cam.scale_invz * dist_inv;
        let zi_origin = normal_view.z * dist_inv
            - cam.screen_center.x * zi_stepx
            - cam.screen_center.y * zi_stepy;

        (
            calc_gradients(
                &cam,
                tex_info,
                surf.uv_min,
                surf.uv_extents,
                mip,
                (zi_stepx, zi_stepy, zi_origin),
            ),
            cam,
        )
    }

    #[test]
    fn mip_thresholds() {
        assert_eq!(mip_level_for_scale(2.0), 0);
        assert_eq!(mip_level_for_scale(1.0), 0);
        assert_eq!(mip_level_for_scale(0.5), 1);
        assert_eq!(mip_level_for_scale(0.25), 2);
        assert_eq!(mip_level_for_scale(0.1), 3);
    }

    /// Evaluating the 1/z gradients at a projected point recovers the
    /// point's view-space 1/z.
    #[test]
    fn zi_gradients_match_projection() {
        let (g, cam) = wall_gradients(0);
        for p in [
            vec3(0.0, 64.0, 64.0),
            vec3(-40.0, 64.0, 100.0),
            vec3(55.0, 64.0, 30.0),
        ] {
            let v = cam.transform_point(p);
            let screen = cam.project(v);
            let zi = g.zi_origin + screen.y * g.zi_stepy + screen.x * g.zi_stepx;
            assert!(
                (zi - 1.0 / v.z).abs() < 1e-4,
                "zi {zi} vs {} at {p}",
                1.0 / v.z
            );
        }
    }

    /// Evaluating the texture gradients at a projected point recovers the
    /// point's texel coordinates relative to uv_min.
    #[test]
    fn texture_gradients_recover_texels() {
        let (g, cam) = wall_gradients(0);
        let model = testworld::cube_room();
        let surf = &model.surfaces[3];
        let ti = &model.tex_infos[surf.tex_info as usize];

        for p in [vec3(0.0, 64.0, 64.0), vec3(-30.0, 64.0, 90.0)] {
            let v = cam.transform_point(p);
            let screen = cam.project(v);
            let uinvz = g.uinvz_origin + screen.y * g.uinvz_stepy + screen.x * g.uinvz_stepx;
            let s_fixed = (uinvz * (65536.0 / (1.0 / v.z))) as i32 + g.u_adjust;
            let expected = p.dot(ti.u_axis) + ti.u_offset - surf.uv_min[0] as f32;
            assert!(
                ((s_fixed as f32 / 65536.0) - expected).abs() < 0.1,
                "u {} vs {}",
                s_fixed as f32 / 65536.0,
                expected
            );
        }
    }

    #[test]
    fn opaque_drawer_fills_exactly_the_span() {
        let (g, _cam) = wall_gradients(0);
        let source = vec![7u8; 128 * 128];
        let mut pixels = vec![0xAAu8; W * H];
        let (pool, head) = one_span(100, 240, 37);

        draw_spans_opaque(&pool, head, &g, &source, 128, &mut pixels, W);

        let row = &pixels[240 * W..241 * W];
        assert!(row[..100].iter().all(|&p| p == 0xAA));
        assert!(row[100..137].iter().all(|&p| p == 7));
        assert!(row[137..].iter().all(|&p| p == 0xAA));
    }

    #[test]
    fn z_drawer_writes_the_plane_equation() {
        let (g, _cam) = wall_gradients(0);
        let mut zbuffer = vec![0.0f32; W * H];
        let (pool, head) = one_span(10, 7, 20);

        draw_spans_z(
            &pool,
            head,
            (g.zi_stepx, g.zi_stepy, g.zi_origin),
            &mut zbuffer,
            W,
        );

        for i in 0..20 {
            let x = 10 + i;
            let expected = g.zi_origin + 7.0 * g.zi_stepy + x as f32 * g.zi_stepx;
            let got = zbuffer[7 * W + x as usize];
            assert!((got - expected).abs() < 1e-6);
        }
        assert_eq!(zbuffer[7 * W + 30], 0.0);
    }

    #[test]
    fn solid_drawer_flat_fills() {
        let mut pixels = vec![0u8; W * H];
        let (pool, head) = one_span(5, 2, 10);
        draw_spans_solid(&pool, head, 42, &mut pixels, W);
        assert!(pixels[2 * W + 5..2 * W + 15].iter().all(|&p| p == 42));
        assert_eq!(pixels[2 * W + 15], 0);
    }

    #[test]
    fn turbulent_drawer_samples_the_liquid_texture() {
        let (g, _cam) = wall_gradients(0);
        // 64x64 water with a recognisable value set
        let mut source = vec![0u8; 64 * 64];
        for (i, texel) in source.iter_mut().enumerate() {
            *texel = 100 + (i % 7) as u8;
        }
        let mut pixels = vec![0u8; W * H];
        let (pool, head) = one_span(200, 100, 50);

        draw_spans_turbulent(&pool, head, &g, &source, 1.25, &mut pixels, W);

        let row = &pixels[100 * W..101 * W];
        assert!(row[200..250].iter().all(|&p| (100..107).contains(&p)));
        assert_eq!(row[250], 0);
    }

    #[test]
    fn sky_drawer_fills_from_the_canvas() {
        let mut tex = crate::world::MipTexture {
            name: "sky1".into(),
            width: 256,
            height: 128,
            mips: Default::default(),
        };
        tex.mips[0] = vec![9u8; 256 * 128];
        let mut sky = SkyCanvas::from_texture(&tex).unwrap();
        sky.animate();

        let cam = testworld::room_camera();
        let mut pixels = vec![0u8; W * H];
        let (pool, head) = one_span(0, 10, 300);

        draw_spans_sky(&pool, head, &cam, &sky, &mut pixels, W);
        assert!(pixels[10 * W..10 * W + 300].iter().all(|&p| p == 9));
        assert_eq!(pixels[10 * W + 300], 0);
    }
}
