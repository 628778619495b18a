//! ----------------------------------------------------------------------------
//! **Sky compositor**
//!
//! The sky texture is 256x128 and packs two 128x128 panels: the *front*
//! layer on the left (black = transparent) and the *background* on the
//! right.  Every frame the front layer slides by the accumulated shift and
//! is overlaid onto the background into the 256-byte-wide `new_sky`
//! canvas that the sky span drawer samples.
//! ----------------------------------------------------------------------------

use crate::engine::types::Fixed16;
use crate::world::MipTexture;

pub const SKY_SIZE: usize = 128;
const SKY_SIZE_MASK: i32 = SKY_SIZE as i32 - 1;
/// The canvas keeps 256-byte scan widths so the drawer's addressing
/// (`row << 8 | column`) needs no multiply.
pub const SKY_TEXTURE_WIDTH: usize = 256;
/// Scroll panels carry three texels of overrun room past the wrap.
const SKY_PADDED_WIDTH: usize = SKY_SIZE + 3;

/// Units of shift added per frame.
const SKY_SHIFT_SPEED: f32 = 0.6;

pub struct SkyCanvas {
    /// 128 rows x 256 columns; left half is the animated composite, right
    /// half keeps the static background for the next overlay pass.
    new_sky: Vec<u8>,
    front_sky: Vec<u8>,
    front_mask: Vec<u8>,
    shift: f32,
}

impl SkyCanvas {
    /// Unpack the dual-panel texture.  Returns `None` unless the texture
    /// is exactly 256x128.
    pub fn from_texture(texture: &MipTexture) -> Option<Self> {
        if texture.width as usize != SKY_TEXTURE_WIDTH || texture.height as usize != SKY_SIZE {
            return None;
        }
        let src = &texture.mips[0];

        let mut new_sky = vec![0u8; SKY_SIZE * SKY_TEXTURE_WIDTH];
        for y in 0..SKY_SIZE {
            let row = y * SKY_TEXTURE_WIDTH;
            new_sky[row + SKY_SIZE..row + SKY_TEXTURE_WIDTH]
                .copy_from_slice(&src[row + SKY_SIZE..row + SKY_TEXTURE_WIDTH]);
        }

        let mut front_sky = vec![0u8; SKY_SIZE * SKY_PADDED_WIDTH];
        let mut front_mask = vec![0u8; SKY_SIZE * SKY_PADDED_WIDTH];
        for y in 0..SKY_SIZE {
            for x in 0..SKY_PADDED_WIDTH {
                let color = src[y * SKY_TEXTURE_WIDTH + (x & SKY_SIZE_MASK as usize)];
                front_sky[y * SKY_PADDED_WIDTH + x] = color;
                front_mask[y * SKY_PADDED_WIDTH + x] = if color != 0 { 0 } else { 0xff };
            }
        }

        Some(SkyCanvas {
            new_sky,
            front_sky,
            front_mask,
            shift: 0.0,
        })
    }

    /// Advance the apparent motion; call once per frame before `animate`.
    pub fn setup_frame(&mut self) {
        self.shift += SKY_SHIFT_SPEED;
    }

    #[inline]
    pub fn shift(&self) -> f32 {
        self.shift
    }

    /// Re-composite the left half of the canvas: background overlaid with
    /// the shifted front layer, black front texels showing through.
    pub fn animate(&mut self) {
        let shift = self.shift as i32;
        for y in 0..SKY_SIZE {
            let row = y * SKY_TEXTURE_WIDTH;
            let front_row = (((y as i32 + shift) & SKY_SIZE_MASK) as usize) * SKY_PADDED_WIDTH;
            for x in 0..SKY_SIZE {
                let off = front_row + ((x as i32 + shift) & SKY_SIZE_MASK) as usize;
                let background = self.new_sky[row + SKY_SIZE + x];
                self.new_sky[row + x] = (background & self.front_mask[off]) | self.front_sky[off];
            }
        }
    }

    /// Sample the composite at 16.16 sky coordinates.
    #[inline(always)]
    pub fn sample(&self, s: Fixed16, t: Fixed16) -> u8 {
        let index = (((t & 0x7F_0000) >> 8) + ((s & 0x7F_0000) >> 16)) as usize;
        self.new_sky[index]
    }
}

/*======================================================================*/
/*                               Tests                                  */
/*======================================================================*/
#[cfg(test)]
mod tests {
    use super::*;

    /// front panel = unique pattern, background = zero
    fn patterned_sky() -> MipTexture {
        let mut tex = MipTexture {
            name: "sky1".into(),
            width: 256,
            height: 128,
            mips: Default::default(),
        };
        let mut mip0 = vec![0u8; 256 * 128];
        for y in 0..SKY_SIZE {
            for x in 0..SKY_SIZE {
                // never zero, so the front layer is fully opaque
                mip0[y * 256 + x] = (1 + ((x * 7 + y * 3) % 255)) as u8;
            }
        }
        tex.mips[0] = mip0;
        tex
    }

    #[test]
    fn wrong_size_texture_is_rejected() {
        let tex = MipTexture::default_checker();
        assert!(SkyCanvas::from_texture(&tex).is_none());
    }

    #[test]
    fn shift_advances_at_fixed_speed() {
        let tex = patterned_sky();
        let mut sky = SkyCanvas::from_texture(&tex).unwrap();
        for _ in 0..60 {
            sky.setup_frame();
        }
        assert!((sky.shift() - 36.0).abs() < 1e-4);
    }

    /// After 60 frames the composite is the frame-0 composite translated
    /// by the integer shift, modulo 128, in both axes.
    #[test]
    fn composite_translates_by_the_shift() {
        let tex = patterned_sky();
        let mut sky = SkyCanvas::from_texture(&tex).unwrap();
        sky.animate();
        let frame0: Vec<u8> = (0..SKY_SIZE * SKY_SIZE)
            .map(|i| sky.new_sky[(i / SKY_SIZE) * 256 + (i % SKY_SIZE)])
            .collect();

        for _ in 0..60 {
            sky.setup_frame();
        }
        sky.animate();

        let shift = sky.shift() as usize; // 36
        for y in 0..SKY_SIZE {
            for x in 0..SKY_SIZE {
                let shifted =
                    frame0[((y + shift) & 127) * SKY_SIZE + ((x + shift) & 127)];
                assert_eq!(sky.new_sky[y * 256 + x], shifted, "pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn transparent_front_shows_background() {
        // front all black, background patterned
        let mut tex = patterned_sky();
        let mip0 = &mut tex.mips[0];
        for y in 0..SKY_SIZE {
            for x in 0..SKY_SIZE {
                mip0[y * 256 + SKY_SIZE + x] = mip0[y * 256 + x]; // background
                mip0[y * 256 + x] = 0; // transparent front
            }
        }
        let mut sky = SkyCanvas::from_texture(&tex).unwrap();
        sky.setup_frame();
        sky.animate();
        for y in 0..SKY_SIZE {
            for x in 0..SKY_SIZE {
                assert_eq!(sky.new_sky[y * 256 + x], sky.new_sky[y * 256 + SKY_SIZE + x]);
            }
        }
    }

    #[test]
    fn sample_addresses_row_and_column() {
        let tex = patterned_sky();
        let mut sky = SkyCanvas::from_texture(&tex).unwrap();
        sky.animate();
        // (s, t) = (5, 9) in 16.16
        let s = 5 << 16;
        let t = 9 << 16;
        assert_eq!(sky.sample(s, t), sky.new_sky[9 * 256 + 5]);
        // wraps at 128
        assert_eq!(sky.sample(s + (128 << 16), t), sky.sample(s, t));
    }
}
