//! Palette expansion and upload of level textures.

use log::debug;

use crate::renderer::{Gpu, Rgba, TextureDesc, TextureHandle};
use crate::world::texture::{MIP_LEVELS, MipTexture, Palette};

/// Width and height of mip `level`.
#[inline]
fn mip_size(tex: &MipTexture, level: usize) -> (usize, usize) {
    ((tex.width >> level).max(1), (tex.height >> level).max(1))
}

/// All mip levels of `tex` expanded through `palette`.
pub fn expand_mips(tex: &MipTexture, palette: &Palette) -> Vec<Vec<Rgba>> {
    (0..MIP_LEVELS)
        .map(|level| {
            let (w, h) = mip_size(tex, level);
            let mut pixels = palette.expand(&tex.mips[level]);
            pixels.resize(w * h, 0);
            pixels
        })
        .collect()
}

pub fn upload_texture<G: Gpu>(gpu: &mut G, tex: &MipTexture, palette: &Palette) -> TextureHandle {
    debug!("loading texture: {}", tex.name);
    let desc = TextureDesc::repeating(tex.width, tex.height);
    gpu.create_texture(&desc, &expand_mips(tex, palette))
}

/// Split a sky texture into its two layers, mip by mip.
///
/// The left half is the cloud layer drawn in front (palette index 0 becomes
/// fully transparent), the right half the solid background.
pub fn split_sky(tex: &MipTexture, palette: &Palette) -> (Vec<Vec<Rgba>>, Vec<Vec<Rgba>>) {
    let mut front = Vec::with_capacity(MIP_LEVELS);
    let mut back = Vec::with_capacity(MIP_LEVELS);
    for level in 0..MIP_LEVELS {
        let (full_w, h) = mip_size(tex, level);
        let w = full_w / 2;
        let pixels = &tex.mips[level];
        let at = |row: usize, col: usize| pixels.get(row * full_w + col).copied().unwrap_or(0);

        let mut fg = Vec::with_capacity(w * h);
        let mut bg = Vec::with_capacity(w * h);
        for row in 0..h {
            for col in 0..w {
                let idx = at(row, col);
                fg.push(if idx == 0 { 0 } else { palette[idx as usize] });
                bg.push(palette[at(row, w + col) as usize]);
            }
        }
        front.push(fg);
        back.push(bg);
    }
    (front, back)
}

/// Upload both sky layers; returns `(foreground, background)`.
pub fn upload_sky<G: Gpu>(
    gpu: &mut G,
    tex: &MipTexture,
    palette: &Palette,
) -> (TextureHandle, TextureHandle) {
    debug!("loading sky texture: {}", tex.name);
    let (front, back) = split_sky(tex, palette);
    let desc = TextureDesc::repeating(tex.width / 2, tex.height);
    (gpu.create_texture(&desc, &front), gpu.create_texture(&desc, &back))
}

/// The 1×1 white texture used where no real one applies.
pub fn placeholder_texture<G: Gpu>(gpu: &mut G) -> TextureHandle {
    gpu.create_texture(&TextureDesc::repeating(1, 1), &[vec![0xFFFF_FFFF]])
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recorder::Recorder;

    #[test]
    fn mips_expand_through_palette() {
        let mut pal = Palette::default();
        pal[3] = 0xFF_AA_BB_CC;
        let tex = MipTexture::solid("wall", 16, 8, 3);
        let mips = expand_mips(&tex, &pal);
        assert_eq!(mips.len(), MIP_LEVELS);
        assert_eq!(mips[0].len(), 128);
        assert_eq!(mips[3].len(), 2);
        assert!(mips.iter().flatten().all(|&p| p == 0xFF_AA_BB_CC));
    }

    #[test]
    fn sky_splits_into_transparent_front_and_opaque_back() {
        let pal = Palette::default();
        // 4x1: [0, 7 | 9, 0]
        let mut tex = MipTexture::solid("sky1", 4, 1, 0);
        tex.mips[0] = vec![0, 7, 9, 0];
        let (front, back) = split_sky(&tex, &pal);
        assert_eq!(front[0], vec![0, pal[7]]);
        assert_eq!(back[0], vec![pal[9], pal[0]]);
        assert_ne!(back[0][1], 0, "background keeps index 0 opaque");
    }

    #[test]
    fn sky_upload_creates_two_half_width_textures() {
        let mut gpu = Recorder::default();
        let tex = MipTexture::solid("sky4", 32, 16, 1);
        let (fg, bg) = upload_sky(&mut gpu, &tex, &Palette::default());
        assert_ne!(fg, bg);
        assert_eq!(gpu.textures[&fg].0.width, 16);
        assert_eq!(gpu.textures[&bg].1[0].len(), 16 * 16);
    }
}
