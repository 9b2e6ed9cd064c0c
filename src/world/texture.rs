// Paletted mip textures as the level loader hands them over, plus the
// animation sequencing every loader has to perform on `+N` frame names.
// The renderer only ever refers to them through `TextureId`.

use std::ops::{Index, IndexMut};

use once_cell::sync::Lazy;
use regex::Regex;

/// Index into `BspLevel::textures`.
///
/// Identity of a texture for the renderer: two ids never alias.
pub type TextureId = usize;

/// Mip levels stored per texture (full, 1/2, 1/4, 1/8).
pub const MIP_LEVELS: usize = 4;

/// Animation ticks each frame of a `+N` sequence is shown for.
pub const ANIM_CYCLE: i32 = 2;

/// Maximum frames of one `+N` sequence.
pub const MAX_TEXTURE_FRAMES: usize = 10;

/// CPU-side texture: 8-bit palette indices in row-major order, one vector
/// per mip level.
#[derive(Clone, Debug, PartialEq)]
pub struct MipTexture {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub mips: [Vec<u8>; MIP_LEVELS],

    /* animation cycle, filled by `link_animations` */
    /// Length of the cycle in ticks, `0` if not animated.
    pub anim_total: i32,
    pub anim_min: i32,
    pub anim_max: i32,
    pub anim_next: Option<TextureId>,
    /// Head of the other (`+0` vs `+a`) sequence.
    pub alternate_anims: Option<TextureId>,
}

impl MipTexture {
    /// A texture filled with a single palette index on every mip level.
    pub fn solid<S: Into<String>>(name: S, width: usize, height: usize, color: u8) -> Self {
        let mips = std::array::from_fn(|level| vec![color; (width >> level) * (height >> level)]);
        Self {
            name: name.into(),
            width,
            height,
            mips,
            anim_total: 0,
            anim_min: 0,
            anim_max: 0,
            anim_next: None,
            alternate_anims: None,
        }
    }

    /// Liquids (`*water`, `*lava`) warp instead of using a lightmap.
    #[inline]
    pub fn is_turbulent(&self) -> bool {
        self.name.starts_with('*')
    }

    /// Sky textures hold two layers side by side.
    #[inline]
    pub fn is_sky(&self) -> bool {
        self.name.starts_with("sky")
    }
}

/// A flat 8-bit image from the `gfx.wad` (status bar, menus, console).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Picture {
    pub width: usize,
    pub height: usize,
    /// Palette indices, row-major.
    pub pixels: Vec<u8>,
}

/// 256-entry palette, 0xAARRGGBB.
#[derive(Clone)]
pub struct Palette(pub [u32; 256]);

impl Default for Palette {
    /// Opaque grey ramp, handy when no palette lump is around.
    fn default() -> Self {
        Palette(std::array::from_fn(|i| {
            let c = i as u32;
            0xFF00_0000 | (c << 16) | (c << 8) | c
        }))
    }
}
impl Index<usize> for Palette {
    type Output = u32;
    fn index(&self, idx: usize) -> &u32 {
        &self.0[idx]
    }
}
impl IndexMut<usize> for Palette {
    fn index_mut(&mut self, idx: usize) -> &mut u32 {
        &mut self.0[idx]
    }
}

impl Palette {
    /// Expand palette indices into RGBA pixels.
    pub fn expand(&self, indices: &[u8]) -> Vec<u32> {
        indices.iter().map(|&i| self.0[i as usize]).collect()
    }
}

/// Things that can go wrong while sequencing animated textures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextureError {
    /// `+` followed by something other than `0-9` / `a-j`.
    #[error("bad animating texture `{0}`")]
    BadAnimationName(String),

    /// A sequence skips a frame number.
    #[error("animating texture `{name}` is missing frame {frame}")]
    MissingFrame { name: String, frame: usize },
}

static ANIM_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+(.)(.*)$").expect("static regex"));

/// Which sequence a `+X` frame belongs to and its slot in it.
fn anim_slot(name: &str) -> Result<Option<(bool, usize, &str)>, TextureError> {
    let Some(caps) = ANIM_NAME.captures(name) else {
        return Ok(None);
    };
    let tag = caps[1].chars().next().unwrap_or(' ').to_ascii_uppercase();
    let base = caps.get(2).map_or("", |m| m.as_str());
    match tag {
        '0'..='9' => Ok(Some((false, tag as usize - '0' as usize, base))),
        'A'..='J' => Ok(Some((true, tag as usize - 'A' as usize, base))),
        _ => Err(TextureError::BadAnimationName(name.to_string())),
    }
}

/// Sequence every `+N…` / `+a…` texture into circular animation lists.
///
/// Frames of one sequence share the name after the two-character prefix.
/// Each frame covers `[n * ANIM_CYCLE, (n + 1) * ANIM_CYCLE)` of a cycle of
/// `frames * ANIM_CYCLE` ticks; primary and alternate sequences point at each
/// other's first frame.
pub fn link_animations(textures: &mut [Option<MipTexture>]) -> Result<(), TextureError> {
    for i in 0..textures.len() {
        let Some(tx) = &textures[i] else { continue };
        if tx.anim_next.is_some() {
            continue; // already sequenced
        }
        let Some((_, _, base)) = anim_slot(&tx.name)? else {
            continue;
        };
        let base = base.to_string();

        let mut anims: [Option<TextureId>; MAX_TEXTURE_FRAMES] = [None; MAX_TEXTURE_FRAMES];
        let mut alt_anims: [Option<TextureId>; MAX_TEXTURE_FRAMES] = [None; MAX_TEXTURE_FRAMES];
        let (mut max, mut alt_max) = (0usize, 0usize);

        for (j, other) in textures.iter().enumerate().skip(i) {
            let Some(other) = other else { continue };
            let Some((alt, num, other_base)) = anim_slot(&other.name)? else {
                continue;
            };
            if other_base != base {
                continue;
            }
            if alt {
                alt_anims[num] = Some(j);
                alt_max = alt_max.max(num + 1);
            } else {
                anims[num] = Some(j);
                max = max.max(num + 1);
            }
        }

        link_sequence(textures, &anims[..max], alt_anims[0].filter(|_| alt_max > 0))?;
        link_sequence(textures, &alt_anims[..alt_max], anims[0].filter(|_| max > 0))?;
    }
    Ok(())
}

fn link_sequence(
    textures: &mut [Option<MipTexture>],
    frames: &[Option<TextureId>],
    alternate: Option<TextureId>,
) -> Result<(), TextureError> {
    let count = frames.len();
    for (j, frame) in frames.iter().enumerate() {
        let next = frames[(j + 1) % count];
        let id = frame.ok_or_else(|| TextureError::MissingFrame {
            name: frames
                .iter()
                .flatten()
                .find_map(|&id| textures[id].as_ref().map(|t| t.name.clone()))
                .unwrap_or_default(),
            frame: j,
        })?;
        if let Some(tx) = textures[id].as_mut() {
            tx.anim_total = count as i32 * ANIM_CYCLE;
            tx.anim_min = j as i32 * ANIM_CYCLE;
            tx.anim_max = (j as i32 + 1) * ANIM_CYCLE;
            tx.anim_next = next;
            tx.alternate_anims = alternate;
        }
    }
    Ok(())
}

/*======================================================================*/
/*                               Tests                                  */
/*======================================================================*/
#[cfg(test)]
mod tests {
    use super::*;

    fn tex(name: &str) -> Option<MipTexture> {
        Some(MipTexture::solid(name, 16, 16, 1))
    }

    #[test]
    fn solid_texture_has_shrinking_mips() {
        let t = MipTexture::solid("wall", 16, 8, 3);
        assert_eq!(t.mips[0].len(), 128);
        assert_eq!(t.mips[3].len(), 2);
        assert!(!t.is_sky() && !t.is_turbulent());
        assert!(MipTexture::solid("*water", 8, 8, 0).is_turbulent());
        assert!(MipTexture::solid("sky4", 8, 8, 0).is_sky());
    }

    #[test]
    fn sequences_primary_and_alternate_frames() {
        let mut textures = vec![tex("+1button"), tex("wall"), tex("+0button"), tex("+abutton")];
        link_animations(&mut textures).unwrap();

        let f0 = textures[2].as_ref().unwrap();
        let f1 = textures[0].as_ref().unwrap();
        assert_eq!((f0.anim_total, f0.anim_min, f0.anim_max), (4, 0, 2));
        assert_eq!((f1.anim_min, f1.anim_max), (2, 4));
        assert_eq!(f0.anim_next, Some(0));
        assert_eq!(f1.anim_next, Some(2));
        assert_eq!(f0.alternate_anims, Some(3));

        let alt = textures[3].as_ref().unwrap();
        assert_eq!(alt.anim_total, 2);
        assert_eq!(alt.anim_next, Some(3));
        assert_eq!(alt.alternate_anims, Some(2));

        assert_eq!(textures[1].as_ref().unwrap().anim_total, 0);
    }

    #[test]
    fn missing_frame_is_reported() {
        let mut textures = vec![tex("+0lava"), tex("+2lava")];
        let err = link_animations(&mut textures).unwrap_err();
        assert_eq!(
            err,
            TextureError::MissingFrame {
                name: "+0lava".into(),
                frame: 1
            }
        );
    }

    #[test]
    fn bad_prefix_is_rejected() {
        let mut textures = vec![tex("+zslime")];
        assert_eq!(
            link_animations(&mut textures).unwrap_err(),
            TextureError::BadAnimationName("+zslime".into())
        );
    }

    #[test]
    fn palette_expands_indices() {
        let mut pal = Palette::default();
        pal[7] = 0xFF_11_22_33;
        assert_eq!(pal.expand(&[7, 0]), vec![0xFF_11_22_33, 0xFF_00_00_00]);
    }
}
