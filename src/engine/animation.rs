//! Resolve the frame of an animated texture for the current time.

use crate::world::texture::{MipTexture, TextureId};

/// Steps a cycle walk may take before the table is declared corrupt.
pub const MAX_ANIMATION_STEPS: usize = 100;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnimationError {
    #[error("broken animation cycle at texture `{texture}`")]
    BrokenCycle { texture: String },

    #[error("infinite animation cycle at texture `{texture}`")]
    InfiniteCycle { texture: String },
}

/// Animation tick (tenths of a second) of client time `time`.
#[inline]
pub fn animation_tick(time: f64) -> i32 {
    (time * 10.0).floor() as i32
}

/// Texture to draw for `base` at `time`.
///
/// A non-zero `frame` switches to the alternate sequence when there is one.
/// Textures that don't animate come back unchanged; otherwise the cycle is
/// walked until the frame whose `[anim_min, anim_max)` covers the current
/// tick.
pub fn texture_animation(
    textures: &[Option<MipTexture>],
    base: TextureId,
    frame: usize,
    time: f64,
) -> Result<TextureId, AnimationError> {
    let lookup = |id: TextureId| textures.get(id).and_then(Option::as_ref);

    let mut id = base;
    let Some(mut tex) = lookup(id) else {
        return Ok(base);
    };
    if frame != 0 {
        if let Some(alt) = tex.alternate_anims.and_then(|a| lookup(a).map(|t| (a, t))) {
            (id, tex) = alt;
        }
    }
    if tex.anim_total == 0 {
        return Ok(id);
    }

    let relative = animation_tick(time).rem_euclid(tex.anim_total);
    let mut steps = 0;
    while tex.anim_min > relative || tex.anim_max <= relative {
        let next = tex
            .anim_next
            .and_then(|n| lookup(n).map(|t| (n, t)))
            .ok_or_else(|| AnimationError::BrokenCycle {
                texture: tex.name.clone(),
            })?;
        (id, tex) = next;
        steps += 1;
        if steps > MAX_ANIMATION_STEPS {
            return Err(AnimationError::InfiniteCycle {
                texture: tex.name.clone(),
            });
        }
    }
    Ok(id)
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
