//! Light-style animation and static light sampling.

use glam::Vec3;

use crate::engine::animation::animation_tick;
use crate::world::client::{LightStyle, MAX_LIGHTSTYLES};
use crate::world::{BspLevel, Child, MAX_LIGHTMAPS, NO_STYLE, SurfaceFlags};

/// Brightness of every style channel at `time`.
///
/// `'a'` is dark, `'m'` normal and `'z'` roughly double; an empty map means
/// full bright (1.0).
pub fn animate_light_styles(styles: &[LightStyle], time: f64, out: &mut [f32; MAX_LIGHTSTYLES]) {
    let tick = animation_tick(time).max(0) as usize;
    for (j, value) in out.iter_mut().enumerate() {
        let map = styles.get(j).map_or(&[][..], |s| s.map.as_bytes());
        if map.is_empty() {
            *value = 1.0;
            continue;
        }
        let c = map[tick % map.len()].clamp(b'a', b'z');
        *value = (c - b'a') as f32 / (b'm' - b'a') as f32;
    }
}

/// Trace `start → end` through the tree under `child` and return the light
/// level at the first lit surface crossed.
///
/// `-1` when nothing was hit, `0` for a hit on a surface without samples.
pub fn recursive_light_point(
    level: &BspLevel,
    child: Child,
    start: Vec3,
    end: Vec3,
    light_styles: &[f32; MAX_LIGHTSTYLES],
) -> i32 {
    let Child::Node(n) = child else {
        return -1;
    };
    let node = &level.nodes[n];
    let plane = &level.planes[node.plane];
    let front = plane.normal.dot(start) - plane.dist;
    let back = plane.normal.dot(end) - plane.dist;
    let side = (front < 0.0) as usize;

    if (back < 0.0) as usize == side {
        return recursive_light_point(level, node.children[side], start, end, light_styles);
    }

    let frac = front / (front - back);
    let mid = start + (end - start) * frac;

    // near side first
    let r = recursive_light_point(level, node.children[side], start, mid, light_styles);
    if r >= 0 {
        return r;
    }

    for s in node.surfaces() {
        let surf = &level.surfaces[s];
        if surf.flags.contains(SurfaceFlags::DRAWTILED) {
            continue; // no lightmap
        }
        let (fs, ft) = level.tex_infos[surf.tex_info].project(mid);
        let (s, t) = (fs as i32, ft as i32);
        if s < surf.texture_mins[0] || t < surf.texture_mins[1] {
            continue;
        }
        let ds = s - surf.texture_mins[0];
        let dt = t - surf.texture_mins[1];
        if ds > surf.extents[0] || dt > surf.extents[1] {
            continue;
        }

        let Some(offset) = surf.samples else {
            return 0;
        };
        let (w, h) = surf.lightmap_size();
        let mut at = offset + (dt >> 4) as usize * w + (ds >> 4) as usize;
        let mut r: u32 = 0;
        for &style in surf.styles.iter().take(MAX_LIGHTMAPS) {
            if style == NO_STYLE {
                break;
            }
            let scale = (light_styles[style as usize % MAX_LIGHTSTYLES] * 255.0) as u32;
            r += level.light_data.get(at).copied().unwrap_or(0) as u32 * scale;
            at += w * h;
        }
        return (r >> 8) as i32;
    }

    // far side
    recursive_light_point(level, node.children[side ^ 1], mid, end, light_styles)
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;

    fn styles(maps: &[&str]) -> Vec<LightStyle> {
        maps.iter().map(|m| LightStyle::new(*m)).collect()
    }

    #[test]
    fn empty_style_is_full_bright() {
        let mut out = [0.0; MAX_LIGHTSTYLES];
        animate_light_styles(&[], 3.3, &mut out);
        assert!(out.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn style_letters_map_linearly() {
        let mut out = [0.0; MAX_LIGHTSTYLES];
        animate_light_styles(&styles(&["a", "m", "z", "az"]), 0.0, &mut out);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 1.0);
        assert_eq!(out[2], 25.0 / 12.0);
        assert_eq!(out[3], 0.0);
        animate_light_styles(&styles(&["a", "m", "z", "az"]), 0.1, &mut out);
        assert_eq!(out[3], 25.0 / 12.0);
    }

    #[test]
    fn brightness_stays_in_range() {
        let all: String = ('a'..='z').collect();
        let maps = styles(&[&all, "mmnmmommommnonmmonqnmmo", "abcdefghijklmnopqrrqponmlkjihgfedcba"]);
        let mut out = [0.0; MAX_LIGHTSTYLES];
        for step in 0..300 {
            animate_light_styles(&maps, step as f64 * 0.05, &mut out);
            assert!(out.iter().all(|&v| (0.0..=25.0 / 12.0).contains(&v)));
        }
    }
}
