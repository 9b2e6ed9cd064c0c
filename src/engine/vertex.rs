//! The fixed vertex layout and the per-surface vertex builder.
//!
//! Surfaces are fan-triangulated at load time and every triangle gets three
//! vertices of its own, so a surface with `n` edges occupies `3 * (n - 2)`
//! consecutive vertices and draws with the index run `base, base + 1, …`.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::engine::atlas::{Image, TextureTile};
use crate::engine::frustum::to_gl;
use crate::world::{BspLevel, MAX_LIGHTMAPS, Surface, SurfaceFlags};

/// World units covered by one lightmap texel.
pub const LIGHTMAP_TEXEL: f32 = 16.0;

/// Offset added to tile-local lightmap coordinates before translating them
/// into the atlas.
pub const LIGHTMAP_UV_BIAS: f32 = 1.0;

bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VertexFlags: u32 {
        /// Alias-mesh vertex on the skin seam.
        const ON_SEAM = 1;
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VertexAttr {
    /// GL space.
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub light_uv: [f32; 2],
    pub diffuse_uv: [f32; 2],
    /// Light-style index per lightmap channel.
    pub styles: [u8; MAX_LIGHTMAPS],
    pub flags: u32,
}

/// Vertices emitted for a surface with `num_edges` edges.
#[inline]
pub fn surface_vertex_count(num_edges: usize) -> usize {
    3 * num_edges.saturating_sub(2)
}

/// Pack up to four style lightmaps into one image, style `k` in the byte
/// at bit `24 - 8k`. `None` for surfaces without light samples.
pub fn combine_lightmaps(level: &BspLevel, surf: &Surface) -> Option<Image<u32>> {
    let offset = surf.samples?;
    let (w, h) = surf.lightmap_size();
    let size = w * h;
    let mut image = Image::new(w, h);

    for k in 0..surf.style_count() {
        let start = offset + k * size;
        let Some(samples) = level.light_data.get(start..start + size) else {
            break;
        };
        let shift = 24 - 8 * k as u32;
        for (dst, &s) in image.pixels_mut().iter_mut().zip(samples) {
            *dst |= (s as u32) << shift;
        }
    }
    Some(image)
}

/// Append the fan-triangulated vertices of `surf` to `out`.
///
/// `tile` is where the surface's lightmap went in the atlas; without one
/// the lightmap coordinates stay tile-local.
pub fn build_surface_vertices(
    level: &BspLevel,
    surf: &Surface,
    tile: Option<&TextureTile>,
    out: &mut Vec<VertexAttr>,
) {
    let tex_info = &level.tex_infos[surf.tex_info];
    let (tex_w, tex_h) = level
        .surface_texture(surf)
        .and_then(|id| level.textures[id].as_ref())
        .map_or((1.0, 1.0), |t| (t.width as f32, t.height as f32));

    let mut normal = level.planes[surf.plane].normal.normalize_or_zero();
    if surf.flags.contains(SurfaceFlags::PLANEBACK) {
        normal = -normal;
    }
    let normal = to_gl(normal).to_array();

    let vertex = |p: Vec3| {
        let (s, t) = tex_info.project(p);
        let mut lu = (s - surf.texture_mins[0] as f32) / LIGHTMAP_TEXEL + LIGHTMAP_UV_BIAS;
        let mut lv = (t - surf.texture_mins[1] as f32) / LIGHTMAP_TEXEL + LIGHTMAP_UV_BIAS;
        if let Some(tile) = tile.filter(|t| !t.is_empty()) {
            (lu, lv) = tile.translate(lu, lv);
        }
        VertexAttr {
            position: to_gl(p).to_array(),
            normal,
            light_uv: [lu, lv],
            diffuse_uv: [s / tex_w, t / tex_h],
            styles: surf.styles,
            flags: 0,
        }
    };

    if surf.num_edges < 3 {
        return;
    }
    let first = level.surface_vertex(surf, 0);
    let mut previous = level.surface_vertex(surf, 1);
    for corner in 2..surf.num_edges {
        let current = level.surface_vertex(surf, corner);
        out.extend([vertex(first), vertex(previous), vertex(current)]);
        previous = current;
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::builder::{FaceLight, LevelBuilder};
    use crate::world::texture::MipTexture;
    use crate::world::{Child, Contents};

    fn pentagon_level() -> BspLevel {
        let mut b = LevelBuilder::new();
        let t = b.add_texture(MipTexture::solid("floor", 64, 32, 5));
        let poly = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(32.0, 0.0, 0.0),
            Vec3::new(48.0, 16.0, 0.0),
            Vec3::new(32.0, 32.0, 0.0),
            Vec3::new(0.0, 32.0, 0.0),
        ];
        let s = b.add_face(&poly, t, FaceLight::Uniform(&[(0, 40), (2, 80)])).unwrap();
        let leaf = b.add_leaf(Contents::Empty, &[s]);
        b.finish(Child::Leaf(leaf))
    }

    #[test]
    fn fan_emits_three_distinct_vertices_per_triangle() {
        let level = pentagon_level();
        let surf = &level.surfaces[0];
        let mut out = Vec::new();
        build_surface_vertices(&level, surf, None, &mut out);
        assert_eq!(out.len(), surface_vertex_count(5));
        assert_eq!(out.len(), 9);

        // every triangle starts at the first corner
        let first = to_gl(level.surface_vertex(surf, 0)).to_array();
        for tri in out.chunks(3) {
            assert_eq!(tri[0].position, first);
        }
        // consecutive triangles share an edge
        assert_eq!(out[2].position, out[4].position);
        assert_eq!(out[5].position, out[7].position);
    }

    #[test]
    fn texture_coordinates_follow_texinfo() {
        let level = pentagon_level();
        let surf = &level.surfaces[0];
        let mut out = Vec::new();
        build_surface_vertices(&level, surf, None, &mut out);

        // floor: s = x, t = -y; texture_mins = (0, -32)
        let v = out[1]; // corner (32, 0, 0)
        assert_eq!(v.diffuse_uv, [32.0 / 64.0, 0.0]);
        assert_eq!(v.light_uv, [32.0 / 16.0 + 1.0, 32.0 / 16.0 + 1.0]);
        assert_eq!(v.normal, [0.0, 1.0, 0.0]);
        assert_eq!(v.styles, [0, 2, 255, 255]);
    }

    #[test]
    fn tile_moves_lightmap_coordinates_into_atlas() {
        let level = pentagon_level();
        let surf = &level.surfaces[0];
        let tile = TextureTile {
            x: 10,
            y: 20,
            w: 4,
            h: 3,
            parent_w: 100,
            parent_h: 200,
        };
        let mut out = Vec::new();
        build_surface_vertices(&level, surf, Some(&tile), &mut out);
        let v = out[0]; // corner (0, 0, 0): local (1, 3)
        assert_eq!(v.light_uv, [11.0 / 100.0, 23.0 / 200.0]);
    }

    #[test]
    fn lightmaps_pack_one_style_per_byte() {
        let level = pentagon_level();
        let image = combine_lightmaps(&level, &level.surfaces[0]).unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));
        assert!(image.pixels().iter().all(|&p| p == (40 << 24) | (80 << 16)));
    }

    #[test]
    fn unlit_surface_has_no_lightmap() {
        let mut b = LevelBuilder::new();
        let t = b.add_texture(MipTexture::solid("*slime", 16, 16, 5));
        let [floor, ..] = crate::world::builder::box_faces(Vec3::ZERO, Vec3::splat(16.0));
        let s = b.add_face(&floor, t, FaceLight::Unlit).unwrap();
        let level = b.finish(Child::Leaf(0));
        assert!(combine_lightmaps(&level, &level.surfaces[s]).is_none());
    }
}
