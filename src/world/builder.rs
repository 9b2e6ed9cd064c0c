//! In-memory level construction.
//!
//! Produces exactly what the BSP loader would hand the renderer (planes,
//! winding-encoded edges, texinfos with snapped extents, light samples,
//! compressed PVS rows, parent links and bounds), without touching a file.
//! Used by the demo binary and by the tests.

use std::ops::Range;

use glam::{Vec3, Vec4};
use smallvec::SmallVec;

use crate::world::bsp::compress_vis;
use crate::world::geometry::{
    BspLevel, Child, Contents, Edge, Leaf, LeafId, MAX_LIGHTMAPS, NO_STYLE, Node, NodeId, Plane,
    SubModel, SubModelId, Surface, SurfaceFlags, SurfaceId, TEX_SPECIAL, TexInfo,
};
use crate::world::texture::{MipTexture, TextureId};

/// Light samples of a face.
#[derive(Clone, Copy, Debug)]
pub enum FaceLight<'a> {
    Unlit,
    /// One constant brightness per `(style, value)` pair.
    Uniform(&'a [(u8, u8)]),
    /// Explicit samples: `styles.len()` consecutive lightmaps.
    Samples { styles: &'a [u8], data: &'a [u8] },
}

/// Input the builder refuses.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("a face needs at least three corners, got {0}")]
    TooFewCorners(usize),

    #[error("the first three corners of a face are collinear")]
    Collinear,

    #[error("face light expects {expected} samples, got {got}")]
    SampleCount { expected: usize, got: usize },
}

/// Quake's texture axis table: plane normal, s axis, t axis.
const BASE_AXIS: [[Vec3; 3]; 6] = [
    [Vec3::Z, Vec3::X, Vec3::NEG_Y],     // floor
    [Vec3::NEG_Z, Vec3::X, Vec3::NEG_Y], // ceiling
    [Vec3::X, Vec3::Y, Vec3::NEG_Z],     // west wall
    [Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z], // east wall
    [Vec3::Y, Vec3::X, Vec3::NEG_Z],     // south wall
    [Vec3::NEG_Y, Vec3::X, Vec3::NEG_Z], // north wall
];

pub struct LevelBuilder {
    level: BspLevel,
    vis_rows: Vec<(LeafId, Vec<LeafId>)>,
    leaf_bounds: Vec<(LeafId, Vec3, Vec3)>,
    extra_models: Vec<(Child, Range<SurfaceId>, Vec3)>,
}

impl Default for LevelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelBuilder {
    /// Empty level holding only the solid leaf and edge 0 (unused by
    /// convention, since `-0` can't encode a reversed edge).
    pub fn new() -> Self {
        let level = BspLevel {
            name: "built".into(),
            edges: vec![Edge::default()],
            leaves: vec![Leaf::solid()],
            ..BspLevel::default()
        };
        Self {
            level,
            vis_rows: Vec::new(),
            leaf_bounds: Vec::new(),
            extra_models: Vec::new(),
        }
    }

    pub fn add_texture(&mut self, tex: MipTexture) -> TextureId {
        self.level.textures.push(Some(tex));
        self.level.textures.len() - 1
    }

    /// Mutable access, e.g. to wire animation cycles by hand.
    pub fn texture_mut(&mut self, id: TextureId) -> Option<&mut MipTexture> {
        self.level.textures.get_mut(id)?.as_mut()
    }

    /// Add a convex polygon. The front side is the one from which
    /// `(c1 - c0) × (c2 - c0)` points towards the viewer. The level is
    /// left untouched when the face is refused.
    pub fn add_face(
        &mut self,
        corners: &[Vec3],
        texture: TextureId,
        light: FaceLight,
    ) -> Result<SurfaceId, BuildError> {
        let &[c0, c1, c2, ..] = corners else {
            return Err(BuildError::TooFewCorners(corners.len()));
        };
        let normal = (c1 - c0)
            .cross(c2 - c0)
            .try_normalize()
            .ok_or(BuildError::Collinear)?;
        let lvl = &mut self.level;

        /* plane, stored in canonical (positive dominant axis) orientation */
        let (plane, back) = canonical_plane(normal, normal.dot(c0));

        /* texture axes & flags from the texture name */
        let (s_axis, t_axis) = texture_axes(normal);
        let mut flags = if back {
            SurfaceFlags::PLANEBACK
        } else {
            SurfaceFlags::empty()
        };
        let mut tex_flags = 0;
        if let Some(Some(tex)) = lvl.textures.get(texture) {
            if tex.is_sky() {
                flags |= SurfaceFlags::DRAWSKY | SurfaceFlags::DRAWTILED;
                tex_flags = TEX_SPECIAL;
            } else if tex.is_turbulent() {
                flags |= SurfaceFlags::DRAWTURB | SurfaceFlags::DRAWTILED;
                tex_flags = TEX_SPECIAL;
            }
        }
        let tex_info = TexInfo {
            vecs: [s_axis.extend(0.0), t_axis.extend(0.0)],
            texture: Some(texture),
            flags: tex_flags,
        };

        /* extents, snapped to the 16-unit lightmap grid */
        let mut mins = [f32::MAX; 2];
        let mut maxs = [f32::MIN; 2];
        for &c in corners {
            let (s, t) = tex_info.project(c);
            mins[0] = mins[0].min(s);
            mins[1] = mins[1].min(t);
            maxs[0] = maxs[0].max(s);
            maxs[1] = maxs[1].max(t);
        }
        let mut texture_mins = [0; 2];
        let mut extents = [0; 2];
        for axis in 0..2 {
            let bmin = (mins[axis] / 16.0).floor() as i32;
            let bmax = (maxs[axis] / 16.0).ceil() as i32;
            texture_mins[axis] = bmin * 16;
            extents[axis] = (bmax - bmin) * 16;
        }

        let mut surf = Surface {
            plane: lvl.planes.len(),
            flags,
            first_edge: lvl.surf_edges.len(),
            num_edges: corners.len(),
            tex_info: lvl.tex_infos.len(),
            texture_mins,
            extents,
            styles: [NO_STYLE; MAX_LIGHTMAPS],
            samples: None,
        };

        /* light samples */
        let (w, h) = surf.lightmap_size();
        match light {
            FaceLight::Unlit => {}
            FaceLight::Uniform(styles) => {
                surf.samples = Some(lvl.light_data.len());
                for (slot, &(style, value)) in styles.iter().take(MAX_LIGHTMAPS).enumerate() {
                    surf.styles[slot] = style;
                    lvl.light_data.extend(std::iter::repeat_n(value, w * h));
                }
            }
            FaceLight::Samples { styles, data } => {
                let expected = styles.len().min(MAX_LIGHTMAPS) * w * h;
                if data.len() != expected {
                    return Err(BuildError::SampleCount {
                        expected,
                        got: data.len(),
                    });
                }
                surf.samples = Some(lvl.light_data.len());
                for (slot, &style) in styles.iter().take(MAX_LIGHTMAPS).enumerate() {
                    surf.styles[slot] = style;
                }
                lvl.light_data.extend_from_slice(data);
            }
        }

        lvl.planes.push(plane);
        lvl.tex_infos.push(tex_info);

        /* edges: each corner starts a new forward edge */
        let first_vertex = lvl.vertices.len() as u32;
        lvl.vertices.extend_from_slice(corners);
        let n = corners.len() as u32;
        for i in 0..n {
            lvl.edges.push(Edge {
                v: [first_vertex + i, first_vertex + (i + 1) % n],
            });
            lvl.surf_edges.push((lvl.edges.len() - 1) as i32);
        }

        lvl.surfaces.push(surf);
        Ok(lvl.surfaces.len() - 1)
    }

    pub fn add_leaf(&mut self, contents: Contents, marks: &[SurfaceId]) -> LeafId {
        let lvl = &mut self.level;
        let first = lvl.mark_surfaces.len();
        lvl.mark_surfaces.extend_from_slice(marks);
        lvl.leaves.push(Leaf {
            contents,
            mins: Vec3::ZERO,
            maxs: Vec3::ZERO,
            vis_offset: None,
            first_mark_surface: first,
            num_mark_surfaces: marks.len(),
            efrags: SmallVec::new(),
            parent: None,
        });
        lvl.leaves.len() - 1
    }

    /// Bounds for a leaf without surfaces of its own (otherwise derived).
    pub fn set_leaf_bounds(&mut self, leaf: LeafId, mins: Vec3, maxs: Vec3) {
        self.leaf_bounds.push((leaf, mins, maxs));
    }

    pub fn add_node(&mut self, plane: Plane, children: [Child; 2], faces: Range<SurfaceId>) -> NodeId {
        let lvl = &mut self.level;
        lvl.planes.push(plane);
        lvl.nodes.push(Node {
            plane: lvl.planes.len() - 1,
            children,
            mins: Vec3::ZERO,
            maxs: Vec3::ZERO,
            first_surface: faces.start,
            num_surfaces: faces.len(),
            parent: None,
        });
        lvl.nodes.len() - 1
    }

    /// Leaves potentially visible from `leaf`. Leaves without a call see
    /// everything.
    pub fn set_visibility(&mut self, leaf: LeafId, visible: &[LeafId]) {
        self.vis_rows.push((leaf, visible.to_vec()));
    }

    /// Register a brush submodel; ids start at 1 (0 is the world).
    pub fn add_submodel(&mut self, head: Child, faces: Range<SurfaceId>, origin: Vec3) -> SubModelId {
        self.extra_models.push((head, faces, origin));
        self.extra_models.len()
    }

    /// Link parents, compute bounds, compress visibility and emit the level.
    ///
    /// World surfaces are every surface before the first submodel's.
    pub fn finish(mut self, world_head: Child) -> BspLevel {
        let world_end = self
            .extra_models
            .iter()
            .map(|(_, faces, _)| faces.start)
            .min()
            .unwrap_or(self.level.surfaces.len());

        /* leaf bounds from their surfaces, then explicit overrides */
        for leaf_id in 1..self.level.leaves.len() {
            let leaf = &self.level.leaves[leaf_id];
            let marks = self.level.leaf_surfaces(leaf).to_vec();
            let (mins, maxs) = self.surfaces_bounds(marks.iter().copied());
            let leaf = &mut self.level.leaves[leaf_id];
            leaf.mins = mins;
            leaf.maxs = maxs;
        }
        for &(leaf, mins, maxs) in &self.leaf_bounds {
            self.level.leaves[leaf].mins = mins;
            self.level.leaves[leaf].maxs = maxs;
        }

        /* parents + node bounds */
        let mut models = vec![(world_head, 0..world_end, Vec3::ZERO)];
        models.append(&mut self.extra_models);
        for (head, faces, origin) in models {
            let (mins, maxs) = self.link(head, None);
            self.level.submodels.push(SubModel {
                mins,
                maxs,
                origin,
                head_node: head,
                first_surface: faces.start,
                num_surfaces: faces.len(),
            });
        }

        /* visibility */
        let row_bytes = self.level.pvs_row_bytes();
        for (leaf, visible) in std::mem::take(&mut self.vis_rows) {
            let mut row = vec![0u8; row_bytes];
            for &v in visible.iter().filter(|&&v| v > 0) {
                row[(v - 1) >> 3] |= 1 << ((v - 1) & 7);
            }
            self.level.leaves[leaf].vis_offset = Some(self.level.vis_data.len());
            self.level.vis_data.extend(compress_vis(&row));
        }

        self.level
    }

    fn link(&mut self, child: Child, parent: Option<NodeId>) -> (Vec3, Vec3) {
        match child {
            Child::Leaf(0) => (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            Child::Leaf(l) => {
                let leaf = &mut self.level.leaves[l];
                leaf.parent = parent;
                (leaf.mins, leaf.maxs)
            }
            Child::Node(n) => {
                self.level.nodes[n].parent = parent;
                let children = self.level.nodes[n].children;
                let (mut mins, mut maxs) = self.surfaces_bounds(self.level.nodes[n].surfaces());
                for c in children {
                    let (cmin, cmax) = self.link(c, Some(n));
                    mins = mins.min(cmin);
                    maxs = maxs.max(cmax);
                }
                let node = &mut self.level.nodes[n];
                node.mins = mins;
                node.maxs = maxs;
                (mins, maxs)
            }
        }
    }

    fn surfaces_bounds(&self, surfaces: impl Iterator<Item = SurfaceId>) -> (Vec3, Vec3) {
        let mut mins = Vec3::splat(f32::MAX);
        let mut maxs = Vec3::splat(f32::MIN);
        for s in surfaces {
            let surf = &self.level.surfaces[s];
            for corner in 0..surf.num_edges {
                let v = self.level.surface_vertex(surf, corner);
                mins = mins.min(v);
                maxs = maxs.max(v);
            }
        }
        (mins, maxs)
    }

    // ---------------------------------------------------------------------
    // Ready-made levels
    // ---------------------------------------------------------------------

    /// A closed, lit box room: six inward faces textured `"wall"`, one
    /// empty leaf, a chain of six nodes whose outer sides are solid.
    pub fn box_room(mins: Vec3, maxs: Vec3) -> Result<(BspLevel, LeafId), BuildError> {
        let mut b = LevelBuilder::new();
        let wall = b.add_texture(MipTexture::solid("wall", 16, 16, 96));
        let faces = box_faces(mins, maxs);

        let surfaces = faces
            .iter()
            .map(|q| b.add_face(q, wall, FaceLight::Uniform(&[(0, 200)])))
            .collect::<Result<Vec<SurfaceId>, _>>()?;
        let room = b.add_leaf(Contents::Empty, &surfaces);
        b.set_visibility(room, &[room]);

        // chain: node i splits on face i, inside goes on to node i + 1
        let mut next = Child::Leaf(room);
        for (i, &s) in surfaces.iter().enumerate().rev() {
            let plane = b.level.planes[b.level.surfaces[s].plane];
            let flipped = b.level.surfaces[s].flags.contains(SurfaceFlags::PLANEBACK);
            let children = if flipped {
                [Child::Leaf(0), next]
            } else {
                [next, Child::Leaf(0)]
            };
            next = Child::Node(b.add_node(plane, children, i..i + 1));
        }
        Ok((b.finish(next), room))
    }
}

/// Inward-facing quads of an axis-aligned box: floor, ceiling, west, east,
/// south, north.
pub fn box_faces(mins: Vec3, maxs: Vec3) -> [[Vec3; 4]; 6] {
    let size = maxs - mins;
    let quad = |o: Vec3, u: Vec3, v: Vec3| [o, o + u, o + u + v, o + v];
    let (x, y, z) = (Vec3::X * size.x, Vec3::Y * size.y, Vec3::Z * size.z);
    [
        quad(mins, x, y),
        quad(Vec3::new(mins.x, mins.y, maxs.z), y, x),
        quad(mins, y, z),
        quad(Vec3::new(maxs.x, mins.y, mins.z), z, y),
        quad(mins, z, x),
        quad(Vec3::new(mins.x, maxs.y, mins.z), x, z),
    ]
}

/// Flip `normal` so its dominant component is positive; report the flip.
fn canonical_plane(normal: Vec3, dist: f32) -> (Plane, bool) {
    let a = normal.abs();
    let dominant = if a.x >= a.y && a.x >= a.z {
        0
    } else if a.y >= a.z {
        1
    } else {
        2
    };
    if normal[dominant] < 0.0 {
        (Plane::new(-normal, -dist), true)
    } else {
        (Plane::new(normal, dist), false)
    }
}

fn texture_axes(normal: Vec3) -> (Vec3, Vec3) {
    let best = BASE_AXIS
        .iter()
        .max_by(|a, b| normal.dot(a[0]).total_cmp(&normal.dot(b[0])))
        .unwrap_or(&BASE_AXIS[0]);
    (best[1], best[2])
}

/// Identity texinfo vectors, handy for tests that set `TexInfo` directly.
pub fn axis_vecs(s: Vec3, t: Vec3) -> [Vec4; 2] {
    [s.extend(0.0), t.extend(0.0)]
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
