use bitflags::bitflags;
use glam::{Vec3, Vec4};
use smallvec::SmallVec;

use crate::world::client::EntityId;
use crate::world::texture::{MipTexture, TextureId};

pub type PlaneId = usize;
pub type NodeId = usize;
pub type LeafId = usize;
pub type SurfaceId = usize;
pub type TexInfoId = usize;
pub type SubModelId = usize;

/// Number of light-style channels a single surface can blend.
pub const MAX_LIGHTMAPS: usize = 4;

/// Terminates a surface's `styles` list.
pub const NO_STYLE: u8 = 255;

/// `TexInfo::flags`: sky or liquid, no lightmap.
pub const TEX_SPECIAL: u32 = 1;

/// Runtime snapshot of one map (immutable after load).
///
/// Submodel 0 is always the world; the others (doors, lifts, …) share the
/// same plane / surface / node arrays and only differ in their head node and
/// surface range.
#[derive(Debug, Default)]
pub struct BspLevel {
    pub name: String,
    pub planes: Vec<Plane>,
    pub vertices: Vec<Vec3>,
    pub edges: Vec<Edge>,
    /// Signed edge references: `+e` walks `edges[e]` forward, `-e` backward.
    pub surf_edges: Vec<i32>,
    pub tex_infos: Vec<TexInfo>,
    pub surfaces: Vec<Surface>,
    pub mark_surfaces: Vec<SurfaceId>,
    pub nodes: Vec<Node>,
    /// `leaves[0]` is the shared solid leaf outside the map.
    pub leaves: Vec<Leaf>,
    pub textures: Vec<Option<MipTexture>>,
    /// Run-length compressed PVS rows, addressed by `Leaf::vis_offset`.
    pub vis_data: Vec<u8>,
    /// Raw per-texel light samples, addressed by `Surface::samples`.
    pub light_data: Vec<u8>,
    pub submodels: Vec<SubModel>,
}

/*--------------------------- planes ---------------------------------*/

/// Which fast path `Plane::distance` may take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneAxis {
    X,
    Y,
    Z,
    Any,
}

#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
    pub axis: PlaneAxis,
}

impl Plane {
    /// Build a plane and classify it as axial when the normal is a unit axis.
    pub fn new(normal: Vec3, dist: f32) -> Self {
        let axis = if normal == Vec3::X {
            PlaneAxis::X
        } else if normal == Vec3::Y {
            PlaneAxis::Y
        } else if normal == Vec3::Z {
            PlaneAxis::Z
        } else {
            PlaneAxis::Any
        };
        Self { normal, dist, axis }
    }

    /// Signed distance of `p` from the plane (positive = front).
    #[inline(always)]
    pub fn distance(&self, p: Vec3) -> f32 {
        match self.axis {
            PlaneAxis::X => p.x - self.dist,
            PlaneAxis::Y => p.y - self.dist,
            PlaneAxis::Z => p.z - self.dist,
            PlaneAxis::Any => self.normal.dot(p) - self.dist,
        }
    }
}

/*--------------------------- tree -----------------------------------*/

/// Reference from a node to one of its two subtrees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Child {
    Node(NodeId),
    Leaf(LeafId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Contents {
    Empty,
    Solid,
    Water,
    Slime,
    Lava,
    Sky,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub plane: PlaneId,
    /// `[front, back]`
    pub children: [Child; 2],
    pub mins: Vec3,
    pub maxs: Vec3,
    pub first_surface: SurfaceId,
    pub num_surfaces: usize,
    pub parent: Option<NodeId>,
}

impl Node {
    pub fn surfaces(&self) -> std::ops::Range<SurfaceId> {
        self.first_surface..self.first_surface + self.num_surfaces
    }
}

#[derive(Clone, Debug)]
pub struct Leaf {
    pub contents: Contents,
    pub mins: Vec3,
    pub maxs: Vec3,
    /// `None` means the leaf has no visibility row (everything visible).
    pub vis_offset: Option<usize>,
    pub first_mark_surface: usize,
    pub num_mark_surfaces: usize,
    /// Entities currently touching this leaf, maintained by the simulation.
    pub efrags: SmallVec<[EntityId; 4]>,
    pub parent: Option<NodeId>,
}

impl Leaf {
    pub fn solid() -> Self {
        Self {
            contents: Contents::Solid,
            mins: Vec3::ZERO,
            maxs: Vec3::ZERO,
            vis_offset: None,
            first_mark_surface: 0,
            num_mark_surfaces: 0,
            efrags: SmallVec::new(),
            parent: None,
        }
    }
}

/*--------------------------- surfaces -------------------------------*/

bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SurfaceFlags: u32 {
        const PLANEBACK      = 0x0002;
        const DRAWSKY        = 0x0004;
        const DRAWSPRITE     = 0x0008;
        const DRAWTURB       = 0x0010;
        const DRAWTILED      = 0x0020;
        const DRAWBACKGROUND = 0x0040;
        const UNDERWATER     = 0x0080;
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Edge {
    pub v: [u32; 2],
}

#[derive(Clone, Debug)]
pub struct TexInfo {
    /// `s = dot(p, vecs[0].xyz) + vecs[0].w`, same for `t` with `vecs[1]`.
    pub vecs: [Vec4; 2],
    pub texture: Option<TextureId>,
    pub flags: u32,
}

impl TexInfo {
    /// Project a world point onto the texture axes.
    #[inline]
    pub fn project(&self, p: Vec3) -> (f32, f32) {
        (
            p.dot(self.vecs[0].truncate()) + self.vecs[0].w,
            p.dot(self.vecs[1].truncate()) + self.vecs[1].w,
        )
    }
}

#[derive(Clone, Debug)]
pub struct Surface {
    pub plane: PlaneId,
    pub flags: SurfaceFlags,
    pub first_edge: usize,
    pub num_edges: usize,
    pub tex_info: TexInfoId,
    /// Smallest texture coordinate, snapped to 16 texels.
    pub texture_mins: [i32; 2],
    /// Texture-space size, multiple of 16.
    pub extents: [i32; 2],
    pub styles: [u8; MAX_LIGHTMAPS],
    /// Offset into `BspLevel::light_data`, `None` when unlit.
    pub samples: Option<usize>,
}

impl Surface {
    /// Lightmap resolution: one texel per 16 world units, plus the edge.
    #[inline]
    pub fn lightmap_size(&self) -> (usize, usize) {
        (
            ((self.extents[0] >> 4) + 1) as usize,
            ((self.extents[1] >> 4) + 1) as usize,
        )
    }

    /// Number of active light styles (until the first `NO_STYLE`).
    pub fn style_count(&self) -> usize {
        self.styles
            .iter()
            .position(|&s| s == NO_STYLE)
            .unwrap_or(MAX_LIGHTMAPS)
    }
}

/*--------------------------- submodels ------------------------------*/

#[derive(Clone, Debug)]
pub struct SubModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub head_node: Child,
    pub first_surface: SurfaceId,
    pub num_surfaces: usize,
}

impl SubModel {
    pub fn surfaces(&self) -> std::ops::Range<SurfaceId> {
        self.first_surface..self.first_surface + self.num_surfaces
    }
}

/*--------------------------- level helpers --------------------------*/

impl BspLevel {
    /// The world model (submodel 0).
    #[inline]
    pub fn world(&self) -> &SubModel {
        &self.submodels[0]
    }

    /// Vertex at polygon corner `corner` of `surf`, winding-corrected.
    pub fn surface_vertex(&self, surf: &Surface, corner: usize) -> Vec3 {
        let e = self.surf_edges[surf.first_edge + corner];
        let v = if e >= 0 {
            self.edges[e as usize].v[0]
        } else {
            self.edges[e.unsigned_abs() as usize].v[1]
        };
        self.vertices[v as usize]
    }

    /// Surfaces referenced from a leaf.
    pub fn leaf_surfaces(&self, leaf: &Leaf) -> &[SurfaceId] {
        &self.mark_surfaces[leaf.first_mark_surface..leaf.first_mark_surface + leaf.num_mark_surfaces]
    }

    /// Texture bound to `surf`, if its texinfo names one that was loaded.
    pub fn surface_texture(&self, surf: &Surface) -> Option<TextureId> {
        let id = self.tex_infos[surf.tex_info].texture?;
        self.textures.get(id)?.as_ref().map(|_| id)
    }

    /// Number of leaves a PVS row covers (every leaf but the solid one).
    #[inline]
    pub fn vis_leaf_count(&self) -> usize {
        self.leaves.len().saturating_sub(1)
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_axis_fast_paths_match_general_distance() {
        let p = Vec3::new(3.0, -7.0, 12.0);
        for normal in [Vec3::X, Vec3::Y, Vec3::Z] {
            let plane = Plane::new(normal, 5.0);
            assert_ne!(plane.axis, PlaneAxis::Any);
            assert_eq!(plane.distance(p), normal.dot(p) - 5.0);
        }
        let slanted = Plane::new(Vec3::new(0.6, 0.8, 0.0), 1.0);
        assert_eq!(slanted.axis, PlaneAxis::Any);
        assert!((slanted.distance(p) - (0.6 * 3.0 - 0.8 * 7.0 - 1.0)).abs() < 1e-5);
    }

    #[test]
    fn style_count_stops_at_terminator() {
        let surf = Surface {
            plane: 0,
            flags: SurfaceFlags::empty(),
            first_edge: 0,
            num_edges: 0,
            tex_info: 0,
            texture_mins: [0, 0],
            extents: [32, 16],
            styles: [0, 5, NO_STYLE, NO_STYLE],
            samples: None,
        };
        assert_eq!(surf.style_count(), 2);
        assert_eq!(surf.lightmap_size(), (3, 2));
    }
}
