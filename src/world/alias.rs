//! Vertex-animated ("alias") models as delivered by the model loader.

use glam::Vec3;

/// Index into the list of alias models handed to `FrameRenderer::new_map`.
pub type AliasModelId = usize;

/// Compressed vertex: byte position scaled by the model header, normal
/// already resolved from the loader's normal table.
#[derive(Clone, Copy, Debug)]
pub struct TriVertex {
    pub v: [u8; 3],
    pub normal: Vec3,
}

/// Skin coordinate of one mesh vertex, 16.16 fixed point like on disk.
#[derive(Clone, Copy, Debug)]
pub struct StVert {
    pub s: i32,
    pub t: i32,
    pub on_seam: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct Triangle {
    pub faces_front: bool,
    pub vertices: [u16; 3],
}

#[derive(Clone, Debug)]
pub enum AliasSkin {
    Single(Vec<u8>),
    /// Frames with the time at which each one ends.
    Group(Vec<(Vec<u8>, f32)>),
}

#[derive(Clone, Debug)]
pub enum AliasFrame {
    Single {
        name: String,
        verts: Vec<TriVertex>,
    },
    Group {
        name: String,
        frames: Vec<(Vec<TriVertex>, f32)>,
    },
}

#[derive(Clone, Debug)]
pub struct AliasModel {
    pub name: String,
    pub skin_width: usize,
    pub skin_height: usize,
    pub scale: Vec3,
    pub scale_origin: Vec3,
    pub skins: Vec<AliasSkin>,
    pub st_verts: Vec<StVert>,
    pub triangles: Vec<Triangle>,
    pub frames: Vec<AliasFrame>,
    pub mins: Vec3,
    pub maxs: Vec3,
}

impl AliasModel {
    /// Decode a compressed vertex into model space (Quake axes).
    #[inline]
    pub fn decode(&self, v: &TriVertex) -> Vec3 {
        Vec3::new(v.v[0] as f32, v.v[1] as f32, v.v[2] as f32) * self.scale + self.scale_origin
    }
}
