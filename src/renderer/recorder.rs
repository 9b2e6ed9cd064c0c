//! In-memory [`Gpu`] that records every draw.
//!
//! Used by the tests and by the `level_view` demo, which has no GL context.
//! Each draw captures the resolved index list, the bound textures and the
//! shading state decoded from the last uniform upload.

use std::collections::HashMap;

use crate::renderer::pass::{DefaultUniforms, ParticleUniforms, SkyUniforms};
use crate::renderer::{
    BufferHandle, DepthFunc, Gpu, Indices, PassKind, Rgba, TextureDesc, TextureHandle,
};

/// Texture units tracked per draw.
const UNITS: usize = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub pass: PassKind,
    pub vertices: BufferHandle,
    /// The indices actually drawn (first `count` of the bound buffer);
    /// `0..count` for point draws.
    pub indices: Vec<u32>,
    pub base_vertex: i32,
    pub textures: [Option<TextureHandle>; UNITS],
    /// Default pass only: `flags` and `ambient_light` of the uniform block.
    pub flags: u32,
    pub ambient: [f32; 4],
    pub depth: DepthFunc,
}

pub struct Recorder {
    next_handle: u32,
    pub vertex_buffers: HashMap<BufferHandle, (Vec<u8>, usize)>,
    pub index_buffers: HashMap<BufferHandle, Vec<u32>>,
    pub textures: HashMap<TextureHandle, (TextureDesc, Vec<Vec<Rgba>>)>,
    pass: Option<PassKind>,
    bound: [Option<TextureHandle>; UNITS],
    default_block: Option<DefaultUniforms>,
    sky_block: Option<SkyUniforms>,
    particle_block: Option<ParticleUniforms>,
    depth: DepthFunc,
    pub draws: Vec<DrawCall>,
    /// Number of `update_index_buffer` calls.
    pub index_uploads: usize,
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            next_handle: 1,
            vertex_buffers: HashMap::new(),
            index_buffers: HashMap::new(),
            textures: HashMap::new(),
            pass: None,
            bound: [None; UNITS],
            default_block: None,
            sky_block: None,
            particle_block: None,
            depth: DepthFunc::Less,
            draws: Vec::new(),
            index_uploads: 0,
        }
    }
}

impl Recorder {
    fn handle(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    /// Hand out and forget the draws recorded so far.
    pub fn take_draws(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draws)
    }

    pub fn default_uniforms(&self) -> Option<&DefaultUniforms> {
        self.default_block.as_ref()
    }

    pub fn sky_uniforms(&self) -> Option<&SkyUniforms> {
        self.sky_block.as_ref()
    }

    pub fn particle_uniforms(&self) -> Option<&ParticleUniforms> {
        self.particle_block.as_ref()
    }

    /// Vertex buffer contents reinterpreted as `T`.
    pub fn vertices<T: bytemuck::Pod>(&self, buffer: BufferHandle) -> Vec<T> {
        self.vertex_buffers
            .get(&buffer)
            .map(|(bytes, _)| bytemuck::pod_collect_to_vec(bytes))
            .unwrap_or_default()
    }
}

impl Gpu for Recorder {
    fn create_vertex_buffer(&mut self, data: &[u8], stride: usize) -> BufferHandle {
        let h = BufferHandle(self.handle());
        self.vertex_buffers.insert(h, (data.to_vec(), stride));
        h
    }

    fn update_vertex_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        if let Some((bytes, _)) = self.vertex_buffers.get_mut(&buffer) {
            bytes.clear();
            bytes.extend_from_slice(data);
        }
    }

    fn create_index_buffer(&mut self, indices: Indices<'_>) -> BufferHandle {
        let h = BufferHandle(self.handle());
        let data = match indices {
            Indices::U16(i) => i.iter().map(|&x| x as u32).collect(),
            Indices::U32(i) => i.to_vec(),
        };
        self.index_buffers.insert(h, data);
        h
    }

    fn create_dynamic_index_buffer(&mut self, capacity: usize) -> BufferHandle {
        let h = BufferHandle(self.handle());
        self.index_buffers.insert(h, vec![0; capacity]);
        h
    }

    fn update_index_buffer(&mut self, buffer: BufferHandle, indices: &[u32]) {
        self.index_uploads += 1;
        let buf = self.index_buffers.entry(buffer).or_default();
        if buf.len() < indices.len() {
            buf.resize(indices.len(), 0);
        }
        buf[..indices.len()].copy_from_slice(indices);
    }

    fn create_texture(&mut self, desc: &TextureDesc, mips: &[Vec<Rgba>]) -> TextureHandle {
        let h = TextureHandle(self.handle());
        self.textures.insert(h, (*desc, mips.to_vec()));
        h
    }

    fn use_pass(&mut self, pass: PassKind) {
        self.pass = Some(pass);
    }

    fn upload_uniforms(&mut self, pass: PassKind, block: &[u8]) {
        match pass {
            PassKind::Default => {
                self.default_block = bytemuck::try_pod_read_unaligned(block).ok();
            }
            PassKind::Sky => {
                self.sky_block = bytemuck::try_pod_read_unaligned(block).ok();
            }
            PassKind::Particle => {
                self.particle_block = bytemuck::try_pod_read_unaligned(block).ok();
            }
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        if let Some(slot) = self.bound.get_mut(unit as usize) {
            *slot = texture;
        }
    }

    fn set_depth_func(&mut self, func: DepthFunc) {
        self.depth = func;
    }

    fn draw_indexed(
        &mut self,
        vertices: BufferHandle,
        indices: BufferHandle,
        count: usize,
        base_vertex: i32,
    ) {
        let pass = self.pass.unwrap_or(PassKind::Default);
        let (flags, ambient) = match (pass, &self.default_block) {
            (PassKind::Default, Some(b)) => (b.flags, b.ambient_light),
            _ => (0, [0.0; 4]),
        };
        let indices = self
            .index_buffers
            .get(&indices)
            .map(|b| b[..count.min(b.len())].to_vec())
            .unwrap_or_default();
        self.draws.push(DrawCall {
            pass,
            vertices,
            indices,
            base_vertex,
            textures: self.bound,
            flags,
            ambient,
            depth: self.depth,
        });
    }

    fn draw_points(&mut self, vertices: BufferHandle, count: usize) {
        self.draws.push(DrawCall {
            pass: self.pass.unwrap_or(PassKind::Particle),
            vertices,
            indices: (0..count as u32).collect(),
            base_vertex: 0,
            textures: self.bound,
            flags: 0,
            ambient: [0.0; 4],
            depth: self.depth,
        });
    }
}
