//! Graphics-API abstraction layer.
//!
//! *The engine never talks to a graphics API directly.*
//! It creates persistent buffers and textures through a type that
//! implements [`Gpu`], then per frame binds textures, pushes a uniform block
//! and issues indexed draws (or point draws, for particles).
//!
//! * A GL backend maps every call onto one or two GL entry points.
//! * [`recorder::Recorder`] keeps everything in memory so tests can look at
//!   exactly what would have been drawn.
//! * Shader programs and their uniform state live in [`pass`], owned by a
//!   [`RenderContext`] that the caller threads through every draw entry point.

use glam::Vec3;

use crate::world::Camera;

pub mod pass;
pub mod recorder;

pub use pass::{
    DefaultPass, DefaultUniforms, ParticlePass, ParticleUniforms, PassFlags, SkyPass, SkyUniforms,
};

/// Pixel format of every uploaded texture (0xAARRGGBB).
pub type Rgba = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wrap {
    Repeat,
    ClampToEdge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
    NearestMipmapNearest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: usize,
    pub height: usize,
    pub wrap: Wrap,
    pub min_filter: Filter,
    pub mag_filter: Filter,
}

impl TextureDesc {
    /// Repeating, point-sampled, mip-mapped: what level and skin textures use.
    pub fn repeating(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            wrap: Wrap::Repeat,
            min_filter: Filter::NearestMipmapNearest,
            mag_filter: Filter::Nearest,
        }
    }
}

/// Static index data; alias meshes are small enough for 16-bit indices.
#[derive(Clone, Copy, Debug)]
pub enum Indices<'a> {
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl Indices<'_> {
    pub fn len(&self) -> usize {
        match self {
            Indices::U16(i) => i.len(),
            Indices::U32(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which shader program subsequent uniforms and draws go to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    Default,
    Sky,
    Particle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthFunc {
    Less,
    Always,
}

/// Immediate-mode GPU with persistent buffer and texture objects.
pub trait Gpu {
    /// Upload an immutable vertex buffer; `stride` is the size of one vertex.
    fn create_vertex_buffer(&mut self, data: &[u8], stride: usize) -> BufferHandle;

    /// Replace the whole contents of a vertex buffer (streamed data).
    fn update_vertex_buffer(&mut self, buffer: BufferHandle, data: &[u8]);

    /// Upload an immutable index buffer.
    fn create_index_buffer(&mut self, indices: Indices<'_>) -> BufferHandle;

    /// Allocate a 32-bit index buffer rewritten every draw.
    fn create_dynamic_index_buffer(&mut self, capacity: usize) -> BufferHandle;

    /// Overwrite the start of a dynamic index buffer.
    fn update_index_buffer(&mut self, buffer: BufferHandle, indices: &[u32]);

    /// Create a texture; `mips[0]` is the full-size level, each following
    /// level halves both dimensions.
    fn create_texture(&mut self, desc: &TextureDesc, mips: &[Vec<Rgba>]) -> TextureHandle;

    fn use_pass(&mut self, pass: PassKind);

    /// Replace the uniform block of `pass` (a `#[repr(C)]` struct as bytes).
    fn upload_uniforms(&mut self, pass: PassKind, block: &[u8]);

    /// Bind `texture` to `unit`, or unbind with `None`.
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>);

    fn set_depth_func(&mut self, func: DepthFunc);

    /// Draw `count` indices as triangles, adding `base_vertex` to each.
    fn draw_indexed(
        &mut self,
        vertices: BufferHandle,
        indices: BufferHandle,
        count: usize,
        base_vertex: i32,
    );

    /// Draw the first `count` vertices of `vertices` as points.
    fn draw_points(&mut self, vertices: BufferHandle, count: usize);
}

/// Everything a draw entry point needs besides the level: the GPU, the
/// passes with their uniform state, and this frame's view.
pub struct RenderContext<G: Gpu> {
    pub gpu: G,
    pub default_pass: DefaultPass,
    pub sky_pass: SkyPass,
    pub particle_pass: ParticlePass,
    pub camera: Camera,
    /// View origin in Quake space.
    pub origin: Vec3,
    /// Client time in seconds.
    pub time: f64,
    pub width: usize,
    pub height: usize,
}

impl<G: Gpu> RenderContext<G> {
    pub fn new(gpu: G, width: usize, height: usize) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        Self {
            gpu,
            default_pass: DefaultPass::default(),
            sky_pass: SkyPass::default(),
            particle_pass: ParticlePass::default(),
            camera: Camera::from_view(Vec3::ZERO, Vec3::ZERO, 90.0, aspect),
            origin: Vec3::ZERO,
            time: 0.0,
            width,
            height,
        }
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Set the view for the coming frame.
    pub fn set_view(&mut self, camera: Camera, origin: Vec3, time: f64) {
        self.camera = camera;
        self.origin = origin;
        self.time = time;
    }
}
