//! Shader passes and their uniform blocks.
//!
//! A pass owns the CPU copy of its uniform block; `setup` refreshes it and
//! pushes the bytes to the GPU. Blocks are `#[repr(C)]` + [`Pod`] so they
//! can be uploaded as-is.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::renderer::{Gpu, PassKind};
use crate::world::Camera;
use crate::world::client::MAX_LIGHTSTYLES;

/// Dynamic lights the default shader can take at once.
pub const MAX_DLIGHTS: usize = 32;

/* texture units of the default pass */
pub const UNIT_LIGHTMAP: u32 = 0;
pub const UNIT_DIFFUSE: u32 = 1;

/* texture units of the sky pass */
pub const UNIT_SKY_FOREGROUND: u32 = 0;
pub const UNIT_SKY_BACKGROUND: u32 = 1;

bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PassFlags: u32 {
        /// Back-facing half of an alias mesh: skin coordinates of seam
        /// vertices shift by half the skin width.
        const BACK_SIDE  = 1;
        /// Warp the diffuse lookup (liquids).
        const TURBULENCE = 2;
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DefaultUniforms {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub light_styles: [f32; MAX_LIGHTSTYLES],
    pub ambient_light: [f32; 4],
    /// `xyz` = GL-space origin, `w` = radius.
    pub dlights: [[f32; 4]; MAX_DLIGHTS],
    pub num_dlights: u32,
    pub flags: u32,
    pub global_time: f32,
    pub padding: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SkyUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub origin: [f32; 4],
    pub global_time: f32,
    pub padding: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ParticleUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    /// GL-space eye, for distance-scaled point sizes.
    pub origin: [f32; 4],
}

/// Per-draw shading parameters of the default pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shading {
    pub ambient: Vec4,
    pub flags: PassFlags,
}

impl Shading {
    /// Lightmapped walls: no ambient term.
    pub const LIGHTMAPPED: Shading = Shading {
        ambient: Vec4::ZERO,
        flags: PassFlags::empty(),
    };
    /// Liquids: full-bright, no lightmap contribution, warped.
    pub const TURBULENT: Shading = Shading {
        ambient: Vec4::new(1.0, 1.0, 1.0, 0.0),
        flags: PassFlags::TURBULENCE,
    };

    /// Uniform light level for meshes without lightmaps.
    pub fn ambient(level: f32, flags: PassFlags) -> Self {
        Self {
            ambient: Vec4::new(level, level, level, 1.0),
            flags,
        }
    }
}

/// Lightmapped / diffuse program shared by the world, brush and alias models.
pub struct DefaultPass {
    block: DefaultUniforms,
}

impl Default for DefaultPass {
    fn default() -> Self {
        Self {
            block: DefaultUniforms::zeroed(),
        }
    }
}

impl DefaultPass {
    /// Replace the dynamic light list; lights past [`MAX_DLIGHTS`] are dropped.
    pub fn update_dlights(&mut self, lights: &[Vec4]) {
        let n = lights.len().min(MAX_DLIGHTS);
        for (dst, src) in self.block.dlights.iter_mut().zip(&lights[..n]) {
            *dst = src.to_array();
        }
        self.block.num_dlights = n as u32;
    }

    pub fn num_dlights(&self) -> usize {
        self.block.num_dlights as usize
    }

    pub fn setup<G: Gpu>(
        &mut self,
        gpu: &mut G,
        camera: &Camera,
        model: &Mat4,
        light_styles: &[f32; MAX_LIGHTSTYLES],
        shading: Shading,
        time: f64,
    ) {
        let b = &mut self.block;
        b.model = model.to_cols_array_2d();
        b.view = camera.view.to_cols_array_2d();
        b.projection = camera.proj.to_cols_array_2d();
        b.light_styles = *light_styles;
        b.ambient_light = shading.ambient.to_array();
        b.flags = shading.flags.bits();
        b.global_time = time.rem_euclid(std::f64::consts::TAU) as f32;
        gpu.upload_uniforms(PassKind::Default, bytemuck::bytes_of(&self.block));
    }
}

/// Two-layer scrolling sky.
#[derive(Default)]
pub struct SkyPass;

impl SkyPass {
    /// `eye` is the view origin in GL space.
    pub fn setup<G: Gpu>(&mut self, gpu: &mut G, camera: &Camera, eye: Vec3, time: f64) {
        let block = SkyUniforms {
            view: camera.view.to_cols_array_2d(),
            projection: camera.proj.to_cols_array_2d(),
            origin: eye.extend(1.0).to_array(),
            global_time: time.rem_euclid(8.0) as f32,
            padding: [0; 3],
        };
        gpu.upload_uniforms(PassKind::Sky, bytemuck::bytes_of(&block));
    }
}

/// Palette-coloured points.
#[derive(Default)]
pub struct ParticlePass;

impl ParticlePass {
    /// `eye` is the view origin in GL space.
    pub fn setup<G: Gpu>(&mut self, gpu: &mut G, camera: &Camera, eye: Vec3) {
        let block = ParticleUniforms {
            view: camera.view.to_cols_array_2d(),
            projection: camera.proj.to_cols_array_2d(),
            origin: eye.extend(1.0).to_array(),
        };
        gpu.upload_uniforms(PassKind::Particle, bytemuck::bytes_of(&block));
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
