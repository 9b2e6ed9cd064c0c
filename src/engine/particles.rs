//! Particles: one coloured point per live particle, streamed every frame.

use bytemuck::{Pod, Zeroable};
use log::trace;

use crate::engine::frustum::to_gl;
use crate::renderer::{BufferHandle, Gpu, PassKind, RenderContext};
use crate::world::client::Particle;
use crate::world::texture::Palette;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    /// GL space.
    pub position: [f32; 3],
    /// Palette colour, 0xAARRGGBB.
    pub color: u32,
}

impl ParticleVertex {
    pub fn new(particle: &Particle, palette: &Palette) -> Self {
        Self {
            position: to_gl(particle.origin).to_array(),
            color: palette[particle.color as usize],
        }
    }
}

/// Owns the streaming vertex buffer; it is created on the first frame
/// with particles and rewritten on every later one.
#[derive(Default)]
pub struct ParticleRenderer {
    buffer: Option<BufferHandle>,
    vertices: Vec<ParticleVertex>,
}

impl ParticleRenderer {
    pub fn render<G: Gpu>(
        &mut self,
        ctx: &mut RenderContext<G>,
        particles: &[Particle],
        palette: &Palette,
    ) {
        if particles.is_empty() {
            return;
        }
        self.vertices.clear();
        self.vertices
            .extend(particles.iter().map(|p| ParticleVertex::new(p, palette)));

        let RenderContext {
            gpu,
            particle_pass,
            camera,
            origin,
            ..
        } = ctx;

        let bytes: &[u8] = bytemuck::cast_slice(&self.vertices);
        let buffer = match self.buffer {
            Some(buffer) => {
                gpu.update_vertex_buffer(buffer, bytes);
                buffer
            }
            None => {
                let buffer = gpu.create_vertex_buffer(bytes, size_of::<ParticleVertex>());
                self.buffer = Some(buffer);
                buffer
            }
        };
        trace!("draw {} particles", self.vertices.len());

        gpu.use_pass(PassKind::Particle);
        particle_pass.setup(gpu, camera, to_gl(*origin));
        gpu.draw_points(buffer, self.vertices.len());
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recorder::Recorder;
    use glam::Vec3;

    fn sparks() -> Vec<Particle> {
        vec![
            Particle {
                origin: Vec3::new(1.0, 2.0, 3.0),
                color: 4,
            },
            Particle {
                origin: Vec3::new(-8.0, 0.0, 16.0),
                color: 250,
            },
        ]
    }

    #[test]
    fn vertices_are_gl_space_and_palette_coloured() {
        let mut pal = Palette::default();
        pal[4] = 0xFF_12_34_56;
        let v = ParticleVertex::new(&sparks()[0], &pal);
        assert_eq!(v.position, [1.0, 3.0, -2.0]);
        assert_eq!(v.color, 0xFF_12_34_56);
    }

    #[test]
    fn no_particles_draw_nothing() {
        let mut ctx = RenderContext::new(Recorder::default(), 320, 240);
        let mut r = ParticleRenderer::default();
        r.render(&mut ctx, &[], &Palette::default());
        assert!(ctx.gpu.draws.is_empty());
        assert!(ctx.gpu.vertex_buffers.is_empty());
        assert!(ctx.gpu.particle_uniforms().is_none());
    }

    #[test]
    fn buffer_is_reused_across_frames() {
        let mut ctx = RenderContext::new(Recorder::default(), 320, 240);
        ctx.origin = Vec3::new(10.0, 20.0, 30.0);
        let pal = Palette::default();
        let mut r = ParticleRenderer::default();
        let mut particles = sparks();

        r.render(&mut ctx, &particles, &pal);
        particles.push(Particle::default());
        r.render(&mut ctx, &particles, &pal);

        assert_eq!(ctx.gpu.vertex_buffers.len(), 1);
        let draws = ctx.gpu.take_draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].vertices, draws[1].vertices);
        assert!(draws.iter().all(|d| d.pass == PassKind::Particle));
        assert_eq!(draws[1].indices, [0, 1, 2]);

        let stored: Vec<ParticleVertex> = ctx.gpu.vertices(draws[1].vertices);
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[1].color, pal[250]);
        assert_eq!(ctx.gpu.particle_uniforms().unwrap().origin, [10.0, 30.0, -20.0, 1.0]);
    }
}
