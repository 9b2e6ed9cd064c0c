//! Per-texture index batching.
//!
//! Every visible surface appends its fan to the chain of its (animated)
//! texture; one draw per non-empty chain follows, then all chains are
//! cleared for the next batch.

use std::collections::HashMap;

use glam::Mat4;
use log::warn;

use crate::engine::animation::{AnimationError, texture_animation};
use crate::engine::frustum::to_gl;
use crate::engine::textures::{placeholder_texture, upload_sky, upload_texture};
use crate::renderer::pass::{
    Shading, UNIT_DIFFUSE, UNIT_LIGHTMAP, UNIT_SKY_BACKGROUND, UNIT_SKY_FOREGROUND,
};
use crate::renderer::{BufferHandle, Gpu, PassKind, RenderContext, TextureHandle};
use crate::world::client::MAX_LIGHTSTYLES;
use crate::world::texture::{MipTexture, Palette, TextureId};
use crate::world::{BspLevel, SurfaceFlags, SurfaceId};

/// Which pass a chain is drawn with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Diffuse,
    Turbulent,
    Sky,
}

impl ChainKind {
    /// Liquids and sky textures are recognised by name.
    pub fn of_texture(tex: &MipTexture) -> Self {
        if tex.is_turbulent() {
            ChainKind::Turbulent
        } else if tex.is_sky() {
            ChainKind::Sky
        } else {
            ChainKind::Diffuse
        }
    }

    /// Surfaces are routed by their draw flags.
    pub fn of_surface(flags: SurfaceFlags) -> Self {
        if flags.contains(SurfaceFlags::DRAWTURB) {
            ChainKind::Turbulent
        } else if flags.contains(SurfaceFlags::DRAWSKY) {
            ChainKind::Sky
        } else {
            ChainKind::Diffuse
        }
    }
}

#[derive(Debug)]
pub struct TextureChain {
    pub texture: TextureHandle,
    pub indices: Vec<u32>,
}

impl TextureChain {
    fn new(texture: TextureHandle) -> Self {
        Self {
            texture,
            indices: Vec::new(),
        }
    }
}

/// GPU objects a batch draws from.
#[derive(Clone, Copy, Debug)]
pub struct DrawBuffers {
    pub vertices: BufferHandle,
    pub indices: BufferHandle,
    pub lightmap: TextureHandle,
}

#[derive(Debug, Default)]
pub struct TextureChains {
    pub diffuse: Vec<TextureChain>,
    pub turbulent: Vec<TextureChain>,
    pub sky: Vec<TextureChain>,
    /// Background layer of `sky[i]`.
    pub sky_background: Vec<TextureHandle>,
    /// Chain index of every registered texture.
    registry: HashMap<TextureId, usize>,
}

impl TextureChains {
    /// Drop every chain; the diffuse list restarts with a 1×1 placeholder.
    pub fn reset<G: Gpu>(&mut self, gpu: &mut G) {
        self.diffuse.clear();
        self.turbulent.clear();
        self.sky.clear();
        self.sky_background.clear();
        self.registry.clear();
        self.diffuse.push(TextureChain::new(placeholder_texture(gpu)));
    }

    #[inline]
    pub fn is_registered(&self, id: TextureId) -> bool {
        self.registry.contains_key(&id)
    }

    /// Chain index of `id`, if it was registered.
    #[inline]
    pub fn chain_index(&self, id: TextureId) -> Option<usize> {
        self.registry.get(&id).copied()
    }

    /// Upload `tex` and give it a chain of its kind.
    pub fn register<G: Gpu>(&mut self, gpu: &mut G, id: TextureId, tex: &MipTexture, palette: &Palette) {
        let index = match ChainKind::of_texture(tex) {
            ChainKind::Sky => {
                let (front, back) = upload_sky(gpu, tex, palette);
                self.sky.push(TextureChain::new(front));
                self.sky_background.push(back);
                self.sky.len() - 1
            }
            ChainKind::Turbulent => {
                self.turbulent
                    .push(TextureChain::new(upload_texture(gpu, tex, palette)));
                self.turbulent.len() - 1
            }
            ChainKind::Diffuse => {
                self.diffuse
                    .push(TextureChain::new(upload_texture(gpu, tex, palette)));
                self.diffuse.len() - 1
            }
        };
        self.registry.insert(id, index);
    }

    fn chains_mut(&mut self, kind: ChainKind) -> &mut Vec<TextureChain> {
        match kind {
            ChainKind::Diffuse => &mut self.diffuse,
            ChainKind::Turbulent => &mut self.turbulent,
            ChainKind::Sky => &mut self.sky,
        }
    }

    /// Queue surface `s`, whose vertices start at `first_vertex`.
    ///
    /// Surfaces with an unregistered texture are skipped.
    pub fn emit_surface(
        &mut self,
        level: &BspLevel,
        s: SurfaceId,
        first_vertex: u32,
        frame: usize,
        time: f64,
    ) -> Result<(), AnimationError> {
        let surf = &level.surfaces[s];
        let Some(base) = level.tex_infos[surf.tex_info].texture else {
            return Ok(());
        };
        let texture = texture_animation(&level.textures, base, frame, time)?;
        let Some(index) = self.chain_index(texture) else {
            warn!("surface {s}: texture {texture} is not registered");
            return Ok(());
        };
        let Some(chain) = self.chains_mut(ChainKind::of_surface(surf.flags)).get_mut(index) else {
            warn!("surface {s}: no chain {index} for texture {texture}");
            return Ok(());
        };

        let mut base = first_vertex;
        for _ in 0..surf.num_edges.saturating_sub(2) {
            chain.indices.extend([base, base + 1, base + 2]);
            base += 3;
        }
        Ok(())
    }

    /// Draw and clear every non-empty chain.
    pub fn render<G: Gpu>(
        &mut self,
        ctx: &mut RenderContext<G>,
        buffers: &DrawBuffers,
        model: &Mat4,
        light_styles: &[f32; MAX_LIGHTSTYLES],
    ) {
        let RenderContext {
            gpu,
            default_pass,
            sky_pass,
            camera,
            origin,
            time,
            ..
        } = ctx;

        /* lightmapped walls */
        gpu.use_pass(PassKind::Default);
        default_pass.setup(gpu, camera, model, light_styles, Shading::LIGHTMAPPED, *time);
        gpu.bind_texture(UNIT_LIGHTMAP, Some(buffers.lightmap));
        for chain in self.diffuse.iter().filter(|c| !c.indices.is_empty()) {
            draw_chain(gpu, buffers, chain, UNIT_DIFFUSE);
        }
        gpu.bind_texture(UNIT_LIGHTMAP, None);

        /* liquids */
        default_pass.setup(gpu, camera, model, light_styles, Shading::TURBULENT, *time);
        for chain in self.turbulent.iter().filter(|c| !c.indices.is_empty()) {
            draw_chain(gpu, buffers, chain, UNIT_DIFFUSE);
        }

        /* sky */
        gpu.use_pass(PassKind::Sky);
        sky_pass.setup(gpu, camera, to_gl(*origin), *time);
        for (chain, &background) in self.sky.iter().zip(&self.sky_background) {
            if chain.indices.is_empty() {
                continue;
            }
            gpu.bind_texture(UNIT_SKY_BACKGROUND, Some(background));
            draw_chain(gpu, buffers, chain, UNIT_SKY_FOREGROUND);
            gpu.bind_texture(UNIT_SKY_BACKGROUND, None);
        }

        self.clear();
    }

    /// Forget queued indices, keeping the chains.
    pub fn clear(&mut self) {
        for chain in self
            .diffuse
            .iter_mut()
            .chain(self.turbulent.iter_mut())
            .chain(self.sky.iter_mut())
        {
            chain.indices.clear();
        }
    }

    /// Indices currently queued over all chains.
    pub fn queued(&self) -> usize {
        self.diffuse
            .iter()
            .chain(&self.turbulent)
            .chain(&self.sky)
            .map(|c| c.indices.len())
            .sum()
    }
}

fn draw_chain<G: Gpu>(gpu: &mut G, buffers: &DrawBuffers, chain: &TextureChain, unit: u32) {
    gpu.bind_texture(unit, Some(chain.texture));
    gpu.update_index_buffer(buffers.indices, &chain.indices);
    gpu.draw_indexed(buffers.vertices, buffers.indices, chain.indices.len(), 0);
    gpu.bind_texture(unit, None);
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
