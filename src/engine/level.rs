//! Level renderer: loads brush models into one vertex buffer plus a
//! lightmap atlas, then draws the world and brush entities through texture
//! chains.
//!
//! Lifecycle: `load_brush_model` for the world, then for every submodel,
//! then `build` once. Drawing before `build` or loading after it is an
//! error.

use std::time::Instant;

use glam::{Mat4, Vec3};
use log::{info, warn};

use crate::config::RendererConfig;
use crate::engine::RenderError;
use crate::engine::atlas::TextureAtlasBuilder;
use crate::engine::chains::{DrawBuffers, TextureChains};
use crate::engine::frustum::{
    box_to_gl, brush_model_matrix, extract_view_planes, intersect_frustum_aabb,
};
use crate::engine::light::{animate_light_styles, recursive_light_point};
use crate::engine::vertex::{VertexAttr, build_surface_vertices, combine_lightmaps};
use crate::engine::visibility::Visibility;
use crate::renderer::{Gpu, RenderContext};
use crate::world::client::{ClientState, Entity, EntityId, EntityModel, MAX_LIGHTSTYLES};
use crate::world::texture::{Palette, TextureId};
use crate::world::{BspLevel, SubModelId, SurfaceId};

/// CPU-side geometry gathered until `build`.
struct Loading {
    vertices: Vec<VertexAttr>,
    lightmaps: TextureAtlasBuilder<u32>,
}

pub struct LevelRenderer {
    config: RendererConfig,
    palette: Palette,
    loading: Option<Loading>,
    buffers: Option<DrawBuffers>,
    chains: TextureChains,
    /// First vertex of every loaded surface.
    surface_first_vertex: Vec<Option<u32>>,
    vis: Option<Visibility>,
    light_styles: [f32; MAX_LIGHTSTYLES],
}

impl LevelRenderer {
    pub fn new(config: RendererConfig, palette: Palette) -> Self {
        let lightmaps = TextureAtlasBuilder::new(
            config.lightmap_atlas_size,
            config.lightmap_atlas_padding,
            config.atlas_min_row_height,
        );
        Self {
            config,
            palette,
            loading: Some(Loading {
                vertices: Vec::new(),
                lightmaps,
            }),
            buffers: None,
            chains: TextureChains::default(),
            surface_first_vertex: Vec::new(),
            vis: None,
            light_styles: [1.0; MAX_LIGHTSTYLES],
        }
    }

    #[inline]
    pub fn is_built(&self) -> bool {
        self.buffers.is_some()
    }

    #[inline]
    pub fn chains(&self) -> &TextureChains {
        &self.chains
    }

    #[inline]
    pub fn buffers(&self) -> Option<&DrawBuffers> {
        self.buffers.as_ref()
    }

    #[inline]
    pub fn visibility(&self) -> Option<&Visibility> {
        self.vis.as_ref()
    }

    /// Light-style brightness computed by the last `render_world`.
    #[inline]
    pub fn light_styles(&self) -> &[f32; MAX_LIGHTSTYLES] {
        &self.light_styles
    }

    /// Entities met in visible leaves during the last `render_world`.
    pub fn visible_entities(&self) -> &[EntityId] {
        self.vis.as_ref().map_or(&[][..], |v| v.visible_entities())
    }

    /// First vertex of surface `s`, once its model was loaded.
    #[inline]
    pub fn surface_first_vertex(&self, s: SurfaceId) -> Option<u32> {
        self.surface_first_vertex.get(s).copied().flatten()
    }

    /// Upload the textures of brush model `model` and append its surfaces
    /// to the level geometry. Model 0 (the world) must come first; it
    /// resets the texture chains.
    pub fn load_brush_model<G: Gpu>(
        &mut self,
        gpu: &mut G,
        level: &BspLevel,
        model: SubModelId,
    ) -> Result<(), RenderError> {
        if self.loading.is_none() {
            return Err(RenderError::LoadAfterBuild);
        }
        let Some(sub) = level.submodels.get(model) else {
            warn!("brush model {model} does not exist in {}", level.name);
            return Ok(());
        };

        if model == 0 {
            self.chains.reset(gpu);
            for (id, tex) in level.textures.iter().enumerate() {
                if let Some(tex) = tex {
                    self.chains.register(gpu, id, tex, &self.palette);
                }
            }
            self.surface_first_vertex = vec![None; level.surfaces.len()];
            self.vis = Some(Visibility::new(level, self.config.max_visible_entities));
        } else {
            if self.vis.is_none() {
                return Err(RenderError::WorldNotFirst);
            }
            for s in sub.surfaces() {
                let Some(base) = level.tex_infos[level.surfaces[s].tex_info].texture else {
                    continue;
                };
                self.register_cycle(gpu, level, base);
                let alternate = level
                    .textures
                    .get(base)
                    .and_then(Option::as_ref)
                    .and_then(|t| t.alternate_anims);
                if let Some(alt) = alternate {
                    self.register_cycle(gpu, level, alt);
                }
            }
        }

        let Some(Loading { vertices, lightmaps }) = self.loading.as_mut() else {
            return Err(RenderError::LoadAfterBuild);
        };
        let first = vertices.len();
        for s in sub.surfaces() {
            let surf = &level.surfaces[s];
            let tile = combine_lightmaps(level, surf)
                .map(|image| lightmaps.add_image(&image))
                .transpose()?;
            self.surface_first_vertex[s] = Some(vertices.len() as u32);
            build_surface_vertices(level, surf, tile.as_ref(), vertices);
        }
        info!(
            "load brush model {model}: {} surfaces, {} vertices",
            sub.num_surfaces,
            vertices.len() - first
        );
        Ok(())
    }

    /// Register every frame of the animation cycle starting at `start`.
    fn register_cycle<G: Gpu>(&mut self, gpu: &mut G, level: &BspLevel, start: TextureId) {
        let mut id = Some(start);
        let total = level
            .textures
            .get(start)
            .and_then(Option::as_ref)
            .map_or(1, |t| t.anim_total.max(1));
        for _ in 0..total {
            let Some(tex_id) = id else { break };
            let Some(tex) = level.textures.get(tex_id).and_then(Option::as_ref) else {
                break;
            };
            if !self.chains.is_registered(tex_id) {
                self.chains.register(gpu, tex_id, tex, &self.palette);
            }
            id = tex.anim_next;
        }
    }

    /// Upload the gathered geometry and the lightmap atlas.
    pub fn build<G: Gpu>(&mut self, gpu: &mut G) {
        let Some(Loading { vertices, lightmaps }) = self.loading.take() else {
            warn!("level is already built");
            return;
        };
        let start = Instant::now();
        let vertex_buffer =
            gpu.create_vertex_buffer(bytemuck::cast_slice(&vertices), size_of::<VertexAttr>());
        // a chain never holds more indices than there are vertices
        let index_buffer = gpu.create_dynamic_index_buffer(vertices.len());
        let lightmap = lightmaps.build(gpu);
        self.buffers = Some(DrawBuffers {
            vertices: vertex_buffer,
            indices: index_buffer,
            lightmap,
        });
        info!("built level: {} vertices in {:.2?}", vertices.len(), start.elapsed());
    }

    /// Draw the world seen from `ctx.origin`. `entity` is the world entity;
    /// its frame selects alternate texture animations.
    pub fn render_world<G: Gpu>(
        &mut self,
        ctx: &mut RenderContext<G>,
        level: &BspLevel,
        client: &ClientState,
        entity: &Entity,
    ) -> Result<(), RenderError> {
        let buffers = self.buffers.ok_or(RenderError::NotBuilt)?;
        let vis = self.vis.as_mut().ok_or(RenderError::NotBuilt)?;

        animate_light_styles(&client.light_styles, client.time, &mut self.light_styles);
        vis.begin_frame(client.entities.len());
        vis.mark_leaves(level, level.point_in_leaf(ctx.origin));

        let frustum = extract_view_planes(&ctx.camera.view_proj);
        let chains = &mut self.chains;
        let first_vertex = &self.surface_first_vertex;
        vis.walk_bsp_tree(
            level,
            level.world().head_node,
            ctx.origin,
            &frustum,
            &client.entities,
            &mut |s| emit(chains, level, first_vertex, s, entity.frame, client.time),
        )?;
        chains.render(ctx, &buffers, &Mat4::IDENTITY, &self.light_styles);
        Ok(())
    }

    /// Draw a brush entity (door, lift, …) with its own transform.
    pub fn render_submodel<G: Gpu>(
        &mut self,
        ctx: &mut RenderContext<G>,
        level: &BspLevel,
        client: &ClientState,
        entity: &Entity,
    ) -> Result<(), RenderError> {
        let buffers = self.buffers.ok_or(RenderError::NotBuilt)?;
        let EntityModel::Brush(id) = entity.model else {
            warn!("render_submodel called for a {:?} entity", entity.model);
            return Ok(());
        };
        let Some(sub) = level.submodels.get(id) else {
            warn!("brush model {id} does not exist in {}", level.name);
            return Ok(());
        };

        let model = brush_model_matrix(entity.origin, entity.angles);
        let planes = extract_view_planes(&(ctx.camera.view_proj * model));
        if !intersect_frustum_aabb(&planes, &box_to_gl(sub.mins, sub.maxs)) {
            return Ok(());
        }

        for s in sub.surfaces() {
            emit(&mut self.chains, level, &self.surface_first_vertex, s, entity.frame, client.time)?;
        }
        self.chains.render(ctx, &buffers, &model, &self.light_styles);
        Ok(())
    }

    /// Static light (0..=1) below point `p`, never darker than
    /// `ambient / 255`. Levels without light data are fully lit.
    pub fn light_point(&self, level: &BspLevel, p: Vec3, ambient: i32) -> f32 {
        if level.light_data.is_empty() {
            return 1.0;
        }
        let end = p - Vec3::Z * self.config.light_probe_depth;
        let r = recursive_light_point(level, level.world().head_node, p, end, &self.light_styles);
        r.max(0).max(ambient) as f32 / 255.0
    }
}

fn emit(
    chains: &mut TextureChains,
    level: &BspLevel,
    first_vertex: &[Option<u32>],
    s: SurfaceId,
    frame: usize,
    time: f64,
) -> Result<(), RenderError> {
    let Some(first) = first_vertex.get(s).copied().flatten() else {
        warn!("surface {s} was never loaded");
        return Ok(());
    };
    chains.emit_surface(level, s, first, frame, time)?;
    Ok(())
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
