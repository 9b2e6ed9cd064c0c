//! Per-map setup and per-frame orchestration: world, visible entities, the
//! view weapon and finally particles.

use std::time::Instant;

use glam::Vec4;
use log::{info, warn};

use crate::config::RendererConfig;
use crate::engine::RenderError;
use crate::engine::frustum::to_gl;
use crate::engine::level::LevelRenderer;
use crate::engine::model::ModelRenderer;
use crate::engine::particles::ParticleRenderer;
use crate::engine::pictures::{CachedPicture, PictureCache};
use crate::renderer::{DepthFunc, Gpu, RenderContext};
use crate::world::alias::AliasModel;
use crate::world::client::{ClientState, Entity, EntityModel};
use crate::world::texture::{Palette, Picture};
use crate::world::{BspLevel, Camera};

pub struct FrameRenderer {
    config: RendererConfig,
    level: LevelRenderer,
    models: Vec<ModelRenderer>,
    particles: ParticleRenderer,
    pictures: PictureCache,
    palette: Palette,
}

impl FrameRenderer {
    /// Load every brush model of `level` (world first) and every alias
    /// model, then build the level buffers.
    pub fn new_map<G: Gpu>(
        ctx: &mut RenderContext<G>,
        level: &BspLevel,
        alias_models: &[AliasModel],
        palette: &Palette,
        config: RendererConfig,
    ) -> Result<Self, RenderError> {
        let start = Instant::now();
        let mut renderer = LevelRenderer::new(config.clone(), palette.clone());
        for model in 0..level.submodels.len() {
            renderer.load_brush_model(&mut ctx.gpu, level, model)?;
        }
        let models = alias_models
            .iter()
            .enumerate()
            .map(|(i, model)| {
                info!("load alias model {i}: {}", model.name);
                ModelRenderer::new(&mut ctx.gpu, model, palette)
            })
            .collect();
        renderer.build(&mut ctx.gpu);
        info!("load level {}: {:.2?}", level.name, start.elapsed());

        Ok(Self {
            config,
            level: renderer,
            models,
            particles: ParticleRenderer::default(),
            pictures: PictureCache::default(),
            palette: palette.clone(),
        })
    }

    #[inline]
    pub fn level(&self) -> &LevelRenderer {
        &self.level
    }

    #[inline]
    pub fn models(&self) -> &[ModelRenderer] {
        &self.models
    }

    #[inline]
    pub fn pictures(&self) -> &PictureCache {
        &self.pictures
    }

    /// Upload a named 2D picture with the level palette.
    pub fn cache_picture<G: Gpu>(
        &mut self,
        ctx: &mut RenderContext<G>,
        name: &str,
        pic: &Picture,
    ) -> CachedPicture {
        self.pictures.cache_picture(&mut ctx.gpu, name, pic, &self.palette)
    }

    /// Draw one frame as seen from the client's view origin.
    pub fn render_view<G: Gpu>(
        &mut self,
        ctx: &mut RenderContext<G>,
        level: &BspLevel,
        client: &ClientState,
    ) -> Result<(), RenderError> {
        push_dlights(ctx, client);

        let camera = Camera::from_view(
            client.view_origin,
            client.view_angles,
            self.config.fov_x,
            ctx.aspect(),
        );
        ctx.set_view(camera, client.view_origin, client.time);

        let world = client.entities.first().cloned().unwrap_or_default();
        self.level.render_world(ctx, level, client, &world)?;

        let visible = self.level.visible_entities().to_vec();
        for e in visible {
            if e == client.view_entity {
                continue;
            }
            let Some(entity) = client.entities.get(e) else {
                continue;
            };
            match entity.model {
                EntityModel::Brush(0) => {} // the world, drawn above
                EntityModel::Brush(_) => self.level.render_submodel(ctx, level, client, entity)?,
                EntityModel::Alias(_) => {
                    let light = self.level.light_point(level, entity.origin, client.ambient_light);
                    self.render_alias(ctx, entity, client, light);
                }
                EntityModel::Sprite | EntityModel::None => {}
            }
        }

        if let Some(weapon) = &client.view_model {
            // always some light on the gun
            let light = self
                .level
                .light_point(level, weapon.origin, client.ambient_light)
                .max(self.config.view_model_min_light);
            ctx.gpu.set_depth_func(DepthFunc::Always);
            self.render_alias(ctx, weapon, client, light);
            ctx.gpu.set_depth_func(DepthFunc::Less);
            self.render_alias(ctx, weapon, client, light);
        }

        self.particles.render(ctx, &client.particles, &self.palette);
        Ok(())
    }

    fn render_alias<G: Gpu>(
        &self,
        ctx: &mut RenderContext<G>,
        entity: &Entity,
        client: &ClientState,
        light: f32,
    ) {
        let EntityModel::Alias(id) = entity.model else {
            return;
        };
        match self.models.get(id) {
            Some(model) => model.render(ctx, entity, client.time, light),
            None => warn!("no renderer for alias model {id}"),
        }
    }
}

/// Hand the live dynamic lights to the default pass, in GL space.
fn push_dlights<G: Gpu>(ctx: &mut RenderContext<G>, client: &ClientState) {
    let lights: Vec<Vec4> = client
        .dlights
        .iter()
        .filter(|d| d.die > client.time && d.radius != 0.0)
        .map(|d| to_gl(d.origin).extend(d.radius))
        .collect();
    ctx.default_pass.update_dlights(&lights);
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::particles::ParticleVertex;
    use crate::renderer::recorder::Recorder;
    use crate::renderer::{PassFlags, PassKind};
    use crate::world::alias::{AliasFrame, AliasSkin, StVert, TriVertex, Triangle};
    use crate::world::builder::{FaceLight, LevelBuilder, box_faces};
    use crate::world::client::{DynamicLight, Particle};
    use crate::world::texture::MipTexture;
    use crate::world::{Child, Contents, Plane};
    use glam::Vec3;

    /// A lit floor under a room-sized leaf, plus a door submodel standing
    /// at x = 160.
    fn room_with_door() -> BspLevel {
        let mut b = LevelBuilder::new();
        let wall = b.add_texture(MipTexture::solid("wall", 16, 16, 1));
        let door = b.add_texture(MipTexture::solid("door", 16, 16, 2));
        let size = Vec3::new(256.0, 256.0, 128.0);
        let floor = b.add_face(&box_faces(Vec3::ZERO, size)[0], wall, FaceLight::Uniform(&[(0, 200)])).unwrap();
        let room = b.add_leaf(Contents::Empty, &[floor]);
        b.set_leaf_bounds(room, Vec3::ZERO, size);
        b.set_visibility(room, &[room]);
        let head = b.add_node(Plane::new(Vec3::Z, 0.0), [Child::Leaf(room), Child::Leaf(0)], floor..floor + 1);

        let panel = box_faces(Vec3::new(160.0, 96.0, 0.0), Vec3::new(176.0, 160.0, 96.0))[2];
        let d = b.add_face(&panel, door, FaceLight::Uniform(&[(0, 80)])).unwrap();
        let door_node = b.add_node(Plane::new(Vec3::X, 160.0), [Child::Leaf(0), Child::Leaf(0)], d..d + 1);
        b.add_submodel(Child::Node(door_node), d..d + 1, Vec3::ZERO);

        let mut level = b.finish(Child::Node(head));
        level.leaves[room].efrags.extend([1, 2, 3, 4]);
        level
    }

    fn torch() -> AliasModel {
        let tv = |x, y, z| TriVertex {
            v: [x, y, z],
            normal: Vec3::Z,
        };
        let st = StVert {
            s: 0,
            t: 0,
            on_seam: false,
        };
        AliasModel {
            name: "progs/torch.mdl".into(),
            skin_width: 4,
            skin_height: 4,
            scale: Vec3::ONE,
            scale_origin: Vec3::new(-4.0, -4.0, 0.0),
            skins: vec![AliasSkin::Single(vec![9; 16])],
            st_verts: vec![st; 3],
            triangles: vec![
                Triangle {
                    faces_front: true,
                    vertices: [0, 1, 2],
                },
                Triangle {
                    faces_front: false,
                    vertices: [2, 1, 0],
                },
            ],
            frames: vec![AliasFrame::Single {
                name: "burn".into(),
                verts: vec![tv(0, 0, 0), tv(8, 0, 0), tv(0, 0, 8)],
            }],
            mins: Vec3::new(-4.0, -4.0, 0.0),
            maxs: Vec3::new(4.0, 4.0, 8.0),
        }
    }

    fn client() -> ClientState {
        let eye = Vec3::new(32.0, 128.0, 64.0);
        let alias = |origin| Entity {
            model: EntityModel::Alias(0),
            origin,
            ..Entity::default()
        };
        ClientState {
            time: 5.0,
            entities: vec![
                Entity {
                    model: EntityModel::Brush(0),
                    ..Entity::default()
                },
                alias(eye), // the player
                Entity {
                    model: EntityModel::Brush(1),
                    ..Entity::default()
                },
                alias(Vec3::new(128.0, 128.0, 16.0)),
                Entity {
                    model: EntityModel::Sprite,
                    ..Entity::default()
                },
            ],
            view_entity: 1,
            view_model: Some(alias(eye)),
            dlights: vec![
                DynamicLight {
                    origin: Vec3::new(1.0, 2.0, 3.0),
                    radius: 200.0,
                    die: 6.0,
                },
                DynamicLight {
                    origin: Vec3::ZERO,
                    radius: 200.0,
                    die: 4.0,
                },
                DynamicLight {
                    origin: Vec3::ZERO,
                    radius: 0.0,
                    die: 6.0,
                },
            ],
            view_origin: eye,
            ..ClientState::default()
        }
    }

    fn setup() -> (RenderContext<Recorder>, BspLevel, FrameRenderer) {
        let mut ctx = RenderContext::new(Recorder::default(), 320, 240);
        let level = room_with_door();
        let frame = FrameRenderer::new_map(
            &mut ctx,
            &level,
            &[torch()],
            &Palette::default(),
            RendererConfig::default(),
        )
        .unwrap();
        (ctx, level, frame)
    }

    #[test]
    fn new_map_loads_and_builds_everything() {
        let (_, level, frame) = setup();
        assert!(frame.level().is_built());
        assert_eq!(frame.models().len(), 1);
        assert_eq!(frame.level().surface_first_vertex(1), Some(6));
        assert!(level.submodels.len() == 2);
    }

    #[test]
    fn only_live_dlights_reach_the_pass() {
        let (mut ctx, level, mut frame) = setup();
        frame.render_view(&mut ctx, &level, &client()).unwrap();
        assert_eq!(ctx.default_pass.num_dlights(), 1);
    }

    #[test]
    fn frame_draws_world_entities_then_weapon() {
        let (mut ctx, level, mut frame) = setup();
        frame.render_view(&mut ctx, &level, &client()).unwrap();
        let draws = ctx.gpu.take_draws();

        // world, door, torch front + back, weapon twice front + back
        assert_eq!(draws.len(), 8);
        assert_eq!(frame.level().visible_entities(), &[1, 2, 3, 4]);

        let floor_light = 199.0 / 255.0;
        for d in &draws[2..4] {
            assert_eq!(d.ambient, [floor_light, floor_light, floor_light, 1.0]);
            assert_eq!(d.depth, DepthFunc::Less);
        }
        assert_eq!(draws[3].flags, PassFlags::BACK_SIDE.bits());

        let depths: Vec<DepthFunc> = draws[4..].iter().map(|d| d.depth).collect();
        assert_eq!(
            depths,
            [DepthFunc::Always, DepthFunc::Always, DepthFunc::Less, DepthFunc::Less]
        );
    }

    #[test]
    fn weapon_is_never_pitch_black() {
        let (mut ctx, mut level, mut frame) = setup();
        level.surfaces[0].samples = None;
        frame.render_view(&mut ctx, &level, &client()).unwrap();
        let draws = ctx.gpu.take_draws();
        let weapon = &draws[draws.len() - 1];
        assert_eq!(weapon.ambient, [0.1, 0.1, 0.1, 1.0]);
        // the torch on the floor gets no such help
        assert_eq!(draws[2].ambient, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn particles_are_drawn_last() {
        let (mut ctx, level, mut frame) = setup();
        let mut client = client();
        client.particles = (0..5u8)
            .map(|i| Particle {
                origin: Vec3::new(64.0, 64.0, 8.0 * i as f32),
                color: 100 + i,
            })
            .collect();
        frame.render_view(&mut ctx, &level, &client).unwrap();
        let draws = ctx.gpu.take_draws();

        assert_eq!(draws.len(), 9);
        assert!(draws[..8].iter().all(|d| d.pass != PassKind::Particle));
        let last = &draws[8];
        assert_eq!(last.pass, PassKind::Particle);
        assert_eq!(last.indices.len(), 5);
        assert_eq!(last.depth, DepthFunc::Less);

        let points: Vec<ParticleVertex> = ctx.gpu.vertices(last.vertices);
        assert_eq!(points[2].position, [64.0, 16.0, -64.0]);
        assert_eq!(points[4].color, Palette::default()[104]);
    }

    #[test]
    fn no_particles_means_no_particle_draw() {
        let (mut ctx, level, mut frame) = setup();
        frame.render_view(&mut ctx, &level, &client()).unwrap();
        let draws = ctx.gpu.take_draws();
        assert!(draws.iter().all(|d| d.pass != PassKind::Particle));
        assert!(ctx.gpu.particle_uniforms().is_none());
    }

    #[test]
    fn pictures_use_the_map_palette() {
        let mut ctx = RenderContext::new(Recorder::default(), 320, 240);
        let mut palette = Palette::default();
        palette[7] = 0xFF_80_40_20;
        let level = room_with_door();
        let mut frame =
            FrameRenderer::new_map(&mut ctx, &level, &[], &palette, RendererConfig::default())
                .unwrap();
        let pic = Picture {
            width: 1,
            height: 1,
            pixels: vec![7],
        };
        let cached = frame.cache_picture(&mut ctx, "disc", &pic);
        assert_eq!(ctx.gpu.textures[&cached.texture].1[0], vec![0xFF_80_40_20]);
        assert!(frame.pictures().get("disc").is_some());
        assert!(frame.pictures().get("pause").is_none());
    }
}
