//! Alias-model renderer.
//!
//! Every pose of every frame is uploaded once into a single vertex buffer;
//! a frame is then just the offset of its pose, passed as the base vertex
//! of the two indexed draws (front-facing and back-facing triangles).

use std::collections::HashSet;

use glam::Vec3;
use log::{debug, warn};
use once_cell::sync::Lazy;

use crate::engine::frustum::{
    alias_model_matrix, box_to_gl, extract_view_planes, intersect_frustum_aabb, to_gl,
};
use crate::engine::vertex::{VertexAttr, VertexFlags};
use crate::renderer::pass::{PassFlags, Shading, UNIT_DIFFUSE};
use crate::renderer::{
    BufferHandle, Filter, Gpu, Indices, PassKind, RenderContext, TextureDesc, TextureHandle, Wrap,
};
use crate::world::alias::{AliasFrame, AliasModel, AliasSkin, TriVertex};
use crate::world::client::{Entity, MAX_LIGHTSTYLES};
use crate::world::texture::Palette;

/// Models that carry their own light (projectiles, flames).
static FULL_BRIGHT_MODELS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "progs/bolt.mdl",
        "progs/bolt2.mdl",
        "progs/bolt3.mdl",
        "progs/lavaball.mdl",
        "progs/missile.mdl",
        "progs/flame.mdl",
        "progs/flame2.mdl",
    ]
    .into_iter()
    .collect()
});

/// Alias meshes have no lightmap: every style channel reads as dark.
const NO_LIGHT_STYLES: [f32; MAX_LIGHTSTYLES] = [0.0; MAX_LIGHTSTYLES];

/// One pose in the model's vertex buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexRange {
    pub offset: u32,
    /// Time at which this pose ends (grouped frames only).
    pub timestamp: f32,
}

#[derive(Clone, Debug)]
pub enum ModelFrame {
    Single { name: String, range: VertexRange },
    Group { name: String, ranges: Vec<VertexRange> },
}

impl ModelFrame {
    pub fn name(&self) -> &str {
        match self {
            ModelFrame::Single { name, .. } | ModelFrame::Group { name, .. } => name,
        }
    }

    /// Vertex offset of the pose shown at `time`.
    pub fn resolve(&self, time: f32) -> u32 {
        match self {
            ModelFrame::Single { range, .. } => range.offset,
            ModelFrame::Group { ranges, .. } => {
                pick_interval(ranges, |r| r.timestamp, time).map_or(0, |r| r.offset)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum Skin {
    Single(TextureHandle),
    /// Textures with the time at which each one ends.
    Group(Vec<(TextureHandle, f32)>),
}

impl Skin {
    pub fn resolve(&self, time: f32) -> Option<TextureHandle> {
        match self {
            Skin::Single(t) => Some(*t),
            Skin::Group(frames) => pick_interval(frames, |f| f.1, time).map(|f| f.0),
        }
    }
}

/// Wrap `time` into the cycle ending at the last entry's timestamp and
/// return the first entry ending after it (the last one if none does).
fn pick_interval<T>(entries: &[T], end_of: impl Fn(&T) -> f32, time: f32) -> Option<&T> {
    let full = end_of(entries.last()?);
    let target = if full > 0.0 {
        time - (time / full).trunc() * full
    } else {
        0.0
    };
    let i = entries.partition_point(|e| end_of(e) <= target);
    entries.get(i.min(entries.len() - 1))
}

pub struct ModelRenderer {
    name: String,
    full_bright: bool,
    vertices: BufferHandle,
    front: BufferHandle,
    front_count: usize,
    back: BufferHandle,
    back_count: usize,
    frames: Vec<ModelFrame>,
    skins: Vec<Skin>,
    mins: Vec3,
    maxs: Vec3,
}

impl ModelRenderer {
    pub fn new<G: Gpu>(gpu: &mut G, model: &AliasModel, palette: &Palette) -> Self {
        let skin_desc = TextureDesc {
            width: model.skin_width,
            height: model.skin_height,
            wrap: Wrap::Repeat,
            min_filter: Filter::Nearest,
            mag_filter: Filter::Nearest,
        };
        let mut upload = |pixels: &[u8]| gpu.create_texture(&skin_desc, &[palette.expand(pixels)]);
        let skins: Vec<Skin> = model
            .skins
            .iter()
            .map(|skin| match skin {
                AliasSkin::Single(pixels) => Skin::Single(upload(pixels)),
                AliasSkin::Group(frames) => {
                    Skin::Group(frames.iter().map(|(p, t)| (upload(p), *t)).collect())
                }
            })
            .collect();

        let mut vertex_data = Vec::new();
        let frames = model
            .frames
            .iter()
            .map(|frame| match frame {
                AliasFrame::Single { name, verts } => {
                    let range = VertexRange {
                        offset: vertex_data.len() as u32,
                        timestamp: 0.0,
                    };
                    add_pose(model, verts, &mut vertex_data);
                    ModelFrame::Single {
                        name: name.clone(),
                        range,
                    }
                }
                AliasFrame::Group { name, frames } => {
                    let ranges = frames
                        .iter()
                        .map(|(verts, interval)| {
                            let range = VertexRange {
                                offset: vertex_data.len() as u32,
                                timestamp: *interval,
                            };
                            add_pose(model, verts, &mut vertex_data);
                            range
                        })
                        .collect();
                    ModelFrame::Group {
                        name: name.clone(),
                        ranges,
                    }
                }
            })
            .collect();

        let (mut front, mut back) = (Vec::new(), Vec::new());
        for tri in &model.triangles {
            let side = if tri.faces_front { &mut front } else { &mut back };
            side.extend_from_slice(&tri.vertices);
        }

        debug!(
            "alias model {}: {} frames, {} skins, {} vertices",
            model.name,
            model.frames.len(),
            skins.len(),
            vertex_data.len()
        );
        Self {
            name: model.name.clone(),
            full_bright: FULL_BRIGHT_MODELS.contains(model.name.as_str()),
            vertices: gpu.create_vertex_buffer(
                bytemuck::cast_slice(&vertex_data),
                size_of::<VertexAttr>(),
            ),
            front: gpu.create_index_buffer(Indices::U16(&front)),
            front_count: front.len(),
            back: gpu.create_index_buffer(Indices::U16(&back)),
            back_count: back.len(),
            frames,
            skins,
            mins: model.mins,
            maxs: model.maxs,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_full_bright(&self) -> bool {
        self.full_bright
    }

    #[inline]
    pub fn frames(&self) -> &[ModelFrame] {
        &self.frames
    }

    #[inline]
    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertices
    }

    /// Draw `entity` lit uniformly by `ambient` (0..=1).
    pub fn render<G: Gpu>(
        &self,
        ctx: &mut RenderContext<G>,
        entity: &Entity,
        client_time: f64,
        ambient: f32,
    ) {
        let Some(frame) = self.frames.get(entity.frame) else {
            warn!("{}: no frame {}", self.name, entity.frame);
            return;
        };
        let ambient = if self.full_bright { 1.0 } else { ambient };
        let time = entity.syncbase + client_time as f32;

        let model = alias_model_matrix(entity.origin, entity.angles);
        let planes = extract_view_planes(&(ctx.camera.view_proj * model));
        if !intersect_frustum_aabb(&planes, &box_to_gl(self.mins, self.maxs)) {
            return;
        }

        let offset = frame.resolve(time) as i32;
        let skin = self.skins.first().and_then(|s| s.resolve(time));
        let RenderContext {
            gpu,
            default_pass,
            camera,
            time: now,
            ..
        } = ctx;

        gpu.use_pass(PassKind::Default);
        gpu.bind_texture(UNIT_DIFFUSE, skin);

        let front = Shading::ambient(ambient, PassFlags::empty());
        default_pass.setup(gpu, camera, &model, &NO_LIGHT_STYLES, front, *now);
        gpu.draw_indexed(self.vertices, self.front, self.front_count, offset);

        let back = Shading::ambient(ambient, PassFlags::BACK_SIDE);
        default_pass.setup(gpu, camera, &model, &NO_LIGHT_STYLES, back, *now);
        gpu.draw_indexed(self.vertices, self.back, self.back_count, offset);

        gpu.bind_texture(UNIT_DIFFUSE, None);
    }
}

/// Append one pose: GL-space positions and normals, skin coordinates.
fn add_pose(model: &AliasModel, verts: &[TriVertex], out: &mut Vec<VertexAttr>) {
    let (w, h) = (model.skin_width.max(1) as f32, model.skin_height.max(1) as f32);
    for (v, st) in verts.iter().zip(&model.st_verts) {
        let flags = if st.on_seam {
            VertexFlags::ON_SEAM
        } else {
            VertexFlags::empty()
        };
        out.push(VertexAttr {
            position: to_gl(model.decode(v)).to_array(),
            normal: to_gl(v.normal).to_array(),
            light_uv: [0.0; 2],
            diffuse_uv: [(st.s >> 16) as f32 / w, (st.t >> 16) as f32 / h],
            styles: [0; 4],
            flags: flags.bits(),
        });
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recorder::Recorder;
    use crate::world::Camera;
    use crate::world::alias::{StVert, Triangle};
    use crate::world::client::EntityModel;

    /// A 10×10 quad, one front and one back triangle, a single frame and a
    /// two-pose group.
    fn quad_model(name: &str) -> AliasModel {
        let tv = |x, y, z| TriVertex {
            v: [x, y, z],
            normal: Vec3::Z,
        };
        let pose = vec![tv(0, 0, 0), tv(10, 0, 0), tv(10, 10, 0), tv(0, 10, 0)];
        let st = |s: i32, t: i32, on_seam| StVert {
            s: s << 16,
            t: t << 16,
            on_seam,
        };
        AliasModel {
            name: name.into(),
            skin_width: 8,
            skin_height: 4,
            scale: Vec3::ONE,
            scale_origin: Vec3::new(-5.0, -5.0, 0.0),
            skins: vec![AliasSkin::Single(vec![3; 32])],
            st_verts: vec![st(0, 0, false), st(4, 0, true), st(4, 2, false), st(0, 2, false)],
            triangles: vec![
                Triangle {
                    faces_front: true,
                    vertices: [0, 1, 2],
                },
                Triangle {
                    faces_front: false,
                    vertices: [0, 2, 3],
                },
            ],
            frames: vec![
                AliasFrame::Single {
                    name: "stand".into(),
                    verts: pose.clone(),
                },
                AliasFrame::Group {
                    name: "flicker".into(),
                    frames: vec![(pose.clone(), 0.1), (pose, 0.2)],
                },
            ],
            mins: Vec3::new(-5.0, -5.0, 0.0),
            maxs: Vec3::new(5.0, 5.0, 10.0),
        }
    }

    fn context() -> RenderContext<Recorder> {
        let mut ctx = RenderContext::new(Recorder::default(), 320, 240);
        let eye = Vec3::new(-50.0, 0.0, 5.0);
        let cam = Camera::from_view(eye, Vec3::ZERO, 90.0, ctx.aspect());
        ctx.set_view(cam, eye, 0.0);
        ctx
    }

    fn entity(frame: usize, origin: Vec3) -> Entity {
        Entity {
            model: EntityModel::Alias(0),
            origin,
            frame,
            ..Entity::default()
        }
    }

    #[test]
    fn grouped_frame_wraps_by_last_interval() {
        let r = |offset, timestamp| VertexRange { offset, timestamp };
        let frame = ModelFrame::Group {
            name: "g".into(),
            ranges: vec![r(0, 0.1), r(10, 0.2), r(20, 0.3)],
        };
        assert_eq!(frame.resolve(0.05), 0);
        assert_eq!(frame.resolve(0.15), 10);
        assert_eq!(frame.resolve(0.25), 20);
        assert_eq!(frame.resolve(0.35), 0);
        assert_eq!(frame.resolve(0.1), 10);

        let single = ModelFrame::Single {
            name: "s".into(),
            range: r(42, 0.0),
        };
        assert_eq!(single.resolve(123.0), 42);
        assert_eq!(single.name(), "s");
    }

    #[test]
    fn grouped_skin_follows_the_same_rule() {
        let skin = Skin::Group(vec![(TextureHandle(1), 0.5), (TextureHandle(2), 1.0)]);
        assert_eq!(skin.resolve(0.2), Some(TextureHandle(1)));
        assert_eq!(skin.resolve(0.7), Some(TextureHandle(2)));
        assert_eq!(skin.resolve(1.2), Some(TextureHandle(1)));
        assert_eq!(Skin::Group(Vec::new()).resolve(1.0), None);
    }

    #[test]
    fn every_pose_lands_in_one_buffer() {
        let mut gpu = Recorder::default();
        let r = ModelRenderer::new(&mut gpu, &quad_model("progs/quad.mdl"), &Palette::default());
        let verts: Vec<VertexAttr> = gpu.vertices(r.vertex_buffer());
        assert_eq!(verts.len(), 3 * 4);
        assert_eq!(r.frames()[0].resolve(0.0), 0);
        assert_eq!(r.frames()[1].resolve(0.05), 4);
        assert_eq!(r.frames()[1].resolve(0.15), 8);

        // (10, 0, 0) + (-5, -5, 0) in Quake space
        assert_eq!(verts[1].position, [5.0, 0.0, 5.0]);
        assert_eq!(verts[1].normal, [0.0, 1.0, 0.0]);
        assert_eq!(verts[1].diffuse_uv, [0.5, 0.0]);
        assert_eq!(verts[1].flags, VertexFlags::ON_SEAM.bits());
        assert_eq!(verts[2].flags, 0);
        assert_eq!(verts[2].diffuse_uv, [0.5, 0.5]);
        assert!(!r.is_full_bright());
    }

    #[test]
    fn render_draws_front_then_back_at_frame_offset() {
        let mut ctx = context();
        let r = ModelRenderer::new(&mut ctx.gpu, &quad_model("progs/quad.mdl"), &Palette::default());
        r.render(&mut ctx, &entity(1, Vec3::ZERO), 0.15, 0.5);

        let draws = ctx.gpu.take_draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].indices, vec![0, 1, 2]);
        assert_eq!(draws[1].indices, vec![0, 2, 3]);
        assert!(draws.iter().all(|d| d.base_vertex == 8));
        assert_eq!(draws[0].flags, 0);
        assert_eq!(draws[1].flags, PassFlags::BACK_SIDE.bits());
        assert_eq!(draws[0].ambient, [0.5, 0.5, 0.5, 1.0]);
        assert!(draws[0].textures[UNIT_DIFFUSE as usize].is_some());
    }

    #[test]
    fn full_bright_models_ignore_ambient() {
        let mut ctx = context();
        let r = ModelRenderer::new(&mut ctx.gpu, &quad_model("progs/flame.mdl"), &Palette::default());
        assert!(r.is_full_bright());
        r.render(&mut ctx, &entity(0, Vec3::ZERO), 0.0, 0.2);
        let draws = ctx.gpu.take_draws();
        assert_eq!(draws[0].ambient, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(draws[0].base_vertex, 0);
    }

    #[test]
    fn unknown_frame_or_culled_model_draws_nothing() {
        let mut ctx = context();
        let r = ModelRenderer::new(&mut ctx.gpu, &quad_model("progs/quad.mdl"), &Palette::default());
        r.render(&mut ctx, &entity(7, Vec3::ZERO), 0.0, 1.0);
        assert!(ctx.gpu.take_draws().is_empty());

        // behind the eye
        r.render(&mut ctx, &entity(0, Vec3::new(-200.0, 0.0, 0.0)), 0.0, 1.0);
        assert!(ctx.gpu.take_draws().is_empty());
    }
}
