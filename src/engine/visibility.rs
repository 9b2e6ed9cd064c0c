//! PVS marking and the front-to-back BSP walk.
//!
//! Two monotonically increasing counters drive everything: a node, leaf or
//! surface is "visible this pass" when its stamp equals `visframecount`,
//! an entity was "already listed this frame" when its stamp equals
//! `framecount`. Stamps are never cleared; a fresh `Visibility` (one per
//! map) is the only way to invalidate them all at once. With `u32`
//! counters that takes over a year of frames at 100 fps.

use glam::Vec3;
use log::{trace, warn};

use crate::engine::RenderError;
use crate::engine::frustum::{Frustum, box_to_gl, intersect_frustum_aabb};
use crate::world::client::{Entity, EntityId, EntityModel};
use crate::world::{BspLevel, Child, Contents, Leaf, LeafId, SurfaceId, pvs_contains};

pub struct Visibility {
    visframecount: u32,
    framecount: u32,
    old_view_leaf: Option<LeafId>,
    node_visframe: Vec<u32>,
    leaf_visframe: Vec<u32>,
    surface_visframe: Vec<u32>,
    entity_visframe: Vec<u32>,
    visible_entities: Vec<EntityId>,
    max_visible_entities: usize,
}

impl Visibility {
    pub fn new(level: &BspLevel, max_visible_entities: usize) -> Self {
        Self {
            visframecount: 0,
            framecount: 0,
            old_view_leaf: None,
            node_visframe: vec![0; level.nodes.len()],
            leaf_visframe: vec![0; level.leaves.len()],
            surface_visframe: vec![0; level.surfaces.len()],
            entity_visframe: Vec::new(),
            visible_entities: Vec::new(),
            max_visible_entities,
        }
    }

    #[inline]
    pub fn visframecount(&self) -> u32 {
        self.visframecount
    }

    #[inline]
    pub fn framecount(&self) -> u32 {
        self.framecount
    }

    /// Visibility stamp of every surface.
    #[inline]
    pub fn surface_visframes(&self) -> &[u32] {
        &self.surface_visframe
    }

    #[inline]
    pub fn is_surface_visible(&self, s: SurfaceId) -> bool {
        self.surface_visframe[s] == self.visframecount
    }

    /// Entities found in visible leaves this frame, in walk order.
    #[inline]
    pub fn visible_entities(&self) -> &[EntityId] {
        &self.visible_entities
    }

    /// Start a frame: bump `framecount`, forget last frame's entity list.
    pub fn begin_frame(&mut self, entity_count: usize) {
        self.framecount = self.framecount.wrapping_add(1);
        self.visible_entities.clear();
        if self.entity_visframe.len() < entity_count {
            self.entity_visframe.resize(entity_count, 0);
        }
    }

    /// Stamp every node above a leaf in the PVS of `view_leaf`.
    ///
    /// Skipped (returns `false`) when the view is still in the same leaf.
    pub fn mark_leaves(&mut self, level: &BspLevel, view_leaf: LeafId) -> bool {
        if self.old_view_leaf == Some(view_leaf) {
            return false;
        }
        self.visframecount = self.visframecount.wrapping_add(1);
        self.old_view_leaf = Some(view_leaf);
        let stamp = self.visframecount;

        let vis = level.leaf_pvs(view_leaf);
        let mut marked = 0;
        for leaf in 1..=level.vis_leaf_count() {
            if !pvs_contains(&vis, leaf) || self.leaf_visframe[leaf] == stamp {
                continue;
            }
            self.leaf_visframe[leaf] = stamp;
            marked += 1;
            let mut node = level.leaves[leaf].parent;
            while let Some(n) = node {
                if self.node_visframe[n] == stamp {
                    break;
                }
                self.node_visframe[n] = stamp;
                node = level.nodes[n].parent;
            }
        }
        trace!("view leaf {view_leaf}: {marked} leaves in PVS (pass {stamp})");
        true
    }

    /// Walk the tree under `child` near side first.
    ///
    /// Leaves stamp their mark surfaces and list their entities; nodes hand
    /// each of their own stamped surfaces to `emit` between the two
    /// subtrees.
    pub fn walk_bsp_tree<F>(
        &mut self,
        level: &BspLevel,
        child: Child,
        origin: Vec3,
        frustum: &Frustum,
        entities: &[Entity],
        emit: &mut F,
    ) -> Result<(), RenderError>
    where
        F: FnMut(SurfaceId) -> Result<(), RenderError>,
    {
        let stamp = self.visframecount;
        match child {
            Child::Leaf(l) => {
                let leaf = &level.leaves[l];
                if leaf.contents == Contents::Solid || self.leaf_visframe[l] != stamp {
                    return Ok(());
                }
                if !intersect_frustum_aabb(frustum, &box_to_gl(leaf.mins, leaf.maxs)) {
                    return Ok(());
                }
                for &s in level.leaf_surfaces(leaf) {
                    self.surface_visframe[s] = stamp;
                }
                self.store_efrags(leaf, entities)
            }
            Child::Node(n) => {
                let node = &level.nodes[n];
                if self.node_visframe[n] != stamp {
                    return Ok(());
                }
                if !intersect_frustum_aabb(frustum, &box_to_gl(node.mins, node.maxs)) {
                    return Ok(());
                }
                let side = (level.planes[node.plane].distance(origin) < 0.0) as usize;

                self.walk_bsp_tree(level, node.children[side], origin, frustum, entities, emit)?;
                for s in node.surfaces() {
                    if self.surface_visframe[s] == stamp {
                        emit(s)?;
                    }
                }
                self.walk_bsp_tree(level, node.children[side ^ 1], origin, frustum, entities, emit)
            }
        }
    }

    /// Add the entities touching `leaf` to the visible list, once per frame.
    fn store_efrags(&mut self, leaf: &Leaf, entities: &[Entity]) -> Result<(), RenderError> {
        for &e in &leaf.efrags {
            let Some(entity) = entities.get(e) else {
                warn!("entity fragment points at missing entity {e}");
                continue;
            };
            if entity.model == EntityModel::None {
                return Err(RenderError::BadEntityModel { entity: e });
            }
            if self.entity_visframe.len() <= e {
                self.entity_visframe.resize(e + 1, 0);
            }
            if self.entity_visframe[e] == self.framecount {
                continue;
            }
            if self.visible_entities.len() >= self.max_visible_entities {
                warn!("visible entity list full, dropping entity {e}");
                continue;
            }
            self.visible_entities.push(e);
            self.entity_visframe[e] = self.framecount;
        }
        Ok(())
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::frustum::extract_view_planes;
    use crate::world::Camera;
    use crate::world::builder::{FaceLight, LevelBuilder, box_faces};
    use crate::world::Plane;
    use crate::world::texture::MipTexture;

    /// Two rooms side by side along X, split by the plane x = 64:
    /// leaf 1 = west (x < 64), leaf 2 = east. Each room owns a floor.
    /// The west room sees only itself; the east room sees both.
    fn two_rooms() -> BspLevel {
        let mut b = LevelBuilder::new();
        let t = b.add_texture(MipTexture::solid("floor", 16, 16, 1));
        let west = box_faces(Vec3::ZERO, Vec3::new(64.0, 64.0, 64.0));
        let east = box_faces(Vec3::new(64.0, 0.0, 0.0), Vec3::new(128.0, 64.0, 64.0));
        let fw = b.add_face(&west[0], t, FaceLight::Uniform(&[(0, 50)])).unwrap();
        let fe = b.add_face(&east[0], t, FaceLight::Uniform(&[(0, 90)])).unwrap();
        let lw = b.add_leaf(Contents::Empty, &[fw]);
        let le = b.add_leaf(Contents::Empty, &[fe]);
        b.set_leaf_bounds(lw, Vec3::ZERO, Vec3::new(64.0, 64.0, 64.0));
        b.set_leaf_bounds(le, Vec3::new(64.0, 0.0, 0.0), Vec3::new(128.0, 64.0, 64.0));
        b.set_visibility(lw, &[lw]);
        b.set_visibility(le, &[lw, le]);
        let root = b.add_node(
            Plane::new(Vec3::X, 64.0),
            [Child::Leaf(le), Child::Leaf(lw)],
            fw..fe + 1,
        );
        b.finish(Child::Node(root))
    }

    fn frustum_all() -> Frustum {
        // a camera far back that sees the whole level
        let cam = Camera::from_view(Vec3::new(-400.0, 32.0, 32.0), Vec3::ZERO, 90.0, 1.0);
        extract_view_planes(&cam.view_proj)
    }

    fn walk(vis: &mut Visibility, level: &BspLevel, origin: Vec3) -> Vec<SurfaceId> {
        let mut emitted = Vec::new();
        vis.begin_frame(0);
        vis.mark_leaves(level, level.point_in_leaf(origin));
        vis.walk_bsp_tree(
            level,
            level.world().head_node,
            origin,
            &frustum_all(),
            &[],
            &mut |s| {
                emitted.push(s);
                Ok(())
            },
        )
        .unwrap();
        emitted
    }

    #[test]
    fn same_leaf_does_not_recompute_pvs() {
        let level = two_rooms();
        let mut vis = Visibility::new(&level, 16);
        walk(&mut vis, &level, Vec3::new(100.0, 32.0, 32.0));
        let count = vis.visframecount();
        let marks = vis.surface_visframes().to_vec();

        walk(&mut vis, &level, Vec3::new(110.0, 20.0, 10.0));
        assert_eq!(vis.visframecount(), count);
        assert_eq!(vis.surface_visframes(), &marks[..]);
        assert_eq!(vis.framecount(), 2);
    }

    #[test]
    fn pvs_prunes_invisible_leaves() {
        let level = two_rooms();
        let mut vis = Visibility::new(&level, 16);

        // from the east room both floors are potentially visible
        walk(&mut vis, &level, Vec3::new(100.0, 32.0, 32.0));
        assert!(vis.is_surface_visible(0) && vis.is_surface_visible(1));

        // from the west room only its own
        walk(&mut vis, &level, Vec3::new(10.0, 32.0, 32.0));
        assert!(vis.is_surface_visible(0));
        assert!(!vis.is_surface_visible(1));
    }

    #[test]
    fn node_emits_surfaces_stamped_by_its_near_side() {
        let level = two_rooms();
        let mut vis = Visibility::new(&level, 16);
        // the root owns both floors; only the near leaf has stamped its
        // floor by the time the root's surfaces are emitted
        assert_eq!(walk(&mut vis, &level, Vec3::new(100.0, 32.0, 32.0)), vec![1]);
        assert_eq!(walk(&mut vis, &level, Vec3::new(10.0, 32.0, 32.0)), vec![0]);
    }

    #[test]
    fn entities_are_listed_once_per_frame() {
        let mut level = two_rooms();
        level.leaves[1].efrags.push(1);
        level.leaves[2].efrags.push(1);
        level.leaves[2].efrags.push(2);
        let entities = vec![
            Entity::default(),
            Entity {
                model: EntityModel::Brush(1),
                ..Entity::default()
            },
            Entity {
                model: EntityModel::Sprite,
                ..Entity::default()
            },
        ];
        let mut vis = Visibility::new(&level, 16);
        let origin = Vec3::new(100.0, 32.0, 32.0);
        vis.begin_frame(entities.len());
        vis.mark_leaves(&level, level.point_in_leaf(origin));
        vis.walk_bsp_tree(&level, level.world().head_node, origin, &frustum_all(), &entities, &mut |_| Ok(()))
            .unwrap();
        assert_eq!(vis.visible_entities(), &[1, 2]);
    }

    #[test]
    fn visible_entity_list_is_capped() {
        let mut level = two_rooms();
        level.leaves[2].efrags.extend([1, 2]);
        let entities = vec![
            Entity::default(),
            Entity {
                model: EntityModel::Sprite,
                ..Entity::default()
            },
            Entity {
                model: EntityModel::Sprite,
                ..Entity::default()
            },
        ];
        let mut vis = Visibility::new(&level, 1);
        let origin = Vec3::new(100.0, 32.0, 32.0);
        vis.begin_frame(entities.len());
        vis.mark_leaves(&level, level.point_in_leaf(origin));
        vis.walk_bsp_tree(&level, level.world().head_node, origin, &frustum_all(), &entities, &mut |_| Ok(()))
            .unwrap();
        assert_eq!(vis.visible_entities(), &[1]);
    }

    #[test]
    fn entity_without_model_is_fatal() {
        let mut level = two_rooms();
        level.leaves[2].efrags.push(0);
        let entities = vec![Entity::default()];
        let mut vis = Visibility::new(&level, 16);
        let origin = Vec3::new(100.0, 32.0, 32.0);
        vis.begin_frame(1);
        vis.mark_leaves(&level, level.point_in_leaf(origin));
        let err = vis
            .walk_bsp_tree(&level, level.world().head_node, origin, &frustum_all(), &entities, &mut |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, RenderError::BadEntityModel { entity: 0 }));
    }
}
