pub mod alias;
mod bsp;
pub mod builder;
mod camera;
pub mod client;
mod geometry;
pub mod texture;

pub use bsp::{compress_vis, decompress_vis, pvs_contains};

pub use geometry::{
    BspLevel, Child, Contents, Edge, Leaf, LeafId, MAX_LIGHTMAPS, NO_STYLE, Node, NodeId, Plane,
    PlaneAxis, PlaneId, SubModel, SubModelId, Surface, SurfaceFlags, SurfaceId, TEX_SPECIAL,
    TexInfo, TexInfoId,
};

pub use camera::{Camera, angle_vectors};

pub use alias::{AliasFrame, AliasModel, AliasModelId, AliasSkin, StVert, Triangle, TriVertex};
pub use client::{ClientState, DynamicLight, Entity, EntityId, EntityModel, LightStyle, Particle};
pub use texture::{MipTexture, Palette, Picture, TextureError, TextureId};
