//! The hardware renderer: level and model geometry, visibility and the
//! per-frame draw submission built on top of [`crate::renderer::Gpu`].

pub mod animation;
pub mod atlas;
pub mod chains;
pub mod frame;
pub mod frustum;
pub mod level;
pub mod light;
pub mod model;
pub mod particles;
pub mod pictures;
pub mod textures;
pub mod vertex;
pub mod visibility;

use thiserror::Error;

use crate::world::EntityId;

pub use animation::AnimationError;
pub use atlas::{AtlasError, TextureAtlasBuilder, TextureTile};
pub use frame::FrameRenderer;
pub use level::LevelRenderer;
pub use model::ModelRenderer;
pub use particles::ParticleRenderer;
pub use pictures::PictureCache;
pub use vertex::VertexAttr;
pub use visibility::Visibility;

/// Everything that stops a level from loading or a frame from drawing.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Atlas(#[from] AtlasError),

    #[error(transparent)]
    Animation(#[from] AnimationError),

    #[error("entity {entity} is in a visible leaf but has no model")]
    BadEntityModel { entity: EntityId },

    #[error("brush model loaded after the level was built")]
    LoadAfterBuild,

    #[error("the world must be the first brush model loaded")]
    WorldNotFirst,

    #[error("level drawn before it was built")]
    NotBuilt,
}
