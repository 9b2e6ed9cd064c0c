//! Client-side simulation state the renderer reads every frame.
//!
//! Everything here is owned and mutated by the game simulation between
//! frames; the renderer only ever borrows it immutably.

use glam::Vec3;

use crate::world::alias::AliasModelId;
use crate::world::geometry::SubModelId;

/// Index into `ClientState::entities`.
pub type EntityId = usize;

/// Number of animated light channels.
pub const MAX_LIGHTSTYLES: usize = 64;

/// What an entity draws with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EntityModel {
    #[default]
    None,
    /// Brush submodel of the current level (doors, plats, …).
    Brush(SubModelId),
    /// Vertex-animated mesh.
    Alias(AliasModelId),
    Sprite,
}

#[derive(Clone, Debug, Default)]
pub struct Entity {
    pub model: EntityModel,
    pub origin: Vec3,
    /// Pitch, yaw, roll in degrees.
    pub angles: Vec3,
    /// Animation frame; for brush models non-zero selects the alternate
    /// texture animation.
    pub frame: usize,
    /// Per-entity offset added to the clock for grouped frames and skins.
    pub syncbase: f32,
}

/// One light-style waveform: `'a'` = dark, `'m'` = normal, `'z'` = double.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LightStyle {
    pub map: String,
}

impl LightStyle {
    pub fn new<S: Into<String>>(map: S) -> Self {
        Self { map: map.into() }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DynamicLight {
    pub origin: Vec3,
    pub radius: f32,
    /// Client time at which the light stops.
    pub die: f64,
}

/// A live particle; the simulation moves and expires them.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Particle {
    pub origin: Vec3,
    /// Palette index.
    pub color: u8,
}

#[derive(Clone, Debug)]
pub struct ClientState {
    /// Simulation clock in seconds, monotonically increasing.
    pub time: f64,
    pub light_styles: Vec<LightStyle>,
    pub entities: Vec<Entity>,
    /// Entity carrying the player (never drawn from the inside).
    pub view_entity: EntityId,
    /// First-person weapon.
    pub view_model: Option<Entity>,
    pub dlights: Vec<DynamicLight>,
    pub particles: Vec<Particle>,
    /// Minimum brightness (0..255) applied to sampled static light.
    pub ambient_light: i32,
    pub view_origin: Vec3,
    pub view_angles: Vec3,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            time: 0.0,
            light_styles: vec![LightStyle::default(); MAX_LIGHTSTYLES],
            entities: vec![Entity::default()],
            view_entity: 0,
            view_model: None,
            dlights: Vec::new(),
            particles: Vec::new(),
            ambient_light: 0,
            view_origin: Vec3::ZERO,
            view_angles: Vec3::ZERO,
        }
    }
}
