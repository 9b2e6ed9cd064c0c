//! Renderer tunables.

/// Knobs of the level and frame renderers. `Default` gives the stock
/// values.
#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    /// Edge of the square lightmap atlas, in texels.
    pub lightmap_atlas_size: usize,
    /// Border texels replicated around every lightmap tile.
    pub lightmap_atlas_padding: usize,
    /// Shelves are never opened lower than this.
    pub atlas_min_row_height: usize,
    /// How far below a point `light_point` looks for a lit surface.
    pub light_probe_depth: f32,
    pub max_visible_entities: usize,
    /// The view weapon is never darker than this.
    pub view_model_min_light: f32,
    /// Horizontal field of view in degrees.
    pub fov_x: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            lightmap_atlas_size: 1024,
            lightmap_atlas_padding: 1,
            atlas_min_row_height: 16,
            light_probe_depth: 2048.0,
            max_visible_entities: 256,
            view_model_min_light: 0.1,
            fov_x: 90.0,
        }
    }
}
