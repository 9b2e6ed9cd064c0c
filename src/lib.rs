//! OpenGL-style renderer for Quake levels and alias models.
//!
//! `world` holds the level and client data the renderer reads, `renderer`
//! the GPU abstraction and shader passes, `engine` the renderers proper.

pub mod config;
pub mod engine;
pub mod renderer;
pub mod world;

pub use config::RendererConfig;
