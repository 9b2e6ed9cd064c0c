//! Named 2D pictures uploaded once and looked up by name when drawn.

use std::collections::HashMap;

use log::{debug, warn};

use crate::renderer::{Filter, Gpu, TextureDesc, TextureHandle, Wrap};
use crate::world::texture::{Palette, Picture};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachedPicture {
    pub texture: TextureHandle,
    pub width: usize,
    pub height: usize,
}

#[derive(Default)]
pub struct PictureCache {
    entries: HashMap<String, CachedPicture>,
}

impl PictureCache {
    /// Upload `pic` under `name`. A name already cached keeps its first
    /// texture.
    pub fn cache_picture<G: Gpu>(
        &mut self,
        gpu: &mut G,
        name: &str,
        pic: &Picture,
        palette: &Palette,
    ) -> CachedPicture {
        if let Some(&cached) = self.entries.get(name) {
            return cached;
        }
        let mut pixels = palette.expand(&pic.pixels);
        pixels.resize(pic.width * pic.height, 0);
        let desc = TextureDesc {
            width: pic.width,
            height: pic.height,
            wrap: Wrap::ClampToEdge,
            min_filter: Filter::Nearest,
            mag_filter: Filter::Nearest,
        };
        let cached = CachedPicture {
            texture: gpu.create_texture(&desc, &[pixels]),
            width: pic.width,
            height: pic.height,
        };
        self.entries.insert(name.to_owned(), cached);
        debug!("cache picture {name}");
        cached
    }

    pub fn get(&self, name: &str) -> Option<&CachedPicture> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bind the picture `name` to `unit` ahead of an overlay draw.
    ///
    /// A picture that was never cached is skipped: nothing is bound and
    /// `None` comes back, so the caller draws nothing.
    pub fn bind<G: Gpu>(&self, gpu: &mut G, unit: u32, name: &str) -> Option<CachedPicture> {
        let Some(&cached) = self.entries.get(name) else {
            warn!("picture {name} drawn before it was cached");
            return None;
        };
        gpu.bind_texture(unit, Some(cached.texture));
        Some(cached)
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
