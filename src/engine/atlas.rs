//! Shelf-packed texture atlas for surface lightmaps.
//!
//! Images are copied into one shared canvas, each surrounded by a border
//! that replicates its outermost rows and columns, so bilinear filtering
//! never bleeds a neighbouring tile in. The canvas is uploaded once by
//! [`TextureAtlasBuilder::build`], which consumes the builder.

use log::info;

use crate::renderer::{Filter, Gpu, TextureDesc, TextureHandle, Wrap};

/// Row-major pixel grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image<P> {
    width: usize,
    height: usize,
    pixels: Vec<P>,
}

impl<P: Copy + Default> Image<P> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![P::default(); width * height],
        }
    }

    /// Wrap existing pixels; `None` when the length doesn't match.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<P>) -> Option<Self> {
        (pixels.len() == width * height).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }
    #[inline]
    pub fn pixels(&self) -> &[P] {
        &self.pixels
    }
    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [P] {
        &mut self.pixels
    }
    #[inline]
    pub fn row(&self, r: usize) -> &[P] {
        &self.pixels[r * self.width..(r + 1) * self.width]
    }
    #[inline]
    pub fn row_mut(&mut self, r: usize) -> &mut [P] {
        &mut self.pixels[r * self.width..(r + 1) * self.width]
    }
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> P {
        self.pixels[y * self.width + x]
    }
}

/// Placement of one image inside the atlas (border excluded).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureTile {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
    pub parent_w: usize,
    pub parent_h: usize,
}

impl TextureTile {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Tile-local texel coordinates → normalised atlas coordinates.
    #[inline]
    pub fn translate(&self, u: f32, v: f32) -> (f32, f32) {
        (
            (u + self.x as f32) / self.parent_w as f32,
            (v + self.y as f32) / self.parent_h as f32,
        )
    }

    /// Rectangle including the border, `(x, y, w, h)`.
    pub fn padded(&self, padding: usize) -> (usize, usize, usize, usize) {
        (
            self.x - padding,
            self.y - padding,
            self.w + 2 * padding,
            self.h + 2 * padding,
        )
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AtlasError {
    /// The level has more lightmap texels than the atlas budget.
    #[error("lightmap atlas full: {needed} rows needed at {free_top}, atlas is {height} high")]
    Full {
        needed: usize,
        free_top: usize,
        height: usize,
    },
}

/// Free span at the right end of one shelf.
#[derive(Clone, Copy, Debug)]
struct Row {
    x: usize,
    y: usize,
    w: usize,
    h: usize,
}

pub struct TextureAtlasBuilder<P> {
    canvas: Image<P>,
    padding: usize,
    min_row_height: usize,
    rows: Vec<Row>,
    free_top: usize,
}

impl<P: Copy + Default> TextureAtlasBuilder<P> {
    pub fn new(size: usize, padding: usize, min_row_height: usize) -> Self {
        Self {
            canvas: Image::new(size, size),
            padding,
            min_row_height,
            rows: Vec::new(),
            free_top: 0,
        }
    }

    /// The canvas as filled so far.
    pub fn image(&self) -> &Image<P> {
        &self.canvas
    }

    /// Pack `image`, first fit over the open shelves, else on a new shelf.
    pub fn add_image(&mut self, image: &Image<P>) -> Result<TextureTile, AtlasError> {
        let (w, h) = (image.width(), image.height());
        let pad = self.padding;
        let (padded_w, padded_h) = (w + 2 * pad, h + 2 * pad);

        let (px, py) = match self
            .rows
            .iter_mut()
            .find(|r| r.w >= padded_w && r.h >= padded_h)
        {
            Some(row) => {
                let at = (row.x, row.y);
                row.x += padded_w;
                row.w -= padded_w;
                at
            }
            None => {
                let alloc_h = self.min_row_height.max(padded_h);
                let top = self.free_top;
                if top + alloc_h > self.canvas.height() || padded_w > self.canvas.width() {
                    return Err(AtlasError::Full {
                        needed: alloc_h,
                        free_top: top,
                        height: self.canvas.height(),
                    });
                }
                self.free_top += alloc_h;
                self.rows.push(Row {
                    x: padded_w,
                    y: top,
                    w: self.canvas.width() - padded_w,
                    h: alloc_h,
                });
                (0, top)
            }
        };

        if w > 0 && h > 0 {
            /* top border, image, bottom border */
            for i in 0..pad {
                self.copy_line_padded(py + i, px, image.row(0));
            }
            for i in 0..h {
                self.copy_line_padded(py + pad + i, px, image.row(i));
            }
            for i in 0..pad {
                self.copy_line_padded(py + pad + h + i, px, image.row(h - 1));
            }
        }

        Ok(TextureTile {
            x: px + pad,
            y: py + pad,
            w,
            h,
            parent_w: self.canvas.width(),
            parent_h: self.canvas.height(),
        })
    }

    /// Write `src` at `(x, y)` with its end texels repeated `padding` times
    /// on each side.
    fn copy_line_padded(&mut self, y: usize, x: usize, src: &[P]) {
        let pad = self.padding;
        let (first, last) = (src[0], src[src.len() - 1]);
        let dst = &mut self.canvas.row_mut(y)[x..x + src.len() + 2 * pad];
        dst[..pad].fill(first);
        dst[pad..pad + src.len()].copy_from_slice(src);
        dst[pad + src.len()..].fill(last);
    }
}

impl TextureAtlasBuilder<u32> {
    /// Upload the canvas. Clamped, nearest minification, linear
    /// magnification.
    pub fn build<G: Gpu>(self, gpu: &mut G) -> TextureHandle {
        let used = self.free_top;
        let desc = TextureDesc {
            width: self.canvas.width(),
            height: self.canvas.height(),
            wrap: Wrap::ClampToEdge,
            min_filter: Filter::Nearest,
            mag_filter: Filter::Linear,
        };
        info!(
            "lightmap atlas: {} shelves, {used}/{} rows used",
            self.rows.len(),
            desc.height
        );
        gpu.create_texture(&desc, &[self.canvas.pixels])
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recorder::Recorder;

    fn img(w: usize, h: usize, base: u32) -> Image<u32> {
        let px = (0..w * h).map(|i| base + i as u32).collect();
        Image::from_pixels(w, h, px).unwrap()
    }

    fn overlaps(a: (usize, usize, usize, usize), b: (usize, usize, usize, usize)) -> bool {
        a.0 < b.0 + b.2 && b.0 < a.0 + a.2 && a.1 < b.1 + b.3 && b.1 < a.1 + a.3
    }

    #[test]
    fn first_image_lands_inside_its_border() {
        let mut atlas = TextureAtlasBuilder::<u32>::new(64, 1, 16);
        let tile = atlas.add_image(&img(3, 2, 10)).unwrap();
        assert_eq!((tile.x, tile.y, tile.w, tile.h), (1, 1, 3, 2));
        assert_eq!((tile.parent_w, tile.parent_h), (64, 64));
        assert_eq!(tile.translate(0.0, 0.0), (1.0 / 64.0, 1.0 / 64.0));
    }

    #[test]
    fn border_replicates_edges() {
        let mut atlas = TextureAtlasBuilder::<u32>::new(16, 1, 4);
        // 2x2: 10 11 / 12 13
        atlas.add_image(&img(2, 2, 10)).unwrap();
        let c = atlas.image();
        assert_eq!(&c.row(0)[..4], &[10, 10, 11, 11]);
        assert_eq!(&c.row(1)[..4], &[10, 10, 11, 11]);
        assert_eq!(&c.row(2)[..4], &[12, 12, 13, 13]);
        assert_eq!(&c.row(3)[..4], &[12, 12, 13, 13]);
    }

    #[test]
    fn shelves_fill_left_to_right_then_open_new_rows() {
        let mut atlas = TextureAtlasBuilder::<u32>::new(32, 1, 16);
        let a = atlas.add_image(&img(10, 4, 0)).unwrap();
        let b = atlas.add_image(&img(10, 4, 0)).unwrap();
        // 12 + 12 = 24 used, 8 left: a 10 wide image needs a new shelf
        let c = atlas.add_image(&img(10, 4, 0)).unwrap();
        assert_eq!((a.x, a.y), (1, 1));
        assert_eq!((b.x, b.y), (13, 1));
        assert_eq!((c.x, c.y), (1, 17));
    }

    #[test]
    fn tiles_never_overlap_and_stay_in_bounds() {
        let mut atlas = TextureAtlasBuilder::<u32>::new(128, 1, 16);
        let sizes = [(5, 5), (17, 3), (1, 1), (30, 20), (9, 14), (2, 31), (40, 2), (12, 12)];
        let tiles: Vec<TextureTile> = sizes
            .iter()
            .cycle()
            .take(24)
            .map(|&(w, h)| atlas.add_image(&img(w, h, 0)).unwrap())
            .collect();
        for (i, a) in tiles.iter().enumerate() {
            let pa = a.padded(1);
            assert!(pa.0 + pa.2 <= 128 && pa.1 + pa.3 <= 128);
            for b in &tiles[i + 1..] {
                assert!(!overlaps(pa, b.padded(1)), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn overflow_is_an_error() {
        let mut atlas = TextureAtlasBuilder::<u32>::new(32, 1, 16);
        atlas.add_image(&img(30, 14, 0)).unwrap();
        atlas.add_image(&img(30, 14, 0)).unwrap();
        assert_eq!(
            atlas.add_image(&img(30, 14, 0)),
            Err(AtlasError::Full {
                needed: 16,
                free_top: 32,
                height: 32
            })
        );
        let mut narrow = TextureAtlasBuilder::<u32>::new(8, 1, 4);
        assert!(narrow.add_image(&img(7, 1, 0)).is_err());
    }

    #[test]
    fn build_uploads_the_canvas_once() {
        let mut atlas = TextureAtlasBuilder::<u32>::new(16, 1, 4);
        atlas.add_image(&img(2, 2, 7)).unwrap();
        let mut gpu = Recorder::default();
        let handle = atlas.build(&mut gpu);
        let (desc, mips) = &gpu.textures[&handle];
        assert_eq!((desc.width, desc.height), (16, 16));
        assert_eq!(mips.len(), 1);
        assert_eq!(mips[0][0], 7);
    }
}
