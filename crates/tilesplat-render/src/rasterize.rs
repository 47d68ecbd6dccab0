use std::ops::Range;

use glam::{UVec2, Vec2, Vec3};

use crate::{project::ProjectedSplat, tile_offsets::TileOffsets};

/// Alphas are clamped to this so a single splat never makes a pixel fully opaque.
pub const MAX_ALPHA: f32 = 0.999;
/// Contributions below this alpha are skipped.
pub const MIN_ALPHA: f32 = 1.0 / 255.0;
/// A pixel stops compositing before its transmittance would drop to this.
pub const TRANSMITTANCE_THRESHOLD: f32 = 1e-4;

/// Opacity of a splat at a pixel center, `None` if it doesn't contribute.
#[inline]
pub fn splat_alpha(mean2d: Vec2, conic: Vec3, opacity: f32, pixel_center: Vec2) -> Option<f32> {
    let d = pixel_center - mean2d;
    let sigma = 0.5 * (conic.x * d.x * d.x + conic.z * d.y * d.y) + conic.y * d.x * d.y;
    // Phrased as positive to bail on NaN.
    if !(sigma >= 0.0) {
        return None;
    }
    let alpha = opacity * (-sigma).exp();
    if !(alpha >= MIN_ALPHA) {
        return None;
    }
    Some(alpha.min(MAX_ALPHA))
}

/// Everything the compositor reads per projected splat, laid out as `[C][N]`.
pub struct RasterInputs<'a> {
    pub projected: &'a [ProjectedSplat],
    /// Opacity used for compositing, including any compensation.
    pub opacities: Vec<f32>,
    /// `[C][N][channels]`
    pub colors: Vec<f32>,
    pub channels: usize,
}

impl RasterInputs<'_> {
    fn color(&self, flat_id: u32) -> &[f32] {
        let start = flat_id as usize * self.channels;
        &self.colors[start..start + self.channels]
    }

    fn alpha_at(&self, flat_id: u32, pixel_center: Vec2) -> Option<f32> {
        let splat = &self.projected[flat_id as usize];
        splat_alpha(
            splat.mean2d,
            splat.conic,
            self.opacities[flat_id as usize],
            pixel_center,
        )
    }
}

/// Rendered colors and alphas of a batch of images.
#[derive(Debug, Clone, PartialEq)]
pub struct Framebuffer {
    pub num_images: u32,
    pub img_size: UVec2,
    pub channels: usize,
    /// `[image][y][x][channels]`
    pub colors: Vec<f32>,
    /// `[image][y][x]`
    pub alphas: Vec<f32>,
}

impl Framebuffer {
    pub fn new(num_images: u32, img_size: UVec2, channels: usize) -> Self {
        let num_pixels = num_images as usize * img_size.x as usize * img_size.y as usize;
        Self {
            num_images,
            img_size,
            channels,
            colors: vec![0.0; num_pixels * channels],
            alphas: vec![0.0; num_pixels],
        }
    }

    pub fn pixels_per_image(&self) -> usize {
        self.img_size.x as usize * self.img_size.y as usize
    }

    pub fn pixel_index(&self, image: u32, x: u32, y: u32) -> usize {
        let row = y as usize * self.img_size.x as usize;
        image as usize * self.pixels_per_image() + row + x as usize
    }

    pub fn color(&self, image: u32, x: u32, y: u32) -> &[f32] {
        let start = self.pixel_index(image, x, y) * self.channels;
        &self.colors[start..start + self.channels]
    }

    pub fn alpha(&self, image: u32, x: u32, y: u32) -> f32 {
        self.alphas[self.pixel_index(image, x, y)]
    }

    pub fn image_colors(&self, image: u32) -> &[f32] {
        let len = self.pixels_per_image() * self.channels;
        let start = image as usize * len;
        &self.colors[start..start + len]
    }

    pub fn image_alphas(&self, image: u32) -> &[f32] {
        let len = self.pixels_per_image();
        let start = image as usize * len;
        &self.alphas[start..start + len]
    }

    /// Blend a background behind every image, `backgrounds` is `[image][channels]`.
    pub fn composite_background(&mut self, backgrounds: &[f32]) {
        let pixels_per_image = self.pixels_per_image();
        let channels = self.channels;
        for (pixel, (color, &alpha)) in self
            .colors
            .chunks_exact_mut(channels)
            .zip(&self.alphas)
            .enumerate()
        {
            let image = pixel / pixels_per_image;
            let background = &backgrounds[image * channels..(image + 1) * channels];
            for (c, &bg) in color.iter_mut().zip(background) {
                *c += bg * (1.0 - alpha);
            }
        }
    }
}

/// A splat that contributes to a pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelIsect {
    /// Flattened `image * N + gaussian` index.
    pub flat_id: u32,
    /// Pixel index into a [`Framebuffer`], including the image offset.
    pub pixel: u32,
    pub alpha: f32,
}

/// Contributions found by [`rasterize_to_indices_in_range`].
#[derive(Debug, Clone, Default)]
pub struct BatchIndices {
    /// Per pixel in depth order.
    pub isects: Vec<PixelIsect>,
    /// Pixels that saturated inside the window. The splat that would have pushed
    /// them over the threshold is not included.
    pub saturated: Vec<u32>,
}

/// Iterate the pixels of one tile, clipped to the image.
fn tile_pixels(
    tile_x: u32,
    tile_y: u32,
    tile_size: u32,
    img_size: UVec2,
) -> impl Iterator<Item = UVec2> {
    let min = glam::uvec2(tile_x, tile_y) * tile_size;
    let max = (min + tile_size).min(img_size);
    (min.y..max.y).flat_map(move |y| (min.x..max.x).map(move |x| glam::uvec2(x, y)))
}

/// Gather the contributions of the intersections in `window` of every tile.
///
/// `window` is relative to the start of each tile's range. Pixels start from
/// `transmittances` (`[image][y][x]`), a transmittance of zero marks a pixel as
/// finished. Pixel indices are `u32`, so all images together must have at most
/// `u32::MAX` pixels.
pub fn rasterize_to_indices_in_range(
    window: Range<u32>,
    transmittances: &[f32],
    inputs: &RasterInputs<'_>,
    tile_offsets: &TileOffsets,
    flatten_ids: &[u32],
    img_size: UVec2,
    tile_size: u32,
) -> BatchIndices {
    let mut out = BatchIndices::default();
    let tile_bounds = tile_offsets.tile_bounds;
    let pixels_per_image = img_size.x * img_size.y;

    for image in 0..tile_offsets.num_images {
        for tile_y in 0..tile_bounds.y {
            for tile_x in 0..tile_bounds.x {
                let range = tile_offsets.range(image, tile_y * tile_bounds.x + tile_x);
                let start = (range.start + window.start as usize).min(range.end);
                let end = (range.start + window.end as usize).min(range.end);
                if start == end {
                    continue;
                }
                let ids = &flatten_ids[start..end];

                for pix in tile_pixels(tile_x, tile_y, tile_size, img_size) {
                    let pixel = image * pixels_per_image + pix.y * img_size.x + pix.x;
                    let mut t = transmittances[pixel as usize];
                    if t <= 0.0 {
                        continue;
                    }
                    let center = pix.as_vec2() + 0.5;

                    for &flat_id in ids {
                        let Some(alpha) = inputs.alpha_at(flat_id, center) else {
                            continue;
                        };
                        let next_t = t * (1.0 - alpha);
                        if next_t <= TRANSMITTANCE_THRESHOLD {
                            out.saturated.push(pixel);
                            break;
                        }
                        out.isects.push(PixelIsect {
                            flat_id,
                            pixel,
                            alpha,
                        });
                        t = next_t;
                    }
                }
            }
        }
    }
    out
}

/// Front to back composite gathered contributions into `framebuffer`.
///
/// Contributions of a pixel must be in depth order. `transmittances` is updated
/// so later batches continue where this one stopped.
pub fn accumulate(
    isects: &[PixelIsect],
    inputs: &RasterInputs<'_>,
    framebuffer: &mut Framebuffer,
    transmittances: &mut [f32],
) {
    let channels = framebuffer.channels;
    for isect in isects {
        let pixel = isect.pixel as usize;
        let t = transmittances[pixel];
        let weight = isect.alpha * t;

        let color = &mut framebuffer.colors[pixel * channels..(pixel + 1) * channels];
        for (c, &src) in color.iter_mut().zip(inputs.color(isect.flat_id)) {
            *c += weight * src;
        }
        framebuffer.alphas[pixel] += weight;
        transmittances[pixel] = t * (1.0 - isect.alpha);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositorState {
    /// No batch has run yet.
    Pending,
    /// The next batch to run.
    Draining { step: u32 },
    Done,
}

/// Composites all tiles in lock step, one window of `batch_size` intersections
/// per tile at a time.
pub struct BatchCompositor<'a> {
    inputs: &'a RasterInputs<'a>,
    tile_offsets: &'a TileOffsets,
    flatten_ids: &'a [u32],
    tile_size: u32,
    batch_size: u32,
    max_range: u32,
    transmittances: Vec<f32>,
    num_active: usize,
    framebuffer: Framebuffer,
    state: CompositorState,
}

impl<'a> BatchCompositor<'a> {
    pub fn new(
        inputs: &'a RasterInputs<'a>,
        tile_offsets: &'a TileOffsets,
        flatten_ids: &'a [u32],
        img_size: UVec2,
        tile_size: u32,
        batch_size: u32,
    ) -> Self {
        let framebuffer = Framebuffer::new(tile_offsets.num_images, img_size, inputs.channels);
        let num_pixels = framebuffer.alphas.len();
        Self {
            inputs,
            tile_offsets,
            flatten_ids,
            tile_size,
            batch_size,
            max_range: tile_offsets.max_range(),
            transmittances: vec![1.0; num_pixels],
            num_active: num_pixels,
            framebuffer,
            state: CompositorState::Pending,
        }
    }

    pub fn state(&self) -> CompositorState {
        self.state
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Run the next batch.
    pub fn step(&mut self) -> CompositorState {
        let step = match self.state {
            CompositorState::Pending => 0,
            CompositorState::Draining { step } => step,
            CompositorState::Done => return CompositorState::Done,
        };

        let start = step as u64 * self.batch_size as u64;
        if start >= self.max_range as u64 || self.num_active == 0 {
            self.state = CompositorState::Done;
            return self.state;
        }
        let end = (start + self.batch_size as u64).min(self.max_range as u64);
        let window = start as u32..end as u32;

        let batch = rasterize_to_indices_in_range(
            window,
            &self.transmittances,
            self.inputs,
            self.tile_offsets,
            self.flatten_ids,
            self.framebuffer.img_size,
            self.tile_size,
        );
        accumulate(
            &batch.isects,
            self.inputs,
            &mut self.framebuffer,
            &mut self.transmittances,
        );
        for &pixel in &batch.saturated {
            self.transmittances[pixel as usize] = 0.0;
        }
        self.num_active -= batch.saturated.len();

        self.state = if end >= self.max_range as u64 || self.num_active == 0 {
            CompositorState::Done
        } else {
            CompositorState::Draining { step: step + 1 }
        };
        self.state
    }

    /// Run all remaining batches and return the composited images.
    pub fn finish(mut self) -> Framebuffer {
        let mut num_batches = 0;
        while self.state != CompositorState::Done {
            self.step();
            num_batches += 1;
        }
        log::debug!("Composited in {num_batches} batches");
        self.framebuffer
    }
}

/// Composite every tile with the batched reference compositor.
pub fn rasterize_to_pixels(
    inputs: &RasterInputs<'_>,
    tile_offsets: &TileOffsets,
    flatten_ids: &[u32],
    img_size: UVec2,
    tile_size: u32,
    batch_size: u32,
) -> Framebuffer {
    let _span = tracing::trace_span!("rasterize").entered();
    BatchCompositor::new(
        inputs,
        tile_offsets,
        flatten_ids,
        img_size,
        tile_size,
        batch_size,
    )
    .finish()
}
