use glam::UVec2;
use rayon::prelude::*;

use crate::{
    rasterize::{Framebuffer, RasterInputs, TRANSMITTANCE_THRESHOLD, splat_alpha},
    tile_offsets::TileOffsets,
};

struct TileOutput {
    image: u32,
    min: UVec2,
    max: UVec2,
    colors: Vec<f32>,
    alphas: Vec<f32>,
}

fn render_tile(
    image: u32,
    tile: u32,
    inputs: &RasterInputs<'_>,
    tile_offsets: &TileOffsets,
    flatten_ids: &[u32],
    img_size: UVec2,
    tile_size: u32,
) -> TileOutput {
    let tile_bounds = tile_offsets.tile_bounds;
    let min = glam::uvec2(tile % tile_bounds.x, tile / tile_bounds.x) * tile_size;
    let max = (min + tile_size).min(img_size);
    let extent = max - min;
    let channels = inputs.channels;

    let mut colors = vec![0.0; (extent.x * extent.y) as usize * channels];
    let mut alphas = vec![0.0; (extent.x * extent.y) as usize];

    let ids = &flatten_ids[tile_offsets.range(image, tile)];

    for (local, (color, alpha_acc)) in colors
        .chunks_exact_mut(channels)
        .zip(alphas.iter_mut())
        .enumerate()
    {
        let local = local as u32;
        let pix = min + glam::uvec2(local % extent.x, local / extent.x);
        let center = pix.as_vec2() + 0.5;
        let mut t = 1.0;

        for &flat_id in ids {
            let splat = &inputs.projected[flat_id as usize];
            let Some(alpha) = splat_alpha(
                splat.mean2d,
                splat.conic,
                inputs.opacities[flat_id as usize],
                center,
            ) else {
                continue;
            };
            let next_t = t * (1.0 - alpha);
            if next_t <= TRANSMITTANCE_THRESHOLD {
                break;
            }
            let weight = alpha * t;
            let start = flat_id as usize * channels;
            let src = &inputs.colors[start..start + channels];
            for (c, &s) in color.iter_mut().zip(src) {
                *c += weight * s;
            }
            *alpha_acc += weight;
            t = next_t;
        }
    }

    TileOutput {
        image,
        min,
        max,
        colors,
        alphas,
    }
}

/// Composite every tile in one go, walking each tile's range once per pixel.
/// Tiles are rendered in parallel.
pub(crate) fn rasterize_tiled(
    inputs: &RasterInputs<'_>,
    tile_offsets: &TileOffsets,
    flatten_ids: &[u32],
    img_size: UVec2,
    tile_size: u32,
) -> Framebuffer {
    let _span = tracing::trace_span!("rasterize").entered();

    let tiles_per_image = tile_offsets.tiles_per_image();
    let num_tiles = tile_offsets.num_images * tiles_per_image;

    let tiles: Vec<TileOutput> = (0..num_tiles)
        .into_par_iter()
        .map(|index| {
            render_tile(
                index / tiles_per_image,
                index % tiles_per_image,
                inputs,
                tile_offsets,
                flatten_ids,
                img_size,
                tile_size,
            )
        })
        .collect();

    let mut framebuffer = Framebuffer::new(tile_offsets.num_images, img_size, inputs.channels);
    let channels = inputs.channels;
    for tile in tiles {
        let width = (tile.max.x - tile.min.x) as usize;
        for (row, y) in (tile.min.y..tile.max.y).enumerate() {
            let pixel = framebuffer.pixel_index(tile.image, tile.min.x, y);
            framebuffer.alphas[pixel..pixel + width]
                .copy_from_slice(&tile.alphas[row * width..(row + 1) * width]);
            let row_len = width * channels;
            framebuffer.colors[pixel * channels..(pixel + width) * channels]
                .copy_from_slice(&tile.colors[row * row_len..(row + 1) * row_len]);
        }
    }
    framebuffer
}
