use glam::UVec2;

use crate::{
    RasterBackend, RenderStats,
    camera::Camera,
    dim_check::DimCheck,
    error::RenderError,
    gaussians::{ColorSource, Gaussians},
    intersects::isect_tiles,
    isect_key::{IsectKeyLayout, bit_length},
    options::RenderOptions,
    project::{ProjectedSplat, project_splats},
    rasterize::{Framebuffer, RasterInputs, rasterize_to_pixels},
    render_aux::RenderAux,
    tile_offsets::isect_offset_encode,
};

/// Nr. of tiles along x and y needed to cover an image.
pub fn calc_tile_bounds(img_size: UVec2, tile_size: u32) -> UVec2 {
    UVec2::new(
        img_size.x.div_ceil(tile_size),
        img_size.y.div_ceil(tile_size),
    )
}

impl RasterBackend {
    pub fn is_available(self) -> bool {
        match self {
            Self::Reference => true,
            Self::Tiled => cfg!(feature = "parallel"),
        }
    }
}

// Everything that can go wrong before doing any work.
fn check_inputs(
    gaussians: &Gaussians,
    colors: &dyn ColorSource,
    cameras: &[Camera],
    options: &RenderOptions,
    backgrounds: Option<&[f32]>,
) -> Result<UVec2, RenderError> {
    options.validate()?;

    if !options.backend.is_available() {
        return Err(RenderError::BackendUnavailable(options.backend));
    }

    let Some(first) = cameras.first() else {
        return Err(RenderError::ShapeMismatch {
            name: "cameras".to_owned(),
            reason: "need at least one camera".to_owned(),
        });
    };
    let img_size = first.img_size;
    if img_size.x == 0 || img_size.y == 0 {
        return Err(RenderError::EmptyImage);
    }
    if let Some(cam) = cameras.iter().find(|cam| cam.img_size != img_size) {
        return Err(RenderError::ShapeMismatch {
            name: "cameras".to_owned(),
            reason: format!(
                "all cameras need the same image size, got {} and {}",
                img_size, cam.img_size
            ),
        });
    }

    let num_pixels = cameras.len() as u64 * img_size.x as u64 * img_size.y as u64;
    if u32::try_from(num_pixels).is_err() {
        return Err(RenderError::TooManyPixels {
            num_images: cameras.len(),
            img_size,
        });
    }

    gaussians.check_dims()?;

    let channels = colors.channels();
    if channels == 0 {
        return Err(RenderError::ShapeMismatch {
            name: "colors".to_owned(),
            reason: "need at least one channel".to_owned(),
        });
    }

    let num_gaussians = gaussians.num_gaussians();
    let mut check = DimCheck::new()
        .bind("N", num_gaussians)
        .bind("C", cameras.len())
        .check_dims("colors", colors.num_gaussians(), &["N".into()]);
    if let Some(backgrounds) = backgrounds {
        check = check.check_dims(
            "backgrounds",
            backgrounds.len(),
            &["C".into(), channels.into()],
        );
    }
    check.finish()?;

    let too_many_splats = cameras
        .len()
        .checked_mul(num_gaussians)
        .is_none_or(|total| u32::try_from(total).is_err());
    if too_many_splats || u32::try_from(cameras.len()).is_err() {
        return Err(RenderError::TooManySplats {
            num_images: cameras.len(),
            num_splats: num_gaussians,
        });
    }

    Ok(img_size)
}

// Per splat opacities and colors as seen by each camera, `[C][N]`.
fn raster_inputs<'a>(
    gaussians: &Gaussians,
    colors: &dyn ColorSource,
    cameras: &[Camera],
    projected: &'a [ProjectedSplat],
    options: &RenderOptions,
) -> RasterInputs<'a> {
    let num_gaussians = gaussians.num_gaussians();
    let channels = colors.channels();

    let mut opacities = vec![0.0; projected.len()];
    let mut splat_colors = vec![0.0; projected.len() * channels];

    for (cam_id, camera) in cameras.iter().enumerate() {
        let cam_pos = camera.position();
        for (gid, &mean) in gaussians.means.iter().enumerate() {
            let index = cam_id * num_gaussians + gid;
            let splat = &projected[index];
            if !splat.is_visible() {
                continue;
            }
            opacities[index] = if options.calc_compensations {
                gaussians.opacities[gid] * splat.compensation
            } else {
                gaussians.opacities[gid]
            };
            let dir = (mean - cam_pos).normalize_or_zero();
            colors.eval(
                gid,
                dir,
                &mut splat_colors[index * channels..(index + 1) * channels],
            );
        }
    }

    RasterInputs {
        projected,
        opacities,
        colors: splat_colors,
        channels,
    }
}

/// Render gaussians into one image per camera.
///
/// All cameras have to share an image size. `backgrounds` is laid out as
/// `[camera][channels]` and is blended in behind the splats.
pub fn render_splats(
    gaussians: &Gaussians,
    colors: &dyn ColorSource,
    cameras: &[Camera],
    options: &RenderOptions,
    backgrounds: Option<&[f32]>,
) -> Result<(Framebuffer, RenderAux), RenderError> {
    let _span = tracing::trace_span!("render_splats").entered();

    let img_size = check_inputs(gaussians, colors, cameras, options, backgrounds)?;
    let num_images = cameras.len() as u32;
    let tile_bounds = calc_tile_bounds(img_size, options.tile_size);
    let num_tiles = tile_bounds.x as u64 * tile_bounds.y as u64;
    let Ok(num_tiles) = u32::try_from(num_tiles) else {
        return Err(RenderError::KeyBitsOverflow {
            image_bits: bit_length(num_images),
            tile_bits: u64::BITS - num_tiles.leading_zeros(),
        });
    };
    let layout = IsectKeyLayout::new(num_images, num_tiles)?;

    log::debug!(
        "Rendering {} splats into {num_images} images of {}x{}",
        gaussians.num_gaussians(),
        img_size.x,
        img_size.y
    );

    let projected = project_splats(gaussians, cameras, options);
    let num_visible = projected.iter().filter(|p| p.is_visible()).count() as u32;

    let isects = isect_tiles(
        &projected,
        cameras.len(),
        options.tile_size,
        tile_bounds,
        &layout,
        true,
    )?;
    let tile_offsets = isect_offset_encode(&isects.keys, num_images, tile_bounds, &layout);

    let stats = RenderStats {
        num_visible,
        num_intersections: tile_offsets.num_intersections,
    };
    log::debug!(
        "{} visible splats, {} intersections, longest tile range {}",
        stats.num_visible,
        stats.num_intersections,
        tile_offsets.max_range()
    );

    let mut framebuffer = {
        let inputs = raster_inputs(gaussians, colors, cameras, &projected, options);
        match options.backend {
            RasterBackend::Reference => rasterize_to_pixels(
                &inputs,
                &tile_offsets,
                &isects.flatten_ids,
                img_size,
                options.tile_size,
                options.batch_size,
            ),
            #[cfg(feature = "parallel")]
            RasterBackend::Tiled => crate::rasterize_tiled::rasterize_tiled(
                &inputs,
                &tile_offsets,
                &isects.flatten_ids,
                img_size,
                options.tile_size,
            ),
            #[cfg(not(feature = "parallel"))]
            RasterBackend::Tiled => return Err(RenderError::BackendUnavailable(options.backend)),
        }
    };

    if let Some(backgrounds) = backgrounds {
        framebuffer.composite_background(backgrounds);
    }

    let aux = RenderAux {
        projected,
        tiles_per_gauss: isects.tiles_per_gauss,
        keys: isects.keys,
        flatten_ids: isects.flatten_ids,
        tile_offsets,
        layout,
        img_size,
        tile_size: options.tile_size,
        stats,
    };
    aux.validate();

    Ok((framebuffer, aux))
}
