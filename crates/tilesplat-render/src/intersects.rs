use glam::{UVec2, Vec2};

use crate::{error::RenderError, isect_key::IsectKeyLayout, project::ProjectedSplat};

/// Half open rectangle of tiles `[min, max)` touched by a splat, clamped to the
/// image's tile grid.
pub fn tile_bbox(
    mean2d: Vec2,
    radius: UVec2,
    tile_size: u32,
    tile_bounds: UVec2,
) -> (UVec2, UVec2) {
    let tile_size = tile_size as f32;
    let tile_mean = mean2d / tile_size;
    let tile_radius = radius.as_vec2() / tile_size;
    let bounds = tile_bounds.as_vec2();

    let min = (tile_mean - tile_radius).floor().max(Vec2::ZERO).min(bounds);
    let max = (tile_mean + tile_radius).ceil().max(Vec2::ZERO).min(bounds);
    (min.as_uvec2(), max.as_uvec2())
}

/// Nr. of tiles a projected splat overlaps, zero when it's culled.
pub fn tiles_per_gauss(splat: &ProjectedSplat, tile_size: u32, tile_bounds: UVec2) -> u32 {
    if !splat.is_visible() {
        return 0;
    }
    let (min, max) = tile_bbox(splat.mean2d, splat.radius, tile_size, tile_bounds);
    let extent = max.saturating_sub(min);
    extent.x * extent.y
}

/// Output of the tile binner.
#[derive(Debug, Clone, Default)]
pub struct Intersections {
    /// Tiles hit per splat, `[C][N]`.
    pub tiles_per_gauss: Vec<u32>,
    /// One key per (splat, tile) overlap.
    pub keys: Vec<u64>,
    /// Flattened `image * N + gaussian` index of each key.
    pub flatten_ids: Vec<u32>,
}

impl Intersections {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Emit an intersection record for every tile overlapped by every visible splat.
///
/// `projected` is laid out as `[C][N]`. Records of one splat are contiguous and
/// start at the exclusive prefix sum of the tile counts before it. With `sort`
/// the records are sorted by key afterwards.
pub fn isect_tiles(
    projected: &[ProjectedSplat],
    num_images: usize,
    tile_size: u32,
    tile_bounds: UVec2,
    layout: &IsectKeyLayout,
    sort: bool,
) -> Result<Intersections, RenderError> {
    let _span = tracing::trace_span!("isect_tiles").entered();

    if projected.is_empty() || num_images == 0 {
        return Ok(Intersections::default());
    }
    let num_gaussians = projected.len() / num_images;
    if u32::try_from(projected.len()).is_err() {
        return Err(RenderError::TooManySplats {
            num_images,
            num_splats: num_gaussians,
        });
    }

    let counts: Vec<u32> = projected
        .iter()
        .map(|splat| tiles_per_gauss(splat, tile_size, tile_bounds))
        .collect();

    let total: u64 = counts.iter().map(|&c| c as u64).sum();
    if total > u32::MAX as u64 {
        return Err(RenderError::TooManyIntersections(total));
    }
    let (offsets, num_intersections) = tilesplat_prefix_sum::exclusive_prefix_sum(&counts);
    log::debug!("Binned {} splats into {num_intersections} intersections", projected.len());

    let mut keys = vec![0u64; num_intersections as usize];
    let mut flatten_ids = vec![0u32; num_intersections as usize];

    for (index, (splat, &offset)) in projected.iter().zip(&offsets).enumerate() {
        if counts[index] == 0 {
            continue;
        }
        let image = (index / num_gaussians) as u32;
        let (min, max) = tile_bbox(splat.mean2d, splat.radius, tile_size, tile_bounds);

        let mut cur = offset as usize;
        for ty in min.y..max.y {
            for tx in min.x..max.x {
                let tile = ty * tile_bounds.x + tx;
                keys[cur] = layout.encode(image, tile, splat.depth);
                flatten_ids[cur] = index as u32;
                cur += 1;
            }
        }
    }

    let (keys, flatten_ids) = if sort {
        crate::isect_key::sort_intersections(keys, flatten_ids, layout)
    } else {
        (keys, flatten_ids)
    };

    Ok(Intersections {
        tiles_per_gauss: counts,
        keys,
        flatten_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::{isect_tiles, tile_bbox, tiles_per_gauss};
    use crate::{isect_key::IsectKeyLayout, project::ProjectedSplat};
    use glam::UVec2;

    fn splat(x: f32, y: f32, radius: u32, depth: f32) -> ProjectedSplat {
        ProjectedSplat {
            depth,
            mean2d: glam::vec2(x, y),
            conic: glam::vec3(1.0, 0.0, 1.0),
            radius: UVec2::splat(radius),
            compensation: 1.0,
        }
    }

    #[test]
    fn bbox_inside_one_tile() {
        let (min, max) = tile_bbox(glam::vec2(40.0, 40.0), UVec2::splat(2), 16, UVec2::splat(4));
        assert_eq!(min, UVec2::splat(2));
        assert_eq!(max, UVec2::splat(3));
    }

    #[test]
    fn bbox_on_tile_corner() {
        let (min, max) = tile_bbox(glam::vec2(32.0, 32.0), UVec2::splat(2), 16, UVec2::splat(4));
        assert_eq!(min, UVec2::splat(1));
        assert_eq!(max, UVec2::splat(3));
    }

    #[test]
    fn bbox_is_clamped() {
        let (min, max) = tile_bbox(glam::vec2(-5.0, 70.0), UVec2::splat(20), 16, UVec2::splat(4));
        assert_eq!(min, glam::uvec2(0, 3));
        assert_eq!(max, glam::uvec2(1, 4));
    }

    #[test]
    fn culled_splats_hit_nothing() {
        let culled = ProjectedSplat::culled();
        assert_eq!(tiles_per_gauss(&culled, 16, UVec2::splat(4)), 0);

        let mut half = splat(10.0, 10.0, 3, 1.0);
        half.radius.y = 0;
        assert_eq!(tiles_per_gauss(&half, 16, UVec2::splat(4)), 0);
    }

    #[test]
    fn records_are_contiguous_per_splat() {
        let projected = [
            splat(32.0, 32.0, 2, 2.0),
            ProjectedSplat::culled(),
            splat(40.0, 8.0, 2, 1.0),
        ];
        let layout = IsectKeyLayout::new(1, 16).expect("Valid layout");
        let isects =
            isect_tiles(&projected, 1, 16, UVec2::splat(4), &layout, false).expect("Binning failed");

        assert_eq!(isects.tiles_per_gauss, [4, 0, 1]);
        assert_eq!(isects.flatten_ids, [0, 0, 0, 0, 2]);
        let tiles: Vec<u32> = isects.keys.iter().map(|&k| layout.decode(k).tile).collect();
        assert_eq!(tiles, [5, 6, 9, 10, 2]);
    }

    #[test]
    fn sorted_records_follow_tile_then_depth() {
        let projected = [splat(32.0, 32.0, 2, 2.0), splat(36.0, 36.0, 2, 1.0)];
        let layout = IsectKeyLayout::new(1, 16).expect("Valid layout");
        let isects =
            isect_tiles(&projected, 1, 16, UVec2::splat(4), &layout, true).expect("Binning failed");

        // Only tile 10 has both splats, the nearer one comes first.
        assert_eq!(isects.len(), 5);
        let decoded: Vec<(u32, u32)> = isects
            .keys
            .iter()
            .zip(&isects.flatten_ids)
            .map(|(&k, &id)| (layout.decode(k).tile, id))
            .collect();
        assert_eq!(decoded, [(5, 0), (6, 0), (9, 0), (10, 1), (10, 0)]);
    }

    #[test]
    fn multiple_images_use_image_bits() {
        let projected = [splat(8.0, 8.0, 1, 1.0), splat(8.0, 8.0, 1, 1.0)];
        let layout = IsectKeyLayout::new(2, 16).expect("Valid layout");
        let isects =
            isect_tiles(&projected, 2, 16, UVec2::splat(4), &layout, true).expect("Binning failed");
        let images: Vec<u32> = isects.keys.iter().map(|&k| layout.decode(k).image).collect();
        assert_eq!(images, [0, 1]);
        assert_eq!(isects.flatten_ids, [0, 1]);
    }
}
