use std::ops::Range;

use glam::UVec2;

use crate::isect_key::IsectKeyLayout;

/// Where each tile's intersections live in the sorted intersection list.
///
/// Tables are dense and laid out as `[image][tile_row][tile_col]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileOffsets {
    pub num_images: u32,
    pub tile_bounds: UVec2,
    /// Start of every tile's range.
    pub offsets: Vec<u32>,
    /// Length of every tile's range.
    pub counts: Vec<u32>,
    pub num_intersections: u32,
}

impl TileOffsets {
    pub fn tiles_per_image(&self) -> u32 {
        self.tile_bounds.x * self.tile_bounds.y
    }

    pub fn num_tiles(&self) -> usize {
        self.offsets.len()
    }

    /// Half open range of sorted intersections hitting `tile` in `image`.
    pub fn range(&self, image: u32, tile: u32) -> Range<usize> {
        let index = (image * self.tiles_per_image() + tile) as usize;
        let start = self.offsets[index] as usize;
        start..start + self.counts[index] as usize
    }

    /// Length of the longest tile range.
    pub fn max_range(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Check the ranges tile the intersection list without gaps or overlaps.
    pub fn is_complete(&self) -> bool {
        let mut expected = 0u32;
        for (&offset, &count) in self.offsets.iter().zip(&self.counts) {
            if offset != expected {
                return false;
            }
            expected += count;
        }
        expected == self.num_intersections
    }
}

/// Build per tile ranges from sorted intersection keys.
///
/// Keys are grouped by their high 32 bits (image and tile), counts are scattered
/// into a dense table and an exclusive prefix sum turns them into offsets.
pub fn isect_offset_encode(
    sorted_keys: &[u64],
    num_images: u32,
    tile_bounds: UVec2,
    layout: &IsectKeyLayout,
) -> TileOffsets {
    let _span = tracing::trace_span!("isect_offset_encode").entered();

    let tiles_per_image = tile_bounds.x * tile_bounds.y;
    let mut counts = vec![0u32; (num_images * tiles_per_image) as usize];

    for group in sorted_keys.chunk_by(|a, b| a >> 32 == b >> 32) {
        let (image, tile) = layout.decode_group(group[0] >> 32);
        let index = (image * tiles_per_image + tile) as usize;
        // Unsorted keys would split a tile into several groups.
        assert_eq!(
            counts[index], 0,
            "Intersection keys must be sorted, tile {tile} of image {image} appears twice"
        );
        counts[index] = group.len() as u32;
    }

    let (offsets, total) = tilesplat_prefix_sum::exclusive_prefix_sum(&counts);
    assert_eq!(
        total as usize,
        sorted_keys.len(),
        "Tile ranges cover {total} intersections, expected {}",
        sorted_keys.len()
    );

    TileOffsets {
        num_images,
        tile_bounds,
        offsets,
        counts,
        num_intersections: total,
    }
}

#[cfg(test)]
mod tests {
    use super::isect_offset_encode;
    use crate::isect_key::IsectKeyLayout;
    use glam::UVec2;
    use rand::{Rng, SeedableRng};

    #[test]
    fn empty_keys() {
        let layout = IsectKeyLayout::new(2, 4).expect("Valid layout");
        let offsets = isect_offset_encode(&[], 2, UVec2::splat(2), &layout);
        assert_eq!(offsets.offsets, [0; 8]);
        assert_eq!(offsets.max_range(), 0);
        assert!(offsets.is_complete());
        assert_eq!(offsets.range(1, 3), 0..0);
    }

    #[test]
    fn ranges_from_keys() {
        let layout = IsectKeyLayout::new(1, 4).expect("Valid layout");
        let keys = [
            layout.encode(0, 0, 1.0),
            layout.encode(0, 0, 2.0),
            layout.encode(0, 2, 1.0),
            layout.encode(0, 3, 0.5),
            layout.encode(0, 3, 0.7),
            layout.encode(0, 3, 0.9),
        ];
        let offsets = isect_offset_encode(&keys, 1, UVec2::splat(2), &layout);
        assert_eq!(offsets.range(0, 0), 0..2);
        assert_eq!(offsets.range(0, 1), 2..2);
        assert_eq!(offsets.range(0, 2), 2..3);
        assert_eq!(offsets.range(0, 3), 3..6);
        assert_eq!(offsets.max_range(), 3);
    }

    #[test]
    fn random_keys_give_complete_table() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let num_images = 3;
        let tile_bounds = glam::uvec2(5, 4);
        let layout = IsectKeyLayout::new(num_images, 20).expect("Valid layout");
        let mut keys: Vec<u64> = (0..2000)
            .map(|_| {
                layout.encode(
                    rng.random_range(0..num_images),
                    rng.random_range(0..20),
                    rng.random_range(0.01..50.0),
                )
            })
            .collect();
        keys.sort_unstable();

        let offsets = isect_offset_encode(&keys, num_images, tile_bounds, &layout);
        assert!(offsets.is_complete());
        for image in 0..num_images {
            for tile in 0..20 {
                for &key in &keys[offsets.range(image, tile)] {
                    let decoded = layout.decode(key);
                    assert_eq!((decoded.image, decoded.tile), (image, tile));
                }
            }
        }
    }

    #[test]
    #[should_panic(expected = "must be sorted")]
    fn unsorted_keys_panic() {
        let layout = IsectKeyLayout::new(1, 4).expect("Valid layout");
        let keys = [
            layout.encode(0, 1, 1.0),
            layout.encode(0, 2, 1.0),
            layout.encode(0, 1, 2.0),
        ];
        isect_offset_encode(&keys, 1, UVec2::splat(2), &layout);
    }
}
