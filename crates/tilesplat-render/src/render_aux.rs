use glam::UVec2;

use crate::{
    RenderStats, isect_key::IsectKeyLayout, project::ProjectedSplat, tile_offsets::TileOffsets,
};

/// Intermediate buffers of a render, mostly useful for debugging and visualization.
#[derive(Debug, Clone)]
pub struct RenderAux {
    /// `[C][N]`
    pub projected: Vec<ProjectedSplat>,
    /// `[C][N]`
    pub tiles_per_gauss: Vec<u32>,
    /// Sorted intersection keys.
    pub keys: Vec<u64>,
    pub flatten_ids: Vec<u32>,
    pub tile_offsets: TileOffsets,
    pub layout: IsectKeyLayout,
    pub img_size: UVec2,
    pub tile_size: u32,
    pub stats: RenderStats,
}

impl RenderAux {
    /// Nr. of intersections per tile of one image, laid out as `[tile_row][tile_col]`.
    pub fn calc_tile_depth(&self, image: u32) -> Vec<u32> {
        let tiles = self.tile_offsets.tiles_per_image() as usize;
        let start = image as usize * tiles;
        self.tile_offsets.counts[start..start + tiles].to_vec()
    }

    /// Check the buffers are consistent with each other.
    pub fn validate(&self) {
        #[cfg(any(test, feature = "debug-validation"))]
        {
            let num_splats = self.projected.len();
            let num_visible = self.projected.iter().filter(|p| p.is_visible()).count();
            assert_eq!(
                num_visible, self.stats.num_visible as usize,
                "Visible count doesn't match the projections"
            );
            assert_eq!(
                self.keys.len(),
                self.stats.num_intersections as usize,
                "Intersection count doesn't match the keys"
            );
            assert_eq!(
                self.tiles_per_gauss.iter().map(|&c| c as usize).sum::<usize>(),
                self.keys.len(),
                "Tiles per gaussian don't add up to the intersection count"
            );
            assert!(
                self.keys.windows(2).all(|w| w[0] <= w[1]),
                "Intersection keys are not sorted"
            );
            assert!(
                self.tile_offsets.is_complete(),
                "Tile ranges don't cover the intersections"
            );

            let num_images = self.tile_offsets.num_images as usize;
            let num_gaussians = num_splats.checked_div(num_images).unwrap_or(0);
            let tiles_per_image = self.tile_offsets.tiles_per_image();

            for (&key, &flat_id) in self.keys.iter().zip(&self.flatten_ids) {
                let decoded = self.layout.decode(key);
                assert!(
                    (flat_id as usize) < num_splats,
                    "Invalid splat id {flat_id} >= {num_splats}"
                );
                assert!(
                    decoded.tile < tiles_per_image,
                    "Invalid tile id {} >= {tiles_per_image}",
                    decoded.tile
                );
                assert_eq!(
                    decoded.image as usize,
                    flat_id as usize / num_gaussians,
                    "Key image doesn't match the splat's image"
                );
                let splat = &self.projected[flat_id as usize];
                assert!(splat.is_visible(), "Culled splat {flat_id} has intersections");
                assert_eq!(
                    decoded.depth_bits,
                    splat.depth.to_bits(),
                    "Key depth doesn't match the splat's depth"
                );
            }

            for count in &self.tile_offsets.counts {
                assert!(
                    *count as usize <= num_visible,
                    "Tile has more hits ({count}) than visible splats ({num_visible})"
                );
            }
        }
    }
}
