use clap::ValueEnum;

mod dim_check;

pub mod camera;
pub mod error;
pub mod gaussians;
pub mod intersects;
pub mod isect_key;
pub mod options;
pub mod project;
pub mod rasterize;
#[cfg(feature = "parallel")]
mod rasterize_tiled;
pub mod render;
pub mod render_aux;
pub mod sh;
pub mod tile_offsets;

#[cfg(test)]
mod tests;

pub use camera::{Camera, CameraModel};
pub use error::RenderError;
pub use gaussians::{ColorSource, Covariances, Gaussians, RawColors, ShColors};
pub use options::RenderOptions;
pub use rasterize::Framebuffer;
pub use render::{calc_tile_bounds, render_splats};
pub use render_aux::RenderAux;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    pub num_visible: u32,
    pub num_intersections: u32,
}

/// Which compositor walks the tile ranges.
#[derive(
    Default, ValueEnum, Clone, Copy, Eq, PartialEq, Debug, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum RasterBackend {
    /// Single threaded batched compositor, all tiles advance one batch at a time.
    #[default]
    Reference,
    /// Every tile walks its whole range on its own, tiles run in parallel.
    Tiled,
}
