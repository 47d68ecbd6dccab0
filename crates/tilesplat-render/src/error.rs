use thiserror::Error;

/// Configuration errors. These are reported before any work is done; per splat
/// degeneracies are never errors, they just end up with a zero radius.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("Can't render images with 0 size.")]
    EmptyImage,

    #[error("Tile size must be positive.")]
    InvalidTileSize,

    #[error("Batch size must be positive.")]
    InvalidBatchSize,

    #[error("Invalid depth range: near plane {near} and far plane {far}.")]
    InvalidDepthRange { near: f32, far: f32 },

    #[error("Invalid covariance regularizer eps2d {0}.")]
    InvalidEps2d(f32),

    #[error("Shape mismatch for {name}: {reason}")]
    ShapeMismatch { name: String, reason: String },

    #[error(
        "Can't encode intersection keys: {image_bits} image bits + {tile_bits} tile bits + 32 depth bits exceed 64 bits."
    )]
    KeyBitsOverflow { image_bits: u32, tile_bits: u32 },

    #[error("Too many splats to index: {num_images} images x {num_splats} splats.")]
    TooManySplats { num_images: usize, num_splats: usize },

    #[error("Too many pixels to index: {num_images} images of {img_size}.")]
    TooManyPixels { num_images: usize, img_size: glam::UVec2 },

    #[error("Too many intersections to index: {0}.")]
    TooManyIntersections(u64),

    #[error("Invalid nr. of sh bases {0}.")]
    InvalidShCoeffs(usize),

    #[error("The {0:?} backend is not available in this build.")]
    BackendUnavailable(crate::RasterBackend),
}
