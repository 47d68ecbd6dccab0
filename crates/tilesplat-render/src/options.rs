use clap::{Args, Parser};
use serde::{Deserialize, Serialize};

use crate::{RasterBackend, camera::CameraModel, error::RenderError};

#[derive(Clone, Debug, Args, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RenderOptions {
    /// Value added to the diagonal of the screen space covariance before inverting it.
    #[arg(long, help_heading = "Render options", default_value = "0.3")]
    pub eps2d: f32,

    /// Splats closer than this (camera space z) are culled.
    #[arg(long, help_heading = "Render options", default_value = "0.01")]
    pub near_plane: f32,

    /// Splats further than this (camera space z) are culled.
    #[arg(long, help_heading = "Render options", default_value = "1e10")]
    pub far_plane: f32,

    /// Scale opacities by the ratio of the covariance determinant before and after
    /// regularization. Useful to avoid aliasing when rendering at low resolution.
    #[arg(long, help_heading = "Render options", default_value = "false")]
    pub calc_compensations: bool,

    /// Width and height of a tile in pixels.
    #[arg(long, help_heading = "Render options", default_value = "16")]
    pub tile_size: u32,

    /// Nr. of depth sorted splats per tile composited in one batch.
    #[arg(long, help_heading = "Render options", default_value = "256")]
    pub batch_size: u32,

    #[arg(long, help_heading = "Render options", value_enum, default_value = "pinhole")]
    pub camera_model: CameraModel,

    #[arg(long, help_heading = "Render options", value_enum, default_value = "reference")]
    pub backend: RasterBackend,
}

#[derive(Parser)]
struct OptionsParser {
    #[command(flatten)]
    options: RenderOptions,
}

impl Default for RenderOptions {
    fn default() -> Self {
        OptionsParser::parse_from([""]).options
    }
}

impl RenderOptions {
    /// Check everything that can be checked without looking at the scene.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.tile_size == 0 {
            return Err(RenderError::InvalidTileSize);
        }
        if self.batch_size == 0 {
            return Err(RenderError::InvalidBatchSize);
        }
        // Depth keys rely on non-negative depths sorting like their bit patterns.
        if !(self.near_plane >= 0.0 && self.far_plane > self.near_plane) {
            return Err(RenderError::InvalidDepthRange {
                near: self.near_plane,
                far: self.far_plane,
            });
        }
        if !(self.eps2d.is_finite() && self.eps2d >= 0.0) {
            return Err(RenderError::InvalidEps2d(self.eps2d));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::RenderOptions;
    use crate::{RasterBackend, camera::CameraModel, error::RenderError};

    #[test]
    fn defaults() {
        let options = RenderOptions::default();
        assert_eq!(options.eps2d, 0.3);
        assert_eq!(options.near_plane, 0.01);
        assert_eq!(options.far_plane, 1e10);
        assert!(!options.calc_compensations);
        assert_eq!(options.tile_size, 16);
        assert_eq!(options.camera_model, CameraModel::Pinhole);
        assert_eq!(options.backend, RasterBackend::Reference);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn rejects_bad_config() {
        let options = RenderOptions {
            tile_size: 0,
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(RenderError::InvalidTileSize));

        let options = RenderOptions {
            batch_size: 0,
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(RenderError::InvalidBatchSize));

        let options = RenderOptions {
            near_plane: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(RenderError::InvalidDepthRange { .. })
        ));

        let options = RenderOptions {
            near_plane: 2.0,
            far_plane: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(RenderError::InvalidDepthRange { .. })
        ));
    }

    #[test]
    fn serializes_kebab_case() {
        let json = serde_json::to_value(RenderOptions::default()).expect("Failed to serialize");
        assert_eq!(json["camera-model"], "pinhole");
        assert_eq!(json["batch-size"], 256);
    }
}
