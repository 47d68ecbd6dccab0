use glam::{Mat3, Quat, Vec3};

use crate::{
    dim_check::DimCheck,
    error::RenderError,
    sh::{MAX_SH_DEGREE, sh_coeffs_for_degree, sh_coeffs_to_color, sh_degree_from_coeffs},
};

/// Covariance of a gaussian from a rotation and per axis scales: `R·S·Sᵀ·Rᵀ`.
///
/// The quaternion doesn't need to be normalized. A zero quaternion gives a NaN
/// covariance, which the projection treats as invalid.
pub fn quat_scale_to_covar(quat: Quat, scale: Vec3) -> Mat3 {
    let rot = Mat3::from_quat(quat.normalize());
    let m = rot * Mat3::from_diagonal(scale);
    m * m.transpose()
}

#[derive(Debug, Clone)]
pub enum Covariances {
    /// Symmetric 3x3 world space covariances.
    Full(Vec<Mat3>),
    /// Factored covariances, see [`quat_scale_to_covar`].
    QuatScale { quats: Vec<Quat>, scales: Vec<Vec3> },
}

impl Covariances {
    pub fn len(&self) -> usize {
        match self {
            Self::Full(covars) => covars.len(),
            Self::QuatScale { quats, .. } => quats.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, gid: usize) -> Mat3 {
        match self {
            Self::Full(covars) => covars[gid],
            Self::QuatScale { quats, scales } => quat_scale_to_covar(quats[gid], scales[gid]),
        }
    }
}

/// World space gaussians. Colors are passed separately as a [`ColorSource`].
#[derive(Debug, Clone)]
pub struct Gaussians {
    pub means: Vec<Vec3>,
    pub covariances: Covariances,
    pub opacities: Vec<f32>,
}

impl Gaussians {
    pub fn new(
        means: Vec<Vec3>,
        covariances: Covariances,
        opacities: Vec<f32>,
    ) -> Result<Self, RenderError> {
        let gaussians = Self {
            means,
            covariances,
            opacities,
        };
        gaussians.check_dims()?;
        Ok(gaussians)
    }

    /// Check all per gaussian buffers have the same length.
    pub fn check_dims(&self) -> Result<(), RenderError> {
        let check = DimCheck::new()
            .check_dims("means", self.means.len(), &["N".into()])
            .check_dims("opacities", self.opacities.len(), &["N".into()]);
        let check = match &self.covariances {
            Covariances::Full(covars) => check.check_dims("covars", covars.len(), &["N".into()]),
            Covariances::QuatScale { quats, scales } => check
                .check_dims("quats", quats.len(), &["N".into()])
                .check_dims("scales", scales.len(), &["N".into()]),
        };
        check.finish()
    }

    pub fn num_gaussians(&self) -> usize {
        self.means.len()
    }
}

/// Per gaussian colors with any nr. of channels.
pub trait ColorSource {
    fn channels(&self) -> usize;

    fn num_gaussians(&self) -> usize;

    /// Write the color of gaussian `gid` seen along `dir` into `out`, which has
    /// [`ColorSource::channels`] elements. `dir` is normalized.
    fn eval(&self, gid: usize, dir: Vec3, out: &mut [f32]);
}

/// View independent colors, laid out as `[N][channels]`.
#[derive(Debug, Clone)]
pub struct RawColors {
    values: Vec<f32>,
    channels: usize,
}

impl RawColors {
    pub fn new(values: Vec<f32>, channels: usize) -> Result<Self, RenderError> {
        if channels == 0 {
            return Err(RenderError::ShapeMismatch {
                name: "colors".to_owned(),
                reason: "need at least one channel".to_owned(),
            });
        }
        DimCheck::new()
            .check_dims("colors", values.len(), &["N".into(), channels.into()])
            .finish()?;
        Ok(Self { values, channels })
    }

    pub fn from_rgb(colors: &[Vec3]) -> Self {
        Self {
            values: colors.iter().flat_map(|c| c.to_array()).collect(),
            channels: 3,
        }
    }
}

impl ColorSource for RawColors {
    fn channels(&self) -> usize {
        self.channels
    }

    fn num_gaussians(&self) -> usize {
        self.values.len() / self.channels
    }

    fn eval(&self, gid: usize, _dir: Vec3, out: &mut [f32]) {
        out.copy_from_slice(&self.values[gid * self.channels..(gid + 1) * self.channels]);
    }
}

/// Spherical harmonics coefficients, laid out as `[N][coeffs][channels]`.
#[derive(Debug, Clone)]
pub struct ShColors {
    coeffs: Vec<f32>,
    channels: usize,
    degree: u32,
    degrees_to_use: u32,
}

impl ShColors {
    pub fn new(
        coeffs: Vec<f32>,
        num_gaussians: usize,
        channels: usize,
    ) -> Result<Self, RenderError> {
        if channels == 0 {
            return Err(RenderError::ShapeMismatch {
                name: "sh_coeffs".to_owned(),
                reason: "need at least one channel".to_owned(),
            });
        }
        if num_gaussians == 0 {
            // Nothing to infer the degree from.
            if !coeffs.is_empty() {
                return Err(RenderError::ShapeMismatch {
                    name: "sh_coeffs".to_owned(),
                    reason: format!("{} values for {num_gaussians} gaussians", coeffs.len()),
                });
            }
            return Ok(Self {
                coeffs,
                channels,
                degree: 0,
                degrees_to_use: 0,
            });
        }

        let per_gaussian = num_gaussians * channels;
        if coeffs.len() % per_gaussian != 0 {
            return Err(RenderError::ShapeMismatch {
                name: "sh_coeffs".to_owned(),
                reason: format!(
                    "length {} is not a multiple of {num_gaussians} x {channels}",
                    coeffs.len()
                ),
            });
        }
        let degree = sh_degree_from_coeffs((coeffs.len() / per_gaussian) as u32)?;
        Ok(Self {
            coeffs,
            channels,
            degree,
            degrees_to_use: degree,
        })
    }

    /// Only evaluate bands up to `degree`. Clamped to the stored degree.
    pub fn with_degrees_to_use(mut self, degree: u32) -> Self {
        self.degrees_to_use = degree.min(self.degree).min(MAX_SH_DEGREE);
        self
    }

    pub fn degree(&self) -> u32 {
        self.degree
    }

    pub fn degrees_to_use(&self) -> u32 {
        self.degrees_to_use
    }

    fn coeffs_per_gaussian(&self) -> usize {
        sh_coeffs_for_degree(self.degree) as usize * self.channels
    }
}

impl ColorSource for ShColors {
    fn channels(&self) -> usize {
        self.channels
    }

    fn num_gaussians(&self) -> usize {
        self.coeffs.len() / self.coeffs_per_gaussian()
    }

    fn eval(&self, gid: usize, dir: Vec3, out: &mut [f32]) {
        let stride = self.coeffs_per_gaussian();
        let coeffs = &self.coeffs[gid * stride..(gid + 1) * stride];
        sh_coeffs_to_color(self.degrees_to_use, dir, coeffs, out);
    }
}

#[cfg(test)]
mod tests {
    use super::{ColorSource, Covariances, Gaussians, RawColors, ShColors, quat_scale_to_covar};
    use crate::{error::RenderError, sh::rgb_to_sh};
    use assert_approx_eq::assert_approx_eq;
    use glam::{Mat3, Quat, Vec3};

    #[test]
    fn covar_from_identity_rotation() {
        let covar = quat_scale_to_covar(Quat::IDENTITY, glam::vec3(1.0, 2.0, 3.0));
        assert!(covar.abs_diff_eq(Mat3::from_diagonal(glam::vec3(1.0, 4.0, 9.0)), 1e-6));
    }

    #[test]
    fn covar_is_symmetric_and_rotated() {
        // Rotating 90 degrees around z swaps the x and y scales.
        let quat = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2) * 3.0;
        let covar = quat_scale_to_covar(quat, glam::vec3(1.0, 2.0, 0.5));
        assert!(covar.abs_diff_eq(covar.transpose(), 1e-6));
        assert_approx_eq!(covar.x_axis.x, 4.0, 1e-5);
        assert_approx_eq!(covar.y_axis.y, 1.0, 1e-5);
        assert_approx_eq!(covar.z_axis.z, 0.25, 1e-5);
    }

    #[test]
    fn rejects_mismatched_gaussians() {
        let result = Gaussians::new(
            vec![Vec3::ZERO; 3],
            Covariances::Full(vec![Mat3::IDENTITY; 2]),
            vec![1.0; 3],
        );
        assert!(matches!(result, Err(RenderError::ShapeMismatch { .. })));
    }

    #[test]
    fn raw_colors_any_channels() {
        let colors = RawColors::new(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], 4)
            .expect("Valid colors");
        assert_eq!(colors.num_gaussians(), 2);
        let mut out = [0.0; 4];
        colors.eval(1, Vec3::Z, &mut out);
        assert_eq!(out, [4.0, 5.0, 6.0, 7.0]);
        assert!(RawColors::new(vec![0.0; 7], 4).is_err());
    }

    #[test]
    fn sh_colors_degree_cap() {
        let num_gaussians = 2;
        let mut coeffs = vec![0.0; num_gaussians * 16 * 3];
        // Second gaussian: gray DC and a large degree 3 term.
        let dc = rgb_to_sh(Vec3::splat(0.25));
        coeffs[48..51].copy_from_slice(&dc.to_array());
        coeffs[48 + 12 * 3] = 5.0;

        let colors = ShColors::new(coeffs, num_gaussians, 3).expect("Valid coeffs");
        assert_eq!(colors.degree(), 3);
        assert_eq!(colors.num_gaussians(), 2);

        let capped = colors.clone().with_degrees_to_use(1);
        let mut out = [0.0; 3];
        capped.eval(1, Vec3::Z, &mut out);
        assert_approx_eq!(out[0], 0.25, 1e-5);

        colors.eval(1, Vec3::Z, &mut out);
        assert!(out[0] > 1.0);
    }

    #[test]
    fn sh_colors_reject_bad_counts() {
        assert!(ShColors::new(vec![0.0; 2 * 5 * 3], 2, 3).is_err());
        assert!(ShColors::new(vec![0.0; 7], 2, 3).is_err());
        assert!(ShColors::new(vec![], 0, 0).is_err());
        assert!(ShColors::new(vec![], 0, 3).is_ok());
    }
}
