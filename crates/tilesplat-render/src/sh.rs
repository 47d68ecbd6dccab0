use glam::Vec3;

use crate::error::RenderError;

pub const SH_C0: f32 = 0.282_094_8;

/// Highest supported spherical harmonics degree.
pub const MAX_SH_DEGREE: u32 = 4;

pub const fn sh_coeffs_for_degree(degree: u32) -> u32 {
    (degree + 1).pow(2)
}

pub fn sh_degree_from_coeffs(coeffs_per_channel: u32) -> Result<u32, RenderError> {
    match coeffs_per_channel {
        1 => Ok(0),
        4 => Ok(1),
        9 => Ok(2),
        16 => Ok(3),
        25 => Ok(4),
        _ => Err(RenderError::InvalidShCoeffs(coeffs_per_channel as usize)),
    }
}

pub fn channel_to_sh(rgb: f32) -> f32 {
    (rgb - 0.5) / SH_C0
}

pub fn rgb_to_sh(rgb: Vec3) -> Vec3 {
    glam::vec3(
        channel_to_sh(rgb.x),
        channel_to_sh(rgb.y),
        channel_to_sh(rgb.z),
    )
}

/// Evaluate the real SH bases up to `degree` for a unit direction.
///
/// Based on: Efficient Spherical Harmonic Evaluation, Peter-Pike Sloan, JCGT 2013.
/// Bases above `degree` are left at zero.
pub fn sh_basis(degree: u32, dir: Vec3) -> [f32; 25] {
    let mut basis = [0.0; 25];
    basis[0] = SH_C0;

    if degree < 1 {
        return basis;
    }
    let Vec3 { x, y, z } = dir;

    let ftmp0a = 0.488_602_5;
    basis[1] = -ftmp0a * y;
    basis[2] = ftmp0a * z;
    basis[3] = -ftmp0a * x;

    if degree < 2 {
        return basis;
    }
    let z2 = z * z;
    let fc1 = x * x - y * y;
    let fs1 = 2.0 * x * y;

    let ftmp0b = -1.092_548_4 * z;
    let ftmp1a = 0.546_274_2;
    let psh6 = 0.946_174_7 * z2 - 0.315_391_6;
    basis[4] = ftmp1a * fs1;
    basis[5] = ftmp0b * y;
    basis[6] = psh6;
    basis[7] = ftmp0b * x;
    basis[8] = ftmp1a * fc1;

    if degree < 3 {
        return basis;
    }
    let ftmp0c = -2.285_229 * z2 + 0.457_045_8;
    let ftmp1b = 1.445_305_7 * z;
    let ftmp2a = -0.590_043_6;
    let fc2 = x * fc1 - y * fs1;
    let fs2 = x * fs1 + y * fc1;
    let psh12 = z * (1.865_881_7 * z2 - 1.119_529);
    basis[9] = ftmp2a * fs2;
    basis[10] = ftmp1b * fs1;
    basis[11] = ftmp0c * y;
    basis[12] = psh12;
    basis[13] = ftmp0c * x;
    basis[14] = ftmp1b * fc1;
    basis[15] = ftmp2a * fc2;

    if degree < 4 {
        return basis;
    }
    let ftmp0d = z * (-4.683_326 * z2 + 2.007_139_7);
    let ftmp1c = 3.311_611_4 * z2 - 0.473_087_34;
    let ftmp2b = -1.770_130_8 * z;
    let ftmp3a = 0.625_835_7;
    let fc3 = x * fc2 - y * fs2;
    let fs3 = x * fs2 + y * fc2;
    basis[16] = ftmp3a * fs3;
    basis[17] = ftmp2b * fs2;
    basis[18] = ftmp1c * fs1;
    basis[19] = ftmp0d * y;
    basis[20] = 1.984_313_5 * z * psh12 - 1.006_230_6 * psh6;
    basis[21] = ftmp0d * x;
    basis[22] = ftmp1c * fc1;
    basis[23] = ftmp2b * fc2;
    basis[24] = ftmp3a * fc3;

    basis
}

/// Evaluate SH coefficients laid out as `[coeffs][channels]` in the direction `dir`.
///
/// The result is offset by 0.5 and clamped at zero, so all zero coefficients give
/// a mid grey.
pub fn sh_coeffs_to_color(degree: u32, dir: Vec3, coeffs: &[f32], out: &mut [f32]) {
    let channels = out.len();
    let basis = sh_basis(degree, dir);
    let num_bases = sh_coeffs_for_degree(degree) as usize;

    for (c, out) in out.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (k, &b) in basis[..num_bases].iter().enumerate() {
            sum += b * coeffs[k * channels + c];
        }
        *out = (sum + 0.5).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::{SH_C0, rgb_to_sh, sh_basis, sh_coeffs_to_color, sh_degree_from_coeffs};
    use assert_approx_eq::assert_approx_eq;
    use glam::Vec3;

    #[test]
    fn degree_from_coeffs() {
        assert_eq!(sh_degree_from_coeffs(1), Ok(0));
        assert_eq!(sh_degree_from_coeffs(16), Ok(3));
        assert!(sh_degree_from_coeffs(5).is_err());
    }

    #[test]
    fn dc_round_trip() {
        let rgb = glam::vec3(0.1, 0.6, 0.9);
        let sh = rgb_to_sh(rgb);
        let mut out = [0.0; 3];
        sh_coeffs_to_color(0, Vec3::Z, &sh.to_array(), &mut out);
        assert_approx_eq!(out[0], 0.1, 1e-5);
        assert_approx_eq!(out[1], 0.6, 1e-5);
        assert_approx_eq!(out[2], 0.9, 1e-5);
    }

    #[test]
    fn clamps_negative_colors() {
        let mut out = [1.0];
        sh_coeffs_to_color(0, Vec3::Z, &[-10.0], &mut out);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn degree_one_depends_on_direction() {
        // Only the z band is set, so the color flips around the mid point.
        let mut coeffs = [0.0; 4];
        coeffs[2] = 1.0;
        let mut fwd = [0.0];
        let mut back = [0.0];
        sh_coeffs_to_color(1, Vec3::Z, &coeffs, &mut fwd);
        sh_coeffs_to_color(1, -Vec3::Z, &coeffs, &mut back);
        assert_approx_eq!(fwd[0] - 0.5, 0.5 - back[0], 1e-6);
        assert!(fwd[0] > back[0]);
    }

    #[test]
    fn lower_degree_ignores_higher_bands() {
        let basis = sh_basis(2, Vec3::new(0.6, 0.0, 0.8));
        assert_approx_eq!(basis[0], SH_C0);
        assert!(basis[9..].iter().all(|&b| b == 0.0));
    }

    #[test]
    fn bands_integrate_to_unit_norm() {
        // Monte Carlo estimate of the integral of each basis squared over the sphere
        // (on a fibonacci lattice), which should be close to 1 for an orthonormal basis.
        let n = 20_000;
        let mut norms = [0.0f64; 25];
        let golden = std::f32::consts::PI * (3.0 - 5.0f32.sqrt());
        for i in 0..n {
            let z = 1.0 - 2.0 * (i as f32 + 0.5) / n as f32;
            let r = (1.0 - z * z).sqrt();
            let phi = golden * i as f32;
            let dir = Vec3::new(r * phi.cos(), r * phi.sin(), z);
            for (norm, b) in norms.iter_mut().zip(sh_basis(4, dir)) {
                *norm += (b * b) as f64;
            }
        }
        let area = 4.0 * std::f64::consts::PI;
        for norm in norms {
            assert_approx_eq!(norm * area / n as f64, 1.0, 1e-2);
        }
    }
}
