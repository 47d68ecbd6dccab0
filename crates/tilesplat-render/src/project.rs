use glam::{Mat2, Mat3, Mat4, UVec2, Vec2, Vec3};

use crate::{
    camera::{Camera, CameraModel},
    gaussians::Gaussians,
    options::RenderOptions,
};

/// Multiple of the standard deviation covered by the screen space radius.
pub const RADIUS_SIGMAS: f32 = 3.33;

/// A gaussian as seen by one camera.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProjectedSplat {
    /// Camera space z.
    pub depth: f32,
    pub mean2d: Vec2,
    /// Upper triangle of the inverse screen space covariance `(a, b, c)`.
    pub conic: Vec3,
    /// Conservative extent in pixels, zero when the gaussian is culled.
    pub radius: UVec2,
    /// Opacity scale from the covariance regularization, 1 unless compensations
    /// are enabled.
    pub compensation: f32,
}

impl ProjectedSplat {
    pub fn culled() -> Self {
        Self {
            compensation: 1.0,
            ..Default::default()
        }
    }

    pub fn is_visible(&self) -> bool {
        self.radius.x > 0 && self.radius.y > 0
    }
}

pub fn world_to_cam(world_to_cam: &Mat4, mean: Vec3, covar: Mat3) -> (Vec3, Mat3) {
    let rot = Mat3::from_mat4(*world_to_cam);
    let mean_c = world_to_cam.transform_point3(mean);
    let covar_c = rot * covar * rot.transpose();
    (mean_c, covar_c)
}

// J·Σ·Jᵀ for a 2x3 jacobian with rows `j0` and `j1`.
fn project_covar(j0: Vec3, j1: Vec3, covar: Mat3) -> Mat2 {
    let sj0 = covar * j0;
    let sj1 = covar * j1;
    Mat2::from_cols(
        glam::vec2(j0.dot(sj0), j1.dot(sj0)),
        glam::vec2(j0.dot(sj1), j1.dot(sj1)),
    )
}

/// Perspective projection of a camera space gaussian.
///
/// The jacobian is evaluated at the mean clamped to a slightly enlarged frustum,
/// so gaussians far outside the view don't blow up.
pub fn persp_proj(
    mean_c: Vec3,
    covar_c: Mat3,
    focal: Vec2,
    center: Vec2,
    img_size: UVec2,
) -> (Vec2, Mat2) {
    let Vec3 { x, y, z } = mean_c;
    let size = img_size.as_vec2();

    let tan_fov = 0.5 * size / focal;
    let lim_pos = (size - center) / focal + 0.3 * tan_fov;
    let lim_neg = center / focal + 0.3 * tan_fov;

    let tx = z * (x / z).max(-lim_neg.x).min(lim_pos.x);
    let ty = z * (y / z).max(-lim_neg.y).min(lim_pos.y);

    let rz = 1.0 / z;
    let rz2 = rz * rz;
    let j0 = glam::vec3(focal.x * rz, 0.0, -focal.x * tx * rz2);
    let j1 = glam::vec3(0.0, focal.y * rz, -focal.y * ty * rz2);

    let mean2d = focal * glam::vec2(x, y) * rz + center;
    (mean2d, project_covar(j0, j1, covar_c))
}

/// Equidistant fisheye projection of a camera space gaussian.
pub fn fisheye_proj(mean_c: Vec3, covar_c: Mat3, focal: Vec2, center: Vec2) -> (Vec2, Mat2) {
    const EPS: f32 = 1e-7;

    let Vec3 { x, y, z } = mean_c;
    let xy_len = (x * x + y * y).sqrt() + EPS;
    let theta = f32::atan2(xy_len, z + EPS);
    let mean2d = focal * glam::vec2(x, y) * theta / xy_len + center;

    let x2 = x * x + EPS;
    let y2 = y * y;
    let xy = x * y;
    let x2y2 = x2 + y2;
    let x2y2z2_inv = 1.0 / (x2y2 + z * z);
    let b = f32::atan2(xy_len, z) / xy_len / x2y2;
    let a = z * x2y2z2_inv / x2y2;

    let j0 = glam::vec3(
        focal.x * (x2 * a + y2 * b),
        focal.x * xy * (a - b),
        -focal.x * x * x2y2z2_inv,
    );
    let j1 = glam::vec3(
        focal.y * xy * (a - b),
        focal.y * (y2 * a + x2 * b),
        -focal.y * y * x2y2z2_inv,
    );
    (mean2d, project_covar(j0, j1, covar_c))
}

/// Orthographic projection of a camera space gaussian, `focal` is in pixels per unit.
pub fn ortho_proj(mean_c: Vec3, covar_c: Mat3, focal: Vec2, center: Vec2) -> (Vec2, Mat2) {
    let mean2d = focal * mean_c.truncate() + center;
    let j0 = glam::vec3(focal.x, 0.0, 0.0);
    let j1 = glam::vec3(0.0, focal.y, 0.0);
    (mean2d, project_covar(j0, j1, covar_c))
}

impl CameraModel {
    /// Project a camera space gaussian to a screen space mean and covariance.
    pub fn project(self, camera: &Camera, mean_c: Vec3, covar_c: Mat3) -> (Vec2, Mat2) {
        match self {
            Self::Pinhole => persp_proj(
                mean_c,
                covar_c,
                camera.focal,
                camera.center,
                camera.img_size,
            ),
            Self::Fisheye => fisheye_proj(mean_c, covar_c, camera.focal, camera.center),
            Self::Ortho => ortho_proj(mean_c, covar_c, camera.focal, camera.center),
        }
    }
}

/// Project one world space gaussian into `camera`.
///
/// Never fails: anything degenerate, behind the near plane or off screen comes
/// back with a zero radius.
pub fn project_gaussian(
    camera: &Camera,
    model: CameraModel,
    mean: Vec3,
    covar: Mat3,
    options: &RenderOptions,
) -> ProjectedSplat {
    let (mean_c, covar_c) = world_to_cam(&camera.world_to_cam, mean, covar);
    let depth = mean_c.z;

    // Phrased as positive to bail on NaN.
    if !(depth > options.near_plane && depth < options.far_plane) {
        return ProjectedSplat::culled();
    }

    let (mean2d, cov2d) = model.project(camera, mean_c, covar_c);

    let det_orig = cov2d.determinant();
    let cov2d = cov2d + Mat2::from_diagonal(Vec2::splat(options.eps2d));
    let det_blur = cov2d.determinant();
    if !(det_blur > 0.0) {
        return ProjectedSplat::culled();
    }
    let det = det_blur.max(1e-10);

    let compensation = if options.calc_compensations {
        (det_orig / det).max(0.0).sqrt()
    } else {
        1.0
    };

    let c00 = cov2d.x_axis.x;
    let c01 = cov2d.y_axis.x;
    let c10 = cov2d.x_axis.y;
    let c11 = cov2d.y_axis.y;
    let conic = glam::vec3(c11 / det, -(c01 + c10) / 2.0 / det, c00 / det);

    let extent = glam::vec2(
        (RADIUS_SIGMAS * c00.sqrt()).ceil(),
        (RADIUS_SIGMAS * c11.sqrt()).ceil(),
    );

    let size = camera.img_size.as_vec2();
    let inside = mean2d.x + extent.x > 0.0
        && mean2d.x - extent.x < size.x
        && mean2d.y + extent.y > 0.0
        && mean2d.y - extent.y < size.y;
    if !inside {
        return ProjectedSplat::culled();
    }

    ProjectedSplat {
        depth,
        mean2d,
        conic,
        radius: extent.as_uvec2(),
        compensation,
    }
}

/// Project every gaussian into every camera. The output is laid out as `[C][N]`.
pub fn project_splats(
    gaussians: &Gaussians,
    cameras: &[Camera],
    options: &RenderOptions,
) -> Vec<ProjectedSplat> {
    let _span = tracing::trace_span!("project").entered();

    let num_gaussians = gaussians.num_gaussians();
    let mut projected = Vec::with_capacity(cameras.len() * num_gaussians);
    for camera in cameras {
        for (gid, &mean) in gaussians.means.iter().enumerate() {
            let covar = gaussians.covariances.get(gid);
            projected.push(project_gaussian(
                camera,
                options.camera_model,
                mean,
                covar,
                options,
            ));
        }
    }
    projected
}
