use glam::{Quat, UVec2, Vec3};
use rand::{Rng, rngs::StdRng};
use tilesplat_render::{
    Camera, Covariances, Gaussians, RenderError, ShColors,
    sh::{channel_to_sh, sh_coeffs_for_degree},
};

/// Gaussians scattered in a cube around the origin, with random SH colors.
pub fn random_scene(
    rng: &mut StdRng,
    num_splats: usize,
    sh_degree: u32,
) -> Result<(Gaussians, ShColors), RenderError> {
    let mut means = Vec::with_capacity(num_splats);
    let mut quats = Vec::with_capacity(num_splats);
    let mut scales = Vec::with_capacity(num_splats);
    let mut opacities = Vec::with_capacity(num_splats);

    let num_coeffs = sh_coeffs_for_degree(sh_degree) as usize;
    let mut coeffs = Vec::with_capacity(num_splats * num_coeffs * 3);

    for _ in 0..num_splats {
        means.push(glam::vec3(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        ));
        quats.push(
            Quat::from_xyzw(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            )
            .normalize(),
        );
        // Log uniform, mostly small splats with the occasional large one.
        scales.push(glam::vec3(
            rng.random_range(-5.0f32..-2.0).exp(),
            rng.random_range(-5.0f32..-2.0).exp(),
            rng.random_range(-5.0f32..-2.0).exp(),
        ));
        opacities.push(rng.random_range(0.1..1.0));

        for _ in 0..3 {
            coeffs.push(channel_to_sh(rng.random()));
        }
        // Higher bands only tint the colors a bit.
        for _ in 3..num_coeffs * 3 {
            coeffs.push(rng.random_range(-0.1..0.1));
        }
    }

    let gaussians = Gaussians::new(
        means,
        Covariances::QuatScale { quats, scales },
        opacities,
    )?;
    let colors = ShColors::new(coeffs, num_splats, 3)?;
    Ok((gaussians, colors))
}

/// Cameras on a circle around the origin, all looking at it.
pub fn orbit_cameras(num_cameras: usize, fov_x: f32, img_size: UVec2) -> Vec<Camera> {
    (0..num_cameras)
        .map(|i| {
            let angle = i as f32 / num_cameras as f32 * std::f32::consts::TAU;
            let eye = glam::vec3(angle.sin() * 3.5, 1.0, -angle.cos() * 3.5);
            Camera::look_at(eye, Vec3::ZERO, Vec3::Y, fov_x, img_size)
        })
        .collect()
}
