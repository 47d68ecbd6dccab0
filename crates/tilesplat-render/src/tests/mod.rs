use crate::{
    RasterBackend,
    camera::Camera,
    gaussians::{Covariances, Gaussians, RawColors},
    options::RenderOptions,
    render::render_splats,
};
use assert_approx_eq::assert_approx_eq;
use glam::{Mat3, Quat, Vec3};
use rand::{Rng, SeedableRng, rngs::StdRng};


/// Random gaussians in a unit cube around the origin.
pub(crate) fn random_scene(rng: &mut StdRng, num_splats: usize) -> (Gaussians, RawColors) {
    let means = (0..num_splats)
        .map(|_| {
            glam::vec3(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            )
        })
        .collect();
    let quats = (0..num_splats)
        .map(|_| {
            Quat::from_xyzw(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(0.1..1.0),
            )
        })
        .collect();
    let scales = (0..num_splats)
        .map(|_| {
            glam::vec3(
                rng.random_range(0.01..0.2),
                rng.random_range(0.01..0.2),
                rng.random_range(0.01..0.2),
            )
        })
        .collect();
    let opacities = (0..num_splats).map(|_| rng.random_range(0.05..1.0)).collect();
    let colors: Vec<Vec3> = (0..num_splats)
        .map(|_| glam::vec3(rng.random(), rng.random(), rng.random()))
        .collect();

    let gaussians = Gaussians::new(
        means,
        Covariances::QuatScale { quats, scales },
        opacities,
    )
    .expect("Valid gaussians");
    (gaussians, RawColors::from_rgb(&colors))
}

pub(crate) fn orbit_cameras(num_cameras: usize, img_size: glam::UVec2) -> Vec<Camera> {
    (0..num_cameras)
        .map(|i| {
            let angle = i as f32 / num_cameras as f32 * std::f32::consts::TAU;
            let eye = glam::vec3(angle.sin() * 4.0, 0.5, -angle.cos() * 4.0);
            Camera::look_at(eye, Vec3::ZERO, Vec3::Y, 0.9, img_size)
        })
        .collect()
}

#[test]
fn renders_at_all() {
    // Gaussians sitting on the camera center are culled by the near plane,
    // so the result should be empty.
    let cam = Camera::from_fov(Vec3::ZERO, Quat::IDENTITY, 1.0, glam::uvec2(32, 32));
    let num_points = 8;
    let gaussians = Gaussians::new(
        vec![Vec3::ZERO; num_points],
        Covariances::Full(vec![Mat3::IDENTITY; num_points]),
        vec![1.0; num_points],
    )
    .expect("Valid gaussians");
    let colors = RawColors::from_rgb(&vec![Vec3::ONE; num_points]);

    let (output, aux) = render_splats(
        &gaussians,
        &colors,
        &[cam],
        &RenderOptions::default(),
        None,
    )
    .expect("Failed to render");

    assert_eq!(aux.stats.num_visible, 0);
    assert_eq!(aux.stats.num_intersections, 0);
    let rgb_mean = output.colors.iter().sum::<f32>() / output.colors.len() as f32;
    let alpha_mean = output.alphas.iter().sum::<f32>() / output.alphas.len() as f32;
    assert_approx_eq!(rgb_mean, 0.0, 1e-5);
    assert_approx_eq!(alpha_mean, 0.0);
}

#[test]
fn renders_many_splats() {
    let mut rng = StdRng::seed_from_u64(4);
    let (gaussians, colors) = random_scene(&mut rng, 2000);
    let cameras = orbit_cameras(2, glam::uvec2(96, 64));

    let (output, aux) = render_splats(
        &gaussians,
        &colors,
        &cameras,
        &RenderOptions::default(),
        None,
    )
    .expect("Failed to render");

    aux.validate();
    assert!(aux.stats.num_visible > 0);
    assert!(aux.stats.num_intersections >= aux.stats.num_visible);
    assert_eq!(output.alphas.len(), 2 * 96 * 64);
    assert!(output.alphas.iter().all(|&a| (0.0..=1.0).contains(&a)));
    assert!(output.colors.iter().all(|c| c.is_finite() && *c >= 0.0));
    // The cube is in view, something must have been drawn.
    assert!(output.image_alphas(1).iter().any(|&a| a > 0.5));
}

#[test]
fn tiled_matches_reference() {
    let backend = RasterBackend::Tiled;
    if !backend.is_available() {
        return;
    }

    let mut rng = StdRng::seed_from_u64(12);
    let (gaussians, colors) = random_scene(&mut rng, 500);
    let cameras = orbit_cameras(3, glam::uvec2(50, 37));

    let options = RenderOptions {
        tile_size: 8,
        batch_size: 16,
        ..Default::default()
    };
    let (reference, _) = render_splats(&gaussians, &colors, &cameras, &options, None)
        .expect("Failed to render");
    let options = RenderOptions { backend, ..options };
    let (tiled, _) = render_splats(&gaussians, &colors, &cameras, &options, None)
        .expect("Failed to render");

    assert_eq!(reference, tiled);
}
