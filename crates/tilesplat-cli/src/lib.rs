pub mod args_file;
pub mod scene;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use image::{DynamicImage, Rgba32FImage};
use rand::{SeedableRng, rngs::StdRng};
use tilesplat_render::{Framebuffer, RenderOptions, render_splats, sh::MAX_SH_DEGREE};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    args_override_self = true,
    about = "Render a random gaussian splat scene on the CPU"
)]
pub struct Cli {
    /// Nr. of random gaussians in the scene.
    #[arg(long, help_heading = "Scene options", default_value = "10000")]
    pub num_splats: usize,

    /// Seed of the random scene.
    #[arg(long, help_heading = "Scene options", default_value = "42")]
    pub seed: u64,

    /// Degree of the spherical harmonics colors.
    #[arg(long, help_heading = "Scene options", default_value = "0")]
    pub sh_degree: u32,

    /// Nr. of cameras orbiting the scene.
    #[arg(long, help_heading = "Camera options", default_value = "1")]
    pub num_cameras: usize,

    #[arg(long, help_heading = "Camera options", default_value = "512")]
    pub width: u32,

    #[arg(long, help_heading = "Camera options", default_value = "512")]
    pub height: u32,

    /// Horizontal field of view in degrees.
    #[arg(long, help_heading = "Camera options", default_value = "60")]
    pub fov: f32,

    /// Background color blended behind the splats.
    #[arg(long, help_heading = "Camera options", num_args = 3, value_names = ["R", "G", "B"])]
    pub background: Option<Vec<f32>>,

    /// Directory the rendered images are written to.
    #[arg(long, short, default_value = "renders")]
    pub output: PathBuf,

    /// File with extra arguments, whitespace separated. Arguments on the command
    /// line take precedence.
    #[arg(long)]
    pub args_file: Option<PathBuf>,

    #[command(flatten)]
    pub render: RenderOptions,
}

impl Cli {
    /// Parse the command line, merging in the args file if there is one.
    pub fn load() -> anyhow::Result<Self> {
        let cli = Self::parse();
        let Some(path) = &cli.args_file else {
            return Ok(cli);
        };

        let file_args = args_file::read_args_file(path)?;
        let mut all_args = vec!["tilesplat".to_owned()];
        all_args.extend(file_args);
        all_args.extend(std::env::args().skip(1));
        let cli = Self::try_parse_from(&all_args)
            .with_context(|| format!("Invalid arguments in {}", path.display()))?;
        log::info!("Loaded arguments from {}", path.display());
        Ok(cli)
    }

    pub fn validate(self) -> anyhow::Result<Self> {
        if self.num_cameras == 0 {
            bail!("Need at least one camera");
        }
        if self.sh_degree > MAX_SH_DEGREE {
            bail!(
                "SH degree {} is not supported, the maximum is {MAX_SH_DEGREE}",
                self.sh_degree
            );
        }
        if !(self.fov > 0.0 && self.fov < 180.0) {
            bail!("Field of view must be between 0 and 180 degrees, got {}", self.fov);
        }
        self.render.validate()?;
        Ok(self)
    }
}

fn image_path(output: &std::path::Path, image: u32) -> PathBuf {
    output.join(format!("render_{image:03}.png"))
}

/// Straight alpha RGBA of one image. Rendered colors are premultiplied by
/// alpha, with a background blended in they are opaque.
fn image_rgba(framebuffer: &Framebuffer, image: u32, opaque: bool) -> Vec<f32> {
    let colors = framebuffer.image_colors(image);
    let alphas = framebuffer.image_alphas(image);
    colors
        .chunks_exact(framebuffer.channels)
        .zip(alphas)
        .flat_map(|(rgb, &alpha)| {
            if opaque {
                [rgb[0], rgb[1], rgb[2], 1.0]
            } else if alpha > 0.0 {
                [rgb[0] / alpha, rgb[1] / alpha, rgb[2] / alpha, alpha]
            } else {
                [0.0; 4]
            }
        })
        .collect()
}

fn save_image(
    framebuffer: &Framebuffer,
    image: u32,
    opaque: bool,
    path: &std::path::Path,
) -> anyhow::Result<()> {
    let size = framebuffer.img_size;
    let img = Rgba32FImage::from_raw(size.x, size.y, image_rgba(framebuffer, image, opaque))
        .context("Framebuffer doesn't match the image size")?;
    DynamicImage::from(img)
        .to_rgba8()
        .save(path)
        .with_context(|| format!("Failed to save {}", path.display()))?;
    Ok(())
}

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let changed = args_file::options_to_args(&cli.render);
    if !changed.is_empty() {
        log::info!("Render options: {}", changed.join(" "));
    }

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let (gaussians, colors) = scene::random_scene(&mut rng, cli.num_splats, cli.sh_degree)?;
    let img_size = glam::uvec2(cli.width, cli.height);
    let cameras = scene::orbit_cameras(cli.num_cameras, cli.fov.to_radians(), img_size);

    let backgrounds = cli
        .background
        .as_ref()
        .map(|rgb| rgb.repeat(cameras.len()));

    log::info!(
        "Rendering {} splats from {} cameras at {}x{}",
        cli.num_splats,
        cameras.len(),
        cli.width,
        cli.height
    );
    let start = std::time::Instant::now();
    let (framebuffer, aux) = render_splats(
        &gaussians,
        &colors,
        &cameras,
        &cli.render,
        backgrounds.as_deref(),
    )?;
    let elapsed = start.elapsed();

    std::fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create {}", cli.output.display()))?;
    for image in 0..framebuffer.num_images {
        let path = image_path(&cli.output, image);
        save_image(&framebuffer, image, backgrounds.is_some(), &path)?;
        log::info!("Saved {}", path.display());
    }

    println!(
        "Rendered {} images in {elapsed:.2?}: {} visible splats, {} intersections, longest tile {}",
        framebuffer.num_images,
        aux.stats.num_visible,
        aux.stats.num_intersections,
        aux.tile_offsets.max_range()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::image_rgba;
    use assert_approx_eq::assert_approx_eq;
    use tilesplat_render::Framebuffer;

    fn framebuffer() -> Framebuffer {
        let mut framebuffer = Framebuffer::new(1, glam::uvec2(2, 1), 3);
        // A half covered red pixel next to an empty one.
        framebuffer.colors[..3].copy_from_slice(&[0.4, 0.0, 0.0]);
        framebuffer.alphas[0] = 0.5;
        framebuffer
    }

    #[test]
    fn unpremultiplies_colors() {
        let rgba = image_rgba(&framebuffer(), 0, false);
        assert_eq!(rgba.len(), 8);
        assert_approx_eq!(rgba[0], 0.8);
        assert_approx_eq!(rgba[3], 0.5);
        assert_eq!(&rgba[4..], &[0.0; 4]);
    }

    #[test]
    fn opaque_with_background() {
        let rgba = image_rgba(&framebuffer(), 0, true);
        assert_approx_eq!(rgba[0], 0.4);
        assert_approx_eq!(rgba[3], 1.0);
        assert_approx_eq!(rgba[7], 1.0);
    }
}
