use clap::ValueEnum;
use glam::{Mat3, Mat4, Quat, UVec2, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::calc_tile_bounds;

/// How camera space points are mapped onto the image plane.
#[derive(
    Default, ValueEnum, Clone, Copy, Eq, PartialEq, Debug, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum CameraModel {
    #[default]
    Pinhole,
    /// Equidistant fisheye.
    Fisheye,
    Ortho,
}

/// A camera in the OpenCV convention: x right, y down, looking along +z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub world_to_cam: Mat4,
    /// Focal length in pixels.
    pub focal: Vec2,
    /// Principal point in pixels.
    pub center: Vec2,
    pub img_size: UVec2,
}

pub fn focal_to_fov(focal: f32, pixels: u32) -> f32 {
    2.0 * f32::atan((pixels as f32) / (2.0 * focal))
}

pub fn fov_to_focal(fov_rad: f32, pixels: u32) -> f32 {
    0.5 * (pixels as f32) / f32::tan(fov_rad * 0.5)
}

impl Camera {
    pub fn new(world_to_cam: Mat4, focal: Vec2, center: Vec2, img_size: UVec2) -> Self {
        Self {
            world_to_cam,
            focal,
            center,
            img_size,
        }
    }

    /// Camera at `position`, where `rotation` rotates camera axes into world axes.
    pub fn from_pose(
        position: Vec3,
        rotation: Quat,
        focal: Vec2,
        center: Vec2,
        img_size: UVec2,
    ) -> Self {
        let local_to_world = Mat4::from_rotation_translation(rotation, position);
        Self::new(local_to_world.inverse(), focal, center, img_size)
    }

    /// Camera with a horizontal field of view, square pixels and a centered
    /// principal point.
    pub fn from_fov(position: Vec3, rotation: Quat, fov_x: f32, img_size: UVec2) -> Self {
        let focal = fov_to_focal(fov_x, img_size.x);
        Self::from_pose(
            position,
            rotation,
            Vec2::splat(focal),
            img_size.as_vec2() * 0.5,
            img_size,
        )
    }

    /// Camera at `eye` looking at `target`. `up` must not be parallel to the view direction.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, fov_x: f32, img_size: UVec2) -> Self {
        let forward = (target - eye).normalize();
        let right = forward.cross(up).normalize();
        let down = forward.cross(right);
        let rotation = Quat::from_mat3(&Mat3::from_cols(right, down, forward));
        Self::from_fov(eye, rotation, fov_x, img_size)
    }

    pub fn rotation(&self) -> Mat3 {
        Mat3::from_mat4(self.world_to_cam)
    }

    pub fn translation(&self) -> Vec3 {
        self.world_to_cam.w_axis.truncate()
    }

    /// Camera center in world space.
    pub fn position(&self) -> Vec3 {
        -(self.rotation().transpose() * self.translation())
    }

    pub fn fov_x(&self) -> f32 {
        focal_to_fov(self.focal.x, self.img_size.x)
    }

    pub fn fov_y(&self) -> f32 {
        focal_to_fov(self.focal.y, self.img_size.y)
    }

    pub fn tile_bounds(&self, tile_size: u32) -> UVec2 {
        calc_tile_bounds(self.img_size, tile_size)
    }
}
