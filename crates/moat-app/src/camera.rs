use std::f32::consts::{PI, TAU};

use glam::{Mat4, Vec3};
use moat_core::math::spherical_to_cartesian;

use crate::config::{CameraConfig, ViewportConfig};

/// Camera orbiting the origin on a sphere, left-handed, Y up.
pub struct OrbitCamera {
    theta: f32,
    phi: f32,
    radius: f32,
    config: CameraConfig,
    eye: Vec3,
    view: Mat4,
}

impl OrbitCamera {
    /// Starting angles and radius are clamped into the configured limits.
    pub fn new(config: CameraConfig) -> Self {
        let mut camera = Self {
            theta: config.theta,
            phi: config.phi,
            radius: config.radius,
            config,
            eye: Vec3::ZERO,
            view: Mat4::IDENTITY,
        };
        camera.clamp();
        camera.update_view();
        camera
    }

    /// Primary drag: rotate around the target.
    pub fn on_drag(&mut self, dx: f32, dy: f32) {
        if !(dx.is_finite() && dy.is_finite()) {
            return;
        }
        self.theta = (self.theta + self.config.orbit_speed * dx).rem_euclid(TAU);
        self.phi += self.config.orbit_speed * dy;
        self.clamp();
    }

    /// Secondary drag: move toward or away from the target.
    pub fn on_secondary_drag(&mut self, dx: f32, dy: f32) {
        if !(dx.is_finite() && dy.is_finite()) {
            return;
        }
        self.radius += self.config.zoom_speed * (dx - dy);
        self.clamp();
    }

    fn clamp(&mut self) {
        let margin = self.config.pole_margin;
        self.phi = self.phi.clamp(margin, PI - margin);
        self.radius = self.radius.clamp(self.config.min_radius, self.config.max_radius);
    }

    /// Recompute eye and view matrix from the orbit parameters.
    pub fn update_view(&mut self) {
        self.eye = spherical_to_cartesian(self.radius, self.theta, self.phi);
        self.view = Mat4::look_at_lh(self.eye, Vec3::ZERO, Vec3::Y);
    }

    pub fn projection(&self, viewport: &ViewportConfig) -> Mat4 {
        Mat4::perspective_lh(viewport.fov_y, viewport.aspect(), viewport.near, viewport.far)
    }

    pub fn theta(&self) -> f32 {
        self.theta
    }

    pub fn phi(&self) -> f32 {
        self.phi
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn eye(&self) -> Vec3 {
        self.eye
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }
}
