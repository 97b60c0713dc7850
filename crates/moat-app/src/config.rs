use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::path::Path;

use glam::{Vec3, Vec4};
use moat_core::constants::{
    CAMERA_POLE_MARGIN, DEFAULT_FRAME_RESOURCES, MAX_CAMERA_RADIUS, MAX_LIGHTS, MIN_CAMERA_RADIUS,
    MIN_FRAME_RESOURCES, ORBIT_RADIANS_PER_PIXEL, ZOOM_UNITS_PER_PIXEL,
};
use moat_core::ConfigError;
use moat_render::{Fog, GpuLight};
use moat_sim::{DisturbParams, WaveParams};
use serde::{Deserialize, Serialize};

/// Orbit camera start position and limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Azimuth around +Y.
    pub theta: f32,
    /// Polar angle from +Y.
    pub phi: f32,
    pub radius: f32,
    pub min_radius: f32,
    pub max_radius: f32,
    /// Closest the polar angle may get to either pole.
    pub pole_margin: f32,
    /// Radians per pixel of primary drag.
    pub orbit_speed: f32,
    /// World units per pixel of secondary drag.
    pub zoom_speed: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            theta: 1.5 * PI,
            phi: FRAC_PI_2 - 0.1,
            radius: 50.0,
            min_radius: MIN_CAMERA_RADIUS,
            max_radius: MAX_CAMERA_RADIUS,
            pole_margin: CAMERA_POLE_MARGIN,
            orbit_speed: ORBIT_RADIANS_PER_PIXEL,
            zoom_speed: ZOOM_UNITS_PER_PIXEL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            fov_y: FRAC_PI_4,
            near: 1.0,
            far: 1000.0,
        }
    }
}

impl ViewportConfig {
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Texture-space scroll of the water material, per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    pub u_speed: f32,
    pub v_speed: f32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            u_speed: 0.1,
            v_speed: 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FogConfig {
    /// Also used as the clear colour.
    pub color: (f32, f32, f32, f32),
    pub start: f32,
    pub range: f32,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            color: (0.7, 0.7, 0.7, 1.0),
            start: 5.0,
            range: 150.0,
        }
    }
}

impl FogConfig {
    pub fn to_fog(&self) -> Fog {
        let (r, g, b, a) = self.color;
        Fog {
            color: Vec4::new(r, g, b, a),
            start: self.start,
            range: self.range,
        }
    }

    pub fn clear_color(&self) -> [f32; 4] {
        let (r, g, b, a) = self.color;
        [r, g, b, a]
    }
}

/// A point light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightConfig {
    pub position: (f32, f32, f32),
    pub strength: (f32, f32, f32),
    #[serde(default = "default_falloff_start")]
    pub falloff_start: f32,
    #[serde(default = "default_falloff_end")]
    pub falloff_end: f32,
}

fn default_falloff_start() -> f32 {
    1.0
}

fn default_falloff_end() -> f32 {
    10.0
}

impl LightConfig {
    pub fn to_gpu(&self) -> GpuLight {
        GpuLight::point(
            Vec3::from(self.position),
            Vec3::from(self.strength),
            self.falloff_start,
            self.falloff_end,
        )
    }
}

/// Everything the demo reads at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub waves: WaveParams,
    pub frame_resources: usize,
    pub disturb: DisturbParams,
    pub camera: CameraConfig,
    pub viewport: ViewportConfig,
    pub water_scroll: ScrollConfig,
    pub ambient_light: (f32, f32, f32, f32),
    pub fog: FogConfig,
    pub lights: Vec<LightConfig>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            waves: WaveParams::default(),
            frame_resources: DEFAULT_FRAME_RESOURCES,
            disturb: DisturbParams::default(),
            camera: CameraConfig::default(),
            viewport: ViewportConfig::default(),
            water_scroll: ScrollConfig::default(),
            ambient_light: (0.25, 0.25, 0.35, 1.0),
            fog: FogConfig::default(),
            lights: vec![
                LightConfig {
                    position: (0.0, 3.5, -0.75),
                    strength: (0.0, 0.0, 2.0),
                    falloff_start: 1.0,
                    falloff_end: 10.0,
                },
                LightConfig {
                    position: (0.0, 3.5, -11.0),
                    strength: (2.0, 0.0, 0.0),
                    falloff_start: 1.0,
                    falloff_end: 10.0,
                },
            ],
        }
    }
}

impl DemoConfig {
    /// The defaults shipped in `data/demo.ron`.
    pub fn bundled() -> Result<Self, ConfigError> {
        load_config_from_str(include_str!("../../../data/demo.ron"))
    }

    pub fn ambient(&self) -> Vec4 {
        let (r, g, b, a) = self.ambient_light;
        Vec4::new(r, g, b, a)
    }

    pub fn gpu_lights(&self) -> Vec<GpuLight> {
        self.lights.iter().map(LightConfig::to_gpu).collect()
    }

    /// Checks that span more than one sub-config. Wave and disturbance
    /// parameters are validated by the types that consume them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_resources < MIN_FRAME_RESOURCES {
            return Err(ConfigError::TooFewFrameResources {
                min: MIN_FRAME_RESOURCES,
                got: self.frame_resources,
            });
        }

        let cam = &self.camera;
        if !(cam.min_radius > 0.0 && cam.min_radius <= cam.max_radius) {
            return Err(ConfigError::InvalidParameter {
                name: "camera.min_radius",
                value: cam.min_radius,
            });
        }
        if !(cam.pole_margin > 0.0 && cam.pole_margin < FRAC_PI_2) {
            return Err(ConfigError::InvalidParameter {
                name: "camera.pole_margin",
                value: cam.pole_margin,
            });
        }
        for (name, value) in [
            ("camera.theta", cam.theta),
            ("camera.phi", cam.phi),
            ("camera.radius", cam.radius),
            ("camera.orbit_speed", cam.orbit_speed),
            ("camera.zoom_speed", cam.zoom_speed),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::InvalidParameter { name, value });
            }
        }

        let vp = &self.viewport;
        if vp.width == 0 || vp.height == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "viewport.size",
                value: vp.width.min(vp.height) as f32,
            });
        }
        if !(vp.near > 0.0 && vp.far > vp.near) {
            return Err(ConfigError::InvalidParameter {
                name: "viewport.near",
                value: vp.near,
            });
        }
        if !(vp.fov_y > 0.0 && vp.fov_y < PI) {
            return Err(ConfigError::InvalidParameter {
                name: "viewport.fov_y",
                value: vp.fov_y,
            });
        }

        if !(self.fog.range > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "fog.range",
                value: self.fog.range,
            });
        }
        if self.lights.len() > MAX_LIGHTS {
            return Err(ConfigError::InvalidParameter {
                name: "lights",
                value: self.lights.len() as f32,
            });
        }
        for light in &self.lights {
            if !(light.falloff_start >= 0.0 && light.falloff_end > light.falloff_start) {
                return Err(ConfigError::InvalidParameter {
                    name: "light.falloff_end",
                    value: light.falloff_end,
                });
            }
        }
        Ok(())
    }
}

/// Parse and validate a demo configuration from RON.
pub fn load_config_from_str(ron_str: &str) -> Result<DemoConfig, ConfigError> {
    let options = ron::Options::default();
    let config: DemoConfig = options.from_str(ron_str).map_err(|e| ConfigError::Parse {
        what: "demo config",
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Read a configuration file from disk.
pub fn load_config(path: &Path) -> Result<DemoConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
        what: "demo config",
        message: format!("{}: {e}", path.display()),
    })?;
    load_config_from_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_matches_defaults() {
        let bundled = DemoConfig::bundled().expect("bundled config parses");
        let defaults = DemoConfig::default();
        assert_eq!(bundled.waves, defaults.waves);
        assert_eq!(bundled.disturb, defaults.disturb);
        assert_eq!(bundled.frame_resources, 3);
        assert_eq!(bundled.lights, defaults.lights);
        assert_eq!(bundled.fog, defaults.fog);
        assert!((bundled.camera.theta - defaults.camera.theta).abs() < 1e-5);
        assert!((bundled.camera.orbit_speed - defaults.camera.orbit_speed).abs() < 1e-7);
        assert!((bundled.viewport.fov_y - defaults.viewport.fov_y).abs() < 1e-6);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = load_config_from_str("(frame_resources: 2, fog: (start: 10.0))").expect("parse");
        assert_eq!(config.frame_resources, 2);
        assert_eq!(config.fog.start, 10.0);
        assert_eq!(config.fog.range, 150.0);
        assert_eq!(config.waves, WaveParams::default());
    }

    #[test]
    fn test_single_frame_resource_rejected() {
        let err = load_config_from_str("(frame_resources: 1)").err();
        assert_eq!(err, Some(ConfigError::TooFewFrameResources { min: 2, got: 1 }));
    }

    #[test]
    fn test_inverted_radius_limits_rejected() {
        let err = load_config_from_str("(camera: (min_radius: 200.0, max_radius: 150.0))").err();
        assert!(matches!(
            err,
            Some(ConfigError::InvalidParameter {
                name: "camera.min_radius",
                ..
            })
        ));
    }

    #[test]
    fn test_parse_error_reported() {
        let err = load_config_from_str("(waves: (rows: ").err();
        assert!(matches!(err, Some(ConfigError::Parse { what: "demo config", .. })));
    }

    #[test]
    fn test_light_falloff_defaults() {
        let config = load_config_from_str("(lights: [(position: (1.0, 2.0, 3.0), strength: (1.0, 1.0, 1.0))])")
            .expect("parse");
        let light = config.gpu_lights()[0];
        assert_eq!(light.falloff_start, 1.0);
        assert_eq!(light.falloff_end, 10.0);
        assert_eq!(light.position, [1.0, 2.0, 3.0]);
    }
}
