//! Scene description consumed by the forward renderer.
//!
//! Transforms arrive already propagated and instances already culled; this
//! module only holds the data the renderer reads.

mod camera;
mod instance;
mod light;
mod material;

pub use camera::{Camera, CameraId};
pub use instance::{DrawInstance, InstancingData, Mesh};
pub use light::{
    CascadeData, Cookie, Light, LightId, LightKind, LightShape, ShadowData, MAX_SHADOW_CASCADES,
};
pub use material::{Material, MaterialId};

use glam::Vec3;

/// Fog model.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FogKind {
    #[default]
    None,
    Linear,
    Exp,
    Exp2,
}

/// Fog parameters of the scene, or a camera override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    pub kind: FogKind,
    /// Linear color.
    pub color: Vec3,
    pub start: f32,
    pub end: f32,
    pub density: f32,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            kind: FogKind::None,
            color: Vec3::ZERO,
            start: 1.0,
            end: 1000.0,
            density: 0.0,
        }
    }
}

/// Scene-wide lighting settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneSettings {
    /// Linear ambient color.
    pub ambient_color: Vec3,
    /// Ambient scale when physical units are in use.
    pub ambient_luminance: f32,
    pub skybox_intensity: f32,
    pub skybox_luminance: f32,
    pub fog: Fog,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            ambient_color: Vec3::ZERO,
            ambient_luminance: 0.0,
            skybox_intensity: 1.0,
            skybox_luminance: 0.0,
            fog: Fog::default(),
        }
    }
}
