//! Camera data the renderer reads.

use glam::Vec3;

use crate::device::RenderTargetHandle;
use crate::scene::Fog;

/// Stable camera identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub u32);

/// A camera as seen by the forward renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub id: CameraId,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
    /// Cull back faces; when off nothing is culled.
    pub cull_faces: bool,
    /// Mirror the winding, e.g. for reflection cameras.
    pub flip_faces: bool,
    /// Capture a copy of the scene color after the capture layer.
    pub render_scene_color_map: bool,
    /// Capture a copy of the scene depth after the capture layer.
    pub render_scene_depth_map: bool,
    /// The camera runs post-processing after its actions request it.
    pub postprocessing: bool,
    /// Target the camera renders to, `None` for the back buffer.
    pub render_target: Option<RenderTargetHandle>,
    /// Overrides the scene fog.
    pub fog: Option<Fog>,
}

impl Camera {
    pub fn new(id: u32) -> Self {
        Self {
            id: CameraId(id),
            position: Vec3::ZERO,
            near: 0.1,
            far: 1000.0,
            cull_faces: true,
            flip_faces: false,
            render_scene_color_map: false,
            render_scene_depth_map: false,
            postprocessing: false,
            render_target: None,
            fog: None,
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_clip(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    pub fn with_scene_capture(mut self, color: bool, depth: bool) -> Self {
        self.render_scene_color_map = color;
        self.render_scene_depth_map = depth;
        self
    }

    pub fn with_postprocessing(mut self, enabled: bool) -> Self {
        self.postprocessing = enabled;
        self
    }

    pub fn with_flip_faces(mut self, flip: bool) -> Self {
        self.flip_faces = flip;
        self
    }

    pub fn captures_scene(&self) -> bool {
        self.render_scene_color_map || self.render_scene_depth_map
    }
}
