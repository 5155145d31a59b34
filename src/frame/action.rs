//! Render actions: one camera rendering one layer.

use std::sync::Arc;

use crate::device::RenderTargetHandle;
use crate::scene::Camera;

/// Layer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

bitflags::bitflags! {
    /// Per-action behaviour.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RenderActionFlags: u32 {
        const CLEAR_COLOR = 1 << 0;
        const CLEAR_DEPTH = 1 << 1;
        const CLEAR_STENCIL = 1 << 2;
        /// Run the camera's post-processing after this action.
        const TRIGGER_POSTPROCESS = 1 << 3;
        /// The scene color is grabbed after this action.
        const CAPTURE_COLOR = 1 << 4;
        /// The scene depth is grabbed after this action.
        const CAPTURE_DEPTH = 1 << 5;
        /// First action rendered by its camera this frame.
        const FIRST_CAMERA_USE = 1 << 6;

        const CLEAR = Self::CLEAR_COLOR.bits() | Self::CLEAR_DEPTH.bits() | Self::CLEAR_STENCIL.bits();
        const CAPTURE = Self::CAPTURE_COLOR.bits() | Self::CAPTURE_DEPTH.bits();
    }
}

/// Pass owned by a camera that renders instead of the layer merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalPass {
    pub name: String,
}

impl ExternalPass {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A camera rendering a layer into a target.
#[derive(Debug, Clone)]
pub struct RenderAction {
    pub camera: Arc<Camera>,
    pub layer: LayerId,
    /// `None` renders to the back buffer.
    pub target: Option<RenderTargetHandle>,
    pub flags: RenderActionFlags,
    /// Passes supplied by the camera, appended as-is.
    pub camera_passes: Option<Vec<ExternalPass>>,
}

impl RenderAction {
    pub fn new(camera: Arc<Camera>, layer: u32) -> Self {
        let target = camera.render_target;
        Self {
            camera,
            layer: LayerId(layer),
            target,
            flags: RenderActionFlags::empty(),
            camera_passes: None,
        }
    }

    pub fn with_target(mut self, target: Option<RenderTargetHandle>) -> Self {
        self.target = target;
        self
    }

    pub fn with_flags(mut self, flags: RenderActionFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_camera_passes(mut self, passes: Vec<ExternalPass>) -> Self {
        self.camera_passes = Some(passes);
        self
    }

    pub fn uses_camera_passes(&self) -> bool {
        self.camera_passes.is_some()
    }

    /// A capture layer rendered by a camera that captures the scene.
    pub fn is_capture(&self) -> bool {
        !self.uses_camera_passes()
            && self.flags.intersects(RenderActionFlags::CAPTURE)
            && self.camera.captures_scene()
    }

    pub fn is_first_camera_use(&self) -> bool {
        self.flags.contains(RenderActionFlags::FIRST_CAMERA_USE)
    }

    pub fn triggers_postprocess(&self) -> bool {
        self.flags.contains(RenderActionFlags::TRIGGER_POSTPROCESS)
    }
}
