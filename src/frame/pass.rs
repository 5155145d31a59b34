//! Passes of a scheduled frame.

use crate::device::RenderTargetHandle;
use crate::frame::action::RenderActionFlags;
use crate::scene::{CameraId, LightId};

/// Consecutive render actions drawn into one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardPass {
    pub target: Option<RenderTargetHandle>,
    /// Indices into the frame's render actions, in order.
    pub actions: Vec<usize>,
    /// Clear flags of the first action.
    pub clear: RenderActionFlags,
}

/// Type of frame pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramePassKind {
    ClusteredLights,
    LocalShadows,
    DirectionalShadows,
    Forward,
    ColorGrab,
    DepthGrab,
    PostProcess,
    External,
}

/// One element of the frame, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePass {
    /// Update the clustered light structure, including local shadows and
    /// cookies.
    ClusteredLights,
    /// Render shadow maps of local lights.
    LocalShadows { lights: Vec<LightId> },
    /// Render directional shadow maps for a camera.
    DirectionalShadows { camera: CameraId, lights: Vec<LightId> },
    Forward(ForwardPass),
    /// Copy the scene color for later layers.
    ColorGrab {
        camera: CameraId,
        target: Option<RenderTargetHandle>,
    },
    /// Copy the scene depth for later layers.
    DepthGrab {
        camera: CameraId,
        target: Option<RenderTargetHandle>,
    },
    PostProcess { camera: CameraId },
    External { camera: CameraId, name: String },
}

impl FramePass {
    pub fn kind(&self) -> FramePassKind {
        match self {
            Self::ClusteredLights => FramePassKind::ClusteredLights,
            Self::LocalShadows { .. } => FramePassKind::LocalShadows,
            Self::DirectionalShadows { .. } => FramePassKind::DirectionalShadows,
            Self::Forward(_) => FramePassKind::Forward,
            Self::ColorGrab { .. } => FramePassKind::ColorGrab,
            Self::DepthGrab { .. } => FramePassKind::DepthGrab,
            Self::PostProcess { .. } => FramePassKind::PostProcess,
            Self::External { .. } => FramePassKind::External,
        }
    }

    pub fn as_forward(&self) -> Option<&ForwardPass> {
        match self {
            Self::Forward(pass) => Some(pass),
            _ => None,
        }
    }
}

/// Ordered passes of one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameGraph {
    passes: Vec<FramePass>,
}

impl FrameGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, pass: FramePass) {
        log::trace!("frame pass {:?}", pass.kind());
        self.passes.push(pass);
    }

    pub fn passes(&self) -> &[FramePass] {
        &self.passes
    }

    pub fn kinds(&self) -> Vec<FramePassKind> {
        self.passes.iter().map(FramePass::kind).collect()
    }

    pub fn forward_passes(&self) -> impl Iterator<Item = &ForwardPass> {
        self.passes.iter().filter_map(FramePass::as_forward)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}
