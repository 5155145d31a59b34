//! Greedy frame scheduling.
//!
//! Render actions are walked in order and merged into forward passes while
//! they keep drawing into the same target. A block closes when the next
//! action needs work in between (directional shadows, a scene capture) or
//! renders elsewhere.

use std::collections::HashMap;

use crate::device::RenderTargetHandle;
use crate::frame::action::{RenderAction, RenderActionFlags};
use crate::frame::pass::{ForwardPass, FrameGraph, FramePass};
use crate::profile_scope;
use crate::scene::{CameraId, LightId};

/// Everything the scheduler reads for one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameInputs {
    pub actions: Vec<RenderAction>,
    pub clustered_lighting: bool,
    /// Local lights rendering shadow maps this frame.
    pub local_shadow_lights: Vec<LightId>,
    /// Directional shadow casters each camera renders before its first
    /// action.
    pub directional_shadow_lights: HashMap<CameraId, Vec<LightId>>,
}

impl FrameInputs {
    pub fn new(actions: Vec<RenderAction>) -> Self {
        Self {
            actions,
            ..Self::default()
        }
    }

    pub fn with_clustered_lighting(mut self, clustered: bool) -> Self {
        self.clustered_lighting = clustered;
        self
    }

    pub fn with_local_shadows(mut self, lights: Vec<LightId>) -> Self {
        self.local_shadow_lights = lights;
        self
    }

    pub fn with_directional_shadows(mut self, camera: CameraId, lights: Vec<LightId>) -> Self {
        self.directional_shadow_lights.insert(camera, lights);
        self
    }

    fn directional_shadows_for(&self, action: &RenderAction) -> Option<&Vec<LightId>> {
        self.directional_shadow_lights
            .get(&action.camera.id)
            .filter(|lights| !lights.is_empty())
    }

    /// The action renders a camera for the first time and that camera has
    /// directional shadows to render first.
    fn needs_directional_shadows(&self, action: &RenderAction) -> bool {
        action.is_first_camera_use() && self.directional_shadows_for(action).is_some()
    }
}

/// Whether the block containing `current` must close after it.
pub fn breaks_after(
    inputs: &FrameInputs,
    current: &RenderAction,
    block_target: Option<RenderTargetHandle>,
    next: Option<&RenderAction>,
) -> bool {
    let Some(next) = next else {
        return true;
    };
    next.uses_camera_passes()
        || next.target != block_target
        || inputs.needs_directional_shadows(next)
        || next.is_capture()
        || current.is_capture()
}

/// Build the ordered pass list of a frame.
pub fn build_frame(inputs: &FrameInputs) -> FrameGraph {
    profile_scope!("build_frame");

    let mut graph = FrameGraph::new();

    if inputs.clustered_lighting {
        graph.add_pass(FramePass::ClusteredLights);
    } else if !inputs.local_shadow_lights.is_empty() {
        graph.add_pass(FramePass::LocalShadows {
            lights: inputs.local_shadow_lights.clone(),
        });
    }

    let actions = &inputs.actions;
    let mut block_start: Option<usize> = None;

    for (index, action) in actions.iter().enumerate() {
        if let Some(passes) = &action.camera_passes {
            for pass in passes {
                graph.add_pass(FramePass::External {
                    camera: action.camera.id,
                    name: pass.name.clone(),
                });
            }
            continue;
        }

        let start = *block_start.get_or_insert(index);
        let block_target = actions[start].target;

        if !breaks_after(inputs, action, block_target, actions.get(index + 1)) {
            continue;
        }

        close_block(inputs, &mut graph, start, index);
        block_start = None;
    }

    log::debug!(
        "scheduled {} passes for {} render actions",
        graph.len(),
        actions.len()
    );
    graph
}

fn close_block(inputs: &FrameInputs, graph: &mut FrameGraph, start: usize, end: usize) {
    let actions = &inputs.actions;
    let first = &actions[start];
    let last = &actions[end];
    let camera = &last.camera;

    let lone_capture = start == end && last.is_capture();
    if !lone_capture {
        if first.is_first_camera_use() {
            if let Some(lights) = inputs.directional_shadows_for(first) {
                graph.add_pass(FramePass::DirectionalShadows {
                    camera: first.camera.id,
                    lights: lights.clone(),
                });
            }
        }
        graph.add_pass(FramePass::Forward(ForwardPass {
            target: first.target,
            actions: (start..=end).collect(),
            clear: first.flags & RenderActionFlags::CLEAR,
        }));
    }

    if last.is_capture() {
        if last.flags.contains(RenderActionFlags::CAPTURE_COLOR) && camera.render_scene_color_map {
            graph.add_pass(FramePass::ColorGrab {
                camera: camera.id,
                target: last.target,
            });
        }
        if last.flags.contains(RenderActionFlags::CAPTURE_DEPTH) && camera.render_scene_depth_map {
            graph.add_pass(FramePass::DepthGrab {
                camera: camera.id,
                target: last.target,
            });
        }
    }

    if last.triggers_postprocess() && camera.postprocessing {
        graph.add_pass(FramePass::PostProcess { camera: camera.id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::action::ExternalPass;
    use crate::frame::pass::FramePassKind;
    use crate::scene::Camera;
    use std::sync::Arc;

    fn camera(id: u32) -> Arc<Camera> {
        Arc::new(Camera::new(id))
    }

    fn capturing_camera(id: u32) -> Arc<Camera> {
        Arc::new(Camera::new(id).with_scene_capture(true, true))
    }

    #[test]
    fn test_same_target_merges() {
        let cam = camera(0);
        let inputs = FrameInputs::new(vec![
            RenderAction::new(cam.clone(), 0).with_flags(RenderActionFlags::CLEAR_COLOR),
            RenderAction::new(cam.clone(), 1),
            RenderAction::new(cam, 2),
        ]);

        let graph = build_frame(&inputs);
        assert_eq!(graph.kinds(), [FramePassKind::Forward]);
        let forward = graph.forward_passes().next().map(|pass| pass.actions.clone());
        assert_eq!(forward, Some(vec![0, 1, 2]));
        assert_eq!(
            graph.forward_passes().next().map(|pass| pass.clear),
            Some(RenderActionFlags::CLEAR_COLOR)
        );
    }

    #[test]
    fn test_target_change_splits() {
        let cam = camera(0);
        let inputs = FrameInputs::new(vec![
            RenderAction::new(cam.clone(), 0).with_target(Some(RenderTargetHandle::new(1))),
            RenderAction::new(cam.clone(), 1).with_target(Some(RenderTargetHandle::new(1))),
            RenderAction::new(cam, 2),
        ]);

        let graph = build_frame(&inputs);
        let blocks: Vec<Vec<usize>> = graph.forward_passes().map(|pass| pass.actions.clone()).collect();
        assert_eq!(blocks, [vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_capture_in_the_middle() {
        let cam = capturing_camera(0);
        let inputs = FrameInputs::new(vec![
            RenderAction::new(cam.clone(), 0),
            RenderAction::new(cam.clone(), 1).with_flags(RenderActionFlags::CAPTURE),
            RenderAction::new(cam, 2),
        ]);

        let graph = build_frame(&inputs);
        assert_eq!(
            graph.kinds(),
            [
                FramePassKind::Forward,
                FramePassKind::ColorGrab,
                FramePassKind::DepthGrab,
                FramePassKind::Forward,
            ]
        );
    }

    #[test]
    fn test_capture_flags_ignored_without_camera_capture() {
        let cam = camera(0);
        let inputs = FrameInputs::new(vec![
            RenderAction::new(cam.clone(), 0),
            RenderAction::new(cam.clone(), 1).with_flags(RenderActionFlags::CAPTURE_COLOR),
            RenderAction::new(cam, 2),
        ]);

        assert_eq!(build_frame(&inputs).kinds(), [FramePassKind::Forward]);
    }

    #[test]
    fn test_directional_shadows_before_first_use() {
        let first = camera(0);
        let second = camera(1);
        let inputs = FrameInputs::new(vec![
            RenderAction::new(first.clone(), 0).with_flags(RenderActionFlags::FIRST_CAMERA_USE),
            RenderAction::new(second.clone(), 0).with_flags(RenderActionFlags::FIRST_CAMERA_USE),
            RenderAction::new(second, 1),
        ])
        .with_directional_shadows(CameraId(1), vec![LightId(7)]);

        let graph = build_frame(&inputs);
        assert_eq!(
            graph.kinds(),
            [
                FramePassKind::Forward,
                FramePassKind::DirectionalShadows,
                FramePassKind::Forward,
            ]
        );
        assert_eq!(
            graph.passes()[1],
            FramePass::DirectionalShadows {
                camera: CameraId(1),
                lights: vec![LightId(7)],
            }
        );
    }

    #[test]
    fn test_prologue() {
        let actions = vec![RenderAction::new(camera(0), 0)];

        let clustered = FrameInputs::new(actions.clone())
            .with_clustered_lighting(true)
            .with_local_shadows(vec![LightId(1)]);
        assert_eq!(
            build_frame(&clustered).kinds(),
            [FramePassKind::ClusteredLights, FramePassKind::Forward]
        );

        let shadows = FrameInputs::new(actions.clone()).with_local_shadows(vec![LightId(1)]);
        assert_eq!(
            build_frame(&shadows).kinds(),
            [FramePassKind::LocalShadows, FramePassKind::Forward]
        );

        assert_eq!(build_frame(&FrameInputs::new(actions)).kinds(), [FramePassKind::Forward]);
    }

    #[test]
    fn test_camera_passes_bypass_merging() {
        let cam = Arc::new(Camera::new(0).with_postprocessing(true));
        let inputs = FrameInputs::new(vec![
            RenderAction::new(cam.clone(), 0),
            RenderAction::new(camera(1), 0)
                .with_camera_passes(vec![ExternalPass::new("gbuffer"), ExternalPass::new("resolve")]),
            RenderAction::new(cam, 1).with_flags(RenderActionFlags::TRIGGER_POSTPROCESS),
        ]);

        let graph = build_frame(&inputs);
        assert_eq!(
            graph.kinds(),
            [
                FramePassKind::Forward,
                FramePassKind::External,
                FramePassKind::External,
                FramePassKind::Forward,
                FramePassKind::PostProcess,
            ]
        );
    }

    #[test]
    fn test_postprocess_needs_camera_support() {
        let inputs = FrameInputs::new(vec![
            RenderAction::new(camera(0), 0).with_flags(RenderActionFlags::TRIGGER_POSTPROCESS)
        ]);
        assert_eq!(build_frame(&inputs).kinds(), [FramePassKind::Forward]);
    }
}
