//! Forward submission of prepared draw calls.

use std::sync::Arc;

use glam::Vec4;

use crate::device::{CullMode, RenderDevice, UniformValue};
use crate::profile_scope;
use crate::render::batcher::{DrawCallBatcher, PreparedDrawCalls};
use crate::render::lights::{dispatch_global_lights, LightDispatcher, SortedLights};
use crate::scene::{Camera, DrawInstance, FogKind, Light, SceneSettings};
use crate::shader::{BindingTier, ProcessedShader, ResourceSet, ShaderCache, ShaderPass};
use crate::{DeviceLimits, RendererConfig};

/// GPU light structure used with clustered lighting.
pub trait LightCluster {
    /// Bind the structure for the layer about to be drawn.
    fn activate(&self, device: &mut dyn RenderDevice);
}

/// Per-frame submission counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub forward_draw_calls: u32,
    /// Draws that used hardware instancing; also counted as forward draws.
    pub instanced_draw_calls: u32,
    pub material_switches: u32,
    /// Calls dropped because their shader failed, plus empty instanced
    /// draws.
    pub skipped_draws: u32,
}

/// One forward layer as seen from one camera.
pub struct ForwardLayer<'a> {
    pub camera: &'a Camera,
    /// Visible instances in draw order.
    pub instances: &'a [DrawInstance],
    pub lights: &'a [Light],
    /// The render target is rendered upside down.
    pub flip_target: bool,
    pub pass: ShaderPass,
    pub cluster: Option<&'a dyn LightCluster>,
}

impl<'a> ForwardLayer<'a> {
    pub fn new(camera: &'a Camera, instances: &'a [DrawInstance], lights: &'a [Light]) -> Self {
        Self {
            camera,
            instances,
            lights,
            flip_target: false,
            pass: ShaderPass::Forward,
            cluster: None,
        }
    }

    pub fn with_flip_target(mut self, flip: bool) -> Self {
        self.flip_target = flip;
        self
    }

    pub fn with_pass(mut self, pass: ShaderPass) -> Self {
        self.pass = pass;
        self
    }

    pub fn with_cluster(mut self, cluster: &'a dyn LightCluster) -> Self {
        self.cluster = Some(cluster);
        self
    }
}

/// Forward renderer: prepares, lights and submits layers.
pub struct ForwardRenderer {
    config: RendererConfig,
    batcher: DrawCallBatcher,
    dispatcher: LightDispatcher,
    stats: RenderStats,
    object_buffer: Vec<u8>,
}

impl ForwardRenderer {
    pub fn new(
        config: RendererConfig,
        limits: DeviceLimits,
        cache: Arc<ShaderCache>,
        view_resources: ResourceSet,
    ) -> Self {
        if cache.dialect() != config.dialect {
            log::warn!(
                "shader cache dialect {:?} differs from configured {:?}",
                cache.dialect(),
                config.dialect
            );
        }
        let slots = config.max_light_slots(&limits);
        log::debug!("forward renderer with {} light slots", slots);

        let batcher = DrawCallBatcher::new(cache, view_resources)
            .with_clustered_lighting(config.clustered_lighting);
        let dispatcher = LightDispatcher::new(slots)
            .with_shadows(config.shadows_enabled)
            .with_cookies(config.cookies_enabled);

        Self {
            config,
            batcher,
            dispatcher,
            stats: RenderStats::default(),
            object_buffer: Vec::new(),
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn batcher(&self) -> &DrawCallBatcher {
        &self.batcher
    }

    pub fn dispatcher(&self) -> &LightDispatcher {
        &self.dispatcher
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Clear the counters at the start of a frame.
    pub fn reset_stats(&mut self) {
        self.stats = RenderStats::default();
    }

    /// Upload per-camera scene constants: ambient, skybox, fog and screen
    /// size.
    pub fn set_scene_constants(
        &self,
        device: &mut dyn RenderDevice,
        settings: &SceneSettings,
        camera: &Camera,
        width: u32,
        height: u32,
    ) {
        dispatch_global_lights(device, settings, self.config.physical_units);

        let fog = camera.fog.as_ref().unwrap_or(&settings.fog);
        match fog.kind {
            FogKind::None => {}
            FogKind::Linear => {
                device.set_uniform("fog_color", UniformValue::Vec3(fog.color));
                device.set_uniform("fog_start", UniformValue::Float(fog.start));
                device.set_uniform("fog_end", UniformValue::Float(fog.end));
            }
            FogKind::Exp | FogKind::Exp2 => {
                device.set_uniform("fog_color", UniformValue::Vec3(fog.color));
                device.set_uniform("fog_density", UniformValue::Float(fog.density));
            }
        }

        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        device.set_uniform(
            "uScreenSize",
            UniformValue::Vec4(Vec4::new(w, h, 1.0 / w, 1.0 / h)),
        );
    }

    /// Prepare and submit one layer. Returns the prepared calls.
    pub fn render_forward_layer(
        &mut self,
        device: &mut dyn RenderDevice,
        layer: &ForwardLayer<'_>,
    ) -> PreparedDrawCalls {
        profile_scope!("ForwardRenderer::render_forward_layer");

        let sorted = SortedLights::new(layer.lights, layer.camera.position);
        let prepared = self.batcher.prepare(layer.instances, &sorted, layer.pass);
        self.stats.skipped_draws += prepared.skipped as u32;

        if self.config.clustered_lighting {
            if let Some(cluster) = layer.cluster {
                cluster.activate(device);
            }
        }

        self.submit(device, layer, &sorted, &prepared);
        prepared
    }

    fn submit(
        &mut self,
        device: &mut dyn RenderDevice,
        layer: &ForwardLayer<'_>,
        sorted: &SortedLights<'_>,
        prepared: &PreparedDrawCalls,
    ) {
        let camera = layer.camera;
        // a skipped call may have carried the light change
        let mut lights_pending = false;

        for (index, call) in prepared.calls.iter().enumerate() {
            let instance = &layer.instances[call.instance];
            let Some(program) = call.variant.program() else {
                self.stats.skipped_draws += 1;
                lights_pending |= call.light_mask_changed;
                continue;
            };
            let material = &instance.material;

            if call.new_material {
                self.stats.material_switches += 1;
                device.set_shader(program);
                material.apply_parameters(device);
                if let Some(format) = &material.resources.bind_group_format {
                    device.set_bind_group(BindingTier::Material, format);
                }
            }

            if call.light_mask_changed || lights_pending {
                lights_pending = false;
                let count = self.dispatcher.dispatch_directional(
                    device,
                    &sorted.directional,
                    instance.mask,
                    camera,
                );
                if !self.config.clustered_lighting {
                    self.dispatcher.dispatch_local(device, sorted, instance.mask, count);
                }
            }

            if call.new_material {
                device.set_uniform("alpha_ref", UniformValue::Float(material.alpha_test));
                device.set_blend_state(material.blend);
                device.set_depth_state(material.depth);
            }

            device.set_cull_mode(cull_mode(camera, layer.flip_target, instance));
            device.set_stencil_state(instance.stencil.or(material.stencil));

            for (name, value) in &instance.parameters {
                device.set_uniform(name, value.clone());
            }

            device.set_vertex_buffer(0, instance.mesh.vertex_buffer);
            if let Some(instancing) = instance.instancing {
                device.set_vertex_buffer(1, instancing.vertex_buffer);
            }

            self.set_object_resources(device, program, instance);

            device.draw(
                &instance.mesh.primitive,
                instance.mesh.index_buffer,
                instance.instance_count(),
            );
            self.stats.forward_draw_calls += 1;
            if instance.instancing.is_some() {
                self.stats.instanced_draw_calls += 1;
            }

            if prepared.next_shares_material(index) && !instance.parameters.is_empty() {
                material.restore_parameters(device, instance.parameters.keys());
            }
        }
    }

    fn set_object_resources(
        &mut self,
        device: &mut dyn RenderDevice,
        program: &ProcessedShader,
        instance: &DrawInstance,
    ) {
        let model = UniformValue::Mat4(instance.world_transform);
        let normal = UniformValue::Mat3(instance.normal_matrix());

        let layout = &program.object_layout;
        if program.dialect.uses_uniform_buffers() {
            let format = &layout.uniform_format;
            self.object_buffer.clear();
            self.object_buffer.resize(format.byte_size() as usize, 0);
            format.write(&mut self.object_buffer, "matrix_model", &model);
            format.write(&mut self.object_buffer, "matrix_normal", &normal);
            for (name, value) in &instance.parameters {
                format.write(&mut self.object_buffer, name, value);
            }
            device.set_uniform_buffer(BindingTier::ObjectUniformBuffer, format, &self.object_buffer);
        }

        device.set_uniform("matrix_model", model);
        device.set_uniform("matrix_normal", normal);

        if !layout.bind_group_format.is_empty() {
            device.set_bind_group(BindingTier::Object, &layout.bind_group_format);
        }
    }
}

/// Cull mode of one draw.
///
/// Faces flip once for each of: camera mirroring, an upside-down target and
/// a negative-determinant transform.
pub fn cull_mode(camera: &Camera, flip_target: bool, instance: &DrawInstance) -> CullMode {
    let cull = instance.material.cull;
    if !camera.cull_faces || cull == CullMode::None {
        return CullMode::None;
    }
    if camera.flip_faces ^ flip_target ^ instance.flips_faces() {
        cull.flipped()
    } else {
        cull
    }
}
