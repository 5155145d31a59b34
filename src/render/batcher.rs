//! Draw-call preparation.
//!
//! [`DrawCallBatcher::prepare`] walks the visible instances of a layer once,
//! resolves the shader variant of each one through the shared
//! [`ShaderCache`] and marks where GPU state has to change. A run of calls
//! that needs no material or light change is a [`DrawBatch`].

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::profile_scope;
use crate::render::lights::SortedLights;
use crate::scene::{DrawInstance, Material};
use crate::shader::{
    ProcessingOptions, ResourceSet, Semantic, ShaderCache, ShaderPass, ShaderVariant, VariantKey,
    VertexElement,
};

/// One draw call ready for submission.
#[derive(Debug, Clone)]
pub struct PreparedDrawCall {
    /// Index into the instance slice passed to `prepare`.
    pub instance: usize,
    pub variant: Arc<ShaderVariant>,
    /// Material state must be applied before this call.
    pub new_material: bool,
    /// Lights must be dispatched again before this call.
    pub light_mask_changed: bool,
}

/// Contiguous run of prepared calls sharing material and light state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawBatch {
    pub start: usize,
    pub len: usize,
}

impl DrawBatch {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

/// Result of preparing one layer. Built every frame.
#[derive(Debug, Clone, Default)]
pub struct PreparedDrawCalls {
    pub calls: Vec<PreparedDrawCall>,
    pub batches: Vec<DrawBatch>,
    /// Instances that produced no call.
    pub skipped: usize,
}

impl PreparedDrawCalls {
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Whether the call after `index` reuses the material state.
    pub fn next_shares_material(&self, index: usize) -> bool {
        self.calls
            .get(index + 1)
            .is_some_and(|next| !next.new_material)
    }

    pub fn batch_calls(&self, batch: &DrawBatch) -> &[PreparedDrawCall] {
        &self.calls[batch.range()]
    }
}

/// Resolves shader variants and marks state changes for a layer.
pub struct DrawCallBatcher {
    cache: Arc<ShaderCache>,
    view_resources: ResourceSet,
    vertex_elements: BTreeMap<Semantic, VertexElement>,
    clustered: bool,
}

impl DrawCallBatcher {
    pub fn new(cache: Arc<ShaderCache>, view_resources: ResourceSet) -> Self {
        Self {
            cache,
            view_resources,
            vertex_elements: BTreeMap::new(),
            clustered: false,
        }
    }

    /// Local lights are read from the clustered structure instead of being
    /// baked into variants.
    pub fn with_clustered_lighting(mut self, clustered: bool) -> Self {
        self.clustered = clustered;
        self
    }

    pub fn with_vertex_element(mut self, semantic: Semantic, element: VertexElement) -> Self {
        self.vertex_elements.insert(semantic, element);
        self
    }

    pub fn cache(&self) -> &Arc<ShaderCache> {
        &self.cache
    }

    /// Hash of everything besides the material and the lights that shapes
    /// the programs this batcher builds. Batchers sharing a cache only share
    /// variants when it matches.
    pub fn environment_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.view_resources.hash(&mut hasher);
        self.vertex_elements.hash(&mut hasher);
        self.clustered.hash(&mut hasher);
        hasher.finish()
    }

    pub fn prepare(
        &self,
        instances: &[DrawInstance],
        lights: &SortedLights<'_>,
        pass: ShaderPass,
    ) -> PreparedDrawCalls {
        profile_scope!("DrawCallBatcher::prepare");

        let light_hash = lights.light_hash(self.clustered);
        let environment = self.environment_hash();
        let mut prepared = PreparedDrawCalls::default();
        let mut prev_material: Option<&Arc<Material>> = None;
        let mut prev_object_flags = 0u64;
        let mut prev_mask = 0u32;

        for (index, instance) in instances.iter().enumerate() {
            if instance.is_empty_instanced() {
                prepared.skipped += 1;
                continue;
            }

            let material = &instance.material;
            let key = VariantKey {
                pass,
                light_hash,
                material_flags: material.variant_hash(),
                object_flags: instance.shader_flags,
                environment,
            };
            let variant = self
                .cache
                .get_or_build(key, || self.describe(material, instance, lights, pass));

            let new_material = match prev_material {
                Some(prev) => {
                    !Arc::ptr_eq(prev, material) || prev_object_flags != instance.shader_flags
                }
                None => true,
            };
            let light_mask_changed = prev_material.is_none() || instance.mask != prev_mask;

            if new_material || light_mask_changed {
                prepared.batches.push(DrawBatch {
                    start: prepared.calls.len(),
                    len: 0,
                });
            }
            if let Some(batch) = prepared.batches.last_mut() {
                batch.len += 1;
            }

            prepared.calls.push(PreparedDrawCall {
                instance: index,
                variant,
                new_material,
                light_mask_changed,
            });

            prev_material = Some(material);
            prev_object_flags = instance.shader_flags;
            prev_mask = instance.mask;
        }

        log::trace!(
            "prepared {} calls in {} batches ({} skipped)",
            prepared.calls.len(),
            prepared.batches.len(),
            prepared.skipped
        );
        prepared
    }

    fn describe(
        &self,
        material: &Material,
        instance: &DrawInstance,
        lights: &SortedLights<'_>,
        pass: ShaderPass,
    ) -> (crate::shader::ShaderDefinition, ProcessingOptions) {
        let defines = self.variant_defines(instance, lights, pass);
        let definition = material.variant_definition(&defines);

        let mut options = ProcessingOptions::new()
            .with_tier(self.view_resources.clone())
            .with_tier(material.resources.clone());
        options.vertex_elements = self
            .vertex_elements
            .iter()
            .map(|(semantic, element)| (*semantic, *element))
            .collect();
        (definition, options)
    }

    fn variant_defines(
        &self,
        instance: &DrawInstance,
        lights: &SortedLights<'_>,
        pass: ShaderPass,
    ) -> Vec<(String, String)> {
        let mut defines = vec![(pass_define(pass), String::new())];

        defines.push((
            "DIRECTIONAL_LIGHT_COUNT".to_string(),
            lights.directional.len().to_string(),
        ));
        if self.clustered {
            defines.push(("CLUSTERED_LIGHTS".to_string(), String::new()));
        } else {
            defines.push(("OMNI_LIGHT_COUNT".to_string(), lights.omni.len().to_string()));
            defines.push(("SPOT_LIGHT_COUNT".to_string(), lights.spot.len().to_string()));
        }

        if instance.shader_flags != 0 {
            defines.push(("OBJECT_FLAGS".to_string(), instance.shader_flags.to_string()));
        }
        defines
    }
}

fn pass_define(pass: ShaderPass) -> String {
    match pass {
        ShaderPass::Forward => "FORWARD_PASS".to_string(),
        ShaderPass::Depth => "DEPTH_PASS".to_string(),
        ShaderPass::Shadow => "SHADOW_PASS".to_string(),
        ShaderPass::Custom(id) => format!("CUSTOM_PASS_{id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BufferHandle, Primitive};
    use crate::scene::{InstancingData, Light, Mesh};
    use crate::shader::{
        BindingTier, ShaderDefinition, ShaderDialect, ShaderSource, UniformBufferFormat,
        UniformFormat, UniformType,
    };
    use glam::Vec3;

    const VERTEX: &str = "attribute vec3 vertex_position;\nuniform mat4 matrix_model;\nvoid main() { gl_Position = matrix_model * vec4(vertex_position, 1.0); }\n";
    const FRAGMENT: &str = "out vec4 color;\nvoid main() { color = vec4(1.0); }\n";

    fn material(id: u32, vertex: &str) -> Arc<Material> {
        let source = ShaderSource::new(format!("material{id}"), vertex, FRAGMENT);
        let definition =
            ShaderDefinition::new(source).with_attribute("vertex_position", Semantic::Position);
        Arc::new(Material::new(id, format!("material{id}"), definition))
    }

    fn mesh() -> Arc<Mesh> {
        Arc::new(Mesh {
            vertex_buffer: BufferHandle::new(1),
            index_buffer: None,
            primitive: Primitive::default(),
        })
    }

    fn batcher() -> DrawCallBatcher {
        let cache = Arc::new(ShaderCache::new(ShaderDialect::ExplicitBinding));
        DrawCallBatcher::new(cache, ResourceSet::empty(BindingTier::View))
    }

    #[test]
    fn test_material_and_mask_boundaries() {
        let mat_x = material(1, VERTEX);
        let mat_y = material(2, VERTEX);
        let mesh = mesh();
        let instances = [
            DrawInstance::new(mat_x.clone(), mesh.clone()).with_mask(1),
            DrawInstance::new(mat_x.clone(), mesh.clone()).with_mask(1),
            DrawInstance::new(mat_x.clone(), mesh.clone()).with_mask(2),
            DrawInstance::new(mat_y, mesh).with_mask(2),
        ];

        let prepared = batcher().prepare(&instances, &SortedLights::default(), ShaderPass::Forward);
        let flags: Vec<(bool, bool)> = prepared
            .calls
            .iter()
            .map(|call| (call.new_material, call.light_mask_changed))
            .collect();
        assert_eq!(flags, [(true, true), (false, false), (false, true), (true, false)]);
        assert_eq!(
            prepared.batches,
            [
                DrawBatch { start: 0, len: 2 },
                DrawBatch { start: 2, len: 1 },
                DrawBatch { start: 3, len: 1 },
            ]
        );
    }

    #[test]
    fn test_object_flags_force_new_material() {
        let mat = material(1, VERTEX);
        let mesh = mesh();
        let instances = [
            DrawInstance::new(mat.clone(), mesh.clone()),
            DrawInstance::new(mat, mesh).with_shader_flags(4),
        ];

        let batcher = batcher();
        let prepared = batcher.prepare(&instances, &SortedLights::default(), ShaderPass::Forward);
        assert!(prepared.calls[1].new_material);
        assert!(!Arc::ptr_eq(&prepared.calls[0].variant, &prepared.calls[1].variant));
        assert_eq!(batcher.cache().build_count(), 2);
    }

    #[test]
    fn test_zero_instance_draw_skipped() {
        let mat = material(1, VERTEX);
        let mesh = mesh();
        let instances = [
            DrawInstance::new(mat.clone(), mesh.clone()).with_instancing(InstancingData {
                vertex_buffer: BufferHandle::new(5),
                count: 0,
            }),
            DrawInstance::new(mat, mesh),
        ];

        let prepared = batcher().prepare(&instances, &SortedLights::default(), ShaderPass::Forward);
        assert_eq!(prepared.skipped, 1);
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared.calls[0].instance, 1);
        assert!(prepared.calls[0].new_material);
    }

    #[test]
    fn test_variants_shared_across_frames() {
        let mat = material(1, VERTEX);
        let instances = [DrawInstance::new(mat, mesh())];
        let lights = [Light::directional(0)];
        let sorted = SortedLights::new(&lights, Vec3::ZERO);

        let batcher = batcher();
        let first = batcher.prepare(&instances, &sorted, ShaderPass::Forward);
        let second = batcher.prepare(&instances, &sorted, ShaderPass::Forward);
        assert!(Arc::ptr_eq(&first.calls[0].variant, &second.calls[0].variant));
        assert_eq!(batcher.cache().build_count(), 1);

        let program = first.calls[0].variant.program().map(|p| p.vertex.clone());
        assert!(program.is_some_and(|vertex| vertex.contains("#define DIRECTIONAL_LIGHT_COUNT 1")));
    }

    fn object_uniforms(call: &PreparedDrawCall) -> Vec<String> {
        call.variant
            .program()
            .map(|program| {
                program
                    .object_layout
                    .uniform_format
                    .uniforms()
                    .iter()
                    .map(|uniform| uniform.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn tint_tier(tier: BindingTier) -> ResourceSet {
        ResourceSet::new(
            tier,
            Some(UniformBufferFormat::new(vec![UniformFormat::new(
                "tint",
                UniformType::Vec4,
                0,
            )])),
            Vec::new(),
        )
    }

    const TINTED_VERTEX: &str = "attribute vec3 vertex_position;\nuniform mat4 matrix_model;\nuniform vec4 tint;\nvoid main() { gl_Position = matrix_model * vec4(vertex_position, 1.0) * tint; }\n";

    #[test]
    fn test_material_tier_separates_variants() {
        let source = ShaderSource::new("tinted", TINTED_VERTEX, FRAGMENT);
        let definition =
            ShaderDefinition::new(source).with_attribute("vertex_position", Semantic::Position);
        let plain = Arc::new(Material::new(1, "plain", definition.clone()));
        let tinted = Arc::new(
            Material::new(2, "tinted", definition).with_resources(tint_tier(BindingTier::Material)),
        );
        let mesh = mesh();
        let instances = [
            DrawInstance::new(plain, mesh.clone()),
            DrawInstance::new(tinted, mesh),
        ];

        let prepared = batcher().prepare(&instances, &SortedLights::default(), ShaderPass::Forward);
        assert!(!Arc::ptr_eq(&prepared.calls[0].variant, &prepared.calls[1].variant));
        assert_eq!(object_uniforms(&prepared.calls[0]), ["matrix_model", "tint"]);
        assert_eq!(object_uniforms(&prepared.calls[1]), ["matrix_model"]);
    }

    #[test]
    fn test_attribute_semantics_separate_variants() {
        let source = ShaderSource::new("shared", VERTEX, FRAGMENT);
        let position = Arc::new(Material::new(
            1,
            "position",
            ShaderDefinition::new(source.clone()).with_attribute("vertex_position", Semantic::Position),
        ));
        let normal = Arc::new(Material::new(
            2,
            "normal",
            ShaderDefinition::new(source).with_attribute("vertex_position", Semantic::Normal),
        ));
        let mesh = mesh();
        let instances = [
            DrawInstance::new(position, mesh.clone()),
            DrawInstance::new(normal, mesh),
        ];

        let prepared = batcher().prepare(&instances, &SortedLights::default(), ShaderPass::Forward);
        let location = |call: &PreparedDrawCall| {
            call.variant
                .program()
                .and_then(|program| program.attributes.keys().next().copied())
        };
        assert_eq!(location(&prepared.calls[0]), Semantic::Position.location());
        assert_eq!(location(&prepared.calls[1]), Semantic::Normal.location());
    }

    #[test]
    fn test_batchers_sharing_cache_keep_view_tiers_apart() {
        let cache = Arc::new(ShaderCache::new(ShaderDialect::ExplicitBinding));
        let bare = DrawCallBatcher::new(cache.clone(), ResourceSet::empty(BindingTier::View));
        let tinted = DrawCallBatcher::new(cache.clone(), tint_tier(BindingTier::View));
        assert_ne!(bare.environment_hash(), tinted.environment_hash());

        let instances = [DrawInstance::new(material(1, TINTED_VERTEX), mesh())];
        let lights = SortedLights::default();
        let from_bare = bare.prepare(&instances, &lights, ShaderPass::Forward);
        let from_tinted = tinted.prepare(&instances, &lights, ShaderPass::Forward);

        assert_eq!(cache.build_count(), 2);
        assert_eq!(object_uniforms(&from_bare.calls[0]), ["matrix_model", "tint"]);
        assert_eq!(object_uniforms(&from_tinted.calls[0]), ["matrix_model"]);
    }

    #[test]
    fn test_failed_variant_still_prepared() {
        let broken = material(1, "attribute vec3 vertex_position;\nuniform float a, b;\nvoid main() {}\n");
        let instances = [DrawInstance::new(broken, mesh())];

        let prepared = batcher().prepare(&instances, &SortedLights::default(), ShaderPass::Forward);
        assert_eq!(prepared.len(), 1);
        assert!(prepared.calls[0].variant.is_failed());
    }
}
