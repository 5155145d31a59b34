//! Materials: shader template, render state and parameters.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::device::{BlendState, CullMode, DepthState, RenderDevice, StencilState, UniformValue};
use crate::shader::layout::{BindingTier, ResourceSet};
use crate::shader::processor::ShaderDefinition;
use crate::shader::{build_defines, ShaderDef};

/// Stable material identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// A material shared by draw instances through `Arc`.
///
/// Two instances use the same material when they point at the same
/// allocation.
#[derive(Debug, Clone)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    /// Shader template; variants add defines to it.
    pub definition: ShaderDefinition,
    pub defines: BTreeMap<String, ShaderDef>,
    /// Material-level variant bits, part of the variant key.
    pub variant_flags: u64,
    /// Resources bound at the material tier.
    pub resources: ResourceSet,
    pub parameters: BTreeMap<String, UniformValue>,
    /// `None` renders opaque.
    pub blend: Option<BlendState>,
    pub depth: DepthState,
    pub stencil: Option<StencilState>,
    pub cull: CullMode,
    pub alpha_test: f32,
}

impl Material {
    pub fn new(id: u32, name: impl Into<String>, definition: ShaderDefinition) -> Self {
        Self {
            id: MaterialId(id),
            name: name.into(),
            definition,
            defines: BTreeMap::new(),
            variant_flags: 0,
            resources: ResourceSet::empty(BindingTier::Material),
            parameters: BTreeMap::new(),
            blend: None,
            depth: DepthState::default(),
            stencil: None,
            cull: CullMode::Back,
            alpha_test: 0.0,
        }
    }

    pub fn with_define(mut self, name: impl Into<String>, def: impl Into<ShaderDef>) -> Self {
        self.defines.insert(name.into(), def.into());
        self
    }

    pub fn with_variant_flags(mut self, flags: u64) -> Self {
        self.variant_flags = flags;
        self
    }

    pub fn with_resources(mut self, resources: ResourceSet) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: UniformValue) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_blend(mut self, blend: BlendState) -> Self {
        self.blend = Some(blend);
        self
    }

    pub fn with_stencil(mut self, stencil: StencilState) -> Self {
        self.stencil = Some(stencil);
        self
    }

    pub fn with_cull(mut self, cull: CullMode) -> Self {
        self.cull = cull;
        self
    }

    /// Variant bits identifying this material's programs: the shader
    /// template with its attribute semantics, the defines,
    /// [`Material::variant_flags`] and the resources bound at the material
    /// tier.
    pub fn variant_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.definition.hash(&mut hasher);
        self.defines.hash(&mut hasher);
        self.variant_flags.hash(&mut hasher);
        self.resources.hash(&mut hasher);
        hasher.finish()
    }

    /// Shader definition of a variant: the material defines followed by
    /// `extra`, inserted into both stages.
    pub fn variant_definition(&self, extra: &[(String, String)]) -> ShaderDefinition {
        let mut defines = build_defines(self.defines.iter().map(|(name, def)| (name.as_str(), def)));
        defines.extend_from_slice(extra);

        ShaderDefinition {
            source: self.definition.source.with_defines(&defines),
            attributes: self.definition.attributes.clone(),
        }
    }

    /// Upload every material parameter.
    pub fn apply_parameters(&self, device: &mut dyn RenderDevice) {
        for (name, value) in &self.parameters {
            device.set_uniform(name, value.clone());
        }
    }

    /// Upload the material value of each name in `overridden` that the
    /// material defines.
    pub fn restore_parameters<'a>(
        &self,
        device: &mut dyn RenderDevice,
        overridden: impl IntoIterator<Item = &'a String>,
    ) {
        for name in overridden {
            if let Some(value) = self.parameters.get(name) {
                device.set_uniform(name, value.clone());
            }
        }
    }
}
