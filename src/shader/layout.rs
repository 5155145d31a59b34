//! Resource layout allocation.
//!
//! Uniforms a program declares are resolved against the resource tiers the
//! renderer already binds (view, then material). Whatever no tier provides
//! falls through to the per-object layer: a uniform buffer for numeric
//! uniforms and a bind group for textures.

use std::sync::Arc;

use crate::error::DeclarationError;
use crate::shader::declarations::{SampleKind, TextureDimension, UniformDeclaration};
use crate::shader::uniform::{
    UniformBufferFormat, UniformFormat, UniformType, MAX_UNIFORM_BUFFER_SIZE,
};
use crate::shader::ShaderStageFlags;

/// Binding tier, which is also the bind group index of its resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingTier {
    /// Per-camera resources, bound once per view.
    View,
    /// Per-material resources, bound on material switch.
    Material,
    /// Per-object textures.
    Object,
    /// Per-object uniform buffer.
    ObjectUniformBuffer,
}

impl BindingTier {
    pub fn group(self) -> u32 {
        match self {
            Self::View => 0,
            Self::Material => 1,
            Self::Object => 2,
            Self::ObjectUniformBuffer => 3,
        }
    }

    /// Name used for the generated uniform block (`ub_<name>`).
    pub fn name(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Material => "material",
            Self::Object => "object",
            Self::ObjectUniformBuffer => "object_ub",
        }
    }
}

/// A texture binding and its sampler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureBindFormat {
    pub name: String,
    pub visibility: ShaderStageFlags,
    pub dimension: TextureDimension,
    pub sample_kind: SampleKind,
    /// Whether a sampler is bound at `slot + 1`.
    pub has_sampler: bool,
    /// Binding index of the texture, assigned by [`BindGroupFormat`].
    pub slot: u32,
}

impl TextureBindFormat {
    pub fn new(name: impl Into<String>, dimension: TextureDimension, sample_kind: SampleKind) -> Self {
        Self {
            name: name.into(),
            visibility: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
            dimension,
            sample_kind,
            has_sampler: true,
            slot: 0,
        }
    }

    pub fn with_visibility(mut self, visibility: ShaderStageFlags) -> Self {
        self.visibility = visibility;
        self
    }
}

/// Ordered texture bindings of one bind group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BindGroupFormat {
    textures: Vec<TextureBindFormat>,
}

impl BindGroupFormat {
    /// Assign slots starting at binding 0.
    pub fn new(textures: Vec<TextureBindFormat>) -> Self {
        Self::with_first_slot(0, textures)
    }

    /// Assign slots starting at `first_slot`, used when the group also holds
    /// a uniform buffer at binding 0. Each texture takes one slot and its
    /// sampler the next.
    pub fn with_first_slot(first_slot: u32, textures: Vec<TextureBindFormat>) -> Self {
        let mut textures = textures;
        let mut slot = first_slot;
        for texture in &mut textures {
            texture.slot = slot;
            slot += if texture.has_sampler { 2 } else { 1 };
        }
        Self { textures }
    }

    pub fn textures(&self) -> &[TextureBindFormat] {
        &self.textures
    }

    pub fn get(&self, name: &str) -> Option<&TextureBindFormat> {
        self.textures.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

/// Resources a binding tier already provides.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceSet {
    pub tier: BindingTier,
    pub uniform_format: Option<Arc<UniformBufferFormat>>,
    pub bind_group_format: Option<Arc<BindGroupFormat>>,
}

impl ResourceSet {
    /// Create a resource set. Textures are slotted after the uniform buffer
    /// when there is one.
    pub fn new(
        tier: BindingTier,
        uniforms: Option<UniformBufferFormat>,
        textures: Vec<TextureBindFormat>,
    ) -> Self {
        let first_slot = u32::from(uniforms.is_some());
        let bind_group_format = if textures.is_empty() {
            None
        } else {
            Some(Arc::new(BindGroupFormat::with_first_slot(first_slot, textures)))
        };
        Self {
            tier,
            uniform_format: uniforms.map(Arc::new),
            bind_group_format,
        }
    }

    pub fn empty(tier: BindingTier) -> Self {
        Self {
            tier,
            uniform_format: None,
            bind_group_format: None,
        }
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniform_format
            .as_ref()
            .is_some_and(|format| format.contains(name))
    }

    pub fn has_texture(&self, name: &str) -> bool {
        self.bind_group_format
            .as_ref()
            .is_some_and(|format| format.contains(name))
    }
}

/// Where a name resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBinding {
    pub tier: BindingTier,
    /// Binding index within the tier's group.
    pub slot: u32,
}

/// Supplied resource tiers, consulted outer to inner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTiers {
    sets: Vec<ResourceSet>,
}

impl ResourceTiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tier inside the ones already added.
    pub fn with(mut self, set: ResourceSet) -> Self {
        self.sets.push(set);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceSet> {
        self.sets.iter()
    }

    pub fn get(&self, tier: BindingTier) -> Option<&ResourceSet> {
        self.sets.iter().find(|set| set.tier == tier)
    }

    /// First tier whose uniform buffer declares `name`.
    pub fn resolve_uniform(&self, name: &str) -> Option<ResolvedBinding> {
        self.sets
            .iter()
            .find(|set| set.has_uniform(name))
            .map(|set| ResolvedBinding {
                tier: set.tier,
                slot: 0,
            })
    }

    /// First tier whose bind group declares texture `name`.
    pub fn resolve_texture(&self, name: &str) -> Option<ResolvedBinding> {
        self.sets.iter().find_map(|set| {
            let texture = set.bind_group_format.as_ref()?.get(name)?;
            Some(ResolvedBinding {
                tier: set.tier,
                slot: texture.slot,
            })
        })
    }
}

/// Per-object resources left over after tier resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLayout {
    pub uniform_format: Arc<UniformBufferFormat>,
    pub bind_group_format: Arc<BindGroupFormat>,
}

/// Merge the uniforms of both stages.
///
/// Identical declarations collapse into one; the same name declared
/// differently is an error. Order is vertex first, then new fragment names.
pub fn merge_stage_uniforms(
    vertex: &[UniformDeclaration],
    fragment: &[UniformDeclaration],
) -> Result<Vec<UniformDeclaration>, DeclarationError> {
    let mut merged: Vec<UniformDeclaration> = Vec::with_capacity(vertex.len() + fragment.len());

    for uniform in vertex.iter().chain(fragment) {
        match merged.iter().find(|existing| existing.name == uniform.name) {
            Some(existing) if existing.line == uniform.line => {}
            Some(existing) => {
                return Err(DeclarationError::UniformMismatch {
                    name: uniform.name.clone(),
                    first: existing.line.clone(),
                    second: uniform.line.clone(),
                })
            }
            None => merged.push(uniform.clone()),
        }
    }

    Ok(merged)
}

/// Build the per-object layout for `uniforms` given the supplied tiers.
pub fn allocate(
    uniforms: &[UniformDeclaration],
    tiers: &ResourceTiers,
) -> Result<ObjectLayout, DeclarationError> {
    let mut numeric = Vec::new();
    let mut textures = Vec::new();

    for uniform in uniforms {
        match uniform.sampler {
            Some(info) => {
                if tiers.resolve_texture(&uniform.name).is_some() {
                    continue;
                }
                let sample_kind = uniform.sample_kind().unwrap_or(SampleKind::Float);
                textures.push(TextureBindFormat::new(
                    uniform.name.clone(),
                    info.dimension,
                    sample_kind,
                ));
            }
            None => {
                if tiers.resolve_uniform(&uniform.name).is_some() {
                    continue;
                }
                let ty = UniformType::from_glsl(&uniform.ty).ok_or_else(|| {
                    DeclarationError::UnknownUniformType {
                        ty: uniform.ty.clone(),
                        line: uniform.line.clone(),
                    }
                })?;
                numeric.push(UniformFormat::new(uniform.name.clone(), ty, uniform.array_size));
            }
        }
    }

    log::debug!(
        "object layout: {} uniforms, {} textures",
        numeric.len(),
        textures.len()
    );

    let uniform_format =
        UniformBufferFormat::try_new(numeric, MAX_UNIFORM_BUFFER_SIZE).map_err(|name| {
            let line = uniforms
                .iter()
                .find(|uniform| uniform.name == name)
                .map(|uniform| uniform.line.clone())
                .unwrap_or_default();
            DeclarationError::UniformBufferTooLarge {
                name,
                limit: MAX_UNIFORM_BUFFER_SIZE,
                line,
            }
        })?;

    Ok(ObjectLayout {
        uniform_format: Arc::new(uniform_format),
        bind_group_format: Arc::new(BindGroupFormat::new(textures)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::uniform::UNUSED_UNIFORM_NAME;

    fn uniforms(lines: &[&str]) -> Vec<UniformDeclaration> {
        lines
            .iter()
            .map(|line| UniformDeclaration::parse(line).unwrap())
            .collect()
    }

    fn view_tier() -> ResourceSet {
        ResourceSet::new(
            BindingTier::View,
            Some(UniformBufferFormat::new(vec![
                UniformFormat::new("matrix_viewProjection", UniformType::Mat4, 0),
                UniformFormat::new("view_position", UniformType::Vec3, 0),
            ])),
            vec![TextureBindFormat::new(
                "texture_envAtlas",
                TextureDimension::D2,
                SampleKind::Float,
            )],
        )
    }

    fn material_tier() -> ResourceSet {
        ResourceSet::new(
            BindingTier::Material,
            Some(UniformBufferFormat::new(vec![
                UniformFormat::new("material_diffuse", UniformType::Vec3, 0),
                UniformFormat::new("view_position", UniformType::Vec3, 0),
            ])),
            Vec::new(),
        )
    }

    #[test]
    fn test_supplied_uniforms_are_skipped() {
        let tiers = ResourceTiers::new().with(view_tier()).with(material_tier());
        let layout = allocate(
            &uniforms(&[
                "mat4 matrix_viewProjection",
                "mat4 matrix_model",
                "vec3 material_diffuse",
                "float material_opacity",
                "sampler2D texture_envAtlas",
                "sampler2D texture_diffuseMap",
            ]),
            &tiers,
        )
        .unwrap();

        let names: Vec<_> = layout
            .uniform_format
            .uniforms()
            .iter()
            .map(|u| u.name.as_str())
            .collect();
        assert_eq!(names, ["matrix_model", "material_opacity"]);

        let textures = layout.bind_group_format.textures();
        assert_eq!(textures.len(), 1);
        assert_eq!(textures[0].name, "texture_diffuseMap");
        assert_eq!(textures[0].slot, 0);
    }

    #[test]
    fn test_no_leftover_uniforms_gives_placeholder() {
        let tiers = ResourceTiers::new().with(view_tier());
        let layout = allocate(&uniforms(&["mat4 matrix_viewProjection"]), &tiers).unwrap();

        let entries = layout.uniform_format.uniforms();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, UNUSED_UNIFORM_NAME);
        assert!(layout.bind_group_format.is_empty());
    }

    #[test]
    fn test_unknown_numeric_type() {
        let err = allocate(&uniforms(&["dvec3 origin"]), &ResourceTiers::new()).unwrap_err();
        assert_eq!(
            err,
            DeclarationError::UnknownUniformType {
                ty: "dvec3".to_string(),
                line: "dvec3 origin".to_string()
            }
        );
    }

    #[test]
    fn test_huge_array_is_an_error() {
        let err = allocate(
            &uniforms(&["mat4 matrix_model", "vec4 bones[300000000]"]),
            &ResourceTiers::new(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DeclarationError::UniformBufferTooLarge {
                name: "bones".to_string(),
                limit: MAX_UNIFORM_BUFFER_SIZE,
                line: "vec4 bones[300000000]".to_string()
            }
        );

        // a supplied tier can still provide it
        let tier = ResourceSet::new(
            BindingTier::Material,
            Some(UniformBufferFormat::new(vec![UniformFormat::new(
                "bones",
                UniformType::Vec4,
                64,
            )])),
            Vec::new(),
        );
        let tiers = ResourceTiers::new().with(tier);
        assert!(allocate(&uniforms(&["vec4 bones[300000000]"]), &tiers).is_ok());
    }

    #[test]
    fn test_first_tier_wins() {
        let tiers = ResourceTiers::new().with(view_tier()).with(material_tier());

        let resolved = tiers.resolve_uniform("view_position").unwrap();
        assert_eq!(resolved.tier, BindingTier::View);

        let resolved = tiers.resolve_uniform("material_diffuse").unwrap();
        assert_eq!(resolved.tier, BindingTier::Material);

        assert!(tiers.resolve_uniform("matrix_model").is_none());
    }

    #[test]
    fn test_texture_slots_follow_uniform_buffer() {
        let tiers = ResourceTiers::new().with(view_tier());
        let resolved = tiers.resolve_texture("texture_envAtlas").unwrap();
        assert_eq!(resolved, ResolvedBinding { tier: BindingTier::View, slot: 1 });

        let group = BindGroupFormat::new(vec![
            TextureBindFormat::new("a", TextureDimension::D2, SampleKind::Float),
            TextureBindFormat::new("b", TextureDimension::Cube, SampleKind::Float),
        ]);
        let slots: Vec<_> = group.textures().iter().map(|t| t.slot).collect();
        assert_eq!(slots, [0, 2]);
    }

    #[test]
    fn test_merge_deduplicates_and_detects_mismatch() {
        let vertex = uniforms(&["mat4 matrix_model", "float time"]);
        let fragment = uniforms(&["float  time", "vec3 tint"]);
        let merged = merge_stage_uniforms(&vertex, &fragment).unwrap();
        let names: Vec<_> = merged.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["matrix_model", "time", "tint"]);

        let fragment = uniforms(&["vec2 time"]);
        let err = merge_stage_uniforms(&vertex, &fragment).unwrap_err();
        assert_eq!(
            err,
            DeclarationError::UniformMismatch {
                name: "time".to_string(),
                first: "float time".to_string(),
                second: "vec2 time".to_string()
            }
        );
    }
}
