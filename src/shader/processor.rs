//! Full program processing: extract, allocate, assemble.

use std::collections::{BTreeMap, HashMap};

use crate::error::{DeclarationError, ShaderError, ShaderResult};
use crate::profile_scope;
use crate::shader::assemble::{assemble, DeclarationWriter};
use crate::shader::declarations::VaryingDeclaration;
use crate::shader::extract::extract;
use crate::shader::layout::{allocate, merge_stage_uniforms, ObjectLayout, ResourceSet, ResourceTiers};
use crate::shader::semantics::{Semantic, VertexElement};
use crate::shader::{ShaderDialect, ShaderSource, ShaderStage};

/// A program's source plus the attribute to semantic mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDefinition {
    pub source: ShaderSource,
    pub attributes: BTreeMap<String, Semantic>,
}

impl ShaderDefinition {
    pub fn new(source: ShaderSource) -> Self {
        Self {
            source,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, semantic: Semantic) -> Self {
        self.attributes.insert(name.into(), semantic);
        self
    }
}

/// Environment a program is processed for.
#[derive(Debug, Clone, Default)]
pub struct ProcessingOptions {
    /// Resources the view and material tiers already bind.
    pub tiers: ResourceTiers,
    /// Formats of the vertex elements feeding each semantic.
    pub vertex_elements: HashMap<Semantic, VertexElement>,
}

impl ProcessingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tier(mut self, set: ResourceSet) -> Self {
        self.tiers = self.tiers.with(set);
        self
    }

    pub fn with_vertex_element(mut self, semantic: Semantic, element: VertexElement) -> Self {
        self.vertex_elements.insert(semantic, element);
        self
    }
}

/// A program ready for the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedShader {
    pub name: String,
    pub dialect: ShaderDialect,
    pub vertex: String,
    pub fragment: String,
    /// Attribute name per location.
    pub attributes: BTreeMap<u32, String>,
    /// Per-object uniform buffer and texture bind group formats.
    pub object_layout: ObjectLayout,
}

/// Runs the declaration pipeline for a program.
pub struct ShaderProcessor;

impl ShaderProcessor {
    pub fn run(
        dialect: ShaderDialect,
        definition: &ShaderDefinition,
        options: &ProcessingOptions,
    ) -> ShaderResult<ProcessedShader> {
        profile_scope!("shader_process");

        let name = &definition.source.name;
        let fail = |kind: DeclarationError| ShaderError::new(name.clone(), kind);

        let vertex = extract(&definition.source.vertex).map_err(fail)?;
        let fragment = extract(&definition.source.fragment).map_err(fail)?;

        let mut vertex_block = DeclarationWriter::new(dialect);
        let mut fragment_block = DeclarationWriter::new(dialect);

        // attributes: fixed locations from the semantic table
        let mut attributes: BTreeMap<u32, String> = BTreeMap::new();
        for attribute in &vertex.attributes {
            let unmapped = || DeclarationError::UnmappedAttribute {
                name: attribute.name.clone(),
                line: attribute.line.clone(),
            };
            let semantic = *definition.attributes.get(&attribute.name).ok_or_else(|| fail(unmapped()))?;
            let location = semantic.location().ok_or_else(|| fail(unmapped()))?;

            if let Some(first) = attributes.get(&location) {
                return Err(fail(DeclarationError::DuplicateAttributeLocation {
                    location,
                    first: first.clone(),
                    second: attribute.name.clone(),
                }));
            }
            attributes.insert(location, attribute.name.clone());

            vertex_block.attribute(location, attribute, options.vertex_elements.get(&semantic));
        }
        vertex_block.separator();

        // varyings: vertex order defines the index, fragment looks it up by name.
        // Line-leading `out` in the vertex stage is a varying as well.
        let vertex_outputs = vertex
            .outputs
            .iter()
            .map(|output| VaryingDeclaration::parse(&output.line))
            .collect::<Result<Vec<_>, _>>()
            .map_err(fail)?;

        let mut varying_indices: HashMap<&str, (u32, &VaryingDeclaration)> = HashMap::new();
        for (index, varying) in vertex.varyings.iter().chain(&vertex_outputs).enumerate() {
            let index = index as u32;
            if let Some((_, first)) = varying_indices.insert(&varying.name, (index, varying)) {
                return Err(fail(DeclarationError::DuplicateVarying {
                    name: varying.name.clone(),
                    first: first.line.clone(),
                    second: varying.line.clone(),
                }));
            }
            vertex_block.varying(ShaderStage::Vertex, index, varying);
        }
        for varying in &fragment.varyings {
            let (index, source) = *varying_indices.get(varying.name.as_str()).ok_or_else(|| {
                fail(DeclarationError::DanglingVarying {
                    name: varying.name.clone(),
                    line: varying.line.clone(),
                })
            })?;
            if source.data_type() != varying.data_type() {
                return Err(fail(DeclarationError::VaryingMismatch {
                    name: varying.name.clone(),
                    vertex: source.line.clone(),
                    fragment: varying.line.clone(),
                }));
            }
            fragment_block.varying(ShaderStage::Fragment, index, varying);
        }
        vertex_block.separator();
        fragment_block.separator();

        for (index, output) in fragment.outputs.iter().enumerate() {
            fragment_block.output(index as u32, output);
        }
        fragment_block.separator();

        // uniforms shared by both stages
        let uniforms = merge_stage_uniforms(&vertex.uniforms, &fragment.uniforms).map_err(fail)?;
        let object_layout = allocate(&uniforms, &options.tiers).map_err(fail)?;

        vertex_block.resources(&options.tiers, &object_layout, &uniforms);
        fragment_block.resources(&options.tiers, &object_layout, &uniforms);

        let processed = ProcessedShader {
            name: name.clone(),
            dialect,
            vertex: assemble(&vertex.residual, &vertex_block.finish()),
            fragment: assemble(&fragment.residual, &fragment_block.finish()),
            attributes,
            object_layout,
        };

        log::debug!(
            "processed shader `{}` ({:?}): {} attributes, {} object uniforms, {} object textures",
            processed.name,
            dialect,
            processed.attributes.len(),
            processed.object_layout.uniform_format.uniforms().len(),
            processed.object_layout.bind_group_format.textures().len()
        );

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::semantics::VertexDataType;

    const VERTEX: &str = "\
#version 450
attribute vec3 vertex_position;
attribute vec4 vertex_color;
uniform mat4 matrix_model;
varying vec4 vColor;
void main(void) {
    vColor = vertex_color;
    gl_Position = matrix_model * vec4(vertex_position, 1.0);
}
";

    const FRAGMENT: &str = "\
#version 450
varying vec4 vColor;
uniform float material_opacity;
out vec4 pcFragColor0;
void main(void) {
    pcFragColor0 = vec4(vColor.rgb, material_opacity);
}
";

    fn definition() -> ShaderDefinition {
        ShaderDefinition::new(ShaderSource::new("vertex_color", VERTEX, FRAGMENT))
            .with_attribute("vertex_position", Semantic::Position)
            .with_attribute("vertex_color", Semantic::Color)
    }

    #[test]
    fn test_run_explicit_binding() {
        let processed =
            ShaderProcessor::run(ShaderDialect::ExplicitBinding, &definition(), &ProcessingOptions::new())
                .unwrap();

        assert_eq!(processed.attributes.get(&0).map(String::as_str), Some("vertex_position"));
        assert_eq!(processed.attributes.get(&4).map(String::as_str), Some("vertex_color"));

        assert!(processed
            .vertex
            .starts_with("#version 450\nlayout(location = 0) in vec3 vertex_position;\n"));
        assert!(processed.vertex.contains("layout(location = 0) out vec4 vColor;\n"));
        assert!(processed.fragment.contains("layout(location = 0) in vec4 vColor;\n"));
        assert!(processed.fragment.contains("layout(location = 0) out vec4 pcFragColor0;\n"));

        let names: Vec<_> = processed
            .object_layout
            .uniform_format
            .uniforms()
            .iter()
            .map(|u| u.name.as_str())
            .collect();
        assert_eq!(names, ["matrix_model", "material_opacity"]);
        assert!(processed.vertex.contains("uniform ub_object_ub {\n    mat4 matrix_model;\n    float material_opacity;\n};"));
        assert!(!processed.fragment.contains("@@@"));
    }

    #[test]
    fn test_run_fixed_binding() {
        let processed =
            ShaderProcessor::run(ShaderDialect::FixedBinding, &definition(), &ProcessingOptions::new())
                .unwrap();

        assert!(processed.vertex.contains("out vec4 vColor;\n"));
        assert!(!processed.vertex.contains("layout(location = 0) out"));
        assert!(processed.vertex.contains("uniform mat4 matrix_model;\n"));
        assert!(processed.fragment.contains("uniform float material_opacity;\n"));
        assert!(!processed.fragment.contains("std140"));
    }

    #[test]
    fn test_unmapped_attribute() {
        let definition = ShaderDefinition::new(ShaderSource::new("partial", VERTEX, FRAGMENT))
            .with_attribute("vertex_position", Semantic::Position);

        let err =
            ShaderProcessor::run(ShaderDialect::ExplicitBinding, &definition, &ProcessingOptions::new())
                .unwrap_err();
        assert_eq!(err.shader, "partial");
        assert_eq!(
            err.kind,
            DeclarationError::UnmappedAttribute {
                name: "vertex_color".to_string(),
                line: "vec4 vertex_color".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_attribute_location() {
        let definition = ShaderDefinition::new(ShaderSource::new("aliased", VERTEX, FRAGMENT))
            .with_attribute("vertex_position", Semantic::Position)
            .with_attribute("vertex_color", Semantic::Attr(0));

        let err =
            ShaderProcessor::run(ShaderDialect::ExplicitBinding, &definition, &ProcessingOptions::new())
                .unwrap_err();
        assert_eq!(
            err.kind,
            DeclarationError::DuplicateAttributeLocation {
                location: 0,
                first: "vertex_position".to_string(),
                second: "vertex_color".to_string()
            }
        );
    }

    #[test]
    fn test_dangling_varying() {
        let fragment = FRAGMENT.replace("varying vec4 vColor;", "varying vec4 vColor;\nvarying vec2 vUv1;");
        let definition = ShaderDefinition::new(ShaderSource::new("dangling", VERTEX, fragment))
            .with_attribute("vertex_position", Semantic::Position)
            .with_attribute("vertex_color", Semantic::Color);

        let err =
            ShaderProcessor::run(ShaderDialect::ExplicitBinding, &definition, &ProcessingOptions::new())
                .unwrap_err();
        assert_eq!(
            err.kind,
            DeclarationError::DanglingVarying {
                name: "vUv1".to_string(),
                line: "vec2 vUv1".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_vertex_varying() {
        let vertex = VERTEX.replace("varying vec4 vColor;", "varying vec4 vColor;\nout vec4 vColor;");
        let definition = ShaderDefinition::new(ShaderSource::new("twice", vertex, FRAGMENT))
            .with_attribute("vertex_position", Semantic::Position)
            .with_attribute("vertex_color", Semantic::Color);

        let err =
            ShaderProcessor::run(ShaderDialect::ExplicitBinding, &definition, &ProcessingOptions::new())
                .unwrap_err();
        assert_eq!(
            err.kind,
            DeclarationError::DuplicateVarying {
                name: "vColor".to_string(),
                first: "vec4 vColor".to_string(),
                second: "vec4 vColor".to_string()
            }
        );
    }

    #[test]
    fn test_varying_type_mismatch() {
        let fragment = FRAGMENT.replace("varying vec4 vColor;", "varying vec3 vColor;");
        let definition = ShaderDefinition::new(ShaderSource::new("mismatch", VERTEX, fragment))
            .with_attribute("vertex_position", Semantic::Position)
            .with_attribute("vertex_color", Semantic::Color);

        let err =
            ShaderProcessor::run(ShaderDialect::FixedBinding, &definition, &ProcessingOptions::new())
                .unwrap_err();
        assert_eq!(
            err.kind,
            DeclarationError::VaryingMismatch {
                name: "vColor".to_string(),
                vertex: "vec4 vColor".to_string(),
                fragment: "vec3 vColor".to_string()
            }
        );
    }

    #[test]
    fn test_varying_precision_may_differ() {
        let fragment = FRAGMENT.replace("varying vec4 vColor;", "varying mediump vec4 vColor;");
        let definition = ShaderDefinition::new(ShaderSource::new("precision", VERTEX, fragment))
            .with_attribute("vertex_position", Semantic::Position)
            .with_attribute("vertex_color", Semantic::Color);

        assert!(
            ShaderProcessor::run(ShaderDialect::ExplicitBinding, &definition, &ProcessingOptions::new())
                .is_ok()
        );
    }

    #[test]
    fn test_integer_vertex_element() {
        let options = ProcessingOptions::new()
            .with_vertex_element(Semantic::Color, VertexElement::new(VertexDataType::Uint8));

        let processed =
            ShaderProcessor::run(ShaderDialect::ExplicitBinding, &definition(), &options).unwrap();
        assert!(processed
            .vertex
            .contains("layout(location = 4) in uvec4 _private_vertex_color;\nvec4 vertex_color = vec4(_private_vertex_color);\n"));
    }
}
