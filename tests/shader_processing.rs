//! Integration tests for shader processing.
//!
//! Dialect-dependent cases run once per [`ShaderDialect`] through `rstest`;
//! attribute location stability is checked with `proptest`.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use rstest::rstest;

use forward_graphics::shader::{
    BindingTier, ProcessingOptions, ResourceSet, SampleKind, Semantic, ShaderCache,
    ShaderDefinition, ShaderPass, ShaderProcessor, ShaderSource, TextureBindFormat,
    TextureDimension, UniformBufferFormat, UniformFormat, UniformType, VariantKey,
    UNUSED_UNIFORM_NAME,
};
use forward_graphics::{DeclarationError, ShaderDialect};

const VERTEX: &str = "\
#version 450
attribute vec3 vertex_position;
attribute vec2 vertex_texCoord0;
uniform mat4 matrix_viewProjection;
uniform mat4 matrix_model;
varying vec2 vUv0;
void main(void) {
    vUv0 = vertex_texCoord0;
    gl_Position = matrix_viewProjection * matrix_model * vec4(vertex_position, 1.0);
}
";

const FRAGMENT: &str = "\
#version 450
varying vec2 vUv0;
uniform sampler2D texture_diffuseMap;
uniform sampler2D texture_lightMap;
uniform vec3 material_diffuse;
out vec4 pcFragColor0;
void main(void) {
    pcFragColor0 = texture(texture_diffuseMap, vUv0) * texture(texture_lightMap, vUv0);
}
";

fn definition(vertex: &str, fragment: &str) -> ShaderDefinition {
    ShaderDefinition::new(ShaderSource::new("lit", vertex, fragment))
        .with_attribute("vertex_position", Semantic::Position)
        .with_attribute("vertex_texCoord0", Semantic::TexCoord(0))
}

fn view_tier() -> ResourceSet {
    ResourceSet::new(
        BindingTier::View,
        Some(UniformBufferFormat::new(vec![UniformFormat::new(
            "matrix_viewProjection",
            UniformType::Mat4,
            0,
        )])),
        vec![],
    )
}

fn material_tier() -> ResourceSet {
    ResourceSet::new(
        BindingTier::Material,
        Some(UniformBufferFormat::new(vec![UniformFormat::new(
            "material_diffuse",
            UniformType::Vec3,
            0,
        )])),
        vec![TextureBindFormat::new(
            "texture_diffuseMap",
            TextureDimension::D2,
            SampleKind::Float,
        )],
    )
}

#[rstest]
#[case::fixed(ShaderDialect::FixedBinding)]
#[case::explicit(ShaderDialect::ExplicitBinding)]
fn test_tiers_leave_only_object_resources(#[case] dialect: ShaderDialect) {
    let options = ProcessingOptions::new()
        .with_tier(view_tier())
        .with_tier(material_tier());

    let processed = ShaderProcessor::run(dialect, &definition(VERTEX, FRAGMENT), &options)
        .expect("lit shader processes");

    let uniforms: Vec<&str> = processed
        .object_layout
        .uniform_format
        .uniforms()
        .iter()
        .map(|uniform| uniform.name.as_str())
        .collect();
    assert_eq!(uniforms, ["matrix_model"]);

    let textures: Vec<&str> = processed
        .object_layout
        .bind_group_format
        .textures()
        .iter()
        .map(|texture| texture.name.as_str())
        .collect();
    assert_eq!(textures, ["texture_lightMap"]);

    assert_eq!(processed.attributes.get(&0).map(String::as_str), Some("vertex_position"));
    assert_eq!(processed.attributes.get(&5).map(String::as_str), Some("vertex_texCoord0"));
    assert!(processed.vertex.starts_with("#version 450\n"));
    assert!(!processed.vertex.contains("@@@"));
    assert!(!processed.fragment.contains("@@@"));
}

#[rstest]
#[case::fixed(ShaderDialect::FixedBinding, "out vec2 vUv0;\n", "in vec2 vUv0;\n")]
#[case::explicit(
    ShaderDialect::ExplicitBinding,
    "layout(location = 0) out vec2 vUv0;\n",
    "layout(location = 0) in vec2 vUv0;\n"
)]
fn test_varying_declarations(
    #[case] dialect: ShaderDialect,
    #[case] vertex_line: &str,
    #[case] fragment_line: &str,
) {
    let processed =
        ShaderProcessor::run(dialect, &definition(VERTEX, FRAGMENT), &ProcessingOptions::new())
            .expect("lit shader processes");

    assert!(processed.vertex.contains(vertex_line));
    assert!(processed.fragment.contains(fragment_line));
}

#[test]
fn test_explicit_binding_layout() {
    let options = ProcessingOptions::new()
        .with_tier(view_tier())
        .with_tier(material_tier());

    let processed = ShaderProcessor::run(
        ShaderDialect::ExplicitBinding,
        &definition(VERTEX, FRAGMENT),
        &options,
    )
    .expect("lit shader processes");

    assert!(processed
        .fragment
        .contains("layout(set = 0, binding = 0, std140) uniform ub_view {\n"));
    assert!(processed
        .fragment
        .contains("layout(set = 1, binding = 0, std140) uniform ub_material {\n"));
    assert!(processed
        .fragment
        .contains("layout(set = 1, binding = 1) uniform texture2D texture_diffuseMap;\n"));
    assert!(processed
        .fragment
        .contains("layout(set = 2, binding = 0) uniform texture2D texture_lightMap;\n"));
    assert!(processed
        .fragment
        .contains("layout(set = 3, binding = 0, std140) uniform ub_object_ub {\n"));
}

#[rstest]
#[case::fixed(ShaderDialect::FixedBinding)]
#[case::explicit(ShaderDialect::ExplicitBinding)]
fn test_dangling_varying_fails(#[case] dialect: ShaderDialect) {
    let fragment = FRAGMENT.replace("varying vec2 vUv0;", "varying vec2 vUv0;\nvarying vec3 vNormalW;");

    let err = ShaderProcessor::run(dialect, &definition(VERTEX, &fragment), &ProcessingOptions::new())
        .expect_err("fragment varying without a vertex counterpart");
    assert_eq!(err.shader, "lit");
    assert!(matches!(
        err.kind,
        DeclarationError::DanglingVarying { ref name, .. } if name == "vNormalW"
    ));
}

#[test]
fn test_zero_uniforms_get_placeholder() {
    let vertex = "attribute vec3 vertex_position;\nvoid main(void) {}\n";
    let fragment = "out vec4 color;\nvoid main(void) { color = vec4(1.0); }\n";
    let definition = ShaderDefinition::new(ShaderSource::new("bare", vertex, fragment))
        .with_attribute("vertex_position", Semantic::Position);

    let processed = ShaderProcessor::run(
        ShaderDialect::ExplicitBinding,
        &definition,
        &ProcessingOptions::new(),
    )
    .expect("bare shader processes");

    let uniforms = processed.object_layout.uniform_format.uniforms();
    assert_eq!(uniforms.len(), 1);
    assert_eq!(uniforms[0].name, UNUSED_UNIFORM_NAME);
    assert!(processed.object_layout.bind_group_format.is_empty());
}

#[test]
fn test_uniform_mismatch_between_stages() {
    let fragment = FRAGMENT.replace("uniform vec3 material_diffuse;", "uniform vec4 matrix_model;");

    let err = ShaderProcessor::run(
        ShaderDialect::ExplicitBinding,
        &definition(VERTEX, &fragment),
        &ProcessingOptions::new(),
    )
    .expect_err("same uniform declared differently");
    assert!(matches!(
        err.kind,
        DeclarationError::UniformMismatch { ref name, .. } if name == "matrix_model"
    ));
}

#[test]
fn test_cache_hit_does_not_reprocess() {
    let cache = Arc::new(ShaderCache::new(ShaderDialect::ExplicitBinding));
    let key = VariantKey {
        pass: ShaderPass::Forward,
        light_hash: 0,
        material_flags: 3,
        object_flags: 0,
        environment: 0,
    };

    let first = cache.get_or_build(key, || (definition(VERTEX, FRAGMENT), ProcessingOptions::new()));
    let second = cache.get_or_build(key, || unreachable!("variant is cached"));

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.build_count(), 1);
    assert!(cache.get(&key).is_some());
}

/// Named semantics have pairwise distinct locations.
fn named_semantics() -> Vec<Semantic> {
    Semantic::all()
        .filter(|semantic| !matches!(semantic, Semantic::Attr(_)))
        .collect()
}

proptest! {
    #[test]
    fn test_attribute_locations_stable_and_unique(
        semantics in proptest::sample::subsequence(named_semantics(), 1..=14),
        reversed in any::<bool>(),
    ) {
        let mut declared: Vec<(String, Semantic)> = semantics
            .iter()
            .enumerate()
            .map(|(index, semantic)| (format!("a_attr{index}"), *semantic))
            .collect();
        if reversed {
            declared.reverse();
        }

        let mut vertex = String::new();
        for (name, _) in &declared {
            vertex.push_str(&format!("attribute vec4 {name};\n"));
        }
        vertex.push_str("void main(void) {}\n");

        let mut definition = ShaderDefinition::new(ShaderSource::new(
            "attributes",
            vertex,
            "void main(void) {}\n",
        ));
        for (name, semantic) in &declared {
            definition = definition.with_attribute(name.clone(), *semantic);
        }

        let processed = ShaderProcessor::run(
            ShaderDialect::ExplicitBinding,
            &definition,
            &ProcessingOptions::new(),
        )
        .expect("distinct semantics never collide");

        prop_assert_eq!(processed.attributes.len(), declared.len());
        let mut seen = HashSet::new();
        for (name, semantic) in &declared {
            let location = semantic.location().expect("named semantics are mapped");
            prop_assert_eq!(processed.attributes.get(&location), Some(name));
            prop_assert!(seen.insert(location));
            let expected = format!("layout(location = {location}) in vec4 {name};\n");
            prop_assert!(processed.vertex.contains(&expected));
        }
    }
}
