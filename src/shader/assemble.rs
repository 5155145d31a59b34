//! Declaration block generation and insertion.

use crate::shader::declarations::{
    AttributeDeclaration, OutputDeclaration, TextureDimension, UniformDeclaration,
    VaryingDeclaration,
};
use crate::shader::extract::MARKER;
use crate::shader::layout::{BindGroupFormat, BindingTier, ObjectLayout, ResourceTiers};
use crate::shader::semantics::VertexElement;
use crate::shader::uniform::UniformBufferFormat;
use crate::shader::{version_line_end, ShaderDialect, ShaderStage};

/// Insert `block` at the marker of `residual`.
///
/// A residual without a marker (a stage that declared nothing) gets the
/// block right after its `#version` line.
pub fn assemble(residual: &str, block: &str) -> String {
    match residual.find(MARKER) {
        Some(at) => {
            let mut text = String::with_capacity(residual.len() + block.len());
            text.push_str(&residual[..at]);
            text.push_str(block);
            text.push_str(&residual[at + MARKER.len()..]);
            text
        }
        None => {
            let at = version_line_end(residual);
            let mut text = String::with_capacity(residual.len() + block.len() + 1);
            text.push_str(&residual[..at]);
            if at > 0 && !residual[..at].ends_with('\n') {
                text.push('\n');
            }
            text.push_str(block);
            text.push_str(&residual[at..]);
            text
        }
    }
}

/// Writes the generated declarations of one stage in a given dialect.
#[derive(Debug)]
pub struct DeclarationWriter {
    dialect: ShaderDialect,
    code: String,
}

impl DeclarationWriter {
    pub fn new(dialect: ShaderDialect) -> Self {
        Self {
            dialect,
            code: String::new(),
        }
    }

    /// `layout(location = 0) in vec4 vertex_position;`
    ///
    /// Raw integer vertex data is received through an integer attribute
    /// under a private name and copied into a float variable with the
    /// original name.
    pub fn attribute(
        &mut self,
        location: u32,
        attribute: &AttributeDeclaration,
        element: Option<&VertexElement>,
    ) {
        match element.filter(|e| e.needs_integer_attribute()) {
            Some(element) => {
                let components = attribute.component_count();
                let private_name = format!("_private_{}", attribute.name);
                let float_type = if components == 1 {
                    "float".to_string()
                } else {
                    format!("vec{components}")
                };
                self.code.push_str(&format!(
                    "layout(location = {location}) in {} {private_name};\n",
                    element.integer_type(components)
                ));
                self.code.push_str(&format!(
                    "{float_type} {} = {float_type}({private_name});\n",
                    attribute.name
                ));
            }
            None => {
                self.code.push_str(&format!(
                    "layout(location = {location}) in {} {};\n",
                    attribute.ty, attribute.name
                ));
            }
        }
    }

    /// Vertex varyings are stage outputs, fragment varyings stage inputs.
    pub fn varying(&mut self, stage: ShaderStage, index: u32, varying: &VaryingDeclaration) {
        let direction = match stage {
            ShaderStage::Vertex => "out",
            ShaderStage::Fragment => "in",
        };
        match self.dialect {
            ShaderDialect::ExplicitBinding => self.code.push_str(&format!(
                "layout(location = {index}) {direction} {} {};\n",
                varying.qualified_type, varying.name
            )),
            ShaderDialect::FixedBinding => self.code.push_str(&format!(
                "{direction} {} {};\n",
                varying.qualified_type, varying.name
            )),
        }
    }

    /// `layout(location = 0) out vec4 pcFragColor0;`
    pub fn output(&mut self, index: u32, output: &OutputDeclaration) {
        self.code
            .push_str(&format!("layout(location = {index}) out {};\n", output.line));
    }

    /// Uniform and texture declarations for every supplied tier and the
    /// per-object layout.
    ///
    /// The fixed-binding dialect binds by name and re-emits the merged
    /// declarations as loose uniforms instead.
    pub fn resources(
        &mut self,
        tiers: &ResourceTiers,
        object: &ObjectLayout,
        uniforms: &[UniformDeclaration],
    ) {
        match self.dialect {
            ShaderDialect::ExplicitBinding => {
                for set in tiers.iter() {
                    if let Some(format) = &set.uniform_format {
                        self.uniform_block(set.tier, format);
                    }
                }
                self.uniform_block(BindingTier::ObjectUniformBuffer, &object.uniform_format);

                for set in tiers.iter() {
                    if let Some(format) = &set.bind_group_format {
                        self.textures(set.tier, format);
                    }
                }
                self.textures(BindingTier::Object, &object.bind_group_format);
            }
            ShaderDialect::FixedBinding => {
                for uniform in uniforms {
                    self.code.push_str(&format!("uniform {};\n", uniform.line));
                }
            }
        }
    }

    /// Separate a group of declarations from the next.
    pub fn separator(&mut self) {
        self.code.push('\n');
    }

    pub fn finish(self) -> String {
        self.code
    }

    fn uniform_block(&mut self, tier: BindingTier, format: &UniformBufferFormat) {
        self.code.push_str(&format!(
            "layout(set = {}, binding = 0, std140) uniform ub_{} {{\n",
            tier.group(),
            tier.name()
        ));
        for uniform in format.uniforms() {
            if uniform.count > 0 {
                self.code.push_str(&format!(
                    "    {} {}[{}];\n",
                    uniform.ty.glsl_name(),
                    uniform.name,
                    uniform.count
                ));
            } else {
                self.code
                    .push_str(&format!("    {} {};\n", uniform.ty.glsl_name(), uniform.name));
            }
        }
        self.code.push_str("};\n");
    }

    fn textures(&mut self, tier: BindingTier, format: &BindGroupFormat) {
        let group = tier.group();
        for texture in format.textures() {
            let prefix = texture.sample_kind.type_prefix();
            let texture_type = texture.dimension.texture_type();

            // array textures are renamed and sampled through a combining macro
            let is_array = texture.dimension == TextureDimension::D2Array;
            let texture_name = if is_array {
                format!("{}_texture", texture.name)
            } else {
                texture.name.clone()
            };

            self.code.push_str(&format!(
                "layout(set = {group}, binding = {}) uniform {prefix}{texture_type} {texture_name};\n",
                texture.slot
            ));
            if texture.has_sampler {
                self.code.push_str(&format!(
                    "layout(set = {group}, binding = {}) uniform sampler {}_sampler;\n",
                    texture.slot + 1,
                    texture.name
                ));
            }
            if is_array {
                self.code.push_str(&format!(
                    "#define {} {prefix}{}({texture_name}, {}_sampler)\n",
                    texture.name,
                    TextureDimension::D2Array.sampler_type(),
                    texture.name
                ));
            }
        }
    }
}
