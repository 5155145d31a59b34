//! Shading-resource compiler.
//!
//! Turns a pair of GLSL stage texts into linkable programs with deterministic
//! resource bindings. Processing runs in three steps:
//!
//! 1. [`extract`] - pull `attribute`/`varying`/`out`/`uniform` declarations out
//!    of each stage, leaving a single insertion marker behind
//! 2. [`allocate`] - split uniforms into what the view and material tiers
//!    already bind and the per-object uniform buffer / texture bind group
//! 3. [`assemble`] - render the declarations for the target
//!    [`ShaderDialect`] and splice them in at the marker
//!
//! [`ShaderProcessor::run`] chains the three; [`ShaderCache`] runs it at most
//! once per variant key.
//!
//! # Example
//!
//! ```ignore
//! use forward_graphics::shader::{ShaderDialect, ShaderProcessor, ShaderSource};
//!
//! let source = ShaderSource::new("unlit", vertex_text, fragment_text);
//! let definition = ShaderDefinition::new(source)
//!     .with_attribute("vertex_position", Semantic::Position);
//!
//! let processed = ShaderProcessor::run(
//!     ShaderDialect::ExplicitBinding,
//!     &definition,
//!     &ProcessingOptions::default(),
//! )?;
//! ```

pub mod assemble;
pub mod cache;
pub mod declarations;
pub mod extract;
pub mod layout;
pub mod processor;
pub mod semantics;
pub mod uniform;

pub use assemble::assemble;
pub use cache::{ShaderCache, ShaderPass, ShaderVariant, VariantKey};
pub use declarations::{
    AttributeDeclaration, OutputDeclaration, Precision, SampleKind, SamplerInfo,
    TextureDimension, UniformDeclaration, VaryingDeclaration,
};
pub use extract::{extract, ExtractedStage, MARKER};
pub use layout::{
    allocate, merge_stage_uniforms, BindGroupFormat, BindingTier, ObjectLayout,
    ResolvedBinding, ResourceSet, ResourceTiers, TextureBindFormat,
};
pub use processor::{ProcessedShader, ProcessingOptions, ShaderDefinition, ShaderProcessor};
pub use semantics::{Semantic, VertexDataType, VertexElement};
pub use uniform::{UniformBufferFormat, UniformFormat, UniformType, UNUSED_UNIFORM_NAME};

/// Shader stage in the graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Fragment shader.
    Fragment,
}

bitflags::bitflags! {
    /// Shader stages that can access a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 1;
    }
}

/// Declaration syntax emitted by the assembler.
///
/// Both dialects share extraction and layout allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShaderDialect {
    /// Fixed-binding model: loose `uniform` declarations bound by name,
    /// combined samplers, varyings linked by name.
    FixedBinding,
    /// Explicit set/binding model: std140 uniform blocks, separate texture
    /// and sampler objects, varyings linked by location.
    #[default]
    ExplicitBinding,
}

impl ShaderDialect {
    /// Whether per-object uniforms live in a uniform buffer for this dialect.
    pub fn uses_uniform_buffers(self) -> bool {
        matches!(self, Self::ExplicitBinding)
    }
}

/// Vertex and fragment source text of one program.
///
/// Immutable once submitted; variants are produced by
/// [`ShaderSource::with_defines`], which returns a new source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    /// Debug name used in error messages.
    pub name: String,
    /// Vertex stage text.
    pub vertex: String,
    /// Fragment stage text.
    pub fragment: String,
}

impl ShaderSource {
    /// Create a new shader source.
    pub fn new(
        name: impl Into<String>,
        vertex: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Returns a copy of this source with `#define` lines inserted into both
    /// stages, right after the `#version` directive when there is one.
    pub fn with_defines(&self, defines: &[(String, String)]) -> Self {
        if defines.is_empty() {
            return self.clone();
        }

        let mut block = String::new();
        for (name, value) in defines {
            if value.is_empty() {
                block.push_str(&format!("#define {name}\n"));
            } else {
                block.push_str(&format!("#define {name} {value}\n"));
            }
        }

        Self {
            name: self.name.clone(),
            vertex: insert_after_version(&self.vertex, &block),
            fragment: insert_after_version(&self.fragment, &block),
        }
    }
}

/// Byte offset just past the `#version` line, or 0 when there is none.
pub(crate) fn version_line_end(source: &str) -> usize {
    let trimmed = source.trim_start();
    if !trimmed.starts_with("#version") {
        return 0;
    }
    let start = source.len() - trimmed.len();
    match trimmed.find('\n') {
        Some(newline) => start + newline + 1,
        None => source.len(),
    }
}

fn insert_after_version(source: &str, block: &str) -> String {
    let at = version_line_end(source);
    let mut result = String::with_capacity(source.len() + block.len() + 1);
    result.push_str(&source[..at]);
    if at == source.len() && at > 0 && !source.ends_with('\n') {
        result.push('\n');
    }
    result.push_str(block);
    result.push_str(&source[at..]);
    result
}

/// Shader definition value for compile-time conditionals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderDef {
    /// Boolean definition (`#ifdef`, `#ifndef`).
    Bool(bool),
    /// Integer definition (`#if VAR == 5`).
    Int(i32),
    /// Unsigned integer definition.
    UInt(u32),
}

impl From<bool> for ShaderDef {
    fn from(v: bool) -> Self {
        ShaderDef::Bool(v)
    }
}

impl From<i32> for ShaderDef {
    fn from(v: i32) -> Self {
        ShaderDef::Int(v)
    }
}

impl From<u32> for ShaderDef {
    fn from(v: u32) -> Self {
        ShaderDef::UInt(v)
    }
}

/// Build the `(name, value)` define list for a set of shader defs.
///
/// `Bool(false)` entries are omitted.
pub fn build_defines<'a>(
    shader_defs: impl IntoIterator<Item = (&'a str, &'a ShaderDef)>,
) -> Vec<(String, String)> {
    let mut defines = Vec::new();
    for (name, def) in shader_defs {
        match def {
            ShaderDef::Bool(true) => defines.push((name.to_string(), String::new())),
            ShaderDef::Bool(false) => {}
            ShaderDef::Int(v) => defines.push((name.to_string(), v.to_string())),
            ShaderDef::UInt(v) => defines.push((name.to_string(), v.to_string())),
        }
    }
    defines
}
