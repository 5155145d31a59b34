//! Error types for shader processing.
//!
//! Declaration errors are fatal for the program being built: the variant is
//! marked failed in the [`ShaderCache`](crate::shader::ShaderCache) and never
//! rebuilt. Per-frame problems (failed variants, empty instanced draws) are not
//! errors at all; the renderer skips them and counts them in its statistics.

use thiserror::Error;

/// A problem with a single declaration found while processing a shader.
///
/// Every variant carries the offending declaration text so the shader
/// author can locate it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("only numerically specified uniform array sizes are supported: `{line}`")]
    NonNumericArraySize { line: String },

    #[error("a comma on a uniform line is not supported, split it into multiple uniforms: `{line}`")]
    MultipleUniformsOnLine { line: String },

    #[error("uniform type `{ty}` is not recognized: `{line}`")]
    UnknownUniformType { ty: String, line: String },

    #[error("malformed declaration: `{line}`")]
    Malformed { line: String },

    #[error(
        "vertex and fragment stages cannot use the same uniform name with different declarations: `{first}` and `{second}`"
    )]
    UniformMismatch {
        name: String,
        first: String,
        second: String,
    },

    #[error("vertex attributes `{first}` and `{second}` are mapped to the same location {location}")]
    DuplicateAttributeLocation {
        location: u32,
        first: String,
        second: String,
    },

    #[error("attribute `{name}` has no semantic in the shader definition: `{line}`")]
    UnmappedAttribute { name: String, line: String },

    #[error("uniform `{name}` does not fit in a {limit} byte uniform buffer: `{line}`")]
    UniformBufferTooLarge { name: String, limit: u32, line: String },

    #[error("varying `{name}` is declared more than once in the vertex stage: `{first}` and `{second}`")]
    DuplicateVarying {
        name: String,
        first: String,
        second: String,
    },

    #[error("varying `{name}` has different types in the vertex and fragment stages: `{vertex}` and `{fragment}`")]
    VaryingMismatch {
        name: String,
        vertex: String,
        fragment: String,
    },

    #[error("fragment stage requires varying `{name}` but the vertex stage does not generate it: `{line}`")]
    DanglingVarying { name: String, line: String },
}

/// A declaration error attributed to a named shader program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("shader `{shader}`: {kind}")]
pub struct ShaderError {
    /// Debug name of the shader program.
    pub shader: String,
    /// What went wrong.
    #[source]
    pub kind: DeclarationError,
}

impl ShaderError {
    pub fn new(shader: impl Into<String>, kind: DeclarationError) -> Self {
        Self {
            shader: shader.into(),
            kind,
        }
    }
}

pub type ShaderResult<T> = Result<T, ShaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeclarationError::NonNumericArraySize {
            line: "vec4 tints[COUNT]".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "only numerically specified uniform array sizes are supported: `vec4 tints[COUNT]`"
        );

        let err = ShaderError::new(
            "standard",
            DeclarationError::DanglingVarying {
                name: "vUv1".to_string(),
                line: "vec2 vUv1".to_string(),
            },
        );
        assert!(err.to_string().starts_with("shader `standard`: fragment stage requires varying `vUv1`"));
    }

    #[test]
    fn test_error_source() {
        use std::error::Error;

        let err = ShaderError::new(
            "lit",
            DeclarationError::Malformed {
                line: "uniform".to_string(),
            },
        );
        assert!(err.source().is_some());
    }
}
