//! Parsed shader declarations.
//!
//! Each declaration keeps the whitespace-normalized text it was parsed from
//! (without the leading keyword and the trailing `;`) so error messages and
//! cross-stage comparisons work on the same representation.

use crate::error::DeclarationError;

/// Precision qualifier on a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    High,
    Medium,
    Low,
}

impl Precision {
    pub fn from_glsl(word: &str) -> Option<Self> {
        match word {
            "highp" => Some(Self::High),
            "mediump" => Some(Self::Medium),
            "lowp" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn glsl_name(self) -> &'static str {
        match self {
            Self::High => "highp",
            Self::Medium => "mediump",
            Self::Low => "lowp",
        }
    }
}

/// Texture dimension of a sampler uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    D2Array,
    Cube,
    D3,
}

impl TextureDimension {
    /// Separate texture object type name, without a sample kind prefix.
    pub fn texture_type(self) -> &'static str {
        match self {
            Self::D2 => "texture2D",
            Self::D2Array => "texture2DArray",
            Self::Cube => "textureCube",
            Self::D3 => "texture3D",
        }
    }

    /// Combined sampler type name, without a sample kind prefix.
    pub fn sampler_type(self) -> &'static str {
        match self {
            Self::D2 => "sampler2D",
            Self::D2Array => "sampler2DArray",
            Self::Cube => "samplerCube",
            Self::D3 => "sampler3D",
        }
    }
}

/// How a texture is sampled, which decides its binding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    Float,
    UnfilterableFloat,
    Depth,
    Int,
    Uint,
}

impl SampleKind {
    /// Type prefix for integer textures (`i`/`u`), empty otherwise.
    pub fn type_prefix(self) -> &'static str {
        match self {
            Self::Int => "i",
            Self::Uint => "u",
            _ => "",
        }
    }
}

/// Sampler properties derived from the type token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerInfo {
    pub signed_int: bool,
    pub unsigned_int: bool,
    pub shadow: bool,
    pub dimension: TextureDimension,
}

impl SamplerInfo {
    /// Look up a sampler type token. Returns `None` for unknown sampler types.
    pub fn from_type(ty: &str) -> Option<Self> {
        let (signed_int, unsigned_int, base) = if let Some(base) = ty.strip_prefix("isampler") {
            (true, false, base)
        } else if let Some(base) = ty.strip_prefix("usampler") {
            (false, true, base)
        } else if let Some(base) = ty.strip_prefix("sampler") {
            (false, false, base)
        } else {
            return None;
        };

        let (base, shadow) = match base.strip_suffix("Shadow") {
            Some(base) => (base, true),
            None => (base, false),
        };

        // integer samplers have no shadow variants
        if shadow && (signed_int || unsigned_int) {
            return None;
        }

        let dimension = match (base, shadow) {
            ("2D", _) => TextureDimension::D2,
            ("2DArray", _) => TextureDimension::D2Array,
            ("Cube", _) => TextureDimension::Cube,
            ("3D", false) => TextureDimension::D3,
            _ => return None,
        };

        Some(Self {
            signed_int,
            unsigned_int,
            shadow,
            dimension,
        })
    }
}

/// A `uniform` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDeclaration {
    /// Normalized declaration text, e.g. `highp vec4 tints[4]`.
    pub line: String,
    pub precision: Option<Precision>,
    pub ty: String,
    pub name: String,
    /// Array element count, 0 for a non-array uniform.
    pub array_size: u32,
    /// Present for sampler (texture) uniforms.
    pub sampler: Option<SamplerInfo>,
}

impl UniformDeclaration {
    /// Parse the text following the `uniform` keyword.
    pub fn parse(text: &str) -> Result<Self, DeclarationError> {
        let line = normalize(text);
        if line.contains(',') {
            return Err(DeclarationError::MultipleUniformsOnLine { line });
        }

        let typed = TypedDeclaration::parse(&line)?;

        let sampler = if typed.ty.contains("sampler") {
            match SamplerInfo::from_type(&typed.ty) {
                Some(info) => Some(info),
                None => {
                    return Err(DeclarationError::UnknownUniformType {
                        ty: typed.ty,
                        line,
                    })
                }
            }
        } else {
            None
        };

        Ok(Self {
            precision: typed.precision,
            ty: typed.ty,
            name: typed.name,
            array_size: typed.array_size,
            sampler,
            line,
        })
    }

    pub fn is_sampler(&self) -> bool {
        self.sampler.is_some()
    }

    /// Sample kind of a sampler uniform.
    ///
    /// Integer samplers sample as `Int`/`Uint`. Otherwise a `highp` sampler
    /// is unfilterable, and shadow samplers are depth regardless of
    /// precision.
    pub fn sample_kind(&self) -> Option<SampleKind> {
        let info = self.sampler?;
        let kind = if info.signed_int {
            SampleKind::Int
        } else if info.unsigned_int {
            SampleKind::Uint
        } else if info.shadow {
            SampleKind::Depth
        } else if self.precision == Some(Precision::High) {
            SampleKind::UnfilterableFloat
        } else {
            SampleKind::Float
        };
        Some(kind)
    }
}

/// An `attribute` declaration of the vertex stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDeclaration {
    pub line: String,
    pub precision: Option<Precision>,
    pub ty: String,
    pub name: String,
}

impl AttributeDeclaration {
    pub fn parse(text: &str) -> Result<Self, DeclarationError> {
        let line = normalize(text);
        let typed = TypedDeclaration::parse(&line)?;
        Ok(Self {
            precision: typed.precision,
            ty: typed.ty,
            name: typed.name,
            line,
        })
    }

    /// Number of components of the attribute type (`vec3` is 3, `float` is 1).
    pub fn component_count(&self) -> u32 {
        self.ty
            .chars()
            .last()
            .and_then(|c| c.to_digit(10))
            .unwrap_or(1)
    }
}

/// A `varying` declaration.
///
/// Everything before the name (interpolation, precision, type) is kept as
/// one qualifier string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaryingDeclaration {
    pub line: String,
    pub qualified_type: String,
    pub name: String,
}

impl VaryingDeclaration {
    pub fn parse(text: &str) -> Result<Self, DeclarationError> {
        let line = normalize(text);
        let Some((qualified_type, name)) = line.rsplit_once(' ') else {
            return Err(DeclarationError::Malformed { line });
        };
        Ok(Self {
            qualified_type: qualified_type.to_string(),
            name: name.to_string(),
            line,
        })
    }

    /// Data type without interpolation or precision qualifiers.
    pub fn data_type(&self) -> &str {
        self.qualified_type
            .rsplit(' ')
            .next()
            .unwrap_or(&self.qualified_type)
    }
}

/// A line-leading `out` declaration of the fragment stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeclaration {
    pub line: String,
}

impl OutputDeclaration {
    pub fn parse(text: &str) -> Result<Self, DeclarationError> {
        let line = normalize(text);
        if !line.contains(' ') {
            return Err(DeclarationError::Malformed { line });
        }
        Ok(Self { line })
    }
}

/// Collapse runs of whitespace into single spaces.
pub(crate) fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `[precision] type name[size]`
struct TypedDeclaration {
    precision: Option<Precision>,
    ty: String,
    name: String,
    array_size: u32,
}

impl TypedDeclaration {
    fn parse(line: &str) -> Result<Self, DeclarationError> {
        let malformed = || DeclarationError::Malformed {
            line: line.to_string(),
        };

        let mut words = line.split(' ').peekable();
        let precision = words.peek().and_then(|word| Precision::from_glsl(word));
        if precision.is_some() {
            words.next();
        }

        let ty = words.next().filter(|w| !w.is_empty()).ok_or_else(malformed)?;
        let rest: String = words.collect::<Vec<_>>().join(" ");
        if rest.is_empty() {
            return Err(malformed());
        }

        let (name, array_size) = match rest.find('[') {
            Some(open) => {
                let close = rest.rfind(']').filter(|&c| c > open).ok_or_else(malformed)?;
                let size = rest[open + 1..close].trim().parse::<u32>().map_err(|_| {
                    DeclarationError::NonNumericArraySize {
                        line: line.to_string(),
                    }
                })?;
                (rest[..open].trim().to_string(), size)
            }
            None => (rest, 0),
        };

        if name.is_empty() || name.contains(' ') {
            return Err(malformed());
        }

        Ok(Self {
            precision,
            ty: ty.to_string(),
            name,
            array_size,
        })
    }
}
