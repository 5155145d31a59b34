//! Vertex attribute semantics and their fixed shader locations.
//!
//! Attribute locations come from this table only, never from declaration
//! order, so every program reads a given semantic from the same location and
//! vertex layouts can be shared between programs.

/// Meaning of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Semantic {
    Position,
    Normal,
    Tangent,
    BlendWeight,
    BlendIndices,
    Color,
    /// Texture coordinate set 0..=7.
    TexCoord(u8),
    /// Generic attribute 0..=15. These alias the named semantics' locations.
    Attr(u8),
}

impl Semantic {
    /// Fixed shader location for this semantic, `None` for an out-of-range
    /// texture coordinate or generic attribute index.
    pub fn location(self) -> Option<u32> {
        match self {
            Self::Position => Some(0),
            Self::Normal => Some(1),
            Self::BlendWeight => Some(2),
            Self::BlendIndices => Some(3),
            Self::Color => Some(4),
            Self::TexCoord(set) if set < 8 => Some(5 + set as u32),
            Self::Tangent => Some(13),
            Self::Attr(index) if index < 16 => Some(index as u32),
            Self::TexCoord(_) | Self::Attr(_) => None,
        }
    }

    /// Every semantic with a valid location, named semantics first.
    pub fn all() -> impl Iterator<Item = Semantic> {
        [
            Self::Position,
            Self::Normal,
            Self::Tangent,
            Self::BlendWeight,
            Self::BlendIndices,
            Self::Color,
        ]
        .into_iter()
        .chain((0..8).map(Self::TexCoord))
        .chain((0..16).map(Self::Attr))
    }
}

/// Component data type of a vertex element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexDataType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float16,
    #[default]
    Float32,
}

impl VertexDataType {
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float16 | Self::Float32)
    }

    pub fn is_signed_int(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32)
    }
}

/// Format of the vertex element that feeds a semantic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexElement {
    pub data_type: VertexDataType,
    /// Integer data normalized to `[0, 1]` / `[-1, 1]` by the input assembler.
    pub normalize: bool,
    /// The shader declares the attribute with an integer type itself.
    pub as_int: bool,
}

impl VertexElement {
    pub fn new(data_type: VertexDataType) -> Self {
        Self {
            data_type,
            ..Default::default()
        }
    }

    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }

    pub fn as_int(mut self) -> Self {
        self.as_int = true;
        self
    }

    /// Whether the shader receives raw integers that need a float copy.
    pub fn needs_integer_attribute(&self) -> bool {
        !self.data_type.is_float() && !self.normalize && !self.as_int
    }

    /// Integer GLSL type for an attribute with `components` components.
    pub fn integer_type(&self, components: u32) -> String {
        let signed = self.data_type.is_signed_int();
        match (components, signed) {
            (1, true) => "int".to_string(),
            (1, false) => "uint".to_string(),
            (n, true) => format!("ivec{n}"),
            (n, false) => format!("uvec{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_locations() {
        assert_eq!(Semantic::Position.location(), Some(0));
        assert_eq!(Semantic::Color.location(), Some(4));
        assert_eq!(Semantic::TexCoord(0).location(), Some(5));
        assert_eq!(Semantic::TexCoord(7).location(), Some(12));
        assert_eq!(Semantic::Tangent.location(), Some(13));
        assert_eq!(Semantic::Attr(15).location(), Some(15));
        assert_eq!(Semantic::TexCoord(8).location(), None);
        assert_eq!(Semantic::Attr(16).location(), None);
    }

    #[test]
    fn test_named_semantics_are_unique() {
        let mut locations: Vec<u32> = Semantic::all()
            .filter(|s| !matches!(s, Semantic::Attr(_)))
            .filter_map(Semantic::location)
            .collect();
        let count = locations.len();
        locations.sort_unstable();
        locations.dedup();
        assert_eq!(locations.len(), count);
    }

    #[test]
    fn test_integer_attribute_rules() {
        assert!(!VertexElement::new(VertexDataType::Float32).needs_integer_attribute());
        assert!(!VertexElement::new(VertexDataType::Uint8)
            .normalized()
            .needs_integer_attribute());
        assert!(!VertexElement::new(VertexDataType::Uint8)
            .as_int()
            .needs_integer_attribute());

        let indices = VertexElement::new(VertexDataType::Uint8);
        assert!(indices.needs_integer_attribute());
        assert_eq!(indices.integer_type(4), "uvec4");
        assert_eq!(VertexElement::new(VertexDataType::Int16).integer_type(1), "int");
    }
}
