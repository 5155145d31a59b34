//! Numeric uniform types and std140 uniform buffer layouts.

use crate::device::UniformValue;

/// Name of the placeholder uniform added to an otherwise empty buffer.
///
/// A uniform buffer layout is never empty: binding a null buffer would shift
/// the placement of the other bindings in the group.
pub const UNUSED_UNIFORM_NAME: &str = "_unused_float_uniform";

/// Largest per-object uniform buffer a program may require, in bytes.
pub const MAX_UNIFORM_BUFFER_SIZE: u32 = 64 * 1024;

/// Numeric uniform type that can live in a uniform buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Bool,
    Int,
    Uint,
    Float,
    Vec2,
    Vec3,
    Vec4,
    IVec2,
    IVec3,
    IVec4,
    UVec2,
    UVec3,
    UVec4,
    BVec2,
    BVec3,
    BVec4,
    Mat2,
    Mat3,
    Mat4,
}

impl UniformType {
    pub fn from_glsl(ty: &str) -> Option<Self> {
        let ty = match ty {
            "bool" => Self::Bool,
            "int" => Self::Int,
            "uint" => Self::Uint,
            "float" => Self::Float,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "ivec2" => Self::IVec2,
            "ivec3" => Self::IVec3,
            "ivec4" => Self::IVec4,
            "uvec2" => Self::UVec2,
            "uvec3" => Self::UVec3,
            "uvec4" => Self::UVec4,
            "bvec2" => Self::BVec2,
            "bvec3" => Self::BVec3,
            "bvec4" => Self::BVec4,
            "mat2" => Self::Mat2,
            "mat3" => Self::Mat3,
            "mat4" => Self::Mat4,
            _ => return None,
        };
        Some(ty)
    }

    pub fn glsl_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::IVec2 => "ivec2",
            Self::IVec3 => "ivec3",
            Self::IVec4 => "ivec4",
            Self::UVec2 => "uvec2",
            Self::UVec3 => "uvec3",
            Self::UVec4 => "uvec4",
            Self::BVec2 => "bvec2",
            Self::BVec3 => "bvec3",
            Self::BVec4 => "bvec4",
            Self::Mat2 => "mat2",
            Self::Mat3 => "mat3",
            Self::Mat4 => "mat4",
        }
    }

    /// `(columns, components per column)`.
    pub fn shape(self) -> (u32, u32) {
        match self {
            Self::Bool | Self::Int | Self::Uint | Self::Float => (1, 1),
            Self::Vec2 | Self::IVec2 | Self::UVec2 | Self::BVec2 => (1, 2),
            Self::Vec3 | Self::IVec3 | Self::UVec3 | Self::BVec3 => (1, 3),
            Self::Vec4 | Self::IVec4 | Self::UVec4 | Self::BVec4 => (1, 4),
            Self::Mat2 => (2, 2),
            Self::Mat3 => (3, 3),
            Self::Mat4 => (4, 4),
        }
    }

    /// std140 base alignment of a single (non-array) value.
    pub fn alignment(self) -> u32 {
        match self.shape() {
            (1, 1) => 4,
            (1, 2) => 8,
            _ => 16,
        }
    }

    /// std140 size of a single (non-array) value.
    pub fn size(self) -> u32 {
        match self.shape() {
            (1, components) => components * 4,
            // matrix columns are padded to vec4
            (columns, _) => columns * 16,
        }
    }
}

/// One entry of a uniform buffer layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformFormat {
    pub name: String,
    pub ty: UniformType,
    /// Array element count, 0 for a non-array uniform.
    pub count: u32,
    /// Byte offset in the buffer, assigned by [`UniformBufferFormat::new`].
    pub offset: u32,
}

impl UniformFormat {
    pub fn new(name: impl Into<String>, ty: UniformType, count: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            count,
            offset: 0,
        }
    }

    pub fn alignment(&self) -> u32 {
        if self.count > 0 {
            16
        } else {
            self.ty.alignment()
        }
    }

    /// Distance between array elements.
    pub fn element_stride(&self) -> u32 {
        if self.count > 0 {
            align_to(self.ty.size(), 16)
        } else {
            self.ty.size()
        }
    }

    /// Size in bytes, `None` when it does not fit in `u32`.
    pub fn checked_byte_size(&self) -> Option<u32> {
        self.element_stride().checked_mul(self.count.max(1))
    }

    /// Size in bytes, saturating at `u32::MAX`.
    pub fn byte_size(&self) -> u32 {
        self.checked_byte_size().unwrap_or(u32::MAX)
    }
}

/// Ordered uniforms with std140 offsets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformBufferFormat {
    uniforms: Vec<UniformFormat>,
    byte_size: u32,
}

impl UniformBufferFormat {
    /// Lay out `uniforms` in order. An empty list gets the placeholder
    /// uniform.
    ///
    /// Meant for layouts the application builds itself; a layout that
    /// overflows is logged and reports a saturated size. Use
    /// [`Self::try_new`] for layouts derived from shader text.
    pub fn new(uniforms: Vec<UniformFormat>) -> Self {
        let mut uniforms = with_placeholder(uniforms);
        let byte_size = match lay_out(&mut uniforms, u32::MAX) {
            Ok(byte_size) => byte_size,
            Err(index) => {
                log::error!("uniform buffer layout overflows at `{}`", uniforms[index].name);
                u32::MAX
            }
        };
        Self { uniforms, byte_size }
    }

    /// Lay out `uniforms` like [`Self::new`], failing with the name of the
    /// first uniform that ends past `max_size` bytes.
    pub fn try_new(uniforms: Vec<UniformFormat>, max_size: u32) -> Result<Self, String> {
        let mut uniforms = with_placeholder(uniforms);
        match lay_out(&mut uniforms, max_size) {
            Ok(byte_size) => Ok(Self { uniforms, byte_size }),
            Err(index) => Err(uniforms.swap_remove(index).name),
        }
    }

    pub fn uniforms(&self) -> &[UniformFormat] {
        &self.uniforms
    }

    /// Total buffer size, a multiple of 16.
    pub fn byte_size(&self) -> u32 {
        self.byte_size
    }

    pub fn get(&self, name: &str) -> Option<&UniformFormat> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether the layout holds only the placeholder uniform.
    pub fn is_placeholder(&self) -> bool {
        self.uniforms.len() == 1 && self.uniforms[0].name == UNUSED_UNIFORM_NAME
    }

    /// Write `value` into `buffer` at the position of the named uniform.
    ///
    /// Components beyond what the uniform holds are ignored, missing ones
    /// leave the buffer untouched. Returns `false` when the name is not part
    /// of this layout, the value is not numeric, or the buffer is too small.
    pub fn write(&self, buffer: &mut [u8], name: &str, value: &UniformValue) -> bool {
        let Some(uniform) = self.get(name) else {
            return false;
        };
        let Some(words) = value.to_words() else {
            return false;
        };
        if buffer.len() < uniform.offset as usize + uniform.byte_size() as usize {
            return false;
        }

        let (columns, components) = uniform.ty.shape();
        let stride = uniform.element_stride();
        let mut source = words.iter();

        'elements: for element in 0..uniform.count.max(1) {
            for column in 0..columns {
                for component in 0..components {
                    let Some(word) = source.next() else {
                        break 'elements;
                    };
                    let at = uniform.offset as usize
                        + (element * stride) as usize
                        + (column * 16 + component * 4) as usize;
                    buffer[at..at + 4].copy_from_slice(bytemuck::bytes_of(word));
                }
            }
        }
        true
    }

    /// Allocate a zeroed buffer of [`Self::byte_size`] bytes.
    pub fn create_buffer(&self) -> Vec<u8> {
        vec![0; self.byte_size as usize]
    }
}

fn with_placeholder(mut uniforms: Vec<UniformFormat>) -> Vec<UniformFormat> {
    if uniforms.is_empty() {
        uniforms.push(UniformFormat::new(UNUSED_UNIFORM_NAME, UniformType::Float, 0));
    }
    uniforms
}

/// Assign std140 offsets and return the buffer size, or the index of the
/// first uniform that does not fit in `max_size` bytes.
fn lay_out(uniforms: &mut [UniformFormat], max_size: u32) -> Result<u32, usize> {
    let mut cursor = 0u32;
    for (index, uniform) in uniforms.iter_mut().enumerate() {
        let offset = cursor.checked_next_multiple_of(uniform.alignment()).ok_or(index)?;
        uniform.offset = offset;
        cursor = uniform
            .checked_byte_size()
            .and_then(|size| offset.checked_add(size))
            .filter(|&end| end <= max_size)
            .ok_or(index)?;
    }
    cursor
        .checked_next_multiple_of(16)
        .filter(|&size| size <= max_size)
        .ok_or(uniforms.len().saturating_sub(1))
}

pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
