//! Drawable mesh instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Mat3, Mat4};

use crate::device::{BufferHandle, Primitive, StencilState, UniformValue};
use crate::scene::material::Material;

/// Geometry shared by instances.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: Option<BufferHandle>,
    pub primitive: Primitive,
}

/// Hardware instancing source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstancingData {
    pub vertex_buffer: BufferHandle,
    pub count: u32,
}

/// One visible mesh instance.
#[derive(Debug, Clone)]
pub struct DrawInstance {
    pub material: Arc<Material>,
    pub mesh: Arc<Mesh>,
    /// Lights affecting this instance have an intersecting mask.
    pub mask: u32,
    pub world_transform: Mat4,
    /// Per-object shader bits (skinning, morphing, ...).
    pub shader_flags: u64,
    pub instancing: Option<InstancingData>,
    /// Overrides the material stencil state.
    pub stencil: Option<StencilState>,
    /// Overrides of material parameters.
    pub parameters: BTreeMap<String, UniformValue>,
}

impl DrawInstance {
    pub fn new(material: Arc<Material>, mesh: Arc<Mesh>) -> Self {
        Self {
            material,
            mesh,
            mask: 1,
            world_transform: Mat4::IDENTITY,
            shader_flags: 0,
            instancing: None,
            stencil: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_transform(mut self, world_transform: Mat4) -> Self {
        self.world_transform = world_transform;
        self
    }

    pub fn with_shader_flags(mut self, flags: u64) -> Self {
        self.shader_flags = flags;
        self
    }

    pub fn with_instancing(mut self, instancing: InstancingData) -> Self {
        self.instancing = Some(instancing);
        self
    }

    pub fn with_stencil(mut self, stencil: StencilState) -> Self {
        self.stencil = Some(stencil);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: UniformValue) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Instanced draw with nothing to draw.
    pub fn is_empty_instanced(&self) -> bool {
        self.instancing.is_some_and(|data| data.count == 0)
    }

    pub fn instance_count(&self) -> u32 {
        self.instancing.map_or(1, |data| data.count)
    }

    /// Mirrored transforms flip the triangle winding.
    pub fn flips_faces(&self) -> bool {
        self.world_transform.determinant() < 0.0
    }

    pub fn normal_matrix(&self) -> Mat3 {
        Mat3::from_mat4(self.world_transform).inverse().transpose()
    }
}
