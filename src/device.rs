//! Abstract GPU device.
//!
//! The renderer only records state changes and draws through
//! [`RenderDevice`]; a native backend implements it on top of its own API.
//! Calls are issued in CPU order and executed asynchronously by the backend.
//! [`DummyDevice`] records every call for inspection in tests.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::shader::layout::{BindGroupFormat, BindingTier};
use crate::shader::processor::ProcessedShader;
use crate::shader::uniform::UniformBufferFormat;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetHandle(pub(crate) u64);

macro_rules! impl_handle {
    ($($handle:ident),*) => {
        $(
            impl $handle {
                pub fn new(id: u64) -> Self {
                    Self(id)
                }

                pub fn id(&self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

impl_handle!(BufferHandle, TextureHandle, RenderTargetHandle);

/// Value of a named uniform.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    FloatArray(Vec<f32>),
    Mat4Array(Vec<Mat4>),
    Texture(TextureHandle),
}

impl UniformValue {
    /// Raw 32-bit words in column-major order, `None` for textures.
    pub fn to_words(&self) -> Option<Vec<u32>> {
        let words = match self {
            Self::Float(v) => vec![v.to_bits()],
            Self::Int(v) => vec![bytemuck::cast(*v)],
            Self::Vec2(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            Self::Vec3(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            Self::Vec4(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            Self::Mat3(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
            Self::Mat4(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
            Self::FloatArray(values) => bytemuck::cast_slice(values).to_vec(),
            Self::Mat4Array(matrices) => matrices
                .iter()
                .flat_map(|m| m.to_cols_array())
                .map(f32::to_bits)
                .collect(),
            Self::Texture(_) => return None,
        };
        Some(words)
    }

    pub fn as_texture(&self) -> Option<TextureHandle> {
        match self {
            Self::Texture(texture) => Some(*texture),
            _ => None,
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        Self::Mat4(v)
    }
}

impl From<TextureHandle> for UniformValue {
    fn from(v: TextureHandle) -> Self {
        Self::Texture(v)
    }
}

/// Blend factor for blending operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    #[default]
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Blend operation for combining colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Blend component configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl Default for BlendComponent {
    fn default() -> Self {
        Self {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
            operation: BlendOperation::Add,
        }
    }
}

impl BlendComponent {
    /// Standard alpha blending (src over dst).
    pub fn over() -> Self {
        Self {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        }
    }
}

/// Blend state for color blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    pub fn alpha_blending() -> Self {
        Self {
            color: BlendComponent::over(),
            alpha: BlendComponent::over(),
        }
    }

    pub fn additive() -> Self {
        let add = BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            operation: BlendOperation::Add,
        };
        Self {
            color: add,
            alpha: add,
        }
    }
}

/// Comparison function for depth and stencil tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    #[default]
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Depth test and write state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: CompareFunction,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: true,
            write: true,
            compare: CompareFunction::LessEqual,
        }
    }
}

/// Stencil buffer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
    Invert,
}

/// Stencil test for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub compare: CompareFunction,
    pub reference: u32,
    pub read_mask: u32,
    pub write_mask: u32,
    pub fail: StencilOperation,
    pub depth_fail: StencilOperation,
    pub pass: StencilOperation,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            compare: CompareFunction::Always,
            reference: 0,
            read_mask: 0xff,
            write_mask: 0xff,
            fail: StencilOperation::Keep,
            depth_fail: StencilOperation::Keep,
            pass: StencilOperation::Keep,
        }
    }
}

/// Stencil state for both faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StencilState {
    pub front: StencilFaceState,
    pub back: StencilFaceState,
}

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

impl CullMode {
    /// Swap front and back culling, used for mirrored transforms.
    pub fn flipped(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Back => Self::Front,
            Self::Front => Self::Back,
        }
    }
}

/// Primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// Range of vertices or indices to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Primitive {
    pub topology: PrimitiveTopology,
    pub base: u32,
    pub count: u32,
    pub indexed: bool,
}

/// Operations the forward renderer issues to the GPU.
pub trait RenderDevice {
    fn set_shader(&mut self, shader: &ProcessedShader);

    fn set_uniform(&mut self, name: &str, value: UniformValue);

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle);

    /// Bind the texture group of a tier.
    fn set_bind_group(&mut self, tier: BindingTier, format: &BindGroupFormat);

    /// Upload and bind the uniform buffer of a tier.
    fn set_uniform_buffer(&mut self, tier: BindingTier, format: &UniformBufferFormat, data: &[u8]);

    /// `None` disables blending.
    fn set_blend_state(&mut self, state: Option<BlendState>);

    fn set_depth_state(&mut self, state: DepthState);

    /// `None` disables the stencil test.
    fn set_stencil_state(&mut self, state: Option<StencilState>);

    fn set_cull_mode(&mut self, mode: CullMode);

    fn draw(&mut self, primitive: &Primitive, index_buffer: Option<BufferHandle>, instance_count: u32);
}

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    SetShader(String),
    SetUniform(String, UniformValue),
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
    },
    SetBindGroup {
        tier: BindingTier,
        textures: usize,
    },
    SetUniformBuffer {
        tier: BindingTier,
        size: usize,
    },
    SetBlendState(Option<BlendState>),
    SetDepthState(DepthState),
    SetStencilState(Option<StencilState>),
    SetCullMode(CullMode),
    Draw {
        primitive: Primitive,
        index_buffer: Option<BufferHandle>,
        instance_count: u32,
    },
}

/// Device that records calls instead of executing them.
#[derive(Debug, Default)]
pub struct DummyDevice {
    commands: Vec<DeviceCommand>,
}

impl DummyDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Last value set for a uniform.
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.commands.iter().rev().find_map(|command| match command {
            DeviceCommand::SetUniform(n, value) if n == name => Some(value),
            _ => None,
        })
    }

    /// Index of the first command setting `name`.
    pub fn uniform_position(&self, name: &str) -> Option<usize> {
        self.commands
            .iter()
            .position(|command| matches!(command, DeviceCommand::SetUniform(n, _) if n == name))
    }

    /// Indices of all draw commands.
    pub fn draw_positions(&self) -> Vec<usize> {
        self.commands
            .iter()
            .enumerate()
            .filter(|(_, command)| matches!(command, DeviceCommand::Draw { .. }))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.draw_positions().len()
    }

    /// Names of the shaders set, in order.
    pub fn shaders(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                DeviceCommand::SetShader(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl RenderDevice for DummyDevice {
    fn set_shader(&mut self, shader: &ProcessedShader) {
        self.commands.push(DeviceCommand::SetShader(shader.name.clone()));
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.commands
            .push(DeviceCommand::SetUniform(name.to_string(), value));
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.commands
            .push(DeviceCommand::SetVertexBuffer { slot, buffer });
    }

    fn set_bind_group(&mut self, tier: BindingTier, format: &BindGroupFormat) {
        self.commands.push(DeviceCommand::SetBindGroup {
            tier,
            textures: format.textures().len(),
        });
    }

    fn set_uniform_buffer(&mut self, tier: BindingTier, _format: &UniformBufferFormat, data: &[u8]) {
        self.commands.push(DeviceCommand::SetUniformBuffer {
            tier,
            size: data.len(),
        });
    }

    fn set_blend_state(&mut self, state: Option<BlendState>) {
        self.commands.push(DeviceCommand::SetBlendState(state));
    }

    fn set_depth_state(&mut self, state: DepthState) {
        self.commands.push(DeviceCommand::SetDepthState(state));
    }

    fn set_stencil_state(&mut self, state: Option<StencilState>) {
        self.commands.push(DeviceCommand::SetStencilState(state));
    }

    fn set_cull_mode(&mut self, mode: CullMode) {
        self.commands.push(DeviceCommand::SetCullMode(mode));
    }

    fn draw(&mut self, primitive: &Primitive, index_buffer: Option<BufferHandle>, instance_count: u32) {
        self.commands.push(DeviceCommand::Draw {
            primitive: *primitive,
            index_buffer,
            instance_count,
        });
    }
}
