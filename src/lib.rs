//! Forward Graphics - shading-resource compiler and forward frame scheduler
//!
//! The runtime core of a real-time forward renderer:
//! - **Shader processing**: extract declarations from per-stage GLSL, allocate
//!   attribute/varying/output locations, split uniforms and textures between
//!   shared binding tiers and the per-object group, and inject generated
//!   declaration blocks back into the source
//! - **Draw-call batching**: group visible instances by material and light
//!   state, resolving shader variants through a shared cache
//! - **Light dispatch**: write per-light uniform slots before each batch
//! - **Frame scheduling**: turn camera/layer render actions into the ordered
//!   list of render passes of a frame
//!
//! The GPU is reached through the [`device::RenderDevice`] trait; a native
//! backend is supplied by the application.

pub mod device;
pub mod error;
pub mod frame;
pub mod profiling;
pub mod render;
pub mod scene;
pub mod shader;

pub use device::{DummyDevice, RenderDevice};
pub use error::{DeclarationError, ShaderError, ShaderResult};
pub use frame::{build_frame, FrameGraph, FrameInputs, FramePass, RenderAction, RenderActionFlags};
pub use render::{DrawCallBatcher, ForwardRenderer, LightDispatcher, RenderStats};
pub use shader::{ShaderCache, ShaderDialect, ShaderProcessor};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Texture units kept for material and view textures.
pub const RESERVED_TEXTURE_UNITS: u32 = 8;

/// Texture units a light can occupy: shadow map and cookie.
pub const TEXTURE_UNITS_PER_LIGHT: u32 = 2;

/// Configuration of the forward renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Declaration syntax shaders are generated in.
    pub dialect: ShaderDialect,
    /// Local lights come from a clustered GPU structure instead of
    /// per-draw slots.
    pub clustered_lighting: bool,
    pub shadows_enabled: bool,
    pub cookies_enabled: bool,
    /// Upper bound on light slots per draw.
    pub max_lights: u32,
    /// Scale ambient and skybox by luminance values.
    pub physical_units: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            dialect: ShaderDialect::default(),
            clustered_lighting: false,
            shadows_enabled: true,
            cookies_enabled: true,
            max_lights: 8,
            physical_units: false,
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(mut self, dialect: ShaderDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_clustered_lighting(mut self, enabled: bool) -> Self {
        self.clustered_lighting = enabled;
        self
    }

    pub fn with_shadows(mut self, enabled: bool) -> Self {
        self.shadows_enabled = enabled;
        self
    }

    pub fn with_cookies(mut self, enabled: bool) -> Self {
        self.cookies_enabled = enabled;
        self
    }

    pub fn with_max_lights(mut self, max_lights: u32) -> Self {
        self.max_lights = max_lights;
        self
    }

    pub fn with_physical_units(mut self, enabled: bool) -> Self {
        self.physical_units = enabled;
        self
    }

    /// Light slots available per draw on a device with `limits`.
    ///
    /// Always at least one.
    pub fn max_light_slots(&self, limits: &DeviceLimits) -> usize {
        let by_units =
            limits.texture_units.saturating_sub(RESERVED_TEXTURE_UNITS) / TEXTURE_UNITS_PER_LIGHT;
        self.max_lights.min(by_units).max(1) as usize
    }
}

/// Capabilities of the device the renderer runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Texture units usable by the fragment stage.
    pub texture_units: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self { texture_units: 16 }
    }
}

impl DeviceLimits {
    pub fn with_texture_units(mut self, texture_units: u32) -> Self {
        self.texture_units = texture_units;
        self
    }
}

/// Log the crate version. Call once after the application installs its
/// logger.
pub fn init() {
    log::info!("forward-graphics {VERSION}");
}
