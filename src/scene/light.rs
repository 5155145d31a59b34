//! Light types for the scene

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::device::TextureHandle;

/// Maximum number of directional shadow cascades.
pub const MAX_SHADOW_CASCADES: usize = 4;

/// Stable light identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(pub u32);

/// Light type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional,
    Omni,
    Spot,
}

/// Emitter shape. Anything but `Punctual` is an area light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LightShape {
    #[default]
    Punctual,
    Rect,
    Disk,
    Sphere,
}

/// Directional cascade data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeData {
    pub palette: [Mat4; MAX_SHADOW_CASCADES],
    pub distances: Vec4,
    pub count: u32,
    /// Blend factor between cascades; uploaded as `1 - blend`.
    pub blend: f32,
}

impl Default for CascadeData {
    fn default() -> Self {
        Self {
            palette: [Mat4::IDENTITY; MAX_SHADOW_CASCADES],
            distances: Vec4::ZERO,
            count: 1,
            blend: 0.0,
        }
    }
}

/// Shadow rendering results for a shadow-casting light.
///
/// For a directional light this is the data rendered for the camera being
/// drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowData {
    pub shadow_map: TextureHandle,
    pub shadow_matrix: Mat4,
    pub resolution: f32,
    pub bias: f32,
    pub normal_bias: f32,
    pub intensity: f32,
    /// Penumbra size for soft shadows.
    pub penumbra_size: f32,
    /// Width of the shadow render target in pixels, 0 when not rendered.
    pub target_width: f32,
    pub near: f32,
    pub far: f32,
    /// Shadow camera field of view in degrees.
    pub fov: f32,
    pub projection_compensation: f32,
    pub soft_shadow_params: Vec4,
    pub cascades: Option<CascadeData>,
}

impl ShadowData {
    pub fn new(shadow_map: TextureHandle) -> Self {
        Self {
            shadow_map,
            shadow_matrix: Mat4::IDENTITY,
            resolution: 1024.0,
            bias: 0.05,
            normal_bias: 0.0,
            intensity: 1.0,
            penumbra_size: 1.0,
            target_width: 1024.0,
            near: 0.1,
            far: 100.0,
            fov: 90.0,
            projection_compensation: 1.0,
            soft_shadow_params: Vec4::ZERO,
            cascades: None,
        }
    }

    pub fn with_matrix(mut self, shadow_matrix: Mat4) -> Self {
        self.shadow_matrix = shadow_matrix;
        self
    }

    pub fn with_cascades(mut self, cascades: CascadeData) -> Self {
        self.cascades = Some(cascades);
        self
    }
}

/// Projected light texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cookie {
    pub texture: TextureHandle,
    pub intensity: f32,
    /// Optional 2x2 UV transform, spot lights only.
    pub transform: Option<Vec4>,
    pub offset: Vec2,
}

impl Cookie {
    pub fn new(texture: TextureHandle) -> Self {
        Self {
            texture,
            intensity: 1.0,
            transform: None,
            offset: Vec2::ZERO,
        }
    }
}

/// A light with its world transform already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub id: LightId,
    pub kind: LightKind,
    pub shape: LightShape,
    /// Lights affect instances whose mask intersects this one.
    pub mask: u32,
    /// Linear color, intensity applied.
    pub color: Vec3,
    pub world_transform: Mat4,
    /// Attenuation end distance of local lights.
    pub range: f32,
    /// Spot inner cone angle in degrees.
    pub inner_cone_angle: f32,
    /// Spot outer cone angle in degrees.
    pub outer_cone_angle: f32,
    /// Higher priority lights survive slot overflow.
    pub priority: i32,
    pub shadow: Option<ShadowData>,
    pub cookie: Option<Cookie>,
}

impl Light {
    pub fn new(id: LightId, kind: LightKind) -> Self {
        Self {
            id,
            kind,
            shape: LightShape::Punctual,
            mask: 1,
            color: Vec3::ONE,
            world_transform: Mat4::IDENTITY,
            range: 10.0,
            inner_cone_angle: 40.0,
            outer_cone_angle: 45.0,
            priority: 0,
            shadow: None,
            cookie: None,
        }
    }

    pub fn directional(id: u32) -> Self {
        Self::new(LightId(id), LightKind::Directional)
    }

    pub fn omni(id: u32) -> Self {
        Self::new(LightId(id), LightKind::Omni)
    }

    pub fn spot(id: u32) -> Self {
        Self::new(LightId(id), LightKind::Spot)
    }

    pub fn with_transform(mut self, world_transform: Mat4) -> Self {
        self.world_transform = world_transform;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.world_transform.w_axis = position.extend(1.0);
        self
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_shape(mut self, shape: LightShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_range(mut self, range: f32) -> Self {
        self.range = range;
        self
    }

    pub fn with_cone_angles(mut self, inner: f32, outer: f32) -> Self {
        self.inner_cone_angle = inner;
        self.outer_cone_angle = outer;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_shadow(mut self, shadow: ShadowData) -> Self {
        self.shadow = Some(shadow);
        self
    }

    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookie = Some(cookie);
        self
    }

    pub fn casts_shadows(&self) -> bool {
        self.shadow.is_some()
    }

    pub fn is_area(&self) -> bool {
        self.shape != LightShape::Punctual
    }

    pub fn is_local(&self) -> bool {
        self.kind != LightKind::Directional
    }

    pub fn affects(&self, mask: u32) -> bool {
        self.mask & mask != 0
    }

    pub fn position(&self) -> Vec3 {
        self.world_transform.w_axis.truncate()
    }

    /// Lights shine down their negative Y axis.
    pub fn direction(&self) -> Vec3 {
        (-self.world_transform.y_axis.truncate()).normalize_or_zero()
    }

    /// Area half-extent vectors: local `-0.5` on X and `0.5` on Z.
    pub fn half_extents(&self) -> (Vec3, Vec3) {
        (
            self.world_transform.transform_vector3(Vec3::new(-0.5, 0.0, 0.0)),
            self.world_transform.transform_vector3(Vec3::new(0.0, 0.0, 0.5)),
        )
    }
}
