//! Per-draw light dispatch.
//!
//! Lights are written into positional slots `light0`, `light1`, ...:
//! directional lights first, then omni lights, then spot lights, with
//! numbering continuing across kinds. Each slot is staged in a reusable
//! scratch record that is fully reset before it is written, then uploaded as
//! named uniforms.
//!
//! The number of slots is bounded by the texture units available for shadow
//! maps and cookies. Lights that do not fit are dropped, so local lights are
//! sorted to keep the most important ones first.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::f32::consts::FRAC_PI_2;
use std::hash::{Hash, Hasher};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::device::{RenderDevice, TextureHandle, UniformValue};
use crate::scene::{
    Camera, CascadeData, Cookie, Light, LightKind, SceneSettings, ShadowData, MAX_SHADOW_CASCADES,
};

/// Staged uniform data of one light slot, laid out for direct upload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightSlot {
    pub color: Vec4,
    pub direction: Vec4,
    pub position: Vec4,
    pub half_width: Vec4,
    pub half_height: Vec4,
    /// `[resolution, normal_bias, bias, 1/range or 0]`
    pub shadow_params: Vec4,
    /// `[0, far, near, 1 for directional / 0 for local]`
    pub camera_params: Vec4,
    pub soft_shadow_params: Vec4,
    pub cascade_distances: Vec4,
    /// `[radius, inner cone cos, outer cone cos, 0]`
    pub attenuation: Vec4,
    /// `[intensity, search area, cascade count, cascade blend]`
    pub shadow: Vec4,
    /// `[intensity, offset x, offset y, 0]`
    pub cookie: Vec4,
    pub cookie_transform: Vec4,
    pub shadow_matrix: Mat4,
    pub shadow_palette: [Mat4; MAX_SHADOW_CASCADES],
}

impl LightSlot {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

bitflags::bitflags! {
    /// Which parts of a slot were written for the current light.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SlotFields: u32 {
        const DIRECTION = 1 << 0;
        const POSITION = 1 << 1;
        const AREA = 1 << 2;
        const RADIUS = 1 << 3;
        const CONE = 1 << 4;
        const SHADOW = 1 << 5;
        const SEARCH_AREA = 1 << 6;
        const SHADOW_MATRIX = 1 << 7;
        const CASCADES = 1 << 8;
        const COOKIE = 1 << 9;
        const COOKIE_TRANSFORM = 1 << 10;
    }
}

#[derive(Debug, Clone, Copy)]
struct SlotScratch {
    data: LightSlot,
    fields: SlotFields,
    shadow_map: Option<TextureHandle>,
    cookie: Option<TextureHandle>,
}

impl SlotScratch {
    fn reset(&mut self) {
        self.data = LightSlot::zeroed();
        self.fields = SlotFields::empty();
        self.shadow_map = None;
        self.cookie = None;
    }
}

impl Default for SlotScratch {
    fn default() -> Self {
        Self {
            data: LightSlot::zeroed(),
            fields: SlotFields::empty(),
            shadow_map: None,
            cookie: None,
        }
    }
}

/// Uniform names of one light slot.
#[derive(Debug, Clone)]
struct LightUniformNames {
    color: String,
    direction: String,
    position: String,
    half_width: String,
    half_height: String,
    radius: String,
    inner_cone_angle: String,
    outer_cone_angle: String,
    shadow_map: String,
    shadow_matrix: String,
    shadow_params: String,
    shadow_intensity: String,
    shadow_search_area: String,
    camera_params: String,
    soft_shadow_params: String,
    shadow_matrix_palette: String,
    shadow_cascade_distances: String,
    shadow_cascade_count: String,
    shadow_cascade_blend: String,
    cookie: String,
    cookie_intensity: String,
    cookie_matrix: String,
    cookie_offset: String,
}

impl LightUniformNames {
    fn new(index: usize) -> Self {
        let name = |suffix: &str| format!("light{index}_{suffix}");
        Self {
            color: name("color"),
            direction: name("direction"),
            position: name("position"),
            half_width: name("halfWidth"),
            half_height: name("halfHeight"),
            radius: name("radius"),
            inner_cone_angle: name("innerConeAngle"),
            outer_cone_angle: name("outerConeAngle"),
            shadow_map: name("shadowMap"),
            shadow_matrix: name("shadowMatrix"),
            shadow_params: name("shadowParams"),
            shadow_intensity: name("shadowIntensity"),
            shadow_search_area: name("shadowSearchArea"),
            camera_params: name("cameraParams"),
            soft_shadow_params: name("softShadowParams"),
            shadow_matrix_palette: name("shadowMatrixPalette[0]"),
            shadow_cascade_distances: name("shadowCascadeDistances"),
            shadow_cascade_count: name("shadowCascadeCount"),
            shadow_cascade_blend: name("shadowCascadeBlend"),
            cookie: name("cookie"),
            cookie_intensity: name("cookieIntensity"),
            cookie_matrix: name("cookieMatrix"),
            cookie_offset: name("cookieOffset"),
        }
    }
}

/// Lights of a layer split by kind, local lights in dispatch order.
///
/// Local lights are ordered by descending priority, then ascending distance
/// to the camera, then original order. Directional lights keep their order.
#[derive(Debug, Clone, Default)]
pub struct SortedLights<'a> {
    pub directional: Vec<&'a Light>,
    pub omni: Vec<&'a Light>,
    pub spot: Vec<&'a Light>,
}

impl<'a> SortedLights<'a> {
    pub fn new(lights: &'a [Light], camera_position: Vec3) -> Self {
        let mut sorted = Self::default();
        for light in lights {
            match light.kind {
                LightKind::Directional => sorted.directional.push(light),
                LightKind::Omni => sorted.omni.push(light),
                LightKind::Spot => sorted.spot.push(light),
            }
        }

        let by_importance = |a: &&Light, b: &&Light| {
            b.priority.cmp(&a.priority).then_with(|| {
                let da = a.position().distance_squared(camera_position);
                let db = b.position().distance_squared(camera_position);
                da.partial_cmp(&db).unwrap_or(Ordering::Equal)
            })
        };
        // stable sort keeps the original order for ties
        sorted.omni.sort_by(by_importance);
        sorted.spot.sort_by(by_importance);
        sorted
    }

    pub fn is_empty(&self) -> bool {
        self.directional.is_empty() && self.omni.is_empty() && self.spot.is_empty()
    }

    /// Local lights that render shadow maps.
    pub fn local_shadow_casters(&self) -> impl Iterator<Item = &'a Light> + '_ {
        self.omni
            .iter()
            .chain(&self.spot)
            .copied()
            .filter(|light| light.casts_shadows())
    }

    /// Hash of the light configuration shaders are specialized for.
    ///
    /// With clustered lighting only directional lights are baked into
    /// shaders. Zero when no light contributes.
    pub fn light_hash(&self, clustered: bool) -> u64 {
        let mut lights = self.directional.clone();
        if !clustered {
            lights.extend(self.omni.iter().copied());
            lights.extend(self.spot.iter().copied());
        }
        if lights.is_empty() {
            return 0;
        }

        let mut hasher = DefaultHasher::new();
        for light in lights {
            light.kind.hash(&mut hasher);
            light.shape.hash(&mut hasher);
            light.mask.hash(&mut hasher);
            light.casts_shadows().hash(&mut hasher);
            light.cookie.is_some().hash(&mut hasher);
            light
                .shadow
                .and_then(|shadow| shadow.cascades)
                .map(|cascades| cascades.count)
                .hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Projection matrix for a spot cookie when no shadow matrix is rendered.
///
/// The light camera looks down the light's negative Y axis with a field of
/// view of twice the outer cone angle; the result maps into `[0, 1]`
/// texture space.
pub fn spot_cookie_matrix(light: &Light) -> Mat4 {
    let view = (light.world_transform * Mat4::from_rotation_x(-FRAC_PI_2)).inverse();
    let fov = (light.outer_cone_angle * 2.0).to_radians();
    let far = light.range.max(f32::EPSILON);
    let projection = Mat4::perspective_rh_gl(fov, 1.0, far / 1000.0, far);
    let scale_shift =
        Mat4::from_translation(Vec3::splat(0.5)) * Mat4::from_scale(Vec3::splat(0.5));
    scale_shift * projection * view
}

/// Writes light uniforms into a bounded number of slots.
pub struct LightDispatcher {
    max_slots: usize,
    shadows: bool,
    cookies: bool,
    slots: Vec<SlotScratch>,
    names: Vec<LightUniformNames>,
}

impl LightDispatcher {
    pub fn new(max_slots: usize) -> Self {
        let max_slots = max_slots.max(1);
        Self {
            max_slots,
            shadows: true,
            cookies: true,
            slots: vec![SlotScratch::default(); max_slots],
            names: Vec::new(),
        }
    }

    /// When off, shadow data of lights is ignored.
    pub fn with_shadows(mut self, enabled: bool) -> Self {
        self.shadows = enabled;
        self
    }

    /// When off, light cookies are ignored.
    pub fn with_cookies(mut self, enabled: bool) -> Self {
        self.cookies = enabled;
        self
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// Staged data of a slot from the last dispatch.
    pub fn slot(&self, index: usize) -> Option<&LightSlot> {
        self.slots.get(index).map(|scratch| &scratch.data)
    }

    /// Fields written into a slot by the last dispatch.
    pub fn slot_fields(&self, index: usize) -> SlotFields {
        self.slots
            .get(index)
            .map_or(SlotFields::empty(), |scratch| scratch.fields)
    }

    /// Dispatch directional lights affecting `mask`, in the given order,
    /// starting at slot 0. Returns the number of slots used.
    pub fn dispatch_directional(
        &mut self,
        device: &mut dyn RenderDevice,
        lights: &[&Light],
        mask: u32,
        camera: &Camera,
    ) -> usize {
        let mut count = 0;
        for light in lights.iter().filter(|light| light.affects(mask)) {
            if count >= self.max_slots {
                log::debug!("light {:?} dropped: all {} slots used", light.id, self.max_slots);
                continue;
            }
            let shadow = light.shadow.as_ref().filter(|_| self.shadows);
            let scratch = self.begin_slot(count, light);
            write_directional(scratch, light, shadow, camera);
            self.upload(device, count);
            count += 1;
        }
        count
    }

    /// Dispatch omni then spot lights affecting `mask`, continuing at slot
    /// `start`. Returns the total number of slots used.
    pub fn dispatch_local(
        &mut self,
        device: &mut dyn RenderDevice,
        lights: &SortedLights<'_>,
        mask: u32,
        start: usize,
    ) -> usize {
        let mut count = start;
        for light in lights.omni.iter().chain(&lights.spot).filter(|light| light.affects(mask)) {
            if count >= self.max_slots {
                log::debug!("light {:?} dropped: all {} slots used", light.id, self.max_slots);
                continue;
            }
            let shadow = light.shadow.as_ref().filter(|_| self.shadows);
            let cookie = light.cookie.as_ref().filter(|_| self.cookies);
            let scratch = self.begin_slot(count, light);
            match light.kind {
                LightKind::Omni => write_omni(scratch, light, shadow, cookie),
                LightKind::Spot => write_spot(scratch, light, shadow, cookie),
                LightKind::Directional => {}
            }
            self.upload(device, count);
            count += 1;
        }
        count
    }

    fn begin_slot(&mut self, index: usize, light: &Light) -> &mut SlotScratch {
        while self.names.len() <= index {
            self.names.push(LightUniformNames::new(self.names.len()));
        }
        let scratch = &mut self.slots[index];
        scratch.reset();
        scratch.data.color = light.color.extend(1.0);
        scratch
    }

    fn upload(&self, device: &mut dyn RenderDevice, index: usize) {
        let scratch = &self.slots[index];
        let names = &self.names[index];
        let slot = &scratch.data;
        let fields = scratch.fields;

        device.set_uniform(&names.color, UniformValue::Vec3(slot.color.truncate()));

        if fields.contains(SlotFields::DIRECTION) {
            device.set_uniform(&names.direction, UniformValue::Vec3(slot.direction.truncate()));
        }
        if fields.contains(SlotFields::POSITION) {
            device.set_uniform(&names.position, UniformValue::Vec3(slot.position.truncate()));
        }
        if fields.contains(SlotFields::AREA) {
            device.set_uniform(&names.half_width, UniformValue::Vec3(slot.half_width.truncate()));
            device.set_uniform(&names.half_height, UniformValue::Vec3(slot.half_height.truncate()));
        }
        if fields.contains(SlotFields::RADIUS) {
            device.set_uniform(&names.radius, UniformValue::Float(slot.attenuation.x));
        }
        if fields.contains(SlotFields::CONE) {
            device.set_uniform(&names.inner_cone_angle, UniformValue::Float(slot.attenuation.y));
            device.set_uniform(&names.outer_cone_angle, UniformValue::Float(slot.attenuation.z));
        }
        if fields.contains(SlotFields::SHADOW) {
            if let Some(shadow_map) = scratch.shadow_map {
                device.set_uniform(&names.shadow_map, UniformValue::Texture(shadow_map));
            }
            device.set_uniform(&names.shadow_params, UniformValue::Vec4(slot.shadow_params));
            device.set_uniform(&names.shadow_intensity, UniformValue::Float(slot.shadow.x));
            device.set_uniform(&names.camera_params, UniformValue::Vec4(slot.camera_params));
        }
        if fields.contains(SlotFields::SEARCH_AREA) {
            device.set_uniform(&names.shadow_search_area, UniformValue::Float(slot.shadow.y));
        }
        if fields.contains(SlotFields::SHADOW_MATRIX) {
            device.set_uniform(&names.shadow_matrix, UniformValue::Mat4(slot.shadow_matrix));
        }
        if fields.contains(SlotFields::CASCADES) {
            device.set_uniform(
                &names.shadow_matrix_palette,
                UniformValue::Mat4Array(slot.shadow_palette.to_vec()),
            );
            device.set_uniform(
                &names.shadow_cascade_distances,
                UniformValue::FloatArray(slot.cascade_distances.to_array().to_vec()),
            );
            device.set_uniform(&names.shadow_cascade_count, UniformValue::Float(slot.shadow.z));
            device.set_uniform(&names.shadow_cascade_blend, UniformValue::Float(slot.shadow.w));
            device.set_uniform(&names.soft_shadow_params, UniformValue::Vec4(slot.soft_shadow_params));
        }
        if fields.contains(SlotFields::COOKIE) {
            if let Some(cookie) = scratch.cookie {
                device.set_uniform(&names.cookie, UniformValue::Texture(cookie));
            }
            device.set_uniform(&names.cookie_intensity, UniformValue::Float(slot.cookie.x));
        }
        if fields.contains(SlotFields::COOKIE_TRANSFORM) {
            device.set_uniform(&names.cookie_matrix, UniformValue::Vec4(slot.cookie_transform));
            device.set_uniform(
                &names.cookie_offset,
                UniformValue::Vec2(Vec2::new(slot.cookie.y, slot.cookie.z)),
            );
        }
    }
}

fn write_directional(
    scratch: &mut SlotScratch,
    light: &Light,
    shadow: Option<&ShadowData>,
    camera: &Camera,
) {
    let slot = &mut scratch.data;
    let direction = light.direction();
    slot.direction = direction.extend(0.0);
    scratch.fields |= SlotFields::DIRECTION;

    // area directional lights are approximated by a light at the far clip
    if light.is_area() {
        let far = camera.far;
        let (half_width, half_height) = light.half_extents();
        slot.position = (camera.position - direction * far).extend(1.0);
        slot.half_width = (half_width * far).extend(0.0);
        slot.half_height = (half_height * far).extend(0.0);
        scratch.fields |= SlotFields::POSITION | SlotFields::AREA;
    }

    if let Some(shadow) = shadow {
        let cascades = shadow.cascades.unwrap_or(CascadeData {
            palette: [shadow.shadow_matrix; MAX_SHADOW_CASCADES],
            ..CascadeData::default()
        });

        scratch.shadow_map = Some(shadow.shadow_map);
        slot.shadow_matrix = shadow.shadow_matrix;
        slot.shadow_palette = cascades.palette;
        slot.cascade_distances = cascades.distances;
        slot.shadow = Vec4::new(
            shadow.intensity,
            0.0,
            cascades.count as f32,
            1.0 - cascades.blend,
        );
        slot.soft_shadow_params = shadow.soft_shadow_params;
        slot.camera_params = Vec4::new(0.0, shadow.far, shadow.near, 1.0);
        slot.shadow_params = Vec4::new(shadow.resolution, shadow.normal_bias, shadow.bias, 0.0);
        scratch.fields |= SlotFields::SHADOW | SlotFields::SHADOW_MATRIX | SlotFields::CASCADES;

        if shadow.target_width > 0.0 {
            slot.shadow.y =
                shadow.penumbra_size / shadow.target_width * shadow.projection_compensation;
            scratch.fields |= SlotFields::SEARCH_AREA;
        }
    }
}

fn write_local_common(scratch: &mut SlotScratch, light: &Light, shadow: Option<&ShadowData>) {
    let slot = &mut scratch.data;
    slot.attenuation.x = light.range;
    slot.position = light.position().extend(1.0);
    scratch.fields |= SlotFields::RADIUS | SlotFields::POSITION;

    if light.is_area() {
        let (half_width, half_height) = light.half_extents();
        slot.half_width = half_width.extend(0.0);
        slot.half_height = half_height.extend(0.0);
        scratch.fields |= SlotFields::AREA;
    }

    if let Some(shadow) = shadow {
        scratch.shadow_map = Some(shadow.shadow_map);
        let inverse_range = if light.range > 0.0 { 1.0 / light.range } else { 0.0 };
        slot.shadow_params = Vec4::new(shadow.resolution, shadow.normal_bias, shadow.bias, inverse_range);
        slot.shadow.x = shadow.intensity;
        slot.camera_params = Vec4::new(0.0, shadow.far, shadow.near, 0.0);
        scratch.fields |= SlotFields::SHADOW;

        if shadow.target_width > 0.0 {
            slot.shadow.y = shadow.penumbra_size / shadow.target_width;
            scratch.fields |= SlotFields::SEARCH_AREA;
        }
    }
}

fn write_omni(
    scratch: &mut SlotScratch,
    light: &Light,
    shadow: Option<&ShadowData>,
    cookie: Option<&Cookie>,
) {
    write_local_common(scratch, light, shadow);

    if let Some(cookie) = cookie {
        // omni cookies are sampled with the light transform
        scratch.cookie = Some(cookie.texture);
        scratch.data.shadow_matrix = light.world_transform;
        scratch.data.cookie.x = cookie.intensity;
        scratch.fields |= SlotFields::COOKIE | SlotFields::SHADOW_MATRIX;
    }
}

fn write_spot(
    scratch: &mut SlotScratch,
    light: &Light,
    shadow: Option<&ShadowData>,
    cookie: Option<&Cookie>,
) {
    write_local_common(scratch, light, shadow);

    let slot = &mut scratch.data;
    slot.attenuation.y = light.inner_cone_angle.to_radians().cos();
    slot.attenuation.z = light.outer_cone_angle.to_radians().cos();
    slot.direction = light.direction().extend(0.0);
    scratch.fields |= SlotFields::CONE | SlotFields::DIRECTION;

    if let Some(shadow) = shadow {
        slot.shadow_matrix = shadow.shadow_matrix;
        scratch.fields |= SlotFields::SHADOW_MATRIX;

        if scratch.fields.contains(SlotFields::SEARCH_AREA) {
            let fov = shadow.fov.to_radians();
            slot.shadow.y *= 1.0 / (fov / 2.0).tan();
        }
    }

    if let Some(cookie) = cookie {
        if shadow.is_none() {
            slot.shadow_matrix = spot_cookie_matrix(light);
            scratch.fields |= SlotFields::SHADOW_MATRIX;
        }
        scratch.cookie = Some(cookie.texture);
        slot.cookie.x = cookie.intensity;
        scratch.fields |= SlotFields::COOKIE;

        if let Some(transform) = cookie.transform {
            slot.cookie_transform = transform;
            slot.cookie.y = cookie.offset.x;
            slot.cookie.z = cookie.offset.y;
            scratch.fields |= SlotFields::COOKIE_TRANSFORM;
        }
    }
}

/// Upload ambient and skybox constants.
///
/// Under physical units the ambient color is scaled by the ambient
/// luminance and the skybox uses its luminance instead of its intensity.
pub fn dispatch_global_lights(
    device: &mut dyn RenderDevice,
    settings: &SceneSettings,
    physical_units: bool,
) {
    let (ambient, skybox) = if physical_units {
        (
            settings.ambient_color * settings.ambient_luminance,
            settings.skybox_luminance,
        )
    } else {
        (settings.ambient_color, settings.skybox_intensity)
    };
    device.set_uniform("light_globalAmbient", UniformValue::Vec3(ambient));
    device.set_uniform("skyboxIntensity", UniformValue::Float(skybox));
}
