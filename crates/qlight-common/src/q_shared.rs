// q_shared.rs — shared math, plane and content definitions for the light compiler

pub type Vec3 = [f32; 3];
pub type Vec2 = [f32; 2];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

// ============================================================
// World limits
// ============================================================

/// Largest coordinate a map may use on any axis.
pub const MAX_WORLD_COORD: f32 = 65536.0;

/// Distance used to push sun origins "to infinity".
pub const SUN_DISTANCE: f32 = MAX_WORLD_COORD * 8.0;

pub const Q_PI: f32 = std::f32::consts::PI;

// ============================================================
// Error codes
// ============================================================

pub const ERR_FATAL: i32 = 0;
pub const ERR_DROP: i32 = 1;

// ============================================================
// Contents flags
// ============================================================

pub const CONTENTS_SOLID: i32 = 1;
pub const CONTENTS_LAVA: i32 = 8;
pub const CONTENTS_SLIME: i32 = 16;

/// Brush contents that stop light.
pub const MASK_OPAQUE: i32 = CONTENTS_SOLID | CONTENTS_SLIME | CONTENTS_LAVA;

// ============================================================
// Plane
// ============================================================

pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;
pub const PLANE_ANYX: u8 = 3;
pub const PLANE_ANYY: u8 = 4;
pub const PLANE_ANYZ: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: u8,
    pub signbits: u8,
}

impl Default for CPlane {
    fn default() -> Self {
        Self {
            normal: [0.0; 3],
            dist: 0.0,
            plane_type: 0,
            signbits: 0,
        }
    }
}

impl CPlane {
    /// Build a plane and classify it for the axial fast paths.
    pub fn new(normal: Vec3, dist: f32) -> Self {
        let mut signbits: u8 = 0;
        for j in 0..3 {
            if normal[j] < 0.0 {
                signbits |= 1 << j;
            }
        }
        Self {
            normal,
            dist,
            plane_type: plane_type_for_normal(&normal),
            signbits,
        }
    }

    /// Signed distance of `p` from the plane.
    #[inline]
    pub fn distance_to(&self, p: &Vec3) -> f32 {
        if self.plane_type < 3 {
            p[self.plane_type as usize] - self.dist
        } else {
            dot_product(&self.normal, p) - self.dist
        }
    }
}

pub fn plane_type_for_normal(normal: &Vec3) -> u8 {
    if normal[0] == 1.0 || normal[0] == -1.0 {
        return PLANE_X;
    }
    if normal[1] == 1.0 || normal[1] == -1.0 {
        return PLANE_Y;
    }
    if normal[2] == 1.0 || normal[2] == -1.0 {
        return PLANE_Z;
    }

    let ax = normal[0].abs();
    let ay = normal[1].abs();
    let az = normal[2].abs();
    if ax >= ay && ax >= az {
        PLANE_ANYX
    } else if ay >= ax && ay >= az {
        PLANE_ANYY
    } else {
        PLANE_ANYZ
    }
}

/// Plane through three points. Points wind clockwise when seen from the
/// front. Returns `None` for collinear input.
pub fn plane_from_points(p0: &Vec3, p1: &Vec3, p2: &Vec3) -> Option<CPlane> {
    let d1 = vector_subtract(p0, p1);
    let d2 = vector_subtract(p2, p1);
    let mut normal = cross_product(&d1, &d2);
    if vector_normalize(&mut normal) == 0.0 {
        return None;
    }
    let dist = dot_product(p0, &normal);
    Some(CPlane::new(normal, dist))
}

// ============================================================
// MATHLIB — Vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_add_to(a: &Vec3, out: &mut Vec3) {
    out[0] += a[0];
    out[1] += a[1];
    out[2] += a[2];
}

#[inline]
pub fn vector_negate(v: &Vec3) -> Vec3 {
    [-v[0], -v[1], -v[2]]
}

/// veca + scale * vecb
#[inline]
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

/// Normalize in place, returns original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

#[inline]
pub fn vector_length(v: &Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

pub fn vector_lerp(a: &Vec3, b: &Vec3, frac: f32) -> Vec3 {
    [
        a[0] + frac * (b[0] - a[0]),
        a[1] + frac * (b[1] - a[1]),
        a[2] + frac * (b[2] - a[2]),
    ]
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

/// Largest component, used for color normalization.
#[inline]
pub fn vector_max(v: &Vec3) -> f32 {
    v[0].max(v[1]).max(v[2])
}

/// Scale a color so its largest channel is 1. Returns the old maximum.
pub fn color_normalize(color: &mut Vec3) -> f32 {
    let max = vector_max(color);
    if max == 0.0 {
        *color = [1.0, 1.0, 1.0];
        return 0.0;
    }
    let scale = 1.0 / max;
    color[0] *= scale;
    color[1] *= scale;
    color[2] *= scale;
    max
}

// ============================================================
// Bounds
// ============================================================

pub fn clear_bounds(mins: &mut Vec3, maxs: &mut Vec3) {
    *mins = [99999.0; 3];
    *maxs = [-99999.0; 3];
}

pub fn add_point_to_bounds(v: &Vec3, mins: &mut Vec3, maxs: &mut Vec3) {
    for i in 0..3 {
        if v[i] < mins[i] {
            mins[i] = v[i];
        }
        if v[i] > maxs[i] {
            maxs[i] = v[i];
        }
    }
}

/// Returns 1 (front), 2 (back), or 3 (crossing) for a box vs. plane test.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &CPlane) -> i32 {
    // fast axial cases
    if (p.plane_type as usize) < 3 {
        let t = p.plane_type as usize;
        if p.dist <= emins[t] {
            return 1;
        }
        if p.dist >= emaxs[t] {
            return 2;
        }
        return 3;
    }

    // general case: pick the nearest and farthest corners from the sign bits
    let mut near = [0.0f32; 3];
    let mut far = [0.0f32; 3];
    for i in 0..3 {
        if p.signbits & (1 << i) != 0 {
            far[i] = emins[i];
            near[i] = emaxs[i];
        } else {
            far[i] = emaxs[i];
            near[i] = emins[i];
        }
    }
    let dist1 = dot_product(&p.normal, &far);
    let dist2 = dot_product(&p.normal, &near);

    let mut sides = 0;
    if dist1 >= p.dist {
        sides = 1;
    }
    if dist2 < p.dist {
        sides |= 2;
    }
    sides
}

/// Build a right/up pair perpendicular to `forward`.
pub fn make_normal_vectors(forward: &Vec3) -> (Vec3, Vec3) {
    // this rotate and negate guarantees a vector not colinear with the original
    let mut right = [forward[2], -forward[0], forward[1]];
    let d = dot_product(&right, forward);
    right = vector_ma(&right, -d, forward);
    vector_normalize(&mut right);
    let up = cross_product(&right, forward);
    (right, up)
}

/// Tangent frame used by the hemisphere samplers. Normals aligned with the
/// world up axis get a fixed frame so results do not depend on rounding.
pub fn tangent_frame(normal: &Vec3) -> (Vec3, Vec3) {
    if normal[0] == 0.0 && normal[1] == 0.0 {
        if normal[2] == 1.0 {
            return ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        }
        if normal[2] == -1.0 {
            return ([-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        }
    }
    let world_up = [0.0, 0.0, 1.0];
    let mut right = cross_product(normal, &world_up);
    vector_normalize(&mut right);
    let mut up = cross_product(&right, normal);
    vector_normalize(&mut up);
    (right, up)
}

/// Walk 0, 1, -1, 2, -2, ... used by the nudge searches.
#[inline]
pub fn nudge_offset(step: i32) -> i32 {
    if step & 1 != 0 {
        (step + 1) >> 1
    } else {
        -(step >> 1)
    }
}

// ============================================================
// Angles and entity transforms
// ============================================================

pub const PITCH: usize = 0;
pub const YAW: usize = 1;
pub const ROLL: usize = 2;

/// Forward/right/up for a pitch/yaw/roll triple in degrees.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = angles[YAW].to_radians().sin_cos();
    let (sp, cp) = angles[PITCH].to_radians().sin_cos();
    let (sr, cr) = angles[ROLL].to_radians().sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + -cr * -sy,
        -sr * sp * sy + -cr * cy,
        -sr * cp,
    ];
    let up = [cr * sp * cy + -sr * -sy, cr * sp * sy + -sr * cy, cr * cp];
    (forward, right, up)
}

/// Model-to-world transform of a brush entity (origin, angles, modelscale).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityTransform {
    pub origin: Vec3,
    /// Rows are the world-space images of the model x, y and z axes.
    pub axis: [Vec3; 3],
    pub scale: Vec3,
}

impl Default for EntityTransform {
    fn default() -> Self {
        Self {
            origin: VEC3_ORIGIN,
            axis: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            scale: [1.0; 3],
        }
    }
}

impl EntityTransform {
    pub fn new(origin: Vec3, angles: Vec3, scale: Vec3) -> Self {
        if angles == VEC3_ORIGIN {
            return Self { origin, scale, ..Default::default() };
        }
        let (forward, right, up) = angle_vectors(&angles);
        Self {
            origin,
            axis: [forward, vector_negate(&right), up],
            scale,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    pub fn transform_point(&self, p: &Vec3) -> Vec3 {
        let s = [p[0] * self.scale[0], p[1] * self.scale[1], p[2] * self.scale[2]];
        let mut out = self.origin;
        for i in 0..3 {
            out = vector_ma(&out, s[i], &self.axis[i]);
        }
        out
    }

    /// Rotate a normal. Non-uniform scale is applied inversely and the
    /// result renormalized.
    pub fn transform_normal(&self, n: &Vec3) -> Vec3 {
        let s = [n[0] / self.scale[0], n[1] / self.scale[1], n[2] / self.scale[2]];
        let mut out = VEC3_ORIGIN;
        for i in 0..3 {
            out = vector_ma(&out, s[i], &self.axis[i]);
        }
        vector_normalize(&mut out);
        out
    }
}

// ============================================================
// Tests
// ============================================================
