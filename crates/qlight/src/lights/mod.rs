// lights — light definitions and the per-compile light set

pub mod area;
pub mod entities;
pub mod envelope;

use bitflags::bitflags;
use qlight_common::q_shared::{CPlane, Vec3, VEC3_ORIGIN};

pub use envelope::TraceLights;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct LightFlags: u32 {
        const ATTEN_LINEAR   = 0x0001;
        const ATTEN_ANGLE    = 0x0002;
        const ATTEN_DISTANCE = 0x0004;
        const TWOSIDED       = 0x0008;
        const GRID           = 0x0010;
        const SURFACES       = 0x0020;
        const DARK           = 0x0040;
        /// Envelope solved from the falloff tolerance.
        const FAST           = 0x0100;
        /// Fast for this compile only (global fast option).
        const FAST_TEMP      = 0x0200;
        const NEGATIVE       = 0x0400;
        const UNNORMALIZED   = 0x0800;

        const FAST_ACTUAL = Self::FAST.bits() | Self::FAST_TEMP.bits();
        const SUN_DEFAULT = Self::ATTEN_ANGLE.bits() | Self::GRID.bits() | Self::SURFACES.bits();
        const AREA_DEFAULT = Self::ATTEN_ANGLE.bits() | Self::ATTEN_DISTANCE.bits()
            | Self::GRID.bits() | Self::SURFACES.bits();
        const Q3A_DEFAULT = Self::ATTEN_ANGLE.bits() | Self::ATTEN_DISTANCE.bits()
            | Self::GRID.bits() | Self::SURFACES.bits() | Self::FAST.bits();
        const WOLF_DEFAULT = Self::ATTEN_LINEAR.bits() | Self::ATTEN_DISTANCE.bits()
            | Self::GRID.bits() | Self::SURFACES.bits() | Self::FAST.bits();
    }
}

/// Per-type data. The shared fields live on `Light`.
#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    Point,
    /// Cone along `Light::normal`.
    Spot { radius_by_dist: f32 },
    /// Emitting polygon, clockwise seen from the lit side.
    Area { winding: Vec<Vec3>, plane: CPlane },
    /// `Light::origin` is the direction to the sun scaled out of the world.
    Sun,
}

impl LightKind {
    pub fn type_num(&self) -> i32 {
        match self {
            LightKind::Point => 0,
            LightKind::Area { .. } => 1,
            LightKind::Spot { .. } => 2,
            LightKind::Sun => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub flags: LightFlags,
    pub origin: Vec3,
    /// Spot axis, area plane normal, or the direction sunlight travels.
    pub normal: Vec3,
    pub color: Vec3,
    pub photons: f32,
    /// Area lights: form factor scale.
    pub add: f32,
    pub style: u8,
    pub fade: f32,
    pub angle_scale: f32,
    pub extra_dist: f32,
    pub filter_radius: f32,
    pub falloff_tolerance: f32,
    /// Set by the envelope solver.
    pub envelope: f32,
    pub envelope2: f32,
    pub cluster: i32,
    pub mins: Vec3,
    pub maxs: Vec3,
}

impl Light {
    pub fn new(kind: LightKind, flags: LightFlags) -> Self {
        Self {
            kind,
            flags,
            origin: VEC3_ORIGIN,
            normal: VEC3_ORIGIN,
            color: [1.0, 1.0, 1.0],
            photons: 0.0,
            add: 0.0,
            style: 0,
            fade: 1.0,
            angle_scale: 0.0,
            extra_dist: 0.0,
            filter_radius: 0.0,
            falloff_tolerance: 1.0,
            envelope: 0.0,
            envelope2: 0.0,
            cluster: -1,
            mins: VEC3_ORIGIN,
            maxs: VEC3_ORIGIN,
        }
    }

    pub fn is_sun(&self) -> bool {
        matches!(self.kind, LightKind::Sun)
    }

    pub fn is_negative(&self) -> bool {
        self.flags.contains(LightFlags::NEGATIVE)
    }

    pub fn is_fast(&self) -> bool {
        self.flags.intersects(LightFlags::FAST_ACTUAL)
    }
}

/// Every light of the compile. Built before illumination, read-only while
/// workers run.
#[derive(Debug, Clone, Default)]
pub struct LightSet {
    pub lights: Vec<Light>,
    pub num_point: usize,
    pub num_spot: usize,
    pub num_sun: usize,
    pub num_area: usize,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn push(&mut self, light: Light) {
        match light.kind {
            LightKind::Point => self.num_point += 1,
            LightKind::Spot { .. } => self.num_spot += 1,
            LightKind::Area { .. } => self.num_area += 1,
            LightKind::Sun => self.num_sun += 1,
        }
        self.lights.push(light);
    }

    /// Styles used by any light, sorted, style 0 first.
    pub fn styles(&self) -> Vec<u8> {
        let mut styles: Vec<u8> = self.lights.iter().map(|l| l.style).collect();
        styles.sort_unstable();
        styles.dedup();
        styles
    }
}
