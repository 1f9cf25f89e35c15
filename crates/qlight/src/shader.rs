// shader.rs — material properties the baker reads (opacity, emission, overrides)

use bitflags::bitflags;
use qlight_common::q_shared::{Vec2, Vec3};

bitflags! {
    /// Compile-time surface properties.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CompileFlags: u32 {
        const SOLID       = 0x0001;
        const TRANSLUCENT = 0x0002;
        /// Alpha channel of the image modulates shadows.
        const ALPHASHADOW = 0x0004;
        /// RGB of the image filters light passing through.
        const LIGHTFILTER = 0x0008;
        const SKY         = 0x0010;
        const NODRAW      = 0x0020;
        const NODIRT      = 0x0040;
        /// Surface has no lightmap stage; lit per vertex.
        const VERTEXLIT   = 0x0080;
    }
}

/// RGBA image used for light filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[u8; 4]>,
}

impl LightImage {
    /// Texel under `st`, wrapping both coordinates into [0, 1).
    pub fn texel(&self, st: &Vec2) -> [u8; 4] {
        if self.width == 0 || self.height == 0 || self.pixels.is_empty() {
            return [255; 4];
        }
        let s = st[0] - st[0].floor();
        let t = st[1] - st[1].floor();
        let x = ((s * self.width as f32) as usize) % self.width;
        let y = ((t * self.height as f32) as usize) % self.height;
        self.pixels.get(y * self.width + x).copied().unwrap_or([255; 4])
    }
}

/// Sky sun parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunDef {
    /// Direction toward the sun.
    pub direction: Vec3,
    pub color: Vec3,
    pub photons: f32,
    /// Cone half-angle in radians.
    pub deviance: f32,
    pub num_samples: usize,
    pub style: u8,
}

/// Per-shader floodlight override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloodlightDef {
    pub color: Vec3,
    pub distance: f32,
    pub intensity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderInfo {
    pub name: String,
    pub compile_flags: CompileFlags,
    /// Emitted light per unit area, 0 for non-emitters.
    pub surface_light: f32,
    pub light_color: Vec3,
    pub light_style: u8,
    pub light_filter_radius: f32,
    /// Emitters with longer edges are split into smaller area lights.
    pub light_subdivide: f32,
    /// Emits from both faces, receives on both faces.
    pub two_sided: bool,
    pub light_image: Option<LightImage>,
    /// Albedo used for bounce reflection.
    pub average_color: Vec3,
    pub bounce_scale: f32,
    pub suns: Vec<SunDef>,
    pub floodlight: Option<FloodlightDef>,
    pub min_light: Vec3,
    pub ambient: Vec3,
    /// Overrides the surface sample size when non-zero.
    pub sample_size: i32,
    /// Overrides the global sample offset when non-zero.
    pub sample_offset: f32,
}

impl Default for ShaderInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            compile_flags: CompileFlags::SOLID,
            surface_light: 0.0,
            light_color: [1.0, 1.0, 1.0],
            light_style: 0,
            light_filter_radius: 0.0,
            light_subdivide: 999.0,
            two_sided: false,
            light_image: None,
            average_color: [1.0, 1.0, 1.0],
            bounce_scale: 1.0,
            suns: Vec::new(),
            floodlight: None,
            min_light: [0.0; 3],
            ambient: [0.0; 3],
            sample_size: 0,
            sample_offset: 0.0,
        }
    }
}

impl ShaderInfo {
    pub fn named(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    pub fn is_sky(&self) -> bool {
        self.compile_flags.contains(CompileFlags::SKY)
    }

    /// Shadows through this surface are tinted rather than blocked.
    pub fn filters_light(&self) -> bool {
        self.light_image.is_some()
            && self.compile_flags.intersects(CompileFlags::ALPHASHADOW | CompileFlags::LIGHTFILTER)
    }

    /// Does this surface go into the trace geometry at all.
    pub fn casts_trace_shadows(&self) -> bool {
        if self.compile_flags.contains(CompileFlags::NODRAW) && !self.is_sky() {
            return false;
        }
        if self.compile_flags.contains(CompileFlags::TRANSLUCENT)
            && !self.compile_flags.intersects(CompileFlags::ALPHASHADOW | CompileFlags::LIGHTFILTER)
        {
            return false;
        }
        true
    }

    pub fn is_vertex_lit(&self) -> bool {
        self.compile_flags.contains(CompileFlags::VERTEXLIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texel_wraps() {
        let image = LightImage {
            width: 2,
            height: 1,
            pixels: vec![[10, 20, 30, 40], [50, 60, 70, 80]],
        };
        assert_eq!(image.texel(&[0.25, 0.0]), [10, 20, 30, 40]);
        assert_eq!(image.texel(&[0.75, 0.0]), [50, 60, 70, 80]);
        assert_eq!(image.texel(&[-0.25, 3.5]), [50, 60, 70, 80]);
    }

    #[test]
    fn test_trace_participation() {
        let mut s = ShaderInfo::named("glass");
        s.compile_flags = CompileFlags::TRANSLUCENT;
        assert!(!s.casts_trace_shadows());
        s.compile_flags |= CompileFlags::LIGHTFILTER;
        assert!(s.casts_trace_shadows());
        assert!(!s.filters_light());
        s.light_image = Some(LightImage::default());
        assert!(s.filters_light());

        let mut sky = ShaderInfo::named("sky");
        sky.compile_flags = CompileFlags::SKY | CompileFlags::NODRAW;
        assert!(sky.casts_trace_shadows());
    }
}
