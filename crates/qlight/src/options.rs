// options.rs — compile options, console variable binding and worldspawn overrides

use qlight_common::common::com_dprintf;
use qlight_common::cvar::{CvarContext, CVAR_ARCHIVE};
use qlight_common::entities::Entity;
use qlight_common::q_shared::Vec3;
use qlight_common::qfiles::DEFAULT_LIGHTMAP_SAMPLE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleMode {
    /// Fixed sub-grid for every mapped luxel.
    Ordered,
    /// Recursive 2x2 stamp subdivision on shadow edges.
    #[default]
    Adaptive,
    /// Gaussian-like jitter around the luxel.
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtMode {
    #[default]
    Ordered,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeluxeMode {
    #[default]
    Modelspace,
    Tangentspace,
}

/// Diagnostic colors that replace lighting in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    #[default]
    None,
    Normals,
    Axis,
    Cluster,
    Origin,
    Deluxe,
}

#[derive(Debug, Clone)]
pub struct LightOptions {
    // scales
    pub point_scale: f32,
    pub spot_scale: f32,
    pub area_scale: f32,
    pub sky_scale: f32,
    pub bounce_scale: f32,
    pub vertex_scale: f32,
    pub linear_scale: f32,
    pub falloff_tolerance: f32,
    pub extra_dist: f32,

    // output transform
    pub gamma: f32,
    pub compensate: f32,
    pub exposure: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub lightmap_srgb: bool,
    pub color_srgb: bool,

    // sampling
    pub sample_mode: SampleMode,
    pub samples: i32,
    pub samples_search_box: f32,
    pub filter_radius: f32,
    pub sample_offset: f32,
    pub subdivide_threshold: f32,
    pub sample_size: i32,
    pub lightmap_scale: f32,
    pub max_lightmap_size: usize,
    pub patch_subdivisions: usize,

    // dirt
    pub dirty: bool,
    pub dirt_depth: f32,
    pub dirt_scale: f32,
    pub dirt_gain: f32,
    pub dirt_mode: DirtMode,

    // floodlight
    pub floodlight: bool,
    pub floodlight_color: Vec3,
    pub floodlight_distance: f32,
    pub floodlight_intensity: f32,

    // bounce
    pub bounce: usize,
    pub bounce_color_ratio: f32,
    pub bounce_subdivide: f32,
    pub fast_bounce: bool,

    pub ambient_color: Vec3,
    pub min_light: Vec3,

    pub half_lambert: bool,
    pub fast: bool,
    pub faster: bool,
    pub wolf: bool,
    pub deluxemap: bool,
    pub deluxe_mode: DeluxeMode,
    pub debug: DebugMode,
    pub grid: bool,
    pub grid_size: Vec3,
    pub splotch_fix: bool,
    /// Also light the dark side of planar lightmaps (no plane culling).
    pub dark: bool,
    pub seed: u64,
    pub threads: usize,
    pub developer: bool,
}

impl Default for LightOptions {
    fn default() -> Self {
        Self {
            point_scale: 7500.0,
            spot_scale: 7500.0,
            area_scale: 0.25,
            sky_scale: 1.0,
            bounce_scale: 0.25,
            vertex_scale: 1.0,
            linear_scale: 1.0 / 8000.0,
            falloff_tolerance: 1.0,
            extra_dist: 0.0,

            gamma: 1.0,
            compensate: 1.0,
            exposure: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            lightmap_srgb: false,
            color_srgb: false,

            sample_mode: SampleMode::Adaptive,
            samples: 1,
            samples_search_box: 1.0,
            filter_radius: 0.0,
            sample_offset: 1.0,
            subdivide_threshold: 1.0,
            sample_size: DEFAULT_LIGHTMAP_SAMPLE_SIZE,
            lightmap_scale: 1.0,
            max_lightmap_size: 128,
            patch_subdivisions: 4,

            dirty: false,
            dirt_depth: 128.0,
            dirt_scale: 1.0,
            dirt_gain: 1.0,
            dirt_mode: DirtMode::Ordered,

            floodlight: false,
            floodlight_color: [1.0, 1.0, 1.0],
            floodlight_distance: 1024.0,
            floodlight_intensity: 128.0,

            bounce: 0,
            bounce_color_ratio: 1.0,
            bounce_subdivide: 256.0,
            fast_bounce: false,

            ambient_color: [0.0; 3],
            min_light: [0.0; 3],

            half_lambert: false,
            fast: false,
            faster: false,
            wolf: false,
            deluxemap: false,
            deluxe_mode: DeluxeMode::Modelspace,
            debug: DebugMode::None,
            grid: true,
            grid_size: [64.0, 64.0, 128.0],
            splotch_fix: false,
            dark: false,
            seed: 0,
            threads: 0,
            developer: false,
        }
    }
}

fn vec_string(v: &Vec3) -> String {
    format!("{} {} {}", v[0], v[1], v[2])
}

impl LightOptions {
    /// Seed `cvars` with every option at its default value.
    pub fn register_cvars(cvars: &mut CvarContext) {
        let d = LightOptions::default();
        let floats: [(&str, f32); 34] = [
            ("light_pointscale", d.point_scale),
            ("light_spotscale", d.spot_scale),
            ("light_areascale", d.area_scale),
            ("light_skyscale", d.sky_scale),
            ("light_bouncescale", d.bounce_scale),
            ("light_vertexscale", d.vertex_scale),
            ("light_linearscale", d.linear_scale),
            ("light_falloff", d.falloff_tolerance),
            ("light_extradist", d.extra_dist),
            ("light_gamma", d.gamma),
            ("light_compensate", d.compensate),
            ("light_exposure", d.exposure),
            ("light_contrast", d.contrast),
            ("light_saturation", d.saturation),
            ("light_samplemode", 1.0),
            ("light_samples", d.samples as f32),
            ("light_samplessearchbox", d.samples_search_box),
            ("light_filterradius", d.filter_radius),
            ("light_sampleoffset", d.sample_offset),
            ("light_subdivide", d.subdivide_threshold),
            ("light_samplesize", d.sample_size as f32),
            ("light_lightmapscale", d.lightmap_scale),
            ("light_maxlightmapsize", d.max_lightmap_size as f32),
            ("light_patchsubdivisions", d.patch_subdivisions as f32),
            ("light_dirtdepth", d.dirt_depth),
            ("light_dirtscale", d.dirt_scale),
            ("light_dirtgain", d.dirt_gain),
            ("light_floodlightdistance", d.floodlight_distance),
            ("light_floodlightintensity", d.floodlight_intensity),
            ("light_bounce", d.bounce as f32),
            ("light_bouncecolorratio", d.bounce_color_ratio),
            ("light_bouncesubdivide", d.bounce_subdivide),
            ("light_seed", d.seed as f32),
            ("light_threads", d.threads as f32),
        ];
        for (name, value) in floats {
            cvars.get(name, Some(&format!("{}", value)), CVAR_ARCHIVE);
        }

        let flags: [(&str, bool); 20] = [
            ("light_lightmapsrgb", d.lightmap_srgb),
            ("light_colorsrgb", d.color_srgb),
            ("light_dirty", d.dirty),
            ("light_dirtmode", false),
            ("light_floodlight", d.floodlight),
            ("light_fastbounce", d.fast_bounce),
            ("light_halflambert", d.half_lambert),
            ("light_fast", d.fast),
            ("light_faster", d.faster),
            ("light_wolf", d.wolf),
            ("light_deluxe", d.deluxemap),
            ("light_deluxemode", false),
            ("light_grid", d.grid),
            ("light_splotchfix", d.splotch_fix),
            ("light_dark", d.dark),
            ("developer", d.developer),
            ("light_debugnormals", false),
            ("light_debugaxis", false),
            ("light_debugcluster", false),
            ("light_debugorigin", false),
        ];
        for (name, value) in flags {
            cvars.get(name, Some(if value { "1" } else { "0" }), CVAR_ARCHIVE);
        }
        cvars.get("light_debugdeluxe", Some("0"), CVAR_ARCHIVE);

        let vectors: [(&str, Vec3); 4] = [
            ("light_ambient", d.ambient_color),
            ("light_minlight", d.min_light),
            ("light_floodlightcolor", d.floodlight_color),
            ("light_gridsize", d.grid_size),
        ];
        for (name, value) in vectors {
            cvars.get(name, Some(&vec_string(&value)), CVAR_ARCHIVE);
        }
    }

    /// Build options from `light_*` console variables; anything unset keeps
    /// its default.
    pub fn from_cvars(cvars: &CvarContext) -> Self {
        let d = LightOptions::default();
        let flag = |name: &str, default: bool| cvars.value_or(name, if default { 1.0 } else { 0.0 }) != 0.0;

        let sample_mode = match cvars.value_or("light_samplemode", 1.0) as i32 {
            0 => SampleMode::Ordered,
            2 => SampleMode::Random,
            _ => SampleMode::Adaptive,
        };

        let debug = if flag("light_debugnormals", false) {
            DebugMode::Normals
        } else if flag("light_debugaxis", false) {
            DebugMode::Axis
        } else if flag("light_debugcluster", false) {
            DebugMode::Cluster
        } else if flag("light_debugorigin", false) {
            DebugMode::Origin
        } else if flag("light_debugdeluxe", false) {
            DebugMode::Deluxe
        } else {
            DebugMode::None
        };

        let mut opts = Self {
            point_scale: cvars.value_or("light_pointscale", d.point_scale),
            spot_scale: cvars.value_or("light_spotscale", d.spot_scale),
            area_scale: cvars.value_or("light_areascale", d.area_scale),
            sky_scale: cvars.value_or("light_skyscale", d.sky_scale),
            bounce_scale: cvars.value_or("light_bouncescale", d.bounce_scale),
            vertex_scale: cvars.value_or("light_vertexscale", d.vertex_scale),
            linear_scale: cvars.value_or("light_linearscale", d.linear_scale),
            falloff_tolerance: cvars.value_or("light_falloff", d.falloff_tolerance),
            extra_dist: cvars.value_or("light_extradist", d.extra_dist),

            gamma: cvars.value_or("light_gamma", d.gamma),
            compensate: cvars.value_or("light_compensate", d.compensate),
            exposure: cvars.value_or("light_exposure", d.exposure),
            contrast: cvars.value_or("light_contrast", d.contrast),
            saturation: cvars.value_or("light_saturation", d.saturation),
            lightmap_srgb: flag("light_lightmapsrgb", d.lightmap_srgb),
            color_srgb: flag("light_colorsrgb", d.color_srgb),

            sample_mode,
            samples: cvars.value_or("light_samples", d.samples as f32) as i32,
            samples_search_box: cvars.value_or("light_samplessearchbox", d.samples_search_box),
            filter_radius: cvars.value_or("light_filterradius", d.filter_radius),
            sample_offset: cvars.value_or("light_sampleoffset", d.sample_offset),
            subdivide_threshold: cvars.value_or("light_subdivide", d.subdivide_threshold),
            sample_size: cvars.value_or("light_samplesize", d.sample_size as f32) as i32,
            lightmap_scale: cvars.value_or("light_lightmapscale", d.lightmap_scale),
            max_lightmap_size: cvars.value_or("light_maxlightmapsize", d.max_lightmap_size as f32) as usize,
            patch_subdivisions: cvars.value_or("light_patchsubdivisions", d.patch_subdivisions as f32) as usize,

            dirty: flag("light_dirty", d.dirty),
            dirt_depth: cvars.value_or("light_dirtdepth", d.dirt_depth),
            dirt_scale: cvars.value_or("light_dirtscale", d.dirt_scale),
            dirt_gain: cvars.value_or("light_dirtgain", d.dirt_gain),
            dirt_mode: if flag("light_dirtmode", false) { DirtMode::Random } else { DirtMode::Ordered },

            floodlight: flag("light_floodlight", d.floodlight),
            floodlight_color: cvars.vector_or("light_floodlightcolor", d.floodlight_color),
            floodlight_distance: cvars.value_or("light_floodlightdistance", d.floodlight_distance),
            floodlight_intensity: cvars.value_or("light_floodlightintensity", d.floodlight_intensity),

            bounce: cvars.value_or("light_bounce", 0.0).max(0.0) as usize,
            bounce_color_ratio: cvars.value_or("light_bouncecolorratio", d.bounce_color_ratio),
            bounce_subdivide: cvars.value_or("light_bouncesubdivide", d.bounce_subdivide),
            fast_bounce: flag("light_fastbounce", d.fast_bounce),

            ambient_color: cvars.vector_or("light_ambient", d.ambient_color),
            min_light: cvars.vector_or("light_minlight", d.min_light),

            half_lambert: flag("light_halflambert", d.half_lambert),
            fast: flag("light_fast", d.fast),
            faster: flag("light_faster", d.faster),
            wolf: flag("light_wolf", d.wolf),
            deluxemap: flag("light_deluxe", d.deluxemap),
            deluxe_mode: if flag("light_deluxemode", false) {
                DeluxeMode::Tangentspace
            } else {
                DeluxeMode::Modelspace
            },
            debug,
            grid: flag("light_grid", d.grid),
            grid_size: cvars.vector_or("light_gridsize", d.grid_size),
            splotch_fix: flag("light_splotchfix", d.splotch_fix),
            dark: flag("light_dark", d.dark),
            seed: cvars.value_or("light_seed", 0.0).max(0.0) as u64,
            threads: cvars.value_or("light_threads", 0.0).max(0.0) as usize,
            developer: flag("developer", d.developer),
        };
        opts.sanitize();
        opts
    }

    /// Clamp values that would break the baker.
    pub fn sanitize(&mut self) {
        self.samples = self.samples.max(1);
        if self.sample_size < 1 {
            self.sample_size = 1;
        }
        if self.lightmap_scale <= 0.0 {
            self.lightmap_scale = 1.0;
        }
        if self.max_lightmap_size < 2 {
            self.max_lightmap_size = 2;
        }
        if self.subdivide_threshold <= 0.0 {
            self.subdivide_threshold = 1.0;
        }
        if self.gamma <= 0.0 {
            self.gamma = 1.0;
        }
        if self.compensate <= 0.0 {
            self.compensate = 1.0;
        }
        if self.falloff_tolerance < 0.0 {
            self.falloff_tolerance = 0.0;
        }
        if self.dirt_depth < 1.0 {
            self.dirt_depth = 1.0;
        }
        if self.dirt_gain <= 0.0 {
            self.dirt_gain = 1.0;
        }
        for axis in self.grid_size.iter_mut() {
            if *axis < 8.0 {
                *axis = 8.0;
            }
        }
        self.patch_subdivisions = self.patch_subdivisions.clamp(1, 32);
        if self.bounce > 0 && self.bounce_subdivide < 16.0 {
            com_dprintf("bounce subdivide raised to 16\n");
            self.bounce_subdivide = 16.0;
        }
    }

    /// Per-map overrides from the worldspawn entity.
    pub fn apply_worldspawn(&mut self, world: &Entity) {
        if let Some(v) = world.first_of(&["_ambient", "ambient"]) {
            let ambient = v.trim().parse::<f32>().unwrap_or(0.0);
            let mut color = [1.0; 3];
            if world.has_key("_color") {
                color = world.vector_for_key("_color");
                qlight_common::q_shared::color_normalize(&mut color);
            }
            self.ambient_color = [color[0] * ambient, color[1] * ambient, color[2] * ambient];
        }
        if let Some(v) = world.first_of(&["_minlight", "minlight"]) {
            let minlight = v.trim().parse::<f32>().unwrap_or(0.0);
            self.min_light = [minlight; 3];
        }
        if let Some(v) = world.get("_floodlight") {
            let parts: Vec<f32> = v.split_whitespace().filter_map(|p| p.parse().ok()).collect();
            if parts.len() >= 3 {
                self.floodlight = true;
                self.floodlight_color = [parts[0], parts[1], parts[2]];
                qlight_common::q_shared::color_normalize(&mut self.floodlight_color);
                if let Some(&d) = parts.get(3) {
                    self.floodlight_distance = d;
                }
                if let Some(&i) = parts.get(4) {
                    self.floodlight_intensity = i;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_load_matches_defaults() {
        let mut cvars = CvarContext::new();
        LightOptions::register_cvars(&mut cvars);
        let opts = LightOptions::from_cvars(&cvars);
        let d = LightOptions::default();
        assert_eq!(opts.point_scale, d.point_scale);
        assert!((opts.linear_scale - d.linear_scale).abs() < 1e-9);
        assert_eq!(opts.sample_mode, SampleMode::Adaptive);
        assert_eq!(opts.grid_size, d.grid_size);
        assert!(opts.grid);
        assert_eq!(opts.debug, DebugMode::None);
    }

    #[test]
    fn test_cvar_overrides() {
        let mut cvars = CvarContext::new();
        LightOptions::register_cvars(&mut cvars);
        let applied = cvars.apply_lines(
            "light_samples 0\nlight_samplemode 2\nlight_bounce 3\nlight_debugcluster 1\nlight_ambient \"4 5 6\"\n",
        );
        assert_eq!(applied, 5);
        let opts = LightOptions::from_cvars(&cvars);
        assert_eq!(opts.samples, 1);
        assert_eq!(opts.sample_mode, SampleMode::Random);
        assert_eq!(opts.bounce, 3);
        assert_eq!(opts.debug, DebugMode::Cluster);
        assert_eq!(opts.ambient_color, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_worldspawn_overrides() {
        let mut world = Entity::default();
        world.set_key("classname", "worldspawn");
        world.set_key("_ambient", "10");
        world.set_key("_color", "2 0 0");
        world.set_key("_floodlight", "0 0 1 512 64");
        let mut opts = LightOptions::default();
        opts.apply_worldspawn(&world);
        assert_eq!(opts.ambient_color, [10.0, 0.0, 0.0]);
        assert!(opts.floodlight);
        assert_eq!(opts.floodlight_distance, 512.0);
        assert_eq!(opts.floodlight_intensity, 64.0);
    }
}
