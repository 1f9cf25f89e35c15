// entities.rs — point, spot and sun lights from light entities and shaders

use rand::rngs::StdRng;
use rand::Rng;

use qlight_common::entities::Entity;
use qlight_common::q_shared::{
    color_normalize, vector_ma, vector_negate, vector_normalize, vector_subtract, Q_PI, SUN_DISTANCE, VEC3_ORIGIN,
};

use super::{Light, LightFlags, LightKind, LightSet};
use crate::error::LightError;
use crate::options::LightOptions;
use crate::scene::Scene;
use crate::session::CompileSession;
use crate::shader::SunDef;

const DEFAULT_INTENSITY: f32 = 300.0;
const DEFAULT_SPOT_RADIUS: f32 = 64.0;
const MAX_STYLE: i32 = 254;

const SPAWNFLAG_LINEAR: i32 = 1;
const SPAWNFLAG_NO_ANGLE: i32 = 2;
const SPAWNFLAG_DARK: i32 = 4 | 8;
const SPAWNFLAG_NO_GRID: i32 = 16;
const SPAWNFLAG_UNNORMALIZED: i32 = 32;
const SPAWNFLAG_DISTANCE: i32 = 64;

/// Numeric key with a warning when the text is not a number.
fn float_key(ent: &Entity, num: usize, key: &str, session: &CompileSession) -> f32 {
    let value = ent.value_for_key(key).trim();
    if !value.is_empty() && value.parse::<f32>().is_err() {
        session.warn(format!("entity {}: key \"{}\" has bad value \"{}\"", num, key, value));
    }
    ent.float_for_key(key)
}

/// First non-zero of several alternative keys.
fn float_keys(ent: &Entity, num: usize, keys: &[&str], session: &CompileSession) -> f32 {
    keys.iter()
        .map(|k| float_key(ent, num, k, session))
        .find(|v| *v != 0.0)
        .unwrap_or(0.0)
}

fn has_prefix(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len()).is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn jitter(rng: &mut StdRng) -> f32 {
    rng.gen::<f32>() * 2.0 - 1.0
}

impl LightSet {
    /// Create lights for every `light*` entity. `lightJunior` entities light
    /// the grid only.
    pub fn from_entities(
        scene: &Scene,
        options: &LightOptions,
        session: &CompileSession,
        rng: &mut StdRng,
    ) -> Result<LightSet, LightError> {
        let mut set = LightSet::new();
        for (num, ent) in scene.entities.iter().enumerate() {
            let classname = ent.classname();
            let junior = has_prefix(classname, "lightJunior");
            if !junior && !has_prefix(classname, "light") {
                continue;
            }
            set.add_entity_light(scene, num, ent, junior, options, session, rng)?;
        }
        Ok(set)
    }

    #[allow(clippy::too_many_arguments)]
    fn add_entity_light(
        &mut self,
        scene: &Scene,
        num: usize,
        ent: &Entity,
        junior: bool,
        options: &LightOptions,
        session: &CompileSession,
        rng: &mut StdRng,
    ) -> Result<(), LightError> {
        let spawnflags = ent.int_for_key("spawnflags");
        let mut flags = if !options.wolf {
            let mut f = LightFlags::Q3A_DEFAULT;
            if spawnflags & SPAWNFLAG_LINEAR != 0 {
                f |= LightFlags::ATTEN_LINEAR;
                f.remove(LightFlags::ATTEN_ANGLE);
            }
            if spawnflags & SPAWNFLAG_NO_ANGLE != 0 {
                f.remove(LightFlags::ATTEN_ANGLE);
            }
            f
        } else {
            let mut f = LightFlags::WOLF_DEFAULT;
            if spawnflags & SPAWNFLAG_LINEAR != 0 {
                f.remove(LightFlags::ATTEN_LINEAR);
                f |= LightFlags::ATTEN_ANGLE;
            }
            if spawnflags & SPAWNFLAG_NO_ANGLE != 0 {
                f |= LightFlags::ATTEN_ANGLE;
            }
            f
        };
        if spawnflags & SPAWNFLAG_DARK != 0 {
            flags |= LightFlags::DARK;
        }
        if spawnflags & SPAWNFLAG_NO_GRID != 0 {
            flags.remove(LightFlags::GRID);
        }
        if junior {
            flags |= LightFlags::GRID;
            flags.remove(LightFlags::SURFACES);
        }
        if spawnflags & SPAWNFLAG_UNNORMALIZED != 0 {
            flags |= LightFlags::UNNORMALIZED;
        }
        if spawnflags & SPAWNFLAG_DISTANCE != 0 {
            flags |= LightFlags::ATTEN_DISTANCE;
        }

        let mut light = Light::new(LightKind::Point, flags);
        if light.flags.contains(LightFlags::ATTEN_LINEAR) {
            light.fade = float_key(ent, num, "fade", session);
            if light.fade == 0.0 {
                light.fade = 1.0;
            }
        }
        light.angle_scale = float_key(ent, num, "_anglescale", session);
        if light.angle_scale != 0.0 {
            light.flags |= LightFlags::ATTEN_ANGLE;
        }
        light.origin = ent.vector_for_key("origin");

        let mut style = ent.int_for_key("_style");
        if style == 0 {
            style = ent.int_for_key("style");
        }
        if !(0..=MAX_STYLE).contains(&style) {
            return Err(LightError::InvalidLightStyle { entity: num, style });
        }
        light.style = style as u8;
        if light.style != 0 {
            session.warn(format!(
                "Styled light found targeting {}",
                ent.value_for_key("targetname")
            ));
        }

        let mut intensity = float_keys(ent, num, &["_light", "light"], session);
        if intensity == 0.0 {
            intensity = DEFAULT_INTENSITY;
        }
        let mut scale = float_key(ent, num, "scale", session);
        if scale == 0.0 {
            scale = 1.0;
        }
        intensity *= scale;

        let mut deviance = float_keys(ent, num, &["_deviance", "_deviation", "_jitter"], session);
        let mut num_samples = ent.int_for_key("_samples");
        if deviance < 0.0 || num_samples < 1 {
            deviance = 0.0;
            num_samples = 1;
        }
        intensity /= num_samples as f32;

        light.filter_radius = float_keys(ent, num, &["_filterradius", "_filteradius", "_filter"], session).max(0.0);

        if ent.value_for_key("_color").is_empty() {
            light.color = [1.0, 1.0, 1.0];
        } else {
            light.color = ent.vector_for_key("_color");
            if options.color_srgb {
                light.color = light.color.map(crate::color::srgb_to_linear);
            }
            if !light.flags.contains(LightFlags::UNNORMALIZED) {
                color_normalize(&mut light.color);
            }
        }

        light.extra_dist = float_key(ent, num, "_extradist", session);
        if light.extra_dist == 0.0 {
            light.extra_dist = options.extra_dist;
        }

        light.photons = intensity * options.point_scale;
        light.falloff_tolerance = options.falloff_tolerance / num_samples as f32;

        let target = ent.value_for_key("target");
        if !target.is_empty() {
            match scene.find_target(target) {
                None => session.warn(format!(
                    "light at ({} {} {}) has missing target",
                    light.origin[0] as i32, light.origin[1] as i32, light.origin[2] as i32
                )),
                Some(dest) => {
                    let mut normal = vector_subtract(&dest.vector_for_key("origin"), &light.origin);
                    let mut dist = vector_normalize(&mut normal);
                    let mut radius = ent.float_for_key("radius");
                    if radius == 0.0 {
                        radius = DEFAULT_SPOT_RADIUS;
                    }
                    if dist == 0.0 {
                        dist = 64.0;
                    }

                    if ent.value_for_key("_sun").starts_with('1') {
                        let sun = SunDef {
                            direction: vector_negate(&normal),
                            color: light.color,
                            photons: intensity,
                            deviance: deviance / 180.0 * Q_PI,
                            num_samples: num_samples as usize,
                            style: light.style,
                        };
                        self.add_sun(&sun, light.filter_radius, options, rng);
                        return Ok(());
                    }

                    light.kind = LightKind::Spot { radius_by_dist: (radius + 16.0) / dist };
                    light.normal = normal;
                    light.flags.remove(LightFlags::ATTEN_LINEAR);
                    light.flags |= LightFlags::ATTEN_ANGLE;
                    light.fade = 1.0;
                    light.photons *= options.spot_scale / options.point_scale;
                }
            }
        }

        for _ in 1..num_samples {
            let mut copy = light.clone();
            for i in 0..3 {
                copy.origin[i] = light.origin[i] + jitter(rng) * deviance;
            }
            self.push(copy);
        }
        self.push(light);
        Ok(())
    }

    /// Create `sun.num_samples` sun lights. The first points exactly along
    /// `sun.direction`, the rest are jittered within `sun.deviance`.
    pub fn add_sun(&mut self, sun: &SunDef, filter_radius: f32, options: &LightOptions, rng: &mut StdRng) {
        let num_samples = sun.num_samples.max(1);
        let photons = sun.photons / num_samples as f32;

        for i in 0..num_samples {
            let direction = if i == 0 {
                sun.direction
            } else {
                let d = (sun.direction[0] * sun.direction[0] + sun.direction[1] * sun.direction[1]).sqrt();
                let mut angle = sun.direction[1].atan2(sun.direction[0]);
                let mut elevation = sun.direction[2].atan2(d);
                let (da, de) = loop {
                    let da = jitter(rng) * sun.deviance;
                    let de = jitter(rng) * sun.deviance;
                    if da * da + de * de <= sun.deviance * sun.deviance {
                        break (da, de);
                    }
                };
                angle += da;
                elevation += de;
                [
                    angle.cos() * elevation.cos(),
                    angle.sin() * elevation.cos(),
                    elevation.sin(),
                ]
            };

            let mut light = Light::new(LightKind::Sun, LightFlags::SUN_DEFAULT);
            light.falloff_tolerance = options.falloff_tolerance;
            light.filter_radius = filter_radius / num_samples as f32;
            light.style = sun.style;
            light.origin = vector_ma(&VEC3_ORIGIN, SUN_DISTANCE, &direction);
            light.normal = vector_negate(&direction);
            light.color = sun.color;
            light.photons = photons * options.sky_scale;
            self.push(light);
        }
    }

    /// Suns declared by sky shaders that some surface actually uses.
    pub fn add_shader_suns(&mut self, scene: &Scene, options: &LightOptions, rng: &mut StdRng) {
        let mut used = vec![false; scene.shaders.len()];
        for surf in &scene.surfaces {
            if let Some(slot) = used.get_mut(surf.shader_num) {
                *slot = true;
            }
        }
        for (shader, _) in scene.shaders.iter().zip(used).filter(|(_, u)| *u) {
            for sun in &shader.suns {
                self.add_sun(sun, 0.0, options, rng);
            }
        }
    }
}
