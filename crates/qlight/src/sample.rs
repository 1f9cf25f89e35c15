// sample.rs — per-light contribution at a surface sample or grid point

use qlight_common::bspworld::BspWorld;
use qlight_common::q_shared::{
    cross_product, dot_product, vector_add, vector_add_to, vector_length, vector_ma, vector_normalize, vector_scale,
    vector_subtract, Vec3, VEC3_ORIGIN,
};
use qlight_common::qfiles::{LS_NONE, MAX_LIGHTMAPS};

use crate::lights::{Light, LightFlags, LightKind, LightSet};
use crate::options::LightOptions;
use crate::session::{bump, CompileSession};
use crate::shader::CompileFlags;
use crate::trace::{setup_trace, trace_line, TraceQuery, TraceTree};

const ONE_OVER_2PI: f32 = 0.159_154_94;
pub const DISTANCE_FLOOR: f32 = 16.0;
pub const SPOT_SOFT_EDGE: f32 = 32.0;
const AREA_NUDGE_WINDOW: f32 = 8.0;
const AREA_BACKFACE: f32 = -1.0;
const BOUNCE_DELUXE_SCALE: f32 = 0.25;
const BOUNCE_DELUXE_MIN: f32 = 0.003_906_25;

/// Read-only state every sample evaluation needs.
#[derive(Clone, Copy)]
pub struct SampleContext<'a> {
    pub world: &'a BspWorld,
    pub tree: &'a TraceTree,
    pub options: &'a LightOptions,
    pub session: &'a CompileSession,
    /// Evaluating bounce lights: no ambient, damped deluxe.
    pub bouncing: bool,
}

/// Outcome of one light at one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contribution {
    /// Reached the sample but blocked.
    Occluded,
    /// Nothing measurable.
    Unlit,
    Lit,
}

impl Contribution {
    pub fn as_i32(self) -> i32 {
        match self {
            Contribution::Occluded => -1,
            Contribution::Unlit => 0,
            Contribution::Lit => 1,
        }
    }
}

#[inline]
pub(crate) fn rgb_to_gray(v: &Vec3) -> f32 {
    v[0] * 0.3 + v[1] * 0.59 + v[2] * 0.11
}

/// Lambert term with two-sided flip and optional half-Lambert remap.
fn angle_term(options: &LightOptions, q: &TraceQuery, add_deluxe: &mut bool) -> f32 {
    let mut dot = dot_product(&q.normal, &q.direction);
    if q.two_sided && dot < 0.0 {
        dot = -dot;
        *add_deluxe = false;
    }
    if options.half_lambert {
        if dot > 0.001 {
            let d = dot.min(1.0) * 0.5 + 0.5;
            dot = d * d;
        } else {
            dot = 0.0;
        }
    }
    dot
}

#[inline]
fn clamp_distance(dist: f32, extra: f32) -> f32 {
    (dist * dist + extra * extra).sqrt().max(DISTANCE_FLOOR)
}

/// Soft-edged cone test. `None` when outside the cone.
fn spot_factor(light: &Light, radius_by_dist: f32, q: &TraceQuery) -> Option<f32> {
    let dist_by_normal = -dot_product(&q.displacement, &light.normal);
    if dist_by_normal < 0.0 {
        return None;
    }
    let point_at_dist = vector_ma(&light.origin, dist_by_normal, &light.normal);
    let radius_at_dist = radius_by_dist * dist_by_normal;
    let sample_radius = vector_length(&vector_subtract(&q.origin, &point_at_dist));
    if sample_radius >= radius_at_dist {
        return None;
    }
    if sample_radius > radius_at_dist - SPOT_SOFT_EDGE {
        return Some(((radius_at_dist - sample_radius) / SPOT_SOFT_EDGE).max(0.0));
    }
    Some(1.0)
}

/// Solid angle of `winding` seen from `point`, projected onto `normal`, as
/// a fraction of the hemisphere. Negative when the polygon faces away.
pub fn point_to_polygon_form_factor(point: &Vec3, normal: &Vec3, winding: &[Vec3]) -> f32 {
    let n = winding.len();
    if n < 3 {
        return 0.0;
    }
    let dirs: Vec<Vec3> = winding
        .iter()
        .map(|p| {
            let mut d = vector_subtract(p, point);
            vector_normalize(&mut d);
            d
        })
        .collect();

    let mut total = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        let dot = dot_product(&dirs[i], &dirs[j]).clamp(-1.0, 1.0);
        let angle = dot.acos();
        let mut triangle = cross_product(&dirs[i], &dirs[j]);
        if vector_normalize(&mut triangle) < 0.0001 {
            continue;
        }
        total += dot_product(normal, &triangle) * angle;
        if !(-6.3..=6.3).contains(&total) {
            return 0.0;
        }
    }
    total * ONE_OVER_2PI
}

/// Evaluate one light at a lightmap sample. Fills `q.color`,
/// `q.color_no_shadow` and `q.direction_contribution`.
pub fn light_contribution_to_sample(ctx: &SampleContext, light: &Light, q: &mut TraceQuery) -> Contribution {
    let options = ctx.options;
    q.force_subsampling = 0.0;
    q.color = VEC3_ORIGIN;
    q.color_no_shadow = VEC3_ORIGIN;
    q.direction_contribution = VEC3_ORIGIN;
    let color_brightness = rgb_to_gray(&light.color) * (1.0 / 255.0);
    let mut do_add_deluxe = true;

    if !light.flags.contains(LightFlags::SURFACES) || light.envelope <= 0.0 {
        return Contribution::Unlit;
    }

    if !light.is_sun() {
        if !q.two_sided && dot_product(&light.origin, &q.normal) - dot_product(&q.origin, &q.normal) < 0.0 {
            return Contribution::Unlit;
        }
        if !ctx.world.cluster_visible(q.cluster, light.cluster) {
            return Contribution::Unlit;
        }
    }

    let (add, add_deluxe) = match &light.kind {
        LightKind::Area { winding, plane } => {
            let d = dot_product(&q.origin, &plane.normal) - plane.dist;
            if d < 3.0 {
                if !light.flags.contains(LightFlags::TWOSIDED) && d < AREA_BACKFACE {
                    return Contribution::Unlit;
                }
                if d > -3.0 && dot_product(&q.normal, &plane.normal) > 0.9 {
                    return Contribution::Unlit;
                }
            }
            let pushed = if d > -AREA_NUDGE_WINDOW && d < AREA_NUDGE_WINDOW {
                vector_ma(&q.origin, AREA_NUDGE_WINDOW - d, &plane.normal)
            } else {
                q.origin
            };

            q.end = light.origin;
            setup_trace(q);
            if q.distance >= light.envelope {
                return Contribution::Unlit;
            }

            if options.faster {
                let mut angle = dot_product(&q.normal, &q.direction);
                if q.two_sided && angle < 0.0 {
                    angle = -angle;
                    do_add_deluxe = false;
                }
                angle *= -dot_product(&light.normal, &q.direction);
                if angle == 0.0 {
                    return Contribution::Unlit;
                }
                if angle < 0.0 && (q.two_sided || light.flags.contains(LightFlags::TWOSIDED)) {
                    angle = -angle;
                    do_add_deluxe = false;
                }
                let dist = clamp_distance(q.distance, light.extra_dist);
                let add = light.photons / (dist * dist) * angle;
                (add, add)
            } else {
                let mut factor = point_to_polygon_form_factor(&pushed, &q.normal, winding);
                if factor == 0.0 {
                    return Contribution::Unlit;
                }
                if factor < 0.0 {
                    if !(q.two_sided || light.flags.contains(LightFlags::TWOSIDED)) {
                        return Contribution::Unlit;
                    }
                    factor = -factor;
                    do_add_deluxe = false;
                    // trace to the other face
                    q.end = vector_ma(&light.origin, -2.0, &light.normal);
                    setup_trace(q);
                    if q.distance >= light.envelope {
                        return Contribution::Unlit;
                    }
                }
                let add = factor * light.add;
                (add, add)
            }
        }

        LightKind::Point | LightKind::Spot { .. } => {
            q.end = light.origin;
            setup_trace(q);
            if q.distance >= light.envelope {
                return Contribution::Unlit;
            }
            let dist = clamp_distance(q.distance, light.extra_dist);

            let mut angle = if light.flags.contains(LightFlags::ATTEN_ANGLE) {
                angle_term(options, q, &mut do_add_deluxe)
            } else {
                1.0
            };
            if light.angle_scale != 0.0 {
                angle = (angle / light.angle_scale).min(1.0);
            }

            let (mut add, mut add_deluxe) = if light.flags.contains(LightFlags::ATTEN_LINEAR) {
                let add = (angle * light.photons * options.linear_scale - dist * light.fade).max(0.0);
                (add, add)
            } else {
                let add = (light.photons / (dist * dist) * angle).max(0.0);
                (add, add)
            };

            if let LightKind::Spot { radius_by_dist } = light.kind {
                match spot_factor(light, radius_by_dist, q) {
                    None => return Contribution::Unlit,
                    Some(f) => {
                        add *= f;
                        add_deluxe *= f;
                    }
                }
            }
            (add, add_deluxe)
        }

        LightKind::Sun => {
            q.end = vector_add(&q.origin, &light.origin);
            setup_trace(q);
            let angle = if light.flags.contains(LightFlags::ATTEN_ANGLE) {
                angle_term(options, q, &mut do_add_deluxe)
            } else {
                1.0
            };
            let add = light.photons * angle;
            if add <= 0.0 {
                return Contribution::Unlit;
            }
            q.color_no_shadow = vector_scale(&light.color, add);

            let mut add_deluxe = add.max(0.0) * color_brightness;
            if ctx.bouncing {
                add_deluxe = (add_deluxe * BOUNCE_DELUXE_SCALE).max(BOUNCE_DELUXE_MIN);
            }
            if do_add_deluxe {
                q.direction_contribution = vector_scale(&q.direction, add_deluxe);
            }

            q.test_all = true;
            q.color = vector_scale(&light.color, add);
            if q.test_occlusion && !q.force_sunlight {
                trace_line(ctx.tree, q, ctx.session);
                q.force_subsampling *= add;
                if !q.compile_flags.contains(CompileFlags::SKY) || q.opaque {
                    q.color = VEC3_ORIGIN;
                    q.direction_contribution = VEC3_ORIGIN;
                    return Contribution::Occluded;
                }
            }
            return Contribution::Lit;
        }
    };

    q.color_no_shadow = vector_scale(&light.color, add);
    if add <= 0.0 || (add <= light.falloff_tolerance && light.is_fast()) {
        return Contribution::Unlit;
    }

    let mut add_deluxe = add_deluxe.max(0.0) * color_brightness;
    if ctx.bouncing {
        add_deluxe = (add_deluxe * BOUNCE_DELUXE_SCALE).max(BOUNCE_DELUXE_MIN);
    }
    if do_add_deluxe {
        q.direction_contribution = vector_scale(&q.direction, add_deluxe);
    }

    q.test_all = false;
    q.color = vector_scale(&light.color, add);
    trace_line(ctx.tree, q, ctx.session);
    q.force_subsampling *= add;
    if q.pass_solid || q.opaque {
        q.color = VEC3_ORIGIN;
        q.direction_contribution = VEC3_ORIGIN;
        return Contribution::Occluded;
    }
    Contribution::Lit
}

/// Evaluate one light at a light grid point (no surface normal). Returns
/// true and fills `q.color` when the point is lit.
pub fn light_contribution_to_point(ctx: &SampleContext, light: &Light, q: &mut TraceQuery) -> bool {
    let options = ctx.options;
    q.color = VEC3_ORIGIN;

    if !light.flags.contains(LightFlags::GRID) || light.envelope <= 0.0 {
        return false;
    }
    if !light.is_sun() && !ctx.world.cluster_visible(q.cluster, light.cluster) {
        return false;
    }
    for i in 0..3 {
        if q.origin[i] > light.maxs[i] || q.origin[i] < light.mins[i] {
            return false;
        }
    }

    q.end = if light.is_sun() {
        vector_add(&q.origin, &light.origin)
    } else {
        light.origin
    };
    setup_trace(q);
    if q.distance > light.envelope {
        return false;
    }

    let add = match &light.kind {
        LightKind::Area { winding, plane } => {
            if options.faster {
                let dist = clamp_distance(q.distance, light.extra_dist);
                light.photons / (dist * dist)
            } else {
                let d = dot_product(&q.origin, &plane.normal) - plane.dist;
                if !light.flags.contains(LightFlags::TWOSIDED) && d < AREA_BACKFACE {
                    return false;
                }
                let pushed = if d > -AREA_NUDGE_WINDOW && d < AREA_NUDGE_WINDOW {
                    vector_ma(&q.origin, AREA_NUDGE_WINDOW - d, &plane.normal)
                } else {
                    q.origin
                };
                let mut factor = point_to_polygon_form_factor(&pushed, &q.direction, winding);
                if factor == 0.0 {
                    return false;
                }
                if factor < 0.0 {
                    if !light.flags.contains(LightFlags::TWOSIDED) {
                        return false;
                    }
                    factor = -factor;
                }
                factor * light.add
            }
        }
        LightKind::Point | LightKind::Spot { .. } => {
            let dist = clamp_distance(q.distance, light.extra_dist);
            let mut add = if light.flags.contains(LightFlags::ATTEN_LINEAR) {
                (light.photons * options.linear_scale - dist * light.fade).max(0.0)
            } else {
                light.photons / (dist * dist)
            };
            if let LightKind::Spot { radius_by_dist } = light.kind {
                match spot_factor(light, radius_by_dist, q) {
                    None => return false,
                    Some(f) => add *= f,
                }
            }
            add
        }
        LightKind::Sun => {
            let add = light.photons;
            if add <= 0.0 {
                return false;
            }
            q.test_all = true;
            q.color = vector_scale(&light.color, add);
            if q.test_occlusion && !q.force_sunlight {
                trace_line(ctx.tree, q, ctx.session);
                if !q.compile_flags.contains(CompileFlags::SKY) || q.opaque {
                    q.color = VEC3_ORIGIN;
                    return false;
                }
            }
            return true;
        }
    };

    if add <= 0.0 || (add <= light.falloff_tolerance && light.is_fast()) {
        return false;
    }
    q.test_all = false;
    q.color = vector_scale(&light.color, add);
    trace_line(ctx.tree, q, ctx.session);
    if q.pass_solid {
        q.color = VEC3_ORIGIN;
        return false;
    }
    true
}

/// Pick the style slot for `style`, claiming a free one if needed.
pub fn style_slot(styles: &[u8; MAX_LIGHTMAPS], style: u8) -> Option<usize> {
    styles.iter().position(|&s| s == style || s == LS_NONE)
}

/// Sum every light in `lights` at one sample into per-style colors. Used
/// for vertex lighting, where there is no raster to subsample.
pub fn lighting_at_sample(
    ctx: &SampleContext,
    set: &LightSet,
    lights: &[usize],
    q: &mut TraceQuery,
    styles: &mut [u8; MAX_LIGHTMAPS],
    colors: &mut [Vec3; MAX_LIGHTMAPS],
) {
    *colors = [VEC3_ORIGIN; MAX_LIGHTMAPS];
    if !ctx.bouncing {
        colors[0] = ctx.options.ambient_color;
    }

    for &num in lights {
        let light = &set.lights[num];
        let Some(slot) = style_slot(styles, light.style) else {
            bump(&ctx.session.counters.style_overflows);
            continue;
        };
        bump(&ctx.session.counters.light_samples);
        light_contribution_to_sample(ctx, light, q);
        if q.color == VEC3_ORIGIN {
            continue;
        }
        if light.is_negative() {
            q.color = vector_scale(&q.color, -1.0);
        }
        styles[slot] = light.style;
        vector_add_to(&q.color, &mut colors[slot]);
    }
}
