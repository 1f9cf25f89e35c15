// envelope.rs — light envelopes, PVS clamping and per-region light lists

use qlight_common::bspworld::BspWorld;
use qlight_common::common::com_dprintf;
use qlight_common::q_shared::{
    add_point_to_bounds, dot_product, nudge_offset, vector_add, vector_length, vector_scale, vector_subtract, Vec3,
    SUN_DISTANCE,
};

use super::{LightFlags, LightKind, LightSet};
use crate::options::LightOptions;
use crate::sample::point_to_polygon_form_factor;
use crate::session::{bump, CompileSession};

pub const LIGHT_EPSILON: f32 = 0.125;
pub const LIGHT_NUDGE: f32 = 2.0;

/// Indexes into `LightSet::lights`, in light order.
pub type TraceLights = Vec<usize>;

/// A region asking which lights can reach it.
#[derive(Debug, Clone, Copy)]
pub struct LightBounds<'a> {
    pub mins: Vec3,
    pub maxs: Vec3,
    /// Plane normal for planar regions.
    pub normal: Option<Vec3>,
    pub clusters: &'a [i32],
    /// Lights must carry at least one of these.
    pub flags: LightFlags,
    pub two_sided: bool,
}

/// Resolve a cluster for `origin`, trying the 3x3x3 nudge search when it
/// sits in solid. Returns the cluster and the (possibly moved) origin.
pub fn nudged_cluster(world: &BspWorld, origin: &Vec3, step: f32, range: i32) -> (i32, Vec3) {
    let cluster = world.cluster_for_point_ext(origin, LIGHT_EPSILON);
    if cluster >= 0 {
        return (cluster, *origin);
    }
    for x in 0..range {
        let x1 = nudge_offset(x) as f32;
        for y in 0..range {
            let y1 = nudge_offset(y) as f32;
            for z in 0..range {
                let z1 = nudge_offset(z) as f32;
                let moved = [origin[0] + step * x1, origin[1] + step * y1, origin[2] + step * z1];
                let cluster = world.cluster_for_point_ext(&moved, LIGHT_EPSILON);
                if cluster >= 0 {
                    return (cluster, moved);
                }
            }
        }
    }
    (cluster, *origin)
}

/// Radius at which an area light's form factor falls under its tolerance.
fn area_extent(light: &super::Light) -> f32 {
    let LightKind::Area { winding, .. } = &light.kind else {
        return 0.0;
    };
    let dir = [-light.normal[0], -light.normal[1], -light.normal[2]];
    let mut radius = 100.0;
    while radius < 130000.0 {
        let point = qlight_common::q_shared::vector_ma(&light.origin, radius, &light.normal);
        let factor = point_to_polygon_form_factor(&point, &dir, winding).abs();
        if factor * light.add <= light.falloff_tolerance {
            return radius;
        }
        radius += 10.0;
    }
    0.0
}

impl LightSet {
    /// Solve every light's envelope and PVS bounds, drop lights that can
    /// never contribute, then order by style. `for_grid` keeps grid lights
    /// instead of surface lights.
    pub fn setup_envelopes(&mut self, world: &BspWorld, for_grid: bool, options: &LightOptions, session: &CompileSession) {
        let before = self.lights.len();
        let mut kept = Vec::with_capacity(before);

        for mut light in self.lights.drain(..) {
            if light.photons < 0.0 || light.add < 0.0 {
                light.photons = -light.photons;
                light.add = -light.add;
                light.flags |= LightFlags::NEGATIVE;
            }

            if light.is_sun() {
                light.cluster = 0;
                light.envelope = SUN_DISTANCE;
                light.mins = [-SUN_DISTANCE; 3];
                light.maxs = [SUN_DISTANCE; 3];
            } else {
                let (cluster, origin) = nudged_cluster(world, &light.origin, LIGHT_NUDGE, 3);
                light.cluster = cluster;
                light.origin = origin;

                if light.cluster >= 0 {
                    if options.fast {
                        light.flags |= LightFlags::FAST_TEMP;
                    } else {
                        light.flags.remove(LightFlags::FAST_TEMP);
                    }

                    light.envelope = 0.0;
                    let mut radius = 0.0;
                    if let LightKind::Area { winding, .. } = &light.kind {
                        radius = winding
                            .iter()
                            .map(|p| vector_length(&vector_subtract(p, &light.origin)))
                            .fold(0.0, f32::max);
                        if light.is_fast() {
                            light.envelope = area_extent(&light);
                        }
                    }
                    let intensity = light.photons;

                    if light.envelope <= 0.0 {
                        light.envelope = if !light.flags.contains(LightFlags::ATTEN_DISTANCE) {
                            SUN_DISTANCE
                        } else if light.is_fast() {
                            if light.flags.contains(LightFlags::ATTEN_LINEAR) {
                                (intensity * options.linear_scale - light.falloff_tolerance) / light.fade
                            } else {
                                (intensity / light.falloff_tolerance.max(f32::MIN_POSITIVE)).sqrt() + radius
                            }
                        } else {
                            SUN_DISTANCE
                        };
                    }

                    // clamp against everything the light can see
                    let (mut mins, mut maxs) = world.pvs_bounds(light.cluster);
                    add_point_to_bounds(&light.origin, &mut mins, &mut maxs);
                    light.mins = mins;
                    light.maxs = maxs;

                    let twice = vector_scale(&light.origin, 2.0);
                    let reflected_max = vector_subtract(&twice, &maxs);
                    let reflected_min = vector_subtract(&twice, &mins);
                    add_point_to_bounds(&reflected_max, &mut mins, &mut maxs);
                    add_point_to_bounds(&reflected_min, &mut mins, &mut maxs);
                    let pvs_radius = vector_length(&vector_subtract(&maxs, &light.origin));
                    if pvs_radius < light.envelope {
                        light.envelope = pvs_radius;
                    }

                    let wanted = if for_grid { LightFlags::GRID } else { LightFlags::SURFACES };
                    if !light.flags.contains(wanted) {
                        light.envelope = 0.0;
                    }
                }

                if light.cluster < 0 || light.envelope <= 0.0 {
                    bump(&session.counters.culled_lights);
                    continue;
                }
            }

            light.envelope2 = light.envelope * light.envelope;
            kept.push(light);
        }

        // stable: style 0 first, then custom styles in order
        kept.sort_by_key(|l| l.style);
        if kept.iter().any(|l| l.style != 0) {
            session.set_no_collapse();
        }

        self.num_point = 0;
        self.num_spot = 0;
        self.num_area = 0;
        self.num_sun = 0;
        for light in kept {
            self.push(light);
        }
        com_dprintf(&format!(
            "{} of {} lights kept for {}\n",
            self.lights.len(),
            before,
            if for_grid { "grid" } else { "surfaces" }
        ));
    }

    /// Lights whose envelope reaches `bounds`, that share PVS with one of its
    /// clusters, and that are neither coplanar with nor behind its plane.
    pub fn create_trace_lights_for_bounds(&self, world: &BspWorld, bounds: &LightBounds) -> TraceLights {
        let origin = vector_scale(&vector_add(&bounds.mins, &bounds.maxs), 0.5);
        let radius = vector_length(&vector_subtract(&bounds.maxs, &origin));
        let normal = bounds.normal.unwrap_or([0.0; 3]);
        let planar = vector_length(&normal) > 0.0;

        let mut out = TraceLights::new();
        for (num, light) in self.lights.iter().enumerate() {
            if light.envelope <= 0.0 || !light.flags.intersects(bounds.flags) {
                continue;
            }

            if !light.is_sun() {
                if !bounds.clusters.is_empty()
                    && !bounds.clusters.iter().any(|&c| world.cluster_visible(light.cluster, c))
                {
                    continue;
                }
                let dist = vector_length(&vector_subtract(&light.origin, &origin)) - light.envelope - radius;
                if dist > 0.0 {
                    continue;
                }
            }

            if planar && !bounds.two_sided {
                if !light.flags.contains(LightFlags::TWOSIDED) && dot_product(&light.normal, &normal) > 0.999 {
                    continue;
                }
                if dot_product(&light.origin, &normal) - dot_product(&origin, &normal) < -1.0 {
                    continue;
                }
            }

            out.push(num);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lights::Light;

    fn point_light(origin: Vec3, photons: f32) -> Light {
        let mut light = Light::new(LightKind::Point, LightFlags::Q3A_DEFAULT);
        light.origin = origin;
        light.photons = photons;
        light
    }

    fn envelope_of(light: Light, options: &LightOptions) -> f32 {
        let mut set = LightSet::new();
        set.push(light);
        set.setup_envelopes(&BspWorld::open(), false, options, &CompileSession::new());
        set.lights.first().map(|l| l.envelope).unwrap_or(0.0)
    }

    #[test]
    fn test_inverse_square_envelope() {
        let env = envelope_of(point_light([0.0; 3], 10000.0), &LightOptions::default());
        assert!((env - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_linear_envelope() {
        let mut light = point_light([0.0; 3], 80000.0);
        light.flags |= LightFlags::ATTEN_LINEAR;
        light.fade = 2.0;
        let opts = LightOptions::default();
        let env = envelope_of(light, &opts);
        assert!((env - (80000.0 * opts.linear_scale - 1.0) / 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_negative_light_flag() {
        let mut set = LightSet::new();
        set.push(point_light([0.0; 3], -5000.0));
        set.setup_envelopes(&BspWorld::open(), false, &LightOptions::default(), &CompileSession::new());
        assert!(set.lights[0].is_negative());
        assert_eq!(set.lights[0].photons, 5000.0);
    }

    #[test]
    fn test_pvs_clamp_and_solid_cull() {
        let world = BspWorld::sealed_box([-64.0; 3], [64.0; 3]);
        let session = CompileSession::new();
        let mut set = LightSet::new();
        set.push(point_light([0.0; 3], 1.0e9));
        set.push(point_light([500.0, 0.0, 0.0], 1.0e9));
        set.setup_envelopes(&world, false, &LightOptions::default(), &session);
        assert_eq!(set.len(), 1);
        assert_eq!(session.stats().culled_lights, 1);
        assert!((set.lights[0].envelope - (3.0f32 * 64.0 * 64.0).sqrt()).abs() < 1e-3);
    }

    #[test]
    fn test_light_nudged_out_of_solid() {
        let world = BspWorld::sealed_box([-64.0; 3], [64.0; 3]);
        let mut set = LightSet::new();
        set.push(point_light([64.5, 0.0, 0.0], 10000.0));
        set.setup_envelopes(&world, false, &LightOptions::default(), &CompileSession::new());
        assert_eq!(set.len(), 1);
        assert_eq!(set.lights[0].origin, [62.5, 0.0, 0.0]);
    }

    #[test]
    fn test_styles_sorted_and_no_collapse() {
        let session = CompileSession::new();
        let mut set = LightSet::new();
        let mut styled = point_light([0.0; 3], 10000.0);
        styled.style = 3;
        set.push(styled);
        set.push(point_light([8.0, 0.0, 0.0], 10000.0));
        set.setup_envelopes(&BspWorld::open(), false, &LightOptions::default(), &session);
        assert_eq!(set.lights[0].style, 0);
        assert_eq!(set.lights[1].style, 3);
        assert!(session.no_collapse());
    }

    #[test]
    fn test_trace_lights_for_bounds_culls() {
        let mut set = LightSet::new();
        set.push(point_light([0.0, 0.0, 64.0], 10000.0));
        set.push(point_light([0.0, 0.0, -64.0], 10000.0));
        set.push(point_light([1000.0, 0.0, 64.0], 10000.0));
        let world = BspWorld::open();
        set.setup_envelopes(&world, false, &LightOptions::default(), &CompileSession::new());
        let clusters = [0];
        let bounds = LightBounds {
            mins: [-16.0, -16.0, 0.0],
            maxs: [16.0, 16.0, 0.0],
            normal: Some([0.0, 0.0, 1.0]),
            clusters: &clusters,
            flags: LightFlags::SURFACES,
            two_sided: false,
        };
        let lights = set.create_trace_lights_for_bounds(&world, &bounds);
        assert_eq!(lights.len(), 1);
        assert_eq!(set.lights[lights[0]].origin, [0.0, 0.0, 64.0]);
        let two_sided = LightBounds { two_sided: true, ..bounds };
        assert_eq!(set.create_trace_lights_for_bounds(&world, &two_sided).len(), 2);
    }
}
