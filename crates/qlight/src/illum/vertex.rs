// vertex.rs — per-vertex light: read back from the raster or traced directly

use qlight_common::q_shared::{
    add_point_to_bounds, clear_bounds, nudge_offset, vector_add_to, vector_ma, vector_scale, Vec2, Vec3, VEC3_ORIGIN,
};
use qlight_common::qfiles::{LS_NONE, LS_NORMAL, MAX_LIGHTMAPS};
use rand::rngs::StdRng;

use super::dirt::dirt_for_sample;
use super::flood::{floodlight_def, floodlight_for_sample};
use super::{work_rng, Hemispheres};
use crate::lights::envelope::LightBounds;
use crate::lights::{LightFlags, LightSet};
use crate::luxel::RawLightmap;
use crate::sample::{lighting_at_sample, SampleContext};
use crate::scene::Scene;
use crate::session::bump_by;
use crate::shader::{CompileFlags, FloodlightDef};
use crate::trace::TraceQuery;

pub const VERTEX_NUDGE: f32 = 4.0;
/// Negative: vertexes on a brush face count as outside it.
pub const VERTEX_EPSILON: f32 = -0.125;
const VERTEX_NUDGE_STEPS: i32 = 5;
const VERTEX_SALT: u64 = 0x7E;

/// Light at every draw vertex of one surface, linear, per style slot.
#[derive(Debug, Clone)]
pub struct VertexLighting {
    pub surface_num: usize,
    pub styles: [u8; MAX_LIGHTMAPS],
    pub colors: Vec<[Vec3; MAX_LIGHTMAPS]>,
    /// Luxel-space coordinate per vertex; empty for surfaces without a
    /// raster.
    pub lightmap_coords: Vec<Vec2>,
}

impl VertexLighting {
    pub fn new(scene: &Scene, surface_num: usize) -> Self {
        let surf = &scene.surfaces[surface_num];
        Self {
            surface_num,
            styles: [LS_NORMAL, LS_NONE, LS_NONE, LS_NONE],
            colors: vec![[VEC3_ORIGIN; MAX_LIGHTMAPS]; surf.num_verts],
            lightmap_coords: Vec::new(),
        }
    }
}

#[inline]
fn brighter(c: &Vec3, floor: &Vec3) -> bool {
    c[0] > floor[0] || c[1] > floor[1] || c[2] > floor[2]
}

/// Average of mapped luxels around `coord`, widening until something is
/// found.
fn luxel_average(lm: &RawLightmap, slot: usize, coord: &Vec2) -> Option<Vec3> {
    let luxels = &lm.luxels[slot];
    if luxels.is_empty() {
        return None;
    }
    let x = (coord[0].max(0.0) as usize).min(lm.width - 1);
    let y = (coord[1].max(0.0) as usize).min(lm.height - 1);
    let max_radius = lm.width.max(lm.height);

    for radius in 0..max_radius {
        let mut sum = VEC3_ORIGIN;
        let mut samples = 0.0;
        for sy in y.saturating_sub(radius)..=(y + radius).min(lm.height - 1) {
            for sx in x.saturating_sub(radius)..=(x + radius).min(lm.width - 1) {
                let j = lm.index(sx, sy);
                if !lm.is_mapped(j) {
                    continue;
                }
                let l = &luxels[j];
                vector_add_to(&[l[0], l[1], l[2]], &mut sum);
                samples += l[3];
            }
        }
        if samples > 0.0 {
            return Some(vector_scale(&sum, 1.0 / samples));
        }
    }
    None
}

/// Vertex colors of a lightmapped surface, read from its finished raster.
fn vertexes_from_raster(out: &mut VertexLighting, scene: &Scene, lm: &RawLightmap, ambient: &Vec3) {
    let surf = &scene.surfaces[out.surface_num];
    let transform = scene.surface_transform(surf);
    out.styles = lm.styles;
    out.lightmap_coords = scene
        .surface_verts(surf)
        .iter()
        .map(|v| lm.project(&transform.transform_point(&v.xyz)))
        .collect();

    for (colors, coord) in out.colors.iter_mut().zip(&out.lightmap_coords) {
        for (slot, color) in colors.iter_mut().enumerate() {
            *color = match luxel_average(lm, slot, coord) {
                Some(c) => c,
                None if slot == 0 => *ambient,
                None => VEC3_ORIGIN,
            };
        }
    }
}

/// Everything a direct vertex sample needs.
struct VertexSampler<'a> {
    ctx: SampleContext<'a>,
    set: &'a LightSet,
    lights: Vec<usize>,
    clusters: &'a [i32],
    q: TraceQuery,
    rng: StdRng,
    dirty: bool,
    flood: Option<FloodlightDef>,
    vectors: &'a Hemispheres,
}

impl VertexSampler<'_> {
    fn sample(&mut self, origin: &Vec3, normal: &Vec3, styles: &mut [u8; MAX_LIGHTMAPS]) -> Option<[Vec3; MAX_LIGHTMAPS]> {
        let cluster = self.ctx.world.cluster_for_point_ext_filter(origin, VERTEX_EPSILON, self.clusters);
        if cluster < 0 {
            return None;
        }
        self.q.cluster = cluster;
        self.q.origin = *origin;
        self.q.normal = *normal;

        let dirt = if self.dirty {
            dirt_for_sample(&self.ctx, &mut self.q, &self.vectors.dirt, &mut self.rng)
        } else {
            1.0
        };
        let flood = match &self.flood {
            Some(def) => {
                let amount = floodlight_for_sample(&self.ctx, &mut self.q, def.distance, &self.vectors.flood);
                vector_scale(&def.color, amount * def.intensity)
            }
            None => VEC3_ORIGIN,
        };

        let mut colors = [VEC3_ORIGIN; MAX_LIGHTMAPS];
        lighting_at_sample(&self.ctx, self.set, &self.lights, &mut self.q, styles, &mut colors);
        for c in colors.iter_mut() {
            *c = vector_scale(c, dirt);
        }
        vector_add_to(&flood, &mut colors[0]);
        Some(colors)
    }
}

/// Light the draw vertexes of one surface. With a raster the colors are
/// averaged from its mapped luxels and replace `out`. Without one, every
/// vertex is traced against `set` (nudging up to 5x5x5 when it sits in
/// solid or comes out no brighter than ambient) and the result is added to
/// `out`, so bounce passes accumulate.
pub fn illuminate_vertexes(
    out: &mut VertexLighting,
    scene: &Scene,
    lm: Option<&RawLightmap>,
    ctx: &SampleContext,
    set: &LightSet,
    vectors: &Hemispheres,
) {
    let options = ctx.options;
    let ambient = if ctx.bouncing { VEC3_ORIGIN } else { options.ambient_color };

    if let Some(lm) = lm {
        vertexes_from_raster(out, scene, lm, &ambient);
        bump_by(&ctx.session.counters.vertexes_lit, out.colors.len());
        return;
    }

    let surf = &scene.surfaces[out.surface_num];
    let shader = scene.shader(surf);
    let transform = scene.surface_transform(surf);
    let verts: Vec<(Vec3, Vec3)> = scene
        .surface_verts(surf)
        .iter()
        .map(|v| (transform.transform_point(&v.xyz), transform.transform_normal(&v.normal)))
        .collect();
    if verts.is_empty() {
        return;
    }

    let mut mins = VEC3_ORIGIN;
    let mut maxs = VEC3_ORIGIN;
    clear_bounds(&mut mins, &mut maxs);
    for (xyz, _) in &verts {
        add_point_to_bounds(xyz, &mut mins, &mut maxs);
    }
    let bounds = LightBounds {
        mins,
        maxs,
        normal: None,
        clusters: &surf.clusters,
        flags: LightFlags::SURFACES,
        two_sided: shader.two_sided,
    };

    let mut sampler = VertexSampler {
        ctx: *ctx,
        set,
        lights: set.create_trace_lights_for_bounds(ctx.world, &bounds),
        clusters: &surf.clusters,
        q: TraceQuery {
            surfaces: vec![out.surface_num],
            two_sided: shader.two_sided,
            recv_shadows: surf.recv_shadows,
            ..Default::default()
        },
        rng: work_rng(options.seed, out.surface_num, VERTEX_SALT),
        dirty: options.dirty && !ctx.bouncing && !shader.compile_flags.contains(CompileFlags::NODIRT),
        flood: if ctx.bouncing { None } else { floodlight_def(options, shader) },
        vectors,
    };

    let mut styles = out.styles;
    let mut results: Vec<Option<[Vec3; MAX_LIGHTMAPS]>> = Vec::with_capacity(verts.len());
    let mut average = [VEC3_ORIGIN; MAX_LIGHTMAPS];
    let mut num_average = 0;

    for (xyz, normal) in &verts {
        let mut result = sampler.sample(xyz, normal, &mut styles);
        if !result.as_ref().is_some_and(|c| brighter(&c[0], &ambient)) {
            'nudge: for x in 0..VERTEX_NUDGE_STEPS {
                let x1 = nudge_offset(x) as f32 * VERTEX_NUDGE;
                for y in 0..VERTEX_NUDGE_STEPS {
                    let y1 = nudge_offset(y) as f32 * VERTEX_NUDGE;
                    for z in 0..VERTEX_NUDGE_STEPS {
                        let z1 = nudge_offset(z) as f32 * VERTEX_NUDGE;
                        let moved = [xyz[0] + x1, xyz[1] + y1, xyz[2] + z1];
                        let Some(colors) = sampler.sample(&moved, normal, &mut styles) else {
                            continue;
                        };
                        let done = brighter(&colors[0], &ambient);
                        result = Some(colors);
                        if done {
                            break 'nudge;
                        }
                    }
                }
            }
        }

        if let Some(colors) = &result {
            if brighter(&colors[0], &ambient) {
                num_average += 1;
                for (a, c) in average.iter_mut().zip(colors) {
                    vector_add_to(c, a);
                }
            }
        }
        results.push(result);
    }

    let fallback = if num_average > 0 {
        average.map(|a| vector_scale(&a, 1.0 / num_average as f32))
    } else {
        let mut f = [VEC3_ORIGIN; MAX_LIGHTMAPS];
        f[0] = ambient;
        f
    };

    out.styles = styles;
    for (dst, result) in out.colors.iter_mut().zip(results) {
        let colors = result.unwrap_or(fallback);
        for (d, c) in dst.iter_mut().zip(&colors) {
            *d = vector_ma(d, 1.0, c);
        }
    }
    if !ctx.bouncing {
        bump_by(&ctx.session.counters.vertexes_lit, verts.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::LightOptions;
    use crate::session::CompileSession;
    use crate::shader::ShaderInfo;
    use crate::testutil::{add_quad, build_tree, floor_quad, mapped_lightmap, open_scene, point_light, room_scene};

    fn set_of(light: crate::lights::Light) -> LightSet {
        let mut set = LightSet::new();
        set.push(light);
        set
    }

    #[test]
    fn test_vertex_lit_quad_traced_directly() {
        let session = CompileSession::new();
        let options = LightOptions { ambient_color: [5.0; 3], ..Default::default() };
        let mut scene = open_scene();
        let mut vlit = ShaderInfo::named("vlit");
        vlit.compile_flags |= CompileFlags::VERTEXLIT;
        scene.shaders.push(vlit);
        let surface = add_quad(&mut scene, 1, floor_quad(64.0, 0.0));
        let tree = build_tree(&scene, &options, &session);
        let set = set_of(point_light([0.0, 0.0, 100.0], 1.0e6));
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };
        let vectors = Hemispheres::new().unwrap();

        let mut out = VertexLighting::new(&scene, surface);
        illuminate_vertexes(&mut out, &scene, None, &ctx, &set, &vectors);
        // vertex 0 sits right under the light
        assert!((out.colors[0][0][0] - (5.0 + 100.0)).abs() < 0.01);
        assert!(out.colors[2][0][0] < out.colors[0][0][0]);
        assert_eq!(session.stats().vertexes_lit, 4);

        // a bounce pass adds without ambient
        let bounce_ctx = SampleContext { bouncing: true, ..ctx };
        illuminate_vertexes(&mut out, &scene, None, &bounce_ctx, &set, &vectors);
        assert!((out.colors[0][0][0] - (5.0 + 200.0)).abs() < 0.02);
    }

    #[test]
    fn test_vertex_in_solid_nudges_inside() {
        let session = CompileSession::new();
        let options = LightOptions::default();
        let mut scene = room_scene([0.0; 3], [64.0; 3]);
        let mut vlit = ShaderInfo::named("vlit");
        vlit.compile_flags |= CompileFlags::VERTEXLIT;
        scene.shaders.push(vlit);
        // corner vertex (64, 64) lies on the solid max planes
        let surface = add_quad(&mut scene, 1, floor_quad(64.0, 0.0));
        let tree = build_tree(&scene, &options, &session);
        let set = set_of(point_light([32.0, 32.0, 48.0], 1.0e5));
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        let mut out = VertexLighting::new(&scene, surface);
        illuminate_vertexes(&mut out, &scene, None, &ctx, &set, &Hemispheres::new().unwrap());
        assert!(out.colors.iter().all(|c| c[0][0] > 0.0));
    }

    #[test]
    fn test_lightmapped_vertexes_read_raster() {
        let session = CompileSession::new();
        let options = LightOptions::default();
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(64.0, 0.0));
        let tree = build_tree(&scene, &options, &session);
        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        lm.ensure_slot(0);
        for (i, l) in lm.luxels[0].iter_mut().enumerate() {
            *l = [i as f32, 0.0, 0.0, 1.0];
        }
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        let mut out = VertexLighting::new(&scene, 0);
        illuminate_vertexes(&mut out, &scene, Some(&lm), &ctx, &LightSet::new(), &Hemispheres::new().unwrap());
        // vertex 2 is the (64, 64) corner, luxel (4, 4)
        assert_eq!(out.lightmap_coords[2], [4.5, 4.5]);
        assert_eq!(out.colors[2][0], [24.0, 0.0, 0.0]);
        assert_eq!(out.colors[0][0], [0.0, 0.0, 0.0]);
    }
}
