// illum — lighting raw lightmaps: per-light passes, subsampling, output

pub mod dirt;
pub mod filter;
pub mod flood;
pub mod vertex;

pub use dirt::{dirt_for_sample, dirt_vectors, dirty_raw_lightmap};
pub use filter::filter_raw_lightmap;
pub use flood::{floodlight_def, floodlight_for_sample, floodlight_raw_lightmap, floodlight_vectors};
pub use vertex::{illuminate_vertexes, VertexLighting};

use qlight_common::q_shared::{
    dot_product, vector_add_to, vector_ma, vector_normalize, vector_scale, Vec3, Q_PI, VEC3_ORIGIN,
};
use qlight_common::qfiles::MAX_LIGHTMAPS;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::color::{color_to_bytes, Rgb8};
use crate::error::LightError;
use crate::lights::envelope::LightBounds;
use crate::lights::{Light, LightFlags, LightSet};
use crate::luxel::map::LUXEL_EPSILON;
use crate::luxel::{Luxel, RawLightmap};
use crate::options::{DebugMode, DeluxeMode, LightOptions, SampleMode};
use crate::sample::{light_contribution_to_sample, rgb_to_gray, style_slot, SampleContext};
use crate::session::{bump, bump_by};
use crate::trace::TraceQuery;

/// A 2x2 stamp is only worth refining when it carries this much light.
const SUBSAMPLE_THRESHOLD: f32 = 4.0;
const STAMP: [[usize; 2]; 4] = [[0, 0], [1, 0], [0, 1], [1, 1]];
const BIAS_DIRS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];
const GAUSS_SPREAD: f32 = 2.738_613;

const DEBUG_PALETTE: [[u8; 3]; 12] = [
    [255, 0, 0],
    [255, 128, 0],
    [255, 255, 0],
    [128, 255, 0],
    [0, 255, 0],
    [0, 255, 128],
    [0, 255, 255],
    [0, 128, 255],
    [0, 0, 255],
    [128, 0, 255],
    [255, 0, 255],
    [255, 0, 128],
];

/// Gather directions shared by the dirt and floodlight passes.
#[derive(Debug, Clone)]
pub struct Hemispheres {
    pub dirt: Vec<Vec3>,
    pub flood: Vec<Vec3>,
}

impl Hemispheres {
    pub fn new() -> Result<Self, LightError> {
        Ok(Self { dirt: dirt_vectors()?, flood: floodlight_vectors() })
    }
}

/// Generator for one work item. Seeded from the compile seed and the item,
/// so output does not depend on which worker ran it.
pub fn work_rng(seed: u64, item: usize, salt: u64) -> StdRng {
    let mixed = seed ^ (item as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ salt.wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    StdRng::seed_from_u64(mixed)
}

/// Offset in a disc of roughly gaussian density.
pub fn gauss_like_random(sigma: f32, rng: &mut StdRng) -> (f32, f32) {
    let angle = rng.gen::<f32>() * 2.0 * Q_PI;
    let mut r = rng.gen::<f32>();
    r = 1.0 - r.sqrt();
    r = 1.0 - r.sqrt();
    let scale = sigma * GAUSS_SPREAD * r;
    (scale * angle.cos(), scale * angle.sin())
}

#[inline]
fn rgb(l: &Luxel) -> Vec3 {
    [l[0], l[1], l[2]]
}

/// One light evaluated over one raster.
struct LightPass<'a> {
    ctx: SampleContext<'a>,
    light: &'a Light,
    lm: &'a RawLightmap,
    q: &'a mut TraceQuery,
    samples: f32,
}

impl LightPass<'_> {
    fn sample(&mut self, cluster: i32, origin: &Vec3, normal: &Vec3) -> (Vec3, Vec3, bool) {
        self.q.cluster = cluster;
        self.q.origin = *origin;
        self.q.normal = *normal;
        bump(&self.ctx.session.counters.light_samples);
        light_contribution_to_sample(&self.ctx, self.light, self.q);
        (self.q.color, self.q.direction_contribution, self.q.force_subsampling > 1.0)
    }

    /// A sample point `dx`, `dy` luxels from `origin` on luxel `i`.
    fn submap(&self, i: usize, origin: &Vec3, dx: f32, dy: f32) -> Option<(i32, Vec3)> {
        let (s, t) = self.lm.tangents(&self.lm.normals[i]);
        let p = vector_ma(&vector_ma(origin, dx, &s), dy, &t);
        let cluster = self
            .ctx
            .world
            .cluster_for_point_ext_filter(&p, LUXEL_EPSILON, &self.lm.surface_clusters);
        (cluster >= 0).then_some((cluster, p))
    }

    /// Split a luxel into four biased taps, recursing while the taps
    /// disagree. Depth rides in `luxel[3]`.
    fn subsample_r(&mut self, i: usize, origin: &Vec3, bias: f32, luxel: &mut Luxel, dir: &mut Vec3) {
        if luxel[3] >= self.samples {
            return;
        }
        let normal = self.lm.normals[i];
        let mut taps: [Option<(Vec3, Luxel, Vec3)>; 4] = [None; 4];
        let mut total = VEC3_ORIGIN;
        let mut mapped = 0;
        let mut lighted = 0;
        let mut forced = false;

        for (tap, d) in taps.iter_mut().zip(BIAS_DIRS.iter()) {
            let Some((cluster, p)) = self.submap(i, origin, bias * d[0], bias * d[1]) else {
                continue;
            };
            mapped += 1;
            let (color, contribution, force) = self.sample(cluster, &p, &normal);
            forced |= force;
            if color[0] + color[1] + color[2] > 0.0 {
                lighted += 1;
            }
            vector_add_to(&color, &mut total);
            *tap = Some((p, [color[0], color[1], color[2], luxel[3] + 1.0], contribution));
        }

        let bright = total.iter().any(|&c| c > SUBSAMPLE_THRESHOLD);
        let split = forced || (lighted != 0 && lighted != mapped);
        if luxel[3] + 1.0 < self.samples && bright && split {
            for (p, l, d) in taps.iter_mut().flatten() {
                let p = *p;
                self.subsample_r(i, &p, bias * 0.5, l, d);
            }
        }

        let mut sum = rgb(luxel);
        let mut sum_dir = *dir;
        let mut n = 1.0;
        for (_, l, d) in taps.iter().flatten() {
            vector_add_to(&rgb(l), &mut sum);
            vector_add_to(d, &mut sum_dir);
            n += 1.0;
        }
        let avg = vector_scale(&sum, 1.0 / n);
        *luxel = [avg[0], avg[1], avg[2], luxel[3]];
        *dir = vector_scale(&sum_dir, 1.0 / n);
    }

    /// Replace a luxel by the mean of `offsets`, skipping taps in solid.
    fn replace_with_taps(&mut self, i: usize, origin: &Vec3, offsets: &[(f32, f32)], luxel: &mut Luxel, dir: &mut Vec3) {
        let normal = self.lm.normals[i];
        let mut total = VEC3_ORIGIN;
        let mut total_dir = VEC3_ORIGIN;
        let mut mapped = 0;
        for &(dx, dy) in offsets {
            let Some((cluster, p)) = self.submap(i, origin, dx, dy) else {
                continue;
            };
            mapped += 1;
            let (color, contribution, _) = self.sample(cluster, &p, &normal);
            vector_add_to(&color, &mut total);
            vector_add_to(&contribution, &mut total_dir);
        }
        if mapped > 0 {
            let scale = 1.0 / mapped as f32;
            let avg = vector_scale(&total, scale);
            *luxel = [avg[0], avg[1], avg[2], 1.0];
            *dir = vector_scale(&total_dir, scale);
        }
    }

    fn random_subsample(&mut self, i: usize, origin: &Vec3, bias: f32, rng: &mut StdRng, luxel: &mut Luxel, dir: &mut Vec3) {
        let offsets: Vec<(f32, f32)> = (0..self.samples as usize).map(|_| gauss_like_random(bias, rng)).collect();
        self.replace_with_taps(i, origin, &offsets, luxel, dir);
    }

    /// Regular n by n grid over the search box.
    fn ordered_subsample(&mut self, i: usize, origin: &Vec3, search_box: f32, luxel: &mut Luxel, dir: &mut Vec3) {
        let n = self.samples as usize;
        let step = |k: usize| ((k as f32 + 0.5) / n as f32 - 0.5) * search_box;
        let offsets: Vec<(f32, f32)> = (0..n).flat_map(|y| (0..n).map(move |x| (step(x), step(y)))).collect();
        self.replace_with_taps(i, origin, &offsets, luxel, dir);
    }

    /// Walk every 2x2 stamp and refine luxels on shadow edges. Returns the
    /// number of luxels refined.
    fn subsample_edges(
        &mut self,
        luxels: &mut [Luxel],
        dirs: &mut [Vec3],
        forced: &[bool],
        done: &mut [bool],
        rng: &mut StdRng,
    ) -> usize {
        let lm = self.lm;
        let options = self.ctx.options;
        if lm.width < 2 || lm.height < 2 {
            return 0;
        }

        let mut count = 0;
        for y in 0..lm.height - 1 {
            for x in 0..lm.width - 1 {
                let mut mapped = 0;
                let mut lighted = 0;
                let mut total = VEC3_ORIGIN;
                let mut force = false;
                for [sx, sy] in STAMP {
                    let j = lm.index(x + sx, y + sy);
                    if !lm.is_mapped(j) {
                        continue;
                    }
                    mapped += 1;
                    let c = rgb(&luxels[j]);
                    if c[0] + c[1] + c[2] > 0.0 {
                        lighted += 1;
                    }
                    vector_add_to(&c, &mut total);
                    force |= forced[j];
                }

                if total.iter().all(|&c| c <= SUBSAMPLE_THRESHOLD) {
                    continue;
                }
                if !force && (lighted == 0 || lighted == mapped) {
                    continue;
                }

                for [sx, sy] in STAMP {
                    let j = lm.index(x + sx, y + sy);
                    if !lm.is_mapped(j) || done[j] {
                        continue;
                    }
                    done[j] = true;
                    let origin = lm.origins[j];
                    match options.sample_mode {
                        SampleMode::Random => {
                            let bias = 0.5 * options.samples_search_box;
                            self.random_subsample(j, &origin, bias, rng, &mut luxels[j], &mut dirs[j]);
                        }
                        _ => {
                            let bias = 0.25 * options.samples_search_box;
                            self.subsample_r(j, &origin, bias, &mut luxels[j], &mut dirs[j]);
                        }
                    }
                    count += 1;
                }
            }
        }
        count
    }
}

/// Filter radius in luxels for one light on one raster.
fn luxel_filter_radius(lm: &RawLightmap, light: &Light) -> usize {
    let radius = lm.filter_radius.max(light.filter_radius);
    if radius <= 0.0 || lm.sample_size <= 0.0 {
        return 0;
    }
    ((radius / lm.sample_size) as usize).max(1)
}

/// Box-filtered light at luxel (x, y); the outermost ring counts half.
fn filtered_luxel(lm: &RawLightmap, luxels: &[Luxel], dirs: &[Vec3], x: usize, y: usize, radius: usize) -> Option<(Vec3, Vec3)> {
    let mut color = VEC3_ORIGIN;
    let mut dir = VEC3_ORIGIN;
    let mut samples = 0.0;
    for sy in y.saturating_sub(radius)..=(y + radius).min(lm.height - 1) {
        for sx in x.saturating_sub(radius)..=(x + radius).min(lm.width - 1) {
            let j = lm.index(sx, sy);
            if !lm.is_mapped(j) {
                continue;
            }
            let mut weight = if sx.abs_diff(x) == radius { 0.5 } else { 1.0 };
            if sy.abs_diff(y) == radius {
                weight *= 0.5;
            }
            color = vector_ma(&color, weight, &rgb(&luxels[j]));
            if let Some(d) = dirs.get(j) {
                dir = vector_ma(&dir, weight, d);
            }
            samples += weight;
        }
    }
    if samples <= 0.0 {
        return None;
    }
    Some((vector_scale(&color, 1.0 / samples), vector_scale(&dir, 1.0 / samples)))
}

/// Light every mapped luxel of `lm` with the lights in `set` that can
/// reach it. Adds into the raster's style buffers and records this pass's
/// style 0 light for bouncing. `pass_num` salts the random generator.
pub fn illuminate_raw_lightmap(lm: &mut RawLightmap, ctx: &SampleContext, set: &LightSet, pass_num: usize) {
    let options = ctx.options;
    let n = lm.num_luxels();
    let Some((mins, maxs)) = lm.sample_bounds() else {
        lm.pass_luxels = vec![VEC3_ORIGIN; n];
        return;
    };

    let clusters = lm.luxel_clusters();
    let bounds = LightBounds {
        mins,
        maxs,
        normal: if options.dark { None } else { lm.plane.map(|p| p.normal) },
        clusters: &clusters,
        flags: LightFlags::SURFACES,
        two_sided: lm.two_sided,
    };
    let trace_lights = set.create_trace_lights_for_bounds(ctx.world, &bounds);

    let mut styles = lm.styles;
    let mut pass: [Vec<Luxel>; MAX_LIGHTMAPS] = Default::default();
    pass[0] = vec![[0.0; 4]; n];
    let mut pass_dirs = vec![VEC3_ORIGIN; if options.deluxemap { n } else { 0 }];

    if !ctx.bouncing {
        let brightness = rgb_to_gray(&lm.ambient) / 255.0;
        for i in (0..n).filter(|&i| lm.is_mapped(i)) {
            pass[0][i] = [lm.ambient[0], lm.ambient[1], lm.ambient[2], 1.0];
            if options.deluxemap {
                pass_dirs[i] = vector_scale(&lm.normals[i], brightness);
            }
        }
    }

    let mut rng = work_rng(options.seed, lm.surface_num, pass_num as u64);
    let mut q = TraceQuery {
        surfaces: vec![lm.surface_num],
        two_sided: lm.two_sided,
        recv_shadows: lm.recv_shadows,
        ..Default::default()
    };
    let mut light_luxels: Vec<Luxel> = vec![[0.0; 4]; n];
    let mut light_dirs = vec![VEC3_ORIGIN; n];
    let mut forced = vec![false; n];
    let mut done = vec![false; n];
    let mut overflowed = false;
    let view: &RawLightmap = lm;

    for &num in &trace_lights {
        let light = &set.lights[num];
        let Some(slot) = style_slot(&styles, light.style) else {
            bump(&ctx.session.counters.style_overflows);
            overflowed = true;
            continue;
        };

        let mut lp = LightPass {
            ctx: *ctx,
            light,
            lm: view,
            q: &mut q,
            samples: options.samples.max(1) as f32,
        };

        let mut lit = 0;
        for i in 0..n {
            light_luxels[i] = [0.0; 4];
            light_dirs[i] = VEC3_ORIGIN;
            forced[i] = false;
            done[i] = false;
            if !view.is_mapped(i) {
                continue;
            }
            let (color, dir, force) = lp.sample(view.clusters[i], &view.origins[i], &view.normals[i]);
            light_luxels[i] = [color[0], color[1], color[2], 1.0];
            light_dirs[i] = dir;
            forced[i] = force;
            if color != VEC3_ORIGIN || force {
                lit += 1;
            }
        }
        if lit == 0 {
            continue;
        }

        if options.samples > 1 {
            let refined = match options.sample_mode {
                SampleMode::Ordered => {
                    let mut count = 0;
                    for i in (0..n).filter(|&i| view.is_mapped(i)) {
                        let origin = view.origins[i];
                        lp.ordered_subsample(i, &origin, options.samples_search_box, &mut light_luxels[i], &mut light_dirs[i]);
                        count += 1;
                    }
                    count
                }
                SampleMode::Adaptive | SampleMode::Random => {
                    lp.subsample_edges(&mut light_luxels, &mut light_dirs, &forced, &mut done, &mut rng)
                }
            };
            bump_by(&ctx.session.counters.subsampled_luxels, refined);
        }

        if options.dirty && !ctx.bouncing {
            for (l, &d) in light_luxels.iter_mut().zip(&view.dirt) {
                for c in l.iter_mut().take(3) {
                    *c *= d;
                }
            }
        }

        styles[slot] = light.style;
        if pass[slot].is_empty() {
            pass[slot] = vec![[0.0; 4]; n];
        }
        let radius = luxel_filter_radius(view, light);
        let sign = if light.is_negative() { -1.0 } else { 1.0 };
        for y in 0..view.height {
            for x in 0..view.width {
                let i = view.index(x, y);
                if !view.is_mapped(i) {
                    continue;
                }
                let (color, dir) = if radius > 0 {
                    match filtered_luxel(view, &light_luxels, &light_dirs, x, y, radius) {
                        Some(f) => f,
                        None => continue,
                    }
                } else {
                    (rgb(&light_luxels[i]), light_dirs[i])
                };
                let out = &mut pass[slot][i];
                for k in 0..3 {
                    out[k] += sign * color[k];
                }
                out[3] = 1.0;
                if slot == 0 && options.deluxemap && !light.is_negative() {
                    vector_add_to(&dir, &mut pass_dirs[i]);
                }
            }
        }
    }

    if !ctx.bouncing && !lm.floodlight.is_empty() {
        for i in (0..n).filter(|&i| lm.is_mapped(i)) {
            let f = lm.floodlight[i];
            let color = rgb(&f);
            if color == VEC3_ORIGIN {
                continue;
            }
            for k in 0..3 {
                pass[0][i][k] += color[k];
            }
            pass[0][i][3] = 1.0;
            if options.deluxemap {
                let brightness = (rgb_to_gray(&color) / 255.0 * f[3]).max(1.0 / 256.0);
                pass_dirs[i] = vector_ma(&pass_dirs[i], brightness, &lm.normals[i]);
            }
        }
    }

    lm.styles = styles;
    for (slot, buffer) in pass.iter().enumerate() {
        if buffer.is_empty() {
            continue;
        }
        lm.ensure_slot(slot);
        for (dst, src) in lm.luxels[slot].iter_mut().zip(buffer) {
            for k in 0..3 {
                dst[k] += src[k];
            }
            dst[3] = dst[3].max(src[3]);
        }
    }
    if options.deluxemap {
        if lm.deluxels.is_empty() {
            lm.deluxels = vec![VEC3_ORIGIN; n];
        }
        for (dst, src) in lm.deluxels.iter_mut().zip(&pass_dirs) {
            vector_add_to(src, dst);
        }
    }
    lm.pass_luxels = pass[0].iter().map(rgb).collect();

    if overflowed {
        ctx.session.warn(format!("surface {}: more than {} light styles\n", lm.surface_num, MAX_LIGHTMAPS));
    }
    if !ctx.bouncing {
        bump_by(&ctx.session.counters.illuminated_luxels, lm.num_mapped());
    }
}

/// Unit direction packed into a texel.
fn encode_direction(d: &Vec3) -> Rgb8 {
    let byte = |v: f32| ((v * 0.5 + 0.5) * 255.0).clamp(0.0, 255.0) as u8;
    Rgb8::new(byte(d[0]), byte(d[1]), byte(d[2]))
}

fn deluxe_texel(lm: &RawLightmap, i: usize, mode: DeluxeMode) -> Rgb8 {
    let normal = if lm.is_mapped(i) { lm.normals[i] } else { [0.0, 0.0, 1.0] };
    let mut dir = lm.deluxels.get(i).copied().unwrap_or(VEC3_ORIGIN);
    if vector_normalize(&mut dir) == 0.0 {
        dir = normal;
    }
    if mode == DeluxeMode::Tangentspace {
        let (mut s, mut t) = lm.tangents(&normal);
        vector_normalize(&mut s);
        vector_normalize(&mut t);
        dir = [dot_product(&dir, &s), dot_product(&dir, &t), dot_product(&dir, &normal)];
    }
    encode_direction(&dir)
}

fn debug_color(lm: &RawLightmap, i: usize, mode: DebugMode) -> Rgb8 {
    match mode {
        DebugMode::None => Rgb8::BLACK,
        DebugMode::Normals => encode_direction(&lm.normals[i]),
        DebugMode::Axis => {
            let mut c = [0u8; 3];
            c[lm.axis_num] = 255;
            Rgb8::new(c[0], c[1], c[2])
        }
        DebugMode::Cluster => match lm.clusters[i] {
            c if c < 0 => Rgb8::BLACK,
            c => {
                let [r, g, b] = DEBUG_PALETTE[c as usize % DEBUG_PALETTE.len()];
                Rgb8::new(r, g, b)
            }
        },
        DebugMode::Origin => {
            let o = &lm.origins[i];
            let byte = |k: usize| {
                let extent = (lm.maxs[k] - lm.mins[k]).max(1.0);
                ((o[k] - lm.mins[k]) / extent * 255.0).clamp(0.0, 255.0) as u8
            };
            Rgb8::new(byte(0), byte(1), byte(2))
        }
        DebugMode::Deluxe => deluxe_texel(lm, i, DeluxeMode::Modelspace),
    }
}

/// Convert accumulated light into output texels for every used style, plus
/// the direction map when enabled. Style 0 is floored at the surface's
/// minimum light.
pub fn store_raw_lightmap(lm: &mut RawLightmap, options: &LightOptions) {
    let n = lm.num_luxels();
    lm.ensure_slot(0);

    for slot in 0..MAX_LIGHTMAPS {
        if lm.luxels[slot].is_empty() {
            lm.bytes[slot] = Vec::new();
            continue;
        }
        let floor = if slot == 0 { lm.min_light } else { VEC3_ORIGIN };
        lm.bytes[slot] = lm.luxels[slot]
            .iter()
            .map(|l| {
                let c = [l[0].max(floor[0]), l[1].max(floor[1]), l[2].max(floor[2])];
                color_to_bytes(&c, 1.0, options)
            })
            .collect();
    }

    if options.debug != DebugMode::None {
        lm.bytes[0] = (0..n).map(|i| debug_color(lm, i, options.debug)).collect();
    }

    if options.deluxemap {
        lm.deluxe_bytes = (0..n).map(|i| deluxe_texel(lm, i, options.deluxe_mode)).collect();
    } else {
        lm.deluxe_bytes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CompileSession;
    use crate::testutil::{add_box, add_quad, build_tree, floor_quad, mapped_lightmap, open_scene, point_light};
    use qlight_common::qfiles::LS_NONE;

    fn set_of(lights: Vec<Light>) -> LightSet {
        let mut set = LightSet::new();
        for l in lights {
            set.push(l);
        }
        set
    }

    #[test]
    fn test_overhead_point_light() {
        let session = CompileSession::new();
        let options = LightOptions::default();
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(64.0, 0.0));
        let tree = build_tree(&scene, &options, &session);
        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        let set = set_of(vec![point_light([32.0, 32.0, 100.0], 1.0e6)]);
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        illuminate_raw_lightmap(&mut lm, &ctx, &set, 0);
        let center = lm.luxels[0][lm.index(2, 2)];
        assert!((center[0] - 1.0e6 / (99.0 * 99.0)).abs() < 0.05);
        let corner = lm.luxels[0][lm.index(0, 0)];
        assert!(corner[0] > 0.0 && corner[0] < center[0]);
        assert_eq!(lm.pass_luxels[lm.index(2, 2)], rgb(&center));
        assert_eq!(session.stats().illuminated_luxels, 25);
    }

    #[test]
    fn test_ambient_only_outside_bounce() {
        let session = CompileSession::new();
        let options = LightOptions { ambient_color: [10.0, 20.0, 30.0], ..Default::default() };
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(32.0, 0.0));
        let tree = build_tree(&scene, &options, &session);
        let set = LightSet::new();

        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };
        illuminate_raw_lightmap(&mut lm, &ctx, &set, 0);
        assert_eq!(lm.luxels[0][0], [10.0, 20.0, 30.0, 1.0]);

        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        let ctx = SampleContext { bouncing: true, ..ctx };
        illuminate_raw_lightmap(&mut lm, &ctx, &set, 1);
        assert_eq!(rgb(&lm.luxels[0][0]), [0.0; 3]);
    }

    #[test]
    fn test_negative_light_subtracts() {
        let session = CompileSession::new();
        let options = LightOptions::default();
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(64.0, 0.0));
        let tree = build_tree(&scene, &options, &session);
        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        let bright = point_light([32.0, 32.0, 100.0], 2.0e6);
        let mut dark = point_light([32.0, 32.0, 100.0], 1.0e6);
        dark.flags |= LightFlags::NEGATIVE;
        let set = set_of(vec![bright, dark]);
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        illuminate_raw_lightmap(&mut lm, &ctx, &set, 0);
        let center = lm.luxels[0][lm.index(2, 2)];
        assert!((center[0] - 1.0e6 / (99.0 * 99.0)).abs() < 0.05);
    }

    #[test]
    fn test_fifth_style_overflows() {
        let session = CompileSession::new();
        let options = LightOptions::default();
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(32.0, 0.0));
        let tree = build_tree(&scene, &options, &session);
        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        let lights = (1..=4u8)
            .map(|style| {
                let mut l = point_light([16.0, 16.0, 64.0], 1.0e5);
                l.style = style;
                l
            })
            .collect();
        let set = set_of(lights);
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        illuminate_raw_lightmap(&mut lm, &ctx, &set, 0);
        assert_eq!(lm.styles, [0, 1, 2, 3]);
        assert_eq!(session.stats().style_overflows, 1);
        assert_eq!(session.flush_warnings(), 1);
        assert!(lm.luxels[3].iter().any(|l| l[0] > 0.0));
    }

    #[test]
    fn test_unlit_style_keeps_slot_free() {
        let session = CompileSession::new();
        let options = LightOptions::default();
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(32.0, 0.0));
        let tree = build_tree(&scene, &options, &session);
        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        // below the floor: never reaches it
        let mut below = point_light([16.0, 16.0, -64.0], 1.0e5);
        below.style = 5;
        let set = set_of(vec![below]);
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        illuminate_raw_lightmap(&mut lm, &ctx, &set, 0);
        assert_eq!(lm.styles[1], LS_NONE);
        assert!(lm.luxels[1].is_empty());
    }

    /// Floor under a floating block, lit from straight above.
    fn shadowed_floor(options: &LightOptions, session: &CompileSession) -> (crate::scene::Scene, crate::trace::TraceTree) {
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(256.0, 0.0));
        add_box(&mut scene, 0, [96.0, 96.0, 32.0], [160.0, 160.0, 64.0]);
        let tree = build_tree(&scene, options, session);
        (scene, tree)
    }

    #[test]
    fn test_block_casts_shadow() {
        let session = CompileSession::new();
        let options = LightOptions::default();
        let (scene, tree) = shadowed_floor(&options, &session);
        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        let set = set_of(vec![point_light([128.0, 128.0, 300.0], 1.0e7)]);
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        illuminate_raw_lightmap(&mut lm, &ctx, &set, 0);
        assert_eq!(lm.luxels[0][lm.index(7, 8)][0], 0.0);
        assert!(lm.luxels[0][lm.index(0, 0)][0] > 4.0);
    }

    #[test]
    fn test_adaptive_subsamples_shadow_edge() {
        let session = CompileSession::new();
        let options = LightOptions { samples: 3, ..Default::default() };
        let (scene, tree) = shadowed_floor(&options, &session);
        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        let set = set_of(vec![point_light([128.0, 128.0, 300.0], 1.0e7)]);
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        illuminate_raw_lightmap(&mut lm, &ctx, &set, 0);
        let refined = session.stats().subsampled_luxels;
        assert!(refined > 0);
        assert!(refined < lm.num_mapped());
        assert_eq!(lm.luxels[0][lm.index(7, 8)][0], 0.0);
    }

    #[test]
    fn test_random_subsampling_is_seeded() {
        let options = LightOptions { samples: 4, sample_mode: SampleMode::Random, seed: 7, ..Default::default() };
        let run = || {
            let session = CompileSession::new();
            let (scene, tree) = shadowed_floor(&options, &session);
            let mut lm = mapped_lightmap(&scene, 0, &options, &session);
            let set = set_of(vec![point_light([128.0, 128.0, 300.0], 1.0e7)]);
            let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };
            illuminate_raw_lightmap(&mut lm, &ctx, &set, 0);
            lm.luxels[0].clone()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_store_applies_min_light_and_deluxe() {
        let session = CompileSession::new();
        let options = LightOptions { deluxemap: true, ..Default::default() };
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(64.0, 0.0));
        let tree = build_tree(&scene, &options, &session);
        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        lm.min_light = [40.0, 40.0, 40.0];
        let set = set_of(vec![point_light([32.0, 32.0, 100.0], 1.0e6)]);
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        illuminate_raw_lightmap(&mut lm, &ctx, &set, 0);
        store_raw_lightmap(&mut lm, &options);
        assert_eq!(lm.bytes[0].len(), 25);
        assert!(lm.bytes[0].iter().all(|b| b.r >= 40));
        assert_eq!(lm.style_bytes(0).len(), 75);

        // straight up encodes as +z
        let up = lm.deluxe_bytes[lm.index(2, 2)];
        assert_eq!(up.b, 255);
        assert!((up.r as i32 - 127).abs() <= 1 && (up.g as i32 - 127).abs() <= 1);
    }

    #[test]
    fn test_debug_axis_overrides_light() {
        let session = CompileSession::new();
        let options = LightOptions { debug: DebugMode::Axis, ..Default::default() };
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(32.0, 0.0));
        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        store_raw_lightmap(&mut lm, &options);
        assert!(lm.bytes[0].iter().all(|&b| b == Rgb8::new(0, 0, 255)));
    }

    #[test]
    fn test_gauss_like_random_stays_in_disc() {
        let mut rng = work_rng(1, 2, 3);
        for _ in 0..200 {
            let (x, y) = gauss_like_random(0.5, &mut rng);
            assert!((x * x + y * y).sqrt() <= 0.5 * GAUSS_SPREAD + 1e-4);
        }
    }
}
