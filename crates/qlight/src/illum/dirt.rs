// dirt.rs — ambient occlusion ("dirt") per luxel

use qlight_common::q_shared::{tangent_frame, vector_length, vector_ma, vector_subtract, Vec3, Q_PI};
use rand::rngs::StdRng;
use rand::Rng;

use super::work_rng;
use crate::error::LightError;
use crate::luxel::RawLightmap;
use crate::options::DirtMode;
use crate::sample::SampleContext;
use crate::shader::CompileFlags;
use crate::trace::{setup_trace, trace_line, TraceQuery};

/// Half-angle of the gathered cone, in degrees.
pub const DIRT_CONE_ANGLE: f32 = 88.0;
pub const DIRT_NUM_ANGLE_STEPS: usize = 16;
pub const DIRT_NUM_ELEVATION_STEPS: usize = 3;
pub const MAX_DIRT_VECTORS: usize = 256;

const DIRT_SALT: u64 = 0xD1;

/// Hemisphere directions around +z, elevation steps centered in their band.
pub fn dirt_vectors() -> Result<Vec<Vec3>, LightError> {
    let count = DIRT_NUM_ANGLE_STEPS * DIRT_NUM_ELEVATION_STEPS;
    if count > MAX_DIRT_VECTORS {
        return Err(LightError::capacity("dirt vectors", MAX_DIRT_VECTORS));
    }
    let angle_step = (360.0 / DIRT_NUM_ANGLE_STEPS as f32).to_radians();
    let elevation_step = (DIRT_CONE_ANGLE / DIRT_NUM_ELEVATION_STEPS as f32).to_radians();

    let mut out = Vec::with_capacity(count);
    for i in 0..DIRT_NUM_ANGLE_STEPS {
        let angle = i as f32 * angle_step;
        for j in 0..DIRT_NUM_ELEVATION_STEPS {
            let elevation = elevation_step * 0.5 + j as f32 * elevation_step;
            out.push([elevation.sin() * angle.cos(), elevation.sin() * angle.sin(), elevation.cos()]);
        }
    }
    Ok(out)
}

/// Map a tangent-space direction onto the frame of `normal`.
fn to_world(right: &Vec3, up: &Vec3, normal: &Vec3, v: &Vec3) -> Vec3 {
    [
        right[0] * v[0] + up[0] * v[1] + normal[0] * v[2],
        right[1] * v[0] + up[1] * v[1] + normal[1] * v[2],
        right[2] * v[0] + up[2] * v[1] + normal[2] * v[2],
    ]
}

/// Occlusion term 1 - gathered, so 1 means fully open. `q.origin`,
/// `q.normal` and `q.cluster` describe the sample.
pub fn dirt_for_sample(ctx: &SampleContext, q: &mut TraceQuery, vectors: &[Vec3], rng: &mut StdRng) -> f32 {
    let options = ctx.options;
    if q.cluster < 0 {
        return 0.0;
    }
    let depth = options.dirt_depth.max(1.0);
    let normal = q.normal;
    let (right, up) = tangent_frame(&normal);

    let mut gather = 0.0;
    let mut shoot = |q: &mut TraceQuery, direction: &Vec3, skip_sky: bool| {
        q.end = vector_ma(&q.origin, depth, direction);
        setup_trace(q);
        q.color = [1.0; 3];
        trace_line(ctx.tree, q, ctx.session);
        if q.opaque && !(skip_sky && q.compile_flags.contains(CompileFlags::SKY)) {
            let d = vector_length(&vector_subtract(&q.hit, &q.origin));
            gather += 1.0 - d / depth;
        }
    };

    match options.dirt_mode {
        DirtMode::Random => {
            for _ in 0..vectors.len() {
                let angle = rng.gen::<f32>() * 2.0 * Q_PI;
                let elevation = rng.gen::<f32>() * DIRT_CONE_ANGLE.to_radians();
                let v = [angle.cos() * elevation.sin(), angle.sin() * elevation.sin(), elevation.cos()];
                shoot(q, &to_world(&right, &up, &normal, &v), true);
            }
        }
        DirtMode::Ordered => {
            for v in vectors {
                shoot(q, &to_world(&right, &up, &normal, v), false);
            }
        }
    }
    shoot(q, &normal, false);

    if gather <= 0.0 {
        return 1.0;
    }
    let mut out = (gather / (vectors.len() + 1) as f32).powf(options.dirt_gain).min(1.0);
    out = (out * options.dirt_scale).min(1.0);
    1.0 - out
}

/// Fill `lm.dirt` for every mapped luxel, then soften it with its mapped
/// neighbors.
pub fn dirty_raw_lightmap(lm: &mut RawLightmap, ctx: &SampleContext, vectors: &[Vec3]) {
    let n = lm.num_luxels();
    let mut rng = work_rng(ctx.options.seed, lm.surface_num, DIRT_SALT);
    let mut q = TraceQuery {
        surfaces: vec![lm.surface_num],
        recv_shadows: lm.recv_shadows,
        ..Default::default()
    };

    let mut raw = vec![0.0f32; n];
    for (i, d) in raw.iter_mut().enumerate() {
        if !lm.is_mapped(i) {
            continue;
        }
        q.cluster = lm.clusters[i];
        q.origin = lm.origins[i];
        q.normal = lm.normals[i];
        *d = dirt_for_sample(ctx, &mut q, vectors, &mut rng);
    }

    for y in 0..lm.height {
        for x in 0..lm.width {
            let i = lm.index(x, y);
            if !lm.is_mapped(i) {
                continue;
            }
            let mut average = raw[i];
            let mut samples = 1.0;
            for sy in y.saturating_sub(1)..=(y + 1).min(lm.height - 1) {
                for sx in x.saturating_sub(1)..=(x + 1).min(lm.width - 1) {
                    if sx == x && sy == y {
                        continue;
                    }
                    let j = lm.index(sx, sy);
                    if !lm.is_mapped(j) || raw[j] <= 0.0 {
                        continue;
                    }
                    average += raw[j];
                    samples += 1.0;
                }
            }
            lm.dirt[i] = average / samples;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::LightOptions;
    use crate::session::CompileSession;
    use crate::testutil::{add_box, add_quad, build_tree, floor_quad, mapped_lightmap, open_scene};
    use qlight_common::q_shared::dot_product;

    #[test]
    fn test_vectors_fill_cone() {
        let vectors = dirt_vectors().unwrap();
        assert_eq!(vectors.len(), 48);
        let min_z = (DIRT_CONE_ANGLE.to_radians() * (5.0 / 6.0)).cos();
        for v in &vectors {
            assert!((dot_product(v, v) - 1.0).abs() < 1e-5);
            assert!(v[2] >= min_z - 1e-5);
        }
    }

    #[test]
    fn test_open_floor_is_clean() {
        let session = CompileSession::new();
        let options = LightOptions { dirty: true, ..Default::default() };
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(64.0, 0.0));
        let tree = build_tree(&scene, &options, &session);
        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        dirty_raw_lightmap(&mut lm, &ctx, &dirt_vectors().unwrap());
        assert!(lm.dirt.iter().all(|&d| d == 1.0));
    }

    #[test]
    fn test_low_ceiling_darkens() {
        let session = CompileSession::new();
        let options = LightOptions { dirty: true, ..Default::default() };
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(256.0, 0.0));
        // slab hovering 8 units over the middle of the floor
        add_box(&mut scene, 0, [64.0, 64.0, 8.0], [192.0, 192.0, 16.0]);
        let tree = build_tree(&scene, &options, &session);
        let mut lm = mapped_lightmap(&scene, 0, &options, &session);
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        dirty_raw_lightmap(&mut lm, &ctx, &dirt_vectors().unwrap());
        let under = lm.dirt[lm.index(7, 8)];
        let open = lm.dirt[lm.index(0, 0)];
        assert!(under < 0.5, "under slab {}", under);
        assert!(open > under);
    }
}
