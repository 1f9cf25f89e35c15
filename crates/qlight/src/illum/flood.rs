// flood.rs — floodlight: sky-independent fill light scaled by openness

use qlight_common::q_shared::{tangent_frame, vector_length, vector_ma, vector_subtract, Vec3};

use crate::luxel::RawLightmap;
use crate::options::LightOptions;
use crate::sample::SampleContext;
use crate::shader::{CompileFlags, FloodlightDef, ShaderInfo};
use crate::trace::{setup_trace, trace_line, TraceQuery};

pub const FLOOD_CONE_ANGLE: f32 = 88.0;
pub const FLOOD_NUM_ANGLE_STEPS: usize = 16;
pub const FLOOD_NUM_ELEVATION_STEPS: usize = 4;

/// Weight given to the floodlight when it feeds the direction map.
const FLOOD_DIRECTION_SCALE: f32 = 1.0;

pub fn floodlight_vectors() -> Vec<Vec3> {
    let angle_step = (360.0 / FLOOD_NUM_ANGLE_STEPS as f32).to_radians();
    let elevation_step = (FLOOD_CONE_ANGLE / FLOOD_NUM_ELEVATION_STEPS as f32).to_radians();
    (0..FLOOD_NUM_ANGLE_STEPS)
        .flat_map(|i| {
            let angle = i as f32 * angle_step;
            (0..FLOOD_NUM_ELEVATION_STEPS).map(move |j| {
                let elevation = elevation_step * 0.5 + j as f32 * elevation_step;
                [elevation.sin() * angle.cos(), elevation.sin() * angle.sin(), elevation.cos()]
            })
        })
        .collect()
}

/// The floodlight a surface gets: its shader's own, else the global one
/// when enabled.
pub fn floodlight_def(options: &LightOptions, shader: &ShaderInfo) -> Option<FloodlightDef> {
    if let Some(def) = shader.floodlight {
        return (def.intensity > 0.0).then_some(def);
    }
    if !options.floodlight || options.floodlight_intensity <= 0.0 {
        return None;
    }
    Some(FloodlightDef {
        color: options.floodlight_color,
        distance: options.floodlight_distance,
        intensity: options.floodlight_intensity,
    })
}

/// Fraction of the hemisphere that is open out to `distance`. Sky and
/// translucent hits count as open, nearer hits count proportionally.
pub fn floodlight_for_sample(ctx: &SampleContext, q: &mut TraceQuery, distance: f32, vectors: &[Vec3]) -> f32 {
    if q.cluster < 0 || vectors.is_empty() {
        return 0.0;
    }
    let distance = distance.max(1.0);
    let normal = q.normal;
    let (right, up) = tangent_frame(&normal);

    let mut sum = 0.0;
    for v in vectors {
        let direction = [
            right[0] * v[0] + up[0] * v[1] + normal[0] * v[2],
            right[1] * v[0] + up[1] * v[1] + normal[1] * v[2],
            right[2] * v[0] + up[2] * v[1] + normal[2] * v[2],
        ];
        q.end = vector_ma(&q.origin, distance, &direction);
        setup_trace(q);
        q.color = [1.0; 3];
        trace_line(ctx.tree, q, ctx.session);

        let contribution = if q.compile_flags.intersects(CompileFlags::SKY | CompileFlags::TRANSLUCENT) {
            1.0
        } else if q.opaque {
            (vector_length(&vector_subtract(&q.hit, &q.origin)) / distance).min(1.0)
        } else {
            1.0
        };
        sum += contribution;
    }
    (sum / vectors.len() as f32).clamp(0.0, 1.0)
}

/// Fill `lm.floodlight` for every mapped luxel and smooth it across
/// mapped neighbors.
pub fn floodlight_raw_lightmap(lm: &mut RawLightmap, ctx: &SampleContext, def: &FloodlightDef, vectors: &[Vec3]) {
    let n = lm.num_luxels();
    let mut q = TraceQuery {
        surfaces: vec![lm.surface_num],
        recv_shadows: lm.recv_shadows,
        ..Default::default()
    };

    let mut raw = vec![[0.0f32; 4]; n];
    for (i, f) in raw.iter_mut().enumerate() {
        if !lm.is_mapped(i) {
            continue;
        }
        q.cluster = lm.clusters[i];
        q.origin = lm.origins[i];
        q.normal = lm.normals[i];
        let amount = floodlight_for_sample(ctx, &mut q, def.distance, vectors) * def.intensity;
        *f = [def.color[0] * amount, def.color[1] * amount, def.color[2] * amount, FLOOD_DIRECTION_SCALE];
    }

    lm.floodlight = raw.clone();
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
                    let j = lm.index(sx, sy);
                    if j == i || !lm.is_mapped(j) || raw[j][0] + raw[j][1] + raw[j][2] <= 0.0 {
                        continue;
                    }
                    for k in 0..3 {
                        average[k] += raw[j][k];
                    }
                    samples += 1.0;
                }
            }
            for k in 0..3 {
                lm.floodlight[i][k] = average[k] / samples;
            }
        }
    }
}
