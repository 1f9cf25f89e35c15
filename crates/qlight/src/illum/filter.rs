// filter.rs — splotch filter: fill unmapped and too-dark luxels from neighbors

use qlight_common::q_shared::{vector_add_to, vector_ma, vector_scale, Vec3, VEC3_ORIGIN};
use qlight_common::qfiles::MAX_LIGHTMAPS;

use crate::luxel::{RawLightmap, CLUSTER_FLOODED};
use crate::options::LightOptions;
use crate::session::{bump_by, CompileSession};

fn at_or_below(c: &[f32; 4], ambient: &Vec3) -> bool {
    c[0] <= ambient[0] && c[1] <= ambient[1] && c[2] <= ambient[2]
}

/// Replace each target luxel with the mean of its lit 3x3 neighbors.
/// Targets are luxels without a sample point, plus luxels no brighter than
/// ambient when `splotch_fix` is on. Filled unmapped luxels become
/// `CLUSTER_FLOODED`.
pub fn filter_raw_lightmap(lm: &mut RawLightmap, options: &LightOptions, session: &CompileSession) {
    let clusters = lm.clusters.clone();
    let ambient = lm.ambient;
    let mut flooded = vec![false; lm.num_luxels()];

    for slot in 0..MAX_LIGHTMAPS {
        if lm.luxels[slot].is_empty() {
            continue;
        }
        let source = lm.luxels[slot].clone();
        let source_dirs = if slot == 0 { lm.deluxels.clone() } else { Vec::new() };

        for y in 0..lm.height {
            for x in 0..lm.width {
                let i = lm.index(x, y);
                let target = clusters[i] < 0 || (options.splotch_fix && at_or_below(&source[i], &ambient));
                if !target {
                    continue;
                }

                let mut color = VEC3_ORIGIN;
                let mut dir = VEC3_ORIGIN;
                let mut samples = 0.0;
                for sy in y.saturating_sub(1)..=(y + 1).min(lm.height - 1) {
                    for sx in x.saturating_sub(1)..=(x + 1).min(lm.width - 1) {
                        let j = lm.index(sx, sy);
                        if j == i || clusters[j] < 0 || source[j][3] == 0.0 {
                            continue;
                        }
                        let c = [source[j][0], source[j][1], source[j][2]];
                        if options.splotch_fix && c == ambient {
                            continue;
                        }
                        vector_add_to(&c, &mut color);
                        if let Some(d) = source_dirs.get(j) {
                            vector_add_to(d, &mut dir);
                        }
                        samples += source[j][3];
                    }
                }
                if samples <= 0.0 {
                    continue;
                }
                if options.dark && slot == 0 {
                    color = vector_ma(&color, 2.0, &ambient);
                    samples += 2.0;
                }

                let avg = vector_scale(&color, 1.0 / samples);
                lm.luxels[slot][i] = [avg[0], avg[1], avg[2], 1.0];
                if slot == 0 && !source_dirs.is_empty() {
                    lm.deluxels[i] = vector_scale(&dir, 1.0 / samples);
                }
                if clusters[i] < 0 {
                    flooded[i] = true;
                }
            }
        }
    }

    let mut count = 0;
    for (i, &f) in flooded.iter().enumerate() {
        if f {
            lm.clusters[i] = CLUSTER_FLOODED;
            count += 1;
        }
    }
    bump_by(&session.counters.flooded_luxels, count);
}
