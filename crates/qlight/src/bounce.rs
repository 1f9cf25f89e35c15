// bounce.rs — radiosity: turn last pass's lit surfaces into area emitters

use qlight_common::q_shared::{
    color_normalize, vector_add_to, vector_length, vector_lerp, vector_scale, vector_subtract, Vec3, VEC3_ORIGIN,
};

use crate::lights::area::{area_light, Emission};
use crate::lights::{LightFlags, LightSet};
use crate::luxel::{MapVert, RawLightmap};
use crate::options::LightOptions;
use crate::scene::Scene;
use crate::session::{bump, CompileSession};
use crate::shader::{CompileFlags, ShaderInfo};

const MIN_BOUNCE_SUBDIVIDE: f32 = 8.0;
const WHITE: Vec3 = [1.0, 1.0, 1.0];

fn subdivide_map_triangle(tri: [MapVert; 3], max_edge: f32, out: &mut Vec<[MapVert; 3]>) {
    let mut longest = 0;
    let mut longest_len = 0.0;
    for i in 0..3 {
        let len = vector_length(&vector_subtract(&tri[(i + 1) % 3].xyz, &tri[i].xyz));
        if len > longest_len {
            longest = i;
            longest_len = len;
        }
    }
    if longest_len <= max_edge {
        out.push(tri);
        return;
    }
    let mid = MapVert::midpoint(&tri[longest], &tri[(longest + 1) % 3]);
    let mut first = tri;
    first[(longest + 1) % 3] = mid;
    subdivide_map_triangle(first, max_edge, out);
    let mut second = tri;
    second[longest] = mid;
    subdivide_map_triangle(second, max_edge, out);
}

/// Mean pass light over the mapped luxels under a triangle's luxel-space
/// bounds.
fn average_pass_light(lm: &RawLightmap, tri: &[MapVert; 3]) -> Option<Vec3> {
    let mut min_s = f32::MAX;
    let mut min_t = f32::MAX;
    let mut max_s = f32::MIN;
    let mut max_t = f32::MIN;
    for v in tri {
        min_s = min_s.min(v.lightmap[0]);
        min_t = min_t.min(v.lightmap[1]);
        max_s = max_s.max(v.lightmap[0]);
        max_t = max_t.max(v.lightmap[1]);
    }
    let clamp = |v: f32, size: usize| (v.max(0.0) as usize).min(size - 1);
    let (x0, x1) = (clamp(min_s.floor(), lm.width), clamp(max_s.ceil() - 1.0, lm.width));
    let (y0, y1) = (clamp(min_t.floor(), lm.height), clamp(max_t.ceil() - 1.0, lm.height));

    let mut sum = VEC3_ORIGIN;
    let mut count = 0;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let i = lm.index(x, y);
            if !lm.is_mapped(i) {
                continue;
            }
            vector_add_to(&lm.pass_luxels[i], &mut sum);
            count += 1;
        }
    }
    (count > 0).then(|| vector_scale(&sum, 1.0 / count as f32))
}

fn reflects(shader: &ShaderInfo) -> bool {
    shader.bounce_scale > 0.0
        && shader.surface_light <= 0.0
        && !shader.compile_flags.intersects(CompileFlags::SKY | CompileFlags::NODRAW | CompileFlags::TRANSLUCENT)
}

/// Build the emitters for the next bounce. Every lightmapped surface is cut
/// into pieces no longer than `bounce_subdivide`; each piece re-emits the
/// mean light its luxels received in the last pass, tinted by the surface
/// reflectance.
pub fn create_bounce_lights(
    scene: &Scene,
    lightmaps: &[RawLightmap],
    options: &LightOptions,
    session: &CompileSession,
) -> LightSet {
    let mut set = LightSet::new();
    let max_edge = options.bounce_subdivide.max(MIN_BOUNCE_SUBDIVIDE);

    for lm in lightmaps {
        if lm.pass_luxels.len() != lm.num_luxels() || lm.num_luxels() == 0 {
            continue;
        }
        let shader = scene.shader(&scene.surfaces[lm.surface_num]);
        if !reflects(shader) {
            continue;
        }
        let reflectance = vector_lerp(&WHITE, &shader.average_color, options.bounce_color_ratio);

        let mut pieces = Vec::new();
        for t in &lm.triangles {
            subdivide_map_triangle(t.map(|i| lm.verts[i]), max_edge, &mut pieces);
        }
        for piece in pieces {
            let Some(average) = average_pass_light(lm, &piece) else {
                continue;
            };
            let mut color = [average[0] * reflectance[0], average[1] * reflectance[1], average[2] * reflectance[2]];
            let value = color_normalize(&mut color);
            if value <= 0.0 {
                continue;
            }
            let emission = Emission {
                value,
                color,
                scale: options.bounce_scale * shader.bounce_scale,
                style: 0,
                two_sided: shader.two_sided,
                filter_radius: 0.0,
            };
            let points = piece.map(|v| v.xyz);
            let Some(mut light) = area_light(&points, &emission, options) else {
                continue;
            };
            if options.fast_bounce {
                light.flags |= LightFlags::FAST;
            }
            set.push(light);
            bump(&session.counters.bounce_lights);
        }
    }
    set
}
