// line.rs — segment occlusion queries against the trace tree

use qlight_common::q_shared::{cross_product, dot_product, vector_ma, vector_normalize, vector_subtract, Vec3, VEC3_ORIGIN};

use crate::session::{bump, CompileSession};
use crate::shader::CompileFlags;
use crate::trace::store::{TraceInfo, TraceTriangle};
use crate::trace::tree::{NodeType, TraceTree};

pub const TRACE_ON_EPSILON: f32 = 0.1;
pub const BARY_EPSILON: f32 = 0.01;
pub const ASLF_EPSILON: f32 = 0.0001;
pub const COPLANAR_EPSILON: f32 = 0.000001;
pub const SELF_SHADOW_EPSILON: f32 = 0.5;

/// One sample's shadow query. Workers keep one and reuse it, so the
/// node list allocation survives between traces.
#[derive(Debug, Clone)]
pub struct TraceQuery {
    // input
    pub origin: Vec3,
    pub end: Vec3,
    pub normal: Vec3,
    pub cluster: i32,
    /// Surfaces the sample belongs to; ignored for hits closer than 0.5.
    pub surfaces: Vec<usize>,
    pub recv_shadows: i32,
    pub test_occlusion: bool,
    /// Trace through solid leafs (sun rays looking for sky).
    pub test_all: bool,
    pub force_sunlight: bool,
    pub two_sided: bool,
    /// Light grid query: skip triangles tagged skip-grid.
    pub grid: bool,
    pub inhibit_radius: f32,

    // derived by setup_trace
    pub displacement: Vec3,
    pub direction: Vec3,
    pub distance: f32,

    // output
    pub hit: Vec3,
    pub color: Vec3,
    pub color_no_shadow: Vec3,
    pub direction_contribution: Vec3,
    pub pass_solid: bool,
    pub opaque: bool,
    pub compile_flags: CompileFlags,
    pub force_subsampling: f32,

    pub(crate) test_nodes: Vec<usize>,
}

impl Default for TraceQuery {
    fn default() -> Self {
        Self {
            origin: VEC3_ORIGIN,
            end: VEC3_ORIGIN,
            normal: VEC3_ORIGIN,
            cluster: 0,
            surfaces: Vec::new(),
            recv_shadows: 1,
            test_occlusion: true,
            test_all: false,
            force_sunlight: false,
            two_sided: false,
            grid: false,
            inhibit_radius: 0.0,
            displacement: VEC3_ORIGIN,
            direction: VEC3_ORIGIN,
            distance: 0.0,
            hit: VEC3_ORIGIN,
            color: VEC3_ORIGIN,
            color_no_shadow: VEC3_ORIGIN,
            direction_contribution: VEC3_ORIGIN,
            pass_solid: false,
            opaque: false,
            compile_flags: CompileFlags::empty(),
            force_subsampling: 0.0,
            test_nodes: Vec::with_capacity(256),
        }
    }
}

/// Derive direction and distance from origin and end.
pub fn setup_trace(q: &mut TraceQuery) {
    q.displacement = vector_subtract(&q.end, &q.origin);
    q.direction = q.displacement;
    q.distance = vector_normalize(&mut q.direction);
    q.hit = q.origin;
}

/// Returns true when the segment reached a solid leaf.
fn trace_line_r(tree: &TraceTree, node_num: usize, origin: &Vec3, end: &Vec3, q: &mut TraceQuery) -> bool {
    let node = &tree.nodes[node_num];

    match node.node_type {
        NodeType::SolidLeaf => {
            q.hit = *origin;
            q.pass_solid = true;
            return true;
        }
        NodeType::Leaf => {
            if node.num_items > 0 {
                q.test_nodes.push(node_num);
            }
            return false;
        }
        NodeType::Split => {}
    }

    if q.test_all && node.num_items == 0 {
        return false;
    }

    let front = node.plane.distance_to(origin);
    let back = node.plane.distance_to(end);

    if front >= -TRACE_ON_EPSILON && back >= -TRACE_ON_EPSILON {
        return trace_line_r(tree, node.children[0], origin, end, q);
    }
    if front < TRACE_ON_EPSILON && back < TRACE_ON_EPSILON {
        return trace_line_r(tree, node.children[1], origin, end, q);
    }

    let side = (front < 0.0) as usize;
    let frac = front / (front - back);
    let mut mid = [0.0; 3];
    for k in 0..3 {
        mid[k] = origin[k] + (end[k] - origin[k]) * frac;
    }

    if trace_line_r(tree, node.children[side], origin, &mid, q) {
        return true;
    }
    trace_line_r(tree, node.children[side ^ 1], &mid, end, q)
}

/// Test one triangle. Returns true when the trace is finished (opaque hit).
fn trace_triangle(tree: &TraceTree, ti: &TraceInfo, tt: &TraceTriangle, q: &mut TraceQuery) -> bool {
    let si = &tree.shaders[ti.shader_num];
    let flags = si.compile_flags;

    // already reached sky
    if q.compile_flags.contains(CompileFlags::SKY) && flags.contains(CompileFlags::SKY) {
        return false;
    }
    if q.grid && ti.skip_grid {
        return false;
    }

    // shadow groups: 1 receives from the world group only, >1 from the
    // world and its own group, <0 from its own group only
    if q.recv_shadows == 1 {
        if ti.cast_shadows != 1 {
            return false;
        }
    } else if q.recv_shadows > 1 {
        if ti.cast_shadows != 1 && ti.cast_shadows != q.recv_shadows {
            return false;
        }
    } else if ti.cast_shadows != q.recv_shadows {
        return false;
    }

    let pvec = cross_product(&q.direction, &tt.edge2);
    let det = dot_product(&tt.edge1, &pvec);
    if det.abs() < COPLANAR_EPSILON {
        return false;
    }
    let inv_det = 1.0 / det;

    let tvec = vector_subtract(&q.origin, &tt.v[0].xyz);
    let u = dot_product(&tvec, &pvec) * inv_det;
    if u < -BARY_EPSILON || u > 1.0 + BARY_EPSILON {
        return false;
    }

    let qvec = cross_product(&tvec, &tt.edge1);
    let v = dot_product(&q.direction, &qvec) * inv_det;
    if v < -BARY_EPSILON || u + v > 1.0 + BARY_EPSILON {
        return false;
    }

    let depth = dot_product(&tt.edge2, &qvec) * inv_det;
    if depth <= q.inhibit_radius || depth >= q.distance {
        return false;
    }

    if depth <= SELF_SHADOW_EPSILON && q.surfaces.contains(&ti.surface_num) {
        return false;
    }

    if flags.contains(CompileFlags::SKY) {
        q.compile_flags |= flags;
        return false;
    }

    let image = match &si.light_image {
        Some(image) if flags.intersects(CompileFlags::ALPHASHADOW | CompileFlags::LIGHTFILTER) => image,
        _ => {
            q.hit = vector_ma(&q.origin, depth, &q.direction);
            q.color = VEC3_ORIGIN;
            q.opaque = true;
            return true;
        }
    };

    // texture dependent, so the caller must subsample
    q.force_subsampling = 1.0;

    // avoid double shadows on shared edges
    if u < -ASLF_EPSILON || u > 1.0 + ASLF_EPSILON || v < -ASLF_EPSILON || u + v > 1.0 + ASLF_EPSILON {
        return false;
    }

    let w = 1.0 - (u + v);
    let st = [
        w * tt.v[0].st[0] + u * tt.v[1].st[0] + v * tt.v[2].st[0],
        w * tt.v[0].st[1] + u * tt.v[1].st[1] + v * tt.v[2].st[1],
    ];
    let pixel = image.texel(&st);

    if flags.contains(CompileFlags::LIGHTFILTER) {
        for k in 0..3 {
            q.color[k] *= pixel[k] as f32 / 255.0;
        }
    }
    if flags.contains(CompileFlags::ALPHASHADOW) {
        let shadow = (255 - pixel[3]) as f32 / 255.0;
        for k in 0..3 {
            q.color[k] *= shadow;
        }
    }

    if q.color.iter().all(|&c| c <= 0.001) {
        q.color = VEC3_ORIGIN;
        q.hit = vector_ma(&q.origin, depth, &q.direction);
        q.opaque = true;
        return true;
    }
    false
}

fn test_listed_nodes(tree: &TraceTree, q: &mut TraceQuery, start: usize) -> bool {
    for i in start..q.test_nodes.len() {
        let node = &tree.nodes[q.test_nodes[i]];
        for tt in tree.leaf_triangles(node) {
            let ti = &tree.infos[tt.info_num];
            if trace_triangle(tree, ti, tt, q) {
                return true;
            }
        }
    }
    false
}

/// Trace `q.origin` to `q.end` (call `setup_trace` first). Sets
/// `pass_solid`, `opaque`, `compile_flags` and filters `q.color`.
pub fn trace_line(tree: &TraceTree, q: &mut TraceQuery, session: &CompileSession) {
    q.pass_solid = false;
    q.opaque = false;
    q.compile_flags = CompileFlags::empty();
    q.test_nodes.clear();

    if q.recv_shadows == 0 || !q.test_occlusion || q.distance <= 0.00001 {
        return;
    }
    bump(&session.counters.traces);

    let (origin, end) = (q.origin, q.end);
    trace_line_r(tree, tree.head_node, &origin, &end, q);
    if q.pass_solid && !q.test_all {
        q.opaque = true;
        return;
    }

    if test_listed_nodes(tree, q, 0) {
        return;
    }

    // rays that escaped into sky go on through the portal-sky scene
    if q.test_all && q.compile_flags.contains(CompileFlags::SKY) {
        if let Some(sky) = tree.skybox_node {
            let start = q.test_nodes.len();
            trace_line_r(tree, sky, &origin, &end, q);
            test_listed_nodes(tree, q, start);
        }
    }
}

// ============================================================
// Tests
// ============================================================
