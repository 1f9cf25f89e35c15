// map.rs — luxel mapping: triangle rasterization into sample points

use qlight_common::bspworld::BspWorld;
use qlight_common::q_shared::{
    dot_product, plane_from_points, vector_add, vector_ma, vector_normalize, vector_scale, CPlane,
    Vec3, VEC3_ORIGIN,
};

use super::{MapVert, RawLightmap, CLUSTER_OCCLUDED, CLUSTER_UNMAPPED};
use crate::options::LightOptions;
use crate::session::{bump_by, CompileSession};

pub const LUXEL_EPSILON: f32 = 0.125;

/// Fraction of a luxel step tried in each tangent direction.
const LUXEL_NUDGE: f32 = 0.5;
const NUDGES: [[f32; 2]; 8] = [
    [1.0, 0.0],
    [0.0, 1.0],
    [-1.0, 0.0],
    [0.0, -1.0],
    [-1.0, 1.0],
    [-1.0, -1.0],
    [1.0, -1.0],
    [1.0, 1.0],
];

const QUAD_PLANAR_EPSILON: f32 = 0.5;
const AXIAL_EPSILON: f32 = 0.01;
const MIN_SUBDIVIDE_THRESHOLD: f32 = 0.05;

/// Neighborhood radius for the unmapped fill.
const FILL_RADIUS: usize = 2;

struct LuxelMapper<'a> {
    lm: &'a mut RawLightmap,
    world: &'a BspWorld,
    threshold: f32,
}

impl LuxelMapper<'_> {
    fn tangents(&self, normal: &Vec3) -> (Vec3, Vec3) {
        self.lm.tangents(normal)
    }

    /// Cluster at `origin`, trying the tangent nudges when it is in solid.
    fn resolve_cluster(&self, origin: &Vec3, right: &Vec3, up: &Vec3) -> (i32, Vec3) {
        let clusters = &self.lm.surface_clusters;
        let cluster = self.world.cluster_for_point_ext_filter(origin, LUXEL_EPSILON, clusters);
        if cluster >= 0 {
            return (cluster, *origin);
        }
        for n in NUDGES {
            let mut p = vector_ma(origin, n[0] * LUXEL_NUDGE, right);
            p = vector_ma(&p, n[1] * LUXEL_NUDGE, up);
            let cluster = self.world.cluster_for_point_ext_filter(&p, LUXEL_EPSILON, clusters);
            if cluster >= 0 {
                return (cluster, p);
            }
        }
        (CLUSTER_OCCLUDED, *origin)
    }

    /// Map one vertex to exactly one luxel.
    fn map_single_luxel(&mut self, dv: &MapVert, plane: &CPlane) {
        let lm = &*self.lm;
        let x = (dv.lightmap[0].max(0.0) as usize).min(lm.width - 1);
        let y = (dv.lightmap[1].max(0.0) as usize).min(lm.height - 1);
        let i = lm.index(x, y);

        let cluster = lm.clusters[i];
        if cluster == CLUSTER_OCCLUDED && lm.plane.is_some() {
            return;
        }
        if cluster >= 0 {
            // already mapped, only average the normal
            let n = vector_add(&self.lm.normals[i], &dv.normal);
            self.lm.normals[i] = n;
            return;
        }

        let mut origin = match &lm.vecs {
            Some([o, s, t]) => {
                let p = vector_ma(o, x as f32, s);
                vector_ma(&p, y as f32, t)
            }
            None => dv.xyz,
        };
        let normal = match &lm.plane {
            Some(p) => p.normal,
            None => plane.normal,
        };
        origin = vector_ma(&origin, lm.sample_offset, &normal);

        let (right, up) = self.tangents(&normal);
        let (cluster, origin) = self.resolve_cluster(&origin, &right, &up);
        self.lm.clusters[i] = cluster;
        self.lm.origins[i] = origin;
        self.lm.normals[i] = if dv.normal == VEC3_ORIGIN { normal } else { dv.normal };
    }

    fn map_triangle_r(&mut self, dv: [MapVert; 3], plane: &CPlane) {
        let mut max = None;
        let mut max_dist = 0.0;
        for i in 0..3 {
            let a = dv[i].lightmap;
            let b = dv[(i + 1) % 3].lightmap;
            let dist = (a[0] - b[0]) * (a[0] - b[0]) + (a[1] - b[1]) * (a[1] - b[1]);
            if dist > max_dist {
                max_dist = dist;
                max = Some(i);
            }
        }
        let Some(max) = max else { return };
        if max_dist <= self.threshold {
            return;
        }

        let mid = MapVert::midpoint(&dv[max], &dv[(max + 1) % 3]);
        self.map_single_luxel(&mid, plane);

        let mut first = dv;
        first[max] = mid;
        self.map_triangle_r(first, plane);

        let mut second = dv;
        second[(max + 1) % 3] = mid;
        self.map_triangle_r(second, plane);
    }

    /// Map a triangle's corners and then either its axial edges only or
    /// its whole area.
    fn map_triangle(&mut self, dv: [MapVert; 3], plane: Option<CPlane>, map_non_axial: bool) -> bool {
        let plane = match self.lm.plane.or(plane) {
            Some(p) => p,
            None => match plane_from_points(&dv[0].xyz, &dv[1].xyz, &dv[2].xyz) {
                Some(p) => p,
                None => return false,
            },
        };

        for v in &dv {
            self.map_single_luxel(v, &plane);
        }

        if map_non_axial {
            self.map_triangle_r(dv, &plane);
            return true;
        }

        // axial edges first so they land on luxel rows cleanly
        for i in 0..3 {
            let a = dv[i].lightmap;
            let b = dv[(i + 1) % 3].lightmap;
            if (a[0] - b[0]).abs() < AXIAL_EPSILON || (a[1] - b[1]).abs() < AXIAL_EPSILON {
                let next = dv[(i + 1) % 3];
                self.map_triangle_r([dv[i], next, next], &plane);
            }
        }
        true
    }

    fn tri(&self, t: &[usize; 3]) -> [MapVert; 3] {
        [self.lm.verts[t[0]], self.lm.verts[t[1]], self.lm.verts[t[2]]]
    }

    /// Patch quads whose corners are coplanar map with one shared plane.
    /// Returns the number of quads that needed two planes.
    fn map_mesh_quads(&mut self, width: usize, height: usize) -> usize {
        let mut non_planar = 0;
        for y in 0..height - 1 {
            for x in 0..width - 1 {
                let a = self.lm.verts[x + y * width];
                let b = self.lm.verts[x + (y + 1) * width];
                let c = self.lm.verts[x + 1 + (y + 1) * width];
                let d = self.lm.verts[x + 1 + y * width];

                let plane = plane_from_points(&a.xyz, &b.xyz, &c.xyz)
                    .filter(|p| (dot_product(&d.xyz, &p.normal) - p.dist).abs() <= QUAD_PLANAR_EPSILON);
                if plane.is_none() {
                    non_planar += 1;
                }
                self.map_triangle([a, b, c], plane, true);
                self.map_triangle([a, c, d], plane, true);
            }
        }
        non_planar
    }

    /// Give unmapped luxels next to mapped ones a sample point, averaging
    /// the neighbors weighted by inverse distance.
    fn fill_unmapped(&mut self) {
        let (w, h) = (self.lm.width, self.lm.height);
        for radius in 1..=FILL_RADIUS {
            let sources = self.lm.clusters.clone();
            for y in 0..h {
                for x in 0..w {
                    let i = self.lm.index(x, y);
                    if sources[i] != CLUSTER_UNMAPPED {
                        continue;
                    }

                    let mut origin = VEC3_ORIGIN;
                    let mut normal = VEC3_ORIGIN;
                    let mut total = 0.0;
                    let y0 = y.saturating_sub(radius);
                    let x0 = x.saturating_sub(radius);
                    for sy in y0..=(y + radius).min(h - 1) {
                        for sx in x0..=(x + radius).min(w - 1) {
                            let j = self.lm.index(sx, sy);
                            if sources[j] < 0 {
                                continue;
                            }
                            let dx = sx as f32 - x as f32;
                            let dy = sy as f32 - y as f32;
                            let weight = 1.0 / (dx * dx + dy * dy).sqrt();
                            origin = vector_ma(&origin, weight, &self.lm.origins[j]);
                            normal = vector_ma(&normal, weight, &self.lm.normals[j]);
                            total += weight;
                        }
                    }
                    if total <= 0.0 || vector_normalize(&mut normal) == 0.0 {
                        continue;
                    }

                    let origin = match (&self.lm.vecs, &self.lm.plane) {
                        (Some([o, s, t]), Some(p)) => {
                            let center = vector_ma(&vector_ma(o, x as f32, s), y as f32, t);
                            vector_ma(&center, self.lm.sample_offset, &p.normal)
                        }
                        _ => vector_scale(&origin, 1.0 / total),
                    };
                    let (right, up) = self.tangents(&normal);
                    let (cluster, origin) = self.resolve_cluster(&origin, &right, &up);
                    if cluster < 0 {
                        continue;
                    }
                    self.lm.clusters[i] = cluster;
                    self.lm.origins[i] = origin;
                    self.lm.normals[i] = normal;
                }
            }
        }
    }
}

/// Find a world sample point, normal and cluster for every luxel the
/// surface covers.
pub fn map_raw_lightmap(lm: &mut RawLightmap, world: &BspWorld, options: &LightOptions, session: &CompileSession) {
    let triangles = lm.triangles.clone();
    let mesh_size = lm.mesh_size;
    let surface_num = lm.surface_num;
    let mut mapper = LuxelMapper {
        lm,
        world,
        threshold: options.subdivide_threshold.max(MIN_SUBDIVIDE_THRESHOLD),
    };

    for t in &triangles {
        let dv = mapper.tri(t);
        mapper.map_triangle(dv, None, false);
    }

    match mesh_size {
        Some((w, h)) if w >= 2 && h >= 2 => {
            let non_planar = mapper.map_mesh_quads(w, h);
            if non_planar > 0 {
                session.warn(format!("surface {}: {} non-planar patch quads\n", surface_num, non_planar));
            }
        }
        _ => {
            for t in &triangles {
                let dv = mapper.tri(t);
                mapper.map_triangle(dv, None, true);
            }
        }
    }

    let lm = mapper.lm;
    for i in 0..lm.num_luxels() {
        if lm.clusters[i] >= 0 && vector_normalize(&mut lm.normals[i]) == 0.0 {
            lm.normals[i] = lm.plane.map(|p| p.normal).unwrap_or([0.0, 0.0, 1.0]);
        }
    }

    let mut mapper = LuxelMapper { lm, world, threshold: 0.0 };
    mapper.fill_unmapped();
    let lm = mapper.lm;

    let mapped = lm.clusters.iter().filter(|&&c| c >= 0).count();
    let occluded = lm.clusters.iter().filter(|&&c| c == CLUSTER_OCCLUDED).count();
    bump_by(&session.counters.mapped_luxels, mapped);
    bump_by(&session.counters.occluded_luxels, occluded);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::luxel::allocate::allocate_raw_lightmap;
    use crate::testutil::{add_quad, floor_quad, open_scene, room_scene};

    #[test]
    fn test_floor_fully_mapped() {
        let session = CompileSession::new();
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(64.0, 0.0));
        let options = LightOptions::default();
        let mut lm = allocate_raw_lightmap(&scene, 0, &options, &session).unwrap();
        map_raw_lightmap(&mut lm, &scene.world, &options, &session);

        assert_eq!(lm.num_mapped(), lm.num_luxels());
        let i = lm.index(2, 3);
        assert_eq!(lm.origins[i], [32.0, 48.0, 1.0]);
        assert_eq!(lm.normals[i], [0.0, 0.0, 1.0]);
        assert_eq!(session.stats().mapped_luxels, 25);
    }

    #[test]
    fn test_room_floor_edges_nudge_inside() {
        let session = CompileSession::new();
        let scene = room_scene([0.0, 0.0, 0.0], [64.0, 64.0, 64.0]);
        let options = LightOptions::default();
        // surface 1 is the floor
        let mut lm = allocate_raw_lightmap(&scene, 1, &options, &session).unwrap();
        map_raw_lightmap(&mut lm, &scene.world, &options, &session);

        for i in 0..lm.num_luxels() {
            if lm.clusters[i] >= 0 {
                let o = lm.origins[i];
                assert!(o[0] >= 0.0 && o[0] < 64.0 && o[1] >= 0.0 && o[1] < 64.0);
                assert!((o[2] - 1.0).abs() < 1e-4);
            }
        }
        assert_eq!(lm.clusters[lm.index(0, 0)], 0);
        // the far corner sits on the solid walls and is nudged back in
        let far = lm.index(4, 4);
        assert_eq!(lm.clusters[far], 0);
        assert_eq!(lm.origins[far], [56.0, 56.0, 1.0]);
    }

    #[test]
    fn test_triangle_leaves_far_corner_for_fill() {
        let session = CompileSession::new();
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(128.0, 0.0));
        // keep only the first triangle
        scene.surfaces[0].num_indexes = 3;
        let options = LightOptions::default();
        let mut lm = allocate_raw_lightmap(&scene, 0, &options, &session).unwrap();
        map_raw_lightmap(&mut lm, &scene.world, &options, &session);
        assert_eq!(lm.clusters[lm.index(8, 0)], CLUSTER_UNMAPPED);
        assert!(lm.clusters[lm.index(0, 8)] >= 0);
    }
}
