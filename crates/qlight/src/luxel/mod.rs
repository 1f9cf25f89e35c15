// luxel — raw lightmaps: allocation, luxel mapping, per-texel storage

pub mod allocate;
pub mod map;

pub use allocate::allocate_raw_lightmaps;
pub use map::map_raw_lightmap;

use qlight_common::q_shared::{make_normal_vectors, vector_scale, CPlane, Vec2, Vec3, VEC3_ORIGIN};
use qlight_common::qfiles::{LS_NONE, LS_NORMAL, MAX_LIGHTMAPS};

use crate::color::{rgb_bytes, Rgb8};

/// Cluster sentinels for luxels without a valid sample point.
pub const CLUSTER_UNMAPPED: i32 = -1;
pub const CLUSTER_OCCLUDED: i32 = -2;
pub const CLUSTER_FLOODED: i32 = -3;

/// Accumulated color plus a sample weight in `[3]`.
pub type Luxel = [f32; 4];

/// A surface vertex in world space with its luxel-space coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MapVert {
    pub xyz: Vec3,
    pub normal: Vec3,
    pub lightmap: Vec2,
}

impl MapVert {
    pub fn midpoint(a: &MapVert, b: &MapVert) -> MapVert {
        let mid = |x: f32, y: f32| (x + y) * 0.5;
        MapVert {
            xyz: [mid(a.xyz[0], b.xyz[0]), mid(a.xyz[1], b.xyz[1]), mid(a.xyz[2], b.xyz[2])],
            normal: [
                mid(a.normal[0], b.normal[0]),
                mid(a.normal[1], b.normal[1]),
                mid(a.normal[2], b.normal[2]),
            ],
            lightmap: [mid(a.lightmap[0], b.lightmap[0]), mid(a.lightmap[1], b.lightmap[1])],
        }
    }
}

/// Per-surface raster of light samples.
#[derive(Debug, Clone)]
pub struct RawLightmap {
    pub surface_num: usize,
    pub width: usize,
    pub height: usize,
    /// World units per luxel.
    pub sample_size: f32,
    /// Dominant projection axis.
    pub axis_num: usize,
    /// Snapped lower corner of the surface bounds.
    pub mins: Vec3,
    pub maxs: Vec3,
    /// Set for planar surfaces.
    pub plane: Option<CPlane>,
    /// World position of luxel (0, 0), then the per-luxel steps along s
    /// and t. Planar surfaces only.
    pub vecs: Option<[Vec3; 3]>,
    pub verts: Vec<MapVert>,
    pub triangles: Vec<[usize; 3]>,
    /// Patch meshes map as quads where the four corners are coplanar.
    pub mesh_size: Option<(usize, usize)>,
    /// PVS clusters the surface touches.
    pub surface_clusters: Vec<i32>,

    pub styles: [u8; MAX_LIGHTMAPS],
    pub clusters: Vec<i32>,
    pub origins: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// One buffer per used style slot; empty when the slot is unused.
    pub luxels: [Vec<Luxel>; MAX_LIGHTMAPS],
    pub deluxels: Vec<Vec3>,
    /// Ambient occlusion factor, 1 = unoccluded.
    pub dirt: Vec<f32>,
    /// Floodlight color in rgb, direction weight in `[3]`.
    pub floodlight: Vec<[f32; 4]>,
    /// Style 0 light added by the most recent pass, the source for the
    /// next bounce.
    pub pass_luxels: Vec<Vec3>,

    pub two_sided: bool,
    pub recv_shadows: i32,
    pub filter_radius: f32,
    pub sample_offset: f32,
    pub min_light: Vec3,
    pub ambient: Vec3,

    /// Final output per style slot.
    pub bytes: [Vec<Rgb8>; MAX_LIGHTMAPS],
    pub deluxe_bytes: Vec<Rgb8>,
}

impl RawLightmap {
    pub fn new(surface_num: usize, width: usize, height: usize) -> Self {
        let count = width * height;
        Self {
            surface_num,
            width,
            height,
            sample_size: 16.0,
            axis_num: 2,
            mins: VEC3_ORIGIN,
            maxs: VEC3_ORIGIN,
            plane: None,
            vecs: None,
            verts: Vec::new(),
            triangles: Vec::new(),
            mesh_size: None,
            surface_clusters: Vec::new(),
            styles: [LS_NORMAL, LS_NONE, LS_NONE, LS_NONE],
            clusters: vec![CLUSTER_UNMAPPED; count],
            origins: vec![VEC3_ORIGIN; count],
            normals: vec![VEC3_ORIGIN; count],
            luxels: Default::default(),
            deluxels: Vec::new(),
            dirt: vec![1.0; count],
            floodlight: Vec::new(),
            pass_luxels: Vec::new(),
            two_sided: false,
            recv_shadows: 1,
            filter_radius: 0.0,
            sample_offset: 1.0,
            min_light: VEC3_ORIGIN,
            ambient: VEC3_ORIGIN,
            bytes: Default::default(),
            deluxe_bytes: Vec::new(),
        }
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn num_luxels(&self) -> usize {
        self.width * self.height
    }

    pub fn is_mapped(&self, i: usize) -> bool {
        self.clusters[i] >= 0
    }

    pub fn num_mapped(&self) -> usize {
        self.clusters.iter().filter(|&&c| c >= 0).count()
    }

    /// Distinct clusters of mapped luxels, for light culling.
    pub fn luxel_clusters(&self) -> Vec<i32> {
        let mut out: Vec<i32> = self.clusters.iter().copied().filter(|&c| c >= 0).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Bounds of the mapped sample origins.
    pub fn sample_bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut bounds: Option<(Vec3, Vec3)> = None;
        for (i, origin) in self.origins.iter().enumerate() {
            if self.clusters[i] < 0 {
                continue;
            }
            let (mins, maxs) = bounds.get_or_insert((*origin, *origin));
            for k in 0..3 {
                mins[k] = mins[k].min(origin[k]);
                maxs[k] = maxs[k].max(origin[k]);
            }
        }
        bounds
    }

    /// Tangent vectors at a luxel, one luxel long. Planar surfaces use the
    /// projection steps so neighbors land on the plane.
    pub fn tangents(&self, normal: &Vec3) -> (Vec3, Vec3) {
        match &self.vecs {
            Some([_, s, t]) => (*s, *t),
            None => {
                let (right, up) = make_normal_vectors(normal);
                (vector_scale(&right, self.sample_size), vector_scale(&up, self.sample_size))
            }
        }
    }

    /// Luxel-space coordinate of a world point on this surface.
    pub fn project(&self, xyz: &Vec3) -> Vec2 {
        allocate::luxel_coord(xyz, &self.mins, self.sample_size, self.axis_num)
    }

    /// Make sure the luxel buffer for `slot` exists.
    pub fn ensure_slot(&mut self, slot: usize) {
        if self.luxels[slot].is_empty() {
            self.luxels[slot] = vec![[0.0; 4]; self.num_luxels()];
        }
    }

    /// Output bytes of one style slot, three per luxel, row major.
    pub fn style_bytes(&self, slot: usize) -> &[u8] {
        rgb_bytes(&self.bytes[slot])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_lightmap_is_unmapped() {
        let lm = RawLightmap::new(3, 4, 2);
        assert_eq!(lm.num_luxels(), 8);
        assert_eq!(lm.index(1, 1), 5);
        assert_eq!(lm.num_mapped(), 0);
        assert!(lm.sample_bounds().is_none());
        assert_eq!(lm.styles[0], LS_NORMAL);
    }

    #[test]
    fn test_luxel_clusters_sorted_unique() {
        let mut lm = RawLightmap::new(0, 3, 1);
        lm.clusters = vec![4, CLUSTER_OCCLUDED, 2];
        lm.clusters.push(4);
        assert_eq!(lm.luxel_clusters(), vec![2, 4]);
    }

    #[test]
    fn test_midpoint_vert() {
        let a = MapVert { xyz: [0.0, 0.0, 0.0], normal: [0.0, 0.0, 1.0], lightmap: [0.0, 0.0] };
        let b = MapVert { xyz: [2.0, 4.0, 0.0], normal: [0.0, 0.0, 1.0], lightmap: [1.0, 3.0] };
        let m = MapVert::midpoint(&a, &b);
        assert_eq!(m.xyz, [1.0, 2.0, 0.0]);
        assert_eq!(m.lightmap, [0.5, 1.5]);
    }
}
