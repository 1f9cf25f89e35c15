// bspworld.rs — read-only compiled world: BSP tree, brushes and PVS queries

use crate::common::{com_dprintf, com_error};
use crate::q_shared::{
    add_point_to_bounds, clear_bounds, dot_product, CPlane, Vec3, CONTENTS_SOLID, ERR_FATAL,
    MASK_OPAQUE,
};
use crate::qfiles::{
    DBrush, DBrushSide, DLeaf, DNode, DVIS_PVS, MAX_MAP_BRUSHES, MAX_MAP_BRUSHSIDES,
    MAX_MAP_LEAFBRUSHES, MAX_MAP_LEAFS, MAX_MAP_NODES, MAX_MAP_PLANES, MAX_MAP_VISIBILITY,
};
use rayon::prelude::*;

// ============================================================
// Visibility data helper
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct VisData {
    pub numclusters: i32,
    /// bitofs[cluster][0] = PVS offset into the visibility lump
    pub bitofs: Vec<[i32; 2]>,
}

/// Everything the BSP stage hands over, in lump order.
#[derive(Debug, Clone, Default)]
pub struct WorldParts {
    pub planes: Vec<CPlane>,
    pub nodes: Vec<DNode>,
    pub leafs: Vec<DLeaf>,
    pub leafbrushes: Vec<u32>,
    pub brushes: Vec<DBrush>,
    pub brushsides: Vec<DBrushSide>,
    /// Visibility lump: `numclusters`, then `[pvs, phs]` offsets per cluster,
    /// then run-length compressed rows. Empty means everything sees everything.
    pub visibility: Vec<u8>,
}

const PARALLEL_VIS_THRESHOLD: usize = 64;

// ============================================================
// World
// ============================================================

pub struct BspWorld {
    pub map_planes: Vec<CPlane>,
    pub map_nodes: Vec<DNode>,
    pub map_leafs: Vec<DLeaf>,
    pub map_leafbrushes: Vec<u32>,
    pub map_brushes: Vec<DBrush>,
    pub map_brushsides: Vec<DBrushSide>,
    pub map_visibility: Vec<u8>,
    pub vis_data: VisData,

    pub numclusters: usize,
    /// Bytes per decompressed PVS row.
    pub row_bytes: usize,
    /// Every cluster's decompressed PVS row, back to back.
    pvs_rows: Vec<u8>,
    /// Per brush: does it stop light.
    opaque_brushes: Vec<bool>,
}

impl BspWorld {
    pub fn new(parts: WorldParts) -> Self {
        if parts.planes.len() > MAX_MAP_PLANES {
            com_error(ERR_FATAL, "Map has too many planes");
        }
        if parts.nodes.len() > MAX_MAP_NODES {
            com_error(ERR_FATAL, "Map has too many nodes");
        }
        if parts.leafs.is_empty() {
            com_error(ERR_FATAL, "Map with no leafs");
        }
        if parts.leafs.len() > MAX_MAP_LEAFS {
            com_error(ERR_FATAL, "Map has too many leafs");
        }
        if parts.leafbrushes.len() > MAX_MAP_LEAFBRUSHES {
            com_error(ERR_FATAL, "Map has too many leafbrushes");
        }
        if parts.brushes.len() > MAX_MAP_BRUSHES {
            com_error(ERR_FATAL, "Map has too many brushes");
        }
        if parts.brushsides.len() > MAX_MAP_BRUSHSIDES {
            com_error(ERR_FATAL, "Map has too many brushsides");
        }
        if parts.visibility.len() > MAX_MAP_VISIBILITY {
            com_error(ERR_FATAL, "Map has too large visibility lump");
        }

        let opaque_brushes = parts
            .brushes
            .iter()
            .map(|b| b.contents & MASK_OPAQUE != 0)
            .collect();

        let max_cluster = parts.leafs.iter().map(|l| l.cluster).max().unwrap_or(-1);

        let mut world = Self {
            map_planes: parts.planes,
            map_nodes: parts.nodes,
            map_leafs: parts.leafs,
            map_leafbrushes: parts.leafbrushes,
            map_brushes: parts.brushes,
            map_brushsides: parts.brushsides,
            map_visibility: parts.visibility,
            vis_data: VisData::default(),
            numclusters: 0,
            row_bytes: 0,
            pvs_rows: Vec::new(),
            opaque_brushes,
        };

        world.load_visibility((max_cluster + 1).max(0) as usize);
        world
    }

    /// A world with a single open leaf covering everything. Every point is
    /// in cluster 0.
    pub fn open() -> Self {
        Self::new(WorldParts {
            leafs: vec![DLeaf {
                contents: 0,
                cluster: 0,
                mins: [-65536.0; 3],
                maxs: [65536.0; 3],
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    /// A sealed room: one open leaf (cluster 0) inside `mins`..`maxs`,
    /// solid leafs beyond each of the six walls.
    pub fn sealed_box(mins: Vec3, maxs: Vec3) -> Self {
        let mut parts = WorldParts::default();
        // leaf 0 is the room, leaf 1 is shared solid
        parts.leafs.push(DLeaf {
            contents: 0,
            cluster: 0,
            mins,
            maxs,
            ..Default::default()
        });
        parts.leafs.push(DLeaf {
            contents: CONTENTS_SOLID,
            cluster: -1,
            mins: [-65536.0; 3],
            maxs: [65536.0; 3],
            ..Default::default()
        });
        const SOLID: i32 = -2;
        const ROOM: i32 = -1;
        for axis in 0..3 {
            let mut normal = [0.0; 3];
            normal[axis] = 1.0;
            // outside the max wall is solid
            parts.planes.push(CPlane::new(normal, maxs[axis]));
            let next = parts.nodes.len() as i32 + 1;
            parts.nodes.push(DNode {
                planenum: parts.planes.len() as i32 - 1,
                children: [SOLID, next],
            });
            // behind the min wall is solid
            parts.planes.push(CPlane::new(normal, mins[axis]));
            let next = if axis == 2 { ROOM } else { parts.nodes.len() as i32 + 1 };
            parts.nodes.push(DNode {
                planenum: parts.planes.len() as i32 - 1,
                children: [next, SOLID],
            });
        }
        Self::new(parts)
    }

    // ============================================================
    // PVS
    // ============================================================

    fn read_i32_le(data: &[u8], offset: usize) -> i32 {
        if offset + 4 > data.len() {
            return 0;
        }
        i32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
    }

    fn load_visibility(&mut self, leaf_clusters: usize) {
        if self.map_visibility.len() >= 4 {
            let numclusters = Self::read_i32_le(&self.map_visibility, 0).max(0);
            self.vis_data.numclusters = numclusters;
            self.vis_data.bitofs = (0..numclusters as usize)
                .map(|i| {
                    [
                        Self::read_i32_le(&self.map_visibility, 4 + i * 8),
                        Self::read_i32_le(&self.map_visibility, 8 + i * 8),
                    ]
                })
                .collect();
            self.numclusters = numclusters as usize;
        } else {
            self.numclusters = leaf_clusters;
        }
        self.row_bytes = (self.numclusters + 7) >> 3;

        let row = self.row_bytes;
        let clusters = self.numclusters;
        let world = &*self;
        let rows: Vec<Vec<u8>> = if clusters >= PARALLEL_VIS_THRESHOLD {
            (0..clusters)
                .into_par_iter()
                .map(|c| {
                    let mut out = vec![0u8; row];
                    world.decompress_vis(world.pvs_offset(c), &mut out);
                    out
                })
                .collect()
        } else {
            (0..clusters)
                .map(|c| {
                    let mut out = vec![0u8; row];
                    world.decompress_vis(world.pvs_offset(c), &mut out);
                    out
                })
                .collect()
        };
        self.pvs_rows = rows.concat();
    }

    fn pvs_offset(&self, cluster: usize) -> usize {
        self.vis_data
            .bitofs
            .get(cluster)
            .map(|ofs| ofs[DVIS_PVS].max(0) as usize)
            .unwrap_or(0)
    }

    /// Expand one run-length compressed PVS row. No vis data means
    /// everything is visible.
    pub fn decompress_vis(&self, in_offset: usize, out: &mut [u8]) {
        let row = self.row_bytes.min(out.len());
        let mut out_p = 0;

        if in_offset == 0 || self.map_visibility.is_empty() {
            // no vis info, make all visible
            out[..row].fill(0xff);
            return;
        }

        let vis = &self.map_visibility;
        let mut inp = in_offset;

        while out_p < row {
            if inp >= vis.len() {
                break;
            }
            if vis[inp] != 0 {
                out[out_p] = vis[inp];
                out_p += 1;
                inp += 1;
                continue;
            }

            // Run-length zero
            if inp + 1 >= vis.len() {
                break;
            }
            let mut c = vis[inp + 1] as usize;
            inp += 2;
            if out_p + c > row {
                c = row - out_p;
                com_dprintf("warning: Vis decompression overrun\n");
            }
            out[out_p..out_p + c].fill(0);
            out_p += c;
        }
    }

    pub fn cluster_pvs(&self, cluster: i32) -> &[u8] {
        if cluster < 0 || cluster as usize >= self.numclusters {
            return &[];
        }
        let start = cluster as usize * self.row_bytes;
        &self.pvs_rows[start..start + self.row_bytes]
    }

    /// Can anything in cluster `a` see into cluster `b`.
    pub fn cluster_visible(&self, a: i32, b: i32) -> bool {
        if a < 0 || b < 0 {
            return false;
        }
        if a == b {
            return true;
        }
        if self.map_visibility.is_empty() {
            return true;
        }
        let pvs = self.cluster_pvs(a);
        let b = b as usize;
        match pvs.get(b >> 3) {
            Some(bits) => bits & (1 << (b & 7)) != 0,
            None => false,
        }
    }

    // ============================================================
    // Point / leaf queries
    // ============================================================

    pub fn point_leafnum(&self, p: &Vec3) -> usize {
        if self.map_nodes.is_empty() {
            return 0;
        }
        let mut num: i32 = 0;
        while num >= 0 {
            let node = &self.map_nodes[num as usize];
            let plane = &self.map_planes[node.planenum as usize];
            let d = plane.distance_to(p);
            num = if d < 0.0 { node.children[1] } else { node.children[0] };
        }
        (-1 - num) as usize
    }

    pub fn point_cluster(&self, p: &Vec3) -> i32 {
        self.map_leafs[self.point_leafnum(p)].cluster
    }

    /// Cluster containing `point`, or a negative value when the point is in
    /// a solid leaf or inside an opaque brush (within `epsilon`).
    pub fn cluster_for_point_ext(&self, point: &Vec3, epsilon: f32) -> i32 {
        let leaf = &self.map_leafs[self.point_leafnum(point)];
        if leaf.cluster < 0 {
            return -1;
        }

        let first = leaf.firstleafbrush as usize;
        let count = leaf.numleafbrushes as usize;
        for &b in self.map_leafbrushes.iter().skip(first).take(count) {
            let b = b as usize;
            if !self.opaque_brushes.get(b).copied().unwrap_or(false) {
                continue;
            }
            let brush = &self.map_brushes[b];
            let first_side = brush.firstside as usize;
            let inside = self.map_brushsides[first_side..first_side + brush.numsides as usize]
                .iter()
                .all(|side| {
                    let plane = &self.map_planes[side.planenum as usize];
                    dot_product(point, &plane.normal) - plane.dist <= epsilon
                });
            if inside {
                return -1 - b as i32;
            }
        }

        leaf.cluster
    }

    /// Like `cluster_for_point_ext`, but the cluster must also be visible
    /// from one of `clusters` (when any are given).
    pub fn cluster_for_point_ext_filter(&self, point: &Vec3, epsilon: f32, clusters: &[i32]) -> i32 {
        let cluster = self.cluster_for_point_ext(point, epsilon);
        if cluster < 0 || clusters.is_empty() {
            return cluster;
        }
        if clusters.iter().any(|&c| self.cluster_visible(cluster, c)) {
            return cluster;
        }
        -1
    }

    pub fn leaf_bounds(&self, leafnum: usize) -> (Vec3, Vec3) {
        let leaf = &self.map_leafs[leafnum];
        (leaf.mins, leaf.maxs)
    }

    /// Bounds of every leaf inside the PVS.
    pub fn world_bounds(&self) -> (Vec3, Vec3) {
        let mut mins = [0.0; 3];
        let mut maxs = [0.0; 3];
        clear_bounds(&mut mins, &mut maxs);
        for leaf in self.map_leafs.iter().filter(|l| l.cluster >= 0) {
            add_point_to_bounds(&leaf.mins, &mut mins, &mut maxs);
            add_point_to_bounds(&leaf.maxs, &mut mins, &mut maxs);
        }
        (mins, maxs)
    }

    /// Bounds of every leaf visible from `cluster`.
    pub fn pvs_bounds(&self, cluster: i32) -> (Vec3, Vec3) {
        let mut mins = [0.0; 3];
        let mut maxs = [0.0; 3];
        clear_bounds(&mut mins, &mut maxs);
        for leaf in &self.map_leafs {
            if leaf.cluster < 0 || !self.cluster_visible(cluster, leaf.cluster) {
                continue;
            }
            add_point_to_bounds(&leaf.mins, &mut mins, &mut maxs);
            add_point_to_bounds(&leaf.maxs, &mut mins, &mut maxs);
        }
        (mins, maxs)
    }
}

// ============================================================
// Vis compression (for tools and tests building their own lumps)
// ============================================================

/// Build a visibility lump from uncompressed per-cluster rows.
pub fn compress_vis_lump(rows: &[Vec<u8>]) -> Vec<u8> {
    let numclusters = rows.len();
    let mut lump = Vec::new();
    lump.extend_from_slice(&(numclusters as i32).to_le_bytes());
    lump.resize(4 + numclusters * 8, 0);

    for (i, row) in rows.iter().enumerate() {
        let ofs = lump.len() as i32;
        lump[4 + i * 8..8 + i * 8].copy_from_slice(&ofs.to_le_bytes());
        lump[8 + i * 8..12 + i * 8].copy_from_slice(&ofs.to_le_bytes());

        let mut j = 0;
        while j < row.len() {
            lump.push(row[j]);
            if row[j] != 0 {
                j += 1;
                continue;
            }
            let mut rep = 1;
            j += 1;
            while j < row.len() && row[j] == 0 && rep < 255 {
                rep += 1;
                j += 1;
            }
            lump.push(rep as u8);
        }
    }
    lump
}

// ============================================================
// Tests
// ============================================================
