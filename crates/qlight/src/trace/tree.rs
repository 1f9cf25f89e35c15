// tree.rs — axial BSP over the trace triangles, seeded from the world BSP

use qlight_common::bspworld::BspWorld;
use qlight_common::common::com_dprintf;
use qlight_common::q_shared::{add_point_to_bounds, clear_bounds, dot_product, CPlane, Vec3};

use crate::error::LightError;
use crate::session::{bump_by, CompileSession};
use crate::shader::ShaderInfo;
use crate::trace::store::{TraceInfo, TraceStore, TraceTriangle, TraceWinding, MAX_TW_VERTS};

pub const TW_ON_EPSILON: f32 = 0.25;
pub const MAX_NODE_ITEMS: usize = 5;
pub const MIN_NODE_SIZE: f32 = 32.0;
pub const MAX_TRACE_DEPTH: usize = 32;
pub const MAX_TRACE_NODES: usize = 1 << 24;

const SIDE_FRONT: usize = 0;
const SIDE_BACK: usize = 1;
const SIDE_ON: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Decision node; `plane.plane_type < 3` for axial splits.
    Split,
    Leaf,
    /// Mirrors an opaque world leaf. Anything reaching it is blocked.
    SolidLeaf,
}

#[derive(Debug, Clone, Copy)]
pub struct TraceNode {
    pub node_type: NodeType,
    pub plane: CPlane,
    pub children: [usize; 2],
    pub mins: Vec3,
    pub maxs: Vec3,
    /// Leafs: range into `TraceTree::triangles`.
    pub first_item: usize,
    /// Leafs: triangle count. Decision nodes: triangles in the subtree.
    pub num_items: usize,
}

impl TraceNode {
    fn leaf(node_type: NodeType) -> Self {
        Self {
            node_type,
            plane: CPlane::default(),
            children: [0, 0],
            mins: [0.0; 3],
            maxs: [0.0; 3],
            first_item: 0,
            num_items: 0,
        }
    }
}

/// Read-only once built; safe to share between workers.
pub struct TraceTree {
    pub nodes: Vec<TraceNode>,
    pub triangles: Vec<TraceTriangle>,
    pub infos: Vec<TraceInfo>,
    pub shaders: Vec<ShaderInfo>,
    pub head_node: usize,
    pub skybox_node: Option<usize>,
    pub max_depth: usize,
}

// ============================================================
// Winding clipping
// ============================================================

/// Split `tw` by `plane`. Either side may come back with fewer than three
/// verts, meaning nothing is there.
pub fn clip_trace_winding(tw: &TraceWinding, plane: &CPlane) -> Result<(TraceWinding, TraceWinding), LightError> {
    let mut sides = [SIDE_ON; MAX_TW_VERTS];
    let mut dists = [0.0f32; MAX_TW_VERTS];
    let mut counts = [0usize; 3];

    for (i, v) in tw.verts().iter().enumerate() {
        dists[i] = dot_product(&v.xyz, &plane.normal) - plane.dist;
        sides[i] = if dists[i] < -TW_ON_EPSILON {
            SIDE_BACK
        } else if dists[i] > TW_ON_EPSILON {
            SIDE_FRONT
        } else {
            SIDE_ON
        };
        counts[sides[i]] += 1;
    }

    let mut front = TraceWinding::empty(tw.plane, tw.info_num);
    let mut back = TraceWinding::empty(tw.plane, tw.info_num);

    if counts[SIDE_BACK] == 0 {
        return Ok((*tw, back));
    }
    if counts[SIDE_FRONT] == 0 {
        return Ok((front, *tw));
    }

    let n = tw.num_verts;
    for i in 0..n {
        let j = (i + 1) % n;
        let a = &tw.v[i];
        let b = &tw.v[j];

        match sides[i] {
            SIDE_FRONT => front.push(*a)?,
            SIDE_BACK => back.push(*a)?,
            _ => {
                front.push(*a)?;
                back.push(*a)?;
                continue;
            }
        }

        if sides[j] == SIDE_ON || sides[j] == sides[i] {
            continue;
        }

        let frac = dists[i] / (dists[i] - dists[j]);
        let mut mid = *a;
        for k in 0..3 {
            // keep axial splits exact
            mid.xyz[k] = if plane.normal[k] == 1.0 {
                plane.dist
            } else if plane.normal[k] == -1.0 {
                -plane.dist
            } else {
                a.xyz[k] + frac * (b.xyz[k] - a.xyz[k])
            };
        }
        for k in 0..2 {
            mid.st[k] = a.st[k] + frac * (b.st[k] - a.st[k]);
        }
        front.push(mid)?;
        back.push(mid)?;
    }

    Ok((front, back))
}

// ============================================================
// Construction
// ============================================================

struct TreeBuilder<'a> {
    world: &'a BspWorld,
    nodes: Vec<TraceNode>,
    /// Leaf windings during construction, parallel to `nodes`.
    windings: Vec<Vec<TraceWinding>>,
    max_depth: usize,
}

impl<'a> TreeBuilder<'a> {
    fn alloc_node(&mut self, node: TraceNode) -> Result<usize, LightError> {
        if self.nodes.len() >= MAX_TRACE_NODES {
            return Err(LightError::capacity("MAX_TRACE_NODES", MAX_TRACE_NODES));
        }
        self.nodes.push(node);
        self.windings.push(Vec::new());
        Ok(self.nodes.len() - 1)
    }

    fn world_leaf_node(&mut self, leafnum: usize) -> Result<usize, LightError> {
        let solid = self.world.map_leafs[leafnum].cluster == -1;
        let node_type = if solid { NodeType::SolidLeaf } else { NodeType::Leaf };
        let mut node = TraceNode::leaf(node_type);
        let (mins, maxs) = self.world.leaf_bounds(leafnum);
        node.mins = mins;
        node.maxs = maxs;
        self.alloc_node(node)
    }

    /// Mirror the world BSP below `bsp_node`.
    fn setup_nodes_r(&mut self, bsp_node: usize) -> Result<usize, LightError> {
        let src = self.world.map_nodes[bsp_node];
        let plane = self.world.map_planes[src.planenum as usize];
        let num = self.alloc_node(TraceNode {
            plane,
            ..TraceNode::leaf(NodeType::Split)
        })?;

        for i in 0..2 {
            let child = src.children[i];
            let child_num = if child < 0 {
                self.world_leaf_node((-1 - child) as usize)?
            } else {
                self.setup_nodes_r(child as usize)?
            };
            self.nodes[num].children[i] = child_num;
        }
        Ok(num)
    }

    fn filter_winding_r(&mut self, tw: &TraceWinding, node_num: usize) -> Result<(), LightError> {
        let node = self.nodes[node_num];
        match node.node_type {
            NodeType::SolidLeaf => return Ok(()),
            NodeType::Leaf => {
                self.windings[node_num].push(*tw);
                return Ok(());
            }
            NodeType::Split => {}
        }

        let p1 = &node.plane;
        let p2 = &tw.plane;

        // coplanar with the split: keep it whole on the side it faces
        if dot_product(&p1.normal, &p2.normal) > 0.999 && (p1.dist - p2.dist).abs() < 0.001 {
            return self.filter_winding_r(tw, node.children[0]);
        }
        if -dot_product(&p1.normal, &p2.normal) > 0.999 && (p1.dist + p2.dist).abs() < 0.001 {
            return self.filter_winding_r(tw, node.children[1]);
        }

        let (front, back) = clip_trace_winding(tw, p1)?;
        if front.num_verts >= 3 {
            self.filter_winding_r(&front, node.children[0])?;
        }
        if back.num_verts >= 3 {
            self.filter_winding_r(&back, node.children[1])?;
        }
        Ok(())
    }

    fn subdivide_r(&mut self, node_num: usize, depth: usize) -> Result<(), LightError> {
        if depth >= MAX_TRACE_DEPTH {
            return Ok(());
        }
        let depth = depth + 1;

        let node = self.nodes[node_num];
        match node.node_type {
            NodeType::Split => {
                self.subdivide_r(node.children[0], depth)?;
                return self.subdivide_r(node.children[1], depth);
            }
            NodeType::SolidLeaf => return Ok(()),
            NodeType::Leaf => {}
        }

        // bound the node
        let mut mins = [0.0; 3];
        let mut maxs = [0.0; 3];
        clear_bounds(&mut mins, &mut maxs);
        let mut average = [0.0f64; 3];
        let mut count = 0usize;
        for tw in &self.windings[node_num] {
            for v in tw.verts() {
                add_point_to_bounds(&v.xyz, &mut mins, &mut maxs);
                for k in 0..3 {
                    average[k] += v.xyz[k] as f64;
                }
                count += 1;
            }
        }
        let num_items = self.windings[node_num].len();
        if count == 0 {
            return Ok(());
        }
        self.nodes[node_num].mins = mins;
        self.nodes[node_num].maxs = maxs;

        // about MAX_NODE_ITEMS triangles' worth of fans
        if count.saturating_sub(num_items * 2) < MAX_NODE_ITEMS {
            return Ok(());
        }

        let size = [maxs[0] - mins[0], maxs[1] - mins[1], maxs[2] - mins[2]];
        // longest axis, ties to the lower index
        let axis = (1..3).fold(0, |a, k| if size[k] > size[a] { k } else { a });

        if size[axis] <= MIN_NODE_SIZE {
            return Ok(());
        }
        self.max_depth = self.max_depth.max(depth);

        let mut dist = (average[axis] / count as f64).floor() as f32;
        if dist <= mins[axis] || dist >= maxs[axis] {
            dist = (0.5 * (mins[axis] + maxs[axis])).floor();
        }

        let mut normal = [0.0; 3];
        normal[axis] = 1.0;
        let plane = CPlane::new(normal, dist);

        let front_num = self.alloc_node(TraceNode::leaf(NodeType::Leaf))?;
        let back_num = self.alloc_node(TraceNode::leaf(NodeType::Leaf))?;

        let windings = std::mem::take(&mut self.windings[node_num]);
        for tw in &windings {
            let (front, back) = clip_trace_winding(tw, &plane)?;
            if front.num_verts >= 3 {
                self.windings[front_num].push(front);
            }
            if back.num_verts >= 3 {
                self.windings[back_num].push(back);
            }
        }

        let node = &mut self.nodes[node_num];
        node.node_type = NodeType::Split;
        node.plane = plane;
        node.children = [front_num, back_num];

        self.subdivide_r(front_num, depth)?;
        self.subdivide_r(back_num, depth)
    }

    /// Turn every leaf's windings into fans and count subtree items.
    fn triangulate(mut self) -> (Vec<TraceNode>, Vec<TraceTriangle>, usize) {
        let mut triangles = Vec::new();
        for (num, node) in self.nodes.iter_mut().enumerate() {
            if node.node_type != NodeType::Leaf {
                continue;
            }
            node.first_item = triangles.len();
            for tw in &self.windings[num] {
                for j in 1..tw.num_verts.saturating_sub(1) {
                    let tt = TraceTriangle::new([tw.v[0], tw.v[j], tw.v[j + 1]], tw.info_num);
                    triangles.push(tt);
                }
            }
            node.num_items = triangles.len() - node.first_item;
        }
        self.windings.clear();

        // children always come after their parent
        for num in (0..self.nodes.len()).rev() {
            if self.nodes[num].node_type == NodeType::Split {
                let [front, back] = self.nodes[num].children;
                self.nodes[num].num_items = self.nodes[front].num_items + self.nodes[back].num_items;
            }
        }
        (self.nodes, triangles, self.max_depth)
    }
}

impl TraceTree {
    pub fn build(
        world: &BspWorld,
        store: TraceStore,
        shaders: &[ShaderInfo],
        session: &CompileSession,
    ) -> Result<TraceTree, LightError> {
        let mut builder = TreeBuilder {
            world,
            nodes: Vec::new(),
            windings: Vec::new(),
            max_depth: 0,
        };

        let head_node = if world.map_nodes.is_empty() {
            builder.world_leaf_node(0)?
        } else {
            builder.setup_nodes_r(0)?
        };

        for tw in &store.windings {
            builder.filter_winding_r(tw, head_node)?;
        }

        let skybox_node = if store.sky_windings.is_empty() {
            None
        } else {
            let num = builder.alloc_node(TraceNode::leaf(NodeType::Leaf))?;
            builder.windings[num] = store.sky_windings.clone();
            Some(num)
        };

        builder.subdivide_r(head_node, 0)?;
        if let Some(num) = skybox_node {
            builder.subdivide_r(num, 0)?;
        }

        let (nodes, triangles, max_depth) = builder.triangulate();

        bump_by(&session.counters.trace_nodes, nodes.len());
        com_dprintf(&format!(
            "{:9} trace nodes\n{:9} trace triangles\n{:9} max trace depth\n",
            nodes.len(),
            triangles.len(),
            max_depth
        ));

        Ok(TraceTree {
            nodes,
            triangles,
            infos: store.infos,
            shaders: shaders.to_vec(),
            head_node,
            skybox_node,
            max_depth,
        })
    }

    pub fn leaf_triangles(&self, node: &TraceNode) -> &[TraceTriangle] {
        &self.triangles[node.first_item..node.first_item + node.num_items]
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::store::{TraceInfo, TraceVert};

    fn tv(x: f32, y: f32, z: f32) -> TraceVert {
        TraceVert { xyz: [x, y, z], st: [x / 64.0, y / 64.0] }
    }

    fn square(z: f32, size: f32) -> TraceWinding {
        let plane = CPlane::new([0.0, 0.0, 1.0], z);
        let mut tw = TraceWinding::empty(plane, 0);
        for v in [tv(0.0, 0.0, z), tv(0.0, size, z), tv(size, size, z), tv(size, 0.0, z)] {
            tw.push(v).unwrap();
        }
        tw
    }

    #[test]
    fn test_clip_splits_with_exact_axial_points() {
        let tw = square(0.0, 64.0);
        let plane = CPlane::new([1.0, 0.0, 0.0], 16.0);
        let (front, back) = clip_trace_winding(&tw, &plane).unwrap();
        assert_eq!(front.num_verts, 4);
        assert_eq!(back.num_verts, 4);
        assert!(front.verts().iter().all(|v| v.xyz[0] >= 16.0));
        assert!(back.verts().iter().all(|v| v.xyz[0] <= 16.0));
        let mid = back.verts().iter().find(|v| v.xyz[0] == 16.0).unwrap();
        assert!((mid.st[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_clip_on_epsilon_keeps_whole() {
        let tw = square(0.0, 64.0);
        let plane = CPlane::new([1.0, 0.0, 0.0], -0.2);
        let (front, back) = clip_trace_winding(&tw, &plane).unwrap();
        assert_eq!(front.num_verts, 4);
        assert_eq!(back.num_verts, 0);
    }

    fn store_with_grid(n: usize) -> TraceStore {
        let session = CompileSession::new();
        let mut store = TraceStore::new();
        let info = TraceInfo { shader_num: 0, surface_num: 0, cast_shadows: 1, skip_grid: false };
        let mut tris = Vec::new();
        for y in 0..n {
            for x in 0..n {
                let (x0, y0) = (x as f32 * 64.0, y as f32 * 64.0);
                tris.push([tv(x0, y0, 0.0), tv(x0, y0 + 64.0, 0.0), tv(x0 + 64.0, y0 + 64.0, 0.0)]);
                tris.push([tv(x0, y0, 0.0), tv(x0 + 64.0, y0 + 64.0, 0.0), tv(x0 + 64.0, y0, 0.0)]);
            }
        }
        store.add_triangle_set(info, false, &tris, &session);
        store
    }

    #[test]
    fn test_build_subdivides_large_leaf() {
        let session = CompileSession::new();
        let world = BspWorld::open();
        let tree = TraceTree::build(&world, store_with_grid(8), &[ShaderInfo::default()], &session).unwrap();
        assert!(tree.nodes.len() > 1);
        assert_eq!(tree.nodes[tree.head_node].node_type, NodeType::Split);
        assert!(tree.triangles.len() >= 128);
        assert_eq!(tree.nodes[tree.head_node].num_items, tree.triangles.len());
        assert!(tree.max_depth <= MAX_TRACE_DEPTH);
    }

    #[test]
    fn test_square_floor_splits_on_x_first() {
        let session = CompileSession::new();
        let world = BspWorld::open();
        let tree = TraceTree::build(&world, store_with_grid(8), &[ShaderInfo::default()], &session).unwrap();
        let head = &tree.nodes[tree.head_node];
        assert_eq!(head.node_type, NodeType::Split);
        assert_eq!(head.plane.normal, [1.0, 0.0, 0.0]);
        let leafs: Vec<_> = tree.nodes.iter().filter(|n| n.node_type == NodeType::Leaf).collect();
        assert!(leafs.len() > 2);
        assert!(leafs.iter().all(|n| n.num_items < 128));
    }

    #[test]
    fn test_leaf_triangles_inside_leaf_bounds() {
        let session = CompileSession::new();
        let world = BspWorld::open();
        let tree = TraceTree::build(&world, store_with_grid(4), &[ShaderInfo::default()], &session).unwrap();
        for node in tree.nodes.iter().filter(|n| n.node_type == NodeType::Leaf && n.num_items > 0) {
            for tt in tree.leaf_triangles(node) {
                for v in &tt.v {
                    for k in 0..3 {
                        assert!(v.xyz[k] >= node.mins[k] - 0.01 && v.xyz[k] <= node.maxs[k] + 0.01);
                    }
                }
            }
        }
    }

    #[test]
    fn test_world_bsp_mirrored_with_solid_leafs() {
        let session = CompileSession::new();
        let world = BspWorld::sealed_box([-64.0; 3], [64.0; 3]);
        let tree = TraceTree::build(&world, TraceStore::new(), &[], &session).unwrap();
        assert_eq!(tree.nodes.iter().filter(|n| n.node_type == NodeType::Split).count(), 6);
        assert_eq!(tree.nodes.iter().filter(|n| n.node_type == NodeType::SolidLeaf).count(), 6);
        assert_eq!(tree.nodes.iter().filter(|n| n.node_type == NodeType::Leaf).count(), 1);
        assert!(tree.skybox_node.is_none());
    }
}
