// qfiles.rs — compiled-world limits and draw surface records handed to the light compiler

use crate::q_shared::{Vec2, Vec3};

// ============================================================
// Upper design bounds
// ============================================================

pub const MAX_MAP_MODELS: usize = 1024;
pub const MAX_MAP_BRUSHES: usize = 32768;
pub const MAX_MAP_ENTITIES: usize = 8192;
pub const MAX_MAP_PLANES: usize = 262144;
pub const MAX_MAP_NODES: usize = 131072;
pub const MAX_MAP_BRUSHSIDES: usize = 524288;
pub const MAX_MAP_LEAFS: usize = 131072;
pub const MAX_MAP_LEAFBRUSHES: usize = 262144;
pub const MAX_MAP_VISIBILITY: usize = 0x800000;
pub const MAX_MAP_DRAW_SURFS: usize = 131072;
pub const MAX_MAP_DRAW_VERTS: usize = 1048576;
pub const MAX_MAP_DRAW_INDEXES: usize = 1048576;
pub const MAX_MAP_LIGHTGRID: usize = 0x100000;

pub const MAX_KEY: usize = 32;
pub const MAX_VALUE: usize = 1024;

pub const DVIS_PVS: usize = 0;

// ============================================================
// Lightmaps and styles
// ============================================================

/// Independent lightmaps (style layers) per surface.
pub const MAX_LIGHTMAPS: usize = 4;

/// The always-on light style.
pub const LS_NORMAL: u8 = 0;
/// Marks an unused style slot.
pub const LS_NONE: u8 = 255;

pub const DEFAULT_LIGHTMAP_SAMPLE_SIZE: i32 = 16;

// ============================================================
// BSP records
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct DNode {
    pub planenum: i32,
    /// Negative numbers are -(leafnum + 1).
    pub children: [i32; 2],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DLeaf {
    pub contents: i32,
    /// -1 for leafs outside the PVS (solid).
    pub cluster: i32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub firstleafbrush: u32,
    pub numleafbrushes: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DBrush {
    pub firstside: u32,
    pub numsides: u32,
    pub contents: i32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DBrushSide {
    pub planenum: u32,
    pub surface_flags: i32,
}

// ============================================================
// Draw surfaces
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceType {
    #[default]
    Bad,
    Planar,
    Patch,
    TriangleSoup,
    Flare,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DrawVert {
    pub xyz: Vec3,
    pub st: Vec2,
    /// Luxel-space coordinates, filled in by lightmap allocation.
    pub lightmap: [Vec2; MAX_LIGHTMAPS],
    pub normal: Vec3,
    /// Output vertex colors, one per style.
    pub color: [[u8; 4]; MAX_LIGHTMAPS],
}

#[derive(Debug, Clone)]
pub struct DrawSurface {
    pub surface_type: SurfaceType,
    pub shader_num: usize,
    /// Owning entity, 0 for the world.
    pub entity_num: usize,
    pub first_vert: usize,
    pub num_verts: usize,
    pub first_index: usize,
    pub num_indexes: usize,
    pub patch_width: usize,
    pub patch_height: usize,
    /// Preferred lightmap projection axis, zero when unset.
    pub lightmap_axis: Vec3,
    /// Luxel size in world units, 0 = shader/global default.
    pub sample_size: i32,
    pub lightmap_scale: f32,
    /// PVS clusters the surface touches.
    pub clusters: Vec<i32>,
    /// 0 = never casts, 1 = casts onto everyone, >1/<0 = group casting.
    pub cast_shadows: i32,
    pub recv_shadows: i32,
    /// Part of a portal-sky scene.
    pub skybox: bool,
    /// Style per lightmap slot, filled by the compiler.
    pub lightmap_styles: [u8; MAX_LIGHTMAPS],
    /// Style per vertex color slot, filled by the compiler.
    pub vertex_styles: [u8; MAX_LIGHTMAPS],
}

impl Default for DrawSurface {
    fn default() -> Self {
        Self {
            surface_type: SurfaceType::Bad,
            shader_num: 0,
            entity_num: 0,
            first_vert: 0,
            num_verts: 0,
            first_index: 0,
            num_indexes: 0,
            patch_width: 0,
            patch_height: 0,
            lightmap_axis: [0.0; 3],
            sample_size: 0,
            lightmap_scale: 1.0,
            clusters: Vec::new(),
            cast_shadows: 1,
            recv_shadows: 1,
            skybox: false,
            lightmap_styles: [LS_NORMAL, LS_NONE, LS_NONE, LS_NONE],
            vertex_styles: [LS_NORMAL, LS_NONE, LS_NONE, LS_NONE],
        }
    }
}
