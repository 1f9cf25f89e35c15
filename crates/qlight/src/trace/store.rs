// store.rs — flat pools of shadow-casting triangles and their shared tags

use std::collections::HashMap;

use qlight_common::q_shared::{plane_from_points, vector_length, vector_subtract, CPlane, EntityTransform, Vec2, Vec3};
use qlight_common::qfiles::{DrawSurface, SurfaceType};

use crate::error::LightError;
use crate::mesh::tessellate_patch;
use crate::options::LightOptions;
use crate::scene::Scene;
use crate::session::{bump, bump_by, CompileSession};

pub const MAX_TW_VERTS: usize = 24;
pub const DEGENERATE_EPSILON: f32 = 0.1;

/// Entities other than the world cast no shadows unless told to.
const ENTITY_CAST_SHADOWS: i32 = 0;

/// Tags shared by every triangle of one surface. Deduplicated by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceInfo {
    pub shader_num: usize,
    pub surface_num: usize,
    /// 0 never casts, 1 casts onto everyone, others cast within the group.
    pub cast_shadows: i32,
    /// Ignored when tracing the light grid.
    pub skip_grid: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TraceVert {
    pub xyz: Vec3,
    pub st: Vec2,
}

/// A convex polygon being filtered into the tree.
#[derive(Debug, Clone, Copy)]
pub struct TraceWinding {
    pub plane: CPlane,
    pub info_num: usize,
    pub num_verts: usize,
    pub v: [TraceVert; MAX_TW_VERTS],
}

impl TraceWinding {
    pub fn empty(plane: CPlane, info_num: usize) -> Self {
        Self {
            plane,
            info_num,
            num_verts: 0,
            v: [TraceVert::default(); MAX_TW_VERTS],
        }
    }

    pub fn verts(&self) -> &[TraceVert] {
        &self.v[..self.num_verts]
    }

    pub fn push(&mut self, v: TraceVert) -> Result<(), LightError> {
        if self.num_verts >= MAX_TW_VERTS {
            return Err(LightError::capacity("MAX_TW_VERTS", MAX_TW_VERTS));
        }
        self.v[self.num_verts] = v;
        self.num_verts += 1;
        Ok(())
    }
}

/// A leaf triangle with precomputed edges, ready for intersection tests.
#[derive(Debug, Clone, Copy)]
pub struct TraceTriangle {
    pub v: [TraceVert; 3],
    pub edge1: Vec3,
    pub edge2: Vec3,
    pub info_num: usize,
}

impl TraceTriangle {
    pub fn new(v: [TraceVert; 3], info_num: usize) -> Self {
        Self {
            edge1: vector_subtract(&v[1].xyz, &v[0].xyz),
            edge2: vector_subtract(&v[2].xyz, &v[0].xyz),
            v,
            info_num,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        let edge3 = vector_subtract(&self.v[2].xyz, &self.v[1].xyz);
        vector_length(&self.edge1) < DEGENERATE_EPSILON
            || vector_length(&self.edge2) < DEGENERATE_EPSILON
            || vector_length(&edge3) < DEGENERATE_EPSILON
    }
}

#[derive(Default)]
pub struct TraceStore {
    pub infos: Vec<TraceInfo>,
    info_lookup: HashMap<TraceInfo, usize>,
    /// Windings for the main tree.
    pub windings: Vec<TraceWinding>,
    /// Windings belonging to portal-sky surfaces.
    pub sky_windings: Vec<TraceWinding>,
}

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_trace_info(&mut self, info: TraceInfo) -> usize {
        if let Some(&num) = self.info_lookup.get(&info) {
            return num;
        }
        let num = self.infos.len();
        self.infos.push(info);
        self.info_lookup.insert(info, num);
        num
    }

    /// Append `triangles` tagged with a (shared) info record. Triangles with
    /// an edge shorter than 0.1 are dropped and counted. Returns the number
    /// kept.
    pub fn add_triangle_set(
        &mut self,
        info: TraceInfo,
        skybox: bool,
        triangles: &[[TraceVert; 3]],
        session: &CompileSession,
    ) -> usize {
        let info_num = self.add_trace_info(info);
        let mut kept = 0;
        for tri in triangles {
            let tt = TraceTriangle::new(*tri, info_num);
            if tt.is_degenerate() {
                bump(&session.counters.degenerate_triangles);
                continue;
            }
            let Some(plane) = plane_from_points(&tri[0].xyz, &tri[1].xyz, &tri[2].xyz) else {
                bump(&session.counters.degenerate_triangles);
                continue;
            };
            let mut tw = TraceWinding::empty(plane, info_num);
            tw.v[..3].copy_from_slice(tri);
            tw.num_verts = 3;
            if skybox {
                self.sky_windings.push(tw);
            } else {
                self.windings.push(tw);
            }
            kept += 1;
        }
        kept
    }

    /// Add the world model and every shadow-casting brush entity.
    pub fn populate_world(&mut self, scene: &Scene, options: &LightOptions, session: &CompileSession) {
        if let Some(world) = scene.models.first() {
            self.populate_model(scene, world.first_surface, world.num_surfaces, None, &EntityTransform::default(), options, session);
        }

        for ent in scene.entities.iter().skip(1) {
            let cast = ent
                .first_of(&["_castShadows", "_castshadows", "_cs"])
                .and_then(|v| v.trim().parse::<i32>().ok())
                .unwrap_or(ENTITY_CAST_SHADOWS);
            if cast <= 0 {
                continue;
            }
            let Some(model_num) = Scene::entity_model(ent) else {
                continue;
            };
            let Some(model) = scene.models.get(model_num) else {
                continue;
            };
            let transform = Scene::entity_transform(ent);
            self.populate_model(scene, model.first_surface, model.num_surfaces, Some(cast), &transform, options, session);
        }

        bump_by(&session.counters.trace_triangles, self.windings.len() + self.sky_windings.len());
    }

    fn populate_model(
        &mut self,
        scene: &Scene,
        first: usize,
        count: usize,
        cast_override: Option<i32>,
        transform: &EntityTransform,
        options: &LightOptions,
        session: &CompileSession,
    ) {
        for surface_num in first..first + count {
            let surf = &scene.surfaces[surface_num];
            let shader = scene.shader(surf);
            let cast_shadows = cast_override.unwrap_or(surf.cast_shadows);
            if cast_shadows == 0 || !shader.casts_trace_shadows() {
                continue;
            }
            match surf.surface_type {
                SurfaceType::Patch => self.populate_patch(scene, surface_num, cast_shadows, transform, options, session),
                SurfaceType::Planar | SurfaceType::TriangleSoup => {
                    let info = TraceInfo {
                        shader_num: surf.shader_num,
                        surface_num,
                        cast_shadows,
                        skip_grid: false,
                    };
                    let tris = indexed_triangles(scene, surf, transform);
                    self.add_triangle_set(info, surf.skybox, &tris, session);
                }
                SurfaceType::Bad | SurfaceType::Flare => {}
            }
        }
    }

    /// Tessellate a patch and add its quads as triangle pairs.
    pub fn populate_patch(
        &mut self,
        scene: &Scene,
        surface_num: usize,
        cast_shadows: i32,
        transform: &EntityTransform,
        options: &LightOptions,
        session: &CompileSession,
    ) {
        let surf = &scene.surfaces[surface_num];
        let mesh = tessellate_patch(
            scene.surface_verts(surf),
            surf.patch_width,
            surf.patch_height,
            options.patch_subdivisions,
        );
        let tris: Vec<[TraceVert; 3]> = mesh
            .triangles()
            .iter()
            .map(|t| {
                t.map(|i| TraceVert {
                    xyz: transform.transform_point(&mesh.verts[i].xyz),
                    st: mesh.verts[i].st,
                })
            })
            .collect();
        let info = TraceInfo {
            shader_num: surf.shader_num,
            surface_num,
            cast_shadows,
            skip_grid: true,
        };
        self.add_triangle_set(info, surf.skybox, &tris, session);
    }
}

fn indexed_triangles(scene: &Scene, surf: &DrawSurface, transform: &EntityTransform) -> Vec<[TraceVert; 3]> {
    let verts = scene.surface_verts(surf);
    scene
        .surface_indexes(surf)
        .chunks_exact(3)
        .map(|idx| {
            [0, 1, 2].map(|j| {
                let v = &verts[idx[j] as usize];
                TraceVert {
                    xyz: transform.transform_point(&v.xyz),
                    st: v.st,
                }
            })
        })
        .collect()
}
