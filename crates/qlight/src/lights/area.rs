// area.rs — area lights for emissive surfaces

use qlight_common::q_shared::{
    color_normalize, cross_product, dot_product, plane_from_points, vector_add, vector_length, vector_ma,
    vector_scale, vector_subtract, Vec3, VEC3_ORIGIN,
};
use qlight_common::qfiles::SurfaceType;

use super::{Light, LightFlags, LightKind, LightSet};
use crate::mesh::tessellate_patch;
use crate::options::LightOptions;
use crate::scene::Scene;
use crate::session::{bump, CompileSession};

/// Scale from surface light value to form factor intensity.
pub const FORM_FACTOR_SCALE: f32 = 3.0;

/// Emitters are kept off their own plane by this much.
const AREA_ORIGIN_NUDGE: f32 = 1.0;

const MIN_SUBDIVIDE: f32 = 8.0;

/// Emission parameters shared by every piece of one emitter.
#[derive(Debug, Clone, Copy)]
pub struct Emission {
    pub value: f32,
    pub color: Vec3,
    pub scale: f32,
    pub style: u8,
    pub two_sided: bool,
    pub filter_radius: f32,
}

/// Area of a convex polygon.
pub fn winding_area(points: &[Vec3]) -> f32 {
    let mut total = 0.0;
    for i in 2..points.len() {
        let d1 = vector_subtract(&points[i - 1], &points[0]);
        let d2 = vector_subtract(&points[i], &points[0]);
        total += 0.5 * vector_length(&cross_product(&d1, &d2));
    }
    total
}

/// An area light over a convex polygon, clockwise seen from the lit side.
/// `None` for degenerate polygons.
pub fn area_light(points: &[Vec3], emission: &Emission, options: &LightOptions) -> Option<Light> {
    if points.len() < 3 {
        return None;
    }
    let face = plane_from_points(&points[0], &points[1], &points[2])?;
    let area = winding_area(points);
    if area <= 0.0 {
        return None;
    }

    let mut center = VEC3_ORIGIN;
    for p in points {
        center = vector_add(&center, p);
    }
    center = vector_scale(&center, 1.0 / points.len() as f32);
    let origin = vector_ma(&center, AREA_ORIGIN_NUDGE, &face.normal);

    let mut flags = LightFlags::AREA_DEFAULT;
    if emission.two_sided {
        flags |= LightFlags::TWOSIDED;
    }
    let plane = qlight_common::q_shared::CPlane::new(face.normal, dot_product(&origin, &face.normal));
    let mut light = Light::new(
        LightKind::Area {
            winding: points.to_vec(),
            plane,
        },
        flags,
    );
    light.origin = origin;
    light.normal = face.normal;
    light.color = emission.color;
    light.photons = emission.value * area * emission.scale;
    light.add = emission.value * FORM_FACTOR_SCALE * emission.scale;
    light.style = emission.style;
    light.filter_radius = emission.filter_radius;
    light.falloff_tolerance = options.falloff_tolerance;
    Some(light)
}

/// Split a triangle along its longest edge until no edge exceeds
/// `max_edge`. Winding order is kept.
pub fn subdivide_triangle(tri: [Vec3; 3], max_edge: f32, out: &mut Vec<[Vec3; 3]>) {
    let max_edge = max_edge.max(MIN_SUBDIVIDE);
    let mut longest = 0;
    let mut longest_len = 0.0;
    for i in 0..3 {
        let len = vector_length(&vector_subtract(&tri[(i + 1) % 3], &tri[i]));
        if len > longest_len {
            longest = i;
            longest_len = len;
        }
    }
    if longest_len <= max_edge {
        out.push(tri);
        return;
    }
    let a = tri[longest];
    let b = tri[(longest + 1) % 3];
    let c = tri[(longest + 2) % 3];
    let mid = vector_scale(&vector_add(&a, &b), 0.5);
    subdivide_triangle([a, mid, c], max_edge, out);
    subdivide_triangle([mid, b, c], max_edge, out);
}

/// World-space triangles of a draw surface. Patches are tessellated.
pub fn surface_triangles(scene: &Scene, surface_num: usize, options: &LightOptions) -> Vec<[Vec3; 3]> {
    let surf = &scene.surfaces[surface_num];
    let transform = scene.surface_transform(surf);

    let verts = scene.surface_verts(surf);
    match surf.surface_type {
        SurfaceType::Patch => {
            let mesh = tessellate_patch(verts, surf.patch_width, surf.patch_height, options.patch_subdivisions);
            mesh.triangles()
                .iter()
                .map(|t| t.map(|i| transform.transform_point(&mesh.verts[i].xyz)))
                .collect()
        }
        SurfaceType::Planar | SurfaceType::TriangleSoup => scene
            .surface_indexes(surf)
            .chunks_exact(3)
            .map(|idx| [0, 1, 2].map(|j| transform.transform_point(&verts[idx[j] as usize].xyz)))
            .collect(),
        SurfaceType::Bad | SurfaceType::Flare => Vec::new(),
    }
}

impl LightSet {
    /// One area light per (subdivided) triangle of every surface whose
    /// shader emits light.
    pub fn add_surface_lights(&mut self, scene: &Scene, options: &LightOptions, session: &CompileSession) {
        for surface_num in 0..scene.surfaces.len() {
            let shader = scene.shader(&scene.surfaces[surface_num]);
            if shader.surface_light <= 0.0 {
                continue;
            }
            let mut color = shader.light_color;
            if color_normalize(&mut color) == 0.0 {
                color = [1.0, 1.0, 1.0];
            }
            let emission = Emission {
                value: shader.surface_light,
                color,
                scale: options.area_scale,
                style: shader.light_style,
                two_sided: shader.two_sided,
                filter_radius: shader.light_filter_radius,
            };

            let mut pieces = Vec::new();
            for tri in surface_triangles(scene, surface_num, options) {
                subdivide_triangle(tri, shader.light_subdivide, &mut pieces);
            }
            for piece in pieces {
                if let Some(light) = area_light(&piece, &emission, options) {
                    self.push(light);
                    bump(&session.counters.surface_lights);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderInfo;
    use crate::testutil::{add_quad, floor_quad, open_scene};

    fn emission() -> Emission {
        Emission {
            value: 100.0,
            color: [1.0, 1.0, 1.0],
            scale: 0.25,
            style: 0,
            two_sided: false,
            filter_radius: 0.0,
        }
    }

    #[test]
    fn test_area_light_fields() {
        let quad = floor_quad(32.0, 0.0);
        let light = area_light(&quad, &emission(), &LightOptions::default()).unwrap();
        assert_eq!(light.normal, [0.0, 0.0, 1.0]);
        assert_eq!(light.origin, [16.0, 16.0, 1.0]);
        assert_eq!(light.photons, 100.0 * 1024.0 * 0.25);
        assert_eq!(light.add, 100.0 * FORM_FACTOR_SCALE * 0.25);
        match &light.kind {
            LightKind::Area { winding, plane } => {
                assert_eq!(winding.len(), 4);
                assert_eq!(plane.dist, 1.0);
            }
            _ => panic!("expected an area light"),
        }
    }

    #[test]
    fn test_subdivide_keeps_area_and_winding() {
        let tri = [[0.0, 0.0, 0.0], [0.0, 256.0, 0.0], [256.0, 0.0, 0.0]];
        let mut out = Vec::new();
        subdivide_triangle(tri, 64.0, &mut out);
        assert!(out.len() > 1);
        let total: f32 = out.iter().map(|t| winding_area(t)).sum();
        assert!((total - winding_area(&tri)).abs() < 1e-2);
        for t in &out {
            let p = plane_from_points(&t[0], &t[1], &t[2]).unwrap();
            assert!((p.normal[2] - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_surface_lights_from_shader() {
        let session = CompileSession::new();
        let mut scene = open_scene();
        let mut lamp = ShaderInfo::named("lamp");
        lamp.surface_light = 500.0;
        lamp.light_color = [0.5, 0.5, 0.0];
        scene.shaders.push(lamp);
        add_quad(&mut scene, 0, floor_quad(64.0, 0.0));
        add_quad(&mut scene, 1, floor_quad(64.0, 128.0));
        let mut set = LightSet::new();
        set.add_surface_lights(&scene, &LightOptions::default(), &session);
        assert_eq!(set.num_area, 2);
        assert_eq!(session.stats().surface_lights, 2);
        assert_eq!(set.lights[0].color, [1.0, 1.0, 0.0]);
        assert!(set.lights.iter().all(|l| l.origin[2] == 129.0));
    }
}
