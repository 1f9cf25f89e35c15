// allocate.rs — one raw lightmap per lightmapped draw surface

use qlight_common::common::com_dprintf;
use qlight_common::q_shared::{plane_from_points, vector_add, CPlane, Vec2, Vec3, VEC3_ORIGIN};
use qlight_common::qfiles::{DrawSurface, SurfaceType};

use super::{MapVert, RawLightmap};
use crate::mesh::tessellate_patch;
use crate::options::LightOptions;
use crate::scene::Scene;
use crate::session::{bump, CompileSession};
use crate::shader::CompileFlags;

/// Axes spanning the lightmap for each projection axis.
const LIGHTMAP_AXES: [(usize, usize); 3] = [(1, 2), (0, 2), (0, 1)];

/// Does this surface get a raster at all. Everything else is lit per vertex.
pub fn wants_lightmap(scene: &Scene, surf: &DrawSurface) -> bool {
    if !matches!(surf.surface_type, SurfaceType::Planar | SurfaceType::Patch) {
        return false;
    }
    let shader = scene.shader(surf);
    !shader.is_vertex_lit() && !shader.is_sky() && !shader.compile_flags.contains(CompileFlags::NODRAW)
}

fn largest_axis(v: &Vec3) -> usize {
    let a = v.map(f32::abs);
    if a[0] >= a[1] && a[0] >= a[2] {
        0
    } else if a[1] >= a[2] {
        1
    } else {
        2
    }
}

/// World-space vertexes and triangles of a surface.
fn surface_geometry(
    scene: &Scene,
    surf: &DrawSurface,
    options: &LightOptions,
) -> (Vec<MapVert>, Vec<[usize; 3]>, Option<(usize, usize)>) {
    let transform = scene.surface_transform(surf);
    let to_map = |xyz: &Vec3, normal: &Vec3| MapVert {
        xyz: transform.transform_point(xyz),
        normal: transform.transform_normal(normal),
        lightmap: [0.0; 2],
    };

    let verts = scene.surface_verts(surf);
    if surf.surface_type == SurfaceType::Patch {
        let mesh = tessellate_patch(verts, surf.patch_width, surf.patch_height, options.patch_subdivisions);
        let map_verts = mesh.verts.iter().map(|v| to_map(&v.xyz, &v.normal)).collect();
        return (map_verts, mesh.triangles(), Some((mesh.width, mesh.height)));
    }

    let map_verts = verts.iter().map(|v| to_map(&v.xyz, &v.normal)).collect();
    let triangles = scene
        .surface_indexes(surf)
        .chunks_exact(3)
        .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
        .collect();
    (map_verts, triangles, None)
}

/// Set up the raster for one surface. `None` when the surface has no
/// usable triangles.
pub fn allocate_raw_lightmap(
    scene: &Scene,
    surface_num: usize,
    options: &LightOptions,
    session: &CompileSession,
) -> Option<RawLightmap> {
    let surf = &scene.surfaces[surface_num];
    let shader = scene.shader(surf);
    let (mut verts, triangles, mesh_size) = surface_geometry(scene, surf, options);
    if verts.is_empty() || triangles.is_empty() {
        return None;
    }

    let plane = if surf.surface_type == SurfaceType::Planar {
        let plane = triangles
            .iter()
            .find_map(|t| plane_from_points(&verts[t[0]].xyz, &verts[t[1]].xyz, &verts[t[2]].xyz));
        if plane.is_none() {
            bump(&session.counters.degenerate_triangles);
            session.warn(format!("surface {} has no valid plane, not lightmapped\n", surface_num));
            return None;
        }
        plane
    } else {
        None
    };

    // projection axis
    let mut axis_num = if surf.lightmap_axis != VEC3_ORIGIN {
        largest_axis(&surf.lightmap_axis)
    } else if let Some(p) = &plane {
        largest_axis(&p.normal)
    } else {
        let sum = verts.iter().fold(VEC3_ORIGIN, |acc, v| vector_add(&acc, &v.normal));
        largest_axis(&sum)
    };
    if let Some(p) = &plane {
        if p.normal[axis_num].abs() < 0.1 {
            axis_num = largest_axis(&p.normal);
        }
    }
    let (s_axis, t_axis) = LIGHTMAP_AXES[axis_num];

    let base = if surf.sample_size > 0 {
        surf.sample_size
    } else if shader.sample_size > 0 {
        shader.sample_size
    } else {
        options.sample_size
    };
    let mut sample_size = (base as f32 * surf.lightmap_scale * options.lightmap_scale).max(1.0);

    let mut bmins = [f32::MAX; 3];
    let mut bmaxs = [f32::MIN; 3];
    for v in &verts {
        for k in 0..3 {
            bmins[k] = bmins[k].min(v.xyz[k]);
            bmaxs[k] = bmaxs[k].max(v.xyz[k]);
        }
    }

    let max_size = options.max_lightmap_size.max(2);
    let mut warned = false;
    let (mins, maxs, width, height) = loop {
        let mut mins = VEC3_ORIGIN;
        let mut maxs = VEC3_ORIGIN;
        let mut size = [0usize; 3];
        for k in 0..3 {
            mins[k] = sample_size * (bmins[k] / sample_size).floor();
            maxs[k] = sample_size * (bmaxs[k] / sample_size).ceil();
            size[k] = ((maxs[k] - mins[k]) / sample_size).round() as usize + 1;
        }
        let (w, h) = (size[s_axis], size[t_axis]);
        if w <= max_size && h <= max_size {
            break (mins, maxs, w, h);
        }
        if !warned {
            session.warn(format!(
                "surface {} lightmap {}x{} too large, raising sample size\n",
                surface_num, w, h
            ));
            warned = true;
        }
        sample_size *= 2.0;
    };

    for v in verts.iter_mut() {
        v.lightmap = luxel_coord(&v.xyz, &mins, sample_size, axis_num);
    }

    let mut lm = RawLightmap::new(surface_num, width, height);
    lm.sample_size = sample_size;
    lm.axis_num = axis_num;
    lm.mins = mins;
    lm.maxs = maxs;
    lm.vecs = plane.as_ref().map(|p| planar_vecs(p, axis_num, &mins, sample_size));
    lm.plane = plane;
    lm.verts = verts;
    lm.triangles = triangles;
    lm.mesh_size = mesh_size;
    lm.surface_clusters = surf.clusters.clone();
    lm.two_sided = shader.two_sided;
    lm.recv_shadows = surf.recv_shadows;
    lm.filter_radius = options.filter_radius;
    lm.sample_offset = if shader.sample_offset != 0.0 { shader.sample_offset } else { options.sample_offset };
    lm.min_light = if shader.min_light != VEC3_ORIGIN { shader.min_light } else { options.min_light };
    lm.ambient = if shader.ambient != VEC3_ORIGIN { shader.ambient } else { options.ambient_color };
    Some(lm)
}

/// Luxel-space position of a world point, luxel centers at `n + 0.5`.
pub(crate) fn luxel_coord(xyz: &Vec3, mins: &Vec3, sample_size: f32, axis_num: usize) -> Vec2 {
    let (s_axis, t_axis) = LIGHTMAP_AXES[axis_num];
    [
        (xyz[s_axis] - mins[s_axis]) / sample_size + 0.5,
        (xyz[t_axis] - mins[t_axis]) / sample_size + 0.5,
    ]
}

/// Luxel (0, 0) on the plane, and the world step for one luxel in s and t.
fn planar_vecs(plane: &CPlane, axis_num: usize, mins: &Vec3, sample_size: f32) -> [Vec3; 3] {
    let (s_axis, t_axis) = LIGHTMAP_AXES[axis_num];
    let n = &plane.normal;

    let mut origin = *mins;
    origin[axis_num] = (plane.dist - n[s_axis] * mins[s_axis] - n[t_axis] * mins[t_axis]) / n[axis_num];

    let mut s_step = VEC3_ORIGIN;
    s_step[s_axis] = sample_size;
    s_step[axis_num] = -n[s_axis] * sample_size / n[axis_num];

    let mut t_step = VEC3_ORIGIN;
    t_step[t_axis] = sample_size;
    t_step[axis_num] = -n[t_axis] * sample_size / n[axis_num];

    [origin, s_step, t_step]
}

/// Raw lightmaps for every surface that wants one, in surface order.
pub fn allocate_raw_lightmaps(scene: &Scene, options: &LightOptions, session: &CompileSession) -> Vec<RawLightmap> {
    let lightmaps: Vec<RawLightmap> = (0..scene.surfaces.len())
        .filter(|&num| wants_lightmap(scene, &scene.surfaces[num]))
        .filter_map(|num| allocate_raw_lightmap(scene, num, options, session))
        .collect();

    let luxels: usize = lightmaps.iter().map(|lm| lm.num_luxels()).sum();
    com_dprintf(&format!("{:9} raw lightmaps\n{:9} luxels\n", lightmaps.len(), luxels));
    lightmaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderInfo;
    use crate::testutil::{add_quad, floor_quad, open_scene};
    use qlight_common::q_shared::dot_product;

    #[test]
    fn test_floor_quad_raster() {
        let session = CompileSession::new();
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(64.0, 8.0));
        let lms = allocate_raw_lightmaps(&scene, &LightOptions::default(), &session);
        assert_eq!(lms.len(), 1);
        let lm = &lms[0];
        assert_eq!(lm.axis_num, 2);
        assert_eq!((lm.width, lm.height), (5, 5));
        assert_eq!(lm.verts[2].lightmap, [4.5, 4.5]);

        let [origin, s_step, t_step] = lm.vecs.unwrap();
        assert_eq!(origin, [0.0, 0.0, 8.0]);
        assert_eq!(s_step, [16.0, 0.0, 0.0]);
        assert_eq!(t_step, [0.0, 16.0, 0.0]);
    }

    #[test]
    fn test_sloped_vecs_stay_on_plane() {
        let session = CompileSession::new();
        let mut scene = open_scene();
        add_quad(
            &mut scene,
            0,
            [[0.0, 0.0, 0.0], [0.0, 64.0, 32.0], [64.0, 64.0, 32.0], [64.0, 0.0, 0.0]],
        );
        let lm = allocate_raw_lightmap(&scene, 0, &LightOptions::default(), &session).unwrap();
        let plane = lm.plane.unwrap();
        let [origin, s_step, t_step] = lm.vecs.unwrap();
        for (x, y) in [(0.0, 0.0), (3.0, 1.0), (2.0, 4.0)] {
            let p = [
                origin[0] + x * s_step[0] + y * t_step[0],
                origin[1] + x * s_step[1] + y * t_step[1],
                origin[2] + x * s_step[2] + y * t_step[2],
            ];
            assert!((dot_product(&p, &plane.normal) - plane.dist).abs() < 1e-3);
        }
    }

    #[test]
    fn test_oversized_surface_raises_sample_size() {
        let session = CompileSession::new();
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(4096.0, 0.0));
        let options = LightOptions { max_lightmap_size: 64, ..Default::default() };
        let lm = allocate_raw_lightmap(&scene, 0, &options, &session).unwrap();
        assert!(lm.width <= 64 && lm.height <= 64);
        assert_eq!(lm.sample_size, 128.0);
        assert_eq!(session.flush_warnings(), 1);
    }

    #[test]
    fn test_sky_and_vertex_lit_skipped() {
        let session = CompileSession::new();
        let mut scene = open_scene();
        let mut sky = ShaderInfo::named("sky");
        sky.compile_flags |= CompileFlags::SKY;
        scene.shaders.push(sky);
        let mut vlit = ShaderInfo::named("vlit");
        vlit.compile_flags |= CompileFlags::VERTEXLIT;
        scene.shaders.push(vlit);
        add_quad(&mut scene, 1, floor_quad(64.0, 0.0));
        add_quad(&mut scene, 2, floor_quad(64.0, 0.0));
        add_quad(&mut scene, 0, floor_quad(64.0, 0.0));
        let lms = allocate_raw_lightmaps(&scene, &LightOptions::default(), &session);
        assert_eq!(lms.len(), 1);
        assert_eq!(lms[0].surface_num, 2);
    }
}
