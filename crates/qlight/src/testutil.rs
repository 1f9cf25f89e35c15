// testutil.rs — scene fixtures shared by the unit tests

use qlight_common::bspworld::BspWorld;
use qlight_common::entities::Entity;
use qlight_common::q_shared::{plane_from_points, Vec3};
use qlight_common::qfiles::{DrawSurface, DrawVert, SurfaceType};

use crate::lights::{Light, LightFlags, LightKind};
use crate::luxel::{allocate::allocate_raw_lightmap, map_raw_lightmap, RawLightmap};
use crate::options::LightOptions;
use crate::scene::{BspModel, Scene};
use crate::session::CompileSession;
use crate::shader::ShaderInfo;
use crate::trace::{TraceStore, TraceTree};

fn worldspawn() -> Entity {
    let mut ent = Entity::default();
    ent.set_key("classname", "worldspawn");
    ent
}

fn finish_scene(world: BspWorld) -> Scene {
    let mut scene = Scene::new(world);
    scene.entities.push(worldspawn());
    scene.shaders.push(ShaderInfo::named("wall"));
    scene.models.push(BspModel::default());
    scene
}

/// A single open leaf, shader 0 "wall", an empty world model.
pub fn open_scene() -> Scene {
    finish_scene(BspWorld::open())
}

/// A sealed room with six inward-facing wall quads.
pub fn room_scene(mins: Vec3, maxs: Vec3) -> Scene {
    let mut scene = finish_scene(BspWorld::sealed_box(mins, maxs));
    for face in box_faces(mins, maxs) {
        add_quad(&mut scene, 0, reversed(face));
    }
    scene
}

/// Append a planar quad, clockwise seen from the front. Returns its
/// surface number; the world model grows to cover it.
pub fn add_quad(scene: &mut Scene, shader_num: usize, points: [Vec3; 4]) -> usize {
    let normal = plane_from_points(&points[0], &points[1], &points[2])
        .map(|p| p.normal)
        .unwrap_or([0.0, 0.0, 1.0]);
    let first_vert = scene.verts.len();
    let first_index = scene.indexes.len();
    for p in points {
        scene.verts.push(DrawVert {
            xyz: p,
            st: [p[0] / 64.0, p[1] / 64.0],
            normal,
            ..Default::default()
        });
    }
    scene.indexes.extend_from_slice(&[0, 1, 2, 0, 2, 3]);
    scene.surfaces.push(DrawSurface {
        surface_type: SurfaceType::Planar,
        shader_num,
        first_vert,
        num_verts: 4,
        first_index,
        num_indexes: 6,
        clusters: vec![0],
        ..Default::default()
    });
    let num = scene.surfaces.len() - 1;
    if let Some(world) = scene.models.first_mut() {
        world.num_surfaces = scene.surfaces.len();
    }
    num
}

/// Append a closed box of outward-facing quads.
pub fn add_box(scene: &mut Scene, shader_num: usize, mins: Vec3, maxs: Vec3) {
    for face in box_faces(mins, maxs) {
        add_quad(scene, shader_num, face);
    }
}

/// The six faces of a box, each facing out.
pub fn box_faces(mins: Vec3, maxs: Vec3) -> [[Vec3; 4]; 6] {
    let [x0, y0, z0] = mins;
    let [x1, y1, z1] = maxs;
    let top = [[x0, y0, z1], [x0, y1, z1], [x1, y1, z1], [x1, y0, z1]];
    let bottom = [[x1, y0, z0], [x1, y1, z0], [x0, y1, z0], [x0, y0, z0]];
    let east = [[x1, y0, z0], [x1, y0, z1], [x1, y1, z1], [x1, y1, z0]];
    let west = reversed([[x0, y0, z0], [x0, y0, z1], [x0, y1, z1], [x0, y1, z0]]);
    let north = [[x0, y1, z0], [x1, y1, z0], [x1, y1, z1], [x0, y1, z1]];
    let south = reversed([[x0, y0, z0], [x1, y0, z0], [x1, y0, z1], [x0, y0, z1]]);
    [top, bottom, east, west, north, south]
}

pub fn reversed(mut face: [Vec3; 4]) -> [Vec3; 4] {
    face.reverse();
    face
}

pub fn floor_quad(size: f32, z: f32) -> [Vec3; 4] {
    [[0.0, 0.0, z], [0.0, size, z], [size, size, z], [size, 0.0, z]]
}

pub fn light_entity(origin: Vec3, intensity: f32) -> Entity {
    let mut ent = Entity::default();
    ent.set_key("classname", "light");
    ent.set_key("origin", &format!("{} {} {}", origin[0], origin[1], origin[2]));
    ent.set_key("light", &format!("{}", intensity));
    ent
}

/// Shadow tree over every world surface of `scene`.
pub fn build_tree(scene: &Scene, options: &LightOptions, session: &CompileSession) -> TraceTree {
    let mut store = TraceStore::new();
    store.populate_world(scene, options, session);
    TraceTree::build(&scene.world, store, &scene.shaders, session).unwrap()
}

/// A point light with a solved envelope, not fast, in cluster 0.
pub fn point_light(origin: Vec3, photons: f32) -> Light {
    let mut light = Light::new(LightKind::Point, LightFlags::Q3A_DEFAULT.difference(LightFlags::FAST));
    light.origin = origin;
    light.photons = photons;
    light.cluster = 0;
    light.envelope = 1.0e6;
    light.envelope2 = 1.0e12;
    light.mins = [-1.0e6; 3];
    light.maxs = [1.0e6; 3];
    light
}

/// Allocate and map the raster of one surface.
pub fn mapped_lightmap(scene: &Scene, surface_num: usize, options: &LightOptions, session: &CompileSession) -> RawLightmap {
    let mut lm = allocate_raw_lightmap(scene, surface_num, options, session).unwrap();
    map_raw_lightmap(&mut lm, &scene.world, options, session);
    lm
}

#[cfg(test)]
mod tests {
    use super::*;
    use qlight_common::q_shared::dot_product;

    #[test]
    fn test_box_faces_point_outward() {
        let mins = [-16.0, -16.0, -16.0];
        let maxs = [16.0, 16.0, 16.0];
        for face in box_faces(mins, maxs) {
            let plane = plane_from_points(&face[0], &face[1], &face[2]).unwrap();
            let center = [
                (face[0][0] + face[2][0]) * 0.5,
                (face[0][1] + face[2][1]) * 0.5,
                (face[0][2] + face[2][2]) * 0.5,
            ];
            assert!(dot_product(&plane.normal, &center) > 0.0);
        }
    }

    #[test]
    fn test_room_scene_surfaces() {
        let scene = room_scene([-64.0; 3], [64.0; 3]);
        assert_eq!(scene.surfaces.len(), 6);
        assert_eq!(scene.models[0].num_surfaces, 6);
        assert!(scene.validate().is_ok());
        let floor = &scene.verts[scene.surfaces[1].first_vert];
        assert_eq!(floor.normal, [0.0, 0.0, 1.0]);
    }
}
