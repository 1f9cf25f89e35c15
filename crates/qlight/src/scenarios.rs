// scenarios.rs — end-to-end checks across light creation, tracing and the compile

use qlight_common::bspworld::BspWorld;
use qlight_common::q_shared::{Vec3, VEC3_ORIGIN};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::compile::LightCompiler;
use crate::lights::area::{area_light, Emission};
use crate::lights::{Light, LightFlags, LightKind, LightSet};
use crate::options::{LightOptions, SampleMode};
use crate::sample::{light_contribution_to_sample, Contribution, SampleContext};
use crate::session::CompileSession;
use crate::shader::{CompileFlags, ShaderInfo, SunDef};
use crate::testutil::{add_box, add_quad, build_tree, floor_quad, light_entity, open_scene, point_light, reversed, room_scene};
use crate::trace::{TraceInfo, TraceQuery, TraceStore, TraceTree, TraceVert};

fn query(origin: Vec3, normal: Vec3, surfaces: Vec<usize>) -> TraceQuery {
    TraceQuery { origin, normal, surfaces, ..Default::default() }
}

#[test]
fn test_entity_light_over_floor() {
    let session = CompileSession::new();
    let options = LightOptions::default();
    let mut scene = open_scene();
    let floor = add_quad(&mut scene, 0, floor_quad(64.0, 0.0));
    scene.entities.push(light_entity([32.0, 32.0, 100.0], 300.0));

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut set = LightSet::from_entities(&scene, &options, &session, &mut rng).unwrap();
    set.setup_envelopes(&scene.world, false, &options, &session);
    assert_eq!(set.len(), 1);
    let tree = build_tree(&scene, &options, &session);
    let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

    let mut q = query([32.0, 32.0, 0.0], [0.0, 0.0, 1.0], vec![floor]);
    assert_eq!(light_contribution_to_sample(&ctx, &set.lights[0], &mut q), Contribution::Lit);
    let expected = 300.0 * options.point_scale / (100.0 * 100.0);
    assert!((q.color[0] - expected).abs() < expected * 1e-4, "got {}", q.color[0]);
    assert_eq!(q.color[0], q.color[2]);
}

#[test]
fn test_enclosed_light_is_occluded() {
    let session = CompileSession::new();
    let options = LightOptions::default();
    let light = point_light(VEC3_ORIGIN, 1.0e6);

    let mut scene = open_scene();
    add_box(&mut scene, 0, [-32.0; 3], [32.0; 3]);
    let tree = build_tree(&scene, &options, &session);
    let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };
    let mut q = query([100.0, 0.0, 0.0], [-1.0, 0.0, 0.0], Vec::new());
    let result = light_contribution_to_sample(&ctx, &light, &mut q);
    assert_eq!(result, Contribution::Occluded);
    assert_eq!(result.as_i32(), -1);
    assert_eq!(q.color, VEC3_ORIGIN);
    assert_eq!(q.direction_contribution, VEC3_ORIGIN);

    // same sample with nothing in the way
    let bare = open_scene();
    let tree = build_tree(&bare, &options, &session);
    let ctx = SampleContext { world: &bare.world, tree: &tree, options: &options, session: &session, bouncing: false };
    let mut q = query([100.0, 0.0, 0.0], [-1.0, 0.0, 0.0], Vec::new());
    assert_eq!(light_contribution_to_sample(&ctx, &light, &mut q), Contribution::Lit);
    assert!(q.color[0] > 0.0);
}

#[test]
fn test_overhead_sun_through_sky() {
    let session = CompileSession::new();
    let options = LightOptions::default();
    let mut scene = open_scene();
    let mut sky = ShaderInfo::named("sky");
    sky.compile_flags = CompileFlags::SKY | CompileFlags::NODRAW;
    scene.shaders.push(sky);
    let floor = add_quad(&mut scene, 0, floor_quad(64.0, 0.0));
    add_quad(&mut scene, 1, reversed(floor_quad(1024.0, 512.0)));

    let sun = SunDef {
        direction: [0.0, 0.0, 1.0],
        color: [1.0, 1.0, 1.0],
        photons: 100.0,
        deviance: 0.0,
        num_samples: 1,
        style: 0,
    };
    let mut set = LightSet::new();
    set.add_sun(&sun, 0.0, &options, &mut StdRng::seed_from_u64(0));
    set.setup_envelopes(&scene.world, false, &options, &session);
    assert_eq!(set.len(), 1);

    let tree = build_tree(&scene, &options, &session);
    let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };
    let mut q = query([32.0, 32.0, 1.0], [0.0, 0.0, 1.0], vec![floor]);
    assert_eq!(light_contribution_to_sample(&ctx, &set.lights[0], &mut q), Contribution::Lit);
    assert!((q.color[0] - 100.0 * options.sky_scale).abs() < 1e-3);
    assert!(q.direction_contribution[0].abs() < 1e-6);
    assert!(q.direction_contribution[1].abs() < 1e-6);
    assert!(q.direction_contribution[2] > 0.0);

    // a ceiling that is not sky blocks the sun
    let mut roofed = open_scene();
    let floor = add_quad(&mut roofed, 0, floor_quad(64.0, 0.0));
    add_quad(&mut roofed, 0, reversed(floor_quad(1024.0, 512.0)));
    let tree = build_tree(&roofed, &options, &session);
    let ctx = SampleContext { world: &roofed.world, tree: &tree, options: &options, session: &session, bouncing: false };
    let mut q = query([32.0, 32.0, 1.0], [0.0, 0.0, 1.0], vec![floor]);
    assert_eq!(light_contribution_to_sample(&ctx, &set.lights[0], &mut q), Contribution::Occluded);
}

#[test]
fn test_sun_blocked_inside_portal_sky() {
    let session = CompileSession::new();
    let options = LightOptions::default();
    let mut sky = ShaderInfo::named("sky");
    sky.compile_flags = CompileFlags::SKY | CompileFlags::NODRAW;
    let shaders = [sky, ShaderInfo::default()];
    let tri = |z: f32| {
        [[0.0, 0.0, z], [0.0, 128.0, z], [128.0, 0.0, z]].map(|xyz| TraceVert { xyz, st: [0.0, 0.0] })
    };
    let build = |portal: bool| {
        let mut store = TraceStore::new();
        let sky_info = TraceInfo { shader_num: 0, surface_num: 0, cast_shadows: 1, skip_grid: false };
        store.add_triangle_set(sky_info, false, &[tri(100.0)], &session);
        if portal {
            let info = TraceInfo { shader_num: 1, surface_num: 1, cast_shadows: 1, skip_grid: false };
            store.add_triangle_set(info, true, &[tri(300.0)], &session);
        }
        TraceTree::build(&BspWorld::open(), store, &shaders, &session).unwrap()
    };

    let sun = SunDef {
        direction: [0.0, 0.0, 1.0],
        color: [1.0, 1.0, 1.0],
        photons: 100.0,
        deviance: 0.0,
        num_samples: 1,
        style: 0,
    };
    let mut set = LightSet::new();
    set.add_sun(&sun, 0.0, &options, &mut StdRng::seed_from_u64(0));
    set.setup_envelopes(&BspWorld::open(), false, &options, &session);
    let world = BspWorld::open();

    let open_sky = build(false);
    let ctx = SampleContext { world: &world, tree: &open_sky, options: &options, session: &session, bouncing: false };
    let mut q = query([32.0, 32.0, 0.0], [0.0, 0.0, 1.0], Vec::new());
    assert_eq!(light_contribution_to_sample(&ctx, &set.lights[0], &mut q), Contribution::Lit);

    let walled = build(true);
    let ctx = SampleContext { world: &world, tree: &walled, options: &options, session: &session, bouncing: false };
    let mut q = query([32.0, 32.0, 0.0], [0.0, 0.0, 1.0], Vec::new());
    assert_eq!(light_contribution_to_sample(&ctx, &set.lights[0], &mut q), Contribution::Occluded);
    assert!(q.opaque);
}

#[test]
fn test_split_emitter_matches_whole() {
    let session = CompileSession::new();
    let options = LightOptions::default();
    let world = BspWorld::open();
    let tree = TraceTree::build(&world, TraceStore::new(), &[ShaderInfo::default()], &session).unwrap();
    let ctx = SampleContext { world: &world, tree: &tree, options: &options, session: &session, bouncing: false };
    let emission = Emission {
        value: 1000.0,
        color: [1.0, 1.0, 1.0],
        scale: 1.0,
        style: 0,
        two_sided: false,
        filter_radius: 0.0,
    };
    let place = |mut light: Light| {
        light.cluster = 0;
        light.envelope = 1.0e6;
        light
    };

    let quad = floor_quad(64.0, 0.0);
    let whole = place(area_light(&quad, &emission, &options).unwrap());
    let halves = [
        place(area_light(&[quad[0], quad[1], quad[2]], &emission, &options).unwrap()),
        place(area_light(&[quad[0], quad[2], quad[3]], &emission, &options).unwrap()),
    ];

    for origin in [[20.0, 24.0, 64.0], [32.0, 32.0, 16.0], [-40.0, 90.0, 48.0]] {
        let mut q = query(origin, [0.0, 0.0, -1.0], Vec::new());
        assert_eq!(light_contribution_to_sample(&ctx, &whole, &mut q), Contribution::Lit);
        let expected = q.color[0];

        let mut sum = 0.0;
        for half in &halves {
            let mut q = query(origin, [0.0, 0.0, -1.0], Vec::new());
            light_contribution_to_sample(&ctx, half, &mut q);
            sum += q.color[0];
        }
        assert!((sum - expected).abs() <= expected * 1e-3, "at {:?}: {} vs {}", origin, sum, expected);
    }
}

fn fast_point(photons: f32) -> Light {
    let mut light = Light::new(LightKind::Point, LightFlags::Q3A_DEFAULT);
    light.photons = photons;
    light
}

fn solved(light: Light, options: &LightOptions) -> Light {
    let mut set = LightSet::new();
    set.push(light);
    set.setup_envelopes(&BspWorld::open(), false, options, &CompileSession::new());
    set.lights.remove(0)
}

#[test]
fn test_envelope_grows_with_photons_and_shrinking_tolerance() {
    let options = LightOptions::default();
    let mut last = 0.0;
    for photons in [100.0, 1000.0, 1.0e4, 1.0e5, 1.0e6] {
        let env = solved(fast_point(photons), &options).envelope;
        assert!(env >= last, "{} photons gave {} after {}", photons, env, last);
        last = env;
    }

    let mut last = 0.0;
    for tolerance in [8.0, 4.0, 1.0, 0.25, 0.05] {
        let mut light = fast_point(1.0e5);
        light.falloff_tolerance = tolerance;
        let env = solved(light, &options).envelope;
        assert!(env >= last, "tolerance {} gave {} after {}", tolerance, env, last);
        last = env;
    }
}

#[test]
fn test_attenuation_at_envelope_and_origin() {
    let options = LightOptions::default();
    let world = BspWorld::open();
    let session = CompileSession::new();
    let tree = TraceTree::build(&world, TraceStore::new(), &[ShaderInfo::default()], &session).unwrap();
    let ctx = SampleContext { world: &world, tree: &tree, options: &options, session: &session, bouncing: false };

    let mut light = fast_point(40000.0);
    light.origin = [0.0, 0.0, 1.0];
    let light = solved(light, &options);
    let tolerance = light.falloff_tolerance;

    // straight below the light, one unit inside the envelope edge
    let at_edge = [0.0, 0.0, 1.0 - (light.envelope - 1.0)];
    let mut q = query(at_edge, [0.0, 0.0, 1.0], Vec::new());
    light_contribution_to_sample(&ctx, &light, &mut q);
    assert!(q.color[0] <= tolerance * 1.05, "{} at the edge", q.color[0]);

    // exactly at the envelope the falloff has reached the tolerance
    let on_envelope = [0.0, 0.0, 1.0 - light.envelope];
    let mut q = query(on_envelope, [0.0, 0.0, 1.0], Vec::new());
    assert_eq!(light_contribution_to_sample(&ctx, &light, &mut q), Contribution::Unlit);
    assert!(q.color[0] <= tolerance, "{} on the envelope", q.color[0]);

    let beyond = [0.0, 0.0, 1.0 - (light.envelope + 8.0)];
    let mut q = query(beyond, [0.0, 0.0, 1.0], Vec::new());
    assert_eq!(light_contribution_to_sample(&ctx, &light, &mut q), Contribution::Unlit);
    assert_eq!(q.color, VEC3_ORIGIN);

    let mut q = query([0.0, 0.0, 1.0 - 1.0e-4], [0.0, 0.0, 1.0], Vec::new());
    assert_eq!(light_contribution_to_sample(&ctx, &light, &mut q), Contribution::Lit);
    assert!(q.color[0].is_finite() && q.color[0] > 0.0);
}

fn bake(mode: SampleMode, threads: usize) -> LightCompiler {
    let mut scene = room_scene([0.0; 3], [192.0; 3]);
    scene.entities.push(light_entity([64.0, 96.0, 128.0], 250.0));
    scene.entities.push(light_entity([150.0, 40.0, 40.0], 120.0));
    let options = LightOptions {
        sample_mode: mode,
        samples: 3,
        seed: 0x5eed,
        threads,
        bounce: 1,
        ..Default::default()
    };
    let mut compiler = LightCompiler::new(scene, options);
    compiler.run().unwrap();
    compiler
}

fn assert_same_output(a: &LightCompiler, b: &LightCompiler) {
    assert_eq!(a.lightmaps.len(), b.lightmaps.len());
    for (la, lb) in a.lightmaps.iter().zip(&b.lightmaps) {
        assert_eq!(la.surface_num, lb.surface_num);
        assert_eq!(la.bytes, lb.bytes);
        assert_eq!(la.deluxe_bytes, lb.deluxe_bytes);
    }
    for (va, vb) in a.scene.verts.iter().zip(&b.scene.verts) {
        assert_eq!(va.color, vb.color);
    }
    assert_eq!(a.grid.points.len(), b.grid.points.len());
    for (pa, pb) in a.grid.points.iter().zip(&b.grid.points) {
        assert_eq!(pa.ambient, pb.ambient);
        assert_eq!(pa.directed, pb.directed);
    }
}

#[test]
fn test_random_sampling_repeats_with_seed() {
    assert_same_output(&bake(SampleMode::Random, 2), &bake(SampleMode::Random, 2));
}

#[test]
fn test_output_independent_of_thread_count() {
    for mode in [SampleMode::Ordered, SampleMode::Adaptive, SampleMode::Random] {
        assert_same_output(&bake(mode, 1), &bake(mode, 4));
    }
}
