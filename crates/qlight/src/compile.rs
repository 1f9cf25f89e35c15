// compile.rs — the phase runner: geometry, lights, lightmaps, bounces, grid

use qlight_common::common::{com_dprintf, com_printf, com_set_developer};
use qlight_common::qfiles::{SurfaceType, MAX_LIGHTMAPS};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::bounce::create_bounce_lights;
use crate::color::color_to_bytes;
use crate::error::LightError;
use crate::grid::{average_ambient, trace_grid, LightGrid};
use crate::illum::{
    dirty_raw_lightmap, filter_raw_lightmap, floodlight_def, floodlight_raw_lightmap, illuminate_raw_lightmap,
    illuminate_vertexes, store_raw_lightmap, Hemispheres, VertexLighting,
};
use crate::lights::LightSet;
use crate::luxel::{allocate_raw_lightmaps, map_raw_lightmap, RawLightmap};
use crate::options::LightOptions;
use crate::sample::SampleContext;
use crate::scene::Scene;
use crate::session::{CompileSession, LightStats};
use crate::shader::CompileFlags;
use crate::trace::{TraceStore, TraceTree};

fn phase(name: &str) {
    com_printf(&format!("--- {} ---\n", name));
}

/// Surfaces lit per vertex without a raster of their own.
fn wants_vertex_light(scene: &Scene, surface_num: usize, has_raster: bool) -> bool {
    let surf = &scene.surfaces[surface_num];
    if has_raster || surf.num_verts == 0 {
        return false;
    }
    if !matches!(surf.surface_type, SurfaceType::Planar | SurfaceType::Patch | SurfaceType::TriangleSoup) {
        return false;
    }
    let shader = scene.shader(surf);
    !shader.is_sky() && !shader.compile_flags.contains(CompileFlags::NODRAW)
}

/// One light compile over a scene. `run` leaves lightmap bytes in
/// `lightmaps`, vertex colors and lightmap coordinates in `scene`, and the
/// volume samples in `grid`.
pub struct LightCompiler {
    pub scene: Scene,
    pub options: LightOptions,
    pub session: CompileSession,
    pub lightmaps: Vec<RawLightmap>,
    pub vertex_lighting: Vec<VertexLighting>,
    pub grid: LightGrid,
}

impl LightCompiler {
    pub fn new(scene: Scene, options: LightOptions) -> Self {
        Self {
            scene,
            options,
            session: CompileSession::new(),
            lightmaps: Vec::new(),
            vertex_lighting: Vec::new(),
            grid: LightGrid::default(),
        }
    }

    pub fn run(&mut self) -> Result<LightStats, LightError> {
        let result = self.run_phases();
        if let Err(e) = &result {
            com_printf(&format!("********************\nERROR: {}\n********************\n", e));
        }
        result
    }

    fn run_phases(&mut self) -> Result<LightStats, LightError> {
        com_set_developer(self.options.developer);
        if let Some(world) = self.scene.worldspawn().cloned() {
            self.options.apply_worldspawn(&world);
        }
        self.options.sanitize();
        self.scene.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads)
            .build()
            .map_err(|e| LightError::InvalidInput(format!("thread pool: {}", e)))?;
        com_dprintf(&format!("{} threads\n", pool.current_num_threads()));
        pool.install(|| self.bake())?;

        let stats = self.session.stats();
        report(&stats, &self.grid);
        Ok(stats)
    }

    fn bake(&mut self) -> Result<(), LightError> {
        let Self { scene, options, session, lightmaps, vertex_lighting, grid } = &mut *self;
        let options: &LightOptions = options;
        let session: &CompileSession = session;

        phase("TraceGeometry");
        let mut store = TraceStore::new();
        store.populate_world(scene, options, session);
        let tree = TraceTree::build(&scene.world, store, &scene.shaders, session)?;
        session.flush_warnings();

        phase("Lights");
        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut lights = LightSet::from_entities(scene, options, session, &mut rng)?;
        lights.add_shader_suns(scene, options, &mut rng);
        lights.add_surface_lights(scene, options, session);
        com_printf(&format!(
            "{:9} point lights\n{:9} spot lights\n{:9} sun lights\n{:9} area lights\n",
            lights.num_point, lights.num_spot, lights.num_sun, lights.num_area
        ));
        let mut grid_lights = lights.clone();
        grid_lights.setup_envelopes(&scene.world, true, options, session);
        lights.setup_envelopes(&scene.world, false, options, session);
        session.flush_warnings();

        phase("MapLuxels");
        *lightmaps = allocate_raw_lightmaps(scene, options, session);
        session.begin_progress(lightmaps.len());
        lightmaps.par_iter_mut().for_each(|lm| {
            map_raw_lightmap(lm, &scene.world, options, session);
            session.tick();
        });
        session.flush_warnings();

        let scene: &Scene = scene;
        let vectors = Hemispheres::new()?;
        let ctx = SampleContext { world: &scene.world, tree: &tree, options, session, bouncing: false };

        if options.dirty {
            phase("Dirt");
            session.begin_progress(lightmaps.len());
            lightmaps.par_iter_mut().for_each(|lm| {
                let shader = scene.shader(&scene.surfaces[lm.surface_num]);
                if !shader.compile_flags.contains(CompileFlags::NODIRT) {
                    dirty_raw_lightmap(lm, &ctx, &vectors.dirt);
                }
                session.tick();
            });
        }

        let flood_defs: Vec<_> = lightmaps
            .iter()
            .map(|lm| floodlight_def(options, scene.shader(&scene.surfaces[lm.surface_num])))
            .collect();
        if flood_defs.iter().any(Option::is_some) {
            phase("Floodlight");
            session.begin_progress(lightmaps.len());
            lightmaps.par_iter_mut().zip(&flood_defs).for_each(|(lm, def)| {
                if let Some(def) = def {
                    floodlight_raw_lightmap(lm, &ctx, def, &vectors.flood);
                }
                session.tick();
            });
        }

        phase("IlluminateRawLightmap");
        session.begin_progress(lightmaps.len());
        lightmaps.par_iter_mut().for_each(|lm| {
            illuminate_raw_lightmap(lm, &ctx, &lights, 0);
            session.tick();
        });
        session.flush_warnings();

        let mut has_raster = vec![false; scene.surfaces.len()];
        for lm in lightmaps.iter() {
            has_raster[lm.surface_num] = true;
        }
        let mut direct: Vec<VertexLighting> = (0..scene.surfaces.len())
            .filter(|&num| wants_vertex_light(scene, num, has_raster[num]))
            .map(|num| VertexLighting::new(scene, num))
            .collect();

        phase("IlluminateVertexes");
        session.begin_progress(direct.len());
        direct.par_iter_mut().for_each(|vl| {
            illuminate_vertexes(vl, scene, None, &ctx, &lights, &vectors);
            session.tick();
        });
        session.flush_warnings();

        for bounce in 1..=options.bounce {
            phase(&format!("Bounce {}", bounce));
            let mut bounce_lights = create_bounce_lights(scene, lightmaps, options, session);
            bounce_lights.setup_envelopes(&scene.world, false, options, session);
            if bounce_lights.is_empty() {
                com_printf("no diffuse light to bounce\n");
                break;
            }
            com_printf(&format!("{:9} diffuse lights\n", bounce_lights.len()));
            let bounce_ctx = SampleContext { bouncing: true, ..ctx };

            session.begin_progress(lightmaps.len());
            lightmaps.par_iter_mut().for_each(|lm| {
                illuminate_raw_lightmap(lm, &bounce_ctx, &bounce_lights, bounce);
                session.tick();
            });
            direct.par_iter_mut().for_each(|vl| {
                illuminate_vertexes(vl, scene, None, &bounce_ctx, &bounce_lights, &vectors);
            });
            session.flush_warnings();
        }

        phase("FilterRawLightmap");
        lightmaps.par_iter_mut().for_each(|lm| filter_raw_lightmap(lm, options, session));

        let mut from_raster: Vec<VertexLighting> = lightmaps
            .par_iter()
            .map(|lm| {
                let mut vl = VertexLighting::new(scene, lm.surface_num);
                illuminate_vertexes(&mut vl, scene, Some(lm), &ctx, &lights, &vectors);
                vl
            })
            .collect();

        phase("StoreRawLightmap");
        lightmaps.par_iter_mut().for_each(|lm| store_raw_lightmap(lm, options));

        if options.grid {
            phase("TraceGrid");
            *grid = LightGrid::layout(scene, options.grid_size);
            trace_grid(grid, &ctx, &grid_lights);
            session.flush_warnings();
        }

        from_raster.append(&mut direct);
        from_raster.sort_by_key(|vl| vl.surface_num);
        *vertex_lighting = from_raster;

        self.write_back();
        Ok(())
    }

    /// Copy styles, normalized lightmap coordinates and vertex colors into
    /// the scene's draw surfaces and vertexes.
    fn write_back(&mut self) {
        let options = &self.options;
        for lm in &self.lightmaps {
            self.scene.surfaces[lm.surface_num].lightmap_styles = lm.styles;
        }

        for vl in &self.vertex_lighting {
            let surf = &mut self.scene.surfaces[vl.surface_num];
            surf.vertex_styles = vl.styles;
            let first = surf.first_vert;
            let shader = &self.scene.shaders[surf.shader_num];
            let floor = if shader.min_light != [0.0; 3] { shader.min_light } else { options.min_light };
            let raster = self.lightmaps.iter().find(|lm| lm.surface_num == vl.surface_num);

            for (i, colors) in vl.colors.iter().enumerate() {
                let vert = &mut self.scene.verts[first + i];
                for slot in 0..MAX_LIGHTMAPS {
                    let mut c = colors[slot];
                    if slot == 0 {
                        c = [c[0].max(floor[0]), c[1].max(floor[1]), c[2].max(floor[2])];
                    }
                    let rgb = color_to_bytes(&c, options.vertex_scale, options);
                    vert.color[slot] = [rgb.r, rgb.g, rgb.b, 255];
                }
                if let (Some(lm), Some(coord)) = (raster, vl.lightmap_coords.get(i)) {
                    let st = [coord[0] / lm.width as f32, coord[1] / lm.height as f32];
                    vert.lightmap = [st; MAX_LIGHTMAPS];
                }
            }
        }
    }
}

fn report(stats: &LightStats, grid: &LightGrid) {
    com_printf(&format!(
        "{:9} culled lights\n{:9} surface lights\n{:9} mapped luxels\n{:9} occluded luxels\n\
         {:9} luxels illuminated\n{:9} luxels subsampled\n{:9} luxels flooded\n{:9} vertexes lit\n\
         {:9} bounce lights\n{:9} grid points\n{:9} light samples\n{:9} traces\n",
        stats.culled_lights,
        stats.surface_lights,
        stats.mapped_luxels,
        stats.occluded_luxels,
        stats.illuminated_luxels,
        stats.subsampled_luxels,
        stats.flooded_luxels,
        stats.vertexes_lit,
        stats.bounce_lights,
        stats.grid_points,
        stats.light_samples,
        stats.traces,
    ));
    if stats.style_overflows > 0 {
        com_printf(&format!("{:9} light style overflows\n", stats.style_overflows));
    }
    if !grid.points.is_empty() {
        let a = average_ambient(grid);
        com_dprintf(&format!("grid average ambient {:.1} {:.1} {:.1}\n", a[0], a[1], a[2]));
    }
}
