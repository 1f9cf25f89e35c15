// grid.rs — light grid: coarse volume samples for models and entities

use qlight_common::common::com_dprintf;
use qlight_common::q_shared::{
    add_point_to_bounds, clear_bounds, dot_product, vector_add_to, vector_ma, vector_normalize, vector_scale, Vec3,
    VEC3_ORIGIN,
};
use qlight_common::qfiles::{LS_NONE, LS_NORMAL, MAX_LIGHTMAPS, MAX_MAP_LIGHTGRID};
use rayon::prelude::*;

use crate::color::{color_to_bytes, Rgb8};
use crate::lights::envelope::{nudged_cluster, LIGHT_NUDGE};
use crate::lights::LightSet;
use crate::sample::{light_contribution_to_point, rgb_to_gray, style_slot, SampleContext};
use crate::scene::Scene;
use crate::session::bump;
use crate::trace::TraceQuery;

/// Hits this close to the grid point are ignored.
pub const GRID_INHIBIT_RADIUS: f32 = 1.5;
const MIN_GRID_SIZE: f32 = 8.0;
const GRID_SIZE_STEP: f32 = 16.0;

/// Share of directed light folded into ambient outside bounce passes.
const DIRECTED_TO_AMBIENT: f32 = 0.125;

/// One finished grid sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub ambient: [Rgb8; MAX_LIGHTMAPS],
    pub directed: [Rgb8; MAX_LIGHTMAPS],
    pub styles: [u8; MAX_LIGHTMAPS],
    /// Dominant light direction, toward the light.
    pub dir: Vec3,
    pub lat_long: [u8; 2],
}

impl Default for GridPoint {
    fn default() -> Self {
        Self {
            ambient: [Rgb8::BLACK; MAX_LIGHTMAPS],
            directed: [Rgb8::BLACK; MAX_LIGHTMAPS],
            styles: [LS_NORMAL, LS_NONE, LS_NONE, LS_NONE],
            dir: VEC3_ORIGIN,
            lat_long: [0, 0],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LightGrid {
    /// Position of point (0, 0, 0).
    pub origin: Vec3,
    pub size: Vec3,
    pub bounds: [usize; 3],
    /// x varies fastest, then y, then z.
    pub points: Vec<GridPoint>,
}

/// Encode a unit direction as two angle bytes, 256 steps per turn.
pub fn normal_to_lat_long(normal: &Vec3) -> [u8; 2] {
    if normal[0] == 0.0 && normal[1] == 0.0 {
        return if normal[2] > 0.0 { [0, 0] } else { [128, 0] };
    }
    let a = normal[1].atan2(normal[0]).to_degrees() * (255.0 / 360.0);
    let b = normal[2].clamp(-1.0, 1.0).acos().to_degrees() * (255.0 / 360.0);
    [(a as i32 & 0xff) as u8, (b as i32 & 0xff) as u8]
}

fn grid_extent(scene: &Scene) -> Option<(Vec3, Vec3)> {
    if let Some(model) = scene.models.first() {
        if (0..3).all(|i| model.mins[i] <= model.maxs[i]) && model.mins != model.maxs {
            return Some((model.mins, model.maxs));
        }
    }
    let mut mins = VEC3_ORIGIN;
    let mut maxs = VEC3_ORIGIN;
    clear_bounds(&mut mins, &mut maxs);
    for surf in scene.surfaces.iter().filter(|s| s.entity_num == 0) {
        for v in scene.surface_verts(surf) {
            add_point_to_bounds(&v.xyz, &mut mins, &mut maxs);
        }
    }
    (mins[0] <= maxs[0]).then_some((mins, maxs))
}

impl LightGrid {
    /// Lay the grid over the world model. Cell size grows, one axis at a
    /// time, until the point count fits `MAX_MAP_LIGHTGRID`.
    pub fn layout(scene: &Scene, grid_size: Vec3) -> Self {
        let Some((mins, maxs)) = grid_extent(scene) else {
            return Self { size: grid_size, ..Default::default() };
        };
        let mut size = grid_size.map(|s| if s >= MIN_GRID_SIZE { s.floor() } else { MIN_GRID_SIZE });

        let mut axis = 0;
        loop {
            let mut origin = VEC3_ORIGIN;
            let mut bounds = [0usize; 3];
            for i in 0..3 {
                origin[i] = size[i] * (mins[i] / size[i]).ceil();
                let max = size[i] * (maxs[i] / size[i]).floor();
                bounds[i] = if max >= origin[i] { ((max - origin[i]) / size[i]) as usize + 1 } else { 1 };
            }
            if bounds.iter().product::<usize>() <= MAX_MAP_LIGHTGRID {
                return Self { origin, size, bounds, points: Vec::new() };
            }
            size[axis % 3] += GRID_SIZE_STEP;
            axis += 1;
        }
    }

    pub fn num_points(&self) -> usize {
        self.bounds.iter().product()
    }

    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.bounds[1] + y) * self.bounds[0] + x
    }

    pub fn point_origin(&self, index: usize) -> Vec3 {
        let x = index % self.bounds[0];
        let y = (index / self.bounds[0]) % self.bounds[1];
        let z = index / (self.bounds[0] * self.bounds[1]);
        [
            self.origin[0] + x as f32 * self.size[0],
            self.origin[1] + y as f32 * self.size[1],
            self.origin[2] + z as f32 * self.size[2],
        ]
    }
}

struct Contribution {
    color: Vec3,
    dir: Vec3,
    style: u8,
}

/// Gather every grid light at `origin` and split the result into a
/// dominant directed part and an ambient part per style.
pub fn trace_grid_point(ctx: &SampleContext, set: &LightSet, origin: &Vec3) -> GridPoint {
    let options = ctx.options;
    let mut point = GridPoint::default();
    let mut ambient = [VEC3_ORIGIN; MAX_LIGHTMAPS];
    let mut directed = [VEC3_ORIGIN; MAX_LIGHTMAPS];
    if !ctx.bouncing {
        ambient[0] = options.ambient_color;
    }

    let (cluster, origin) = nudged_cluster(ctx.world, origin, LIGHT_NUDGE, 3);
    let mut dir = VEC3_ORIGIN;
    if cluster >= 0 {
        let mut q = TraceQuery {
            origin,
            cluster,
            grid: true,
            inhibit_radius: GRID_INHIBIT_RADIUS,
            ..Default::default()
        };
        let mut contributions = Vec::new();
        for light in &set.lights {
            if !light_contribution_to_point(ctx, light, &mut q) {
                continue;
            }
            let color = if light.is_negative() { vector_scale(&q.color, -1.0) } else { q.color };
            dir = vector_ma(&dir, rgb_to_gray(&color), &q.direction);
            contributions.push(Contribution { color, dir: q.direction, style: light.style });
        }
        vector_normalize(&mut dir);

        for c in &contributions {
            let Some(slot) = style_slot(&point.styles, c.style) else {
                bump(&ctx.session.counters.style_overflows);
                continue;
            };
            point.styles[slot] = c.style;
            let d = dot_product(&c.dir, &dir);
            directed[slot] = vector_ma(&directed[slot], d.max(0.0), &c.color);
            ambient[slot] = vector_ma(&ambient[slot], 0.25 * (1.0 - d), &c.color);
        }
        if !ctx.bouncing {
            for (a, d) in ambient.iter_mut().zip(&directed) {
                *a = vector_ma(a, DIRECTED_TO_AMBIENT, d);
            }
        }
    }

    for i in 0..3 {
        ambient[0][i] = ambient[0][i].max(options.min_light[i]);
    }
    for slot in 0..MAX_LIGHTMAPS {
        point.ambient[slot] = color_to_bytes(&ambient[slot], 1.0, options);
        point.directed[slot] = color_to_bytes(&directed[slot], 1.0, options);
    }
    point.dir = dir;
    point.lat_long = normal_to_lat_long(&dir);
    bump(&ctx.session.counters.grid_points);
    point
}

/// Trace every point of `grid` in parallel.
pub fn trace_grid(grid: &mut LightGrid, ctx: &SampleContext, set: &LightSet) {
    let total = grid.num_points();
    com_dprintf(&format!("{} x {} x {} grid points\n", grid.bounds[0], grid.bounds[1], grid.bounds[2]));
    ctx.session.begin_progress(total);
    let layout = &*grid;
    let points: Vec<GridPoint> = (0..total)
        .into_par_iter()
        .map(|i| {
            let p = trace_grid_point(ctx, set, &layout.point_origin(i));
            ctx.session.tick();
            p
        })
        .collect();
    grid.points = points;
}

/// Mean ambient of every grid point; used in the run summary.
pub fn average_ambient(grid: &LightGrid) -> Vec3 {
    if grid.points.is_empty() {
        return VEC3_ORIGIN;
    }
    let mut sum = VEC3_ORIGIN;
    for p in &grid.points {
        let a = p.ambient[0];
        vector_add_to(&[a.r as f32, a.g as f32, a.b as f32], &mut sum);
    }
    vector_scale(&sum, 1.0 / grid.points.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::LightOptions;
    use crate::session::CompileSession;
    use crate::testutil::{add_quad, build_tree, floor_quad, open_scene, point_light, room_scene};

    #[test]
    fn test_layout_snaps_to_cells() {
        let scene = room_scene([0.0; 3], [256.0; 3]);
        let grid = LightGrid::layout(&scene, [64.0, 64.0, 128.0]);
        assert_eq!(grid.origin, [0.0; 3]);
        assert_eq!(grid.bounds, [5, 5, 3]);
        assert_eq!(grid.point_origin(grid.index(1, 2, 1)), [64.0, 128.0, 128.0]);
    }

    #[test]
    fn test_layout_grows_cells_to_fit() {
        let mut scene = open_scene();
        scene.models[0].mins = [-32768.0; 3];
        scene.models[0].maxs = [32768.0; 3];
        let grid = LightGrid::layout(&scene, [64.0, 64.0, 64.0]);
        assert!(grid.num_points() <= MAX_MAP_LIGHTGRID);
        assert!(grid.size[0] > 64.0);
    }

    #[test]
    fn test_lat_long() {
        assert_eq!(normal_to_lat_long(&[0.0, 0.0, 1.0]), [0, 0]);
        assert_eq!(normal_to_lat_long(&[0.0, 0.0, -1.0]), [128, 0]);
        assert_eq!(normal_to_lat_long(&[1.0, 0.0, 0.0]), [0, 63]);
        assert_eq!(normal_to_lat_long(&[0.0, 1.0, 0.0]), [63, 63]);
    }

    #[test]
    fn test_point_under_light_is_directed() {
        let session = CompileSession::new();
        let options = LightOptions::default();
        let mut scene = open_scene();
        add_quad(&mut scene, 0, floor_quad(256.0, 0.0));
        let tree = build_tree(&scene, &options, &session);
        let mut set = LightSet::new();
        set.push(point_light([128.0, 128.0, 128.0], 1.0e6));
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        let p = trace_grid_point(&ctx, &set, &[128.0, 128.0, 64.0]);
        assert!((p.dir[2] - 1.0).abs() < 1e-5);
        assert_eq!(p.lat_long, [0, 0]);
        // 1e6 / 64^2, clamped
        assert_eq!(p.directed[0], Rgb8::new(244, 244, 244));
        // a single light is fully directed; ambient is the 1/8 share
        assert_eq!(p.ambient[0], Rgb8::new(30, 30, 30));
        assert_eq!(session.stats().grid_points, 1);
    }

    #[test]
    fn test_point_in_solid_keeps_ambient() {
        let session = CompileSession::new();
        let options = LightOptions { ambient_color: [10.0, 20.0, 30.0], ..Default::default() };
        let scene = room_scene([0.0; 3], [64.0; 3]);
        let tree = build_tree(&scene, &options, &session);
        let mut set = LightSet::new();
        set.push(point_light([32.0, 32.0, 32.0], 1.0e6));
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        let p = trace_grid_point(&ctx, &set, &[500.0, 500.0, 500.0]);
        assert_eq!(p.ambient[0], color_to_bytes(&options.ambient_color, 1.0, &options));
        assert_eq!(p.directed[0], Rgb8::BLACK);
    }

    #[test]
    fn test_trace_grid_fills_every_point() {
        let session = CompileSession::new();
        let options = LightOptions::default();
        let scene = room_scene([0.0; 3], [128.0; 3]);
        let tree = build_tree(&scene, &options, &session);
        let mut set = LightSet::new();
        set.push(point_light([64.0, 64.0, 64.0], 1.0e5));
        let ctx = SampleContext { world: &scene.world, tree: &tree, options: &options, session: &session, bouncing: false };

        let mut grid = LightGrid::layout(&scene, options.grid_size);
        trace_grid(&mut grid, &ctx, &set);
        assert_eq!(grid.points.len(), grid.num_points());
        assert!(grid.points.iter().any(|p| p.directed[0] != Rgb8::BLACK));
    }
}
