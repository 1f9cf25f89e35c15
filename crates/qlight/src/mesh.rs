// mesh.rs — biquadratic patch tessellation

use qlight_common::q_shared::vector_normalize;
use qlight_common::qfiles::{DrawVert, MAX_LIGHTMAPS};

/// A regular grid of vertexes, row major.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub width: usize,
    pub height: usize,
    pub verts: Vec<DrawVert>,
}

impl Mesh {
    pub fn vert(&self, x: usize, y: usize) -> &DrawVert {
        &self.verts[y * self.width + x]
    }

    /// Quads as the two triangles used for tracing and mapping. The split
    /// diagonal alternates in a checkerboard.
    pub fn triangles(&self) -> Vec<[usize; 3]> {
        let mut out = Vec::new();
        if self.width < 2 || self.height < 2 {
            return out;
        }
        for y in 0..self.height - 1 {
            for x in 0..self.width - 1 {
                let pw = [
                    x + y * self.width,
                    x + (y + 1) * self.width,
                    x + 1 + (y + 1) * self.width,
                    x + 1 + y * self.width,
                    x + y * self.width,
                ];
                let r = (x + y) & 1;
                out.push([pw[r], pw[r + 1], pw[r + 2]]);
                out.push([pw[r], pw[r + 2], pw[r + 3]]);
            }
        }
        out
    }
}

fn lerp_vert(a: &DrawVert, b: &DrawVert, c: &DrawVert, t: f32) -> DrawVert {
    let wa = (1.0 - t) * (1.0 - t);
    let wb = 2.0 * t * (1.0 - t);
    let wc = t * t;
    let mix3 = |x: f32, y: f32, z: f32| wa * x + wb * y + wc * z;

    let mut out = DrawVert::default();
    for i in 0..3 {
        out.xyz[i] = mix3(a.xyz[i], b.xyz[i], c.xyz[i]);
        out.normal[i] = mix3(a.normal[i], b.normal[i], c.normal[i]);
    }
    for i in 0..2 {
        out.st[i] = mix3(a.st[i], b.st[i], c.st[i]);
        for lm in 0..MAX_LIGHTMAPS {
            out.lightmap[lm][i] = mix3(a.lightmap[lm][i], b.lightmap[lm][i], c.lightmap[lm][i]);
        }
    }
    out.color = a.color;
    out
}

/// Tessellate a `width` x `height` control grid of 3x3 quadratic blocks,
/// `subdivisions` steps per block edge. Grids that are not odd-sized come
/// back as-is.
pub fn tessellate_patch(ctrl: &[DrawVert], width: usize, height: usize, subdivisions: usize) -> Mesh {
    if width < 3 || height < 3 || width % 2 == 0 || height % 2 == 0 || ctrl.len() < width * height {
        return Mesh {
            width,
            height,
            verts: ctrl.iter().take(width * height).copied().collect(),
        };
    }
    let n = subdivisions.max(1);
    let blocks_x = (width - 1) / 2;
    let blocks_y = (height - 1) / 2;
    let out_w = blocks_x * n + 1;
    let out_h = blocks_y * n + 1;

    // expand along rows first, then columns
    let mut rows = vec![DrawVert::default(); out_w * height];
    for y in 0..height {
        for ox in 0..out_w {
            let block = (ox / n).min(blocks_x - 1);
            let t = (ox - block * n) as f32 / n as f32;
            let base = y * width + block * 2;
            rows[y * out_w + ox] = lerp_vert(&ctrl[base], &ctrl[base + 1], &ctrl[base + 2], t);
        }
    }

    let mut verts = vec![DrawVert::default(); out_w * out_h];
    for oy in 0..out_h {
        let block = (oy / n).min(blocks_y - 1);
        let t = (oy - block * n) as f32 / n as f32;
        let base = block * 2;
        for x in 0..out_w {
            let mut v = lerp_vert(
                &rows[base * out_w + x],
                &rows[(base + 1) * out_w + x],
                &rows[(base + 2) * out_w + x],
                t,
            );
            vector_normalize(&mut v.normal);
            verts[oy * out_w + x] = v;
        }
    }

    Mesh { width: out_w, height: out_h, verts }
}
