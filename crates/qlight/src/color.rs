// color.rs — linear light to output bytes and back

use bytemuck::{Pod, Zeroable};
use qlight_common::q_shared::Vec3;

use crate::options::LightOptions;

/// One output texel or vertex color.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const BLACK: Rgb8 = Rgb8 { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

/// Raw bytes of a texel buffer, three per texel.
pub fn rgb_bytes(texels: &[Rgb8]) -> &[u8] {
    bytemuck::cast_slice(texels)
}

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn gray(c: &Vec3) -> f32 {
    c[0] * 0.299 + c[1] * 0.587 + c[2] * 0.114
}

/// Turn accumulated light into output bytes: scale, gamma, saturation,
/// clamp or exposure, compensate, contrast, optional sRGB.
pub fn color_to_bytes(color: &Vec3, scale: f32, options: &LightOptions) -> Rgb8 {
    let scale = if scale <= 0.0 { 1.0 } else { scale };
    let gamma = 1.0 / options.gamma;

    let mut sample = [0.0f32; 3];
    for i in 0..3 {
        let v = color[i] * scale;
        // negative light floors at black
        sample[i] = if v < 0.0 { 0.0 } else { (v / 255.0).powf(gamma) * 255.0 };
    }

    if options.saturation != 1.0 {
        let g = gray(&sample);
        for s in sample.iter_mut() {
            *s = (g + (*s - g) * options.saturation).max(0.0);
        }
    }

    let max = sample[0].max(sample[1]).max(sample[2]);
    if options.exposure == 0.0 {
        if max > 255.0 {
            for s in sample.iter_mut() {
                *s *= 255.0 / max;
            }
        }
    } else {
        let inv = 1.0 / options.exposure;
        let mut dif = (1.0 - (-max * inv).exp()) * 255.0;
        dif = if max > 0.0 { dif / max } else { 0.0 };
        for s in sample.iter_mut() {
            *s *= dif;
        }
    }

    for s in sample.iter_mut() {
        *s /= options.compensate;
    }

    if options.contrast != 1.0 {
        for s in sample.iter_mut() {
            *s = (options.contrast * (*s - 128.0) + 128.0).max(0.0);
        }
        let max = sample[0].max(sample[1]).max(sample[2]);
        if max > 255.0 {
            for s in sample.iter_mut() {
                *s = *s * 255.0 / max;
            }
        }
    }

    if options.lightmap_srgb {
        for s in sample.iter_mut() {
            *s = (linear_to_srgb(*s / 255.0) * 255.0 + 0.5).floor();
        }
    }

    let byte = |v: f32| v.clamp(0.0, 255.0) as u8;
    Rgb8::new(byte(sample[0]), byte(sample[1]), byte(sample[2]))
}

/// Inverse of `color_to_bytes` for unclamped colors with identity
/// exposure and contrast.
pub fn bytes_to_color(bytes: Rgb8, scale: f32, options: &LightOptions) -> Vec3 {
    let scale = if scale <= 0.0 { 1.0 } else { scale };
    bytes.to_array().map(|b| {
        let mut v = b as f32;
        if options.lightmap_srgb {
            v = srgb_to_linear(v / 255.0) * 255.0;
        }
        v *= options.compensate;
        (v / 255.0).powf(options.gamma) * 255.0 / scale
    })
}
