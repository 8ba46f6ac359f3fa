// ============================================================================
// UNSHARP MASK — blur, thresholded difference, amount-scaled add-back
// ============================================================================

use rayon::prelude::*;

use crate::ops::{Filter, FilterParams, ProgressCallback, for_each_tile};
use crate::tiles::{TILE_SIZE, Tile};

/// Classic unsharp mask, per tile: subtract a Gaussian-blurred copy from the
/// original, optionally suppress low-contrast differences, then add the
/// difference back scaled by `amount`.
///
/// Parameters: float `radius` in [0.1, 50.0] (default 1.0, the blur sigma),
/// float `amount` in [0.0, 5.0] (default 1.0), float `threshold` in
/// [0.0, 1.0] (default 0.0). A difference whose luminance magnitude is at or
/// below `threshold`·255 is zeroed before the add-back.
pub struct UnsharpMask;

impl Filter for UnsharpMask {
    fn name(&self) -> &'static str {
        "Unsharp Mask"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn description(&self) -> &'static str {
        "Unsharp mask filter for image sharpening"
    }

    fn process(
        &self,
        tiles: &mut [Tile],
        _width: i32,
        _height: i32,
        params: &FilterParams,
        callback: &ProgressCallback,
    ) {
        if tiles.is_empty() {
            return;
        }
        let radius = params.float_or("radius", 1.0).clamp(0.1, 50.0);
        let amount = params.float_or("amount", 1.0).clamp(0.0, 5.0);
        let threshold = params.float_or("threshold", 0.0).clamp(0.0, 1.0);
        for_each_tile(tiles, callback, |tile| {
            unsharp_tile(tile, radius, amount, threshold);
        });
    }
}

fn unsharp_tile(tile: &mut Tile, radius: f32, amount: f32, threshold: f32) {
    // Interleaved f32 working copy of all four channels.
    let original: Vec<f32> = tile
        .pixels()
        .iter()
        .flat_map(|p| [p.r as f32, p.g as f32, p.b as f32, p.a as f32])
        .collect();
    let blurred = gaussian_blur_channels(&original, radius);

    // Threshold scale: the difference luminance, in 16-bit channel units,
    // compared against threshold·255.
    let cutoff = threshold * 255.0;

    let pixels = tile.pixels_mut();
    pixels.par_iter_mut().enumerate().for_each(|(i, pixel)| {
        let base = i * 4;
        let mut diff = [0.0f32; 4];
        for (c, d) in diff.iter_mut().enumerate() {
            *d = original[base + c] - blurred[base + c];
        }
        if threshold > 0.0 {
            let luma = 0.2126 * diff[0] + 0.7152 * diff[1] + 0.0722 * diff[2];
            if luma.abs() <= cutoff {
                diff = [0.0; 4];
            }
        }
        pixel.r = requantize(original[base] + amount * diff[0]);
        pixel.g = requantize(original[base + 1] + amount * diff[1]);
        pixel.b = requantize(original[base + 2] + amount * diff[2]);
        pixel.a = requantize(original[base + 3] + amount * diff[3]);
    });
}

#[inline]
fn requantize(v: f32) -> u16 {
    v.round().clamp(0.0, 65535.0) as u16
}

/// Build a 1-D Gaussian kernel truncated at ceil(3·sigma).
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let mut kernel = vec![0.0f32; len];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        let v = (-x * x / s2).exp();
        *k = v;
        sum += v;
    }
    let inv = 1.0 / sum;
    for k in &mut kernel {
        *k *= inv;
    }
    kernel
}

/// Separable Gaussian blur over an interleaved 4-channel f32 buffer with
/// clamped borders, parallel by row.
fn gaussian_blur_channels(src: &[f32], sigma: f32) -> Vec<f32> {
    let n = TILE_SIZE as usize;
    let kernel = gaussian_kernel(sigma);
    let radius = kernel.len() / 2;

    let mut horizontal = vec![0.0f32; n * n * 4];
    horizontal.par_chunks_mut(n * 4).enumerate().for_each(|(y, row)| {
        let row_start = y * n * 4;
        for x in 0..n {
            let mut acc = [0.0f32; 4];
            for (k, &weight) in kernel.iter().enumerate() {
                let sx = (x as isize + k as isize - radius as isize).clamp(0, n as isize - 1) as usize;
                let idx = row_start + sx * 4;
                for c in 0..4 {
                    acc[c] += src[idx + c] * weight;
                }
            }
            row[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    let mut vertical = vec![0.0f32; n * n * 4];
    vertical.par_chunks_mut(n * 4).enumerate().for_each(|(y, row)| {
        for x in 0..n {
            let mut acc = [0.0f32; 4];
            for (k, &weight) in kernel.iter().enumerate() {
                let sy = (y as isize + k as isize - radius as isize).clamp(0, n as isize - 1) as usize;
                let idx = sy * n * 4 + x * 4;
                for c in 0..4 {
                    acc[c] += horizontal[idx + c] * weight;
                }
            }
            row[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });
    vertical
}

// ============================================================================
// Tests
// ============================================================================
