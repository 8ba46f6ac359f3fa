// ============================================================================
// GAUSSIAN BLUR — box-filter approximation, per tile
// ============================================================================

use rayon::prelude::*;

use crate::ops::{Filter, FilterParams, ProgressCallback, for_each_tile};
use crate::tiles::{Pixel, TILE_SIZE, Tile};

/// Gaussian blur approximated by three successive box filters whose widths
/// are derived from sigma. Each tile is processed in isolation; kernels
/// with spatial extent leave seams at tile boundaries (known limitation of
/// per-tile processing).
///
/// Parameters: float `sigma` in [0.1, 50.0], default 1.0.
pub struct GaussianBlur;

impl Filter for GaussianBlur {
    fn name(&self) -> &'static str {
        "Gaussian Blur"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn description(&self) -> &'static str {
        "Fast Gaussian blur using box blur approximation"
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
        let sigma = params.float_or("sigma", 1.0).clamp(0.1, 50.0);
        let sizes = box_sizes(sigma);
        for_each_tile(tiles, callback, |tile| {
            for &size in &sizes {
                if size > 1 {
                    box_blur_tile(tile, size);
                }
            }
        });
    }
}

/// Box widths for a 3-pass approximation of a Gaussian with the given sigma:
/// the ideal width is √(12σ²/n + 1); the first m passes use the odd floor,
/// the remainder use floor + 2, with m chosen so the total variance matches.
fn box_sizes(sigma: f32) -> [i32; 3] {
    let n = 3.0f32;
    let w_ideal = (12.0 * sigma * sigma / n + 1.0).sqrt();
    let mut wl = w_ideal.floor() as i32;
    if wl % 2 == 0 {
        wl -= 1;
    }
    let wu = wl + 2;
    let m_ideal = (12.0 * sigma * sigma - n * (wl * wl) as f32 - 4.0 * n * wl as f32 - 3.0 * n)
        / (-4.0 * wl as f32 - 4.0);
    let m = m_ideal.round() as i32;

    let mut sizes = [0i32; 3];
    for (i, size) in sizes.iter_mut().enumerate() {
        *size = if (i as i32) < m { wl } else { wu };
    }
    sizes
}

/// Separable box blur of one tile with reflected borders. Channel sums stay
/// in integer space; the division rounds to nearest so repeated passes do
/// not drift a flat field.
fn box_blur_tile(tile: &mut Tile, size: i32) {
    let n = TILE_SIZE as usize;
    let radius = size / 2;
    let count = (2 * radius + 1) as u32;
    let src: Vec<Pixel> = tile.pixels().to_vec();

    // Horizontal pass, parallel by row.
    let mut horizontal = vec![Pixel::default(); n * n];
    horizontal.par_chunks_mut(n).enumerate().for_each(|(y, row)| {
        let base = y * n;
        for x in 0..n {
            let (mut r, mut g, mut b, mut a) = (0u32, 0u32, 0u32, 0u32);
            for k in -radius..=radius {
                let sx = reflect(x as i32 + k) as usize;
                let p = src[base + sx];
                r += p.r as u32;
                g += p.g as u32;
                b += p.b as u32;
                a += p.a as u32;
            }
            row[x] = Pixel::new(
                ((r + count / 2) / count) as u16,
                ((g + count / 2) / count) as u16,
                ((b + count / 2) / count) as u16,
                ((a + count / 2) / count) as u16,
            );
        }
    });

    // Vertical pass, parallel by row.
    let mut output = vec![Pixel::default(); n * n];
    output.par_chunks_mut(n).enumerate().for_each(|(y, row)| {
        for x in 0..n {
            let (mut r, mut g, mut b, mut a) = (0u32, 0u32, 0u32, 0u32);
            for k in -radius..=radius {
                let sy = reflect(y as i32 + k) as usize;
                let p = horizontal[sy * n + x];
                r += p.r as u32;
                g += p.g as u32;
                b += p.b as u32;
                a += p.a as u32;
            }
            row[x] = Pixel::new(
                ((r + count / 2) / count) as u16,
                ((g + count / 2) / count) as u16,
                ((b + count / 2) / count) as u16,
                ((a + count / 2) / count) as u16,
            );
        }
    });

    tile.pixels_mut().copy_from_slice(&output);
}

/// Mirror an index back into [0, TILE_SIZE), edge pixel included in the
/// reflection.
#[inline]
fn reflect(i: i32) -> i32 {
    if i < 0 {
        (-i - 1).min(TILE_SIZE - 1)
    } else if i >= TILE_SIZE {
        (2 * TILE_SIZE - i - 1).max(0)
    } else {
        i
    }
}

// ============================================================================
// Tests
// ============================================================================
