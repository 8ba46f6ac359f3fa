// ============================================================================
// EDGE HELPERS — luma, Canny, dilation, chamfer distance transform
// ============================================================================
//
// Shared by the inpaint ("advanced") and smudge ("smart") filters. All
// functions operate on one tile's worth of data (TILE_SIZE × TILE_SIZE).

use crate::tiles::{TILE_SIZE, Tile};

const N: usize = TILE_SIZE as usize;

/// BT.709 luminance of a tile, rescaled to the 0..255 range the Canny
/// thresholds are calibrated against.
pub(crate) fn luma_255(tile: &Tile) -> Vec<f32> {
    tile.pixels()
        .iter()
        .map(|p| {
            let r = p.r as f32 / 257.0;
            let g = p.g as f32 / 257.0;
            let b = p.b as f32 / 257.0;
            0.2126 * r + 0.7152 * g + 0.0722 * b
        })
        .collect()
}

/// Canny edge detection over a tile-sized luma plane: Sobel gradients,
/// non-maximum suppression along the quantized gradient direction, then
/// double-threshold hysteresis. Returns a boolean edge map.
pub(crate) fn canny(luma: &[f32], low: f32, high: f32) -> Vec<bool> {
    let mut magnitude = vec![0.0f32; N * N];
    let mut direction = vec![0u8; N * N];

    let sample = |x: i32, y: i32| -> f32 {
        let cx = x.clamp(0, TILE_SIZE - 1);
        let cy = y.clamp(0, TILE_SIZE - 1);
        luma[(cy * TILE_SIZE + cx) as usize]
    };

    for y in 0..TILE_SIZE {
        for x in 0..TILE_SIZE {
            let gx = -sample(x - 1, y - 1) + sample(x + 1, y - 1)
                - 2.0 * sample(x - 1, y) + 2.0 * sample(x + 1, y)
                - sample(x - 1, y + 1) + sample(x + 1, y + 1);
            let gy = -sample(x - 1, y - 1) - 2.0 * sample(x, y - 1) - sample(x + 1, y - 1)
                + sample(x - 1, y + 1) + 2.0 * sample(x, y + 1) + sample(x + 1, y + 1);
            let idx = (y * TILE_SIZE + x) as usize;
            magnitude[idx] = (gx * gx + gy * gy).sqrt();
            // Quantize the gradient direction into 4 sectors: 0 = horizontal,
            // 1 = 45°, 2 = vertical, 3 = 135°.
            let angle = gy.atan2(gx).to_degrees();
            let angle = if angle < 0.0 { angle + 180.0 } else { angle };
            direction[idx] = if !(22.5..157.5).contains(&angle) {
                0
            } else if angle < 67.5 {
                1
            } else if angle < 112.5 {
                2
            } else {
                3
            };
        }
    }

    // Non-maximum suppression: keep a pixel only if it dominates both
    // neighbours along its gradient direction.
    let mut strong = vec![false; N * N];
    let mut weak = vec![false; N * N];
    let mag = |x: i32, y: i32| -> f32 {
        if x < 0 || x >= TILE_SIZE || y < 0 || y >= TILE_SIZE {
            0.0
        } else {
            magnitude[(y * TILE_SIZE + x) as usize]
        }
    };
    for y in 0..TILE_SIZE {
        for x in 0..TILE_SIZE {
            let idx = (y * TILE_SIZE + x) as usize;
            let m = magnitude[idx];
            if m < low {
                continue;
            }
            let (a, b) = match direction[idx] {
                0 => (mag(x - 1, y), mag(x + 1, y)),
                1 => (mag(x + 1, y - 1), mag(x - 1, y + 1)),
                2 => (mag(x, y - 1), mag(x, y + 1)),
                _ => (mag(x - 1, y - 1), mag(x + 1, y + 1)),
            };
            if m >= a && m >= b {
                if m >= high {
                    strong[idx] = true;
                } else {
                    weak[idx] = true;
                }
            }
        }
    }

    // Hysteresis: weak edges survive only when connected to a strong one.
    let mut edges = vec![false; N * N];
    let mut stack: Vec<usize> = strong
        .iter()
        .enumerate()
        .filter_map(|(i, &s)| if s { Some(i) } else { None })
        .collect();
    while let Some(idx) = stack.pop() {
        if edges[idx] {
            continue;
        }
        edges[idx] = true;
        let x = (idx % N) as i32;
        let y = (idx / N) as i32;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || nx >= TILE_SIZE || ny < 0 || ny >= TILE_SIZE {
                    continue;
                }
                let ni = (ny * TILE_SIZE + nx) as usize;
                if !edges[ni] && (weak[ni] || strong[ni]) {
                    stack.push(ni);
                }
            }
        }
    }
    edges
}

/// One pass of cross-shaped (4-neighbour) dilation in place.
pub(crate) fn dilate_cross(mask: &mut [bool]) {
    let source = mask.to_vec();
    for y in 0..TILE_SIZE {
        for x in 0..TILE_SIZE {
            let idx = (y * TILE_SIZE + x) as usize;
            if source[idx] {
                continue;
            }
            let hit = [(1i32, 0i32), (-1, 0), (0, 1), (0, -1)].iter().any(|&(dx, dy)| {
                let nx = x + dx;
                let ny = y + dy;
                nx >= 0
                    && nx < TILE_SIZE
                    && ny >= 0
                    && ny < TILE_SIZE
                    && source[(ny * TILE_SIZE + nx) as usize]
            });
            if hit {
                mask[idx] = true;
            }
        }
    }
}

/// Euclidean-approximating chamfer distance from each pixel to the nearest
/// edge pixel, normalized by the maximum to [0, 1]. A tile with no edges at
/// all yields 1.0 everywhere (nothing to steer away from).
pub(crate) fn distance_to_edges(edges: &[bool]) -> Vec<f32> {
    const DIAG: f32 = std::f32::consts::SQRT_2;
    const FAR: f32 = f32::MAX / 4.0;

    if !edges.iter().any(|&e| e) {
        return vec![1.0; N * N];
    }

    let mut dist: Vec<f32> = edges.iter().map(|&e| if e { 0.0 } else { FAR }).collect();
    let at = |dist: &[f32], x: i32, y: i32| -> f32 {
        if x < 0 || x >= TILE_SIZE || y < 0 || y >= TILE_SIZE {
            FAR
        } else {
            dist[(y * TILE_SIZE + x) as usize]
        }
    };

    // Forward pass: upper-left neighbourhood.
    for y in 0..TILE_SIZE {
        for x in 0..TILE_SIZE {
            let idx = (y * TILE_SIZE + x) as usize;
            let mut d = dist[idx];
            d = d.min(at(&dist, x - 1, y) + 1.0);
            d = d.min(at(&dist, x, y - 1) + 1.0);
            d = d.min(at(&dist, x - 1, y - 1) + DIAG);
            d = d.min(at(&dist, x + 1, y - 1) + DIAG);
            dist[idx] = d;
        }
    }
    // Backward pass: lower-right neighbourhood.
    for y in (0..TILE_SIZE).rev() {
        for x in (0..TILE_SIZE).rev() {
            let idx = (y * TILE_SIZE + x) as usize;
            let mut d = dist[idx];
            d = d.min(at(&dist, x + 1, y) + 1.0);
            d = d.min(at(&dist, x, y + 1) + 1.0);
            d = d.min(at(&dist, x + 1, y + 1) + DIAG);
            d = d.min(at(&dist, x - 1, y + 1) + DIAG);
            dist[idx] = d;
        }
    }

    let max = dist.iter().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        for d in &mut dist {
            *d /= max;
        }
    }
    dist
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::Pixel;

    fn half_and_half_tile() -> Tile {
        // Left half dark, right half bright: one vertical edge at x = 128.
        let mut tile = Tile::new(0, 0);
        for y in 0..TILE_SIZE {
            for x in 0..TILE_SIZE {
                let v = if x < 128 { 5000 } else { 60000 };
                *tile.pixel_mut(x, y) = Pixel::opaque(v, v, v);
            }
        }
        tile
    }

    #[test]
    fn canny_finds_a_vertical_edge() {
        let tile = half_and_half_tile();
        let edges = canny(&luma_255(&tile), 50.0, 150.0);
        // The edge column should be marked, far-away columns should not.
        let row = 100 * N;
        let edge_hits = (126..130).filter(|&x| edges[row + x]).count();
        assert!(edge_hits >= 1, "expected hits near x=128");
        assert!(!edges[row + 10]);
        assert!(!edges[row + 250]);
    }

    #[test]
    fn canny_is_quiet_on_flat_tiles() {
        let mut tile = Tile::new(0, 0);
        tile.fill(Pixel::opaque(30000, 30000, 30000));
        let edges = canny(&luma_255(&tile), 50.0, 150.0);
        assert!(edges.iter().all(|&e| !e));
    }

    #[test]
    fn dilation_grows_by_one_pixel() {
        let mut mask = vec![false; N * N];
        mask[100 * N + 100] = true;
        dilate_cross(&mut mask);
        assert!(mask[100 * N + 101]);
        assert!(mask[99 * N + 100]);
        assert!(!mask[99 * N + 101]); // diagonal untouched by the cross
    }

    #[test]
    fn distance_transform_is_zero_on_edges_and_grows_away() {
        let mut edges = vec![false; N * N];
        for y in 0..N {
            edges[y * N + 128] = true;
        }
        let dist = distance_to_edges(&edges);
        assert_eq!(dist[100 * N + 128], 0.0);
        assert!(dist[100 * N + 140] > dist[100 * N + 130]);
        // Normalized: the farthest pixel is exactly 1.
        let max = dist.iter().cloned().fold(0.0f32, f32::max);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn distance_transform_without_edges_is_all_ones() {
        let edges = vec![false; N * N];
        let dist = distance_to_edges(&edges);
        assert!(dist.iter().all(|&d| d == 1.0));
    }
}
