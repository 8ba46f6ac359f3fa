// ============================================================================
// SMUDGE — pickup-buffer stamping with optional edge awareness
// ============================================================================

use crate::ops::edges::{canny, distance_to_edges, luma_255};
use crate::ops::{Filter, FilterParams, ProgressCallback, for_each_tile};
use crate::tiles::{Pixel, TILE_SIZE, Tile};

/// Finger-painting smudge. A pickup buffer holds the colors under the brush;
/// each stamp blends that buffer into the current disk with weight
/// strength · (1 − d/r), then resamples the buffer from the stamped
/// position so color drags along the stroke.
///
/// The buffer is per-invocation state; a smudge pass holds nothing
/// process-wide.
///
/// Parameters: float `strength` in [0.0, 1.0] (default 0.5), int `radius`
/// in [1, 50] (default 5), string `mode` in {"normal", "smart"} (default
/// "normal"). Smart mode scales the stamp strength by the normalized
/// distance to the nearest Canny edge, so stamping weakens near edges and
/// detail survives the smear.
pub struct Smudge;

impl Filter for Smudge {
    fn name(&self) -> &'static str {
        "Smudge"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn description(&self) -> &'static str {
        "Smudge brush for color blending and pulling"
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
        let strength = params.float_or("strength", 0.5).clamp(0.0, 1.0);
        let radius = params.int_or("radius", 5).clamp(1, 50);
        let smart = params.string_or("mode", "normal") == "smart";

        let mut buffer = PickupBuffer::new(radius);
        for_each_tile(tiles, callback, |tile| {
            let center = TILE_SIZE / 2;
            buffer.pick_up(tile, center, center);
            if smart {
                let edges = canny(&luma_255(tile), 50.0, 150.0);
                let edge_distance = distance_to_edges(&edges);
                buffer.stamp(tile, center, center, strength, Some(&edge_distance));
            } else {
                buffer.stamp(tile, center, center, strength, None);
            }
        });
    }
}

/// Colors most recently picked up from under the brush, in a
/// (2·radius + 1)² window.
struct PickupBuffer {
    radius: i32,
    pixels: Vec<Pixel>,
}

impl PickupBuffer {
    fn new(radius: i32) -> Self {
        let side = (2 * radius + 1) as usize;
        Self {
            radius,
            pixels: vec![Pixel::default(); side * side],
        }
    }

    /// Refill the buffer from the tile around (cx, cy). Positions outside
    /// the tile pick up the default pixel.
    fn pick_up(&mut self, tile: &Tile, cx: i32, cy: i32) {
        let mut index = 0;
        for dy in -self.radius..=self.radius {
            for dx in -self.radius..=self.radius {
                self.pixels[index] = tile.pixel(cx + dx, cy + dy);
                index += 1;
            }
        }
    }

    /// Blend the buffer into the disk around (cx, cy), then resample the
    /// buffer from the stamped position. `edge_distance`, when present,
    /// scales the per-pixel strength (0 on an edge, 1 far away).
    fn stamp(
        &mut self,
        tile: &mut Tile,
        cx: i32,
        cy: i32,
        strength: f32,
        edge_distance: Option<&[f32]>,
    ) {
        let radius = self.radius;
        let mut index = 0;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let x = cx + dx;
                let y = cy + dy;
                if x >= 0 && x < TILE_SIZE && y >= 0 && y < TILE_SIZE {
                    let dist = ((dx * dx + dy * dy) as f32).sqrt();
                    let falloff = (1.0 - dist / radius as f32).max(0.0);
                    let mut alpha = strength * falloff;
                    if let Some(distance) = edge_distance {
                        alpha *= distance[(y * TILE_SIZE + x) as usize];
                    }
                    let src = self.pixels[index];
                    let dest = tile.pixel_mut(x, y);
                    dest.r = mix(dest.r, src.r, alpha);
                    dest.g = mix(dest.g, src.g, alpha);
                    dest.b = mix(dest.b, src.b, alpha);
                    dest.a = mix(dest.a, src.a, alpha);
                }
                index += 1;
            }
        }
        self.pick_up(tile, cx, cy);
    }
}

#[inline]
fn mix(from: u16, to: u16, t: f32) -> u16 {
    (from as f32 * (1.0 - t) + to as f32 * t).round().clamp(0.0, 65535.0) as u16
}

// ============================================================================
// Tests
// ============================================================================
