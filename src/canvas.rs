// ============================================================================
// CANVAS — layer stack, blend math, stroke kernels, undo coordination
// ============================================================================

use std::collections::BTreeMap;

use crate::history::UndoStack;
use crate::ops::{FilterParams, FilterRegistry, ProgressCallback};
use crate::tiles::{Pixel, PixelMatrix, TILE_SIZE, TileGrid};

// ============================================================================
// BLEND MODES
// ============================================================================

/// Per-layer compositing mode. The discriminant order is stable and part of
/// the embedding contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    SoftLight,
    HardLight,
    ColorDodge,
    ColorBurn,
    Darken,
    Lighten,
    Difference,
    Exclusion,
}

impl BlendMode {
    /// All blend modes, in their stable order.
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::SoftLight,
            BlendMode::HardLight,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::Difference,
            BlendMode::Exclusion,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::HardLight => "Hard Light",
            BlendMode::ColorDodge => "Color Dodge",
            BlendMode::ColorBurn => "Color Burn",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
        }
    }
}

/// Composite `src` over `dest` in place using straight-alpha Porter-Duff
/// "over" with the mode's per-channel color function. `opacity` further
/// scales the source alpha.
///
/// All math runs in normalized f32 and is requantized with rounding and
/// saturation, so blended channels always stay inside [0, 65535].
pub fn blend_pixel(dest: &mut Pixel, src: Pixel, mode: BlendMode, opacity: f32) {
    let src_a = src.a as f32 / 65535.0 * opacity;
    if src_a <= 0.0 {
        return;
    }
    let dst_a = dest.a as f32 / 65535.0;

    let sr = src.r as f32 / 65535.0;
    let sg = src.g as f32 / 65535.0;
    let sb = src.b as f32 / 65535.0;
    let dr = dest.r as f32 / 65535.0;
    let dg = dest.g as f32 / 65535.0;
    let db = dest.b as f32 / 65535.0;

    let (r, g, b) = match mode {
        BlendMode::Normal => (sr, sg, sb),
        BlendMode::Multiply => (dr * sr, dg * sg, db * sb),
        BlendMode::Screen => (
            1.0 - (1.0 - dr) * (1.0 - sr),
            1.0 - (1.0 - dg) * (1.0 - sg),
            1.0 - (1.0 - db) * (1.0 - sb),
        ),
        BlendMode::Overlay => (
            overlay_channel(dr, sr),
            overlay_channel(dg, sg),
            overlay_channel(db, sb),
        ),
        BlendMode::SoftLight => (
            soft_light_channel(dr, sr),
            soft_light_channel(dg, sg),
            soft_light_channel(db, sb),
        ),
        BlendMode::HardLight => (
            overlay_channel(sr, dr),
            overlay_channel(sg, dg),
            overlay_channel(sb, db),
        ),
        BlendMode::ColorDodge => (
            color_dodge_channel(dr, sr),
            color_dodge_channel(dg, sg),
            color_dodge_channel(db, sb),
        ),
        BlendMode::ColorBurn => (
            color_burn_channel(dr, sr),
            color_burn_channel(dg, sg),
            color_burn_channel(db, sb),
        ),
        BlendMode::Darken => (dr.min(sr), dg.min(sg), db.min(sb)),
        BlendMode::Lighten => (dr.max(sr), dg.max(sg), db.max(sb)),
        BlendMode::Difference => ((dr - sr).abs(), (dg - sg).abs(), (db - sb).abs()),
        BlendMode::Exclusion => (
            dr + sr - 2.0 * dr * sr,
            dg + sg - 2.0 * dg * sg,
            db + sb - 2.0 * db * sb,
        ),
    };

    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a > 0.0 {
        let inv = dst_a * (1.0 - src_a);
        dest.r = quantize((r * src_a + dr * inv) / out_a);
        dest.g = quantize((g * src_a + dg * inv) / out_a);
        dest.b = quantize((b * src_a + db * inv) / out_a);
        dest.a = quantize(out_a);
    }
}

#[inline]
fn quantize(v: f32) -> u16 {
    (v * 65535.0).round().clamp(0.0, 65535.0) as u16
}

fn overlay_channel(d: f32, s: f32) -> f32 {
    if d < 0.5 {
        2.0 * d * s
    } else {
        1.0 - 2.0 * (1.0 - d) * (1.0 - s)
    }
}

// Pegtop soft light: smooth everywhere, no discontinuity at d = 0.5.
fn soft_light_channel(d: f32, s: f32) -> f32 {
    (1.0 - 2.0 * s) * d * d + 2.0 * s * d
}

fn color_dodge_channel(d: f32, s: f32) -> f32 {
    if s >= 1.0 { 1.0 } else { (d / (1.0 - s)).min(1.0) }
}

fn color_burn_channel(d: f32, s: f32) -> f32 {
    if s <= 0.0 { 0.0 } else { 1.0 - ((1.0 - d) / s).min(1.0) }
}

// ============================================================================
// LAYER
// ============================================================================

/// One entry of a layer's adjustment stack: a kind tag plus named float
/// parameters. Adjustment semantics are defined by the product; the engine
/// stores them as data and applies none on its own.
#[derive(Clone, Debug, PartialEq)]
pub struct Adjustment {
    pub kind: String,
    pub params: BTreeMap<String, f32>,
}

/// A named pixel grid plus compositing metadata. Layers are owned by a
/// [`Canvas`] and always share its dimensions.
#[derive(Clone, Debug)]
pub struct Layer {
    name: String,
    pixels: TileGrid,
    opacity: f32,
    blend_mode: BlendMode,
    visible: bool,
    clip_mask: Option<usize>,
    adjustments: Vec<Adjustment>,
}

impl Layer {
    pub fn new(name: &str, width: i32, height: i32) -> Self {
        Self {
            name: name.to_string(),
            pixels: TileGrid::new(width, height),
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            visible: true,
            clip_mask: None,
            adjustments: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Clamped to [0, 1].
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn pixels(&self) -> &TileGrid {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut TileGrid {
        &mut self.pixels
    }

    /// Index of the clip-mask layer in the owning canvas's layer list, if
    /// any. The canvas keeps these indices valid across removal and reorder.
    pub fn clip_mask(&self) -> Option<usize> {
        self.clip_mask
    }

    pub fn set_clip_mask(&mut self, mask: Option<usize>) {
        self.clip_mask = mask;
    }

    // ---- adjustment stack ----------------------------------------------------

    pub fn add_adjustment(&mut self, kind: &str, params: BTreeMap<String, f32>) {
        self.adjustments.push(Adjustment {
            kind: kind.to_string(),
            params,
        });
    }

    /// Remove the adjustment at `index`. Out-of-range indices are ignored.
    pub fn remove_adjustment(&mut self, index: usize) {
        if index < self.adjustments.len() {
            self.adjustments.remove(index);
        } else {
            crate::log_warn!("Layer::remove_adjustment: index {} out of bounds", index);
        }
    }

    pub fn clear_adjustments(&mut self) {
        self.adjustments.clear();
    }

    pub fn adjustments(&self) -> &[Adjustment] {
        &self.adjustments
    }

    /// Apply this layer's adjustment stack to `grid`. No adjustment kind has
    /// engine-defined pixel semantics yet, so every entry passes the grid
    /// through unchanged; the hook exists so products can hang real
    /// adjustments here without touching the render path.
    pub fn apply_adjustments(&self, _grid: &mut TileGrid) {}

    // ---- rendering -----------------------------------------------------------

    /// Composite this layer onto `target` at pixel offset (dx, dy) using the
    /// layer's blend mode and opacity. Invisible or fully transparent layers
    /// are a no-op. The adjustment pass runs first, on a scratch copy.
    pub fn render_to(&self, target: &mut TileGrid, dx: i32, dy: i32) {
        if !self.visible || self.opacity <= 0.0 {
            return;
        }
        if self.adjustments.is_empty() {
            blend_grid(&self.pixels, target, dx, dy, self.blend_mode, self.opacity);
        } else {
            let mut adjusted = self.pixels.clone();
            self.apply_adjustments(&mut adjusted);
            blend_grid(&adjusted, target, dx, dy, self.blend_mode, self.opacity);
        }
    }
}

fn blend_grid(
    source: &TileGrid,
    target: &mut TileGrid,
    dx: i32,
    dy: i32,
    mode: BlendMode,
    opacity: f32,
) {
    for tile in source.tiles() {
        for ly in 0..TILE_SIZE {
            let sy = tile.y() + ly;
            if sy >= source.height() {
                break;
            }
            for lx in 0..TILE_SIZE {
                let sx = tile.x() + lx;
                if sx >= source.width() {
                    break;
                }
                let src = tile.pixel(lx, ly);
                let dest = target.pixel_mut(sx + dx, sy + dy);
                blend_pixel(dest, src, mode, opacity);
            }
        }
    }
}

// ============================================================================
// CANVAS
// ============================================================================

/// The document root: an ordered stack of layers (index 0 is the bottom),
/// a selection, the undo history, and the filter registry. All mutations are
/// expected from a single driver thread.
pub struct Canvas {
    width: i32,
    height: i32,
    layers: Vec<Layer>,
    selection: Vec<(i32, i32)>,
    undo: UndoStack,
    filters: FilterRegistry,
}

impl Canvas {
    /// Create a canvas with one layer named "Background". Degenerate
    /// dimensions are clamped to 1×1.
    pub fn new(width: i32, height: i32) -> Self {
        let (width, height) = if width < 1 || height < 1 {
            crate::log_warn!("Canvas::new: invalid dimensions {}x{}, clamped", width, height);
            (width.max(1), height.max(1))
        } else {
            (width, height)
        };
        let mut canvas = Self {
            width,
            height,
            layers: Vec::new(),
            selection: Vec::new(),
            undo: UndoStack::new(),
            filters: FilterRegistry::with_builtin_filters(),
        };
        canvas.add_layer("Background");
        canvas
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Reallocate every layer as a blank grid of the new size. Pixel
    /// contents are discarded; layer metadata (name, opacity, blend mode,
    /// visibility) survives. Non-positive dimensions are rejected.
    pub fn resize(&mut self, width: i32, height: i32) {
        if width < 1 || height < 1 {
            crate::log_warn!("Canvas::resize: rejected invalid dimensions {}x{}", width, height);
            return;
        }
        self.width = width;
        self.height = height;
        for layer in &mut self.layers {
            layer.pixels = TileGrid::new(width, height);
        }
    }

    // ---- layer management ----------------------------------------------------

    /// Append a new layer at the top of the stack and return it.
    pub fn add_layer(&mut self, name: &str) -> &mut Layer {
        self.layers.push(Layer::new(name, self.width, self.height));
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    /// Remove the layer at `index`. Out-of-range indices are ignored.
    /// Clip-mask references to the removed layer are cleared and references
    /// to higher layers are shifted down.
    pub fn remove_layer(&mut self, index: usize) {
        if index >= self.layers.len() {
            crate::log_warn!("Canvas::remove_layer: index {} out of bounds", index);
            return;
        }
        self.layers.remove(index);
        for layer in &mut self.layers {
            layer.clip_mask = match layer.clip_mask {
                Some(m) if m == index => None,
                Some(m) if m > index => Some(m - 1),
                other => other,
            };
        }
    }

    /// Move the layer at `from` so it ends up at `to` (an ordered move, not a
    /// swap). Out-of-range indices are ignored. Clip-mask references are
    /// remapped to keep pointing at the same layers.
    pub fn move_layer(&mut self, from: usize, to: usize) {
        let len = self.layers.len();
        if from >= len || to >= len {
            crate::log_warn!("Canvas::move_layer: {} -> {} out of bounds", from, to);
            return;
        }
        if from == to {
            return;
        }
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        for layer in &mut self.layers {
            layer.clip_mask = layer.clip_mask.map(|idx| {
                if idx == from {
                    to
                } else if from < to && idx > from && idx <= to {
                    idx - 1
                } else if to < from && idx >= to && idx < from {
                    idx + 1
                } else {
                    idx
                }
            });
        }
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// The layer stack, bottom to top.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    // ---- rendering -----------------------------------------------------------

    /// Clear `target`, then composite every layer bottom-to-top into it.
    pub fn render_to(&self, target: &mut TileGrid) {
        target.clear();
        for layer in &self.layers {
            layer.render_to(target, 0, 0);
        }
    }

    /// Composite the whole canvas and export it as a BGRA16 matrix.
    pub fn composited_image(&self) -> PixelMatrix {
        let mut composite = TileGrid::new(self.width, self.height);
        self.render_to(&mut composite);
        composite.to_matrix()
    }

    // ---- undo coordination ---------------------------------------------------

    /// Record the pre-stroke state of every layer. The snapshot happens here,
    /// at stroke begin: the pre-stroke pixels are what an undo must restore.
    pub fn begin_stroke(&mut self) {
        let snapshots: Vec<TileGrid> = self.layers.iter().map(|l| l.pixels.clone()).collect();
        self.undo.push_state(snapshots, "Brush Stroke");
    }

    /// Seal the current stroke. The state was already recorded by
    /// [`Canvas::begin_stroke`], so this is deliberately a no-op.
    pub fn end_stroke(&mut self) {}

    /// Restore the previously recorded state. The state being left is
    /// swapped into the vacated history slot, so a following redo returns to
    /// it exactly. A no-op when there is nothing to undo.
    pub fn undo(&mut self) {
        if !self.undo.can_undo() {
            crate::log_info!("Canvas::undo: nothing to undo");
            return;
        }
        let live: Vec<TileGrid> = self.layers.iter().map(|l| l.pixels.clone()).collect();
        let snapshots = self.undo.undo_swap(live);
        self.restore_snapshots(snapshots);
    }

    /// Step forward to a state previously left by [`Canvas::undo`]. A no-op
    /// when there is nothing to redo.
    pub fn redo(&mut self) {
        if !self.undo.can_redo() {
            crate::log_info!("Canvas::redo: nothing to redo");
            return;
        }
        let live: Vec<TileGrid> = self.layers.iter().map(|l| l.pixels.clone()).collect();
        let snapshots = self.undo.redo_swap(live);
        self.restore_snapshots(snapshots);
    }

    fn restore_snapshots(&mut self, snapshots: Vec<TileGrid>) {
        for (layer, snapshot) in self.layers.iter_mut().zip(snapshots) {
            layer.pixels = snapshot;
        }
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    pub fn undo_stack_mut(&mut self) -> &mut UndoStack {
        &mut self.undo
    }

    // ---- stroke kernels ------------------------------------------------------

    /// Stamp a soft circular brush at every point of the polyline. Each stamp
    /// covers the disk of radius floor(size/2); the per-pixel weight falls
    /// off linearly from the center and scales by `opacity`. All four
    /// channels are lerped toward `color`. Points paint independently; tools
    /// densify the polyline before calling. An invalid layer index is a
    /// silent no-op.
    pub fn draw_brush_stroke(
        &mut self,
        layer_index: usize,
        points: &[(i32, i32)],
        size: f32,
        opacity: f32,
        color: Pixel,
    ) {
        if layer_index >= self.layers.len() {
            crate::log_warn!("Canvas::draw_brush_stroke: layer index {} out of bounds", layer_index);
            return;
        }
        let opacity = opacity.clamp(0.0, 1.0);
        let radius = (size / 2.0).floor() as i32;
        let (width, height) = (self.width, self.height);
        let grid = self.layers[layer_index].pixels_mut();
        for &(px, py) in points {
            stamp_disk(grid, px, py, radius, width, height, |dest, falloff| {
                let w = falloff * opacity;
                dest.r = lerp_channel(dest.r, color.r, w);
                dest.g = lerp_channel(dest.g, color.g, w);
                dest.b = lerp_channel(dest.b, color.b, w);
                dest.a = lerp_channel(dest.a, color.a, w);
            });
        }
    }

    /// Eraser counterpart of [`Canvas::draw_brush_stroke`]: scales alpha down
    /// by the per-pixel weight and leaves RGB untouched.
    pub fn erase_brush_stroke(
        &mut self,
        layer_index: usize,
        points: &[(i32, i32)],
        size: f32,
        opacity: f32,
    ) {
        if layer_index >= self.layers.len() {
            crate::log_warn!("Canvas::erase_brush_stroke: layer index {} out of bounds", layer_index);
            return;
        }
        let opacity = opacity.clamp(0.0, 1.0);
        let radius = (size / 2.0).floor() as i32;
        let (width, height) = (self.width, self.height);
        let grid = self.layers[layer_index].pixels_mut();
        for &(px, py) in points {
            stamp_disk(grid, px, py, radius, width, height, |dest, falloff| {
                let w = falloff * opacity;
                dest.a = (dest.a as f32 * (1.0 - w)).round().clamp(0.0, 65535.0) as u16;
            });
        }
    }

    // ---- selection -----------------------------------------------------------

    /// Replace the selection. The selection is advisory metadata for
    /// higher-layer tools and the mask source for inpainting; it never gates
    /// brush or eraser writes.
    pub fn set_selection(&mut self, points: &[(i32, i32)]) {
        self.selection = points.to_vec();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn has_selection(&self) -> bool {
        !self.selection.is_empty()
    }

    pub fn selection(&self) -> &[(i32, i32)] {
        &self.selection
    }

    // ---- adjustments and filters ---------------------------------------------

    /// Append an adjustment to a layer's stack. Out-of-range indices are
    /// ignored.
    pub fn add_adjustment(&mut self, layer_index: usize, kind: &str, params: BTreeMap<String, f32>) {
        match self.layers.get_mut(layer_index) {
            Some(layer) => layer.add_adjustment(kind, params),
            None => crate::log_warn!("Canvas::add_adjustment: layer index {} out of bounds", layer_index),
        }
    }

    /// Run a registered filter over every tile of a layer's grid, with no
    /// progress reporting.
    pub fn apply_filter(&mut self, layer_index: usize, filter_type: &str, params: &FilterParams) {
        self.apply_filter_with(layer_index, filter_type, params, &ProgressCallback::default());
    }

    /// Run a registered filter over every tile of a layer's grid. The filter
    /// reports progress and honors cancellation through `callback` at
    /// per-tile granularity. Unknown filter names and invalid layer indices
    /// are silent no-ops. When the caller supplied no mask points, the
    /// current selection is handed to the filter as its mask.
    pub fn apply_filter_with(
        &mut self,
        layer_index: usize,
        filter_type: &str,
        params: &FilterParams,
        callback: &ProgressCallback,
    ) {
        if layer_index >= self.layers.len() {
            crate::log_warn!("Canvas::apply_filter: layer index {} out of bounds", layer_index);
            return;
        }
        let Some(filter) = self.filters.get(filter_type) else {
            crate::log_warn!("Canvas::apply_filter: unknown filter {:?}", filter_type);
            return;
        };
        let mut params = params.clone();
        if params.mask_points.is_empty() && !self.selection.is_empty() {
            params.mask_points = self.selection.clone();
        }
        let (width, height) = (self.width, self.height);
        let grid = self.layers[layer_index].pixels_mut();
        filter.process(grid.tiles_mut(), width, height, &params, callback);
        crate::log_info!("Canvas::apply_filter: {:?} on layer {}", filter_type, layer_index);
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterRegistry {
        &mut self.filters
    }
}

/// Visit every canvas-bounds pixel of the disk of `radius` around (cx, cy)
/// with its linear falloff weight 1 − d/r. A zero radius stamps only the
/// center pixel at full weight.
fn stamp_disk(
    grid: &mut TileGrid,
    cx: i32,
    cy: i32,
    radius: i32,
    width: i32,
    height: i32,
    mut apply: impl FnMut(&mut Pixel, f32),
) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let x = cx + dx;
            let y = cy + dy;
            if x < 0 || x >= width || y < 0 || y >= height {
                continue;
            }
            let dist = ((dx * dx + dy * dy) as f32).sqrt();
            if dist > radius as f32 {
                continue;
            }
            let falloff = if radius == 0 { 1.0 } else { 1.0 - dist / radius as f32 };
            apply(grid.pixel_mut(x, y), falloff);
        }
    }
}

#[inline]
fn lerp_channel(from: u16, to: u16, t: f32) -> u16 {
    (from as f32 * (1.0 - t) + to as f32 * t).round().clamp(0.0, 65535.0) as u16
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_canvas_has_a_background_layer() {
        let canvas = Canvas::new(512, 512);
        assert_eq!(canvas.layers().len(), 1);
        assert_eq!(canvas.layers()[0].name(), "Background");
        assert_eq!(canvas.layers()[0].pixels().width(), 512);
    }

    #[test]
    fn blend_modes_enumerate_in_stable_order() {
        let all = BlendMode::all();
        assert_eq!(all.len(), 12);
        assert_eq!(all[0], BlendMode::Normal);
        assert_eq!(all[3], BlendMode::Overlay);
        assert_eq!(all[11], BlendMode::Exclusion);
    }

    #[test]
    fn normal_blend_with_opaque_source_replaces_dest() {
        for value in [0u16, 1, 255, 32768, 65534, 65535] {
            let mut dest = Pixel::opaque(12345, 23456, 34567);
            let src = Pixel::new(value, value / 2, value / 3, 65535);
            blend_pixel(&mut dest, src, BlendMode::Normal, 1.0);
            assert_eq!(dest, src);
        }
    }

    #[test]
    fn fully_transparent_source_leaves_dest_untouched() {
        let mut dest = Pixel::opaque(100, 200, 300);
        blend_pixel(&mut dest, Pixel::new(65535, 0, 0, 0), BlendMode::Normal, 1.0);
        assert_eq!(dest, Pixel::opaque(100, 200, 300));
        blend_pixel(&mut dest, Pixel::opaque(65535, 0, 0), BlendMode::Normal, 0.0);
        assert_eq!(dest, Pixel::opaque(100, 200, 300));
    }

    #[test]
    fn multiply_quarters_mid_gray() {
        let gray = Pixel::opaque(32768, 32768, 32768);
        let mut dest = gray;
        blend_pixel(&mut dest, gray, BlendMode::Multiply, 1.0);
        // 0.5 * 0.5 = 0.25 of full scale, within quantization.
        assert!((dest.r as i32 - 16384).abs() <= 1);
        assert_eq!(dest.a, 65535);
    }

    #[test]
    fn every_mode_is_total_and_deterministic_on_extremes() {
        // Channel range is structural (u16); what can go wrong is a panic or
        // NaN-dependent output on extreme inputs. Blend twice and compare.
        let samples = [
            Pixel::new(0, 0, 0, 0),
            Pixel::new(65535, 65535, 65535, 65535),
            Pixel::new(1, 65535, 32768, 40000),
            Pixel::new(65535, 0, 12000, 30000),
        ];
        for &mode in BlendMode::all() {
            for &d in &samples {
                for &s in &samples {
                    for opacity in [0.0, 0.3, 1.0] {
                        let mut first = d;
                        blend_pixel(&mut first, s, mode, opacity);
                        let mut second = d;
                        blend_pixel(&mut second, s, mode, opacity);
                        assert_eq!(first, second, "{} d={d:?} s={s:?}", mode.name());
                    }
                }
            }
        }
    }

    #[test]
    fn pinned_blend_formulas() {
        // d = 0.25, s = 0.5 on every channel, both fully opaque.
        let d = Pixel::opaque(16384, 16384, 16384);
        let s = Pixel::opaque(32768, 32768, 32768);
        let expect = |mode: BlendMode, value: f32| {
            let mut dest = d;
            blend_pixel(&mut dest, s, mode, 1.0);
            let got = dest.r as f32 / 65535.0;
            assert!(
                (got - value).abs() < 0.001,
                "{}: got {got}, expected {value}",
                mode.name()
            );
        };
        let (dv, sv) = (0.25f32, 0.5f32);
        expect(BlendMode::Multiply, dv * sv);
        expect(BlendMode::Screen, 1.0 - (1.0 - dv) * (1.0 - sv));
        expect(BlendMode::Overlay, 2.0 * dv * sv);
        expect(BlendMode::SoftLight, (1.0 - 2.0 * sv) * dv * dv + 2.0 * sv * dv);
        expect(BlendMode::HardLight, 2.0 * dv * sv);
        expect(BlendMode::ColorDodge, (dv / (1.0 - sv)).min(1.0));
        expect(BlendMode::ColorBurn, 1.0 - ((1.0 - dv) / sv).min(1.0));
        expect(BlendMode::Darken, dv.min(sv));
        expect(BlendMode::Lighten, dv.max(sv));
        expect(BlendMode::Difference, (dv - sv).abs());
        expect(BlendMode::Exclusion, dv + sv - 2.0 * dv * sv);
    }

    #[test]
    fn layer_opacity_is_clamped() {
        let mut layer = Layer::new("l", 16, 16);
        layer.set_opacity(1.7);
        assert_eq!(layer.opacity(), 1.0);
        layer.set_opacity(-0.2);
        assert_eq!(layer.opacity(), 0.0);
    }

    #[test]
    fn invisible_layer_does_not_render() {
        let mut layer = Layer::new("l", 64, 64);
        layer.pixels_mut().fill(Pixel::opaque(65535, 0, 0));
        layer.set_visible(false);
        let mut target = TileGrid::new(64, 64);
        layer.render_to(&mut target, 0, 0);
        assert_eq!(target.pixel(10, 10), Pixel::default());
    }

    #[test]
    fn render_offset_shifts_pixels() {
        let mut layer = Layer::new("l", 64, 64);
        *layer.pixels_mut().pixel_mut(0, 0) = Pixel::opaque(65535, 0, 0);
        let mut target = TileGrid::new(128, 128);
        layer.render_to(&mut target, 30, 40);
        assert_eq!(target.pixel(30, 40), Pixel::opaque(65535, 0, 0));
    }

    #[test]
    fn adjustment_stack_edits_are_bounds_checked() {
        let mut layer = Layer::new("l", 8, 8);
        layer.add_adjustment("brightness", BTreeMap::from([(String::from("amount"), 0.1)]));
        layer.remove_adjustment(5); // ignored
        assert_eq!(layer.adjustments().len(), 1);
        assert_eq!(layer.adjustments()[0].kind, "brightness");
        layer.remove_adjustment(0);
        assert!(layer.adjustments().is_empty());
        layer.add_adjustment("contrast", BTreeMap::new());
        layer.clear_adjustments();
        assert!(layer.adjustments().is_empty());
    }

    #[test]
    fn adjustment_pass_is_currently_identity() {
        let mut canvas = Canvas::new(32, 32);
        canvas.layer_mut(0).unwrap().pixels_mut().fill(Pixel::opaque(7, 8, 9));
        canvas.add_adjustment(0, "brightness", BTreeMap::new());
        let mut target = TileGrid::new(32, 32);
        canvas.render_to(&mut target);
        assert_eq!(target.pixel(5, 5), Pixel::opaque(7, 8, 9));
    }

    #[test]
    fn add_remove_move_layers() {
        let mut canvas = Canvas::new(64, 64);
        canvas.add_layer("a");
        canvas.add_layer("b");
        assert_eq!(canvas.layers().len(), 3);

        canvas.move_layer(2, 0);
        let names: Vec<&str> = canvas.layers().iter().map(|l| l.name()).collect();
        assert_eq!(names, ["b", "Background", "a"]);

        canvas.remove_layer(1);
        let names: Vec<&str> = canvas.layers().iter().map(|l| l.name()).collect();
        assert_eq!(names, ["b", "a"]);

        // Out-of-range operations are silent no-ops.
        canvas.remove_layer(10);
        canvas.move_layer(0, 10);
        assert_eq!(canvas.layers().len(), 2);
        assert!(canvas.layer(10).is_none());
    }

    #[test]
    fn move_layer_is_an_ordered_move_not_a_swap() {
        let mut canvas = Canvas::new(16, 16);
        canvas.add_layer("a");
        canvas.add_layer("b");
        canvas.add_layer("c");
        canvas.move_layer(0, 3);
        let names: Vec<&str> = canvas.layers().iter().map(|l| l.name()).collect();
        assert_eq!(names, ["a", "b", "c", "Background"]);
    }

    #[test]
    fn clip_mask_indices_follow_removal_and_reorder() {
        let mut canvas = Canvas::new(64, 64);
        canvas.add_layer("a"); // 1
        canvas.add_layer("b"); // 2
        canvas.layer_mut(2).unwrap().set_clip_mask(Some(1));
        canvas.layer_mut(1).unwrap().set_clip_mask(Some(0));

        // Removing the background clears references to it and shifts the rest.
        canvas.remove_layer(0);
        assert_eq!(canvas.layer(0).unwrap().clip_mask(), None);
        assert_eq!(canvas.layer(1).unwrap().clip_mask(), Some(0));

        // Moving the mask layer keeps the reference following it.
        canvas.add_layer("c"); // index 2
        canvas.layer_mut(2).unwrap().set_clip_mask(Some(0));
        canvas.move_layer(0, 2);
        let c_index = canvas.layers().iter().position(|l| l.name() == "c").unwrap();
        assert_eq!(canvas.layer(c_index).unwrap().clip_mask(), Some(2));
    }

    #[test]
    fn resize_discards_pixels_and_rejects_invalid() {
        let mut canvas = Canvas::new(64, 64);
        canvas.layer_mut(0).unwrap().pixels_mut().fill(Pixel::opaque(1, 2, 3));
        canvas.resize(0, 32);
        assert_eq!(canvas.width(), 64); // rejected
        assert_eq!(canvas.layer(0).unwrap().pixels().pixel(5, 5), Pixel::opaque(1, 2, 3));

        canvas.resize(128, 32);
        assert_eq!((canvas.width(), canvas.height()), (128, 32));
        let layer = canvas.layer(0).unwrap();
        assert_eq!(layer.pixels().width(), 128);
        assert_eq!(layer.pixels().pixel(5, 5), Pixel::default());
        // Metadata survives the reallocation.
        assert_eq!(layer.name(), "Background");
    }

    #[test]
    fn render_is_deterministic() {
        let mut canvas = Canvas::new(96, 96);
        canvas.layer_mut(0).unwrap().pixels_mut().fill(Pixel::opaque(30000, 20000, 10000));
        let layer = canvas.add_layer("top");
        layer.set_blend_mode(BlendMode::Screen);
        layer.set_opacity(0.6);
        layer.pixels_mut().fill(Pixel::new(5000, 6000, 7000, 50000));

        let mut first = TileGrid::new(96, 96);
        canvas.render_to(&mut first);
        let mut second = TileGrid::new(96, 96);
        canvas.render_to(&mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn selection_is_advisory_only() {
        let mut canvas = Canvas::new(64, 64);
        canvas.set_selection(&[(1, 1), (2, 2)]);
        assert!(canvas.has_selection());
        // A stroke outside the selection still paints.
        canvas.draw_brush_stroke(0, &[(40, 40)], 2.0, 1.0, Pixel::opaque(65535, 0, 0));
        assert_eq!(
            canvas.layer(0).unwrap().pixels().pixel(40, 40),
            Pixel::opaque(65535, 0, 0)
        );
        canvas.clear_selection();
        assert!(!canvas.has_selection());
    }

    #[test]
    fn stroke_on_invalid_layer_is_ignored() {
        let mut canvas = Canvas::new(64, 64);
        canvas.draw_brush_stroke(5, &[(10, 10)], 4.0, 1.0, Pixel::opaque(65535, 0, 0));
        canvas.erase_brush_stroke(5, &[(10, 10)], 4.0, 1.0);
        assert_eq!(canvas.layer(0).unwrap().pixels().pixel(10, 10), Pixel::default());
    }

    #[test]
    fn brush_stamps_mark_tiles_dirty() {
        let mut canvas = Canvas::new(512, 512);
        canvas.layer_mut(0).unwrap().pixels_mut().clear_dirty_flags();
        canvas.draw_brush_stroke(0, &[(300, 300)], 8.0, 1.0, Pixel::opaque(0, 65535, 0));
        let dirty = canvas.layer(0).unwrap().pixels().dirty_tiles();
        assert_eq!(dirty.len(), 1);
        assert_eq!((dirty[0].x(), dirty[0].y()), (256, 256));
    }
}
