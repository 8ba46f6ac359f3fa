// ============================================================================
// FILTER PLUGINS — parameter bag, progress/cancel hooks, registry
// ============================================================================

pub mod blur;
mod edges;
pub mod inpaint;
pub mod smudge;
pub mod unsharp;

use std::collections::BTreeMap;

use crate::tiles::Tile;

pub use blur::GaussianBlur;
pub use inpaint::Inpaint;
pub use smudge::Smudge;
pub use unsharp::UnsharpMask;

// ============================================================================
// FILTER PARAMETERS
// ============================================================================

/// Heterogeneous parameter bag handed to a filter. Parameters a filter does
/// not find here take its documented defaults; every filter clamps its own
/// values to their documented ranges.
///
/// `mask_points` carries pixel-space mask geometry (the canvas fills it from
/// the current selection); filters that take a mask rasterize the points per
/// tile.
#[derive(Clone, Debug, Default)]
pub struct FilterParams {
    pub floats: BTreeMap<String, f32>,
    pub ints: BTreeMap<String, i32>,
    pub strings: BTreeMap<String, String>,
    pub mask_points: Vec<(i32, i32)>,
}

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_float(mut self, key: &str, value: f32) -> Self {
        self.floats.insert(key.to_string(), value);
        self
    }

    pub fn with_int(mut self, key: &str, value: i32) -> Self {
        self.ints.insert(key.to_string(), value);
        self
    }

    pub fn with_string(mut self, key: &str, value: &str) -> Self {
        self.strings.insert(key.to_string(), value.to_string());
        self
    }

    pub fn float_or(&self, key: &str, default: f32) -> f32 {
        self.floats.get(key).copied().unwrap_or(default)
    }

    pub fn int_or(&self, key: &str, default: i32) -> i32 {
        self.ints.get(key).copied().unwrap_or(default)
    }

    pub fn string_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.strings.get(key).map(String::as_str).unwrap_or(default)
    }
}

// ============================================================================
// PROGRESS / CANCELLATION
// ============================================================================

/// Cooperative progress pair for long-running filters. Filters report a
/// fraction in [0, 1] after each tile and poll for cancellation between
/// tiles. A default-constructed callback reports nowhere and never cancels.
#[derive(Default)]
pub struct ProgressCallback<'a> {
    progress: Option<Box<dyn Fn(f32) + 'a>>,
    cancelled: Option<Box<dyn Fn() -> bool + 'a>>,
}

impl<'a> ProgressCallback<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: impl Fn(f32) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn with_cancel(mut self, cancelled: impl Fn() -> bool + 'a) -> Self {
        self.cancelled = Some(Box::new(cancelled));
        self
    }

    pub fn report(&self, fraction: f32) {
        if let Some(progress) = &self.progress {
            progress(fraction);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.as_ref().is_some_and(|cancelled| cancelled())
    }
}

// ============================================================================
// FILTER TRAIT AND REGISTRY
// ============================================================================

/// A tile-processing plugin. `process` receives the layer's tiles as one
/// contiguous row-major slice (count = ⌈w/256⌉·⌈h/256⌉) and mutates them in
/// place; it must not reorder the slice. Implementations check the callback
/// between tiles and return early when cancelled, leaving already-processed
/// tiles modified (there is no rollback; the caller's undo snapshot covers
/// that).
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;
    fn version(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn process(
        &self,
        tiles: &mut [Tile],
        width: i32,
        height: i32,
        params: &FilterParams,
        callback: &ProgressCallback,
    );
}

/// Name-keyed registry of filters. The canvas constructs one preloaded with
/// the built-in set; hosts may register their own under new keys.
#[derive(Default)]
pub struct FilterRegistry {
    filters: BTreeMap<String, Box<dyn Filter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the reference filters registered under their stable
    /// keys: "gaussian_blur", "unsharp_mask", "inpaint", "smudge".
    pub fn with_builtin_filters() -> Self {
        let mut registry = Self::new();
        registry.register("gaussian_blur", Box::new(GaussianBlur));
        registry.register("unsharp_mask", Box::new(UnsharpMask));
        registry.register("inpaint", Box::new(Inpaint));
        registry.register("smudge", Box::new(Smudge));
        registry
    }

    /// Register `filter` under `key`, replacing any previous entry.
    pub fn register(&mut self, key: &str, filter: Box<dyn Filter>) {
        self.filters.insert(key.to_string(), filter);
    }

    pub fn has_filter(&self, key: &str) -> bool {
        self.filters.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&dyn Filter> {
        self.filters.get(key).map(|f| f.as_ref())
    }

    /// Registered keys in sorted order.
    pub fn filter_names(&self) -> Vec<String> {
        self.filters.keys().cloned().collect()
    }
}

/// Shared per-tile driver: visits every tile in row-major order, polling for
/// cancellation before each tile and reporting progress after it. The
/// pre-tile poll guarantees an already-cancelled callback leaves the buffer
/// untouched.
pub(crate) fn for_each_tile(
    tiles: &mut [Tile],
    callback: &ProgressCallback,
    mut op: impl FnMut(&mut Tile),
) {
    let total = tiles.len();
    for (index, tile) in tiles.iter_mut().enumerate() {
        if callback.is_cancelled() {
            return;
        }
        op(tile);
        callback.report((index + 1) as f32 / total as f32);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn params_fall_back_to_defaults() {
        let params = FilterParams::new()
            .with_float("sigma", 2.5)
            .with_int("radius", 4)
            .with_string("algorithm", "telea");
        assert_eq!(params.float_or("sigma", 1.0), 2.5);
        assert_eq!(params.float_or("amount", 1.0), 1.0);
        assert_eq!(params.int_or("radius", 3), 4);
        assert_eq!(params.int_or("other", 3), 3);
        assert_eq!(params.string_or("algorithm", "telea"), "telea");
        assert_eq!(params.string_or("mode", "normal"), "normal");
    }

    #[test]
    fn default_callback_never_cancels() {
        let callback = ProgressCallback::default();
        assert!(!callback.is_cancelled());
        callback.report(0.5); // must not panic
    }

    #[test]
    fn builtin_registry_contents() {
        let registry = FilterRegistry::with_builtin_filters();
        assert!(registry.has_filter("gaussian_blur"));
        assert!(registry.has_filter("unsharp_mask"));
        assert!(registry.has_filter("inpaint"));
        assert!(registry.has_filter("smudge"));
        assert!(!registry.has_filter("sharpen"));
        assert_eq!(
            registry.filter_names(),
            ["gaussian_blur", "inpaint", "smudge", "unsharp_mask"]
        );
        let blur = registry.get("gaussian_blur").unwrap();
        assert_eq!(blur.name(), "Gaussian Blur");
        assert!(!blur.version().is_empty());
        assert!(!blur.description().is_empty());
    }

    #[test]
    fn tile_driver_reports_progress_and_honors_cancel() {
        use crate::tiles::Tile;

        let mut tiles = vec![Tile::new(0, 0), Tile::new(256, 0), Tile::new(512, 0)];
        let reports: Cell<usize> = Cell::new(0);
        let callback = ProgressCallback::new().with_progress(|_| reports.set(reports.get() + 1));
        let mut visited = 0;
        for_each_tile(&mut tiles, &callback, |_| visited += 1);
        assert_eq!(visited, 3);
        assert_eq!(reports.get(), 3);

        // Cancelled before the first tile: nothing runs.
        let callback = ProgressCallback::new().with_cancel(|| true);
        let mut visited = 0;
        for_each_tile(&mut tiles, &callback, |_| visited += 1);
        assert_eq!(visited, 0);

        // Cancelled after the first report: exactly one tile runs.
        let seen: Cell<bool> = Cell::new(false);
        let callback = ProgressCallback::new()
            .with_progress(|_| seen.set(true))
            .with_cancel(|| seen.get());
        let mut visited = 0;
        for_each_tile(&mut tiles, &callback, |_| visited += 1);
        assert_eq!(visited, 1);
    }
}
