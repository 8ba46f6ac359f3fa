// ============================================================================
// TILED PIXEL STORAGE — 16-bit RGBA tiles, dense grid, dirty tracking
// ============================================================================

use bytemuck::{Pod, Zeroable};
use image::{ImageBuffer, Rgba};

/// Side length of a tile in pixels. Tiles are the unit of dirty-tracking and
/// of per-tile filter processing.
pub const TILE_SIZE: i32 = 256;

/// Flat `u16` RGBA image from the `image` crate, used for ecosystem interop.
pub type Rgba16Image = ImageBuffer<Rgba<u16>, Vec<u16>>;

// ============================================================================
// PIXEL
// ============================================================================

/// A single canvas pixel: four unsigned 16-bit channels, straight
/// (non-premultiplied) alpha. The default value is opaque black.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct Pixel {
    pub r: u16,
    pub g: u16,
    pub b: u16,
    pub a: u16,
}

impl Pixel {
    /// Maximum channel value.
    pub const MAX: u16 = 65535;

    pub const fn new(r: u16, g: u16, b: u16, a: u16) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u16, g: u16, b: u16) -> Self {
        Self { r, g, b, a: Self::MAX }
    }
}

impl Default for Pixel {
    fn default() -> Self {
        Self::new(0, 0, 0, Self::MAX)
    }
}

// ============================================================================
// TILE
// ============================================================================

/// A fixed 256×256 block of pixels with an origin in canvas pixel space and a
/// dirty flag.
///
/// Out-of-range local coordinates never panic: reads yield the default pixel
/// and writes land in a scratch slot that is never read back. Any write
/// through mutable access marks the tile dirty.
#[derive(Clone, Debug)]
pub struct Tile {
    pixels: Vec<Pixel>,
    x: i32,
    y: i32,
    dirty: bool,
    discard: Pixel,
}

impl Tile {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            pixels: vec![Pixel::default(); (TILE_SIZE * TILE_SIZE) as usize],
            x,
            y,
            dirty: false,
            discard: Pixel::default(),
        }
    }

    /// Tile origin (left edge) in canvas pixel space.
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Tile origin (top edge) in canvas pixel space.
    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Read the pixel at local (x, y). Out-of-range coordinates yield the
    /// default pixel.
    pub fn pixel(&self, x: i32, y: i32) -> Pixel {
        if x < 0 || x >= TILE_SIZE || y < 0 || y >= TILE_SIZE {
            return Pixel::default();
        }
        self.pixels[(y * TILE_SIZE + x) as usize]
    }

    /// Mutable access to the pixel at local (x, y). Marks the tile dirty.
    /// Out-of-range coordinates return the scratch slot, so stray writes are
    /// absorbed without growing or panicking.
    pub fn pixel_mut(&mut self, x: i32, y: i32) -> &mut Pixel {
        if x < 0 || x >= TILE_SIZE || y < 0 || y >= TILE_SIZE {
            self.discard = Pixel::default();
            return &mut self.discard;
        }
        self.dirty = true;
        &mut self.pixels[(y * TILE_SIZE + x) as usize]
    }

    /// Fill with the default pixel. Marks the tile dirty.
    pub fn clear(&mut self) {
        self.fill(Pixel::default());
    }

    pub fn fill(&mut self, color: Pixel) {
        self.pixels.fill(color);
        self.dirty = true;
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    /// Mutable view of the whole pixel buffer. Marks the tile dirty.
    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        self.dirty = true;
        &mut self.pixels
    }

    /// The pixel buffer as raw interleaved `u16` channels (r, g, b, a).
    pub fn raw_channels(&self) -> &[u16] {
        bytemuck::cast_slice(&self.pixels)
    }
}

// Equality is over pixel values only; origin and dirty flag do not
// participate (snapshot comparisons care about content, not bookkeeping).
impl PartialEq for Tile {
    fn eq(&self, other: &Self) -> bool {
        self.pixels == other.pixels
    }
}

impl std::ops::AddAssign<&Tile> for Tile {
    fn add_assign(&mut self, other: &Tile) {
        for (p, q) in self.pixels.iter_mut().zip(&other.pixels) {
            p.r = p.r.saturating_add(q.r);
            p.g = p.g.saturating_add(q.g);
            p.b = p.b.saturating_add(q.b);
            p.a = p.a.saturating_add(q.a);
        }
        self.dirty = true;
    }
}

impl std::ops::SubAssign<&Tile> for Tile {
    fn sub_assign(&mut self, other: &Tile) {
        for (p, q) in self.pixels.iter_mut().zip(&other.pixels) {
            p.r = p.r.saturating_sub(q.r);
            p.g = p.g.saturating_sub(q.g);
            p.b = p.b.saturating_sub(q.b);
            p.a = p.a.saturating_sub(q.a);
        }
        self.dirty = true;
    }
}

impl std::ops::MulAssign<f32> for Tile {
    fn mul_assign(&mut self, factor: f32) {
        for p in &mut self.pixels {
            p.r = (p.r as f32 * factor).clamp(0.0, 65535.0).round() as u16;
            p.g = (p.g as f32 * factor).clamp(0.0, 65535.0).round() as u16;
            p.b = (p.b as f32 * factor).clamp(0.0, 65535.0).round() as u16;
            p.a = (p.a as f32 * factor).clamp(0.0, 65535.0).round() as u16;
        }
        self.dirty = true;
    }
}

// ============================================================================
// TILE GRID — dense row-major grid covering one logical W×H image
// ============================================================================

/// A logical image of arbitrary width × height stored as a dense grid of
/// tiles in row-major order. Every tile exists (the grid is never sparse)
/// and each tile's origin is its column × 256, row × 256.
///
/// `clone()` is a deep copy: every tile's pixel buffer is duplicated.
#[derive(Clone, Debug)]
pub struct TileGrid {
    width: i32,
    height: i32,
    tiles_x: i32,
    tiles_y: i32,
    tiles: Vec<Tile>,
    discard: Pixel,
}

impl TileGrid {
    pub fn new(width: i32, height: i32) -> Self {
        let tiles_x = if width > 0 { (width + TILE_SIZE - 1) / TILE_SIZE } else { 0 };
        let tiles_y = if height > 0 { (height + TILE_SIZE - 1) / TILE_SIZE } else { 0 };
        let mut tiles = Vec::with_capacity((tiles_x * tiles_y) as usize);
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                tiles.push(Tile::new(tx * TILE_SIZE, ty * TILE_SIZE));
            }
        }
        Self {
            width,
            height,
            tiles_x,
            tiles_y,
            tiles,
            discard: Pixel::default(),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn tile_count_x(&self) -> i32 {
        self.tiles_x
    }

    pub fn tile_count_y(&self) -> i32 {
        self.tiles_y
    }

    // ---- tile access ---------------------------------------------------------

    pub fn tile(&self, tx: i32, ty: i32) -> Option<&Tile> {
        if tx < 0 || tx >= self.tiles_x || ty < 0 || ty >= self.tiles_y {
            return None;
        }
        Some(&self.tiles[(ty * self.tiles_x + tx) as usize])
    }

    pub fn tile_mut(&mut self, tx: i32, ty: i32) -> Option<&mut Tile> {
        if tx < 0 || tx >= self.tiles_x || ty < 0 || ty >= self.tiles_y {
            return None;
        }
        Some(&mut self.tiles[(ty * self.tiles_x + tx) as usize])
    }

    /// All tiles in row-major order. This is the buffer handed to filter
    /// plugins; they must not reorder it.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    // ---- pixel access --------------------------------------------------------

    /// Read the pixel at canvas-space (x, y), translating through the tile
    /// lookup. Coordinates outside the tile coverage yield the default pixel.
    pub fn pixel(&self, x: i32, y: i32) -> Pixel {
        if x < 0 || y < 0 {
            return Pixel::default();
        }
        match self.tile(x / TILE_SIZE, y / TILE_SIZE) {
            Some(tile) => tile.pixel(x % TILE_SIZE, y % TILE_SIZE),
            None => Pixel::default(),
        }
    }

    /// Mutable access to the pixel at canvas-space (x, y). Marks the owning
    /// tile dirty; out-of-range coordinates are absorbed by a scratch slot.
    pub fn pixel_mut(&mut self, x: i32, y: i32) -> &mut Pixel {
        if x < 0 || y < 0 || x / TILE_SIZE >= self.tiles_x || y / TILE_SIZE >= self.tiles_y {
            self.discard = Pixel::default();
            return &mut self.discard;
        }
        let index = ((y / TILE_SIZE) * self.tiles_x + x / TILE_SIZE) as usize;
        self.tiles[index].pixel_mut(x % TILE_SIZE, y % TILE_SIZE)
    }

    // ---- bulk operations -----------------------------------------------------

    pub fn clear(&mut self) {
        for tile in &mut self.tiles {
            tile.clear();
        }
    }

    pub fn fill(&mut self, color: Pixel) {
        for tile in &mut self.tiles {
            tile.fill(color);
        }
    }

    /// References to the dirty tiles, in row-major tile order.
    pub fn dirty_tiles(&self) -> Vec<&Tile> {
        self.tiles.iter().filter(|t| t.is_dirty()).collect()
    }

    pub fn clear_dirty_flags(&mut self) {
        for tile in &mut self.tiles {
            tile.set_dirty(false);
        }
    }

    /// Bytes held by the pixel buffers.
    pub fn memory_bytes(&self) -> usize {
        self.tiles.len() * (TILE_SIZE * TILE_SIZE) as usize * std::mem::size_of::<Pixel>()
    }

    // ---- external matrix conversion ------------------------------------------

    /// Export to a BGRA16 matrix. Only the logical W×H region is written;
    /// tile padding beyond the image bounds is not part of the matrix.
    pub fn to_matrix(&self) -> PixelMatrix {
        let mut matrix = PixelMatrix::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                matrix.set_pixel(x, y, self.pixel(x, y));
            }
        }
        matrix
    }

    /// Import from a BGRA16 matrix. A dimension mismatch is a silent no-op.
    /// Touched tiles are marked dirty.
    pub fn from_matrix(&mut self, matrix: &PixelMatrix) {
        if matrix.width() != self.width || matrix.height() != self.height {
            crate::log_warn!(
                "TileGrid::from_matrix: size mismatch {}x{} vs {}x{}",
                matrix.width(),
                matrix.height(),
                self.width,
                self.height
            );
            return;
        }
        for y in 0..self.height {
            for x in 0..self.width {
                *self.pixel_mut(x, y) = matrix.pixel(x, y);
            }
        }
    }

    // ---- image-crate interop -------------------------------------------------

    /// Flatten into an RGBA16 `image` buffer (for hosts that encode or
    /// further process through the image ecosystem).
    pub fn to_image(&self) -> Rgba16Image {
        ImageBuffer::from_fn(self.width.max(0) as u32, self.height.max(0) as u32, |x, y| {
            let p = self.pixel(x as i32, y as i32);
            Rgba([p.r, p.g, p.b, p.a])
        })
    }

    /// Import from an RGBA16 `image` buffer. A dimension mismatch is a
    /// silent no-op.
    pub fn from_image(&mut self, image: &Rgba16Image) {
        if image.width() != self.width.max(0) as u32 || image.height() != self.height.max(0) as u32 {
            crate::log_warn!(
                "TileGrid::from_image: size mismatch {}x{} vs {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            );
            return;
        }
        for (x, y, px) in image.enumerate_pixels() {
            *self.pixel_mut(x as i32, y as i32) = Pixel::new(px[0], px[1], px[2], px[3]);
        }
    }
}

// Value equality over pixel content only, for snapshot comparisons.
impl PartialEq for TileGrid {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.tiles == other.tiles
    }
}

// ============================================================================
// PIXEL MATRIX — external 16-bit BGRA interchange format
// ============================================================================

/// The external image matrix: 4 unsigned 16-bit channels per pixel in
/// B, G, R, A order, row-major, pitch = 8·width bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelMatrix {
    width: i32,
    height: i32,
    data: Vec<u16>,
}

impl PixelMatrix {
    pub fn new(width: i32, height: i32) -> Self {
        let len = width.max(0) as usize * height.max(0) as usize * 4;
        Self {
            width,
            height,
            data: vec![0; len],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Row pitch in bytes.
    pub fn pitch(&self) -> usize {
        self.width.max(0) as usize * 4 * std::mem::size_of::<u16>()
    }

    /// Interleaved B, G, R, A channel data.
    pub fn data(&self) -> &[u16] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u16] {
        &mut self.data
    }

    /// The matrix as raw bytes (native endianness).
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn pixel(&self, x: i32, y: i32) -> Pixel {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            return Pixel::default();
        }
        let i = (y * self.width + x) as usize * 4;
        Pixel::new(self.data[i + 2], self.data[i + 1], self.data[i], self.data[i + 3])
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, pixel: Pixel) {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            return;
        }
        let i = (y * self.width + x) as usize * 4;
        self.data[i] = pixel.b;
        self.data[i + 1] = pixel.g;
        self.data[i + 2] = pixel.r;
        self.data[i + 3] = pixel.a;
    }
}

// ============================================================================
// Tests
// ============================================================================
