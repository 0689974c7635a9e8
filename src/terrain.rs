//! Rasterized terrain classification.
//!
//! The track mask image is scanned once at load time and every pixel is
//! reduced to a [`TerrainCategory`]. Queries after that are a single indexed
//! read, so per-step collision probes never touch raw pixel data.

use glam::Vec2;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("Terrain image has zero area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("Pixel buffer holds {actual} bytes, expected a multiple of {pixels} pixels")]
    BufferLength { pixels: usize, actual: usize },
    #[error("Unsupported channel count {0} (expected 3 or 4)")]
    UnsupportedChannels(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TerrainCategory {
    Road,
    Wall,
    Grass,
    Checkpoint,
    FinishLine,
}

impl TerrainCategory {
    pub const ALL: [TerrainCategory; 5] = [
        TerrainCategory::Road,
        TerrainCategory::Wall,
        TerrainCategory::Grass,
        TerrainCategory::Checkpoint,
        TerrainCategory::FinishLine,
    ];

    /// Mask colour rule, exact channel match: black wall, yellow grass, green
    /// checkpoint, blue finish line, everything else road.
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        match (r, g, b) {
            (0, 0, 0) => TerrainCategory::Wall,
            (255, 255, 0) => TerrainCategory::Grass,
            (0, 255, 0) => TerrainCategory::Checkpoint,
            (0, 0, 255) => TerrainCategory::FinishLine,
            _ => TerrainCategory::Road,
        }
    }

    /// Canonical mask colour, used when painting synthetic tracks
    pub fn mask_rgba(self) -> [u8; 4] {
        match self {
            TerrainCategory::Road => [128, 128, 128, 255],
            TerrainCategory::Wall => [0, 0, 0, 255],
            TerrainCategory::Grass => [255, 255, 0, 255],
            TerrainCategory::Checkpoint => [0, 255, 0, 255],
            TerrainCategory::FinishLine => [0, 0, 255, 255],
        }
    }

    pub fn is_traversable(self) -> bool {
        self != TerrainCategory::Wall
    }
}

/// Cell counts per category, in [`TerrainCategory::ALL`] order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerrainHistogram {
    pub counts: [usize; 5],
}

impl TerrainHistogram {
    pub fn count(&self, category: TerrainCategory) -> usize {
        self.counts[category as usize]
    }
}

/// Immutable grid of terrain categories, one cell per source pixel
#[derive(Debug, Clone)]
pub struct TerrainGrid {
    width: u32,
    height: u32,
    cells: Vec<TerrainCategory>,
    scale: f32,
    inv_scale: f32,
}

impl TerrainGrid {
    /// Classify a raw RGB or RGBA buffer (row-major, tightly packed)
    pub fn build(pixels: &[u8], width: u32, height: u32) -> Result<Self, TerrainError> {
        let pixel_count = width as usize * height as usize;
        if pixel_count == 0 {
            return Err(TerrainError::EmptyImage { width, height });
        }
        if pixels.len() % pixel_count != 0 {
            return Err(TerrainError::BufferLength {
                pixels: pixel_count,
                actual: pixels.len(),
            });
        }

        let channels = pixels.len() / pixel_count;
        if channels != 3 && channels != 4 {
            return Err(TerrainError::UnsupportedChannels(channels));
        }

        let cells: Vec<TerrainCategory> = pixels
            .chunks_exact(channels)
            .map(|px| TerrainCategory::from_rgb(px[0], px[1], px[2]))
            .collect();

        let grid = Self {
            width,
            height,
            cells,
            scale: 1.0,
            inv_scale: 1.0,
        };

        let histogram = grid.histogram();
        info!(
            "Terrain grid built: {}x{} (road={}, wall={}, grass={}, checkpoint={}, finish={})",
            width,
            height,
            histogram.count(TerrainCategory::Road),
            histogram.count(TerrainCategory::Wall),
            histogram.count(TerrainCategory::Grass),
            histogram.count(TerrainCategory::Checkpoint),
            histogram.count(TerrainCategory::FinishLine),
        );

        Ok(grid)
    }

    /// Set the render scale between image pixels and world units. Non-positive
    /// or non-finite scales fall back to 1.
    pub fn set_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.scale = scale;
            self.inv_scale = 1.0 / scale;
        } else {
            self.scale = 1.0;
            self.inv_scale = 1.0;
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.set_scale(scale);
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Extent of the rendered track in world units
    pub fn world_size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32) * self.scale
    }

    /// Grid cell for a world position, `None` outside the image
    pub fn grid_coords(&self, world: Vec2) -> Option<(u32, u32)> {
        let gx = (world.x * self.inv_scale).floor();
        let gy = (world.y * self.inv_scale).floor();
        // NaN fails both comparisons and lands out of bounds
        if gx >= 0.0 && gy >= 0.0 && gx < self.width as f32 && gy < self.height as f32 {
            Some((gx as u32, gy as u32))
        } else {
            None
        }
    }

    pub fn cell(&self, x: u32, y: u32) -> Option<TerrainCategory> {
        if x < self.width && y < self.height {
            Some(self.cells[y as usize * self.width as usize + x as usize])
        } else {
            None
        }
    }

    pub fn lookup(&self, world: Vec2) -> Option<TerrainCategory> {
        self.grid_coords(world)
            .map(|(x, y)| self.cells[y as usize * self.width as usize + x as usize])
    }

    /// Category at a world position. Off-grid positions report `Wall`, the
    /// most restrictive category.
    pub fn classify(&self, world: Vec2) -> TerrainCategory {
        self.lookup(world).unwrap_or(TerrainCategory::Wall)
    }

    /// Off-grid counts as grass so leaving the track is penalized
    pub fn is_on_grass(&self, world: Vec2) -> bool {
        self.lookup(world)
            .map_or(true, |c| c == TerrainCategory::Grass)
    }

    /// Off-grid is never traversable
    pub fn is_traversable(&self, world: Vec2) -> bool {
        self.lookup(world).is_some_and(TerrainCategory::is_traversable)
    }

    pub fn is_checkpoint(&self, world: Vec2) -> bool {
        self.lookup(world) == Some(TerrainCategory::Checkpoint)
    }

    pub fn is_finish_line(&self, world: Vec2) -> bool {
        self.lookup(world) == Some(TerrainCategory::FinishLine)
    }

    pub fn histogram(&self) -> TerrainHistogram {
        let mut histogram = TerrainHistogram::default();
        for cell in &self.cells {
            histogram.counts[*cell as usize] += 1;
        }
        histogram
    }
}
