use crate::data::Pose;
use crate::terrain::TerrainCategory;
use glam::Vec2;

/// Decoded track mask: tightly packed RGBA rows
#[derive(Debug, Clone)]
pub struct TrackImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TrackImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self { width, height, pixels }
    }

    /// Paint every pixel from a category callback
    pub fn from_fn<F>(width: u32, height: u32, mut category_at: F) -> Self
    where
        F: FnMut(u32, u32) -> TerrainCategory,
    {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&category_at(x, y).mask_rgba());
            }
        }
        Self { width, height, pixels }
    }

    pub fn filled(width: u32, height: u32, category: TerrainCategory) -> Self {
        Self::from_fn(width, height, |_, _| category)
    }
}

/// Built-in elliptical circuit used when no mask is supplied.
///
/// Road ring between two ellipses, grass infield and verge, walls in the
/// corners. The finish line crosses the ring on the right, the checkpoint on
/// the left, so a clockwise lap touches both.
pub struct DemoOval;

impl DemoOval {
    const OUTER: (f32, f32) = (0.44, 0.40);
    const INNER: (f32, f32) = (0.26, 0.20);
    const VERGE: f32 = 1.12;
    /// Half height of the finish and checkpoint bands, as a fraction of the image height
    const LINE_HALF_HEIGHT: f32 = 0.01;

    pub fn image(width: u32, height: u32) -> TrackImage {
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
        let w = width as f32;
        let h = height as f32;
        let line_half = (h * Self::LINE_HALF_HEIGHT).max(1.0);

        TrackImage::from_fn(width, height, |x, y| {
            let px = x as f32 + 0.5 - cx;
            let py = y as f32 + 0.5 - cy;
            let outer = (px / (Self::OUTER.0 * w)).powi(2) + (py / (Self::OUTER.1 * h)).powi(2);
            let inner = (px / (Self::INNER.0 * w)).powi(2) + (py / (Self::INNER.1 * h)).powi(2);

            if outer > Self::VERGE {
                TerrainCategory::Wall
            } else if outer > 1.0 || inner < 1.0 {
                TerrainCategory::Grass
            } else if py.abs() <= line_half {
                if px > 0.0 {
                    TerrainCategory::FinishLine
                } else {
                    TerrainCategory::Checkpoint
                }
            } else {
                TerrainCategory::Road
            }
        })
    }

    /// Grid position just before the finish line, heading down the right straight
    pub fn spawn(world_size: Vec2) -> Pose {
        let mid_radius = (Self::OUTER.0 + Self::INNER.0) / 2.0 * world_size.x;
        let position = Vec2::new(
            world_size.x / 2.0 + mid_radius,
            world_size.y / 2.0 - world_size.y * 0.04,
        );
        Pose::new(position, 90.0)
    }
}
