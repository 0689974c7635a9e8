use glam::Vec2;
use serde::{Deserialize, Serialize};

// --- Input ---

/// Raw control intents for one fixed step, already mapped from whatever device
/// produced them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlIntents {
    pub accelerate: bool,
    pub brake: bool,
    pub turn_left: bool,
    pub turn_right: bool,
}

impl ControlIntents {
    pub const NONE: Self = Self {
        accelerate: false,
        brake: false,
        turn_left: false,
        turn_right: false,
    };

    pub const THROTTLE: Self = Self {
        accelerate: true,
        brake: false,
        turn_left: false,
        turn_right: false,
    };

    /// Steering target in [-1, 1]; opposing turn intents cancel out
    pub fn steer_target(&self) -> f32 {
        match (self.turn_left, self.turn_right) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }

    /// Neither throttle nor brake held
    pub fn is_coasting(&self) -> bool {
        !self.accelerate && !self.brake
    }
}

// --- Pose ---

/// Position plus heading in degrees, normalized to [0, 360)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub rotation_deg: f32,
}

impl Pose {
    pub fn new(position: Vec2, rotation_deg: f32) -> Self {
        Self {
            position,
            rotation_deg: normalize_degrees(rotation_deg),
        }
    }

    /// Blend towards `other`; rotation follows the shorter arc
    pub fn lerp(&self, other: &Pose, t: f32) -> Pose {
        Pose {
            position: self.position * (1.0 - t) + other.position * t,
            rotation_deg: lerp_angle_degrees(self.rotation_deg, other.rotation_deg, t),
        }
    }

    /// Unit heading vector (0 degrees points along +x)
    pub fn forward(&self) -> Vec2 {
        Vec2::from_angle(self.rotation_deg.to_radians())
    }
}

/// Wrap an angle into [0, 360)
pub fn normalize_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed difference `to - from` along the shorter arc, in [-180, 180)
pub fn shortest_arc_degrees(from: f32, to: f32) -> f32 {
    (to - from + 180.0).rem_euclid(360.0) - 180.0
}

pub fn lerp_angle_degrees(from: f32, to: f32, t: f32) -> f32 {
    normalize_degrees(from + shortest_arc_degrees(from, to) * t)
}

// --- Track geometry ---

/// Axis-aligned rectangle in world units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl TrackBounds {
    pub fn from_size(size: Vec2) -> Self {
        Self {
            min: Vec2::ZERO,
            max: size,
        }
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Clamp `point` so a body with the given half extents stays inside.
    /// A body wider than the bounds is pinned to the minimum edge.
    pub fn clamp_with_margin(&self, point: Vec2, half_extents: Vec2) -> Vec2 {
        let lo = self.min + half_extents;
        let hi = self.max - half_extents;
        Vec2::new(
            lo.x.max(point.x.min(hi.x)),
            lo.y.max(point.y.min(hi.y)),
        )
    }
}
