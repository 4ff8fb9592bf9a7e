#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;

use serde::{Deserialize, Serialize};

use crate::protocol::SelectedObject;

/// Smallest zoom range the wheel can reach, in metres.
pub const MIN_ZOOM_RANGE: f64 = 0.1;
/// Projected pixels are clamped to this magnitude so the rasterizer never
/// has to walk an unbounded bounding box.
pub const PIXEL_LIMIT: f64 = 1.0e6;
/// Upper bound on the number of polar grid rings.
pub const TARGET_RINGS: f64 = 5.0;

// ============================================================================
// COORDINATES
// ============================================================================

/// A position relative to the vehicle origin, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldCoord {
    pub north: f64,
    pub east: f64,
}

impl WorldCoord {
    pub const ORIGIN: WorldCoord = WorldCoord { north: 0.0, east: 0.0 };

    #[must_use]
    pub const fn new(north: f64, east: f64) -> Self {
        Self { north, east }
    }

    /// Bearing is in degrees, clockwise from north.
    #[must_use]
    pub fn from_range_bearing(range: f64, bearing_deg: f64) -> Self {
        let bearing = bearing_deg.to_radians();
        Self {
            north: range * bearing.cos(),
            east: range * bearing.sin(),
        }
    }

    #[must_use]
    pub fn range(&self) -> f64 {
        self.north.hypot(self.east)
    }

    /// Bearing in degrees, normalised to `[0, 360)`.
    #[must_use]
    pub fn bearing(&self) -> f64 {
        normalise_degrees(self.east.atan2(self.north).to_degrees())
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.north.is_finite() && self.east.is_finite()
    }
}

/// A point on the render surface, in physical pixels from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_to(&self, other: ScreenPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

pub fn normalise_degrees(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

// ============================================================================
// VIEW STATE
// ============================================================================

/// How bearings are presented on screen.
///
/// `Relative` subtracts the vehicle heading from every bearing, so the
/// display turns with the vehicle and its nose always points up.
/// `Absolute` keeps north up and turns the vehicle marker instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationMode {
    Relative,
    Absolute,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub zoom_range: f64,
    pub zoom_increment: f64,
    pub rotation_mode: RotationMode,
    pub heading_deg: f64,
    pub grid_enabled: bool,
    pub distance_labels_enabled: bool,
    viewport: (u32, u32),
}

impl ViewState {
    pub fn new(zoom_range: f64, zoom_increment: f64) -> Self {
        let zoom_increment = if zoom_increment.is_finite() && zoom_increment > 0.0 {
            zoom_increment
        } else {
            1.0
        };
        let zoom_range = if zoom_range.is_finite() {
            zoom_range.max(MIN_ZOOM_RANGE)
        } else {
            10.0
        };
        Self {
            zoom_range,
            zoom_increment,
            rotation_mode: RotationMode::Relative,
            heading_deg: 0.0,
            grid_enabled: true,
            distance_labels_enabled: true,
            viewport: (1, 1),
        }
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
    }

    pub fn set_heading(&mut self, degrees: f64) {
        self.heading_deg = normalise_degrees(degrees);
    }

    /// Wheel turned away from the user: the view reaches further out.
    pub fn wheel_in(&mut self) {
        self.zoom_range += self.zoom_increment;
    }

    /// Wheel turned towards the user: the view tightens, never below
    /// [`MIN_ZOOM_RANGE`].
    pub fn wheel_out(&mut self) {
        self.zoom_range = (self.zoom_range - self.zoom_increment).max(MIN_ZOOM_RANGE);
    }

    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(self.viewport.0 as f64 / 2.0, self.viewport.1 as f64 / 2.0)
    }

    /// Pixels per metre.
    pub fn scale(&self) -> f64 {
        self.viewport.0.min(self.viewport.1) as f64 / (2.0 * self.zoom_range)
    }

    /// Degrees subtracted from every world bearing before projection.
    pub fn display_rotation(&self) -> f64 {
        match self.rotation_mode {
            RotationMode::Relative => self.heading_deg,
            RotationMode::Absolute => 0.0,
        }
    }

    /// Screen angle of the vehicle nose, in degrees clockwise from straight up.
    pub fn vehicle_rotation(&self) -> f64 {
        match self.rotation_mode {
            RotationMode::Relative => 0.0,
            RotationMode::Absolute => self.heading_deg,
        }
    }
}

// ============================================================================
// TRANSFORMS
// ============================================================================

/// Project a world coordinate onto the viewport.
pub fn to_pixel(world: WorldCoord, view: &ViewState) -> ScreenPoint {
    let world = if world.is_finite() { world } else { WorldCoord::ORIGIN };
    let (sin, cos) = view.display_rotation().to_radians().sin_cos();

    // rotate the world by -rotation so a bearing equal to the heading lands straight up
    let north = world.north * cos + world.east * sin;
    let east = -world.north * sin + world.east * cos;

    let center = view.center();
    let scale = view.scale();
    ScreenPoint {
        x: (center.x + east * scale).clamp(-PIXEL_LIMIT, PIXEL_LIMIT),
        y: (center.y - north * scale).clamp(-PIXEL_LIMIT, PIXEL_LIMIT),
    }
}

/// Inverse of [`to_pixel`].
pub fn to_world(screen: ScreenPoint, view: &ViewState) -> WorldCoord {
    let center = view.center();
    let screen = if screen.is_finite() { screen } else { center };
    let scale = view.scale();
    let east = (screen.x - center.x) / scale;
    let north = (center.y - screen.y) / scale;

    let (sin, cos) = view.display_rotation().to_radians().sin_cos();
    WorldCoord {
        north: north * cos - east * sin,
        east: north * sin + east * cos,
    }
}

/// Ring radii, in metres, for the polar grid.
///
/// Spacing is a whole multiple of the zoom increment, chosen so no more than
/// [`TARGET_RINGS`] rings fit inside the zoom range.
pub fn grid_rings(view: &ViewState) -> Vec<f64> {
    let step = view.zoom_increment.min(view.zoom_range);
    let spacing = step * (view.zoom_range / (step * TARGET_RINGS)).ceil().max(1.0);
    let count = (view.zoom_range / spacing + 1e-9).floor() as usize;
    (1..=count).map(|i| i as f64 * spacing).collect()
}

// ============================================================================
// HIT TESTING
// ============================================================================

/// One pickable object as seen by [`hit_test`].
#[derive(Debug, Clone, Copy)]
pub struct HitCandidate<'a> {
    pub key: &'a str,
    pub layer: &'a str,
    pub coord: WorldCoord,
    /// Monotonic update counter; larger means more recently updated.
    pub sequence: u64,
}

/// Every candidate whose projected position lies strictly within
/// `pick_radius` pixels of `click`, most recently updated first.
pub fn hit_test<'a, I>(
    click: ScreenPoint,
    candidates: I,
    view: &ViewState,
    pick_radius: f64,
) -> Vec<SelectedObject>
where
    I: IntoIterator<Item = HitCandidate<'a>>,
{
    let mut hits: Vec<(u64, SelectedObject)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let distance = to_pixel(candidate.coord, view).distance_to(click);
            (distance < pick_radius).then(|| {
                (
                    candidate.sequence,
                    SelectedObject {
                        key: candidate.key.to_string(),
                        layer: candidate.layer.to_string(),
                        pixel_distance: distance,
                    },
                )
            })
        })
        .collect();
    hits.sort_by(|a, b| b.0.cmp(&a.0));
    hits.into_iter().map(|(_, selected)| selected).collect()
}
