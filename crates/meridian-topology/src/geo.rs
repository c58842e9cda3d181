//! Planar projection of geographic locations.
//!
//! Equirectangular: `x = lon_minutes`, `y = lat_minutes`. Coordinates are
//! small integers, so they convert to `f64` exactly, and every later step
//! uses only IEEE addition, subtraction, multiplication and division.

use meridian_types::GeoLocation;

/// A point on the projection plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn squared_distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

impl From<&GeoLocation> for Point {
    fn from(location: &GeoLocation) -> Self {
        Self {
            x: f64::from(location.lon_minutes),
            y: f64::from(location.lat_minutes),
        }
    }
}

/// Arithmetic mean of `points`, summed in slice order. The origin for an
/// empty slice.
pub fn centroid<'a>(points: impl IntoIterator<Item = &'a Point>) -> Point {
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut count = 0u32;
    for p in points {
        sum_x += p.x;
        sum_y += p.y;
        count += 1;
    }
    if count == 0 {
        return Point::ORIGIN;
    }
    let n = f64::from(count);
    Point {
        x: sum_x / n,
        y: sum_y / n,
    }
}
