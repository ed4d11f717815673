//! Geographic types shared by the decoder and the store.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{MAX_LATITUDE, MAX_LONGITUDE};

/// A location in decimal degrees.
///
/// `x` is longitude and `y` is latitude, matching the `(x, y)` order of
/// bounding-box queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Longitude in degrees.
    pub x: f64,
    /// Latitude in degrees.
    pub y: f64,
}

impl GeoPoint {
    /// Create a point from longitude and latitude.
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            x: longitude,
            y: latitude,
        }
    }

    /// Longitude in degrees.
    pub const fn longitude(&self) -> f64 {
        self.x
    }

    /// Latitude in degrees.
    pub const fn latitude(&self) -> f64 {
        self.y
    }

    /// Whether both coordinates are within the valid geographic range.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.x.abs() <= MAX_LONGITUDE
            && self.y.abs() <= MAX_LATITUDE
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.x, self.y)
    }
}

/// Invalid bounding box.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoundingBoxError {
    /// A corner is NaN or infinite.
    #[error("Bounding box coordinates must be finite numbers")]
    NonFinite,

    /// Corners are not ordered.
    #[error("Bounding box requires x1 <= x2 and y1 <= y2 (got x1={x1}, y1={y1}, x2={x2}, y2={y2})")]
    Inverted {
        /// Minimum x.
        x1: f64,
        /// Minimum y.
        y1: f64,
        /// Maximum x.
        x2: f64,
        /// Maximum y.
        y2: f64,
    },
}

/// A closed rectangle `[x1, x2] x [y1, y2]`.
///
/// Deserialization goes through [`BoundingBox::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Corners")]
pub struct BoundingBox {
    /// Minimum longitude.
    pub x1: f64,
    /// Minimum latitude.
    pub y1: f64,
    /// Maximum longitude.
    pub x2: f64,
    /// Maximum latitude.
    pub y2: f64,
}

#[derive(Deserialize)]
struct Corners {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl TryFrom<Corners> for BoundingBox {
    type Error = BoundingBoxError;

    fn try_from(c: Corners) -> Result<Self, Self::Error> {
        BoundingBox::new(c.x1, c.y1, c.x2, c.y2)
    }
}

impl BoundingBox {
    /// Create a validated bounding box.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, BoundingBoxError> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(BoundingBoxError::NonFinite);
        }
        if x1 > x2 || y1 > y2 {
            return Err(BoundingBoxError::Inverted { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Whether the point lies inside the closed rectangle.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.x >= self.x1 && point.x <= self.x2 && point.y >= self.y1 && point.y <= self.y2
    }
}
