use serde::{Deserialize, Serialize};

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Corner pair `[[lat, lon], [lat, lon]]` as the feed subscription expects it.
pub type BoundingBox = [[f64; 2]; 2];

/// Rounds a value for presentation. Internal totals stay unrounded.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
