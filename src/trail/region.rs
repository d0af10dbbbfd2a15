// Map region framing a trail's attractions

use serde::Serialize;

use super::models::Project;

const REGION_PADDING: f64 = 0.1;
const MIN_DELTA: f64 = 0.01;
const ZOOM_DELTA_STEP: f64 = 0.02;

/// Center point plus visible span, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapRegion {
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl MapRegion {
    /// Bounding box of the given pins, padded. Out-of-range coordinates are ignored.
    pub fn around<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut lat = (f64::INFINITY, f64::NEG_INFINITY);
        let mut lon = (f64::INFINITY, f64::NEG_INFINITY);

        for (latitude, longitude) in points {
            if (-90.0..=90.0).contains(&latitude) {
                lat = (lat.0.min(latitude), lat.1.max(latitude));
            }
            if (-180.0..=180.0).contains(&longitude) {
                lon = (lon.0.min(longitude), lon.1.max(longitude));
            }
        }

        if lat.0 > lat.1 || lon.0 > lon.1 {
            return None;
        }

        Some(Self {
            latitude: (lat.0 + lat.1) / 2.0,
            longitude: (lon.0 + lon.1) / 2.0,
            latitude_delta: (lat.1 - lat.0 + REGION_PADDING).max(REGION_PADDING),
            longitude_delta: (lon.1 - lon.0 + REGION_PADDING).max(REGION_PADDING),
        })
    }

    pub fn zoom_in(&self) -> Self {
        Self {
            latitude_delta: (self.latitude_delta - ZOOM_DELTA_STEP).max(MIN_DELTA),
            longitude_delta: (self.longitude_delta - ZOOM_DELTA_STEP).max(MIN_DELTA),
            ..*self
        }
    }

    pub fn zoom_out(&self) -> Self {
        Self {
            latitude_delta: self.latitude_delta + ZOOM_DELTA_STEP,
            longitude_delta: self.longitude_delta + ZOOM_DELTA_STEP,
            ..*self
        }
    }
}

impl Project {
    /// Region framing the first trail, `None` if it has no usable pins
    pub fn region(&self) -> Option<MapRegion> {
        let trail = self.first_trail()?;
        MapRegion::around(trail.attractions.values().map(|a| (a.latitude, a.longitude)))
    }
}
