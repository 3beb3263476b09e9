use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AttendanceError;

/// Mean earth radius in meters (IUGG).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    #[schema(example = 14.5995)]
    pub lat: f64,
    #[schema(example = 120.9842)]
    pub lng: f64,
}

/// Circular allowed area around an agency's location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Geofence {
    pub center: GeoPoint,
    #[schema(example = 150.0)]
    pub radius_m: f64,
}

impl GeoPoint {
    /// Latitude within ±90 and longitude within ±180 degrees.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }
}

impl Geofence {
    /// Accepts a location inside (or on the edge of) the fence and returns its
    /// distance from the center. A missing location is a violation.
    pub fn check(&self, location: Option<&GeoPoint>) -> Result<f64, AttendanceError> {
        let Some(location) = location else {
            return Err(AttendanceError::GeofenceViolation {
                distance_m: None,
                radius_m: self.radius_m,
            });
        };

        let distance = self.center.distance_m(location);
        if distance > self.radius_m {
            return Err(AttendanceError::GeofenceViolation {
                distance_m: Some(distance),
                radius_m: self.radius_m,
            });
        }

        Ok(distance)
    }
}
