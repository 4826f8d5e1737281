use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::AppError;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, ToSchema)]
pub struct Coordinates {
    #[schema(example = 23.8103)]
    pub latitude: f64,
    #[schema(example = 90.4125)]
    pub longitude: f64,
}

/// Workplace point and the radius check-ins must fall within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    pub latitude: f64,
    pub longitude: f64,
    pub allowed_radius_meters: f64,
}

impl Coordinates {
    /// WGS84 range check.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AppError::InvalidLocation(
                "Invalid latitude. Must be between -90 and 90.".into(),
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AppError::InvalidLocation(
                "Invalid longitude. Must be between -180 and 180.".into(),
            ));
        }
        Ok(())
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_meters(&self, other: &Coordinates) -> f64 {
        let (lat1, lon1) = (self.latitude.to_radians(), self.longitude.to_radians());
        let (lat2, lon2) = (other.latitude.to_radians(), other.longitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_METERS * c
    }

    pub fn label(&self) -> String {
        format!("{}, {}", self.latitude, self.longitude)
    }
}

impl Geofence {
    fn center(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn check(&self, point: &Coordinates) -> Result<(), AppError> {
        let distance = self.center().distance_meters(point);
        if distance > self.allowed_radius_meters {
            return Err(AppError::InvalidLocation(format!(
                "You are {} meters away from the workplace. You must be within {} meters to check in.",
                distance as u64, self.allowed_radius_meters
            )));
        }
        Ok(())
    }
}

/// Validates a reported position. With a geofence configured the position
/// is mandatory and must lie inside the fence.
pub fn validate_position(
    position: Option<&Coordinates>,
    geofence: Option<&Geofence>,
) -> Result<(), AppError> {
    if let Some(point) = position {
        point.validate()?;
    }
    match (geofence, position) {
        (Some(fence), Some(point)) => fence.check(point),
        (Some(_), None) => Err(AppError::InvalidLocation(
            "Location coordinates are required for check-in.".into(),
        )),
        (None, _) => Ok(()),
    }
}
