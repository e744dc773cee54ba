//! Submission - 位置情報 1 件の送信単位
//!
//! Coordinates are validated once, at construction; a `Submission` that exists
//! always carries finite, in-range degrees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::errors::{CoordinateField, ValidationError};
use super::ids::QueuePayload;

pub const LAT_RANGE: (f64, f64) = (-90.0, 90.0);
pub const LNG_RANGE: (f64, f64) = (-180.0, 180.0);

/// Latitude / longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinates")]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Unchecked wire shape; stored rows are validated again on read.
#[derive(Deserialize)]
struct RawCoordinates {
    lat: f64,
    lng: f64,
}

impl TryFrom<RawCoordinates> for Coordinates {
    type Error = ValidationError;

    fn try_from(raw: RawCoordinates) -> Result<Self, Self::Error> {
        Coordinates::new(raw.lat, raw.lng)
    }
}

impl Coordinates {
    /// Validate and build. Latitude is checked first, so a pair where both
    /// values are bad reports `lat`.
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        check(CoordinateField::Latitude, lat, LAT_RANGE)?;
        check(CoordinateField::Longitude, lng, LNG_RANGE)?;
        Ok(Self { lat, lng })
    }
}

fn check(field: CoordinateField, value: f64, (min, max): (f64, f64)) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite { field });
    }
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Who produced the submission, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Client-side id, stable across replays of the same submission.
    pub submission_id: Ulid,
    pub timestamp: DateTime<Utc>,
    /// Originating platform (opaque).
    pub device: String,
    /// Originating agent / OS string (opaque).
    pub os: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub location: Coordinates,
    pub metadata: Metadata,
}

impl QueuePayload for Submission {
    const KEY_PREFIX: &'static str = "sub-";
}

/// Body shape expected by the acceptance endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// `{ "location": { "lat", "lng" }, "metadata": { ... } }`
    #[default]
    Standard,
    /// Flat `{ "lat", "lng" }` accepted by the older save endpoint.
    Legacy,
}

impl Submission {
    pub fn to_wire(&self, format: WireFormat) -> serde_json::Value {
        match format {
            WireFormat::Standard => serde_json::json!({
                "location": self.location,
                "metadata": self.metadata,
            }),
            WireFormat::Legacy => serde_json::json!({
                "lat": self.location.lat,
                "lng": self.location.lng,
            }),
        }
    }
}
