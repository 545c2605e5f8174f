//! Zone math for the geofenced submission area.
//!
//! `classify` is a pure function so the inside/outside decision can be
//! exercised in tests without a position provider.

use chrono::DateTime;
use chrono::Utc;

/// Mean Earth radius in meters, used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Center of the default authorized zone (deployment constant).
const DEFAULT_CENTER_LATITUDE: f64 = -6.911303;
const DEFAULT_CENTER_LONGITUDE: f64 = 107.610311;

/// Radius of the default authorized zone in meters.
const DEFAULT_RADIUS_M: f64 = 50_000.0;

/// Best-effort snapshot of the device position.
///
/// Never persisted; re-acquired each session and consumed once at
/// submission time. Staleness is not bounded beyond "most recent
/// successful read".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub acquired_at: DateTime<Utc>,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            acquired_at: Utc::now(),
        }
    }
}

/// The geographic circle in which report creation is permitted.
///
/// Process-wide constant, immutable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthorizedZone {
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub radius_m: f64,
}

impl AuthorizedZone {
    pub fn new(center_latitude: f64, center_longitude: f64, radius_m: f64) -> Self {
        Self {
            center_latitude,
            center_longitude,
            radius_m,
        }
    }
}

impl Default for AuthorizedZone {
    fn default() -> Self {
        Self::new(DEFAULT_CENTER_LATITUDE, DEFAULT_CENTER_LONGITUDE, DEFAULT_RADIUS_M)
    }
}

/// Result of classifying a fix against a zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneCheck {
    Inside,
    Outside { distance_m: f64 },
}

/// Great-circle distance in meters between two coordinates, haversine
/// formula.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Classify `fix` against `zone`.
///
/// A distance exactly equal to the radius counts as inside.
pub fn classify(fix: &LocationFix, zone: &AuthorizedZone) -> ZoneCheck {
    let distance_m = haversine_m(
        fix.latitude,
        fix.longitude,
        zone.center_latitude,
        zone.center_longitude,
    );
    if distance_m <= zone.radius_m {
        ZoneCheck::Inside
    } else {
        ZoneCheck::Outside { distance_m }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A coordinate `meters` due north of the given point.
    fn north_of(lat: f64, lon: f64, meters: f64) -> (f64, f64) {
        (lat + (meters / EARTH_RADIUS_M).to_degrees(), lon)
    }

    #[test]
    fn zero_distance_at_same_point() {
        let d = haversine_m(-6.911303, 107.610311, -6.911303, 107.610311);
        assert!(d.abs() < 1e-6, "expected ~0, got {d}");
    }

    #[test]
    fn known_city_pair_distance_is_plausible() {
        // Bandung to Jakarta is roughly 120 km as the crow flies.
        let d = haversine_m(-6.911303, 107.610311, -6.2088, 106.8456);
        assert!((100_000.0..140_000.0).contains(&d), "got {d}");
    }

    #[test]
    fn fix_at_zone_center_is_inside() {
        let zone = AuthorizedZone::default();
        let fix = LocationFix::new(zone.center_latitude, zone.center_longitude);
        assert_eq!(classify(&fix, &zone), ZoneCheck::Inside);
    }

    #[test]
    fn boundary_distance_classifies_as_inside() {
        let zone = AuthorizedZone::new(-6.911303, 107.610311, 0.0);
        let (lat, lon) = north_of(zone.center_latitude, zone.center_longitude, 1_000.0);
        let fix = LocationFix::new(lat, lon);
        let distance = haversine_m(lat, lon, zone.center_latitude, zone.center_longitude);

        // Radius set to the exact computed distance: still inside.
        let exact = AuthorizedZone::new(zone.center_latitude, zone.center_longitude, distance);
        assert_eq!(classify(&fix, &exact), ZoneCheck::Inside);
    }

    #[test]
    fn beyond_radius_classifies_as_outside_with_distance() {
        let zone = AuthorizedZone::new(-6.911303, 107.610311, 5_000.0);
        let (lat, lon) = north_of(zone.center_latitude, zone.center_longitude, 15_000.0);
        let fix = LocationFix::new(lat, lon);
        match classify(&fix, &zone) {
            ZoneCheck::Outside { distance_m } => {
                assert!((14_000.0..16_000.0).contains(&distance_m), "got {distance_m}");
            }
            ZoneCheck::Inside => panic!("15 km fix inside a 5 km zone"),
        }
    }
}
