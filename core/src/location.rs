//! One-shot position acquisition and its pending/inside/outside surface.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::geo::{AuthorizedZone, LocationFix, ZoneCheck, classify};

/// Error acquiring a position fix.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocationError {
    /// The platform denied the read or lacks positioning capability.
    #[error("positioning unavailable: {0}")]
    Unavailable(String),

    /// No fix arrived before the device-level timeout.
    #[error("timed out waiting for a position fix")]
    Timeout,
}

/// One-shot high-accuracy position read.
///
/// Implementations wrap the platform positioning capability. No retries
/// happen here; callers re-invoke [`LocationGate::acquire`].
#[async_trait]
pub trait PositionProvider: Send + Sync {
    async fn current_position(&self) -> Result<LocationFix, LocationError>;
}

/// Location state shown to the user. Submission stays unavailable while
/// `Pending`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationStatus {
    Pending,
    Inside { fix: LocationFix },
    Outside { fix: LocationFix, distance_m: f64 },
}

/// Resolves the device position once per form session and classifies it
/// against the authorized zone.
pub struct LocationGate {
    provider: Arc<dyn PositionProvider>,
    zone: AuthorizedZone,
    fix: Option<LocationFix>,
}

impl LocationGate {
    pub fn new(provider: Arc<dyn PositionProvider>, zone: AuthorizedZone) -> Self {
        Self {
            provider,
            zone,
            fix: None,
        }
    }

    pub fn zone(&self) -> &AuthorizedZone {
        &self.zone
    }

    /// The most recent successful read, if any.
    pub fn fix(&self) -> Option<&LocationFix> {
        self.fix.as_ref()
    }

    /// Request a single position read and remember it as the session fix.
    ///
    /// A failed read leaves any previous fix in place.
    pub async fn acquire(&mut self) -> Result<LocationFix, LocationError> {
        let fix = self.provider.current_position().await?;
        tracing::debug!(
            latitude = fix.latitude,
            longitude = fix.longitude,
            "acquired position fix"
        );
        self.fix = Some(fix);
        Ok(fix)
    }

    pub fn status(&self) -> LocationStatus {
        match self.fix {
            None => LocationStatus::Pending,
            Some(fix) => match classify(&fix, &self.zone) {
                ZoneCheck::Inside => LocationStatus::Inside { fix },
                ZoneCheck::Outside { distance_m } => LocationStatus::Outside { fix, distance_m },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider {
        result: Result<LocationFix, LocationError>,
    }

    #[async_trait]
    impl PositionProvider for FakeProvider {
        async fn current_position(&self) -> Result<LocationFix, LocationError> {
            self.result.clone()
        }
    }

    fn gate_with(result: Result<LocationFix, LocationError>) -> LocationGate {
        LocationGate::new(Arc::new(FakeProvider { result }), AuthorizedZone::default())
    }

    #[tokio::test]
    async fn status_is_pending_before_any_fix() {
        let gate = gate_with(Err(LocationError::Timeout));
        assert_eq!(gate.status(), LocationStatus::Pending);
        assert!(gate.fix().is_none());
    }

    #[tokio::test]
    async fn acquire_stores_the_fix_and_classifies_inside() {
        let zone = AuthorizedZone::default();
        let fix = LocationFix::new(zone.center_latitude, zone.center_longitude);
        let mut gate = gate_with(Ok(fix));

        let got = gate.acquire().await.unwrap();
        assert_eq!(got, fix);
        assert!(matches!(gate.status(), LocationStatus::Inside { .. }));
    }

    #[tokio::test]
    async fn acquire_error_passes_through_and_stays_pending() {
        let mut gate = gate_with(Err(LocationError::Unavailable("denied".to_string())));
        let err = gate.acquire().await.unwrap_err();
        assert_eq!(err, LocationError::Unavailable("denied".to_string()));
        assert_eq!(gate.status(), LocationStatus::Pending);
    }

    #[tokio::test]
    async fn far_fix_classifies_outside_with_distance() {
        let zone = AuthorizedZone::default();
        // Roughly 900 km north of the default zone center.
        let fix = LocationFix::new(zone.center_latitude + 8.0, zone.center_longitude);
        let mut gate = gate_with(Ok(fix));
        gate.acquire().await.unwrap();

        match gate.status() {
            LocationStatus::Outside { distance_m, .. } => assert!(distance_m > zone.radius_m),
            other => panic!("expected Outside, got {other:?}"),
        }
    }
}
