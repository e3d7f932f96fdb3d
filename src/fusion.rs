// fusion.rs: latest-value fusion of the geolocation and heading streams
//
// Independent of tokio and of any concrete sensor: events go in, events and
// snapshots come out. The two caches and the reference frame are written only
// from the sensor feeds; the frame step reads them through `snapshot()`.

use serde::{Deserialize, Serialize};

use crate::geodetic::{haversine_distance, normalize_heading};
use crate::reference_frame::ReferenceFrame;
use crate::types::{GeodeticFix, HeadingSample, SensorFault};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Distance from the origin beyond which the planar approximation is
    /// flagged as unreliable (meters)
    pub valid_range_m: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            valid_range_m: 2_000.0,
        }
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum FusionEvent {
    ReferenceLocked { lat: f64, lon: f64 },
    ReferenceReset,
    FixRejected { lat: f64, lon: f64 },
    HeadingDiscarded { is_absolute: bool },
    GeolocationFault(SensorFault),
    GeolocationRecovered,
    BeyondValidRange { distance_m: f64 },
    BackInValidRange { distance_m: f64 },
}

// ─── Fusion output snapshot ──────────────────────────────────────────────────

/// Everything the frame step reads, captured at one instant
#[derive(Clone, Debug, PartialEq)]
pub struct FusionSnapshot {
    pub fix: Option<GeodeticFix>,
    pub heading_deg: f64,
    pub heading_received: bool,
    pub reference: ReferenceFrame,
    pub fault: Option<SensorFault>,
    pub beyond_valid_range: bool,
}

// ─── The controller ──────────────────────────────────────────────────────────

pub struct SensorFusionController {
    config: FusionConfig,

    latest_fix: Option<GeodeticFix>,
    latest_heading: Option<HeadingSample>,
    reference: ReferenceFrame,

    fault: Option<SensorFault>,
    beyond_valid_range: bool,

    fixes_received: u64,
    fixes_rejected: u64,
    headings_accepted: u64,
    headings_discarded: u64,
}

impl SensorFusionController {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            latest_fix: None,
            latest_heading: None,
            reference: ReferenceFrame::new(),
            fault: None,
            beyond_valid_range: false,
            fixes_received: 0,
            fixes_rejected: 0,
            headings_accepted: 0,
            headings_discarded: 0,
        }
    }

    // ── Sensor feeds ─────────────────────────────────────────────────────

    /// Store `fix` as the latest and lock the reference frame if it is not
    /// locked yet. Near-duplicate fixes are accepted as-is.
    pub fn on_geodetic_fix(&mut self, fix: &GeodeticFix) -> Vec<FusionEvent> {
        let mut events = Vec::new();

        if !fix.is_valid() {
            self.fixes_rejected += 1;
            log::warn!(
                "Ignoring invalid fix ({}, {})",
                fix.latitude,
                fix.longitude
            );
            events.push(FusionEvent::FixRejected {
                lat: fix.latitude,
                lon: fix.longitude,
            });
            return events;
        }

        self.fixes_received += 1;
        self.latest_fix = Some(fix.clone());

        if self.fault.take().is_some() {
            log::info!("Geolocation recovered");
            events.push(FusionEvent::GeolocationRecovered);
        }

        if self.reference.lock(fix) {
            log::info!(
                "Reference locked at ({:.6}, {:.6}), accuracy {:.1} m",
                fix.latitude,
                fix.longitude,
                fix.accuracy
            );
            events.push(FusionEvent::ReferenceLocked {
                lat: fix.latitude,
                lon: fix.longitude,
            });
        }

        if let Some(distance_m) = self.distance_from_reference() {
            let beyond = distance_m > self.config.valid_range_m;
            if beyond && !self.beyond_valid_range {
                log::warn!(
                    "{:.0} m from reference, local positions lose accuracy beyond {:.0} m",
                    distance_m,
                    self.config.valid_range_m
                );
                events.push(FusionEvent::BeyondValidRange { distance_m });
            } else if !beyond && self.beyond_valid_range {
                events.push(FusionEvent::BackInValidRange { distance_m });
            }
            self.beyond_valid_range = beyond;
        }

        events
    }

    /// Accept absolute samples with a usable angle; everything else leaves
    /// the heading unchanged.
    pub fn on_heading_sample(&mut self, sample: &HeadingSample) -> Vec<FusionEvent> {
        let Some(degrees) = sample.usable_degrees() else {
            self.headings_discarded += 1;
            log::debug!(
                "Discarding heading sample (absolute: {}, angle: {:?})",
                sample.is_absolute,
                sample.degrees
            );
            return vec![FusionEvent::HeadingDiscarded {
                is_absolute: sample.is_absolute,
            }];
        };

        self.headings_accepted += 1;
        self.latest_heading = Some(HeadingSample {
            timestamp: sample.timestamp,
            degrees: Some(normalize_heading(degrees)),
            is_absolute: true,
        });
        Vec::new()
    }

    /// Record a geolocation failure. The last good fix stays available.
    pub fn on_geolocation_fault(&mut self, fault: SensorFault) -> Vec<FusionEvent> {
        if self.fault == Some(fault) {
            return Vec::new();
        }
        log::warn!("Geolocation fault: {}", fault);
        self.fault = Some(fault);
        vec![FusionEvent::GeolocationFault(fault)]
    }

    /// External reset: the next fix becomes the new origin
    pub fn reset_reference(&mut self) -> Vec<FusionEvent> {
        if !self.reference.is_locked() {
            return Vec::new();
        }
        log::info!("Reference frame reset");
        self.reference.reset();
        self.beyond_valid_range = false;
        vec![FusionEvent::ReferenceReset]
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Normalized heading in degrees, 0 until the first accepted sample
    pub fn current_heading(&self) -> f64 {
        self.latest_heading
            .as_ref()
            .and_then(|h| h.degrees)
            .unwrap_or(0.0)
    }

    pub fn current_fix(&self) -> Option<&GeodeticFix> {
        self.latest_fix.as_ref()
    }

    pub fn reference(&self) -> &ReferenceFrame {
        &self.reference
    }

    pub fn fault(&self) -> Option<SensorFault> {
        self.fault
    }

    /// Great-circle distance from the locked origin to the latest fix
    pub fn distance_from_reference(&self) -> Option<f64> {
        let (ref_lat, ref_lon) = self.reference.coordinates().ok()?;
        let fix = self.latest_fix.as_ref()?;
        Some(haversine_distance(ref_lat, ref_lon, fix.latitude, fix.longitude))
    }

    pub fn snapshot(&self) -> FusionSnapshot {
        FusionSnapshot {
            fix: self.latest_fix.clone(),
            heading_deg: self.current_heading(),
            heading_received: self.latest_heading.is_some(),
            reference: self.reference.clone(),
            fault: self.fault,
            beyond_valid_range: self.beyond_valid_range,
        }
    }

    pub fn fixes_received(&self) -> u64 {
        self.fixes_received
    }

    pub fn fixes_rejected(&self) -> u64 {
        self.fixes_rejected
    }

    pub fn headings_accepted(&self) -> u64 {
        self.headings_accepted
    }

    pub fn headings_discarded(&self) -> u64 {
        self.headings_discarded
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }
}

impl Default for SensorFusionController {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}
