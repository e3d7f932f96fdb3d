use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::ArError;
use crate::types::SensorKind;

/// Tracks silence for one sensor stream
#[derive(Clone, Debug)]
pub struct SensorHealth {
    pub sensor: SensorKind,
    pub silence_threshold: Duration,
    last_update: Instant,
    stale: bool,
    monitored: bool,
}

impl SensorHealth {
    pub fn new(sensor: SensorKind, silence_threshold: Duration) -> Self {
        SensorHealth {
            sensor,
            silence_threshold,
            last_update: Instant::now(),
            stale: false,
            monitored: true,
        }
    }

    pub fn update(&mut self) {
        self.last_update = Instant::now();
    }

    pub fn time_since_last_update(&self) -> Duration {
        self.last_update.elapsed()
    }

    pub fn is_silent(&self) -> bool {
        self.monitored && self.time_since_last_update() > self.silence_threshold
    }

    /// Stop watching a sensor that has failed for good
    pub fn stop_monitoring(&mut self) {
        self.monitored = false;
        self.stale = false;
    }

    /// Watch again once data flows from a sensor that was given up on
    pub fn resume(&mut self) {
        self.monitored = true;
        self.update();
    }

    pub fn is_monitored(&self) -> bool {
        self.monitored
    }

    /// Edge-triggered: reports only when the stale flag flips
    fn check(&mut self) -> Option<HealthChange> {
        let silent = self.is_silent();
        if silent == self.stale {
            return None;
        }
        self.stale = silent;
        if silent {
            Some(HealthChange::Stale {
                sensor: self.sensor,
                silent_for: self.time_since_last_update(),
            })
        } else {
            Some(HealthChange::Recovered {
                sensor: self.sensor,
            })
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HealthChange {
    Stale { sensor: SensorKind, silent_for: Duration },
    Recovered { sensor: SensorKind },
}

impl HealthChange {
    /// User-visible error for a newly stale sensor
    pub fn as_error(&self) -> Option<ArError> {
        match self {
            HealthChange::Stale { sensor, silent_for } => Some(ArError::StaleData {
                sensor: *sensor,
                silent_for: *silent_for,
            }),
            HealthChange::Recovered { .. } => None,
        }
    }
}

/// Report of sensor health status
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub geolocation_healthy: bool,
    pub geolocation_silence_secs: f64,
    pub heading_healthy: bool,
    pub heading_silence_secs: f64,
}

/// Watches the geolocation and heading streams for StaleData
pub struct HealthMonitor {
    pub geolocation: SensorHealth,
    pub heading: SensorHealth,
    pub check_interval: Duration,
}

impl HealthMonitor {
    pub fn new(fix_stale_after: Duration, heading_stale_after: Duration, check_interval: Duration) -> Self {
        HealthMonitor {
            geolocation: SensorHealth::new(SensorKind::Geolocation, fix_stale_after),
            heading: SensorHealth::new(SensorKind::Orientation, heading_stale_after),
            check_interval,
        }
    }

    /// Flip stale flags and report what changed since the last check
    pub fn check(&mut self) -> Vec<HealthChange> {
        let changes: Vec<HealthChange> = [self.geolocation.check(), self.heading.check()]
            .into_iter()
            .flatten()
            .collect();

        for change in &changes {
            match change {
                HealthChange::Stale { sensor, silent_for } => {
                    log::warn!("{} silent for {:.1}s", sensor, silent_for.as_secs_f64())
                }
                HealthChange::Recovered { sensor } => log::info!("{} data flowing again", sensor),
            }
        }
        changes
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            geolocation_healthy: !self.geolocation.is_silent(),
            geolocation_silence_secs: self.geolocation.time_since_last_update().as_secs_f64(),
            heading_healthy: !self.heading.is_silent(),
            heading_silence_secs: self.heading.time_since_last_update().as_secs_f64(),
        }
    }

    /// Format health status for logging
    pub fn format_status(&self) -> String {
        let describe = |health: &SensorHealth| {
            if !health.is_monitored() {
                "off".to_string()
            } else if health.is_silent() {
                format!("silent {:.1}s", health.time_since_last_update().as_secs_f64())
            } else {
                "ok".to_string()
            }
        };
        format!(
            "Health: geolocation {} | heading {}",
            describe(&self.geolocation),
            describe(&self.heading)
        )
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(3), Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sensor_health_detection() {
        let mut health = SensorHealth::new(SensorKind::Geolocation, Duration::from_secs(1));

        // Initially healthy (just created)
        assert!(!health.is_silent());

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert!(health.is_silent());

        // Update should reset
        health.update();
        assert!(!health.is_silent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reported_once_then_recovery() {
        let mut monitor = HealthMonitor::new(
            Duration::from_secs(10),
            Duration::from_secs(3),
            Duration::from_secs(2),
        );
        assert!(monitor.check().is_empty());

        tokio::time::advance(Duration::from_secs(4)).await;
        monitor.geolocation.update();
        let changes = monitor.check();
        assert_eq!(changes.len(), 1);
        assert!(matches!(
            changes[0].as_error(),
            Some(ArError::StaleData {
                sensor: SensorKind::Orientation,
                ..
            })
        ));

        // Still silent, but already reported
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(monitor.check().is_empty());

        monitor.heading.update();
        assert_eq!(
            monitor.check(),
            vec![HealthChange::Recovered {
                sensor: SensorKind::Orientation
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmonitored_sensor_never_stale() {
        let mut monitor = HealthMonitor::default();
        monitor.heading.stop_monitoring();
        tokio::time::advance(Duration::from_secs(60)).await;
        monitor.geolocation.update();

        assert!(monitor.check().is_empty());
        assert!(monitor.report().heading_healthy);
        assert!(monitor.format_status().contains("heading off"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumed_sensor_goes_stale_again() {
        let mut health = SensorHealth::new(SensorKind::Geolocation, Duration::from_secs(10));
        health.stop_monitoring();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(health.check().is_none());

        health.resume();
        assert!(health.is_monitored());
        assert!(health.check().is_none());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(matches!(
            health.check(),
            Some(HealthChange::Stale {
                sensor: SensorKind::Geolocation,
                ..
            })
        ));
    }
}
