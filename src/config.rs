use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::anchor::GeodeticOffset;
use crate::error::{ArError, ArResult};
use crate::fusion::FusionConfig;
use crate::sensors::{CameraFacing, GeolocationOptions};
use crate::visibility::{CameraProjection, VisibilityMode};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArConfig {
    pub anchor_id: String,
    pub anchor_offset: GeodeticOffset,
    pub projection: CameraProjection,
    pub visibility: VisibilityMode,
    pub camera_facing: CameraFacing,
    pub frame_rate_hz: f64,
    pub first_fix_timeout_secs: f64,
    pub permission_probe_timeout_secs: f64,
    pub high_accuracy: bool,
    pub max_cache_age_ms: u64,
    pub fix_stale_after_secs: f64,
    pub heading_stale_after_secs: f64,
    pub health_check_interval_secs: f64,
    /// Buffered sensor events per stream
    pub channel_capacity: usize,
    pub fusion: FusionConfig,
}

impl Default for ArConfig {
    fn default() -> Self {
        Self {
            anchor_id: "anchor".to_string(),
            anchor_offset: GeodeticOffset::default(),
            projection: CameraProjection::default(),
            visibility: VisibilityMode::default(),
            camera_facing: CameraFacing::default(),
            frame_rate_hz: 60.0,
            first_fix_timeout_secs: 30.0,
            permission_probe_timeout_secs: 5.0,
            high_accuracy: true,
            max_cache_age_ms: 1000,
            fix_stale_after_secs: 10.0,
            heading_stale_after_secs: 3.0,
            health_check_interval_secs: 2.0,
            channel_capacity: 64,
            fusion: FusionConfig::default(),
        }
    }
}

impl ArConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ArConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> ArResult<()> {
        self.projection.validate()?;

        let durations = [
            ("frame_rate_hz", self.frame_rate_hz),
            ("first_fix_timeout_secs", self.first_fix_timeout_secs),
            ("permission_probe_timeout_secs", self.permission_probe_timeout_secs),
            ("fix_stale_after_secs", self.fix_stale_after_secs),
            ("heading_stale_after_secs", self.heading_stale_after_secs),
            ("health_check_interval_secs", self.health_check_interval_secs),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value <= 0.0 {
                return Err(ArError::InvalidConfig(format!("{} must be positive, got {}", name, value)));
            }
        }

        if !self.anchor_offset.d_lat.is_finite() || !self.anchor_offset.d_lon.is_finite() {
            return Err(ArError::InvalidConfig("anchor offset must be finite".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(ArError::InvalidConfig("channel_capacity must be at least 1".to_string()));
        }
        if !self.fusion.valid_range_m.is_finite() || self.fusion.valid_range_m <= 0.0 {
            return Err(ArError::InvalidConfig(format!(
                "valid_range_m must be positive, got {}",
                self.fusion.valid_range_m
            )));
        }
        Ok(())
    }

    // Durations below assume a validated config

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate_hz)
    }

    pub fn first_fix_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.first_fix_timeout_secs)
    }

    pub fn permission_probe_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.permission_probe_timeout_secs)
    }

    pub fn fix_stale_after(&self) -> Duration {
        Duration::from_secs_f64(self.fix_stale_after_secs)
    }

    pub fn heading_stale_after(&self) -> Duration {
        Duration::from_secs_f64(self.heading_stale_after_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.health_check_interval_secs)
    }

    pub fn geolocation_options(&self) -> GeolocationOptions {
        GeolocationOptions {
            high_accuracy: self.high_accuracy,
            max_cache_age: Duration::from_millis(self.max_cache_age_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = ArConfig::default();
        assert!(config.validate().is_ok());
        assert_relative_eq!(config.frame_period().as_secs_f64(), 1.0 / 60.0, epsilon = 1e-9);
        assert_eq!(config.first_fix_timeout(), Duration::from_secs(30));
        assert_eq!(config.geolocation_options(), GeolocationOptions::default());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "visibility": "forward_cone", "projection": { "fov_deg": 60.0, "aspect": 1.5, "near": 0.5, "far": 500.0 } }"#;
        let config: ArConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.visibility, VisibilityMode::ForwardCone);
        assert_eq!(config.projection.fov_deg, 60.0);
        assert_eq!(config.frame_rate_hz, 60.0);
        assert_eq!(config.anchor_offset, GeodeticOffset::new(0.000045, 0.0));
    }

    #[test]
    fn test_rejects_bad_values() {
        let zero_rate = ArConfig {
            frame_rate_hz: 0.0,
            ..ArConfig::default()
        };
        assert!(matches!(zero_rate.validate(), Err(ArError::InvalidConfig(_))));

        let mut inverted = ArConfig::default();
        inverted.projection.near = 2000.0;
        assert!(inverted.validate().is_err());

        let mut nan_range = ArConfig::default();
        nan_range.fusion.valid_range_m = f64::NAN;
        assert!(nan_range.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("geo_anchor_config_{}.json", std::process::id()));
        fs::write(&path, r#"{ "anchor_id": "cube", "first_fix_timeout_secs": 12.0 }"#).unwrap();

        let config = ArConfig::load(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.anchor_id, "cube");
        assert_eq!(config.first_fix_timeout(), Duration::from_secs(12));
        assert!(ArConfig::load(&path).is_err());
    }
}
