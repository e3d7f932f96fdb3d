use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::health::HealthReport;
use crate::render_loop::SessionState;
use crate::sensors::Notice;

/// JSON snapshot of a running or finished session
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ArStatus {
    pub timestamp: f64,
    pub generated_at: String,
    pub state: SessionState,
    pub uptime_seconds: f64,
    pub frames_rendered: u64,
    // Sensor counters
    pub fixes_received: u64,
    pub fixes_rejected: u64,
    pub headings_accepted: u64,
    pub headings_discarded: u64,
    pub heading_enabled: bool,
    // Reference frame
    pub reference_locked: bool,
    pub reference_lat: Option<f64>,
    pub reference_lon: Option<f64>,
    pub distance_from_reference_m: Option<f64>,
    pub beyond_valid_range: bool,
    // Latest fix
    pub fix_lat: Option<f64>,
    pub fix_lon: Option<f64>,
    pub fix_accuracy: Option<f64>,
    pub geolocation_fault: Option<String>,
    // Camera and anchor
    pub heading_deg: f64,
    pub camera_yaw_deg: f64,
    pub anchor_id: String,
    pub anchor_local: Option<[f64; 3]>,
    pub anchor_visible: bool,
    pub health: HealthReport,
    pub notices: Vec<Notice>,
}

impl ArStatus {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// One-line summary for periodic logging
    pub fn summary_line(&self) -> String {
        let anchor = match self.anchor_local {
            Some([x, y, z]) => format!(
                "anchor ({:.1}, {:.1}, {:.1}) {}",
                x,
                y,
                z,
                if self.anchor_visible { "visible" } else { "hidden" }
            ),
            None => "anchor unplaced".to_string(),
        };
        format!(
            "[{}] frames {} | fixes {} | yaw {:.0} | {}",
            self.state, self.frames_rendered, self.fixes_received, self.camera_yaw_deg, anchor
        )
    }
}
