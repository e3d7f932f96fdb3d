//! Virtual object pinned at a fixed geodetic offset from the reference frame

use serde::{Deserialize, Serialize};

use crate::geodetic::{offset_for_meters, to_local_point};
use crate::reference_frame::ReferenceFrame;
use crate::types::LocalPoint;

/// Degree deltas from the reference origin
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeodeticOffset {
    pub d_lat: f64,
    pub d_lon: f64,
}

impl GeodeticOffset {
    pub const fn new(d_lat: f64, d_lon: f64) -> Self {
        Self { d_lat, d_lon }
    }

    /// Offset placing the target `north_m`/`east_m` from a reference near
    /// `ref_lat`. The east component only holds near that latitude.
    pub fn from_meters(ref_lat: f64, north_m: f64, east_m: f64) -> Self {
        let (d_lat, d_lon) = offset_for_meters(ref_lat, north_m, east_m);
        Self { d_lat, d_lon }
    }
}

impl Default for GeodeticOffset {
    /// About 5 m due north
    fn default() -> Self {
        Self::new(0.000045, 0.0)
    }
}

/// Per-frame anchor output handed to the renderer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorState {
    /// `None` while the reference frame is unlocked
    pub local_position: Option<LocalPoint>,
    pub visible: bool,
}

#[derive(Clone, Debug)]
pub struct Anchor {
    pub id: String,
    offset: GeodeticOffset,
    local_position: Option<LocalPoint>,
    visible: bool,
}

impl Anchor {
    pub fn new(id: impl Into<String>, offset: GeodeticOffset) -> Self {
        Self {
            id: id.into(),
            offset,
            local_position: None,
            visible: false,
        }
    }

    pub fn offset(&self) -> GeodeticOffset {
        self.offset
    }

    /// Recompute the local position from the reference frame. Runs every
    /// frame; an unlocked frame leaves the anchor unpositioned and hidden.
    pub fn recompute(&mut self, reference: &ReferenceFrame) -> Option<LocalPoint> {
        self.local_position = reference.coordinates().ok().map(|(ref_lat, ref_lon)| {
            let target_lat = ref_lat + self.offset.d_lat;
            let target_lon = ref_lon + self.offset.d_lon;
            to_local_point(ref_lat, ref_lon, target_lat, target_lon)
        });
        if self.local_position.is_none() {
            self.visible = false;
        }
        self.local_position
    }

    /// Only a positioned anchor can be visible
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible && self.local_position.is_some();
    }

    pub fn local_position(&self) -> Option<LocalPoint> {
        self.local_position
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn state(&self) -> AnchorState {
        AnchorState {
            local_position: self.local_position,
            visible: self.visible,
        }
    }
}
