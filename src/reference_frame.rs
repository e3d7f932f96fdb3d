//! First-fix-wins origin of the local tangent frame

use serde::{Deserialize, Serialize};

use crate::error::{ArError, ArResult};
use crate::types::GeodeticFix;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFrame {
    latitude: f64,
    longitude: f64,
    locked: bool,
}

impl ReferenceFrame {
    /// Unlocked frame at (0, 0)
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt `fix` as the origin. Returns `false` without touching the
    /// coordinates when already locked.
    pub fn lock(&mut self, fix: &GeodeticFix) -> bool {
        if self.locked {
            return false;
        }
        self.latitude = fix.latitude;
        self.longitude = fix.longitude;
        self.locked = true;
        true
    }

    /// External trigger only; the next lock adopts a new origin
    pub fn reset(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// `(latitude, longitude)` of the locked origin
    pub fn coordinates(&self) -> ArResult<(f64, f64)> {
        if !self.locked {
            return Err(ArError::ReferenceNotLocked);
        }
        Ok((self.latitude, self.longitude))
    }
}
