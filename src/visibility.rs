//! Camera-relative visibility testing
//!
//! The camera sits at the local origin and only rotates about the vertical
//! axis. Yaw follows compass convention: 0 faces north (+z), 90 faces east
//! (+x).

use std::str::FromStr;

use nalgebra::{Isometry3, Perspective3, Point3, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::error::{ArError, ArResult};
use crate::geodetic::normalize_heading;
use crate::types::{FrustumPlanes, LocalPoint, Plane, ViewProjection, FRUSTUM_PLANE_COUNT};

/// How containment is decided
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityMode {
    /// Six-plane view frustum test
    #[default]
    Frustum,
    /// Forward half-space plus horizontal field-of-view cone, ignoring the
    /// vertical extent
    ForwardCone,
}

impl FromStr for VisibilityMode {
    type Err = ArError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "frustum" => Ok(VisibilityMode::Frustum),
            "forward_cone" | "cone" => Ok(VisibilityMode::ForwardCone),
            other => Err(ArError::InvalidConfig(format!(
                "unknown visibility mode '{}' (frustum, forward_cone)",
                other
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub position: LocalPoint,
    pub yaw_deg: f64,
}

impl CameraState {
    pub fn facing(yaw_deg: f64) -> Self {
        Self {
            position: LocalPoint::zeros(),
            yaw_deg: normalize_heading(yaw_deg),
        }
    }

    /// Unit view direction in the horizontal plane
    pub fn forward(&self) -> Vector3<f64> {
        let yaw = self.yaw_deg.to_radians();
        Vector3::new(yaw.sin(), 0.0, yaw.cos())
    }
}

impl Default for CameraState {
    fn default() -> Self {
        Self::facing(0.0)
    }
}

/// Perspective settings shared by both visibility modes
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraProjection {
    /// Vertical field of view (degrees)
    pub fov_deg: f64,
    /// Width / height
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
}

impl CameraProjection {
    pub fn validate(&self) -> ArResult<()> {
        let finite = [self.fov_deg, self.aspect, self.near, self.far]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(ArError::InvalidConfig("projection values must be finite".to_string()));
        }
        if self.fov_deg <= 0.0 || self.fov_deg >= 180.0 {
            return Err(ArError::InvalidConfig(format!(
                "field of view {} outside (0, 180)",
                self.fov_deg
            )));
        }
        if self.aspect <= 0.0 {
            return Err(ArError::InvalidConfig(format!("aspect {} must be positive", self.aspect)));
        }
        if self.near <= 0.0 || self.near >= self.far {
            return Err(ArError::InvalidConfig(format!(
                "near {} / far {} must satisfy 0 < near < far",
                self.near, self.far
            )));
        }
        Ok(())
    }

    /// Half of the horizontal field of view (radians)
    pub fn half_horizontal_fov(&self) -> f64 {
        ((self.fov_deg.to_radians() / 2.0).tan() * self.aspect).atan()
    }

    pub fn view_projection(&self, camera: &CameraState) -> ViewProjection {
        let eye = Point3::from(camera.position);
        let target = eye + camera.forward();
        let view = Isometry3::look_at_rh(&eye, &target, &Vector3::y());
        let projection = Perspective3::new(self.aspect, self.fov_deg.to_radians(), self.near, self.far);
        projection.as_matrix() * view.to_homogeneous()
    }
}

impl Default for CameraProjection {
    fn default() -> Self {
        Self {
            fov_deg: 75.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// View volume as six inward-facing normalized planes
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: FrustumPlanes,
}

impl Frustum {
    /// Extract the planes from a clip-space matrix (left, right, bottom, top,
    /// near, far)
    pub fn from_view_projection(m: &ViewProjection) -> Self {
        let row = |i: usize| -> Plane { m.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let mut planes: FrustumPlanes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2];
        for plane in planes.iter_mut() {
            let n = plane.xyz().norm();
            if n > 0.0 {
                *plane /= n;
            }
        }
        Self { planes }
    }

    pub fn contains_point(&self, p: &LocalPoint) -> bool {
        let h = Vector4::new(p.x, p.y, p.z, 1.0);
        self.planes.iter().all(|plane| plane.dot(&h) >= 0.0)
    }

    pub fn planes(&self) -> &[Plane; FRUSTUM_PLANE_COUNT] {
        &self.planes
    }
}

pub struct VisibilityEvaluator {
    projection: CameraProjection,
    mode: VisibilityMode,
    camera: CameraState,
    frustum: Frustum,
}

impl VisibilityEvaluator {
    pub fn new(projection: CameraProjection, mode: VisibilityMode) -> Self {
        let camera = CameraState::default();
        let frustum = Frustum::from_view_projection(&projection.view_projection(&camera));
        Self {
            projection,
            mode,
            camera,
            frustum,
        }
    }

    /// Rebuild the view volume for this frame's camera
    pub fn update(&mut self, camera: &CameraState) {
        self.camera = *camera;
        if self.mode == VisibilityMode::Frustum {
            self.frustum = Frustum::from_view_projection(&self.projection.view_projection(camera));
        }
    }

    pub fn is_visible(&self, point: &LocalPoint) -> bool {
        match self.mode {
            VisibilityMode::Frustum => self.frustum.contains_point(point),
            VisibilityMode::ForwardCone => self.in_forward_cone(point),
        }
    }

    fn in_forward_cone(&self, point: &LocalPoint) -> bool {
        let relative = point - self.camera.position;
        let horizontal = Vector3::new(relative.x, 0.0, relative.z);
        let depth = horizontal.dot(&self.camera.forward());
        if depth < self.projection.near || depth > self.projection.far {
            return false;
        }
        let cos_angle = depth / horizontal.norm();
        cos_angle >= self.projection.half_horizontal_fov().cos()
    }

    /// Keep the aspect in step with the render surface
    pub fn set_aspect(&mut self, aspect: f64) {
        self.projection.aspect = aspect;
        let camera = self.camera;
        self.update(&camera);
    }

    pub fn projection(&self) -> &CameraProjection {
        &self.projection
    }

    pub fn mode(&self) -> VisibilityMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn north_5m() -> LocalPoint {
        LocalPoint::new(0.0, 0.0, 5.0)
    }

    fn evaluator(mode: VisibilityMode, yaw: f64) -> VisibilityEvaluator {
        let mut eval = VisibilityEvaluator::new(CameraProjection::default(), mode);
        eval.update(&CameraState::facing(yaw));
        eval
    }

    #[test]
    fn test_facing_north_sees_north_anchor() {
        assert!(evaluator(VisibilityMode::Frustum, 0.0).is_visible(&north_5m()));
        assert!(evaluator(VisibilityMode::ForwardCone, 0.0).is_visible(&north_5m()));
    }

    #[test]
    fn test_facing_south_hides_north_anchor() {
        assert!(!evaluator(VisibilityMode::Frustum, 180.0).is_visible(&north_5m()));
        assert!(!evaluator(VisibilityMode::ForwardCone, 180.0).is_visible(&north_5m()));
    }

    #[test]
    fn test_yaw_170_is_outside_cone() {
        assert!(!evaluator(VisibilityMode::Frustum, 170.0).is_visible(&north_5m()));
        assert!(!evaluator(VisibilityMode::ForwardCone, 170.0).is_visible(&north_5m()));
    }

    #[test]
    fn test_facing_east_sees_east_anchor() {
        let east = LocalPoint::new(8.0, 0.0, 0.0);
        assert!(evaluator(VisibilityMode::Frustum, 90.0).is_visible(&east));
        assert!(!evaluator(VisibilityMode::Frustum, 270.0).is_visible(&east));
    }

    #[test]
    fn test_edge_of_horizontal_fov() {
        let projection = CameraProjection::default();
        let half = projection.half_horizontal_fov().to_degrees();

        for mode in [VisibilityMode::Frustum, VisibilityMode::ForwardCone] {
            assert!(evaluator(mode, half - 2.0).is_visible(&north_5m()));
            assert!(!evaluator(mode, half + 2.0).is_visible(&north_5m()));
            assert!(evaluator(mode, 360.0 - half + 2.0).is_visible(&north_5m()));
        }
    }

    #[test]
    fn test_near_and_far_planes() {
        let eval = evaluator(VisibilityMode::Frustum, 0.0);
        assert!(!eval.is_visible(&LocalPoint::new(0.0, 0.0, 0.05)));
        assert!(eval.is_visible(&LocalPoint::new(0.0, 0.0, 999.0)));
        assert!(!eval.is_visible(&LocalPoint::new(0.0, 0.0, 1001.0)));
    }

    #[test]
    fn test_frustum_checks_vertical_extent() {
        let high = LocalPoint::new(0.0, 50.0, 5.0);
        assert!(!evaluator(VisibilityMode::Frustum, 0.0).is_visible(&high));
        // The lighter check only looks at the horizontal plane
        assert!(evaluator(VisibilityMode::ForwardCone, 0.0).is_visible(&high));
    }

    #[test]
    fn test_narrow_aspect_shrinks_horizontal_view() {
        let point = LocalPoint::new(3.0, 0.0, 5.0); // ~31 degrees east of north
        let mut eval = evaluator(VisibilityMode::Frustum, 0.0);
        assert!(eval.is_visible(&point));

        eval.set_aspect(9.0 / 16.0);
        assert!(!eval.is_visible(&point));
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("frustum".parse::<VisibilityMode>(), Ok(VisibilityMode::Frustum));
        assert_eq!("forward-cone".parse::<VisibilityMode>(), Ok(VisibilityMode::ForwardCone));
        assert!("sphere".parse::<VisibilityMode>().is_err());
    }

    #[test]
    fn test_projection_validation() {
        assert!(CameraProjection::default().validate().is_ok());
        let bad = CameraProjection {
            near: 10.0,
            far: 1.0,
            ..CameraProjection::default()
        };
        assert!(bad.validate().is_err());
        let bad_fov = CameraProjection {
            fov_deg: 0.0,
            ..CameraProjection::default()
        };
        assert!(bad_fov.validate().is_err());
    }
}
