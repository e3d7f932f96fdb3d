//! Linear algebra type aliases for the local tangent frame
//!
//! Local frame axes: x = east, y = up, z = north, all in meters.

use nalgebra::{Matrix4, Vector3, Vector4};

pub const FRUSTUM_PLANE_COUNT: usize = 6;

/// Point in local tangent-plane meters (x east, y up, z north)
pub type LocalPoint = Vector3<f64>;

/// Homogeneous plane `(a, b, c, d)` with `a*x + b*y + c*z + d >= 0` inside
pub type Plane = Vector4<f64>;

pub type ViewProjection = Matrix4<f64>;

pub type FrustumPlanes = [Plane; FRUSTUM_PLANE_COUNT];
