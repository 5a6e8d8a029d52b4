//! Small geometry helpers shared by the command line and the batch report

use nalgebra::Vector3;
use serde::Serialize;

/// A wrapper type for Vector3 that serializes as a flat `{x, y, z}` object
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_vector3(v: &Vector3<f64>) -> Self {
        Self {
            x: v[0],
            y: v[1],
            z: v[2],
        }
    }
}

impl From<Vector3<f64>> for Vec3 {
    fn from(v: Vector3<f64>) -> Self {
        Self::from_vector3(&v)
    }
}

/// Build a vector from exactly three components, as given on the command line
pub fn triplet(values: &[f64]) -> Option<Vector3<f64>> {
    match values {
        [x, y, z] => Some(Vector3::new(*x, *y, *z)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[test]
    fn test_vec3_serialization() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"x":1.0,"y":2.0,"z":3.0}"#);
        assert_eq!(Vec3::from(Vector3::new(1.0, 2.0, 3.0)), v);
    }

    #[test]
    fn test_triplet() {
        assert_eq!(triplet(&[1.0, 2.0, 3.0]), Some(Vector3::new(1.0, 2.0, 3.0)));
        assert_eq!(triplet(&[1.0, 2.0]), None);
        assert_eq!(triplet(&[1.0, 2.0, 3.0, 4.0]), None);
    }
}
