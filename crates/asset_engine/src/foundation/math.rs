//! Math utilities and types
//!
//! Provides fundamental math types for placing assets in 3D space.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,
    
    /// Rotation quaternion
    pub rotation: Quat,
    
    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }
    
    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
    
    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Set the scale, keeping position and rotation
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }
    
    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
    
    /// Apply this transform to a point
    pub fn transform_point(&self, point: Point3) -> Point3 {
        self.to_matrix().transform_point(&point)
    }
    
    /// Combine this transform with a child transform (parent * child)
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * (self.scale.component_mul(&other.position)),
            rotation: self.rotation * other.rotation,
            scale: self.scale.component_mul(&other.scale),
        }
    }
}

/// Build a rotation from XYZ Euler angles in radians
pub fn quat_from_euler(euler: Vec3) -> Quat {
    Quat::from_euler_angles(euler.x, euler.y, euler.z)
}

/// Return the XYZ Euler angles (radians) of a rotation
pub fn euler_from_quat(rotation: &Quat) -> Vec3 {
    let (roll, pitch, yaw) = rotation.euler_angles();
    Vec3::new(roll, pitch, yaw)
}

/// Smallest power of two that is `>= value` (1 for zero), `None` past `2^31`
pub fn next_power_of_two(value: u32) -> Option<u32> {
    value.max(1).checked_next_power_of_two()
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Half of pi, a right angle in radians
    pub const FRAC_PI_2: f32 = std::f32::consts::FRAC_PI_2;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_combine_applies_parent_offset() {
        let parent = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));
        let child = Transform::from_position(Vec3::new(0.0, 2.0, 0.0));
        let combined = parent.combine(&child);
        assert_relative_eq!(combined.position, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_euler_round_trip() {
        let euler = Vec3::new(0.1, 0.2, 0.3);
        let back = euler_from_quat(&quat_from_euler(euler));
        assert_relative_eq!(back, euler, epsilon = 1e-5);
    }

    #[test]
    fn test_next_power_of_two() {
        assert_eq!(next_power_of_two(0), Some(1));
        assert_eq!(next_power_of_two(5), Some(8));
        assert_eq!(next_power_of_two(64), Some(64));
        assert_eq!(next_power_of_two(4097), Some(8192));
        assert_eq!(next_power_of_two(u32::MAX), None);
    }
}
