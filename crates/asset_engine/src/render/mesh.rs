//! Mesh representation for 3D models
//!
//! Pure geometry: vertices, optional indices and bounding boxes. Parametric
//! builders for the analytic primitives the spawner understands live here too.

use crate::foundation::math::{constants::PI, Vec3};
use serde::{Deserialize, Serialize};

/// 3D vertex data structure
///
/// Position, normal and texture coordinate of a single vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Position in 3D space
    pub position: [f32; 3],

    /// Normal vector
    pub normal: [f32; 3],

    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    pub fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self { position, normal, tex_coord }
    }

    /// Create a vertex with only a position
    pub fn from_position(position: [f32; 3]) -> Self {
        Self::new(position, [0.0, 1.0, 0.0], [0.0, 0.0])
    }
}

/// Axis-aligned bounding box in mesh-local space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl BoundingBox {
    /// Create a box from its corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Compute the bounds of a point set, `None` when empty or non-finite
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Option<Self> {
        let mut min = Vec3::repeat(f32::INFINITY);
        let mut max = Vec3::repeat(f32::NEG_INFINITY);
        let mut count = 0usize;
        for p in points {
            let v = Vec3::new(p[0], p[1], p[2]);
            if !(v.x.is_finite() && v.y.is_finite() && v.z.is_finite()) {
                return None;
            }
            min = min.inf(&v);
            max = max.sup(&v);
            count += 1;
        }
        (count > 0).then_some(Self { min, max })
    }

    /// Full extent along each axis
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Half extent along each axis
    pub fn half_extents(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// Triangle mesh geometry
///
/// An empty `indices` vector means the mesh is non-indexed and every three
/// consecutive vertices form a triangle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Vertex data
    pub vertices: Vec<Vertex>,

    /// Index data for triangles
    #[serde(default)]
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Create a new mesh
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Create a non-indexed mesh from raw positions
    pub fn from_positions(positions: &[[f32; 3]]) -> Self {
        Self::new(positions.iter().copied().map(Vertex::from_position).collect(), Vec::new())
    }

    /// Whether the mesh carries an index buffer
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles (`index_count / 3` or `vertex_count / 3`)
    pub fn triangle_count(&self) -> usize {
        if self.is_indexed() {
            self.indices.len() / 3
        } else {
            self.vertices.len() / 3
        }
    }

    /// Bounding box of all vertex positions
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.vertices.iter().map(|v| &v.position))
    }

    /// Vertex positions as vectors
    pub fn positions(&self) -> Vec<Vec3> {
        self.vertices
            .iter()
            .map(|v| Vec3::new(v.position[0], v.position[1], v.position[2]))
            .collect()
    }

    /// Triangle index triples, synthesized for non-indexed meshes
    ///
    /// Triangles referencing missing vertices are dropped.
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        let count = self.vertices.len() as u32;
        let tris: Vec<[u32; 3]> = if self.is_indexed() {
            self.indices
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect()
        } else {
            (0..count / 3).map(|i| [i * 3, i * 3 + 1, i * 3 + 2]).collect()
        };
        tris.into_iter()
            .filter(|t| t.iter().all(|&i| i < count))
            .collect()
    }

    /// Axis-aligned box centered at the origin
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        let (hx, hy, hz) = (width * 0.5, height * 0.5, depth * 0.5);
        // (normal, tangent u, tangent v) per face
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];
        let half = [hx, hy, hz];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (n, u, v) in faces {
            let base = vertices.len() as u32;
            for (su, sv, uv) in [(-1.0, -1.0, [0.0, 0.0]), (1.0, -1.0, [1.0, 0.0]), (1.0, 1.0, [1.0, 1.0]), (-1.0, 1.0, [0.0, 1.0])] {
                let mut p = [0.0f32; 3];
                for axis in 0..3 {
                    p[axis] = (n[axis] + su * u[axis] + sv * v[axis]) * half[axis];
                }
                vertices.push(Vertex::new(p, n, uv));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        Self::new(vertices, indices)
    }

    /// UV sphere centered at the origin
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::new();
        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = v * PI;
            for seg in 0..=segments {
                let u = seg as f32 / segments as f32;
                let phi = u * 2.0 * PI;
                let n = [theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()];
                vertices.push(Vertex::new([n[0] * radius, n[1] * radius, n[2] * radius], n, [u, v]));
            }
        }
        let indices = grid_indices(segments, rings);
        Self::new(vertices, indices)
    }

    /// Capsule along Y; `height` is the total height including both caps
    pub fn capsule(radius: f32, height: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        // Even ring count so the equator splits cleanly between the caps
        let rings = rings.max(2) & !1;
        let offset = (height * 0.5 - radius).max(0.0);
        let mut vertices = Vec::new();
        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = v * PI;
            let shift = if ring <= rings / 2 { offset } else { -offset };
            for seg in 0..=segments {
                let u = seg as f32 / segments as f32;
                let phi = u * 2.0 * PI;
                let n = [theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()];
                let p = [n[0] * radius, n[1] * radius + shift, n[2] * radius];
                vertices.push(Vertex::new(p, n, [u, v]));
            }
        }
        let indices = grid_indices(segments, rings);
        Self::new(vertices, indices)
    }

    /// Closed cylinder along Y
    pub fn cylinder(radius: f32, height: f32, segments: u32) -> Self {
        let segments = segments.max(3);
        let hy = height * 0.5;
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        // Side wall
        for (y, v) in [(-hy, 0.0), (hy, 1.0)] {
            for seg in 0..=segments {
                let u = seg as f32 / segments as f32;
                let phi = u * 2.0 * PI;
                let n = [phi.cos(), 0.0, phi.sin()];
                vertices.push(Vertex::new([n[0] * radius, y, n[2] * radius], n, [u, v]));
            }
        }
        indices.extend(grid_indices(segments, 1));

        // Caps
        for (y, ny) in [(hy, 1.0f32), (-hy, -1.0f32)] {
            let center = vertices.len() as u32;
            vertices.push(Vertex::new([0.0, y, 0.0], [0.0, ny, 0.0], [0.5, 0.5]));
            for seg in 0..=segments {
                let phi = seg as f32 / segments as f32 * 2.0 * PI;
                let (c, s) = (phi.cos(), phi.sin());
                vertices.push(Vertex::new([c * radius, y, s * radius], [0.0, ny, 0.0], [0.5 + c * 0.5, 0.5 + s * 0.5]));
            }
            for seg in 0..segments {
                let a = center + 1 + seg;
                if ny > 0.0 {
                    indices.extend_from_slice(&[center, a + 1, a]);
                } else {
                    indices.extend_from_slice(&[center, a, a + 1]);
                }
            }
        }
        Self::new(vertices, indices)
    }
}

// Two triangles per quad of a (segments+1) x (rows+1) vertex grid
fn grid_indices(segments: u32, rows: u32) -> Vec<u32> {
    let stride = segments + 1;
    let mut indices = Vec::with_capacity((segments * rows * 6) as usize);
    for row in 0..rows {
        for seg in 0..segments {
            let a = row * stride + seg;
            let b = a + stride;
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cuboid_counts_and_bounds() {
        let mesh = Mesh::cuboid(2.0, 4.0, 6.0);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);
        let bounds = mesh.bounds().unwrap();
        assert_relative_eq!(bounds.half_extents(), Vec3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(bounds.center(), Vec3::zeros());
    }

    #[test]
    fn test_sphere_bounds_match_radius() {
        let mesh = Mesh::sphere(1.5, 16, 8);
        let bounds = mesh.bounds().unwrap();
        assert_relative_eq!(bounds.max.y, 1.5, epsilon = 1e-5);
        assert_relative_eq!(bounds.min.y, -1.5, epsilon = 1e-5);
        assert!(mesh.triangles().len() == mesh.triangle_count());
    }

    #[test]
    fn test_capsule_total_height() {
        let mesh = Mesh::capsule(0.5, 3.0, 12, 8);
        let bounds = mesh.bounds().unwrap();
        assert_relative_eq!(bounds.size().y, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_cylinder_bounds() {
        let mesh = Mesh::cylinder(1.0, 2.0, 12);
        let bounds = mesh.bounds().unwrap();
        assert_relative_eq!(bounds.size().y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(bounds.max.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_non_indexed_triangle_count() {
        let positions = [[0.0, 0.0, 0.0]; 9];
        let mesh = Mesh::from_positions(&positions);
        assert!(!mesh.is_indexed());
        assert_eq!(mesh.triangle_count(), 3);
    }

    #[test]
    fn test_bounds_reject_nan() {
        let mesh = Mesh::from_positions(&[[0.0, f32::NAN, 0.0]]);
        assert!(mesh.bounds().is_none());
        assert!(Mesh::default().bounds().is_none());
    }

    #[test]
    fn test_triangles_drop_out_of_range_indices() {
        let mut mesh = Mesh::from_positions(&[[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        mesh.indices = vec![0, 1, 2, 0, 1, 9];
        assert_eq!(mesh.triangles(), vec![[0, 1, 2]]);
    }
}
