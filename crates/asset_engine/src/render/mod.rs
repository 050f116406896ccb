//! Render-side data and the render scene boundary
//!
//! Nothing here talks to a GPU. Meshes and materials are plain data, and
//! [`RenderScene`] is the seam where a real renderer plugs in.

pub mod material;
pub mod mesh;
pub mod scene;

pub use material::{color_to_rgb, parse_color, parse_color_str, Material};
pub use mesh::{BoundingBox, Mesh, Vertex};
pub use scene::{HeadlessScene, NodeId, RenderScene, SceneNode};
