//! Scene Graph
//!
//! Node hierarchy, transform propagation, camera, and the CPU-side mesh
//! data the renderer consumes.

pub mod camera;
pub mod hierarchy;
pub mod mesh;
#[allow(clippy::module_inception)]
pub mod scene;

pub use camera::Camera;
pub use hierarchy::{Hierarchy, NO_NODE};
pub use mesh::{BoundingBox, MaterialDesc, SubMesh, TextureData, Vertex, NO_TEXTURE};
pub use scene::Scene;
