//! Mesh Data
//!
//! CPU-side geometry as produced by the asset loader: per-material
//! [`SubMesh`] vertex streams, material descriptions, and decoded texture
//! pixels. The renderer interleaves these into GPU vertex buffers.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::errors::{EmberError, Result};
use crate::rhi::descriptors::{VertexAttribute, VertexFormat, VertexLayout};

/// Sentinel for "no texture" in material texture slots.
pub const NO_TEXTURE: i32 = -1;

// ============================================================================
// Bounding box
// ============================================================================

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// An empty box that unions correctly with any point.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn grow(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[must_use]
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }
}

// ============================================================================
// Vertex
// ============================================================================

/// Interleaved GPU vertex. The trailing `node_index` maps the vertex back
/// to its owning hierarchy node, so shaders can fetch the node's global
/// transform from the model storage buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    pub uv: [f32; 2],
    pub node_index: u32,
}

impl Vertex {
    /// Vertex layout shared by the forward and shadow pipelines.
    #[must_use]
    pub fn layout() -> VertexLayout {
        VertexLayout {
            stride: std::mem::size_of::<Self>() as u32,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    offset: 0,
                    format: VertexFormat::Float32x3,
                },
                VertexAttribute {
                    location: 1,
                    offset: 12,
                    format: VertexFormat::Float32x3,
                },
                VertexAttribute {
                    location: 2,
                    offset: 24,
                    format: VertexFormat::Float32x4,
                },
                VertexAttribute {
                    location: 3,
                    offset: 40,
                    format: VertexFormat::Float32x2,
                },
                VertexAttribute {
                    location: 4,
                    offset: 48,
                    format: VertexFormat::Uint32,
                },
            ],
        }
    }
}

// ============================================================================
// SubMesh
// ============================================================================

/// Geometry for one material, as parallel attribute streams.
///
/// All vertex streams (including `mesh_indices`, the owning node per
/// vertex) must have equal length; [`SubMesh::validate`] checks this once
/// at load time.
#[derive(Debug, Clone, Default)]
pub struct SubMesh {
    pub material: i32,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
    /// Owning hierarchy node per vertex.
    pub mesh_indices: Vec<i32>,
}

impl SubMesh {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Checks that every attribute stream covers every vertex.
    pub fn validate(&self) -> Result<()> {
        let n = self.positions.len();
        if self.normals.len() != n
            || self.tangents.len() != n
            || self.uvs.len() != n
            || self.mesh_indices.len() != n
        {
            return Err(EmberError::InvalidMesh(format!(
                "submesh (material {}) stream lengths differ: positions={} normals={} tangents={} uvs={} mesh_indices={}",
                self.material,
                n,
                self.normals.len(),
                self.tangents.len(),
                self.uvs.len(),
                self.mesh_indices.len()
            )));
        }
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= n) {
            return Err(EmberError::InvalidMesh(format!(
                "submesh (material {}) index {index} out of range ({n} vertices)",
                self.material
            )));
        }
        Ok(())
    }

    /// Interleaves the streams into GPU vertices.
    #[must_use]
    pub fn interleave(&self) -> Vec<Vertex> {
        (0..self.vertex_count())
            .map(|i| Vertex {
                position: self.positions[i].to_array(),
                normal: self.normals[i].to_array(),
                tangent: self.tangents[i].to_array(),
                uv: self.uvs[i].to_array(),
                node_index: self.mesh_indices[i] as u32,
            })
            .collect()
    }

    /// Bounds of this submesh with each vertex transformed by its owning
    /// node's global transform.
    #[must_use]
    pub fn compute_bounds(&self, global_transforms: &[Mat4]) -> BoundingBox {
        let mut bounds = BoundingBox::empty();
        for (position, &node) in self.positions.iter().zip(&self.mesh_indices) {
            let world = global_transforms[node as usize].transform_point3(*position);
            bounds.grow(world);
        }
        bounds
    }
}

// ============================================================================
// Materials & textures
// ============================================================================

/// Material parameters as delivered by the asset loader.
///
/// Texture slots hold indices into the scene texture list, or
/// [`NO_TEXTURE`]. A missing texture degrades to the sentinel rather than
/// failing the load.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDesc {
    pub base_color_factor: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub base_color_texture: i32,
    pub normal_texture: i32,
    pub metallic_roughness_texture: i32,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            base_color_factor: Vec4::ONE,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            base_color_texture: NO_TEXTURE,
            normal_texture: NO_TEXTURE,
            metallic_roughness_texture: NO_TEXTURE,
        }
    }
}

/// Decoded texture pixels, always expanded to 4 channels on load.
#[derive(Debug, Clone, Default)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub pixels: Vec<u8>,
}
