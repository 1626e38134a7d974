//! Scene
//!
//! The scene is pure data: the node hierarchy with its local/global
//! transform arrays, node names, submeshes, materials, textures, the
//! active camera, and the world-space bounds. GPU resources live in the
//! renderer; nothing here touches the device.
//!
//! # Transform propagation
//!
//! `global_transform[n] = global_transform[parent[n]] * local_transform[n]`
//! for every non-root node. [`Scene::update_transform`] maintains the
//! invariant top-down whenever a local transform changes.

use glam::Mat4;

use crate::scene::camera::Camera;
use crate::scene::hierarchy::{Hierarchy, NO_NODE};
use crate::scene::mesh::{BoundingBox, MaterialDesc, SubMesh, TextureData};

/// Scene graph plus the mesh data loaded into it.
pub struct Scene {
    hierarchy: Hierarchy,
    local_transforms: Vec<Mat4>,
    global_transforms: Vec<Mat4>,
    names: Vec<String>,

    pub submeshes: Vec<SubMesh>,
    pub materials: Vec<MaterialDesc>,
    pub textures: Vec<TextureData>,

    camera: Camera,
    bounds: BoundingBox,

    /// Single-frame dirty flag, consumed by [`Scene::take_transform_updated`].
    transform_updated: bool,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hierarchy: Hierarchy::new(),
            local_transforms: Vec::new(),
            global_transforms: Vec::new(),
            names: Vec::new(),
            submeshes: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            camera: Camera::default(),
            bounds: BoundingBox::empty(),
            transform_updated: false,
        }
    }

    // ========================================================================
    // Hierarchy construction
    // ========================================================================

    /// Adds a node under `parent` (or the root when `parent == NO_NODE`)
    /// with identity transforms.
    pub fn add_node(&mut self, parent: i32, level: u32, name: impl Into<String>) -> i32 {
        let node = self.hierarchy.add_node(parent, level);
        self.local_transforms.push(Mat4::IDENTITY);
        self.global_transforms.push(Mat4::IDENTITY);
        self.names.push(name.into());
        node
    }

    #[inline]
    #[must_use]
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.hierarchy.len()
    }

    #[must_use]
    pub fn node_names(&self) -> &[String] {
        &self.names
    }

    /// Linear search by name; editor convenience, not a per-frame path.
    #[must_use]
    pub fn find_node(&self, name: &str) -> Option<i32> {
        self.names.iter().position(|n| n == name).map(|i| i as i32)
    }

    // ========================================================================
    // Transforms
    // ========================================================================

    #[must_use]
    pub fn local_transform(&self, node: i32) -> Mat4 {
        self.local_transforms[node as usize]
    }

    #[must_use]
    pub fn global_transform(&self, node: i32) -> Mat4 {
        self.global_transforms[node as usize]
    }

    /// Sets a node's local transform, marks the scene transform-dirty, and
    /// refreshes the affected globals.
    pub fn set_transform(&mut self, node: i32, transform: Mat4) {
        self.local_transforms[node as usize] = transform;
        self.transform_updated = true;
        self.update_transform(node);
    }

    /// Writes a local transform without propagating. Used while building
    /// the hierarchy at load time; callers finish with
    /// `update_transform(root)`.
    pub fn set_local_transform_raw(&mut self, node: i32, transform: Mat4) {
        self.local_transforms[node as usize] = transform;
    }

    /// Recomputes global transforms for `node`, its descendants, and the
    /// siblings after it (whose parents are already up to date).
    ///
    /// Pre-order: the node's own global is derived from its parent's
    /// before the walk descends into `first_child`, then continues along
    /// `next_sibling`. Call with the node whose local transform changed,
    /// or with the root to refresh everything.
    pub fn update_transform(&mut self, node: i32) {
        if node == NO_NODE {
            return;
        }
        let parent = self.hierarchy.parent(node);
        self.global_transforms[node as usize] = if parent == NO_NODE {
            self.local_transforms[node as usize]
        } else {
            self.global_transforms[parent as usize] * self.local_transforms[node as usize]
        };
        self.update_transform(self.hierarchy.first_child(node));
        self.update_transform(self.hierarchy.next_sibling(node));
    }

    /// One-shot dirty flag: `true` if any transform changed since the last
    /// call, then cleared. Lets dependent recomputation (GI invalidation,
    /// reclustering) trigger exactly once per change instead of per frame.
    pub fn take_transform_updated(&mut self) -> bool {
        std::mem::take(&mut self.transform_updated)
    }

    #[must_use]
    pub fn global_transforms(&self) -> &[Mat4] {
        &self.global_transforms
    }

    // ========================================================================
    // Camera & per-frame update
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Per-frame update: camera matrices plus a full transform refresh
    /// from the root.
    pub fn update(&mut self, dt: f32) {
        self.camera.update(dt);
        if !self.hierarchy.is_empty() {
            self.update_transform(0);
        }
    }

    // ========================================================================
    // Bounds
    // ========================================================================

    /// World-space bounds as of the last [`Scene::update_scene_bounds`].
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Recomputes the world-space AABB over all submesh vertices using the
    /// current global transforms. On demand (mesh load, explicit editor
    /// request), not per-frame.
    pub fn update_scene_bounds(&mut self) {
        let mut bounds = BoundingBox::empty();
        for submesh in &self.submeshes {
            bounds = bounds.union(&submesh.compute_bounds(&self.global_transforms));
        }
        if !bounds.is_valid() {
            log::warn!("scene has no geometry; bounds left empty");
        }
        self.bounds = bounds;
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
