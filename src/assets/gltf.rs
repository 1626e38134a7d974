//! glTF Loader
//!
//! Imports a glTF file into a [`Scene`]: the node hierarchy with local
//! transforms and names, submeshes grouped per material, the material
//! list, and decoded textures (expanded to 4 channels).
//!
//! Load failures are configuration errors: the load returns `Err` and no
//! partially constructed scene escapes. A material referencing a missing
//! texture degrades to the no-texture sentinel instead.

use std::collections::HashMap;
use std::path::Path;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::errors::{EmberError, Result};
use crate::scene::hierarchy::NO_NODE;
use crate::scene::mesh::{MaterialDesc, SubMesh, TextureData, NO_TEXTURE};
use crate::scene::Scene;

/// Loads a glTF (or GLB) file into a new scene.
pub fn load_gltf(path: impl AsRef<Path>) -> Result<Scene> {
    let path = path.as_ref();
    let (document, buffers, images) = gltf::import(path)
        .map_err(|e| EmberError::GltfError(format!("{}: {e}", path.display())))?;

    let source_scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| EmberError::GltfError(format!("{}: no scene", path.display())))?;

    let mut scene = Scene::new();
    let root = scene.add_node(NO_NODE, 0, "Root");

    // Depth-first hierarchy build; glTF node index -> our node index.
    let mut node_map: HashMap<usize, i32> = HashMap::new();
    for node in source_scene.nodes() {
        visit_node(&node, root, 1, &mut scene, &mut node_map);
    }

    load_meshes(&document, &buffers, &node_map, &mut scene)?;
    scene.materials = load_materials(&document, images.len());
    scene.textures = load_textures(images)?;

    scene.update_transform(root);
    scene.update_scene_bounds();

    log::info!(
        "loaded {}: {} nodes, {} submeshes, {} materials, {} textures",
        path.display(),
        scene.node_count(),
        scene.submeshes.len(),
        scene.materials.len(),
        scene.textures.len()
    );

    Ok(scene)
}

fn visit_node(
    node: &gltf::Node,
    parent: i32,
    level: u32,
    scene: &mut Scene,
    node_map: &mut HashMap<usize, i32>,
) {
    let name = node.name().unwrap_or("Node");
    let index = scene.add_node(parent, level, name);
    scene.set_local_transform_raw(index, Mat4::from_cols_array_2d(&node.transform().matrix()));
    node_map.insert(node.index(), index);

    for child in node.children() {
        visit_node(&child, index, level + 1, scene, node_map);
    }
}

/// Reads every mesh primitive and groups the geometry per material, with
/// each vertex carrying its owning node's index.
fn load_meshes(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    node_map: &HashMap<usize, i32>,
    scene: &mut Scene,
) -> Result<()> {
    let mut by_material: HashMap<i32, SubMesh> = HashMap::new();

    for node in document.nodes() {
        let Some(mesh) = node.mesh() else { continue };
        let Some(&owner) = node_map.get(&node.index()) else {
            continue;
        };

        for primitive in mesh.primitives() {
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

            let Some(positions) = reader.read_positions() else {
                return Err(EmberError::GltfError(format!(
                    "mesh {:?} primitive has no positions",
                    mesh.name().unwrap_or("unnamed")
                )));
            };
            let positions: Vec<Vec3> = positions.map(Vec3::from_array).collect();
            let count = positions.len();

            let normals: Vec<Vec3> = match reader.read_normals() {
                Some(iter) => iter.map(Vec3::from_array).collect(),
                None => {
                    log::warn!("primitive without normals; substituting +Z");
                    vec![Vec3::Z; count]
                }
            };
            let tangents: Vec<Vec4> = match reader.read_tangents() {
                Some(iter) => iter.map(Vec4::from_array).collect(),
                None => vec![Vec4::new(1.0, 0.0, 0.0, 1.0); count],
            };
            let uvs: Vec<Vec2> = match reader.read_tex_coords(0) {
                Some(iter) => iter.into_f32().map(Vec2::from_array).collect(),
                None => vec![Vec2::ZERO; count],
            };
            let indices: Vec<u32> = match reader.read_indices() {
                Some(iter) => iter.into_u32().collect(),
                None => (0..count as u32).collect(),
            };

            let material = primitive
                .material()
                .index()
                .map_or(-1, |index| index as i32);
            let submesh = by_material.entry(material).or_insert_with(|| SubMesh {
                material,
                ..Default::default()
            });

            let base_vertex = submesh.vertex_count() as u32;
            submesh.positions.extend(positions);
            submesh.normals.extend(normals);
            submesh.tangents.extend(tangents);
            submesh.uvs.extend(uvs);
            submesh.mesh_indices.extend(std::iter::repeat_n(owner, count));
            submesh.indices.extend(indices.iter().map(|&i| i + base_vertex));
        }
    }

    let mut submeshes: Vec<SubMesh> = by_material.into_values().collect();
    submeshes.sort_by_key(|s| s.material);
    for submesh in &submeshes {
        submesh.validate()?;
    }
    scene.submeshes = submeshes;
    Ok(())
}

fn load_materials(document: &gltf::Document, texture_count: usize) -> Vec<MaterialDesc> {
    let texture_index = |info: Option<usize>| -> i32 {
        match info {
            Some(index) if index < texture_count => index as i32,
            Some(index) => {
                log::warn!("material references missing texture {index}; using none");
                NO_TEXTURE
            }
            None => NO_TEXTURE,
        }
    };

    document
        .materials()
        .map(|material| {
            let pbr = material.pbr_metallic_roughness();
            MaterialDesc {
                base_color_factor: Vec4::from_array(pbr.base_color_factor()),
                metallic_factor: pbr.metallic_factor(),
                roughness_factor: pbr.roughness_factor(),
                base_color_texture: texture_index(
                    pbr.base_color_texture().map(|t| t.texture().source().index()),
                ),
                normal_texture: texture_index(
                    material.normal_texture().map(|t| t.texture().source().index()),
                ),
                metallic_roughness_texture: texture_index(
                    pbr.metallic_roughness_texture()
                        .map(|t| t.texture().source().index()),
                ),
            }
        })
        .collect()
}

/// Decodes every image to 4-channel RGBA8.
fn load_textures(images: Vec<gltf::image::Data>) -> Result<Vec<TextureData>> {
    use gltf::image::Format;

    images
        .into_iter()
        .map(|image| {
            let texel_count = (image.width * image.height) as usize;
            let pixels = match image.format {
                Format::R8G8B8A8 => image.pixels,
                Format::R8G8B8 => expand_channels(&image.pixels, texel_count, 3),
                Format::R8G8 => expand_channels(&image.pixels, texel_count, 2),
                Format::R8 => expand_channels(&image.pixels, texel_count, 1),
                other => {
                    return Err(EmberError::ImageFormatError(format!(
                        "unsupported source format {other:?}"
                    )));
                }
            };
            Ok(TextureData {
                width: image.width,
                height: image.height,
                channels: 4,
                pixels,
            })
        })
        .collect()
}

fn expand_channels(source: &[u8], texel_count: usize, channels: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(texel_count * 4);
    for texel in source.chunks_exact(channels) {
        match channels {
            1 => pixels.extend_from_slice(&[texel[0], texel[0], texel[0], 255]),
            2 => pixels.extend_from_slice(&[texel[0], texel[1], 0, 255]),
            _ => pixels.extend_from_slice(&[texel[0], texel[1], texel[2], 255]),
        }
    }
    pixels
}
