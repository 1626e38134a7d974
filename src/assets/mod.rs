//! Asset Loading
//!
//! Decoders for external interchange formats. The engine persists nothing
//! of its own; everything here reads a foreign format into [`Scene`] data.
//!
//! [`Scene`]: crate::scene::Scene

pub mod gltf;

pub use gltf::load_gltf;
