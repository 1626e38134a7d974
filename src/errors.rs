//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`EmberError`] covers all failure modes including:
//! - Device and resource creation failures (fatal)
//! - GPU fence timeouts (fatal; a hung GPU must not hang the host)
//! - Command ordering violations caught by offline validation
//! - Asset loading and decoding errors
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, EmberError>`.

use thiserror::Error;

/// The main error type for the Ember engine.
#[derive(Error, Debug)]
pub enum EmberError {
    // ========================================================================
    // Device & Rendering Errors (fatal tier)
    // ========================================================================
    /// The graphics backend failed to create a resource or surface.
    ///
    /// Fatal: the frame terminates; the engine never continues with a
    /// null or default resource in place of the requested one.
    #[error("Device error: {0}")]
    DeviceError(String),

    /// A host-side fence wait exceeded its bound.
    ///
    /// Fatal: treated as a GPU hang and never retried.
    #[error("GPU fence wait exceeded {timeout_ms} ms")]
    FenceTimeout {
        /// The timeout that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// A recorded command sequence violated layout or pass ordering rules.
    ///
    /// Raised by offline validation, not by the production backend; the
    /// per-frame sequencing is structured so these cannot occur at runtime.
    #[error("Command ordering violation: {0}")]
    CommandOrdering(String),

    // ========================================================================
    // Asset Loading Errors
    // ========================================================================
    /// The requested asset was not found.
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// glTF parsing or loading error.
    #[error("glTF error: {0}")]
    GltfError(String),

    /// A source image uses a pixel format the loader cannot expand.
    #[error("Image format error: {0}")]
    ImageFormatError(String),

    /// Mesh streams are inconsistent (mismatched vertex attribute counts).
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<gltf::Error> for EmberError {
    fn from(err: gltf::Error) -> Self {
        EmberError::GltfError(err.to_string())
    }
}

/// Alias for `Result<T, EmberError>`.
pub type Result<T> = std::result::Result<T, EmberError>;
