//! Render Hardware Interface
//!
//! The abstraction layer between rendering logic and the native graphics
//! API. Rendering code holds generation-checked [`Handle`]s into backend
//! pools, describes resources with plain descriptor structs, and records
//! commands through the [`GraphicsContext`] / [`CommandRecorder`] traits.
//! One production backend implements the traits; [`RecordingContext`] is
//! the in-crate headless implementation used by tests and validation.

pub mod context;
pub mod descriptors;
pub mod handle;
pub mod recording;

pub use context::{CommandRecorder, DeviceAddress, GraphicsContext, SubmitInfo};
pub use descriptors::*;
pub use handle::{DeviceResource, Handle, Holder, Pool};
pub use recording::{RecordedCommand, RecordingContext, Submission};
