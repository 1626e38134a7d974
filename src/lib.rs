#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod assets;
pub mod errors;
pub mod renderer;
pub mod rhi;
pub mod scene;
pub mod settings;

pub use assets::load_gltf;
pub use errors::{EmberError, Result};
pub use renderer::frame::FrameContext;
pub use renderer::{Renderer, ShaderLibrary};
pub use rhi::{
    CommandRecorder, GraphicsContext, Handle, Holder, Pool, RecordingContext, SubmitInfo,
};
pub use scene::{Camera, Scene};
pub use settings::{GiSettings, RendererSettings, ShadowSettings};
