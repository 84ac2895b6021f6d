//! # Irradiant
//!
//! **A PBR frame composer for embedded 3D viewports.**
//!
//! Each frame is drawn into a multisampled target with image-based lighting
//! and a skybox, resolved into a single-sample target, and optionally run
//! through a chain of full-screen post passes that ping-pong between two
//! targets. The embedder gets back the target holding the finished frame.
//!
//! ## Quick Start
//!
//! ```no_run
//! use irradiant::*;
//!
//! # fn main() -> Result<(), RenderError> {
//! let gpu = GpuContext::headless(1280, 720)?;
//! let mut composer = Composer::new(WgpuBackend::new(gpu), ComposerConfig::new(1280, 720))?;
//!
//! let settings = IblSettings::default();
//! let environment = EnvironmentData::from_file("studio.hdr", &settings)?;
//! let environment = composer.backend_mut().create_environment(&environment)?;
//! let model = Model::load(composer.backend_mut(), "helmet.obj", &ImportOptions::default());
//!
//! let camera = Camera::new().at(0.0, 1.0, 4.0).looking_at(0.0, 0.0, 0.0);
//! let mut frame = composer.begin_scene(&camera, &environment, LightInfo::default());
//! frame.submit_model(&model);
//! frame.end_scene();
//!
//! composer.color_grade(glam::Vec4::new(1.0, 0.95, 0.9, 1.0));
//! println!("frame is in {:?}", composer.frame_texture_id());
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! - [`Composer`] and [`SceneFrame`] own the frame lifecycle.
//! - [`RenderBackend`] is the seam to the graphics API; [`WgpuBackend`] implements it.
//! - [`ibl`] precomputes environment maps on the CPU.
//! - [`import`] reads OBJ/MTL and STL files; [`Model::load`] uploads them.

pub mod backend;
mod camera;
mod composer;
pub mod dispatch;
mod error;
mod geometry;
mod gpu;
pub mod ibl;
pub mod import;
mod logging;
mod material;
mod mesh;
pub mod post;
mod wgpu_backend;

pub use backend::{
    ColorTextureId, EnvironmentMapKind, EnvironmentResource, FrameTarget, FrameTargetSettings,
    GeometryResource, ProgramKind, RenderBackend, TextureResource, Uniform,
};
pub use camera::{Camera, CameraView, SceneCamera};
pub use composer::{Composer, ComposerConfig, LightInfo, RendererStats, SceneFrame};
pub use error::RenderError;
pub use geometry::RawGeometry;
pub use gpu::GpuContext;
pub use ibl::{EnvironmentData, IblSettings};
pub use import::{ImportError, ImportOptions};
pub use logging::{LoggingConfig, init_logging};
pub use material::{AnalyticMaterial, Material, TextureRole, TexturedMaterial};
pub use mesh::{Mesh, Model, Transform, Vertex3d};
pub use post::{PingPong, PostEffect};
pub use wgpu_backend::{
    TARGET_FORMAT, WgpuBackend, WgpuEnvironment, WgpuGeometry, WgpuProgram, WgpuTarget,
    WgpuTexture,
};
