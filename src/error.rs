//! Error types for renderer setup and resource creation.

use thiserror::Error;

/// Errors raised while setting up the renderer or creating GPU resources.
///
/// Everything here is a setup-time failure. Per-frame operations never fail;
/// they degrade (missing content is skipped and logged) instead.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A shader program failed to compile or link. Unrecoverable.
    #[error("shader program '{program}' failed to compile: {message}")]
    ShaderCompilation {
        program: &'static str,
        message: String,
    },
    /// A frame target could not be allocated with the requested settings.
    #[error("frame target creation failed: {0}")]
    TargetCreation(String),
    /// No GPU adapter matched the request.
    #[error("no suitable GPU adapter: {0}")]
    Adapter(String),
    /// The logical device could not be created.
    #[error("device creation failed: {0}")]
    Device(String),
    /// The surface could not be created or configured.
    #[error("surface error: {0}")]
    Surface(String),
    /// An image could not be decoded.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
