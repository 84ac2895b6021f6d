//! The seam between the composer and a graphics API.
//!
//! [`RenderBackend`] is an immediate-mode binding model: bind a target, bind
//! textures to numbered slots, select a program, set named uniforms, draw.
//! The composer decides *what* happens each frame and in which order; a
//! backend decides how that maps onto the GPU. The crate ships one backend,
//! [`WgpuBackend`](crate::WgpuBackend).

#[cfg(test)]
pub(crate) mod recording;

use glam::{Mat4, Vec3, Vec4};

use crate::error::RenderError;
use crate::ibl::EnvironmentData;
use crate::material::TextureRole;
use crate::mesh::Vertex3d;

/// The fixed set of shader programs the composer uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgramKind {
    /// PBR + IBL reading material parameters from textures.
    PbrTextured,
    /// PBR + IBL reading material parameters from scalar uniforms.
    PbrAnalytic,
    /// Environment background.
    Skybox,
    /// Full-screen multiply by a grading color.
    ColorGrade,
    /// Full-screen color inversion.
    InvertColor,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 5] = [
        ProgramKind::PbrTextured,
        ProgramKind::PbrAnalytic,
        ProgramKind::Skybox,
        ProgramKind::ColorGrade,
        ProgramKind::InvertColor,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProgramKind::PbrTextured => "pbr_textured",
            ProgramKind::PbrAnalytic => "pbr_analytic",
            ProgramKind::Skybox => "skybox",
            ProgramKind::ColorGrade => "color_grade",
            ProgramKind::InvertColor => "invert_color",
        }
    }

    /// Whether this program draws into the multisampled scene target.
    pub fn is_scene_pass(self) -> bool {
        matches!(
            self,
            ProgramKind::PbrTextured | ProgramKind::PbrAnalytic | ProgramKind::Skybox
        )
    }
}

/// A value for a named shader uniform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Uniform {
    Mat4(Mat4),
    Float(f32),
    Float3(Vec3),
    Float4(Vec4),
    /// Integer uniforms; sampler uniforms take the texture slot they read from.
    Int(i32),
}

/// Construction parameters for a [`FrameTarget`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTargetSettings {
    pub width: u32,
    pub height: u32,
    pub has_depth: bool,
    pub multisampled: bool,
    pub sample_count: u32,
}

impl FrameTargetSettings {
    /// A single-sample, color-only target.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            has_depth: false,
            multisampled: false,
            sample_count: 1,
        }
    }

    pub fn with_depth(mut self) -> Self {
        self.has_depth = true;
        self
    }

    pub fn multisampled(mut self, sample_count: u32) -> Self {
        self.multisampled = sample_count > 1;
        self.sample_count = sample_count.max(1);
        self
    }

    /// The sample count actually used for attachments.
    pub fn samples(&self) -> u32 {
        if self.multisampled {
            self.sample_count
        } else {
            1
        }
    }
}

/// Identifies the color attachment of a frame target.
///
/// Embedders use this to tell which image holds the finished frame. A
/// backend may hand out a new id when a target's storage is reallocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColorTextureId(pub u64);

/// The maps carried by an environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvironmentMapKind {
    /// Raw environment radiance, drawn as the skybox.
    Environment,
    /// Cosine-convolved radiance for diffuse IBL.
    Irradiance,
    /// Roughness-prefiltered radiance for specular IBL.
    Prefilter,
    /// Split-sum BRDF integration table.
    BrdfLut,
}

/// GPU-resident vertex/index data.
pub trait GeometryResource {
    fn vertex_count(&self) -> u32;
    fn face_count(&self) -> u32;
}

/// A texture usable by materials.
pub trait TextureResource {
    fn role(&self) -> TextureRole;
}

/// An off-screen render target.
pub trait FrameTarget {
    fn settings(&self) -> FrameTargetSettings;

    fn width(&self) -> u32 {
        self.settings().width
    }

    fn height(&self) -> u32 {
        self.settings().height
    }

    fn color_texture_id(&self) -> ColorTextureId;
}

/// Precomputed image-based lighting plus the geometry to draw it as a skybox.
pub trait EnvironmentResource {
    type Geometry;

    fn skybox_geometry(&self) -> &Self::Geometry;
}

/// A graphics backend driven by the composer.
///
/// Binding state (current target, program, slot contents, uniform values)
/// persists between calls the way it does in an immediate-mode API. All
/// calls come from one thread.
pub trait RenderBackend {
    type Geometry: GeometryResource;
    type Texture: TextureResource;
    type Environment: EnvironmentResource<Geometry = Self::Geometry>;
    type Target: FrameTarget;
    type Program;

    /// Compiles and links one of the fixed programs for targets with
    /// `sample_count` samples per pixel.
    fn compile_program(
        &mut self,
        kind: ProgramKind,
        sample_count: u32,
    ) -> Result<Self::Program, RenderError>;

    fn create_target(&mut self, settings: FrameTargetSettings)
    -> Result<Self::Target, RenderError>;

    /// Reallocates a target's attachments at a new size, keeping its other settings.
    /// On failure the target keeps its previous allocation.
    fn resize_target(
        &mut self,
        target: &mut Self::Target,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError>;

    fn create_geometry(&mut self, vertices: &[Vertex3d], indices: &[u32]) -> Self::Geometry;

    fn create_texture(
        &mut self,
        image: &image::RgbaImage,
        role: TextureRole,
        label: &str,
    ) -> Self::Texture;

    fn create_environment(
        &mut self,
        data: &EnvironmentData,
    ) -> Result<Self::Environment, RenderError>;

    /// Makes `target` the destination of following clears and draws.
    /// `None` returns to the default binding and ends the current batch of work.
    fn bind_target(&mut self, target: Option<&Self::Target>);

    /// Clears color (and depth, if present) of the bound target.
    fn clear(&mut self, color: Vec4);

    fn bind_environment(
        &mut self,
        environment: &Self::Environment,
        map: EnvironmentMapKind,
        slot: u32,
    );

    fn bind_texture(&mut self, texture: &Self::Texture, slot: u32);

    /// Binds a target's color attachment for sampling.
    fn bind_target_color(&mut self, target: &Self::Target, slot: u32);

    fn use_program(&mut self, program: &Self::Program);

    /// Sets a uniform on the current program. Names the program does not
    /// declare are ignored with a warning.
    fn set_uniform(&mut self, name: &str, value: Uniform);

    fn draw_indexed(&mut self, geometry: &Self::Geometry);

    /// Copies `source` into `destination`, resolving samples when `source`
    /// is multisampled.
    fn blit(&mut self, source: &Self::Target, destination: &Self::Target);
}
