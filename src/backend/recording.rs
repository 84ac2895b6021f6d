//! A backend that records calls instead of drawing, for asserting the
//! composer's command sequence without a GPU.

use std::cell::Cell;

use glam::Vec4;

use super::{
    ColorTextureId, EnvironmentMapKind, EnvironmentResource, FrameTarget, FrameTargetSettings,
    GeometryResource, ProgramKind, RenderBackend, TextureResource, Uniform,
};
use crate::error::RenderError;
use crate::ibl::EnvironmentData;
use crate::material::TextureRole;
use crate::mesh::Vertex3d;

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedGeometry {
    pub id: u32,
    pub vertex_count: u32,
    pub face_count: u32,
}

impl GeometryResource for RecordedGeometry {
    fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    fn face_count(&self) -> u32 {
        self.face_count
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedTexture {
    pub label: String,
    pub role: TextureRole,
}

impl TextureResource for RecordedTexture {
    fn role(&self) -> TextureRole {
        self.role
    }
}

#[derive(Debug)]
pub struct RecordedEnvironment {
    pub id: u32,
    pub skybox: RecordedGeometry,
}

impl EnvironmentResource for RecordedEnvironment {
    type Geometry = RecordedGeometry;

    fn skybox_geometry(&self) -> &RecordedGeometry {
        &self.skybox
    }
}

#[derive(Debug)]
pub struct RecordedTarget {
    pub id: u32,
    pub settings: FrameTargetSettings,
    /// Bumped on every resize, like a reallocated texture.
    pub generation: u32,
}

impl FrameTarget for RecordedTarget {
    fn settings(&self) -> FrameTargetSettings {
        self.settings
    }

    fn color_texture_id(&self) -> ColorTextureId {
        ColorTextureId(((self.generation as u64) << 32) | self.id as u64)
    }
}

/// One backend call, with resources identified by id.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    CompileProgram(ProgramKind, u32),
    CreateTarget(u32, FrameTargetSettings),
    ResizeTarget(u32, u32, u32),
    CreateGeometry(u32),
    CreateTexture(String),
    CreateEnvironment(u32),
    BindTarget(Option<u32>),
    Clear(Vec4),
    BindEnvironment(EnvironmentMapKind, u32),
    BindTexture(String, u32),
    BindTargetColor(u32, u32),
    UseProgram(ProgramKind),
    SetUniform(String, Uniform),
    Draw(u32),
    Blit(u32, u32),
}

#[derive(Default)]
pub struct RecordingBackend {
    pub calls: Vec<Call>,
    /// Makes `compile_program` fail for this program.
    pub fail_program: Option<ProgramKind>,
    /// Largest target edge `resize_target` accepts, like a device limit.
    pub max_target_size: Option<u32>,
    next_id: Cell<u32>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn draws(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, Call::Draw(_))).count()
    }

    pub fn programs_used(&self) -> Vec<ProgramKind> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::UseProgram(kind) => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn texture_binds(&self) -> Vec<(String, u32)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::BindTexture(label, slot) => Some((label.clone(), *slot)),
                _ => None,
            })
            .collect()
    }

    pub fn uniform(&self, name: &str) -> Option<Uniform> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::SetUniform(n, value) if n == name => Some(*value),
            _ => None,
        })
    }

    /// Creates a geometry with the given counts, outside the call log.
    pub fn geometry(&self, vertex_count: u32, face_count: u32) -> RecordedGeometry {
        RecordedGeometry {
            id: self.next_id(),
            vertex_count,
            face_count,
        }
    }

    /// Creates an environment, outside the call log.
    pub fn environment(&self) -> RecordedEnvironment {
        RecordedEnvironment {
            id: self.next_id(),
            skybox: self.geometry(24, 12),
        }
    }
}

impl RenderBackend for RecordingBackend {
    type Geometry = RecordedGeometry;
    type Texture = RecordedTexture;
    type Environment = RecordedEnvironment;
    type Target = RecordedTarget;
    type Program = ProgramKind;

    fn compile_program(
        &mut self,
        kind: ProgramKind,
        sample_count: u32,
    ) -> Result<ProgramKind, RenderError> {
        self.calls.push(Call::CompileProgram(kind, sample_count));
        if self.fail_program == Some(kind) {
            return Err(RenderError::ShaderCompilation {
                program: kind.label(),
                message: "rejected by recording backend".into(),
            });
        }
        Ok(kind)
    }

    fn create_target(
        &mut self,
        settings: FrameTargetSettings,
    ) -> Result<RecordedTarget, RenderError> {
        let id = self.next_id();
        self.calls.push(Call::CreateTarget(id, settings));
        Ok(RecordedTarget {
            id,
            settings,
            generation: 0,
        })
    }

    fn resize_target(
        &mut self,
        target: &mut RecordedTarget,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        self.calls.push(Call::ResizeTarget(target.id, width, height));
        if let Some(max) = self.max_target_size
            && width.max(height) > max
        {
            return Err(RenderError::TargetCreation(format!(
                "{width}x{height} exceeds {max}"
            )));
        }
        target.settings.width = width;
        target.settings.height = height;
        target.generation += 1;
        Ok(())
    }

    fn create_geometry(&mut self, vertices: &[Vertex3d], indices: &[u32]) -> RecordedGeometry {
        let geometry = self.geometry(vertices.len() as u32, (indices.len() / 3) as u32);
        self.calls.push(Call::CreateGeometry(geometry.id));
        geometry
    }

    fn create_texture(
        &mut self,
        _image: &image::RgbaImage,
        role: TextureRole,
        label: &str,
    ) -> RecordedTexture {
        self.calls.push(Call::CreateTexture(label.to_string()));
        RecordedTexture {
            label: label.to_string(),
            role,
        }
    }

    fn create_environment(
        &mut self,
        _data: &EnvironmentData,
    ) -> Result<RecordedEnvironment, RenderError> {
        let environment = self.environment();
        self.calls.push(Call::CreateEnvironment(environment.id));
        Ok(environment)
    }

    fn bind_target(&mut self, target: Option<&RecordedTarget>) {
        self.calls.push(Call::BindTarget(target.map(|t| t.id)));
    }

    fn clear(&mut self, color: Vec4) {
        self.calls.push(Call::Clear(color));
    }

    fn bind_environment(
        &mut self,
        _environment: &RecordedEnvironment,
        map: EnvironmentMapKind,
        slot: u32,
    ) {
        self.calls.push(Call::BindEnvironment(map, slot));
    }

    fn bind_texture(&mut self, texture: &RecordedTexture, slot: u32) {
        self.calls.push(Call::BindTexture(texture.label.clone(), slot));
    }

    fn bind_target_color(&mut self, target: &RecordedTarget, slot: u32) {
        self.calls.push(Call::BindTargetColor(target.id, slot));
    }

    fn use_program(&mut self, program: &ProgramKind) {
        self.calls.push(Call::UseProgram(*program));
    }

    fn set_uniform(&mut self, name: &str, value: Uniform) {
        self.calls.push(Call::SetUniform(name.to_string(), value));
    }

    fn draw_indexed(&mut self, geometry: &RecordedGeometry) {
        self.calls.push(Call::Draw(geometry.id));
    }

    fn blit(&mut self, source: &RecordedTarget, destination: &RecordedTarget) {
        self.calls.push(Call::Blit(source.id, destination.id));
    }
}
