//! Render pipelines for the fixed programs and their named-uniform tables.
//!
//! Each program owns a 256-byte uniform block (group 0, dynamic offset) and
//! a texture group (group 1) with one texture per slot at `binding = slot`,
//! plus a clamping sampler at [`CLAMP_SAMPLER_BINDING`] and a repeating
//! sampler at [`REPEAT_SAMPLER_BINDING`]. Named uniforms are resolved through
//! a static table; sampler uniforms name the slot they read, which must match
//! the binding fixed in the shader.

use wgpu::TextureViewDimension as Dim;

use crate::backend::{ProgramKind, Uniform};
use crate::error::RenderError;
use crate::gpu::GpuContext;
use crate::mesh::Vertex3d;

use super::target::{DEPTH_FORMAT, TARGET_FORMAT};

pub const UNIFORM_BLOCK_SIZE: usize = 256;
pub const CLAMP_SAMPLER_BINDING: u32 = 16;
pub const REPEAT_SAMPLER_BINDING: u32 = 17;

/// Byte offset of the bound-texture bitmask in PBR blocks.
const TEXTURE_MASK_OFFSET: usize = 252;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Mat4,
    Float,
    Float3,
    Float4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UniformField {
    /// A value stored in the uniform block.
    Value { offset: usize, kind: FieldKind },
    /// A sampler reading the texture bound to `binding`. Setting it marks
    /// `mask_bit` in the block's texture mask.
    Sampler { binding: u32, mask_bit: Option<u32> },
}

pub(crate) struct ProgramLayout {
    pub fields: &'static [(&'static str, UniformField)],
    pub texture_slots: &'static [(u32, Dim)],
}

impl ProgramLayout {
    pub fn field(&self, name: &str) -> Option<UniformField> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, field)| *field)
    }

    /// Writes `value` for `name` into `block`.
    pub fn write(&self, block: &mut UniformBlock, name: &str, value: Uniform) -> UniformWrite {
        let Some(field) = self.field(name) else {
            return UniformWrite::Unknown;
        };
        match (field, value) {
            (UniformField::Value { offset, kind }, value) => match (kind, value) {
                (FieldKind::Mat4, Uniform::Mat4(m)) => block.put(offset, &m.to_cols_array()),
                (FieldKind::Float, Uniform::Float(f)) => block.put(offset, &[f]),
                (FieldKind::Float3, Uniform::Float3(v)) => block.put(offset, &v.to_array()),
                (FieldKind::Float4, Uniform::Float4(v)) => block.put(offset, &v.to_array()),
                _ => return UniformWrite::WrongType,
            },
            (UniformField::Sampler { binding, mask_bit }, Uniform::Int(slot)) => {
                if slot < 0 || slot as u32 != binding {
                    return UniformWrite::WrongSlot { expected: binding };
                }
                if let Some(bit) = mask_bit {
                    block.set_mask_bit(bit);
                }
            }
            (UniformField::Sampler { .. }, _) => return UniformWrite::WrongType,
        }
        UniformWrite::Stored
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UniformWrite {
    Stored,
    Unknown,
    WrongType,
    WrongSlot { expected: u32 },
}

/// CPU copy of one program's uniform block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct UniformBlock([u8; UNIFORM_BLOCK_SIZE]);

impl Default for UniformBlock {
    fn default() -> Self {
        Self([0; UNIFORM_BLOCK_SIZE])
    }
}

impl UniformBlock {
    fn put(&mut self, offset: usize, values: &[f32]) {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        self.0[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn set_mask_bit(&mut self, bit: u32) {
        let mask = self.texture_mask() | (1 << bit);
        self.0[TEXTURE_MASK_OFFSET..].copy_from_slice(&mask.to_le_bytes());
    }

    pub fn texture_mask(&self) -> u32 {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&self.0[TEXTURE_MASK_OFFSET..]);
        u32::from_le_bytes(bytes)
    }

    /// Texture binds only last one draw.
    pub fn clear_texture_mask(&mut self) {
        self.0[TEXTURE_MASK_OFFSET..].fill(0);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

const fn value(offset: usize, kind: FieldKind) -> UniformField {
    UniformField::Value { offset, kind }
}

const fn sampler(binding: u32, mask_bit: Option<u32>) -> UniformField {
    UniformField::Sampler { binding, mask_bit }
}

static PBR_TEXTURED: ProgramLayout = ProgramLayout {
    fields: &[
        ("u_Projection", value(0, FieldKind::Mat4)),
        ("u_View", value(64, FieldKind::Mat4)),
        ("u_Model", value(128, FieldKind::Mat4)),
        ("u_LightPos", value(192, FieldKind::Float3)),
        ("u_LightColor", value(208, FieldKind::Float3)),
        ("u_CameraPos", value(224, FieldKind::Float3)),
        ("u_IrradianceMap", sampler(0, None)),
        ("u_PrefilterMap", sampler(1, None)),
        ("u_BrdfLutTexture", sampler(2, None)),
        ("u_TextureAlbedo", sampler(3, Some(0))),
        ("u_TextureNormal", sampler(4, Some(1))),
        ("u_TextureMetallicSmooth", sampler(5, Some(2))),
        ("u_TextureAmbient", sampler(6, Some(3))),
    ],
    texture_slots: &[
        (0, Dim::Cube),
        (1, Dim::Cube),
        (2, Dim::D2),
        (3, Dim::D2),
        (4, Dim::D2),
        (5, Dim::D2),
        (6, Dim::D2),
    ],
};

static PBR_ANALYTIC: ProgramLayout = ProgramLayout {
    fields: &[
        ("u_Projection", value(0, FieldKind::Mat4)),
        ("u_View", value(64, FieldKind::Mat4)),
        ("u_Model", value(128, FieldKind::Mat4)),
        ("u_LightPos", value(192, FieldKind::Float3)),
        ("u_Roughness", value(204, FieldKind::Float)),
        ("u_LightColor", value(208, FieldKind::Float3)),
        ("u_Metallic", value(220, FieldKind::Float)),
        ("u_CameraPos", value(224, FieldKind::Float3)),
        ("u_Ambient", value(236, FieldKind::Float)),
        ("u_Albedo", value(240, FieldKind::Float3)),
        ("u_IrradianceMap", sampler(0, None)),
        ("u_PrefilterMap", sampler(1, None)),
        ("u_BrdfLutTexture", sampler(2, None)),
    ],
    texture_slots: &[(0, Dim::Cube), (1, Dim::Cube), (2, Dim::D2)],
};

static SKYBOX: ProgramLayout = ProgramLayout {
    fields: &[
        ("u_Projection", value(0, FieldKind::Mat4)),
        ("u_View", value(64, FieldKind::Mat4)),
        ("u_EnvironmentMap", sampler(0, None)),
    ],
    texture_slots: &[(0, Dim::Cube)],
};

static COLOR_GRADE: ProgramLayout = ProgramLayout {
    fields: &[
        ("u_GradingColor", value(0, FieldKind::Float4)),
        ("u_Frame", sampler(0, None)),
    ],
    texture_slots: &[(0, Dim::D2)],
};

static INVERT_COLOR: ProgramLayout = ProgramLayout {
    fields: &[("u_Frame", sampler(0, None))],
    texture_slots: &[(0, Dim::D2)],
};

pub(crate) fn layout(kind: ProgramKind) -> &'static ProgramLayout {
    match kind {
        ProgramKind::PbrTextured => &PBR_TEXTURED,
        ProgramKind::PbrAnalytic => &PBR_ANALYTIC,
        ProgramKind::Skybox => &SKYBOX,
        ProgramKind::ColorGrade => &COLOR_GRADE,
        ProgramKind::InvertColor => &INVERT_COLOR,
    }
}

/// WGSL source and fragment entry point.
fn shader(kind: ProgramKind) -> (&'static str, &'static str) {
    match kind {
        ProgramKind::PbrTextured => (include_str!("../shaders/pbr.wgsl"), "fs_textured"),
        ProgramKind::PbrAnalytic => (include_str!("../shaders/pbr.wgsl"), "fs_analytic"),
        ProgramKind::Skybox => (include_str!("../shaders/skybox.wgsl"), "fs"),
        ProgramKind::ColorGrade => (include_str!("../shaders/color_grade.wgsl"), "fs"),
        ProgramKind::InvertColor => (include_str!("../shaders/invert.wgsl"), "fs"),
    }
}

/// A compiled program: pipeline plus the layout of its texture group.
#[derive(Clone)]
pub struct WgpuProgram {
    pub(crate) kind: ProgramKind,
    pub(crate) pipeline: wgpu::RenderPipeline,
    pub(crate) texture_layout: wgpu::BindGroupLayout,
    pub(crate) sample_count: u32,
}

impl WgpuProgram {
    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    pub(crate) fn layout(&self) -> &'static ProgramLayout {
        layout(self.kind)
    }

    /// Builds the pipeline, turning validation errors into
    /// [`RenderError::ShaderCompilation`].
    pub(crate) fn compile(
        gpu: &GpuContext,
        kind: ProgramKind,
        sample_count: u32,
        uniform_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self, RenderError> {
        let device = &gpu.device;
        let label = kind.label();
        let (source, fragment_entry) = shader(kind);

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let texture_layout = texture_group_layout(device, label, layout(kind).texture_slots);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let (cull_mode, depth_stencil) = match kind {
            ProgramKind::PbrTextured | ProgramKind::PbrAnalytic => (
                Some(wgpu::Face::Back),
                Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
            ),
            // drawn from inside the cube, at the far plane
            ProgramKind::Skybox => (
                None,
                Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
            ),
            ProgramKind::ColorGrade | ProgramKind::InvertColor => (None, None),
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs"),
                buffers: &[Vertex3d::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some(fragment_entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode,
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState {
                count: sample_count,
                ..Default::default()
            },
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::ShaderCompilation {
                program: label,
                message: error.to_string(),
            });
        }

        log::debug!("compiled program '{label}' ({sample_count}x)");
        Ok(Self {
            kind,
            pipeline,
            texture_layout,
            sample_count,
        })
    }
}

/// Group 0: the uniform arena, bound at a per-draw dynamic offset.
pub(crate) fn uniform_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Uniform Block Layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(UNIFORM_BLOCK_SIZE as u64),
            },
            count: None,
        }],
    })
}

fn texture_group_layout(
    device: &wgpu::Device,
    label: &str,
    slots: &[(u32, Dim)],
) -> wgpu::BindGroupLayout {
    let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    };

    let entries: Vec<_> = slots
        .iter()
        .map(|&(binding, view_dimension)| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension,
                multisampled: false,
            },
            count: None,
        })
        .chain([
            sampler_entry(CLAMP_SAMPLER_BINDING),
            sampler_entry(REPEAT_SAMPLER_BINDING),
        ])
        .collect();

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{label} Textures")),
        entries: &entries,
    })
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3, Vec4};

    use super::*;
    use crate::dispatch::{FRAME_SLOT, MATERIAL_TEXTURE_SLOTS};

    fn read_f32(block: &UniformBlock, offset: usize) -> f32 {
        bytemuck::pod_read_unaligned(&block.bytes()[offset..offset + 4])
    }

    #[test]
    fn value_fields_stay_clear_of_the_texture_mask() {
        for kind in ProgramKind::ALL {
            for (name, field) in layout(kind).fields {
                if let UniformField::Value { offset, kind: field_kind } = field {
                    let size = match field_kind {
                        FieldKind::Mat4 => 64,
                        FieldKind::Float => 4,
                        FieldKind::Float3 => 12,
                        FieldKind::Float4 => 16,
                    };
                    assert!(
                        offset + size <= TEXTURE_MASK_OFFSET,
                        "{name} overlaps the texture mask"
                    );
                }
            }
        }
    }

    #[test]
    fn material_samplers_match_dispatch_slots() {
        let textured = layout(ProgramKind::PbrTextured);
        for (_, slot, uniform) in MATERIAL_TEXTURE_SLOTS {
            match textured.field(uniform) {
                Some(UniformField::Sampler { binding, .. }) => assert_eq!(binding, slot),
                other => panic!("{uniform} resolved to {other:?}"),
            }
            assert!(textured.texture_slots.iter().any(|(b, _)| *b == slot));
        }
    }

    #[test]
    fn post_programs_read_the_frame_slot() {
        for kind in [ProgramKind::ColorGrade, ProgramKind::InvertColor] {
            assert_eq!(
                layout(kind).field("u_Frame"),
                Some(UniformField::Sampler {
                    binding: FRAME_SLOT,
                    mask_bit: None
                })
            );
        }
    }

    #[test]
    fn writes_values_at_their_offsets() {
        let layout = layout(ProgramKind::PbrAnalytic);
        let mut block = UniformBlock::default();
        let stored = layout.write(&mut block, "u_Roughness", Uniform::Float(0.25));
        assert_eq!(stored, UniformWrite::Stored);
        assert_eq!(read_f32(&block, 204), 0.25);

        layout.write(&mut block, "u_Albedo", Uniform::Float3(Vec3::new(0.1, 0.2, 0.3)));
        assert_eq!(read_f32(&block, 244), 0.2);

        let model = Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0));
        layout.write(&mut block, "u_Model", Uniform::Mat4(model));
        // column 3, row 0
        assert_eq!(read_f32(&block, 128 + 48), 4.0);
    }

    #[test]
    fn rejects_unknown_and_mistyped() {
        let layout = layout(ProgramKind::ColorGrade);
        let mut block = UniformBlock::default();
        assert_eq!(
            layout.write(&mut block, "u_Exposure", Uniform::Float(1.0)),
            UniformWrite::Unknown
        );
        assert_eq!(
            layout.write(&mut block, "u_GradingColor", Uniform::Float(1.0)),
            UniformWrite::WrongType
        );
        assert_eq!(
            layout.write(&mut block, "u_GradingColor", Uniform::Float4(Vec4::ONE)),
            UniformWrite::Stored
        );
        assert_eq!(block, {
            let mut expected = UniformBlock::default();
            expected.put(0, &[1.0; 4]);
            expected
        });
    }

    #[test]
    fn sampler_uniforms_mark_the_texture_mask() {
        let layout = layout(ProgramKind::PbrTextured);
        let mut block = UniformBlock::default();
        layout.write(&mut block, "u_TextureAlbedo", Uniform::Int(3));
        layout.write(&mut block, "u_TextureAmbient", Uniform::Int(6));
        layout.write(&mut block, "u_IrradianceMap", Uniform::Int(0));
        assert_eq!(block.texture_mask(), 0b1001);

        block.clear_texture_mask();
        assert_eq!(block.texture_mask(), 0);
    }

    #[test]
    fn sampler_on_the_wrong_slot_is_reported() {
        let layout = layout(ProgramKind::PbrTextured);
        let mut block = UniformBlock::default();
        assert_eq!(
            layout.write(&mut block, "u_TextureNormal", Uniform::Int(3)),
            UniformWrite::WrongSlot { expected: 4 }
        );
        assert_eq!(block.texture_mask(), 0);
    }
}
