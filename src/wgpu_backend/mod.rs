//! The wgpu implementation of [`RenderBackend`].
//!
//! Calls are recorded, not executed: draws collect into a pending pass on
//! the bound target, and the pass is encoded and submitted when the binding
//! changes, a blit needs the target's contents, or the frame is presented.
//! Each draw snapshots the current program's uniform block into a per-pass
//! arena and builds its texture group from the slot table, filling slots
//! nobody bound with 1x1 placeholders.

mod environment;
mod geometry;
mod present;
mod program;
mod target;
mod texture;

use std::collections::{BTreeMap, HashMap, HashSet};

use glam::Vec4;
use wgpu::TextureViewDimension as Dim;

pub use environment::WgpuEnvironment;
pub use geometry::WgpuGeometry;
pub use program::WgpuProgram;
pub use target::{TARGET_FORMAT, WgpuTarget};
pub use texture::WgpuTexture;

use crate::backend::{
    EnvironmentMapKind, FrameTarget, FrameTargetSettings, ProgramKind, RenderBackend, Uniform,
};
use crate::error::RenderError;
use crate::gpu::GpuContext;
use crate::ibl::EnvironmentData;
use crate::material::TextureRole;
use crate::mesh::Vertex3d;
use present::Presenter;
use program::{
    CLAMP_SAMPLER_BINDING, REPEAT_SAMPLER_BINDING, UNIFORM_BLOCK_SIZE, UniformBlock, UniformWrite,
};
use texture::Placeholders;

/// Renders through wgpu into [`WgpuTarget`]s and presents them to the
/// context's surface.
pub struct WgpuBackend {
    gpu: GpuContext,
    uniform_layout: wgpu::BindGroupLayout,
    arena: UniformArena,
    clamp_sampler: wgpu::Sampler,
    repeat_sampler: wgpu::Sampler,
    placeholders: Placeholders,
    presenter: Presenter,

    pass: Option<PendingPass>,
    program: Option<WgpuProgram>,
    blocks: HashMap<ProgramKind, UniformBlock>,
    slots: BTreeMap<u32, SlotView>,
    warned: HashSet<String>,
}

#[derive(Clone)]
struct SlotView {
    view: wgpu::TextureView,
    dimension: Dim,
}

/// Work recorded against one target since it was bound.
struct PendingPass {
    color: wgpu::TextureView,
    depth: Option<wgpu::TextureView>,
    samples: u32,
    clear: Option<Vec4>,
    uniforms: Vec<UniformBlock>,
    draws: Vec<DrawCommand>,
}

impl PendingPass {
    fn new(target: &WgpuTarget) -> Self {
        Self {
            color: target.color_view.clone(),
            depth: target.depth_view.clone(),
            samples: target.settings().samples(),
            clear: None,
            uniforms: Vec::new(),
            draws: Vec::new(),
        }
    }

    /// A fresh pass on the same attachments.
    fn restart(&self) -> Self {
        Self {
            color: self.color.clone(),
            depth: self.depth.clone(),
            samples: self.samples,
            clear: None,
            uniforms: Vec::new(),
            draws: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.clear.is_none() && self.draws.is_empty()
    }
}

struct DrawCommand {
    pipeline: wgpu::RenderPipeline,
    textures: wgpu::BindGroup,
    uniform_index: usize,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

/// One uniform buffer holding every draw's block of a pass, addressed by
/// dynamic offset.
struct UniformArena {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
}

impl UniformArena {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Arena"),
            size: (capacity * UNIFORM_BLOCK_SIZE) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform Arena Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(UNIFORM_BLOCK_SIZE as u64),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            capacity,
        }
    }

    fn upload(
        &mut self,
        gpu: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        blocks: &[UniformBlock],
    ) {
        if blocks.len() > self.capacity {
            *self = Self::new(&gpu.device, layout, blocks.len().next_power_of_two());
        }
        let bytes: Vec<u8> = blocks.iter().flat_map(|b| b.bytes()).copied().collect();
        if !bytes.is_empty() {
            gpu.queue.write_buffer(&self.buffer, 0, &bytes);
        }
    }
}

impl WgpuBackend {
    pub fn new(gpu: GpuContext) -> Self {
        let uniform_layout = program::uniform_group_layout(&gpu.device);
        let arena = UniformArena::new(&gpu.device, &uniform_layout, 64);

        let sampler = |label: &str, address_mode: wgpu::AddressMode| {
            gpu.device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: address_mode,
                address_mode_v: address_mode,
                address_mode_w: address_mode,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                mipmap_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            })
        };
        let clamp_sampler = sampler("Clamp Sampler", wgpu::AddressMode::ClampToEdge);
        let repeat_sampler = sampler("Repeat Sampler", wgpu::AddressMode::Repeat);

        let placeholders = Placeholders::new(&gpu);
        let presenter = Presenter::new(&gpu);

        Self {
            gpu,
            uniform_layout,
            arena,
            clamp_sampler,
            repeat_sampler,
            placeholders,
            presenter,
            pass: None,
            program: None,
            blocks: HashMap::new(),
            slots: BTreeMap::new(),
            warned: HashSet::new(),
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Resizes the window surface. Frame targets are resized separately.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
    }

    /// Submits outstanding work and shows `target` on the surface.
    pub fn present(&mut self, target: &WgpuTarget) -> Result<(), RenderError> {
        self.flush();
        self.presenter.present(&self.gpu, target)
    }

    fn warn_once(&mut self, key: String, message: impl FnOnce() -> String) {
        if self.warned.insert(key) {
            log::warn!("{}", message());
        }
    }

    /// Encodes and submits the pending pass; the target stays bound.
    fn flush(&mut self) {
        if let Some(pass) = self.pass.take() {
            self.pass = Some(pass.restart());
            self.submit(pass);
        }
    }

    fn submit(&mut self, pass: PendingPass) {
        if pass.is_empty() {
            return;
        }
        self.arena
            .upload(&self.gpu, &self.uniform_layout, &pass.uniforms);

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Pass Encoder"),
            });
        {
            let (color_load, depth_load) = match pass.clear {
                Some(c) => (
                    wgpu::LoadOp::Clear(wgpu::Color {
                        r: c.x as f64,
                        g: c.y as f64,
                        b: c.z as f64,
                        a: c.w as f64,
                    }),
                    wgpu::LoadOp::Clear(1.0),
                ),
                None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
            };

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &pass.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: pass.depth.as_ref().map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: depth_load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &pass.draws {
                let offset = (draw.uniform_index * UNIFORM_BLOCK_SIZE) as u32;
                render_pass.set_pipeline(&draw.pipeline);
                render_pass.set_bind_group(0, &self.arena.bind_group, &[offset]);
                render_pass.set_bind_group(1, &draw.textures, &[]);
                render_pass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
                render_pass
                    .set_index_buffer(draw.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    fn texture_group(&self, program: &WgpuProgram) -> wgpu::BindGroup {
        let views: Vec<(u32, &wgpu::TextureView)> = program
            .layout()
            .texture_slots
            .iter()
            .map(|&(slot, dimension)| {
                let view = match self.slots.get(&slot) {
                    Some(bound) if bound.dimension == dimension => &bound.view,
                    _ => self.placeholders.for_dimension(dimension),
                };
                (slot, view)
            })
            .collect();

        let entries: Vec<_> = views
            .iter()
            .map(|&(binding, view)| wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .chain([
                wgpu::BindGroupEntry {
                    binding: CLAMP_SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(&self.clamp_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: REPEAT_SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(&self.repeat_sampler),
                },
            ])
            .collect();

        self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.kind.label()),
            layout: &program.texture_layout,
            entries: &entries,
        })
    }
}

impl RenderBackend for WgpuBackend {
    type Geometry = WgpuGeometry;
    type Texture = WgpuTexture;
    type Environment = WgpuEnvironment;
    type Target = WgpuTarget;
    type Program = WgpuProgram;

    fn compile_program(
        &mut self,
        kind: ProgramKind,
        sample_count: u32,
    ) -> Result<WgpuProgram, RenderError> {
        WgpuProgram::compile(&self.gpu, kind, sample_count, &self.uniform_layout)
    }

    fn create_target(&mut self, settings: FrameTargetSettings) -> Result<WgpuTarget, RenderError> {
        self.gpu
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let target = WgpuTarget::new(&self.gpu, settings);
        match pollster::block_on(self.gpu.device.pop_error_scope()) {
            Some(error) => Err(RenderError::TargetCreation(error.to_string())),
            None => Ok(target),
        }
    }

    fn resize_target(
        &mut self,
        target: &mut WgpuTarget,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        let mut settings = target.settings();
        settings.width = width;
        settings.height = height;
        *target = self.create_target(settings)?;
        Ok(())
    }

    fn create_geometry(&mut self, vertices: &[Vertex3d], indices: &[u32]) -> WgpuGeometry {
        WgpuGeometry::new(&self.gpu, vertices, indices)
    }

    fn create_texture(
        &mut self,
        image: &image::RgbaImage,
        role: TextureRole,
        label: &str,
    ) -> WgpuTexture {
        let texture = WgpuTexture::from_image(&self.gpu, image, role, label);
        log::debug!(
            "uploaded texture '{}' ({}x{}, {:?})",
            label,
            texture.width(),
            texture.height(),
            texture.format()
        );
        texture
    }

    fn create_environment(
        &mut self,
        data: &EnvironmentData,
    ) -> Result<WgpuEnvironment, RenderError> {
        WgpuEnvironment::new(&self.gpu, data)
    }

    fn bind_target(&mut self, target: Option<&WgpuTarget>) {
        if let Some(pass) = self.pass.take() {
            self.submit(pass);
        }
        self.pass = target.map(PendingPass::new);
    }

    fn clear(&mut self, color: Vec4) {
        let has_draws = match &self.pass {
            Some(pass) => !pass.draws.is_empty(),
            None => {
                self.warn_once("clear:unbound".into(), || {
                    "clear with no target bound is ignored".into()
                });
                return;
            }
        };
        if has_draws {
            self.flush();
        }
        if let Some(pass) = &mut self.pass {
            pass.clear = Some(color);
        }
    }

    fn bind_environment(
        &mut self,
        environment: &WgpuEnvironment,
        map: EnvironmentMapKind,
        slot: u32,
    ) {
        let (view, dimension) = environment.view(map);
        self.slots.insert(
            slot,
            SlotView {
                view: view.clone(),
                dimension,
            },
        );
    }

    fn bind_texture(&mut self, texture: &WgpuTexture, slot: u32) {
        self.slots.insert(
            slot,
            SlotView {
                view: texture.view.clone(),
                dimension: Dim::D2,
            },
        );
    }

    fn bind_target_color(&mut self, target: &WgpuTarget, slot: u32) {
        if target.is_multisampled() {
            self.warn_once("bind:multisampled".into(), || {
                "multisampled targets cannot be sampled; blit them first".into()
            });
            return;
        }
        self.slots.insert(
            slot,
            SlotView {
                view: target.color_view.clone(),
                dimension: Dim::D2,
            },
        );
    }

    fn use_program(&mut self, program: &WgpuProgram) {
        self.program = Some(program.clone());
    }

    fn set_uniform(&mut self, name: &str, value: Uniform) {
        let Some(kind) = self.program.as_ref().map(|p| p.kind) else {
            self.warn_once(format!("uniform:none:{name}"), || {
                format!("uniform '{name}' set with no program in use")
            });
            return;
        };
        let label = kind.label();
        let block = self.blocks.entry(kind).or_default();
        match program::layout(kind).write(block, name, value) {
            UniformWrite::Stored => {}
            UniformWrite::Unknown => self.warn_once(format!("uniform:{label}:{name}"), || {
                format!("program '{label}' has no uniform '{name}'")
            }),
            UniformWrite::WrongType => self.warn_once(format!("type:{label}:{name}"), || {
                format!("uniform '{name}' of '{label}' set with mismatched type {value:?}")
            }),
            UniformWrite::WrongSlot { expected } => {
                self.warn_once(format!("slot:{label}:{name}"), || {
                    format!("sampler '{name}' of '{label}' reads slot {expected}, got {value:?}")
                })
            }
        }
    }

    fn draw_indexed(&mut self, geometry: &WgpuGeometry) {
        let Some(program) = self.program.clone() else {
            self.warn_once("draw:no-program".into(), || "draw with no program in use".into());
            return;
        };
        let label = program.kind.label();

        let (samples, has_depth) = match &self.pass {
            Some(pass) => (pass.samples, pass.depth.is_some()),
            None => {
                self.warn_once("draw:unbound".into(), || "draw with no target bound".into());
                return;
            }
        };
        if samples != program.sample_count || has_depth != program.kind.is_scene_pass() {
            self.warn_once(format!("draw:incompatible:{label}"), || {
                format!("program '{label}' does not match the bound target; draw skipped")
            });
            return;
        }
        if geometry.index_count == 0 {
            return;
        }

        let textures = self.texture_group(&program);
        let block = self.blocks.entry(program.kind).or_default();
        let snapshot = *block;
        block.clear_texture_mask();

        if let Some(pass) = &mut self.pass {
            pass.uniforms.push(snapshot);
            pass.draws.push(DrawCommand {
                pipeline: program.pipeline.clone(),
                textures,
                uniform_index: pass.uniforms.len() - 1,
                vertex_buffer: geometry.vertex_buffer.clone(),
                index_buffer: geometry.index_buffer.clone(),
                index_count: geometry.index_count,
            });
        }
    }

    fn blit(&mut self, source: &WgpuTarget, destination: &WgpuTarget) {
        self.flush();

        if source.extent() != destination.extent() || destination.is_multisampled() {
            self.warn_once("blit:incompatible".into(), || {
                "blit needs equal sizes and a single-sample destination; skipped".into()
            });
            return;
        }

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Blit Encoder"),
            });
        if source.is_multisampled() {
            // an empty pass whose only effect is the resolve
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Resolve Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &source.color_view,
                    resolve_target: Some(&destination.color_view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        } else {
            encoder.copy_texture_to_texture(
                source.color.as_image_copy(),
                destination.color.as_image_copy(),
                source.extent(),
            );
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}
