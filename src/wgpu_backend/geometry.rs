use wgpu::util::DeviceExt;

use crate::backend::GeometryResource;
use crate::geometry::RawGeometry;
use crate::gpu::GpuContext;
use crate::mesh::Vertex3d;

/// Vertex and index buffers of one mesh.
#[derive(Debug)]
pub struct WgpuGeometry {
    pub(crate) vertex_buffer: wgpu::Buffer,
    pub(crate) index_buffer: wgpu::Buffer,
    pub(crate) index_count: u32,
    vertex_count: u32,
}

impl WgpuGeometry {
    pub fn new(gpu: &GpuContext, vertices: &[Vertex3d], indices: &[u32]) -> Self {
        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            vertex_count: vertices.len() as u32,
        }
    }

    pub fn from_raw(gpu: &GpuContext, raw: &RawGeometry) -> Self {
        Self::new(gpu, &raw.vertices, &raw.indices)
    }
}

impl GeometryResource for WgpuGeometry {
    fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    fn face_count(&self) -> u32 {
        self.index_count / 3
    }
}
