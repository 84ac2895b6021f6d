//! Off-screen frame targets.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{ColorTextureId, FrameTarget, FrameTargetSettings};
use crate::gpu::GpuContext;

/// Color format of every frame target. Shaders write display-encoded values.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

static NEXT_COLOR_ID: AtomicU64 = AtomicU64::new(1);

/// A color attachment with an optional depth attachment, possibly multisampled.
///
/// Single-sample targets can be sampled and copied; multisampled ones can
/// only be rendered to and resolved.
pub struct WgpuTarget {
    settings: FrameTargetSettings,
    pub(crate) color: wgpu::Texture,
    pub(crate) color_view: wgpu::TextureView,
    pub(crate) depth_view: Option<wgpu::TextureView>,
    color_id: ColorTextureId,
}

impl WgpuTarget {
    pub fn new(gpu: &GpuContext, settings: FrameTargetSettings) -> Self {
        let samples = settings.samples();
        let size = wgpu::Extent3d {
            width: settings.width.max(1),
            height: settings.height.max(1),
            depth_or_array_layers: 1,
        };
        let usage = if samples > 1 {
            wgpu::TextureUsages::RENDER_ATTACHMENT
        } else {
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST
        };

        let color = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frame Target Color"),
            size,
            mip_level_count: 1,
            sample_count: samples,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_view = settings.has_depth.then(|| {
            gpu.device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some("Frame Target Depth"),
                    size,
                    mip_level_count: 1,
                    sample_count: samples,
                    dimension: wgpu::TextureDimension::D2,
                    format: DEPTH_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        });

        Self {
            settings,
            color,
            color_view,
            depth_view,
            color_id: ColorTextureId(NEXT_COLOR_ID.fetch_add(1, Ordering::Relaxed)),
        }
    }

    pub fn is_multisampled(&self) -> bool {
        self.settings.samples() > 1
    }

    pub(crate) fn extent(&self) -> wgpu::Extent3d {
        self.color.size()
    }
}

impl FrameTarget for WgpuTarget {
    fn settings(&self) -> FrameTargetSettings {
        self.settings
    }

    fn color_texture_id(&self) -> ColorTextureId {
        self.color_id
    }
}
