//! Device, queue and (optionally) a window surface.
//!
//! [`GpuContext`] does the wgpu boilerplate: instance creation, adapter
//! selection, device/queue creation and surface configuration. A context
//! built with [`GpuContext::headless`] has no surface and can only render
//! into off-screen targets.

use std::sync::Arc;

use winit::window::Window;

use crate::error::RenderError;

/// Core GPU context holding wgpu resources.
pub struct GpuContext {
    /// Presentation surface; `None` for headless contexts.
    pub surface: Option<wgpu::Surface<'static>>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// Surface configuration. Headless contexts keep a placeholder so that
    /// [`width`](Self::width) and [`height`](Self::height) still work.
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Creates a context presenting to `window`.
    ///
    /// Picks an sRGB surface format when one is offered and presents with
    /// Fifo.
    pub fn new(window: Arc<Window>) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let instance = Self::instance();

        let surface = instance
            .create_surface(window)
            .map_err(|e| RenderError::Surface(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| RenderError::Adapter(e.to_string()))?;

        let (device, queue) = Self::request_device(&adapter)?;

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = surface_caps.formats.first() else {
            return Err(RenderError::Surface(
                "surface reports no supported formats".into(),
            ));
        };
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(first_format);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        log::info!(
            "GPU: {} ({:?}), surface {:?} {}x{}",
            adapter.get_info().name,
            adapter.get_info().backend,
            surface_format,
            config.width,
            config.height
        );

        Ok(Self {
            surface: Some(surface),
            device,
            queue,
            config,
        })
    }

    /// Creates a context without a surface.
    pub fn headless(width: u32, height: u32) -> Result<Self, RenderError> {
        let instance = Self::instance();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| RenderError::Adapter(e.to_string()))?;

        let (device, queue) = Self::request_device(&adapter)?;
        log::info!("GPU: {} (headless)", adapter.get_info().name);

        Ok(Self {
            surface: None,
            device,
            queue,
            config: wgpu::SurfaceConfiguration {
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                format: wgpu::TextureFormat::Rgba8Unorm,
                width: width.max(1),
                height: height.max(1),
                present_mode: wgpu::PresentMode::Fifo,
                alpha_mode: wgpu::CompositeAlphaMode::Auto,
                view_formats: vec![],
                desired_maximum_frame_latency: 2,
            },
        })
    }

    fn instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        })
    }

    fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue), RenderError> {
        pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Irradiant Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))
        .map_err(|e| RenderError::Device(e.to_string()))
    }

    /// Resizes the surface. Zero-sized dimensions (minimized windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.config);
        }
    }

    /// Reconfigures the surface after it was lost or became outdated.
    pub fn reconfigure(&self) {
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.config);
        }
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }
}
